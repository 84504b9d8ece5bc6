//! Periodic state reconciliation.
//!
//! The event stream can miss or duplicate transitions; this loop is the
//! drift-correction mechanism. On a fixed interval it asks the
//! device-state store which devices currently violate each alert
//! predicate, diffs that against the active alerts, and submits
//! corrective create/close intents. It is also the only path that can
//! close an alert whose type defines no close predicate.

use std::collections::HashSet;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use smee_core::error::Result;
use smee_core::types::{Alert, DeviceRef, IssueEvent};

use crate::actions::{ActionKind, AlertAction};
use crate::manager::ManagerInner;

impl ManagerInner {
    /// Polls the device-state store on a fixed interval and reconciles.
    ///
    /// A failed poll is logged and the tick skipped; the loop only exits
    /// on cancellation.
    pub(crate) async fn reconcile_state_alerts(
        &self,
        queue: mpsc::Sender<AlertAction>,
        shutdown: CancellationToken,
    ) -> Result<()> {
        let mut ticker = tokio::time::interval(self.config.reconcile_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.reconcile_once(&queue).await {
                        warn!(error = %e, "reconciliation tick skipped");
                    }
                }
                () = shutdown.cancelled() => return Ok(()),
            }
        }
    }

    /// One reconciliation pass over every queried alert type.
    async fn reconcile_once(&self, queue: &mpsc::Sender<AlertAction>) -> Result<()> {
        // one batched evaluation over the whole device population
        let should_alert = self.state_store.run_alert_queries().await?;

        for (alert_type, devices) in &should_alert {
            let have = self.issue_store.active_alerts_by_type(alert_type).await?;

            // diff on device identity (room + device) only, so repeated
            // polls stay stable across unrelated attribute churn
            let have_devices: HashSet<&DeviceRef> = have.iter().map(|a| &a.device).collect();
            let should_devices: HashSet<&DeviceRef> = devices.iter().collect();

            for device in devices {
                if have_devices.contains(device) {
                    continue;
                }

                debug!(device = %device, alert_type = %alert_type, "state query opened alert");

                let action = AlertAction {
                    kind: ActionKind::Create,
                    alert: Alert {
                        device: device.clone(),
                        alert_type: alert_type.clone(),
                        start: Utc::now(),
                        ..Default::default()
                    },
                    events: vec![IssueEvent::system_message(format!(
                        "AV Bot: |{alert_type}| Alert started on {device}."
                    ))],
                };

                if queue.send(action).await.is_err() {
                    return Ok(());
                }
            }

            for alert in have {
                if should_devices.contains(&alert.device) {
                    continue;
                }

                debug!(device = %alert.device, alert_type = %alert_type, "state query closed alert");

                let narration = IssueEvent::system_message(format!(
                    "AV Bot: |{alert_type}| Alert ended on {}.",
                    alert.device
                ));

                let action = AlertAction {
                    kind: ActionKind::Close,
                    alert,
                    events: vec![narration],
                };

                if queue.send(action).await.is_err() {
                    return Ok(());
                }
            }
        }

        Ok(())
    }
}
