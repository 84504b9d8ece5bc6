//! Event-triggered alert matching.
//!
//! Two independent loops share the multiplexed telemetry stream: one
//! tests every rule's create predicate against every event, the other
//! tests the close predicates of currently active alerts. Neither loop
//! tracks any "currently alerting" state of its own, so duplicate create
//! intents are expected and absorbed downstream by the action queue.

use chrono::Utc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use smee_core::error::{Error, Result};
use smee_core::types::{Alert, Event, IssueEvent};

use crate::actions::{ActionKind, AlertAction};
use crate::manager::ManagerInner;

impl ManagerInner {
    /// Emits a create intent for every rule whose create predicate
    /// matches an incoming event.
    ///
    /// Ends the supervised group when the subscription fails; returns
    /// cleanly on cancellation.
    pub(crate) async fn generate_event_alerts(
        &self,
        queue: mpsc::Sender<AlertAction>,
        shutdown: CancellationToken,
    ) -> Result<()> {
        let mut stream = self.streamer.stream().await.map_err(|e| Error::Stream {
            reason: format!("unable to start event stream: {e}"),
        })?;

        loop {
            let event = tokio::select! {
                next = stream.next() => next?,
                () = shutdown.cancelled() => {
                    let _ = stream.close().await;
                    return Ok(());
                }
            };

            for (alert_type, rule) in self.rules.iter() {
                if !rule.create.matches_event(&event) {
                    continue;
                }

                let alert = Alert {
                    device: event.device(),
                    alert_type: alert_type.to_string(),
                    start: Utc::now(),
                    ..Default::default()
                };

                let action = AlertAction {
                    kind: ActionKind::Create,
                    alert,
                    events: vec![IssueEvent::system_message(format!(
                        "AV Bot: |{}| {} alert started (Value: {})",
                        event.device_id, alert_type, event.value
                    ))],
                };

                if queue.send(action).await.is_err() {
                    // consumer is gone, the group is shutting down
                    return Ok(());
                }
            }
        }
    }

    /// Emits a close intent for every active alert whose close predicate
    /// matches an incoming event from the same device.
    pub(crate) async fn close_event_alerts(
        &self,
        queue: mpsc::Sender<AlertAction>,
        shutdown: CancellationToken,
    ) -> Result<()> {
        let mut stream = self.streamer.stream().await.map_err(|e| Error::Stream {
            reason: format!("unable to start event stream: {e}"),
        })?;

        loop {
            let event = tokio::select! {
                next = stream.next() => next?,
                () = shutdown.cancelled() => {
                    let _ = stream.close().await;
                    return Ok(());
                }
            };

            let alerts = self.issue_store.active_alerts().await?;

            for alert in alerts {
                if !self.event_closes_alert(&event, &alert) {
                    continue;
                }

                debug!(
                    device = %alert.device,
                    alert_type = %alert.alert_type,
                    key = %event.key,
                    value = %event.value,
                    "closing alert because of event"
                );

                let narration = IssueEvent::system_message(format!(
                    "AV Bot: |{}| {} alert ended (Value: {})",
                    event.device_id, alert.alert_type, event.value
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
    }

    /// True when the event comes from the alert's device and matches the
    /// alert type's close predicate. Types without a close predicate can
    /// only be closed administratively or by reconciliation.
    fn event_closes_alert(&self, event: &Event, alert: &Alert) -> bool {
        let Some(rule) = self.rules.get(&alert.alert_type) else {
            debug!(alert_type = %alert.alert_type, "no rule for active alert type");
            return false;
        };
        let Some(close) = &rule.close else {
            return false;
        };

        if event.device_id != alert.device.id || event.room_id != alert.device.room.id {
            return false;
        }

        close.matches_event(event)
    }
}
