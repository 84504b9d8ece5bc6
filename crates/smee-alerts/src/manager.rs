//! The alert manager: wiring and supervision.
//!
//! [`AlertManager`] runs four long-lived tasks — the action-queue
//! consumer, the event-triggered create and close loops, and the
//! state-reconciliation loop — as one supervised group. The first task to
//! fail cancels the shared token and tears the whole group down; `run`
//! returns once every task has stopped.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use smee_core::error::{Error, Result};
use smee_core::rules::RuleTable;
use smee_core::stores::{DeviceStateStore, EventStreamer, IssueStore};

use crate::actions::AlertAction;

/// Configuration for the alert manager.
#[derive(Debug, Clone)]
pub struct AlertManagerConfig {
    /// Capacity of the action queue.
    pub queue_capacity: usize,
    /// How often the reconciliation loop polls the device-state store.
    pub reconcile_interval: Duration,
    /// Bound on a single apply inside the action-queue consumer, so a
    /// hung store call stalls the pipeline for at most this long.
    pub apply_timeout: Duration,
}

impl Default for AlertManagerConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1024,
            reconcile_interval: Duration::from_secs(30),
            apply_timeout: Duration::from_secs(5),
        }
    }
}

/// Shared state for the manager's tasks.
pub(crate) struct ManagerInner {
    pub(crate) issue_store: Arc<dyn IssueStore>,
    pub(crate) streamer: Arc<dyn EventStreamer>,
    pub(crate) state_store: Arc<dyn DeviceStateStore>,
    pub(crate) rules: RuleTable,
    pub(crate) config: AlertManagerConfig,
}

/// Orchestrates alert detection and the issue lifecycle.
///
/// Raw telemetry flows through the matcher loops, the reconciliation loop
/// corrects drift against polled device state, and every resulting intent
/// funnels through one bounded queue whose single consumer is the only
/// writer to the issue store. That total order is what keeps concurrent
/// detections from racing on the same room.
pub struct AlertManager {
    inner: Arc<ManagerInner>,
}

impl AlertManager {
    /// Creates a manager with default configuration.
    #[must_use]
    pub fn new(
        issue_store: Arc<dyn IssueStore>,
        streamer: Arc<dyn EventStreamer>,
        state_store: Arc<dyn DeviceStateStore>,
        rules: RuleTable,
    ) -> Self {
        Self::with_config(
            issue_store,
            streamer,
            state_store,
            rules,
            AlertManagerConfig::default(),
        )
    }

    /// Creates a manager with custom configuration.
    #[must_use]
    pub fn with_config(
        issue_store: Arc<dyn IssueStore>,
        streamer: Arc<dyn EventStreamer>,
        state_store: Arc<dyn DeviceStateStore>,
        rules: RuleTable,
        config: AlertManagerConfig,
    ) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                issue_store,
                streamer,
                state_store,
                rules,
                config,
            }),
        }
    }

    /// Runs the manager until `shutdown` is cancelled or a task fails.
    ///
    /// # Errors
    ///
    /// Returns the first task failure; the remaining tasks are cancelled
    /// and joined before this returns.
    pub async fn run(&self, shutdown: CancellationToken) -> Result<()> {
        let (queue_tx, queue_rx) =
            mpsc::channel::<AlertAction>(self.inner.config.queue_capacity);

        let mut tasks: JoinSet<Result<()>> = JoinSet::new();

        {
            let inner = Arc::clone(&self.inner);
            let token = shutdown.clone();
            tasks.spawn(async move { inner.run_alert_actions(queue_rx, token).await });
        }
        {
            let inner = Arc::clone(&self.inner);
            let queue = queue_tx.clone();
            let token = shutdown.clone();
            tasks.spawn(async move { inner.generate_event_alerts(queue, token).await });
        }
        {
            let inner = Arc::clone(&self.inner);
            let queue = queue_tx.clone();
            let token = shutdown.clone();
            tasks.spawn(async move { inner.close_event_alerts(queue, token).await });
        }
        {
            let inner = Arc::clone(&self.inner);
            let token = shutdown.clone();
            tasks.spawn(async move { inner.reconcile_state_alerts(queue_tx, token).await });
        }

        info!("alert manager running");

        let mut first_err = None;
        while let Some(joined) = tasks.join_next().await {
            let failure = match joined {
                Ok(Ok(())) => None,
                Ok(Err(e)) => Some(e),
                Err(e) => Some(Error::Store {
                    reason: format!("manager task ended abnormally: {e}"),
                }),
            };

            if let Some(e) = failure {
                warn!(error = %e, "alert manager task failed, shutting down");
                shutdown.cancel();
                if first_err.is_none() {
                    first_err = Some(e);
                }
            }
        }

        info!("alert manager stopped");
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
