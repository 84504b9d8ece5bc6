//! The serialized action queue.
//!
//! Every issue/alert mutation in the system travels through one bounded
//! queue drained by exactly one consumer, strictly in arrival order. Two
//! concurrently detected triggers for the same room therefore cannot race
//! to create two issues, and a close cannot interleave with the create of
//! a sibling alert on the same issue.
//!
//! Apply failures are logged and the intent is dropped: the queue is not
//! persisted or replayed, so delivery is best effort rather than
//! at-least-once.

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use smee_core::error::Result;
use smee_core::types::{Alert, IssueEvent};

use crate::manager::ManagerInner;

/// What an intent asks the store to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ActionKind {
    /// Open the alert, binding it to the room's issue.
    Create,
    /// Close the alert (and its issue, if it was the last one).
    Close,
}

/// One queued mutation intent with its audit narration.
#[derive(Debug, Clone)]
pub(crate) struct AlertAction {
    pub(crate) kind: ActionKind,
    pub(crate) alert: Alert,
    pub(crate) events: Vec<IssueEvent>,
}

impl ManagerInner {
    /// Drains the action queue in strict FIFO order.
    ///
    /// Returns when the queue closes or the token is cancelled; apply
    /// failures never end the consumer.
    pub(crate) async fn run_alert_actions(
        &self,
        mut queue: mpsc::Receiver<AlertAction>,
        shutdown: CancellationToken,
    ) -> Result<()> {
        loop {
            let action = tokio::select! {
                action = queue.recv() => match action {
                    Some(action) => action,
                    None => return Ok(()),
                },
                () = shutdown.cancelled() => return Ok(()),
            };

            match action.kind {
                ActionKind::Create => self.apply_create(action.alert, action.events).await,
                ActionKind::Close => self.apply_close(action.alert, action.events).await,
            }
        }
    }

    /// Applies a create intent: idempotence check, then create, then
    /// best-effort narration.
    async fn apply_create(&self, alert: Alert, events: Vec<IssueEvent>) {
        let apply = async {
            // both the matcher and the reconciler can emit duplicate
            // creates; the queue is where they get absorbed
            match self
                .issue_store
                .active_alert_exists(&alert.device.room.id, &alert.device.id, &alert.alert_type)
                .await
            {
                Ok(true) => {
                    debug!(
                        device = %alert.device,
                        alert_type = %alert.alert_type,
                        "discarding duplicate create intent"
                    );
                    return;
                }
                Ok(false) => {}
                Err(e) => {
                    warn!(error = %e, "unable to check for existing alert, dropping intent");
                    return;
                }
            }

            let issue = match self.issue_store.create_alert(alert).await {
                Ok(issue) => issue,
                Err(e) => {
                    warn!(error = %e, "unable to create alert, dropping intent");
                    return;
                }
            };

            if let Err(e) = self.issue_store.add_issue_events(&issue.id, &events).await {
                warn!(error = %e, issue_id = %issue.id, "unable to add issue events");
            }
        };

        if tokio::time::timeout(self.config.apply_timeout, apply)
            .await
            .is_err()
        {
            warn!("create apply timed out, dropping intent");
        }
    }

    /// Applies a close intent, then best-effort narration.
    async fn apply_close(&self, alert: Alert, events: Vec<IssueEvent>) {
        let apply = async {
            match self
                .issue_store
                .close_alert(&alert.issue_id, &alert.id)
                .await
            {
                Ok(issue) => {
                    if let Err(e) = self.issue_store.add_issue_events(&issue.id, &events).await {
                        warn!(error = %e, issue_id = %issue.id, "unable to add issue events");
                    }
                }
                Err(e) if e.is_not_found() => {
                    // a concurrent apply already closed the issue
                    debug!(
                        issue_id = %alert.issue_id,
                        alert_id = %alert.id,
                        "alert already closed"
                    );
                }
                Err(e) => {
                    warn!(error = %e, "unable to close alert, dropping intent");
                }
            }
        };

        if tokio::time::timeout(self.config.apply_timeout, apply)
            .await
            .is_err()
        {
            warn!("close apply timed out, dropping intent");
        }
    }
}
