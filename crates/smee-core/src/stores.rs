//! Collaborator contracts consumed by the alert-management core.
//!
//! Each external system is reached through one narrow trait: the telemetry
//! bus ([`EventStreamer`]), the device-state snapshot service
//! ([`DeviceStateStore`]), issue/alert persistence ([`IssueStore`]), the
//! ticketing system ([`IncidentStore`]), and the maintenance directory
//! ([`MaintenanceStore`]). Wire formats and schemas belong to the
//! implementations, never to the core.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{Alert, DeviceRef, Event, Incident, Issue, IssueEvent, MaintenanceInfo};

/// An open logical subscription to the telemetry bus.
#[async_trait]
pub trait EventStream: Send {
    /// Waits for the next event on this subscription.
    ///
    /// # Errors
    ///
    /// Returns `Error::Stream` once the subscription has failed or closed;
    /// no further events will be produced after an error.
    async fn next(&mut self) -> Result<Event>;

    /// Closes the subscription and releases its resources.
    async fn close(&mut self) -> Result<()>;
}

/// The telemetry bus: produces ordered event subscriptions.
#[async_trait]
pub trait EventStreamer: Send + Sync {
    /// Opens a new subscription.
    ///
    /// # Errors
    ///
    /// Returns `Error::Stream` if the upstream connection cannot be
    /// established.
    async fn stream(&self) -> Result<Box<dyn EventStream>>;
}

/// The device-state snapshot service.
#[async_trait]
pub trait DeviceStateStore: Send + Sync {
    /// Evaluates every named alert predicate over the latest known
    /// attributes of the whole device population.
    ///
    /// Returns, for each alert type, the full set of devices currently
    /// violating its predicate.
    ///
    /// # Errors
    ///
    /// Returns `Error::StateQuery` if the snapshot store cannot be
    /// reached.
    async fn run_alert_queries(&self) -> Result<HashMap<String, Vec<DeviceRef>>>;
}

/// The canonical issue/alert lifecycle contract.
///
/// The in-memory cache and its optional persistent backing implement the
/// same trait, so the cache can delegate transparently. All mutation goes
/// through these operations; callers never touch issue or alert fields
/// directly, which is what keeps the lifecycle invariants enforceable:
/// an issue is active iff it has an active alert, and a room has at most
/// one active issue.
#[async_trait]
pub trait IssueStore: Send + Sync {
    /// Creates an alert, binding it to the room's active issue (creating
    /// the issue if the room has none). Returns the bound issue.
    async fn create_alert(&self, alert: Alert) -> Result<Issue>;

    /// Closes an alert on an issue. Closing the last active alert closes
    /// the issue. Returns the issue in its post-close state.
    ///
    /// # Errors
    ///
    /// Returns a not-found error if the issue or alert is absent, which
    /// can legitimately happen when a concurrent apply already closed the
    /// issue.
    async fn close_alert(&self, issue_id: &str, alert_id: &str) -> Result<Issue>;

    /// Appends audit events to an issue.
    async fn add_issue_events(&self, issue_id: &str, events: &[IssueEvent]) -> Result<()>;

    /// Links an external incident to an issue.
    async fn link_incident(&self, issue_id: &str, incident: Incident) -> Result<Issue>;

    /// Closes every active alert on an issue (and therefore the issue).
    async fn close_alerts_for_issue(&self, issue_id: &str) -> Result<Issue>;

    /// Marks an issue acknowledged by an operator.
    async fn acknowledge_issue(&self, issue_id: &str, by: &str) -> Result<Issue>;

    /// Clears an issue's acknowledgement.
    async fn unacknowledge_issue(&self, issue_id: &str) -> Result<Issue>;

    /// Sets an issue's caller-assigned status.
    async fn set_issue_status(&self, issue_id: &str, status: &str) -> Result<Issue>;

    /// Returns true if an active alert exists for `(room, device, type)`.
    async fn active_alert_exists(
        &self,
        room_id: &str,
        device_id: &str,
        alert_type: &str,
    ) -> Result<bool>;

    /// Returns every active alert.
    async fn active_alerts(&self) -> Result<Vec<Alert>>;

    /// Returns every active alert of one type.
    async fn active_alerts_by_type(&self, alert_type: &str) -> Result<Vec<Alert>>;

    /// Returns the room's active issue.
    ///
    /// # Errors
    ///
    /// Returns `Error::RoomIssueNotFound` if the room has no active issue.
    async fn active_issue(&self, room_id: &str) -> Result<Issue>;

    /// Returns every active issue.
    async fn active_issues(&self) -> Result<Vec<Issue>>;
}

/// The external ticketing system, reached for note propagation only.
#[async_trait]
pub trait IncidentStore: Send + Sync {
    /// Mirrors issue audit events into an incident's notes.
    async fn add_issue_events(&self, incident_id: &str, events: &[IssueEvent]) -> Result<()>;
}

/// The room maintenance directory.
///
/// Read/annotate only; maintenance state is never consulted to suppress
/// alert creation.
#[async_trait]
pub trait MaintenanceStore: Send + Sync {
    /// Returns every room with a currently enabled maintenance window.
    async fn rooms_in_maintenance(&self) -> Result<HashMap<String, MaintenanceInfo>>;

    /// Returns a room's maintenance window, enabled or not.
    async fn room_maintenance_info(&self, room_id: &str) -> Result<MaintenanceInfo>;

    /// Sets a room's maintenance window.
    async fn set_maintenance_info(&self, info: MaintenanceInfo) -> Result<()>;
}
