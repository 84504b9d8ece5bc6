//! Core domain types for the alerting system.
//!
//! This module provides the types shared by every Smee component:
//! - [`DeviceRef`]: a physical endpoint inside a room
//! - [`Event`]: one observed telemetry change
//! - [`Alert`]: a single fault condition on one device
//! - [`Issue`]: the room-scoped aggregate of concurrently active alerts
//! - [`IssueEvent`]: an append-only audit entry on an issue
//! - [`Incident`]: a reference to an external trouble ticket
//! - [`MaintenanceInfo`]: a room's maintenance window

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A room in the facility.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Room {
    /// Unique identifier for the room.
    pub id: String,
}

impl Room {
    /// Creates a room reference from an ID.
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

impl std::fmt::Display for Room {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.id)
    }
}

/// A physical endpoint in a room. Equality is by value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceRef {
    /// Unique identifier for the device.
    pub id: String,
    /// The room the device lives in.
    pub room: Room,
}

impl DeviceRef {
    /// Creates a device reference from a room ID and device ID.
    pub fn new(room_id: impl Into<String>, device_id: impl Into<String>) -> Self {
        Self {
            id: device_id.into(),
            room: Room::new(room_id),
        }
    }
}

impl std::fmt::Display for DeviceRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.room.id, self.id)
    }
}

/// One observed telemetry change.
///
/// Ordering is whatever the upstream source provides; there are no
/// sequence numbers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// The room the event originated in.
    pub room_id: String,
    /// The device the event originated from.
    pub device_id: String,
    /// The attribute that changed.
    pub key: String,
    /// The new attribute value.
    pub value: String,
}

impl Event {
    /// Returns the device this event originated from.
    #[must_use]
    pub fn device(&self) -> DeviceRef {
        DeviceRef::new(self.room_id.clone(), self.device_id.clone())
    }
}

/// A single fault/recovery condition tied to one device and one named type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    /// Unique identifier for this alert.
    pub id: String,
    /// The issue this alert is bound to.
    pub issue_id: String,
    /// The device this alert fired on.
    pub device: DeviceRef,
    /// The alert type name, keying into the rule table.
    pub alert_type: String,
    /// When the alert started.
    pub start: DateTime<Utc>,
    /// When the alert ended. Unset while the alert is active.
    pub end: Option<DateTime<Utc>>,
}

impl Alert {
    /// Returns true while the alert has not been closed.
    #[must_use]
    pub const fn active(&self) -> bool {
        self.end.is_none()
    }
}

/// The room-scoped aggregate of concurrently active alerts; the unit
/// surfaced to operators.
///
/// An issue is active iff it contains at least one active alert, and at
/// most one active issue exists per room at any instant. Both invariants
/// are enforced by the issue store, never by callers mutating fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    /// Unique identifier for this issue.
    pub id: String,
    /// The room this issue is associated with.
    pub room: Room,
    /// When this issue was created.
    pub start: DateTime<Utc>,
    /// When this issue was resolved. Unset while the issue is active.
    pub end: Option<DateTime<Utc>>,
    /// Map of alert ID to alert.
    pub alerts: HashMap<String, Alert>,
    /// Map of incident ID to linked incident.
    pub incidents: HashMap<String, Incident>,
    /// Time-ordered audit entries for this issue.
    pub events: Vec<IssueEvent>,
    /// Who acknowledged the issue, if anyone.
    pub acknowledged_by: Option<String>,
    /// When the issue was acknowledged.
    pub acknowledged_at: Option<DateTime<Utc>>,
    /// Caller-assigned status; vocabulary belongs to the external
    /// ticketing system.
    pub status: Option<String>,
}

impl Issue {
    /// Returns true while the issue has not been closed.
    #[must_use]
    pub const fn active(&self) -> bool {
        self.end.is_none()
    }

    /// Returns true if any alert on this issue is still active.
    #[must_use]
    pub fn has_active_alerts(&self) -> bool {
        self.alerts.values().any(Alert::active)
    }

    /// Returns the active alerts on this issue.
    #[must_use]
    pub fn active_alerts(&self) -> Vec<&Alert> {
        self.alerts.values().filter(|a| a.active()).collect()
    }
}

/// The type tag of an [`IssueEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IssueEventType {
    /// A human-readable narration of an alert transition, mirrored to any
    /// linked incident's notes.
    SystemMessage,
}

/// A human-readable narration payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemMessage {
    /// The message text.
    #[serde(rename = "msg")]
    pub message: String,
}

/// An append-only audit entry on an issue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssueEvent {
    /// When the event happened.
    pub timestamp: DateTime<Utc>,
    /// The payload type tag.
    #[serde(rename = "type")]
    pub event_type: IssueEventType,
    /// The payload, shaped by `event_type`.
    pub data: serde_json::Value,
}

/// A parsed [`IssueEvent`] payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IssueEventData {
    /// A system-message narration.
    SystemMessage(SystemMessage),
}

impl IssueEvent {
    /// Creates a system-message event stamped with the current time.
    #[must_use]
    pub fn system_message(message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            event_type: IssueEventType::SystemMessage,
            data: serde_json::json!({ "msg": message.into() }),
        }
    }

    /// Parses the payload according to the event type.
    ///
    /// # Errors
    ///
    /// Returns a serialization error if the payload does not match the
    /// declared type.
    pub fn parse_data(&self) -> Result<IssueEventData> {
        match self.event_type {
            IssueEventType::SystemMessage => {
                let msg: SystemMessage = serde_json::from_value(self.data.clone())
                    .map_err(|e| Error::Serialization(format!("invalid system message: {e}")))?;
                Ok(IssueEventData::SystemMessage(msg))
            }
        }
    }
}

/// An external trouble-ticket reference.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Incident {
    /// Unique identifier in the ticketing system.
    pub id: String,
    /// Human-facing ticket number.
    pub name: String,
    /// Who reported the incident.
    pub caller: String,
    /// Short description of the incident.
    pub short_description: String,
}

/// A room's maintenance window.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MaintenanceInfo {
    /// The room under maintenance.
    pub room_id: String,
    /// When the window opens.
    pub start: Option<DateTime<Utc>>,
    /// When the window closes.
    pub end: Option<DateTime<Utc>>,
}

impl MaintenanceInfo {
    /// Returns true iff both bounds are set and now falls inside
    /// `[start, end)`.
    #[must_use]
    pub fn enabled(&self) -> bool {
        match (self.start, self.end) {
            (Some(start), Some(end)) => {
                let now = Utc::now();
                now >= start && now < end
            }
            _ => false,
        }
    }
}
