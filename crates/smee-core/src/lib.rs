//! Shared domain types and collaborator contracts for Smee.
//!
//! `smee-core` is the foundation of the alert-management workspace. It
//! provides:
//!
//! - **Domain types**: [`DeviceRef`], [`Event`], [`Alert`], [`Issue`],
//!   [`IssueEvent`], [`Incident`], [`MaintenanceInfo`]
//! - **Alert rules**: [`RuleTable`] mapping alert types to
//!   [`TransitionPredicate`] pairs, evaluated as pure data
//! - **Collaborator contracts**: the traits through which the core reaches
//!   the telemetry bus, the device-state snapshot service, issue/alert
//!   persistence, the ticketing system, and the maintenance directory
//! - **Errors**: the workspace-wide [`Error`] taxonomy
//!
//! # Example
//!
//! ```rust
//! use smee_core::{Event, RuleTable};
//!
//! let table = RuleTable::standard().unwrap();
//! let event = Event {
//!     room_id: "ITB-1101".to_string(),
//!     device_id: "ITB-1101-D1".to_string(),
//!     key: "responsive".to_string(),
//!     value: "Timeout".to_string(),
//! };
//!
//! let rule = table.get("device-comm").unwrap();
//! assert!(rule.create.matches_event(&event));
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod error;
pub mod rules;
pub mod stores;
pub mod types;

// Re-export main types at crate root
pub use error::{Error, Result};
pub use rules::{AlertRule, RuleTable, TransitionPredicate};
pub use stores::{
    DeviceStateStore, EventStream, EventStreamer, IncidentStore, IssueStore, MaintenanceStore,
};
pub use types::{
    Alert, DeviceRef, Event, Incident, Issue, IssueEvent, IssueEventData, IssueEventType,
    MaintenanceInfo, Room, SystemMessage,
};
