//! The Smee alert manager.
//!
//! This crate turns raw device telemetry into room-level issues:
//!
//! - The **matcher** runs two loops over a shared telemetry
//!   subscription, testing create predicates against every event and
//!   close predicates against the active alerts.
//! - The **reconciliation loop** periodically diffs polled device state
//!   against the active alerts and corrects any drift the event stream
//!   missed.
//! - The **action queue** totally orders every resulting create/close
//!   intent through a single consumer, which is the only writer to the
//!   issue store.
//! - The **manager** ([`AlertManager`]) wires these together and
//!   supervises them as one task group: the first failure cancels the
//!   rest.
//!
//! # Example
//!
//! ```rust,ignore
//! use smee_alerts::AlertManager;
//! use smee_core::RuleTable;
//! use tokio_util::sync::CancellationToken;
//!
//! let manager = AlertManager::new(store, streamer, state_store, RuleTable::standard()?);
//! manager.run(CancellationToken::new()).await?;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

mod actions;
mod events;
mod manager;
mod reconcile;

pub use manager::{AlertManager, AlertManagerConfig};
