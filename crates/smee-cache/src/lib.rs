//! Resident issue/alert storage for Smee.
//!
//! This crate owns the canonical issue/alert lifecycle:
//!
//! - [`IssueCache`] keeps exactly the active issues in memory, optionally
//!   write-through to a persistent [`smee_core::IssueStore`] backing, and
//!   enforces the two lifecycle invariants — an issue is active iff it
//!   has at least one active alert, and a room has at most one active
//!   issue.
//! - [`MaintenanceCache`] annotates rooms with maintenance windows for
//!   the read side; it never suppresses alerting.
//!
//! All mutation goes through the [`smee_core::IssueStore`] operations.
//! Mutations hold one write lock for the duration of the update, and
//! backing-store delegation happens under that lock — a deliberate
//! correctness-over-throughput tradeoff that keeps the resident view and
//! the backing from diverging under concurrent writers.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod issues;
pub mod maintenance;
mod search;

pub use issues::IssueCache;
pub use maintenance::MaintenanceCache;
