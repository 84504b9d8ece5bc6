//! Telemetry stream multiplexing for Smee.
//!
//! The telemetry bus exposes a single-consumer stream, but several
//! components inside the alert manager each need their own ordered view
//! of every event. [`StreamMultiplexer`] shares one upstream connection
//! among any number of logical subscriptions:
//!
//! - The first subscription lazily opens the upstream connection and
//!   starts a forwarding task.
//! - Every subscriber gets an independent bounded buffer; the forwarder
//!   fans events out with non-blocking sends, so a slow consumer misses
//!   events instead of stalling the others.
//! - When the last subscriber closes, the upstream connection is closed
//!   and the next subscription reopens it.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use smee_core::EventStreamer;
//! use smee_stream::StreamMultiplexer;
//!
//! let mux = StreamMultiplexer::new(upstream);
//! let create_feed = mux.stream().await?;
//! let close_feed = mux.stream().await?;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod multiplexer;

pub use multiplexer::{MultiplexerConfig, StreamMultiplexer};
