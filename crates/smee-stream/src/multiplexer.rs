//! One upstream telemetry connection fanned out to many subscribers.
//!
//! The telemetry bus only supports a single consumer per connection, but
//! the matcher's create and close loops each need their own ordered view
//! of every event. [`StreamMultiplexer`] opens one upstream connection on
//! the first subscription, forwards every event to each registered
//! subscriber, and closes the connection again once the last subscriber
//! goes away.
//!
//! Delivery is best effort by design: each subscriber gets a bounded
//! buffer and the forwarder never blocks on a full one, so a slow
//! consumer misses events rather than stalling the others.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use smee_core::error::{Error, Result};
use smee_core::stores::{EventStream, EventStreamer};
use smee_core::types::Event;

/// Configuration for the multiplexer.
#[derive(Debug, Clone)]
pub struct MultiplexerConfig {
    /// Per-subscriber event buffer capacity.
    pub subscriber_buffer: usize,
    /// Bound on a single upstream read. The forwarder gives up on the
    /// upstream connection when no event arrives within this window.
    pub read_timeout: Duration,
}

impl Default for MultiplexerConfig {
    fn default() -> Self {
        Self {
            subscriber_buffer: 512,
            read_timeout: Duration::from_secs(60),
        }
    }
}

#[derive(Default)]
struct MuxState {
    streaming: bool,
    next_id: u64,
    subscribers: HashMap<u64, mpsc::Sender<Event>>,
}

/// Turns one physical telemetry connection into N independent,
/// order-preserving logical subscriptions.
///
/// Implements [`EventStreamer`] itself, so consumers cannot tell a
/// multiplexed subscription from a direct one.
pub struct StreamMultiplexer {
    inner: Arc<dyn EventStreamer>,
    config: MultiplexerConfig,
    state: Arc<Mutex<MuxState>>,
}

impl StreamMultiplexer {
    /// Creates a multiplexer over an upstream streamer with default
    /// configuration.
    #[must_use]
    pub fn new(inner: Arc<dyn EventStreamer>) -> Self {
        Self::with_config(inner, MultiplexerConfig::default())
    }

    /// Creates a multiplexer with custom configuration.
    #[must_use]
    pub fn with_config(inner: Arc<dyn EventStreamer>, config: MultiplexerConfig) -> Self {
        Self {
            inner,
            config,
            state: Arc::new(Mutex::new(MuxState::default())),
        }
    }

    /// Returns the number of registered subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.state.lock().subscribers.len()
    }

    /// Returns true while an upstream connection is open.
    #[must_use]
    pub fn is_streaming(&self) -> bool {
        self.state.lock().streaming
    }
}

#[async_trait]
impl EventStreamer for StreamMultiplexer {
    async fn stream(&self) -> Result<Box<dyn EventStream>> {
        let (tx, rx) = mpsc::channel(self.config.subscriber_buffer);

        let (id, open_upstream) = {
            let mut state = self.state.lock();
            let id = state.next_id;
            state.next_id += 1;
            state.subscribers.insert(id, tx);

            let open = !state.streaming;
            if open {
                // claim the forwarder slot before awaiting the upstream
                // open, so concurrent subscribers don't open a second
                // connection
                state.streaming = true;
            }
            (id, open)
        };

        if open_upstream {
            match self.inner.stream().await {
                Ok(upstream) => {
                    debug!("opened upstream event stream");
                    let state = Arc::clone(&self.state);
                    let read_timeout = self.config.read_timeout;
                    tokio::spawn(forward(upstream, state, read_timeout));
                }
                Err(e) => {
                    let mut state = self.state.lock();
                    state.subscribers.remove(&id);
                    state.streaming = false;
                    return Err(e);
                }
            }
        }

        Ok(Box::new(MultiplexedStream {
            id,
            rx,
            state: Arc::clone(&self.state),
        }))
    }
}

/// Reads the upstream connection and fans each event out to every
/// registered subscriber.
///
/// Exits when the upstream fails, a read times out, or the subscriber set
/// becomes empty. On exit the remaining subscriber channels are dropped so
/// their consumers observe end-of-stream instead of blocking forever.
async fn forward(
    mut upstream: Box<dyn EventStream>,
    state: Arc<Mutex<MuxState>>,
    read_timeout: Duration,
) {
    loop {
        let event = match tokio::time::timeout(read_timeout, upstream.next()).await {
            Ok(Ok(event)) => event,
            Ok(Err(e)) => {
                warn!(error = %e, "upstream event stream ended");
                break;
            }
            Err(_) => {
                warn!(timeout = ?read_timeout, "upstream read timed out");
                break;
            }
        };

        let empty = {
            let state = state.lock();
            for sub in state.subscribers.values() {
                // non-blocking: a full buffer means the subscriber misses
                // this event
                let _ = sub.try_send(event.clone());
            }
            state.subscribers.is_empty()
        };

        if empty {
            info!("no subscribers left, closing upstream stream");
            break;
        }
    }

    if let Err(e) = upstream.close().await {
        debug!(error = %e, "error closing upstream stream");
    }

    let mut state = state.lock();
    state.subscribers.clear();
    state.streaming = false;
}

/// One logical subscription handed out by [`StreamMultiplexer`].
struct MultiplexedStream {
    id: u64,
    rx: mpsc::Receiver<Event>,
    state: Arc<Mutex<MuxState>>,
}

impl MultiplexedStream {
    fn unregister(&self) {
        self.state.lock().subscribers.remove(&self.id);
    }
}

#[async_trait]
impl EventStream for MultiplexedStream {
    async fn next(&mut self) -> Result<Event> {
        self.rx.recv().await.ok_or_else(|| Error::Stream {
            reason: "subscription closed".to_string(),
        })
    }

    async fn close(&mut self) -> Result<()> {
        self.unregister();
        self.rx.close();
        Ok(())
    }
}

impl Drop for MultiplexedStream {
    fn drop(&mut self) {
        self.unregister();
    }
}
