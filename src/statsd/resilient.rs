//! Hot-swappable UDP metrics client.
//!
//! A background thread rebuilds the client every TTL so collector DNS changes
//! are picked up. Emitters hold the read lock for the duration of a call; the
//! refresher takes the write lock only to stop the old client and install the
//! new one, so a reader never sees a stopped client.

use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};

use super::client::{MetricsClient, StatsdClient};
use crate::error::{NotifyError, Result};
use crate::log_client_swap;

/// Builds a fresh client bound to whatever the collector currently resolves to.
pub type ClientFactory = Arc<dyn Fn() -> Result<Box<dyn MetricsClient>> + Send + Sync>;

struct Shared {
    label: String,
    factory: ClientFactory,
    current: RwLock<Option<Box<dyn MetricsClient>>>,
}

impl Shared {
    fn refresh(&self) -> bool {
        let fresh = match (self.factory)() {
            Ok(client) => client,
            Err(e) => {
                tracing::warn!(
                    target_addr = %self.label,
                    error = %e,
                    "UDP metrics client refresh failed, keeping previous client"
                );
                return false;
            }
        };

        let mut slot = self.current.write();
        match slot.take() {
            Some(old) => {
                old.stop();
                *slot = Some(fresh);
                log_client_swap!(self.label);
                true
            }
            None => {
                // Closed while the new client was being built.
                fresh.stop();
                false
            }
        }
    }

    fn with_client<T>(&self, f: impl FnOnce(&dyn MetricsClient) -> Result<T>) -> Result<T> {
        let guard = self.current.read();
        match guard.as_deref() {
            Some(client) => f(client),
            None => Err(NotifyError::transport("statsd", "client closed")),
        }
    }
}

struct Refresher {
    shutdown: Sender<()>,
    handle: JoinHandle<()>,
}

pub struct ResilientSinkClient {
    shared: Arc<Shared>,
    refresher: Mutex<Option<Refresher>>,
}

impl ResilientSinkClient {
    /// Build the first client and start the refresher.
    ///
    /// Failing to build the first client is the one fatal path: the caller
    /// gets the error and should treat the sink as disabled.
    pub fn new(label: &str, factory: ClientFactory, ttl: Duration) -> Result<Self> {
        let first = factory()?;
        let shared = Arc::new(Shared {
            label: label.to_string(),
            factory,
            current: RwLock::new(Some(first)),
        });

        let (shutdown, signal) = mpsc::channel::<()>();
        let worker = Arc::clone(&shared);
        let handle = thread::Builder::new()
            .name("stagecast-udp-refresh".to_string())
            .spawn(move || loop {
                match signal.recv_timeout(ttl) {
                    Err(RecvTimeoutError::Timeout) => {
                        worker.refresh();
                    }
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            })
            .map_err(|e| NotifyError::Other(e.into()))?;

        Ok(Self {
            shared,
            refresher: Mutex::new(Some(Refresher { shutdown, handle })),
        })
    }

    /// StatsD-backed client re-resolving `host:port` on every refresh.
    pub fn statsd(host: &str, port: u16, max_packet_bytes: usize, ttl: Duration) -> Result<Self> {
        let target_host = host.to_string();
        let factory: ClientFactory = Arc::new(move || {
            let client = StatsdClient::connect(&target_host, port, max_packet_bytes)?;
            Ok(Box::new(client) as Box<dyn MetricsClient>)
        });
        Self::new(&format!("{}:{}", host, port), factory, ttl)
    }

    pub fn enabled(&self) -> bool {
        self.shared.current.read().is_some()
    }

    pub fn increment(&self, bucket: &str, delta: i64) -> Result<()> {
        self.shared.with_client(|c| c.increment(bucket, delta))
    }

    pub fn timing(&self, bucket: &str, millis: u64) -> Result<()> {
        self.shared.with_client(|c| c.timing(bucket, millis))
    }

    pub fn flush(&self) -> Result<()> {
        self.shared.with_client(|c| c.flush())
    }

    /// Rebuild the client now instead of waiting for the TTL.
    ///
    /// Returns whether a new client was installed.
    pub fn refresh(&self) -> bool {
        self.shared.refresh()
    }

    /// Stop the refresher and the current client. Idempotent.
    pub fn close(&self) {
        if let Some(refresher) = self.refresher.lock().take() {
            let _ = refresher.shutdown.send(());
            if refresher.handle.join().is_err() {
                tracing::warn!(target_addr = %self.shared.label, "UDP refresher thread panicked");
            }
        }
        if let Some(client) = self.shared.current.write().take() {
            client.stop();
        }
    }
}

impl Drop for ResilientSinkClient {
    fn drop(&mut self) {
        self.close();
    }
}
