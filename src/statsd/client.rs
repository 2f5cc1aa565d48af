use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use crate::error::{NotifyError, Result};

/// Minimal metric emitter the resilient wrapper swaps in and out.
pub trait MetricsClient: Send + Sync {
    fn increment(&self, bucket: &str, delta: i64) -> Result<()>;
    fn timing(&self, bucket: &str, millis: u64) -> Result<()>;
    /// Send whatever is queued.
    fn flush(&self) -> Result<()>;
    /// Flush and refuse further writes.
    fn stop(&self);
    fn is_stopped(&self) -> bool;
}

/// StatsD client over a connected UDP socket.
///
/// Lines are queued and packed into datagrams of at most
/// `max_packet_bytes`; a single oversized line still goes out on its own.
pub struct StatsdClient {
    socket: UdpSocket,
    target: SocketAddr,
    max_packet_bytes: usize,
    buffer: Mutex<String>,
    stopped: AtomicBool,
}

impl StatsdClient {
    /// Resolve `host:port` now and bind an ephemeral local socket.
    pub fn connect(host: &str, port: u16, max_packet_bytes: usize) -> Result<Self> {
        let resolution = |reason: String| NotifyError::Resolution {
            host: host.to_string(),
            port,
            reason,
        };

        let target = (host, port)
            .to_socket_addrs()
            .map_err(|e| resolution(e.to_string()))?
            .next()
            .ok_or_else(|| resolution("no addresses returned".to_string()))?;

        let bind_addr = if target.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };
        let socket = UdpSocket::bind(bind_addr).map_err(|e| resolution(e.to_string()))?;
        socket
            .connect(target)
            .map_err(|e| resolution(e.to_string()))?;

        Ok(Self {
            socket,
            target,
            max_packet_bytes: max_packet_bytes.max(1),
            buffer: Mutex::new(String::new()),
            stopped: AtomicBool::new(false),
        })
    }

    pub fn target(&self) -> SocketAddr {
        self.target
    }

    fn push(&self, line: String) -> Result<()> {
        if self.is_stopped() {
            return Err(NotifyError::transport("statsd", "client already stopped"));
        }

        let mut buffer = self.buffer.lock();
        let mut outcome = Ok(());
        if !buffer.is_empty() && buffer.len() + 1 + line.len() > self.max_packet_bytes {
            outcome = self.send(&buffer);
            buffer.clear();
        }
        if !buffer.is_empty() {
            buffer.push('\n');
        }
        buffer.push_str(&line);
        if buffer.len() >= self.max_packet_bytes {
            let sent = self.send(&buffer);
            buffer.clear();
            outcome = outcome.and(sent);
        }
        outcome
    }

    fn send(&self, payload: &str) -> Result<()> {
        self.socket
            .send(payload.as_bytes())
            .map(|_| ())
            .map_err(|e| NotifyError::transport("statsd", e))
    }
}

impl MetricsClient for StatsdClient {
    fn increment(&self, bucket: &str, delta: i64) -> Result<()> {
        self.push(format!("{}:{}|c", bucket, delta))
    }

    fn timing(&self, bucket: &str, millis: u64) -> Result<()> {
        self.push(format!("{}:{}|ms", bucket, millis))
    }

    fn flush(&self) -> Result<()> {
        let mut buffer = self.buffer.lock();
        if buffer.is_empty() {
            return Ok(());
        }
        let sent = self.send(&buffer);
        buffer.clear();
        sent
    }

    fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Err(e) = self.flush() {
            tracing::warn!(target_addr = %self.target, error = %e, "Failed to flush StatsD client on stop");
        }
    }

    fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}
