//! Composition root: builds sinks from configuration and opens build sessions.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};

use crate::config::NotifierConfig;
use crate::error::Result;
use crate::sinks::{HttpJsonSink, MetricsSink, SinkAdapter, SourceControlSink, UdpMetricsSink};
use crate::state::{BuildInfo, RepoRef};
use crate::statsd::ResilientSinkClient;
use crate::tracker::BuildStatusSession;
use crate::transport::{HttpTransport, ReqwestTransport};

pub struct NotifierHub {
    config: NotifierConfig,
    /// Overrides the per-sink reqwest transports when set.
    transport: Option<Arc<dyn HttpTransport>>,
    /// Reqwest transports built so far, indexed by `verify_ssl`.
    transports: Mutex<[Option<Arc<dyn HttpTransport>>; 2]>,
    /// One collector connection shared by every build.
    udp_client: RwLock<Option<Arc<ResilientSinkClient>>>,
}

impl NotifierHub {
    pub fn new(config: NotifierConfig) -> Self {
        Self {
            config,
            transport: None,
            transports: Mutex::new([None, None]),
            udp_client: RwLock::new(None),
        }
    }

    /// Route every HTTP sink through `transport`.
    pub fn with_transport(config: NotifierConfig, transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            config,
            transport: Some(transport),
            transports: Mutex::new([None, None]),
            udp_client: RwLock::new(None),
        }
    }

    pub fn config(&self) -> &NotifierConfig {
        &self.config
    }

    /// One transport per SSL policy, built on first use and shared by every session.
    fn http_transport(&self, verify_ssl: bool) -> Result<Arc<dyn HttpTransport>> {
        if let Some(t) = &self.transport {
            return Ok(Arc::clone(t));
        }
        let mut transports = self.transports.lock();
        let slot = &mut transports[usize::from(verify_ssl)];
        if let Some(t) = slot.as_ref() {
            return Ok(Arc::clone(t));
        }
        let transport: Arc<dyn HttpTransport> = Arc::new(ReqwestTransport::new(verify_ssl)?);
        *slot = Some(Arc::clone(&transport));
        Ok(transport)
    }

    /// Shared UDP client, created on first use.
    ///
    /// Returns `None` when no collector is configured or the first client
    /// could not be built; a later call tries again.
    pub fn udp_client(&self) -> Option<Arc<ResilientSinkClient>> {
        if let Some(client) = self.udp_client.read().as_ref() {
            return Some(Arc::clone(client));
        }

        let mut slot = self.udp_client.write();
        if let Some(client) = slot.as_ref() {
            return Some(Arc::clone(client));
        }

        let statsd = &self.config.statsd;
        if statsd.host.is_empty() {
            return None;
        }
        match ResilientSinkClient::statsd(
            &statsd.host,
            statsd.port,
            statsd.max_packet_bytes,
            Duration::from_secs(statsd.ttl_secs.max(1)),
        ) {
            Ok(client) => {
                let client = Arc::new(client);
                *slot = Some(Arc::clone(&client));
                tracing::info!(host = %statsd.host, port = statsd.port, "UDP metrics client started");
                Some(client)
            }
            Err(e) => {
                tracing::warn!(host = %statsd.host, port = statsd.port, error = %e, "UDP metrics disabled");
                None
            }
        }
    }

    /// One instance of every configured sink for a build.
    ///
    /// Unconfigured HTTP sinks are skipped before any transport is built.
    /// Sinks whose transport cannot be built are left out with a warning.
    pub fn build_sinks(&self, repo: Option<RepoRef>) -> Vec<Arc<dyn SinkAdapter>> {
        let mut sinks: Vec<Arc<dyn SinkAdapter>> = Vec::new();
        let influxdb = &self.config.influxdb;

        if self.config.github.enabled && repo.is_some() {
            match self.http_transport(true) {
                Ok(t) => sinks.push(Arc::new(SourceControlSink::new(&self.config.github, repo, t))),
                Err(e) => tracing::warn!(sink = "github", error = %e, "Sink unavailable"),
            }
        }

        if !influxdb.url.is_empty() && !influxdb.database.is_empty() {
            match self.http_transport(influxdb.verify_ssl) {
                Ok(t) => sinks.push(Arc::new(MetricsSink::new(influxdb, t))),
                Err(e) => tracing::warn!(sink = "influxdb", error = %e, "Sink unavailable"),
            }
        }

        if !self.config.http.url.is_empty() {
            match self.http_transport(self.config.http.verify_ssl) {
                Ok(t) => sinks.push(Arc::new(HttpJsonSink::new(&self.config.http, t))),
                Err(e) => tracing::warn!(sink = "http", error = %e, "Sink unavailable"),
            }
        }

        sinks.push(Arc::new(UdpMetricsSink::new(
            self.udp_client(),
            &self.config.statsd.prefix,
        )));

        sinks
    }

    /// New session with every enabled configured sink attached.
    pub fn open_session(&self, build: BuildInfo, repo: Option<RepoRef>) -> Arc<BuildStatusSession> {
        let session = Arc::new(BuildStatusSession::new(build));
        for sink in self.build_sinks(repo) {
            session.attach_sink(sink);
        }
        tracing::debug!(
            job = %session.build().job_name,
            sinks = session.sink_count(),
            "Build session opened"
        );
        session
    }

    /// Stop the shared UDP client.
    pub fn shutdown(&self) {
        if let Some(client) = self.udp_client.write().take() {
            client.close();
        }
    }
}

impl Drop for NotifierHub {
    fn drop(&mut self) {
        self.shutdown();
    }
}
