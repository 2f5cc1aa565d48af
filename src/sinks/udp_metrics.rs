//! StatsD counters and timers per stage and per job.

use std::sync::Arc;

use super::SinkAdapter;
use crate::error::Result;
use crate::state::{BuildInfo, BuildState, JobFinalResult, StageRecord};
use crate::statsd::ResilientSinkClient;

/// Replace everything outside `[A-Za-z0-9_-]` so a value stays one path segment.
pub fn sanitize(component: &str) -> String {
    let cleaned: String = component
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "_".to_string()
    } else {
        cleaned
    }
}

/// Bucket names rooted at `<prefix>.<owner>.<repo>.branch.<branch>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketPaths {
    base: String,
}

impl BucketPaths {
    pub fn new(prefix: &str, build: &BuildInfo) -> Self {
        let prefix = prefix.trim_matches('.');
        let base = format!(
            "{}.{}.{}.branch.{}",
            prefix,
            sanitize(&build.repo_owner),
            sanitize(&build.repo_name),
            sanitize(&build.branch)
        );
        Self { base }
    }

    pub fn stage_status(&self, stage: &str, state: BuildState) -> String {
        format!(
            "{}.stage.{}.status.{}",
            self.base,
            sanitize(stage),
            state.as_snake()
        )
    }

    pub fn stage_duration(&self, stage: &str) -> String {
        format!("{}.stage.{}.duration", self.base, sanitize(stage))
    }

    pub fn job_status(&self, state: BuildState) -> String {
        format!("{}.job.status.{}", self.base, state.as_snake())
    }

    pub fn job_duration(&self) -> String {
        format!("{}.job.duration", self.base)
    }

    pub fn job_blocked_duration(&self) -> String {
        format!("{}.job.blocked_duration", self.base)
    }
}

pub struct UdpMetricsSink {
    client: Option<Arc<ResilientSinkClient>>,
    prefix: String,
}

impl UdpMetricsSink {
    /// `client` is `None` when the shared collector client could not be built.
    pub fn new(client: Option<Arc<ResilientSinkClient>>, prefix: &str) -> Self {
        Self {
            client,
            prefix: prefix.to_string(),
        }
    }

    fn emit<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&ResilientSinkClient) -> Result<()>,
    {
        let Some(client) = self.client.as_deref() else {
            return Ok(());
        };
        let emitted = f(client);
        let flushed = client.flush();
        emitted.and(flushed)
    }
}

impl SinkAdapter for UdpMetricsSink {
    fn name(&self) -> &str {
        "statsd"
    }

    fn enabled(&self) -> bool {
        self.client.as_ref().is_some_and(|c| c.enabled())
    }

    fn on_stage_event(&self, build: &BuildInfo, stage: &StageRecord) -> Result<()> {
        if stage.state == BuildState::Pending || !stage.is_stage {
            return Ok(());
        }
        let paths = BucketPaths::new(&self.prefix, build);
        self.emit(|client| {
            client.increment(&paths.stage_status(&stage.name, stage.state), 1)?;
            client.timing(&paths.stage_duration(&stage.name), stage.duration_millis)
        })
    }

    fn on_job_final(
        &self,
        build: &BuildInfo,
        result: &JobFinalResult,
        _stages: &[StageRecord],
    ) -> Result<()> {
        let paths = BucketPaths::new(&self.prefix, build);
        self.emit(|client| {
            client.increment(&paths.job_status(result.state), 1)?;
            client.timing(&paths.job_duration(), result.duration_millis)?;
            client.timing(&paths.job_blocked_duration(), result.blocked_duration_millis)
        })
    }
}
