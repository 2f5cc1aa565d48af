//! Notification backends.
//!
//! Every backend is an independent [`SinkAdapter`]. A sink owns its config and
//! failure handling; it never holds state across builds.

pub mod http_json;
pub mod metrics_db;
pub mod source_control;
pub mod udp_metrics;

pub use http_json::{HttpJsonSink, JobPayload};
pub use metrics_db::MetricsSink;
pub use source_control::{commit_status_for, CommitState, SourceControlSink};
pub use udp_metrics::{BucketPaths, UdpMetricsSink};

use crate::error::Result;
use crate::state::{BuildInfo, JobFinalResult, StageRecord};

pub trait SinkAdapter: Send + Sync {
    /// Backend name used in logs.
    fn name(&self) -> &str;

    /// Checked once, when the sink is attached to a session.
    fn enabled(&self) -> bool;

    /// Whether errors raised outside any stage should be forwarded.
    fn wants_out_of_stage_errors(&self) -> bool {
        false
    }

    fn on_stage_event(&self, build: &BuildInfo, stage: &StageRecord) -> Result<()>;

    fn on_job_final(
        &self,
        build: &BuildInfo,
        result: &JobFinalResult,
        stages: &[StageRecord],
    ) -> Result<()>;
}

/// Non-empty `preferred`, otherwise `fallback`.
pub(crate) fn or_build<'a>(preferred: &'a str, fallback: &'a str) -> &'a str {
    if preferred.is_empty() {
        fallback
    } else {
        preferred
    }
}
