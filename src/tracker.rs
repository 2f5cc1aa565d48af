//! Per-build stage state plus replay buffer.
//!
//! A [`BuildStatusSession`] is the single coordinator for one build. Stage
//! updates, sink attachment and fan-out all run under one mutex, so a sink
//! attached while stages are still being discovered sees every stage exactly
//! once and in first-seen order.

use std::collections::BTreeMap;
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::Mutex;

use crate::registry::{deliver_stage, DispatchReport, SinkRegistry};
use crate::sinks::SinkAdapter;
use crate::state::{
    duration_from_environment, BuildInfo, BuildState, JobCompletion, JobFinalResult, StageRecord,
};

/// Narrow ingest surface for whatever discovers stages and job completion.
pub trait BuildEventListener: Send + Sync {
    fn on_stage_transition(&self, stage_name: &str, state: BuildState, duration_millis: u64);
    fn on_job_complete(&self, params: JobCompletion);
    fn on_out_of_stage_error(&self, display_name: &str);
}

#[derive(Default)]
struct SessionState {
    stages: IndexMap<String, StageRecord>,
    registry: SinkRegistry,
    closed: bool,
    job_result: Option<JobFinalResult>,
}

pub struct BuildStatusSession {
    build: BuildInfo,
    inner: Mutex<SessionState>,
}

impl BuildStatusSession {
    pub fn new(build: BuildInfo) -> Self {
        Self {
            build,
            inner: Mutex::new(SessionState::default()),
        }
    }

    pub fn build(&self) -> &BuildInfo {
        &self.build
    }

    /// Record a stage transition and broadcast it unless it is `Pending`.
    ///
    /// Pending is only ever seen by sinks through replay on attach.
    pub fn record_stage(&self, name: &str, state: BuildState, duration_millis: u64) -> DispatchReport {
        self.apply_stage(name, state, duration_millis, None)
    }

    /// Like [`record_stage`](Self::record_stage), with the duration read from the
    /// producer's environment bag.
    pub fn record_stage_with_environment(
        &self,
        name: &str,
        state: BuildState,
        environment: BTreeMap<String, String>,
    ) -> DispatchReport {
        let duration = duration_from_environment(&environment);
        self.apply_stage(name, state, duration, Some(environment))
    }

    fn apply_stage(
        &self,
        name: &str,
        state: BuildState,
        duration_millis: u64,
        environment: Option<BTreeMap<String, String>>,
    ) -> DispatchReport {
        let mut guard = self.inner.lock();
        let session = &mut *guard;

        if session.closed && !session.stages.contains_key(name) {
            tracing::debug!(stage = name, "Stage reported after build close");
        }

        let record = session
            .stages
            .entry(name.to_string())
            .or_insert_with(|| StageRecord::new(name, BuildState::Pending, 0));
        if let Some(environment) = environment {
            record.environment.extend(environment);
        }

        if state == BuildState::Pending {
            if record.state.is_terminal() {
                tracing::debug!(
                    stage = name,
                    current = %record.state,
                    "Ignoring pending update for finished stage"
                );
            }
            return DispatchReport::default();
        }

        record.set_state(state, duration_millis);
        let snapshot = record.clone();
        session.registry.dispatch_stage(&self.build, &snapshot)
    }

    /// Attach a sink and replay every buffered stage to it, in first-seen order.
    ///
    /// Disabled sinks and sinks already attached are ignored; returns whether
    /// the sink was attached.
    pub fn attach_sink(&self, sink: Arc<dyn SinkAdapter>) -> bool {
        let mut guard = self.inner.lock();
        let session = &mut *guard;

        if !sink.enabled() {
            tracing::debug!(sink = sink.name(), "Sink disabled, not attaching");
            return false;
        }
        if !session.registry.register(Arc::clone(&sink)) {
            tracing::debug!(sink = sink.name(), "Sink already attached");
            return false;
        }

        for record in session.stages.values() {
            deliver_stage(sink.as_ref(), &self.build, record);
        }
        tracing::debug!(
            sink = sink.name(),
            replayed = session.stages.len(),
            "Sink attached"
        );
        true
    }

    /// Close the build, fan the final result out, then complete stages still pending.
    pub fn record_job_final(&self, params: JobCompletion) -> DispatchReport {
        let mut guard = self.inner.lock();
        let session = &mut *guard;

        if session.job_result.is_some() {
            tracing::warn!(job = %self.build.job_name, "Duplicate job completion ignored");
            return DispatchReport::default();
        }

        let result = JobFinalResult::from_completion(params);
        session.closed = true;

        let stages: Vec<StageRecord> = session.stages.values().cloned().collect();
        let mut report = session
            .registry
            .dispatch_job_final(&self.build, &result, &stages);

        let synthetic = match result.state {
            BuildState::Pending => BuildState::NotBuilt,
            other => other,
        };
        for record in session
            .stages
            .values_mut()
            .filter(|r| r.state == BuildState::Pending)
        {
            record.set_state(synthetic, record.duration_millis);
            report += session.registry.dispatch_stage(&self.build, record);
        }

        tracing::info!(
            job = %self.build.job_name,
            result = %result.state,
            duration_ms = result.duration_millis,
            sinks = session.registry.len(),
            "Build finished"
        );
        session.job_result = Some(result);
        report
    }

    /// Report an error raised outside any stage. Never buffered for replay.
    pub fn record_out_of_stage_error(&self, display_name: &str) -> DispatchReport {
        let guard = self.inner.lock();
        let record = StageRecord::out_of_stage_error(display_name);
        guard.registry.dispatch_out_of_stage(&self.build, &record)
    }

    /// Snapshot of the buffered stages in first-seen order.
    pub fn stages(&self) -> Vec<StageRecord> {
        self.inner.lock().stages.values().cloned().collect()
    }

    pub fn stage(&self, name: &str) -> Option<StageRecord> {
        self.inner.lock().stages.get(name).cloned()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    pub fn job_result(&self) -> Option<JobFinalResult> {
        self.inner.lock().job_result.clone()
    }

    pub fn sink_count(&self) -> usize {
        self.inner.lock().registry.len()
    }
}

impl BuildEventListener for BuildStatusSession {
    fn on_stage_transition(&self, stage_name: &str, state: BuildState, duration_millis: u64) {
        self.record_stage(stage_name, state, duration_millis);
    }

    fn on_job_complete(&self, params: JobCompletion) {
        self.record_job_final(params);
    }

    fn on_out_of_stage_error(&self, display_name: &str) {
        self.record_out_of_stage_error(display_name);
    }
}
