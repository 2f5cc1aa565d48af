//! Newline-delimited JSON ingest events, as consumed by the `stagecast` binary.

use std::io::BufRead;
use std::sync::Arc;

use anyhow::{anyhow, Context};
use serde::Deserialize;

use crate::error::Result;
use crate::hub::NotifierHub;
use crate::registry::DispatchReport;
use crate::state::{BuildInfo, BuildState, JobCompletion, RepoRef};
use crate::tracker::BuildStatusSession;

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct BuildStart {
    pub job_name: String,
    pub target_url: String,
    pub repo_owner: String,
    pub repo_name: String,
    pub branch: String,
    pub build_url: String,
    pub build_number: i64,
    pub trigger: String,
    /// Commit to attach statuses to; without it no commit status is sent.
    pub commit_sha: Option<String>,
}

impl BuildStart {
    pub fn into_parts(self) -> (BuildInfo, Option<RepoRef>) {
        let repo = self.commit_sha.filter(|sha| !sha.is_empty()).map(|sha| RepoRef {
            owner: self.repo_owner.clone(),
            name: self.repo_name.clone(),
            sha,
        });
        let info = BuildInfo {
            job_name: self.job_name,
            target_url: self.target_url,
            repo_owner: self.repo_owner,
            repo_name: self.repo_name,
            branch: self.branch,
            build_url: self.build_url,
            build_number: self.build_number,
            trigger: self.trigger,
        };
        (info, repo)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IngestEvent {
    Build(BuildStart),
    Stage {
        name: String,
        state: BuildState,
        #[serde(default)]
        duration_millis: u64,
    },
    OutOfStageError {
        name: String,
    },
    JobComplete(JobCompletion),
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReplaySummary {
    pub builds: usize,
    pub events: usize,
    pub delivered: usize,
    pub failed: usize,
}

impl ReplaySummary {
    fn add(&mut self, report: DispatchReport) {
        self.delivered += report.delivered;
        self.failed += report.failed;
    }
}

/// Drive sessions from an event stream. Blank lines and `#` comments are skipped.
///
/// Each `build` event opens a fresh session; other events apply to the most
/// recent one.
pub fn replay<R: BufRead>(hub: &NotifierHub, reader: R) -> Result<ReplaySummary> {
    let mut summary = ReplaySummary::default();
    let mut session: Option<Arc<BuildStatusSession>> = None;

    for (idx, line) in reader.lines().enumerate() {
        let line_no = idx + 1;
        let line = line.with_context(|| format!("reading event line {}", line_no))?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let event: IngestEvent = serde_json::from_str(trimmed)
            .with_context(|| format!("invalid event on line {}", line_no))?;
        summary.events += 1;

        if let IngestEvent::Build(start) = event {
            let (info, repo) = start.into_parts();
            tracing::info!(job = %info.job_name, build = info.build_number, "Build started");
            session = Some(hub.open_session(info, repo));
            summary.builds += 1;
            continue;
        }

        let current = session
            .as_ref()
            .ok_or_else(|| anyhow!("line {}: event before any build event", line_no))?;
        let report = match event {
            IngestEvent::Stage {
                name,
                state,
                duration_millis,
            } => current.record_stage(&name, state, duration_millis),
            IngestEvent::OutOfStageError { name } => current.record_out_of_stage_error(&name),
            IngestEvent::JobComplete(params) => current.record_job_final(params),
            IngestEvent::Build(_) => DispatchReport::default(),
        };
        summary.add(report);
    }

    Ok(summary)
}
