//! Commit statuses on a GitHub-compatible API, one status context per stage.

use std::sync::Arc;

use super::SinkAdapter;
use crate::config::GithubConfig;
use crate::error::Result;
use crate::state::{BuildInfo, BuildState, JobFinalResult, RepoRef, StageRecord};
use crate::transport::{HttpRequest, HttpTransport};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitState {
    Pending,
    Success,
    Failure,
}

impl CommitState {
    pub fn as_str(self) -> &'static str {
        match self {
            CommitState::Pending => "pending",
            CommitState::Success => "success",
            CommitState::Failure => "failure",
        }
    }
}

/// Remote status and description for a stage state.
///
/// Only pending, success and error are expressible; skips, aborts and
/// unstable stages are never sent.
pub fn commit_status_for(state: BuildState) -> Option<(CommitState, &'static str)> {
    match state {
        BuildState::Pending => Some((CommitState::Pending, "Building stage")),
        BuildState::CompletedError => Some((CommitState::Failure, "Failed to build stage")),
        BuildState::CompletedSuccess => Some((CommitState::Success, "Stage built successfully")),
        _ => None,
    }
}

pub struct SourceControlSink {
    api_url: String,
    token: String,
    repo: Option<RepoRef>,
    transport: Arc<dyn HttpTransport>,
}

impl SourceControlSink {
    pub fn new(
        config: &GithubConfig,
        repo: Option<RepoRef>,
        transport: Arc<dyn HttpTransport>,
    ) -> Self {
        Self {
            api_url: config.api_url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
            repo,
            transport,
        }
    }

    fn post_status(
        &self,
        repo: &RepoRef,
        state: CommitState,
        description: &str,
        target_url: &str,
        context: &str,
    ) -> Result<()> {
        let url = format!(
            "{}/repos/{}/{}/statuses/{}",
            self.api_url, repo.owner, repo.name, repo.sha
        );
        let body = serde_json::json!({
            "state": state.as_str(),
            "description": description,
            "target_url": target_url,
            "context": context,
        });

        let mut request = HttpRequest::post(self.name(), url)
            .header("Accept", "application/vnd.github+json")
            .header("Content-Type", "application/json")
            .body(body.to_string());
        if !self.token.is_empty() {
            request = request.header("Authorization", format!("Bearer {}", self.token));
        }

        self.transport
            .post(&request)?
            .error_for_status(self.name())?;
        Ok(())
    }
}

impl SinkAdapter for SourceControlSink {
    fn name(&self) -> &str {
        "github"
    }

    fn enabled(&self) -> bool {
        self.repo.is_some()
    }

    fn wants_out_of_stage_errors(&self) -> bool {
        true
    }

    fn on_stage_event(&self, build: &BuildInfo, stage: &StageRecord) -> Result<()> {
        let Some(repo) = self.repo.as_ref() else {
            return Ok(());
        };
        let Some((state, description)) = commit_status_for(stage.state) else {
            tracing::debug!(
                stage = %stage.name,
                state = %stage.state,
                "No commit status for stage state, skipping"
            );
            return Ok(());
        };
        self.post_status(repo, state, description, &build.target_url, &stage.name)
    }

    fn on_job_final(
        &self,
        _build: &BuildInfo,
        _result: &JobFinalResult,
        _stages: &[StageRecord],
    ) -> Result<()> {
        Ok(())
    }
}
