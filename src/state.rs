//! Build, stage and job records shared by the tracker and every sink.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::constants::ENV_DURATION_KEY;

/// State lattice shared by stages and jobs.
///
/// `Pending` moves once to any other variant; every non-pending variant is
/// terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BuildState {
    Pending,
    SkippedConditional,
    SkippedUnstable,
    SkippedFailure,
    CompletedSuccess,
    CompletedError,
    Unstable,
    NotBuilt,
    Aborted,
}

impl BuildState {
    pub const ALL: [BuildState; 9] = [
        BuildState::Pending,
        BuildState::SkippedConditional,
        BuildState::SkippedUnstable,
        BuildState::SkippedFailure,
        BuildState::CompletedSuccess,
        BuildState::CompletedError,
        BuildState::Unstable,
        BuildState::NotBuilt,
        BuildState::Aborted,
    ];

    /// Skips count as passed; only an errored stage is a failure.
    pub fn passed(self) -> bool {
        self != BuildState::CompletedError
    }

    pub fn is_terminal(self) -> bool {
        self != BuildState::Pending
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BuildState::Pending => "Pending",
            BuildState::SkippedConditional => "SkippedConditional",
            BuildState::SkippedUnstable => "SkippedUnstable",
            BuildState::SkippedFailure => "SkippedFailure",
            BuildState::CompletedSuccess => "CompletedSuccess",
            BuildState::CompletedError => "CompletedError",
            BuildState::Unstable => "Unstable",
            BuildState::NotBuilt => "NotBuilt",
            BuildState::Aborted => "Aborted",
        }
    }

    /// Lowercase form used in metric bucket paths.
    pub fn as_snake(self) -> &'static str {
        match self {
            BuildState::Pending => "pending",
            BuildState::SkippedConditional => "skipped_conditional",
            BuildState::SkippedUnstable => "skipped_unstable",
            BuildState::SkippedFailure => "skipped_failure",
            BuildState::CompletedSuccess => "completed_success",
            BuildState::CompletedError => "completed_error",
            BuildState::Unstable => "unstable",
            BuildState::NotBuilt => "not_built",
            BuildState::Aborted => "aborted",
        }
    }
}

impl std::fmt::Display for BuildState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of the build a session reports on.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildInfo {
    pub job_name: String,
    pub target_url: String,
    pub repo_owner: String,
    pub repo_name: String,
    pub branch: String,
    pub build_url: String,
    pub build_number: i64,
    /// Cause of the build, when known up front.
    pub trigger: String,
}

/// Commit a source-control status is attached to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoRef {
    pub owner: String,
    pub name: String,
    pub sha: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageRecord {
    #[serde(rename = "stageName")]
    pub name: String,
    pub state: BuildState,
    #[serde(rename = "duration")]
    pub duration_millis: u64,
    pub passed: bool,
    /// Producer-supplied bag; only read for duration and annotations.
    #[serde(skip)]
    pub environment: BTreeMap<String, String>,
    pub is_stage: bool,
}

impl StageRecord {
    pub fn new(name: &str, state: BuildState, duration_millis: u64) -> Self {
        Self {
            name: name.to_string(),
            state,
            duration_millis,
            passed: state.passed(),
            environment: BTreeMap::new(),
            is_stage: true,
        }
    }

    /// Synthetic record for an error raised outside any stage.
    pub fn out_of_stage_error(display_name: &str) -> Self {
        Self {
            is_stage: false,
            ..Self::new(display_name, BuildState::CompletedError, 0)
        }
    }

    pub(crate) fn set_state(&mut self, state: BuildState, duration_millis: u64) {
        self.state = state;
        self.passed = state.passed();
        self.duration_millis = duration_millis;
    }
}

/// Pull a stage duration out of a producer environment bag.
///
/// Missing or non-numeric values count as zero.
pub fn duration_from_environment(environment: &BTreeMap<String, String>) -> u64 {
    environment
        .get(ENV_DURATION_KEY)
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(0)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestCase {
    pub name: String,
    pub state: BuildState,
    #[serde(default)]
    pub duration_millis: u64,
}

impl TestCase {
    pub fn passed(&self) -> bool {
        self.state.passed()
    }

    pub fn skipped(&self) -> bool {
        matches!(
            self.state,
            BuildState::SkippedConditional | BuildState::SkippedUnstable | BuildState::SkippedFailure
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestSuite {
    pub name: String,
    #[serde(default)]
    pub duration_millis: u64,
    pub passed: u64,
    pub skipped: u64,
    pub failed: u64,
    #[serde(default)]
    pub cases: Vec<TestCase>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TestSummary {
    pub passed: u64,
    pub skipped: u64,
    pub failed: u64,
    #[serde(default)]
    pub suites: Vec<TestSuite>,
}

/// Coverage percentages, one per dimension.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CoverageSummary {
    pub classes: f64,
    pub conditionals: f64,
    pub files: f64,
    pub lines: f64,
    pub methods: f64,
    pub packages: f64,
}

/// Parameters a producer supplies when a build finishes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct JobCompletion {
    pub state: BuildState,
    /// Wall-clock build time, queue time included.
    pub duration_millis: u64,
    #[serde(default)]
    pub blocked_duration_millis: u64,
    #[serde(default)]
    pub trigger: String,
    #[serde(default)]
    pub build_url: String,
    #[serde(default)]
    pub build_number: i64,
    #[serde(default)]
    pub test_summary: Option<TestSummary>,
    #[serde(default)]
    pub coverage: Option<CoverageSummary>,
}

impl JobCompletion {
    pub fn new(state: BuildState, duration_millis: u64) -> Self {
        Self {
            state,
            duration_millis,
            blocked_duration_millis: 0,
            trigger: String::new(),
            build_url: String::new(),
            build_number: 0,
            test_summary: None,
            coverage: None,
        }
    }
}

/// Immutable summary of a finished build.
#[derive(Debug, Clone, PartialEq)]
pub struct JobFinalResult {
    pub state: BuildState,
    /// Build time with queue time removed.
    pub duration_millis: u64,
    pub blocked_duration_millis: u64,
    pub trigger: String,
    pub build_url: String,
    pub build_number: i64,
    pub test_summary: Option<TestSummary>,
    pub coverage: Option<CoverageSummary>,
    /// Unix seconds at which the result was assembled.
    pub timestamp: i64,
}

impl JobFinalResult {
    pub fn from_completion(params: JobCompletion) -> Self {
        Self {
            state: params.state,
            duration_millis: params
                .duration_millis
                .saturating_sub(params.blocked_duration_millis),
            blocked_duration_millis: params.blocked_duration_millis,
            trigger: params.trigger,
            build_url: params.build_url,
            build_number: params.build_number,
            test_summary: params.test_summary,
            coverage: params.coverage,
            timestamp: chrono::Utc::now().timestamp(),
        }
    }

    pub fn passed(&self) -> bool {
        self.state.passed()
    }

    pub fn blocked(&self) -> bool {
        self.blocked_duration_millis > 0
    }
}
