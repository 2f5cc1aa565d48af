//! Posts the final build summary as JSON to a generic HTTP endpoint.

use std::sync::Arc;

use serde::Serialize;

use super::{or_build, SinkAdapter};
use crate::config::HttpJsonConfig;
use crate::error::{NotifyError, Result};
use crate::state::{BuildInfo, BuildState, CoverageSummary, JobFinalResult, StageRecord, TestSummary};
use crate::transport::{basic_auth_header, HttpRequest, HttpTransport};

/// Wire shape of the JSON notification.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobPayload<'a> {
    pub repo_owner: &'a str,
    pub repo_name: &'a str,
    pub job_name: &'a str,
    pub branch: &'a str,
    pub build_url: &'a str,
    pub build_number: i64,
    pub trigger: &'a str,
    pub blocked: bool,
    pub blocked_time: u64,
    pub duration: u64,
    pub passed: bool,
    pub result: BuildState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub test_result: Option<&'a TestSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coverage: Option<&'a CoverageSummary>,
    pub stages: &'a [StageRecord],
    pub timestamp: i64,
}

impl<'a> JobPayload<'a> {
    pub fn new(build: &'a BuildInfo, result: &'a JobFinalResult, stages: &'a [StageRecord]) -> Self {
        Self {
            repo_owner: &build.repo_owner,
            repo_name: &build.repo_name,
            job_name: &build.job_name,
            branch: &build.branch,
            build_url: or_build(&result.build_url, &build.build_url),
            build_number: if result.build_number != 0 {
                result.build_number
            } else {
                build.build_number
            },
            trigger: or_build(&result.trigger, &build.trigger),
            blocked: result.blocked(),
            blocked_time: result.blocked_duration_millis,
            duration: result.duration_millis,
            passed: result.passed(),
            result: result.state,
            test_result: result.test_summary.as_ref(),
            coverage: result.coverage.as_ref(),
            stages,
            timestamp: result.timestamp,
        }
    }
}

pub struct HttpJsonSink {
    url: String,
    auth: Option<String>,
    referer: String,
    transport: Arc<dyn HttpTransport>,
}

impl HttpJsonSink {
    /// The SSL policy lives in the transport handed in here.
    pub fn new(config: &HttpJsonConfig, transport: Arc<dyn HttpTransport>) -> Self {
        let auth = if config.user.is_empty() {
            None
        } else {
            Some(basic_auth_header(&config.user, &config.password))
        };
        Self {
            url: config.url.clone(),
            auth,
            referer: config.referer.clone(),
            transport,
        }
    }
}

impl SinkAdapter for HttpJsonSink {
    fn name(&self) -> &str {
        "http"
    }

    fn enabled(&self) -> bool {
        !self.url.is_empty()
    }

    fn on_stage_event(&self, _build: &BuildInfo, _stage: &StageRecord) -> Result<()> {
        Ok(())
    }

    fn on_job_final(
        &self,
        build: &BuildInfo,
        result: &JobFinalResult,
        stages: &[StageRecord],
    ) -> Result<()> {
        if self.url.is_empty() {
            return Ok(());
        }
        let payload = JobPayload::new(build, result, stages);
        let body = serde_json::to_vec(&payload)
            .map_err(|e| NotifyError::Encoding(format!("JSON payload: {}", e)))?;

        let mut request = HttpRequest::post(self.name(), self.url.as_str())
            .header("Content-Type", "application/json")
            .header("Referer", self.referer.as_str())
            .body(body);
        if let Some(auth) = &self.auth {
            request = request.header("Authorization", auth.clone());
        }

        self.transport
            .post(&request)?
            .error_for_status(self.name())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::JobCompletion;

    #[test]
    fn test_payload_shape() {
        let build = BuildInfo {
            job_name: "service".to_string(),
            repo_owner: "acme".to_string(),
            repo_name: "service".to_string(),
            branch: "main".to_string(),
            build_url: "https://ci/job/service/7".to_string(),
            build_number: 7,
            ..BuildInfo::default()
        };
        let mut params = JobCompletion::new(BuildState::CompletedError, 9_000);
        params.blocked_duration_millis = 1_000;
        params.trigger = "push".to_string();
        let result = JobFinalResult::from_completion(params);
        let stages = vec![StageRecord::new("Test", BuildState::CompletedError, 400)];

        let json = serde_json::to_value(JobPayload::new(&build, &result, &stages)).unwrap();
        assert_eq!(json["repoOwner"], "acme");
        assert_eq!(json["buildNumber"], 7);
        assert_eq!(json["buildUrl"], "https://ci/job/service/7");
        assert_eq!(json["trigger"], "push");
        assert_eq!(json["blocked"], true);
        assert_eq!(json["blockedTime"], 1_000);
        assert_eq!(json["duration"], 8_000);
        assert_eq!(json["passed"], false);
        assert_eq!(json["result"], "CompletedError");
        assert_eq!(json["stages"][0]["stageName"], "Test");
        assert!(json.get("testResult").is_none());
        assert!(json.get("coverage").is_none());
        assert!(json["timestamp"].as_i64().unwrap() > 0);
    }
}
