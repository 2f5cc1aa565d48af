//! Time-series sink writing line protocol to an InfluxDB-compatible `/write` endpoint.

use std::sync::Arc;

use reqwest::Url;

use super::{or_build, SinkAdapter};
use crate::config::InfluxDbConfig;
use crate::error::Result;
use crate::line_protocol::{
    BuildDims, CaseMetric, CoverageMetric, JobMetric, LineEncoder, StageMetric, SuiteMetric,
};
use crate::state::{BuildInfo, BuildState, JobFinalResult, StageRecord};
use crate::transport::{basic_auth_header, HttpRequest, HttpTransport};

pub struct MetricsSink {
    write_url: Option<Url>,
    auth: Option<String>,
    encoder: &'static dyn LineEncoder,
    transport: Arc<dyn HttpTransport>,
}

impl MetricsSink {
    pub fn new(config: &InfluxDbConfig, transport: Arc<dyn HttpTransport>) -> Self {
        let auth = if config.user.is_empty() {
            None
        } else {
            Some(basic_auth_header(&config.user, &config.password))
        };
        Self {
            write_url: write_url(config),
            auth,
            encoder: config.schema.encoder(),
            transport,
        }
    }

    pub fn write_url(&self) -> Option<&str> {
        self.write_url.as_ref().map(|u| u.as_str())
    }

    fn write(&self, lines: &[String]) -> Result<()> {
        let Some(url) = self.write_url.as_ref() else {
            return Ok(());
        };
        let mut request = HttpRequest::post(self.name(), url.as_str())
            .header("Content-Type", "text/plain; charset=utf-8")
            .body(lines.join("\n"));
        if let Some(auth) = &self.auth {
            request = request.header("Authorization", auth.clone());
        }
        self.transport
            .post(&request)?
            .error_for_status(self.name())?;
        Ok(())
    }
}

/// `{url}/write?db=..[&rp=..]`, or `None` when the sink is not configured.
fn write_url(config: &InfluxDbConfig) -> Option<Url> {
    if config.url.is_empty() || config.database.is_empty() {
        return None;
    }
    let mut url = match Url::parse(&format!("{}/write", config.url.trim_end_matches('/'))) {
        Ok(url) => url,
        Err(e) => {
            tracing::warn!(url = %config.url, error = %e, "Invalid InfluxDB URL, sink disabled");
            return None;
        }
    };
    {
        let mut query = url.query_pairs_mut();
        query.append_pair("db", &config.database);
        if !config.retention_policy.is_empty() {
            query.append_pair("rp", &config.retention_policy);
        }
    }
    Some(url)
}

fn flag(value: bool) -> i64 {
    if value {
        1
    } else {
        0
    }
}

fn millis(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

impl SinkAdapter for MetricsSink {
    fn name(&self) -> &str {
        "influxdb"
    }

    fn enabled(&self) -> bool {
        self.write_url.is_some()
    }

    fn on_stage_event(&self, build: &BuildInfo, stage: &StageRecord) -> Result<()> {
        if stage.state == BuildState::Pending || !stage.is_stage {
            return Ok(());
        }
        let line = self.encoder.stage_line(&StageMetric {
            build: BuildDims {
                job_name: &build.job_name,
                owner: &build.repo_owner,
                repo: &build.repo_name,
                branch: &build.branch,
                build_url: &build.build_url,
                build_number: build.build_number,
                trigger: &build.trigger,
            },
            stage_name: &stage.name,
            result: stage.state.as_str(),
            stage_time: millis(stage.duration_millis),
            passed: flag(stage.passed),
        })?;
        self.write(&[line])
    }

    fn on_job_final(
        &self,
        build: &BuildInfo,
        result: &JobFinalResult,
        _stages: &[StageRecord],
    ) -> Result<()> {
        let dims = BuildDims {
            job_name: &build.job_name,
            owner: &build.repo_owner,
            repo: &build.repo_name,
            branch: &build.branch,
            build_url: or_build(&result.build_url, &build.build_url),
            build_number: if result.build_number != 0 {
                result.build_number
            } else {
                build.build_number
            },
            trigger: or_build(&result.trigger, &build.trigger),
        };

        let mut lines = vec![self.encoder.job_line(&JobMetric {
            build: dims,
            result: result.state.as_str(),
            blocked: flag(result.blocked()),
            job_time: millis(result.duration_millis),
            blocked_time: millis(result.blocked_duration_millis),
            passed: flag(result.passed()),
        })?];

        if let Some(tests) = &result.test_summary {
            for suite in &tests.suites {
                lines.push(self.encoder.suite_line(&SuiteMetric {
                    build: dims,
                    suite_name: &suite.name,
                    suite_time: millis(suite.duration_millis),
                    passed: millis(suite.passed),
                    skipped: millis(suite.skipped),
                    failed: millis(suite.failed),
                })?);
            }
            for suite in &tests.suites {
                for case in &suite.cases {
                    lines.push(self.encoder.case_line(&CaseMetric {
                        build: dims,
                        suite_name: &suite.name,
                        case_name: &case.name,
                        result: case.state.as_str(),
                        case_time: millis(case.duration_millis),
                        passed: flag(case.passed()),
                    })?);
                }
            }
        }

        if let Some(coverage) = &result.coverage {
            lines.push(self.encoder.coverage_line(&CoverageMetric {
                build: dims,
                coverage,
            })?);
        }

        self.write(&lines)
    }
}
