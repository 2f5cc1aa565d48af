//! The two interchangeable line layouts.
//!
//! V1 keeps job name and branch as tags, which is expensive in series
//! cardinality but matches existing dashboards. V2 keeps only owner, repo,
//! result and the stage/suite name as tags and moves everything else into
//! fields.

use super::{
    CaseMetric, CoverageMetric, JobMetric, LineBuilder, LineEncoder, SchemaVersion, StageMetric,
    SuiteMetric,
};
use crate::error::Result;

#[derive(Debug, Clone, Copy, Default)]
pub struct SchemaV1;

#[derive(Debug, Clone, Copy, Default)]
pub struct SchemaV2;

impl LineEncoder for SchemaV1 {
    fn version(&self) -> SchemaVersion {
        SchemaVersion::V1
    }

    fn stage_line(&self, m: &StageMetric<'_>) -> Result<String> {
        LineBuilder::new("stage")
            .tag("jobname", m.build.job_name)
            .tag("owner", m.build.owner)
            .tag("repo", m.build.repo)
            .tag("branch", m.build.branch)
            .tag("stagename", m.stage_name)
            .tag("result", m.result)
            .field("stagetime", m.stage_time)
            .field("passed", m.passed)
            .build()
    }

    fn job_line(&self, m: &JobMetric<'_>) -> Result<String> {
        LineBuilder::new("job")
            .tag("jobname", m.build.job_name)
            .tag("owner", m.build.owner)
            .tag("repo", m.build.repo)
            .tag("branch", m.build.branch)
            .tag("result", m.result)
            .tag("blocked", &m.blocked.to_string())
            .field("jobtime", m.job_time)
            .field("blockedtime", m.blocked_time)
            .field("passed", m.passed)
            .build()
    }

    fn suite_line(&self, m: &SuiteMetric<'_>) -> Result<String> {
        LineBuilder::new("testsuite")
            .tag("jobname", m.build.job_name)
            .tag("owner", m.build.owner)
            .tag("repo", m.build.repo)
            .tag("branch", m.build.branch)
            .tag("suite", m.suite_name)
            .field("suitetime", m.suite_time)
            .field("passed", m.passed)
            .field("skipped", m.skipped)
            .field("failed", m.failed)
            .build()
    }

    fn case_line(&self, m: &CaseMetric<'_>) -> Result<String> {
        LineBuilder::new("testcase")
            .tag("jobname", m.build.job_name)
            .tag("owner", m.build.owner)
            .tag("repo", m.build.repo)
            .tag("branch", m.build.branch)
            .tag("suite", m.suite_name)
            .tag("testcase", m.case_name)
            .tag("result", m.result)
            .field("testtime", m.case_time)
            .field("passed", m.passed)
            .build()
    }

    fn coverage_line(&self, m: &CoverageMetric<'_>) -> Result<String> {
        let c = m.coverage;
        LineBuilder::new("coverage")
            .tag("jobname", m.build.job_name)
            .tag("owner", m.build.owner)
            .tag("repo", m.build.repo)
            .tag("branch", m.build.branch)
            .field("classes", c.classes)
            .field("conditionals", c.conditionals)
            .field("files", c.files)
            .field("lines", c.lines)
            .field("methods", c.methods)
            .field("packages", c.packages)
            .build()
    }
}

impl LineEncoder for SchemaV2 {
    fn version(&self) -> SchemaVersion {
        SchemaVersion::V2
    }

    fn stage_line(&self, m: &StageMetric<'_>) -> Result<String> {
        LineBuilder::new("stage")
            .tag("owner", m.build.owner)
            .tag("repo", m.build.repo)
            .tag("stagename", m.stage_name)
            .tag("result", m.result)
            .field("jobname", m.build.job_name)
            .field("branch", m.build.branch)
            .field("stagetime", m.stage_time)
            .field("passed", m.passed)
            .field("buildurl", m.build.build_url)
            .field("buildnumber", m.build.build_number)
            .field("trigger", m.build.trigger)
            .build()
    }

    fn job_line(&self, m: &JobMetric<'_>) -> Result<String> {
        LineBuilder::new("job")
            .tag("owner", m.build.owner)
            .tag("repo", m.build.repo)
            .tag("result", m.result)
            .field("jobname", m.build.job_name)
            .field("branch", m.build.branch)
            .field("blocked", m.blocked)
            .field("jobtime", m.job_time)
            .field("blockedtime", m.blocked_time)
            .field("passed", m.passed)
            .field("buildurl", m.build.build_url)
            .field("buildnumber", m.build.build_number)
            .field("trigger", m.build.trigger)
            .build()
    }

    fn suite_line(&self, m: &SuiteMetric<'_>) -> Result<String> {
        LineBuilder::new("testsuite")
            .tag("owner", m.build.owner)
            .tag("repo", m.build.repo)
            .tag("suite", m.suite_name)
            .field("jobname", m.build.job_name)
            .field("branch", m.build.branch)
            .field("suitetime", m.suite_time)
            .field("passed", m.passed)
            .field("skipped", m.skipped)
            .field("failed", m.failed)
            .field("buildurl", m.build.build_url)
            .field("buildnumber", m.build.build_number)
            .field("trigger", m.build.trigger)
            .build()
    }

    fn case_line(&self, m: &CaseMetric<'_>) -> Result<String> {
        LineBuilder::new("testcase")
            .tag("owner", m.build.owner)
            .tag("repo", m.build.repo)
            .tag("suite", m.suite_name)
            .tag("result", m.result)
            .field("jobname", m.build.job_name)
            .field("branch", m.build.branch)
            .field("testcase", m.case_name)
            .field("testtime", m.case_time)
            .field("passed", m.passed)
            .field("buildurl", m.build.build_url)
            .field("buildnumber", m.build.build_number)
            .field("trigger", m.build.trigger)
            .build()
    }

    fn coverage_line(&self, m: &CoverageMetric<'_>) -> Result<String> {
        let c = m.coverage;
        LineBuilder::new("coverage")
            .tag("owner", m.build.owner)
            .tag("repo", m.build.repo)
            .field("jobname", m.build.job_name)
            .field("branch", m.build.branch)
            .field("classes", c.classes)
            .field("conditionals", c.conditionals)
            .field("files", c.files)
            .field("lines", c.lines)
            .field("methods", c.methods)
            .field("packages", c.packages)
            .field("buildurl", m.build.build_url)
            .field("buildnumber", m.build.build_number)
            .field("trigger", m.build.trigger)
            .build()
    }
}
