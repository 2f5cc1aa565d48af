//! Line protocol encoding for the time-series backend.
//!
//! A line is `measurement[,tag=value]* field=value[,field=value]*`. Tags are
//! indexed dimensions, fields carry the values. Two schema layouts exist and
//! are selected by configuration through [`SchemaVersion`]; both implement
//! [`LineEncoder`].

mod schema;

pub use schema::{SchemaV1, SchemaV2};

use serde::{Deserialize, Serialize};

use crate::error::{NotifyError, Result};
use crate::state::CoverageSummary;

/// Typed field value.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Str(String),
    Int(i64),
    Float(f64),
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::Str(v.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::Str(v)
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Int(v)
    }
}

impl From<u64> for FieldValue {
    fn from(v: u64) -> Self {
        FieldValue::Int(i64::try_from(v).unwrap_or(i64::MAX))
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::Float(v)
    }
}

impl FieldValue {
    fn render(&self, key: &str, out: &mut String) -> Result<()> {
        match self {
            FieldValue::Str(s) => {
                out.push('"');
                for c in s.chars() {
                    match c {
                        '\\' | '"' => {
                            out.push('\\');
                            out.push(c);
                        }
                        '\n' | '\r' => out.push(' '),
                        _ => out.push(c),
                    }
                }
                out.push('"');
            }
            FieldValue::Int(i) => out.push_str(&i.to_string()),
            FieldValue::Float(f) => {
                if !f.is_finite() {
                    return Err(NotifyError::Encoding(format!(
                        "field '{}' is not a finite number",
                        key
                    )));
                }
                out.push_str(&format!("{:.4}", f));
            }
        }
        Ok(())
    }
}

/// Escape a tag value: space, comma, `=` and backslash get a leading backslash.
///
/// Line breaks would end the line early, so they are written as an escaped space.
pub fn escape_tag(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            ' ' | ',' | '=' | '\\' => {
                out.push('\\');
                out.push(c);
            }
            '\n' | '\r' => out.push_str("\\ "),
            _ => out.push(c),
        }
    }
    out
}

/// Inverse of [`escape_tag`].
pub fn unescape_tag(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(&next) = chars.peek() {
                if matches!(next, ' ' | ',' | '=' | '\\') {
                    out.push(next);
                    chars.next();
                    continue;
                }
            }
        }
        out.push(c);
    }
    out
}

fn escape_measurement(value: &str) -> String {
    value.replace(',', "\\,").replace(' ', "\\ ")
}

/// Builder for a single line.
#[derive(Debug, Clone)]
pub struct LineBuilder {
    measurement: String,
    tags: Vec<(&'static str, String)>,
    fields: Vec<(&'static str, FieldValue)>,
}

impl LineBuilder {
    pub fn new(measurement: &str) -> Self {
        Self {
            measurement: measurement.to_string(),
            tags: Vec::new(),
            fields: Vec::new(),
        }
    }

    /// Empty tag values are dropped; the database rejects them.
    pub fn tag(mut self, key: &'static str, value: &str) -> Self {
        if !value.is_empty() {
            self.tags.push((key, value.to_string()));
        }
        self
    }

    pub fn field(mut self, key: &'static str, value: impl Into<FieldValue>) -> Self {
        self.fields.push((key, value.into()));
        self
    }

    pub fn build(self) -> Result<String> {
        if self.measurement.is_empty() {
            return Err(NotifyError::Encoding("empty measurement name".to_string()));
        }
        if self.fields.is_empty() {
            return Err(NotifyError::Encoding(format!(
                "measurement '{}' has no fields",
                self.measurement
            )));
        }

        let mut line = escape_measurement(&self.measurement);
        for (key, value) in &self.tags {
            line.push(',');
            line.push_str(key);
            line.push('=');
            line.push_str(&escape_tag(value));
        }
        line.push(' ');
        for (idx, (key, value)) in self.fields.iter().enumerate() {
            if idx > 0 {
                line.push(',');
            }
            line.push_str(key);
            line.push('=');
            value.render(key, &mut line)?;
        }
        Ok(line)
    }
}

/// Dimensions common to every line emitted for one build.
#[derive(Debug, Clone, Copy)]
pub struct BuildDims<'a> {
    pub job_name: &'a str,
    pub owner: &'a str,
    pub repo: &'a str,
    pub branch: &'a str,
    pub build_url: &'a str,
    pub build_number: i64,
    pub trigger: &'a str,
}

#[derive(Debug, Clone, Copy)]
pub struct StageMetric<'a> {
    pub build: BuildDims<'a>,
    pub stage_name: &'a str,
    pub result: &'a str,
    pub stage_time: i64,
    pub passed: i64,
}

#[derive(Debug, Clone, Copy)]
pub struct JobMetric<'a> {
    pub build: BuildDims<'a>,
    pub result: &'a str,
    pub blocked: i64,
    pub job_time: i64,
    pub blocked_time: i64,
    pub passed: i64,
}

#[derive(Debug, Clone, Copy)]
pub struct SuiteMetric<'a> {
    pub build: BuildDims<'a>,
    pub suite_name: &'a str,
    pub suite_time: i64,
    pub passed: i64,
    pub skipped: i64,
    pub failed: i64,
}

#[derive(Debug, Clone, Copy)]
pub struct CaseMetric<'a> {
    pub build: BuildDims<'a>,
    pub suite_name: &'a str,
    pub case_name: &'a str,
    pub result: &'a str,
    pub case_time: i64,
    pub passed: i64,
}

#[derive(Debug, Clone, Copy)]
pub struct CoverageMetric<'a> {
    pub build: BuildDims<'a>,
    pub coverage: &'a CoverageSummary,
}

/// One schema layout.
pub trait LineEncoder: Send + Sync {
    fn version(&self) -> SchemaVersion;
    fn stage_line(&self, metric: &StageMetric<'_>) -> Result<String>;
    fn job_line(&self, metric: &JobMetric<'_>) -> Result<String>;
    fn suite_line(&self, metric: &SuiteMetric<'_>) -> Result<String>;
    fn case_line(&self, metric: &CaseMetric<'_>) -> Result<String>;
    fn coverage_line(&self, metric: &CoverageMetric<'_>) -> Result<String>;
}

/// Configured schema layout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaVersion {
    /// Legacy layout with identifying dimensions as tags
    #[default]
    V1,
    /// Reduced tag cardinality layout
    V2,
}

impl SchemaVersion {
    pub fn encoder(self) -> &'static dyn LineEncoder {
        match self {
            SchemaVersion::V1 => &SchemaV1,
            SchemaVersion::V2 => &SchemaV2,
        }
    }
}

impl std::str::FromStr for SchemaVersion {
    type Err = NotifyError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "v1" | "1" => Ok(SchemaVersion::V1),
            "v2" | "2" => Ok(SchemaVersion::V2),
            other => Err(NotifyError::Config(format!(
                "unknown line protocol schema '{}'",
                other
            ))),
        }
    }
}
