//! Report schema shared with the research pipeline.
//!
//! The pipeline writes a single JSON document to standard output. Two
//! layouts are accepted:
//!
//! ```json
//! {"short_summary": "...", "markdown_report": "...",
//!  "follow_up_questions": ["..."], "verification": {"verified": true}}
//! ```
//!
//! and the envelope form, where the report body and its verification are
//! siblings:
//!
//! ```json
//! {"report": {"short_summary": "...", "markdown_report": "...",
//!             "follow_up_questions": ["..."]},
//!  "verification": {"verified": false, "issues": "..."}}
//! ```
//!
//! Parsing is strict. A missing or mistyped field is an error, never an
//! empty default.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use utoipa::ToSchema;

/// Advisory quality check attached to every report.
///
/// A failed verification is still a successful report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Verification {
    verified: bool,
    /// What the verifier objected to; only meaningful when `verified` is false.
    #[serde(skip_serializing_if = "Option::is_none")]
    issues: Option<String>,
}

impl Verification {
    pub fn passed() -> Self {
        Self {
            verified: true,
            issues: None,
        }
    }

    pub fn failed(issues: impl Into<String>) -> Self {
        Self {
            verified: false,
            issues: Some(issues.into()),
        }
    }

    pub fn is_verified(&self) -> bool {
        self.verified
    }

    pub fn issues(&self) -> Option<&str> {
        self.issues.as_deref()
    }
}

/// The structured result of one research query.
///
/// Fields are private: a report is built once, by parsing or by
/// [`ResearchReport::new`], and only read afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ResearchReport {
    /// One-paragraph executive summary
    short_summary: String,
    /// Full report body (Markdown), passed through untouched
    markdown_report: String,
    /// Suggested next queries in display order
    follow_up_questions: Vec<String>,
    verification: Verification,
}

impl ResearchReport {
    pub fn new(
        short_summary: impl Into<String>,
        markdown_report: impl Into<String>,
        follow_up_questions: Vec<String>,
        verification: Verification,
    ) -> Self {
        Self {
            short_summary: short_summary.into(),
            markdown_report: markdown_report.into(),
            follow_up_questions,
            verification,
        }
    }

    pub fn short_summary(&self) -> &str {
        &self.short_summary
    }

    pub fn markdown_report(&self) -> &str {
        &self.markdown_report
    }

    pub fn follow_up_questions(&self) -> &[String] {
        &self.follow_up_questions
    }

    pub fn verification(&self) -> &Verification {
        &self.verification
    }
}

/// Reasons a pipeline payload could not be read as a report.
#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("payload is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),

    #[error("payload is not valid JSON: {0}")]
    InvalidJson(#[source] serde_json::Error),

    #[error("payload must be a JSON object, found {0}")]
    NotAnObject(&'static str),

    #[error("payload does not match the report schema: {0}")]
    Schema(#[source] serde_json::Error),

    /// The pipeline exited cleanly but wrote `{"error": "..."}` instead of a report.
    #[error("pipeline reported an error instead of a report: {0}")]
    CollaboratorError(String),
}

/// Parse raw pipeline output into a [`ResearchReport`].
pub fn parse_report(payload: &[u8]) -> Result<ResearchReport, ReportError> {
    let text = std::str::from_utf8(payload)?;
    let value: Value = serde_json::from_str(text.trim()).map_err(ReportError::InvalidJson)?;

    let mut fields = match value {
        Value::Object(fields) => fields,
        other => return Err(ReportError::NotAnObject(json_kind(&other))),
    };

    if let Some(message) = collaborator_error(&fields) {
        return Err(ReportError::CollaboratorError(message));
    }

    let body = match fields.remove("report") {
        Some(Value::Object(mut inner)) => {
            if !inner.contains_key("verification") {
                if let Some(verification) = fields.remove("verification") {
                    inner.insert("verification".to_string(), verification);
                }
            }
            Value::Object(inner)
        }
        // Let serde describe the type mismatch
        Some(other) => other,
        None => Value::Object(fields),
    };

    serde_json::from_value(body).map_err(ReportError::Schema)
}

/// An error-only payload: an `error` string and none of the report fields.
fn collaborator_error(fields: &Map<String, Value>) -> Option<String> {
    if fields.contains_key("report") || fields.contains_key("short_summary") {
        return None;
    }
    match fields.get("error") {
        Some(Value::String(message)) => Some(message.clone()),
        _ => None,
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
