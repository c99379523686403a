//! Research orchestration core.
//!
//! A research request moves through three pieces:
//!
//! - [`pipeline`] runs the research collaborator (by default an external
//!   process) for one query and captures its raw output.
//! - [`report`] strictly parses that output into a [`ResearchReport`].
//! - [`coordinator`] ties the two together and announces coarse
//!   [`status`] phases while doing so.

pub mod coordinator;
pub mod pipeline;
pub mod report;
pub mod status;

pub use coordinator::ResearchCoordinator;
pub use pipeline::{PipelineOutput, ProcessFailure, ProcessPipeline, ResearchPipeline};
pub use report::{parse_report, ReportError, ResearchReport, Verification};
pub use status::{ChannelReporter, LogReporter, ResearchPhase, StatusReporter, StatusUpdate};

use std::fmt;

/// Errors produced while turning a query into a report.
#[derive(Debug, thiserror::Error)]
pub enum ResearchError {
    /// The query was missing, empty, or whitespace only.
    #[error("Query must be a non-empty string")]
    EmptyQuery,

    /// The query is non-empty but cannot be handed to the pipeline.
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// The collaborator failed to run or reported failure.
    #[error("Research pipeline execution failed: {0}")]
    ProcessExecution(#[from] ProcessFailure),

    /// The collaborator succeeded but its output is not a report.
    #[error("Research pipeline returned an invalid report: {0}")]
    MalformedReport(#[from] ReportError),
}

/// A validated, non-empty research query.
///
/// The only way to obtain one is [`ResearchQuery::parse`], so anything
/// holding a `ResearchQuery` can pass it to the pipeline as-is.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResearchQuery(String);

impl ResearchQuery {
    /// Default upper bound on query length, in characters.
    pub const DEFAULT_MAX_CHARS: usize = 2000;

    /// Validate raw user input.
    ///
    /// Surrounding whitespace is trimmed. NUL characters are rejected since
    /// they cannot travel in a process argument.
    pub fn parse(raw: &str, max_chars: usize) -> Result<Self, ResearchError> {
        let trimmed = raw.trim();

        if trimmed.is_empty() {
            return Err(ResearchError::EmptyQuery);
        }

        if trimmed.contains('\0') {
            return Err(ResearchError::InvalidQuery(
                "query must not contain NUL characters".to_string(),
            ));
        }

        let length = trimmed.chars().count();
        if length > max_chars {
            return Err(ResearchError::InvalidQuery(format!(
                "query is {} characters long, the limit is {}",
                length, max_chars
            )));
        }

        Ok(Self(trimmed.to_string()))
    }

    /// The query text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for ResearchQuery {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResearchQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
