//! Coarse progress phases for a research request.
//!
//! Phases are advisory. Reporters never block and never fail; a client that
//! ignores every update still receives the complete report.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::mpsc;
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ResearchPhase {
    /// About to hand the query to the pipeline
    Planning,
    /// Pipeline finished, about to read its output
    Processing,
    Completed,
    Failed,
}

impl ResearchPhase {
    /// Every phase, in lifecycle order.
    pub const ALL: [ResearchPhase; 4] = [
        ResearchPhase::Planning,
        ResearchPhase::Processing,
        ResearchPhase::Completed,
        ResearchPhase::Failed,
    ];

    pub fn label(self) -> &'static str {
        match self {
            ResearchPhase::Planning => "planning",
            ResearchPhase::Processing => "processing",
            ResearchPhase::Completed => "completed",
            ResearchPhase::Failed => "failed",
        }
    }

    /// Text suitable for a progress indicator.
    pub fn message(self) -> &'static str {
        match self {
            ResearchPhase::Planning => "Planning search strategy...",
            ResearchPhase::Processing => "Processing search results...",
            ResearchPhase::Completed => "Research report ready",
            ResearchPhase::Failed => "Research failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, ResearchPhase::Completed | ResearchPhase::Failed)
    }
}

impl fmt::Display for ResearchPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Wire form of a phase change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct StatusUpdate {
    pub phase: ResearchPhase,
    pub message: String,
}

impl From<ResearchPhase> for StatusUpdate {
    fn from(phase: ResearchPhase) -> Self {
        Self {
            phase,
            message: phase.message().to_string(),
        }
    }
}

/// Sink for phase changes.
pub trait StatusReporter: Send + Sync {
    fn report(&self, phase: ResearchPhase);
}

impl<F> StatusReporter for F
where
    F: Fn(ResearchPhase) + Send + Sync,
{
    fn report(&self, phase: ResearchPhase) {
        self(phase)
    }
}

/// Writes phases to the log, inside whatever span is current.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogReporter;

impl StatusReporter for LogReporter {
    fn report(&self, phase: ResearchPhase) {
        tracing::info!(phase = %phase, "{}", phase.message());
    }
}

/// Forwards phases over a bounded channel.
///
/// Updates are dropped when the channel is full or the receiver is gone.
#[derive(Debug, Clone)]
pub struct ChannelReporter {
    tx: mpsc::Sender<ResearchPhase>,
}

impl ChannelReporter {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<ResearchPhase>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }
}

impl StatusReporter for ChannelReporter {
    fn report(&self, phase: ResearchPhase) {
        tracing::debug!(phase = %phase, "{}", phase.message());
        if let Err(e) = self.tx.try_send(phase) {
            tracing::debug!(phase = %phase, "status update dropped: {}", e);
        }
    }
}
