//! Mock implementations for testing.
//!
//! This module provides stub research pipelines and shell-script pipelines
//! that can be used across different test files without duplication.

use async_trait::async_trait;
use finresearch::research::{PipelineOutput, ProcessFailure, ProcessPipeline, ResearchPipeline};
use finresearch::ResearchQuery;
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// What a [`MockPipeline`] does when executed.
#[derive(Clone)]
pub enum MockBehavior {
    /// Exit cleanly with this stdout and stderr
    Output { stdout: String, stderr: String },
    /// Exit with a non-zero code and this stderr
    Exit { code: i32, stderr: String },
    /// Time out after the given duration
    TimeOut(Duration),
}

/// Stub pipeline that records every query it receives.
///
/// # Examples
///
/// ```ignore
/// let pipeline = Arc::new(MockPipeline::returning(APPLE_REPORT));
/// let server = test_server(pipeline.clone());
/// // ... issue requests ...
/// assert_eq!(pipeline.calls(), 1);
/// ```
pub struct MockPipeline {
    behavior: MockBehavior,
    calls: AtomicUsize,
    queries: Mutex<Vec<String>>,
}

impl MockPipeline {
    pub fn new(behavior: MockBehavior) -> Self {
        Self {
            behavior,
            calls: AtomicUsize::new(0),
            queries: Mutex::new(Vec::new()),
        }
    }

    /// Exit cleanly with `stdout` as the payload.
    pub fn returning(stdout: &str) -> Self {
        Self::new(MockBehavior::Output {
            stdout: stdout.to_string(),
            stderr: String::new(),
        })
    }

    /// Exit with `code`, writing `stderr`.
    pub fn exiting(code: i32, stderr: &str) -> Self {
        Self::new(MockBehavior::Exit {
            code,
            stderr: stderr.to_string(),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl ResearchPipeline for MockPipeline {
    async fn execute(&self, query: &ResearchQuery) -> Result<PipelineOutput, ProcessFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.queries.lock().unwrap().push(query.as_str().to_string());

        match &self.behavior {
            MockBehavior::Output { stdout, stderr } => Ok(PipelineOutput {
                stdout: stdout.as_bytes().to_vec(),
                stderr: stderr.clone(),
            }),
            MockBehavior::Exit { code, stderr } => Err(ProcessFailure::Exited {
                code: *code,
                stderr: stderr.clone(),
            }),
            MockBehavior::TimeOut(after) => Err(ProcessFailure::TimedOut(*after)),
        }
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// Write `body` to `name` inside `dir` and return a pipeline that runs it
/// with `/bin/sh`. The query arrives as `$1`.
pub fn script_pipeline(dir: &Path, name: &str, body: &str) -> ProcessPipeline {
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).expect("Failed to write script");

    ProcessPipeline::new("/bin/sh").with_args([path.to_string_lossy().into_owned()])
}

/// A valid flat report payload whose summary is `summary`.
pub fn report_json(summary: &str) -> String {
    serde_json::json!({
        "short_summary": summary,
        "markdown_report": format!("# {}\n\nDetails.", summary),
        "follow_up_questions": ["What about margins?", "What about guidance?"],
        "verification": {"verified": true}
    })
    .to_string()
}
