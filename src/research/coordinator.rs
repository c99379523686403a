//! Runs one query end to end: pipeline, report parsing, phase updates.

use crate::research::{
    parse_report, ResearchError, ResearchPhase, ResearchPipeline, ResearchQuery, ResearchReport,
    StatusReporter,
};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Drives one query through the pipeline and into a [`ResearchReport`].
///
/// The coordinator holds no per-request state, so a single instance is
/// shared by every concurrent request.
pub struct ResearchCoordinator {
    pipeline: Arc<dyn ResearchPipeline>,
}

impl ResearchCoordinator {
    pub fn new(pipeline: Arc<dyn ResearchPipeline>) -> Self {
        Self { pipeline }
    }

    pub fn pipeline_name(&self) -> &str {
        self.pipeline.name()
    }

    /// Execute research for a validated query.
    ///
    /// Reports `planning` before the pipeline starts and `processing` before
    /// its output is parsed, then exactly one of `completed` or `failed`.
    /// No retries: the first failure is returned.
    pub async fn research(
        &self,
        query: &ResearchQuery,
        status: &dyn StatusReporter,
    ) -> Result<ResearchReport, ResearchError> {
        let result = self.run(query, status).await;

        match &result {
            Ok(_) => status.report(ResearchPhase::Completed),
            Err(_) => status.report(ResearchPhase::Failed),
        }

        result
    }

    async fn run(
        &self,
        query: &ResearchQuery,
        status: &dyn StatusReporter,
    ) -> Result<ResearchReport, ResearchError> {
        let start = Instant::now();

        status.report(ResearchPhase::Planning);

        let output = self.pipeline.execute(query).await.map_err(|failure| {
            error!(
                pipeline = %self.pipeline.name(),
                exit_code = ?failure.exit_code(),
                stderr = failure.stderr().unwrap_or_default(),
                "research pipeline failed: {}",
                failure
            );
            failure
        })?;

        if !output.stderr.trim().is_empty() {
            debug!(
                pipeline = %self.pipeline.name(),
                stderr = %output.stderr,
                "research pipeline diagnostics"
            );
        }

        status.report(ResearchPhase::Processing);

        let report = parse_report(&output.stdout).map_err(|e| {
            error!(
                pipeline = %self.pipeline.name(),
                stdout_bytes = output.stdout.len(),
                "research pipeline returned an unusable report: {}",
                e
            );
            e
        })?;

        if !report.verification().is_verified() {
            warn!(
                issues = report.verification().issues().unwrap_or_default(),
                "report did not pass verification"
            );
        }

        info!(
            duration_ms = start.elapsed().as_millis() as u64,
            follow_up_questions = report.follow_up_questions().len(),
            verified = report.verification().is_verified(),
            "research completed"
        );

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::research::{PipelineOutput, ProcessFailure};
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct FixedPipeline {
        result: Mutex<Option<Result<PipelineOutput, ProcessFailure>>>,
    }

    impl FixedPipeline {
        fn ok(stdout: &str, stderr: &str) -> Self {
            Self {
                result: Mutex::new(Some(Ok(PipelineOutput {
                    stdout: stdout.as_bytes().to_vec(),
                    stderr: stderr.to_string(),
                }))),
            }
        }

        fn failing(failure: ProcessFailure) -> Self {
            Self {
                result: Mutex::new(Some(Err(failure))),
            }
        }
    }

    #[async_trait]
    impl ResearchPipeline for FixedPipeline {
        async fn execute(&self, _query: &ResearchQuery) -> Result<PipelineOutput, ProcessFailure> {
            self.result
                .lock()
                .unwrap()
                .take()
                .expect("pipeline executed more than once")
        }

        fn name(&self) -> &str {
            "fixed"
        }
    }

    fn query() -> ResearchQuery {
        ResearchQuery::parse("Analyze Apple's most recent quarterly performance", 200).unwrap()
    }

    const REPORT: &str = r#"{"short_summary":"s","markdown_report":"m","follow_up_questions":["a","b"],"verification":{"verified":false,"issues":"thin sourcing"}}"#;

    #[tokio::test]
    async fn test_phases_on_success() {
        let coordinator = ResearchCoordinator::new(Arc::new(FixedPipeline::ok(REPORT, "")));
        let phases = Mutex::new(Vec::new());
        let reporter = |phase: ResearchPhase| phases.lock().unwrap().push(phase);

        let report = coordinator.research(&query(), &reporter).await.unwrap();

        assert_eq!(report.follow_up_questions(), ["a", "b"]);
        assert_eq!(report.verification().issues(), Some("thin sourcing"));
        assert_eq!(
            *phases.lock().unwrap(),
            vec![
                ResearchPhase::Planning,
                ResearchPhase::Processing,
                ResearchPhase::Completed
            ]
        );
    }

    #[tokio::test]
    async fn test_process_failure_skips_processing_phase() {
        let coordinator = ResearchCoordinator::new(Arc::new(FixedPipeline::failing(
            ProcessFailure::Exited {
                code: 1,
                stderr: "Traceback (most recent call last)".to_string(),
            },
        )));
        let phases = Mutex::new(Vec::new());
        let reporter = |phase: ResearchPhase| phases.lock().unwrap().push(phase);

        let err = coordinator.research(&query(), &reporter).await.unwrap_err();

        assert!(matches!(
            err,
            ResearchError::ProcessExecution(ProcessFailure::Exited { code: 1, .. })
        ));
        assert_eq!(
            *phases.lock().unwrap(),
            vec![ResearchPhase::Planning, ResearchPhase::Failed]
        );
    }

    #[tokio::test]
    async fn test_malformed_output() {
        let coordinator =
            ResearchCoordinator::new(Arc::new(FixedPipeline::ok("not json at all", "")));

        let err = coordinator
            .research(&query(), &crate::research::LogReporter)
            .await
            .unwrap_err();

        assert!(matches!(err, ResearchError::MalformedReport(_)));
    }

    #[tokio::test]
    async fn test_noisy_stderr_is_not_fatal() {
        let coordinator = ResearchCoordinator::new(Arc::new(FixedPipeline::ok(
            REPORT,
            "Planning searches...\nWARNING: rate limited, retrying\n",
        )));

        let report = coordinator
            .research(&query(), &crate::research::LogReporter)
            .await
            .unwrap();

        assert_eq!(report.short_summary(), "s");
        assert_eq!(coordinator.pipeline_name(), "fixed");
    }
}
