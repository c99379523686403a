//! Tests against real child processes. They run small `/bin/sh` scripts in
//! place of the research collaborator.
#![cfg(unix)]

mod common;

use common::mocks::{report_json, script_pipeline};
use common::test_server;
use finresearch::research::{LogReporter, ProcessFailure, ResearchPipeline};
use finresearch::{ResearchCoordinator, ResearchError, ResearchQuery};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn query(text: &str) -> ResearchQuery {
    ResearchQuery::parse(text, ResearchQuery::DEFAULT_MAX_CHARS).unwrap()
}

fn print_json(payload: &str) -> String {
    format!("printf '%s' '{}'", payload)
}

#[tokio::test]
async fn test_query_reaches_child_as_one_argument() {
    let dir = TempDir::new().unwrap();
    let body = format!(
        "printf '%s' \"$#\" > \"$OUT/argc\"\nprintf '%s' \"$1\" > \"$OUT/argv\"\n{}",
        print_json(&report_json("ok"))
    );
    let pipeline = script_pipeline(dir.path(), "capture.sh", &body)
        .with_env("OUT", dir.path().to_string_lossy())
        .with_working_dir(dir.path());

    let hostile = "Apple; touch pwned && echo $(id) | cat `whoami` > \"quoted\" 'single'";
    let output = pipeline.execute(&query(hostile)).await.unwrap();

    assert!(!output.stdout.is_empty());
    assert_eq!(std::fs::read_to_string(dir.path().join("argc")).unwrap(), "1");
    assert_eq!(std::fs::read_to_string(dir.path().join("argv")).unwrap(), hostile);
    assert!(!dir.path().join("pwned").exists());
}

#[tokio::test]
async fn test_non_zero_exit_keeps_diagnostics() {
    let dir = TempDir::new().unwrap();
    let body = format!(
        "{}\necho 'Traceback (most recent call last)' >&2\nexit 3",
        print_json(&report_json("ignored"))
    );
    let pipeline = script_pipeline(dir.path(), "fail.sh", &body);

    let err = pipeline.execute(&query("Apple")).await.unwrap_err();

    match &err {
        ProcessFailure::Exited { code, stderr } => {
            assert_eq!(*code, 3);
            assert!(stderr.contains("Traceback"));
        }
        other => panic!("expected Exited, got {:?}", other),
    }
    assert_eq!(err.exit_code(), Some(3));
}

#[tokio::test]
async fn test_killed_by_signal() {
    let dir = TempDir::new().unwrap();
    let pipeline = script_pipeline(dir.path(), "die.sh", "echo dying >&2\nkill -9 $$");

    let err = pipeline.execute(&query("Apple")).await.unwrap_err();

    match err {
        ProcessFailure::Killed { signal, stderr } => {
            assert_eq!(signal, Some(9));
            assert!(stderr.contains("dying"));
        }
        other => panic!("expected Killed, got {:?}", other),
    }
}

#[tokio::test]
async fn test_missing_program_is_spawn_failure() {
    let pipeline = finresearch::research::ProcessPipeline::new("/nonexistent/research-bin");

    let err = pipeline.execute(&query("Apple")).await.unwrap_err();

    assert!(matches!(err, ProcessFailure::Spawn { .. }));
}

#[tokio::test]
async fn test_timeout_kills_child() {
    let dir = TempDir::new().unwrap();
    let marker = dir.path().join("finished");
    let body = format!("sleep 1\ntouch '{}'", marker.display());
    let pipeline = script_pipeline(dir.path(), "slow.sh", &body)
        .with_timeout(Duration::from_millis(200));

    let err = pipeline.execute(&query("Apple")).await.unwrap_err();
    assert!(err.is_timeout());
    assert_eq!(err.to_string(), "process timed out after 200ms");

    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert!(!marker.exists(), "child kept running after the timeout");
}

#[tokio::test]
async fn test_timeout_kills_background_helpers() {
    let dir = TempDir::new().unwrap();
    let marker = dir.path().join("helper-finished");
    let body = format!("(sleep 1; touch '{}') &\nwait", marker.display());
    let pipeline = script_pipeline(dir.path(), "workers.sh", &body)
        .with_timeout(Duration::from_millis(200));

    let err = pipeline.execute(&query("Apple")).await.unwrap_err();
    assert!(err.is_timeout());

    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert!(!marker.exists(), "helper process outlived the timeout");
}

#[tokio::test]
async fn test_lingering_helper_does_not_hold_up_report() {
    let dir = TempDir::new().unwrap();
    let marker = dir.path().join("helper-finished");
    let body = format!(
        "(sleep 3; touch '{}') &\n{}\nexit 0",
        marker.display(),
        print_json(&report_json("done early"))
    );
    let pipeline = script_pipeline(dir.path(), "linger.sh", &body)
        .with_timeout(Duration::from_secs(10));

    let started = std::time::Instant::now();
    let output = pipeline.execute(&query("Apple")).await.unwrap();

    assert!(started.elapsed() < Duration::from_secs(3));
    let report = finresearch::research::parse_report(&output.stdout).unwrap();
    assert_eq!(report.short_summary(), "done early");

    tokio::time::sleep(Duration::from_millis(3500)).await;
    assert!(!marker.exists(), "helper process outlived the pipeline");
}

#[tokio::test]
async fn test_dropped_request_kills_child() {
    let dir = TempDir::new().unwrap();
    let marker = dir.path().join("finished");
    let body = format!("sleep 1\ntouch '{}'", marker.display());
    let pipeline = script_pipeline(dir.path(), "abandoned.sh", &body);
    let q = query("Apple");

    // Simulates the client going away while the pipeline runs
    let abandoned =
        tokio::time::timeout(Duration::from_millis(200), pipeline.execute(&q)).await;
    assert!(abandoned.is_err());

    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert!(!marker.exists(), "child kept running after the caller left");
}

#[tokio::test]
async fn test_output_over_limit_is_rejected() {
    let dir = TempDir::new().unwrap();
    let pipeline = script_pipeline(dir.path(), "chatty.sh", &print_json(&report_json("big")))
        .with_max_output_bytes(16);

    let err = pipeline.execute(&query("Apple")).await.unwrap_err();

    assert!(matches!(err, ProcessFailure::OutputTooLarge { limit: 16 }));
}

#[tokio::test]
async fn test_noisy_stderr_does_not_spoil_report() {
    let dir = TempDir::new().unwrap();
    let body = format!(
        "i=0\nwhile [ $i -lt 2000 ]; do echo \"searching step $i\" >&2; i=$((i+1)); done\n{}",
        print_json(&report_json("quiet result"))
    );
    let pipeline = script_pipeline(dir.path(), "noisy.sh", &body);
    let coordinator = ResearchCoordinator::new(Arc::new(pipeline));

    let report = coordinator
        .research(&query("Apple"), &LogReporter)
        .await
        .unwrap();

    assert_eq!(report.short_summary(), "quiet result");
}

#[tokio::test]
async fn test_clean_exit_without_verification_is_malformed() {
    let dir = TempDir::new().unwrap();
    let payload = r#"{"short_summary":"s","markdown_report":"m","follow_up_questions":[]}"#;
    let pipeline = script_pipeline(dir.path(), "partial.sh", &print_json(payload));
    let coordinator = ResearchCoordinator::new(Arc::new(pipeline));

    let err = coordinator
        .research(&query("Apple"), &LogReporter)
        .await
        .unwrap_err();

    assert!(matches!(err, ResearchError::MalformedReport(_)));
}

#[tokio::test]
async fn test_concurrent_requests_get_their_own_reports() {
    let dir = TempDir::new().unwrap();
    let body = r#"sleep 0.3
printf '{"short_summary":"%s","markdown_report":"m","follow_up_questions":[],"verification":{"verified":true}}' "$1""#;
    let pipeline = script_pipeline(dir.path(), "echo.sh", body);
    let server = test_server(Arc::new(pipeline));

    let (first, second) = tokio::join!(
        async {
            server
                .post("/research")
                .json(&json!({ "query": "sentinel-alpha" }))
                .await
        },
        async {
            server
                .post("/research")
                .json(&json!({ "query": "sentinel-beta" }))
                .await
        },
    );

    first.assert_status_ok();
    second.assert_status_ok();
    let first: Value = first.json();
    let second: Value = second.json();
    assert_eq!(first["report"]["short_summary"], "sentinel-alpha");
    assert_eq!(second["report"]["short_summary"], "sentinel-beta");
}
