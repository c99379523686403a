//! Shared test helpers.

#![allow(dead_code)]

pub mod mocks;

use axum_test::TestServer;
use finresearch::api::routes::create_router;
use finresearch::{AppState, ResearchConfig, ResearchPipeline};
use std::sync::Arc;

/// Test server around the real router and the given pipeline.
pub fn test_server(pipeline: Arc<dyn ResearchPipeline>) -> TestServer {
    test_server_with_config(ResearchConfig::default(), pipeline)
}

pub fn test_server_with_config(
    config: ResearchConfig,
    pipeline: Arc<dyn ResearchPipeline>,
) -> TestServer {
    let app = create_router(AppState::new(config, pipeline));
    TestServer::new(app).expect("Failed to create test server")
}
