//! HTTP API Handlers and Routes
//!
//! This module provides the REST API layer, built on the Axum web framework.
//!
//! # Module Structure
//!
//! - [`api::handlers`](crate::api::handlers) - Request handlers for each endpoint
//! - [`api::routes`](crate::api::routes) - Route definitions and router configuration
//!
//! # API Endpoints
//!
//! ## Research
//! - `POST /research` - Run research and receive the full report
//! - `POST /research/stream` - Same, as server-sent events with phase updates
//! - `GET /research/phases` - Progress phase vocabulary
//!
//! ## Health
//! - `GET /health` - Health check endpoint
//!
//! # OpenAPI Documentation
//!
//! The OpenAPI document is served at `/api-docs/openapi.json`.

use crate::research::{ResearchPhase, ResearchReport, StatusUpdate, Verification};
use crate::types::{ErrorResponse, HealthResponse, ResearchRequest, ResearchResponse};
use utoipa::OpenApi;

/// Request and response handlers for all API endpoints.
pub mod handlers;
/// Router configuration and route definitions.
pub mod routes;

/// OpenAPI description of the HTTP surface
#[derive(OpenApi)]
#[openapi(
    info(title = "Financial Research Server"),
    paths(
        handlers::health::health,
        handlers::research::research,
        handlers::research::research_stream,
        handlers::research::research_phases,
    ),
    components(schemas(
        ResearchRequest,
        ResearchResponse,
        ResearchReport,
        Verification,
        ResearchPhase,
        StatusUpdate,
        ErrorResponse,
        HealthResponse,
    )),
    tags(
        (name = "research", description = "Financial research reports"),
        (name = "health", description = "Service health")
    )
)]
pub struct ApiDoc;
