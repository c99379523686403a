//! # Financial Research Server
//!
//! An HTTP service that turns a free-text financial research question into a
//! structured, verified report.
//!
//! The heavy lifting (search planning, web search, analysis, report writing,
//! verification) happens in an external research pipeline. This crate owns
//! the contract around it: validating the query, running the pipeline safely,
//! parsing its output strictly, reporting progress, and mapping failures to
//! HTTP responses.
//!
//! ## Overview
//!
//! The crate can be used in two ways:
//!
//! 1. **As a standalone server** - Run the `finresearch-server` binary
//! 2. **As a library** - Embed the research core in another service
//!
//! ### Library Example
//!
//! ```rust,ignore
//! use finresearch::research::{LogReporter, ProcessPipeline, ResearchCoordinator, ResearchQuery};
//! use std::sync::Arc;
//!
//! let pipeline = ProcessPipeline::new("python3").with_args(["local_orchestrator.py"]);
//! let coordinator = ResearchCoordinator::new(Arc::new(pipeline));
//!
//! let query = ResearchQuery::parse("Analyze Apple's most recent quarterly performance", 2000)?;
//! let report = coordinator.research(&query, &LogReporter).await?;
//! println!("{}", report.short_summary());
//! ```
//!
//! ## Modules
//!
//! - [`research`] - Query validation, pipeline execution, report schema, progress phases
//! - [`api`] - REST API handlers and routes
//! - [`types`] - API types and error handling
//! - [`utils`] - TOML configuration
//! - [`cli`] - Command-line interface

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

/// HTTP API handlers and routes.
pub mod api;
/// Command-line interface.
pub mod cli;
/// Research orchestration: pipeline, report schema, status phases.
pub mod research;
/// Core API types (requests, responses, errors).
pub mod types;
/// Configuration utilities (TOML).
pub mod utils;

// Re-export commonly used types
pub use research::{
    ResearchCoordinator, ResearchError, ResearchPipeline, ResearchQuery, ResearchReport,
};
pub use types::{AppError, Result};
pub use utils::toml_config::ResearchConfig;

use crate::research::ProcessPipeline;
use std::sync::Arc;

/// Application state shared across handlers
///
/// Everything here is immutable after startup; requests share nothing else.
#[derive(Clone)]
pub struct AppState {
    /// Configuration loaded at startup
    pub config: Arc<ResearchConfig>,
    /// Runs research queries against the configured pipeline
    pub coordinator: Arc<ResearchCoordinator>,
}

impl AppState {
    /// Build state around an explicit pipeline implementation.
    pub fn new(config: ResearchConfig, pipeline: Arc<dyn ResearchPipeline>) -> Self {
        Self {
            config: Arc::new(config),
            coordinator: Arc::new(ResearchCoordinator::new(pipeline)),
        }
    }

    /// Build state that runs the external process described by `config.pipeline`.
    pub fn from_config(config: ResearchConfig) -> Self {
        let pipeline = Arc::new(ProcessPipeline::from_config(&config.pipeline));
        Self::new(config, pipeline)
    }
}
