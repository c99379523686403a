use anyhow::Context;
use finresearch::{
    AppState, ResearchConfig, ResearchQuery,
    api::routes::create_router,
    cli::{Cli, Commands, output::Output},
    research::ResearchPhase,
    types::ResearchResponse,
    utils::toml_config::LogFormat,
};
use std::path::Path;
use tokio::net::TcpListener;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        Output::new().error(&format!("{:#}", e));
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse_args();
    let output = if cli.no_color {
        Output::no_color()
    } else {
        Output::new()
    };

    let config = load_config(&cli.config)?;
    init_tracing(&config, cli.verbose);
    if !cli.config.exists() {
        tracing::warn!(
            "Configuration file {} not found, using defaults",
            cli.config.display()
        );
    }

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(config, &output).await,
        Commands::Config { full, validate } => {
            show_config(&cli.config, &config, full, validate, &output)
        }
        Commands::Research { query } => research_once(config, &query, &output).await,
    }
}

/// Load the config file (or defaults), apply env overrides, and validate.
fn load_config(path: &Path) -> anyhow::Result<ResearchConfig> {
    let mut config = ResearchConfig::load_or_default(path)
        .with_context(|| format!("failed to load configuration from {}", path.display()))?;
    config.apply_env_overrides()?;
    config.validate()?;
    Ok(config)
}

fn init_tracing(config: &ResearchConfig, verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(&config.server.log_level))
    };

    let registry = tracing_subscriber::registry().with(filter);
    match config.server.log_format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init(),
        LogFormat::Text => registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init(),
    }
}

async fn serve(config: ResearchConfig, output: &Output) -> anyhow::Result<()> {
    let address = config.server.bind_address();
    let program = config.pipeline.program.clone();

    let state = AppState::from_config(config);
    let app = create_router(state);

    let listener = TcpListener::bind(&address)
        .await
        .with_context(|| format!("failed to bind {}", address))?;

    output.banner();
    output.success(&format!("Listening on http://{}", address));
    output.kv("research pipeline", &program);
    output.newline();
    tracing::info!(%address, pipeline = %program, "server started");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutdown signal received");
}

fn show_config(
    path: &Path,
    config: &ResearchConfig,
    full: bool,
    validate: bool,
    output: &Output,
) -> anyhow::Result<()> {
    if validate {
        // load_config already validated; a strict load also requires the file
        ResearchConfig::load(path)?;
        output.success(&format!("{} is valid", path.display()));
        return Ok(());
    }

    if full {
        println!("{}", toml::to_string_pretty(config)?);
        return Ok(());
    }

    output.header("Server");
    output.kv("address", &config.server.bind_address());
    output.kv("log level", &config.server.log_level);
    output.kv("max body bytes", &config.server.max_body_bytes.to_string());
    if config.server.cors_origins.is_empty() {
        output.kv("cors origins", "any");
    } else {
        output.kv("cors origins", "");
        for origin in &config.server.cors_origins {
            output.list_item(origin);
        }
    }

    output.header("Pipeline");
    output.kv("program", &config.pipeline.program);
    output.kv("args", &config.pipeline.args.join(" "));
    if let Some(dir) = &config.pipeline.working_dir {
        output.kv("working dir", &dir.display().to_string());
    }
    output.kv("timeout", &format!("{}s", config.pipeline.timeout_secs));
    output.kv("max output bytes", &config.pipeline.max_output_bytes.to_string());
    output.kv("max query chars", &config.pipeline.max_query_chars.to_string());

    if !path.exists() {
        output.hint(&format!(
            "{} not found, showing defaults and environment overrides",
            path.display()
        ));
    }
    Ok(())
}

async fn research_once(config: ResearchConfig, query: &str, output: &Output) -> anyhow::Result<()> {
    let query = ResearchQuery::parse(query, config.pipeline.max_query_chars)?;
    let state = AppState::from_config(config);

    let reporter = |phase: ResearchPhase| output.phase(phase);
    let report = state.coordinator.research(&query, &reporter).await?;

    let response = ResearchResponse::from(report);
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}
