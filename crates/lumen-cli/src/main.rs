//! Lumen CLI: run accessibility audits from the shell or serve them over HTTP.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::Level;
use tracing_subscriber::EnvFilter;

use lumen_runtime::{AuditOrchestrator, AuditService, RuntimeConfig};

/// Accessibility audits for web pages
#[derive(Parser)]
#[command(name = "lumen")]
#[command(version, about, long_about = None)]
struct Cli {
    /// YAML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// WebDriver endpoint, overrides browser.webdriver_url
    #[arg(long, global = true)]
    webdriver: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a single evaluator against a page
    Check {
        /// Evaluator id, e.g. contrast or alt_text
        evaluator: String,

        /// Page to audit
        #[arg(long)]
        url: String,
    },

    /// Run every enabled evaluator plus the ruleset engine
    Audit {
        /// Page to audit
        #[arg(long)]
        url: String,

        /// Also write the report as JSON into this directory
        #[arg(long)]
        export: Option<PathBuf>,
    },

    /// Serve audits over HTTP
    Serve {
        #[arg(long, default_value = "127.0.0.1:5500")]
        addr: SocketAddr,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let config = load_config(cli.config.as_deref(), cli.webdriver)?;
    let orchestrator = AuditOrchestrator::from_config(config).context("Failed to set up audits")?;
    let service = AuditService::new(Arc::new(orchestrator));

    match cli.command {
        Commands::Check { evaluator, url } => {
            let result = service
                .check(&evaluator, Some(&url))
                .await
                .with_context(|| format!("{} check of {} failed", evaluator, url))?;
            print_json(&result)?;
        }
        Commands::Audit { url, export } => {
            let report = service
                .full_audit(Some(&url))
                .await
                .with_context(|| format!("Audit of {} failed", url))?;
            if let Some(dir) = export {
                let path = lumen_core::export(&report, &dir)
                    .with_context(|| format!("Failed to export report to {}", dir.display()))?;
                tracing::info!(path = %path.display(), "Report exported");
            }
            print_json(&report)?;
        }
        Commands::Serve { addr } => serve(service, addr).await?,
    }

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: Option<&Path>, webdriver: Option<String>) -> Result<RuntimeConfig> {
    let mut config = match path {
        Some(path) => RuntimeConfig::from_yaml_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => RuntimeConfig::default(),
    };
    if let Some(url) = webdriver {
        config.browser.webdriver_url = url;
    }
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{}", json);
    Ok(())
}

async fn serve(service: AuditService, addr: SocketAddr) -> Result<()> {
    let app = lumen_cli::build_router(service)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!("lumen listening on http://{}", addr);

    axum::serve(listener, app).await.context("server crashed")?;
    Ok(())
}
