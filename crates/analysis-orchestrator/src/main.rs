use std::process::ExitCode;

use analysis_orchestrator::{AnalysisOrchestrator, EngineConfig};
use anyhow::{Context, Result};
use futures_util::future::join_all;

const USAGE: &str = "usage: resolve SYMBOL [SYMBOL...]";

#[tokio::main]
async fn main() -> Result<ExitCode> {
    dotenvy::dotenv().ok();

    let json_logging = std::env::var("RUST_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    if json_logging {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
            )
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
            )
            .with_writer(std::io::stderr)
            .init();
    }

    std::panic::set_hook(Box::new(|info| {
        eprintln!("PANIC: {info}");
        tracing::error!("PANIC: {info}");
    }));

    let symbols: Vec<String> = std::env::args().skip(1).collect();
    if symbols.is_empty() {
        eprintln!("{}", USAGE);
        return Ok(ExitCode::from(2));
    }

    let config = EngineConfig::from_env().context("Failed to load configuration")?;
    let orchestrator = AnalysisOrchestrator::from_config(&config);

    let reports = join_all(symbols.iter().map(|s| orchestrator.analyze(s))).await;

    let mut invalid = false;
    for (symbol, report) in symbols.iter().zip(reports) {
        match report {
            Ok(report) => {
                let json = serde_json::to_string_pretty(&report)
                    .with_context(|| format!("Failed to encode report for {}", symbol))?;
                println!("{}", json);
            }
            Err(e) => {
                tracing::error!("Skipping '{}': {}", symbol, e);
                invalid = true;
            }
        }
    }

    Ok(if invalid {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}
