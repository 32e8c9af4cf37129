mod config;
mod error;
mod routes;
mod topology;

use config::{Config, Invocation};
use error::AppResult;
use routes::{AddressFamily, BsdQuery, LinuxQuery, Platform, ResolvedRoute, RouteQuery};
use serde::Serialize;
use std::process::ExitCode;
use topology::LayoutKind;

/// Machine-readable form of one lookup pass
#[derive(Debug, Serialize)]
struct Report {
    hostname: String,
    timestamp: String,
    family: AddressFamily,
    layout: LayoutKind,
    source: ResolvedRoute,
    destination: ResolvedRoute,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let config = match Config::load() {
        Ok(Invocation::Run(config)) => config,
        Ok(Invocation::Usage(usage)) => {
            print!("{}", usage);
            return ExitCode::SUCCESS;
        }
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    // Logs go to stderr so stdout carries only the report
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_writer(std::io::stderr)
        .init();

    match run(&config).await {
        Ok(output) => {
            print!("{}", output);
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::debug!("Lookup failed: {:?}", e);
            eprintln!("error: {}", e);
            eprintln!("{}", e.user_message());
            ExitCode::FAILURE
        }
    }
}

async fn run(config: &Config) -> AppResult<String> {
    let (source, destination, family) = routes::validate_pair(&config.source, &config.destination)?;

    let platform = match config.platform {
        Some(platform) => platform,
        None => Platform::detect()?,
    };
    tracing::info!("Resolving {} -> {} ({}, {:?} tables)", source, destination, family, platform);

    match platform {
        Platform::Linux => report(&LinuxQuery, source, destination, config.json).await,
        Platform::Bsd => report(&BsdQuery, source, destination, config.json).await,
    }
}

async fn report<Q: RouteQuery>(
    query: &Q,
    source: std::net::IpAddr,
    destination: std::net::IpAddr,
    json: bool,
) -> AppResult<String> {
    let source = routes::resolve(query, source).await?;
    let destination = routes::resolve(query, destination).await?;
    let layout = topology::classify(&source, &destination);

    if !json {
        return Ok(topology::render(&layout));
    }

    let hostname = hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string());
    let report = Report {
        hostname,
        timestamp: chrono::Utc::now().to_rfc3339(),
        family: layout.family,
        layout: layout.kind,
        source,
        destination,
    };
    let mut text = serde_json::to_string_pretty(&report)?;
    text.push('\n');
    Ok(text)
}
