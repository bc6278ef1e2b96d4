//! Warden - request classification front door
//!
//! Runs metadata and reputation lookups through the same caches the gateway
//! uses and prints the results as JSON.

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use warden::{
    config::{Args, Command, LogFormat},
    Warden,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    // Logs go to stderr; stdout carries the JSON report
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("warden={},warn", args.log_level).into());
    let registry = tracing_subscriber::registry().with(filter);
    match args.log_format {
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init(),
        LogFormat::Text => registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init(),
    }

    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    info!("Node ID: {}", args.node_id);
    info!("Target: {}", args.og.target);
    info!(
        "OG passthrough: {}",
        if args.og.og_passthrough { "on" } else { "off" }
    );
    info!("DNSBL zone: {}", args.dnsbl.dnsbl_zone);

    let warden = Warden::from_args(&args)?;

    match &args.command {
        Command::Metadata {
            url,
            host,
            default_title,
            repeat,
        } => {
            for _ in 0..(*repeat).max(1) {
                let report = warden.describe(url, host, default_title).await;
                println!("{}", serde_json::to_string_pretty(&report)?);
            }
        }
        Command::Reputation { ips } => {
            let reports =
                futures::future::join_all(ips.iter().map(|ip| warden.check(*ip))).await;
            println!("{}", serde_json::to_string_pretty(&reports)?);
        }
    }

    Ok(())
}
