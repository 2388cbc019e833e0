//! Teiki transition verifier.
//!
//! Loads the protocol parameters and component registry, reads one proposed
//! transition as JSON and prints the verdict. Exits with status 1 when the
//! transition is rejected.

mod config;

use std::io::Read;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use serde_json::json;
use teiki_core::codec;
use teiki_decay::TeikiDecayEngine;
use teiki_validator::{Transition, TransitionValidator};
use tracing::{debug, info};

use crate::config::VerifyConfig;

#[derive(Parser, Debug)]
#[command(
    name = "teiki-verify",
    version,
    about = "Validate a proposed Teiki backing or treasury transition"
)]
struct Args {
    /// TOML file with `[params]` and `[registry]` tables
    #[arg(long)]
    params: Option<PathBuf>,

    /// Transition JSON file ("-" reads stdin)
    #[arg(long, default_value = "-")]
    transition: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Log output format ("text" or "json")
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Include certificate identities and the encoded successor record
    #[arg(long)]
    print_identities: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level, &args.log_format);

    let config = VerifyConfig::load(args.params.as_deref())?;
    debug!(params = ?config.params, "configuration loaded");

    let validator = TransitionValidator::new(
        config.params,
        config.registry,
        Arc::new(TeikiDecayEngine::new()),
    )
    .context("building validator")?;

    let raw = read_input(&args.transition)?;
    let tx: Transition = serde_json::from_str(&raw).context("parsing transition JSON")?;
    info!(project = %tx.project.project_id, action = ?tx.action, "verifying transition");

    match validator.validate(&tx) {
        Ok(verdict) => {
            let mut report = json!({
                "accepted": true,
                "total_reward": verdict.total_reward(),
                "withered": verdict.issuance.withered,
                "settlement": verdict.settlement.as_ref().map(|s| json!({
                    "burn_amount": s.burn_amount,
                    "teiki_mint": s.teiki_mint.to_string(),
                    "epochs": s.epochs,
                    "successor": s.successor,
                })),
            });
            if args.print_identities {
                report["certificates"] = json!(verdict
                    .certificate_identities()
                    .iter()
                    .map(|h| h.to_string())
                    .collect::<Vec<_>>());
                if let Some(successor) = verdict.successor() {
                    report["successor_identity"] = json!(successor.identity().to_string());
                    report["successor_datum"] = json!(hex::encode(codec::to_bytes(successor)));
                }
            }
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Err(e) => {
            let report = json!({ "accepted": false, "reason": e.to_string() });
            println!("{}", serde_json::to_string_pretty(&report)?);
            process::exit(1);
        }
    }
}

fn read_input(source: &str) -> Result<String> {
    if source == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("reading transition from stdin")?;
        Ok(buf)
    } else {
        std::fs::read_to_string(source).with_context(|| format!("reading {source}"))
    }
}

/// Initialize tracing subscriber with the given log level and output format.
///
/// Logs go to stderr so the verdict on stdout stays machine-readable.
fn init_logging(level_str: &str, format: &str) {
    use tracing_subscriber::filter::EnvFilter;
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level_str));

    if format == "json" {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init();
    }
}
