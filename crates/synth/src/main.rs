//! `infra-synth` — declaration synthesiser entry point.
//!
//! Startup sequence:
//! 1. Parse command-line arguments.
//! 2. Load and validate [`Config`] from environment variables.
//! 3. Initialise structured JSON logging.
//! 4. Build and validate the three stack templates in dependency order.
//! 5. Unless `--check` was given, write the templates to the output directory.

mod app;
mod config;
mod stacks;
mod telemetry;

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing::info;

use config::Config;

/// Synthesise the network, security, and workload stack declarations.
#[derive(Debug, Parser)]
#[command(name = "infra-synth", version, about)]
struct Args {
    /// Directory the stack templates are written into.
    #[arg(long, default_value = "out")]
    out_dir: PathBuf,

    /// Validate the declaration without writing any files.
    #[arg(long)]
    check: bool,

    /// Pretty-print the emitted JSON.
    #[arg(long)]
    pretty: bool,
}

fn main() -> Result<()> {
    // -----------------------------------------------------------------------
    // 1. Arguments
    // -----------------------------------------------------------------------
    let args = Args::parse();

    // -----------------------------------------------------------------------
    // 2. Configuration
    // -----------------------------------------------------------------------
    let cfg = Config::from_env().map_err(|e| {
        // Telemetry is not yet up; write to stderr directly.
        eprintln!("ERROR: configuration invalid: {e:#}");
        e
    })?;

    // -----------------------------------------------------------------------
    // 3. Telemetry
    // -----------------------------------------------------------------------
    telemetry::init(&cfg.log_level)?;
    info!(
        version = env!("CARGO_PKG_VERSION"),
        zones = cfg.zone_count,
        "infra-synth starting"
    );

    // -----------------------------------------------------------------------
    // 4. Synthesis
    // -----------------------------------------------------------------------
    let assembly = app::App::new(cfg).synth()?;
    for stack in &assembly.stacks {
        info!(
            stack = %stack.name,
            resources = stack.template.resources.len(),
            exports = stack.template.export_names().count(),
            "stack synthesised"
        );
    }

    // -----------------------------------------------------------------------
    // 5. Output
    // -----------------------------------------------------------------------
    if args.check {
        info!("declaration valid; no files written");
        return Ok(());
    }
    let written = assembly.write_to(&args.out_dir, args.pretty)?;
    for path in &written {
        info!(path = %path.display(), "template written");
    }

    Ok(())
}
