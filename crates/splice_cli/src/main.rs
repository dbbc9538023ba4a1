// SPDX-License-Identifier: MIT OR Apache-2.0
//! `splice` - replays timeline session scripts.
//!
//! Loads a RON session, builds the timeline against the in-memory backing
//! engine, runs its commands and prints the resulting document as JSON.
//!
//! Set `RUST_LOG` to adjust logging; the default shows timeline debug output.

mod session;

use clap::Parser;
use session::Session;
use splice_timeline::TimelineConfig;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Debug, Parser)]
#[command(version, about = "Replay a timeline session script")]
struct Args {
    /// Session script (RON)
    session: PathBuf,

    /// Timeline settings (RON), replacing the session's own
    #[arg(long)]
    config: Option<PathBuf>,

    /// Exit with an error status when any command fails
    #[arg(long)]
    strict: bool,
}

fn run(args: &Args) -> Result<bool, Box<dyn std::error::Error>> {
    let mut session = Session::load(&args.session)?;
    if let Some(path) = &args.config {
        session.config = TimelineConfig::load(path)?;
    }

    let report = session.run()?;
    println!("{}", report.to_json()?);

    let failures = report.failures();
    if failures > 0 {
        tracing::warn!(failures, "some commands failed");
    }
    Ok(failures == 0)
}

fn main() -> ExitCode {
    let args = Args::parse();

    let mut env_filter = tracing_subscriber::EnvFilter::from_default_env();
    if let Ok(directive) = "splice_timeline=debug".parse() {
        env_filter = env_filter.add_directive(directive);
    }
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    tracing::info!("Starting splice v{}", env!("CARGO_PKG_VERSION"));

    match run(&args) {
        Ok(clean) if clean || !args.strict => ExitCode::SUCCESS,
        Ok(_) => ExitCode::FAILURE,
        Err(error) => {
            tracing::error!("Session failed: {error}");
            ExitCode::FAILURE
        }
    }
}
