mod cli;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

fn main() {
    if let Err(err) = run() {
        eprintln!("{err:?}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(filter)
        .init();

    let args = cli::Cli::parse();
    let config = pipeline::config::load_config(args.config.as_deref())?;
    cli::dispatch(args.command, &config)
}
