use anyhow::{Context, Result};
use clap::Parser;
use retrazar::{cli::Cli, reader, reformat::TraceReformatter, symbols::SymbolResolver};
use std::fs::File;
use std::io::Write;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Initialize tracing subscriber for debug output
///
/// Stdout carries the reformatted stream, so diagnostics go to stderr and
/// stay silent unless RUST_LOG asks for them.
fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let args = Cli::parse();

    init_tracing();
    tracing::info!("Processing {}", args.stdout_file.display());

    let stream = reader::open_nonblocking(&args.stdout_file)?;
    let symbols = File::open(&args.symbols_file).with_context(|| {
        format!("Failed to open symbols file: {}", args.symbols_file.display())
    })?;

    let mut reformatter = TraceReformatter::new(SymbolResolver::new(symbols))?;
    let mut stream = reader::TimedLineReader::new(stream);

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    reformatter.run(&mut stream, Duration::from_secs(args.timeout), &mut out)?;
    out.flush().context("Failed to flush output")?;

    Ok(())
}
