//! CLI argument parsing for Retrazar

use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "retrazar")]
#[command(version)]
#[command(about = "Resolve -finstrument-functions markers into a nested call view", long_about = None)]
pub struct Cli {
    /// Output file of the traced system (may still be growing) containing the
    /// markers produced by -finstrument-functions
    #[arg(long = "stdout_file", value_name = "PATH")]
    pub stdout_file: PathBuf,

    /// Disassembly listing (.lst) mapping hex addresses to symbol names
    #[arg(long = "symbols_file", value_name = "PATH")]
    pub symbols_file: PathBuf,

    /// Seconds to wait for new input before exiting (0 = wait forever)
    #[arg(long = "timeout", value_name = "SECS", default_value = "0")]
    pub timeout: u64,
}
