use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Run package tests discovered under one or more directory trees.
#[derive(Parser, Debug)]
#[command(name = "ptest-runner", version, about)]
pub struct Cli {
    /// Root directory to scan for ptests (repeatable)
    #[arg(short = 'd', long = "dir", required = true)]
    pub dir: Vec<PathBuf>,

    /// Name to drop from the combined registry (repeatable)
    #[arg(short = 'x', long = "exclude")]
    pub exclude: Vec<String>,

    /// Restrict the run to named tests (repeatable, empty = all)
    #[arg(short = 'r', long = "run-ptest")]
    pub run_ptest: Vec<String>,

    /// Inactivity timeout in seconds
    #[arg(short = 't', long = "timeout", default_value_t = DEFAULT_TIMEOUT_SECS)]
    pub timeout: u64,

    /// List discovered tests instead of running them
    #[arg(short = 'l', long = "list")]
    pub list: bool,

    /// Write an XML report to this path
    #[arg(short = 'o', long = "xml")]
    pub xml: Option<PathBuf>,

    /// Increase log verbosity (repeatable)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    pub fn timeout_duration(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }
}
