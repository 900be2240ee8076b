use anyhow::Result;
use clap::Parser;
use ptest_core::{Registry, RunOptions};
use std::io;

mod cli;
mod listing;
mod supervisor;

use cli::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => "ptest_runner=info,ptest_process=info,ptest_discover=info",
        1 => "ptest_runner=debug,ptest_process=debug,ptest_discover=debug",
        _ => "debug",
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_level.into()),
        )
        .try_init()
        .ok();

    let exit_code = run_cli(cli).await;
    std::process::exit(exit_code);
}

async fn run_cli(cli: Cli) -> i32 {
    let mut combined = Registry::new();
    for root in &cli.dir {
        match ptest_discover::discover(root) {
            Ok(found) => {
                for test in found {
                    combined.push_if_new(test);
                }
            }
            Err(e) => {
                eprintln!("ptest-runner: {} : {e}", root.display());
                return 255;
            }
        }
    }

    let excluded = ptest_discover::exclude(&combined, &cli.exclude);
    let selected = if cli.run_ptest.is_empty() {
        excluded
    } else {
        match ptest_discover::filter(&excluded, &cli.run_ptest) {
            Ok(filtered) => filtered,
            Err(e) => {
                eprintln!("ptest-runner: {e}");
                return 255;
            }
        }
    };

    if cli.list {
        listing::print(&selected, &mut io::stdout());
        return if selected.is_empty() { 1 } else { 0 };
    }

    let options = RunOptions {
        roots: cli.dir.clone(),
        excludes: cli.exclude.clone(),
        selected: cli.run_ptest.clone(),
        list_only: false,
        timeout: cli.timeout_duration(),
        xml_path: cli.xml.clone(),
    };

    let stdout = io::stdout();
    let stderr = io::stderr();
    let code = supervisor::run(
        &selected,
        &options,
        "ptest-runner",
        stdout.lock(),
        stderr.lock(),
    )
    .await;

    if code == supervisor::SETUP_FAILURE {
        255
    } else {
        code.clamp(0, 254)
    }
}
