//! addonsync - Settings profile capture, apply and cloud sync for game add-ons
//!
//! Usage:
//!   addonsync <command> [options]   Run a command
//!   addonsync --help                Show help

use tracing_subscriber::EnvFilter;

mod cli;

/// Environment variable holding the log filter
const LOG_ENV: &str = "ADDONSYNC_LOG";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();

    if args.is_empty() || args.iter().any(|a| a == "--help" || a == "-h") {
        cli::print_help();
        return Ok(());
    }
    if args.iter().any(|a| a == "--version" || a == "-V") {
        println!("addonsync {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    init_logging();

    match cli::parse_args(&args) {
        Ok((command, options)) => cli::run(command, options).await,
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!();
            eprintln!("Run 'addonsync --help' for usage.");
            std::process::exit(2);
        }
    }
}

fn init_logging() {
    // stdout carries command output (and JSON), so logs go to stderr
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
