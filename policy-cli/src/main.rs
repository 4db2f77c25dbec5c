use clap::Parser;
use colored::*;
use policy_engine::init_tracing;
use tracing::debug;

use policy_cli::{run_with, Cli};

fn main() {
    let cli = Cli::parse();

    let result = cli.load_config().and_then(|config| {
        if let Err(e) = init_tracing(&cli.logging(&config)) {
            eprintln!("{}: {}", "Failed to initialize logging".bright_yellow(), e);
        }
        debug!(policy = %cli.policy.display(), command = ?cli.command, "Running policyctl");
        run_with(&cli, &config)?.render(cli.json)
    });

    match result {
        Ok(text) => {
            if !text.is_empty() {
                println!("{text}");
            }
        }
        Err(e) => {
            eprintln!("{}: {:#}", "error".bright_red(), e);
            std::process::exit(1);
        }
    }
}
