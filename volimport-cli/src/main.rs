mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Commands};

fn main() {
    let cli = Cli::parse();

    // Keep the guard alive until exit so buffered log lines are flushed.
    let _log_guard = match volimport::util::init_logging(
        cli.global.log_dir.as_deref(),
        &cli.global.log_level,
    ) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Import(args) => commands::import::execute(args, &cli.global),
        Commands::Resume(args) => commands::resume::execute(args, &cli.global),
        Commands::Space(args) => commands::space::execute(args),
    };

    if let Err(e) = result {
        tracing::error!(error = %e, "Command failed");
        eprintln!("Error: {:#}", e);
        drop(_log_guard);
        std::process::exit(1);
    }
}
