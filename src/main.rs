//! opnaudit CLI entry point.

use clap::Parser;
use opnaudit::cli::{self, Cli, Commands, EXIT_ERROR};

fn main() {
    opnaudit::logging::init();
    let cli = Cli::parse();

    let exit_code = match cli.command {
        Commands::Audit(args) => match cli::run_audit(&args) {
            Ok(code) => code,
            Err(e) => {
                eprintln!("Error: {}", e);
                EXIT_ERROR
            }
        },
        Commands::Plugins(args) => match cli::run_plugins(&args) {
            Ok(code) => code,
            Err(e) => {
                eprintln!("Error: {}", e);
                EXIT_ERROR
            }
        },
    };

    std::process::exit(exit_code);
}
