pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "leadline",
    about = "Leadline operator CLI",
    long_about = "Apply migrations, load the demo CRM dataset, inspect configuration and check runtime readiness.",
    after_help = "Examples:\n  leadline doctor --json\n  leadline config\n  leadline seed --clean"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Reload the deterministic demo CRM dataset and verify it")]
    Seed {
        #[arg(long, help = "Remove the demo dataset without loading it again")]
        clean: bool,
    },
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(
        about = "Validate config, database schema, API keys and provider credential readiness"
    )]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Seed { clean } => commands::seed::run(clean),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => commands::doctor::run(json),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
