use autosorter::cli::{Cli, run_cli};
use autosorter::output::OutputFormatter;
use clap::Parser;
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = run_cli(cli) {
        OutputFormatter::error(&format!("{:#}", e));
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
