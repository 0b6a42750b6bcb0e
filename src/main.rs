use std::process::ExitCode;

use anyhow::Context as _;
use clap::Parser as _;

fn main() -> ExitCode {
    match try_main() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{err:#}");
            ExitCode::FAILURE
        }
    }
}

fn try_main() -> anyhow::Result<ExitCode> {
    formlinks::logging::init().context("init logging")?;

    let cli = formlinks::cli::Cli::parse();
    tracing::debug!(?cli, "parsed cli");

    let summary = match cli.command {
        formlinks::cli::Command::Validate(args) => {
            formlinks::validate::run(args).context("validate")?
        }
        formlinks::cli::Command::Parity(args) => formlinks::parity::run(args).context("parity")?,
        formlinks::cli::Command::Repair(args) => formlinks::repair::run(args).context("repair")?,
    };

    println!("{summary}");
    if summary.has_fatal_errors() {
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}
