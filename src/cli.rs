use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context as _;
use clap::{Args, Parser, Subcommand, ValueEnum};
use url::Url;

use crate::policy::{RepairPolicy, Substitution};
use crate::probe::ProbeConfig;

#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Probe every link and repair dead ones, one document at a time.
    Validate(ValidateArgs),
    /// Blank links that exist in only one language of a form's table pair.
    Parity(ParityArgs),
    /// Run `validate` and then `parity` with one shared probe cache.
    Repair(RepairArgs),
}

#[derive(Debug, Clone, Args)]
pub struct CommonArgs {
    /// Newline-delimited list of form slugs.
    #[arg(long)]
    pub manifest: String,

    /// Directory holding `<slug>-table-e.htm` / `<slug>-table-f.htm`.
    #[arg(long)]
    pub results: String,

    /// Decide and report without writing documents or backups.
    #[arg(long)]
    pub dry_run: bool,

    /// Append this run's change records (JSON Lines) to a file.
    #[arg(long)]
    pub change_log: Option<String>,

    /// Rows with fewer cells than this are left alone.
    #[arg(long, default_value_t = 2)]
    pub min_cells: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum RepairTrigger {
    /// Repair only links that answer 404.
    NotFound,
    /// Repair any link that is not live (4xx, 5xx, timeouts, transport errors).
    AnyFailure,
}

#[derive(Debug, Clone, Args)]
pub struct ProbeArgs {
    /// Per-request timeout.
    #[arg(long, default_value_t = 15, value_parser = clap::value_parser!(u64).range(1..))]
    pub timeout_secs: u64,

    /// Base URL for relative hrefs.
    #[arg(long, default_value = "https://www.canada.ca")]
    pub base_url: String,

    /// Which probe outcome makes a link eligible for repair.
    #[arg(long, value_enum, default_value_t = RepairTrigger::NotFound)]
    pub trigger: RepairTrigger,

    /// File-name prefix rewrite tried before blanking, as FROM=TO (repeatable).
    #[arg(long = "substitute", default_value = "5000-=5100-")]
    pub substitutions: Vec<Substitution>,
}

impl ProbeArgs {
    pub fn probe_config(&self) -> anyhow::Result<ProbeConfig> {
        let base_url = Url::parse(&self.base_url).context("parse --base-url")?;
        Ok(ProbeConfig::from_env(
            Duration::from_secs(self.timeout_secs),
            Some(base_url),
        ))
    }

    pub fn policy(&self) -> RepairPolicy {
        RepairPolicy {
            trigger: self.trigger,
            substitutions: self.substitutions.clone(),
        }
    }
}

#[derive(Debug, Args)]
pub struct ValidateArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    #[command(flatten)]
    pub probe: ProbeArgs,
}

#[derive(Debug, Args)]
pub struct ParityArgs {
    #[command(flatten)]
    pub common: CommonArgs,
}

#[derive(Debug, Args)]
pub struct RepairArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    #[command(flatten)]
    pub probe: ProbeArgs,
}

impl CommonArgs {
    pub fn results_dir(&self) -> PathBuf {
        PathBuf::from(&self.results)
    }
}
