//! CLI command definitions and dispatch.

pub mod plan;
pub mod synth;
pub mod teardown;

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use stackline_common::config::StacklineConfig;
use stackline_common::constants;

/// Stackline: Cross-stack network and container service topology.
#[derive(Parser, Debug)]
#[command(name = "stackline", version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,

    /// Configuration file (JSON, or YAML by extension).
    #[arg(long, global = true, env = "STACKLINE_CONFIG", default_value = constants::DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    pub json_logs: bool,
}

/// Available CLI subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Compose, validate and write the cloud assembly and image asset.
    Synth(synth::SynthArgs),
    /// Display stacks and resources in creation order.
    Plan(plan::PlanArgs),
    /// Display the order resources are destroyed in.
    Teardown(teardown::TeardownArgs),
}

/// Dispatches the parsed CLI command to its handler.
///
/// # Errors
///
/// Returns an error if the command execution fails.
pub fn execute(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(&cli.config)?;
    match cli.command {
        Command::Synth(args) => synth::execute(args, config),
        Command::Plan(args) => plan::execute(args, config),
        Command::Teardown(args) => teardown::execute(args, config),
    }
}

/// Loads the configuration file.
///
/// A missing file at the default location means "use the defaults"; a
/// missing file given explicitly is an error.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed.
pub fn load_config(path: &Path) -> anyhow::Result<StacklineConfig> {
    if !path.exists() && path == Path::new(constants::DEFAULT_CONFIG_FILE) {
        tracing::debug!("no configuration file, using defaults");
        return Ok(StacklineConfig::default());
    }
    StacklineConfig::load(path)
        .with_context(|| format!("failed to load configuration from {}", path.display()))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used, clippy::unwrap_used)]

    use super::*;

    #[test]
    fn cli_parses_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "stackline",
            "synth",
            "--out-dir",
            "build/out",
            "--config",
            "infra.yaml",
            "--json-logs",
        ])
        .expect("parse");
        assert!(cli.json_logs);
        assert_eq!(cli.config, PathBuf::from("infra.yaml"));
        assert!(matches!(cli.command, Command::Synth(ref a) if a.out_dir == Path::new("build/out")));
    }

    #[test]
    fn explicit_missing_config_is_an_error() {
        let dir = tempfile::tempdir().expect("failed to create tempdir");
        assert!(load_config(&dir.path().join("absent.json")).is_err());
    }

    #[test]
    fn config_file_overrides_defaults() {
        let dir = tempfile::tempdir().expect("failed to create tempdir");
        let path = dir.path().join("stackline.yaml");
        std::fs::write(&path, "network:\n  max_azs: 3\n").expect("write");
        let config = load_config(&path).expect("load");
        assert_eq!(config.network.max_azs, 3);
    }
}
