//! Folio CLI
//!
//! Incremental, multi-language static site generator.
//!
//! This is the binary entry point. The library functionality is in `lib.rs`.

use std::path::PathBuf;

use clap::Parser;
use color_eyre::eyre::Result;
use folio_core::{BuildOverrides, PluginFailMode};

/// Command-line interface for Folio.
#[derive(Parser)]
#[command(
    name = "folio",
    version,
    about = "Incremental, multi-language static site generator"
)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "folio.toml")]
    config: PathBuf,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

/// Available CLI commands.
#[derive(clap::Subcommand)]
enum Commands {
    /// Build every language variant of the site
    Build {
        /// Output directory
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Override site base URL (e.g., https://example.com)
        #[arg(long)]
        base_url: Option<String>,
        /// Delete the output directory before building
        #[arg(long)]
        clean: bool,
        /// Render every page and leave the manifest untouched
        #[arg(long)]
        no_incremental: bool,
        /// Render every page and rewrite the manifest
        #[arg(long)]
        force: bool,
        /// Include draft content
        #[arg(long)]
        drafts: bool,
        /// How plugin failures are handled (strict, warn)
        #[arg(long)]
        plugin_fail_mode: Option<PluginFailMode>,
        /// Write a JSON build metrics report to this path
        #[arg(long)]
        metrics: Option<PathBuf>,
    },
    /// Validate configuration and content
    Check {
        /// Treat warnings as errors
        #[arg(long)]
        strict: bool,
    },
}

impl Commands {
    /// Build flags as configuration overrides. Unset flags leave the file's values alone.
    fn overrides(&self) -> Option<BuildOverrides> {
        let Self::Build {
            output,
            base_url,
            clean,
            no_incremental,
            force,
            drafts,
            plugin_fail_mode,
            metrics,
        } = self
        else {
            return None;
        };

        Some(BuildOverrides {
            output_dir: output.clone(),
            base_url: base_url.clone(),
            clean: clean.then_some(true),
            incremental: no_incremental.then_some(false),
            force: force.then_some(true),
            drafts: drafts.then_some(true),
            plugin_fail_mode: *plugin_fail_mode,
            metrics_path: metrics.clone(),
        })
    }
}

fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    folio::init_tracing(cli.verbose);

    if let Some(overrides) = cli.command.overrides() {
        folio::cmd::build::run(&cli.config, overrides)?;
    } else if let Commands::Check { strict } = cli.command {
        folio::cmd::check::run(&cli.config, strict)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[test]
    fn test_cli_build_command_parsing() {
        let args = ["folio", "build", "--output", "dist"];
        let cli = Cli::parse_from(args);

        assert_eq!(cli.config, PathBuf::from("folio.toml"));
        assert_eq!(cli.verbose, 0);

        let overrides = cli.command.overrides().unwrap();
        assert_eq!(overrides.output_dir, Some(PathBuf::from("dist")));
        assert!(overrides.clean.is_none());
        assert!(overrides.incremental.is_none());
        assert!(overrides.plugin_fail_mode.is_none());
    }

    #[test]
    fn test_cli_build_flags() {
        let args = [
            "folio",
            "-vv",
            "build",
            "--clean",
            "--no-incremental",
            "--plugin-fail-mode",
            "strict",
            "--metrics",
            "metrics.json",
        ];
        let cli = Cli::parse_from(args);
        assert_eq!(cli.verbose, 2);

        let overrides = cli.command.overrides().unwrap();
        assert_eq!(overrides.clean, Some(true));
        assert_eq!(overrides.incremental, Some(false));
        assert_eq!(overrides.plugin_fail_mode, Some(PluginFailMode::Strict));
        assert_eq!(overrides.metrics_path, Some(PathBuf::from("metrics.json")));
    }

    #[test]
    fn test_cli_check_command_parsing() {
        let args = ["folio", "--config", "site/folio.toml", "check", "--strict"];
        let cli = Cli::parse_from(args);

        assert_eq!(cli.config, PathBuf::from("site/folio.toml"));
        assert!(cli.command.overrides().is_none());
        match cli.command {
            Commands::Check { strict } => assert!(strict),
            Commands::Build { .. } => panic!("Expected Check command"),
        }
    }

    #[test]
    fn test_cli_rejects_unknown_fail_mode() {
        let args = ["folio", "build", "--plugin-fail-mode", "loud"];
        assert!(Cli::try_parse_from(args).is_err());
    }
}
