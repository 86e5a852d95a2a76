//! j2lab CLI - command line front end of the migration engine
//!
//! Provides:
//! - `config new` / `config lint` for the YAML configuration
//! - `dry-run` of a full migration from a JSON snapshot into memory
//! - `version`

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod commands;
pub mod logging;

use anyhow::{Context, Result};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use std::path::PathBuf;

pub use commands::Outcome;

/// The `j2lab` command tree
#[must_use]
pub fn cli() -> Command {
    let config_arg = || {
        Arg::new("config")
            .long("config")
            .short('c')
            .required(true)
            .value_parser(value_parser!(PathBuf))
            .help("Migration config file (YAML)")
    };

    Command::new("j2lab")
        .version(clap::crate_version!())
        .about("Migrate a Jira project into GitLab")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("verbose")
                .long("verbose")
                .short('v')
                .action(ArgAction::Count)
                .global(true)
                .help("More log output; repeat for more"),
        )
        .arg(
            Arg::new("quiet")
                .long("quiet")
                .short('q')
                .action(ArgAction::SetTrue)
                .global(true)
                .help("Only log errors"),
        )
        .arg(
            Arg::new("log-json")
                .long("log-json")
                .action(ArgAction::SetTrue)
                .global(true)
                .help("Log as JSON lines"),
        )
        .subcommand(
            Command::new("config")
                .about("Create or check a config file")
                .subcommand_required(true)
                .subcommand(
                    Command::new("new")
                        .about("Write a starter config")
                        .arg(
                            Arg::new("output")
                                .long("output")
                                .short('o')
                                .value_parser(value_parser!(PathBuf))
                                .help("Write here instead of stdout"),
                        )
                        .arg(
                            Arg::new("force")
                                .long("force")
                                .action(ArgAction::SetTrue)
                                .help("Overwrite an existing file"),
                        ),
                )
                .subcommand(Command::new("lint").about("Load and validate a config").arg(config_arg())),
        )
        .subcommand(
            Command::new("dry-run")
                .about("Run a full migration from a snapshot into memory")
                .arg(config_arg())
                .arg(
                    Arg::new("snapshot")
                        .long("snapshot")
                        .short('s')
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("Source snapshot (JSON)"),
                )
                .arg(
                    Arg::new("json")
                        .long("json")
                        .action(ArgAction::SetTrue)
                        .help("Print the report as JSON"),
                ),
        )
        .subcommand(Command::new("version").about("Print the version"))
}

/// Logging flags shared by every subcommand
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogFlags {
    pub verbosity: u8,
    pub quiet: bool,
    pub json: bool,
}

impl LogFlags {
    #[must_use]
    pub fn from_matches(matches: &ArgMatches) -> Self {
        Self {
            verbosity: matches.get_count("verbose"),
            quiet: matches.get_flag("quiet"),
            json: matches.get_flag("log-json"),
        }
    }
}

fn path<'m>(matches: &'m ArgMatches, id: &str) -> Result<&'m PathBuf> {
    matches
        .get_one::<PathBuf>(id)
        .with_context(|| format!("missing --{id}"))
}

/// Dispatch parsed arguments to their command
///
/// # Errors
/// The failure of the selected command.
pub async fn run(matches: &ArgMatches) -> Result<Outcome> {
    match matches.subcommand() {
        Some(("config", config)) => match config.subcommand() {
            Some(("new", args)) => {
                let output = args.get_one::<PathBuf>("output").map(PathBuf::as_path);
                commands::config_new(output, args.get_flag("force"))
            }
            Some(("lint", args)) => commands::config_lint(path(args, "config")?),
            _ => anyhow::bail!("unknown config command"),
        },
        Some(("dry-run", args)) => {
            commands::dry_run(path(args, "config")?, path(args, "snapshot")?, args.get_flag("json")).await
        }
        Some(("version", _)) => Ok(commands::version()),
        _ => anyhow::bail!("no command given"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_tree_is_consistent() {
        cli().debug_assert();
    }

    #[test]
    fn global_flags_reach_subcommands() {
        let matches = cli()
            .try_get_matches_from(["j2lab", "dry-run", "-vv", "--config", "c.yaml", "--snapshot", "s.json", "--log-json"])
            .unwrap();
        let flags = LogFlags::from_matches(&matches);
        assert_eq!(flags.verbosity, 2);
        assert!(flags.json);
        assert!(!flags.quiet);
    }

    #[test]
    fn lint_requires_a_config() {
        assert!(cli().try_get_matches_from(["j2lab", "config", "lint"]).is_err());
    }
}
