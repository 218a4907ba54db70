// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use std::path::PathBuf;

use clap::{CommandFactory, FromArgMatches, Parser, Subcommand};

use crate::app::types::{JobFilters, JobStatus, MethodType};

#[derive(Debug, Parser)]
#[command(
    name = "analysisd",
    version,
    about = "Submits and tracks analysis jobs on a Slurm cluster",
    long_about = None,
    after_help = "Configuration precedence: defaults < config file < command-line flags.\n\
Config path precedence: defaults < ANALYSISD_CONFIG_PATH < command-line flags.\n\
If --config is omitted, analysisd tries ANALYSISD_CONFIG_PATH, then the default config file location; missing default config is OK.\n\
Paths in the config file are resolved relative to the config file directory; paths passed as flags are resolved relative to the current working directory."
)]
pub struct Opts {
    #[arg(
        short,
        long,
        global = true,
        value_name = "PATH",
        help = "Path to a TOML config file. When omitted, analysisd uses ANALYSISD_CONFIG_PATH if set, otherwise the default config file location if available."
    )]
    pub config: Option<PathBuf>,
    #[arg(
        long,
        global = true,
        value_name = "PATH",
        help = "Path to the SQLite job database. Overrides `database_path` from the config file."
    )]
    pub database_path: Option<PathBuf>,
    #[arg(
        long,
        global = true,
        value_name = "NAME",
        help = "Slurm partition to submit to. Overrides `partition` from the config file."
    )]
    pub partition: Option<String>,
    #[arg(
        long,
        global = true,
        value_name = "SECS",
        help = "How often `serve` polls tracked jobs. Overrides `job_check_interval_secs` from the config file."
    )]
    pub job_check_interval_secs: Option<u64>,
    #[arg(
        short,
        long,
        global = true,
        action = clap::ArgAction::SetTrue,
        help = "Enable debug logging. Overrides `verbose` from the config file."
    )]
    pub verbose: bool,
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Poll tracked jobs on an interval until interrupted (default).
    Serve,
    /// Check that Slurm is reachable and the partition is up.
    Health,
    /// Inspect and manage tracked jobs.
    Jobs {
        #[command(subcommand)]
        command: JobsCommand,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum JobsCommand {
    /// List recorded jobs, newest last.
    List {
        #[arg(long, value_name = "USER")]
        user: Option<String>,
        #[arg(long, value_name = "METHOD")]
        method: Option<MethodType>,
        #[arg(long, value_name = "STATUS")]
        status: Option<JobStatus>,
        #[arg(long, value_name = "ID")]
        alignment: Option<String>,
        #[arg(long, value_name = "ID")]
        tree: Option<String>,
    },
    /// Show recorded metadata for a job.
    Show {
        job_id: String,
        #[arg(long, value_name = "USER")]
        user: Option<String>,
    },
    /// Poll the scheduler for the current status of a job.
    Status {
        job_id: String,
        #[arg(long, value_name = "USER")]
        user: Option<String>,
    },
    /// Cancel a running or pending job.
    Cancel {
        job_id: String,
        #[arg(long, value_name = "USER")]
        user: Option<String>,
    },
}

impl JobsCommand {
    /// Filters for `jobs list`; `None` for the other subcommands.
    pub fn filters(&self) -> Option<JobFilters> {
        let JobsCommand::List {
            user,
            method,
            status,
            alignment,
            tree,
        } = self
        else {
            return None;
        };
        let mut filters = JobFilters::default();
        if let Some(user) = user {
            filters = filters.owner(user);
        }
        if let Some(method) = method {
            filters = filters.method(method.as_str());
        }
        if let Some(status) = status {
            filters = filters.status(*status);
        }
        if let Some(alignment) = alignment {
            filters = filters.alignment(alignment);
        }
        if let Some(tree) = tree {
            filters = filters.tree(tree);
        }
        Some(filters)
    }
}

pub struct ParsedOpts {
    pub opts: Opts,
    pub verbose_override: Option<bool>,
}

const HELP_TEMPLATE: &str = "\
{before-help}{name} {version}
{about-with-newline}{usage-heading} {usage}

{all-args}{after-help}
";

fn apply_help_template_recursively(cmd: &mut clap::Command) {
    let mut owned = std::mem::take(cmd).help_template(HELP_TEMPLATE);
    for sub in owned.get_subcommands_mut() {
        apply_help_template_recursively(sub);
    }
    *cmd = owned;
}

pub fn cli_command() -> clap::Command {
    let mut cmd = Opts::command();
    apply_help_template_recursively(&mut cmd);
    cmd
}

fn from_matches(matches: &clap::ArgMatches) -> Result<ParsedOpts, clap::Error> {
    let verbose_override = matches.get_flag("verbose").then_some(true);
    let opts = Opts::from_arg_matches(matches)?;
    Ok(ParsedOpts {
        opts,
        verbose_override,
    })
}

pub fn parse_opts() -> ParsedOpts {
    let matches = cli_command().get_matches();
    from_matches(&matches).unwrap_or_else(|err| err.exit())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> ParsedOpts {
        let matches = cli_command()
            .try_get_matches_from(std::iter::once("analysisd").chain(args.iter().copied()))
            .unwrap();
        from_matches(&matches).unwrap()
    }

    #[test]
    fn command_definition_is_consistent() {
        cli_command().debug_assert();
    }

    #[test]
    fn no_subcommand_means_serve_defaults() {
        let parsed = parse(&[]);
        assert!(parsed.opts.command.is_none());
        assert_eq!(parsed.verbose_override, None);
    }

    #[test]
    fn global_flags_accepted_after_subcommand() {
        let parsed = parse(&["jobs", "status", "abc", "--partition", "debug", "-v"]);
        assert_eq!(parsed.opts.partition.as_deref(), Some("debug"));
        assert_eq!(parsed.verbose_override, Some(true));
        assert_eq!(
            parsed.opts.command,
            Some(Command::Jobs {
                command: JobsCommand::Status {
                    job_id: "abc".into(),
                    user: None,
                }
            })
        );
    }

    #[test]
    fn list_flags_become_filters() {
        let parsed = parse(&[
            "jobs", "list", "--user", "alice", "--method", "fel", "--status", "running",
        ]);
        let Some(Command::Jobs { command }) = parsed.opts.command else {
            panic!("expected jobs subcommand");
        };
        let filters = command.filters().unwrap();
        assert_eq!(filters.owner.as_deref(), Some("alice"));
        assert_eq!(filters.method_type.as_deref(), Some("fel"));
        assert_eq!(filters.status, Some(JobStatus::Running));
        assert!(filters.alignment_id.is_none());
    }

    #[test]
    fn unknown_status_is_rejected() {
        let result = cli_command().try_get_matches_from(["analysisd", "jobs", "list", "--status", "bogus"]);
        assert!(result.is_err());
    }
}
