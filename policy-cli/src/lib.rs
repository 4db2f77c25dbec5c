//! Command-line front end for policy files.
//!
//! A policy file holds one `section, field, ...` row per line. Queries load
//! the file into an [`Enforcer`]; mutations apply in memory and then write
//! the whole file back.
//!
//! ```bash
//! policyctl --policy rbac_policy.csv enforce alice data2 read --explain
//! policyctl --policy rbac_policy.csv list subjects
//! policyctl --policy rbac_policy.csv roles alice
//! policyctl --policy rbac_policy.csv add-role eve data3_admin
//! ```

pub mod file_adapter;

pub use file_adapter::FileAdapter;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::*;
use policy_engine::{EngineConfig, Enforcer, LoggingConfig, Tuple};
use serde::Serialize;
use std::path::PathBuf;

/// Inspect and edit policy files
#[derive(Parser, Debug)]
#[command(name = "policyctl")]
#[command(about = "Query and manage role-based access policy files")]
pub struct Cli {
    /// Policy file to operate on
    #[arg(short, long, env = "POLICYCTL_POLICY")]
    pub policy: PathBuf,

    /// Engine configuration file (YAML, TOML or JSON)
    #[arg(short, long)]
    pub config: Option<String>,

    /// Enable debug logging, overriding the configured level
    #[arg(short, long)]
    pub verbose: bool,

    /// Print results as JSON
    #[arg(long)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Decide a request, e.g. `enforce alice data1 read`
    Enforce {
        #[arg(required = true)]
        request: Vec<String>,
        /// Also print the rule that settled the decision
        #[arg(long)]
        explain: bool,
    },
    /// List distinct values or whole sections
    List {
        #[arg(value_enum)]
        what: ListTarget,
    },
    /// Every role a name reaches, nearest first
    Roles { name: String },
    /// Rules granted to a name directly or through its roles
    Permissions { name: String },
    /// Add a rule to the policy section
    AddPolicy {
        #[arg(required = true)]
        rule: Vec<String>,
    },
    /// Remove a rule from the policy section
    RemovePolicy {
        #[arg(required = true)]
        rule: Vec<String>,
    },
    /// Make `name` a member of `role`
    AddRole { name: String, role: String },
    /// Remove `name` from `role`
    RemoveRole { name: String, role: String },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ListTarget {
    Subjects,
    Objects,
    Actions,
    Roles,
    Policy,
    Grouping,
}

/// Result of one command, rendered by [`Output::render`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum Output {
    Decision { allowed: bool, rule: Option<Tuple> },
    Values { values: Vec<String> },
    Rows { rows: Vec<Tuple> },
    Changed { changed: bool },
}

impl Output {
    pub fn render(&self, json: bool) -> Result<String> {
        if json {
            return serde_json::to_string(self).context("Failed to encode output");
        }
        let text = match self {
            Output::Decision { allowed, rule } => {
                let verdict = if *allowed { "allow".bright_green() } else { "deny".bright_red() };
                match rule {
                    Some(rule) => format!("{verdict} ({})", rule.to_string().bright_white()),
                    None => verdict.to_string(),
                }
            }
            Output::Values { values } => values.join("\n"),
            Output::Rows { rows } => rows
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("\n"),
            Output::Changed { changed: true } => "updated".bright_green().to_string(),
            Output::Changed { changed: false } => "unchanged".bright_yellow().to_string(),
        };
        Ok(text)
    }
}

impl Cli {
    /// Defaults, then `--config`, then `POLICY_ENGINE__*` variables
    pub fn load_config(&self) -> Result<EngineConfig> {
        EngineConfig::load(self.config.as_deref()).context("Failed to load configuration")
    }

    /// Configured logging with `--verbose` forcing the debug level
    pub fn logging(&self, config: &EngineConfig) -> LoggingConfig {
        let mut logging = config.logging.clone();
        if self.verbose {
            logging.level = "debug".to_string();
        }
        logging
    }
}

/// Build the enforcer the command line describes
pub fn open_enforcer(cli: &Cli) -> Result<Enforcer> {
    open_enforcer_with(cli, &cli.load_config()?)
}

/// Build the enforcer from an already-loaded configuration
pub fn open_enforcer_with(cli: &Cli, config: &EngineConfig) -> Result<Enforcer> {
    let enforcer = Enforcer::builder()
        .config(config)?
        .adapter(FileAdapter::new(&cli.policy))
        .build()
        .with_context(|| format!("Failed to load policy from {}", cli.policy.display()))?;
    Ok(enforcer)
}

/// Run one command against an already-open enforcer
pub fn execute(enforcer: &Enforcer, command: &Command) -> Result<Output> {
    let output = match command {
        Command::Enforce { request, explain } => {
            let (allowed, rule) = if *explain {
                enforcer.enforce_with_explain(request)?
            } else {
                (enforcer.enforce(request)?, None)
            };
            Output::Decision { allowed, rule }
        }
        Command::List { what } => match what {
            ListTarget::Subjects => Output::Values { values: enforcer.get_all_subjects() },
            ListTarget::Objects => Output::Values { values: enforcer.get_all_objects() },
            ListTarget::Actions => Output::Values { values: enforcer.get_all_actions() },
            ListTarget::Roles => Output::Values { values: enforcer.get_all_roles() },
            ListTarget::Policy => Output::Rows { rows: enforcer.get_policy() },
            ListTarget::Grouping => Output::Rows { rows: enforcer.get_grouping_policy() },
        },
        Command::Roles { name } => Output::Values {
            values: enforcer.get_implicit_roles_for_user(name),
        },
        Command::Permissions { name } => Output::Rows {
            rows: enforcer.get_implicit_permissions_for_user(name),
        },
        Command::AddPolicy { rule } => changed(enforcer, enforcer.add_policy(Tuple::new(rule))?)?,
        Command::RemovePolicy { rule } => changed(enforcer, enforcer.remove_policy(Tuple::new(rule))?)?,
        Command::AddRole { name, role } => changed(enforcer, enforcer.add_role_for_user(name, role)?)?,
        Command::RemoveRole { name, role } => {
            changed(enforcer, enforcer.delete_role_for_user(name, role)?)?
        }
    };
    Ok(output)
}

fn changed(enforcer: &Enforcer, changed: bool) -> Result<Output> {
    if changed {
        enforcer.save_policy().context("Failed to write policy file")?;
    }
    Ok(Output::Changed { changed })
}

/// Parse-independent entry point: open the policy and run the command
pub fn run(cli: &Cli) -> Result<Output> {
    run_with(cli, &cli.load_config()?)
}

/// Run the command with a configuration the caller already loaded
pub fn run_with(cli: &Cli, config: &EngineConfig) -> Result<Output> {
    let enforcer = open_enforcer_with(cli, config)?;
    execute(&enforcer, &cli.command)
}
