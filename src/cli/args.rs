//! Command-line argument parsing for tunegate
//!
//! The binary is the operator's side of the bot: it runs the maintenance daemon and
//! offers one-shot administration of quotas, charts and configuration.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::app::models::{Period, UserId};
use crate::constants::janitor::CHART_SIZE;

/// tunegate - request admission and download coordination for a music bot
#[derive(Parser, Debug)]
#[command(
    name = "tunegate",
    version,
    about = "Quota, rate-limit and maintenance tooling for a music delivery bot",
    long_about = "Runs the background maintenance of a music delivery bot (temp sweep and daily chart
publishing) and administers per-user download quotas stored in its SQLite database."
)]
pub struct Cli {
    /// Global options
    #[command(flatten)]
    pub global: GlobalArgs,

    /// Subcommands
    #[command(subcommand)]
    pub command: Commands,
}

/// Global arguments available to all subcommands
#[derive(Args, Debug)]
pub struct GlobalArgs {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Very verbose logging (debug level)
    #[arg(long, global = true)]
    pub very_verbose: bool,

    /// Quiet mode - errors only
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Configuration file path
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the temp sweep and chart publisher until Ctrl-C or SIGTERM
    Serve(ServeArgs),

    /// Remove stale artifacts once and exit
    Sweep(SweepArgs),

    /// Publish a top chart now
    Publish(PublishArgs),

    /// Inspect and adjust user quotas
    Quota(QuotaArgs),

    /// Manage the configuration file
    Config(ConfigArgs),
}

/// Arguments for the serve command
#[derive(Args, Debug, Clone, Default)]
pub struct ServeArgs {
    /// Run the temp sweep only
    #[arg(long)]
    pub no_publish: bool,
}

/// Arguments for the sweep command
#[derive(Args, Debug, Clone, Default)]
pub struct SweepArgs {
    /// Directory to sweep instead of the configured artifact directory
    #[arg(long, value_name = "DIR")]
    pub dir: Option<PathBuf>,

    /// Remove files older than this many seconds instead of the configured age
    #[arg(long, value_name = "SECS")]
    pub max_age_secs: Option<u64>,
}

/// Chart period on the command line
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PeriodArg {
    #[default]
    Day,
    Week,
    Month,
    All,
}

impl From<PeriodArg> for Period {
    fn from(arg: PeriodArg) -> Self {
        match arg {
            PeriodArg::Day => Period::Day,
            PeriodArg::Week => Period::Week,
            PeriodArg::Month => Period::Month,
            PeriodArg::All => Period::All,
        }
    }
}

/// Arguments for the publish command
#[derive(Args, Debug, Clone)]
pub struct PublishArgs {
    /// Period to chart
    #[arg(long, value_enum, default_value_t = PeriodArg::Day)]
    pub period: PeriodArg,

    /// Number of tracks in the chart
    #[arg(long, default_value_t = CHART_SIZE)]
    pub size: usize,
}

/// Arguments for quota administration
#[derive(Args, Debug)]
pub struct QuotaArgs {
    #[command(subcommand)]
    pub action: QuotaAction,
}

/// Quota administration actions
#[derive(Subcommand, Debug)]
pub enum QuotaAction {
    /// Show a user's allowance
    Check {
        /// User id
        user_id: UserId,
    },

    /// Add bonus downloads to a user's balance
    GrantBonus {
        /// User id
        user_id: UserId,

        /// Number of bonus downloads
        count: u32,
    },

    /// Grant or revoke premium
    SetPremium {
        /// User id
        user_id: UserId,

        /// Expiry as RFC 3339 timestamp (omit for lifetime premium)
        #[arg(long, value_parser = parse_timestamp, conflicts_with_all = ["days", "revoke"])]
        until: Option<DateTime<Utc>>,

        /// Expiry as a number of days from now
        #[arg(long, conflicts_with = "revoke")]
        days: Option<u32>,

        /// End premium immediately
        #[arg(long)]
        revoke: bool,
    },
}

/// Arguments for configuration management
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

/// Configuration management actions
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Write a commented default configuration file
    Init {
        /// Target path (defaults to the user config directory)
        #[arg(long, value_name = "FILE")]
        path: Option<PathBuf>,

        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },

    /// Print the effective configuration
    Show,
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| format!("expected an RFC 3339 timestamp: {}", e))
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Logging level requested by flags, if any
    pub fn log_level(&self) -> Option<tracing::Level> {
        if self.global.quiet {
            Some(tracing::Level::ERROR)
        } else if self.global.very_verbose {
            Some(tracing::Level::DEBUG)
        } else if self.global.verbose {
            Some(tracing::Level::INFO)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(std::iter::once("tunegate").chain(args.iter().copied()))
    }

    #[test]
    fn test_log_level() {
        assert_eq!(parse(&["-q", "sweep"]).unwrap().log_level(), Some(tracing::Level::ERROR));
        assert_eq!(parse(&["sweep", "-v"]).unwrap().log_level(), Some(tracing::Level::INFO));
        assert_eq!(parse(&["sweep"]).unwrap().log_level(), None);
    }

    #[test]
    fn test_publish_defaults() {
        let cli = parse(&["publish"]).unwrap();
        match cli.command {
            Commands::Publish(args) => {
                assert_eq!(args.period, PeriodArg::Day);
                assert_eq!(args.size, CHART_SIZE);
            }
            other => panic!("unexpected command {:?}", other),
        }

        let cli = parse(&["publish", "--period", "week"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Publish(PublishArgs { period: PeriodArg::Week, .. })
        ));
    }

    #[test]
    fn test_quota_subcommands() {
        let cli = parse(&["quota", "grant-bonus", "42", "5"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Quota(QuotaArgs {
                action: QuotaAction::GrantBonus { user_id: 42, count: 5 }
            })
        ));

        let cli = parse(&["quota", "set-premium", "42", "--until", "2030-01-01T00:00:00Z"]).unwrap();
        match cli.command {
            Commands::Quota(QuotaArgs {
                action: QuotaAction::SetPremium { until, .. },
            }) => assert!(until.is_some()),
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_conflicting_premium_flags_rejected() {
        assert!(parse(&["quota", "set-premium", "1", "--days", "30", "--revoke"]).is_err());
        assert!(parse(&["quota", "set-premium", "1", "--until", "tomorrow"]).is_err());
    }

    #[test]
    fn test_period_conversion() {
        assert_eq!(Period::from(PeriodArg::Month), Period::Month);
        assert_eq!(Period::from(PeriodArg::default()), Period::Day);
    }
}
