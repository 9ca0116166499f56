//! Command-line interface components
//!
//! This module contains CLI-specific code for the tunegate binary: argument
//! parsing and the command handlers.

pub mod args;
pub mod commands;

pub use args::{
    Cli, Commands, ConfigAction, ConfigArgs, GlobalArgs, PeriodArg, PublishArgs, QuotaAction,
    QuotaArgs, ServeArgs, SweepArgs,
};
pub use commands::{handle_config, handle_publish, handle_quota, handle_serve, handle_sweep};
