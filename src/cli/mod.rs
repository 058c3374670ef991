//! CLI module for prdloop - command-line interface and subcommands.

pub mod commands;

pub use commands::Cli;
