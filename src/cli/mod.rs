// src/cli/mod.rs

use clap::Parser;

pub mod args;
pub mod handlers;

/// adderkit: scaffold add-ons into web projects and verify them across option matrices.
///
/// Commands:
///
/// - `adderkit add <adder>... [-o adder:key=value]` applies add-ons to a project.
/// - `adderkit test [<adder>...]` runs the live test matrix.
/// - `adderkit snapshot [<adder>...] [--update]` compares mutated trees with baselines.
/// - `adderkit list` shows the catalog.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(disable_help_subcommand = true)]
#[command(trailing_var_arg = true)]
pub struct Cli {
    /// The command to run.
    pub command: Option<String>,

    /// Arguments passed to the command.
    #[arg(allow_hyphen_values = true)]
    pub args: Vec<String>,
}
