// src/bin/adderkit.rs

use adderkit::{
    CancellationToken,
    cli::{Cli, handlers},
    core::installer::InstallError,
    system::executor::ExecutionError,
    testing::matrix::MatrixError,
};
use anyhow::{Result, anyhow};
use clap::Parser;
use colored::*;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

// --- Command Definition and Registry ---

/// A command, its aliases, and its handler.
struct CommandDefinition {
    name: &'static str,
    aliases: &'static [&'static str],
    about: &'static str,
    handler: fn(Vec<String>, &CancellationToken) -> Result<()>,
}

/// Every command of the binary. Handlers parse their own arguments.
static COMMAND_REGISTRY: &[CommandDefinition] = &[
    CommandDefinition {
        name: "add",
        aliases: &["apply"],
        about: "Apply add-ons to a project",
        handler: handlers::add::handle,
    },
    CommandDefinition {
        name: "list",
        aliases: &["ls"],
        about: "List the available add-ons",
        handler: handlers::list::handle,
    },
    CommandDefinition {
        name: "snapshot",
        aliases: &["snap"],
        about: "Compare mutated templates with stored baselines",
        handler: handlers::snapshot::handle,
    },
    CommandDefinition {
        name: "test",
        aliases: &[],
        about: "Run the live test matrix",
        handler: handlers::test::handle,
    },
];

fn find_command(name: &str) -> Option<&'static CommandDefinition> {
    COMMAND_REGISTRY
        .iter()
        .find(|cmd| cmd.name == name || cmd.aliases.contains(&name))
}

fn main() {
    let cancellation_token = Arc::new(AtomicBool::new(false));
    env_logger::init();

    if let Err(e) = run_cli(Cli::parse(), cancellation_token) {
        // Interruptions exit silently with the conventional status.
        if is_interruption(&e) {
            std::process::exit(130);
        }
        eprintln!("\n{}: {}", "Error".red().bold(), e);
        for cause in e.chain().skip(1) {
            eprintln!("  {} {}", "caused by:".dimmed(), cause);
        }
        std::process::exit(1);
    }
}

fn is_interruption(e: &anyhow::Error) -> bool {
    matches!(e.downcast_ref::<MatrixError>(), Some(MatrixError::Cancelled))
        || matches!(e.downcast_ref::<InstallError>(), Some(InstallError::Cancelled))
        || matches!(e.downcast_ref::<ExecutionError>(), Some(ExecutionError::Cancelled))
}

fn run_cli(cli: Cli, cancellation_token: CancellationToken) -> Result<()> {
    log::debug!("CLI args parsed: {:?}", cli);

    let Some(name) = cli.command else {
        print_commands();
        return Ok(());
    };

    let command = find_command(&name).ok_or_else(|| {
        anyhow!(
            "Unknown command '{}'. Run {} to see the available commands.",
            name.yellow(),
            "adderkit".cyan()
        )
    })?;
    (command.handler)(cli.args, &cancellation_token)
}

fn print_commands() {
    println!("{}", "adderkit".bold());
    println!("Scaffold add-ons into web projects and verify them across option matrices.\n");
    println!("{}", "Commands:".yellow().bold());
    for command in COMMAND_REGISTRY {
        println!("  {:<10} {}", command.name.cyan(), command.about);
    }
    println!("\nRun {} for a command's options.", "adderkit <command> --help".cyan());
}
