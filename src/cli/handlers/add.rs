// src/cli/handlers/add.rs

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use colored::*;

use crate::{
    CancellationToken, adders,
    cli::handlers::commons,
    core::{
        adder::{AdderDefinition, Highlighter},
        dependency_graph,
        installer::{self, AdderRequest, ApplyReport, ApplySettings, InstallError},
        options,
    },
};

// --- Command Argument Parsing ---

#[derive(Parser, Debug, Default)]
#[command(no_binary_name = true, about = "Applies add-ons to an existing project.")]
struct AddArgs {
    /// Add-ons to apply, by id or alias.
    #[arg(required = true)]
    adders: Vec<String>,

    /// Project directory. Defaults to the current directory.
    #[arg(long, short = 'C')]
    cwd: Option<String>,

    /// An add-on option as `adder:key=value`. The prefix may be omitted when a single add-on is requested.
    #[arg(long = "option", short = 'o')]
    options: Vec<String>,

    /// Run the package manager's install command afterwards.
    #[arg(long)]
    install: bool,

    /// Skip the add-ons' setup actions.
    #[arg(long)]
    skip_actions: bool,
}

// --- Main Handler ---

pub fn handle(args: Vec<String>, cancellation_token: &CancellationToken) -> Result<()> {
    // 1. Parse arguments and resolve the project.
    let add_args = AddArgs::try_parse_from(&args)?;
    let cwd = commons::project_dir(add_args.cwd.as_deref())?;
    let catalog = adders::catalog();

    // 2. Turn the option arguments into per-add-on requests.
    let requests = build_requests(&catalog, &add_args)?;

    // 3. Apply.
    let settings = ApplySettings {
        run_actions: !add_args.skip_actions,
        install: add_args.install,
        highlighter: Highlighter::colored(),
    };
    println!("Applying {} to '{}'", add_args.adders.join(", ").cyan(), cwd.display());
    let report = match installer::apply(&catalog, &cwd, &requests, &settings, cancellation_token) {
        Ok(report) => report,
        Err(e) => {
            if let InstallError::Incomplete { report, .. } = &e {
                print_summary(&catalog, report);
            }
            return Err(e.into());
        }
    };

    // 4. Summary and next steps.
    print_summary(&catalog, &report);
    Ok(())
}

fn build_requests(catalog: &[AdderDefinition], add_args: &AddArgs) -> Result<Vec<AdderRequest>> {
    let grouped = commons::group_option_pairs(catalog, &add_args.adders, &add_args.options)?;

    let mut requests = Vec::with_capacity(add_args.adders.len());
    let mut requested_ids = Vec::new();
    for name in &add_args.adders {
        let adder = dependency_graph::find(catalog, name).ok_or_else(|| anyhow!("Unknown add-on '{}'.", name.yellow()))?;
        let pairs = grouped.get(adder.id).map(Vec::as_slice).unwrap_or_default();
        let raw = options::parse_cli_pairs(&adder.options, pairs)
            .with_context(|| format!("Invalid options for '{}'", adder.id))?;
        requests.push(AdderRequest::with_options(name, raw));
        requested_ids.push(adder.id);
    }

    if let Some(stray) = grouped.keys().find(|id| !requested_ids.contains(&id.as_str())) {
        return Err(anyhow!("Options were given for '{}', which is not being added.", stray.yellow()));
    }
    Ok(requests)
}

fn print_summary(catalog: &[AdderDefinition], report: &ApplyReport) {
    for adder in &report.adders {
        println!("\n{} {}", "✔".green(), adder.id.bold());
        if adder.changed.is_empty() {
            println!("  {}", "Nothing to change.".dimmed());
        }
        for path in &adder.changed {
            println!("  {} {}", "~".yellow(), path);
        }
        if let Some(homepage) = dependency_graph::find(catalog, &adder.id).and_then(|a| a.homepage) {
            println!("  Docs: {}", homepage.cyan().underline());
        }
        for step in &adder.next_steps {
            println!("  - {}", step);
        }
    }
}
