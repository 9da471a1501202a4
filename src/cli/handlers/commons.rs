// src/cli/handlers/commons.rs

// Shared helpers for the command handlers.

use anyhow::{Context, Result, anyhow};
use colored::*;
use std::collections::BTreeMap;
use std::env;
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;

use crate::{
    CancellationToken, adders,
    cli::args::HarnessArgs,
    core::{adder::AdderDefinition, config_loader, dependency_graph},
    models::HarnessSettings,
    testing::{
        definition::TestDefinition,
        matrix::{MatrixReport, ScenarioOutcome, TestMatrixRunner, Verification},
    },
};

/// The current directory, or `explicit` resolved against it.
pub fn project_dir(explicit: Option<&str>) -> Result<PathBuf> {
    let cwd = env::current_dir().context("Could not determine the current directory")?;
    Ok(match explicit {
        Some(path) => dunce::simplified(&cwd.join(path)).to_path_buf(),
        None => cwd,
    })
}

/// Loads the harness configuration, applying the command line overrides.
pub fn load_settings(args: &HarnessArgs) -> Result<HarnessSettings> {
    let cwd = project_dir(None)?;
    config_loader::load(args.config.as_deref().map(Path::new), &cwd, &args.overrides())
        .context("Failed to load the harness configuration")
}

/// Groups `adder:key=value` arguments by add-on id. Bare `key=value` pairs
/// belong to the only requested add-on and are rejected otherwise.
pub fn group_option_pairs(
    catalog: &[AdderDefinition],
    requested: &[String],
    pairs: &[String],
) -> Result<BTreeMap<String, Vec<String>>> {
    let mut grouped: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for pair in pairs {
        let (name, option) = match pair.split_once(':') {
            Some((name, option)) if !name.contains('=') => (name.to_string(), option.to_string()),
            _ => match requested {
                [only] => (only.clone(), pair.clone()),
                _ => {
                    return Err(anyhow!(
                        "Option '{}' is ambiguous; prefix it with the add-on id (e.g. {}).",
                        pair.yellow(),
                        format!("drizzle:{pair}").cyan()
                    ));
                }
            },
        };
        let adder = dependency_graph::find(catalog, &name)
            .ok_or_else(|| anyhow!("Option '{}' names unknown add-on '{}'.", pair, name.yellow()))?;
        grouped.entry(adder.id.to_string()).or_default().push(option);
    }
    Ok(grouped)
}

/// The add-ons a harness command runs: the named ones, or every add-on with a
/// test definition.
pub fn selected_definitions(names: &[String]) -> Result<Vec<(String, TestDefinition)>> {
    if names.is_empty() {
        return Ok(adders::catalog()
            .iter()
            .filter_map(|adder| adders::test_definition(adder.id).map(|def| (adder.id.to_string(), def)))
            .collect());
    }
    names
        .iter()
        .map(|name| {
            adders::test_definition(name)
                .map(|def| (name.clone(), def))
                .ok_or_else(|| anyhow!("No test definition for add-on '{}'.", name.yellow()))
        })
        .collect()
}

/// Runs the matrices of `definitions` one group at a time on a fresh tokio
/// runtime. Ctrl+C flips `cancellation_token`.
pub fn run_matrices(
    settings: HarnessSettings,
    verification: Verification,
    definitions: Vec<(String, TestDefinition)>,
    cancellation_token: &CancellationToken,
) -> Result<Vec<MatrixReport>> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start the async runtime")?;

    let token = cancellation_token.clone();
    runtime.block_on(async move {
        let watcher_token = token.clone();
        let watcher = tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                log::info!("Interrupt received, stopping scenarios");
                watcher_token.store(true, Ordering::SeqCst);
            }
        });

        let runner = TestMatrixRunner::new(adders::catalog(), settings, verification, token);
        let mut reports = Vec::with_capacity(definitions.len());
        let mut outcome = Ok(());
        for (adder, definition) in definitions {
            println!("\n{} {}", "▶".cyan(), adder.bold());
            match runner.run(&adder, definition).await {
                Ok(report) => {
                    print_report(&report);
                    reports.push(report);
                }
                Err(e) => {
                    outcome = Err(e);
                    break;
                }
            }
        }
        watcher.abort();
        outcome?;
        Ok::<_, anyhow::Error>(reports)
    })
}

/// Prints one line per scenario plus a summary, and the diagnostics of
/// failed scenarios.
pub fn print_report(report: &MatrixReport) {
    for scenario in &report.scenarios {
        let status = match &scenario.outcome {
            ScenarioOutcome::Passed => "PASS".green().bold(),
            ScenarioOutcome::Failed(_) => "FAIL".red().bold(),
            ScenarioOutcome::TimedOut(_) => "TIME".yellow().bold(),
        };
        println!(
            "  {} {}/{} {}",
            status,
            scenario.template,
            scenario.label,
            format!("({:.1}s)", scenario.duration.as_secs_f64()).dimmed()
        );
        if !scenario.outcome.is_passed() {
            println!("      {}", scenario.outcome.to_string().red());
            for line in &scenario.diagnostics {
                println!("      {}", line.dimmed());
            }
        }
    }
    let summary = format!(
        "{} passed, {} failed ({} scenarios)",
        report.passed(),
        report.failed(),
        report.scenarios.len()
    );
    if report.is_success() {
        println!("  {}", summary.green());
    } else {
        println!("  {}", summary.red());
    }
}

/// Fails when any report has failed scenarios.
pub fn ensure_success(reports: &[MatrixReport]) -> Result<()> {
    let failed: Vec<&str> = reports
        .iter()
        .filter(|r| !r.is_success())
        .map(|r| r.adder.as_str())
        .collect();
    if failed.is_empty() {
        Ok(())
    } else {
        Err(anyhow!("Scenarios failed for: {}", failed.join(", ")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_option_pairs() {
        let catalog = adders::catalog();
        let grouped = group_option_pairs(
            &catalog,
            &["drizzle".to_string(), "vitest".to_string()],
            &["drizzle:database=mysql".to_string(), "drizzle:docker=true".to_string()],
        )
        .unwrap();
        assert_eq!(
            grouped.get("drizzle"),
            Some(&vec!["database=mysql".to_string(), "docker=true".to_string()])
        );

        let single = group_option_pairs(&catalog, &["drizzle".to_string()], &["database=sqlite".to_string()]).unwrap();
        assert_eq!(single.get("drizzle").map(Vec::len), Some(1));

        assert!(group_option_pairs(&catalog, &[], &["database=sqlite".to_string()]).is_err());
        assert!(group_option_pairs(&catalog, &[], &["nope:a=b".to_string()]).is_err());
    }

    #[test]
    fn test_selected_definitions() {
        let all = selected_definitions(&[]).unwrap();
        let names: Vec<&str> = all.iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(names, vec!["drizzle", "vitest"]);
        assert!(selected_definitions(&["missing".to_string()]).is_err());
    }

    #[test]
    fn test_ensure_success() {
        assert!(ensure_success(&[]).is_ok());
        let failed = MatrixReport {
            adder: "demo".to_string(),
            scenarios: vec![crate::testing::matrix::ScenarioReport {
                index: 0,
                template: "kit".to_string(),
                label: "default".to_string(),
                outcome: ScenarioOutcome::Failed("boom".to_string()),
                diagnostics: Vec::new(),
                duration: std::time::Duration::from_secs(1),
            }],
        };
        let err = ensure_success(&[failed]).unwrap_err();
        assert!(err.to_string().contains("demo"));
    }
}
