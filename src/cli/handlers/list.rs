// src/cli/handlers/list.rs

use anyhow::Result;
use clap::Parser;
use colored::*;

use crate::{
    CancellationToken, adders,
    core::{adder::AdderDefinition, options::QuestionKind},
};

#[derive(Parser, Debug, Default)]
#[command(no_binary_name = true, about = "Lists the available add-ons and their options.")]
struct ListArgs {
    /// Also show each add-on's options.
    #[arg(long, short)]
    verbose: bool,
}

pub fn handle(args: Vec<String>, _cancellation_token: &CancellationToken) -> Result<()> {
    let list_args = ListArgs::try_parse_from(&args)?;
    for adder in adders::catalog() {
        println!("{}", describe(&adder));
        if list_args.verbose {
            for line in option_lines(&adder) {
                println!("    {}", line);
            }
        }
    }
    Ok(())
}

fn describe(adder: &AdderDefinition) -> String {
    let alias = adder
        .alias
        .map(|alias| format!(" ({alias})"))
        .unwrap_or_default();
    let kit_only = if adder.environments.svelte { "" } else { " [kit only]" };
    format!(
        "{}{} - {}{}",
        adder.id.cyan().bold(),
        alias,
        adder.description,
        kit_only.dimmed()
    )
}

fn option_lines(adder: &AdderDefinition) -> Vec<String> {
    adder
        .options
        .iter()
        .map(|(key, question)| {
            let values = match &question.kind {
                QuestionKind::Boolean => "true|false".to_string(),
                QuestionKind::Select(choices) | QuestionKind::MultiSelect(choices) => choices
                    .iter()
                    .map(|choice| choice.value.as_str())
                    .collect::<Vec<_>>()
                    .join("|"),
                QuestionKind::String { .. } => "<text>".to_string(),
            };
            format!("{}={} (default: {})", key.yellow(), values, question.default)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_option_lines_list_choices() {
        colored::control::set_override(false);
        let drizzle = adders::catalog()
            .into_iter()
            .find(|adder| adder.id == "drizzle")
            .unwrap();
        let lines = option_lines(&drizzle);
        assert!(lines.contains(&"database=postgresql|mysql|sqlite (default: sqlite)".to_string()));
        assert!(lines.contains(&"docker=true|false (default: false)".to_string()));
        assert!(describe(&drizzle).ends_with("[kit only]"));
    }
}
