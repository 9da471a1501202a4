// src/adders/vitest.rs

use crate::core::adder::{AdderDefinition, Highlighter, PackageDefinition};
use crate::core::options::OptionDefinition;
use crate::core::syntax::json;
use crate::core::syntax::script::{ImportSpec, ScriptAst, StatementKind};
use crate::core::transform::FileTransform;
use crate::core::workspace::Workspace;
use crate::testing::definition::TestDefinition;
use serde_json::Value;

const TEST_INCLUDE: &str = "include: ['src/**/*.{test,spec}.{js,ts}']";

/// The vitest add-on.
pub fn definition() -> AdderDefinition {
    AdderDefinition {
        homepage: Some("https://vitest.dev"),
        packages: vec![PackageDefinition::dev("vitest", "^2.0.5")],
        files: vec![
            FileTransform::data("package.json", package_json),
            FileTransform::script(demo_spec_path as fn(&Workspace) -> String, demo_spec),
            FileTransform::script(vite_config_path as fn(&Workspace) -> String, vite_config),
        ],
        next_steps: Some(next_steps),
        ..AdderDefinition::new("vitest", "Vitest", "A testing framework powered by Vite")
    }
}

/// Runs the generated demo test after installing.
pub fn tests() -> TestDefinition {
    TestDefinition {
        command: Some(vec![
            "pnpm".to_string(),
            "exec".to_string(),
            "vitest".to_string(),
            "run".to_string(),
        ]),
        ..TestDefinition::new(OptionDefinition::empty())
    }
}

fn package_json(_: &Workspace, data: &mut Value) -> anyhow::Result<()> {
    json::set_default(data, "scripts.test", Value::from("vitest"));
    Ok(())
}

fn demo_spec_path(ws: &Workspace) -> String {
    format!("src/demo.spec.{}", ws.script_extension())
}

fn demo_spec(_: &Workspace, ast: &mut ScriptAst) -> anyhow::Result<()> {
    ast.add_from_string(
        r#"
        import { describe, it, expect } from 'vitest';

        describe('sum test', () => {
            it('adds 1 + 2 to equal 3', () => {
                expect(1 + 2).toBe(3);
            });
        });
        "#,
    )?;
    Ok(())
}

fn vite_config_path(ws: &Workspace) -> String {
    format!("vite.config.{}", ws.script_extension())
}

fn vite_config(_: &Workspace, ast: &mut ScriptAst) -> anyhow::Result<()> {
    // The `test` key is only typed by the `vitest/config` flavour of defineConfig.
    let plain_import = ast
        .statements()
        .iter()
        .find(|s| matches!(&s.kind, StatementKind::Import { source } if source == "vite"))
        .map(|s| s.text.clone());
    match plain_import {
        Some(text) if text.contains("{ defineConfig }") => {
            ast.replace_statement(&text, "import { defineConfig } from 'vitest/config';");
        }
        _ if !ast.mentions("defineConfig") => {
            ast.add_import(&ImportSpec::named(&["defineConfig"], "vitest/config"));
        }
        _ => {}
    }

    if ast.mentions("test:") {
        return Ok(());
    }
    let export = ast
        .statements()
        .iter()
        .find(|s| s.text.starts_with("export default"))
        .map(|s| s.text.clone());
    match export.as_deref().and_then(with_test_block) {
        Some(updated) => {
            ast.replace_statement("export default", &updated);
        }
        None => {
            ast.add_from_string(&format!(
                "export default defineConfig({{\n\ttest: {{\n\t\t{TEST_INCLUDE}\n\t}}\n}});"
            ))?;
        }
    }
    Ok(())
}

/// Appends a `test` block as the last property of the config object literal.
fn with_test_block(statement: &str) -> Option<String> {
    if !statement.contains("defineConfig({") {
        return None;
    }
    let close = statement.rfind('}')?;
    let (body, tail) = statement.split_at(close);
    let body = body.trim_end();
    let indent: String = statement
        .lines()
        .nth(1)
        .map(|line| line.chars().take_while(|c| c.is_whitespace()).collect())
        .filter(|indent: &String| !indent.is_empty())
        .unwrap_or_else(|| "\t".to_string());
    let separator = if body.ends_with(',') || body.ends_with('{') { "" } else { "," };
    Some(format!(
        "{body}{separator}\n\n{indent}test: {{\n{indent}{indent}{TEST_INCLUDE}\n{indent}}}\n{tail}"
    ))
}

fn next_steps(ws: &Workspace, hl: &Highlighter) -> Vec<String> {
    vec![
        format!(
            "Run {} to run your tests",
            hl.command(&ws.package_manager.run_command("test").join(" "))
        ),
        format!(
            "Visit {} for more information",
            hl.website("https://vitest.dev/guide/")
        ),
    ]
}
