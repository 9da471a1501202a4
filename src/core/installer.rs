// src/core/installer.rs

//! # Application Pipeline
//!
//! Applies a set of add-ons to one project:
//!
//! 1. order the add-ons (pulling in dependencies),
//! 2. validate every add-on's options and environment,
//! 3. for each add-on, resolve a workspace, apply its transforms and write its
//!    packages into the manifest,
//! 4. optionally run setup actions and install dependencies.
//!
//! Steps 1 and 2 finish before anything is written, so an invalid request never
//! leaves a half-modified project behind.

use crate::CancellationToken;
use crate::constants::MANIFEST_FILENAME;
use crate::core::adder::{AdderAction, AdderDefinition, Highlighter};
use crate::core::dependency_graph::{self, GraphError};
use crate::core::options::{OptionValues, RawOptions, ValidationError};
use crate::core::syntax::json::{self, JsonDocument};
use crate::core::transform::{self, MergeFailure, TransformCause, TransformError};
use crate::core::workspace::{Workspace, WorkspaceError, WorkspaceResolver};
use crate::system::executor::{self, CommandSpec, ExecutionError};
use std::fmt;
use std::path::Path;
use thiserror::Error;

/// One add-on requested by the caller and the options supplied for it.
#[derive(Debug, Clone, Default)]
pub struct AdderRequest {
    /// Id or alias.
    pub name: String,
    /// Raw options; validated against the add-on's schema.
    pub options: RawOptions,
}

impl AdderRequest {
    /// A request with default options.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            options: RawOptions::new(),
        }
    }

    /// A request with explicit options.
    pub fn with_options(name: &str, options: RawOptions) -> Self {
        Self {
            name: name.to_string(),
            options,
        }
    }
}

/// Knobs for one application run.
#[derive(Debug, Clone, Copy)]
pub struct ApplySettings {
    /// Run the add-ons' setup actions after their transforms.
    pub run_actions: bool,
    /// Run the package manager's install command at the end.
    pub install: bool,
    /// Styling of next-step messages.
    pub highlighter: Highlighter,
}

impl Default for ApplySettings {
    fn default() -> Self {
        Self {
            run_actions: false,
            install: false,
            highlighter: Highlighter::plain(),
        }
    }
}

/// What happened for one add-on.
#[derive(Debug, Clone)]
pub struct AdderReport {
    /// Add-on id.
    pub id: String,
    /// The validated options it was applied with.
    pub options: OptionValues,
    /// Files it changed.
    pub changed: Vec<String>,
    /// Transforms skipped by their condition.
    pub skipped: usize,
    /// Next-step messages.
    pub next_steps: Vec<String>,
}

/// Successful outcome of an application run.
#[derive(Debug, Clone, Default)]
pub struct ApplyReport {
    /// Per add-on results, in application order.
    pub adders: Vec<AdderReport>,
}

impl ApplyReport {
    /// Every file changed by the run, without duplicates.
    pub fn changed_files(&self) -> Vec<&str> {
        let mut files: Vec<&str> = Vec::new();
        for path in self.adders.iter().flat_map(|a| a.changed.iter()) {
            if !files.contains(&path.as_str()) {
                files.push(path);
            }
        }
        files
    }
}

/// A failure that did not stop the run.
#[derive(Error, Debug)]
pub enum ApplyFailure {
    /// A file transform failed.
    #[error(transparent)]
    Transform(#[from] TransformError),
    /// A setup action or the install command failed.
    #[error("[{adder}] {description}: {source}")]
    Command {
        /// Add-on id, or `install` for the final install.
        adder: String,
        /// What was being run.
        description: String,
        /// The command failure.
        #[source]
        source: ExecutionError,
    },
}

/// Errors of an application run.
#[derive(Error, Debug)]
pub enum InstallError {
    /// Unknown add-on or dependency cycle. Nothing was written.
    #[error(transparent)]
    Graph(#[from] GraphError),
    /// Invalid options. Nothing was written.
    #[error("Invalid options for '{adder}': {source}")]
    Validation {
        /// Add-on id.
        adder: String,
        /// The validation failure.
        #[source]
        source: ValidationError,
    },
    /// The add-on does not support this kind of project. Nothing was written.
    #[error("'{adder}' does not support {environment} projects.")]
    Unsupported {
        /// Add-on id.
        adder: String,
        /// The project kind.
        environment: &'static str,
    },
    /// The project could not be read.
    #[error(transparent)]
    Workspace(#[from] WorkspaceError),
    /// Some transforms or commands failed; the rest of the run completed.
    #[error("{} operation(s) failed:\n{}", .failures.len(), Bullets(.failures))]
    Incomplete {
        /// What failed.
        failures: Vec<ApplyFailure>,
        /// What succeeded.
        report: Box<ApplyReport>,
    },
    /// The run was interrupted.
    #[error("Operation was cancelled by the user.")]
    Cancelled,
}

struct Bullets<'a>(&'a [ApplyFailure]);

impl fmt::Display for Bullets<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let lines: Vec<String> = self.0.iter().map(|e| format!("  - {e}")).collect();
        f.write_str(&lines.join("\n"))
    }
}

/// Applies `requests` to the project at `cwd`.
pub fn apply(
    catalog: &[AdderDefinition],
    cwd: &Path,
    requests: &[AdderRequest],
    settings: &ApplySettings,
    cancellation_token: &CancellationToken,
) -> Result<ApplyReport, InstallError> {
    // --- 1. Ordering ---
    let names: Vec<&str> = requests.iter().map(|r| r.name.as_str()).collect();
    let order = dependency_graph::resolve_order(catalog, &names)?;
    log::debug!("Application order: {:?}", order.iter().map(|a| a.id).collect::<Vec<_>>());

    // --- 2. Validation, before any mutation ---
    let resolver = WorkspaceResolver::new(cwd)?;
    let probe = resolver.resolve(OptionValues::default())?;
    let kit = probe.kit.is_some();

    let mut validated: Vec<(&AdderDefinition, OptionValues)> = Vec::with_capacity(order.len());
    for adder in order {
        if !adder.environments.supports(kit) {
            return Err(InstallError::Unsupported {
                adder: adder.id.to_string(),
                environment: if kit { "kit" } else { "svelte" },
            });
        }
        let raw = requests
            .iter()
            .find(|r| adder.is_named(&r.name))
            .map(|r| r.options.clone())
            .unwrap_or_default();
        let values = adder
            .validate_options(&raw)
            .map_err(|source| InstallError::Validation {
                adder: adder.id.to_string(),
                source,
            })?;
        validated.push((adder, values));
    }

    // --- 3. Transforms and packages ---
    let mut report = ApplyReport::default();
    let mut failures: Vec<ApplyFailure> = Vec::new();
    for (adder, values) in validated {
        if is_cancelled(cancellation_token) {
            return Err(InstallError::Cancelled);
        }
        log::info!("Applying '{}'", adder.id);
        let workspace = resolver.resolve(values.clone())?;

        let outcome = transform::apply_transforms(adder.id, &adder.files, &workspace);
        let mut changed = outcome.changed;
        let adder_failed = !outcome.errors.is_empty();
        failures.extend(outcome.errors.into_iter().map(ApplyFailure::from));

        for package in adder.packages_for(&workspace) {
            workspace
                .files
                .register_dependency(package.name, package.version, package.dev);
        }
        match write_dependencies(adder.id, &workspace) {
            Ok(true) if !changed.iter().any(|c| c == MANIFEST_FILENAME) => {
                changed.push(MANIFEST_FILENAME.to_string());
            }
            Ok(_) => {}
            Err(e) => failures.push(e.into()),
        }

        log::debug!("[{}] Files written: {:?}", adder.id, workspace.files.changed_paths());

        // --- 4. Setup actions, only for add-ons whose files all applied ---
        if settings.run_actions && !adder_failed {
            failures.extend(run_actions(adder, &workspace, cancellation_token));
        }

        report.adders.push(AdderReport {
            id: adder.id.to_string(),
            options: values,
            changed,
            skipped: outcome.skipped,
            next_steps: adder.next_steps_for(&workspace, &settings.highlighter),
        });
    }

    if settings.install {
        let workspace = resolver.resolve(OptionValues::default())?;
        let install = workspace.package_manager.install_command();
        let result = CommandSpec::from_args(install.as_slice())
            .and_then(|spec| executor::execute(&spec, &workspace.cwd, None, cancellation_token));
        match result {
            Ok(_) => {}
            Err(ExecutionError::Cancelled) => return Err(InstallError::Cancelled),
            Err(source) => failures.push(ApplyFailure::Command {
                adder: "install".to_string(),
                description: install.join(" "),
                source,
            }),
        }
    }

    if failures.is_empty() {
        Ok(report)
    } else {
        Err(InstallError::Incomplete {
            failures,
            report: Box::new(report),
        })
    }
}

fn is_cancelled(token: &CancellationToken) -> bool {
    token.load(std::sync::atomic::Ordering::SeqCst)
}

/// Writes the dependencies registered so far into the manifest, replacing
/// existing entries for the same package.
fn write_dependencies(adder: &str, workspace: &Workspace) -> Result<bool, TransformError> {
    let requested = workspace.files.take_dependencies();
    if requested.is_empty() {
        return Ok(false);
    }
    let to_error = |cause: TransformCause| TransformError {
        adder: adder.to_string(),
        path: MANIFEST_FILENAME.to_string(),
        cause,
    };

    let existing = workspace.files.read(MANIFEST_FILENAME).map_err(|e| to_error(e.into()))?;
    let mut manifest = JsonDocument::parse(existing.as_deref().unwrap_or_default())
        .map_err(|e| to_error(MergeFailure::from(e).into()))?;
    for dependency in &requested {
        let section = if dependency.dev { "devDependencies" } else { "dependencies" };
        json::set_in(
            manifest.value_mut(),
            &[section, dependency.name.as_str()],
            dependency.version.clone().into(),
        );
    }
    let content = manifest
        .print()
        .map_err(|e| to_error(MergeFailure::from(e).into()))?;
    workspace
        .files
        .write(MANIFEST_FILENAME, &content)
        .map_err(|e| to_error(e.into()))
}

/// Runs the setup actions in order. The first failure stops the sequence and
/// runs the teardown actions, so a half-finished setup is undone.
fn run_actions(adder: &AdderDefinition, workspace: &Workspace, token: &CancellationToken) -> Vec<ApplyFailure> {
    let Some(failure) = run_sequence(adder, &adder.setup_actions, workspace, token).err() else {
        return Vec::new();
    };
    let mut failures = vec![failure];
    if adder.teardown_actions.is_empty() || is_cancelled(token) {
        return failures;
    }
    log::warn!("[{}] Setup failed, running teardown actions", adder.id);
    for action in &adder.teardown_actions {
        if let Err(failure) = run_sequence(adder, std::slice::from_ref(action), workspace, token) {
            log::warn!("{failure}");
            failures.push(failure);
        }
    }
    failures
}

fn run_sequence(
    adder: &AdderDefinition,
    actions: &[AdderAction],
    workspace: &Workspace,
    token: &CancellationToken,
) -> Result<(), ApplyFailure> {
    for action in actions {
        if !action.condition.is_none_or(|condition| condition(workspace)) {
            continue;
        }
        log::info!("[{}] {}", adder.id, action.description);
        CommandSpec::from_args((action.args)(workspace).as_slice())
            .map(|spec| spec.stdio(action.stdio))
            .and_then(|spec| executor::execute(&spec, &workspace.cwd, None, token))
            .map_err(|source| ApplyFailure::Command {
                adder: adder.id.to_string(),
                description: action.description.to_string(),
                source,
            })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::adder::PackageDefinition;
    use crate::core::options::{OptionDefinition, Question, raw_options};
    use crate::core::syntax::script::ScriptAst;
    use crate::core::transform::FileTransform;
    use crate::system::executor::StdioMode;
    use pretty_assertions::assert_eq;
    use std::fs;
    use std::sync::Arc;
    use std::sync::atomic::AtomicBool;
    use tempfile::tempdir;

    fn token() -> CancellationToken {
        Arc::new(AtomicBool::new(false))
    }

    fn add_base(_: &Workspace, ast: &mut ScriptAst) -> anyhow::Result<()> {
        ast.add_from_string("export const base = true;")?;
        Ok(())
    }

    fn add_extra(ws: &Workspace, ast: &mut ScriptAst) -> anyhow::Result<()> {
        if ws.options.get_bool("loud") == Some(true) {
            ast.add_from_string("export const loud = true;")?;
        }
        ast.add_from_string("export const extra = base;")?;
        Ok(())
    }

    fn catalog() -> Vec<AdderDefinition> {
        vec![
            AdderDefinition {
                files: vec![FileTransform::script("src/app.js", add_base)],
                packages: vec![PackageDefinition::dev("base-lib", "^1.0.0")],
                ..AdderDefinition::new("base", "Base", "")
            },
            AdderDefinition {
                depends_on: vec!["base"],
                options: OptionDefinition::new(vec![("loud", Question::boolean("Loud?", false))]),
                files: vec![FileTransform::script("src/app.js", add_extra).require_existing()],
                packages: vec![PackageDefinition::runtime("base-lib", "^2.0.0")],
                ..AdderDefinition::new("extra", "Extra", "")
            },
        ]
    }

    fn project() -> tempfile::TempDir {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("package.json"), "{\n\t\"name\": \"app\"\n}\n").unwrap();
        dir
    }

    #[test]
    fn test_dependencies_apply_first_and_packages_land_in_manifest() {
        let dir = project();
        let report = apply(
            &catalog(),
            dir.path(),
            &[AdderRequest::with_options("extra", raw_options([("loud", true)]))],
            &ApplySettings::default(),
            &token(),
        )
        .unwrap();

        let ids: Vec<&str> = report.adders.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["base", "extra"]);
        assert_eq!(
            fs::read_to_string(dir.path().join("src/app.js")).unwrap(),
            "export const base = true;\n\nexport const loud = true;\n\nexport const extra = base;\n"
        );
        let manifest = fs::read_to_string(dir.path().join("package.json")).unwrap();
        assert!(manifest.contains("\"devDependencies\": {\n\t\t\"base-lib\": \"^1.0.0\"\n\t}"));
        assert!(manifest.contains("\"dependencies\": {\n\t\t\"base-lib\": \"^2.0.0\"\n\t}"));
        assert_eq!(report.changed_files(), vec!["src/app.js", "package.json"]);
    }

    #[test]
    fn test_invalid_options_write_nothing() {
        let dir = project();
        let before = fs::read_to_string(dir.path().join("package.json")).unwrap();
        let err = apply(
            &catalog(),
            dir.path(),
            &[AdderRequest::with_options("extra", raw_options([("loud", "very")]))],
            &ApplySettings::default(),
            &token(),
        )
        .unwrap_err();

        assert!(matches!(err, InstallError::Validation { ref adder, .. } if adder == "extra"));
        assert!(!dir.path().join("src").exists());
        assert_eq!(fs::read_to_string(dir.path().join("package.json")).unwrap(), before);
    }

    #[test]
    fn test_transform_failures_are_collected() {
        let dir = project();
        let only_extra: Vec<AdderDefinition> = catalog()
            .into_iter()
            .map(|mut a| {
                a.depends_on.clear();
                a
            })
            .collect();
        let err = apply(
            &only_extra,
            dir.path(),
            &[AdderRequest::new("extra")],
            &ApplySettings::default(),
            &token(),
        )
        .unwrap_err();

        match err {
            InstallError::Incomplete { failures, report } => {
                assert_eq!(failures.len(), 1);
                assert!(failures[0].to_string().contains("[extra] could not transform 'src/app.js'"));
                // The manifest still received the package.
                assert_eq!(report.adders[0].changed, vec!["package.json"]);
            }
            other => unreachable!("unexpected error: {other}"),
        }
    }

    #[cfg(unix)]
    fn sh(script: &str) -> Vec<String> {
        vec!["sh".to_string(), "-c".to_string(), script.to_string()]
    }

    #[cfg(unix)]
    fn action(description: &'static str, args: fn(&Workspace) -> Vec<String>) -> AdderAction {
        AdderAction {
            description,
            args,
            stdio: StdioMode::Pipe,
            condition: None,
        }
    }

    #[cfg(unix)]
    fn setup_then_fail() -> AdderDefinition {
        AdderDefinition {
            setup_actions: vec![
                action("generate", |_| sh("echo ran > setup.txt")),
                action("migrate", |_| sh("exit 4")),
                action("seed", |_| sh("echo ran > late.txt")),
            ],
            teardown_actions: vec![action("clean", |_| sh("rm setup.txt"))],
            ..AdderDefinition::new("codegen", "Codegen", "")
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_failed_setup_runs_teardown_actions() {
        let dir = project();
        let adders = vec![setup_then_fail()];
        let settings = ApplySettings {
            run_actions: true,
            ..ApplySettings::default()
        };
        let err = apply(&adders, dir.path(), &[AdderRequest::new("codegen")], &settings, &token()).unwrap_err();

        match err {
            InstallError::Incomplete { failures, .. } => {
                let messages: Vec<String> = failures.iter().map(ToString::to_string).collect();
                assert_eq!(messages.len(), 1);
                assert!(messages.first().is_some_and(|m| m.contains("migrate")), "{messages:?}");
            }
            other => unreachable!("unexpected error: {other}"),
        }
        assert!(!dir.path().join("setup.txt").exists());
        assert!(!dir.path().join("late.txt").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_successful_setup_skips_teardown_actions() {
        let dir = project();
        let mut adder = setup_then_fail();
        adder.setup_actions.truncate(1);
        let adders = vec![adder];
        let settings = ApplySettings {
            run_actions: true,
            ..ApplySettings::default()
        };
        apply(&adders, dir.path(), &[AdderRequest::new("codegen")], &settings, &token()).unwrap();
        assert_eq!(fs::read_to_string(dir.path().join("setup.txt")).unwrap(), "ran\n");
    }
}
