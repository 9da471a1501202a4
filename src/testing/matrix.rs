// src/testing/matrix.rs

//! # Test Matrix Runner
//!
//! Expands a [`TestDefinition`] into scenarios (compatible template × option
//! set) and runs each one in its own project copy:
//!
//! 1. copy the template into a temporary directory,
//! 2. apply the add-on (and its dependencies) with the scenario's options,
//! 3. in live mode: apply the probe transforms, install, run the definition's
//!    command, start a dev server and run the matching assertion sequences,
//! 4. in snapshot mode: compare the mutated tree against its baseline.
//!
//! Scenarios run concurrently as tokio tasks, bounded by a semaphore, each
//! under its own timeout. Blocking work (copies, transforms, installs) runs on
//! the blocking pool. The group's auxiliary environment is owned by the runner
//! alone: started once before the first scenario and stopped once after the
//! last, including after a timeout or an interruption.

use crate::CancellationToken;
use crate::constants::PORT_PLACEHOLDER;
use crate::core::adder::AdderDefinition;
use crate::core::dependency_graph;
use crate::core::installer::{self, AdderRequest, ApplySettings};
use crate::core::options::{self, OptionValues, RawOptions, ValidationError};
use crate::core::transform;
use crate::core::workspace::WorkspaceResolver;
use crate::models::HarnessSettings;
use crate::system::executor::{self, CommandSpec, ExecutionError, StdioMode};
use crate::system::lifecycle::{EnvironmentLifecycleManager, LifecycleError, LifecycleGuard};
use crate::testing::assertions::{AssertionClient, HttpPageDriver};
use crate::testing::definition::{LifecycleHooks, TestDefinition};
use crate::testing::project::{self, ProjectError, ScenarioProject, Template};
use crate::testing::snapshot::{SnapshotComparator, SnapshotKey, SnapshotMode, SnapshotOutcome};
use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::path::Path;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

const READY_POLL_INTERVAL: Duration = Duration::from_millis(250);
const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(100);
const SERVER_OUTPUT_LINES: usize = 40;

/// How scenarios are verified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verification {
    /// Install, start the project and run the assertion sequences.
    Live,
    /// Compare the mutated tree against stored baselines.
    Snapshot(SnapshotMode),
}

/// Errors that stop a whole group. Scenario failures are reported, not raised.
#[derive(Error, Debug)]
pub enum MatrixError {
    /// No catalog entry has this id or alias.
    #[error("Unknown add-on '{0}'.")]
    UnknownAdder(String),
    /// A declared option set fails the add-on's schema.
    #[error("Invalid option set #{index} for '{adder}': {source}")]
    InvalidOptions {
        adder: String,
        index: usize,
        #[source]
        source: ValidationError,
    },
    /// The template directory could not be read.
    #[error(transparent)]
    Templates(#[from] ProjectError),
    /// Every template lacks a required environment.
    #[error("No template supports '{0}'.")]
    NoCompatibleTemplate(String),
    /// A hook command line could not be parsed.
    #[error("Invalid lifecycle hook: {0}")]
    InvalidHook(#[source] ExecutionError),
    /// A start hook failed; the stop hooks already ran.
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
    /// A scenario task panicked.
    #[error("Internal task failure: {0}")]
    Join(#[from] tokio::task::JoinError),
    /// The cancellation token was set.
    #[error("Operation was cancelled by the user.")]
    Cancelled,
}

/// One (template, option set) combination.
#[derive(Debug, Clone)]
pub struct Scenario {
    /// Position in the expanded matrix.
    pub index: usize,
    /// The project the add-on is applied to.
    pub template: Template,
    /// Options as declared, passed to the add-on.
    pub options: RawOptions,
    /// Options after validation, used for test case conditions.
    pub values: OptionValues,
    /// Stable option set label.
    pub label: String,
}

/// Expands `definition` over `templates`. Every option set is validated before
/// any scenario exists; templates lacking a required environment are skipped.
pub fn expand_scenarios(
    adder: &AdderDefinition,
    definition: &TestDefinition,
    templates: &[Template],
) -> Result<Vec<Scenario>, MatrixError> {
    let mut option_sets = Vec::new();
    for (index, raw) in definition.option_sets().into_iter().enumerate() {
        let values = options::validate(&definition.options, &raw).map_err(|source| MatrixError::InvalidOptions {
            adder: adder.id.to_string(),
            index,
            source,
        })?;
        let label = values.label(&definition.options);
        option_sets.push((raw, values, label));
    }

    let mut scenarios = Vec::new();
    for template in templates {
        if !adder.environments.supports(template.kit) {
            log::debug!("Skipping template '{}': '{}' does not support it", template.name, adder.id);
            continue;
        }
        for (raw, values, label) in &option_sets {
            scenarios.push(Scenario {
                index: scenarios.len(),
                template: template.clone(),
                options: raw.clone(),
                values: values.clone(),
                label: label.clone(),
            });
        }
    }
    Ok(scenarios)
}

/// Final state of a scenario.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScenarioOutcome {
    /// Every step succeeded.
    Passed,
    /// The first error, rendered.
    Failed(String),
    /// Exceeded the scenario time limit.
    TimedOut(Duration),
}

impl ScenarioOutcome {
    /// Whether the scenario passed.
    pub fn is_passed(&self) -> bool {
        matches!(self, Self::Passed)
    }
}

impl fmt::Display for ScenarioOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Passed => f.write_str("passed"),
            Self::Failed(reason) => write!(f, "failed: {reason}"),
            Self::TimedOut(limit) => write!(f, "timed out after {}s", limit.as_secs()),
        }
    }
}

/// Result of one scenario.
#[derive(Debug, Clone)]
pub struct ScenarioReport {
    /// Same as [`Scenario::index`].
    pub index: usize,
    /// Template name.
    pub template: String,
    /// Option set label.
    pub label: String,
    pub outcome: ScenarioOutcome,
    /// Captured command and server output, notes on what ran.
    pub diagnostics: Vec<String>,
    /// Wall time of the run.
    pub duration: Duration,
}

/// Result of a whole group.
#[derive(Debug, Clone)]
pub struct MatrixReport {
    /// Add-on id.
    pub adder: String,
    /// Sorted by scenario index.
    pub scenarios: Vec<ScenarioReport>,
}

impl MatrixReport {
    /// Number of passed scenarios.
    pub fn passed(&self) -> usize {
        self.scenarios.iter().filter(|s| s.outcome.is_passed()).count()
    }

    /// Failed and timed-out scenarios.
    pub fn failed(&self) -> usize {
        self.scenarios.len() - self.passed()
    }

    /// True when nothing failed, including an empty matrix.
    pub fn is_success(&self) -> bool {
        self.failed() == 0
    }
}

/// Runs scenario groups.
#[derive(Debug, Clone)]
pub struct TestMatrixRunner {
    catalog: Arc<Vec<AdderDefinition>>,
    settings: Arc<HarnessSettings>,
    verification: Verification,
    cancellation_token: CancellationToken,
}

impl TestMatrixRunner {
    /// A runner over `catalog`. Setting `cancellation_token` stops running groups.
    pub fn new(
        catalog: Vec<AdderDefinition>,
        settings: HarnessSettings,
        verification: Verification,
        cancellation_token: CancellationToken,
    ) -> Self {
        Self {
            catalog: Arc::new(catalog),
            settings: Arc::new(settings),
            verification,
            cancellation_token,
        }
    }

    /// Runs every scenario of `definition` for the add-on `adder`.
    pub async fn run(&self, adder: &str, definition: TestDefinition) -> Result<MatrixReport, MatrixError> {
        // --- 1. Expansion, before any side effect ---
        let adder = dependency_graph::find(&self.catalog, adder).ok_or_else(|| MatrixError::UnknownAdder(adder.to_string()))?;
        let templates = project::discover_templates(&self.settings.templates_dir)?;
        let scenarios = expand_scenarios(adder, &definition, &templates)?;
        if scenarios.is_empty() {
            return Err(MatrixError::NoCompatibleTemplate(adder.id.to_string()));
        }
        log::info!("Running {} scenario(s) for '{}'", scenarios.len(), adder.id);

        // --- 2. Shared environment (live mode only) ---
        let guard = match (&self.verification, &definition.lifecycle) {
            (Verification::Live, Some(hooks)) => Some(self.start_environment(adder.id, hooks).await?),
            _ => None,
        };

        // --- 3. Scenarios ---
        let results = self.run_scenarios(adder.id, Arc::new(definition), scenarios).await;

        // --- 4. Teardown, whatever the scenarios did ---
        if let Some(guard) = guard
            && let Err(e) = tokio::task::spawn_blocking(move || guard.release()).await
        {
            log::warn!("Environment teardown task failed: {}", e);
        }

        Ok(MatrixReport {
            adder: adder.id.to_string(),
            scenarios: results?,
        })
    }

    async fn start_environment(&self, name: &str, hooks: &LifecycleHooks) -> Result<LifecycleGuard, MatrixError> {
        let mut manager =
            EnvironmentLifecycleManager::new(name, &self.settings.services_dir).timeout(self.settings.hook_timeout);
        for args in &hooks.before_all {
            manager = manager.on_start(CommandSpec::from_args(args.as_slice()).map_err(MatrixError::InvalidHook)?);
        }
        for args in &hooks.after_all {
            manager = manager.on_stop(CommandSpec::from_args(args.as_slice()).map_err(MatrixError::InvalidHook)?);
        }
        let token = Arc::clone(&self.cancellation_token);
        let guard = tokio::task::spawn_blocking(move || manager.start(&token)).await??;
        Ok(guard)
    }

    async fn run_scenarios(
        &self,
        adder: &'static str,
        definition: Arc<TestDefinition>,
        scenarios: Vec<Scenario>,
    ) -> Result<Vec<ScenarioReport>, MatrixError> {
        let permits = if definition.run_synchronously {
            1
        } else {
            self.settings.concurrency.max(1)
        };
        let semaphore = Arc::new(Semaphore::new(permits));
        let mut tasks = JoinSet::new();
        let mut tokens: Vec<CancellationToken> = Vec::with_capacity(scenarios.len());
        let mut pending: BTreeMap<usize, (String, String)> = BTreeMap::new();

        for scenario in scenarios {
            let token: CancellationToken = Arc::new(AtomicBool::new(false));
            tokens.push(Arc::clone(&token));
            pending.insert(scenario.index, (scenario.template.name.clone(), scenario.label.clone()));

            let run = ScenarioRun {
                catalog: Arc::clone(&self.catalog),
                settings: Arc::clone(&self.settings),
                definition: Arc::clone(&definition),
                verification: self.verification,
                adder,
                scenario: Arc::new(scenario),
                token,
                diagnostics: Arc::new(Mutex::new(Vec::new())),
            };
            let semaphore = Arc::clone(&semaphore);
            tasks.spawn(async move {
                // The semaphore is never closed.
                let _permit = semaphore.acquire_owned().await;
                run.run().await
            });
        }

        let mut reports = Vec::with_capacity(pending.len());
        loop {
            tokio::select! {
                joined = tasks.join_next() => match joined {
                    Some(Ok(report)) => {
                        pending.remove(&report.index);
                        log::info!("Scenario #{} [{} / {}] {}", report.index, report.template, report.label, report.outcome);
                        reports.push(report);
                    }
                    Some(Err(e)) => log::warn!("A scenario task ended abnormally: {}", e),
                    None => break,
                },
                _ = cancelled(&self.cancellation_token) => {
                    for token in &tokens {
                        token.store(true, Ordering::SeqCst);
                    }
                    tasks.abort_all();
                    while tasks.join_next().await.is_some() {}
                    return Err(MatrixError::Cancelled);
                }
            }
        }

        // Tasks that panicked leave no report behind.
        for (index, (template, label)) in pending {
            reports.push(ScenarioReport {
                index,
                template,
                label,
                outcome: ScenarioOutcome::Failed("the scenario task ended abnormally".to_string()),
                diagnostics: Vec::new(),
                duration: Duration::ZERO,
            });
        }
        reports.sort_by_key(|r| r.index);
        Ok(reports)
    }
}

async fn cancelled(token: &CancellationToken) {
    while !token.load(Ordering::SeqCst) {
        tokio::time::sleep(CANCEL_POLL_INTERVAL).await;
    }
}

/// Everything one scenario needs. Cheap to clone into blocking tasks.
#[derive(Debug, Clone)]
struct ScenarioRun {
    catalog: Arc<Vec<AdderDefinition>>,
    settings: Arc<HarnessSettings>,
    definition: Arc<TestDefinition>,
    verification: Verification,
    adder: &'static str,
    scenario: Arc<Scenario>,
    /// Set on timeout or interruption; stops blocking commands.
    token: CancellationToken,
    diagnostics: Arc<Mutex<Vec<String>>>,
}

impl ScenarioRun {
    async fn run(self) -> ScenarioReport {
        let started = Instant::now();
        let limit = self.settings.scenario_timeout;
        log::debug!(
            "Scenario #{} [{} / {}] started",
            self.scenario.index,
            self.scenario.template.name,
            self.scenario.label
        );

        let outcome = match tokio::time::timeout(limit, self.execute()).await {
            Ok(Ok(())) => ScenarioOutcome::Passed,
            Ok(Err(reason)) => ScenarioOutcome::Failed(reason),
            Err(_) => {
                self.token.store(true, Ordering::SeqCst);
                ScenarioOutcome::TimedOut(limit)
            }
        };

        let diagnostics = std::mem::take(&mut *self.diagnostics.lock().unwrap_or_else(PoisonError::into_inner));
        ScenarioReport {
            index: self.scenario.index,
            template: self.scenario.template.name.clone(),
            label: self.scenario.label.clone(),
            outcome,
            diagnostics,
            duration: started.elapsed(),
        }
    }

    fn note(&self, line: impl Into<String>) {
        self.diagnostics
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(line.into());
    }

    async fn execute(&self) -> Result<(), String> {
        // 1. Copy, apply, install: all blocking.
        let run = self.clone();
        let project = tokio::task::spawn_blocking(move || run.prepare())
            .await
            .map_err(|e| format!("preparation task failed: {e}"))??;

        // 2. Verify.
        match self.verification {
            Verification::Snapshot(mode) => {
                let comparator = SnapshotComparator::new(&self.settings.snapshots_dir, mode);
                let key = SnapshotKey::new(self.adder, &self.scenario.template.name, &self.scenario.label);
                let outcome = tokio::task::spawn_blocking(move || comparator.check(&key, project.root()))
                    .await
                    .map_err(|e| format!("snapshot task failed: {e}"))?;
                match outcome {
                    Ok(SnapshotOutcome::Created) => self.note("snapshot baseline created"),
                    Ok(SnapshotOutcome::Updated) => self.note("snapshot baseline updated"),
                    Ok(SnapshotOutcome::Matched) => {}
                    Err(e) => return Err(e.to_string()),
                }
                Ok(())
            }
            Verification::Live => {
                let result = self.run_live(project.root()).await;
                tokio::task::spawn_blocking(move || drop(project))
                    .await
                    .map_err(|e| format!("cleanup task failed: {e}"))?;
                result
            }
        }
    }

    /// Blocking part of a scenario. The project copy is removed if anything fails.
    fn prepare(&self) -> Result<ScenarioProject, String> {
        let scenario = &self.scenario;

        // --- 1. Isolated copy ---
        let project = ScenarioProject::materialize(&scenario.template, &scenario.label).map_err(|e| e.to_string())?;
        let root = project.root();

        // --- 2. Add-on application ---
        let live = self.verification == Verification::Live;
        let settings = ApplySettings {
            run_actions: live,
            ..ApplySettings::default()
        };
        let request = AdderRequest::with_options(self.adder, scenario.options.clone());
        let report = installer::apply(&self.catalog, root, &[request], &settings, &self.token).map_err(|e| e.to_string())?;
        self.note(format!("changed: {}", report.changed_files().join(", ")));
        if !live {
            return Ok(project);
        }

        // --- 3. Verification probes ---
        if !self.definition.files.is_empty() {
            let workspace = WorkspaceResolver::new(root)
                .and_then(|resolver| resolver.resolve(scenario.values.clone()))
                .map_err(|e| e.to_string())?;
            let probes = transform::apply_transforms(&format!("{} probes", self.adder), &self.definition.files, &workspace);
            if !probes.errors.is_empty() {
                let causes: Vec<String> = probes.errors.iter().map(ToString::to_string).collect();
                return Err(causes.join("; "));
            }
        }

        // --- 4. Install and the definition's command ---
        self.run_command("install", &self.settings.install_command, root)?;
        if let Some(command) = &self.definition.command {
            self.run_command("command", command, root)?;
        }
        Ok(project)
    }

    fn run_command(&self, what: &str, args: &[String], cwd: &Path) -> Result<(), String> {
        let spec = CommandSpec::from_args(args)
            .map_err(|e| format!("{what}: {e}"))?
            .stdio(StdioMode::Pipe);
        log::trace!("Scenario #{} running `{}`", self.scenario.index, spec);
        match executor::execute(&spec, cwd, Some(self.settings.scenario_timeout), &self.token) {
            Ok(_) => {
                self.note(format!("{what}: `{spec}` succeeded"));
                Ok(())
            }
            Err(ExecutionError::NonZeroExitStatus { command, code, stderr }) => {
                self.note(format!("{what} stderr:\n{}", stderr.trim_end()));
                Err(format!("{what} failed: `{command}` exited with status {code:?}"))
            }
            Err(e) => Err(format!("{what} failed: {e}")),
        }
    }

    async fn run_live(&self, root: &Path) -> Result<(), String> {
        let cases: Vec<_> = self.definition.tests_for(&self.scenario.values).collect();
        if cases.is_empty() {
            self.note("no test cases apply to this option set");
            return Ok(());
        }

        // --- 1. Dev server on a free port ---
        let port = free_port().map_err(|e| format!("no free port: {e}"))?;
        let spec = CommandSpec::from_args(self.settings.dev_command.as_slice())
            .map_err(|e| format!("dev server: {e}"))?
            .substitute(PORT_PLACEHOLDER, &port.to_string());
        let mut command = tokio::process::Command::from(spec.to_command(root));
        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        let mut server = command.spawn().map_err(|e| format!("could not start `{spec}`: {e}"))?;
        let output: Arc<Mutex<VecDeque<String>>> = Arc::new(Mutex::new(VecDeque::new()));
        if let Some(stdout) = server.stdout.take() {
            tokio::spawn(collect_lines(stdout, Arc::clone(&output)));
        }
        if let Some(stderr) = server.stderr.take() {
            tokio::spawn(collect_lines(stderr, Arc::clone(&output)));
        }

        // --- 2. Assertions ---
        let base_url = format!("http://localhost:{port}");
        let result: Result<(), String> = async {
            wait_until_ready(&base_url, &mut server, self.settings.ready_timeout).await?;
            let driver = HttpPageDriver::new(&base_url, self.settings.ready_timeout).map_err(|e| e.to_string())?;
            let mut failures = Vec::new();
            for case in cases {
                let mut client = AssertionClient::new(driver.clone());
                match client.run_steps(&case.steps).await {
                    Ok(()) => self.note(format!("test '{}' passed", case.name)),
                    Err(e) => failures.push(format!("test '{}': {}", case.name, e)),
                }
            }
            if failures.is_empty() { Ok(()) } else { Err(failures.join("; ")) }
        }
        .await;

        // --- 3. Stop the server ---
        if let Err(e) = server.kill().await {
            log::debug!("Dev server already gone: {}", e);
        }
        if result.is_err() {
            let lines = output.lock().unwrap_or_else(PoisonError::into_inner);
            if !lines.is_empty() {
                let joined: Vec<&str> = lines.iter().map(String::as_str).collect();
                self.note(format!("dev server output:\n{}", joined.join("\n")));
            }
        }
        result
    }
}

/// Keeps the last lines a child printed.
async fn collect_lines<R: AsyncRead + Unpin>(stream: R, sink: Arc<Mutex<VecDeque<String>>>) {
    let mut lines = BufReader::new(stream).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        let mut buffer = sink.lock().unwrap_or_else(PoisonError::into_inner);
        if buffer.len() == SERVER_OUTPUT_LINES {
            buffer.pop_front();
        }
        buffer.push_back(line);
    }
}

async fn wait_until_ready(base_url: &str, server: &mut tokio::process::Child, limit: Duration) -> Result<(), String> {
    let client = reqwest::Client::builder()
        .timeout(READY_POLL_INTERVAL * 4)
        .build()
        .map_err(|e| e.to_string())?;
    let deadline = Instant::now() + limit;
    loop {
        if let Ok(Some(status)) = server.try_wait() {
            return Err(format!("dev server exited with {status} before answering"));
        }
        if client.get(base_url).send().await.is_ok() {
            log::debug!("Dev server answering at {}", base_url);
            return Ok(());
        }
        if Instant::now() >= deadline {
            return Err(format!("dev server did not answer within {}s", limit.as_secs()));
        }
        tokio::time::sleep(READY_POLL_INTERVAL).await;
    }
}

fn free_port() -> std::io::Result<u16> {
    let listener = std::net::TcpListener::bind(("127.0.0.1", 0))?;
    Ok(listener.local_addr()?.port())
}
