// src/system/lifecycle.rs

//! # Environment Lifecycle
//!
//! Owns an auxiliary resource shared by a group of scenarios (a database
//! container, typically): started once before the first scenario, stopped once
//! after the last. The stop commands run exactly once per successful start,
//! whether the group finishes, fails, times out or is interrupted.

use crate::CancellationToken;
use crate::system::executor::{self, CommandSpec, ExecutionError};
use scopeguard::ScopeGuard;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use thiserror::Error;

/// Errors raised while bringing an environment up.
#[derive(Error, Debug)]
pub enum LifecycleError {
    /// A start command failed. Stop commands already ran.
    #[error("Could not start environment '{name}': {source}")]
    Start {
        /// Environment name.
        name: String,
        /// The failing command.
        #[source]
        source: ExecutionError,
    },
}

/// Start and stop commands for one shared environment.
#[derive(Debug, Clone)]
pub struct EnvironmentLifecycleManager {
    name: String,
    cwd: PathBuf,
    start: Vec<CommandSpec>,
    stop: Vec<CommandSpec>,
    timeout: Option<Duration>,
}

impl EnvironmentLifecycleManager {
    /// Creates a manager whose commands run in `cwd`.
    pub fn new(name: &str, cwd: &Path) -> Self {
        Self {
            name: name.to_string(),
            cwd: cwd.to_path_buf(),
            start: Vec::new(),
            stop: Vec::new(),
            timeout: None,
        }
    }

    /// Adds a start command.
    pub fn on_start(mut self, command: CommandSpec) -> Self {
        self.start.push(command);
        self
    }

    /// Adds a stop command.
    pub fn on_stop(mut self, command: CommandSpec) -> Self {
        self.stop.push(command);
        self
    }

    /// Limits every start and stop command to `timeout`.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Runs the start commands in order.
    ///
    /// If one fails, the stop commands run before the error is returned.
    pub fn start(&self, cancellation_token: &CancellationToken) -> Result<LifecycleGuard, LifecycleError> {
        log::info!("Starting environment '{}'", self.name);

        // 1. Arm the rollback before the first command.
        let rollback = scopeguard::guard((), |()| {
            log::debug!("Start of '{}' failed, rolling back", self.name);
            run_stop(&self.name, &self.cwd, &self.stop, self.timeout);
        });

        // 2. Bring the environment up.
        for command in &self.start {
            executor::execute(command, &self.cwd, self.timeout, cancellation_token).map_err(|source| {
                LifecycleError::Start {
                    name: self.name.clone(),
                    source,
                }
            })?;
        }

        // 3. Success: ownership of the teardown moves to the guard.
        ScopeGuard::into_inner(rollback);
        Ok(LifecycleGuard {
            name: self.name.clone(),
            cwd: self.cwd.clone(),
            stop: self.stop.clone(),
            timeout: self.timeout,
            released: AtomicBool::new(false),
        })
    }
}

/// A started environment. Dropping it stops the environment if
/// [`release`](Self::release) was not called.
#[derive(Debug)]
pub struct LifecycleGuard {
    name: String,
    cwd: PathBuf,
    stop: Vec<CommandSpec>,
    timeout: Option<Duration>,
    released: AtomicBool,
}

impl LifecycleGuard {
    /// Runs the stop commands unless they already ran. Failures are logged.
    pub fn release(&self) {
        if self.released.swap(true, Ordering::SeqCst) {
            return;
        }
        run_stop(&self.name, &self.cwd, &self.stop, self.timeout);
    }

    /// Whether the stop commands already ran.
    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }
}

impl Drop for LifecycleGuard {
    fn drop(&mut self) {
        self.release();
    }
}

fn run_stop(name: &str, cwd: &Path, stop: &[CommandSpec], timeout: Option<Duration>) {
    log::info!("Stopping environment '{}'", name);
    // Teardown also runs after Ctrl+C, so it gets a token of its own.
    let token: CancellationToken = Arc::new(AtomicBool::new(false));
    for command in stop {
        if let Err(e) = executor::execute(command, cwd, timeout, &token) {
            log::warn!("Teardown of '{}' failed: {}", name, e);
        }
    }
}
