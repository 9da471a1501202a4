// src/models.rs

//! Harness configuration as read from `adderkit.toml`, and its resolved form.

use crate::constants::PORT_PLACEHOLDER;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

// --- FILE MODELS (adderkit.toml) ---

/// The whole configuration file. Every field has a default, so an absent or
/// empty file is valid.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct HarnessConfig {
    /// Directories, concurrency and timeouts.
    pub harness: HarnessSection,
    /// External commands.
    pub commands: CommandsSection,
}

/// The `[harness]` table.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct HarnessSection {
    /// Directory holding one sub-directory per project template.
    pub templates_dir: String,
    /// Root of the snapshot baselines.
    pub snapshots_dir: String,
    /// Working directory of lifecycle hooks (compose files live here).
    pub services_dir: String,
    /// Maximum number of scenarios running at once.
    pub concurrency: usize,
    pub scenario_timeout_secs: u64,
    pub hook_timeout_secs: u64,
    /// How long to wait for a dev server to answer.
    pub ready_timeout_secs: u64,
}

impl Default for HarnessSection {
    fn default() -> Self {
        Self {
            templates_dir: "templates".to_string(),
            snapshots_dir: "_snapshots".to_string(),
            services_dir: ".".to_string(),
            concurrency: 4,
            scenario_timeout_secs: 120,
            hook_timeout_secs: 180,
            ready_timeout_secs: 60,
        }
    }
}

/// The `[commands]` table. Each command is an explicit argument list.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct CommandsSection {
    /// Installs a project's dependencies.
    pub install: Vec<String>,
    /// Starts a dev server; `{port}` is replaced with the scenario's port.
    pub dev: Vec<String>,
}

impl Default for CommandsSection {
    fn default() -> Self {
        Self {
            install: ["pnpm", "install"].map(String::from).to_vec(),
            dev: ["pnpm", "exec", "vite", "dev", "--port", PORT_PLACEHOLDER, "--strictPort"]
                .map(String::from)
                .to_vec(),
        }
    }
}

// --- RESOLVED MODELS (runtime) ---

/// Configuration with paths expanded and durations typed. This is what the
/// harness consumes.
#[derive(Debug, Clone, PartialEq)]
pub struct HarnessSettings {
    pub templates_dir: PathBuf,
    pub snapshots_dir: PathBuf,
    pub services_dir: PathBuf,
    /// Always at least 1.
    pub concurrency: usize,
    pub scenario_timeout: Duration,
    pub hook_timeout: Duration,
    pub ready_timeout: Duration,
    pub install_command: Vec<String>,
    pub dev_command: Vec<String>,
}
