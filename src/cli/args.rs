// src/cli/args.rs

use crate::core::config_loader::ConfigOverrides;
use clap::Args;

/// Flags shared by the harness commands (`test`, `snapshot`).
#[derive(Args, Debug, Default, Clone)]
pub struct HarnessArgs {
    /// Add-ons to verify. Defaults to every add-on with a test definition.
    pub adders: Vec<String>,

    /// Path to the harness configuration file. Defaults to `adderkit.toml` in the current directory.
    #[arg(long, short)]
    pub config: Option<String>,

    /// Overrides `harness.templates_dir`.
    #[arg(long)]
    pub templates: Option<String>,

    /// Overrides `harness.snapshots_dir`.
    #[arg(long)]
    pub snapshots: Option<String>,

    /// Overrides `harness.concurrency`.
    #[arg(long, short = 'j')]
    pub concurrency: Option<usize>,
}

impl HarnessArgs {
    pub fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            templates_dir: self.templates.clone(),
            snapshots_dir: self.snapshots.clone(),
            concurrency: self.concurrency,
        }
    }
}
