// src/cli/handlers/snapshot.rs

use anyhow::Result;
use clap::Parser;
use colored::*;

use crate::{
    CancellationToken,
    cli::{args::HarnessArgs, handlers::commons},
    testing::{matrix::Verification, snapshot::SnapshotMode},
};

#[derive(Parser, Debug, Default)]
#[command(
    no_binary_name = true,
    about = "Applies the add-ons to every template and compares the results with stored baselines."
)]
struct SnapshotArgs {
    #[command(flatten)]
    harness: HarnessArgs,

    /// Replace mismatching baselines instead of failing.
    #[arg(long, short)]
    update: bool,
}

pub fn handle(args: Vec<String>, cancellation_token: &CancellationToken) -> Result<()> {
    let snapshot_args = SnapshotArgs::try_parse_from(&args)?;
    let settings = commons::load_settings(&snapshot_args.harness)?;
    let mode = if snapshot_args.update {
        SnapshotMode::Update
    } else {
        SnapshotMode::Compare
    };
    log::debug!("Snapshot baselines in '{}' ({:?})", settings.snapshots_dir.display(), mode);

    let definitions = commons::selected_definitions(&snapshot_args.harness.adders)?;
    let reports = commons::run_matrices(settings, Verification::Snapshot(mode), definitions, cancellation_token)?;
    if mode == SnapshotMode::Update {
        println!("\n{}", "Baselines updated.".green());
    }
    commons::ensure_success(&reports)
}
