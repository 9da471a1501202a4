// src/cli/handlers/test.rs

use anyhow::Result;
use clap::Parser;

use crate::{
    CancellationToken,
    cli::{args::HarnessArgs, handlers::commons},
    testing::matrix::Verification,
};

#[derive(Parser, Debug, Default)]
#[command(
    no_binary_name = true,
    about = "Installs, starts and exercises every scenario of the add-ons' test matrices."
)]
struct TestArgs {
    #[command(flatten)]
    harness: HarnessArgs,
}

pub fn handle(args: Vec<String>, cancellation_token: &CancellationToken) -> Result<()> {
    // 1. Parse arguments and load the harness configuration.
    let test_args = TestArgs::try_parse_from(&args)?;
    let settings = commons::load_settings(&test_args.harness)?;

    // 2. Pick the groups and run them.
    let definitions = commons::selected_definitions(&test_args.harness.adders)?;
    let reports = commons::run_matrices(settings, Verification::Live, definitions, cancellation_token)?;

    // 3. Any failed scenario fails the command.
    commons::ensure_success(&reports)
}
