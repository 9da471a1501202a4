//! e2e_matrix.rs
//!
//! Full live runs of the bundled add-ons against the repository templates:
//! real installs, dev servers and, for drizzle, the compose databases in
//! `services/`. Skipped unless ADDERKIT_RUN_E2E=1.
//!
//! Needs pnpm, network access and a running docker daemon.

use adderkit::adders;
use adderkit::constants::E2E_ENV_FLAG;
use adderkit::core::config_loader::{self, ConfigOverrides};
use adderkit::testing::matrix::{TestMatrixRunner, Verification};
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

fn repo_root() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
}

fn enabled() -> bool {
    if env::var(E2E_ENV_FLAG).ok().as_deref() == Some("1") {
        return true;
    }
    eprintln!("skip: set {E2E_ENV_FLAG}=1 to enable live matrix runs");
    false
}

async fn run_live(adder: &str) {
    let root = repo_root();
    let settings = config_loader::load(Some(Path::new("adderkit.toml")), &root, &ConfigOverrides::default()).unwrap();
    let runner = TestMatrixRunner::new(
        adders::catalog(),
        settings,
        Verification::Live,
        Arc::new(AtomicBool::new(false)),
    );

    let report = runner.run(adder, adders::test_definition(adder).unwrap()).await.unwrap();
    for scenario in report.scenarios.iter().filter(|s| !s.outcome.is_passed()) {
        eprintln!("{}/{}: {}", scenario.template, scenario.label, scenario.outcome);
        for line in &scenario.diagnostics {
            eprintln!("    {line}");
        }
    }
    assert!(report.is_success(), "{} of {} scenarios failed", report.failed(), report.scenarios.len());
}

#[tokio::test(flavor = "multi_thread")]
async fn drizzle_live_matrix() {
    if !enabled() {
        return;
    }
    run_live("drizzle").await;
}

#[tokio::test(flavor = "multi_thread")]
async fn vitest_live_matrix() {
    if !enabled() {
        return;
    }
    run_live("vitest").await;
}
