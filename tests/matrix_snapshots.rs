//! matrix_snapshots.rs
//!
//! Snapshot-mode matrix runs over on-disk templates. Covers determinism
//! (a second run matches the baselines byte for byte), scenario isolation
//! (templates are never touched, every option set gets its own baseline),
//! and the compare/update cycle for a drifted baseline.

mod common;

use adderkit::adders;
use adderkit::testing::matrix::{MatrixError, ScenarioOutcome, TestMatrixRunner, Verification};
use adderkit::testing::snapshot::{SnapshotMode, tree_fingerprint};
use adderkit::CancellationToken;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use tempfile::tempdir;

fn runner(root: &Path, mode: SnapshotMode) -> TestMatrixRunner {
    let token: CancellationToken = Arc::new(AtomicBool::new(false));
    TestMatrixRunner::new(
        adders::catalog(),
        common::settings(root),
        Verification::Snapshot(mode),
        token,
    )
}

fn harness() -> tempfile::TempDir {
    let dir = tempdir().unwrap();
    common::kit_template(&dir.path().join("templates/kit-ts"));
    common::svelte_template(&dir.path().join("templates/svelte-ts"));
    dir
}

#[tokio::test]
async fn baselines_are_created_then_matched() {
    let dir = harness();
    let templates = dir.path().join("templates");
    let before = tree_fingerprint(&templates).unwrap();

    let first = runner(dir.path(), SnapshotMode::Compare)
        .run("vitest", adders::test_definition("vitest").unwrap())
        .await
        .unwrap();
    assert!(first.is_success(), "{:?}", first.scenarios);
    let names: Vec<(&str, &str)> = first
        .scenarios
        .iter()
        .map(|s| (s.template.as_str(), s.label.as_str()))
        .collect();
    assert_eq!(names, vec![("kit-ts", "default"), ("svelte-ts", "default")]);
    let baseline = dir.path().join("_snapshots/vitest/svelte-ts/default/vite.config.ts");
    assert!(fs::read_to_string(&baseline).unwrap().contains("test: {"));

    let snapshots_after_first = tree_fingerprint(&dir.path().join("_snapshots")).unwrap();
    let second = runner(dir.path(), SnapshotMode::Compare)
        .run("vitest", adders::test_definition("vitest").unwrap())
        .await
        .unwrap();
    assert!(second.is_success(), "{:?}", second.scenarios);
    assert_eq!(tree_fingerprint(&dir.path().join("_snapshots")).unwrap(), snapshots_after_first);

    // Scenarios work on copies only.
    assert_eq!(tree_fingerprint(&templates).unwrap(), before);
}

#[tokio::test]
async fn every_option_set_gets_an_isolated_baseline() {
    let dir = harness();
    let report = runner(dir.path(), SnapshotMode::Compare)
        .run("drizzle", adders::test_definition("drizzle").unwrap())
        .await
        .unwrap();
    assert!(report.is_success(), "{:?}", report.scenarios);

    // Drizzle is kit only: the plain template is skipped.
    assert!(report.scenarios.iter().all(|s| s.template == "kit-ts"));
    assert_eq!(report.scenarios.len(), 4);

    let base = dir.path().join("_snapshots/drizzle/kit-ts");
    let client = |label: &str| fs::read_to_string(base.join(label).join("src/lib/server/db/index.ts")).unwrap();
    let labels: Vec<String> = report.scenarios.iter().map(|s| s.label.clone()).collect();
    let mut unique = labels.clone();
    unique.sort();
    unique.dedup();
    assert_eq!(unique.len(), labels.len(), "{labels:?}");

    for scenario in &report.scenarios {
        let content = client(&scenario.label);
        let imports: Vec<&str> = content.lines().filter(|l| l.contains("from 'drizzle-orm/")).collect();
        assert_eq!(imports.len(), 1, "{}: {content}", scenario.label);
    }
    // No compose file leaks into the sqlite scenarios.
    for scenario in report.scenarios.iter().filter(|s| s.label.contains("sqlite") || s.label == "default") {
        assert!(!base.join(&scenario.label).join("docker-compose.yml").exists(), "{}", scenario.label);
    }
}

#[tokio::test]
async fn drifted_baselines_fail_until_updated() {
    let dir = harness();
    let definition = || adders::test_definition("vitest").unwrap();
    runner(dir.path(), SnapshotMode::Compare).run("vitest", definition()).await.unwrap();

    let baseline = dir.path().join("_snapshots/vitest/kit-ts/default");
    fs::write(baseline.join("src/demo.spec.ts"), "// edited by hand\n").unwrap();
    fs::write(baseline.join("stale.txt"), "left over\n").unwrap();

    let compared = runner(dir.path(), SnapshotMode::Compare).run("vitest", definition()).await.unwrap();
    assert_eq!(compared.failed(), 1);
    let failure = compared
        .scenarios
        .iter()
        .find_map(|s| match &s.outcome {
            ScenarioOutcome::Failed(reason) => Some(reason.clone()),
            _ => None,
        })
        .unwrap();
    assert!(failure.contains("src/demo.spec.ts"), "{failure}");
    assert!(failure.contains("stale.txt"), "{failure}");

    let updated = runner(dir.path(), SnapshotMode::Update).run("vitest", definition()).await.unwrap();
    assert!(updated.is_success());
    assert!(!baseline.join("stale.txt").exists());

    let again = runner(dir.path(), SnapshotMode::Compare).run("vitest", definition()).await.unwrap();
    assert!(again.is_success());
}

#[tokio::test]
async fn invalid_option_sets_abort_before_any_scenario() {
    let dir = harness();
    let mut definition = adders::test_definition("drizzle").unwrap();
    definition
        .option_values
        .push(adderkit::core::options::raw_options([("database", "oracle")]));

    let err = runner(dir.path(), SnapshotMode::Compare)
        .run("drizzle", definition)
        .await
        .unwrap_err();
    assert!(matches!(err, MatrixError::InvalidOptions { index: 4, .. }), "{err}");
    assert!(!dir.path().join("_snapshots").exists());
}
