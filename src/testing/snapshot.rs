// src/testing/snapshot.rs

//! # Snapshot Comparison
//!
//! Byte-level regression checks of a mutated project tree against a stored
//! baseline under `<root>/<adder>/<template>/<label>/`.
//!
//! The first run for a key writes the baseline. Later runs compare and report
//! every added, removed or changed path; a baseline is only replaced in
//! [`SnapshotMode::Update`]. Trees are digested in parallel with `rayon` and
//! `blake3`; entries listed in `IGNORED_TREE_ENTRIES` never take part.

use crate::testing::project::{self, ProjectError};
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

/// Whether existing baselines are compared or replaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SnapshotMode {
    /// Fail on any difference.
    #[default]
    Compare,
    /// Overwrite baselines with the current tree.
    Update,
}

/// Identifies one baseline.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct SnapshotKey {
    /// Add-on id.
    pub adder: String,
    /// Template name.
    pub template: String,
    /// Option set label (see `OptionValues::label`).
    pub label: String,
}

impl SnapshotKey {
    /// Builds a key from its three parts.
    pub fn new(adder: &str, template: &str, label: &str) -> Self {
        Self {
            adder: adder.to_string(),
            template: template.to_string(),
            label: label.to_string(),
        }
    }

    fn relative_dir(&self) -> PathBuf {
        Path::new(&self.adder).join(&self.template).join(&self.label)
    }
}

impl fmt::Display for SnapshotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.adder, self.template, self.label)
    }
}

/// One differing path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Difference {
    /// Present in the tree, not in the baseline.
    Added(String),
    /// Present in the baseline, not in the tree.
    Removed(String),
    /// Present in both with different content.
    Changed(String),
}

impl fmt::Display for Difference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Added(path) => write!(f, "+ {path}"),
            Self::Removed(path) => write!(f, "- {path}"),
            Self::Changed(path) => write!(f, "~ {path}"),
        }
    }
}

/// A tree that differs from its baseline.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Snapshot '{key}' differs from its baseline:\n{}", list(.differences))]
pub struct SnapshotMismatch {
    /// The baseline compared against.
    pub key: SnapshotKey,
    /// Sorted by path.
    pub differences: Vec<Difference>,
}

fn list(differences: &[Difference]) -> String {
    differences
        .iter()
        .map(|d| format!("  {d}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Errors from checking or updating a baseline.
#[derive(Error, Debug)]
pub enum SnapshotError {
    /// The tree differs from its baseline.
    #[error(transparent)]
    Mismatch(#[from] SnapshotMismatch),
    /// Reading or writing a file failed.
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// Listing a directory failed.
    #[error("Could not walk '{path}': {source}")]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },
    /// Replacing a baseline failed.
    #[error(transparent)]
    Copy(#[from] ProjectError),
}

pub type SnapshotResult<T> = Result<T, SnapshotError>;

/// What a successful check did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotOutcome {
    /// No baseline existed; the tree became the baseline.
    Created,
    Matched,
    /// The baseline was replaced (update mode).
    Updated,
}

/// Content digest of every tracked file, keyed by `/`-separated relative path.
pub type TreeDigest = BTreeMap<String, blake3::Hash>;

/// Digests the tracked files under `root`.
pub fn digest_tree(root: &Path) -> SnapshotResult<TreeDigest> {
    // 1. Collect paths.
    let mut files: Vec<(String, PathBuf)> = Vec::new();
    for entry in WalkDir::new(root).into_iter().filter_entry(project::is_tracked) {
        let entry = entry.map_err(|source| SnapshotError::Walk {
            path: root.to_path_buf(),
            source,
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(relative) = entry.path().strip_prefix(root) else {
            continue;
        };
        let key = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        files.push((key, entry.path().to_path_buf()));
    }

    // 2. Hash in parallel.
    files
        .into_par_iter()
        .map(|(key, path)| {
            let bytes = fs::read(&path).map_err(|source| SnapshotError::Io { path, source })?;
            Ok((key, blake3::hash(&bytes)))
        })
        .collect()
}

/// A single hex digest over a whole tree; equal trees give equal fingerprints.
pub fn tree_fingerprint(root: &Path) -> SnapshotResult<String> {
    let digest = digest_tree(root)?;
    let mut hasher = blake3::Hasher::new();
    for (path, hash) in &digest {
        hasher.update(path.as_bytes());
        hasher.update(&[0]);
        hasher.update(hash.as_bytes());
    }
    Ok(hex::encode(hasher.finalize().as_bytes()))
}

/// Lists the differences between `baseline` and `actual`, sorted by path.
pub fn diff_digests(baseline: &TreeDigest, actual: &TreeDigest) -> Vec<Difference> {
    let mut differences = Vec::new();
    for (path, hash) in actual {
        match baseline.get(path) {
            None => differences.push(Difference::Added(path.clone())),
            Some(expected) if expected != hash => differences.push(Difference::Changed(path.clone())),
            Some(_) => {}
        }
    }
    for path in baseline.keys().filter(|p| !actual.contains_key(*p)) {
        differences.push(Difference::Removed(path.clone()));
    }
    differences.sort_by(|a, b| difference_path(a).cmp(difference_path(b)));
    differences
}

fn difference_path(difference: &Difference) -> &str {
    match difference {
        Difference::Added(p) | Difference::Removed(p) | Difference::Changed(p) => p,
    }
}

/// Compares trees against baselines stored under `root`.
#[derive(Debug, Clone)]
pub struct SnapshotComparator {
    root: PathBuf,
    mode: SnapshotMode,
}

impl SnapshotComparator {
    /// A comparator storing baselines under `root`.
    pub fn new(root: &Path, mode: SnapshotMode) -> Self {
        Self {
            root: root.to_path_buf(),
            mode,
        }
    }

    /// Compare or update.
    pub fn mode(&self) -> SnapshotMode {
        self.mode
    }

    /// Directory holding the baseline for `key`.
    pub fn baseline_dir(&self, key: &SnapshotKey) -> PathBuf {
        self.root.join(key.relative_dir())
    }

    /// Checks `tree` against the baseline for `key`.
    pub fn check(&self, key: &SnapshotKey, tree: &Path) -> SnapshotResult<SnapshotOutcome> {
        let baseline = self.baseline_dir(key);

        // --- 1. No baseline yet: write it ---
        if !baseline.is_dir() {
            log::info!("Writing new snapshot baseline '{}'", key);
            self.replace_baseline(&baseline, tree)?;
            return Ok(SnapshotOutcome::Created);
        }

        // --- 2. Update mode never compares ---
        if self.mode == SnapshotMode::Update {
            log::info!("Updating snapshot baseline '{}'", key);
            self.replace_baseline(&baseline, tree)?;
            return Ok(SnapshotOutcome::Updated);
        }

        // --- 3. Compare ---
        let differences = diff_digests(&digest_tree(&baseline)?, &digest_tree(tree)?);
        if differences.is_empty() {
            log::debug!("Snapshot '{}' matches", key);
            Ok(SnapshotOutcome::Matched)
        } else {
            Err(SnapshotMismatch {
                key: key.clone(),
                differences,
            }
            .into())
        }
    }

    /// Copies `tree` into a staging directory next to `baseline`, then swaps it in.
    fn replace_baseline(&self, baseline: &Path, tree: &Path) -> SnapshotResult<()> {
        let io = |path: &Path| {
            let path = path.to_path_buf();
            move |source| SnapshotError::Io { path, source }
        };
        let parent = baseline.parent().unwrap_or(&self.root);
        fs::create_dir_all(parent).map_err(io(parent))?;

        let name = baseline
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let staging = parent.join(format!(".{}.{}", name, uuid::Uuid::new_v4().simple()));
        project::copy_tree(tree, &staging)?;

        if baseline.exists() {
            fs::remove_dir_all(baseline).map_err(io(baseline))?;
        }
        fs::rename(&staging, baseline).map_err(io(baseline))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    fn write(root: &Path, relative: &str, content: &str) {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_first_run_writes_then_compares() {
        let store = tempdir().unwrap();
        let tree = tempdir().unwrap();
        write(tree.path(), "package.json", "{}\n");
        write(tree.path(), "src/lib/server/db/index.ts", "export const db = 1;\n");
        write(tree.path(), "node_modules/ignored.js", "");

        let comparator = SnapshotComparator::new(store.path(), SnapshotMode::Compare);
        let key = SnapshotKey::new("drizzle", "kit-ts", "default");
        assert_eq!(comparator.check(&key, tree.path()).unwrap(), SnapshotOutcome::Created);
        assert!(comparator.baseline_dir(&key).join("src/lib/server/db/index.ts").is_file());
        assert!(!comparator.baseline_dir(&key).join("node_modules").exists());
        assert_eq!(comparator.check(&key, tree.path()).unwrap(), SnapshotOutcome::Matched);
    }

    #[test]
    fn test_mismatch_lists_paths_and_keeps_baseline() {
        let store = tempdir().unwrap();
        let tree = tempdir().unwrap();
        write(tree.path(), "a.txt", "a");
        write(tree.path(), "b.txt", "b");
        let comparator = SnapshotComparator::new(store.path(), SnapshotMode::Compare);
        let key = SnapshotKey::new("x", "t", "default");
        comparator.check(&key, tree.path()).unwrap();

        write(tree.path(), "a.txt", "changed");
        fs::remove_file(tree.path().join("b.txt")).unwrap();
        write(tree.path(), "c/new.txt", "c");

        let err = comparator.check(&key, tree.path()).unwrap_err();
        let SnapshotError::Mismatch(mismatch) = err else {
            unreachable!("expected a mismatch, got {err:?}");
        };
        assert_eq!(
            mismatch.differences,
            vec![
                Difference::Changed("a.txt".into()),
                Difference::Removed("b.txt".into()),
                Difference::Added("c/new.txt".into()),
            ]
        );
        assert!(mismatch.to_string().contains("~ a.txt"));
        assert_eq!(fs::read_to_string(comparator.baseline_dir(&key).join("a.txt")).unwrap(), "a");
    }

    #[test]
    fn test_update_mode_replaces_baseline() {
        let store = tempdir().unwrap();
        let tree = tempdir().unwrap();
        write(tree.path(), "a.txt", "one");
        let key = SnapshotKey::new("x", "t", "default");
        SnapshotComparator::new(store.path(), SnapshotMode::Compare)
            .check(&key, tree.path())
            .unwrap();

        write(tree.path(), "a.txt", "two");
        let updater = SnapshotComparator::new(store.path(), SnapshotMode::Update);
        assert_eq!(updater.check(&key, tree.path()).unwrap(), SnapshotOutcome::Updated);
        assert_eq!(fs::read_to_string(updater.baseline_dir(&key).join("a.txt")).unwrap(), "two");

        let leftovers: Vec<_> = fs::read_dir(store.path().join("x/t"))
            .unwrap()
            .filter_map(Result::ok)
            .map(|e| e.file_name())
            .collect();
        assert_eq!(leftovers, vec![std::ffi::OsString::from("default")]);
    }

    #[test]
    fn test_fingerprint_is_content_based() {
        let one = tempdir().unwrap();
        let two = tempdir().unwrap();
        for root in [one.path(), two.path()] {
            write(root, "x/y.txt", "same");
        }
        assert_eq!(tree_fingerprint(one.path()).unwrap(), tree_fingerprint(two.path()).unwrap());
        write(two.path(), "x/y.txt", "different");
        assert_ne!(tree_fingerprint(one.path()).unwrap(), tree_fingerprint(two.path()).unwrap());
    }
}
