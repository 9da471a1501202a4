// src/core/workspace.rs

//! # Workspace Resolution
//!
//! Turns a project directory plus validated option values into the read-only
//! context every transform receives. Detection is total: a missing or broken
//! marker file only means "not detected". The single hard failure is a project
//! root that cannot be listed.
//!
//! File access goes through [`ProjectFiles`], which is shared by all add-ons of
//! one application run so that changed paths and requested dependencies are
//! collected in one place.

use crate::constants::MANIFEST_FILENAME;
use crate::core::options::OptionValues;
use crate::core::syntax::json::{self, JsonDocument};
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;

lazy_static! {
    static ref ROUTES_DIR_RE: Regex =
        Regex::new(r#"(?:^|[\s{,])routes\s*:\s*['"]([^'"]+)['"]"#).unwrap();
    static ref LIB_DIR_RE: Regex =
        Regex::new(r#"(?:^|[\s{,])lib\s*:\s*['"]([^'"]+)['"]"#).unwrap();
}

const DEFAULT_ROUTES_DIR: &str = "src/routes";
const DEFAULT_LIB_DIR: &str = "src/lib";

/// Errors raised while resolving a workspace or touching its files.
#[derive(Error, Debug)]
pub enum WorkspaceError {
    /// The project root does not exist or cannot be listed.
    #[error("Could not read project directory '{path}': {source}")]
    UnreadableRoot {
        /// The project root.
        path: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// A project file exists but could not be read.
    #[error("Could not read '{path}': {source}")]
    Read {
        /// The file that failed.
        path: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// A project file could not be written.
    #[error("Could not write '{path}': {source}")]
    Write {
        /// The file that failed.
        path: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

type WorkspaceResult<T> = Result<T, WorkspaceError>;

/// Package manager used by the project, detected from its lock file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PackageManager {
    /// `package-lock.json`, or no lock file at all.
    #[default]
    Npm,
    /// `pnpm-lock.yaml`.
    Pnpm,
    /// `yarn.lock`.
    Yarn,
    /// `bun.lockb`.
    Bun,
}

impl PackageManager {
    const LOCKFILES: [(&'static str, Self); 4] = [
        ("pnpm-lock.yaml", Self::Pnpm),
        ("yarn.lock", Self::Yarn),
        ("bun.lockb", Self::Bun),
        ("package-lock.json", Self::Npm),
    ];

    /// Detects the package manager from the lock files in `root`.
    pub fn detect(root: &Path) -> Self {
        Self::LOCKFILES
            .iter()
            .find(|(file, _)| root.join(file).is_file())
            .map(|(_, pm)| *pm)
            .unwrap_or_default()
    }

    /// The executable name.
    pub fn name(self) -> &'static str {
        match self {
            Self::Npm => "npm",
            Self::Pnpm => "pnpm",
            Self::Yarn => "yarn",
            Self::Bun => "bun",
        }
    }

    /// Arguments that install the project's dependencies.
    pub fn install_command(self) -> Vec<String> {
        vec![self.name().to_string(), "install".to_string()]
    }

    /// Arguments that run a `package.json` script.
    pub fn run_command(self, script: &str) -> Vec<String> {
        match self {
            Self::Npm | Self::Bun => vec![self.name().into(), "run".into(), script.into()],
            Self::Pnpm | Self::Yarn => vec![self.name().into(), script.into()],
        }
    }
}

impl fmt::Display for PackageManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Directory layout of a kit application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KitLayout {
    /// Route directory, relative to the project root.
    pub routes_directory: String,
    /// Library directory, relative to the project root.
    pub lib_directory: String,
}

/// Result of reading a project file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileContent {
    /// The file does not exist.
    Absent,
    /// The file exists with this content.
    Present(String),
}

impl FileContent {
    /// The content, if the file exists.
    pub fn as_deref(&self) -> Option<&str> {
        match self {
            Self::Absent => None,
            Self::Present(content) => Some(content),
        }
    }
}

/// A dependency requested by an add-on, flushed into the manifest after its
/// transforms ran.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyRequest {
    /// Package name.
    pub name: String,
    /// Version range.
    pub version: String,
    /// `devDependencies` when true, `dependencies` otherwise.
    pub dev: bool,
}

/// File access rooted at the project directory.
#[derive(Debug)]
pub struct ProjectFiles {
    root: PathBuf,
    changed: Mutex<BTreeSet<PathBuf>>,
    dependencies: Mutex<Vec<DependencyRequest>>,
}

impl ProjectFiles {
    /// Creates file access for `root`.
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            changed: Mutex::new(BTreeSet::new()),
            dependencies: Mutex::new(Vec::new()),
        }
    }

    /// The project root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Reads a file relative to the root.
    pub fn read(&self, relative: &str) -> WorkspaceResult<FileContent> {
        let path = self.root.join(relative);
        match fs::read_to_string(&path) {
            Ok(content) => Ok(FileContent::Present(content)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(FileContent::Absent),
            Err(source) => Err(WorkspaceError::Read {
                path: path.display().to_string(),
                source,
            }),
        }
    }

    /// Writes a file relative to the root, creating parent directories.
    ///
    /// Returns whether the file changed; identical content is not rewritten.
    pub fn write(&self, relative: &str, content: &str) -> WorkspaceResult<bool> {
        if self.read(relative)?.as_deref() == Some(content) {
            log::trace!("'{}' unchanged, skipping write", relative);
            return Ok(false);
        }

        let path = self.root.join(relative);
        let to_error = |source: std::io::Error| WorkspaceError::Write {
            path: path.display().to_string(),
            source,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(to_error)?;
        }
        fs::write(&path, content).map_err(to_error)?;

        self.changed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(PathBuf::from(relative));
        Ok(true)
    }

    /// Records a dependency to add to the manifest.
    pub fn register_dependency(&self, name: &str, version: &str, dev: bool) {
        self.dependencies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(DependencyRequest {
                name: name.to_string(),
                version: version.to_string(),
                dev,
            });
    }

    /// Drains the dependencies recorded so far.
    pub fn take_dependencies(&self) -> Vec<DependencyRequest> {
        std::mem::take(
            &mut *self
                .dependencies
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        )
    }

    /// Paths written so far, relative to the root, sorted.
    pub fn changed_paths(&self) -> Vec<PathBuf> {
        self.changed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }
}

/// Everything a transform may know about the target project.
#[derive(Debug, Clone)]
pub struct Workspace {
    /// Project root.
    pub cwd: PathBuf,
    /// Validated options of the add-on being applied.
    pub options: OptionValues,
    /// Whether the project is typed.
    pub typescript: bool,
    /// Whether the project depends on svelte.
    pub svelte: bool,
    /// Kit layout, when the project is a kit application.
    pub kit: Option<KitLayout>,
    /// Detected package manager.
    pub package_manager: PackageManager,
    /// File access shared with the rest of the run.
    pub files: Arc<ProjectFiles>,
}

impl Workspace {
    /// `ts` or `js`, matching the project's language.
    pub fn script_extension(&self) -> &'static str {
        if self.typescript { "ts" } else { "js" }
    }

    /// The routes directory, with the conventional default outside kit projects.
    pub fn routes_dir(&self) -> &str {
        self.kit
            .as_ref()
            .map_or(DEFAULT_ROUTES_DIR, |kit| kit.routes_directory.as_str())
    }

    /// The library directory, with the conventional default outside kit projects.
    pub fn lib_dir(&self) -> &str {
        self.kit
            .as_ref()
            .map_or(DEFAULT_LIB_DIR, |kit| kit.lib_directory.as_str())
    }
}

/// Builds [`Workspace`] values for one project directory.
#[derive(Debug, Clone)]
pub struct WorkspaceResolver {
    files: Arc<ProjectFiles>,
}

impl WorkspaceResolver {
    /// Creates a resolver for `cwd`.
    pub fn new(cwd: &Path) -> WorkspaceResult<Self> {
        let root = fs::canonicalize(cwd)
            .map(|p| dunce::simplified(&p).to_path_buf())
            .map_err(|source| WorkspaceError::UnreadableRoot {
                path: cwd.display().to_string(),
                source,
            })?;
        Ok(Self {
            files: Arc::new(ProjectFiles::new(&root)),
        })
    }

    /// File access shared by every workspace this resolver produces.
    pub fn files(&self) -> &Arc<ProjectFiles> {
        &self.files
    }

    /// Inspects the project and returns a workspace carrying `options`.
    ///
    /// Markers are re-read on every call, so an add-on applied earlier in the
    /// same run (adding `typescript`, say) is visible to later ones.
    pub fn resolve(&self, options: OptionValues) -> WorkspaceResult<Workspace> {
        let root = self.files.root();

        // 1. The root must be listable; everything else is best effort.
        fs::read_dir(root).map_err(|source| WorkspaceError::UnreadableRoot {
            path: root.display().to_string(),
            source,
        })?;

        // 2. Dependencies declared in the manifest.
        let dependencies = self.declared_dependencies();
        let depends_on = |name: &str| dependencies.contains(name);

        // 3. Language and framework markers.
        let typescript = depends_on("typescript") || root.join("tsconfig.json").is_file();
        let svelte = depends_on("svelte");
        let kit = depends_on("@sveltejs/kit").then(|| self.kit_layout());

        let workspace = Workspace {
            cwd: root.to_path_buf(),
            options,
            typescript,
            svelte,
            kit,
            package_manager: PackageManager::detect(root),
            files: Arc::clone(&self.files),
        };
        log::debug!(
            "Resolved workspace '{}': typescript={}, svelte={}, kit={}, package manager={}",
            workspace.cwd.display(),
            workspace.typescript,
            workspace.svelte,
            workspace.kit.is_some(),
            workspace.package_manager
        );
        Ok(workspace)
    }

    fn declared_dependencies(&self) -> BTreeSet<String> {
        let Ok(content) = self.files.read(MANIFEST_FILENAME) else {
            return BTreeSet::new();
        };
        let Some(Ok(manifest)) = content.as_deref().map(JsonDocument::parse) else {
            return BTreeSet::new();
        };
        ["dependencies", "devDependencies"]
            .iter()
            .filter_map(|section| json::get(manifest.value(), section)?.as_object())
            .flat_map(|deps| deps.keys().cloned())
            .collect()
    }

    fn kit_layout(&self) -> KitLayout {
        let config = ["svelte.config.js", "svelte.config.ts"]
            .iter()
            .find_map(|file| match self.files.read(file) {
                Ok(FileContent::Present(content)) => Some(content),
                _ => None,
            })
            .unwrap_or_default();

        let capture = |re: &Regex, fallback: &str| {
            re.captures(&config)
                .and_then(|c| c.get(1))
                .map_or_else(|| fallback.to_string(), |m| m.as_str().trim_end_matches('/').to_string())
        };
        KitLayout {
            routes_directory: capture(&ROUTES_DIR_RE, DEFAULT_ROUTES_DIR),
            lib_directory: capture(&LIB_DIR_RE, DEFAULT_LIB_DIR),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    fn write(root: &Path, file: &str, content: &str) {
        let path = root.join(file);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_detects_kit_typescript_project() {
        let dir = tempdir().unwrap();
        write(
            dir.path(),
            "package.json",
            r#"{ "devDependencies": { "@sveltejs/kit": "^2", "svelte": "^5", "typescript": "^5" } }"#,
        );
        write(
            dir.path(),
            "svelte.config.js",
            "export default { kit: { files: { routes: 'app/pages/', lib: \"app/lib\" } } };",
        );
        write(dir.path(), "pnpm-lock.yaml", "");

        let ws = WorkspaceResolver::new(dir.path())
            .unwrap()
            .resolve(OptionValues::default())
            .unwrap();
        assert!(ws.typescript);
        assert!(ws.svelte);
        assert_eq!(ws.package_manager, PackageManager::Pnpm);
        assert_eq!(
            ws.kit,
            Some(KitLayout {
                routes_directory: "app/pages".into(),
                lib_directory: "app/lib".into()
            })
        );
        assert_eq!(ws.script_extension(), "ts");
    }

    #[test]
    fn test_missing_markers_default_to_plain_project() {
        let dir = tempdir().unwrap();
        write(dir.path(), "package.json", "{ not json");

        let ws = WorkspaceResolver::new(dir.path())
            .unwrap()
            .resolve(OptionValues::default())
            .unwrap();
        assert!(!ws.typescript);
        assert!(!ws.svelte);
        assert_eq!(ws.kit, None);
        assert_eq!(ws.package_manager, PackageManager::Npm);
        assert_eq!(ws.routes_dir(), "src/routes");
    }

    #[test]
    fn test_unreadable_root_is_an_error() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("nope");
        assert!(matches!(
            WorkspaceResolver::new(&missing),
            Err(WorkspaceError::UnreadableRoot { .. })
        ));
    }

    #[test]
    fn test_project_files_track_changes() {
        let dir = tempdir().unwrap();
        let files = ProjectFiles::new(dir.path());

        assert_eq!(files.read("src/a.ts").unwrap(), FileContent::Absent);
        assert!(files.write("src/a.ts", "x").unwrap());
        assert!(!files.write("src/a.ts", "x").unwrap());
        assert_eq!(files.changed_paths(), vec![PathBuf::from("src/a.ts")]);

        files.register_dependency("vitest", "^2.0.0", true);
        assert_eq!(files.take_dependencies().len(), 1);
        assert!(files.take_dependencies().is_empty());
    }
}
