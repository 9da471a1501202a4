// src/testing/project.rs

//! Template discovery and isolated project copies for scenarios.

use crate::constants::IGNORED_TREE_ENTRIES;
use crate::core::workspace::WorkspaceResolver;
use crate::core::options::OptionValues;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use thiserror::Error;
use walkdir::{DirEntry, WalkDir};

#[derive(Error, Debug)]
pub enum ProjectError {
    #[error("Templates directory '{0}' does not exist or is not a directory.")]
    MissingTemplates(PathBuf),
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Could not walk '{path}': {source}")]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },
}

pub type ProjectResult<T> = Result<T, ProjectError>;

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> ProjectError + '_ {
    move |source| ProjectError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// A project template the matrix copies for each scenario.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    /// Directory name.
    pub name: String,
    pub path: PathBuf,
    /// Whether the template is a kit application.
    pub kit: bool,
}

/// Lists the templates under `templates_dir`, sorted by name.
pub fn discover_templates(templates_dir: &Path) -> ProjectResult<Vec<Template>> {
    if !templates_dir.is_dir() {
        return Err(ProjectError::MissingTemplates(templates_dir.to_path_buf()));
    }

    let mut templates = Vec::new();
    for entry in fs::read_dir(templates_dir).map_err(io_error(templates_dir))? {
        let entry = entry.map_err(io_error(templates_dir))?;
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with('.') {
            continue;
        }
        // Resolution is total; an unreadable template is treated as a plain one.
        let kit = WorkspaceResolver::new(&path)
            .and_then(|resolver| resolver.resolve(OptionValues::default()))
            .map(|workspace| workspace.kit.is_some())
            .unwrap_or(false);
        templates.push(Template { name, path, kit });
    }
    templates.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(templates)
}

/// Whether a tree entry takes part in copies and snapshots.
pub fn is_tracked(entry: &DirEntry) -> bool {
    entry.depth() == 0
        || !entry
            .file_name()
            .to_str()
            .is_some_and(|name| IGNORED_TREE_ENTRIES.contains(&name))
}

/// Copies the tracked entries of `from` into `to`. Returns the number of files copied.
pub fn copy_tree(from: &Path, to: &Path) -> ProjectResult<usize> {
    let mut copied = 0;
    for entry in WalkDir::new(from).sort_by_file_name().into_iter().filter_entry(is_tracked) {
        let entry = entry.map_err(|source| ProjectError::Walk {
            path: from.to_path_buf(),
            source,
        })?;
        let Ok(relative) = entry.path().strip_prefix(from) else {
            continue;
        };
        let destination = to.join(relative);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&destination).map_err(io_error(&destination))?;
        } else if entry.file_type().is_file() {
            if let Some(parent) = destination.parent() {
                fs::create_dir_all(parent).map_err(io_error(parent))?;
            }
            fs::copy(entry.path(), &destination).map_err(io_error(entry.path()))?;
            copied += 1;
        }
    }
    Ok(copied)
}

/// A scenario's private copy of a template. The directory is removed on drop.
#[derive(Debug)]
pub struct ScenarioProject {
    dir: TempDir,
}

impl ScenarioProject {
    /// Copies `template` into a fresh temporary directory.
    pub fn materialize(template: &Template, label: &str) -> ProjectResult<Self> {
        let dir = tempfile::Builder::new()
            .prefix(&format!("adderkit-{}-{}-", template.name, label))
            .tempdir()
            .map_err(io_error(&template.path))?;
        let copied = copy_tree(&template.path, dir.path())?;
        log::debug!(
            "Materialized template '{}' into '{}' ({} files)",
            template.name,
            dir.path().display(),
            copied
        );
        Ok(Self { dir })
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }
}
