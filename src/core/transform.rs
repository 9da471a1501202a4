// src/core/transform.rs

//! # Transform Engine
//!
//! A [`FileTransform`] names a target file and a merge function for one of four
//! content kinds. The engine resolves the target once, reads the current
//! content, hands it to the strategy for that kind and writes the result back
//! through [`ProjectFiles`](crate::core::workspace::ProjectFiles).
//!
//! Merge functions and conditions are plain `fn` pointers, so they cannot
//! capture state: their output depends only on the workspace and the content.

use crate::core::syntax::SyntaxError;
use crate::core::syntax::json::JsonDocument;
use crate::core::syntax::markup::ComponentFile;
use crate::core::syntax::script::ScriptAst;
use crate::core::workspace::{FileContent, Workspace, WorkspaceError};
use std::collections::HashSet;
use std::fmt;
use thiserror::Error;

/// Merge over the statements of a script module.
pub type ScriptMerge = fn(&Workspace, &mut ScriptAst) -> anyhow::Result<()>;
/// Merge over a component: its instance script and its markup.
pub type ComponentMerge = fn(&Workspace, &mut ComponentFile) -> anyhow::Result<()>;
/// Merge over a structured-data tree.
pub type DataMerge = fn(&Workspace, &mut serde_json::Value) -> anyhow::Result<()>;
/// Rewrite of opaque text.
pub type TextMerge = fn(&Workspace, &str) -> anyhow::Result<String>;
/// Applicability predicate over the workspace.
pub type WorkspacePredicate = fn(&Workspace) -> bool;

/// Where a transform writes.
#[derive(Clone)]
pub enum TargetPath {
    /// A path relative to the project root.
    Fixed(String),
    /// A path computed from the workspace (language, kit layout, options).
    Computed(fn(&Workspace) -> String),
}

impl TargetPath {
    /// Resolves the relative path for `workspace`.
    pub fn resolve(&self, workspace: &Workspace) -> String {
        match self {
            Self::Fixed(path) => path.clone(),
            Self::Computed(compute) => compute(workspace),
        }
    }
}

impl fmt::Debug for TargetPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fixed(path) => write!(f, "Fixed({path:?})"),
            Self::Computed(_) => f.write_str("Computed(..)"),
        }
    }
}

impl From<&str> for TargetPath {
    fn from(path: &str) -> Self {
        Self::Fixed(path.to_string())
    }
}

impl From<fn(&Workspace) -> String> for TargetPath {
    fn from(compute: fn(&Workspace) -> String) -> Self {
        Self::Computed(compute)
    }
}

/// What to do when the target file does not exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Presence {
    /// Merge into empty content and create the file.
    #[default]
    CreateIfMissing,
    /// Fail the transform.
    RequireExisting,
}

/// The content kind of a transform and its merge function.
#[derive(Clone, Copy)]
pub enum ContentMerge {
    /// JavaScript/TypeScript module.
    Script(ScriptMerge),
    /// Component file (markup with an instance script).
    MarkupScript(ComponentMerge),
    /// JSON document.
    StructuredData(DataMerge),
    /// Anything else.
    Text(TextMerge),
}

impl fmt::Debug for ContentMerge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Script(_) => "Script",
            Self::MarkupScript(_) => "MarkupScript",
            Self::StructuredData(_) => "StructuredData",
            Self::Text(_) => "Text",
        })
    }
}

/// Why a merge did not produce content.
#[derive(Error, Debug)]
pub enum MergeFailure {
    /// The existing content could not be parsed.
    #[error(transparent)]
    Syntax(#[from] SyntaxError),
    /// The merge function itself failed.
    #[error("{0:#}")]
    Callback(anyhow::Error),
}

/// Produces new file content from the current one.
pub trait ContentStrategy {
    /// Merges into `existing` (`None` when the file is absent).
    fn apply(&self, workspace: &Workspace, existing: Option<&str>) -> Result<String, MergeFailure>;
}

impl ContentStrategy for ContentMerge {
    fn apply(&self, workspace: &Workspace, existing: Option<&str>) -> Result<String, MergeFailure> {
        let source = existing.unwrap_or_default();
        match self {
            Self::Script(merge) => {
                let mut ast = ScriptAst::parse(source)?;
                merge(workspace, &mut ast).map_err(MergeFailure::Callback)?;
                Ok(ast.print())
            }
            Self::MarkupScript(merge) => {
                let mut component = ComponentFile::parse(source, workspace.typescript)?;
                merge(workspace, &mut component).map_err(MergeFailure::Callback)?;
                Ok(component.print())
            }
            Self::StructuredData(merge) => {
                let mut document = JsonDocument::parse(source)?;
                merge(workspace, document.value_mut()).map_err(MergeFailure::Callback)?;
                Ok(document.print()?)
            }
            Self::Text(merge) => merge(workspace, source).map_err(MergeFailure::Callback),
        }
    }
}

/// A declarative file transform.
#[derive(Debug, Clone)]
pub struct FileTransform {
    /// Target file.
    pub target: TargetPath,
    /// Behaviour when the target is absent.
    pub presence: Presence,
    /// The transform only runs when this holds.
    pub condition: Option<WorkspacePredicate>,
    /// Content kind and merge function.
    pub merge: ContentMerge,
}

impl FileTransform {
    fn new(target: impl Into<TargetPath>, merge: ContentMerge) -> Self {
        Self {
            target: target.into(),
            presence: Presence::CreateIfMissing,
            condition: None,
            merge,
        }
    }

    /// A script module transform.
    pub fn script(target: impl Into<TargetPath>, merge: ScriptMerge) -> Self {
        Self::new(target, ContentMerge::Script(merge))
    }

    /// A component transform.
    pub fn component(target: impl Into<TargetPath>, merge: ComponentMerge) -> Self {
        Self::new(target, ContentMerge::MarkupScript(merge))
    }

    /// A JSON transform.
    pub fn data(target: impl Into<TargetPath>, merge: DataMerge) -> Self {
        Self::new(target, ContentMerge::StructuredData(merge))
    }

    /// A plain text transform.
    pub fn text(target: impl Into<TargetPath>, merge: TextMerge) -> Self {
        Self::new(target, ContentMerge::Text(merge))
    }

    /// Only runs when `condition` holds.
    pub fn when(mut self, condition: WorkspacePredicate) -> Self {
        self.condition = Some(condition);
        self
    }

    /// Fails instead of creating the target.
    pub fn require_existing(mut self) -> Self {
        self.presence = Presence::RequireExisting;
        self
    }

    /// Whether the transform applies to `workspace`.
    pub fn applies_to(&self, workspace: &Workspace) -> bool {
        self.condition.is_none_or(|condition| condition(workspace))
    }
}

/// What went wrong with one transform.
#[derive(Error, Debug)]
pub enum TransformCause {
    /// A `RequireExisting` transform targeted an absent file.
    #[error("the file does not exist")]
    MissingFile,
    /// The merge failed.
    #[error(transparent)]
    Merge(#[from] MergeFailure),
    /// Reading or writing the file failed.
    #[error(transparent)]
    Io(#[from] WorkspaceError),
}

/// A failed transform, attributed to its add-on and target file.
#[derive(Error, Debug)]
#[error("[{adder}] could not transform '{path}': {cause}")]
pub struct TransformError {
    /// Add-on id.
    pub adder: String,
    /// Target path, relative to the project root.
    pub path: String,
    /// The failure.
    #[source]
    pub cause: TransformCause,
}

/// Outcome of applying one add-on's transforms.
#[derive(Debug, Default)]
pub struct TransformReport {
    /// Paths whose content changed, in application order, without duplicates.
    pub changed: Vec<String>,
    /// Transforms skipped because their condition did not hold.
    pub skipped: usize,
    /// Failed transforms.
    pub errors: Vec<TransformError>,
}

impl TransformReport {
    /// Whether every transform succeeded.
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Applies `transforms` in declared order.
///
/// A failure on a path skips the remaining transforms of that path for this
/// add-on; other paths continue.
pub fn apply_transforms(adder: &str, transforms: &[FileTransform], workspace: &Workspace) -> TransformReport {
    let mut report = TransformReport::default();
    let mut failed_paths: HashSet<String> = HashSet::new();

    for transform in transforms {
        // 1. Conditions are evaluated before the path is resolved.
        if !transform.applies_to(workspace) {
            log::debug!("[{}] skipping {:?} transform: condition does not hold", adder, transform.target);
            report.skipped += 1;
            continue;
        }

        // 2. The target is resolved exactly once.
        let path = transform.target.resolve(workspace);
        if failed_paths.contains(&path) {
            log::debug!("[{}] skipping transform of '{}' after an earlier failure", adder, path);
            continue;
        }

        // 3. Read, merge, write.
        match apply_one(transform, &path, workspace) {
            Ok(true) => {
                if !report.changed.contains(&path) {
                    report.changed.push(path);
                }
            }
            Ok(false) => log::trace!("[{}] '{}' already up to date", adder, path),
            Err(cause) => {
                failed_paths.insert(path.clone());
                report.errors.push(TransformError {
                    adder: adder.to_string(),
                    path,
                    cause,
                });
            }
        }
    }
    report
}

fn apply_one(transform: &FileTransform, path: &str, workspace: &Workspace) -> Result<bool, TransformCause> {
    let existing = workspace.files.read(path)?;
    if existing == FileContent::Absent && transform.presence == Presence::RequireExisting {
        return Err(TransformCause::MissingFile);
    }
    let content = transform.merge.apply(workspace, existing.as_deref())?;
    Ok(workspace.files.write(path, &content)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::options::OptionValues;
    use crate::core::syntax::json;
    use crate::core::workspace::WorkspaceResolver;
    use pretty_assertions::assert_eq;
    use std::fs;
    use tempfile::tempdir;

    fn workspace(root: &std::path::Path) -> Workspace {
        WorkspaceResolver::new(root)
            .unwrap()
            .resolve(OptionValues::default())
            .unwrap()
    }

    fn add_helper(_: &Workspace, ast: &mut ScriptAst) -> anyhow::Result<()> {
        ast.add_from_string("export const helper = () => 42;")?;
        Ok(())
    }

    fn add_test_script(_: &Workspace, value: &mut serde_json::Value) -> anyhow::Result<()> {
        json::set_default(value, "scripts.test", "vitest".into());
        Ok(())
    }

    fn fail(_: &Workspace, _: &str) -> anyhow::Result<String> {
        anyhow::bail!("boom")
    }

    fn append_line(_: &Workspace, content: &str) -> anyhow::Result<String> {
        Ok(format!("{content}line\n"))
    }

    fn helper_path(ws: &Workspace) -> String {
        format!("{}/helper.{}", ws.lib_dir(), ws.script_extension())
    }

    #[test]
    fn test_applying_twice_is_idempotent() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("package.json"), "{\n\t\"name\": \"app\"\n}\n").unwrap();
        let ws = workspace(dir.path());
        let transforms = [
            FileTransform::script(helper_path as fn(&Workspace) -> String, add_helper),
            FileTransform::data("package.json", add_test_script),
        ];

        let first = apply_transforms("demo", &transforms, &ws);
        assert!(first.is_ok());
        assert_eq!(first.changed, vec!["src/lib/helper.js", "package.json"]);
        let snapshot = fs::read_to_string(dir.path().join("src/lib/helper.js")).unwrap();

        let second = apply_transforms("demo", &transforms, &ws);
        assert!(second.is_ok());
        assert!(second.changed.is_empty());
        assert_eq!(fs::read_to_string(dir.path().join("src/lib/helper.js")).unwrap(), snapshot);
    }

    #[test]
    fn test_failure_skips_same_path_only() {
        let dir = tempdir().unwrap();
        let ws = workspace(dir.path());
        let transforms = [
            FileTransform::text("a.txt", fail),
            FileTransform::text("a.txt", append_line),
            FileTransform::text("missing.txt", append_line).require_existing(),
            FileTransform::text("b.txt", append_line),
        ];

        let report = apply_transforms("demo", &transforms, &ws);
        assert_eq!(report.changed, vec!["b.txt"]);
        assert_eq!(report.errors.len(), 2);
        assert!(matches!(report.errors[1].cause, TransformCause::MissingFile));
        assert_eq!(report.errors[0].to_string(), "[demo] could not transform 'a.txt': boom");
        assert!(!dir.path().join("a.txt").exists());
        assert!(!dir.path().join("missing.txt").exists());
    }

    #[test]
    fn test_condition_false_leaves_file_untouched() {
        let dir = tempdir().unwrap();
        let ws = workspace(dir.path());
        let transforms = [FileTransform::text("a.txt", append_line).when(|ws| ws.typescript)];

        let report = apply_transforms("demo", &transforms, &ws);
        assert_eq!(report.skipped, 1);
        assert!(!dir.path().join("a.txt").exists());
    }

    #[test]
    fn test_unparseable_content_is_a_merge_failure() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("broken.js"), "const a = (;\n").unwrap();
        let ws = workspace(dir.path());
        let report = apply_transforms("demo", &[FileTransform::script("broken.js", add_helper)], &ws);
        assert!(matches!(
            report.errors[0].cause,
            TransformCause::Merge(MergeFailure::Syntax(_))
        ));
    }
}
