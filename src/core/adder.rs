// src/core/adder.rs

//! Declarative description of an add-on.

use crate::core::options::{self, OptionDefinition, OptionValues, RawOptions, ValidationError};
use crate::core::transform::{FileTransform, WorkspacePredicate};
use crate::core::workspace::Workspace;
use crate::system::executor::StdioMode;
use colored::Colorize;
use std::fmt;

/// Project kinds an add-on supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Environments {
    /// Plain component projects.
    pub svelte: bool,
    /// Kit applications.
    pub kit: bool,
}

impl Environments {
    /// Supported everywhere.
    pub const ALL: Self = Self {
        svelte: true,
        kit: true,
    };

    /// Whether a project (kit or not) is supported.
    pub fn supports(&self, kit: bool) -> bool {
        if kit { self.kit } else { self.svelte }
    }
}

/// A package the add-on installs.
#[derive(Debug, Clone)]
pub struct PackageDefinition {
    /// Package name.
    pub name: &'static str,
    /// Version range.
    pub version: &'static str,
    /// Installed as a dev dependency.
    pub dev: bool,
    /// Only installed when this holds.
    pub condition: Option<WorkspacePredicate>,
}

impl PackageDefinition {
    /// A runtime dependency.
    pub fn runtime(name: &'static str, version: &'static str) -> Self {
        Self {
            name,
            version,
            dev: false,
            condition: None,
        }
    }

    /// A dev dependency.
    pub fn dev(name: &'static str, version: &'static str) -> Self {
        Self {
            dev: true,
            ..Self::runtime(name, version)
        }
    }

    /// Only installed when `condition` holds.
    pub fn when(mut self, condition: WorkspacePredicate) -> Self {
        self.condition = Some(condition);
        self
    }
}

/// A command run after the transforms (code generation, formatting, ...).
#[derive(Clone)]
pub struct AdderAction {
    /// Shown to the user before running.
    pub description: &'static str,
    /// `[program, args...]` for the workspace.
    pub args: fn(&Workspace) -> Vec<String>,
    /// Output handling.
    pub stdio: StdioMode,
    /// Only runs when this holds.
    pub condition: Option<WorkspacePredicate>,
}

impl fmt::Debug for AdderAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdderAction")
            .field("description", &self.description)
            .field("stdio", &self.stdio)
            .finish_non_exhaustive()
    }
}

/// Styles fragments of next-step messages.
#[derive(Debug, Clone, Copy)]
pub struct Highlighter {
    colors: bool,
}

impl Highlighter {
    /// Highlighter using terminal colors.
    pub fn colored() -> Self {
        Self { colors: true }
    }

    /// Highlighter producing plain text.
    pub fn plain() -> Self {
        Self { colors: false }
    }

    fn style(&self, text: &str, styled: impl FnOnce(&str) -> colored::ColoredString) -> String {
        if self.colors {
            styled(text).to_string()
        } else {
            text.to_string()
        }
    }

    /// A file path.
    pub fn path(&self, text: &str) -> String {
        self.style(text, |t| t.green())
    }

    /// A command to run.
    pub fn command(&self, text: &str) -> String {
        self.style(text, |t| t.bold())
    }

    /// A URL.
    pub fn website(&self, text: &str) -> String {
        self.style(text, |t| t.cyan().underline())
    }

    /// A route of the application.
    pub fn route(&self, text: &str) -> String {
        self.style(text, |t| t.bold())
    }

    /// An environment variable name.
    pub fn env(&self, text: &str) -> String {
        self.style(text, |t| t.yellow())
    }
}

/// Produces next-step messages after a successful application.
pub type NextSteps = fn(&Workspace, &Highlighter) -> Vec<String>;

/// A complete add-on.
#[derive(Debug, Clone)]
pub struct AdderDefinition {
    /// Unique identifier.
    pub id: &'static str,
    /// Optional short name accepted wherever the id is.
    pub alias: Option<&'static str>,
    /// Display name.
    pub name: &'static str,
    /// One-line description.
    pub description: &'static str,
    /// Documentation URL.
    pub homepage: Option<&'static str>,
    /// Supported project kinds.
    pub environments: Environments,
    /// Ids of add-ons that must be applied first.
    pub depends_on: Vec<&'static str>,
    /// Option schema.
    pub options: OptionDefinition,
    /// Packages to add to the manifest.
    pub packages: Vec<PackageDefinition>,
    /// File transforms, applied in order.
    pub files: Vec<FileTransform>,
    /// Commands run after the transforms.
    pub setup_actions: Vec<AdderAction>,
    /// Commands that undo external side effects of the setup actions.
    pub teardown_actions: Vec<AdderAction>,
    /// Messages shown after a successful application.
    pub next_steps: Option<NextSteps>,
}

impl AdderDefinition {
    /// A minimal definition; fill the remaining fields with struct update syntax.
    pub fn new(id: &'static str, name: &'static str, description: &'static str) -> Self {
        Self {
            id,
            alias: None,
            name,
            description,
            homepage: None,
            environments: Environments::ALL,
            depends_on: Vec::new(),
            options: OptionDefinition::empty(),
            packages: Vec::new(),
            files: Vec::new(),
            setup_actions: Vec::new(),
            teardown_actions: Vec::new(),
            next_steps: None,
        }
    }

    /// Whether `name` is this add-on's id or alias.
    pub fn is_named(&self, name: &str) -> bool {
        self.id == name || self.alias == Some(name)
    }

    /// Validates caller-supplied options against this add-on's schema.
    pub fn validate_options(&self, raw: &RawOptions) -> Result<OptionValues, ValidationError> {
        options::validate(&self.options, raw)
    }

    /// Packages whose condition holds for `workspace`.
    pub fn packages_for<'a>(&'a self, workspace: &'a Workspace) -> impl Iterator<Item = &'a PackageDefinition> + 'a {
        self.packages
            .iter()
            .filter(move |p| p.condition.is_none_or(|condition| condition(workspace)))
    }

    /// Next-step messages for `workspace`.
    pub fn next_steps_for(&self, workspace: &Workspace, highlighter: &Highlighter) -> Vec<String> {
        self.next_steps
            .map(|steps| steps(workspace, highlighter))
            .unwrap_or_default()
    }
}
