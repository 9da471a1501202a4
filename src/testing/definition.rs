// src/testing/definition.rs

//! Declarative description of how an add-on is verified: which option sets to
//! try, which probe files to inject, which auxiliary services to bracket the
//! group with, and which assertion sequences to run against the live project.

use crate::core::options::{OptionDefinition, OptionValues, RawOptions};
use crate::core::transform::FileTransform;

/// One step of an assertion sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssertionStep {
    /// Navigates to `path` on the running instance.
    Visit { path: String },
    /// An element matching `selector` exists on the current page.
    ElementExists { selector: String },
    /// The first element matching `selector` has `property` equal to `expected`.
    ExpectProperty {
        selector: String,
        property: String,
        expected: String,
    },
    /// Follows the element matching `selector`; when `path` is set, the
    /// resulting location must be `path`.
    Click { selector: String, path: Option<String> },
    /// The current location's path is `path`.
    ExpectUrlPath { path: String },
}

impl AssertionStep {
    pub fn visit(path: &str) -> Self {
        Self::Visit { path: path.to_string() }
    }

    pub fn element_exists(selector: &str) -> Self {
        Self::ElementExists {
            selector: selector.to_string(),
        }
    }

    pub fn expect_property(selector: &str, property: &str, expected: &str) -> Self {
        Self::ExpectProperty {
            selector: selector.to_string(),
            property: property.to_string(),
            expected: expected.to_string(),
        }
    }

    pub fn click(selector: &str, path: Option<&str>) -> Self {
        Self::Click {
            selector: selector.to_string(),
            path: path.map(str::to_string),
        }
    }

    pub fn expect_url_path(path: &str) -> Self {
        Self::ExpectUrlPath { path: path.to_string() }
    }
}

/// Decides whether a test case runs for a given option set.
pub type OptionPredicate = fn(&OptionValues) -> bool;

/// A named assertion sequence. Every sequence starts on the root page.
#[derive(Debug, Clone)]
pub struct TestCase {
    pub name: String,
    pub steps: Vec<AssertionStep>,
    /// Only runs for option sets where this holds.
    pub condition: Option<OptionPredicate>,
}

impl TestCase {
    pub fn new(name: &str, steps: Vec<AssertionStep>) -> Self {
        Self {
            name: name.to_string(),
            steps,
            condition: None,
        }
    }

    pub fn when(mut self, condition: OptionPredicate) -> Self {
        self.condition = Some(condition);
        self
    }

    /// Whether this case runs for `values`.
    pub fn applies_to(&self, values: &OptionValues) -> bool {
        self.condition.is_none_or(|condition| condition(values))
    }
}

/// Commands bracketing a scenario group. Each command is an explicit argument
/// list run in the configured services directory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LifecycleHooks {
    pub before_all: Vec<Vec<String>>,
    pub after_all: Vec<Vec<String>>,
}

impl LifecycleHooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn before_all(mut self, args: &[&str]) -> Self {
        self.before_all.push(args.iter().map(|a| a.to_string()).collect());
        self
    }

    pub fn after_all(mut self, args: &[&str]) -> Self {
        self.after_all.push(args.iter().map(|a| a.to_string()).collect());
        self
    }
}

/// How an add-on is verified.
#[derive(Debug, Clone)]
pub struct TestDefinition {
    /// Schema every entry of `option_values` is validated against.
    pub options: OptionDefinition,
    /// One scenario per entry (and per compatible template). Empty means a
    /// single scenario with default options.
    pub option_values: Vec<RawOptions>,
    /// Probe transforms applied after the add-on, before installing.
    pub files: Vec<FileTransform>,
    pub lifecycle: Option<LifecycleHooks>,
    /// Forces the group's scenarios to run one at a time.
    pub run_synchronously: bool,
    /// Command run in the project after installing (a test suite, typically).
    pub command: Option<Vec<String>>,
    pub tests: Vec<TestCase>,
}

impl TestDefinition {
    /// A definition over `options` with a single default scenario.
    pub fn new(options: OptionDefinition) -> Self {
        Self {
            options,
            option_values: Vec::new(),
            files: Vec::new(),
            lifecycle: None,
            run_synchronously: false,
            command: None,
            tests: Vec::new(),
        }
    }

    /// Option sets to expand into scenarios, never empty.
    pub fn option_sets(&self) -> Vec<RawOptions> {
        if self.option_values.is_empty() {
            vec![RawOptions::new()]
        } else {
            self.option_values.clone()
        }
    }

    /// Test cases that run for `values`.
    pub fn tests_for<'a>(&'a self, values: &'a OptionValues) -> impl Iterator<Item = &'a TestCase> + 'a {
        self.tests.iter().filter(move |case| case.applies_to(values))
    }
}
