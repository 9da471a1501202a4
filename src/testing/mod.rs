//! # Scenario Test Harness
//!
//! Verifies add-ons end to end over a declared option matrix.
//!
//! - **`definition`**: what to verify (option sets, probes, hooks, assertion sequences).
//! - **`project`**: template discovery and isolated per-scenario copies.
//! - **`assertions`**: behavioural checks against a running instance.
//! - **`snapshot`**: byte-level comparison of mutated trees against baselines.
//! - **`matrix`**: the concurrent scenario runner tying the above together.

pub mod assertions;
pub mod definition;
pub mod matrix;
pub mod project;
pub mod snapshot;
