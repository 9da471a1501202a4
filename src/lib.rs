//! # adderkit
//!
//! Applies declarative, option-conditioned file transforms ("add-ons") to an
//! existing web application project, and verifies add-ons through a
//! matrix-driven integration harness.
//!
//! - [`core`] holds the option model, workspace resolution, the transform engine,
//!   dependency ordering and the application pipeline.
//! - [`system`] wraps external processes and auxiliary-service lifecycles.
//! - [`testing`] is the scenario harness: project materialization, live
//!   assertions, snapshot comparison and the matrix runner.
//! - [`adders`] is the built-in add-on catalog.

use std::sync::Arc;
use std::sync::atomic::AtomicBool;

/// Shared flag flipped by the binary's Ctrl+C handler; long-running loops poll it.
pub type CancellationToken = Arc<AtomicBool>;

pub mod adders;
pub mod cli;
pub mod constants;
pub mod core;
pub mod models;
pub mod system;
pub mod testing;
