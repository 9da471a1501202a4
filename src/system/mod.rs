//! # System Interaction Layer
//!
//! Boundary between the engine and the operating system.
//!
//! ## Modules
//!
//! - **`executor`**: spawns external commands (package managers, compose) from
//!   explicit argument lists, with graceful cancellation (`Ctrl+C`), timeouts and
//!   optional output capture.
//! - **`lifecycle`**: start/stop bracketing of an auxiliary environment shared by
//!   a group of scenarios, with guaranteed single teardown.

pub mod executor;
pub mod lifecycle;
