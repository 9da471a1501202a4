// src/core/mod.rs

pub mod adder;
pub mod config_loader;
pub mod dependency_graph;
pub mod installer;
pub mod options;
pub mod paths;
pub mod syntax;
pub mod transform;
pub mod workspace;
