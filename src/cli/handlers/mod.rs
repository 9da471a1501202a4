// src/cli/handlers/mod.rs

// One module per command; each exposes `handle(args, token)`.

pub mod add;
pub mod commons;
pub mod list;
pub mod snapshot;
pub mod test;
