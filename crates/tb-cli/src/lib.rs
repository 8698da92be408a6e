//! tunnel-bench: Command-line interface
//!
//! Provides the `tunnel-bench` binary that runs benchmark rounds, manages
//! key material and edits the host directory.

pub mod commands;
pub mod output;
