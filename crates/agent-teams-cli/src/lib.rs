//! Binary-crate support modules for the `agent-teams` CLI.
//!
//! The library half stays thin on purpose: argument parsing, the HTTP
//! member executor, and run-report formatting are the only concerns that
//! benefit from being unit-testable outside of `main`. Everything else
//! (wiring `RuntimeConfig`, the gate, and storage together) lives in
//! `main.rs`, the same split the reference binary crate uses between its
//! library modules and its `main` driver loop.

pub mod cli_args;
pub mod http_executor;
pub mod report;
pub mod team_file;
