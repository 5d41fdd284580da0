//! ABOUTME: Orchestration for the framewatch binary: pipeline supervision and operator input
//! ABOUTME: Kept in a library so integration tests can drive full runs

pub mod operator;
pub mod pipeline;

pub use operator::{forward_commands, spawn_stdin_reader, OperatorCommand};
pub use pipeline::{open_source, Pipeline, RunSummary};
