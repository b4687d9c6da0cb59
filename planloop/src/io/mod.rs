//! I/O seams for the agent loop.

pub mod config;
pub mod llm;
pub mod process;
pub mod substrate;
