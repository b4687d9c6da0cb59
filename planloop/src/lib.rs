//! Goal-driven agent orchestration loop.
//!
//! A language model is asked for exactly one JSON action at a time. `run_task`
//! actions are dispatched to a job substrate and their results folded back
//! into the conversation; a `finish` action ends the run. The architecture
//! keeps a strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (action parsing, history, log
//!   entries). No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting seams (model provider, substrate, processes,
//!   config). Traits at each seam allow scripted doubles in tests.
//!
//! [`agent`] drives the loop; [`record`] wraps a run into its user-facing
//! summary; [`tasks`] and [`prompt`] build what the model is shown.

pub mod agent;
pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod prompt;
pub mod record;
pub mod tasks;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
