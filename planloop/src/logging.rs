//! Development-time tracing for debugging the agent loop.
//!
//! # Separation of Concerns
//!
//! - **Tracing (this module)**: Dev diagnostics via `RUST_LOG` or `-v`, output to
//!   stderr. Not part of the run output.
//!
//! - **Run log (`core::log`)**: Entries delivered to the caller's sink and
//!   kept in the run record. Always produced, unaffected by either knob.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Install the stderr subscriber.
///
/// `RUST_LOG` wins when set. Otherwise `verbose` (the count of `-v` flags)
/// picks the filter from [`default_directive`].
///
/// # Example
/// ```bash
/// planloop -vv run "fetch the weather"
/// RUST_LOG=planloop::io::llm=debug planloop run "fetch the weather"
/// ```
pub fn init(verbose: u8) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbose)));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(verbose > 1)
                .compact(),
        )
        .init();
}

/// Filter used when `RUST_LOG` is unset.
///
/// Dependencies stay at `warn`; only this crate gets louder.
pub fn default_directive(verbose: u8) -> &'static str {
    match verbose {
        0 => "warn",
        1 => "warn,planloop=info",
        _ => "warn,planloop=debug",
    }
}
