//! Verbosity-gated logging macros for the resolution pipeline.
//!
//! Every macro is a no-op below its level, so the format arguments are never
//! evaluated at verbosity 0. Output goes through `tracing`, letting the host
//! decide where it ends up:
//! - 0: SILENT (nothing)
//! - 1: CHANGES (stage transitions, graph mutations) -> `info`
//! - 2: CHECKS (per-node decisions, skipped edges) -> `debug`
//! - 3: DEBUG (full algorithm internals) -> `trace`

/// Verbosity level constants.
pub const VERBOSITY_SILENT: u8 = 0;
pub const VERBOSITY_CHANGES: u8 = 1;
pub const VERBOSITY_CHECKS: u8 = 2;
pub const VERBOSITY_DEBUG: u8 = 3;

/// Log at CHANGES level (verbosity >= 1).
///
/// Used for: stage completion, removed edges, cycle counts.
#[macro_export]
macro_rules! log_changes {
    ($verbosity:expr, $($arg:tt)*) => {
        if $verbosity >= $crate::logging::VERBOSITY_CHANGES {
            ::tracing::info!(target: "schedule_resolver", $($arg)*);
        }
    };
}

/// Log at CHECKS level (verbosity >= 2).
///
/// Used for: block packing decisions, skipped dependencies, cycle candidates.
#[macro_export]
macro_rules! log_checks {
    ($verbosity:expr, $($arg:tt)*) => {
        if $verbosity >= $crate::logging::VERBOSITY_CHECKS {
            ::tracing::debug!(target: "schedule_resolver", $($arg)*);
        }
    };
}

/// Log at DEBUG level (verbosity >= 3).
///
/// Used for: per-node timings, traversal internals.
#[macro_export]
macro_rules! log_debug {
    ($verbosity:expr, $($arg:tt)*) => {
        if $verbosity >= $crate::logging::VERBOSITY_DEBUG {
            ::tracing::trace!(target: "schedule_resolver", $($arg)*);
        }
    };
}
