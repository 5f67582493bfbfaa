//! Structured-logging shim.
//!
//! The wheel sits on event-loop hot paths, so its trace events must cost
//! nothing unless asked for. This module provides a unified interface that
//! works either way:
//!
//! - **With the `tracing-integration` feature**: re-exports from the
//!   `tracing` crate for full functionality.
//! - **Without it**: no-op macros that compile to nothing.
//!
//! # Usage
//!
//! ```rust,ignore
//! use crate::tracing_compat::{debug, trace};
//!
//! trace!(when, last, "timeout started");
//! debug!(len = wheel.len(), "drained all pending timeouts");
//! ```

#[cfg(feature = "tracing-integration")]
pub use tracing::{debug, error, info, trace, warn};

// When tracing is disabled, provide no-op macros.
#[cfg(not(feature = "tracing-integration"))]
mod noop {
    //! No-op implementations when tracing is disabled.
    //!
    //! These macros expand to nothing, ensuring zero compile-time and
    //! runtime cost.

    /// No-op trace-level logging macro.
    #[macro_export]
    macro_rules! trace {
        ($($arg:tt)*) => {};
    }

    /// No-op debug-level logging macro.
    #[macro_export]
    macro_rules! debug {
        ($($arg:tt)*) => {};
    }

    /// No-op info-level logging macro.
    #[macro_export]
    macro_rules! info {
        ($($arg:tt)*) => {};
    }

    /// No-op warn-level logging macro.
    #[macro_export]
    macro_rules! warn {
        ($($arg:tt)*) => {};
    }

    /// No-op error-level logging macro.
    #[macro_export]
    macro_rules! error {
        ($($arg:tt)*) => {};
    }

    // Re-export the macros at module level.
    pub use crate::{debug, error, info, trace, warn};
}

#[cfg(not(feature = "tracing-integration"))]
pub use noop::*;
