// SPDX-License-Identifier: MIT

#![allow(unused_imports, unused_macros)]

//! Logging shim. With the `log` feature the macros forward to [`tracing`],
//! otherwise they compile to nothing. Never used on the per-instruction
//! hot path.

#[cfg(feature = "log")]
pub(crate) mod implementation {
    pub(crate) use tracing::debug;
    pub(crate) use tracing::trace;
    // Rename `warn` to avoid conflict with the Rust attribute of the same name
    pub(crate) use tracing::warn as warning;
}

#[cfg(not(feature = "log"))]
pub(crate) mod implementation {
    macro_rules! trace {
        ($($ignore:tt)*) => {};
    }

    macro_rules! debug {
        ($($ignore:tt)*) => {};
    }

    macro_rules! warning {
        ($($ignore:tt)*) => {};
    }

    pub(crate) use debug;
    pub(crate) use trace;
    pub(crate) use warning;
}

pub(crate) use implementation::{debug, trace, warning};
