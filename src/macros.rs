//! Hot-loop logging
//!
//! The split walk and the encoder progress loop log once per cut or progress
//! line. These macros forward to `log` in debug builds only; in release the
//! branch is constant-false and the call is removed.

/// `log::debug!` in debug builds, nothing in release
#[macro_export]
macro_rules! perf_debug {
    ($($arg:tt)*) => {
        if cfg!(debug_assertions) {
            log::debug!($($arg)*);
        }
    };
}

/// `log::trace!` in debug builds, nothing in release
#[macro_export]
macro_rules! perf_trace {
    ($($arg:tt)*) => {
        if cfg!(debug_assertions) {
            log::trace!($($arg)*);
        }
    };
}
