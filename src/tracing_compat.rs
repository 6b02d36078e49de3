//! Optional integration with the `tracing` ecosystem.
//!
//! With the `tracing-integration` feature enabled, the lifecycle protocol
//! emits `tracing` events at its transitions; without it, the macros here
//! compile to nothing and the crate stays dependency-light.

#[cfg(feature = "tracing-integration")]
pub use tracing::{debug, error, trace, warn};

#[cfg(not(feature = "tracing-integration"))]
#[macro_export]
macro_rules! compat_trace {
    ($($arg:tt)*) => {{}};
}

#[cfg(not(feature = "tracing-integration"))]
#[macro_export]
macro_rules! compat_debug {
    ($($arg:tt)*) => {{}};
}

#[cfg(not(feature = "tracing-integration"))]
#[macro_export]
macro_rules! compat_warn {
    ($($arg:tt)*) => {{}};
}

#[cfg(not(feature = "tracing-integration"))]
#[macro_export]
macro_rules! compat_error {
    ($($arg:tt)*) => {{}};
}

#[cfg(not(feature = "tracing-integration"))]
pub use crate::{
    compat_debug as debug, compat_error as error, compat_trace as trace, compat_warn as warn,
};
