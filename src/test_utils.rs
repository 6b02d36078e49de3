//! Shared helpers for the test suites.

/// Initializes logging for a test run.
///
/// The lifecycle protocol logs through [`crate::tracing_compat`]; when the
/// `tracing-integration` feature is off there is nothing to set up and this
/// is a no-op. Kept as the single seam where a subscriber would be
/// installed.
pub fn init_test_logging() {}

/// Marks the start of a test phase.
#[macro_export]
macro_rules! test_phase {
    ($name:expr) => {
        $crate::tracing_compat::debug!("=== phase: {} ===", $name)
    };
}

/// Marks a test as complete.
#[macro_export]
macro_rules! test_complete {
    ($name:expr) => {
        $crate::tracing_compat::debug!("=== complete: {} ===", $name)
    };
}

/// Asserts a condition, reporting the expected and actual values on
/// failure.
#[macro_export]
macro_rules! assert_with_log {
    ($cond:expr, $label:expr, $expected:expr, $actual:expr) => {
        assert!(
            $cond,
            "{}: expected {:?}, got {:?}",
            $label, $expected, $actual
        )
    };
}
