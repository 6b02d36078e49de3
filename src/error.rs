//! Fault type carried through the error hook.
//!
//! A [`Fault`] is the failure payload raised by a user callback. It travels
//! from the point of failure to the error phase of the lifecycle protocol,
//! where installed error listeners may claim it as handled.

use core::fmt;
use serde_json::Value;

/// A failure raised by a user-supplied callback.
///
/// Faults carry a human-readable message and an optional structured detail
/// payload. They are cheap to construct and clone; the tracker never
/// inspects the detail, it only forwards the fault to error listeners.
#[derive(Debug, Clone, PartialEq)]
pub struct Fault {
    message: String,
    detail: Option<Value>,
}

impl Fault {
    /// Creates a fault with the given message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            detail: None,
        }
    }

    /// Creates a fault with a message and a structured detail payload.
    #[must_use]
    pub fn with_detail(message: impl Into<String>, detail: Value) -> Self {
        Self {
            message: message.into(),
            detail: Some(detail),
        }
    }

    /// Returns the fault message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the structured detail payload, if any.
    #[must_use]
    pub fn detail(&self) -> Option<&Value> {
        self.detail.as_ref()
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.detail {
            Some(detail) => write!(f, "{}: {detail}", self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for Fault {}
