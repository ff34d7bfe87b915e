//! VM error types and result handling.
//!
//! Every fallible operation in this crate returns [`VmResult`]. None of the
//! errors are transient: an error aborts the current execution context.

use thiserror::Error;

/// Errors raised by the reference tracking core and the execution engine around it.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VmError {
    /// The caller asked for something the VM does not allow (bad index, read-only
    /// container, mismatched reference counter, invalid map key).
    #[error("Invalid operation: {message}")]
    InvalidOperation { message: String },

    /// The number of live items exceeded the configured ceiling.
    #[error("MaxStackSize exceeded: {count}/{limit}")]
    ResourceLimitExceeded { count: usize, limit: usize },

    /// A mutation reached the reference counter without the matching bookkeeping.
    #[error("Reference counter invariant violated: {message}")]
    InvariantViolation { message: String },

    /// Engine limits could not be loaded or are out of range.
    #[error("Invalid configuration: {message}")]
    InvalidConfiguration { message: String },
}

impl VmError {
    /// Creates an [`VmError::InvalidOperation`] with the given message.
    pub fn invalid_operation_msg<S: Into<String>>(message: S) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Creates an [`VmError::InvariantViolation`] with the given message.
    pub fn invariant_violation_msg<S: Into<String>>(message: S) -> Self {
        Self::InvariantViolation {
            message: message.into(),
        }
    }

    /// Creates an [`VmError::InvalidConfiguration`] with the given message.
    pub fn invalid_configuration_msg<S: Into<String>>(message: S) -> Self {
        Self::InvalidConfiguration {
            message: message.into(),
        }
    }

    /// Creates an [`VmError::ResourceLimitExceeded`] error.
    pub fn resource_limit_exceeded(count: usize, limit: usize) -> Self {
        Self::ResourceLimitExceeded { count, limit }
    }

    /// Returns true for errors caused by an integration bug rather than by the script.
    pub fn is_invariant_violation(&self) -> bool {
        matches!(self, Self::InvariantViolation { .. })
    }
}

/// Result type used throughout the VM.
pub type VmResult<T> = Result<T, VmError>;
