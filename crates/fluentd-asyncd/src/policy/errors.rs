//! Errors raised while resolving a delivery policy.

use thiserror::Error;

/// Failures reported by [`super::resolve`].
///
/// Either variant means no policy was produced; defaults are never applied
/// to the remaining keys.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PolicyError {
    /// The `fluentd-address` value is not a usable collector address.
    #[error("invalid fluentd-address {address}: {reason}")]
    InvalidAddress { address: String, reason: String },

    /// A recognised option carried a value of the wrong shape.
    #[error("invalid value '{value}' for {option}: {reason}")]
    InvalidOption {
        option: &'static str,
        value: String,
        reason: String,
    },
}

impl PolicyError {
    /// Creates an invalid address error carrying the caller's original input.
    pub fn invalid_address(address: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidAddress {
            address: address.into(),
            reason: reason.into(),
        }
    }

    /// Creates an invalid option error.
    pub fn invalid_option(
        option: &'static str,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidOption {
            option,
            value: value.into(),
            reason: reason.into(),
        }
    }
}
