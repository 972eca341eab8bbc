// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use thiserror::Error;

/// Error type returned by radio reads and writes.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RadioError {
    /// The link did not answer the liveness probe.
    #[error("Radio is not available.")]
    Unavailable,

    /// No radio is configured behind the requested selector.
    #[error("Radio {0} is not configured.")]
    NotConfigured(u8),

    /// Mode string or code outside the canonical set.
    #[error("Invalid mode: {0}")]
    InvalidMode(String),

    /// Asynchronous status reply that cannot be decoded.
    #[error("Malformed status reply: {0}")]
    MalformedReply(String),

    /// The binding gave up waiting for the radio.
    #[error("Timed out waiting for the radio")]
    Timeout,

    /// Any other failure reported by the binding.
    #[error("{0}")]
    Link(String),
}

pub type RadioResult<T> = Result<T, RadioError>;

impl RadioError {
    pub fn link(message: impl Into<String>) -> Self {
        Self::Link(message.into())
    }
}

impl From<std::io::Error> for RadioError {
    fn from(value: std::io::Error) -> Self {
        if value.kind() == std::io::ErrorKind::TimedOut {
            RadioError::Timeout
        } else {
            RadioError::Link(value.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unavailable_message_matches_wire_text() {
        assert_eq!(RadioError::Unavailable.to_string(), "Radio is not available.");
    }

    #[test]
    fn io_timeout_maps_to_timeout() {
        let err: RadioError = std::io::Error::new(std::io::ErrorKind::TimedOut, "slow").into();
        assert_eq!(err, RadioError::Timeout);

        let err: RadioError = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "gone").into();
        assert!(matches!(err, RadioError::Link(_)));
    }
}
