// SPDX-License-Identifier: GPL-3.0-only

//! Error types for the streaming pipeline

use std::fmt;

/// Result type alias using StreamError
pub type StreamResult<T> = Result<T, StreamError>;

/// Errors surfaced by the capture-to-texture pipeline
///
/// Resource-acquisition failures are not retried internally; retry policy
/// belongs to the host, which may depend on user action (re-permission,
/// re-plugging hardware). Stale callbacks after a close or generation change
/// are discarded silently and never become an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamError {
    /// Device busy, disconnected, or policy-denied at open time
    DeviceUnavailable(String),
    /// Capture session could not be configured for the bound target
    ConfigurationRejected(String),
    /// Device reported an asynchronous error while streaming
    RuntimeDevice(String),
    /// Capture target missing or has unusable dimensions
    InvalidTarget(String),
    /// Capture target is still bound to an active session
    TargetBusy(String),
}

impl fmt::Display for StreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamError::DeviceUnavailable(msg) => write!(f, "Device unavailable: {}", msg),
            StreamError::ConfigurationRejected(msg) => {
                write!(f, "Session configuration rejected: {}", msg)
            }
            StreamError::RuntimeDevice(msg) => write!(f, "Device error: {}", msg),
            StreamError::InvalidTarget(msg) => write!(f, "Invalid capture target: {}", msg),
            StreamError::TargetBusy(msg) => write!(f, "Capture target busy: {}", msg),
        }
    }
}

impl std::error::Error for StreamError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_reason() {
        let err = StreamError::DeviceUnavailable("claimed by another process".to_string());
        assert!(err.to_string().contains("claimed by another process"));
    }
}
