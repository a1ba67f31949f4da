//! Error types for the flowscout-browser crate.

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur while driving the browser.
#[derive(Debug, Error)]
pub enum BrowserError {
    /// The Chromium process could not be started.
    #[error("failed to launch browser: {reason}")]
    LaunchFailed { reason: String },

    /// Failed to establish the DevTools WebSocket connection.
    #[error("failed to connect to DevTools at {url}: {reason}")]
    ConnectionFailed { url: String, reason: String },

    /// A DevTools command returned an error response.
    #[error("DevTools error {code}: {message}")]
    CommandFailed { code: i64, message: String },

    /// A DevTools command timed out waiting for a response.
    #[error("DevTools command '{method}' timed out after {duration:?}")]
    CommandTimeout { method: String, duration: Duration },

    /// A protocol-level error (serialization, unexpected message shape,
    /// dropped connection).
    #[error("DevTools protocol error: {detail}")]
    Protocol { detail: String },

    /// Navigation was rejected by the browser.
    #[error("navigation failed: {reason}")]
    NavigationFailed { reason: String },

    /// JavaScript evaluation threw in the page context.
    #[error("JavaScript exception: {message}")]
    JsException { message: String },

    /// The page did not finish loading within the expected timeout.
    #[error("page load timed out after {duration:?}")]
    PageLoadTimeout { duration: Duration },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
