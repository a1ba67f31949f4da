//! Error types for the flowscout-oracle crate.

use std::time::Duration;

use thiserror::Error;

/// Errors from the detector and classifier socket clients.
#[derive(Debug, Error)]
pub enum OracleError {
    /// The service accepted the query but never answered in time.
    #[error("oracle did not reply within {duration:?}")]
    Timeout { duration: Duration },

    /// The service closed the connection mid-exchange.
    #[error("oracle closed the connection")]
    ConnectionClosed,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
