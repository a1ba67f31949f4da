//! Socket clients for the external vision services.
//!
//! Two services back the crawl: the click detector, which answers "where
//! would a human click next" for a screenshot, and the classifier, which
//! answers "does this screenshot show a login surface". Both speak a
//! newline-delimited path-in, line-out protocol over TCP.

pub mod classifier;
pub mod detector;
pub mod error;

pub use classifier::{Classification, ClassificationSink, ClassifierClient, parse_classification};
pub use detector::{ClickOracle, ClickOutcome, DetectorClient, parse_outcome};
pub use error::OracleError;
