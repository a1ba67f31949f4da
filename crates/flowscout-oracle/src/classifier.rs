//! Client for the screenshot classifier.
//!
//! The classifier is a slow external service; waiting on it inline would
//! stall the crawl. Each screenshot is dispatched on its own task with a
//! fresh connection, verdicts are logged as they arrive, and the crawl
//! drains the outstanding tasks once at teardown.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufStream};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::error::OracleError;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// One classifier verdict for one screenshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// The screenshot shows a login surface.
    Positive,
    /// The screenshot does not show a login surface.
    Negative,
    /// A reply matching neither known shape, kept verbatim.
    Unknown(String),
}

/// Parse one classifier reply line. The service answers free-form text
/// containing a YES or NO token.
pub fn parse_classification(line: &str) -> Classification {
    let lower = line.to_lowercase();
    if lower.contains("yes") {
        Classification::Positive
    } else if lower.contains("no") {
        Classification::Negative
    } else {
        Classification::Unknown(line.trim().to_string())
    }
}

/// Where the executor hands screenshots for asynchronous classification.
#[async_trait]
pub trait ClassificationSink: Send {
    /// Queue a screenshot for classification. Must not block on the
    /// service.
    fn dispatch(&mut self, screenshot: &Path, flow: usize);

    /// Wait for every queued classification to finish.
    async fn drain(&mut self);
}

/// TCP client for the classifier service.
pub struct ClassifierClient {
    addr: String,
    pending: Vec<JoinHandle<()>>,
}

impl ClassifierClient {
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            pending: Vec::new(),
        }
    }

    async fn classify_once(addr: String, screenshot: PathBuf) -> Result<Classification, OracleError> {
        tokio::time::timeout(REQUEST_TIMEOUT, async {
            let stream = TcpStream::connect(&addr).await?;
            let mut stream = BufStream::new(stream);

            stream
                .write_all(screenshot.to_string_lossy().as_bytes())
                .await?;
            stream.write_all(b"\n").await?;
            stream.flush().await?;

            let mut line = String::new();
            let read = stream.read_line(&mut line).await?;
            if read == 0 {
                return Err(OracleError::ConnectionClosed);
            }
            Ok(parse_classification(&line))
        })
        .await
        .unwrap_or(Err(OracleError::Timeout {
            duration: REQUEST_TIMEOUT,
        }))
    }
}

#[async_trait]
impl ClassificationSink for ClassifierClient {
    fn dispatch(&mut self, screenshot: &Path, flow: usize) {
        let addr = self.addr.clone();
        let screenshot = screenshot.to_path_buf();

        self.pending.push(tokio::spawn(async move {
            match Self::classify_once(addr, screenshot.clone()).await {
                Ok(verdict) => {
                    info!(flow, screenshot = %screenshot.display(), ?verdict, "screenshot classified");
                }
                Err(e) => {
                    // Classification is advisory; a missing verdict never
                    // fails the crawl.
                    warn!(flow, screenshot = %screenshot.display(), error = %e, "classification failed");
                }
            }
        }));
    }

    async fn drain(&mut self) {
        for handle in self.pending.drain(..) {
            if let Err(e) = handle.await {
                warn!(error = %e, "classification task panicked");
            }
        }
    }
}
