//! Client for the visual click detector.
//!
//! The detector is a long-lived external service speaking a line protocol
//! over TCP: the client sends a screenshot path terminated by `\n`, the
//! service answers with exactly one line describing where to click (or why
//! it will not). One connection is reused across queries; it is reopened
//! lazily after any failure.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufStream};
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

use crate::error::OracleError;

const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(1);

/// One detector verdict for one screenshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClickOutcome {
    /// A clickable element was found at these viewport coordinates.
    Click { x: u32, y: u32 },
    /// The detector saw the page but found nothing worth clicking.
    NoElement,
    /// The detector expected a popup or overlay and found none.
    NoPopup,
    /// A reply line that matches no known shape, kept verbatim.
    Malformed(String),
}

/// Parse one detector reply line.
///
/// Known shapes, checked in order:
/// - `Click Point: <x>, <y>`
/// - `No popups found`
/// - `No login button detected` / `Error: No relevant element detected.`
pub fn parse_outcome(line: &str) -> ClickOutcome {
    let line = line.trim();

    if let Some(rest) = line.strip_prefix("Click Point:") {
        let mut parts = rest.split(',').map(str::trim);
        if let (Some(x), Some(y)) = (parts.next(), parts.next())
            && let (Ok(x), Ok(y)) = (x.parse::<u32>(), y.parse::<u32>())
        {
            return ClickOutcome::Click { x, y };
        }
        return ClickOutcome::Malformed(line.to_string());
    }

    if line.contains("No popups found") {
        return ClickOutcome::NoPopup;
    }

    if line.contains("No login button detected") || line.contains("No relevant element") {
        return ClickOutcome::NoElement;
    }

    ClickOutcome::Malformed(line.to_string())
}

/// The click-oracle capability consumed by the flow executor.
#[async_trait]
pub trait ClickOracle: Send {
    /// Ask where to click on the given screenshot.
    async fn locate(&mut self, screenshot: &Path) -> Result<ClickOutcome, OracleError>;

    /// Release the underlying connection, if any.
    async fn close(&mut self);
}

/// TCP client for the detector service.
///
/// Connection is established on first use and retried forever at a fixed
/// interval; the detector may come up after the crawler does.
pub struct DetectorClient {
    addr: String,
    stream: Option<BufStream<TcpStream>>,
    connect_attempts: u64,
    query_timeout: Duration,
    retry_interval: Duration,
}

impl DetectorClient {
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            stream: None,
            connect_attempts: 0,
            query_timeout: DEFAULT_QUERY_TIMEOUT,
            retry_interval: DEFAULT_RETRY_INTERVAL,
        }
    }

    pub fn with_query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = timeout;
        self
    }

    pub fn with_retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = interval;
        self
    }

    /// How many TCP connects have been attempted so far.
    pub fn connect_attempts(&self) -> u64 {
        self.connect_attempts
    }

    /// Connect eagerly instead of on the first query.
    pub async fn connect(&mut self) -> Result<(), OracleError> {
        self.ensure_connected().await
    }

    /// Connect if not already connected, retrying until the service is up.
    async fn ensure_connected(&mut self) -> Result<(), OracleError> {
        if self.stream.is_some() {
            return Ok(());
        }

        loop {
            self.connect_attempts += 1;
            match TcpStream::connect(&self.addr).await {
                Ok(stream) => {
                    info!(addr = %self.addr, attempts = self.connect_attempts, "detector connected");
                    self.stream = Some(BufStream::new(stream));
                    return Ok(());
                }
                Err(e) => {
                    warn!(
                        addr = %self.addr,
                        attempt = self.connect_attempts,
                        error = %e,
                        "detector unavailable, retrying"
                    );
                    tokio::time::sleep(self.retry_interval).await;
                }
            }
        }
    }

    async fn exchange(&mut self, screenshot: &Path) -> Result<String, OracleError> {
        let stream = self
            .stream
            .as_mut()
            .ok_or(OracleError::ConnectionClosed)?;

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
        Ok(line)
    }
}

#[async_trait]
impl ClickOracle for DetectorClient {
    async fn locate(&mut self, screenshot: &Path) -> Result<ClickOutcome, OracleError> {
        self.ensure_connected().await?;

        let result = tokio::time::timeout(self.query_timeout, self.exchange(screenshot)).await;

        let line = match result {
            Ok(Ok(line)) => line,
            Ok(Err(e)) => {
                // Drop the connection so the next query reconnects.
                self.stream = None;
                return Err(e);
            }
            Err(_) => {
                self.stream = None;
                return Err(OracleError::Timeout {
                    duration: self.query_timeout,
                });
            }
        };

        let outcome = parse_outcome(&line);
        debug!(screenshot = %screenshot.display(), ?outcome, "detector replied");
        Ok(outcome)
    }

    async fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            let _ = stream.shutdown().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::net::TcpListener;

    #[test]
    fn parses_click_point() {
        assert_eq!(
            parse_outcome("Click Point: 640, 512"),
            ClickOutcome::Click { x: 640, y: 512 }
        );
        assert_eq!(
            parse_outcome("Click Point: 0,0\n"),
            ClickOutcome::Click { x: 0, y: 0 }
        );
    }

    #[test]
    fn parses_negative_replies() {
        assert_eq!(parse_outcome("No popups found"), ClickOutcome::NoPopup);
        assert_eq!(
            parse_outcome("No login button detected"),
            ClickOutcome::NoElement
        );
        assert_eq!(
            parse_outcome("Error: No relevant element detected."),
            ClickOutcome::NoElement
        );
    }

    #[test]
    fn unknown_reply_is_malformed() {
        assert_eq!(
            parse_outcome("Click Point: forty, two"),
            ClickOutcome::Malformed("Click Point: forty, two".to_string())
        );
        assert!(matches!(
            parse_outcome("internal error"),
            ClickOutcome::Malformed(_)
        ));
    }

    async fn serve_one_reply(listener: TcpListener, reply: &'static str) {
        let (socket, _) = listener.accept().await.unwrap();
        let mut socket = BufReader::new(socket);
        let mut request = String::new();
        socket.read_line(&mut request).await.unwrap();
        assert!(request.ends_with('\n'));
        socket
            .get_mut()
            .write_all(format!("{reply}\n").as_bytes())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn queries_a_live_detector() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(serve_one_reply(listener, "Click Point: 320, 240"));

        let mut client = DetectorClient::new(addr.to_string());
        let outcome = client
            .locate(&PathBuf::from("/tmp/page_1.png"))
            .await
            .unwrap();
        assert_eq!(outcome, ClickOutcome::Click { x: 320, y: 240 });
        assert_eq!(client.connect_attempts(), 1);
        client.close().await;
    }

    #[tokio::test]
    async fn retries_until_detector_comes_up() {
        // Reserve a port, free it, then rebind it after the client has
        // already started retrying.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(120)).await;
            let listener = TcpListener::bind(addr).await.unwrap();
            serve_one_reply(listener, "No popups found").await;
        });

        let mut client = DetectorClient::new(addr.to_string())
            .with_retry_interval(Duration::from_millis(50));
        let outcome = client
            .locate(&PathBuf::from("/tmp/page_1.png"))
            .await
            .unwrap();
        assert_eq!(outcome, ClickOutcome::NoPopup);
        assert!(client.connect_attempts() >= 2);
        client.close().await;
    }

    #[tokio::test]
    async fn slow_reply_times_out_and_drops_connection() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (_socket, _) = listener.accept().await.unwrap();
            // Hold the connection open without answering.
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let mut client = DetectorClient::new(addr.to_string())
            .with_query_timeout(Duration::from_millis(100));
        let err = client
            .locate(&PathBuf::from("/tmp/page_1.png"))
            .await
            .unwrap_err();
        assert!(matches!(err, OracleError::Timeout { .. }));
        assert!(client.stream.is_none());
    }
}
