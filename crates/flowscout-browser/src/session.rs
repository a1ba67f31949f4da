//! Chromium session lifecycle and target management.
//!
//! One [`ChromeSession`] per crawl: it spawns a Chromium process with an
//! ephemeral DevTools port and throwaway profile, keeps a WebSocket to the
//! browser endpoint for `Target.*` commands, and hands out [`Page`] handles
//! for individual browsing contexts.

use std::collections::HashSet;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tracing::{debug, info, trace, warn};

use crate::cdp::DevtoolsConnection;
use crate::error::BrowserError;
use crate::page::{CdpPage, Page};

const STARTUP_TIMEOUT: Duration = Duration::from_secs(20);
const DEVTOOLS_BANNER: &str = "DevTools listening on ";

/// Chromium binaries tried in order when no explicit path is configured.
const CHROME_CANDIDATES: &[&str] = &[
    "google-chrome",
    "google-chrome-stable",
    "chromium",
    "chromium-browser",
    "chrome",
];

/// How the session launches Chromium.
#[derive(Debug, Clone)]
pub struct LaunchOptions {
    /// Explicit browser binary; candidates are probed when absent.
    pub chrome_path: Option<String>,
    pub headless: bool,
    pub window_size: (u32, u32),
}

impl Default for LaunchOptions {
    fn default() -> Self {
        Self {
            chrome_path: None,
            headless: true,
            window_size: (1280, 1024),
        }
    }
}

/// One target entry from `Target.getTargets`.
#[derive(Debug, Clone, Deserialize)]
pub struct TargetInfo {
    #[serde(rename = "targetId")]
    pub target_id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub url: String,
    #[serde(rename = "openerId", default)]
    pub opener_id: Option<String>,
}

/// The browsing-session capability consumed by the crawl engine.
#[async_trait]
pub trait BrowserSession: Send + Sync {
    /// Open a fresh page in this session.
    async fn open_page(&self) -> Result<Box<dyn Page>, BrowserError>;

    /// Look for a page target opened by `opener_id` that this session has
    /// not handed out yet. Returns a handle to it without activating it;
    /// the caller decides when to bring it to the foreground.
    async fn find_popup(&self, opener_id: &str) -> Result<Option<Box<dyn Page>>, BrowserError>;

    /// Shut the whole browser down. Safe to call once on every exit path.
    async fn close(&self) -> Result<(), BrowserError>;
}

/// A live Chromium process plus its browser-endpoint DevTools connection.
pub struct ChromeSession {
    child: Mutex<Option<Child>>,
    conn: DevtoolsConnection,
    port: u16,
    known_targets: Mutex<HashSet<String>>,
    _profile_dir: tempfile::TempDir,
}

impl ChromeSession {
    /// Spawn Chromium and connect to its DevTools browser endpoint.
    pub async fn launch(options: &LaunchOptions) -> Result<Self, BrowserError> {
        let profile_dir = tempfile::Builder::new()
            .prefix("flowscout-profile-")
            .tempdir()
            .map_err(|e| BrowserError::LaunchFailed {
                reason: format!("failed to create profile dir: {e}"),
            })?;

        let mut child = spawn_browser(options, profile_dir.path().to_path_buf())?;

        let stderr = child.stderr.take().ok_or_else(|| BrowserError::LaunchFailed {
            reason: "browser stderr was not captured".to_string(),
        })?;
        let mut lines = BufReader::new(stderr).lines();

        // Chromium prints the browser WebSocket URL on stderr once the
        // DevTools server is up.
        let ws_url = tokio::time::timeout(STARTUP_TIMEOUT, async {
            while let Ok(Some(line)) = lines.next_line().await {
                trace!(line = %line, "browser stderr");
                if let Some(rest) = line.trim().strip_prefix(DEVTOOLS_BANNER) {
                    return Some(rest.trim().to_string());
                }
            }
            None
        })
        .await
        .ok()
        .flatten()
        .ok_or_else(|| BrowserError::LaunchFailed {
            reason: "browser never announced its DevTools endpoint".to_string(),
        })?;

        // Keep draining stderr so the child never blocks on a full pipe.
        tokio::spawn(async move {
            while let Ok(Some(line)) = lines.next_line().await {
                trace!(line = %line, "browser stderr");
            }
        });

        let port = url::Url::parse(&ws_url)
            .ok()
            .and_then(|u| u.port())
            .ok_or_else(|| BrowserError::LaunchFailed {
                reason: format!("unparseable DevTools URL: {ws_url}"),
            })?;

        let conn = DevtoolsConnection::connect(&ws_url).await?;
        info!(port, "browser session started");

        let session = Self {
            child: Mutex::new(Some(child)),
            conn,
            port,
            known_targets: Mutex::new(HashSet::new()),
            _profile_dir: profile_dir,
        };

        // The startup tab must never be mistaken for a popup later.
        let initial = session.list_targets().await?;
        let mut known = session.known_targets.lock().await;
        for target in initial {
            known.insert(target.target_id);
        }
        drop(known);

        Ok(session)
    }

    async fn list_targets(&self) -> Result<Vec<TargetInfo>, BrowserError> {
        let result = self.conn.command("Target.getTargets", json!({})).await?;
        let infos = result
            .get("targetInfos")
            .cloned()
            .unwrap_or_else(|| Value::Array(Vec::new()));
        serde_json::from_value(infos).map_err(|e| BrowserError::Protocol {
            detail: format!("unexpected Target.getTargets shape: {e}"),
        })
    }

    async fn attach_page(&self, target_id: String) -> Result<Box<dyn Page>, BrowserError> {
        let ws_url = format!("ws://127.0.0.1:{}/devtools/page/{}", self.port, target_id);
        let page = CdpPage::connect(&ws_url, target_id).await?;
        Ok(Box::new(page))
    }
}

#[async_trait]
impl BrowserSession for ChromeSession {
    async fn open_page(&self) -> Result<Box<dyn Page>, BrowserError> {
        let result = self
            .conn
            .command("Target.createTarget", json!({ "url": "about:blank" }))
            .await?;
        let target_id = result
            .get("targetId")
            .and_then(Value::as_str)
            .ok_or_else(|| BrowserError::Protocol {
                detail: "Target.createTarget returned no targetId".to_string(),
            })?
            .to_string();

        self.known_targets.lock().await.insert(target_id.clone());
        debug!(target = %target_id, "opened page");
        self.attach_page(target_id).await
    }

    async fn find_popup(&self, opener_id: &str) -> Result<Option<Box<dyn Page>>, BrowserError> {
        let targets = self.list_targets().await?;

        let popup = {
            let mut known = self.known_targets.lock().await;
            let mut found = None;
            for target in targets {
                if target.kind == "page"
                    && target.opener_id.as_deref() == Some(opener_id)
                    && !known.contains(&target.target_id)
                {
                    known.insert(target.target_id.clone());
                    found = Some(target);
                    break;
                }
            }
            found
        };

        match popup {
            Some(target) => {
                info!(target = %target.target_id, url = %target.url, "new browsing context opened");
                Ok(Some(self.attach_page(target.target_id).await?))
            }
            None => Ok(None),
        }
    }

    async fn close(&self) -> Result<(), BrowserError> {
        let mut guard = self.child.lock().await;
        let Some(mut child) = guard.take() else {
            return Ok(());
        };

        // Ask politely, then make sure.
        if let Err(e) = self.conn.command_with_timeout(
            "Browser.close",
            json!({}),
            Duration::from_secs(5),
        )
        .await
        {
            debug!(error = %e, "Browser.close failed, killing process");
        }

        match tokio::time::timeout(Duration::from_secs(5), child.wait()).await {
            Ok(Ok(status)) => debug!(?status, "browser exited"),
            _ => {
                warn!("browser did not exit, killing it");
                let _ = child.kill().await;
            }
        }

        Ok(())
    }
}

fn spawn_browser(options: &LaunchOptions, profile_dir: PathBuf) -> Result<Child, BrowserError> {
    let binaries: Vec<String> = match &options.chrome_path {
        Some(path) => vec![path.clone()],
        None => CHROME_CANDIDATES.iter().map(|s| s.to_string()).collect(),
    };

    let (width, height) = options.window_size;
    let mut last_error = None;

    for binary in &binaries {
        let mut command = Command::new(binary);
        command
            .arg("--remote-debugging-port=0")
            .arg(format!("--user-data-dir={}", profile_dir.display()))
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .arg("--disable-background-networking")
            .arg("--disable-sync")
            .arg("--disable-blink-features=AutomationControlled")
            .arg(format!("--window-size={width},{height}"))
            .arg("about:blank")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if options.headless {
            command.arg("--headless=new").arg("--disable-gpu");
        }

        match command.spawn() {
            Ok(child) => {
                debug!(binary = %binary, "spawned browser");
                return Ok(child);
            }
            Err(e) => {
                trace!(binary = %binary, error = %e, "browser candidate failed");
                last_error = Some(e);
            }
        }
    }

    Err(BrowserError::LaunchFailed {
        reason: match last_error {
            Some(e) => format!("no chromium binary could be started: {e}"),
            None => "no chromium binary configured".to_string(),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_info_deserializes_with_opener() {
        let json = serde_json::json!({
            "targetId": "AAA",
            "type": "page",
            "title": "Login",
            "url": "https://example.com/login",
            "openerId": "BBB",
            "attached": false
        });
        let info: TargetInfo = serde_json::from_value(json).unwrap();
        assert_eq!(info.target_id, "AAA");
        assert_eq!(info.kind, "page");
        assert_eq!(info.opener_id.as_deref(), Some("BBB"));
    }

    #[test]
    fn target_info_opener_defaults_to_none() {
        let json = serde_json::json!({
            "targetId": "AAA",
            "type": "page",
            "url": "about:blank"
        });
        let info: TargetInfo = serde_json::from_value(json).unwrap();
        assert!(info.opener_id.is_none());
    }

    #[test]
    fn devtools_banner_parsing() {
        let line = "DevTools listening on ws://127.0.0.1:37421/devtools/browser/5a9e1-22";
        let rest = line.strip_prefix(DEVTOOLS_BANNER).unwrap();
        let port = url::Url::parse(rest).unwrap().port().unwrap();
        assert_eq!(port, 37421);
    }

    #[test]
    fn default_launch_options_are_headless() {
        let options = LaunchOptions::default();
        assert!(options.headless);
        assert_eq!(options.window_size, (1280, 1024));
    }
}
