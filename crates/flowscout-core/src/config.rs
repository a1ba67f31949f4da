//! Crawl configuration.

use std::path::PathBuf;
use std::time::Duration;

/// Desktop Chrome user agent presented to every page.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36";

/// Everything a crawl needs to know up front. Built from defaults, then
/// overridden by the config file and CLI flags.
#[derive(Debug, Clone)]
pub struct CrawlConfig {
    /// Click detector socket address.
    pub detector_addr: String,
    /// Screenshot classifier socket address.
    pub classifier_addr: String,
    /// Root directory for per-URL artifacts.
    pub output_root: PathBuf,
    /// Explicit Chromium binary; common names are probed when unset.
    pub chrome_path: Option<String>,
    pub headless: bool,
    /// Maximum clicks per flow before the trace is force-terminated.
    pub click_limit: usize,
    /// Maximum flow variants run per crawl.
    pub max_flows: usize,
    /// Consecutive no-popup detector replies tolerated before giving up.
    pub no_popup_retries: u32,
    /// How long the navigation observer waits after an action.
    pub navigation_timeout: Duration,
    /// Per-query detector timeout.
    pub oracle_timeout: Duration,
    /// Initial page load wait.
    pub load_timeout: Duration,
    /// Per-field cap when filling text inputs.
    pub field_fill_timeout: Duration,
    /// Human-pacing pause between click and next screenshot.
    pub action_pause: Duration,
    pub viewport: (u32, u32),
    pub user_agent: String,
    /// Text typed into every interactable text input.
    pub filler_text: String,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            detector_addr: "127.0.0.1:5000".to_string(),
            classifier_addr: "127.0.0.1:5001".to_string(),
            output_root: PathBuf::from("screenshot_flows"),
            chrome_path: None,
            headless: true,
            click_limit: 5,
            max_flows: 20,
            no_popup_retries: 3,
            navigation_timeout: Duration::from_secs(5),
            oracle_timeout: Duration::from_secs(30),
            load_timeout: Duration::from_secs(30),
            field_fill_timeout: Duration::from_secs(3),
            action_pause: Duration::from_millis(500),
            viewport: (1280, 1024),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            filler_text: "test".to_string(),
        }
    }
}
