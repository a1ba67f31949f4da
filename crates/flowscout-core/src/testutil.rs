//! Scripted browser and oracle fixtures for engine tests.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use flowscout_browser::{BrowserError, BrowserSession, Page};
use flowscout_oracle::{ClassificationSink, ClickOracle, ClickOutcome, OracleError};
use image::{Rgba, RgbaImage};
use serde_json::Value;

/// Fixed behavior of one scripted page.
#[derive(Default, Clone)]
pub struct PageScript {
    pub inventory: Vec<Vec<String>>,
    /// Outer HTML by click position; a missing entry means "no element".
    pub elements: HashMap<(u32, u32), String>,
    /// Whether the load event fires after navigation and clicks.
    pub load_fires: bool,
}

/// What a scripted page observed, shared with the test.
#[derive(Default)]
pub struct PageLog {
    pub clicks: Mutex<Vec<(u32, u32)>>,
    pub selects: Mutex<Vec<(usize, String)>>,
    pub screenshots: Mutex<Vec<PathBuf>>,
    pub closed: AtomicBool,
}

pub struct MockPage {
    target: String,
    script: PageScript,
    log: Arc<PageLog>,
}

impl MockPage {
    pub fn new(target: &str, script: PageScript) -> (Self, Arc<PageLog>) {
        let log = Arc::new(PageLog::default());
        (
            Self {
                target: target.to_string(),
                script,
                log: Arc::clone(&log),
            },
            log,
        )
    }
}

#[async_trait]
impl Page for MockPage {
    fn target_id(&self) -> &str {
        &self.target
    }

    async fn set_viewport(&self, _width: u32, _height: u32) -> Result<(), BrowserError> {
        Ok(())
    }

    async fn set_user_agent(&self, _user_agent: &str) -> Result<(), BrowserError> {
        Ok(())
    }

    async fn mask_automation(&self) -> Result<(), BrowserError> {
        Ok(())
    }

    async fn navigate(&self, _url: &str) -> Result<(), BrowserError> {
        Ok(())
    }

    async fn wait_for_load(&self, timeout: Duration) -> Result<(), BrowserError> {
        if self.script.load_fires {
            Ok(())
        } else {
            tokio::time::sleep(timeout).await;
            Err(BrowserError::PageLoadTimeout { duration: timeout })
        }
    }

    async fn evaluate(&self, _expression: &str) -> Result<Value, BrowserError> {
        Ok(Value::Null)
    }

    async fn fill_text_inputs(
        &self,
        _filler: &str,
        _per_field: Duration,
    ) -> Result<usize, BrowserError> {
        Ok(0)
    }

    async fn select_inventory(&self) -> Result<Vec<Vec<String>>, BrowserError> {
        Ok(self.script.inventory.clone())
    }

    async fn apply_select(&self, index: usize, value: &str) -> Result<bool, BrowserError> {
        let valid = self
            .script
            .inventory
            .get(index)
            .is_some_and(|options| options.iter().any(|o| o == value));
        if valid {
            self.log
                .selects
                .lock()
                .unwrap()
                .push((index, value.to_string()));
        }
        Ok(valid)
    }

    async fn element_at(&self, x: u32, y: u32) -> Result<Option<String>, BrowserError> {
        Ok(self.script.elements.get(&(x, y)).cloned())
    }

    async fn click_at(&self, x: u32, y: u32) -> Result<(), BrowserError> {
        self.log.clicks.lock().unwrap().push((x, y));
        Ok(())
    }

    async fn screenshot_to(&self, path: &Path) -> Result<(), BrowserError> {
        // A real PNG so the marker overlay can decode it.
        RgbaImage::from_pixel(320, 320, Rgba([255, 255, 255, 255]))
            .save(path)
            .map_err(|e| BrowserError::Protocol {
                detail: e.to_string(),
            })?;
        self.log.screenshots.lock().unwrap().push(path.to_path_buf());
        Ok(())
    }

    async fn url(&self) -> Result<String, BrowserError> {
        Ok(format!("https://mock.invalid/{}", self.target))
    }

    async fn bring_to_front(&self) -> Result<(), BrowserError> {
        Ok(())
    }

    async fn close(&self) -> Result<(), BrowserError> {
        self.log.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Session serving a fixed queue of pages, plus optional popups.
#[derive(Default)]
pub struct MockSession {
    pages: Mutex<VecDeque<MockPage>>,
    popups: Mutex<VecDeque<MockPage>>,
    pub closed: AtomicBool,
}

impl MockSession {
    pub fn with_pages(pages: Vec<MockPage>) -> Self {
        Self {
            pages: Mutex::new(pages.into()),
            popups: Mutex::new(VecDeque::new()),
            closed: AtomicBool::new(false),
        }
    }

    pub fn queue_popup(&self, popup: MockPage) {
        self.popups.lock().unwrap().push_back(popup);
    }
}

#[async_trait]
impl BrowserSession for MockSession {
    async fn open_page(&self) -> Result<Box<dyn Page>, BrowserError> {
        match self.pages.lock().unwrap().pop_front() {
            Some(page) => Ok(Box::new(page)),
            None => Err(BrowserError::Protocol {
                detail: "no scripted page left".to_string(),
            }),
        }
    }

    async fn find_popup(&self, _opener_id: &str) -> Result<Option<Box<dyn Page>>, BrowserError> {
        Ok(self
            .popups
            .lock()
            .unwrap()
            .pop_front()
            .map(|p| Box::new(p) as Box<dyn Page>))
    }

    async fn close(&self) -> Result<(), BrowserError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Oracle replaying a fixed reply sequence; answers `NoElement` once the
/// script is exhausted.
#[derive(Default)]
pub struct ScriptedOracle {
    replies: VecDeque<ClickOutcome>,
    pub queries: Vec<PathBuf>,
}

impl ScriptedOracle {
    pub fn with_replies(replies: Vec<ClickOutcome>) -> Self {
        Self {
            replies: replies.into(),
            queries: Vec::new(),
        }
    }
}

#[async_trait]
impl ClickOracle for ScriptedOracle {
    async fn locate(&mut self, screenshot: &Path) -> Result<ClickOutcome, OracleError> {
        self.queries.push(screenshot.to_path_buf());
        Ok(self.replies.pop_front().unwrap_or(ClickOutcome::NoElement))
    }

    async fn close(&mut self) {}
}

/// Sink that only remembers what was dispatched.
#[derive(Default)]
pub struct RecordingSink {
    pub dispatched: Vec<(PathBuf, usize)>,
    pub drained: bool,
}

#[async_trait]
impl ClassificationSink for RecordingSink {
    fn dispatch(&mut self, screenshot: &Path, flow: usize) {
        self.dispatched.push((screenshot.to_path_buf(), flow));
    }

    async fn drain(&mut self) {
        self.drained = true;
    }
}
