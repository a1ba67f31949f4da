//! The page-handle capability.
//!
//! [`Page`] is the only surface the crawl engine sees: navigation, script
//! evaluation, form filling, dropdown access, coordinate clicks and
//! screenshots. [`CdpPage`] implements it over a per-target DevTools
//! connection; tests implement it over scripted fixtures.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as B64;
use serde_json::{Value, json};
use tracing::debug;

use crate::cdp::DevtoolsConnection;
use crate::error::BrowserError;

/// Script injected on every new document to blunt the common headless
/// fingerprint probes before page scripts run.
const STEALTH_INIT_SCRIPT: &str = r#"
Object.defineProperty(navigator, 'webdriver', { get: () => undefined });
Object.defineProperty(navigator, 'languages', { get: () => ['en-US', 'en'] });
Object.defineProperty(navigator, 'plugins', { get: () => [1, 2, 3] });
window.chrome = window.chrome || { runtime: {} };
"#;

/// Returns the number of candidate text inputs on the page.
const COUNT_TEXT_INPUTS_JS: &str = r#"(() => {
    const sel = "input[type='text'],input[type='email'],input[type='password'],input[type='tel'],input[type='search'],input:not([type]),textarea";
    return document.querySelectorAll(sel).length;
})()"#;

/// One handle per browsing context. All methods take `&self`; the handle is
/// used from a single logical task, interior state lives behind locks.
#[async_trait]
pub trait Page: Send + Sync {
    /// DevTools target id of this browsing context.
    fn target_id(&self) -> &str;

    async fn set_viewport(&self, width: u32, height: u32) -> Result<(), BrowserError>;

    async fn set_user_agent(&self, user_agent: &str) -> Result<(), BrowserError>;

    /// Install automation-fingerprint masking for every document this page
    /// will load.
    async fn mask_automation(&self) -> Result<(), BrowserError>;

    async fn navigate(&self, url: &str) -> Result<(), BrowserError>;

    /// Wait for the current document's load event. Resolves with
    /// `PageLoadTimeout` if nothing fires within `timeout`.
    async fn wait_for_load(&self, timeout: Duration) -> Result<(), BrowserError>;

    /// Evaluate a JavaScript expression in the page, returning its value.
    async fn evaluate(&self, expression: &str) -> Result<Value, BrowserError>;

    /// Fill every interactable text input with `filler`, skipping hidden,
    /// disabled and read-only controls. Each field gets at most
    /// `per_field`. Returns the number of fields filled.
    async fn fill_text_inputs(
        &self,
        filler: &str,
        per_field: Duration,
    ) -> Result<usize, BrowserError>;

    /// Option values of every `<select>` on the page, in DOM order.
    async fn select_inventory(&self) -> Result<Vec<Vec<String>>, BrowserError>;

    /// Set the dropdown at `index` to `value`. Returns `false` when the
    /// value is not among the control's options (nothing is changed).
    async fn apply_select(&self, index: usize, value: &str) -> Result<bool, BrowserError>;

    /// Outer HTML of the element at viewport coordinates, if any.
    async fn element_at(&self, x: u32, y: u32) -> Result<Option<String>, BrowserError>;

    /// Move the pointer to the coordinates, pause briefly, then click.
    async fn click_at(&self, x: u32, y: u32) -> Result<(), BrowserError>;

    /// Capture a PNG screenshot of the viewport into `path`.
    async fn screenshot_to(&self, path: &Path) -> Result<(), BrowserError>;

    /// Current document URL.
    async fn url(&self) -> Result<String, BrowserError>;

    async fn bring_to_front(&self) -> Result<(), BrowserError>;

    async fn close(&self) -> Result<(), BrowserError>;
}

/// [`Page`] implementation over a DevTools page target.
pub struct CdpPage {
    target_id: String,
    conn: DevtoolsConnection,
}

impl CdpPage {
    /// Attach to a page target and enable the domains the crawl needs.
    pub async fn connect(ws_url: &str, target_id: String) -> Result<Self, BrowserError> {
        let conn = DevtoolsConnection::connect(ws_url).await?;
        conn.enable_domain("Page").await?;
        conn.enable_domain("Runtime").await?;
        Ok(Self { target_id, conn })
    }

    async fn eval_value(&self, expression: &str) -> Result<Value, BrowserError> {
        let result = self
            .conn
            .command(
                "Runtime.evaluate",
                json!({
                    "expression": expression,
                    "returnByValue": true,
                    "awaitPromise": true,
                }),
            )
            .await?;

        if let Some(exception) = result.get("exceptionDetails") {
            let message = exception
                .get("exception")
                .and_then(|e| e.get("description"))
                .and_then(Value::as_str)
                .or_else(|| exception.get("text").and_then(Value::as_str))
                .unwrap_or("unknown exception")
                .to_string();
            return Err(BrowserError::JsException { message });
        }

        Ok(result
            .get("result")
            .and_then(|r| r.get("value"))
            .cloned()
            .unwrap_or(Value::Null))
    }

    async fn dispatch_mouse(&self, kind: &str, x: u32, y: u32) -> Result<(), BrowserError> {
        self.conn
            .command(
                "Input.dispatchMouseEvent",
                json!({
                    "type": kind,
                    "x": x,
                    "y": y,
                    "button": "left",
                    "clickCount": 1,
                }),
            )
            .await?;
        Ok(())
    }
}

#[async_trait]
impl Page for CdpPage {
    fn target_id(&self) -> &str {
        &self.target_id
    }

    async fn set_viewport(&self, width: u32, height: u32) -> Result<(), BrowserError> {
        self.conn
            .command(
                "Emulation.setDeviceMetricsOverride",
                json!({
                    "width": width,
                    "height": height,
                    "deviceScaleFactor": 1,
                    "mobile": false,
                }),
            )
            .await?;
        Ok(())
    }

    async fn set_user_agent(&self, user_agent: &str) -> Result<(), BrowserError> {
        self.conn
            .command(
                "Network.setUserAgentOverride",
                json!({ "userAgent": user_agent }),
            )
            .await?;
        Ok(())
    }

    async fn mask_automation(&self) -> Result<(), BrowserError> {
        self.conn
            .command(
                "Page.addScriptToEvaluateOnNewDocument",
                json!({ "source": STEALTH_INIT_SCRIPT }),
            )
            .await?;
        Ok(())
    }

    async fn navigate(&self, url: &str) -> Result<(), BrowserError> {
        // A stale load event from the previous document must not satisfy
        // the wait that follows this navigation.
        self.conn.discard_events().await;

        let result = self.conn.command("Page.navigate", json!({ "url": url })).await?;
        if let Some(error_text) = result.get("errorText").and_then(Value::as_str)
            && !error_text.is_empty()
        {
            return Err(BrowserError::NavigationFailed {
                reason: error_text.to_string(),
            });
        }
        Ok(())
    }

    async fn wait_for_load(&self, timeout: Duration) -> Result<(), BrowserError> {
        self.conn
            .wait_for_event("Page.loadEventFired", timeout)
            .await?;
        Ok(())
    }

    async fn evaluate(&self, expression: &str) -> Result<Value, BrowserError> {
        self.eval_value(expression).await
    }

    async fn fill_text_inputs(
        &self,
        filler: &str,
        per_field: Duration,
    ) -> Result<usize, BrowserError> {
        let count = self
            .eval_value(COUNT_TEXT_INPUTS_JS)
            .await?
            .as_u64()
            .unwrap_or(0) as usize;

        let filler_json = serde_json::to_string(filler).unwrap_or_else(|_| "\"\"".to_string());
        let mut filled = 0;

        for index in 0..count {
            let script = format!(
                r#"(() => {{
    const sel = "input[type='text'],input[type='email'],input[type='password'],input[type='tel'],input[type='search'],input:not([type]),textarea";
    const el = document.querySelectorAll(sel)[{index}];
    if (!el || el.disabled || el.readOnly || el.offsetParent === null) return false;
    el.value = {filler_json};
    el.dispatchEvent(new Event('input', {{ bubbles: true }}));
    el.dispatchEvent(new Event('change', {{ bubbles: true }}));
    return true;
}})()"#
            );

            // Per-field cap: a pathological field (validation storms,
            // beforeinput loops) must not stall the whole flow.
            match tokio::time::timeout(per_field, self.eval_value(&script)).await {
                Ok(Ok(Value::Bool(true))) => filled += 1,
                Ok(Ok(_)) => {}
                Ok(Err(e)) => debug!(index, error = %e, "input fill failed"),
                Err(_) => debug!(index, "input fill timed out"),
            }
        }

        Ok(filled)
    }

    async fn select_inventory(&self) -> Result<Vec<Vec<String>>, BrowserError> {
        let value = self
            .eval_value(
                "Array.from(document.querySelectorAll('select')).map(s => Array.from(s.options).map(o => o.value))",
            )
            .await?;
        serde_json::from_value(value).map_err(|e| BrowserError::Protocol {
            detail: format!("unexpected select inventory shape: {e}"),
        })
    }

    async fn apply_select(&self, index: usize, value: &str) -> Result<bool, BrowserError> {
        self.conn.discard_events().await;

        let value_json = serde_json::to_string(value).unwrap_or_else(|_| "\"\"".to_string());
        let script = format!(
            r#"(() => {{
    const el = document.querySelectorAll('select')[{index}];
    if (!el) return false;
    const wanted = {value_json};
    if (!Array.from(el.options).some(o => o.value === wanted)) return false;
    el.value = wanted;
    el.dispatchEvent(new Event('change', {{ bubbles: true }}));
    return true;
}})()"#
        );

        Ok(self.eval_value(&script).await? == Value::Bool(true))
    }

    async fn element_at(&self, x: u32, y: u32) -> Result<Option<String>, BrowserError> {
        let script = format!(
            "(() => {{ const el = document.elementFromPoint({x}, {y}); return el ? el.outerHTML : null; }})()"
        );
        match self.eval_value(&script).await? {
            Value::String(html) => Ok(Some(html)),
            _ => Ok(None),
        }
    }

    async fn click_at(&self, x: u32, y: u32) -> Result<(), BrowserError> {
        self.conn.discard_events().await;

        self.dispatch_mouse("mouseMoved", x, y).await?;
        tokio::time::sleep(Duration::from_millis(120)).await;
        self.dispatch_mouse("mousePressed", x, y).await?;
        self.dispatch_mouse("mouseReleased", x, y).await?;
        Ok(())
    }

    async fn screenshot_to(&self, path: &Path) -> Result<(), BrowserError> {
        let result = self
            .conn
            .command_with_timeout(
                "Page.captureScreenshot",
                json!({ "format": "png" }),
                Duration::from_secs(60),
            )
            .await?;

        let data = result
            .get("data")
            .and_then(Value::as_str)
            .ok_or_else(|| BrowserError::Protocol {
                detail: "captureScreenshot returned no data".to_string(),
            })?;

        let bytes = B64.decode(data).map_err(|e| BrowserError::Protocol {
            detail: format!("screenshot base64 decode failed: {e}"),
        })?;

        tokio::fs::write(path, bytes).await?;
        Ok(())
    }

    async fn url(&self) -> Result<String, BrowserError> {
        match self.eval_value("window.location.href").await? {
            Value::String(url) => Ok(url),
            other => Err(BrowserError::Protocol {
                detail: format!("location.href returned {other}"),
            }),
        }
    }

    async fn bring_to_front(&self) -> Result<(), BrowserError> {
        self.conn.command("Page.bringToFront", json!({})).await?;
        Ok(())
    }

    async fn close(&self) -> Result<(), BrowserError> {
        self.conn.command("Page.close", json!({})).await?;
        Ok(())
    }
}
