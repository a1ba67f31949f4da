//! Chromium automation over the DevTools protocol.
//!
//! This crate owns everything browser-shaped: launching a Chromium process
//! with an ephemeral debugging port, speaking the DevTools WebSocket
//! protocol, and exposing two capability traits the crawl engine consumes:
//!
//! - [`BrowserSession`]: one per crawl, opens pages and surfaces popups.
//! - [`Page`]: one per browsing context, handles navigation, evaluation,
//!   form filling, dropdowns, clicks and screenshots.
//!
//! The traits exist so the engine can be exercised against scripted
//! fixtures without a browser on the machine.

pub mod cdp;
pub mod error;
pub mod page;
pub mod session;

pub use cdp::{DevtoolsConnection, DevtoolsEvent};
pub use error::BrowserError;
pub use page::{CdpPage, Page};
pub use session::{BrowserSession, ChromeSession, LaunchOptions, TargetInfo};
