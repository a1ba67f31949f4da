//! The flow-crawling engine.
//!
//! Given a target URL, the engine enumerates the dropdown configurations the
//! page exposes, drives one browser flow per configuration, asks the
//! external click detector where to click at each step, and records every
//! action as a JSON trace alongside numbered screenshots. Browser and
//! detector are reached only through traits, so the whole engine runs
//! against scripted fixtures in tests.

pub mod config;
pub mod crawler;
pub mod executor;
pub mod marker;
pub mod observer;
pub mod paths;
pub mod select;
pub mod trace;

#[cfg(test)]
mod testutil;

pub use config::{CrawlConfig, DEFAULT_USER_AGENT};
pub use crawler::{CrawlReport, Crawler};
pub use executor::{CrawlContext, FlowExecutor, FlowSummary};
pub use observer::PageChange;
pub use select::{FlowVariant, SelectGroup, SelectInventory};
pub use trace::{Action, ActionRecorder, ClickPosition};
