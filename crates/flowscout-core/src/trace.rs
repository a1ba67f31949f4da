//! Action recording and trace persistence.
//!
//! Every flow accumulates an ordered list of [`Action`]s and writes it out
//! exactly once, as pretty JSON, when the flow reaches a terminal state.
//! Traces are never mutated after persistence.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

/// Element markup stored in a trace is capped at this many characters.
pub const ELEMENT_SNIPPET_LEN: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClickPosition {
    pub x: u32,
    pub y: u32,
}

/// One recorded step of a flow.
///
/// Click steps carry a position and element snippet; the select-application
/// step carries the dropdown assignments instead; terminal steps have a null
/// position and a note naming the termination reason.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub step: u32,
    pub position: Option<ClickPosition>,
    pub element: Option<String>,
    pub screenshot: PathBuf,
    pub url: String,
    pub note: Option<String>,
    pub select_options: Option<BTreeMap<String, String>>,
}

/// Accumulates a flow's actions in execution order.
#[derive(Debug, Default)]
pub struct ActionRecorder {
    actions: Vec<Action>,
}

impl ActionRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&mut self, mut action: Action) {
        action.step = self.actions.len() as u32 + 1;
        self.actions.push(action);
    }

    /// Record the select-application summary for a variant flow.
    pub fn record_select(
        &mut self,
        screenshot: PathBuf,
        url: String,
        select_options: BTreeMap<String, String>,
    ) {
        self.push(Action {
            step: 0,
            position: None,
            element: None,
            screenshot,
            url,
            note: None,
            select_options: Some(select_options),
        });
    }

    /// Record one click step.
    pub fn record_click(
        &mut self,
        screenshot: PathBuf,
        url: String,
        position: ClickPosition,
        element: String,
        note: Option<String>,
    ) {
        self.push(Action {
            step: 0,
            position: Some(position),
            element: Some(truncate_chars(&element, ELEMENT_SNIPPET_LEN)),
            screenshot,
            url,
            note,
            select_options: None,
        });
    }

    /// Record a null-position terminal marker naming why the flow stopped.
    pub fn record_terminal(&mut self, screenshot: PathBuf, url: String, note: &str) {
        self.push(Action {
            step: 0,
            position: None,
            element: None,
            screenshot,
            url,
            note: Some(note.to_string()),
            select_options: None,
        });
    }

    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Whether the most recent action carries a click position.
    pub fn last_has_position(&self) -> bool {
        self.actions
            .last()
            .is_some_and(|action| action.position.is_some())
    }

    /// Write the trace as pretty JSON. Called once per flow.
    pub async fn persist(&self, path: &Path) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(&self.actions)
            .context("failed to serialize flow trace")?;
        tokio::fs::write(path, json)
            .await
            .with_context(|| format!("failed to write trace to {}", path.display()))?;
        Ok(())
    }
}

/// Truncate to at most `max` characters, never splitting a UTF-8 scalar.
pub fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((byte_index, _)) => s[..byte_index].to_string(),
        None => s.to_string(),
    }
}
