//! Per-variant flow execution.
//!
//! One [`FlowExecutor`] run drives a single simulated user session: apply a
//! dropdown configuration, then loop screenshot → detector query → click
//! until a termination heuristic fires. The executor owns the flow's trace
//! and persists it exactly once on the way out.

use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;

use anyhow::{Context, bail};
use flowscout_browser::{BrowserSession, Page};
use flowscout_oracle::{ClassificationSink, ClickOracle, ClickOutcome};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::CrawlConfig;
use crate::marker;
use crate::observer::{self, PageChange};
use crate::paths;
use crate::select::{FlowVariant, SelectGroup};
use crate::trace::{ActionRecorder, ClickPosition};

/// Identity of the work in progress, threaded through calls and logged as
/// structured fields rather than recovered from ambient span state.
#[derive(Debug, Clone, Copy)]
pub struct CrawlContext {
    pub crawl_id: Uuid,
    pub flow: usize,
}

/// What one completed flow produced.
#[derive(Debug)]
pub struct FlowSummary {
    pub clicks: usize,
    pub actions: usize,
    pub trace_path: PathBuf,
}

pub struct FlowExecutor<'a> {
    config: &'a CrawlConfig,
    ctx: CrawlContext,
    flow_dir: PathBuf,
}

impl<'a> FlowExecutor<'a> {
    pub fn new(config: &'a CrawlConfig, ctx: CrawlContext, flow_dir: PathBuf) -> Self {
        Self {
            config,
            ctx,
            flow_dir,
        }
    }

    /// Run one flow to a terminal state and persist its trace.
    pub async fn run(
        &self,
        session: &dyn BrowserSession,
        oracle: &mut dyn ClickOracle,
        classifier: &mut dyn ClassificationSink,
        target_url: &str,
        groups: &[SelectGroup],
        variant: Option<&FlowVariant>,
    ) -> anyhow::Result<FlowSummary> {
        tokio::fs::create_dir_all(&self.flow_dir)
            .await
            .with_context(|| format!("failed to create {}", self.flow_dir.display()))?;

        let mut page = self.prepare_page(session, target_url).await?;

        let select_options = match variant {
            Some(variant) => Some(
                self.apply_variant(session, &mut page, groups, variant)
                    .await?,
            ),
            None => None,
        };

        let mut recorder = ActionRecorder::new();
        let mut page_no = 1;
        let mut shot = self.capture(page.as_ref(), classifier, page_no).await?;

        if let Some(options) = select_options {
            recorder.record_select(shot.clone(), self.current_url(page.as_ref()).await, options);
        }

        let mut clicked: HashSet<(u32, u32)> = HashSet::new();
        let mut last_element: Option<String> = None;
        let mut clicks = 0usize;
        let mut no_popup_streak = 0u32;

        loop {
            if clicks >= self.config.click_limit {
                // Ceiling exit: make sure the trace still ends on a
                // terminal marker.
                if recorder.last_has_position() {
                    let url = self.current_url(page.as_ref()).await;
                    recorder.record_terminal(shot.clone(), url, "click limit reached");
                }
                break;
            }

            let outcome = oracle
                .locate(&shot)
                .await
                .context("detector query failed")?;

            match outcome {
                ClickOutcome::NoElement => {
                    let url = self.current_url(page.as_ref()).await;
                    recorder.record_terminal(shot.clone(), url, "no element detected");
                    break;
                }
                ClickOutcome::NoPopup => {
                    no_popup_streak += 1;
                    if no_popup_streak >= self.config.no_popup_retries {
                        let url = self.current_url(page.as_ref()).await;
                        recorder.record_terminal(shot.clone(), url, "no popup retries exhausted");
                        break;
                    }
                    debug!(
                        crawl_id = %self.ctx.crawl_id,
                        flow = self.ctx.flow,
                        streak = no_popup_streak,
                        "no popup found, re-querying same screenshot"
                    );
                    continue;
                }
                ClickOutcome::Malformed(raw) => {
                    bail!("malformed detector reply: {raw:?}");
                }
                ClickOutcome::Click { x, y } => {
                    no_popup_streak = 0;

                    if clicked.contains(&(x, y)) {
                        let url = self.current_url(page.as_ref()).await;
                        recorder.record_terminal(shot.clone(), url, "duplicate click position");
                        break;
                    }

                    let Some(element) = page.element_at(x, y).await? else {
                        let url = self.current_url(page.as_ref()).await;
                        recorder.record_terminal(shot.clone(), url, "no element detected");
                        break;
                    };

                    let stagnant = last_element.as_deref() == Some(element.as_str());
                    let url = self.current_url(page.as_ref()).await;
                    recorder.record_click(
                        shot.clone(),
                        url,
                        ClickPosition { x, y },
                        element.clone(),
                        stagnant.then(|| "stagnant element".to_string()),
                    );
                    if stagnant {
                        break;
                    }
                    last_element = Some(element);

                    if let Err(e) = marker::draw_marker(&shot, x, y) {
                        warn!(
                            crawl_id = %self.ctx.crawl_id,
                            flow = self.ctx.flow,
                            error = %format!("{e:#}"),
                            "failed to mark screenshot"
                        );
                    }

                    info!(
                        crawl_id = %self.ctx.crawl_id,
                        flow = self.ctx.flow,
                        x,
                        y,
                        "clicking"
                    );
                    page.click_at(x, y).await?;
                    clicked.insert((x, y));
                    clicks += 1;

                    match observer::observe_after_action(
                        session,
                        page.as_ref(),
                        self.config.navigation_timeout,
                    )
                    .await?
                    {
                        PageChange::NewPage(new_page) => {
                            info!(
                                crawl_id = %self.ctx.crawl_id,
                                flow = self.ctx.flow,
                                target = new_page.target_id(),
                                "switching to new browsing context"
                            );
                            page = new_page;
                        }
                        PageChange::SamePage | PageChange::Unchanged => {}
                    }

                    page.fill_text_inputs(&self.config.filler_text, self.config.field_fill_timeout)
                        .await?;
                    tokio::time::sleep(self.config.action_pause).await;

                    page_no += 1;
                    shot = self.capture(page.as_ref(), classifier, page_no).await?;
                }
            }
        }

        let trace_path = paths::trace_path(&self.flow_dir, self.ctx.flow);
        recorder.persist(&trace_path).await?;

        if let Err(e) = page.close().await {
            warn!(
                crawl_id = %self.ctx.crawl_id,
                flow = self.ctx.flow,
                error = %e,
                "failed to close page"
            );
        }

        Ok(FlowSummary {
            clicks,
            actions: recorder.len(),
            trace_path,
        })
    }

    /// Open and prime a page: viewport, user agent, fingerprint masking,
    /// navigation, initial form fill.
    async fn prepare_page(
        &self,
        session: &dyn BrowserSession,
        target_url: &str,
    ) -> anyhow::Result<Box<dyn Page>> {
        let page = session.open_page().await.context("failed to open page")?;

        let (width, height) = self.config.viewport;
        page.set_viewport(width, height).await?;
        page.set_user_agent(&self.config.user_agent).await?;
        page.mask_automation().await?;

        page.navigate(target_url)
            .await
            .with_context(|| format!("failed to navigate to {target_url}"))?;
        if let Err(e) = page.wait_for_load(self.config.load_timeout).await {
            // Heavy pages often never fire load; work with what rendered.
            warn!(
                crawl_id = %self.ctx.crawl_id,
                flow = self.ctx.flow,
                error = %e,
                "load event did not fire, continuing"
            );
        }

        let filled = page
            .fill_text_inputs(&self.config.filler_text, self.config.field_fill_timeout)
            .await?;
        debug!(
            crawl_id = %self.ctx.crawl_id,
            flow = self.ctx.flow,
            filled,
            "text inputs filled"
        );

        Ok(page)
    }

    /// Apply the variant's choice to every member dropdown, watching for
    /// navigation after each individual assignment.
    async fn apply_variant(
        &self,
        session: &dyn BrowserSession,
        page: &mut Box<dyn Page>,
        groups: &[SelectGroup],
        variant: &FlowVariant,
    ) -> anyhow::Result<BTreeMap<String, String>> {
        let mut applied = BTreeMap::new();

        for (group, choice) in groups.iter().zip(&variant.choices) {
            for &index in &group.members {
                let accepted = page.apply_select(index, choice).await?;
                if !accepted {
                    bail!("value {choice:?} is not an option of dropdown {index}");
                }
                applied.insert(index.to_string(), choice.clone());

                match observer::observe_after_action(
                    session,
                    page.as_ref(),
                    self.config.navigation_timeout,
                )
                .await?
                {
                    PageChange::NewPage(new_page) => {
                        info!(
                            crawl_id = %self.ctx.crawl_id,
                            flow = self.ctx.flow,
                            dropdown = index,
                            "dropdown assignment opened a new browsing context"
                        );
                        *page = new_page;
                    }
                    PageChange::SamePage | PageChange::Unchanged => {}
                }
            }
        }

        Ok(applied)
    }

    /// Capture the next screenshot and hand it to the classifier.
    async fn capture(
        &self,
        page: &dyn Page,
        classifier: &mut dyn ClassificationSink,
        page_no: usize,
    ) -> anyhow::Result<PathBuf> {
        let shot = paths::screenshot_path(&self.flow_dir, page_no);
        page.screenshot_to(&shot)
            .await
            .with_context(|| format!("failed to capture {}", shot.display()))?;
        classifier.dispatch(&shot, self.ctx.flow);
        Ok(shot)
    }

    /// Best-effort current URL; a failed lookup must not lose the trace.
    async fn current_url(&self, page: &dyn Page) -> String {
        match page.url().await {
            Ok(url) => url,
            Err(e) => {
                debug!(
                    crawl_id = %self.ctx.crawl_id,
                    flow = self.ctx.flow,
                    error = %e,
                    "could not read page URL"
                );
                String::new()
            }
        }
    }
}
