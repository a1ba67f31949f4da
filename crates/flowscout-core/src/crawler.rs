//! Top-level crawl orchestration.
//!
//! One [`Crawler::crawl`] call handles one target URL: connect the detector,
//! launch the browser, probe the dropdown inventory, run one flow per
//! variant (bounded), and tear everything down in order on every exit path:
//! classifications drained, session closed, detector closed.

use std::path::Path;

use anyhow::Context;
use chrono::{DateTime, Utc};
use flowscout_browser::{BrowserSession, ChromeSession, LaunchOptions};
use flowscout_oracle::{ClassificationSink, ClassifierClient, ClickOracle, DetectorClient};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::CrawlConfig;
use crate::executor::{CrawlContext, FlowExecutor};
use crate::paths;
use crate::select::{self, FlowVariant};

/// Outcome of one crawl, for the caller's summary output.
#[derive(Debug)]
pub struct CrawlReport {
    pub crawl_id: Uuid,
    pub url: String,
    pub flows_run: usize,
    pub flows_failed: usize,
    pub output_dir: std::path::PathBuf,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

pub struct Crawler {
    config: CrawlConfig,
}

impl Crawler {
    pub fn new(config: CrawlConfig) -> Self {
        Self { config }
    }

    /// Crawl one target URL end to end.
    pub async fn crawl(&self, target_url: &str) -> anyhow::Result<CrawlReport> {
        let crawl_id = Uuid::new_v4();
        info!(crawl_id = %crawl_id, url = target_url, "starting crawl");

        let host = paths::sanitize_host(target_url)?;

        let mut detector = DetectorClient::new(self.config.detector_addr.clone())
            .with_query_timeout(self.config.oracle_timeout);
        detector
            .connect()
            .await
            .context("detector connection failed")?;
        let mut classifier = ClassifierClient::new(self.config.classifier_addr.clone());

        let url_dir = paths::prepare_url_dir(&self.config.output_root, &host).await?;

        let session = ChromeSession::launch(&LaunchOptions {
            chrome_path: self.config.chrome_path.clone(),
            headless: self.config.headless,
            window_size: self.config.viewport,
        })
        .await
        .context("failed to launch browser session")?;

        let result = self
            .run_flows(
                &session,
                &mut detector,
                &mut classifier,
                crawl_id,
                target_url,
                &url_dir,
            )
            .await;

        // Teardown runs on success and failure alike, in this order.
        classifier.drain().await;
        if let Err(e) = session.close().await {
            warn!(crawl_id = %crawl_id, error = %e, "failed to close browser session");
        }
        detector.close().await;

        result
    }

    /// The flow loop, generic over the session and oracle implementations.
    pub async fn run_flows(
        &self,
        session: &dyn BrowserSession,
        oracle: &mut dyn ClickOracle,
        classifier: &mut dyn ClassificationSink,
        crawl_id: Uuid,
        target_url: &str,
        url_dir: &Path,
    ) -> anyhow::Result<CrawlReport> {
        let started_at = Utc::now();

        let inventory = self.probe_inventory(session, crawl_id, target_url).await?;
        let (groups, variants) = select::enumerate(&inventory);
        info!(
            crawl_id = %crawl_id,
            dropdowns = inventory.len(),
            groups = groups.len(),
            variants = variants.len(),
            "select inventory enumerated"
        );

        let runs: Vec<Option<FlowVariant>> = if variants.is_empty() {
            vec![None]
        } else {
            if variants.len() > self.config.max_flows {
                warn!(
                    crawl_id = %crawl_id,
                    variants = variants.len(),
                    cap = self.config.max_flows,
                    "variant count exceeds flow cap, truncating"
                );
            }
            variants
                .into_iter()
                .take(self.config.max_flows)
                .map(Some)
                .collect()
        };

        let mut flows_failed = 0;
        for (flow, variant) in runs.iter().enumerate() {
            let ctx = CrawlContext { crawl_id, flow };
            let executor = FlowExecutor::new(&self.config, ctx, paths::flow_dir(url_dir, flow));

            match executor
                .run(
                    session,
                    oracle,
                    classifier,
                    target_url,
                    &groups,
                    variant.as_ref(),
                )
                .await
            {
                Ok(summary) => info!(
                    crawl_id = %crawl_id,
                    flow,
                    clicks = summary.clicks,
                    actions = summary.actions,
                    trace = %summary.trace_path.display(),
                    "flow completed"
                ),
                // One broken flow must not stop the rest.
                Err(e) => {
                    flows_failed += 1;
                    error!(
                        crawl_id = %crawl_id,
                        flow,
                        error = %format!("{e:#}"),
                        "flow failed"
                    );
                }
            }
        }

        Ok(CrawlReport {
            crawl_id,
            url: target_url.to_string(),
            flows_run: runs.len(),
            flows_failed,
            output_dir: url_dir.to_path_buf(),
            started_at,
            finished_at: Utc::now(),
        })
    }

    /// Open a throwaway page just to read the dropdown inventory.
    async fn probe_inventory(
        &self,
        session: &dyn BrowserSession,
        crawl_id: Uuid,
        target_url: &str,
    ) -> anyhow::Result<Vec<Vec<String>>> {
        let page = session
            .open_page()
            .await
            .context("failed to open inventory probe page")?;

        let (width, height) = self.config.viewport;
        page.set_viewport(width, height).await?;
        page.set_user_agent(&self.config.user_agent).await?;
        page.mask_automation().await?;
        page.navigate(target_url)
            .await
            .with_context(|| format!("failed to navigate to {target_url}"))?;
        if let Err(e) = page.wait_for_load(self.config.load_timeout).await {
            warn!(crawl_id = %crawl_id, error = %e, "probe load event did not fire");
        }

        let inventory = page
            .select_inventory()
            .await
            .context("failed to read select inventory")?;

        if let Err(e) = page.close().await {
            warn!(crawl_id = %crawl_id, error = %e, "failed to close probe page");
        }

        Ok(inventory)
    }
}
