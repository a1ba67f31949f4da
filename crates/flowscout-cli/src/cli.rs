//! Command-line argument definitions.

use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    name = "flowscout",
    version,
    about = "Explore and record login flows on a web page",
    long_about = "Crawls a page's dropdown configurations, follows the clicks \
suggested by an external visual detector, and records every flow as \
screenshots plus a JSON action trace."
)]
pub struct Cli {
    /// Target URL to crawl
    pub url: String,

    /// Click detector address (host:port)
    #[arg(long, env = "FLOWSCOUT_DETECTOR_ADDR")]
    pub detector_addr: Option<String>,

    /// Screenshot classifier address (host:port)
    #[arg(long, env = "FLOWSCOUT_CLASSIFIER_ADDR")]
    pub classifier_addr: Option<String>,

    /// Root directory for screenshots and traces
    #[arg(long, env = "FLOWSCOUT_OUTPUT_DIR")]
    pub output_dir: Option<PathBuf>,

    /// Chromium binary to launch (common names are probed by default)
    #[arg(long, env = "FLOWSCOUT_CHROME_PATH")]
    pub chrome_path: Option<String>,

    /// Show the browser window instead of running headless
    #[arg(long)]
    pub headed: bool,

    /// Maximum flow variants to run
    #[arg(long)]
    pub max_flows: Option<usize>,

    /// Maximum clicks per flow
    #[arg(long)]
    pub click_limit: Option<usize>,

    /// Enable debug logging
    #[arg(short, long)]
    pub verbose: bool,
}
