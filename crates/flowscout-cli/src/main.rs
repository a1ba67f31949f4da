//! `flowscout` binary entry point.

mod cli;
mod config;
mod error;

use clap::Parser;
use colored::Colorize;
use flowscout_core::{CrawlReport, Crawler};
use tracing_subscriber::EnvFilter;

use crate::cli::Cli;
use crate::config::FileConfig;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(err) = run(&cli).await {
        error::handle_error(&err);
    }
}

async fn run(cli: &Cli) -> anyhow::Result<()> {
    let file = FileConfig::load()?;
    let crawl_config = config::resolve(cli, file);

    let crawler = Crawler::new(crawl_config);
    let report = crawler.crawl(&cli.url).await?;
    print_summary(&report);
    Ok(())
}

fn print_summary(report: &CrawlReport) {
    let elapsed = report
        .finished_at
        .signed_duration_since(report.started_at)
        .num_seconds();

    println!();
    println!(
        "{} crawl {} finished in {elapsed}s",
        "✓".green().bold(),
        report.crawl_id
    );
    println!("  url:      {}", report.url);
    println!("  flows:    {} run, {} failed", report.flows_run, report.flows_failed);
    println!("  output:   {}", report.output_dir.display().to_string().cyan());

    if report.flows_failed > 0 {
        println!(
            "  {}",
            format!("{} flow(s) failed, see the log above", report.flows_failed).yellow()
        );
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
