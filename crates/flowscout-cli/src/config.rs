//! Config-file loading and option merging.
//!
//! Precedence, highest first: CLI flags / environment, then
//! `~/.config/flowscout/config.toml`, then built-in defaults.

use std::path::{Path, PathBuf};

use anyhow::Context;
use flowscout_core::CrawlConfig;
use serde::Deserialize;

use crate::cli::Cli;

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub detector_addr: Option<String>,
    pub classifier_addr: Option<String>,
    pub output_dir: Option<PathBuf>,
    pub chrome_path: Option<String>,
    pub headless: Option<bool>,
    pub max_flows: Option<usize>,
    pub click_limit: Option<usize>,
    pub filler_text: Option<String>,
}

impl FileConfig {
    /// Load the user's config file if one exists.
    pub fn load() -> anyhow::Result<Self> {
        match Self::default_path() {
            Some(path) if path.exists() => Self::load_from_path(&path),
            _ => Ok(Self::default()),
        }
    }

    pub fn load_from_path(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        toml::from_str(&raw).with_context(|| format!("invalid config file {}", path.display()))
    }

    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("flowscout").join("config.toml"))
    }
}

/// Fold CLI flags and file values over the defaults.
pub fn resolve(cli: &Cli, file: FileConfig) -> CrawlConfig {
    let mut config = CrawlConfig::default();

    if let Some(addr) = file.detector_addr {
        config.detector_addr = addr;
    }
    if let Some(addr) = file.classifier_addr {
        config.classifier_addr = addr;
    }
    if let Some(dir) = file.output_dir {
        config.output_root = dir;
    }
    if let Some(path) = file.chrome_path {
        config.chrome_path = Some(path);
    }
    if let Some(headless) = file.headless {
        config.headless = headless;
    }
    if let Some(max_flows) = file.max_flows {
        config.max_flows = max_flows;
    }
    if let Some(click_limit) = file.click_limit {
        config.click_limit = click_limit;
    }
    if let Some(filler) = file.filler_text {
        config.filler_text = filler;
    }

    if let Some(addr) = &cli.detector_addr {
        config.detector_addr = addr.clone();
    }
    if let Some(addr) = &cli.classifier_addr {
        config.classifier_addr = addr.clone();
    }
    if let Some(dir) = &cli.output_dir {
        config.output_root = dir.clone();
    }
    if let Some(path) = &cli.chrome_path {
        config.chrome_path = Some(path.clone());
    }
    if cli.headed {
        config.headless = false;
    }
    if let Some(max_flows) = cli.max_flows {
        config.max_flows = max_flows;
    }
    if let Some(click_limit) = cli.click_limit {
        config.click_limit = click_limit;
    }

    config
}
