//! Artifact directory layout.
//!
//! `<output_root>/<sanitized_host>/flow_<n>/page_<m>.png` plus one
//! `click_actions_flow_<n>.json` per flow directory. Flow indices are
//! zero-based, page numbers one-based.

use std::path::{Path, PathBuf};

use anyhow::Context;

/// Directory-safe name for a target URL's host: every non-alphanumeric
/// character becomes `_`.
pub fn sanitize_host(target: &str) -> anyhow::Result<String> {
    let parsed = url::Url::parse(target)
        .with_context(|| format!("invalid target URL: {target}"))?;
    let host = parsed
        .host_str()
        .with_context(|| format!("target URL has no host: {target}"))?;
    Ok(host
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect())
}

/// Create a clean per-URL output directory, removing any previous run.
pub async fn prepare_url_dir(output_root: &Path, host: &str) -> anyhow::Result<PathBuf> {
    let dir = output_root.join(host);
    if tokio::fs::try_exists(&dir).await.unwrap_or(false) {
        tokio::fs::remove_dir_all(&dir)
            .await
            .with_context(|| format!("failed to clear {}", dir.display()))?;
    }
    tokio::fs::create_dir_all(&dir)
        .await
        .with_context(|| format!("failed to create {}", dir.display()))?;
    Ok(dir)
}

pub fn flow_dir(url_dir: &Path, flow: usize) -> PathBuf {
    url_dir.join(format!("flow_{flow}"))
}

pub fn screenshot_path(flow_dir: &Path, page: usize) -> PathBuf {
    flow_dir.join(format!("page_{page}.png"))
}

pub fn trace_path(flow_dir: &Path, flow: usize) -> PathBuf {
    flow_dir.join(format!("click_actions_flow_{flow}.json"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_sanitization_replaces_punctuation() {
        assert_eq!(
            sanitize_host("https://www.illimitybank.com/en/login").unwrap(),
            "www_illimitybank_com"
        );
        assert_eq!(
            sanitize_host("http://auth.example-bank.it:8443").unwrap(),
            "auth_example_bank_it"
        );
    }

    #[test]
    fn unparseable_urls_are_rejected() {
        assert!(sanitize_host("not a url").is_err());
        assert!(sanitize_host("file:///tmp/x").is_err());
    }

    #[test]
    fn artifact_layout() {
        let url_dir = PathBuf::from("screenshot_flows/www_example_com");
        let flow = flow_dir(&url_dir, 0);
        assert_eq!(flow, url_dir.join("flow_0"));
        assert_eq!(screenshot_path(&flow, 1), flow.join("page_1.png"));
        assert_eq!(trace_path(&flow, 0), flow.join("click_actions_flow_0.json"));
    }

    #[tokio::test]
    async fn prepare_clears_previous_run() {
        let root = tempfile::tempdir().unwrap();
        let dir = prepare_url_dir(root.path(), "www_example_com").await.unwrap();
        let stale = dir.join("flow_0");
        tokio::fs::create_dir_all(&stale).await.unwrap();
        tokio::fs::write(stale.join("page_1.png"), b"old").await.unwrap();

        let dir = prepare_url_dir(root.path(), "www_example_com").await.unwrap();
        assert!(dir.exists());
        assert!(!stale.exists());
    }
}
