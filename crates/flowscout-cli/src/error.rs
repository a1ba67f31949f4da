//! Colored error reporting with suggestions for the common failure modes.

use colored::Colorize;

/// Print the error chain and a hint when we recognize the cause, then exit
/// non-zero.
pub fn handle_error(err: &anyhow::Error) -> ! {
    eprintln!("{} {err:#}", "error:".red().bold());

    if let Some(hint) = hint_for(err) {
        eprintln!("\n{} {hint}", "hint:".yellow().bold());
    }

    std::process::exit(1);
}

fn hint_for(err: &anyhow::Error) -> Option<&'static str> {
    let chain = format!("{err:#}").to_lowercase();

    if chain.contains("failed to launch browser") || chain.contains("no chromium binary") {
        return Some(
            "no usable Chromium found. Install google-chrome or chromium, or point \
--chrome-path (FLOWSCOUT_CHROME_PATH) at the binary.",
        );
    }
    if chain.contains("detector") && chain.contains("connection") {
        return Some(
            "the click detector is not reachable. Check that the service is running \
and that --detector-addr matches its listen address.",
        );
    }
    if chain.contains("invalid target url") {
        return Some("the target must be a full http(s) URL, e.g. https://example.com/login");
    }
    if chain.contains("invalid config file") {
        return Some("fix or remove ~/.config/flowscout/config.toml and retry");
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn browser_launch_failures_get_a_chrome_hint() {
        let err = anyhow::anyhow!("no chromium binary could be started: No such file");
        assert!(hint_for(&err).unwrap().contains("--chrome-path"));
    }

    #[test]
    fn unknown_errors_get_no_hint() {
        let err = anyhow::anyhow!("something exotic");
        assert!(hint_for(&err).is_none());
    }

    #[test]
    fn hints_look_through_the_context_chain() {
        let err = anyhow::anyhow!("connection refused").context("detector connection failed");
        assert!(hint_for(&err).unwrap().contains("click detector"));
    }
}
