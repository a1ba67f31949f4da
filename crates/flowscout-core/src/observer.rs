//! Post-action navigation observation.
//!
//! After any interactive action the page can (a) navigate in place, (b) open
//! a new browsing context, or (c) do nothing visible. The observer races the
//! first two against a shared deadline; `tokio::select!` drops the losing
//! future on every exit path, so no listener outlives the race.

use std::time::Duration;

use flowscout_browser::{BrowserError, BrowserSession, Page};
use tokio::time::Instant;
use tracing::debug;

const POPUP_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// What happened to the page after an action.
pub enum PageChange {
    /// A new browsing context opened; it has been brought to the foreground.
    NewPage(Box<dyn Page>),
    /// The current page completed a navigation.
    SamePage,
    /// Nothing observable happened before the deadline.
    Unchanged,
}

/// Wait up to `timeout` for the page to navigate or spawn a popup.
pub async fn observe_after_action(
    session: &dyn BrowserSession,
    page: &dyn Page,
    timeout: Duration,
) -> Result<PageChange, BrowserError> {
    let deadline = Instant::now() + timeout;

    tokio::select! {
        loaded = page.wait_for_load(timeout) => match loaded {
            Ok(()) => {
                debug!(target = page.target_id(), "same-page navigation completed");
                Ok(PageChange::SamePage)
            }
            Err(BrowserError::PageLoadTimeout { .. }) => Ok(PageChange::Unchanged),
            Err(e) => Err(e),
        },
        popup = poll_for_popup(session, page.target_id(), deadline) => match popup? {
            Some(new_page) => {
                new_page.bring_to_front().await?;
                Ok(PageChange::NewPage(new_page))
            }
            None => Ok(PageChange::Unchanged),
        },
    }
}

async fn poll_for_popup(
    session: &dyn BrowserSession,
    opener_id: &str,
    deadline: Instant,
) -> Result<Option<Box<dyn Page>>, BrowserError> {
    loop {
        if let Some(page) = session.find_popup(opener_id).await? {
            return Ok(Some(page));
        }
        if Instant::now() + POPUP_POLL_INTERVAL > deadline {
            // Let the load arm win the race right up to the deadline.
            tokio::time::sleep_until(deadline).await;
            return Ok(None);
        }
        tokio::time::sleep(POPUP_POLL_INTERVAL).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{MockPage, MockSession, PageScript};

    fn script(load_fires: bool) -> PageScript {
        PageScript {
            load_fires,
            ..PageScript::default()
        }
    }

    #[tokio::test]
    async fn completed_navigation_wins() {
        let (page, _log) = MockPage::new("main", script(true));
        let session = MockSession::default();

        let change = observe_after_action(&session, &page, Duration::from_millis(50))
            .await
            .unwrap();
        assert!(matches!(change, PageChange::SamePage));
    }

    #[tokio::test]
    async fn silence_until_the_deadline_is_unchanged() {
        let (page, _log) = MockPage::new("main", script(false));
        let session = MockSession::default();

        let start = std::time::Instant::now();
        let change = observe_after_action(&session, &page, Duration::from_millis(50))
            .await
            .unwrap();
        assert!(matches!(change, PageChange::Unchanged));
        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[tokio::test]
    async fn popup_wins_over_a_stalled_load() {
        let (page, _log) = MockPage::new("main", script(false));
        let session = MockSession::default();
        let (popup, _popup_log) = MockPage::new("popup", script(true));
        session.queue_popup(popup);

        let change = observe_after_action(&session, &page, Duration::from_millis(200))
            .await
            .unwrap();
        match change {
            PageChange::NewPage(new_page) => assert_eq!(new_page.target_id(), "popup"),
            _ => panic!("expected a new browsing context"),
        }
    }
}
