//! Posts a reply into the configured thread through a browser session.
//!
//! Each post walks `Launch -> Authenticate -> Navigate -> Compose -> Submit`
//! on a fresh page and always ends in `Closed`. Errors never escape: they
//! come back as a failed [`PostOutcome`].

pub mod browser;
pub mod pool;

use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::comment::PostOutcome;
use crate::config::RedditConfig;

use browser::BrowserPage;
use pool::SessionPool;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostState {
    Launch,
    Authenticate,
    Navigate,
    Compose,
    Submit,
    Closed,
}

impl std::fmt::Display for PostState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PostState::Launch => "launch",
            PostState::Authenticate => "authenticate",
            PostState::Navigate => "navigate",
            PostState::Compose => "compose",
            PostState::Submit => "submit",
            PostState::Closed => "closed",
        };
        f.write_str(name)
    }
}

pub struct ThreadPoster {
    pool: SessionPool,
    reddit: RedditConfig,
}

impl ThreadPoster {
    pub fn new(pool: SessionPool, reddit: RedditConfig) -> Self {
        Self { pool, reddit }
    }

    pub fn pool(&self) -> &SessionPool {
        &self.pool
    }

    /// Log in, open the thread and submit `reply`. Never fails; one login
    /// and one submission attempt per call.
    pub async fn post(&self, original_comment: &str, reply: &str) -> PostOutcome {
        debug!(state = %PostState::Launch, "Posting reply to comment: {}", original_comment);

        let mut lease = match self.pool.acquire().await {
            Ok(lease) => lease,
            Err(e) => return failed(PostState::Launch, e),
        };

        // Back to the pool only after a clean close. If this future is
        // dropped mid-post, the lease goes down discarded and takes the
        // browser process with it.
        lease.discard();

        let mut page = match lease.browser().new_page().await {
            Ok(page) => page,
            Err(e) => return failed(PostState::Launch, e),
        };

        let result = self.drive(page.as_mut(), reply).await;

        debug!(state = %PostState::Closed, "Closing browser session");
        match page.close().await {
            Ok(()) => lease.keep(),
            Err(e) => warn!("Failed to close browser session: {:#}", e),
        }
        drop(lease);

        match result {
            Ok(()) => {
                info!("Comment posted to {}", self.reddit.thread_url);
                PostOutcome::posted()
            }
            Err((state, e)) => failed(state, e),
        }
    }

    async fn drive(
        &self,
        page: &mut dyn BrowserPage,
        reply: &str,
    ) -> std::result::Result<(), (PostState, anyhow::Error)> {
        debug!(state = %PostState::Authenticate, "Entering state");
        self.authenticate(page)
            .await
            .map_err(|e| (PostState::Authenticate, e))?;

        debug!(state = %PostState::Navigate, "Entering state");
        page.goto(&self.reddit.thread_url)
            .await
            .map_err(|e| (PostState::Navigate, e))?;

        debug!(state = %PostState::Compose, "Entering state");
        self.compose(page, reply)
            .await
            .map_err(|e| (PostState::Compose, e))?;

        debug!(state = %PostState::Submit, "Entering state");
        page.click(&self.reddit.comment_submit_selector)
            .await
            .map_err(|e| (PostState::Submit, e))?;

        Ok(())
    }

    async fn authenticate(&self, page: &mut dyn BrowserPage) -> Result<()> {
        let cfg = &self.reddit;
        page.goto(&cfg.login_url).await?;
        page.fill(&cfg.username_selector, &cfg.username).await?;
        page.fill(&cfg.password_selector, &cfg.password).await?;
        page.click(&cfg.login_submit_selector).await?;

        let timeout = Duration::from_secs(cfg.login_timeout_secs);
        page.wait_for_selector(&cfg.logged_in_selector, timeout)
            .await
            .with_context(|| {
                format!("Login did not complete within {}s", cfg.login_timeout_secs)
            })?;
        Ok(())
    }

    async fn compose(&self, page: &mut dyn BrowserPage, reply: &str) -> Result<()> {
        let selector = &self.reddit.reply_selector;
        // Generous default: the comment box renders after the thread loads
        page.wait_for_selector(selector, Duration::from_secs(30)).await?;
        page.click(selector).await?;
        page.fill(selector, reply).await?;
        Ok(())
    }
}

fn failed(state: PostState, e: anyhow::Error) -> PostOutcome {
    warn!(state = %state, "Failed to post: {:#}", e);
    PostOutcome::failed(format!("{:#}", e))
}
