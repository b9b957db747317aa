use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::affiliate::{AffiliateResolver, ShortIoClient};
use crate::comment::{AffiliateLink, InboundComment, IntentQuery, ReplyText, ResponsePayload};
use crate::config::Config;
use crate::llm::{ChatMessage, ChatModel, LlmClient};
use crate::poster::browser::PlaywrightLauncher;
use crate::poster::pool::SessionPool;
use crate::poster::ThreadPoster;
use crate::tools;

/// Runs one comment through intent extraction, link resolution, reply
/// composition and posting. Holds no per-request state.
pub struct CommentOrchestrator {
    llm: Arc<dyn ChatModel>,
    resolver: AffiliateResolver,
    poster: ThreadPoster,
    intent_prompt: String,
    reply_prompt: String,
}

impl CommentOrchestrator {
    pub fn new(
        llm: Arc<dyn ChatModel>,
        resolver: AffiliateResolver,
        poster: ThreadPoster,
        intent_prompt: impl Into<String>,
        reply_prompt: impl Into<String>,
    ) -> Self {
        Self {
            llm,
            resolver,
            poster,
            intent_prompt: intent_prompt.into(),
            reply_prompt: reply_prompt.into(),
        }
    }

    /// Wire up the production collaborators from configuration.
    pub fn from_config(config: &Config) -> Result<Self> {
        let llm = Arc::new(LlmClient::new(config.llm.clone()));

        let search = ShortIoClient::new(&config.affiliate)?;
        let resolver = AffiliateResolver::new(Arc::new(search), &config.affiliate.fallback_url);

        let pool = SessionPool::new(
            Box::new(PlaywrightLauncher::new(&config.browser)),
            config.browser.max_sessions,
            Duration::from_secs(config.browser.acquire_timeout_secs),
        );
        let poster = ThreadPoster::new(pool, config.reddit.clone());

        Ok(Self::new(
            llm,
            resolver,
            poster,
            &config.llm.intent_prompt,
            &config.llm.reply_prompt,
        ))
    }

    pub fn poster(&self) -> &ThreadPoster {
        &self.poster
    }

    /// Any error from the model calls aborts the whole request. Link
    /// resolution and posting report failure as data instead.
    pub async fn process(&self, comment: &InboundComment) -> Result<ResponsePayload> {
        info!(
            "Processing comment ({} chars, {} attachment(s))",
            comment.text.len(),
            comment.attachments.len()
        );

        let intent = self.extract_intent(comment).await?;
        info!("Extracted product query: '{}'", intent.query);

        let link = self.resolver.resolve(&intent.query).await;

        let reply = self.compose_reply(&comment.text, &link).await?;
        info!("Composed reply ({} chars)", reply.body.len());

        let outcome = self.poster.post(&comment.text, &reply.body).await;
        if !outcome.is_success() {
            // Still a successful response; the detail carries the failure
            warn!("Reply was not posted: {}", outcome.detail);
        }

        Ok(ResponsePayload {
            success: true,
            reply_text: reply.body,
            affiliate_url: link.url,
            post_result: outcome.detail,
        })
    }

    async fn extract_intent(&self, comment: &InboundComment) -> Result<IntentQuery> {
        let messages = [
            ChatMessage::system(&self.intent_prompt),
            ChatMessage::user_parts(comment.content_parts()),
        ];

        let response = self
            .llm
            .chat(&messages, &tools::affiliate_tool_definitions())
            .await
            .context("Intent extraction request failed")?;

        tools::parse_affiliate_call(&response)
    }

    async fn compose_reply(&self, text: &str, link: &AffiliateLink) -> Result<ReplyText> {
        let messages = [
            ChatMessage::system(&self.reply_prompt),
            ChatMessage::user(format!(
                "Original comment: {}\nAffiliate URL: {}",
                text, link.url
            )),
        ];

        let response = self
            .llm
            .chat(&messages, &[])
            .await
            .context("Reply composition request failed")?;

        let body = response
            .text()
            .context("Model returned no reply text")?
            .to_string();

        Ok(ReplyText { body })
    }
}
