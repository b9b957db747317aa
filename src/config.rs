use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    #[default]
    Openai,
    Openrouter,
    Ollama,
}

impl std::fmt::Display for LlmProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LlmProvider::Openai => write!(f, "openai"),
            LlmProvider::Openrouter => write!(f, "openrouter"),
            LlmProvider::Ollama => write!(f, "ollama"),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default)]
    pub provider: LlmProvider,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_intent_prompt")]
    pub intent_prompt: String,
    #[serde(default = "default_reply_prompt")]
    pub reply_prompt: String,
}

impl LlmConfig {
    /// Returns the effective base_url: if the stored value is empty,
    /// fall back to the canonical URL for the configured provider.
    pub fn effective_base_url(&self) -> &str {
        if !self.base_url.is_empty() {
            return &self.base_url;
        }
        match self.provider {
            LlmProvider::Openai => "https://api.openai.com/v1",
            LlmProvider::Openrouter => "https://openrouter.ai/api/v1",
            LlmProvider::Ollama => "http://localhost:11434/v1",
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: LlmProvider::default(),
            model: default_model(),
            base_url: String::new(),
            api_key: String::new(),
            max_tokens: default_max_tokens(),
            intent_prompt: default_intent_prompt(),
            reply_prompt: default_reply_prompt(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub affiliate: AffiliateConfig,
    #[serde(default)]
    pub reddit: RedditConfig,
    #[serde(default)]
    pub browser: BrowserConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
        }
    }
}

/// short.io link search settings
#[derive(Debug, Deserialize, Clone)]
pub struct AffiliateConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_affiliate_base_url")]
    pub base_url: String,
    #[serde(default = "default_fallback_url")]
    pub fallback_url: String,
    #[serde(default = "default_affiliate_timeout")]
    pub timeout_secs: u64,
}

impl Default for AffiliateConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: default_affiliate_base_url(),
            fallback_url: default_fallback_url(),
            timeout_secs: default_affiliate_timeout(),
        }
    }
}

/// Login credentials, target thread and page selectors for the posting flow.
#[derive(Debug, Deserialize, Clone)]
pub struct RedditConfig {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub thread_url: String,
    #[serde(default = "default_login_url")]
    pub login_url: String,
    #[serde(default = "default_username_selector")]
    pub username_selector: String,
    #[serde(default = "default_password_selector")]
    pub password_selector: String,
    #[serde(default = "default_login_submit_selector")]
    pub login_submit_selector: String,
    /// Element only present once the session is authenticated
    #[serde(default = "default_logged_in_selector")]
    pub logged_in_selector: String,
    #[serde(default = "default_reply_selector")]
    pub reply_selector: String,
    #[serde(default = "default_comment_submit_selector")]
    pub comment_submit_selector: String,
    #[serde(default = "default_login_timeout")]
    pub login_timeout_secs: u64,
}

impl Default for RedditConfig {
    fn default() -> Self {
        Self {
            username: String::new(),
            password: String::new(),
            thread_url: String::new(),
            login_url: default_login_url(),
            username_selector: default_username_selector(),
            password_selector: default_password_selector(),
            login_submit_selector: default_login_submit_selector(),
            logged_in_selector: default_logged_in_selector(),
            reply_selector: default_reply_selector(),
            comment_submit_selector: default_comment_submit_selector(),
            login_timeout_secs: default_login_timeout(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct BrowserConfig {
    #[serde(default = "default_node_binary")]
    pub node_binary: String,
    #[serde(default = "default_headless")]
    pub headless: bool,
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,
    #[serde(default = "default_acquire_timeout")]
    pub acquire_timeout_secs: u64,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            node_binary: default_node_binary(),
            headless: default_headless(),
            max_sessions: default_max_sessions(),
            acquire_timeout_secs: default_acquire_timeout(),
        }
    }
}

fn default_port() -> u16 {
    3000
}

fn default_model() -> String {
    "gpt-4o".to_string()
}

fn default_max_tokens() -> u32 {
    1024
}

fn default_intent_prompt() -> String {
    "You are an affiliate assistant. Read a user comment, extract product intent, \
     and request the best affiliate link using a function call."
        .to_string()
}

fn default_reply_prompt() -> String {
    "Create a friendly reply embedding the affiliate link.".to_string()
}

fn default_affiliate_base_url() -> String {
    "https://api.short.io".to_string()
}

fn default_fallback_url() -> String {
    "https://fallback-affiliate-link.com".to_string()
}

fn default_affiliate_timeout() -> u64 {
    10
}

fn default_login_url() -> String {
    "https://www.reddit.com/login".to_string()
}

fn default_username_selector() -> String {
    "#loginUsername".to_string()
}

fn default_password_selector() -> String {
    "#loginPassword".to_string()
}

fn default_login_submit_selector() -> String {
    r#"button[type="submit"]"#.to_string()
}

fn default_logged_in_selector() -> String {
    "#USER_DROPDOWN_ID, faceplate-dropdown-menu#expand-user-drawer-button".to_string()
}

fn default_reply_selector() -> String {
    "textarea".to_string()
}

fn default_comment_submit_selector() -> String {
    r#"button:has-text("Comment")"#.to_string()
}

fn default_login_timeout() -> u64 {
    15
}

fn default_node_binary() -> String {
    "node".to_string()
}

fn default_headless() -> bool {
    true
}

fn default_max_sessions() -> usize {
    4
}

fn default_acquire_timeout() -> u64 {
    30
}

impl Config {
    /// Load configuration from a TOML file, then apply environment overrides.
    /// A missing file is not an error: defaults plus environment are used.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config: Config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            Self::from_toml(&content)?
        } else {
            Config::default()
        };

        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse config file")
    }

    /// Overlay secrets and deployment settings from the environment.
    /// `lookup` is injected so tests don't touch the process environment.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let set = |target: &mut String, key: &str| {
            if let Some(value) = lookup(key).filter(|v| !v.is_empty()) {
                *target = value;
            }
        };

        set(&mut self.llm.api_key, "OPENAI_API_KEY");
        set(&mut self.affiliate.api_key, "SHORTIO_API_KEY");
        set(&mut self.reddit.username, "REDDIT_USERNAME");
        set(&mut self.reddit.password, "REDDIT_PASSWORD");
        set(&mut self.reddit.thread_url, "REDDIT_THREAD_URL");

        if let Some(port) = lookup("PORT").and_then(|p| p.parse().ok()) {
            self.server.port = port;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.llm.api_key.is_empty() && self.llm.provider != LlmProvider::Ollama {
            anyhow::bail!("llm.api_key is not set (or OPENAI_API_KEY)");
        }
        if self.reddit.thread_url.is_empty() {
            anyhow::bail!("reddit.thread_url is not set (or REDDIT_THREAD_URL)");
        }
        if self.browser.max_sessions == 0 {
            anyhow::bail!("browser.max_sessions must be at least 1");
        }
        if self.affiliate.fallback_url.is_empty() {
            anyhow::bail!("affiliate.fallback_url must not be empty");
        }
        Ok(())
    }
}
