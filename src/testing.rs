//! Shared fakes and helpers for unit tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use axum::Router;
use tokio::net::TcpListener;

use crate::affiliate::{LinkRecord, LinkSearch};
use crate::llm::{ChatMessage, ChatModel, FunctionCall, MessageContent, ToolCall, ToolDefinition};
use crate::poster::browser::{Browser, BrowserLauncher, BrowserPage};

/// Serve `app` on an ephemeral localhost port and return its base URL.
pub async fn spawn_stub(app: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

// ── Language model ─────────────────────────────────────────────────────────────

pub fn tool_call_reply(name: &str, arguments: &str) -> ChatMessage {
    ChatMessage {
        role: "assistant".to_string(),
        content: None,
        tool_calls: Some(vec![ToolCall {
            id: "call_1".to_string(),
            call_type: "function".to_string(),
            function: FunctionCall {
                name: name.to_string(),
                arguments: arguments.to_string(),
            },
        }]),
    }
}

pub fn text_reply(text: &str) -> ChatMessage {
    ChatMessage {
        role: "assistant".to_string(),
        content: Some(MessageContent::Text(text.to_string())),
        tool_calls: None,
    }
}

/// Recorded request: the messages sent and the tool names offered.
pub type ModelCall = (Vec<ChatMessage>, Vec<String>);

/// Answers each chat call with the next scripted reply.
#[derive(Clone, Default)]
pub struct ScriptedModel {
    replies: Arc<Mutex<VecDeque<Result<ChatMessage, String>>>>,
    calls: Arc<Mutex<Vec<ModelCall>>>,
}

impl ScriptedModel {
    pub fn new(replies: Vec<Result<ChatMessage, String>>) -> Self {
        Self {
            replies: Arc::new(Mutex::new(replies.into())),
            calls: Arc::default(),
        }
    }

    pub fn calls(&self) -> Vec<ModelCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatModel for ScriptedModel {
    async fn chat(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
    ) -> Result<ChatMessage> {
        self.calls.lock().unwrap().push((
            messages.to_vec(),
            tools.iter().map(|t| t.function.name.clone()).collect(),
        ));
        match self.replies.lock().unwrap().pop_front() {
            Some(Ok(reply)) => Ok(reply),
            Some(Err(message)) => Err(anyhow::anyhow!(message)),
            None => Err(anyhow::anyhow!("no scripted reply left")),
        }
    }
}

// ── Link search ────────────────────────────────────────────────────────────────

/// Fixed search result; records each query.
#[derive(Clone)]
pub struct StaticLinks {
    result: Result<Vec<String>, String>,
    queries: Arc<Mutex<Vec<String>>>,
}

impl StaticLinks {
    pub fn found(urls: &[&str]) -> Self {
        Self {
            result: Ok(urls.iter().map(|u| u.to_string()).collect()),
            queries: Arc::default(),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            result: Err(message.to_string()),
            queries: Arc::default(),
        }
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl LinkSearch for StaticLinks {
    async fn search(&self, query: &str) -> Result<Vec<LinkRecord>> {
        self.queries.lock().unwrap().push(query.to_string());
        match &self.result {
            Ok(urls) => Ok(urls
                .iter()
                .map(|u| LinkRecord {
                    short_url: Some(u.clone()),
                })
                .collect()),
            Err(message) => Err(anyhow::anyhow!(message.clone())),
        }
    }
}

// ── Browser ────────────────────────────────────────────────────────────────────

/// Ordered record of every browser operation, e.g. `fill #loginUsername=bot`.
#[derive(Clone, Default)]
pub struct FakeBrowserLog {
    events: Arc<Mutex<Vec<String>>>,
}

impl FakeBrowserLog {
    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    /// Number of events starting with `prefix`.
    pub fn count(&self, prefix: &str) -> usize {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.starts_with(prefix))
            .count()
    }
}

/// Liveness flags of every browser a [`FakeLauncher`] started.
#[derive(Clone, Default)]
pub struct FakeProcesses {
    alive: Arc<Mutex<Vec<Arc<AtomicBool>>>>,
}

impl FakeProcesses {
    fn spawn(&self) -> Arc<AtomicBool> {
        let alive = Arc::new(AtomicBool::new(true));
        self.alive.lock().unwrap().push(alive.clone());
        alive
    }

    /// Every browser launched so far reports disconnected from now on.
    pub fn kill_all(&self) {
        for alive in self.alive.lock().unwrap().iter() {
            alive.store(false, Ordering::SeqCst);
        }
    }
}

#[derive(Clone)]
struct Plan {
    log: FakeBrowserLog,
    fail: Option<(String, String)>,
    // Taken by the first matching step, which then never completes
    hang: Arc<Mutex<Option<String>>>,
}

impl Plan {
    fn failure_for(&self, event: &str) -> Option<String> {
        self.fail
            .as_ref()
            .filter(|(prefix, _)| event.starts_with(prefix.as_str()))
            .map(|(_, message)| message.clone())
    }

    fn takes_hang(&self, event: &str) -> bool {
        let mut hang = self.hang.lock().unwrap();
        match hang.as_deref() {
            Some(prefix) if event.starts_with(prefix) => {
                *hang = None;
                true
            }
            _ => false,
        }
    }

    async fn step(&self, event: String) -> Result<()> {
        let failure = self.failure_for(&event);
        let hangs = self.takes_hang(&event);
        self.log.events.lock().unwrap().push(event);
        if hangs {
            std::future::pending::<()>().await;
        }
        match failure {
            Some(message) => Err(anyhow::anyhow!(message)),
            None => Ok(()),
        }
    }
}

/// Launches browsers that log operations and fail on one chosen step.
pub struct FakeLauncher {
    plan: Plan,
    launches: Arc<AtomicUsize>,
    processes: FakeProcesses,
}

impl FakeLauncher {
    pub fn new(log: FakeBrowserLog) -> Self {
        Self {
            plan: Plan {
                log,
                fail: None,
                hang: Arc::default(),
            },
            launches: Arc::default(),
            processes: FakeProcesses::default(),
        }
    }

    /// The first operation whose event starts with `prefix` never returns.
    pub fn hang_on(self, prefix: &str) -> Self {
        *self.plan.hang.lock().unwrap() = Some(prefix.to_string());
        self
    }

    pub fn processes(&self) -> FakeProcesses {
        self.processes.clone()
    }

    /// Fail every operation whose event starts with `prefix`
    /// (`launch`, `new_page`, `goto ...`, `fill ...`, `click ...`,
    /// `wait ...`, `close`).
    pub fn fail_on(mut self, prefix: &str, message: &str) -> Self {
        self.plan.fail = Some((prefix.to_string(), message.to_string()));
        self
    }

    pub fn launches(&self) -> Arc<AtomicUsize> {
        self.launches.clone()
    }
}

#[async_trait]
impl BrowserLauncher for FakeLauncher {
    async fn launch(&self) -> Result<Box<dyn Browser>> {
        if let Some(message) = self.plan.failure_for("launch") {
            anyhow::bail!(message);
        }
        self.launches.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeBrowser {
            plan: self.plan.clone(),
            alive: self.processes.spawn(),
        }))
    }
}

struct FakeBrowser {
    plan: Plan,
    alive: Arc<AtomicBool>,
}

impl Drop for FakeBrowser {
    fn drop(&mut self) {
        self.plan
            .log
            .events
            .lock()
            .unwrap()
            .push("browser dropped".to_string());
    }
}

#[async_trait]
impl Browser for FakeBrowser {
    async fn new_page(&self) -> Result<Box<dyn BrowserPage>> {
        self.plan.step("new_page".to_string()).await?;
        Ok(Box::new(FakePage {
            plan: self.plan.clone(),
        }))
    }

    fn is_connected(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }
}

struct FakePage {
    plan: Plan,
}

#[async_trait]
impl BrowserPage for FakePage {
    async fn goto(&mut self, url: &str) -> Result<()> {
        self.plan.step(format!("goto {}", url)).await
    }

    async fn fill(&mut self, selector: &str, value: &str) -> Result<()> {
        self.plan.step(format!("fill {}={}", selector, value)).await
    }

    async fn click(&mut self, selector: &str) -> Result<()> {
        self.plan.step(format!("click {}", selector)).await
    }

    async fn wait_for_selector(&mut self, selector: &str, timeout: Duration) -> Result<()> {
        self.plan
            .step(format!("wait {} {}ms", selector, timeout.as_millis()))
            .await
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.plan.step("close".to_string()).await
    }
}
