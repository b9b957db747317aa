use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info};

use crate::config::BrowserConfig;

// Embedded at compile time so the binary has no runtime file dependency.
const BRIDGE_SCRIPT: &str = include_str!("../../scripts/playwright-bridge.js");

/// One isolated tab (own cookie jar) inside a browser.
#[async_trait]
pub trait BrowserPage: Send {
    async fn goto(&mut self, url: &str) -> Result<()>;
    async fn fill(&mut self, selector: &str, value: &str) -> Result<()>;
    async fn click(&mut self, selector: &str) -> Result<()>;
    async fn wait_for_selector(&mut self, selector: &str, timeout: Duration) -> Result<()>;
    async fn close(self: Box<Self>) -> Result<()>;
}

#[async_trait]
pub trait Browser: Send + Sync {
    async fn new_page(&self) -> Result<Box<dyn BrowserPage>>;
    /// False once the underlying process has gone away.
    fn is_connected(&self) -> bool;
    async fn shutdown(&self) -> Result<()>;
}

#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self) -> Result<Box<dyn Browser>>;
}

type BridgeWriter = Box<dyn AsyncWrite + Send + Unpin>;
type BridgeReader = Box<dyn AsyncRead + Send + Unpin>;
type Responses = mpsc::UnboundedReceiver<Result<BridgeResponse>>;

struct BridgeIo {
    writer: BridgeWriter,
    responses: Responses,
}

#[derive(Debug, Deserialize)]
struct BridgeResponse {
    id: Option<u64>,
    ok: bool,
    #[serde(default)]
    result: Value,
    #[serde(default)]
    error: Option<String>,
}

/// JSON-lines channel to the Playwright script.
struct Bridge {
    /// Mutex serializes requests; the script handles one at a time.
    io: Mutex<BridgeIo>,
    next_id: AtomicU64,
    /// Cleared by the reader task when the script's stdout closes.
    connected: Arc<AtomicBool>,
    // Held so the node process dies with the bridge (kill_on_drop)
    _child: Option<Child>,
}

impl Bridge {
    /// Must be called inside a tokio runtime; spawns the stdout reader.
    fn new(writer: BridgeWriter, reader: BridgeReader, child: Option<Child>) -> Self {
        let connected = Arc::new(AtomicBool::new(true));
        let (tx, responses) = mpsc::unbounded_channel();
        tokio::spawn(read_responses(reader, tx, connected.clone()));

        Self {
            io: Mutex::new(BridgeIo { writer, responses }),
            next_id: AtomicU64::new(1),
            connected,
            _child: child,
        }
    }

    /// The script emits id 0 once Chromium is up, or the launch error.
    async fn wait_ready(&self) -> Result<()> {
        let mut io = self.io.lock().await;
        let ready = next_response(&mut io.responses).await?;
        if ready.id != Some(0) {
            anyhow::bail!("Unexpected first message from Playwright bridge: {:?}", ready);
        }
        if !ready.ok {
            anyhow::bail!(
                "Browser launch failed: {}",
                ready.error.unwrap_or_default()
            );
        }
        Ok(())
    }

    async fn call(&self, op: &str, args: Value) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        let mut request = args;
        if let Value::Object(map) = &mut request {
            map.insert("id".to_string(), json!(id));
            map.insert("op".to_string(), json!(op));
        }
        let mut line = serde_json::to_string(&request)?;
        line.push('\n');

        let mut io = self.io.lock().await;

        let written = async {
            io.writer.write_all(line.as_bytes()).await?;
            io.writer.flush().await
        }
        .await;
        if let Err(e) = written {
            self.connected.store(false, Ordering::Relaxed);
            return Err(e).context("Failed to write to Playwright bridge");
        }

        loop {
            let response = match next_response(&mut io.responses).await {
                Ok(r) => r,
                Err(e) => {
                    self.connected.store(false, Ordering::Relaxed);
                    return Err(e);
                }
            };

            // Left over from a request whose caller went away
            if response.id != Some(id) {
                debug!("Skipping stale bridge response {:?}", response.id);
                continue;
            }

            if response.ok {
                return Ok(response.result);
            }
            anyhow::bail!(
                "{}",
                response
                    .error
                    .unwrap_or_else(|| format!("Browser operation '{}' failed", op))
            );
        }
    }
}

/// Forwards each line from the script; clears `connected` once its stdout
/// closes, busy or idle.
async fn read_responses(
    reader: BridgeReader,
    tx: mpsc::UnboundedSender<Result<BridgeResponse>>,
    connected: Arc<AtomicBool>,
) {
    let mut lines = BufReader::new(reader).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let parsed = serde_json::from_str(&line)
                    .with_context(|| format!("Invalid bridge response: {}", line));
                if tx.send(parsed).is_err() {
                    break;
                }
            }
            Ok(None) => break,
            Err(e) => {
                let _ = tx.send(Err::<BridgeResponse, _>(e).context("Failed to read from Playwright bridge"));
                break;
            }
        }
    }
    connected.store(false, Ordering::Relaxed);
    debug!("Playwright bridge output closed");
}

async fn next_response(responses: &mut Responses) -> Result<BridgeResponse> {
    responses.recv().await.context("Playwright bridge exited")?
}

pub struct PlaywrightBrowser {
    bridge: Arc<Bridge>,
}

#[async_trait]
impl Browser for PlaywrightBrowser {
    async fn new_page(&self) -> Result<Box<dyn BrowserPage>> {
        let result = self.bridge.call("newPage", json!({})).await?;
        let page = result["page"]
            .as_u64()
            .context("Playwright bridge returned no page id")?;
        Ok(Box::new(PlaywrightPage {
            bridge: self.bridge.clone(),
            page,
        }))
    }

    fn is_connected(&self) -> bool {
        self.bridge.connected.load(Ordering::Relaxed)
    }

    async fn shutdown(&self) -> Result<()> {
        self.bridge.call("shutdown", json!({})).await?;
        self.bridge.connected.store(false, Ordering::Relaxed);
        Ok(())
    }
}

struct PlaywrightPage {
    bridge: Arc<Bridge>,
    page: u64,
}

#[async_trait]
impl BrowserPage for PlaywrightPage {
    async fn goto(&mut self, url: &str) -> Result<()> {
        self.bridge
            .call("goto", json!({ "page": self.page, "url": url }))
            .await
            .map(|_| ())
    }

    async fn fill(&mut self, selector: &str, value: &str) -> Result<()> {
        self.bridge
            .call(
                "fill",
                json!({ "page": self.page, "selector": selector, "value": value }),
            )
            .await
            .map(|_| ())
    }

    async fn click(&mut self, selector: &str) -> Result<()> {
        self.bridge
            .call("click", json!({ "page": self.page, "selector": selector }))
            .await
            .map(|_| ())
    }

    async fn wait_for_selector(&mut self, selector: &str, timeout: Duration) -> Result<()> {
        self.bridge
            .call(
                "waitForSelector",
                json!({
                    "page": self.page,
                    "selector": selector,
                    "timeoutMs": u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                }),
            )
            .await
            .map(|_| ())
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.bridge
            .call("closePage", json!({ "page": self.page }))
            .await
            .map(|_| ())
    }
}

/// Starts headless Chromium through `node` + the playwright npm package.
pub struct PlaywrightLauncher {
    node_binary: String,
    headless: bool,
}

impl PlaywrightLauncher {
    pub fn new(config: &BrowserConfig) -> Self {
        Self {
            node_binary: config.node_binary.clone(),
            headless: config.headless,
        }
    }
}

#[async_trait]
impl BrowserLauncher for PlaywrightLauncher {
    async fn launch(&self) -> Result<Box<dyn Browser>> {
        info!(
            "Launching browser via {} (headless: {})",
            self.node_binary, self.headless
        );

        let mut child = Command::new(&self.node_binary)
            .arg("-e")
            .arg(BRIDGE_SCRIPT)
            .env("BRIDGE_HEADLESS", if self.headless { "1" } else { "0" })
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to start Playwright bridge: {}", self.node_binary))?;

        let stdin = child.stdin.take().context("Playwright bridge has no stdin")?;
        let stdout = child.stdout.take().context("Playwright bridge has no stdout")?;

        let bridge = Bridge::new(Box::new(stdin), Box::new(stdout), Some(child));
        bridge.wait_ready().await?;

        Ok(Box::new(PlaywrightBrowser {
            bridge: Arc::new(bridge),
        }))
    }
}
