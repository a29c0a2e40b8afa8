//! Browser launch via chromedriver.
//!
//! Spawns chromedriver on a free port, waits for its status endpoint, then
//! creates a WebDriver session with `webSocketUrl: true` to obtain the BiDi
//! WebSocket endpoint the rest of the crate talks to.

use std::process::Stdio;
use std::time::Duration;

use serde_json::{json, Value};
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::process::{Child, Command};
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use super::paths;
use crate::{Error, Result};

/// How long to wait for chromedriver's status endpoint to come up.
const DRIVER_READY_TIMEOUT: Duration = Duration::from_secs(10);
const DRIVER_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Launch configuration.
#[derive(Debug, Clone)]
pub struct LaunchOptions {
    pub headless: bool,
}

impl Default for LaunchOptions {
    fn default() -> Self {
        Self { headless: true }
    }
}

/// A running chromedriver-managed browser.
///
/// Dropping the handle kills chromedriver; `close` also deletes the
/// WebDriver session first so the browser shuts down cleanly.
pub struct LaunchedBrowser {
    child: Child,
    http: reqwest::Client,
    port: u16,
    session_id: String,
    websocket_url: String,
    // Held for its Drop: the browser profile lives here.
    _user_data_dir: TempDir,
}

impl LaunchedBrowser {
    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// BiDi WebSocket endpoint for this session.
    pub fn websocket_url(&self) -> &str {
        &self.websocket_url
    }

    /// Tear the browser down: delete the WebDriver session (best effort),
    /// then kill chromedriver.
    pub async fn close(&mut self) {
        let url = format!(
            "http://127.0.0.1:{}/session/{}",
            self.port, self.session_id
        );
        if let Err(e) = self.http.delete(&url).send().await {
            debug!(error = %e, "session delete failed during teardown");
        }
        if let Err(e) = self.child.kill().await {
            warn!(error = %e, "failed to kill chromedriver");
        }
    }
}

/// Launch a browser and return its handle.
pub async fn launch(options: LaunchOptions) -> Result<LaunchedBrowser> {
    let driver_path = paths::chromedriver_path()
        .map_err(|e| Error::Launch(format!("{e}; run 'vibium install'")))?;
    let chrome_path = paths::chrome_executable()
        .map_err(|e| Error::Launch(format!("{e}; run 'vibium install'")))?;

    let port = free_port().await?;
    let child = Command::new(&driver_path)
        .arg(format!("--port={port}"))
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| Error::Launch(format!("failed to start chromedriver: {e}")))?;

    let http = reqwest::Client::new();
    let base = format!("http://127.0.0.1:{port}");
    wait_for_driver(&http, &base).await?;
    debug!(port, "chromedriver ready");

    let user_data_dir = tempfile::Builder::new()
        .prefix("vibium-")
        .tempdir()
        .map_err(|e| Error::Launch(format!("failed to create profile dir: {e}")))?;

    let mut args = vec![
        "--no-sandbox".to_string(),
        "--disable-dev-shm-usage".to_string(),
        format!("--user-data-dir={}", user_data_dir.path().display()),
    ];
    if options.headless {
        args.push("--headless=new".to_string());
        args.push("--disable-gpu".to_string());
    }

    let capabilities = json!({
        "capabilities": {
            "alwaysMatch": {
                "goog:chromeOptions": {
                    "binary": chrome_path.to_string_lossy(),
                    "args": args,
                },
                "webSocketUrl": true,
            },
        },
    });

    let response: Value = http
        .post(format!("{base}/session"))
        .json(&capabilities)
        .send()
        .await
        .map_err(|e| Error::Launch(format!("failed to create session: {e}")))?
        .json()
        .await
        .map_err(|e| Error::Launch(format!("bad session response: {e}")))?;

    let value = response
        .get("value")
        .ok_or_else(|| Error::Launch(format!("unexpected session response: {response}")))?;
    if let Some(err) = value.get("error").and_then(Value::as_str) {
        let message = value
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or_default();
        return Err(Error::Launch(format!("session rejected: {err}: {message}")));
    }

    let session_id = value
        .get("sessionId")
        .and_then(Value::as_str)
        .ok_or_else(|| Error::Launch("session response without sessionId".to_string()))?
        .to_string();
    let websocket_url = value
        .pointer("/capabilities/webSocketUrl")
        .and_then(Value::as_str)
        .ok_or_else(|| {
            Error::Launch("driver did not return a BiDi webSocketUrl capability".to_string())
        })?
        .to_string();

    info!(port, session_id = %session_id, "browser launched");

    Ok(LaunchedBrowser {
        child,
        http,
        port,
        session_id,
        websocket_url,
        _user_data_dir: user_data_dir,
    })
}

/// Bind port 0 to let the OS pick a free port, then release it.
async fn free_port() -> Result<u16> {
    let listener = TcpListener::bind(("127.0.0.1", 0))
        .await
        .map_err(|e| Error::Launch(format!("no free port: {e}")))?;
    let port = listener
        .local_addr()
        .map_err(|e| Error::Launch(format!("no free port: {e}")))?
        .port();
    Ok(port)
}

/// Poll the driver's `/status` endpoint until it reports ready.
async fn wait_for_driver(http: &reqwest::Client, base: &str) -> Result<()> {
    let deadline = Instant::now() + DRIVER_READY_TIMEOUT;
    let url = format!("{base}/status");
    loop {
        if let Ok(response) = http.get(&url).send().await {
            if let Ok(body) = response.json::<Value>().await {
                if body.pointer("/value/ready").and_then(Value::as_bool) == Some(true) {
                    return Ok(());
                }
            }
        }
        if Instant::now() > deadline {
            return Err(Error::Launch(
                "chromedriver did not become ready".to_string(),
            ));
        }
        sleep(DRIVER_POLL_INTERVAL).await;
    }
}
