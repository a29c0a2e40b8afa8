//! One browser session per connected client.
//!
//! The session owns the downstream BiDi transport and the pump task that
//! reads it. Internally-issued commands use ids from 1,000,000 up; the pump
//! delivers matching responses to their waiters and forwards everything
//! else, including all id-less event frames, to the client untouched.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{oneshot, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use vibium::bidi::{self, Bidi};
use vibium::browser::LaunchedBrowser;
use vibium::transport::Transport;
use vibium::{Error, Result};

use crate::client::ClientHandle;

/// First id used for proxy-originated commands. Clients are expected to
/// stay below this.
pub const INTERNAL_ID_BASE: u64 = 1_000_000;

/// Absolute cap on any single internal command. Hitting it means something
/// downstream is badly stuck; the session itself stays up.
pub const INTERNAL_COMMAND_TIMEOUT: Duration = Duration::from_secs(60);

pub struct Session {
    client: ClientHandle,
    transport: Arc<dyn Transport>,
    browser: Mutex<Option<LaunchedBrowser>>,
    pending: StdMutex<HashMap<u64, oneshot::Sender<Value>>>,
    next_internal_id: AtomicU64,
    closed: AtomicBool,
    stop: CancellationToken,
}

impl Session {
    pub fn new(client: ClientHandle, transport: Arc<dyn Transport>) -> Arc<Self> {
        Arc::new(Self {
            client,
            transport,
            browser: Mutex::new(None),
            pending: StdMutex::new(HashMap::new()),
            next_internal_id: AtomicU64::new(INTERNAL_ID_BASE),
            closed: AtomicBool::new(false),
            stop: CancellationToken::new(),
        })
    }

    pub fn client(&self) -> &ClientHandle {
        &self.client
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Hand the session the browser it must tear down on close.
    pub async fn attach_browser(&self, browser: LaunchedBrowser) {
        *self.browser.lock().await = Some(browser);
    }

    /// Start the downstream reader pump. The pump is the only reader of the
    /// downstream transport.
    pub fn spawn_pump(self: Arc<Self>) {
        tokio::spawn(async move { self.pump().await });
    }

    async fn pump(&self) {
        loop {
            let frame = tokio::select! {
                _ = self.stop.cancelled() => break,
                frame = self.transport.receive() => frame,
            };
            match frame {
                Ok(text) => self.route_downstream(text),
                Err(err) => {
                    if !self.is_closed() {
                        warn!(
                            client = self.client.id(),
                            error = %err,
                            "browser connection closed"
                        );
                        // Browser died; take the client down with it.
                        self.client.close();
                    }
                    break;
                }
            }
        }
    }

    /// Classify one downstream frame: a response to an internal command goes
    /// to its waiter and nowhere else; everything else is forwarded verbatim.
    fn route_downstream(&self, text: String) {
        let value: Value = match serde_json::from_str(&text) {
            Ok(v) => v,
            Err(e) => {
                warn!(
                    client = self.client.id(),
                    error = %e,
                    "dropping unparseable downstream frame"
                );
                return;
            }
        };

        if let Some(id) = bidi::frame_id(&value) {
            let waiter = self.pending.lock().unwrap().remove(&id);
            if let Some(tx) = waiter {
                let _ = tx.send(value);
                return;
            }
        }

        if self.is_closed() {
            return;
        }
        if self.client.send(text).is_err() {
            debug!(client = self.client.id(), "client gone, dropping frame");
        }
    }

    /// Forward a client frame to the browser unchanged.
    pub async fn forward_to_browser(&self, frame: &str) {
        if self.is_closed() {
            return;
        }
        if let Err(e) = self.transport.send(frame).await {
            warn!(
                client = self.client.id(),
                error = %e,
                "failed to forward frame to browser"
            );
        }
    }

    /// Issue a BiDi command on the shared downstream socket and wait for its
    /// response.
    pub async fn send_internal_command(&self, method: &str, params: Value) -> Result<Value> {
        if self.is_closed() {
            return Err(Error::SessionClosed);
        }

        let id = self.next_internal_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().unwrap().insert(id, tx);

        let frame = bidi::command_frame(id, method, &params);
        if let Err(err) = self.transport.send(&frame).await {
            self.pending.lock().unwrap().remove(&id);
            return Err(err);
        }

        let outcome = tokio::select! {
            _ = self.stop.cancelled() => Err(Error::SessionClosed),
            received = tokio::time::timeout(INTERNAL_COMMAND_TIMEOUT, rx) => match received {
                Ok(Ok(frame)) => bidi::into_result(frame),
                Ok(Err(_)) => Err(Error::SessionClosed),
                Err(_) => Err(Error::CommandTimeout(method.to_string())),
            },
        };
        self.pending.lock().unwrap().remove(&id);
        outcome
    }

    /// Tear the session down. Idempotent; releases every pending internal
    /// waiter and closes transport and browser.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        info!(client = self.client.id(), "closing browser session");

        self.stop.cancel();
        self.transport.close().await;
        if let Some(mut browser) = self.browser.lock().await.take() {
            browser.close().await;
        }
        // Dropping the senders unblocks any waiter the stop signal missed.
        self.pending.lock().unwrap().clear();
    }
}

#[async_trait]
impl Bidi for Session {
    async fn call(&self, method: &str, params: Value) -> Result<Value> {
        self.send_internal_command(method, params).await
    }
}
