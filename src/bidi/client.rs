//! Request/response BiDi client for direct (out-of-proxy) connections.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use super::protocol::{command_frame, frame_id, into_result};
use super::Bidi;
use crate::transport::Transport;
use crate::{Error, Result};

/// Thin synchronous-style client: one command in flight at a time.
///
/// `call` writes a command and reads frames until the matching response
/// arrives; frames with other ids (and events) received in between are
/// discarded. Not meant for concurrent use; the proxy session has its own
/// multiplexing for that.
pub struct BidiClient {
    transport: Arc<dyn Transport>,
    next_id: AtomicU64,
}

/// Result of `session.status`.
#[derive(Debug, Deserialize)]
pub struct SessionStatus {
    pub ready: bool,
    pub message: String,
}

impl BidiClient {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            next_id: AtomicU64::new(1),
        }
    }

    /// Send a command and wait for its response.
    pub async fn call(&self, method: &str, params: Value) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let frame = command_frame(id, method, &params);
        debug!(id, method, "sending command");
        self.transport.send(&frame).await?;

        loop {
            let text = self.transport.receive().await?;
            let value: Value = match serde_json::from_str(&text) {
                Ok(v) => v,
                Err(e) => {
                    warn!(error = %e, "discarding unparseable frame");
                    continue;
                }
            };
            match frame_id(&value) {
                Some(got) if got == id => return into_result(value),
                Some(other) => debug!(id = other, "discarding stale response"),
                None => debug!("discarding event while awaiting response"),
            }
        }
    }

    /// `session.status`: readiness of the remote end.
    pub async fn session_status(&self) -> Result<SessionStatus> {
        let result = self.call("session.status", Value::Object(Default::default())).await?;
        serde_json::from_value(result)
            .map_err(|e| Error::Protocol(format!("unexpected session.status result: {e}")))
    }
}

#[async_trait]
impl Bidi for BidiClient {
    async fn call(&self, method: &str, params: Value) -> Result<Value> {
        BidiClient::call(self, method, params).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::pair;
    use serde_json::json;

    #[tokio::test]
    async fn call_correlates_by_id_and_skips_noise() {
        let (ours, theirs) = pair();
        let client = BidiClient::new(Arc::new(ours));

        let server = tokio::spawn(async move {
            let frame = theirs.receive().await.unwrap();
            let cmd: Value = serde_json::from_str(&frame).unwrap();
            assert_eq!(cmd["method"], "session.status");
            let id = cmd["id"].as_u64().unwrap();
            // An event and a stale response land first; both must be skipped.
            theirs
                .send(&json!({"type": "event", "method": "log.entryAdded", "params": {}}).to_string())
                .await
                .unwrap();
            theirs
                .send(&json!({"id": 9999, "type": "success", "result": {}}).to_string())
                .await
                .unwrap();
            theirs
                .send(
                    &json!({
                        "id": id,
                        "type": "success",
                        "result": {"ready": true, "message": "ok"}
                    })
                    .to_string(),
                )
                .await
                .unwrap();
        });

        let status = client.session_status().await.unwrap();
        assert!(status.ready);
        assert_eq!(status.message, "ok");
        server.await.unwrap();
    }

    #[tokio::test]
    async fn call_surfaces_bidi_errors() {
        let (ours, theirs) = pair();
        let client = BidiClient::new(Arc::new(ours));

        tokio::spawn(async move {
            let frame = theirs.receive().await.unwrap();
            let cmd: Value = serde_json::from_str(&frame).unwrap();
            theirs
                .send(
                    &json!({
                        "id": cmd["id"],
                        "type": "error",
                        "error": {"error": "unknown command", "message": "nope"}
                    })
                    .to_string(),
                )
                .await
                .unwrap();
        });

        match client.call("bogus.method", json!({})).await {
            Err(Error::Bidi { error, .. }) => assert_eq!(error, "unknown command"),
            other => panic!("expected Bidi error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn call_ids_are_monotonic_from_one() {
        let (ours, theirs) = pair();
        let client = BidiClient::new(Arc::new(ours));

        let server = tokio::spawn(async move {
            for expected in 1u64..=2 {
                let frame = theirs.receive().await.unwrap();
                let cmd: Value = serde_json::from_str(&frame).unwrap();
                assert_eq!(cmd["id"].as_u64(), Some(expected));
                theirs
                    .send(&json!({"id": expected, "type": "success", "result": {}}).to_string())
                    .await
                    .unwrap();
            }
        });

        client.call("session.status", json!({})).await.unwrap();
        client.call("session.status", json!({})).await.unwrap();
        server.await.unwrap();
    }
}
