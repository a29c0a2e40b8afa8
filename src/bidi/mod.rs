//! WebDriver BiDi wire protocol: framing, correlation, and the client.

mod client;
mod protocol;

pub use client::{BidiClient, SessionStatus};
pub use protocol::{command_frame, frame_id, into_result, WireError, WireResponse};

use async_trait::async_trait;
use serde_json::Value;

use crate::Result;

/// A channel that can execute BiDi commands and return their results.
///
/// Implemented by [`BidiClient`] for direct connections and by the proxy
/// session for commands multiplexed onto a client's downstream socket, so
/// the predicates, waiter, and actions run identically on both paths.
#[async_trait]
pub trait Bidi: Send + Sync {
    /// Send `{id, method, params}` and return the response `result` object.
    async fn call(&self, method: &str, params: Value) -> Result<Value>;
}
