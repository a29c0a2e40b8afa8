//! Handle to a connected upstream client.

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use vibium::{Error, Result};

/// Cheap, cloneable handle to one connected client.
///
/// Frames pushed through `send` are written to the client's socket by its
/// writer task, in order. `close` asks the connection to shut down; the
/// server side observes it through the shutdown token.
#[derive(Clone)]
pub struct ClientHandle {
    id: u64,
    tx: mpsc::UnboundedSender<String>,
    shutdown: CancellationToken,
}

impl ClientHandle {
    pub fn new(id: u64, tx: mpsc::UnboundedSender<String>) -> Self {
        Self {
            id,
            tx,
            shutdown: CancellationToken::new(),
        }
    }

    /// Process-unique id assigned at accept time.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Queue a frame for delivery to the client.
    pub fn send(&self, frame: String) -> Result<()> {
        if self.shutdown.is_cancelled() {
            return Err(Error::TransportClosed);
        }
        self.tx.send(frame).map_err(|_| Error::TransportClosed)
    }

    /// Ask the connection to close. Idempotent.
    pub fn close(&self) {
        self.shutdown.cancel();
    }

    /// Token the connection tasks watch for `close`.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_delivers_until_closed() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let client = ClientHandle::new(7, tx);
        client.send("hello".into()).unwrap();
        assert_eq!(rx.recv().await.unwrap(), "hello");

        client.close();
        client.close();
        assert!(matches!(
            client.send("late".into()),
            Err(Error::TransportClosed)
        ));
    }
}
