//! WebSocket server front: accepts clients and feeds the router.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use vibium::Result;

use crate::client::ClientHandle;
use crate::router::Router;

static NEXT_CLIENT_ID: AtomicU64 = AtomicU64::new(1);

/// Accepts WebSocket connections and delivers connect/message/close events
/// to the router. Binds to loopback only: a connected client gets full
/// control of a browser.
pub struct Server {
    listener: TcpListener,
    router: Arc<Router>,
    shutdown: CancellationToken,
}

impl Server {
    /// Bind the listening socket. Port 0 picks a free port.
    pub async fn bind(port: u16, router: Arc<Router>) -> Result<Self> {
        let listener = TcpListener::bind(("127.0.0.1", port)).await?;
        Ok(Self {
            listener,
            router,
            shutdown: CancellationToken::new(),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections until `stop` is called.
    pub async fn run(&self) {
        info!(addr = %self.listener.local_addr().map(|a| a.to_string()).unwrap_or_default(), "proxy listening");
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        debug!(%peer, "inbound connection");
                        let router = Arc::clone(&self.router);
                        tokio::spawn(handle_connection(router, stream));
                    }
                    Err(e) => warn!(error = %e, "accept failed"),
                },
            }
        }
    }

    /// Refuse new connections and drain sessions, waiting up to `deadline`.
    pub async fn stop(&self, deadline: Duration) {
        self.shutdown.cancel();
        if tokio::time::timeout(deadline, self.router.close_all())
            .await
            .is_err()
        {
            warn!("shutdown deadline expired with sessions still draining");
        }
    }
}

async fn handle_connection(router: Arc<Router>, stream: TcpStream) {
    let ws = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            warn!(error = %e, "websocket handshake failed");
            return;
        }
    };

    let client_id = NEXT_CLIENT_ID.fetch_add(1, Ordering::SeqCst);
    let (mut sink, mut source) = ws.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let client = ClientHandle::new(client_id, tx);
    let shutdown = client.shutdown_token();

    // Writer task: the only place that touches the sink, so upstream frames
    // keep their order.
    let writer_shutdown = shutdown.clone();
    let writer = tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = writer_shutdown.cancelled() => {
                    let _ = sink.close().await;
                    break;
                }
                frame = rx.recv() => match frame {
                    Some(text) => {
                        if sink.send(Message::Text(text.into())).await.is_err() {
                            break;
                        }
                    }
                    None => {
                        let _ = sink.close().await;
                        break;
                    }
                },
            }
        }
    });

    info!(client = client_id, "client connected");
    router.on_client_connect(client.clone()).await;

    loop {
        let message = tokio::select! {
            _ = shutdown.cancelled() => break,
            message = source.next() => message,
        };
        match message {
            Some(Ok(Message::Text(text))) => {
                router.on_client_message(client_id, text.to_string()).await;
            }
            Some(Ok(Message::Binary(bytes))) => {
                // BiDi frames are text; tolerate clients that send them as
                // binary.
                if let Ok(text) = String::from_utf8(bytes.to_vec()) {
                    router.on_client_message(client_id, text).await;
                }
            }
            Some(Ok(Message::Close(_))) | None => break,
            Some(Ok(_)) => continue,
            Some(Err(e)) => {
                debug!(client = client_id, error = %e, "client read failed");
                break;
            }
        }
    }

    info!(client = client_id, "client disconnected");
    router.on_client_disconnect(client_id).await;
    client.close();
    let _ = writer.await;
}
