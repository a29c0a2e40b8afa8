//! Frame-oriented duplex text channels.
//!
//! Everything above this layer deals in whole frames, one JSON document per
//! frame. The WebSocket implementation serializes concurrent sends behind a
//! lock; `receive` is single-reader by contract.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex as StdMutex;

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

use crate::{Error, Result};

/// Duplex text channel carrying one frame per message.
///
/// `send` is safe to call from any task. `receive` must only be driven by a
/// single reader. `close` is idempotent and causes in-flight and future
/// operations to fail with [`Error::TransportClosed`].
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, frame: &str) -> Result<()>;
    async fn receive(&self) -> Result<String>;
    async fn close(&self);
}

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;
type WsSource = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// WebSocket transport used for the downstream BiDi connection.
pub struct WsTransport {
    writer: Mutex<WsSink>,
    reader: Mutex<WsSource>,
    closed: AtomicBool,
}

impl WsTransport {
    /// Connect to a WebSocket endpoint.
    pub async fn connect(url: &str) -> Result<Self> {
        let (stream, _) = connect_async(url)
            .await
            .map_err(|e| Error::TransportIo(format!("connect to {url}: {e}")))?;
        let (writer, reader) = stream.split();
        Ok(Self {
            writer: Mutex::new(writer),
            reader: Mutex::new(reader),
            closed: AtomicBool::new(false),
        })
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn send(&self, frame: &str) -> Result<()> {
        if self.closed.load(Ordering::Relaxed) {
            return Err(Error::TransportClosed);
        }
        let mut writer = self.writer.lock().await;
        writer
            .send(Message::Text(frame.to_string().into()))
            .await
            .map_err(map_ws_error)
    }

    async fn receive(&self) -> Result<String> {
        let mut reader = self.reader.lock().await;
        loop {
            if self.closed.load(Ordering::Relaxed) {
                return Err(Error::TransportClosed);
            }
            match reader.next().await {
                Some(Ok(Message::Text(text))) => return Ok(text.to_string()),
                Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes.to_vec()) {
                    Ok(text) => return Ok(text),
                    Err(_) => continue,
                },
                Some(Ok(Message::Close(_))) | None => return Err(Error::TransportClosed),
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(map_ws_error(e)),
            }
        }
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::Relaxed) {
            return;
        }
        let mut writer = self.writer.lock().await;
        let _ = writer.close().await;
    }
}

fn map_ws_error(err: tungstenite::Error) -> Error {
    match err {
        tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => {
            Error::TransportClosed
        }
        other => Error::TransportIo(other.to_string()),
    }
}

/// One end of an in-memory transport pair.
///
/// Useful for loopback wiring and for exercising the proxy without a
/// browser. Frames sent on one end arrive on the other in order.
pub struct PipeTransport {
    tx: StdMutex<Option<mpsc::UnboundedSender<String>>>,
    rx: Mutex<mpsc::UnboundedReceiver<String>>,
    closed: CancellationToken,
}

/// Create a connected pair of in-memory transports.
pub fn pair() -> (PipeTransport, PipeTransport) {
    let (a_tx, b_rx) = mpsc::unbounded_channel();
    let (b_tx, a_rx) = mpsc::unbounded_channel();
    let make = |tx, rx| PipeTransport {
        tx: StdMutex::new(Some(tx)),
        rx: Mutex::new(rx),
        closed: CancellationToken::new(),
    };
    (make(a_tx, a_rx), make(b_tx, b_rx))
}

#[async_trait]
impl Transport for PipeTransport {
    async fn send(&self, frame: &str) -> Result<()> {
        let guard = self.tx.lock().unwrap();
        let tx = guard.as_ref().ok_or(Error::TransportClosed)?;
        tx.send(frame.to_string())
            .map_err(|_| Error::TransportClosed)
    }

    async fn receive(&self) -> Result<String> {
        if self.closed.is_cancelled() {
            return Err(Error::TransportClosed);
        }
        let mut rx = self.rx.lock().await;
        tokio::select! {
            _ = self.closed.cancelled() => Err(Error::TransportClosed),
            frame = rx.recv() => frame.ok_or(Error::TransportClosed),
        }
    }

    async fn close(&self) {
        self.closed.cancel();
        self.tx.lock().unwrap().take();
    }
}
