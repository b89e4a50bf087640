//! WebSocket transport: the single-writer receive loop wrapping
//! `tokio-tungstenite`, grounded on `websocket_transport.cpp`.
//!
//! The original's callback-based `on_receive`/`on_close` pair is ported as an
//! `mpsc` channel of [`TransportEvent`]s; this is the same "deliver frames
//! and a terminal close exactly once" contract expressed with Rust channels
//! instead of stored closures.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures_util::{SinkExt, StreamExt};
use tokio::sync::{Mutex, mpsc};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};

use crate::codec::TransferFormat;
use crate::error::TransportError;

pub enum TransportEvent {
    Message(Vec<u8>),
    /// Fires at most once, with the terminal error (or `None` for a clean
    /// stop).
    Closed(Option<TransportError>),
}

type WsStream = tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

pub struct Transport {
    writer: Mutex<Option<futures_util::stream::SplitSink<WsStream, WsMessage>>>,
    disconnected: Arc<AtomicBool>,
    reader_task: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl Default for Transport {
    fn default() -> Self {
        Self {
            writer: Mutex::new(None),
            disconnected: Arc::new(AtomicBool::new(true)),
            reader_task: Mutex::new(None),
        }
    }
}

impl Transport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Connects to `url` and returns a channel of [`TransportEvent`]s. Fails
    /// synchronously with [`TransportError::AlreadyConnected`] if this
    /// transport is already connected. `headers` are attached to the
    /// WebSocket upgrade request, matching the same headers sent to
    /// negotiate.
    pub async fn start(
        &self,
        url: &str,
        headers: &HashMap<String, String>,
    ) -> Result<mpsc::UnboundedReceiver<TransportEvent>, TransportError> {
        if !self.disconnected.swap(false, Ordering::SeqCst) {
            self.disconnected.store(true, Ordering::SeqCst);
            return Err(TransportError::AlreadyConnected);
        }

        let mut request = url
            .into_client_request()
            .map_err(|e| TransportError::Underlying(e.to_string()))?;
        for (name, value) in headers {
            let header_name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| TransportError::Underlying(e.to_string()))?;
            let header_value =
                HeaderValue::from_str(value).map_err(|e| TransportError::Underlying(e.to_string()))?;
            request.headers_mut().insert(header_name, header_value);
        }

        let (ws_stream, _response) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| TransportError::Underlying(e.to_string()))?;

        let (sink, mut stream) = ws_stream.split();
        *self.writer.lock().await = Some(sink);

        let (tx, rx) = mpsc::unbounded_channel();
        let disconnected = self.disconnected.clone();

        let handle = tokio::spawn(async move {
            loop {
                if disconnected.load(Ordering::SeqCst) {
                    return;
                }
                match stream.next().await {
                    Some(Ok(WsMessage::Text(text))) => {
                        if tx.send(TransportEvent::Message(text.as_bytes().to_vec())).is_err() {
                            return;
                        }
                    }
                    Some(Ok(WsMessage::Binary(bin))) => {
                        if tx.send(TransportEvent::Message(bin.to_vec())).is_err() {
                            return;
                        }
                    }
                    Some(Ok(WsMessage::Close(_))) | None => {
                        if !disconnected.swap(true, Ordering::SeqCst) {
                            let _ = tx.send(TransportEvent::Closed(None));
                        }
                        return;
                    }
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        if !disconnected.swap(true, Ordering::SeqCst) {
                            let _ = tx.send(TransportEvent::Closed(Some(TransportError::Underlying(
                                e.to_string(),
                            ))));
                        }
                        return;
                    }
                }
            }
        });

        *self.reader_task.lock().await = Some(handle);
        Ok(rx)
    }

    pub async fn send(&self, payload: Vec<u8>, format: TransferFormat) -> Result<(), TransportError> {
        let mut guard = self.writer.lock().await;
        let sink = guard.as_mut().ok_or(TransportError::NotConnected("disconnected".into()))?;
        let message = match format {
            TransferFormat::Text => WsMessage::Text(String::from_utf8_lossy(&payload).into_owned().into()),
            TransferFormat::Binary => WsMessage::Binary(payload.into()),
        };
        sink.send(message)
            .await
            .map_err(|e| TransportError::Underlying(e.to_string()))
    }

    /// Idempotent: stopping an already-stopped transport is a no-op.
    pub async fn stop(&self) {
        if self.disconnected.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(mut sink) = self.writer.lock().await.take() {
            let _ = sink.close().await;
        }
        if let Some(handle) = self.reader_task.lock().await.take() {
            handle.abort();
        }
    }
}
