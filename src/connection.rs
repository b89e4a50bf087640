//! Connection layer: state machine, negotiate + redirect, transport
//! lifecycle, message forwarding. Ported from `connection_impl.cpp`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::cancel::CancellationToken;
use crate::codec::TransferFormat;
use crate::error::{SignalRError, TransportError};
use crate::http::NegotiateHttpClient;
use crate::negotiate;
use crate::state::{ConnectionState, StateCell};
use crate::transport::{Transport, TransportEvent};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

pub struct Connection {
    state: StateCell,
    transport: Transport,
    connection_id: tokio::sync::RwLock<String>,
    http_client: Arc<dyn NegotiateHttpClient>,
    skip_negotiation: bool,
    cancel: CancellationToken,
}

impl Connection {
    pub fn new(http_client: Arc<dyn NegotiateHttpClient>, skip_negotiation: bool) -> Self {
        Self {
            state: StateCell::new(ConnectionState::Disconnected),
            transport: Transport::new(),
            connection_id: tokio::sync::RwLock::new(String::new()),
            http_client,
            skip_negotiation,
            cancel: CancellationToken::new(),
        }
    }

    pub fn get_connection_state(&self) -> ConnectionState {
        self.state.get()
    }

    /// Returns the empty string while connecting, matching the original
    /// (the connection id isn't meaningful until negotiate completes).
    pub async fn get_connection_id(&self) -> String {
        if self.state.get() == ConnectionState::Connecting {
            return String::new();
        }
        self.connection_id.read().await.clone()
    }

    /// Negotiates (unless `skip_negotiation`), connects the WebSocket
    /// transport, and returns the event stream the hub layer dispatches
    /// from. Enforces the connect watchdog and the `Disconnected ->
    /// Connecting -> Connected` (or back to `Disconnected` on failure)
    /// transitions.
    ///
    /// A concurrent `stop()` call observed while this is still `Connecting`
    /// cancels the attempt: this returns [`SignalRError::Cancelled`] and the
    /// state lands back in `Disconnected`.
    pub async fn start(
        &self,
        base_url: &str,
        headers: &mut HashMap<String, String>,
    ) -> Result<mpsc::UnboundedReceiver<TransportEvent>, SignalRError> {
        if !self.state.try_transition(ConnectionState::Disconnected, ConnectionState::Connecting) {
            return Err(crate::error::ConfigurationError::NotDisconnected.into());
        }
        *self.connection_id.write().await = String::new();
        self.cancel.reset();

        let result = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(SignalRError::Cancelled),
            r = self.start_inner(base_url, headers) => r,
        };

        match result {
            Ok(rx) => {
                if self.state.try_transition(ConnectionState::Connecting, ConnectionState::Connected) {
                    Ok(rx)
                } else {
                    // `stop()` raced us and already forced `Disconnected`
                    // (or is in flight) before we could land on `Connected`.
                    // Tear down what we just built and report cancellation.
                    self.transport.stop().await;
                    self.state.force(ConnectionState::Disconnected);
                    Err(SignalRError::Cancelled)
                }
            }
            Err(e) => {
                self.state
                    .try_transition(ConnectionState::Connecting, ConnectionState::Disconnected);
                Err(e)
            }
        }
    }

    async fn start_inner(
        &self,
        base_url: &str,
        headers: &mut HashMap<String, String>,
    ) -> Result<mpsc::UnboundedReceiver<TransportEvent>, SignalRError> {
        let connect_url = if self.skip_negotiation {
            base_url.to_string()
        } else {
            let (final_base, response) = negotiate::negotiate(&self.http_client, base_url, headers).await?;
            *self.connection_id.write().await = response.connection_id;
            negotiate::build_connect_url(&final_base, &response.connection_token)
        };

        let connect = self.transport.start(&connect_url, headers);
        tokio::time::timeout(CONNECT_TIMEOUT, connect)
            .await
            .map_err(|_| SignalRError::Transport(TransportError::ConnectTimeout))?
            .map_err(SignalRError::Transport)
    }

    pub async fn send(&self, payload: Vec<u8>, format: TransferFormat) -> Result<(), SignalRError> {
        let state = self.state.get();
        if state != ConnectionState::Connected {
            return Err(TransportError::NotConnected(state.to_string()).into());
        }
        self.transport.send(payload, format).await.map_err(Into::into)
    }

    /// No-op if already `Disconnected`. Stopping a connection that is still
    /// `Connecting` cancels the in-flight `start()` attempt instead of
    /// racing it for the transport.
    pub async fn stop(&self) {
        loop {
            match self.state.get() {
                ConnectionState::Disconnected => return,
                ConnectionState::Disconnecting => return,
                ConnectionState::Connecting => {
                    self.cancel.cancel();
                    // Give the in-flight `start()` a chance to observe the
                    // cancellation. If it wins the connect race instead, the
                    // state moves to `Connected` and the next iteration
                    // falls through to the ordinary stop path below.
                    tokio::time::sleep(crate::timer::TICK_INTERVAL).await;
                }
                ConnectionState::Connected => {
                    self.state
                        .try_transition(ConnectionState::Connected, ConnectionState::Disconnecting);
                    self.transport.stop().await;
                    self.state.force(ConnectionState::Disconnected);
                    return;
                }
            }
        }
    }
}
