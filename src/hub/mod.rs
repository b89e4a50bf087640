//! Hub layer: the user-facing contract (`start`, `stop`, `invoke`, `send`,
//! `on`, `get_connection_state`, `get_connection_id`) layered on top of the
//! connection layer. Ported from `hub_connection_impl.cpp`.

pub mod message;
pub mod subscriptions;

use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::time::{Duration, Instant};

use tokio::sync::{Mutex, oneshot};

use crate::codec::HubProtocol;
use crate::config::HubConnectionConfig;
use crate::connection::Connection;
use crate::error::{ConfigurationError, HandshakeError, ProtocolError, SignalRError, TransportError};
use crate::http::NegotiateHttpClient;
use crate::pending::{InvocationError, PendingInvocations};
use crate::state::ConnectionState;
use crate::timer;
use crate::transport::TransportEvent;
use crate::value::Value;

use message::HubMessage;
use subscriptions::{Handler, SubscriptionTable};

const RECORD_SEPARATOR: u8 = 0x1E;

/// Deadlines for the keep-alive discipline, stored as monotonic instants.
struct KeepAliveDeadlines {
    next_send_ping_at: StdMutex<Instant>,
    next_server_timeout_at: StdMutex<Instant>,
}

impl KeepAliveDeadlines {
    fn new(keepalive_interval: Duration, server_timeout: Duration) -> Self {
        let now = Instant::now();
        Self {
            next_send_ping_at: StdMutex::new(now + keepalive_interval),
            next_server_timeout_at: StdMutex::new(now + server_timeout),
        }
    }

    fn reset_send_ping(&self, interval: Duration) {
        *self.next_send_ping_at.lock().unwrap() = Instant::now() + interval;
    }

    fn reset_server_timeout(&self, timeout: Duration) {
        *self.next_server_timeout_at.lock().unwrap() = Instant::now() + timeout;
    }

    fn send_ping_due(&self) -> bool {
        Instant::now() > *self.next_send_ping_at.lock().unwrap()
    }

    fn server_timeout_elapsed(&self) -> bool {
        Instant::now() > *self.next_server_timeout_at.lock().unwrap()
    }
}

type DisconnectedHandler = Box<dyn Fn(Option<String>) + Send + Sync>;

pub struct HubConnection {
    url: String,
    config: HubConnectionConfig,
    protocol: Arc<dyn HubProtocol>,
    connection: Arc<Connection>,
    pending: Arc<PendingInvocations>,
    subscriptions: Arc<SubscriptionTable>,
    disconnected_handler: Arc<Mutex<Option<DisconnectedHandler>>>,
    stop_waiters: StdMutex<Vec<oneshot::Sender<()>>>,
    keepalive_task: Mutex<Option<tokio::task::JoinHandle<()>>>,
    /// Set by the keep-alive loop when it stops the connection on a server
    /// timeout, so the dispatch loop's exit path can report that reason
    /// instead of a bare `None`.
    pending_stop_error: Arc<StdMutex<Option<String>>>,
}

impl HubConnection {
    pub(crate) fn new(
        url: String,
        config: HubConnectionConfig,
        protocol: Arc<dyn HubProtocol>,
        http_client: Arc<dyn NegotiateHttpClient>,
    ) -> Self {
        Self {
            url,
            connection: Arc::new(Connection::new(http_client, config.skip_negotiation)),
            config,
            protocol,
            pending: Arc::new(PendingInvocations::new()),
            subscriptions: Arc::new(SubscriptionTable::new()),
            disconnected_handler: Arc::new(Mutex::new(None)),
            stop_waiters: StdMutex::new(Vec::new()),
            keepalive_task: Mutex::new(None),
            pending_stop_error: Arc::new(StdMutex::new(None)),
        }
    }

    pub fn get_connection_state(&self) -> ConnectionState {
        self.connection.get_connection_state()
    }

    pub async fn get_connection_id(&self) -> String {
        self.connection.get_connection_id().await
    }

    /// Only permitted while `Disconnected`.
    pub async fn set_disconnected<F>(&self, handler: F) -> Result<(), ConfigurationError>
    where
        F: Fn(Option<String>) + Send + Sync + 'static,
    {
        if self.connection.get_connection_state() != ConnectionState::Disconnected {
            return Err(ConfigurationError::MustBeDisconnectedToConfigure);
        }
        *self.disconnected_handler.lock().await = Some(Box::new(handler));
        Ok(())
    }

    /// Registers a handler for `target`. Only permitted while
    /// `Disconnected`; at most one handler per target (case-insensitive).
    pub fn on<F>(&self, target: &str, handler: F) -> Result<(), ConfigurationError>
    where
        F: Fn(Vec<Value>) + Send + Sync + 'static,
    {
        if self.connection.get_connection_state() != ConnectionState::Disconnected {
            return Err(ConfigurationError::MustBeDisconnectedToConfigure);
        }
        self.subscriptions.register(target, Arc::new(handler) as Handler)
    }

    /// Negotiates, connects, performs the hub handshake, and starts the
    /// keep-alive subsystem. Returns once the handshake completes (success
    /// or failure) — equivalent to the original's "start callback fires
    /// exactly once".
    pub async fn start(&self) -> Result<(), SignalRError> {
        let mut headers = self.config.http_headers.clone();
        if let Some(factory) = &self.config.access_token_factory {
            headers.insert("Authorization".to_string(), format!("Bearer {}", factory()));
        }

        let mut events = self.connection.start(&self.url, &mut headers).await?;

        let handshake_payload = build_handshake(self.protocol.name(), self.protocol.version());
        if let Err(e) = self
            .connection
            .send(handshake_payload, self.protocol.transfer_format())
            .await
        {
            self.connection.stop().await;
            return Err(e);
        }

        let handshake_result = tokio::time::timeout(
            self.config.handshake_timeout,
            wait_for_handshake(&mut events, self.protocol.as_ref()),
        )
        .await;

        let leftover = match handshake_result {
            Ok(Ok(leftover)) => leftover,
            Ok(Err(e)) => {
                self.connection.stop().await;
                return Err(e);
            }
            Err(_) => {
                self.connection.stop().await;
                return Err(HandshakeError::Timeout.into());
            }
        };

        let deadlines = Arc::new(KeepAliveDeadlines::new(
            self.config.keepalive_interval,
            self.config.server_timeout,
        ));

        if let Some(messages) = leftover {
            self.dispatch(messages, &deadlines).await;
        }

        self.spawn_keepalive(deadlines.clone());
        self.spawn_dispatch_loop(events, deadlines);

        Ok(())
    }

    fn spawn_keepalive(&self, deadlines: Arc<KeepAliveDeadlines>) {
        let connection = self.connection.clone();
        let protocol = self.protocol.clone();
        let interval = self.config.keepalive_interval;
        let server_timeout = self.config.server_timeout;
        let format = self.protocol.transfer_format();
        let pending_stop_error = self.pending_stop_error.clone();

        let handle = tokio::spawn(async move {
            let ping = protocol.write_message(&HubMessage::Ping);
            timer::periodic(move || {
                if connection.get_connection_state() != ConnectionState::Connected {
                    return true;
                }
                if deadlines.server_timeout_elapsed() {
                    let error = TransportError::ServerTimeout(server_timeout);
                    tracing::warn!(target: "signalr_client_core::hub", "{error}");
                    *pending_stop_error.lock().unwrap() = Some(error.to_string());
                    let connection = connection.clone();
                    tokio::spawn(async move { connection.stop().await });
                    return true;
                }
                if deadlines.send_ping_due() {
                    let connection = connection.clone();
                    let ping = ping.clone();
                    let deadlines = deadlines.clone();
                    tokio::spawn(async move {
                        match connection.send(ping, format).await {
                            Ok(()) => deadlines.reset_send_ping(interval),
                            Err(e) => tracing::warn!(
                                target: "signalr_client_core::hub",
                                "failed to send keep-alive ping: {e}"
                            ),
                        }
                    });
                }
                false
            })
            .await;
        });
        // Intentionally detached from `self`: the loop self-terminates once
        // the connection is no longer `Connected`, mirroring the original's
        // timer self-exit. Stored only so a future `stop()` could cancel it
        // eagerly if ever needed.
        if let Ok(mut guard) = self.keepalive_task.try_lock() {
            *guard = Some(handle);
        }
    }

    fn spawn_dispatch_loop(
        &self,
        mut events: tokio::sync::mpsc::UnboundedReceiver<TransportEvent>,
        deadlines: Arc<KeepAliveDeadlines>,
    ) {
        let protocol = self.protocol.clone();
        let pending = self.pending.clone();
        let subscriptions = self.subscriptions.clone();
        let connection = self.connection.clone();
        let disconnected_handler = self.disconnected_handler.clone();
        let server_timeout = self.config.server_timeout;
        let pending_stop_error = self.pending_stop_error.clone();

        let handle = tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                match event {
                    TransportEvent::Message(bytes) => {
                        deadlines.reset_server_timeout(server_timeout);
                        match protocol.parse_messages(&bytes) {
                            Ok(messages) => {
                                let mut closed_with = None;
                                for message in messages {
                                    if let Err(e) = handle_message(message, &pending, &subscriptions) {
                                        closed_with = Some(e.to_string());
                                        break;
                                    }
                                }
                                if let Some(error) = closed_with {
                                    pending.clear();
                                    connection.stop().await;
                                    fire_disconnected(&disconnected_handler, Some(error)).await;
                                    return;
                                }
                            }
                            Err(e) => {
                                pending.clear();
                                connection.stop().await;
                                fire_disconnected(&disconnected_handler, Some(e.to_string())).await;
                                return;
                            }
                        }
                    }
                    TransportEvent::Closed(error) => {
                        pending.clear();
                        let error = error
                            .map(|e| e.to_string())
                            .or_else(|| pending_stop_error.lock().unwrap().take());
                        fire_disconnected(&disconnected_handler, error).await;
                        return;
                    }
                }
            }
            pending.clear();
            let error = pending_stop_error.lock().unwrap().take();
            fire_disconnected(&disconnected_handler, error).await;
        });
        let _ = handle; // dispatch loop drives itself to completion
    }

    async fn dispatch(&self, messages: Vec<HubMessage>, deadlines: &KeepAliveDeadlines) {
        deadlines.reset_server_timeout(self.config.server_timeout);
        for message in messages {
            let _ = handle_message(message, &self.pending, &self.subscriptions);
        }
    }

    /// `arguments` must already be an array `Value`; callers build it from
    /// typed parameters.
    pub async fn invoke(&self, target: &str, arguments: Vec<Value>) -> Result<Value, SignalRError> {
        let (id, rx) = self.pending.register();
        let message = HubMessage::invocation(Some(id.clone()), target, arguments);
        let payload = self.protocol.write_message(&message);

        if let Err(e) = self.connection.send(payload, self.protocol.transfer_format()).await {
            self.pending.remove(&id);
            return Err(e);
        }

        match rx.await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(InvocationError::Hub(error))) => Err(SignalRError::Hub(error)),
            Ok(Err(InvocationError::Stopped)) => Err(SignalRError::Stopped),
            Err(_) => Err(SignalRError::Stopped),
        }
    }

    /// Fire-and-forget: the callback fires when the transport send
    /// completes, not when the server processes it.
    pub async fn send(&self, target: &str, arguments: Vec<Value>) -> Result<(), SignalRError> {
        let message = HubMessage::invocation(None, target, arguments);
        let payload = self.protocol.write_message(&message);
        self.connection.send(payload, self.protocol.transfer_format()).await
    }

    /// Coalesces concurrent `stop()` callers: only the first initiates the
    /// underlying stop, the rest wait on it.
    pub async fn stop(&self) {
        if self.connection.get_connection_state() == ConnectionState::Disconnected {
            return;
        }
        let (tx, rx) = oneshot::channel();
        let is_first = {
            let mut waiters = self.stop_waiters.lock().unwrap();
            let was_empty = waiters.is_empty();
            waiters.push(tx);
            was_empty
        };

        if is_first {
            self.connection.stop().await;
            let waiters: Vec<_> = std::mem::take(&mut *self.stop_waiters.lock().unwrap());
            for waiter in waiters {
                let _ = waiter.send(());
            }
        } else {
            let _ = rx.await;
        }
    }
}

/// Builds `{"protocol":<name>,"version":<n>}` followed by the record
/// separator.
fn build_handshake(protocol_name: &str, version: i32) -> Vec<u8> {
    let value = serde_json::json!({ "protocol": protocol_name, "version": version });
    let mut bytes = serde_json::to_vec(&value).expect("handshake payload always serializes");
    bytes.push(RECORD_SEPARATOR);
    bytes
}

/// Waits for the first transport message and parses it as the handshake
/// response. Returns any hub messages found after the handshake's record
/// separator in the same payload, pre-parsed via the codec so the dispatch
/// loop doesn't need to special-case a "first payload" branch.
async fn wait_for_handshake(
    events: &mut tokio::sync::mpsc::UnboundedReceiver<TransportEvent>,
    protocol: &dyn HubProtocol,
) -> Result<Option<Vec<HubMessage>>, SignalRError> {
    loop {
        match events.recv().await {
            Some(TransportEvent::Message(bytes)) => {
                let separator_pos = bytes
                    .iter()
                    .position(|&b| b == RECORD_SEPARATOR)
                    .ok_or(HandshakeError::Incomplete)?;
                let (head, tail) = bytes.split_at(separator_pos);
                let rest = &tail[1..];

                let parsed: serde_json::Value =
                    serde_json::from_slice(head).map_err(|e| ProtocolError::Codec(e.to_string()))?;
                let obj = parsed.as_object().ok_or(ProtocolError::NotAMap)?;

                if let Some(error) = obj.get("error").and_then(|v| v.as_str()) {
                    return Err(HandshakeError::ServerError(error.to_string()).into());
                }
                if obj.contains_key("type") {
                    return Err(HandshakeError::UnexpectedMessage.into());
                }

                if rest.is_empty() {
                    return Ok(None);
                }
                let leftover = protocol.parse_messages(rest)?;
                return Ok(Some(leftover));
            }
            Some(TransportEvent::Closed(error)) => {
                return Err(match error {
                    Some(e) => e.into(),
                    None => SignalRError::Stopped,
                });
            }
            None => return Err(SignalRError::Stopped),
        }
    }
}

/// Delivers the disconnected notification at most once per dispatch-loop
/// exit; `set_disconnected` can only be called while `Disconnected`, so no
/// handler can be installed concurrently with this call.
async fn fire_disconnected(handler: &Mutex<Option<DisconnectedHandler>>, error: Option<String>) {
    if let Some(handler) = handler.lock().await.as_ref() {
        handler(error);
    }
}

/// Returns `Err` if the message signals "close the connection": a
/// client-only message type received from the server (with its real wire
/// tag), or an unknown tag.
fn handle_message(
    message: HubMessage,
    pending: &PendingInvocations,
    subscriptions: &SubscriptionTable,
) -> Result<(), ProtocolError> {
    match message {
        HubMessage::Invocation { target, arguments, .. } => {
            match subscriptions.get(&target) {
                Some(handler) => handler(arguments),
                None => tracing::info!(target: "signalr_client_core::hub", %target, "handler not found"),
            }
            Ok(())
        }
        HubMessage::Completion {
            invocation_id,
            error,
            result,
            ..
        } => {
            let outcome = match error {
                Some(e) => Err(InvocationError::Hub(e)),
                None => Ok(result.unwrap_or(Value::Null)),
            };
            if !pending.invoke(&invocation_id, outcome) {
                tracing::info!(
                    target: "signalr_client_core::hub",
                    invocation_id = %invocation_id,
                    "no callback found for id"
                );
            }
            Ok(())
        }
        HubMessage::Ping => {
            tracing::debug!(target: "signalr_client_core::hub", "ping received");
            Ok(())
        }
        HubMessage::StreamItem { .. } | HubMessage::Close { .. } => Ok(()),
        HubMessage::StreamInvocation => {
            Err(ProtocolError::ClientOnlyMessageType(message::TYPE_STREAM_INVOCATION as u8))
        }
        HubMessage::CancelInvocation => {
            Err(ProtocolError::ClientOnlyMessageType(message::TYPE_CANCEL_INVOCATION as u8))
        }
        HubMessage::Unknown(tag) => Err(ProtocolError::UnknownMessageType(tag)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handshake_payload_matches_wire_format() {
        let payload = build_handshake("json", 1);
        assert_eq!(payload, b"{\"protocol\":\"json\",\"version\":1}\x1e");
    }

    #[test]
    fn invocation_dispatches_to_registered_handler() {
        let subs = SubscriptionTable::new();
        let seen = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        let seen2 = seen.clone();
        subs.register(
            "BroadCAST",
            Arc::new(move |args| seen2.lock().unwrap().extend(args)),
        )
        .unwrap();
        let pending = PendingInvocations::new();
        let ok = handle_message(
            HubMessage::invocation(None, "broadcast", vec![Value::from("m"), Value::Number(1.0)]),
            &pending,
            &subs,
        );
        assert!(ok.is_ok());
        assert_eq!(*seen.lock().unwrap(), vec![Value::from("m"), Value::Number(1.0)]);
    }

    #[tokio::test]
    async fn completion_resolves_pending_invocation() {
        let pending = PendingInvocations::new();
        let (id, rx) = pending.register();
        let subs = SubscriptionTable::new();
        handle_message(
            HubMessage::Completion {
                invocation_id: id,
                error: None,
                result: Some(Value::from("hi")),
                has_result: true,
            },
            &pending,
            &subs,
        )
        .unwrap();
        assert_eq!(rx.await.unwrap(), Ok(Value::from("hi")));
    }

    #[test]
    fn client_only_message_types_close_the_connection_with_their_real_tag() {
        let pending = PendingInvocations::new();
        let subs = SubscriptionTable::new();
        assert!(matches!(
            handle_message(HubMessage::StreamInvocation, &pending, &subs),
            Err(ProtocolError::ClientOnlyMessageType(tag)) if tag == message::TYPE_STREAM_INVOCATION as u8
        ));
        assert!(matches!(
            handle_message(HubMessage::CancelInvocation, &pending, &subs),
            Err(ProtocolError::ClientOnlyMessageType(tag)) if tag == message::TYPE_CANCEL_INVOCATION as u8
        ));
    }

    #[test]
    fn unknown_tag_closes_the_connection_with_the_real_tag() {
        let pending = PendingInvocations::new();
        let subs = SubscriptionTable::new();
        assert!(matches!(
            handle_message(HubMessage::Unknown(99), &pending, &subs),
            Err(ProtocolError::UnknownMessageType(99))
        ));
    }
}
