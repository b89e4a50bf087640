//! Error taxonomy for the SignalR core client.
//!
//! Each kind mirrors a fatal/local distinction described by the connection
//! and hub layers: configuration/hub errors are surfaced only to their
//! caller, while negotiation/transport/handshake/protocol errors invalidate
//! the whole connection.

use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigurationError {
    #[error("connection can only be started if it is in the disconnected state")]
    NotDisconnected,
    #[error("setting this option requires the connection to be in the disconnected state")]
    MustBeDisconnectedToConfigure,
    #[error("event_name cannot be empty")]
    EmptyEventName,
    #[error("a handler is already registered for '{0}'")]
    DuplicateSubscription(String),
    #[error("arguments should be an array")]
    ArgumentsNotArray,
}

#[derive(Error, Debug)]
pub enum NegotiationError {
    #[error("negotiate failed with status code {0}")]
    BadStatusCode(u16),
    #[error("{0}")]
    ServerError(String),
    #[error(
        "Detected a connection attempt to an ASP.NET SignalR Server. This client only supports \
         connecting to an ASP.NET Core SignalR Server. See https://aka.ms/signalr-core-differences \
         for details."
    )]
    LegacyServer,
    #[error("Negotiate redirection limit exceeded.")]
    RedirectLimitExceeded,
    #[error(
        "The server does not support WebSockets which is currently the only transport supported \
         by this client."
    )]
    WebSocketsNotSupported,
    #[error("negotiate request failed: {0}")]
    Request(String),
}

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("transport already connected")]
    AlreadyConnected,
    #[error("transport timed out when trying to connect")]
    ConnectTimeout,
    #[error("transport error: {0}")]
    Underlying(String),
    #[error(
        "cannot send data when the connection is not in the connected state. current connection \
         state: {0}"
    )]
    NotConnected(String),
    #[error("server timeout ({0:?}) elapsed without receiving a message from the server.")]
    ServerTimeout(Duration),
}

#[derive(Error, Debug)]
pub enum HandshakeError {
    #[error("Received an error during handshake: {0}")]
    ServerError(String),
    #[error("Received unexpected message while waiting for the handshake response.")]
    UnexpectedMessage,
    #[error("timed out waiting for the server to respond to the handshake message")]
    Timeout,
    #[error("incomplete message received")]
    Incomplete,
}

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Message was not a 'map' type")]
    NotAMap,
    #[error("Field 'type' not found")]
    MissingType,
    #[error("Field 'target' not found for 'invocation' message")]
    MissingTarget,
    #[error("Field 'arguments' not found for 'invocation' message")]
    MissingArguments,
    #[error("Field 'invocationId' not found for 'completion' message")]
    MissingInvocationId,
    #[error("'error' and 'result' fields are mutually exclusive on a completion message")]
    ErrorAndResultBothPresent,
    #[error("received a client-only message type ({0}) from the server")]
    ClientOnlyMessageType(u8),
    #[error("unknown message type '{0}' received")]
    UnknownMessageType(i64),
    #[error("messages over 2GB are not supported.")]
    MessageOver2Gb,
    #[error("partial messages are not supported.")]
    PartialMessage,
    #[error("codec error: {0}")]
    Codec(String),
}

#[derive(Error, Debug)]
pub enum SignalRError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error(transparent)]
    Negotiation(#[from] NegotiationError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Handshake(#[from] HandshakeError),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error("{0}")]
    Hub(String),
    #[error("connection was stopped before invocation result was received")]
    Stopped,
    #[error("the start attempt was canceled")]
    Cancelled,
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<tokio::task::JoinError> for SignalRError {
    fn from(e: tokio::task::JoinError) -> Self {
        SignalRError::Internal(e.to_string())
    }
}

pub type SignalRResult<T> = std::result::Result<T, SignalRError>;
