//! A transport-independent client for the ASP.NET Core SignalR hub
//! protocol: negotiate/redirect handling, the WebSocket transport, and the
//! hub layer (handshake, invocation correlation, keep-alive, dispatch).
//!
//! # Modules
//! - `hub`: the public [`HubConnection`] API and its message/subscription
//!   types.
//! - `codec`: the [`HubProtocol`] trait plus the JSON (always available) and
//!   MessagePack (behind the `messagepack` feature) wire codecs.
//! - `connection`: state machine, negotiate, and transport lifecycle.
//! - `negotiate`, `transport`, `http`: the pieces `connection` composes.
//! - `config`: [`HubConnectionConfig`] and the [`HubConnectionBuilder`].
//! - `value`: the dynamic [`Value`] tree exchanged as hub arguments/results.
//! - `error`: the [`SignalRError`] taxonomy.
//! - `logging`: an optional convenience `tracing` subscriber.
//!
//! This crate only talks to a caller-supplied task scheduler (`tokio`), log
//! sink (any `tracing::Subscriber`), and HTTP client for negotiate
//! ([`NegotiateHttpClient`]); it does not prescribe an application
//! framework on top.

pub mod cancel;
pub mod codec;
pub mod config;
pub mod connection;
pub mod error;
pub mod http;
pub mod hub;
pub mod logging;
pub mod negotiate;
pub mod pending;
pub mod state;
pub mod timer;
pub mod transport;
pub mod value;

pub use codec::HubProtocol;
pub use codec::json::JsonHubProtocol;
#[cfg(feature = "messagepack")]
pub use codec::msgpack::MessagePackHubProtocol;
pub use config::{HubConnectionBuilder, HubConnectionConfig};
pub use error::{SignalRError, SignalRResult};
pub use hub::HubConnection;
pub use hub::message::HubMessage;
pub use http::NegotiateHttpClient;
pub use state::ConnectionState;
pub use value::Value;
