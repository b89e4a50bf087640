//! Configuration surface and the deferred-construction builder.
//!
//! Grounded on the teacher's `builder.rs` `ClientBuilder<S>` shape, trimmed
//! to the options named in the distilled spec plus the ones a real
//! connect-time configuration needs (skip-negotiation, access token
//! factory, hub protocol selection).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::codec::HubProtocol;
use crate::codec::json::JsonHubProtocol;
use crate::hub::HubConnection;
use crate::http::{NegotiateHttpClient, ReqwestNegotiateClient};

pub struct HubConnectionConfig {
    pub http_headers: HashMap<String, String>,
    pub handshake_timeout: Duration,
    pub server_timeout: Duration,
    pub keepalive_interval: Duration,
    pub skip_negotiation: bool,
    pub access_token_factory: Option<Arc<dyn Fn() -> String + Send + Sync>>,
}

impl Default for HubConnectionConfig {
    fn default() -> Self {
        Self {
            http_headers: HashMap::new(),
            handshake_timeout: Duration::from_secs(15),
            server_timeout: Duration::from_secs(30),
            keepalive_interval: Duration::from_secs(15),
            skip_negotiation: false,
            access_token_factory: None,
        }
    }
}

pub struct HubConnectionBuilder {
    url: String,
    config: HubConnectionConfig,
    protocol: Arc<dyn HubProtocol>,
    http_client: Option<Arc<dyn NegotiateHttpClient>>,
}

impl HubConnectionBuilder {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            config: HubConnectionConfig::default(),
            protocol: Arc::new(JsonHubProtocol),
            http_client: None,
        }
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.http_headers.insert(key.into(), value.into());
        self
    }

    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.config.handshake_timeout = timeout;
        self
    }

    pub fn with_server_timeout(mut self, timeout: Duration) -> Self {
        self.config.server_timeout = timeout;
        self
    }

    pub fn with_keepalive_interval(mut self, interval: Duration) -> Self {
        self.config.keepalive_interval = interval;
        self
    }

    pub fn with_skip_negotiation(mut self, skip: bool) -> Self {
        self.config.skip_negotiation = skip;
        self
    }

    pub fn with_access_token_factory(mut self, factory: Arc<dyn Fn() -> String + Send + Sync>) -> Self {
        self.config.access_token_factory = Some(factory);
        self
    }

    pub fn with_protocol(mut self, protocol: Arc<dyn HubProtocol>) -> Self {
        self.protocol = protocol;
        self
    }

    pub fn with_http_client(mut self, client: Arc<dyn NegotiateHttpClient>) -> Self {
        self.http_client = Some(client);
        self
    }

    pub fn build(self) -> HubConnection {
        let http_client = self
            .http_client
            .unwrap_or_else(|| Arc::new(ReqwestNegotiateClient::default()));
        HubConnection::new(self.url, self.config, self.protocol, http_client)
    }
}
