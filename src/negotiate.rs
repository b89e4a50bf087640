//! Negotiate sequence and URL construction.
//!
//! Ported from `negotiate.cpp` / `url_builder.cpp`: builds the negotiate and
//! connect URLs, POSTs the negotiate request, follows redirects (bearer
//! token attachment, 100-hop limit), and validates the resulting transport
//! list.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Deserialize;

use crate::error::NegotiationError;
use crate::http::NegotiateHttpClient;

const MAX_NEGOTIATE_REDIRECTS: u32 = 100;

#[derive(Debug, Clone)]
pub struct NegotiateResponse {
    pub connection_id: String,
    pub connection_token: String,
    pub available_transports: Vec<AvailableTransport>,
}

#[derive(Debug, Clone)]
pub struct AvailableTransport {
    pub transport: String,
    pub transfer_formats: Vec<String>,
}

#[derive(Deserialize)]
struct RawNegotiateResponse {
    #[serde(rename = "connectionId")]
    connection_id: Option<String>,
    #[serde(rename = "connectionToken")]
    connection_token: Option<String>,
    #[serde(rename = "negotiateVersion")]
    negotiate_version: Option<i64>,
    #[serde(rename = "availableTransports")]
    available_transports: Option<Vec<RawTransport>>,
    url: Option<String>,
    #[serde(rename = "accessToken")]
    access_token: Option<String>,
    error: Option<String>,
    #[serde(rename = "ProtocolVersion")]
    protocol_version: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct RawTransport {
    transport: String,
    #[serde(rename = "transferFormats", default)]
    transfer_formats: Vec<String>,
}

/// Appends `negotiateVersion=1` to `base_url`'s negotiate endpoint, keeping
/// any existing query string intact.
pub fn build_negotiate_url(base_url: &str) -> String {
    let mut url = url::Url::parse(base_url).unwrap_or_else(|_| {
        url::Url::parse("http://invalid.invalid").expect("fallback parses")
    });
    {
        let mut segments = url.path_segments_mut().unwrap_or_else(|_| unreachable!());
        segments.pop_if_empty().push("negotiate");
    }
    url.query_pairs_mut().append_pair("negotiateVersion", "1");
    url.to_string()
}

/// Replaces `http`/`https` with `ws`/`wss` and appends `id=<connection_token>`.
pub fn build_connect_url(base_url: &str, connection_token: &str) -> String {
    let mut url = url::Url::parse(base_url).expect("base url already validated by negotiate");
    if !connection_token.is_empty() {
        url.query_pairs_mut().append_pair("id", connection_token);
    }
    let scheme = match url.scheme() {
        "http" => "ws",
        "https" => "wss",
        other => other,
    };
    let _ = url.set_scheme(scheme);
    url.to_string()
}

pub async fn negotiate(
    client: &Arc<dyn NegotiateHttpClient>,
    base_url: &str,
    headers: &mut HashMap<String, String>,
) -> Result<(String, NegotiateResponse), NegotiationError> {
    negotiate_inner(client, base_url, headers, 0).await
}

async fn negotiate_inner(
    client: &Arc<dyn NegotiateHttpClient>,
    base_url: &str,
    headers: &mut HashMap<String, String>,
    redirect_count: u32,
) -> Result<(String, NegotiateResponse), NegotiationError> {
    if redirect_count > MAX_NEGOTIATE_REDIRECTS {
        return Err(NegotiationError::RedirectLimitExceeded);
    }

    let negotiate_url = build_negotiate_url(base_url);
    let (status, body) = client.post(&negotiate_url, headers).await?;
    if status != 200 {
        return Err(NegotiationError::BadStatusCode(status));
    }

    let raw: RawNegotiateResponse =
        serde_json::from_slice(&body).map_err(|e| NegotiationError::Request(e.to_string()))?;

    if let Some(error) = raw.error {
        return Err(NegotiationError::ServerError(error));
    }
    if raw.protocol_version.is_some() {
        return Err(NegotiationError::LegacyServer);
    }
    if let Some(url) = raw.url {
        if let Some(token) = raw.access_token {
            headers.insert("Authorization".to_string(), format!("Bearer {token}"));
        }
        return Box::pin(negotiate_inner(client, &url, headers, redirect_count + 1)).await;
    }

    let negotiate_version = raw.negotiate_version.unwrap_or(0);
    let connection_id = raw.connection_id.unwrap_or_default();
    let connection_token = if negotiate_version >= 1 {
        raw.connection_token.unwrap_or_default()
    } else {
        connection_id.clone()
    };

    let available_transports: Vec<AvailableTransport> = raw
        .available_transports
        .unwrap_or_default()
        .into_iter()
        .map(|t| AvailableTransport {
            transport: t.transport,
            transfer_formats: t.transfer_formats,
        })
        .collect();

    let has_websockets = available_transports
        .iter()
        .any(|t| t.transport.eq_ignore_ascii_case("WebSockets"));
    if !has_websockets {
        return Err(NegotiationError::WebSocketsNotSupported);
    }

    Ok((
        base_url.to_string(),
        NegotiateResponse {
            connection_id,
            connection_token,
            available_transports,
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct MockHttp {
        responses: Mutex<Vec<(u16, String)>>,
        requests: Mutex<Vec<(String, HashMap<String, String>)>>,
    }

    #[async_trait]
    impl NegotiateHttpClient for MockHttp {
        async fn post(
            &self,
            url: &str,
            headers: &HashMap<String, String>,
        ) -> Result<(u16, Vec<u8>), NegotiationError> {
            self.requests
                .lock()
                .unwrap()
                .push((url.to_string(), headers.clone()));
            let (status, body) = self.responses.lock().unwrap().remove(0);
            Ok((status, body.into_bytes()))
        }
    }

    #[test]
    fn negotiate_url_preserves_query_string() {
        let url = build_negotiate_url("http://h/?foo=bar");
        assert!(url.starts_with("http://h/negotiate?"));
        assert!(url.contains("foo=bar"));
        assert!(url.contains("negotiateVersion=1"));
    }

    #[test]
    fn connect_url_swaps_scheme_and_appends_id() {
        assert_eq!(build_connect_url("http://h/", "X"), "ws://h/?id=X");
        assert_eq!(build_connect_url("https://h/", "Y"), "wss://h/?id=Y");
    }

    #[tokio::test]
    async fn happy_path_extracts_connection_id() {
        let http: Arc<dyn NegotiateHttpClient> = Arc::new(MockHttp {
            responses: Mutex::new(vec![(
                200,
                r#"{"connectionId":"X","availableTransports":[{"transport":"WebSockets","transferFormats":["Text","Binary"]}]}"#.to_string(),
            )]),
            requests: Mutex::new(Vec::new()),
        });
        let mut headers = HashMap::new();
        let (_, response) = negotiate(&http, "http://h/", &mut headers).await.unwrap();
        assert_eq!(response.connection_id, "X");
        assert_eq!(response.connection_token, "X");
    }

    #[tokio::test]
    async fn redirect_attaches_bearer_token_and_recurses() {
        let http: Arc<dyn NegotiateHttpClient> = Arc::new(MockHttp {
            responses: Mutex::new(vec![
                (200, r#"{"url":"http://r","accessToken":"s"}"#.to_string()),
                (
                    200,
                    r#"{"connectionId":"Y","availableTransports":[{"transport":"WebSockets","transferFormats":["Text"]}]}"#
                        .to_string(),
                ),
            ]),
            requests: Mutex::new(Vec::new()),
        });
        let mut headers = HashMap::new();
        let (final_base, response) = negotiate(&http, "http://h/", &mut headers).await.unwrap();
        assert_eq!(final_base, "http://r");
        assert_eq!(response.connection_id, "Y");
        assert_eq!(headers.get("Authorization").unwrap(), "Bearer s");
    }

    #[tokio::test]
    async fn legacy_server_detected_via_protocol_version() {
        let http: Arc<dyn NegotiateHttpClient> = Arc::new(MockHttp {
            responses: Mutex::new(vec![(200, r#"{"ProtocolVersion":"1.2"}"#.to_string())]),
            requests: Mutex::new(Vec::new()),
        });
        let mut headers = HashMap::new();
        let err = negotiate(&http, "http://h/", &mut headers).await.unwrap_err();
        assert!(matches!(err, NegotiationError::LegacyServer));
    }

    #[tokio::test]
    async fn missing_websockets_transport_is_rejected() {
        let http: Arc<dyn NegotiateHttpClient> = Arc::new(MockHttp {
            responses: Mutex::new(vec![(
                200,
                r#"{"connectionId":"X","availableTransports":[{"transport":"LongPolling","transferFormats":["Text"]}]}"#.to_string(),
            )]),
            requests: Mutex::new(Vec::new()),
        });
        let mut headers = HashMap::new();
        let err = negotiate(&http, "http://h/", &mut headers).await.unwrap_err();
        assert!(matches!(err, NegotiationError::WebSocketsNotSupported));
    }

    #[tokio::test]
    async fn non_200_status_fails_with_code() {
        let http: Arc<dyn NegotiateHttpClient> = Arc::new(MockHttp {
            responses: Mutex::new(vec![(500, String::new())]),
            requests: Mutex::new(Vec::new()),
        });
        let mut headers = HashMap::new();
        let err = negotiate(&http, "http://h/", &mut headers).await.unwrap_err();
        assert!(matches!(err, NegotiationError::BadStatusCode(500)));
    }
}
