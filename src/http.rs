//! The negotiate HTTP client capability.
//!
//! Declared out of scope in the distillation ("the concrete HTTP client");
//! the trait captures the shape it must have, and [`ReqwestNegotiateClient`]
//! supplies the one first-party implementation, grounded on the teacher
//! sibling crates' own choice of `reqwest`.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::NegotiationError;

#[async_trait]
pub trait NegotiateHttpClient: Send + Sync {
    async fn post(
        &self,
        url: &str,
        headers: &HashMap<String, String>,
    ) -> Result<(u16, Vec<u8>), NegotiationError>;
}

pub struct ReqwestNegotiateClient {
    client: reqwest::Client,
}

impl Default for ReqwestNegotiateClient {
    fn default() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl NegotiateHttpClient for ReqwestNegotiateClient {
    async fn post(
        &self,
        url: &str,
        headers: &HashMap<String, String>,
    ) -> Result<(u16, Vec<u8>), NegotiationError> {
        let mut request = self.client.post(url);
        for (k, v) in headers {
            request = request.header(k, v);
        }
        let response = request
            .send()
            .await
            .map_err(|e| NegotiationError::Request(e.to_string()))?;
        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|e| NegotiationError::Request(e.to_string()))?
            .to_vec();
        Ok((status, body))
    }
}
