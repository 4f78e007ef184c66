//! Network transport backed by reqwest

use async_trait::async_trait;
use std::time::Duration;

use crate::common::{Error, Result};

use super::transport::{HttpRequest, HttpResponse, Transport};

/// Transport that sends requests over the network
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Build a transport, optionally bounding every request by `timeout`
    pub fn new(timeout: Option<Duration>) -> Result<Self> {
        let mut builder = reqwest::Client::builder().user_agent("api-challenger");
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        let (method, headers) = request.wire_parts()?;

        let mut builder = self.client.request(method, &request.url).headers(headers);
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await.map_err(|e| {
            Error::Transport(format!("{} {} failed: {}", request.method, request.url, e))
        })?;

        let status = response.status().as_u16();
        let mut out = HttpResponse::new(status);
        for (name, value) in response.headers() {
            // Non-visible-ASCII header values cannot be asserted on; keep them lossy
            let value = value
                .to_str()
                .map(str::to_string)
                .unwrap_or_else(|_| String::from_utf8_lossy(value.as_bytes()).into_owned());
            out.headers.insert(name.as_str().to_string(), value);
        }
        out.body = response.text().await?;

        tracing::debug!(
            method = %request.method,
            url = %request.url,
            status,
            "response received"
        );

        Ok(out)
    }
}
