//! HTTP Server-Sent-Events source backed by `reqwest`

use crate::core::SubscriptionKey;
use crate::transport::{EventStream, EventStreamSource, TransportError, TransportResult};
use crate::utils::TrackingConfig;
use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::header::{ACCEPT, CACHE_CONTROL};

/// Opens `GET {base}/{resource}/{key}/tracking-stream` as an event stream
#[derive(Debug, Clone)]
pub struct HttpEventSource {
    client: reqwest::Client,
    config: TrackingConfig,
}

impl HttpEventSource {
    pub fn new(config: TrackingConfig) -> TransportResult<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout())
            .build()
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;

        Ok(Self { client, config })
    }

    /// Use a preconfigured client (proxies, auth headers, ...)
    pub fn with_client(client: reqwest::Client, config: TrackingConfig) -> Self {
        Self { client, config }
    }

    pub fn config(&self) -> &TrackingConfig {
        &self.config
    }
}

#[async_trait]
impl EventStreamSource for HttpEventSource {
    async fn connect(&self, key: &SubscriptionKey) -> TransportResult<EventStream> {
        let url = self
            .config
            .stream_url(key)
            .map_err(|e| TransportError::InvalidEndpoint(e.to_string()))?;

        tracing::debug!(%url, "opening tracking stream");

        let response = self
            .client
            .get(url)
            .header(ACCEPT, "text/event-stream")
            .header(CACHE_CONTROL, "no-cache")
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    TransportError::Timeout(self.config.connect_timeout())
                } else {
                    TransportError::ConnectionFailed(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::HttpStatus {
                status: status.as_u16(),
                message: status.canonical_reason().unwrap_or("unknown").to_string(),
            });
        }

        let stream = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| TransportError::StreamError(e.to_string())));

        Ok(Box::pin(stream))
    }
}
