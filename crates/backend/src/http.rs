use crate::error::{BackendError, Result};
use crate::types::{AiBackend, BackendEvent, CompletionRequest};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::mpsc;

/// Configuration for the HTTP backend client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpBackendConfig {
    /// Base URL of the backend, e.g. `http://localhost:8080`
    pub base_url: String,

    /// Request timeout for non-streaming calls, in seconds
    pub timeout_secs: u64,

    /// Capacity of the per-stream event channel
    pub channel_capacity: usize,
}

impl Default for HttpBackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            timeout_secs: 60,
            channel_capacity: 100,
        }
    }
}

/// Thin HTTP client for the AI backend.
///
/// - `POST {base}/embed` with `{"texts": [...]}` returns `{"vectors": [[f32]]}`
/// - `POST {base}/complete/stream` with `{"prompt", "context"}` returns
///   newline-delimited JSON events `{"token": "..."}` ... `{"done": true}`
pub struct HttpBackend {
    client: reqwest::Client,
    url_embed: String,
    url_complete: String,
    timeout: Duration,
    channel_capacity: usize,
}

impl HttpBackend {
    /// Create a new client from configuration.
    ///
    /// # Errors
    /// - [`BackendError::InvalidEndpoint`] if the base URL is empty or
    ///   missing an http/https scheme
    /// - [`BackendError::Transient`] if the HTTP client cannot be built
    pub fn new(config: &HttpBackendConfig) -> Result<Self> {
        let endpoint = config.base_url.trim();
        if endpoint.is_empty()
            || !(endpoint.starts_with("http://") || endpoint.starts_with("https://"))
        {
            return Err(BackendError::InvalidEndpoint(config.base_url.clone()));
        }

        // No client-wide timeout: it would cover the whole response body
        // and cut long completion streams short. The embed call carries a
        // per-request timeout instead; stream liveness is the caller's
        // idle timeout.
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| BackendError::transient(format!("failed to build HTTP client: {e}")))?;

        let base = endpoint.trim_end_matches('/').to_string();
        Ok(Self {
            client,
            url_embed: format!("{base}/embed"),
            url_complete: format!("{base}/complete/stream"),
            timeout: Duration::from_secs(config.timeout_secs),
            channel_capacity: config.channel_capacity,
        })
    }
}

#[async_trait::async_trait]
impl AiBackend for HttpBackend {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let body = EmbedRequest { texts };

        log::debug!("POST {} ({} texts)", self.url_embed, texts.len());
        let resp = self
            .client
            .post(&self.url_embed)
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| BackendError::transient(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(http_status_error(&self.url_embed, resp).await);
        }

        let out: EmbedResponse = resp
            .json()
            .await
            .map_err(|e| BackendError::decode(format!("expected {{vectors: [[f32]]}}: {e}")))?;

        if out.vectors.len() != texts.len() {
            return Err(BackendError::decode(format!(
                "expected {} vectors, got {}",
                texts.len(),
                out.vectors.len()
            )));
        }

        Ok(out.vectors)
    }

    async fn stream_complete(
        &self,
        request: &CompletionRequest,
    ) -> Result<mpsc::Receiver<BackendEvent>> {
        log::debug!("POST {}", self.url_complete);
        let resp = self
            .client
            .post(&self.url_complete)
            .json(request)
            .send()
            .await
            .map_err(|e| BackendError::transient(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(http_status_error(&self.url_complete, resp).await);
        }

        let (tx, rx) = mpsc::channel(self.channel_capacity);

        // The producer ends when the body ends, a terminal event is seen,
        // or the receiver is dropped.
        tokio::spawn(async move {
            let mut stream = resp.bytes_stream();
            let mut buffer = String::new();

            while let Some(chunk) = stream.next().await {
                let bytes = match chunk {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        let _ = tx
                            .send(BackendEvent::Error(BackendError::transient(e.to_string())))
                            .await;
                        return;
                    }
                };

                buffer.push_str(&String::from_utf8_lossy(&bytes));
                while let Some(pos) = buffer.find('\n') {
                    let line: String = buffer.drain(..=pos).collect();
                    match parse_stream_line(line.trim()) {
                        Some(event) => {
                            let terminal = !matches!(event, BackendEvent::Token(_));
                            if tx.send(event).await.is_err() || terminal {
                                return;
                            }
                        }
                        None => continue,
                    }
                }
            }

            // Body ended without a done/error marker.
            let _ = tx
                .send(BackendEvent::Error(BackendError::transient(
                    "stream ended before completion",
                )))
                .await;
        });

        Ok(rx)
    }
}

/// Parse one newline-delimited JSON event; blank and malformed lines
/// are skipped (the terminal marker decides stream health).
fn parse_stream_line(line: &str) -> Option<BackendEvent> {
    if line.is_empty() {
        return None;
    }

    let event: StreamLine = match serde_json::from_str(line) {
        Ok(event) => event,
        Err(e) => {
            log::warn!("skipping malformed stream line: {e}");
            return None;
        }
    };

    if let Some(token) = event.token {
        return Some(BackendEvent::Token(token));
    }
    if let Some(message) = event.error {
        return Some(BackendEvent::Error(BackendError::transient(message)));
    }
    if event.done.unwrap_or(false) {
        return Some(BackendEvent::Done);
    }
    None
}

async fn http_status_error(url: &str, resp: reqwest::Response) -> BackendError {
    let status = resp.status();
    let text = resp.text().await.unwrap_or_default();
    let snippet: String = text.chars().take(240).collect();
    BackendError::transient(format!("HTTP {status} from {url}: {snippet}"))
}

/// Request body for `/embed`
#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    texts: &'a [String],
}

/// Response body for `/embed`
#[derive(Debug, Deserialize)]
struct EmbedResponse {
    vectors: Vec<Vec<f32>>,
}

/// One line of the `/complete/stream` body
#[derive(Debug, Deserialize)]
struct StreamLine {
    token: Option<String>,
    done: Option<bool>,
    error: Option<String>,
}
