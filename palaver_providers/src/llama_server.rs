use std::pin::pin;

use anyhow::Context;
use async_stream::try_stream;
use futures_util::{Stream, StreamExt};
use palaver_core::{FragmentStream, GenerationRequest, InferenceEngine};
use reqwest::{Client, Response};
use serde_json::json;
use tracing::{debug, info};

use crate::retry::RetryPolicy;
use crate::sse::{SseDecoder, SseEvent};

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8080";

/// Streams completions from a llama.cpp-compatible HTTP server.
///
/// The server holds the model; this client only renders requests and
/// decodes the event stream. Failures to connect are retried according to
/// the [`RetryPolicy`]; a stream that breaks halfway is reported as is.
#[derive(Debug, Clone)]
pub struct LlamaServerEngine {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    retry: RetryPolicy,
}

impl LlamaServerEngine {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        info!("Creating LlamaServerEngine for {base_url}");
        Self {
            client: Client::new(),
            base_url,
            api_key: None,
            retry: RetryPolicy::default(),
        }
    }

    #[must_use]
    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key.filter(|key| !key.is_empty());
        self
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn completion_url(&self) -> String {
        format!("{}/completion", self.base_url)
    }

    /// Request body for the `/completion` endpoint.
    #[must_use]
    pub fn body(request: &GenerationRequest) -> serde_json::Value {
        let params = &request.params;
        json!({
            "prompt": request.prompt,
            "n_predict": params.max_new_tokens,
            "temperature": params.temperature,
            "top_k": params.top_k,
            "top_p": params.top_p,
            "repeat_penalty": params.repetition_penalty,
            "stream": true,
        })
    }

    /// Helper method to open the response stream once
    async fn try_connect(&self, body: &serde_json::Value) -> anyhow::Result<Response> {
        let mut builder = self.client.post(self.completion_url()).json(body);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }
        Ok(builder.send().await?.error_for_status()?)
    }

    async fn connect(&self, body: &serde_json::Value) -> anyhow::Result<Response> {
        self.retry
            .run("Connecting to inference server", || self.try_connect(body))
            .await
            .with_context(|| format!("inference server at {} is unreachable", self.base_url))
    }
}

impl Default for LlamaServerEngine {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL)
    }
}

impl InferenceEngine for LlamaServerEngine {
    fn generate(&self, request: GenerationRequest) -> FragmentStream {
        let body = Self::body(&request);
        Box::pin(completion_stream(self.clone(), body))
    }

    fn name(&self) -> &str {
        "llama-server"
    }
}

fn completion_stream(
    engine: LlamaServerEngine,
    body: serde_json::Value,
) -> impl Stream<Item = anyhow::Result<String>> + Send + 'static {
    try_stream! {
        debug!("Sending completion request to {}", engine.completion_url());
        let response = engine.connect(&body).await?;
        let mut bytes = pin!(response.bytes_stream());
        let mut decoder = SseDecoder::default();
        let mut stopped = false;

        'read: while let Some(chunk) = bytes.next().await {
            let chunk = chunk.context("inference stream interrupted")?;
            for event in decoder.feed(&chunk)? {
                match event {
                    SseEvent::Content(text) => {
                        yield text;
                    }
                    SseEvent::Stop => {
                        stopped = true;
                        break 'read;
                    }
                }
            }
        }

        if !stopped {
            for event in decoder.finish()? {
                if let SseEvent::Content(text) = event {
                    yield text;
                }
            }
        }
        debug!("Completion stream finished");
    }
}
