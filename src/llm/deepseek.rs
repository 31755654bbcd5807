use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::sync::mpsc;

use super::provider::{ChatProvider, Fragment};
use super::sse::spawn_relay;
use crate::config::ProviderConfig;
use crate::errors::ApiError;

#[derive(Clone)]
pub struct DeepSeekClient {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: String,
    temperature: f64,
    request_timeout: Duration,
}

impl DeepSeekClient {
    pub fn new(
        config: ProviderConfig,
        temperature: f64,
        timeout: Duration,
    ) -> Result<Self, ApiError> {
        // Only the connect phase is bounded at the client level; a streamed
        // completion legitimately outlives any total-request timeout.
        let client = reqwest::Client::builder()
            .connect_timeout(timeout)
            .build()
            .map_err(ApiError::internal)?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model,
            api_key: config.api_key,
            temperature,
            request_timeout: timeout,
        })
    }

    fn chat_url(&self) -> String {
        format!("{}/v1/chat/completions", self.base_url)
    }

    fn body(&self, prompt: &str, stream: bool) -> Value {
        json!({
            "model": self.model,
            "messages": [{"role": "user", "content": prompt}],
            "temperature": self.temperature,
            "stream": stream,
        })
    }
}

#[async_trait]
impl ChatProvider for DeepSeekClient {
    fn name(&self) -> &str {
        "deepseek"
    }

    async fn ask(&self, prompt: &str) -> Result<String, ApiError> {
        let response = self
            .client
            .post(self.chat_url())
            .bearer_auth(&self.api_key)
            .timeout(self.request_timeout)
            .json(&self.body(prompt, false))
            .send()
            .await
            .map_err(ApiError::upstream)?;

        if !response.status().is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ApiError::Upstream(format!("DeepSeek error: {}", text)));
        }

        let payload: Value = response.json().await.map_err(ApiError::upstream)?;
        if payload.get("error").is_some_and(|e| !e.is_null()) {
            return Err(ApiError::Upstream(format!("DeepSeek error: {}", payload)));
        }

        let content = payload["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or_default()
            .to_string();

        Ok(content)
    }

    async fn stream_chat(&self, prompt: &str) -> Result<mpsc::Receiver<Fragment>, ApiError> {
        let response = self
            .client
            .post(self.chat_url())
            .bearer_auth(&self.api_key)
            .json(&self.body(prompt, true))
            .send()
            .await
            .map_err(ApiError::upstream)?;

        if !response.status().is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ApiError::Upstream(format!(
                "DeepSeek stream error: {}",
                text
            )));
        }

        Ok(spawn_relay(response, "deepseek"))
    }
}
