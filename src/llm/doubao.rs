use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::sync::mpsc;

use super::provider::{ChatProvider, Fragment};
use super::sse::spawn_relay;
use crate::config::ProviderConfig;
use crate::errors::ApiError;

const SYSTEM_PROMPT: &str =
    "你是一个科学论文助手，根据 PubMed 数据回答问题，结果以MarkDown格式输出。";

/// Volcengine Ark (Doubao) provider. Same wire format as DeepSeek, but the
/// Ark base URL already contains the API version segment and the deployment
/// pins a system prompt.
#[derive(Clone)]
pub struct DoubaoClient {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: String,
    request_timeout: Duration,
}

impl DoubaoClient {
    pub fn new(config: ProviderConfig, timeout: Duration) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .connect_timeout(timeout)
            .build()
            .map_err(ApiError::internal)?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model,
            api_key: config.api_key,
            request_timeout: timeout,
        })
    }

    fn chat_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    fn body(&self, prompt: &str, stream: bool) -> Value {
        json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": SYSTEM_PROMPT},
                {"role": "user", "content": prompt},
            ],
            "stream": stream,
        })
    }
}

#[async_trait]
impl ChatProvider for DoubaoClient {
    fn name(&self) -> &str {
        "doubao"
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
            return Err(ApiError::Upstream(format!("Doubao error: {}", text)));
        }

        let payload: Value = response.json().await.map_err(ApiError::upstream)?;
        if payload.get("error").is_some_and(|e| !e.is_null()) {
            return Err(ApiError::Upstream(format!("Doubao error: {}", payload)));
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
            return Err(ApiError::Upstream(format!("Doubao stream error: {}", text)));
        }

        Ok(spawn_relay(response, "doubao"))
    }
}
