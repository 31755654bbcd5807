//! Embedding provider boundary.
//!
//! The ranker talks to a `dyn Embedder`; the production implementation calls
//! an OpenAI-compatible `/v1/embeddings` endpoint (a local BGE-M3 server in
//! the default deployment). Vectors are L2-normalized before being returned,
//! so cosine similarity downstream reduces to a dot product.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;

use crate::config::EmbeddingConfig;
use crate::errors::ApiError;

#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embeds a batch of texts. The output is positionally aligned with the
    /// input and each vector has unit norm (or all-zero for degenerate input).
    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, ApiError>;
}

#[derive(Clone)]
pub struct HttpEmbedder {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

impl HttpEmbedder {
    pub fn new(config: EmbeddingConfig, timeout: Duration) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(ApiError::internal)?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model,
        })
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, ApiError> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/v1/embeddings", self.base_url);
        let body = json!({
            "model": self.model,
            "input": inputs,
        });

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(ApiError::upstream)?;

        if !response.status().is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ApiError::Upstream(format!("Embedding error: {}", text)));
        }

        let payload: Value = response.json().await.map_err(ApiError::upstream)?;

        let mut embeddings = Vec::with_capacity(inputs.len());
        if let Some(data) = payload["data"].as_array() {
            for item in data {
                if let Some(values) = item["embedding"].as_array() {
                    let vector: Vec<f32> = values
                        .iter()
                        .filter_map(|v| v.as_f64().map(|f| f as f32))
                        .collect();
                    embeddings.push(normalize(vector));
                }
            }
        }

        if embeddings.len() != inputs.len() {
            return Err(ApiError::Upstream(format!(
                "Embedding batch mismatch: sent {}, received {}",
                inputs.len(),
                embeddings.len()
            )));
        }

        Ok(embeddings)
    }
}

/// Scales a vector to unit norm. Zero vectors pass through unchanged; the
/// ranker treats them as minimum-similarity rather than erroring.
fn normalize(mut vector: Vec<f32>) -> Vec<f32> {
    let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for value in &mut vector {
            *value /= norm;
        }
    }
    vector
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_eq(left: f32, right: f32) -> bool {
        (left - right).abs() < 1e-5
    }

    #[test]
    fn normalize_produces_unit_norm() {
        let normalized = normalize(vec![3.0, 4.0]);
        let norm: f32 = normalized.iter().map(|x| x * x).sum::<f32>().sqrt();

        assert!(approx_eq(norm, 1.0));
        assert!(approx_eq(normalized[0], 0.6));
        assert!(approx_eq(normalized[1], 0.8));
    }

    #[test]
    fn normalize_leaves_zero_vector_untouched() {
        let normalized = normalize(vec![0.0, 0.0, 0.0]);
        assert_eq!(normalized, vec![0.0, 0.0, 0.0]);
    }
}
