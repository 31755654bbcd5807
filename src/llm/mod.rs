pub mod deepseek;
pub mod doubao;
pub mod provider;
pub mod sse;

use std::sync::Arc;
use std::time::Duration;

use crate::config::LlmConfig;
use crate::errors::ApiError;

pub use provider::{ChatProvider, Fragment};

/// Builds the configured chat provider. Unknown names are a startup error,
/// not a runtime fallback.
pub fn build_provider(
    config: &LlmConfig,
    timeout: Duration,
) -> Result<Arc<dyn ChatProvider>, ApiError> {
    match config.provider.as_str() {
        "deepseek" => Ok(Arc::new(deepseek::DeepSeekClient::new(
            config.deepseek.clone(),
            config.temperature,
            timeout,
        )?)),
        "doubao" => Ok(Arc::new(doubao::DoubaoClient::new(
            config.doubao.clone(),
            timeout,
        )?)),
        other => Err(ApiError::BadRequest(format!(
            "Unknown llm.provider '{}' (expected 'deepseek' or 'doubao')",
            other
        ))),
    }
}
