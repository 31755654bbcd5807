use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::errors::ApiError;

/// One unit of a streamed answer. `Done` is terminal: nothing follows it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fragment {
    Content(String),
    Done,
}

#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Provider name (e.g. "deepseek", "doubao").
    fn name(&self) -> &str;

    /// Single-shot completion.
    async fn ask(&self, prompt: &str) -> Result<String, ApiError>;

    /// Streaming completion. The receiver yields fragments in upstream order
    /// and closes after `Done`, or without one if the upstream connection
    /// drops, in which case the caller owns the terminal signal.
    async fn stream_chat(&self, prompt: &str) -> Result<mpsc::Receiver<Fragment>, ApiError>;
}
