use async_trait::async_trait;

use crate::error::Result;

/// A single-prompt text completion. The seam between callers that build
/// prompts and the transport that answers them, so callers can be driven by
/// scripted replies in tests.
#[async_trait]
pub trait Completion: Send + Sync {
    /// Send one user-role prompt and return the raw reply text.
    async fn complete(&self, prompt: &str) -> Result<String>;

    fn model(&self) -> &str;
}
