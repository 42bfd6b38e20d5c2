use async_trait::async_trait;

use crate::error::Result;

use super::Backend;

/// Replies with the mention text unchanged.
pub struct EchoBackend;

#[async_trait]
impl Backend for EchoBackend {
    fn name(&self) -> &'static str {
        "echo"
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        Ok(prompt.to_string())
    }
}
