//! Text-generation backends that turn mention text into reply text.

mod assistant;
mod chat;
mod echo;

use async_trait::async_trait;
use log::info;
use serde::de::DeserializeOwned;
use url::Url;

use crate::config::BackendConfig;
use crate::error::{BotError, Result};

pub use assistant::AssistantClient;
pub use chat::ChatClient;
pub use echo::EchoBackend;

/// A service that produces a reply for the text of a mention.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Produce reply text for `prompt`.
    async fn generate(&self, prompt: &str) -> Result<String>;
}

/// Build the backend selected by the configuration.
pub fn from_config(config: &BackendConfig) -> Box<dyn Backend> {
    let backend: Box<dyn Backend> = match config {
        BackendConfig::Echo => Box::new(EchoBackend),
        BackendConfig::Chat(openai) => Box::new(ChatClient::openai(openai)),
        BackendConfig::Azure(azure) => Box::new(ChatClient::azure(azure)),
        BackendConfig::Assistant(openai, assistant) => {
            Box::new(AssistantClient::new(openai, assistant))
        }
    };
    info!("Using {} backend", backend.name());
    backend
}

/// Append `path` to `base`, keeping any path `base` already has.
fn api_url(base: &Url, path: &str) -> Result<Url> {
    let joined = format!(
        "{}/{}",
        base.as_str().trim_end_matches('/'),
        path.trim_start_matches('/')
    );
    Ok(Url::parse(&joined)?)
}

/// Turn an HTTP response into `T`, mapping non-success statuses to API errors.
async fn read_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    if !response.status().is_success() {
        let status = response.status();
        let message = response
            .text()
            .await
            .unwrap_or_else(|e| format!("Failed to read error response: {e}"));
        return Err(BotError::OpenAiApi { status, message });
    }
    Ok(response.json().await?)
}
