//! Chat Completions client for OpenAI and Azure OpenAI deployments.

use async_trait::async_trait;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::config::{AzureConfig, OpenAiConfig};
use crate::error::{BotError, Result};
use crate::types::MessageRole;

use super::{Backend, api_url, read_json};

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    /// Azure routes by deployment, so the model is only sent to OpenAI.
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChatMessage {
    role: MessageRole,
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChatMessage,
}

#[derive(Debug, Clone)]
enum Endpoint {
    OpenAi {
        base_url: url::Url,
        api_key: String,
        model: String,
    },
    Azure {
        endpoint: url::Url,
        api_key: String,
        deployment: String,
        api_version: String,
    },
}

pub struct ChatClient {
    client: reqwest::Client,
    endpoint: Endpoint,
    system_prompt: Option<String>,
}

impl ChatClient {
    pub fn openai(config: &OpenAiConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: Endpoint::OpenAi {
                base_url: config.base_url.clone(),
                api_key: config.api_key.clone(),
                model: config.model.clone(),
            },
            system_prompt: config.system_prompt.clone(),
        }
    }

    pub fn azure(config: &AzureConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: Endpoint::Azure {
                endpoint: config.endpoint.clone(),
                api_key: config.api_key.clone(),
                deployment: config.deployment.clone(),
                api_version: config.api_version.clone(),
            },
            system_prompt: config.system_prompt.clone(),
        }
    }

    fn messages(&self, prompt: &str) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system_prompt) = &self.system_prompt {
            messages.push(ChatMessage {
                role: MessageRole::System,
                content: Some(system_prompt.clone()),
            });
        }
        messages.push(ChatMessage {
            role: MessageRole::User,
            content: Some(prompt.to_string()),
        });
        messages
    }

    fn request(&self, prompt: &str) -> Result<reqwest::RequestBuilder> {
        let messages = self.messages(prompt);
        let builder = match &self.endpoint {
            Endpoint::OpenAi {
                base_url,
                api_key,
                model,
            } => self
                .client
                .post(api_url(base_url, "chat/completions")?)
                .bearer_auth(api_key)
                .json(&ChatRequest {
                    model: Some(model.as_str()),
                    messages,
                }),
            Endpoint::Azure {
                endpoint,
                api_key,
                deployment,
                api_version,
            } => self
                .client
                .post(api_url(
                    endpoint,
                    &format!("openai/deployments/{deployment}/chat/completions"),
                )?)
                .query(&[("api-version", api_version.as_str())])
                .header("api-key", api_key)
                .json(&ChatRequest {
                    model: None,
                    messages,
                }),
        };
        Ok(builder)
    }
}

#[async_trait]
impl Backend for ChatClient {
    fn name(&self) -> &'static str {
        match self.endpoint {
            Endpoint::OpenAi { .. } => "chat",
            Endpoint::Azure { .. } => "azure",
        }
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        debug!("Sending chat completion request ({} backend)", self.name());

        let response = self.request(prompt)?.send().await?;
        let api_response: ChatResponse = read_json(response).await?;

        let reply = api_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| BotError::OpenAiResponse("No choices in response".to_string()))?
            .message
            .content
            .ok_or_else(|| BotError::OpenAiResponse("Choice has no content".to_string()))?;

        debug!("Received chat completion ({} characters)", reply.len());
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use reqwest::StatusCode;
    use serde_json::json;
    use url::Url;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn completion(content: &str) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({
            "id": "chatcmpl-123",
            "object": "chat.completion",
            "choices": [{
                "index": 0,
                "message": { "role": "assistant", "content": content },
                "finish_reason": "stop"
            }]
        }))
    }

    fn openai_client(server: &MockServer, system_prompt: Option<&str>) -> Result<ChatClient> {
        Ok(ChatClient::openai(&OpenAiConfig {
            api_key: "sk-test".to_string(),
            base_url: Url::parse(&server.uri())?,
            model: "gpt-3.5-turbo".to_string(),
            system_prompt: system_prompt.map(str::to_string),
        }))
    }

    #[tokio::test]
    async fn openai_returns_first_choice() -> Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(json!({
                "model": "gpt-3.5-turbo",
                "messages": [{ "role": "user", "content": "<@UBOT> hi" }]
            })))
            .respond_with(completion("Hello there"))
            .expect(1)
            .mount(&server)
            .await;

        let client = openai_client(&server, None)?;
        assert_eq!(client.generate("<@UBOT> hi").await?, "Hello there");
        Ok(())
    }

    #[tokio::test]
    async fn system_prompt_is_sent_first() -> Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_partial_json(json!({
                "messages": [
                    { "role": "system", "content": "Be brief." },
                    { "role": "user", "content": "hi" }
                ]
            })))
            .respond_with(completion("ok"))
            .expect(1)
            .mount(&server)
            .await;

        let client = openai_client(&server, Some("Be brief."))?;
        assert_eq!(client.generate("hi").await?, "ok");
        Ok(())
    }

    #[tokio::test]
    async fn error_status_is_reported() -> Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
            .mount(&server)
            .await;

        let client = openai_client(&server, None)?;
        match client.generate("hi").await {
            Err(BotError::OpenAiApi { status, message }) => {
                assert_eq!(status, StatusCode::UNAUTHORIZED);
                assert_eq!(message, "bad key");
            }
            other => panic!("expected API error, got {other:?}"),
        }
        Ok(())
    }

    #[tokio::test]
    async fn empty_choices_is_a_response_error() -> Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "choices": [] })))
            .mount(&server)
            .await;

        let client = openai_client(&server, None)?;
        assert!(matches!(
            client.generate("hi").await,
            Err(BotError::OpenAiResponse(_))
        ));
        Ok(())
    }

    #[tokio::test]
    async fn azure_uses_deployment_path_and_api_key_header() -> Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/openai/deployments/gpt-35/chat/completions"))
            .and(query_param("api-version", "2024-02-01"))
            .and(header("api-key", "azure-key"))
            .respond_with(completion("from azure"))
            .expect(1)
            .mount(&server)
            .await;

        let client = ChatClient::azure(&AzureConfig {
            api_key: "azure-key".to_string(),
            endpoint: Url::parse(&server.uri())?,
            deployment: "gpt-35".to_string(),
            api_version: "2024-02-01".to_string(),
            system_prompt: None,
        });
        assert_eq!(client.name(), "azure");
        assert_eq!(client.generate("hi").await?, "from azure");
        Ok(())
    }
}
