//! OpenAI Assistants client: one thread and one run per mention.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use strum::Display;
use url::Url;

use crate::config::{AssistantConfig, OpenAiConfig};
use crate::error::{BotError, Result};
use crate::types::MessageRole;

use super::{Backend, api_url, read_json};

const ASSISTANTS_BETA_HEADER: (&str, &str) = ("OpenAI-Beta", "assistants=v2");

#[derive(Debug, Serialize)]
struct ThreadRequest<'a> {
    messages: Vec<ThreadMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct ThreadMessage<'a> {
    role: MessageRole,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct RunRequest<'a> {
    assistant_id: &'a str,
}

/// Any object the API identifies by id (threads, runs).
#[derive(Debug, Deserialize)]
struct Created {
    id: String,
}

#[derive(Debug, Deserialize)]
struct Run {
    id: String,
    status: RunStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
enum RunStatus {
    Queued,
    InProgress,
    RequiresAction,
    Cancelling,
    Cancelled,
    Failed,
    Completed,
    Incomplete,
    Expired,
    #[serde(other)]
    Unknown,
}

impl RunStatus {
    /// Still moving; poll again.
    fn is_pending(self) -> bool {
        matches!(
            self,
            RunStatus::Queued | RunStatus::InProgress | RunStatus::Cancelling | RunStatus::Unknown
        )
    }
}

#[derive(Debug, Deserialize)]
struct MessageList {
    data: Vec<AssistantMessage>,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    content: Vec<MessageContent>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum MessageContent {
    Text { text: TextContent },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct TextContent {
    value: String,
}

pub struct AssistantClient {
    client: reqwest::Client,
    base_url: Url,
    api_key: String,
    assistant_id: String,
    poll_interval: Duration,
    run_timeout: Option<Duration>,
}

impl AssistantClient {
    pub fn new(openai: &OpenAiConfig, assistant: &AssistantConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: openai.base_url.clone(),
            api_key: openai.api_key.clone(),
            assistant_id: assistant.assistant_id.clone(),
            poll_interval: assistant.poll_interval,
            run_timeout: assistant.run_timeout,
        }
    }

    fn get(&self, path: &str) -> Result<reqwest::RequestBuilder> {
        Ok(self
            .client
            .get(api_url(&self.base_url, path)?)
            .bearer_auth(&self.api_key)
            .header(ASSISTANTS_BETA_HEADER.0, ASSISTANTS_BETA_HEADER.1))
    }

    fn post(&self, path: &str) -> Result<reqwest::RequestBuilder> {
        Ok(self
            .client
            .post(api_url(&self.base_url, path)?)
            .bearer_auth(&self.api_key)
            .header(ASSISTANTS_BETA_HEADER.0, ASSISTANTS_BETA_HEADER.1))
    }

    async fn create_thread(&self, prompt: &str) -> Result<String> {
        let request = ThreadRequest {
            messages: vec![ThreadMessage {
                role: MessageRole::User,
                content: prompt,
            }],
        };
        let response = self.post("threads")?.json(&request).send().await?;
        let thread: Created = read_json(response).await?;
        debug!("Created thread {}", thread.id);
        Ok(thread.id)
    }

    async fn create_run(&self, thread_id: &str) -> Result<String> {
        let request = RunRequest {
            assistant_id: &self.assistant_id,
        };
        let response = self
            .post(&format!("threads/{thread_id}/runs"))?
            .json(&request)
            .send()
            .await?;
        let run: Created = read_json(response).await?;
        debug!("Started run {} on thread {thread_id}", run.id);
        Ok(run.id)
    }

    /// Poll the run at a fixed interval until it completes.
    async fn wait_for_run(&self, thread_id: &str, run_id: &str) -> Result<()> {
        let started = Instant::now();
        loop {
            let response = self
                .get(&format!("threads/{thread_id}/runs/{run_id}"))?
                .send()
                .await?;
            let run: Run = read_json(response).await?;
            debug!("Run {} status: {}", run.id, run.status);

            if run.status == RunStatus::Completed {
                return Ok(());
            }
            if !run.status.is_pending() {
                return Err(BotError::AssistantRun {
                    run_id: run.id,
                    status: run.status.to_string(),
                });
            }
            if let Some(timeout) = self.run_timeout
                && started.elapsed() >= timeout
            {
                return Err(BotError::AssistantRun {
                    run_id: run.id,
                    status: "timed_out".to_string(),
                });
            }

            tokio::time::sleep(self.poll_interval).await;
        }
    }

    async fn latest_message(&self, thread_id: &str, run_id: &str) -> Result<String> {
        let response = self
            .get(&format!("threads/{thread_id}/messages"))?
            .query(&[("order", "desc"), ("run_id", run_id)])
            .send()
            .await?;
        let list: MessageList = read_json(response).await?;

        let message = list
            .data
            .into_iter()
            .next()
            .ok_or_else(|| BotError::OpenAiResponse("Thread has no messages".to_string()))?;

        match message.content.into_iter().next() {
            Some(MessageContent::Text { text }) => Ok(text.value),
            Some(MessageContent::Other) => Err(BotError::OpenAiResponse(
                "Latest message does not start with text".to_string(),
            )),
            None => Err(BotError::OpenAiResponse(
                "Latest message has no content".to_string(),
            )),
        }
    }
}

#[async_trait]
impl Backend for AssistantClient {
    fn name(&self) -> &'static str {
        "assistant"
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        let thread_id = self.create_thread(prompt).await?;
        let run_id = self.create_run(&thread_id).await?;
        self.wait_for_run(&thread_id, &run_id).await?;
        let reply = self.latest_message(&thread_id, &run_id).await?;
        info!("Assistant run {run_id} completed");
        Ok(reply)
    }
}
