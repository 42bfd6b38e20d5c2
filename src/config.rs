use std::env::{self, VarError};
use std::str::FromStr;
use std::time::Duration;

use log::{debug, error, info};
use strum::{Display, EnumString, VariantNames};
use url::Url;

use crate::error::{BotError, Result};

const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_OPENAI_MODEL: &str = "gpt-3.5-turbo";
const DEFAULT_AZURE_API_VERSION: &str = "2024-02-01";
const DEFAULT_SLACK_API_BASE_URL: &str = "https://slack.com/api";
const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;

/// Which text-generation service answers mentions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, VariantNames, Display)]
#[strum(ascii_case_insensitive, serialize_all = "lowercase")]
pub enum BackendKind {
    Echo,
    Chat,
    Azure,
    Assistant,
}

#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub base_url: Url,
    pub model: String,
    pub system_prompt: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AzureConfig {
    pub api_key: String,
    pub endpoint: Url,
    pub deployment: String,
    pub api_version: String,
    pub system_prompt: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AssistantConfig {
    pub assistant_id: String,
    pub poll_interval: Duration,
    /// `None` waits for the run forever.
    pub run_timeout: Option<Duration>,
}

/// Backend selection together with the settings that backend needs.
#[derive(Debug, Clone)]
pub enum BackendConfig {
    Echo,
    Chat(OpenAiConfig),
    Azure(AzureConfig),
    Assistant(OpenAiConfig, AssistantConfig),
}

impl BackendConfig {
    pub fn kind(&self) -> BackendKind {
        match self {
            BackendConfig::Echo => BackendKind::Echo,
            BackendConfig::Chat(_) => BackendKind::Chat,
            BackendConfig::Azure(_) => BackendKind::Azure,
            BackendConfig::Assistant(..) => BackendKind::Assistant,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub slack_app_token: String,
    pub slack_bot_token: String,
    pub slack_api_base_url: Url,
    pub debug: bool,
    pub reply_in_thread: bool,
    pub exit_on_post_failure: bool,
    pub backend: BackendConfig,
}

/// Returns true when `DEBUG` is set to a non-empty value.
pub fn debug_enabled() -> bool {
    env::var("DEBUG").is_ok_and(|value| !value.is_empty())
}

impl Config {
    pub fn from_env() -> Result<Self> {
        debug!("Loading configuration from environment");
        Self::from_lookup(|key| env::var(key))
    }

    /// Build the configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> std::result::Result<String, VarError>,
    {
        let vars = Vars { lookup };

        let slack_app_token = vars.required("SLACK_APP_TOKEN")?;
        let slack_bot_token = vars.required("SLACK_BOT_TOKEN")?;
        let slack_api_base_url = vars.url("SLACK_API_BASE_URL", DEFAULT_SLACK_API_BASE_URL)?;
        let debug = vars.optional("DEBUG").is_some();
        let reply_in_thread = vars.flag("REPLY_IN_THREAD", true)?;
        let exit_on_post_failure = vars.flag("EXIT_ON_POST_FAILURE", false)?;

        let kind = match vars.optional("BACKEND") {
            Some(name) => BackendKind::from_str(&name).map_err(|_| {
                BotError::Config(format!(
                    "BACKEND must be one of {:?}, got '{name}'",
                    BackendKind::VARIANTS
                ))
            })?,
            None => vars.infer_backend(),
        };

        let backend = match kind {
            BackendKind::Echo => BackendConfig::Echo,
            BackendKind::Chat => BackendConfig::Chat(vars.openai()?),
            BackendKind::Azure => BackendConfig::Azure(vars.azure()?),
            BackendKind::Assistant => BackendConfig::Assistant(vars.openai()?, vars.assistant()?),
        };

        info!("Configuration loaded successfully");
        debug!(
            "Slack app token length: {} characters",
            slack_app_token.len()
        );
        debug!(
            "Slack bot token length: {} characters",
            slack_bot_token.len()
        );
        debug!("Backend: {kind}");
        debug!("Reply in thread: {reply_in_thread}");

        Ok(Self {
            slack_app_token,
            slack_bot_token,
            slack_api_base_url,
            debug,
            reply_in_thread,
            exit_on_post_failure,
            backend,
        })
    }
}

struct Vars<F> {
    lookup: F,
}

impl<F> Vars<F>
where
    F: Fn(&str) -> std::result::Result<String, VarError>,
{
    fn required(&self, key: &str) -> Result<String> {
        let value = (self.lookup)(key).map_err(|e| {
            error!("Failed to load {key} from environment: {e}");
            e
        })?;
        if value.trim().is_empty() {
            error!("{key} is set but empty");
            return Err(BotError::Config(format!("{key} must not be empty")));
        }
        Ok(value)
    }

    fn optional(&self, key: &str) -> Option<String> {
        (self.lookup)(key).ok().filter(|value| !value.is_empty())
    }

    fn url(&self, key: &str, default: &str) -> Result<Url> {
        let raw = self.optional(key).unwrap_or_else(|| default.to_string());
        Url::parse(&raw).map_err(|e| BotError::Config(format!("{key} is not a valid URL: {e}")))
    }

    fn flag(&self, key: &str, default: bool) -> Result<bool> {
        let Some(raw) = self.optional(key) else {
            return Ok(default);
        };
        match raw.trim().to_ascii_lowercase().as_str() {
            "" => Ok(default),
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(BotError::Config(format!(
                "{key} must be a boolean, got '{raw}'"
            ))),
        }
    }

    fn seconds(&self, key: &str) -> Result<Option<Duration>> {
        self.optional(key)
            .map(|raw| {
                raw.trim()
                    .parse::<u64>()
                    .map(Duration::from_secs)
                    .map_err(|e| BotError::Config(format!("{key} must be whole seconds: {e}")))
            })
            .transpose()
    }

    fn infer_backend(&self) -> BackendKind {
        if self.optional("OPENAI_ASSISTANT_ID").is_some() {
            BackendKind::Assistant
        } else if self.optional("AZURE_OPENAI_ENDPOINT").is_some() {
            BackendKind::Azure
        } else if self.optional("OPENAI_API_KEY").is_some() {
            BackendKind::Chat
        } else {
            BackendKind::Echo
        }
    }

    fn openai(&self) -> Result<OpenAiConfig> {
        let api_key = self.required("OPENAI_API_KEY")?;
        let base_url = self.url("OPENAI_BASE_URL", DEFAULT_OPENAI_BASE_URL)?;
        let model = self
            .optional("OPENAI_MODEL")
            .unwrap_or_else(|| DEFAULT_OPENAI_MODEL.to_string());

        let system_prompt = self.system_prompt();

        debug!("OpenAI API key length: {} characters", api_key.len());
        debug!("OpenAI base URL: {base_url}");
        debug!("OpenAI model: {model}");

        Ok(OpenAiConfig {
            api_key,
            base_url,
            model,
            system_prompt,
        })
    }

    fn azure(&self) -> Result<AzureConfig> {
        let api_key = self.required("AZURE_OPENAI_API_KEY")?;
        let endpoint = self.required("AZURE_OPENAI_ENDPOINT")?;
        let endpoint = Url::parse(&endpoint).map_err(|e| {
            BotError::Config(format!("AZURE_OPENAI_ENDPOINT is not a valid URL: {e}"))
        })?;
        let deployment = self.required("AZURE_OPENAI_DEPLOYMENT")?;
        let api_version = self
            .optional("AZURE_OPENAI_API_VERSION")
            .unwrap_or_else(|| DEFAULT_AZURE_API_VERSION.to_string());

        debug!("Azure API key length: {} characters", api_key.len());
        debug!("Azure endpoint: {endpoint}");
        let system_prompt = self.system_prompt();

        debug!("Azure deployment: {deployment} (api-version {api_version})");

        Ok(AzureConfig {
            api_key,
            endpoint,
            deployment,
            api_version,
            system_prompt,
        })
    }

    fn system_prompt(&self) -> Option<String> {
        let prompt = self.optional("SYSTEM_PROMPT");
        if let Some(prompt) = &prompt {
            debug!("System prompt length: {} characters", prompt.len());
        }
        prompt
    }

    fn assistant(&self) -> Result<AssistantConfig> {
        let assistant_id = self.required("OPENAI_ASSISTANT_ID")?;
        let poll_interval = self
            .seconds("ASSISTANT_POLL_INTERVAL_SECS")?
            .unwrap_or(Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS));
        if poll_interval.is_zero() {
            return Err(BotError::Config(
                "ASSISTANT_POLL_INTERVAL_SECS must be greater than zero".to_string(),
            ));
        }
        let run_timeout = self.seconds("ASSISTANT_RUN_TIMEOUT_SECS")?;

        debug!("Assistant ID: {assistant_id}");
        debug!("Assistant poll interval: {poll_interval:?}, timeout: {run_timeout:?}");

        Ok(AssistantConfig {
            assistant_id,
            poll_interval,
            run_timeout,
        })
    }
}
