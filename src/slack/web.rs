//! Minimal Slack Web API client.

use log::debug;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use url::Url;

use crate::error::{BotError, Result};

/// Who the bot token belongs to, as reported by `auth.test`.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthIdentity {
    pub user_id: String,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub team: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ConnectionsOpen {
    url: String,
}

#[derive(Debug, Deserialize)]
struct PostedMessage {
    ts: String,
}

pub struct SlackWebClient {
    client: reqwest::Client,
    base_url: Url,
    app_token: String,
    bot_token: String,
}

impl SlackWebClient {
    pub fn new(base_url: Url, app_token: String, bot_token: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
            app_token,
            bot_token,
        }
    }

    /// Call a Web API method and decode the payload once Slack reports `ok`.
    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        token: &str,
        body: Option<&Value>,
    ) -> Result<T> {
        let url = format!("{}/{method}", self.base_url.as_str().trim_end_matches('/'));
        let mut request = self.client.post(url).bearer_auth(token);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(BotError::SlackApi {
                method: method.to_string(),
                error: format!("HTTP {status}"),
            });
        }

        let payload: Value = response.json().await?;
        if payload.get("ok").and_then(Value::as_bool) != Some(true) {
            let error = payload
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("unknown");
            return Err(BotError::SlackApi {
                method: method.to_string(),
                error: error.to_string(),
            });
        }

        debug!("Slack {method} succeeded");
        Ok(serde_json::from_value(payload)?)
    }

    /// Check the bot token and return the bot's identity.
    pub async fn auth_test(&self) -> Result<AuthIdentity> {
        self.call("auth.test", &self.bot_token, None).await
    }

    /// Ask Slack for a fresh Socket Mode WebSocket URL.
    pub async fn open_connection(&self) -> Result<String> {
        let opened: ConnectionsOpen = self
            .call("apps.connections.open", &self.app_token, None)
            .await?;
        Ok(opened.url)
    }

    /// Post `text` to `channel`, inside `thread_ts` when given. Returns the new message's ts.
    pub async fn post_message(
        &self,
        channel: &str,
        text: &str,
        thread_ts: Option<&str>,
    ) -> Result<String> {
        let mut body = json!({
            "channel": channel,
            "text": text,
        });
        if let Some(ts) = thread_ts {
            body["thread_ts"] = json!(ts);
        }

        let posted: PostedMessage = self
            .call("chat.postMessage", &self.bot_token, Some(&body))
            .await?;
        Ok(posted.ts)
    }
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn client(server: &MockServer) -> Result<SlackWebClient> {
        Ok(SlackWebClient::new(
            Url::parse(&server.uri())?,
            "xapp-test".to_string(),
            "xoxb-test".to_string(),
        ))
    }

    #[tokio::test]
    async fn post_message_sends_thread_ts() -> Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat.postMessage"))
            .and(header("authorization", "Bearer xoxb-test"))
            .and(body_json(json!({
                "channel": "C123",
                "text": "hello",
                "thread_ts": "1700000000.000100"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true,
                "channel": "C123",
                "ts": "1700000001.000200"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let ts = client(&server)?
            .post_message("C123", "hello", Some("1700000000.000100"))
            .await?;
        assert_eq!(ts, "1700000001.000200");
        Ok(())
    }

    #[tokio::test]
    async fn post_message_without_thread_omits_thread_ts() -> Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat.postMessage"))
            .and(body_json(json!({ "channel": "C123", "text": "hello" })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "ok": true, "ts": "1.2" })),
            )
            .expect(1)
            .mount(&server)
            .await;

        client(&server)?.post_message("C123", "hello", None).await?;
        Ok(())
    }

    #[tokio::test]
    async fn slack_error_is_surfaced() -> Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat.postMessage"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "ok": false, "error": "not_in_channel" })),
            )
            .mount(&server)
            .await;

        match client(&server)?.post_message("C123", "hello", None).await {
            Err(BotError::SlackApi { method, error }) => {
                assert_eq!(method, "chat.postMessage");
                assert_eq!(error, "not_in_channel");
            }
            other => panic!("expected Slack API error, got {other:?}"),
        }
        Ok(())
    }

    #[tokio::test]
    async fn open_connection_uses_app_token() -> Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/apps.connections.open"))
            .and(header("authorization", "Bearer xapp-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true,
                "url": "wss://wss-primary.slack.com/link/?ticket=abc"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let url = client(&server)?.open_connection().await?;
        assert_eq!(url, "wss://wss-primary.slack.com/link/?ticket=abc");
        Ok(())
    }

    #[tokio::test]
    async fn auth_test_returns_identity() -> Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth.test"))
            .and(header("authorization", "Bearer xoxb-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true,
                "user_id": "UBOT",
                "user": "gptbot",
                "team": "Acme"
            })))
            .mount(&server)
            .await;

        let identity = client(&server)?.auth_test().await?;
        assert_eq!(identity.user_id, "UBOT");
        assert_eq!(identity.team.as_deref(), Some("Acme"));
        Ok(())
    }

    #[tokio::test]
    async fn http_failure_is_a_slack_error() -> Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth.test"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        assert!(matches!(
            client(&server)?.auth_test().await,
            Err(BotError::SlackApi { .. })
        ));
        Ok(())
    }
}
