pub mod backend;
pub mod config;
pub mod error;
pub mod responder;
pub mod slack;
pub mod types;

use std::sync::Arc;

use log::{debug, info};
use tokio::sync::mpsc;

use config::Config;
use error::Result;
use responder::Responder;
use slack::{SlackWebClient, SocketModeClient};

/// Mentions waiting for the responder. Slack redelivers unacknowledged
/// envelopes, so this only needs to absorb short bursts.
const EVENT_BUFFER: usize = 32;

/// Run the Slack bot.
pub async fn run() -> Result<()> {
    info!("Initializing bot");
    let config = Config::from_env()?;
    if config.debug {
        info!("Debug mode enabled");
    }

    debug!("Initializing Slack Web API client");
    let web = Arc::new(SlackWebClient::new(
        config.slack_api_base_url.clone(),
        config.slack_app_token.clone(),
        config.slack_bot_token.clone(),
    ));

    let identity = web.auth_test().await?;
    info!(
        "Authenticated as {} ({}) in team {}",
        identity.user.as_deref().unwrap_or("bot"),
        identity.user_id,
        identity.team.as_deref().unwrap_or("unknown")
    );

    let backend = backend::from_config(&config.backend);
    let responder = Responder::new(backend, web.clone())
        .reply_in_thread(config.reply_in_thread)
        .exit_on_post_failure(config.exit_on_post_failure);

    let (events_tx, events_rx) = mpsc::channel(EVENT_BUFFER);
    let mut responder_task = tokio::spawn(async move { responder.run(events_rx).await });
    let gateway = SocketModeClient::new(web);

    info!("Starting Socket Mode client");

    tokio::select! {
        result = gateway.run(events_tx) => {
            result?;
        }
        result = &mut responder_task => {
            result??;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received, shutting down...");
        }
    }

    Ok(())
}
