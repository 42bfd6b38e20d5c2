#[tokio::main]
async fn main() -> slackgpt::error::Result<()> {
    dotenvy::dotenv().ok();
    let default_filter = if slackgpt::config::debug_enabled() {
        "slackgpt=debug"
    } else {
        "slackgpt=info"
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    if rustls::crypto::aws_lc_rs::default_provider()
        .install_default()
        .is_err()
    {
        log::warn!("A TLS crypto provider was already installed");
    }

    log::info!("Starting slackgpt Slack bot");

    match slackgpt::run().await {
        Ok(()) => {
            log::info!("Bot shut down successfully");
            Ok(())
        }
        Err(e) => {
            log::error!("Bot encountered an error: {}", e);
            Err(e)
        }
    }
}
