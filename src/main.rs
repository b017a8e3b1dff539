use discord_bot::{DiscordHttpClient, Gateway, MemeBot};
use memebot_core::{BotConfig, ConfigError, CoreError, ErrorExt};
use reddit_client::{MemeFetcher, RedditApiClient};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "memebot=info,reddit_client=info,discord_bot=info";

#[tokio::main]
async fn main() -> Result<(), CoreError> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    tracing::info!("Starting Meme Fetcher Bot");

    let config = BotConfig::load().map_err(|e| {
        e.log_error();
        tracing::error!("{}", e.user_friendly_message());
        CoreError::from(e)
    })?;
    let discord_token =
        config
            .discord_token
            .clone()
            .ok_or_else(|| ConfigError::MissingEnvironmentVariable {
                var_name: "DISCORD_TOKEN".to_string(),
            })?;
    tracing::info!(
        "Using prefix '{}' across {} subreddits",
        config.command_prefix,
        config.subreddits().len()
    );

    let reddit = Arc::new(RedditApiClient::from_config(&config)?);
    let fetcher = Arc::new(MemeFetcher::from_config(reddit.clone(), &config));
    let http = Arc::new(DiscordHttpClient::new(
        discord_token.clone(),
        config.request_timeout(),
    )?);
    let config = Arc::new(config);
    let bot = Arc::new(MemeBot::new(config, fetcher, http.clone()));

    let outcome = tokio::select! {
        result = discord_bot::run(bot, http, Gateway::new(discord_token)) => result,
        signal = tokio::signal::ctrl_c() => {
            if let Err(e) = signal {
                tracing::warn!("Failed to listen for shutdown signal: {}", e);
            }
            tracing::info!("Shutdown signal received");
            Ok(())
        }
    };

    tracing::info!("Reddit API usage: {}", reddit.get_metrics().await);
    tracing::info!("Meme Fetcher Bot stopped");

    outcome
}
