use anyhow::Result;
use movie_post_bot::bot::{self, AppState};
use movie_post_bot::config::Config;
use movie_post_bot::{init, init_tracing, keepalive};
use std::sync::Arc;
use teloxide::Bot;
use tracing::{error, info};

const CONFIG_FILE: &str = "config.json";

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cfg = Config::load(CONFIG_FILE).await?;
    init::ensure_directories(&cfg).await?;
    if !init::check_assets(&cfg).await {
        info!("continuing with fallback fonts / face placement");
    }

    let port = cfg.keepalive_port;
    tokio::spawn(async move {
        if let Err(e) = keepalive::serve(port).await {
            error!("keep-alive server failed: {:#}", e);
        }
    });

    let bot = Bot::new(cfg.bot_token.clone());
    let state = Arc::new(AppState::new(cfg).await?);
    info!("bot started");
    bot::run(bot, state).await;
    Ok(())
}
