use anyhow::{Context, Result};
use clap::Parser;
use movie_post_bot::api::tmdb::TmdbClient;
use movie_post_bot::config::Config;
use movie_post_bot::media::MediaKind;
use movie_post_bot::poster::Compositor;
use movie_post_bot::{init, init_tracing};
use std::path::PathBuf;
use tracing::info;

/// Render the promotional image for one TMDB title without Telegram.
#[derive(Debug, Parser)]
#[command(name = "postbot-render", version)]
struct Args {
    /// `movie` or `tv`.
    kind: MediaKind,
    /// TMDB id.
    id: u64,
    /// Caption for the poster badge.
    #[arg(long)]
    badge: Option<String>,
    /// Output PNG path (defaults to `<kind>-<id>.png`).
    #[arg(long)]
    out: Option<PathBuf>,
    #[arg(long, default_value = "config.json")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();

    let cfg = Config::load_offline(&args.config).await?;
    init::check_assets(&cfg).await;

    let client = cfg.http_client()?;
    let tmdb = TmdbClient::new(client.clone(), cfg.tmdb_key.clone());
    let mut record = tmdb
        .details(args.kind, args.id)
        .await
        .with_context(|| format!("no TMDB details for {} {}", args.kind, args.id))?;
    record.badge_text = args.badge.filter(|b| !b.trim().is_empty());

    let png = Compositor::from_config(&cfg)
        .render_post_image(&client, &record)
        .await
        .with_context(|| format!("rendering {} failed", record.display_title()))?;

    let out = args
        .out
        .unwrap_or_else(|| PathBuf::from(format!("{}-{}.png", args.kind, args.id)));
    tokio::fs::write(&out, &png)
        .await
        .with_context(|| format!("writing {}", out.display()))?;
    info!("wrote {} ({} bytes)", out.display(), png.len());
    Ok(())
}
