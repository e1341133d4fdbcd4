use super::callbacks::CallbackAction;
use super::dialogue::prompt_view;
use super::{AppState, publish_target, respond};
use crate::api::tmdb::{Reference, parse_reference};
use crate::html::escape_html;
use crate::media::MediaRecord;
use crate::session::{Input, Session};
use anyhow::Result;
use std::sync::Arc;
use teloxide::prelude::*;
use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup, ParseMode};
use teloxide::utils::command::BotCommands;
use tracing::info;
use url::Url;

#[derive(BotCommands, Clone, Debug, PartialEq)]
#[command(rename_rule = "lowercase", description = "These commands are supported:")]
pub enum Command {
    #[command(description = "Welcome message and reset.")]
    Start,
    #[command(description = "Show this help.")]
    Help,
    #[command(description = "Search a title, TMDB link or IMDb id and build a post.")]
    Post(String),
    #[command(description = "Build a post from details you type in.")]
    Manual,
    #[command(description = "Abandon the post in progress.")]
    Cancel,
    #[command(description = "Show your ad links and channel.")]
    Settings,
    #[command(description = "Replace your ad links: /setadlink <url> [url...]")]
    SetAdLink(String),
    #[command(description = "List your ad links.")]
    AdLinks,
    #[command(description = "Remove your ad links.")]
    ClearAdLinks,
    #[command(description = "Set the channel for \"Post to Channel\": /setchannel <@name|-100id>")]
    SetChannel(String),
}

const WELCOME: &str = "🎬 <b>Movie Post Bot</b>\n\n\
⚡ <code>/post Name</code> - Search &amp; Create Post\n\
⚡ <code>/post Link</code> - TMDB/IMDb Link\n\
✍️ <code>/manual</code> - Enter details yourself\n\
⚙️ <code>/settings</code> - Ad Links &amp; Channel";

/// Every argument must be an absolute http(s) URL.
pub fn parse_ad_links(args: &str) -> Option<Vec<String>> {
    let links: Vec<String> = args.split_whitespace().map(str::to_string).collect();
    let all_valid = links.iter().all(|link| {
        Url::parse(link)
            .map(|u| matches!(u.scheme(), "http" | "https") && u.host().is_some())
            .unwrap_or(false)
    });
    (!links.is_empty() && all_valid).then_some(links)
}

fn results_keyboard(hits: &[crate::media::SearchHit]) -> InlineKeyboardMarkup {
    let rows = hits
        .iter()
        .filter_map(|hit| {
            let kind = hit.kind()?;
            Some(vec![InlineKeyboardButton::callback(
                hit.label(),
                CallbackAction::Select { kind, id: hit.id }.encode(),
            )])
        })
        .collect::<Vec<_>>();
    InlineKeyboardMarkup::new(rows)
}

async fn reply(bot: &Bot, msg: &Message, text: impl Into<String>) -> Result<()> {
    bot.send_message(msg.chat.id, text)
        .parse_mode(ParseMode::Html)
        .await?;
    Ok(())
}

pub async fn handle_command(bot: Bot, state: Arc<AppState>, msg: Message, cmd: Command) -> Result<()> {
    let Some(user) = msg.from.as_ref() else {
        return Ok(());
    };
    let uid = user.id.0;

    match cmd {
        Command::Start => {
            state.sessions.with(uid, Session::reset).await;
            reply(&bot, &msg, WELCOME).await?;
        }
        Command::Help => {
            bot.send_message(msg.chat.id, Command::descriptions().to_string())
                .await?;
        }
        Command::Post(query) => post(&bot, &state, &msg, uid, query.trim()).await?,
        Command::Manual => {
            state.sessions.with(uid, Session::begin_manual).await;
            reply(&bot, &msg, "✍️ Enter the <b>Title</b>:").await?;
        }
        Command::Cancel => {
            state.sessions.with(uid, Session::reset).await;
            reply(&bot, &msg, "❎ Cancelled.").await?;
        }
        Command::Settings => {
            let links = state.ad_links.get(uid).await.unwrap_or_default();
            let channel = state.channels.get(uid).await;
            let mut text = String::from("⚙️ <b>Settings</b>\n\n");
            text.push_str(&format!(
                "🔗 Ad links: {}\n",
                if links.is_empty() {
                    "default".to_string()
                } else {
                    links.len().to_string()
                }
            ));
            text.push_str(&format!(
                "📢 Channel: {}\n\n",
                channel.as_deref().map(escape_html).unwrap_or_else(|| "not set".into())
            ));
            text.push_str(
                "<code>/setadlink url [url...]</code> - Ad links for the timer\n\
                 <code>/adlinks</code> - Show ad links\n\
                 <code>/clearadlinks</code> - Use the default ad link\n\
                 <code>/setchannel @name</code> - Channel for publishing",
            );
            reply(&bot, &msg, text).await?;
        }
        Command::SetAdLink(args) => match parse_ad_links(&args) {
            Some(links) => {
                let count = links.len();
                state.ad_links.set(uid, links).await;
                info!(uid, "stored {} ad links", count);
                reply(&bot, &msg, format!("✅ Saved {count} ad link(s)!")).await?;
            }
            None => {
                reply(&bot, &msg, "⚠️ Usage: <code>/setadlink https://... [https://...]</code>").await?;
            }
        },
        Command::AdLinks => {
            let links = state.ad_links.get(uid).await.unwrap_or_default();
            let text = if links.is_empty() {
                format!(
                    "No ad links set. The default is used:\n{}",
                    escape_html(&state.cfg.default_ad_link)
                )
            } else {
                links
                    .iter()
                    .enumerate()
                    .map(|(i, link)| format!("{}. {}", i + 1, escape_html(link)))
                    .collect::<Vec<_>>()
                    .join("\n")
            };
            reply(&bot, &msg, text).await?;
        }
        Command::ClearAdLinks => {
            let text = if state.ad_links.remove(uid).await {
                "🗑️ Ad links cleared."
            } else {
                "No ad links were set."
            };
            reply(&bot, &msg, text).await?;
        }
        Command::SetChannel(arg) => {
            let channel = arg.trim();
            if publish_target(channel).is_some() {
                state.channels.set(uid, channel.to_string()).await;
                reply(&bot, &msg, format!("✅ Channel set to {}", escape_html(channel))).await?;
            } else {
                reply(&bot, &msg, "⚠️ Usage: <code>/setchannel @name</code> or <code>/setchannel -100123...</code>").await?;
            }
        }
    }
    Ok(())
}

async fn post(bot: &Bot, state: &AppState, msg: &Message, uid: u64, query: &str) -> Result<()> {
    if query.is_empty() {
        return reply(bot, msg, "⚠️ Usage: <code>/post Name</code> or <code>/post URL</code>").await;
    }
    state.sessions.with(uid, Session::begin_search).await;
    let status = bot
        .send_message(msg.chat.id, format!("🔎 Searching for <code>{}</code>...", escape_html(query)))
        .parse_mode(ParseMode::Html)
        .await?;

    let direct: Option<Option<MediaRecord>> = match parse_reference(query) {
        Reference::Tmdb(kind, id) => Some(state.tmdb.details(kind, id).await),
        Reference::Imdb(id) => Some(state.tmdb.find_imdb(&id).await),
        Reference::Query(_) => None,
    };

    match direct {
        Some(Some(record)) => {
            let prompt = state
                .sessions
                .apply(uid, Input::Selected(Box::new(record)))
                .await?;
            let (text, markup) = prompt_view(&prompt, uid);
            respond(bot, msg.chat.id, Some(status.id), text, markup).await?;
        }
        Some(None) => {
            state.sessions.with(uid, Session::reset).await;
            respond(bot, msg.chat.id, Some(status.id), "❌ Nothing found for that link.".into(), None).await?;
        }
        None => {
            let hits = state.tmdb.search(query).await;
            if hits.is_empty() {
                state.sessions.with(uid, Session::reset).await;
                respond(bot, msg.chat.id, Some(status.id), "❌ No results found.".into(), None).await?;
            } else {
                respond(
                    bot,
                    msg.chat.id,
                    Some(status.id),
                    "👇 <b>Select Content:</b>".into(),
                    Some(results_keyboard(&hits)),
                )
                .await?;
            }
        }
    }
    Ok(())
}
