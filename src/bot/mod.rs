//! Telegram front end: dispatcher wiring and the helpers shared by the
//! command, dialogue and callback handlers.

pub mod callbacks;
pub mod commands;
pub mod dialogue;

use crate::api::filehost::Catbox;
use crate::api::paste::{Dpaste, PasteService};
use crate::api::tmdb::TmdbClient;
use crate::config::Config;
use crate::generator::PostGenerator;
use crate::poster::Compositor;
use crate::session::SessionStore;
use crate::store::JsonStore;
use anyhow::Result;
use callbacks::CallbackAction;
use commands::Command;
use std::sync::Arc;
use teloxide::prelude::*;
use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup, MessageId, ParseMode, Recipient};
use tracing::{error, info, warn};

/// Everything the handlers share, injected through `dptree::deps!`.
pub struct AppState {
    pub cfg: Config,
    pub tmdb: TmdbClient,
    pub paste: Arc<dyn PasteService>,
    pub filehost: Catbox,
    pub generator: PostGenerator,
    pub sessions: SessionStore,
    pub ad_links: JsonStore<Vec<String>>,
    pub channels: JsonStore<String>,
}

impl AppState {
    pub async fn new(cfg: Config) -> Result<Self> {
        let client = cfg.http_client()?;
        let compositor = Compositor::from_config(&cfg);
        Ok(Self {
            tmdb: TmdbClient::new(client.clone(), cfg.tmdb_key.clone()),
            paste: Arc::new(Dpaste::new(client.clone(), cfg.paste_expiry_days)),
            filehost: Catbox::new(client.clone()),
            generator: PostGenerator::new(&cfg, client, compositor),
            sessions: SessionStore::new(),
            ad_links: JsonStore::load(cfg.ad_links_file()).await,
            channels: JsonStore::load(cfg.channels_file()).await,
            cfg,
        })
    }
}

/// Runs the long-polling dispatcher until Ctrl-C.
pub async fn run(bot: Bot, state: Arc<AppState>) {
    let handler = dptree::entry()
        .branch(
            Update::filter_message()
                .filter(|m: Message| m.chat.is_private())
                .branch(
                    dptree::entry()
                        .filter_command::<Command>()
                        .endpoint(|bot: Bot, state: Arc<AppState>, msg: Message, cmd: Command| async move {
                            if let Err(e) = commands::handle_command(bot, state, msg, cmd).await {
                                error!("command handler error: {:?}", e);
                            }
                            Ok::<(), anyhow::Error>(())
                        }),
                )
                .branch(dptree::endpoint(
                    |bot: Bot, state: Arc<AppState>, msg: Message| async move {
                        if let Err(e) = dialogue::handle_message(bot, state, msg).await {
                            error!("message handler error: {:?}", e);
                        }
                        Ok::<(), anyhow::Error>(())
                    },
                )),
        )
        .branch(Update::filter_callback_query().endpoint(
            |bot: Bot, state: Arc<AppState>, q: CallbackQuery| async move {
                if let Err(e) = callbacks::handle_callback(bot, state, q).await {
                    error!("callback handler error: {:?}", e);
                }
                Ok::<(), anyhow::Error>(())
            },
        ));

    info!("bot dispatcher starting");
    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;
}

/// The chat a button was pressed in. Sessions are private, so the user's own
/// chat is the fallback when the message is gone.
pub(crate) fn chat_of(q: &CallbackQuery) -> ChatId {
    q.message
        .as_ref()
        .map(|m| m.chat().id)
        .unwrap_or(ChatId(q.from.id.0 as i64))
}

/// Edits `message` when given, otherwise sends a new message. Edits that
/// Telegram refuses (too old, identical text) fall back to sending.
pub(crate) async fn respond(
    bot: &Bot,
    chat: ChatId,
    message: Option<MessageId>,
    text: String,
    markup: Option<InlineKeyboardMarkup>,
) -> Result<()> {
    if let Some(id) = message {
        let mut req = bot.edit_message_text(chat, id, text.clone()).parse_mode(ParseMode::Html);
        if let Some(kb) = markup.clone() {
            req = req.reply_markup(kb);
        }
        match req.await {
            Ok(_) => return Ok(()),
            Err(err) => warn!("edit failed ({}), sending instead", err),
        }
    }
    let mut req = bot.send_message(chat, text).parse_mode(ParseMode::Html);
    if let Some(kb) = markup {
        req = req.reply_markup(kb);
    }
    req.await?;
    Ok(())
}

/// Buttons under a finished post.
pub(crate) fn post_markup(uid: u64, has_channel: bool) -> InlineKeyboardMarkup {
    let mut rows = vec![vec![InlineKeyboardButton::callback(
        "📄 Get Code",
        CallbackAction::GetCode(uid).encode(),
    )]];
    if has_channel {
        rows.push(vec![InlineKeyboardButton::callback(
            "📢 Post to Channel",
            CallbackAction::PublishChannel(uid).encode(),
        )]);
    }
    InlineKeyboardMarkup::new(rows)
}

/// `@name` or a numeric chat id such as `-1001234567890`.
pub(crate) fn publish_target(channel: &str) -> Option<Recipient> {
    let channel = channel.trim();
    if let Some(name) = channel.strip_prefix('@') {
        let valid = name.len() >= 4 && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
        return valid.then(|| Recipient::ChannelUsername(channel.to_string()));
    }
    channel.parse::<i64>().ok().map(|id| Recipient::Id(ChatId(id)))
}
