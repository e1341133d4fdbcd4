use super::{AppState, chat_of, publish_target, respond};
use crate::api::paste::{Delivery, deliver_html};
use crate::bot::dialogue::{finalize, prompt_view};
use crate::html::escape_html;
use crate::media::MediaKind;
use crate::session::{Input, Prompt, SessionError};
use anyhow::Result;
use std::sync::Arc;
use teloxide::prelude::*;
use teloxide::types::{InputFile, ParseMode};
use tracing::{info, warn};

/// Inline button payloads. Everything but `Select` carries the id of the
/// user the buttons were built for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackAction {
    Select { kind: MediaKind, id: u64 },
    AddLink(u64),
    FinishLinks(u64),
    AutoBadge(u64),
    SkipBadge(u64),
    GetCode(u64),
    PublishChannel(u64),
}

impl CallbackAction {
    pub fn parse(data: &str) -> Option<Self> {
        if let Some(rest) = data.strip_prefix("sel_") {
            let (kind, id) = rest.split_once('_')?;
            return Some(Self::Select {
                kind: kind.parse().ok()?,
                id: id.parse().ok()?,
            });
        }
        let owned = |prefix: &str| data.strip_prefix(prefix).and_then(|uid| uid.parse::<u64>().ok());
        if let Some(uid) = owned("lnk_yes_") {
            Some(Self::AddLink(uid))
        } else if let Some(uid) = owned("lnk_no_") {
            Some(Self::FinishLinks(uid))
        } else if let Some(uid) = owned("bdg_auto_") {
            Some(Self::AutoBadge(uid))
        } else if let Some(uid) = owned("bdg_skip_") {
            Some(Self::SkipBadge(uid))
        } else if let Some(uid) = owned("get_code_") {
            Some(Self::GetCode(uid))
        } else {
            owned("pub_ch_").map(Self::PublishChannel)
        }
    }

    pub fn encode(&self) -> String {
        match self {
            Self::Select { kind, id } => format!("sel_{}_{}", kind, id),
            Self::AddLink(uid) => format!("lnk_yes_{uid}"),
            Self::FinishLinks(uid) => format!("lnk_no_{uid}"),
            Self::AutoBadge(uid) => format!("bdg_auto_{uid}"),
            Self::SkipBadge(uid) => format!("bdg_skip_{uid}"),
            Self::GetCode(uid) => format!("get_code_{uid}"),
            Self::PublishChannel(uid) => format!("pub_ch_{uid}"),
        }
    }

    /// The user allowed to press this button, if restricted.
    pub fn owner(&self) -> Option<u64> {
        match self {
            Self::Select { .. } => None,
            Self::AddLink(uid)
            | Self::FinishLinks(uid)
            | Self::AutoBadge(uid)
            | Self::SkipBadge(uid)
            | Self::GetCode(uid)
            | Self::PublishChannel(uid) => Some(*uid),
        }
    }
}

pub async fn handle_callback(bot: Bot, state: Arc<AppState>, q: CallbackQuery) -> Result<()> {
    let uid = q.from.id.0;
    let Some(action) = q.data.as_deref().and_then(CallbackAction::parse) else {
        bot.answer_callback_query(q.id.clone()).await?;
        return Ok(());
    };
    if action.owner().is_some_and(|owner| owner != uid) {
        bot.answer_callback_query(q.id.clone()).await?;
        return Ok(());
    }

    let chat = chat_of(&q);
    let message_id = q.message.as_ref().map(|m| m.id());

    let mut answered = false;
    let input = match action {
        CallbackAction::Select { kind, id } => {
            bot.answer_callback_query(q.id.clone()).await?;
            answered = true;
            match state.tmdb.details(kind, id).await {
                Some(record) => Input::Selected(Box::new(record)),
                None => {
                    respond(&bot, chat, message_id, "❌ Could not load details. Try again.".into(), None).await?;
                    return Ok(());
                }
            }
        }
        CallbackAction::AddLink(_) => Input::AddLink,
        CallbackAction::FinishLinks(_) => Input::FinishLinks,
        CallbackAction::AutoBadge(_) => Input::AutoBadge,
        CallbackAction::SkipBadge(_) => Input::SkipBadge,
        CallbackAction::GetCode(_) => return send_code(&bot, &state, &q, chat, uid).await,
        CallbackAction::PublishChannel(_) => return publish(&bot, &state, &q, uid).await,
    };

    match state.sessions.apply(uid, input).await {
        Ok(prompt) => {
            if !answered {
                bot.answer_callback_query(q.id.clone()).await?;
            }
            let (text, markup) = prompt_view(&prompt, uid);
            respond(&bot, chat, message_id, text, markup).await?;
            if prompt == Prompt::Finalize {
                finalize(&bot, &state, chat, uid).await?;
            }
        }
        Err(err) if answered => {
            respond(&bot, chat, message_id, format!("⚠️ {err}"), None).await?;
        }
        Err(SessionError::NoSession) => {
            bot.answer_callback_query(q.id.clone())
                .text("Nothing in progress. Start with /post or /manual.")
                .await?;
        }
        Err(err) => {
            bot.answer_callback_query(q.id.clone())
                .text(format!("⚠️ {err}"))
                .await?;
        }
    }
    Ok(())
}

async fn send_code(bot: &Bot, state: &AppState, q: &CallbackQuery, chat: ChatId, uid: u64) -> Result<()> {
    let Some(post) = state.sessions.last_post(uid).await else {
        bot.answer_callback_query(q.id.clone()).text("Expired.").await?;
        return Ok(());
    };
    bot.answer_callback_query(q.id.clone())
        .text("⏳ Uploading to Dpaste...")
        .await?;

    match deliver_html(state.paste.as_ref(), &post.html).await {
        Delivery::Link(url) => {
            info!(uid, "html for {} pasted at {}", post.title, url);
            bot.send_message(chat, code_link_message(&url))
                .parse_mode(ParseMode::Html)
                .await?;
        }
        Delivery::Attachment { file_name, bytes } => {
            warn!(uid, "paste failed for {}, sending {} instead", post.title, file_name);
            bot.send_document(chat, InputFile::memory(bytes).file_name(file_name))
                .await?;
        }
    }
    Ok(())
}

async fn publish(bot: &Bot, state: &AppState, q: &CallbackQuery, uid: u64) -> Result<()> {
    let Some(channel) = state.channels.get(uid).await else {
        bot.answer_callback_query(q.id.clone())
            .text("Set a channel first with /setchannel.")
            .await?;
        return Ok(());
    };
    let Some(post) = state.sessions.last_post(uid).await else {
        bot.answer_callback_query(q.id.clone()).text("Expired.").await?;
        return Ok(());
    };
    let Some(target) = publish_target(&channel) else {
        bot.answer_callback_query(q.id.clone())
            .text("Stored channel is invalid. Use /setchannel again.")
            .await?;
        return Ok(());
    };

    let sent = match post.image.clone() {
        Some(image) => bot
            .send_photo(target, InputFile::memory(image).file_name("post.png"))
            .caption(post.caption.clone())
            .parse_mode(ParseMode::Html)
            .await
            .map(|_| ()),
        None => bot
            .send_message(target, post.caption.clone())
            .parse_mode(ParseMode::Html)
            .await
            .map(|_| ()),
    };
    let note = match sent {
        Ok(()) => {
            info!(uid, "published {} to {}", post.title, channel);
            format!("✅ Posted to {channel}")
        }
        Err(err) => {
            warn!(uid, "publishing to {} failed: {}", channel, err);
            "❌ Could not post. Is the bot an admin there?".to_string()
        }
    };
    bot.answer_callback_query(q.id.clone()).text(note).await?;
    Ok(())
}

fn code_link_message(url: &str) -> String {
    format!("✅ <b>Code:</b> <a href=\"{}\">Click Here</a>", escape_html(url))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_every_payload_shape() {
        let cases = [
            ("sel_movie_27205", CallbackAction::Select { kind: MediaKind::Movie, id: 27205 }),
            ("sel_tv_1399", CallbackAction::Select { kind: MediaKind::Tv, id: 1399 }),
            ("lnk_yes_42", CallbackAction::AddLink(42)),
            ("lnk_no_42", CallbackAction::FinishLinks(42)),
            ("bdg_auto_7", CallbackAction::AutoBadge(7)),
            ("bdg_skip_7", CallbackAction::SkipBadge(7)),
            ("get_code_99", CallbackAction::GetCode(99)),
            ("pub_ch_99", CallbackAction::PublishChannel(99)),
        ];
        for (data, expected) in cases {
            let parsed = CallbackAction::parse(data);
            assert_eq!(parsed.as_ref(), Some(&expected), "{data}");
            assert_eq!(expected.encode(), data);
        }
    }

    #[test]
    fn rejects_malformed_payloads() {
        for data in [
            "",
            "sel_person_5",
            "sel_movie_",
            "sel_movie",
            "lnk_yes_",
            "lnk_yes_abc",
            "get_code",
            "pub_ch_-1",
            "unknown_1",
        ] {
            assert_eq!(CallbackAction::parse(data), None, "{data}");
        }
    }

    #[test]
    fn code_link_is_escaped_for_telegram_html() {
        assert_eq!(
            code_link_message("https://dpaste.com/ABC"),
            "✅ <b>Code:</b> <a href=\"https://dpaste.com/ABC\">Click Here</a>"
        );
        let message = code_link_message("https://dpaste.com/A?x=1&y=\"2\"<b>");
        assert!(message.contains("href=\"https://dpaste.com/A?x=1&amp;y=&quot;2&quot;&lt;b&gt;\""));
        assert_eq!(message.matches('"').count(), 2);
    }

    #[test]
    fn only_selection_is_unowned() {
        assert_eq!(CallbackAction::Select { kind: MediaKind::Movie, id: 1 }.owner(), None);
        assert_eq!(CallbackAction::GetCode(5).owner(), Some(5));
        assert_eq!(CallbackAction::SkipBadge(6).owner(), Some(6));
    }
}
