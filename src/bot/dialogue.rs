use super::callbacks::CallbackAction;
use super::{AppState, post_markup, respond};
use crate::html::escape_html;
use crate::session::{Input, Prompt, SessionError, SessionState};
use anyhow::Result;
use std::sync::Arc;
use teloxide::net::Download;
use teloxide::prelude::*;
use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup, InputFile, ParseMode};
use tracing::{info, warn};

fn links_keyboard(uid: u64, first: bool) -> InlineKeyboardMarkup {
    let add = if first { "➕ Add Links" } else { "➕ Add Another" };
    InlineKeyboardMarkup::new(vec![
        vec![InlineKeyboardButton::callback(add, CallbackAction::AddLink(uid).encode())],
        vec![InlineKeyboardButton::callback(
            "🏁 Finish",
            CallbackAction::FinishLinks(uid).encode(),
        )],
    ])
}

fn badge_keyboard(uid: u64, suggestion: &str) -> InlineKeyboardMarkup {
    let mut rows = Vec::new();
    if !suggestion.is_empty() {
        rows.push(vec![InlineKeyboardButton::callback(
            format!("✨ Use \"{suggestion}\""),
            CallbackAction::AutoBadge(uid).encode(),
        )]);
    }
    rows.push(vec![InlineKeyboardButton::callback(
        "🚫 No Badge",
        CallbackAction::SkipBadge(uid).encode(),
    )]);
    InlineKeyboardMarkup::new(rows)
}

/// Message text (HTML) and buttons for the next question.
pub fn prompt_view(prompt: &Prompt, uid: u64) -> (String, Option<InlineKeyboardMarkup>) {
    match prompt {
        Prompt::ManualPlot => ("📝 Enter the <b>Plot</b>:".into(), None),
        Prompt::ManualPoster => (
            "🖼️ Send the <b>Poster</b> as a photo or an image URL:".into(),
            None,
        ),
        Prompt::Language { title } => (
            format!(
                "✅ Selected: <b>{}</b>\n\n🗣️ Enter <b>Language</b>:",
                escape_html(title)
            ),
            None,
        ),
        Prompt::Quality => ("💿 Enter <b>Quality</b> (e.g. 720p):".into(), None),
        Prompt::AskLinks { count: 0 } => (
            "🔗 Add Download Links?".into(),
            Some(links_keyboard(uid, true)),
        ),
        Prompt::AskLinks { count } => (
            format!("✅ Added! Total: {count}"),
            Some(links_keyboard(uid, false)),
        ),
        Prompt::LinkName => ("📝 Enter <b>Button Name</b>:".into(), None),
        Prompt::LinkUrl => ("🔗 Enter <b>URL</b> for this button:".into(), None),
        Prompt::AskBadge { suggestion } => (
            "🏷️ Send <b>Badge Text</b> for the poster, or pick an option:".into(),
            Some(badge_keyboard(uid, suggestion)),
        ),
        Prompt::Finalize => ("⏳ Generating HTML & Image...".into(), None),
    }
}

/// User-facing text for a rejected input. `NoSession` stays silent.
pub fn rejection_text(err: &SessionError) -> Option<String> {
    match err {
        SessionError::NoSession => None,
        SessionError::Unexpected { expected } => Some(format!("⚠️ Please send {expected}.")),
        SessionError::EmptyInput => Some("⚠️ That was empty, please try again.".into()),
        SessionError::InvalidUrl(url) => Some(format!(
            "⚠️ <code>{}</code> is not a valid http(s) link.",
            escape_html(url)
        )),
    }
}

/// Downloads the largest size of a photo message and rehosts it.
async fn rehost_photo(bot: &Bot, state: &AppState, msg: &Message) -> Result<Option<String>> {
    let Some(photo) = msg.photo().and_then(|sizes| sizes.last()) else {
        return Ok(None);
    };
    let file = bot.get_file(photo.file.id.clone()).await?;
    let mut bytes = Vec::new();
    bot.download_file(&file.path, &mut bytes).await?;
    let name = file.path.rsplit('/').next().unwrap_or("poster.jpg").to_string();
    Ok(state.filehost.upload(bytes, &name).await)
}

/// Free-text and photo messages that are not commands.
pub async fn handle_message(bot: Bot, state: Arc<AppState>, msg: Message) -> Result<()> {
    let Some(user) = msg.from.as_ref() else {
        return Ok(());
    };
    let uid = user.id.0;

    let input = if let Some(text) = msg.text() {
        Input::Text(text.to_string())
    } else if msg.photo().is_some() {
        if state.sessions.state(uid).await != SessionState::ManualPoster {
            return Ok(());
        }
        bot.send_message(msg.chat.id, "⏳ Uploading poster...").await?;
        match rehost_photo(&bot, &state, &msg).await? {
            Some(url) => {
                info!(uid, "poster rehosted at {}", url);
                Input::PosterUrl(url)
            }
            None => {
                bot.send_message(
                    msg.chat.id,
                    "❌ Upload failed. Send the photo again or paste an image URL.",
                )
                .await?;
                return Ok(());
            }
        }
    } else {
        return Ok(());
    };

    match state.sessions.apply(uid, input).await {
        Ok(prompt) => {
            let (text, markup) = prompt_view(&prompt, uid);
            respond(&bot, msg.chat.id, None, text, markup).await?;
            if prompt == Prompt::Finalize {
                finalize(&bot, &state, msg.chat.id, uid).await?;
            }
        }
        Err(err) => {
            if let Some(text) = rejection_text(&err) {
                respond(&bot, msg.chat.id, None, text, None).await?;
            }
        }
    }
    Ok(())
}

/// Renders the finished draft, stores it for the follow-up buttons and sends
/// it. Only the image may be missing; the caption always goes out.
pub async fn finalize(bot: &Bot, state: &AppState, chat: ChatId, uid: u64) -> Result<()> {
    let Some(draft) = state.sessions.with(uid, |s| s.finalizing_draft()).await else {
        return Ok(());
    };
    let ad_links = state.ad_links.get(uid).await.unwrap_or_default();
    let post = state
        .generator
        .generate_post(&draft.record, &draft.links, &ad_links)
        .await;
    let caption = post.caption.clone();
    let image = post.image.clone();
    state.sessions.with(uid, |s| s.finish(post)).await;

    let markup = post_markup(uid, state.channels.get(uid).await.is_some());
    if let Some(image) = image {
        let sent = bot
            .send_photo(chat, InputFile::memory(image).file_name("post.png"))
            .caption(caption.clone())
            .parse_mode(ParseMode::Html)
            .reply_markup(markup.clone())
            .await;
        match sent {
            Ok(_) => return Ok(()),
            Err(err) => warn!(uid, "sending post image failed ({}), sending text only", err),
        }
    }
    bot.send_message(chat, caption)
        .parse_mode(ParseMode::Html)
        .reply_markup(markup)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn callbacks(markup: &InlineKeyboardMarkup) -> Vec<String> {
        use teloxide::types::InlineKeyboardButtonKind;
        markup
            .inline_keyboard
            .iter()
            .flatten()
            .filter_map(|b| match &b.kind {
                InlineKeyboardButtonKind::CallbackData(data) => Some(data.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn link_prompts_carry_the_user_id() {
        let (text, markup) = prompt_view(&Prompt::AskLinks { count: 0 }, 77);
        assert_eq!(text, "🔗 Add Download Links?");
        assert_eq!(callbacks(&markup.unwrap()), vec!["lnk_yes_77", "lnk_no_77"]);

        let (text, markup) = prompt_view(&Prompt::AskLinks { count: 2 }, 77);
        assert_eq!(text, "✅ Added! Total: 2");
        assert_eq!(markup.unwrap().inline_keyboard[0][0].text, "➕ Add Another");
    }

    #[test]
    fn badge_prompt_offers_auto_only_with_a_suggestion() {
        let (_, markup) = prompt_view(&Prompt::AskBadge { suggestion: "Hindi 720p".into() }, 3);
        assert_eq!(callbacks(&markup.unwrap()), vec!["bdg_auto_3", "bdg_skip_3"]);

        let (_, markup) = prompt_view(&Prompt::AskBadge { suggestion: String::new() }, 3);
        assert_eq!(callbacks(&markup.unwrap()), vec!["bdg_skip_3"]);
    }

    #[test]
    fn selected_title_is_escaped() {
        let (text, markup) = prompt_view(&Prompt::Language { title: "Fast & <Furious>".into() }, 1);
        assert!(text.contains("<b>Fast &amp; &lt;Furious&gt;</b>"));
        assert!(markup.is_none());
    }

    #[test]
    fn rejections() {
        assert_eq!(rejection_text(&SessionError::NoSession), None);
        assert_eq!(
            rejection_text(&SessionError::Unexpected { expected: "the quality" }).as_deref(),
            Some("⚠️ Please send the quality.")
        );
        assert!(rejection_text(&SessionError::InvalidUrl("<x>".into()))
            .unwrap()
            .contains("&lt;x&gt;"));
    }
}
