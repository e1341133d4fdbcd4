//! Telegram caption for a finished post (HTML parse mode).

use crate::html::escape_html;
use crate::media::MediaRecord;

const PLOT_PREVIEW_CHARS: usize = 300;

pub(crate) fn title_case(text: &str) -> String {
    text.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

pub fn rating_label(record: &MediaRecord) -> String {
    if record.is_manual() && record.vote_average <= 0.0 {
        "N/A".to_string()
    } else {
        format!("{:.1}/10", record.vote_average)
    }
}

pub fn generate_caption(record: &MediaRecord) -> String {
    let genres = record.genre_names();
    let genres = if genres.is_empty() { "N/A".to_string() } else { genres.join(", ") };
    let overview = if record.overview.is_empty() {
        "No plot available.".to_string()
    } else {
        let preview: String = record.overview.chars().take(PLOT_PREVIEW_CHARS).collect();
        format!("{preview}...")
    };

    let mut caption = format!(
        "🎬 <b>{} ({})</b>\n\n",
        escape_html(record.display_title()),
        escape_html(&record.year())
    );
    caption.push_str(&format!("<b>🎭 Genres:</b> {}\n", escape_html(&genres)));
    caption.push_str(&format!(
        "<b>🗣️ Language:</b> {}\n",
        escape_html(&title_case(&record.language))
    ));
    if !record.quality.is_empty() {
        caption.push_str(&format!("<b>💿 Quality:</b> {}\n", escape_html(&record.quality)));
    }
    caption.push_str(&format!("<b>⭐ Rating:</b> ⭐ {}\n\n", rating_label(record)));
    caption.push_str(&format!("<b>📝 Plot:</b> <i>{}</i>", escape_html(&overview)));
    caption
}
