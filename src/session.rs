//! Per-user post dialogue as an explicit state machine.
//!
//! ```text
//! Idle ─ /post ─▶ Searching ─ select ─────────────────────┐
//!      └ /manual ▶ ManualTitle ▶ ManualPlot ▶ ManualPoster ┤
//!                                                         ▼
//!            Language ▶ Quality ▶ AskLinks ⇄ LinkName ▶ LinkUrl
//!                                    │ finish
//!                                    ▼
//!                                 AskBadge ▶ Finalizing ▶ Idle
//! ```
//!
//! Any input the current state does not expect is rejected and the state is
//! left as it was.

use crate::caption::title_case;
use crate::media::{DownloadLink, FinishedPost, MediaRecord};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use url::Url;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SessionState {
    #[default]
    Idle,
    Searching,
    ManualTitle,
    ManualPlot,
    ManualPoster,
    Language,
    Quality,
    AskLinks,
    LinkName,
    LinkUrl { label: String },
    AskBadge,
    Finalizing,
}

impl SessionState {
    /// Human description of the input this state waits for.
    pub fn expected(&self) -> &'static str {
        match self {
            SessionState::Idle => "a command",
            SessionState::Searching => "a selection from the search results",
            SessionState::ManualTitle => "the title",
            SessionState::ManualPlot => "the plot",
            SessionState::ManualPoster => "a poster photo or image URL",
            SessionState::Language => "the language",
            SessionState::Quality => "the quality",
            SessionState::AskLinks => "a button press (add link or finish)",
            SessionState::LinkName => "the button name",
            SessionState::LinkUrl { .. } => "the link URL",
            SessionState::AskBadge => "badge text or a button press",
            SessionState::Finalizing => "the post to finish generating",
        }
    }
}

#[derive(Debug, Clone)]
pub enum Input {
    Text(String),
    /// A poster already hosted somewhere (uploaded photo or typed URL).
    PosterUrl(String),
    Selected(Box<MediaRecord>),
    AddLink,
    FinishLinks,
    AutoBadge,
    SkipBadge,
}

/// What the bot should ask next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Prompt {
    ManualPlot,
    ManualPoster,
    Language { title: String },
    Quality,
    AskLinks { count: usize },
    LinkName,
    LinkUrl,
    AskBadge { suggestion: String },
    Finalize,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("no post in progress")]
    NoSession,
    #[error("expected {expected}")]
    Unexpected { expected: &'static str },
    #[error("input is empty")]
    EmptyInput,
    #[error("not an http(s) URL: {0}")]
    InvalidUrl(String),
}

#[derive(Debug, Clone, Default)]
pub struct Draft {
    pub record: MediaRecord,
    pub links: Vec<DownloadLink>,
}

impl Draft {
    pub fn badge_suggestion(&self) -> String {
        format!(
            "{} {}",
            title_case(&self.record.language),
            self.record.quality.trim()
        )
        .trim()
        .to_string()
    }
}

#[derive(Debug, Default)]
pub struct Session {
    state: SessionState,
    draft: Option<Draft>,
    last_post: Option<FinishedPost>,
}

fn non_empty(text: String) -> Result<String, SessionError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        Err(SessionError::EmptyInput)
    } else {
        Ok(trimmed.to_string())
    }
}

fn web_url(text: String) -> Result<String, SessionError> {
    let text = non_empty(text)?;
    match Url::parse(&text) {
        Ok(url) if matches!(url.scheme(), "http" | "https") && url.host().is_some() => Ok(text),
        _ => Err(SessionError::InvalidUrl(text)),
    }
}

impl Session {
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn draft(&self) -> Option<&Draft> {
        self.draft.as_ref()
    }

    pub fn last_post(&self) -> Option<&FinishedPost> {
        self.last_post.as_ref()
    }

    /// Drops any post in progress. A finished post stays retrievable.
    pub fn reset(&mut self) {
        self.state = SessionState::Idle;
        self.draft = None;
    }

    pub fn begin_search(&mut self) {
        self.reset();
        self.state = SessionState::Searching;
    }

    pub fn begin_manual(&mut self) {
        self.reset();
        self.state = SessionState::ManualTitle;
    }

    pub fn apply(&mut self, input: Input) -> Result<Prompt, SessionError> {
        let state = std::mem::take(&mut self.state);
        match self.step(&state, input) {
            Ok((next, prompt)) => {
                self.state = next;
                Ok(prompt)
            }
            Err(err) => {
                self.state = state;
                Err(err)
            }
        }
    }

    fn draft_mut(&mut self) -> Result<&mut Draft, SessionError> {
        self.draft.as_mut().ok_or(SessionError::NoSession)
    }

    fn step(&mut self, state: &SessionState, input: Input) -> Result<(SessionState, Prompt), SessionError> {
        use SessionState as S;

        match (state, input) {
            (S::Idle, _) => Err(SessionError::NoSession),

            (S::Searching, Input::Selected(record)) => {
                let title = record.display_title().to_string();
                self.draft = Some(Draft {
                    record: *record,
                    links: Vec::new(),
                });
                Ok((S::Language, Prompt::Language { title }))
            }

            (S::ManualTitle, Input::Text(text)) => {
                let title = non_empty(text)?;
                self.draft = Some(Draft {
                    record: MediaRecord::manual(title),
                    links: Vec::new(),
                });
                Ok((S::ManualPlot, Prompt::ManualPlot))
            }
            (S::ManualPlot, Input::Text(text)) => {
                let plot = non_empty(text)?;
                self.draft_mut()?.record.overview = plot;
                Ok((S::ManualPoster, Prompt::ManualPoster))
            }
            (S::ManualPoster, Input::Text(text) | Input::PosterUrl(text)) => {
                let url = web_url(text)?;
                let draft = self.draft_mut()?;
                draft.record.manual_poster_url = Some(url);
                let title = draft.record.display_title().to_string();
                Ok((S::Language, Prompt::Language { title }))
            }

            (S::Language, Input::Text(text)) => {
                self.draft_mut()?.record.language = non_empty(text)?;
                Ok((S::Quality, Prompt::Quality))
            }
            (S::Quality, Input::Text(text)) => {
                let quality = non_empty(text)?;
                let draft = self.draft_mut()?;
                draft.record.quality = quality;
                Ok((S::AskLinks, Prompt::AskLinks { count: draft.links.len() }))
            }

            (S::AskLinks, Input::AddLink) => Ok((S::LinkName, Prompt::LinkName)),
            (S::AskLinks, Input::FinishLinks) => {
                let suggestion = self.draft_mut()?.badge_suggestion();
                Ok((S::AskBadge, Prompt::AskBadge { suggestion }))
            }
            (S::LinkName, Input::Text(text)) => {
                let label = non_empty(text)?;
                Ok((S::LinkUrl { label }, Prompt::LinkUrl))
            }
            (S::LinkUrl { label }, Input::Text(text)) => {
                let url = web_url(text)?;
                let draft = self.draft_mut()?;
                draft.links.push(DownloadLink {
                    label: label.clone(),
                    url,
                });
                Ok((S::AskLinks, Prompt::AskLinks { count: draft.links.len() }))
            }

            (S::AskBadge, Input::Text(text)) => {
                self.draft_mut()?.record.badge_text = Some(non_empty(text)?);
                Ok((S::Finalizing, Prompt::Finalize))
            }
            (S::AskBadge, Input::AutoBadge) => {
                let draft = self.draft_mut()?;
                let suggestion = draft.badge_suggestion();
                draft.record.badge_text = (!suggestion.is_empty()).then_some(suggestion);
                Ok((S::Finalizing, Prompt::Finalize))
            }
            (S::AskBadge, Input::SkipBadge) => {
                self.draft_mut()?.record.badge_text = None;
                Ok((S::Finalizing, Prompt::Finalize))
            }

            (other, _) => Err(SessionError::Unexpected {
                expected: other.expected(),
            }),
        }
    }

    /// The draft to render, only while finalising.
    pub fn finalizing_draft(&self) -> Option<Draft> {
        match self.state {
            SessionState::Finalizing => self.draft.clone(),
            _ => None,
        }
    }

    /// Stores the generated post and returns to `Idle`.
    pub fn finish(&mut self, post: FinishedPost) {
        self.last_post = Some(post);
        self.reset();
    }
}

/// All sessions, keyed by Telegram user id. The lock is only held inside
/// [`SessionStore::with`], never across an await point.
#[derive(Clone, Default)]
pub struct SessionStore {
    inner: Arc<Mutex<HashMap<u64, Session>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn with<R>(&self, user: u64, f: impl FnOnce(&mut Session) -> R) -> R {
        let mut sessions = self.inner.lock().await;
        f(sessions.entry(user).or_default())
    }

    pub async fn apply(&self, user: u64, input: Input) -> Result<Prompt, SessionError> {
        self.with(user, |session| session.apply(input)).await
    }

    pub async fn state(&self, user: u64) -> SessionState {
        self.with(user, |session| session.state().clone()).await
    }

    pub async fn last_post(&self, user: u64) -> Option<FinishedPost> {
        self.with(user, |session| session.last_post().cloned()).await
    }
}
