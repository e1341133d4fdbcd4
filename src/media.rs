use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

const TMDB_IMAGE_BASE: &str = "https://image.tmdb.org/t/p";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    #[default]
    Movie,
    Tv,
    Manual,
}

impl MediaKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MediaKind::Movie => "movie",
            MediaKind::Tv => "tv",
            MediaKind::Manual => "manual",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MediaKind {
    type Err = anyhow::Error;

    /// Only the two TMDB categories parse; manual records never come from text.
    fn from_str(s: &str) -> Result<Self> {
        match s {
            "movie" => Ok(MediaKind::Movie),
            "tv" => Ok(MediaKind::Tv),
            other => anyhow::bail!("unsupported media type: {other}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Genre {
    #[serde(default)]
    pub id: i64,
    pub name: String,
}

/// Everything known about the title being posted. Built up across the
/// dialogue and dropped once the post is finalised.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MediaRecord {
    #[serde(skip)]
    pub kind: MediaKind,
    #[serde(rename = "id", default)]
    pub tmdb_id: Option<u64>,
    #[serde(alias = "name", default)]
    pub title: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub overview: String,
    #[serde(default)]
    pub poster_path: Option<String>,
    #[serde(skip)]
    pub manual_poster_url: Option<String>,
    #[serde(default)]
    pub backdrop_path: Option<String>,
    #[serde(alias = "first_air_date", default)]
    pub release_date: Option<String>,
    #[serde(default)]
    pub vote_average: f64,
    #[serde(default)]
    pub genres: Vec<Genre>,
    #[serde(skip)]
    pub language: String,
    #[serde(skip)]
    pub quality: String,
    #[serde(skip)]
    pub badge_text: Option<String>,
}

fn null_as_empty<'de, D: Deserializer<'de>>(de: D) -> std::result::Result<String, D::Error> {
    Ok(Option::<String>::deserialize(de)?.unwrap_or_default())
}

impl MediaRecord {
    /// Parses a TMDB detail payload (`/movie/{id}` or `/tv/{id}`).
    pub fn from_details(kind: MediaKind, value: serde_json::Value) -> Result<Self> {
        let mut record: MediaRecord =
            serde_json::from_value(value).context("Failed to parse TMDB details")?;
        record.kind = kind;
        Ok(record)
    }

    pub fn manual(title: impl Into<String>) -> Self {
        Self {
            kind: MediaKind::Manual,
            title: title.into(),
            ..Self::default()
        }
    }

    pub fn is_manual(&self) -> bool {
        self.kind == MediaKind::Manual
    }

    pub fn display_title(&self) -> &str {
        if self.title.is_empty() { "N/A" } else { &self.title }
    }

    pub fn year(&self) -> String {
        self.release_date
            .as_deref()
            .filter(|d| d.len() >= 4)
            .map(|d| d.chars().take(4).collect())
            .unwrap_or_else(|| "----".to_string())
    }

    pub fn genre_names(&self) -> Vec<&str> {
        self.genres.iter().map(|g| g.name.as_str()).collect()
    }

    /// The manual URL wins over the TMDB poster.
    pub fn poster_url(&self) -> Option<String> {
        if let Some(url) = self.manual_poster_url.as_ref().filter(|u| !u.is_empty()) {
            return Some(url.clone());
        }
        self.poster_path
            .as_ref()
            .filter(|p| !p.is_empty())
            .map(|p| format!("{TMDB_IMAGE_BASE}/w500{p}"))
    }

    pub fn backdrop_url(&self) -> Option<String> {
        self.backdrop_path
            .as_ref()
            .filter(|p| !p.is_empty())
            .map(|p| format!("{TMDB_IMAGE_BASE}/w1280{p}"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadLink {
    pub label: String,
    pub url: String,
}

/// One row of a `/search/multi` response.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SearchHit {
    pub media_type: String,
    pub id: u64,
    #[serde(alias = "name", default)]
    pub title: String,
    #[serde(alias = "first_air_date", default)]
    pub release_date: Option<String>,
}

impl SearchHit {
    pub fn kind(&self) -> Option<MediaKind> {
        self.media_type.parse().ok()
    }

    pub fn label(&self) -> String {
        let year: String = self
            .release_date
            .as_deref()
            .unwrap_or("----")
            .chars()
            .take(4)
            .collect();
        let year = if year.is_empty() { "----".to_string() } else { year };
        format!("{} ({})", self.title, year)
    }
}

/// Output of a finalised post, kept so later button presses can reuse it.
#[derive(Debug, Clone)]
pub struct FinishedPost {
    pub title: String,
    pub html: String,
    pub caption: String,
    pub image: Option<Vec<u8>>,
}
