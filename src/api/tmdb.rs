use crate::media::{MediaKind, MediaRecord, SearchHit};
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

const BASE_URL: &str = "https://api.themoviedb.org/3";
const MAX_RESULTS: usize = 15;

static YEAR_SUFFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(.+?)\s*\(?(\d{4})\)?$").expect("valid year regex"));
static TMDB_URL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"themoviedb\.org/(movie|tv)/(\d+)").expect("valid tmdb regex"));
static IMDB_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(tt\d{5,})\b").expect("valid imdb regex"));

/// What the user typed after `/post`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reference {
    Tmdb(MediaKind, u64),
    Imdb(String),
    Query(String),
}

pub fn parse_reference(text: &str) -> Reference {
    let text = text.trim();
    if let Some(cap) = TMDB_URL.captures(text) {
        if let (Ok(kind), Ok(id)) = (cap[1].parse::<MediaKind>(), cap[2].parse::<u64>()) {
            return Reference::Tmdb(kind, id);
        }
    }
    if let Some(cap) = IMDB_ID.captures(text) {
        return Reference::Imdb(cap[1].to_string());
    }
    Reference::Query(text.to_string())
}

/// Splits a trailing year off a title: `Dune 2021` and `Dune (2021)` both
/// give `("Dune", Some("2021"))`.
pub fn split_year(query: &str) -> (String, Option<String>) {
    let query = query.trim();
    match YEAR_SUFFIX.captures(query) {
        Some(cap) if !cap[1].trim().is_empty() => {
            (cap[1].trim().to_string(), Some(cap[2].to_string()))
        }
        _ => (query.to_string(), None),
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct IdOnly {
    id: u64,
}

#[derive(Debug, Deserialize)]
struct FindResponse {
    #[serde(default)]
    movie_results: Vec<IdOnly>,
    #[serde(default)]
    tv_results: Vec<IdOnly>,
}

#[derive(Clone)]
pub struct TmdbClient {
    client: Client,
    api_key: String,
    base_url: String,
}

impl TmdbClient {
    pub fn new(client: Client, api_key: impl Into<String>) -> Self {
        Self::with_base_url(client, api_key, BASE_URL)
    }

    pub fn with_base_url(client: Client, api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            client,
            api_key: api_key.into(),
            base_url: base_url.into(),
        }
    }

    /// Movie and TV hits only, at most 15. Network or parse failures come
    /// back as an empty list.
    pub async fn search(&self, query: &str) -> Vec<SearchHit> {
        let (name, year) = split_year(query);
        let mut params = vec![
            ("query", name.as_str()),
            ("include_adult", "true"),
        ];
        if let Some(year) = year.as_deref() {
            params.push(("year", year));
        }

        let Some(body) = self.get_json("/search/multi", &params).await else {
            return Vec::new();
        };
        let response: SearchResponse = match serde_json::from_value(body) {
            Ok(r) => r,
            Err(err) => {
                warn!("TMDB search body malformed: {}", err);
                return Vec::new();
            }
        };

        response
            .results
            .into_iter()
            .filter_map(|value| serde_json::from_value::<SearchHit>(value).ok())
            .filter(|hit| hit.kind().is_some())
            .take(MAX_RESULTS)
            .collect()
    }

    pub async fn details(&self, kind: MediaKind, id: u64) -> Option<MediaRecord> {
        let path = format!("/{}/{}", kind.as_str(), id);
        let body = self
            .get_json(&path, &[("append_to_response", "credits,similar")])
            .await?;
        match MediaRecord::from_details(kind, body) {
            Ok(record) => Some(record),
            Err(err) => {
                warn!("TMDB details for {kind}/{id} unusable: {err:#}");
                None
            }
        }
    }

    /// Resolves an IMDb id through `/find`, preferring a movie match.
    pub async fn find_imdb(&self, imdb_id: &str) -> Option<MediaRecord> {
        let body = self
            .get_json(&format!("/find/{imdb_id}"), &[("external_source", "imdb_id")])
            .await?;
        let found: FindResponse = serde_json::from_value(body).ok()?;
        if let Some(movie) = found.movie_results.first() {
            return self.details(MediaKind::Movie, movie.id).await;
        }
        if let Some(tv) = found.tv_results.first() {
            return self.details(MediaKind::Tv, tv.id).await;
        }
        debug!("IMDb id {} has no TMDB match", imdb_id);
        None
    }

    async fn get_json(&self, path: &str, params: &[(&str, &str)]) -> Option<Value> {
        let url = format!("{}{}", self.base_url, path);
        let resp = match self
            .client
            .get(&url)
            .query(&[("api_key", self.api_key.as_str())])
            .query(params)
            .send()
            .await
        {
            Ok(resp) => resp,
            Err(err) => {
                warn!("TMDB request {} failed: {}", path, err);
                return None;
            }
        };

        if !resp.status().is_success() {
            warn!("TMDB {} HTTP {}", path, resp.status().as_u16());
            return None;
        }

        match resp.json::<Value>().await {
            Ok(value) => Some(value),
            Err(err) => {
                warn!("TMDB {} returned malformed JSON: {}", path, err);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn year_is_split_from_title() {
        assert_eq!(split_year("Dune 2021"), ("Dune".into(), Some("2021".into())));
        assert_eq!(split_year("Dune (2021)"), ("Dune".into(), Some("2021".into())));
        assert_eq!(split_year("  Heat "), ("Heat".into(), None));
    }

    #[test]
    fn references_are_recognised() {
        assert_eq!(
            parse_reference("https://www.themoviedb.org/tv/1399-game-of-thrones"),
            Reference::Tmdb(MediaKind::Tv, 1399)
        );
        assert_eq!(
            parse_reference("https://www.imdb.com/title/tt1375666/"),
            Reference::Imdb("tt1375666".into())
        );
        assert_eq!(parse_reference("Inception"), Reference::Query("Inception".into()));
    }

    #[tokio::test]
    async fn search_filters_people_and_caps_results() {
        let server = MockServer::start().await;
        let mut results = vec![json!({"media_type": "person", "id": 1, "name": "Somebody"})];
        for i in 0..20 {
            results.push(json!({"media_type": "movie", "id": 100 + i, "title": format!("Movie {i}")}));
        }
        Mock::given(method("GET"))
            .and(path("/search/multi"))
            .and(query_param("query", "Movie"))
            .and(query_param("year", "2020"))
            .and(query_param("api_key", "key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "results": results })))
            .mount(&server)
            .await;

        let tmdb = TmdbClient::with_base_url(Client::new(), "key", server.uri());
        let hits = tmdb.search("Movie (2020)").await;
        assert_eq!(hits.len(), 15);
        assert!(hits.iter().all(|h| h.media_type == "movie"));
        assert_eq!(hits[0].id, 100);
    }

    #[tokio::test]
    async fn http_failure_is_an_empty_result() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let tmdb = TmdbClient::with_base_url(Client::new(), "key", server.uri());
        assert!(tmdb.search("anything").await.is_empty());
        assert!(tmdb.details(MediaKind::Movie, 1).await.is_none());
    }

    #[tokio::test]
    async fn imdb_ids_resolve_through_find() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/find/tt0111161"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "movie_results": [], "tv_results": [{"id": 42}]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/tv/42"))
            .and(query_param("append_to_response", "credits,similar"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": 42, "name": "Show", "overview": "Plot", "first_air_date": "2001-01-01"
            })))
            .mount(&server)
            .await;

        let tmdb = TmdbClient::with_base_url(Client::new(), "key", server.uri());
        let record = tmdb.find_imdb("tt0111161").await.unwrap();
        assert_eq!(record.kind, MediaKind::Tv);
        assert_eq!(record.title, "Show");
        assert_eq!(record.tmdb_id, Some(42));
    }
}
