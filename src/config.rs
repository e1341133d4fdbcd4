use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub bot_token: String,
    #[serde(rename = "tmdb_api_key", default)]
    pub tmdb_key: String,
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default = "default_font_bold")]
    pub font_bold: PathBuf,
    #[serde(default = "default_font_regular")]
    pub font_regular: PathBuf,
    #[serde(default = "default_face_model")]
    pub face_model: PathBuf,
    #[serde(default = "default_keepalive_port")]
    pub keepalive_port: u16,
    #[serde(default = "default_ad_link")]
    pub default_ad_link: String,
    /// Redirects appended to every generated post, after the user's own.
    #[serde(default)]
    pub operator_ad_links: Vec<String>,
    #[serde(default = "default_render_workers")]
    pub render_workers: usize,
    #[serde(default = "default_render_timeout_secs")]
    pub render_timeout_secs: u64,
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
    #[serde(default = "default_paste_expiry_days")]
    pub paste_expiry_days: u32,
    #[serde(default = "default_countdown_secs")]
    pub countdown_secs: u32,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_font_bold() -> PathBuf {
    PathBuf::from("assets/Poppins-Bold.ttf")
}

fn default_font_regular() -> PathBuf {
    PathBuf::from("assets/Poppins-Regular.ttf")
}

fn default_face_model() -> PathBuf {
    PathBuf::from("assets/seeta_fd_frontal_v1.0.bin")
}

fn default_keepalive_port() -> u16 {
    8080
}

fn default_ad_link() -> String {
    "https://www.google.com".to_string()
}

fn default_render_workers() -> usize {
    2
}

fn default_render_timeout_secs() -> u64 {
    60
}

fn default_http_timeout_secs() -> u64 {
    10
}

fn default_paste_expiry_days() -> u32 {
    14
}

fn default_countdown_secs() -> u32 {
    10
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            tmdb_key: String::new(),
            data_dir: default_data_dir(),
            font_bold: default_font_bold(),
            font_regular: default_font_regular(),
            face_model: default_face_model(),
            keepalive_port: default_keepalive_port(),
            default_ad_link: default_ad_link(),
            operator_ad_links: Vec::new(),
            render_workers: default_render_workers(),
            render_timeout_secs: default_render_timeout_secs(),
            http_timeout_secs: default_http_timeout_secs(),
            paste_expiry_days: default_paste_expiry_days(),
            countdown_secs: default_countdown_secs(),
        }
    }
}

impl Config {
    /// Reads `path` if it exists, then applies environment overrides
    /// (`BOT_TOKEN`, `TMDB_API_KEY`, `PORT`, `DATA_DIR`, also from `.env`).
    pub async fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Self::read(path).await?;
        config.validate()?;
        Ok(config)
    }

    /// Like [`Config::load`] but only the TMDB key is required, for tools
    /// that never talk to Telegram.
    pub async fn load_offline<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Self::read(path).await?;
        config.validate_tmdb()?;
        Ok(config)
    }

    async fn read(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if fs::try_exists(path).await.unwrap_or(false) {
            let content = fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read config: {}", path.display()))?;
            serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse config: {}", path.display()))?
        } else {
            Config::default()
        };

        dotenvy::dotenv().ok();
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(token) = var("BOT_TOKEN").filter(|v| !v.is_empty()) {
            self.bot_token = token;
        }
        if let Some(key) = var("TMDB_API_KEY").filter(|v| !v.is_empty()) {
            self.tmdb_key = key;
        }
        if let Some(port) = var("PORT").filter(|v| !v.is_empty()) {
            self.keepalive_port = port
                .parse()
                .with_context(|| format!("PORT is not a valid port: {port}"))?;
        }
        if let Some(dir) = var("DATA_DIR").filter(|v| !v.is_empty()) {
            self.data_dir = PathBuf::from(dir);
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.bot_token.is_empty() {
            anyhow::bail!("config: bot_token missing (set BOT_TOKEN)");
        }
        self.validate_tmdb()
    }

    fn validate_tmdb(&self) -> Result<()> {
        if self.tmdb_key.is_empty() {
            anyhow::bail!("config: tmdb_api_key missing (set TMDB_API_KEY)");
        }
        if self.render_workers == 0 {
            anyhow::bail!("config: render_workers must be at least 1");
        }
        Ok(())
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn render_timeout(&self) -> Duration {
        Duration::from_secs(self.render_timeout_secs)
    }

    /// Builds the shared HTTP client used by every outbound call.
    pub fn http_client(&self) -> Result<reqwest::Client> {
        reqwest::Client::builder()
            .user_agent("Mozilla/5.0")
            .timeout(self.http_timeout())
            .build()
            .context("Failed to build HTTP client")
    }

    pub fn ad_links_file(&self) -> PathBuf {
        self.data_dir.join("user_ad_links.json")
    }

    pub fn channels_file(&self) -> PathBuf {
        self.data_dir.join("user_channels.json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn file_values_fill_defaults() {
        let config: Config =
            serde_json::from_str(r#"{"bot_token":"t","tmdb_api_key":"k","render_workers":4}"#)
                .unwrap();
        assert_eq!(config.render_workers, 4);
        assert_eq!(config.keepalive_port, 8080);
        assert_eq!(config.default_ad_link, "https://www.google.com");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn env_overrides_file() {
        let env: HashMap<&str, &str> = [("BOT_TOKEN", "env-token"), ("PORT", "9000")].into();
        let mut config = Config {
            bot_token: "file-token".into(),
            tmdb_key: "k".into(),
            ..Config::default()
        };
        config
            .apply_env(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.bot_token, "env-token");
        assert_eq!(config.keepalive_port, 9000);
        assert_eq!(config.tmdb_key, "k");
    }

    #[test]
    fn missing_secrets_are_fatal() {
        let config = Config {
            bot_token: "t".into(),
            ..Config::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("tmdb_api_key"));
    }

    #[test]
    fn offline_tools_only_need_the_tmdb_key() {
        let config = Config {
            tmdb_key: "k".into(),
            ..Config::default()
        };
        assert!(config.validate().is_err());
        assert!(config.validate_tmdb().is_ok());
    }

    #[test]
    fn bad_port_is_rejected() {
        let mut config = Config::default();
        assert!(config.apply_env(|key| (key == "PORT").then(|| "http".to_string())).is_err());
    }
}
