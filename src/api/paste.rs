use async_trait::async_trait;
use reqwest::Client;
use tracing::warn;

const DPASTE_ENDPOINT: &str = "https://dpaste.com/api/";
pub const ATTACHMENT_NAME: &str = "post.html";

#[async_trait]
pub trait PasteService: Send + Sync {
    /// Stores `content` and returns its public URL, or `None` on any failure.
    async fn create(&self, content: &str) -> Option<String>;
}

pub struct Dpaste {
    client: Client,
    endpoint: String,
    expiry_days: u32,
}

impl Dpaste {
    pub fn new(client: Client, expiry_days: u32) -> Self {
        Self::with_endpoint(client, expiry_days, DPASTE_ENDPOINT)
    }

    pub fn with_endpoint(client: Client, expiry_days: u32, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            expiry_days,
        }
    }
}

#[async_trait]
impl PasteService for Dpaste {
    async fn create(&self, content: &str) -> Option<String> {
        if content.is_empty() {
            return None;
        }

        let expiry = self.expiry_days.to_string();
        let form = [
            ("content", content),
            ("syntax", "html"),
            ("expiry_days", expiry.as_str()),
            ("title", "Blogger Code"),
        ];
        let resp = match self.client.post(&self.endpoint).form(&form).send().await {
            Ok(resp) => resp,
            Err(err) => {
                warn!("dpaste request failed: {}", err);
                return None;
            }
        };

        let status = resp.status();
        if !status.is_success() {
            warn!("dpaste rejected the paste (HTTP {})", status.as_u16());
            return None;
        }
        let body = resp.text().await.unwrap_or_default();
        let link = body.trim();
        if link.contains("dpaste.com") {
            Some(link.to_string())
        } else {
            warn!("dpaste returned no link (HTTP {})", status.as_u16());
            None
        }
    }
}

/// How generated HTML reaches the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    Link(String),
    Attachment { file_name: String, bytes: Vec<u8> },
}

/// Pastes `html`; when the service gives no link the exact bytes go out as a
/// file instead.
pub async fn deliver_html(paste: &dyn PasteService, html: &str) -> Delivery {
    match paste.create(html).await {
        Some(link) => Delivery::Link(link),
        None => Delivery::Attachment {
            file_name: ATTACHMENT_NAME.to_string(),
            bytes: html.as_bytes().to_vec(),
        },
    }
}
