use reqwest::Client;
use reqwest::multipart::{Form, Part};
use tracing::warn;

const CATBOX_ENDPOINT: &str = "https://catbox.moe/user/api.php";

/// Anonymous image hosting, used for posters sent as Telegram photos.
pub struct Catbox {
    client: Client,
    endpoint: String,
}

impl Catbox {
    pub fn new(client: Client) -> Self {
        Self::with_endpoint(client, CATBOX_ENDPOINT)
    }

    pub fn with_endpoint(client: Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }

    /// Returns the public URL, or `None` if the host did not answer with one.
    pub async fn upload(&self, bytes: Vec<u8>, file_name: &str) -> Option<String> {
        let form = Form::new()
            .text("reqtype", "fileupload")
            .part("fileToUpload", Part::bytes(bytes).file_name(file_name.to_string()));

        let resp = match self.client.post(&self.endpoint).multipart(form).send().await {
            Ok(resp) => resp,
            Err(err) => {
                warn!("file host upload failed: {}", err);
                return None;
            }
        };

        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        let url = body.trim();
        if status.is_success() && url.starts_with("http") {
            Some(url.to_string())
        } else {
            warn!("file host rejected upload (HTTP {}): {}", status.as_u16(), url);
            None
        }
    }
}
