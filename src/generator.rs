use crate::caption::generate_caption;
use crate::config::Config;
use crate::html::{generate_html, redirect_chain};
use crate::media::{DownloadLink, FinishedPost, MediaRecord};
use crate::poster::Compositor;
use crate::{logi, logok, logw};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use reqwest::Client;
use std::time::{SystemTime, UNIX_EPOCH};

fn now_seed() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}

/// Which of the user's ad links leads the redirect chain for this post.
fn pick_rotation(user_links: &[String]) -> usize {
    if user_links.len() < 2 {
        return 0;
    }
    let mut rng = StdRng::seed_from_u64(now_seed());
    rng.gen_range(0..user_links.len())
}

/// Turns a completed draft into the image, caption and HTML that make up a
/// post.
#[derive(Clone)]
pub struct PostGenerator {
    client: Client,
    compositor: Compositor,
    default_ad_link: String,
    operator_ad_links: Vec<String>,
    countdown_secs: u32,
}

impl PostGenerator {
    pub fn new(cfg: &Config, client: Client, compositor: Compositor) -> Self {
        Self {
            client,
            compositor,
            default_ad_link: cfg.default_ad_link.clone(),
            operator_ad_links: cfg.operator_ad_links.clone(),
            countdown_secs: cfg.countdown_secs,
        }
    }

    /// Never fails: a post without an image is still a post.
    pub async fn generate_post(
        &self,
        record: &MediaRecord,
        links: &[DownloadLink],
        user_ad_links: &[String],
    ) -> FinishedPost {
        let title = record.display_title().to_string();
        logi(format!("Generating post for {} ({} links)", title, links.len()));

        let image = match self.compositor.render_post_image(&self.client, record).await {
            Ok(bytes) => {
                logok(format!("Rendered image for {} ({} bytes)", title, bytes.len()));
                Some(bytes)
            }
            Err(err) => {
                logw(format!("Image for {} unavailable: {}", title, err));
                None
            }
        };

        let redirects = redirect_chain(
            user_ad_links,
            &self.default_ad_link,
            &self.operator_ad_links,
            pick_rotation(user_ad_links),
        );
        let html = generate_html(record, links, &redirects, self.countdown_secs);
        let caption = generate_caption(record);
        logok(format!(
            "Post ready for {} (html {} bytes, {} redirects)",
            title,
            html.len(),
            redirects.len()
        ));

        FinishedPost {
            title,
            html,
            caption,
            image,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::poster::badge::tests::FixedFaces;
    use crate::poster::fonts::Fonts;
    use crate::poster::pool::RenderPool;
    use std::sync::Arc;
    use std::time::Duration;

    fn generator(cfg: &Config) -> PostGenerator {
        let compositor = Compositor::new(
            Fonts::fallback(),
            Arc::new(FixedFaces(vec![])),
            RenderPool::new(1, Duration::from_secs(10)),
        );
        PostGenerator::new(cfg, Client::new(), compositor)
    }

    #[test]
    fn rotation_stays_in_range() {
        assert_eq!(pick_rotation(&[]), 0);
        assert_eq!(pick_rotation(&["a".into()]), 0);
        let links: Vec<String> = (0..5).map(|i| i.to_string()).collect();
        for _ in 0..50 {
            assert!(pick_rotation(&links) < 5);
        }
    }

    #[tokio::test]
    async fn post_without_artwork_still_has_text_parts() {
        let cfg = Config {
            default_ad_link: "https://default.example/ad".into(),
            operator_ad_links: vec!["https://operator.example/ad".into()],
            countdown_secs: 7,
            ..Config::default()
        };
        let mut record = MediaRecord::manual("Quiet Place");
        record.overview = "A short plot.".into();
        record.language = "hindi".into();
        let links = vec![DownloadLink {
            label: "Server 1".into(),
            url: "https://dl.example/file".into(),
        }];

        let post = generator(&cfg).generate_post(&record, &links, &[]).await;

        assert_eq!(post.title, "Quiet Place");
        assert!(post.image.is_none());
        assert!(post.caption.contains("Quiet Place"));
        assert!(post.html.contains("https://dl.example/file"));
        assert!(post.html.contains("https://default.example/ad"));
        assert!(post.html.contains("https://operator.example/ad"));
        assert!(post.html.contains("var DL_COUNTDOWN = 7;"));
    }

    #[tokio::test]
    async fn user_links_replace_the_default_link() {
        let cfg = Config {
            default_ad_link: "https://default.example/ad".into(),
            ..Config::default()
        };
        let user = vec!["https://mine.example/a".to_string(), "https://mine.example/b".to_string()];
        let post = generator(&cfg)
            .generate_post(&MediaRecord::manual("X"), &[], &user)
            .await;
        assert!(!post.html.contains("https://default.example/ad"));
        assert!(post.html.contains("https://mine.example/a"));
        assert!(post.html.contains("https://mine.example/b"));
    }
}
