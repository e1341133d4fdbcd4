use crate::media::{DownloadLink, MediaRecord};
use chrono::Utc;

pub(crate) fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

/// Builds the ordered list of redirects a viewer must visit before a link is
/// revealed: the user's links rotated by `rotation` (or the default link when
/// the user has none), then the operator's links.
pub fn redirect_chain(
    user_links: &[String],
    default_link: &str,
    operator_links: &[String],
    rotation: usize,
) -> Vec<String> {
    let mut chain: Vec<String> = if user_links.is_empty() {
        vec![default_link.to_string()]
    } else {
        let mut links = user_links.to_vec();
        let len = links.len();
        links.rotate_left(rotation % len);
        links
    };
    chain.extend(operator_links.iter().filter(|l| !l.is_empty()).cloned());
    chain
}

fn download_block(link: &DownloadLink) -> String {
    format!(
        r##"
    <div class="dl-download-block">
        <button class="dl-download-button" data-url="{url}" data-click-count="0">⬇️ {label}</button>
        <div class="dl-timer-display" style="display:none;color:#e53935;font-weight:bold;">Please Wait...</div>
        <a href="#" class="dl-real-download-link" target="_blank" rel="noopener" style="display:none;">✅ Get Link</a>
    </div>"##,
        url = escape_html(&link.url),
        label = escape_html(&link.label),
    )
}

/// JSON array literal safe to embed inside a `<script>` element.
fn js_string_array(items: &[String]) -> String {
    serde_json::to_string(items)
        .unwrap_or_else(|_| "[]".to_string())
        .replace("</", "<\\/")
}

pub fn generate_html(
    record: &MediaRecord,
    links: &[DownloadLink],
    redirects: &[String],
    countdown_secs: u32,
) -> String {
    let poster = record.poster_url().unwrap_or_default();
    let title = escape_html(record.display_title());
    let year = escape_html(&record.year());
    let overview = escape_html(&record.overview);
    let mut info = Vec::new();
    if !record.language.is_empty() {
        info.push(format!("🗣️ {}", escape_html(&record.language)));
    }
    if !record.quality.is_empty() {
        info.push(format!("💿 {}", escape_html(&record.quality)));
    }
    let links_html: String = links.iter().map(download_block).collect();

    format!(
        r#"<!-- Generated {generated} UTC -->
<style>
    .dl-post {{ text-align:center; font-family:sans-serif; }}
    .dl-post img {{ width:200px; border-radius:10px; box-shadow:0 4px 12px rgba(0,0,0,.4); }}
    .dl-download-block {{ margin:12px auto; text-align:center; }}
    .dl-download-button {{ background:#1e88e5; color:#fff; border:0; border-radius:6px; padding:10px 22px; font-size:16px; cursor:pointer; }}
    .dl-real-download-link {{ background:#43a047; color:#fff; border-radius:6px; padding:10px 22px; text-decoration:none; }}
</style>
<div class="dl-post">
    <img src="{poster}" alt="{title}">
    <h2>{title} ({year})</h2>
    <p class="dl-info">{info}</p>
    <p>{overview}</p>
</div>
<div id="dl-container">{links_html}
</div>
<script>
(function () {{
    var DL_REDIRECTS = {redirects};
    var DL_COUNTDOWN = {countdown};
    document.querySelectorAll('.dl-download-button').forEach(function (btn) {{
        btn.addEventListener('click', function () {{
            var clicks = parseInt(btn.getAttribute('data-click-count'), 10) || 0;
            var timer = btn.nextElementSibling;
            var real = timer.nextElementSibling;
            if (clicks < DL_REDIRECTS.length) {{
                window.open(DL_REDIRECTS[clicks], '_blank');
                btn.setAttribute('data-click-count', String(clicks + 1));
                btn.innerText = clicks + 1 < DL_REDIRECTS.length
                    ? 'Click Again (' + (clicks + 1) + '/' + DL_REDIRECTS.length + ')'
                    : 'Click Again to Start';
                return;
            }}
            btn.style.display = 'none';
            timer.style.display = 'block';
            var left = DL_COUNTDOWN;
            timer.innerText = 'Please wait ' + left + 's...';
            var tick = setInterval(function () {{
                left -= 1;
                if (left > 0) {{
                    timer.innerText = 'Please wait ' + left + 's...';
                    return;
                }}
                clearInterval(tick);
                timer.style.display = 'none';
                real.href = btn.getAttribute('data-url');
                real.style.display = 'inline-block';
            }}, 1000);
        }});
    }});
}})();
</script>
"#,
        generated = Utc::now().format("%Y-%m-%d %H:%M"),
        poster = escape_html(&poster),
        title = title,
        year = year,
        info = info.join(" | "),
        overview = overview,
        links_html = links_html,
        redirects = js_string_array(redirects),
        countdown = countdown_secs,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn links(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn chain_uses_default_when_user_has_none() {
        let chain = redirect_chain(&[], "https://default.example", &links(&["https://op.example"]), 3);
        assert_eq!(chain, links(&["https://default.example", "https://op.example"]));
    }

    #[test]
    fn chain_rotates_user_links_only() {
        let user = links(&["a", "b", "c"]);
        let chain = redirect_chain(&user, "d", &links(&["op"]), 4);
        assert_eq!(chain, links(&["b", "c", "a", "op"]));
    }

    #[test]
    fn html_escapes_text_and_embeds_redirects() {
        let mut record = MediaRecord::manual("Tom & \"Jerry\"");
        record.overview = "<script>alert(1)</script>".into();
        record.language = "Hindi".into();
        let html = generate_html(
            &record,
            &[DownloadLink {
                label: "720p <HD>".into(),
                url: "https://x.example/?a=1&b=2".into(),
            }],
            &links(&["https://ad.example/</script>"]),
            10,
        );

        assert!(html.contains("Tom &amp; &quot;Jerry&quot;"));
        assert!(html.contains("&lt;script&gt;alert(1)&lt;/script&gt;"));
        assert!(html.contains(r#"data-url="https://x.example/?a=1&amp;b=2""#));
        assert!(html.contains("⬇️ 720p &lt;HD&gt;"));
        assert!(html.contains(r#"var DL_REDIRECTS = ["https://ad.example/<\/script>"];"#));
        assert!(html.contains("var DL_COUNTDOWN = 10;"));
        assert!(html.contains("🗣️ Hindi"));
        assert_eq!(html.matches("dl-download-block\"").count(), 1);
    }

    #[test]
    fn each_link_gets_a_hidden_reveal_anchor() {
        let block = download_block(&DownloadLink {
            label: "Server 2".into(),
            url: "https://dl.example/b".into(),
        });
        assert!(block.contains(r##"<a href="#" class="dl-real-download-link""##));
        assert!(block.contains(r#"data-url="https://dl.example/b""#));
        assert!(block.contains("⬇️ Server 2"));

        let downloads = [
            DownloadLink { label: "A".into(), url: "https://a.example".into() },
            DownloadLink { label: "B".into(), url: "https://b.example".into() },
        ];
        let html = generate_html(&MediaRecord::manual("Two"), &downloads, &links(&["x"]), 5);
        assert_eq!(html.matches("class=\"dl-real-download-link\"").count(), 2);
    }
}
