use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use tracing::{debug, info};

use adaptrag_core::error::{RagError, Result};
use adaptrag_core::types::Document;

/// Fetches web pages and turns each into one plain-text document.
pub struct WebLoader {
    http: reqwest::Client,
}

impl WebLoader {
    pub fn new() -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(concat!("adaptrag/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| RagError::Loader {
                url: String::new(),
                message: format!("failed to create HTTP client: {}", e),
            })?;
        Ok(Self { http })
    }

    /// Load a single URL. Metadata carries `source` and, when present, `title`.
    pub async fn load(&self, url: &str) -> Result<Document> {
        let loader_err = |message: String| RagError::Loader {
            url: url.to_string(),
            message,
        };

        debug!(url = %url, "Fetching source page");
        let resp = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| loader_err(format!("request failed: {}", e)))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(loader_err(format!(
                "HTTP {} {}",
                status.as_u16(),
                status.canonical_reason().unwrap_or("Unknown")
            )));
        }

        let is_html = resp
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.contains("html"));

        let body = resp
            .text()
            .await
            .map_err(|e| loader_err(format!("failed to read body: {}", e)))?;

        Ok(page_to_document(url, &body, is_html))
    }

    /// Load every URL in order. The first failure aborts the load.
    pub async fn load_all(&self, urls: &[String]) -> Result<Vec<Document>> {
        let mut documents = Vec::with_capacity(urls.len());
        for url in urls {
            documents.push(self.load(url).await?);
        }
        info!(count = documents.len(), "Loaded source pages");
        Ok(documents)
    }
}

pub(crate) fn page_to_document(url: &str, body: &str, is_html: bool) -> Document {
    let mut doc = if is_html {
        let mut doc = Document::new(strip_html_tags(body));
        if let Some(title) = extract_title(body) {
            doc = doc.with_metadata("title", serde_json::Value::String(title));
        }
        doc
    } else {
        Document::new(body.trim())
    };
    doc = doc.with_metadata("source", serde_json::Value::String(url.to_string()));
    doc
}

struct HtmlPatterns {
    script: Regex,
    style: Regex,
    tags: Regex,
    title: Regex,
    blank_lines: Regex,
    spaces: Regex,
}

fn patterns() -> &'static HtmlPatterns {
    static PATTERNS: OnceLock<HtmlPatterns> = OnceLock::new();
    PATTERNS.get_or_init(|| HtmlPatterns {
        script: Regex::new(r"(?is)<script[^>]*>.*?</script>").expect("valid script regex"),
        style: Regex::new(r"(?is)<style[^>]*>.*?</style>").expect("valid style regex"),
        tags: Regex::new(r"<[^>]+>").expect("valid tag regex"),
        title: Regex::new(r"(?is)<title[^>]*>(.*?)</title>").expect("valid title regex"),
        blank_lines: Regex::new(r"\n\s*\n(\s*\n)+").expect("valid blank line regex"),
        spaces: Regex::new(r"[ \t]+").expect("valid space regex"),
    })
}

fn extract_title(html: &str) -> Option<String> {
    patterns()
        .title
        .captures(html)
        .map(|c| decode_entities(c[1].trim()))
        .filter(|t| !t.is_empty())
}

fn decode_entities(text: &str) -> String {
    text.replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&#39;", "'")
        .replace("&nbsp;", " ")
}

/// Reduce an HTML page to readable text.
pub fn strip_html_tags(html: &str) -> String {
    let p = patterns();
    let cleaned = p.script.replace_all(html, "");
    let cleaned = p.style.replace_all(&cleaned, "");
    let cleaned = p.title.replace_all(&cleaned, "");
    let text = p.tags.replace_all(&cleaned, "");
    let text = decode_entities(&text);
    let text = p.spaces.replace_all(&text, " ");
    let text = p.blank_lines.replace_all(&text, "\n\n");
    text.trim().to_string()
}
