// src/ingest/providers/browser.rs
//! Page rendering strategies and the rendered-search scroll session.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::ingest::session::{ScrollSession, SessionError, SessionLauncher};
use crate::ingest::types::RawAssetRef;

static IMG_SRC: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)<img\b[^>]*?\bsrc\s*=\s*["']([^"']+)["']"#).expect("valid img regex")
});

/// Renders a page (JS executed) and returns its DOM as HTML.
#[async_trait]
pub trait PageRenderer: Send + Sync {
    async fn render(&self, url: &str) -> Result<String, SessionError>;

    /// Cheap availability check run when a session is launched.
    async fn probe(&self) -> Result<(), SessionError>;

    fn name(&self) -> &'static str;
}

pub type DynRenderer = Arc<dyn PageRenderer>;

/// `<img src>` values in document order, resolved against `page_url`, http(s)
/// only. Repeats are kept; deduplication belongs to the crawl.
pub fn extract_image_sources(html: &str, page_url: &str) -> Vec<String> {
    let base = url::Url::parse(page_url).ok();
    IMG_SRC
        .captures_iter(html)
        .filter_map(|cap| {
            let raw = html_escape::decode_html_entities(cap[1].trim()).to_string();
            let resolved = match url::Url::parse(&raw) {
                Ok(u) => u,
                Err(_) => base.as_ref()?.join(&raw).ok()?,
            };
            matches!(resolved.scheme(), "http" | "https").then(|| resolved.to_string())
        })
        .collect()
}

/// Fill `{query}` (form-encoded) and `{page}` in a search URL template.
pub fn search_url(template: &str, query: &str, page: u32) -> String {
    let q: String = url::form_urlencoded::byte_serialize(query.as_bytes()).collect();
    template
        .replace("{query}", &q)
        .replace("{page}", &page.to_string())
}

/// Managed rendering service: `POST {base}/content`.
pub struct BrowserlessRenderer {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl BrowserlessRenderer {
    pub fn new(base_url: &str, token: Option<&str>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.filter(|t| !t.is_empty()).map(String::from),
        }
    }

    fn endpoint(&self, path: &str) -> String {
        let mut endpoint = format!("{}/{}", self.base_url, path);
        if let Some(ref token) = self.token {
            endpoint.push_str(&format!("?token={token}"));
        }
        endpoint
    }
}

#[async_trait]
impl PageRenderer for BrowserlessRenderer {
    async fn render(&self, url: &str) -> Result<String, SessionError> {
        let body = serde_json::json!({ "url": url });
        let resp = self
            .client
            .post(self.endpoint("content"))
            .json(&body)
            .send()
            .await
            .map_err(|e| SessionError::Render(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(SessionError::Render(format!(
                "browserless status {}: {}",
                status.as_u16(),
                message.chars().take(200).collect::<String>()
            )));
        }
        resp.text()
            .await
            .map_err(|e| SessionError::Render(e.to_string()))
    }

    async fn probe(&self) -> Result<(), SessionError> {
        let launch_err = |message: String| SessionError::Launch {
            strategy: "browserless",
            message,
        };
        let resp = self
            .client
            .get(self.endpoint("json/version"))
            .send()
            .await
            .map_err(|e| launch_err(e.to_string()))?;
        if resp.status().is_success() {
            Ok(())
        } else {
            Err(launch_err(format!("status {}", resp.status().as_u16())))
        }
    }

    fn name(&self) -> &'static str {
        "browserless"
    }
}

/// Local headless Chromium, `--dump-dom`.
pub struct ChromeRenderer {
    chrome_bin: String,
    timeout: Duration,
}

impl ChromeRenderer {
    pub fn new(chrome_bin: Option<String>, timeout: Duration) -> Self {
        let chrome_bin = chrome_bin
            .filter(|b| !b.is_empty())
            .or_else(|| std::env::var("CHROME_BIN").ok())
            .unwrap_or_else(|| "chromium".to_string());
        Self {
            chrome_bin,
            timeout,
        }
    }
}

#[async_trait]
impl PageRenderer for ChromeRenderer {
    async fn render(&self, url: &str) -> Result<String, SessionError> {
        let parsed = url::Url::parse(url).map_err(|e| SessionError::Render(e.to_string()))?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(SessionError::Render(format!(
                "only http/https URLs allowed, got {}",
                parsed.scheme()
            )));
        }
        let profile = tempfile::tempdir().map_err(|e| SessionError::Render(e.to_string()))?;

        let output = tokio::time::timeout(
            self.timeout,
            tokio::process::Command::new(&self.chrome_bin)
                .args([
                    "--headless",
                    "--no-sandbox",
                    "--disable-gpu",
                    "--disable-dev-shm-usage",
                    &format!("--user-data-dir={}", profile.path().display()),
                    "--dump-dom",
                    url,
                ])
                .kill_on_drop(true)
                .output(),
        )
        .await
        .map_err(|_| SessionError::Render(format!("chrome timed out for {url}")))?
        .map_err(|e| SessionError::Render(e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(SessionError::Render(format!(
                "chrome exited with {}: {}",
                output.status,
                stderr.chars().take(200).collect::<String>()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn probe(&self) -> Result<(), SessionError> {
        let launch_err = |message: String| SessionError::Launch {
            strategy: "chrome",
            message,
        };
        let status = tokio::time::timeout(
            Duration::from_secs(10),
            tokio::process::Command::new(&self.chrome_bin)
                .arg("--version")
                .kill_on_drop(true)
                .output(),
        )
        .await
        .map_err(|_| launch_err("version probe timed out".into()))?
        .map_err(|e| launch_err(e.to_string()))?
        .status;
        if status.success() {
            Ok(())
        } else {
            Err(launch_err(format!("version probe exited with {status}")))
        }
    }

    fn name(&self) -> &'static str {
        "chrome"
    }
}

/// Renders consecutive result pages of a search URL template.
pub struct RenderedSearchSession {
    renderer: DynRenderer,
    template: String,
    query: String,
    page: u32,
}

impl RenderedSearchSession {
    pub fn new(renderer: DynRenderer, template: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            renderer,
            template: template.into(),
            query: query.into(),
            page: 0,
        }
    }
}

#[async_trait]
impl ScrollSession for RenderedSearchSession {
    async fn advance(&mut self) -> Result<Vec<RawAssetRef>, SessionError> {
        self.page += 1;
        let url = search_url(&self.template, &self.query, self.page);
        let html = self.renderer.render(&url).await?;
        let refs: Vec<RawAssetRef> = extract_image_sources(&html, &url)
            .into_iter()
            .map(RawAssetRef::image)
            .collect();
        debug!(target: "crawl", renderer = self.renderer.name(), page = self.page, visible = refs.len(), "page rendered");
        Ok(refs)
    }
}

async fn launch_rendered(
    renderer: &DynRenderer,
    template: &str,
    query: &str,
) -> Result<Box<dyn ScrollSession>, SessionError> {
    renderer.probe().await?;
    Ok(Box::new(RenderedSearchSession::new(
        renderer.clone(),
        template,
        query,
    )))
}

/// Primary strategy: managed rendering service.
pub struct BrowserlessLauncher {
    renderer: DynRenderer,
    template: String,
}

impl BrowserlessLauncher {
    pub fn new(renderer: BrowserlessRenderer, template: impl Into<String>) -> Self {
        Self {
            renderer: Arc::new(renderer),
            template: template.into(),
        }
    }
}

#[async_trait]
impl SessionLauncher for BrowserlessLauncher {
    fn strategy(&self) -> &'static str {
        "browserless"
    }

    async fn launch(&self, query: &str) -> Result<Box<dyn ScrollSession>, SessionError> {
        launch_rendered(&self.renderer, &self.template, query).await
    }
}

/// Fallback strategy: system Chromium.
pub struct ChromeLauncher {
    renderer: DynRenderer,
    template: String,
}

impl ChromeLauncher {
    pub fn new(renderer: ChromeRenderer, template: impl Into<String>) -> Self {
        Self {
            renderer: Arc::new(renderer),
            template: template.into(),
        }
    }
}

#[async_trait]
impl SessionLauncher for ChromeLauncher {
    fn strategy(&self) -> &'static str {
        "chrome"
    }

    async fn launch(&self, query: &str) -> Result<Box<dyn ScrollSession>, SessionError> {
        launch_rendered(&self.renderer, &self.template, query).await
    }
}
