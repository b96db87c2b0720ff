//! Image source resolution.
//!
//! Every `<img src>` in an exported subtree is rewritten to a `data:` URL
//! before rasterization. Sources are classified into [`ImageReference`]
//! variants and fetched the cheapest way that avoids cross-origin taint:
//! blobs come from the in-process [`BlobRegistry`], same-origin URLs are
//! fetched directly, and everything else goes through the relay endpoint.

use crate::data_url::{self, DataUrl};
use crate::{Error, ExportConfig, Result};
use log::{debug, warn};
use reqwest::header::{CONTENT_TYPE, USER_AGENT};
use reqwest::Client;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use url::Url;

/// How an image source must be fetched
#[derive(Debug, Clone, PartialEq)]
pub enum ImageReference {
    /// Already inline
    Data,
    /// `blob:` object URL owned by this process
    Blob(String),
    /// Same origin as the page, fetched directly
    SameOrigin(Url),
    /// Another origin, fetched through the relay
    CrossOrigin(Url),
    /// A scheme nothing here can fetch (`file:`, `ftp:`, garbage)
    Unsupported,
}

impl ImageReference {
    /// Classify `src` relative to the page origin. Relative URLs are joined
    /// to `page_origin` and therefore count as same-origin.
    pub fn classify(src: &str, page_origin: &Url) -> Self {
        let src = src.trim();
        if data_url::is_data_url(src) {
            return ImageReference::Data;
        }
        if data_url::has_scheme(src, "blob:") {
            return ImageReference::Blob(src.to_string());
        }
        let url = match page_origin.join(src) {
            Ok(u) => u,
            Err(_) => return ImageReference::Unsupported,
        };
        match url.scheme() {
            "http" | "https" if url.origin() == page_origin.origin() => {
                ImageReference::SameOrigin(url)
            }
            "http" | "https" => ImageReference::CrossOrigin(url),
            _ => ImageReference::Unsupported,
        }
    }
}

/// Registry of `blob:` object URLs, the in-process stand-in for
/// `URL.createObjectURL`.
#[derive(Debug, Clone, Default)]
pub struct BlobRegistry {
    inner: Arc<Mutex<HashMap<String, DataUrl>>>,
}

impl BlobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register bytes and return a `blob:{origin}/{uuid}` URL for them
    pub fn create_object_url(&self, origin: &Url, mime: &str, bytes: Vec<u8>) -> String {
        let url = format!(
            "blob:{}/{}",
            origin.origin().ascii_serialization(),
            uuid::Uuid::new_v4()
        );
        if let Ok(mut map) = self.inner.lock() {
            map.insert(url.clone(), DataUrl::new(mime, bytes));
        }
        url
    }

    pub fn revoke_object_url(&self, url: &str) {
        if let Ok(mut map) = self.inner.lock() {
            map.remove(url);
        }
    }

    pub fn get(&self, url: &str) -> Option<DataUrl> {
        self.inner.lock().ok().and_then(|m| m.get(url).cloned())
    }
}

/// Resolves image sources to self-contained `data:` URLs
#[derive(Clone)]
pub struct ImageResolver {
    client: Client,
    page_origin: Url,
    relay_path: String,
    user_agent: String,
    cache_bust: bool,
    blobs: BlobRegistry,
}

impl ImageResolver {
    pub fn new(config: &ExportConfig, blobs: BlobRegistry) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.http_timeout_ms))
            .build()
            .map_err(|e| Error::ConfigError(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            page_origin: config.page_origin_url()?,
            relay_path: config.relay_path.clone(),
            user_agent: config.device.user_agent.clone(),
            cache_bust: config.cache_bust,
            blobs,
        })
    }

    pub fn page_origin(&self) -> &Url {
        &self.page_origin
    }

    pub fn blobs(&self) -> &BlobRegistry {
        &self.blobs
    }

    pub fn classify(&self, src: &str) -> ImageReference {
        ImageReference::classify(src, &self.page_origin)
    }

    /// `{origin}{relay_path}?url=<encoded target>`
    pub fn relay_url(&self, target: &Url) -> Result<Url> {
        let mut url = self.page_origin.join(&self.relay_path)?;
        url.query_pairs_mut().append_pair("url", target.as_str());
        Ok(url)
    }

    /// Best-effort resolution: on any failure the original `src` is
    /// returned unchanged.
    pub async fn resolve(&self, src: &str) -> String {
        match self.try_resolve(src).await {
            Ok(resolved) => resolved,
            Err(e) => {
                warn!("Image resolution failed for {}: {}", truncate(src), e);
                src.to_string()
            }
        }
    }

    /// Resolve `src` to a `data:` URL, reporting failures
    pub async fn try_resolve(&self, src: &str) -> Result<String> {
        match self.classify(src) {
            ImageReference::Data => Ok(src.to_string()),
            ImageReference::Blob(url) => self
                .blobs
                .get(&url)
                .map(|d| d.to_url())
                .ok_or_else(|| Error::NetworkError(format!("unknown or revoked blob {}", url))),
            ImageReference::SameOrigin(mut url) => {
                if self.cache_bust {
                    let stamp = chrono::Utc::now().timestamp_millis().to_string();
                    url.query_pairs_mut().append_pair("_cb", &stamp);
                }
                debug!("Fetching same-origin image {}", url);
                self.fetch(url).await
            }
            ImageReference::CrossOrigin(url) => {
                let relayed = self.relay_url(&url)?;
                debug!("Fetching {} through relay", url);
                self.fetch(relayed).await
            }
            ImageReference::Unsupported => Err(Error::InvalidInput(format!(
                "unsupported image source {}",
                truncate(src)
            ))),
        }
    }

    async fn fetch(&self, url: Url) -> Result<String> {
        let resp = self
            .client
            .get(url.clone())
            .header(USER_AGENT, self.user_agent.as_str())
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(Error::NetworkError(format!("GET {} returned {}", url, status)));
        }

        let declared = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());
        let bytes = resp.bytes().await?;
        let mime = data_url::media_type(declared.as_deref(), &bytes);
        Ok(DataUrl::new(mime, bytes.to_vec()).to_url())
    }
}

// Data URLs make unreadable log lines
fn truncate(src: &str) -> String {
    const MAX: usize = 80;
    if src.len() <= MAX {
        return src.to_string();
    }
    let mut end = MAX;
    while !src.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &src[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn origin() -> Url {
        Url::parse("http://localhost:3000/").unwrap()
    }

    #[test]
    fn classify_covers_every_variant() {
        let o = origin();
        assert_eq!(
            ImageReference::classify("data:image/png;base64,AA==", &o),
            ImageReference::Data
        );
        assert!(matches!(
            ImageReference::classify("blob:http://localhost:3000/abc", &o),
            ImageReference::Blob(_)
        ));
        assert!(matches!(
            ImageReference::classify("/avatars/me.png", &o),
            ImageReference::SameOrigin(_)
        ));
        assert!(matches!(
            ImageReference::classify("http://localhost:3000/a.png", &o),
            ImageReference::SameOrigin(_)
        ));
        assert!(matches!(
            ImageReference::classify("https://i.ytimg.com/vi/x/hq.jpg", &o),
            ImageReference::CrossOrigin(_)
        ));
        // different port is a different origin
        assert!(matches!(
            ImageReference::classify("http://localhost:4000/a.png", &o),
            ImageReference::CrossOrigin(_)
        ));
        assert_eq!(
            ImageReference::classify("file:///etc/passwd", &o),
            ImageReference::Unsupported
        );
    }

    #[test]
    fn non_ascii_sources_classify_without_panicking() {
        let o = origin();
        match ImageReference::classify("/ñoño.png", &o) {
            ImageReference::SameOrigin(url) => assert_eq!(url.path(), "/%C3%B1o%C3%B1o.png"),
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(
            ImageReference::classify("blöb.png", &o),
            ImageReference::SameOrigin(_)
        ));
    }

    #[test]
    fn relay_url_encodes_target() {
        let resolver = ImageResolver::new(&ExportConfig::default(), BlobRegistry::new()).unwrap();
        let target = Url::parse("https://cdn.example.com/a b.png?x=1&y=2").unwrap();
        let relayed = resolver.relay_url(&target).unwrap();
        assert_eq!(relayed.path(), "/relay");
        let (k, v) = relayed.query_pairs().next().unwrap();
        assert_eq!(k, "url");
        assert_eq!(v, target.as_str());
    }

    #[test]
    fn blob_registry_roundtrip_and_revoke() {
        let blobs = BlobRegistry::new();
        let url = blobs.create_object_url(&origin(), "image/png", vec![9, 9]);
        assert!(url.starts_with("blob:http://localhost:3000/"));
        assert_eq!(blobs.get(&url).unwrap().bytes, vec![9, 9]);
        blobs.revoke_object_url(&url);
        assert!(blobs.get(&url).is_none());
    }

    #[tokio::test]
    async fn data_and_blob_sources_need_no_network() {
        let blobs = BlobRegistry::new();
        let cfg = ExportConfig {
            // unroutable: any network call would fail
            page_origin: "http://127.0.0.1:9".into(),
            ..Default::default()
        };
        let resolver = ImageResolver::new(&cfg, blobs.clone()).unwrap();

        let inline = "data:image/gif;base64,R0lGODlhAQABAAAAACw=";
        assert_eq!(resolver.try_resolve(inline).await.unwrap(), inline);

        let blob = blobs.create_object_url(resolver.page_origin(), "image/png", vec![1, 2, 3]);
        let resolved = resolver.try_resolve(&blob).await.unwrap();
        assert_eq!(DataUrl::parse(&resolved).unwrap().bytes, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn failures_return_the_original_reference() {
        let resolver = ImageResolver::new(&ExportConfig::default(), BlobRegistry::new()).unwrap();
        let src = "blob:http://localhost:3000/missing";
        assert_eq!(resolver.resolve(src).await, src);
        assert_eq!(resolver.resolve("ftp://x/y.png").await, "ftp://x/y.png");
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        let long = "é".repeat(100);
        let t = truncate(&long);
        assert!(t.ends_with("..."));
        assert!(t.len() <= 83);
    }
}
