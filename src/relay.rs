//! Cross-origin image relay.
//!
//! `GET /relay?url=<encoded>` fetches `url` server-side and returns its bytes
//! with `Access-Control-Allow-Origin: *`, so an exporter can inline images
//! from origins that do not send CORS headers. Status codes are part of the
//! contract: 400 when `url` is missing, 500 for any upstream or policy
//! failure, 200 with the upstream `Content-Type` otherwise.
//!
//! Without `allowed_hosts` the relay is an open fetch proxy. Deployments
//! facing the internet should set `allowed_hosts`, `images_only`, or both.

use crate::{Error, Result};
use axum::extract::{Query, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use log::{debug, error, info};
use reqwest::Client;
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

pub const MISSING_URL_MESSAGE: &str = "Missing URL parameter";
pub const FETCH_FAILED_MESSAGE: &str = "Failed to fetch image";

const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Timeout for the whole upstream request
    pub timeout_ms: u64,
    /// Responses larger than this are refused
    pub max_body_bytes: usize,
    /// Refuse upstream responses whose content type is not `image/*`
    pub images_only: bool,
    /// Hosts (and their subdomains) the relay may fetch from; empty = any
    pub allowed_hosts: Vec<String>,
    pub user_agent: String,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 10_000,
            max_body_bytes: 10 * 1024 * 1024,
            images_only: false,
            allowed_hosts: Vec::new(),
            user_agent: concat!("postmock-relay/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl RelayConfig {
    pub fn host_allowed(&self, host: &str) -> bool {
        if self.allowed_hosts.is_empty() {
            return true;
        }
        let host = host.to_ascii_lowercase();
        self.allowed_hosts.iter().any(|allowed| {
            let allowed = allowed.trim().trim_start_matches('.').to_ascii_lowercase();
            host == allowed || host.ends_with(&format!(".{}", allowed))
        })
    }
}

#[derive(Clone)]
pub struct RelayState {
    client: Client,
    config: Arc<RelayConfig>,
}

#[derive(Debug, Deserialize)]
pub struct RelayParams {
    url: Option<String>,
}

struct Upstream {
    content_type: String,
    body: Vec<u8>,
}

impl RelayState {
    pub fn new(config: RelayConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| Error::ConfigError(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            config: Arc::new(config),
        })
    }

    async fn fetch(&self, raw: &str) -> Result<Upstream> {
        let url = Url::parse(raw)?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(Error::InvalidInput(format!("unsupported scheme {}", url.scheme())));
        }
        let host = url.host_str().unwrap_or_default();
        if !self.config.host_allowed(host) {
            return Err(Error::InvalidInput(format!("host {} is not allowed", host)));
        }

        let mut resp = self.client.get(url.clone()).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(Error::NetworkError(format!("upstream returned {}", status)));
        }

        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .unwrap_or_else(|| FALLBACK_CONTENT_TYPE.to_string());
        if self.config.images_only && !content_type.to_ascii_lowercase().starts_with("image/") {
            return Err(Error::InvalidInput(format!("refusing content type {}", content_type)));
        }

        let max = self.config.max_body_bytes;
        if resp.content_length().is_some_and(|len| len > max as u64) {
            return Err(Error::NetworkError(format!("body exceeds {} bytes", max)));
        }
        let mut body = Vec::new();
        while let Some(chunk) = resp.chunk().await? {
            if body.len() + chunk.len() > max {
                return Err(Error::NetworkError(format!("body exceeds {} bytes", max)));
            }
            body.extend_from_slice(&chunk);
        }

        debug!("Relayed {} ({} bytes, {})", url, body.len(), content_type);
        Ok(Upstream { content_type, body })
    }
}

/// Router serving the relay at `/relay` and `/api/proxy`
pub fn router(config: RelayConfig) -> Result<Router> {
    let state = RelayState::new(config)?;
    Ok(Router::new()
        .route("/relay", get(relay))
        .route("/api/proxy", get(relay))
        .route("/healthz", get(healthz))
        .with_state(state))
}

/// Bind `addr` and serve the relay until the process exits
pub async fn serve(addr: SocketAddr, config: RelayConfig) -> Result<()> {
    let app = router(config)?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("relay listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}

async fn relay(State(state): State<RelayState>, Query(params): Query<RelayParams>) -> Response {
    let Some(url) = params.url.filter(|u| !u.trim().is_empty()) else {
        return plain(StatusCode::BAD_REQUEST, MISSING_URL_MESSAGE);
    };

    match state.fetch(&url).await {
        Ok(upstream) => {
            let content_type = HeaderValue::from_str(&upstream.content_type)
                .unwrap_or_else(|_| HeaderValue::from_static(FALLBACK_CONTENT_TYPE));
            let mut resp = (StatusCode::OK, upstream.body).into_response();
            let headers = resp.headers_mut();
            headers.insert(header::CONTENT_TYPE, content_type);
            headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
            resp
        }
        Err(e) => {
            error!("Proxy error for {}: {}", url, e);
            plain(StatusCode::INTERNAL_SERVER_ERROR, FETCH_FAILED_MESSAGE)
        }
    }
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

fn plain(status: StatusCode, message: &'static str) -> Response {
    (
        status,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        message,
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_relay_allows_any_host() {
        assert!(RelayConfig::default().host_allowed("i.ytimg.com"));
    }

    #[test]
    fn allow_list_matches_hosts_and_subdomains() {
        let cfg = RelayConfig {
            allowed_hosts: vec!["ytimg.com".into(), ".licdn.com".into()],
            ..Default::default()
        };
        assert!(cfg.host_allowed("ytimg.com"));
        assert!(cfg.host_allowed("I.YTIMG.com"));
        assert!(cfg.host_allowed("media.licdn.com"));
        assert!(!cfg.host_allowed("evilytimg.com"));
        assert!(!cfg.host_allowed("169.254.169.254"));
    }

    #[tokio::test]
    async fn policy_rejections_happen_before_any_request() {
        let state = RelayState::new(RelayConfig {
            allowed_hosts: vec!["example.com".into()],
            ..Default::default()
        })
        .unwrap();
        assert!(state.fetch("http://127.0.0.1:9/x.png").await.is_err());
        assert!(state.fetch("file:///etc/passwd").await.is_err());
        assert!(state.fetch("not a url").await.is_err());
    }
}
