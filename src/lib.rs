//! Postmock
//!
//! Snapshot export for social-post mockups. A caller renders a preview into
//! a [`dom::Document`]; the [`Exporter`] turns the subtree with a given id
//! into a PNG download, inlining every image first so nothing in the output
//! depends on a cross-origin fetch. Cross-origin images are fetched through
//! the [`relay`] endpoint.
//!
//! # Features
//!
//! - **relay** (default): the `GET /relay?url=` image relay, built on axum
//!
//! # Example
//!
//! ```no_run
//! use postmock::{dom::Document, ExportConfig, Exporter};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let mut doc = Document::parse(r#"<body><div id="preview">Hello</div></body>"#);
//! let exporter = Exporter::new(ExportConfig::default())?;
//! let file = exporter.try_export(&mut doc, "preview", "youtube-preview").await?;
//! println!("wrote {}", file.file_name);
//! # Ok(())
//! # }
//! ```

use serde::Deserialize;

pub mod error;
pub use error::{Error, Result};

pub mod data_url;
pub mod device;
pub mod dom;
pub mod download;
pub mod export;
pub mod rendering;
pub mod resolve;

#[cfg(feature = "relay")]
pub mod relay;

pub use device::{DeviceClass, DeviceProfile};
pub use download::{Clock, DirectorySink, DownloadSink, LogNotifier, MemorySink, Notifier, SystemClock};
pub use export::{ExportedFile, Exporter};
pub use resolve::{BlobRegistry, ImageReference, ImageResolver};

/// Configuration for the snapshot exporter
///
/// Defaults follow the web app this crate mirrors: 3x output on desktop,
/// 2x on phones and tablets, a 500ms settle delay and a white background.
///
/// # Examples
///
/// ```
/// let cfg = postmock::ExportConfig::default();
/// assert_eq!(cfg.relay_path, "/relay");
/// assert_eq!(cfg.background_color, "#ffffff");
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// Origin the document is served from; decides same- vs cross-origin
    pub page_origin: String,
    /// Path of the relay endpoint on `page_origin`
    pub relay_path: String,
    /// Device the export runs on
    pub device: DeviceProfile,
    pub mobile_pixel_ratio: f32,
    pub desktop_pixel_ratio: f32,
    /// Upper bound for resolving and decoding a single image
    pub image_wait_ms: u64,
    /// Fixed delay between image substitution and rasterization
    pub settle_ms: u64,
    /// Timeout for each HTTP request made while resolving images
    pub http_timeout_ms: u64,
    /// Fill behind transparent regions (CSS color syntax)
    pub background_color: String,
    /// Width in CSS px for targets without an explicit width
    pub default_width: u32,
    /// Largest canvas the rasterizer may allocate, in device pixels
    pub max_canvas_pixels: u64,
    /// Append a throwaway query pair to direct image fetches
    pub cache_bust: bool,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            page_origin: "http://localhost:3000".to_string(),
            relay_path: "/relay".to_string(),
            device: DeviceProfile::default(),
            mobile_pixel_ratio: 2.0,
            desktop_pixel_ratio: 3.0,
            image_wait_ms: 3000,
            settle_ms: 500,
            http_timeout_ms: 10_000,
            background_color: "#ffffff".to_string(),
            default_width: 600,
            max_canvas_pixels: 4096 * 4096,
            cache_bust: true,
        }
    }
}

impl ExportConfig {
    pub fn page_origin_url(&self) -> Result<url::Url> {
        let url = url::Url::parse(&self.page_origin)
            .map_err(|e| Error::ConfigError(format!("page_origin {:?}: {}", self.page_origin, e)))?;
        match url.scheme() {
            "http" | "https" => Ok(url),
            other => Err(Error::ConfigError(format!(
                "page_origin must be http(s), got {}",
                other
            ))),
        }
    }

    pub fn background_rgba(&self) -> Result<rendering::Rgba> {
        rendering::style::parse_color(&self.background_color).ok_or_else(|| {
            Error::ConfigError(format!("unparseable background_color {:?}", self.background_color))
        })
    }

    /// Check every field that could only fail later, mid-export
    pub fn validate(&self) -> Result<()> {
        self.page_origin_url()?;
        self.background_rgba()?;
        for (name, ratio) in [
            ("mobile_pixel_ratio", self.mobile_pixel_ratio),
            ("desktop_pixel_ratio", self.desktop_pixel_ratio),
        ] {
            if !ratio.is_finite() || ratio <= 0.0 {
                return Err(Error::ConfigError(format!("{} must be positive", name)));
            }
        }
        if self.default_width == 0 {
            return Err(Error::ConfigError("default_width must be positive".into()));
        }
        Ok(())
    }
}
