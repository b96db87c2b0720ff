//! Snapshot export.
//!
//! [`Exporter::export_as_image`] turns the subtree with a given id into a
//! PNG download:
//!
//! 1. look the target up among attached nodes (missing → fail fast)
//! 2. pick a pixel ratio from the device profile
//! 3. attach an off-screen working copy of the target
//! 4. inline and decode every `<img>`, concurrently, each under a bounded wait
//! 5. sleep a fixed settle delay
//! 6. rasterize, retrying once at a lower ratio
//! 7. hand a temporary `<a download>` anchor to the download sink
//!
//! The working copy is removed on every exit path. Failures never escape
//! `export_as_image`; they surface as a single notifier alert.

use crate::data_url::{self, DataUrl};
use crate::dom::{Document, NodeId};
use crate::download::{Clock, DirectorySink, DownloadSink, LogNotifier, Notifier, SystemClock};
use crate::rendering::{
    DecodedImages, RasterOptions, RasterResult, Rasterizer, Rgba, SoftwareRasterizer,
};
use crate::resolve::{BlobRegistry, ImageResolver};
use crate::{Error, ExportConfig, Result};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use futures::FutureExt;
use log::{error, info, warn};
use std::future::Future;
use std::ops::{Deref, DerefMut};
use std::panic::AssertUnwindSafe;
use std::time::Duration;

pub const TARGET_NOT_FOUND_MESSAGE: &str = "Export failed: Content area not found.";
pub const EXPORT_FAILED_MESSAGE: &str =
    "Export failed. Please try again or check your browser permissions.";

/// Marks the host element of a working copy
pub const WORKING_COPY_ATTR: &str = "data-export-working-copy";
const OFFSCREEN_STYLE: &str = "position:fixed;left:-100000px;top:0;pointer-events:none";

/// A completed export
#[derive(Debug, Clone, PartialEq)]
pub struct ExportedFile {
    pub file_name: String,
    pub width: u32,
    pub height: u32,
    pub pixel_ratio: f32,
    pub size_bytes: usize,
}

/// `2024-05-01T12-34-56`: ISO-8601 to the second with `:` and `.` replaced
pub fn file_timestamp(now: DateTime<Utc>) -> String {
    now.format("%Y-%m-%dT%H-%M-%S").to_string()
}

/// Off-screen clone of the export target. Dropping it detaches the clone
/// from the document, including on early returns and unwinding.
struct WorkingCopy<'d> {
    doc: &'d mut Document,
    host: NodeId,
    root: NodeId,
}

impl<'d> WorkingCopy<'d> {
    fn attach(doc: &'d mut Document, target: NodeId) -> Result<Self> {
        let parent = doc.body().unwrap_or_else(|| doc.root());
        let root = doc.deep_clone(target)?;
        let host = doc.create_element(
            "div",
            &[
                ("style", OFFSCREEN_STYLE),
                ("aria-hidden", "true"),
                (WORKING_COPY_ATTR, ""),
            ],
        );
        doc.append_child(host, root)?;
        doc.append_child(parent, host)?;
        Ok(Self { doc, host, root })
    }
}

impl Deref for WorkingCopy<'_> {
    type Target = Document;

    fn deref(&self) -> &Document {
        &*self.doc
    }
}

impl DerefMut for WorkingCopy<'_> {
    fn deref_mut(&mut self) -> &mut Document {
        &mut *self.doc
    }
}

impl Drop for WorkingCopy<'_> {
    fn drop(&mut self) {
        self.doc.detach(self.host);
    }
}

/// Exports document subtrees as PNG files
pub struct Exporter {
    config: ExportConfig,
    background: Rgba,
    resolver: ImageResolver,
    rasterizer: Box<dyn Rasterizer>,
    sink: Box<dyn DownloadSink>,
    notifier: Box<dyn Notifier>,
    clock: Box<dyn Clock>,
}

impl Exporter {
    /// Exporter with the software rasterizer, downloads written to the
    /// current directory and failures reported through `log`.
    pub fn new(config: ExportConfig) -> Result<Self> {
        config.validate()?;
        let resolver = ImageResolver::new(&config, BlobRegistry::new())?;
        Ok(Self {
            background: config.background_rgba()?,
            config,
            resolver,
            rasterizer: Box::new(SoftwareRasterizer::new()),
            sink: Box::new(DirectorySink::new(".")),
            notifier: Box::new(LogNotifier),
            clock: Box::new(SystemClock),
        })
    }

    pub fn with_rasterizer(mut self, rasterizer: impl Rasterizer + 'static) -> Self {
        self.rasterizer = Box::new(rasterizer);
        self
    }

    pub fn with_sink(mut self, sink: impl DownloadSink + 'static) -> Self {
        self.sink = Box::new(sink);
        self
    }

    pub fn with_notifier(mut self, notifier: impl Notifier + 'static) -> Self {
        self.notifier = Box::new(notifier);
        self
    }

    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn config(&self) -> &ExportConfig {
        &self.config
    }

    /// Registry for `blob:` URLs used in exported documents
    pub fn blobs(&self) -> &BlobRegistry {
        self.resolver.blobs()
    }

    pub fn pixel_ratio(&self) -> f32 {
        self.config
            .device
            .pixel_ratio(self.config.mobile_pixel_ratio, self.config.desktop_pixel_ratio)
    }

    /// Export `target_id` as `{file_name_base}-{timestamp}.png`. Nothing is
    /// returned; failures are reported once through the notifier.
    pub async fn export_as_image(&self, doc: &mut Document, target_id: &str, file_name_base: &str) {
        let outcome = AssertUnwindSafe(self.try_export(doc, target_id, file_name_base))
            .catch_unwind()
            .await;
        match outcome {
            Ok(Ok(file)) => info!(
                "Exported '{}' to {} ({}x{} at {}x)",
                target_id, file.file_name, file.width, file.height, file.pixel_ratio
            ),
            Ok(Err(Error::TargetNotFound(id))) => {
                error!("Export error: Node with ID '{}' not found", id);
                self.notifier.alert(TARGET_NOT_FOUND_MESSAGE);
            }
            Ok(Err(e)) => {
                error!("Export failed: {}", e);
                self.notifier.alert(EXPORT_FAILED_MESSAGE);
            }
            Err(_) => {
                error!("Export of '{}' panicked", target_id);
                self.notifier.alert(EXPORT_FAILED_MESSAGE);
            }
        }
    }

    /// The export pipeline, returning what was written
    pub async fn try_export(
        &self,
        doc: &mut Document,
        target_id: &str,
        file_name_base: &str,
    ) -> Result<ExportedFile> {
        if file_name_base.trim().is_empty() {
            return Err(Error::InvalidInput("file name base must not be empty".into()));
        }
        let target = doc
            .get_element_by_id(target_id)
            .ok_or_else(|| Error::TargetNotFound(target_id.to_string()))?;

        let ratio = self.pixel_ratio();
        let mut copy = WorkingCopy::attach(doc, target)?;
        let root = copy.root;
        let images = self.normalize_images(&mut copy, root).await;

        // fixed wait for layout and fonts; not tied to any completion event
        tokio::time::sleep(Duration::from_millis(self.config.settle_ms)).await;

        let raster = self.rasterize_with_retry(&copy, root, &images, ratio);
        drop(copy);
        let raster = raster?;

        let file_name = format!("{}-{}.png", file_name_base, file_timestamp(self.clock.now()));
        self.download(doc, &file_name, &raster)?;

        Ok(ExportedFile {
            file_name,
            width: raster.width,
            height: raster.height,
            pixel_ratio: raster.pixel_ratio,
            size_bytes: raster.png_data.len(),
        })
    }

    /// Inline every image under `root` and decode it. Images that fail or
    /// exceed `image_wait_ms` keep their original source and are left out
    /// of the returned map.
    async fn normalize_images(&self, doc: &mut Document, root: NodeId) -> DecodedImages {
        let pending: Vec<(NodeId, String)> = doc
            .images_in(root)
            .into_iter()
            .filter_map(|id| doc.attr(id, "src").map(|src| (id, src.to_string())))
            .filter(|(_, src)| !src.trim().is_empty())
            .collect();
        if pending.is_empty() {
            return DecodedImages::new();
        }

        let wait_ms = self.config.image_wait_ms;
        let jobs = pending.into_iter().map(|(id, src)| async move {
            let outcome = with_deadline(wait_ms, self.load_image(&src)).await;
            (id, src, outcome)
        });

        let mut decoded = DecodedImages::new();
        for (id, src, outcome) in join_all(jobs).await {
            match outcome {
                Ok((resolved, pixels)) => {
                    if resolved != src {
                        if let Err(e) = doc.set_attr(id, "src", &resolved) {
                            warn!("Could not substitute image source: {}", e);
                        }
                    }
                    match pixels {
                        Ok(pixels) => {
                            decoded.insert(id, pixels);
                        }
                        Err(e) => warn!("Image decode failed, proceeding anyway: {}", e),
                    }
                }
                Err(e) => warn!("Image did not load, proceeding without it: {}", e),
            }
        }
        decoded
    }

    async fn load_image(&self, src: &str) -> (String, Result<image::RgbaImage>) {
        let resolved = self.resolver.resolve(src).await;
        let pixels = decode_inline(resolved.clone()).await;
        (resolved, pixels)
    }

    fn rasterize_with_retry(
        &self,
        doc: &Document,
        root: NodeId,
        images: &DecodedImages,
        ratio: f32,
    ) -> Result<RasterResult> {
        let mut opts = RasterOptions {
            pixel_ratio: ratio,
            background: self.background,
            default_width: self.config.default_width,
            max_canvas_pixels: self.config.max_canvas_pixels,
        };
        match self.rasterizer.rasterize(doc, root, images, &opts) {
            Ok(raster) => Ok(raster),
            Err(first) => {
                let reduced = (ratio / 2.0).max(1.0);
                warn!(
                    "Rasterization at {}x failed ({}); retrying once at {}x",
                    ratio, first, reduced
                );
                opts.pixel_ratio = reduced;
                self.rasterizer.rasterize(doc, root, images, &opts)
            }
        }
    }

    /// Synthesize a download: append a hidden anchor, activate it, remove it
    fn download(&self, doc: &mut Document, file_name: &str, raster: &RasterResult) -> Result<()> {
        let href = data_url::encode("image/png", &raster.png_data);
        let parent = doc.body().unwrap_or_else(|| doc.root());
        let anchor = doc.create_element(
            "a",
            &[("href", href.as_str()), ("download", file_name), ("style", "display:none")],
        );
        doc.append_child(parent, anchor)?;
        let delivered = self.sink.deliver(file_name, &href);
        doc.detach(anchor);
        delivered
    }
}

/// Await `fut` for at most `ms` milliseconds
async fn with_deadline<F: Future>(ms: u64, fut: F) -> Result<F::Output> {
    tokio::time::timeout(Duration::from_millis(ms), fut)
        .await
        .map_err(|_| Error::Timeout(ms))
}

async fn decode_inline(src: String) -> Result<image::RgbaImage> {
    if !data_url::is_data_url(&src) {
        return Err(Error::DecodeError("image source was not inlined".into()));
    }
    tokio::task::spawn_blocking(move || -> Result<image::RgbaImage> {
        let payload = DataUrl::parse(&src)?;
        Ok(image::load_from_memory(&payload.bytes)?.to_rgba8())
    })
    .await
    .map_err(|e| Error::DecodeError(format!("decode task failed: {}", e)))?
}
