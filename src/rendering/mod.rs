//! Rendering: layout, display list and rasterization of a document subtree

pub mod layout;
pub mod paint;
pub mod raster;
pub mod style;

use crate::dom::{Document, NodeId};
use crate::Result;
use std::collections::HashMap;

pub use raster::SoftwareRasterizer;
pub use style::Rgba;

/// Decoded pixels for `<img>` nodes, keyed by node
pub type DecodedImages = HashMap<NodeId, image::RgbaImage>;

/// Parameters for one rasterization attempt
#[derive(Debug, Clone, PartialEq)]
pub struct RasterOptions {
    pub pixel_ratio: f32,
    pub background: Rgba,
    /// Width in CSS px used when the subtree root does not declare one
    pub default_width: u32,
    /// Largest canvas (in device pixels) the rasterizer may allocate
    pub max_canvas_pixels: u64,
}

/// An encoded raster of a subtree
#[derive(Debug, Clone)]
pub struct RasterResult {
    pub width: u32,
    pub height: u32,
    pub pixel_ratio: f32,
    pub png_data: Vec<u8>,
}

/// Turns a laid-out subtree into an encoded PNG.
///
/// Implementations must not mutate the document and should fail with
/// `Error::RenderError` when the canvas cannot be produced; the exporter
/// retries once at a lower pixel ratio.
pub trait Rasterizer: Send + Sync {
    fn rasterize(
        &self,
        doc: &Document,
        root: NodeId,
        images: &DecodedImages,
        opts: &RasterOptions,
    ) -> Result<RasterResult>;
}
