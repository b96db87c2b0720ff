/// CPU rasterizer: paints the display list into an RGBA canvas and encodes PNG

use crate::dom::{Document, NodeId};
use crate::rendering::layout::{layout_subtree, CHAR_WIDTH, LINE_HEIGHT};
use crate::rendering::paint::{build_display_list, PaintCommand};
use crate::rendering::style::Rgba;
use crate::rendering::{DecodedImages, RasterOptions, RasterResult, Rasterizer};
use crate::{Error, Result};
use image::imageops::{self, FilterType};
use image::{DynamicImage, ImageFormat, RgbaImage};
use log::debug;

/// Glyphs are drawn as solid blocks inset inside their character cell
const GLYPH_INSET_X: u32 = 1;
const GLYPH_INSET_Y: u32 = 2;

#[derive(Debug, Clone, Copy, Default)]
pub struct SoftwareRasterizer;

impl SoftwareRasterizer {
    pub fn new() -> Self {
        SoftwareRasterizer
    }
}

impl Rasterizer for SoftwareRasterizer {
    fn rasterize(
        &self,
        doc: &Document,
        root: NodeId,
        images: &DecodedImages,
        opts: &RasterOptions,
    ) -> Result<RasterResult> {
        let ratio = opts.pixel_ratio;
        if !ratio.is_finite() || ratio <= 0.0 {
            return Err(Error::RenderError(format!("invalid pixel ratio {}", ratio)));
        }

        let layout = layout_subtree(doc, root, images, opts.default_width);
        let cmds = build_display_list(&layout, images);

        let width = scale(layout.width.max(1), ratio).max(1);
        let height = scale(layout.height.max(1), ratio).max(1);
        let pixels = width as u64 * height as u64;
        if pixels > opts.max_canvas_pixels {
            return Err(Error::RenderError(format!(
                "canvas {}x{} exceeds the budget of {} pixels",
                width, height, opts.max_canvas_pixels
            )));
        }
        debug!(
            "Rasterizing {} commands onto {}x{} canvas at {}x",
            cmds.len(),
            width,
            height,
            ratio
        );

        let mut canvas = RgbaImage::from_pixel(width, height, image::Rgba(opts.background));
        for cmd in &cmds {
            paint(&mut canvas, cmd, images, ratio);
        }

        Ok(RasterResult {
            width,
            height,
            pixel_ratio: ratio,
            png_data: encode_png(canvas)?,
        })
    }
}

fn scale(v: u32, ratio: f32) -> u32 {
    (v as f32 * ratio).round() as u32
}

fn scale_pos(v: i64, ratio: f32) -> i64 {
    (v as f32 * ratio).round() as i64
}

fn paint(canvas: &mut RgbaImage, cmd: &PaintCommand, images: &DecodedImages, ratio: f32) {
    match cmd {
        PaintCommand::SolidRect {
            x,
            y,
            width,
            height,
            rgba,
        } => fill_rect(
            canvas,
            scale_pos(*x as i64, ratio),
            scale_pos(*y as i64, ratio),
            scale(*width, ratio),
            scale(*height, ratio),
            *rgba,
        ),
        PaintCommand::Text {
            x,
            y,
            text,
            rgba,
            scale: s,
        } => {
            let cell = (CHAR_WIDTH * s) as i64;
            let gw = (CHAR_WIDTH - 2 * GLYPH_INSET_X) * s;
            let gh = (LINE_HEIGHT - 2 * GLYPH_INSET_Y) * s;
            for (i, ch) in text.chars().enumerate() {
                if ch.is_whitespace() {
                    continue;
                }
                let gx = *x as i64 + i as i64 * cell + (GLYPH_INSET_X * s) as i64;
                let gy = *y as i64 + (GLYPH_INSET_Y * s) as i64;
                fill_rect(
                    canvas,
                    scale_pos(gx, ratio),
                    scale_pos(gy, ratio),
                    scale(gw, ratio),
                    scale(gh, ratio),
                    *rgba,
                );
            }
        }
        PaintCommand::Image {
            x,
            y,
            width,
            height,
            node,
        } => {
            let Some(src) = images.get(node) else {
                return;
            };
            let (tw, th) = (scale(*width, ratio), scale(*height, ratio));
            if tw == 0 || th == 0 {
                return;
            }
            let sx = scale_pos(*x as i64, ratio);
            let sy = scale_pos(*y as i64, ratio);
            if src.dimensions() == (tw, th) {
                imageops::overlay(canvas, src, sx, sy);
            } else {
                let resized = imageops::resize(src, tw, th, FilterType::Triangle);
                imageops::overlay(canvas, &resized, sx, sy);
            }
        }
    }
}

/// Source-over fill, clipped to the canvas
fn fill_rect(canvas: &mut RgbaImage, x: i64, y: i64, w: u32, h: u32, rgba: Rgba) {
    let (cw, ch) = (canvas.width() as i64, canvas.height() as i64);
    let x0 = x.clamp(0, cw);
    let y0 = y.clamp(0, ch);
    let x1 = (x + w as i64).clamp(0, cw);
    let y1 = (y + h as i64).clamp(0, ch);
    let alpha = rgba[3] as u32;
    for py in y0..y1 {
        for px in x0..x1 {
            let dst = canvas.get_pixel_mut(px as u32, py as u32);
            if alpha == 255 {
                dst.0 = rgba;
                continue;
            }
            for c in 0..3 {
                dst.0[c] = ((rgba[c] as u32 * alpha + dst.0[c] as u32 * (255 - alpha)) / 255) as u8;
            }
            dst.0[3] = (alpha + dst.0[3] as u32 * (255 - alpha) / 255) as u8;
        }
    }
}

fn encode_png(canvas: RgbaImage) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    DynamicImage::ImageRgba8(canvas)
        .write_to(&mut std::io::Cursor::new(&mut buf), ImageFormat::Png)
        .map_err(|e| Error::RenderError(format!("PNG encoding failed: {}", e)))?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rendering::style::WHITE;

    fn opts(ratio: f32) -> RasterOptions {
        RasterOptions {
            pixel_ratio: ratio,
            background: WHITE,
            default_width: 128,
            max_canvas_pixels: 4096 * 4096,
        }
    }

    #[test]
    fn rasterize_text_on_white_background() {
        let doc = Document::parse("<div id=\"p\"><p>Hello visual</p></div>");
        let root = doc.get_element_by_id("p").unwrap();
        let res = SoftwareRasterizer
            .rasterize(&doc, root, &DecodedImages::new(), &opts(2.0))
            .unwrap();

        assert_eq!(&res.png_data[0..8], b"\x89PNG\r\n\x1a\n");
        assert_eq!(res.width, 256);
        assert_eq!(res.pixel_ratio, 2.0);

        let decoded = image::load_from_memory(&res.png_data).unwrap().to_rgba8();
        assert_eq!(decoded.dimensions(), (res.width, res.height));
        assert!(decoded.pixels().any(|p| p.0 == [0, 0, 0, 255]), "expected text pixels");
        assert!(decoded.pixels().any(|p| p.0 == [255, 255, 255, 255]), "expected background");
    }

    #[test]
    fn oversized_canvas_is_a_render_error() {
        let doc = Document::parse("<div id=\"p\" style=\"height:1000px\"></div>");
        let root = doc.get_element_by_id("p").unwrap();
        let mut o = opts(3.0);
        o.max_canvas_pixels = 10_000;
        let err = SoftwareRasterizer
            .rasterize(&doc, root, &DecodedImages::new(), &o)
            .unwrap_err();
        assert!(matches!(err, Error::RenderError(_)));
    }

    #[test]
    fn images_are_scaled_into_place() {
        let doc = Document::parse(
            "<div id=\"p\" style=\"width:4px\"><img src=\"x\" width=\"4\" height=\"4\"></div>",
        );
        let root = doc.get_element_by_id("p").unwrap();
        let img = doc.images_in(root)[0];
        let mut images = DecodedImages::new();
        images.insert(img, RgbaImage::from_pixel(1, 1, image::Rgba([255, 0, 0, 255])));

        let res = SoftwareRasterizer.rasterize(&doc, root, &images, &opts(1.0)).unwrap();
        let decoded = image::load_from_memory(&res.png_data).unwrap().to_rgba8();
        assert_eq!(decoded.get_pixel(2, 2).0, [255, 0, 0, 255]);
    }

    #[test]
    fn rejects_bad_ratio() {
        let doc = Document::parse("<div id=\"p\"></div>");
        let root = doc.get_element_by_id("p").unwrap();
        assert!(SoftwareRasterizer
            .rasterize(&doc, root, &DecodedImages::new(), &opts(0.0))
            .is_err());
    }

    #[test]
    fn translucent_fill_blends() {
        let mut canvas = RgbaImage::from_pixel(2, 2, image::Rgba(WHITE));
        fill_rect(&mut canvas, -5, -5, 100, 100, [0, 0, 0, 128]);
        let p = canvas.get_pixel(1, 1).0;
        assert!(p[0] > 100 && p[0] < 140);
        assert_eq!(p[3], 255);
    }
}
