/// Display list built from a layout

use crate::dom::NodeId;
use crate::rendering::layout::{BoxKind, Layout};
use crate::rendering::style::Rgba;
use crate::rendering::DecodedImages;

/// Fill for images that never resolved or decoded
pub const PLACEHOLDER_RGBA: Rgba = [220, 220, 220, 255];

#[derive(Debug, Clone, PartialEq)]
pub enum PaintCommand {
    SolidRect {
        x: i32,
        y: i32,
        width: u32,
        height: u32,
        rgba: Rgba,
    },
    Text {
        x: i32,
        y: i32,
        text: String,
        rgba: Rgba,
        scale: u32,
    },
    Image {
        x: i32,
        y: i32,
        width: u32,
        height: u32,
        node: NodeId,
    },
}

pub fn build_display_list(layout: &Layout, images: &DecodedImages) -> Vec<PaintCommand> {
    let mut cmds = Vec::with_capacity(layout.nodes.len());
    for node in &layout.nodes {
        let r = &node.rect;
        if r.width == 0 || r.height == 0 {
            continue;
        }
        match &node.kind {
            BoxKind::Block { background: Some(rgba) } if rgba[3] > 0 => {
                cmds.push(PaintCommand::SolidRect {
                    x: r.x,
                    y: r.y,
                    width: r.width,
                    height: r.height,
                    rgba: *rgba,
                })
            }
            BoxKind::Block { .. } => {}
            BoxKind::TextLine { text, color, scale } => cmds.push(PaintCommand::Text {
                x: r.x,
                y: r.y,
                text: text.clone(),
                rgba: *color,
                scale: *scale,
            }),
            BoxKind::Image { node } if images.contains_key(node) => {
                cmds.push(PaintCommand::Image {
                    x: r.x,
                    y: r.y,
                    width: r.width,
                    height: r.height,
                    node: *node,
                })
            }
            BoxKind::Image { .. } => cmds.push(PaintCommand::SolidRect {
                x: r.x,
                y: r.y,
                width: r.width,
                height: r.height,
                rgba: PLACEHOLDER_RGBA,
            }),
        }
    }
    cmds
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::Document;
    use crate::rendering::layout::layout_subtree;

    #[test]
    fn undecoded_images_become_placeholders() {
        let doc = Document::parse(
            "<div id=\"p\" style=\"background:#000\"><img src=\"x\" width=\"10\" height=\"10\">hi</div>",
        );
        let root = doc.get_element_by_id("p").unwrap();
        let images = DecodedImages::new();
        let layout = layout_subtree(&doc, root, &images, 100);
        let cmds = build_display_list(&layout, &images);

        assert!(matches!(cmds[0], PaintCommand::SolidRect { rgba: [0, 0, 0, 255], .. }));
        assert!(cmds
            .iter()
            .any(|c| matches!(c, PaintCommand::SolidRect { rgba, .. } if *rgba == PLACEHOLDER_RGBA)));
        assert!(cmds.iter().any(|c| matches!(c, PaintCommand::Text { text, .. } if text == "hi")));
    }

    #[test]
    fn decoded_images_are_painted() {
        let doc = Document::parse("<div id=\"p\"><img src=\"x\"></div>");
        let root = doc.get_element_by_id("p").unwrap();
        let img = doc.images_in(root)[0];
        let mut images = DecodedImages::new();
        images.insert(img, image::RgbaImage::new(4, 2));
        let layout = layout_subtree(&doc, root, &images, 100);
        let cmds = build_display_list(&layout, &images);
        assert_eq!(
            cmds,
            vec![PaintCommand::Image { x: 0, y: 0, width: 4, height: 2, node: img }]
        );
    }
}
