/// Block layout for exported subtrees.
///
/// Blocks stack vertically; inline content (text and inline elements) is
/// flattened into runs and wrapped on a fixed character grid. Images are
/// sized from attributes, inline style or their decoded dimensions.

use crate::dom::{Document, NodeData, NodeId};
use crate::rendering::style::{InlineStyle, Rgba, BLACK};
use crate::rendering::DecodedImages;

pub const CHAR_WIDTH: u32 = 8;
pub const LINE_HEIGHT: u32 = 12;
const BLOCK_GAP: u32 = 4;
const PLACEHOLDER_SIZE: u32 = 64;
/// Blocks nested deeper than this are not laid out
pub const MAX_BLOCK_DEPTH: usize = 256;

const SKIPPED_TAGS: [&str; 8] = [
    "head", "script", "style", "title", "meta", "link", "template", "noscript",
];
const INLINE_TAGS: [&str; 12] = [
    "span", "b", "i", "strong", "em", "a", "small", "u", "code", "abbr", "time", "label",
];

#[derive(Debug, Clone, PartialEq)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BoxKind {
    Block { background: Option<Rgba> },
    TextLine { text: String, color: Rgba, scale: u32 },
    Image { node: NodeId },
}

#[derive(Debug, Clone, PartialEq)]
pub struct LayoutNode {
    pub rect: Rect,
    pub kind: BoxKind,
}

/// Laid-out subtree: boxes in paint order plus the overall size in CSS px
#[derive(Debug, Clone)]
pub struct Layout {
    pub nodes: Vec<LayoutNode>,
    pub width: u32,
    pub height: u32,
}

struct Ctx<'a> {
    doc: &'a Document,
    images: &'a DecodedImages,
    nodes: Vec<LayoutNode>,
}

/// Lay out the subtree rooted at `root`. The root's inline `width` wins
/// over `default_width`.
pub fn layout_subtree(
    doc: &Document,
    root: NodeId,
    images: &DecodedImages,
    default_width: u32,
) -> Layout {
    let root_style = InlineStyle::parse(doc.attr(root, "style"));
    let width = root_style
        .width
        .or_else(|| doc.attr(root, "width").and_then(crate::rendering::style::parse_px))
        .unwrap_or(default_width)
        .max(1);

    let mut ctx = Ctx {
        doc,
        images,
        nodes: Vec::new(),
    };
    let height = layout_block(&mut ctx, root, 0, 0, width, BLACK, 0);
    Layout {
        nodes: ctx.nodes,
        width,
        height,
    }
}

fn is_hidden(doc: &Document, id: NodeId, style: &InlineStyle) -> bool {
    match doc.tag(id) {
        Some(tag) => {
            SKIPPED_TAGS.contains(&tag) || doc.attr(id, "hidden").is_some() || style.display_none
        }
        None => false,
    }
}

fn heading_scale(tag: &str) -> u32 {
    match tag {
        "h1" | "h2" | "h3" => 2,
        _ => 1,
    }
}

/// Returns the height consumed by the block
fn layout_block(
    ctx: &mut Ctx,
    id: NodeId,
    x: i32,
    y: i32,
    avail: u32,
    color: Rgba,
    depth: usize,
) -> u32 {
    let doc = ctx.doc;
    let style = InlineStyle::parse(doc.attr(id, "style"));
    if depth > MAX_BLOCK_DEPTH || is_hidden(doc, id, &style) {
        return 0;
    }
    if doc.tag(id) == Some("img") {
        let (w, h) = image_size(ctx, id, &style, avail);
        ctx.nodes.push(LayoutNode {
            rect: Rect { x, y, width: w, height: h },
            kind: BoxKind::Image { node: id },
        });
        return h;
    }

    let width = style.width.map(|w| w.min(avail)).unwrap_or(avail);
    let pad = style.padding.unwrap_or(0).min(width / 2);
    let color = style.color.unwrap_or(color);
    let scale = doc.tag(id).map(heading_scale).unwrap_or(1);

    // background goes first so content paints over it; height is patched below
    let bg_index = ctx.nodes.len();
    ctx.nodes.push(LayoutNode {
        rect: Rect { x, y, width, height: 0 },
        kind: BoxKind::Block {
            background: style.background,
        },
    });

    let inner_x = x + pad as i32;
    let inner_w = width - pad * 2;
    let mut cursor = y + pad as i32;
    let mut run = String::new();

    let children = doc.children(id).to_vec();
    for child in children {
        match doc.data(child) {
            // source newlines are plain whitespace; only <br> breaks a line
            Some(NodeData::Text(t)) => run.push_str(&t.replace(['\n', '\r'], " ")),
            Some(NodeData::Element { tag, .. }) if INLINE_TAGS.contains(&tag.as_str()) => {
                let child_style = InlineStyle::parse(doc.attr(child, "style"));
                if !is_hidden(doc, child, &child_style) {
                    run.push_str(&doc.text_content(child).replace(['\n', '\r'], " "));
                }
            }
            Some(NodeData::Element { tag, .. }) if tag == "br" => {
                run.push('\n');
            }
            Some(NodeData::Element { .. }) => {
                cursor += flush_run(ctx, &mut run, inner_x, cursor, inner_w, color, scale) as i32;
                let h = layout_block(ctx, child, inner_x, cursor, inner_w, color, depth + 1);
                if h > 0 {
                    cursor += (h + BLOCK_GAP) as i32;
                }
            }
            _ => {}
        }
    }
    cursor += flush_run(ctx, &mut run, inner_x, cursor, inner_w, color, scale) as i32;

    let content_h = (cursor - y) as u32 + pad;
    let height = style.height.unwrap_or(content_h);
    ctx.nodes[bg_index].rect.height = height;
    height
}

fn flush_run(
    ctx: &mut Ctx,
    run: &mut String,
    x: i32,
    y: i32,
    width: u32,
    color: Rgba,
    scale: u32,
) -> u32 {
    let text = std::mem::take(run);
    let per_line = (width / (CHAR_WIDTH * scale)).max(1) as usize;
    let lines: Vec<String> = text
        .split('\n')
        .flat_map(|para| wrap_text(para, per_line))
        .collect();
    if lines.iter().all(|l| l.is_empty()) {
        return 0;
    }
    let line_h = LINE_HEIGHT * scale;
    let mut h = 0;
    for line in lines {
        ctx.nodes.push(LayoutNode {
            rect: Rect {
                x,
                y: y + h as i32,
                width: (line.chars().count() as u32 * CHAR_WIDTH * scale).min(width),
                height: line_h,
            },
            kind: BoxKind::TextLine {
                text: line,
                color,
                scale,
            },
        });
        h += line_h;
    }
    h
}

/// Greedy word wrap; words longer than a line are split.
pub fn wrap_text(text: &str, per_line: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut cur = String::new();
    for word in text.split_whitespace() {
        let mut word: Vec<char> = word.chars().collect();
        while word.len() > per_line {
            if !cur.is_empty() {
                lines.push(std::mem::take(&mut cur));
            }
            let rest = word.split_off(per_line);
            lines.push(word.into_iter().collect());
            word = rest;
        }
        let cur_len = cur.chars().count();
        if !cur.is_empty() && cur_len + 1 + word.len() > per_line {
            lines.push(std::mem::take(&mut cur));
        }
        if !cur.is_empty() {
            cur.push(' ');
        }
        cur.extend(word);
    }
    if !cur.is_empty() {
        lines.push(cur);
    }
    lines
}

fn image_size(ctx: &Ctx, id: NodeId, style: &InlineStyle, avail: u32) -> (u32, u32) {
    let attr_w = ctx.doc.attr(id, "width").and_then(crate::rendering::style::parse_px);
    let attr_h = ctx.doc.attr(id, "height").and_then(crate::rendering::style::parse_px);
    let want_w = style.width.or(attr_w);
    let want_h = style.height.or(attr_h);
    let natural = ctx.images.get(&id).map(|img| img.dimensions());

    let (w, h) = match (want_w, want_h, natural) {
        (Some(w), Some(h), _) => (w, h),
        (Some(w), None, Some((nw, nh))) if nw > 0 => (w, (w as u64 * nh as u64 / nw as u64) as u32),
        (None, Some(h), Some((nw, nh))) if nh > 0 => ((h as u64 * nw as u64 / nh as u64) as u32, h),
        (None, None, Some((nw, nh))) => (nw, nh),
        (w, h, _) => (w.unwrap_or(PLACEHOLDER_SIZE), h.unwrap_or(PLACEHOLDER_SIZE)),
    };

    if w > avail && w > 0 {
        (avail, (h as u64 * avail as u64 / w as u64) as u32)
    } else {
        (w, h)
    }
}
