/// Inline `style="..."` parsing: the handful of properties the layout uses

pub type Rgba = [u8; 4];

pub const BLACK: Rgba = [0, 0, 0, 255];
pub const WHITE: Rgba = [255, 255, 255, 255];

#[derive(Debug, Clone, Default, PartialEq)]
pub struct InlineStyle {
    pub display_none: bool,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub padding: Option<u32>,
    pub background: Option<Rgba>,
    pub color: Option<Rgba>,
}

impl InlineStyle {
    pub fn parse(style: Option<&str>) -> Self {
        let mut out = InlineStyle::default();
        let Some(style) = style else {
            return out;
        };
        for decl in style.split(';') {
            let Some((prop, value)) = decl.split_once(':') else {
                continue;
            };
            let value = value.trim().trim_end_matches("!important").trim();
            match prop.trim().to_ascii_lowercase().as_str() {
                "display" => out.display_none = value.eq_ignore_ascii_case("none"),
                "width" => out.width = parse_px(value),
                "height" => out.height = parse_px(value),
                // shorthand: only the first length is honoured
                "padding" => out.padding = value.split_whitespace().next().and_then(parse_px),
                "background" | "background-color" => {
                    out.background = value.split_whitespace().find_map(parse_color)
                }
                "color" => out.color = parse_color(value),
                _ => {}
            }
        }
        out
    }
}

/// `12`, `12px`, `12.5px` → 12. Percentages and other units are ignored.
pub fn parse_px(value: &str) -> Option<u32> {
    let v = value.trim();
    let num = v.strip_suffix("px").unwrap_or(v).trim();
    let n: f32 = num.parse().ok()?;
    if n.is_finite() && n >= 0.0 {
        Some(n as u32)
    } else {
        None
    }
}

pub fn parse_color(value: &str) -> Option<Rgba> {
    let v = value.trim().to_ascii_lowercase();
    if let Some(hex) = v.strip_prefix('#') {
        return parse_hex(hex);
    }
    if let Some(args) = v
        .strip_prefix("rgba(")
        .or_else(|| v.strip_prefix("rgb("))
        .and_then(|s| s.strip_suffix(')'))
    {
        let parts: Vec<&str> = args.split(',').map(str::trim).collect();
        if parts.len() < 3 {
            return None;
        }
        let c = |s: &str| s.parse::<f32>().ok().map(|f| f.clamp(0.0, 255.0) as u8);
        let a = match parts.get(3) {
            Some(a) => (a.parse::<f32>().ok()?.clamp(0.0, 1.0) * 255.0).round() as u8,
            None => 255,
        };
        return Some([c(parts[0])?, c(parts[1])?, c(parts[2])?, a]);
    }
    match v.as_str() {
        "white" => Some(WHITE),
        "black" => Some(BLACK),
        "red" => Some([255, 0, 0, 255]),
        "green" => Some([0, 128, 0, 255]),
        "blue" => Some([0, 0, 255, 255]),
        "gray" | "grey" => Some([128, 128, 128, 255]),
        "transparent" => Some([0, 0, 0, 0]),
        _ => None,
    }
}

fn parse_hex(hex: &str) -> Option<Rgba> {
    let nib = |i: usize| u8::from_str_radix(&hex[i..i + 1], 16).ok().map(|n| n * 17);
    let byte = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
    if !hex.is_ascii() {
        return None;
    }
    match hex.len() {
        3 => Some([nib(0)?, nib(1)?, nib(2)?, 255]),
        4 => Some([nib(0)?, nib(1)?, nib(2)?, nib(3)?]),
        6 => Some([byte(0)?, byte(2)?, byte(4)?, 255]),
        8 => Some([byte(0)?, byte(2)?, byte(4)?, byte(6)?]),
        _ => None,
    }
}
