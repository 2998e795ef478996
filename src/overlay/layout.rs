use serde::Serialize;

use super::font::OverlayFont;
use super::TextRegion;

pub const MIN_FONT_SIZE: f32 = 12.0;
pub const MAX_FONT_SIZE: f32 = 24.0;
pub const LINE_HEIGHT_RATIO: f32 = 1.2;
/// Horizontal slack subtracted from a region's width to get the wrap width.
pub const WRAP_INSET: f32 = 4.0;
pub const MASK_PADDING: f32 = 2.0;

const FONT_HEIGHT_RATIO: f32 = 0.7;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LayoutRect {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
}

impl LayoutRect {
    pub fn center(&self) -> (f32, f32) {
        (self.x + self.w * 0.5, self.y + self.h * 0.5)
    }

    fn centered_on(center: (f32, f32), w: f32, h: f32) -> Self {
        Self {
            x: center.0 - w * 0.5,
            y: center.1 - h * 0.5,
            w,
            h,
        }
    }

    fn inflate(&self, by: f32) -> Self {
        Self {
            x: self.x - by,
            y: self.y - by,
            w: self.w + by * 2.0,
            h: self.h + by * 2.0,
        }
    }
}

/// Where one region's translated text goes and what gets masked.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegionLayout {
    /// Position of the region in the request's region list.
    pub index: usize,
    pub font_size: f32,
    pub line_height: f32,
    pub lines: Vec<String>,
    /// Bounding box of the wrapped lines, centered on the region.
    pub text_box: LayoutRect,
    /// `text_box` grown by `MASK_PADDING` on every side.
    pub mask: LayoutRect,
}

pub fn font_size_for_height(height: f32) -> f32 {
    (height * FONT_HEIGHT_RATIO).clamp(MIN_FONT_SIZE, MAX_FONT_SIZE)
}

/// Greedy line breaking on single spaces.
///
/// A word that alone is wider than `max_width` is kept whole on its own line.
pub fn wrap_words<F>(text: &str, max_width: f32, measure: F) -> Vec<String>
where
    F: Fn(&str) -> f32,
{
    let mut lines = Vec::new();
    let mut line = String::new();
    for word in text.split_whitespace() {
        if line.is_empty() {
            line.push_str(word);
            continue;
        }
        let candidate = format!("{} {}", line, word);
        if measure(&candidate) > max_width {
            lines.push(std::mem::replace(&mut line, word.to_string()));
        } else {
            line = candidate;
        }
    }
    if !line.is_empty() {
        lines.push(line);
    }
    lines
}

/// Characters an XML 1.0 document may carry.
pub(crate) fn is_xml_char(ch: char) -> bool {
    match ch {
        '\t' | '\n' | '\r' => true,
        '\u{fffe}' | '\u{ffff}' => false,
        _ => !ch.is_control(),
    }
}

/// Lays out one region, or `None` when it has nothing to display.
pub fn layout_region(
    index: usize,
    region: &TextRegion,
    font: &OverlayFont,
) -> Option<RegionLayout> {
    let text: String = region
        .display_text()?
        .chars()
        .filter(|ch| is_xml_char(*ch))
        .collect();
    let bounds = region.bounds;
    let font_size = font_size_for_height(bounds.h as f32);
    let line_height = font_size * LINE_HEIGHT_RATIO;
    let max_width = (bounds.w as f32 - WRAP_INSET).max(0.0);

    let lines = wrap_words(&text, max_width, |line| font.measure(line, font_size));
    if lines.is_empty() {
        return None;
    }
    let text_w = lines
        .iter()
        .map(|line| font.measure(line, font_size))
        .fold(0.0, f32::max);
    let text_h = lines.len() as f32 * line_height;

    let region_center = (
        bounds.x as f32 + bounds.w as f32 * 0.5,
        bounds.y as f32 + bounds.h as f32 * 0.5,
    );
    let text_box = LayoutRect::centered_on(region_center, text_w, text_h);
    Some(RegionLayout {
        index,
        font_size,
        line_height,
        lines,
        text_box,
        mask: text_box.inflate(MASK_PADDING),
    })
}
