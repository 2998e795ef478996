use image::RgbaImage;
use std::sync::Arc;
use tiny_skia::Pixmap;
use tracing::debug;
use usvg::{fontdb, Options, Tree};

use super::font::OverlayFont;
use super::layout::{is_xml_char, layout_region, RegionLayout};
use super::{OverlayStyle, RenderMode, RenderRequest, TextRegion};
use crate::error::{Error, Result};

/// Rasterizes an image and its translated regions into one bitmap.
///
/// The measuring font and its font database are shared across regions and
/// calls; every call to [`Compositor::render`] paints on its own surface.
pub struct Compositor {
    font: OverlayFont,
    style: OverlayStyle,
    fontdb: Arc<fontdb::Database>,
}

impl Compositor {
    /// Builds a compositor drawing with `font`.
    ///
    /// System fonts are always loaded next to the resolved face so glyphs it
    /// lacks (Hangul or Kana in backfilled originals) still find a fallback.
    /// With estimated metrics the text is measured per character but drawn
    /// with the system `sans-serif` face (or the first installed face when
    /// that generic name matches nothing), so a line can come out slightly
    /// wider than its mask.
    pub fn new(font: OverlayFont, style: OverlayStyle) -> Self {
        let db = overlay_fontdb(&font);
        Self {
            font,
            style,
            fontdb: Arc::new(db),
        }
    }

    pub fn font(&self) -> &OverlayFont {
        &self.font
    }

    pub fn style(&self) -> &OverlayStyle {
        &self.style
    }

    /// Layouts of every region that has something to display, in list order.
    pub fn layout(&self, regions: &[TextRegion]) -> Vec<RegionLayout> {
        regions
            .iter()
            .enumerate()
            .filter_map(|(idx, region)| layout_region(idx, region, &self.font))
            .collect()
    }

    pub fn render(&self, request: &RenderRequest<'_>) -> Result<RgbaImage> {
        let source = request.image.ready()?;
        if request.mode == RenderMode::Original {
            return Ok(source.clone());
        }

        let layouts = self.layout(request.regions);
        let (width, height) = source.dimensions();
        if layouts.is_empty() || width == 0 || height == 0 {
            return Ok(source.clone());
        }
        debug!(
            "overlay: painting {} of {} regions on {}x{}",
            layouts.len(),
            request.regions.len(),
            width,
            height
        );

        let svg = self.overlay_svg(width, height, &layouts);
        let mut surface = Surface::new(width, height)?;
        surface.paint_svg(&svg, self.fontdb.clone())?;
        let mut output = source.clone();
        surface.composite_onto(&mut output);
        Ok(output)
    }

    fn overlay_svg(&self, width: u32, height: u32, layouts: &[RegionLayout]) -> String {
        let mut svg = String::new();
        svg.push_str(&format!(
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" viewBox="0 0 {w} {h}">"#,
            w = width,
            h = height
        ));
        let family = escape_xml(self.font.family());
        let mask_color = escape_xml(&self.style.mask_color);
        let text_color = escape_xml(&self.style.text_color);

        for layout in layouts {
            let mask = layout.mask;
            svg.push_str(&format!(
                r#"<rect x="{x}" y="{y}" width="{w}" height="{h}" fill="{fill}" fill-opacity="{opacity}"/>"#,
                x = mask.x,
                y = mask.y,
                w = mask.w,
                h = mask.h,
                fill = mask_color,
                opacity = self.style.mask_opacity
            ));
            let ascent = self.font.ascent(layout.font_size);
            for (line_idx, line) in layout.lines.iter().enumerate() {
                let top = layout.text_box.y + line_idx as f32 * layout.line_height;
                svg.push_str(&format!(
                    r#"<text x="{x}" y="{y}" font-size="{size}" font-family="{family}" fill="{color}">{text}</text>"#,
                    x = layout.text_box.x,
                    y = top + ascent,
                    size = layout.font_size,
                    family = family,
                    color = text_color,
                    text = escape_xml(line)
                ));
            }
        }

        svg.push_str("</svg>");
        svg
    }
}

fn overlay_fontdb(font: &OverlayFont) -> fontdb::Database {
    let mut db = fontdb::Database::new();
    db.load_system_fonts();
    if let Some(metrics) = font.metrics() {
        db.load_font_data(metrics.data().to_vec());
    }
    let sans_serif = fontdb::Query {
        families: &[fontdb::Family::SansSerif],
        ..Default::default()
    };
    if db.query(&sans_serif).is_none() {
        let installed = db
            .faces()
            .find_map(|face| face.families.first().map(|(name, _)| name.clone()));
        if let Some(family) = installed {
            debug!("overlay: no default sans-serif face; drawing with {}", family);
            db.set_sans_serif_family(family);
        }
    }
    debug!("overlay: {} font faces available", db.len());
    db
}

/// Transparent overlay layer owned by a single render call.
struct Surface {
    pixmap: Pixmap,
}

impl Surface {
    fn new(width: u32, height: u32) -> Result<Self> {
        let pixmap = Pixmap::new(width, height)
            .ok_or_else(|| Error::Render(format!("cannot allocate {}x{} surface", width, height)))?;
        Ok(Self { pixmap })
    }

    fn paint_svg(&mut self, svg: &str, fontdb: Arc<fontdb::Database>) -> Result<()> {
        let options = Options {
            fontdb,
            ..Options::default()
        };
        let tree = Tree::from_str(svg, &options)
            .map_err(|err| Error::Render(format!("failed to parse overlay SVG: {}", err)))?;
        let mut pixmap_mut = self.pixmap.as_mut();
        resvg::render(&tree, tiny_skia::Transform::identity(), &mut pixmap_mut);
        Ok(())
    }

    /// Source-over blends the overlay onto `image`.
    ///
    /// Pixels the overlay left fully transparent are not touched.
    fn composite_onto(&self, image: &mut RgbaImage) {
        for (dst, src) in image.pixels_mut().zip(self.pixmap.pixels()) {
            if src.alpha() == 0 {
                continue;
            }
            let over = src.demultiply();
            dst.0 = blend_over(
                [over.red(), over.green(), over.blue(), over.alpha()],
                dst.0,
            );
        }
    }
}

fn blend_over(over: [u8; 4], under: [u8; 4]) -> [u8; 4] {
    let oa = over[3] as f32 / 255.0;
    let ua = under[3] as f32 / 255.0;
    let out_a = oa + ua * (1.0 - oa);
    if out_a <= 0.0 {
        return [0, 0, 0, 0];
    }
    let channel = |o: u8, u: u8| {
        let value = (o as f32 * oa + u as f32 * ua * (1.0 - oa)) / out_a;
        value.round().clamp(0.0, 255.0) as u8
    };
    [
        channel(over[0], under[0]),
        channel(over[1], under[1]),
        channel(over[2], under[2]),
        (out_a * 255.0).round().clamp(0.0, 255.0) as u8,
    ]
}

fn escape_xml(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars().filter(|ch| is_xml_char(*ch)) {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}
