use anyhow::{anyhow, Context, Result};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};
use ttf_parser::name_id;
use ttf_parser::Face;
use usvg::fontdb;

#[derive(Clone)]
pub struct FontMetrics {
    data: Arc<Vec<u8>>,
    units_per_em: u16,
    space_advance: u16,
    ascender: i16,
    family: Option<String>,
    face_index: u32,
}

impl FontMetrics {
    pub fn family(&self) -> Option<&str> {
        self.family.as_deref()
    }

    pub fn data(&self) -> &[u8] {
        self.data.as_ref()
    }
}

/// Reads a font file; in a collection the face named `preferred_family` wins.
pub fn load_font_metrics(path: &Path, preferred_family: Option<&str>) -> Result<FontMetrics> {
    let data =
        std::fs::read(path).with_context(|| format!("failed to read font: {}", path.display()))?;
    load_font_metrics_from_data(&data, preferred_family)
        .map_err(|err| anyhow!("failed to parse font: {} ({})", path.display(), err))
}

pub struct ResolvedOverlayFont {
    pub metrics: FontMetrics,
    pub family: String,
}

pub fn resolve_overlay_font(
    font_path: Option<&Path>,
    font_family: Option<&str>,
    fallback: &[&str],
) -> Result<ResolvedOverlayFont> {
    if let Some(path) = font_path {
        let metrics = load_font_metrics(path, font_family)?;
        let family = metrics
            .family()
            .map(|name| name.to_string())
            .or_else(|| font_family.map(|name| name.to_string()))
            .unwrap_or_else(|| "sans-serif".to_string());
        return Ok(ResolvedOverlayFont { metrics, family });
    }

    let mut db = fontdb::Database::new();
    db.load_system_fonts();

    if let Some(family) = font_family {
        if let Ok(resolved) = load_font_metrics_from_family(&db, family) {
            return Ok(resolved);
        }
        debug!("overlay font family '{}' not found; trying fallbacks", family);
    }

    for candidate in fallback {
        if let Ok(resolved) = load_font_metrics_from_family(&db, candidate) {
            return Ok(resolved);
        }
    }

    Err(anyhow!("no fallback fonts found"))
}

#[cfg(target_os = "macos")]
fn overlay_fallback_fonts() -> &'static [&'static str] {
    &["Arial", "Helvetica", "sans-serif"]
}

#[cfg(target_os = "windows")]
fn overlay_fallback_fonts() -> &'static [&'static str] {
    &["Arial", "Segoe UI", "sans-serif"]
}

#[cfg(not(any(target_os = "macos", target_os = "windows")))]
fn overlay_fallback_fonts() -> &'static [&'static str] {
    &["Arial", "Liberation Sans", "DejaVu Sans", "sans-serif"]
}

/// The face used both to measure and to draw translated text.
///
/// Without a face the width of a string is estimated per character, which
/// keeps layout deterministic on hosts with no fonts installed.
#[derive(Clone)]
pub struct OverlayFont {
    metrics: Option<FontMetrics>,
    family: String,
}

impl OverlayFont {
    pub fn estimated() -> Self {
        Self {
            metrics: None,
            family: "sans-serif".to_string(),
        }
    }

    pub fn resolve(font_path: Option<&Path>, font_family: Option<&str>) -> Self {
        match resolve_overlay_font(font_path, font_family, overlay_fallback_fonts()) {
            Ok(resolved) => {
                debug!("overlay font resolved: {}", resolved.family);
                Self {
                    metrics: Some(resolved.metrics),
                    family: resolved.family,
                }
            }
            Err(err) => {
                warn!("overlay font unavailable ({}); using estimated metrics", err);
                Self::estimated()
            }
        }
    }

    pub fn family(&self) -> &str {
        &self.family
    }

    pub fn metrics(&self) -> Option<&FontMetrics> {
        self.metrics.as_ref()
    }

    pub fn measure(&self, text: &str, font_size: f32) -> f32 {
        measure_text_width_px(text, font_size, self.metrics.as_ref())
    }

    /// Distance from the top of a line box to its baseline.
    pub fn ascent(&self, font_size: f32) -> f32 {
        match &self.metrics {
            Some(metrics) => {
                let units = metrics.units_per_em.max(1) as f32;
                metrics.ascender.max(0) as f32 * (font_size / units)
            }
            None => font_size * 0.8,
        }
    }
}

pub(crate) fn measure_text_width_px(
    text: &str,
    font_size: f32,
    font: Option<&FontMetrics>,
) -> f32 {
    if let Some(font) = font {
        if let Ok(face) = Face::parse(&font.data, font.face_index) {
            let mut advance = 0u32;
            for ch in text.chars() {
                if ch == '\n' {
                    continue;
                }
                if ch == ' ' {
                    advance = advance.saturating_add(font.space_advance as u32);
                    continue;
                }
                let glyph_advance = face
                    .glyph_index(ch)
                    .and_then(|glyph| face.glyph_hor_advance(glyph))
                    .unwrap_or(font.space_advance);
                advance = advance.saturating_add(glyph_advance as u32);
            }
            let units = font.units_per_em.max(1) as f32;
            return advance as f32 * (font_size / units);
        }
    }
    estimate_text_width_units(text) * font_size
}

/// Arial advance widths for printable ASCII, in thousandths of an em.
const ARIAL_ASCII_ADVANCES: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278, // ' '..'/'
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 278, 278, 584, 584, 584, 556, // '0'..'?'
    1015, 667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, 722, 778, // '@'..'O'
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 278, 278, 278, 469, 556, // 'P'..'_'
    333, 556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, 556, 556, // '`'..'o'
    556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, 334, 260, 334, 584, // 'p'..'~'
];

fn estimate_char_units_for_width(ch: char) -> f32 {
    match ch as u32 {
        code @ 0x20..=0x7E => ARIAL_ASCII_ADVANCES[(code - 0x20) as usize] as f32 / 1000.0,
        _ if ch.is_whitespace() => 0.278,
        0x4E00..=0x9FFF | 0x3040..=0x30FF | 0x31F0..=0x31FF | 0xAC00..=0xD7A3 => 1.0,
        // Accented Latin is close to its base letter.
        0x00C0..=0x024F => 0.556,
        _ => 0.9,
    }
}

fn estimate_text_width_units(text: &str) -> f32 {
    text.chars()
        .filter(|ch| *ch != '\n')
        .map(estimate_char_units_for_width)
        .sum()
}

fn load_font_metrics_from_data(data: &[u8], preferred_family: Option<&str>) -> Result<FontMetrics> {
    let mut fallback = None;
    let count = ttf_parser::fonts_in_collection(data).unwrap_or(1);
    for index in 0..count {
        let Ok(face) = Face::parse(data, index) else {
            continue;
        };
        let family = extract_family_name(&face);
        let units_per_em = face.units_per_em().max(1);
        let space_advance = face
            .glyph_index(' ')
            .and_then(|id| face.glyph_hor_advance(id))
            .unwrap_or(units_per_em / 2);
        let metrics = FontMetrics {
            data: Arc::new(data.to_vec()),
            units_per_em,
            space_advance,
            ascender: face.ascender(),
            family: family.clone(),
            face_index: index,
        };
        if let (Some(preferred), Some(found)) = (preferred_family, &family) {
            if found.eq_ignore_ascii_case(preferred) {
                return Ok(metrics);
            }
        }
        if fallback.is_none() {
            fallback = Some(metrics);
        }
    }
    fallback.ok_or_else(|| anyhow!("failed to parse font data"))
}

fn load_font_metrics_from_family(
    db: &fontdb::Database,
    family: &str,
) -> Result<ResolvedOverlayFont> {
    let families = if family.eq_ignore_ascii_case("sans-serif") {
        vec![fontdb::Family::SansSerif]
    } else {
        vec![fontdb::Family::Name(family)]
    };
    let query = fontdb::Query {
        families: &families,
        ..Default::default()
    };
    let id = db
        .query(&query)
        .ok_or_else(|| anyhow!("font not found: {}", family))?;
    let (data, face_index) = db
        .with_face_data(id, |data, index| (data.to_vec(), index))
        .ok_or_else(|| anyhow!("failed to load font data: {}", family))?;
    let mut metrics = load_font_metrics_from_data(&data, None)?;
    if let Ok(face) = Face::parse(&data, face_index) {
        metrics.face_index = face_index;
        metrics.family = extract_family_name(&face).or(metrics.family);
        metrics.ascender = face.ascender();
    }
    let resolved_family = metrics
        .family()
        .map(|name| name.to_string())
        .unwrap_or_else(|| family.to_string());
    Ok(ResolvedOverlayFont {
        metrics,
        family: resolved_family,
    })
}

fn extract_family_name(face: &Face<'_>) -> Option<String> {
    let mut fallback = None;
    for name in face.names() {
        if name.name_id == name_id::TYPOGRAPHIC_FAMILY {
            if let Some(value) = name.to_string() {
                return Some(value);
            }
        } else if name.name_id == name_id::FAMILY && fallback.is_none() {
            fallback = name.to_string();
        }
    }
    fallback
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn estimated_width_scales_with_font_size() {
        let font = OverlayFont::estimated();
        let small = font.measure("Hello", 12.0);
        let large = font.measure("Hello", 24.0);
        assert!((small - 2.278 * 12.0).abs() < 1e-3);
        assert!((large - small * 2.0).abs() < 1e-3);
    }

    #[test]
    fn estimated_width_follows_arial_advances() {
        let font = OverlayFont::estimated();
        assert!((font.measure("il", 10.0) - 4.44).abs() < 1e-3);
        assert!((font.measure("MW", 10.0) - 17.77).abs() < 1e-3);
        assert!((font.measure("a b", 10.0) - (0.556 + 0.278 + 0.556) * 10.0).abs() < 1e-3);
        assert!((font.measure("~", 10.0) - 5.84).abs() < 1e-3);
    }

    #[test]
    fn estimated_width_treats_hangul_as_full_width() {
        let font = OverlayFont::estimated();
        assert!((font.measure("안녕", 10.0) - 20.0).abs() < 1e-4);
        assert!((font.measure("こんにちは", 10.0) - 50.0).abs() < 1e-4);
    }

    #[test]
    fn estimated_ascent_is_proportional() {
        let font = OverlayFont::estimated();
        assert!((font.ascent(20.0) - 16.0).abs() < 1e-4);
        assert_eq!(font.family(), "sans-serif");
        assert!(font.metrics().is_none());
    }

    #[test]
    fn missing_font_file_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let result = load_font_metrics(&dir.path().join("missing.ttf"), None);
        assert!(result.is_err());
    }

    #[test]
    fn font_file_face_matches_the_requested_family() {
        let Some(system) = OverlayFont::resolve(None, None).metrics().cloned() else {
            return;
        };
        let Some(family) = system.family().map(str::to_string) else {
            return;
        };
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("overlay.ttf");
        std::fs::write(&path, system.data()).expect("write");

        let metrics = load_font_metrics(&path, Some(&family)).expect("metrics");
        assert_eq!(metrics.family(), Some(family.as_str()));
        let font = OverlayFont::resolve(Some(&path), Some(&family));
        assert_eq!(font.family(), family);
    }

    #[test]
    fn unparsable_font_path_falls_back_to_estimates() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("broken.ttf");
        std::fs::write(&path, b"not a font").expect("write");
        let font = OverlayFont::resolve(Some(&path), None);
        assert!(font.metrics().is_none());
        assert_eq!(font.family(), "sans-serif");
    }
}
