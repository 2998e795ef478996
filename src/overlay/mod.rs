mod font;
mod layout;
mod render;

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::{Error, Result};

pub use font::{
    load_font_metrics, resolve_overlay_font, FontMetrics, OverlayFont, ResolvedOverlayFont,
};
pub use layout::{
    font_size_for_height, layout_region, wrap_words, LayoutRect, RegionLayout, LINE_HEIGHT_RATIO,
    MASK_PADDING, MAX_FONT_SIZE, MIN_FONT_SIZE, WRAP_INSET,
};
pub use render::Compositor;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BBoxPx {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

/// One detected unit of source text on an image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextRegion {
    pub bounds: BBoxPx,
    pub original_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub translated_text: Option<String>,
}

impl TextRegion {
    pub fn new(bounds: BBoxPx, original_text: impl Into<String>) -> Self {
        Self {
            bounds,
            original_text: original_text.into(),
            translated_text: None,
        }
    }

    pub fn with_translation(mut self, translated: impl Into<String>) -> Self {
        self.translated_text = Some(translated.into());
        self
    }

    /// Trimmed translation, or `None` when it is absent or blank.
    pub fn display_text(&self) -> Option<&str> {
        self.translated_text
            .as_deref()
            .map(str::trim)
            .filter(|text| !text.is_empty())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderMode {
    Original,
    #[default]
    Translated,
}

impl RenderMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RenderMode::Original => "original",
            RenderMode::Translated => "translated",
        }
    }
}

impl FromStr for RenderMode {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> anyhow::Result<Self> {
        match value.trim().to_lowercase().as_str() {
            "original" => Ok(RenderMode::Original),
            "translated" => Ok(RenderMode::Translated),
            other => Err(anyhow::anyhow!(
                "unknown render mode '{}' (expected translated or original)",
                other
            )),
        }
    }
}

/// Decode state of an image handed to the compositor.
#[derive(Debug, Clone)]
pub enum ImageResource {
    Pending,
    Failed(String),
    Ready(image::RgbaImage),
}

impl ImageResource {
    pub fn decode(bytes: &[u8]) -> Self {
        match image::load_from_memory(bytes) {
            Ok(image) => ImageResource::Ready(image.to_rgba8()),
            Err(err) => ImageResource::Failed(err.to_string()),
        }
    }

    pub fn ready(&self) -> Result<&image::RgbaImage> {
        match self {
            ImageResource::Ready(image) => Ok(image),
            ImageResource::Pending => Err(Error::ImageNotReady),
            ImageResource::Failed(reason) => Err(Error::ImageLoadFailed(reason.clone())),
        }
    }

    pub fn dimensions(&self) -> Option<(u32, u32)> {
        match self {
            ImageResource::Ready(image) => Some(image.dimensions()),
            _ => None,
        }
    }
}

/// PNG bytes of a bitmap.
pub fn encode_png(image: &image::RgbaImage) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    image
        .write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
        .map_err(|err| Error::Render(format!("failed to encode png: {}", err)))?;
    Ok(bytes)
}

impl From<image::RgbaImage> for ImageResource {
    fn from(image: image::RgbaImage) -> Self {
        ImageResource::Ready(image)
    }
}

pub struct RenderRequest<'a> {
    pub image: &'a ImageResource,
    pub regions: &'a [TextRegion],
    pub mode: RenderMode,
}

#[derive(Debug, Clone)]
pub struct OverlayStyle {
    pub mask_color: String,
    pub mask_opacity: f32,
    pub text_color: String,
}

impl Default for OverlayStyle {
    fn default() -> Self {
        Self {
            mask_color: "#ffffff".to_string(),
            mask_opacity: 0.95,
            text_color: "#000000".to_string(),
        }
    }
}
