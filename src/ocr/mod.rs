mod merge;
mod parse;
mod script;
mod tesseract;

use image::RgbaImage;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tracing::debug;

use crate::error::{Error, Result};
use crate::overlay::{encode_png, BBoxPx, TextRegion};

pub use parse::parse_tsv_words;
pub use script::{has_expected_letter, scripts_for_languages, Script};
pub use tesseract::{list_tesseract_languages, TesseractDetector};

/// Tesseract assigns (page, block, paragraph, line) to every word.
pub type LineKey = (u32, u32, u32, u32);

#[derive(Debug, Clone, PartialEq)]
pub struct OcrWord {
    pub text: String,
    pub confidence: f32,
    pub bbox: BBoxPx,
    pub line: Option<LineKey>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    #[default]
    Word,
    Line,
}

#[derive(Debug, Clone)]
pub struct DetectorConfig {
    pub languages: String,
    /// Entries at or below this confidence are dropped.
    pub min_confidence: f32,
    pub timeout: Duration,
    pub granularity: Granularity,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            languages: "kor+jpn+eng".to_string(),
            min_confidence: 30.0,
            timeout: Duration::from_secs(30),
            granularity: Granularity::Word,
        }
    }
}

pub type DetectFuture<'a> = Pin<Box<dyn Future<Output = Result<Vec<OcrWord>>> + Send + 'a>>;

/// Raw text detection over an encoded PNG.
pub trait RegionDetector: Send + Sync {
    fn detect<'a>(&'a self, image_png: &'a [u8], languages: &'a str) -> DetectFuture<'a>;
}

/// Runs `detector` under the configured timeout and turns its output into
/// trimmed, filtered regions with no translation yet.
pub async fn detect_regions<D: RegionDetector + ?Sized>(
    detector: &D,
    image: &RgbaImage,
    config: &DetectorConfig,
) -> Result<Vec<TextRegion>> {
    let png = encode_png(image)
        .map_err(|err| Error::OcrFailed(format!("failed to encode image for OCR: {}", err)))?;
    let words = tokio::time::timeout(config.timeout, detector.detect(&png, &config.languages))
        .await
        .map_err(|_| Error::OcrTimeout(config.timeout))??;
    let total = words.len();
    let kept = filter_words(words, config);
    debug!("ocr: kept {} of {} detections", kept.len(), total);

    let regions = match config.granularity {
        Granularity::Word => kept
            .into_iter()
            .map(|word| TextRegion::new(word.bbox, word.text))
            .collect(),
        Granularity::Line => merge::merge_line_words(kept)
            .into_iter()
            .map(|word| TextRegion::new(word.bbox, word.text))
            .collect(),
    };
    Ok(regions)
}

/// Applies the confidence threshold and the expected-script content filter.
pub fn filter_words(words: Vec<OcrWord>, config: &DetectorConfig) -> Vec<OcrWord> {
    let scripts = scripts_for_languages(&config.languages);
    words
        .into_iter()
        .filter(|word| word.confidence > config.min_confidence)
        .filter_map(|mut word| {
            let trimmed = word.text.trim().to_string();
            if trimmed.is_empty() || !has_expected_letter(&trimmed, &scripts) {
                return None;
            }
            word.text = trimmed;
            Some(word)
        })
        .collect()
}
