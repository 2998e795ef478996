mod session;

use image::RgbaImage;
use reqwest::Client;
use std::path::PathBuf;
use tracing::info;

use crate::error::{Error, Result};
use crate::fetch::fetch_image;
use crate::ocr::{detect_regions, DetectorConfig, RegionDetector};
use crate::overlay::{Compositor, ImageResource, RenderMode, RenderRequest, TextRegion};
use crate::providers::Provider;
use crate::translation::Translator;

pub use session::{CommittedCanvas, Generation, RenderSession};

#[derive(Debug, Clone)]
pub enum ImageInput {
    Url(String),
    File(PathBuf),
    Bytes(Vec<u8>),
}

impl ImageInput {
    /// `http(s)://` values are URLs, everything else a local path.
    pub fn from_arg(value: &str) -> Self {
        let trimmed = value.trim();
        if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
            ImageInput::Url(trimmed.to_string())
        } else {
            ImageInput::File(PathBuf::from(trimmed))
        }
    }
}

/// A decoded image with its detected and translated regions.
///
/// Rendering only reads from it, so switching modes never repeats OCR or
/// translation.
#[derive(Debug, Clone)]
pub struct ProcessedImage {
    pub image: ImageResource,
    pub regions: Vec<TextRegion>,
}

impl ProcessedImage {
    pub fn render(&self, compositor: &Compositor, mode: RenderMode) -> Result<RgbaImage> {
        compositor.render(&RenderRequest {
            image: &self.image,
            regions: &self.regions,
            mode,
        })
    }
}

pub struct Pipeline<P: Provider, D: RegionDetector> {
    detector: D,
    detector_config: DetectorConfig,
    translator: Translator<P>,
    client: Client,
    max_image_bytes: usize,
}

impl<P: Provider, D: RegionDetector> Pipeline<P, D> {
    pub fn new(
        detector: D,
        detector_config: DetectorConfig,
        translator: Translator<P>,
        client: Client,
        max_image_bytes: usize,
    ) -> Self {
        Self {
            detector,
            detector_config,
            translator,
            client,
            max_image_bytes,
        }
    }

    pub fn detector(&self) -> &D {
        &self.detector
    }

    pub fn detector_config(&self) -> &DetectorConfig {
        &self.detector_config
    }

    pub fn translator(&self) -> &Translator<P> {
        &self.translator
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn max_image_bytes(&self) -> usize {
        self.max_image_bytes
    }

    pub async fn load_bytes(&self, input: ImageInput) -> Result<Vec<u8>> {
        let bytes = match input {
            ImageInput::Url(url) => {
                fetch_image(&self.client, &url, self.max_image_bytes)
                    .await?
                    .bytes
            }
            ImageInput::File(path) => tokio::fs::read(&path).await.map_err(|err| {
                Error::ImageLoadFailed(format!("failed to read {}: {}", path.display(), err))
            })?,
            ImageInput::Bytes(bytes) => bytes,
        };
        if bytes.len() > self.max_image_bytes {
            return Err(Error::ImageTooLarge {
                size: bytes.len(),
                limit: self.max_image_bytes,
            });
        }
        Ok(bytes)
    }

    /// Load, decode, detect, translate. Translation failures leave the
    /// original text as the displayed string; everything else propagates.
    pub async fn process(&self, input: ImageInput) -> Result<ProcessedImage> {
        let bytes = self.load_bytes(input).await?;
        self.process_bytes(&bytes).await
    }

    pub async fn process_bytes(&self, bytes: &[u8]) -> Result<ProcessedImage> {
        let image = ImageResource::decode(bytes);
        let mut regions =
            detect_regions(&self.detector, image.ready()?, &self.detector_config).await?;
        self.translator.translate_regions(&mut regions).await;
        info!("pipeline: {} region(s) ready", regions.len());
        Ok(ProcessedImage { image, regions })
    }
}
