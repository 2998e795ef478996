use serde::{Deserialize, Serialize};

use crate::overlay::{RenderMode, TextRegion};
use crate::translation::BatchEntry;

#[derive(Debug, Deserialize)]
pub(crate) struct FetchImagesRequest {
    #[serde(default)]
    pub(crate) url: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct FetchImagesResponse {
    pub(crate) images: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ProxyQuery {
    pub(crate) url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct OcrRequest {
    #[serde(default)]
    pub(crate) data_base64: String,
    pub(crate) languages: Option<String>,
    pub(crate) min_confidence: Option<f32>,
}

#[derive(Debug, Serialize)]
pub(crate) struct OcrResponse {
    pub(crate) width: u32,
    pub(crate) height: u32,
    pub(crate) regions: Vec<TextRegion>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TranslateRequest {
    #[serde(default)]
    pub(crate) entries: Vec<BatchEntry>,
    pub(crate) source_lang: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct TranslateResponse {
    pub(crate) translations: Vec<BatchEntry>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RenderPayload {
    #[serde(default)]
    pub(crate) data_base64: String,
    #[serde(default)]
    pub(crate) regions: Vec<TextRegion>,
    #[serde(default)]
    pub(crate) mode: RenderMode,
}

#[derive(Debug, Serialize)]
pub(crate) struct RenderResponse {
    pub(crate) mime: String,
    pub(crate) data_base64: String,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub(crate) struct ProcessRequest {
    pub(crate) url: Option<String>,
    pub(crate) data_base64: Option<String>,
    pub(crate) mode: Option<RenderMode>,
}

#[derive(Debug, Serialize)]
pub(crate) struct ProcessResponse {
    pub(crate) regions: Vec<TextRegion>,
    pub(crate) mime: String,
    pub(crate) data_base64: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct ErrorResponse {
    pub(crate) error: String,
}
