use anyhow::{Context, Result};
use axum::body::Body;
use axum::extract::{DefaultBodyLimit, Query, State};
use axum::http::{header, HeaderMap, HeaderValue, Method, Request, Response, StatusCode};
use axum::middleware::Next;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use std::sync::Arc;
use tracing::{info, warn};

use super::models::{
    ErrorResponse, FetchImagesRequest, FetchImagesResponse, OcrRequest, OcrResponse,
    ProcessRequest, ProcessResponse, ProxyQuery, RenderPayload, RenderResponse, TranslateRequest,
    TranslateResponse,
};
use super::state::ServerState;
use crate::error::Error;
use crate::fetch::{fetch_image, scrape_image_urls};
use crate::ocr::{detect_regions, RegionDetector};
use crate::overlay::{encode_png, Compositor, ImageResource, RenderMode, RenderRequest, TextRegion};
use crate::pipeline::ImageInput;
use crate::providers::Provider;
use crate::translation::backfill_entries;

const PNG_MIME: &str = "image/png";
const PROXY_CACHE_CONTROL: &str = "public, max-age=3600";

type Shared<P, D> = Arc<ServerState<P, D>>;

pub async fn run_server<P, D>(state: ServerState<P, D>, addr: String) -> Result<()>
where
    P: Provider + 'static,
    D: RegionDetector + 'static,
{
    let app = router(Arc::new(state));
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| "failed to bind server address")?;
    info!("server: listening on {}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}

pub fn router<P, D>(state: Shared<P, D>) -> Router
where
    P: Provider + 'static,
    D: RegionDetector + 'static,
{
    let body_limit = base64_body_limit(state.pipeline.max_image_bytes());
    Router::new()
        .route("/health", get(health))
        .route("/fetch-images", post(fetch_images::<P, D>))
        .route("/fetch-images/proxy", get(proxy_image::<P, D>))
        .route("/ocr", post(ocr::<P, D>))
        .route("/translate", post(translate::<P, D>))
        .route("/render", post(render::<P, D>))
        .route("/process", post(process::<P, D>))
        .with_state(state)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(axum::middleware::from_fn(cors_middleware))
}

/// Room for a base64 encoded image of `max_image_bytes` plus the JSON around it.
fn base64_body_limit(max_image_bytes: usize) -> usize {
    max_image_bytes / 3 * 4 + 4 + 64 * 1024
}

async fn health() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}

async fn cors_middleware(req: Request<Body>, next: Next) -> Result<Response<Body>, StatusCode> {
    if req.method() == Method::OPTIONS {
        let mut response = Response::new(Body::empty());
        *response.status_mut() = StatusCode::NO_CONTENT;
        apply_cors_headers(response.headers_mut());
        return Ok(response);
    }
    let mut response = next.run(req).await;
    apply_cors_headers(response.headers_mut());
    Ok(response)
}

fn apply_cors_headers(headers: &mut HeaderMap) {
    headers.insert("access-control-allow-origin", HeaderValue::from_static("*"));
    headers.insert(
        "access-control-allow-methods",
        HeaderValue::from_static("GET,POST,OPTIONS"),
    );
    headers.insert(
        "access-control-allow-headers",
        HeaderValue::from_static("content-type,authorization"),
    );
}

#[derive(Debug)]
pub(crate) struct ServerError {
    pub(crate) status: StatusCode,
    pub(crate) message: String,
}

impl ServerError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl From<Error> for ServerError {
    fn from(err: Error) -> Self {
        let status = match &err {
            Error::ImageNotReady | Error::ImageLoadFailed(_) => StatusCode::BAD_REQUEST,
            Error::ImageTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Error::FetchFailed { .. }
            | Error::TranslationParseError(_)
            | Error::TranslationFailed(_) => StatusCode::BAD_GATEWAY,
            Error::OcrTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            Error::OcrFailed(_) | Error::Render(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            warn!("server: {}", err);
        }
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> axum::response::Response {
        (
            self.status,
            Json(ErrorResponse {
                error: self.message,
            }),
        )
            .into_response()
    }
}

fn decode_base64_image(data: &str, max_bytes: usize) -> Result<Vec<u8>, ServerError> {
    let trimmed = data.trim();
    // Accept data URLs as produced by FileReader.readAsDataURL.
    let payload = match trimmed.split_once(";base64,") {
        Some((prefix, rest)) if prefix.starts_with("data:") => rest,
        _ => trimmed,
    };
    if payload.is_empty() {
        return Err(ServerError::bad_request("data_base64 is required"));
    }
    let bytes = BASE64
        .decode(payload)
        .map_err(|err| ServerError::bad_request(format!("invalid base64 data: {}", err)))?;
    if bytes.len() > max_bytes {
        return Err(Error::ImageTooLarge {
            size: bytes.len(),
            limit: max_bytes,
        }
        .into());
    }
    Ok(bytes)
}

async fn render_png(
    compositor: Arc<Compositor>,
    image: ImageResource,
    regions: Vec<TextRegion>,
    mode: RenderMode,
) -> Result<Vec<u8>, Error> {
    tokio::task::spawn_blocking(move || {
        let rendered = compositor.render(&RenderRequest {
            image: &image,
            regions: &regions,
            mode,
        })?;
        encode_png(&rendered)
    })
    .await
    .map_err(|err| Error::Render(format!("render task failed: {}", err)))?
}

async fn fetch_images<P: Provider, D: RegionDetector>(
    State(state): State<Shared<P, D>>,
    Json(payload): Json<FetchImagesRequest>,
) -> Result<Json<FetchImagesResponse>, ServerError> {
    let url = payload.url.trim();
    if url.is_empty() {
        return Err(ServerError::bad_request("url is required"));
    }
    let images = scrape_image_urls(state.pipeline.client(), url).await?;
    Ok(Json(FetchImagesResponse { images }))
}

async fn proxy_image<P: Provider, D: RegionDetector>(
    State(state): State<Shared<P, D>>,
    Query(query): Query<ProxyQuery>,
) -> Result<Response<Body>, ServerError> {
    let url = query.url.as_deref().map(str::trim).unwrap_or_default();
    if url.is_empty() {
        return Err(ServerError::bad_request("url is required"));
    }
    let fetched = fetch_image(
        state.pipeline.client(),
        url,
        state.pipeline.max_image_bytes(),
    )
    .await?;
    let content_type = HeaderValue::from_str(&fetched.content_type)
        .unwrap_or_else(|_| HeaderValue::from_static(crate::fetch::FALLBACK_MIME));

    let mut response = Response::new(Body::from(fetched.bytes));
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, content_type);
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static(PROXY_CACHE_CONTROL),
    );
    Ok(response)
}

async fn ocr<P: Provider, D: RegionDetector>(
    State(state): State<Shared<P, D>>,
    Json(payload): Json<OcrRequest>,
) -> Result<Json<OcrResponse>, ServerError> {
    let bytes = decode_base64_image(&payload.data_base64, state.pipeline.max_image_bytes())?;
    let image = ImageResource::decode(&bytes);
    let source = image.ready()?;

    let mut config = state.pipeline.detector_config().clone();
    if let Some(languages) = payload.languages.filter(|value| !value.trim().is_empty()) {
        config.languages = languages.trim().to_string();
    }
    if let Some(min_confidence) = payload.min_confidence {
        if !(0.0..=100.0).contains(&min_confidence) {
            return Err(ServerError::bad_request(
                "min_confidence must be between 0 and 100",
            ));
        }
        config.min_confidence = min_confidence;
    }

    let regions = detect_regions(state.pipeline.detector(), source, &config).await?;
    let (width, height) = source.dimensions();
    Ok(Json(OcrResponse {
        width,
        height,
        regions,
    }))
}

async fn translate<P: Provider, D: RegionDetector>(
    State(state): State<Shared<P, D>>,
    Json(payload): Json<TranslateRequest>,
) -> Result<Json<TranslateResponse>, ServerError> {
    if payload.entries.iter().all(|entry| entry.text.trim().is_empty()) {
        return Err(ServerError::bad_request("entries are empty"));
    }
    let translator = match payload.source_lang.as_deref().map(str::trim) {
        Some(label) if !label.is_empty() => state.pipeline.translator().with_source_lang(label),
        _ => state.pipeline.translator().clone(),
    };
    let map = translator.translate_batch(&payload.entries).await?;
    Ok(Json(TranslateResponse {
        translations: backfill_entries(&payload.entries, &map),
    }))
}

async fn render<P: Provider, D: RegionDetector>(
    State(state): State<Shared<P, D>>,
    Json(payload): Json<RenderPayload>,
) -> Result<Json<RenderResponse>, ServerError> {
    let bytes = decode_base64_image(&payload.data_base64, state.pipeline.max_image_bytes())?;
    let image = ImageResource::decode(&bytes);
    let png = render_png(state.compositor.clone(), image, payload.regions, payload.mode)
        .await
        .map_err(|err| match err {
            Error::ImageLoadFailed(_) | Error::ImageNotReady => ServerError {
                status: StatusCode::UNPROCESSABLE_ENTITY,
                message: err.to_string(),
            },
            other => other.into(),
        })?;
    Ok(Json(RenderResponse {
        mime: PNG_MIME.to_string(),
        data_base64: BASE64.encode(png),
    }))
}

async fn process<P: Provider, D: RegionDetector>(
    State(state): State<Shared<P, D>>,
    Json(payload): Json<ProcessRequest>,
) -> Result<Json<ProcessResponse>, ServerError> {
    let input = match (payload.url, payload.data_base64) {
        (Some(url), _) if !url.trim().is_empty() => ImageInput::Url(url.trim().to_string()),
        (_, Some(data)) if !data.trim().is_empty() => {
            ImageInput::Bytes(decode_base64_image(&data, state.pipeline.max_image_bytes())?)
        }
        _ => return Err(ServerError::bad_request("url or data_base64 is required")),
    };
    let mode = payload.mode.unwrap_or_default();

    let processed = state.pipeline.process(input).await?;
    let regions = processed.regions.clone();
    let png = render_png(
        state.compositor.clone(),
        processed.image,
        processed.regions,
        mode,
    )
    .await?;
    Ok(Json(ProcessResponse {
        regions,
        mime: PNG_MIME.to_string(),
        data_base64: BASE64.encode(png),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_urls_and_plain_base64_both_decode() {
        let plain = BASE64.encode(b"abc");
        assert_eq!(decode_base64_image(&plain, 16).expect("plain"), b"abc");
        let url = format!("data:image/png;base64,{}", plain);
        assert_eq!(decode_base64_image(&url, 16).expect("data url"), b"abc");
    }

    #[test]
    fn base64_errors_are_bad_requests() {
        let err = decode_base64_image("%%%", 16).unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        let err = decode_base64_image("", 16).unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
    }

    #[test]
    fn oversized_payload_is_413() {
        let data = BASE64.encode([0u8; 32]);
        let err = decode_base64_image(&data, 16).unwrap_err();
        assert_eq!(err.status, StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[test]
    fn error_kinds_map_to_statuses() {
        let cases = [
            (Error::OcrTimeout(std::time::Duration::from_secs(30)), 504),
            (Error::fetch_failed("u", "down"), 502),
            (Error::TranslationParseError("x".to_string()), 502),
            (Error::ImageLoadFailed("x".to_string()), 400),
            (Error::Render("x".to_string()), 500),
        ];
        for (err, status) in cases {
            assert_eq!(ServerError::from(err).status.as_u16(), status);
        }
    }

    #[test]
    fn body_limit_fits_a_full_size_image() {
        let max = 10 * 1024 * 1024;
        assert!(base64_body_limit(max) > BASE64.encode(vec![0u8; max]).len());
    }
}
