use anyhow::{anyhow, Context, Result};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub mod error;
pub mod fetch;
pub mod logging;
pub mod ocr;
pub mod overlay;
pub mod pipeline;
pub mod providers;
pub mod server;
pub mod settings;
pub mod translation;

use ocr::TesseractDetector;
use overlay::{Compositor, OverlayFont, RenderMode};
use pipeline::{ImageInput, Pipeline, ProcessedImage};
use providers::OpenAI;
use settings::Settings;
use translation::Translator;

#[derive(Debug, Clone, Default)]
pub struct Config {
    pub data: Option<String>,
    pub page: Option<String>,
    pub output: Option<String>,
    pub mode: RenderMode,
    pub ocr_languages: Option<String>,
    pub min_confidence: Option<f32>,
    pub model: Option<String>,
    pub key: Option<String>,
    pub settings_path: Option<String>,
    pub regions_json: bool,
    /// `Some("")` serves on the configured address.
    pub server: Option<String>,
}

pub type DefaultPipeline = Pipeline<OpenAI, TesseractDetector>;

pub async fn run(config: Config) -> Result<String> {
    let settings_path = config.settings_path.as_deref().map(Path::new);
    let mut settings = settings::load_settings(settings_path)?;
    apply_overrides(&mut settings, &config)?;
    run_with_settings(settings, &config).await
}

async fn run_with_settings(settings: Settings, config: &Config) -> Result<String> {
    // Listing a page's images needs neither OCR nor an API key.
    if let Some(page) = config.page.as_deref() {
        if config.server.is_none() && config.output.is_none() {
            let client = fetch::build_client(&settings)?;
            let urls = fetch::scrape_image_urls(&client, page).await?;
            return Ok(urls.join("\n"));
        }
    }

    let pipeline = build_pipeline(&settings, config.key.as_deref())?;
    let compositor = build_compositor(&settings);

    if let Some(addr) = config.server.as_deref() {
        let addr = if addr.trim().is_empty() {
            settings.server_addr.clone()
        } else {
            addr.trim().to_string()
        };
        server::run_server(server::ServerState::new(pipeline, compositor), addr).await?;
        return Ok(String::new());
    }

    if let Some(page) = config.page.as_deref() {
        return run_page(&pipeline, &compositor, config, page).await;
    }

    let data = config
        .data
        .as_deref()
        .ok_or_else(|| anyhow!("nothing to do: pass --data, --page or --server"))?;
    let processed = pipeline.process(ImageInput::from_arg(data)).await?;
    let output = match config.output.as_deref() {
        Some(path) => PathBuf::from(path),
        None => default_output_path(data),
    };
    write_rendered(&processed, &compositor, config.mode, &output)?;

    let mut lines = vec![output.display().to_string()];
    if config.regions_json {
        lines.push(serde_json::to_string_pretty(&processed.regions)?);
    }
    Ok(lines.join("\n"))
}

pub fn build_pipeline(settings: &Settings, key: Option<&str>) -> Result<DefaultPipeline> {
    let client = fetch::build_client(settings)?;
    let provider = providers::build_provider(key, settings.translation_model.as_deref())?
        .with_client(client.clone());
    Ok(Pipeline::new(
        TesseractDetector::default(),
        settings.detector_config(),
        Translator::new(provider, settings.translation_source_lang.clone()),
        client,
        settings.fetch_max_image_bytes,
    ))
}

pub fn build_compositor(settings: &Settings) -> Compositor {
    let font = OverlayFont::resolve(
        settings.overlay_font_path.as_deref().map(Path::new),
        settings.overlay_font_family.as_deref(),
    );
    Compositor::new(font, settings.overlay_style())
}

fn apply_overrides(settings: &mut Settings, config: &Config) -> Result<()> {
    if let Some(languages) = config.ocr_languages.as_deref().map(str::trim) {
        if languages.is_empty() {
            return Err(anyhow!("--ocr-languages is empty"));
        }
        settings.ocr_languages = languages.to_string();
    }
    if let Some(min_confidence) = config.min_confidence {
        if !(0.0..=100.0).contains(&min_confidence) {
            return Err(anyhow!("--min-confidence must be between 0 and 100"));
        }
        settings.ocr_min_confidence = min_confidence;
    }
    if let Some(model) = config.model.as_deref().map(str::trim) {
        if !model.is_empty() {
            settings.translation_model = Some(model.to_string());
        }
    }
    Ok(())
}

/// Translates every image on the page into the `--output` directory.
async fn run_page(
    pipeline: &DefaultPipeline,
    compositor: &Compositor,
    config: &Config,
    page: &str,
) -> Result<String> {
    let dir = config
        .output
        .as_deref()
        .map(PathBuf::from)
        .ok_or_else(|| anyhow!("--page needs --output to translate images"))?;
    let urls = fetch::scrape_image_urls(pipeline.client(), page).await?;

    std::fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create output dir: {}", dir.display()))?;
    let mut lines = Vec::new();
    for (idx, url) in urls.iter().enumerate() {
        let processed = match pipeline.process(ImageInput::Url(url.clone())).await {
            Ok(processed) => processed,
            Err(err) => {
                warn!("skipping {}: {}", url, err);
                lines.push(format!("{}\tfailed: {}", url, err));
                continue;
            }
        };
        let path = dir.join(format!("{:03}.png", idx + 1));
        write_rendered(&processed, compositor, config.mode, &path)?;
        info!("page: {} -> {}", url, path.display());
        lines.push(format!("{}\t{}", url, path.display()));
    }
    Ok(lines.join("\n"))
}

fn write_rendered(
    processed: &ProcessedImage,
    compositor: &Compositor,
    mode: RenderMode,
    path: &Path,
) -> Result<()> {
    let rendered = processed.render(compositor, mode)?;
    rendered
        .save_with_format(path, image::ImageFormat::Png)
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}

fn default_output_path(data: &str) -> PathBuf {
    let stem = match ImageInput::from_arg(data) {
        ImageInput::File(path) => path
            .file_stem()
            .map(|stem| stem.to_string_lossy().to_string()),
        ImageInput::Url(url) => url
            .split(['?', '#'])
            .next()
            .and_then(|path| path.rsplit('/').next())
            .and_then(|name| name.split('.').next())
            .map(str::to_string),
        ImageInput::Bytes(_) => None,
    }
    .filter(|stem| !stem.is_empty())
    .unwrap_or_else(|| "image".to_string());
    PathBuf::from(format!("{}.translated.png", stem))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_name_follows_the_input() {
        assert_eq!(
            default_output_path("pages/ch3/004.jpg"),
            PathBuf::from("004.translated.png")
        );
        assert_eq!(
            default_output_path("https://cdn.example.com/a/b/017.webp?w=800"),
            PathBuf::from("017.translated.png")
        );
        assert_eq!(
            default_output_path("https://cdn.example.com/"),
            PathBuf::from("image.translated.png")
        );
    }

    #[test]
    fn overrides_are_validated() {
        let mut settings = Settings::default();
        let config = Config {
            ocr_languages: Some(" jpn ".to_string()),
            min_confidence: Some(55.0),
            model: Some("gpt-4.1-mini".to_string()),
            ..Config::default()
        };
        apply_overrides(&mut settings, &config).expect("overrides");
        assert_eq!(settings.ocr_languages, "jpn");
        assert_eq!(settings.ocr_min_confidence, 55.0);
        assert_eq!(settings.translation_model.as_deref(), Some("gpt-4.1-mini"));

        let bad = Config {
            min_confidence: Some(140.0),
            ..Config::default()
        };
        assert!(apply_overrides(&mut settings, &bad).is_err());
    }

    #[tokio::test]
    async fn page_listing_needs_no_api_key() {
        let page = axum::Router::new().route(
            "/chapter/7",
            axum::routing::get(|| async {
                axum::response::Html(r#"<img src="001.webp"><img src="002.webp">"#)
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let addr = listener.local_addr().expect("addr");
        tokio::spawn(async move {
            axum::serve(listener, page).await.expect("serve");
        });

        let config = Config {
            page: Some(format!("http://{}/chapter/7", addr)),
            key: Some("   ".to_string()),
            ..Config::default()
        };
        let output = run_with_settings(Settings::default(), &config)
            .await
        .expect("listing");
        assert_eq!(
            output,
            format!("http://{a}/chapter/001.webp\nhttp://{a}/chapter/002.webp", a = addr)
        );
    }
}
