use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::ocr::{DetectorConfig, Granularity};
use crate::overlay::OverlayStyle;

const DEFAULT_SETTINGS_TOML: &str = include_str!("../settings.toml");
const DEFAULT_MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct Settings {
    pub ocr_languages: String,
    pub ocr_min_confidence: f32,
    pub ocr_timeout_secs: u64,
    pub ocr_granularity: Granularity,
    pub overlay_font_family: Option<String>,
    pub overlay_font_path: Option<String>,
    pub overlay_mask_color: String,
    pub overlay_mask_opacity: f32,
    pub overlay_text_color: String,
    pub translation_model: Option<String>,
    pub translation_source_lang: String,
    pub fetch_max_image_bytes: usize,
    pub fetch_user_agent: String,
    pub server_addr: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            ocr_languages: "kor+jpn+eng".to_string(),
            ocr_min_confidence: 30.0,
            ocr_timeout_secs: 30,
            ocr_granularity: Granularity::Word,
            overlay_font_family: None,
            overlay_font_path: None,
            overlay_mask_color: "#ffffff".to_string(),
            overlay_mask_opacity: 0.95,
            overlay_text_color: "#000000".to_string(),
            translation_model: None,
            translation_source_lang: "Korean/Japanese".to_string(),
            fetch_max_image_bytes: DEFAULT_MAX_IMAGE_BYTES,
            fetch_user_agent: "Mozilla/5.0 (compatible; chapter-image-translator)".to_string(),
            server_addr: "127.0.0.1:3000".to_string(),
        }
    }
}

impl Settings {
    pub fn detector_config(&self) -> DetectorConfig {
        DetectorConfig {
            languages: self.ocr_languages.clone(),
            min_confidence: self.ocr_min_confidence,
            timeout: Duration::from_secs(self.ocr_timeout_secs),
            granularity: self.ocr_granularity,
        }
    }

    pub fn overlay_style(&self) -> OverlayStyle {
        OverlayStyle {
            mask_color: self.overlay_mask_color.clone(),
            mask_opacity: self.overlay_mask_opacity,
            text_color: self.overlay_text_color.clone(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct SettingsFile {
    ocr: Option<OcrSettings>,
    overlay: Option<OverlaySettings>,
    translation: Option<TranslationSettings>,
    fetch: Option<FetchSettings>,
    server: Option<ServerSettings>,
}

#[derive(Debug, Default, Deserialize)]
struct OcrSettings {
    languages: Option<String>,
    min_confidence: Option<f32>,
    timeout_secs: Option<u64>,
    granularity: Option<Granularity>,
}

#[derive(Debug, Default, Deserialize)]
struct OverlaySettings {
    font_family: Option<String>,
    font_path: Option<String>,
    mask_color: Option<String>,
    mask_opacity: Option<f32>,
    text_color: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct TranslationSettings {
    model: Option<String>,
    source_lang: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct FetchSettings {
    max_image_bytes: Option<usize>,
    user_agent: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerSettings {
    addr: Option<String>,
}

pub fn load_settings(extra_path: Option<&Path>) -> Result<Settings> {
    ensure_home_settings_file()?;

    let mut ordered_paths = vec![
        PathBuf::from("settings.toml"),
        PathBuf::from("settings.local.toml"),
    ];
    if let Some(home) = home_dir() {
        ordered_paths.push(home.join("settings.toml"));
        ordered_paths.push(home.join("settings.local.toml"));
    }
    if let Some(extra) = extra_path {
        if !extra.exists() {
            return Err(anyhow!("settings file not found: {}", extra.display()));
        }
        ordered_paths.push(extra.to_path_buf());
    }

    load_layers(&ordered_paths)
}

/// Merges every existing file in `paths` over the defaults, later files winning.
pub fn load_layers(paths: &[PathBuf]) -> Result<Settings> {
    let mut settings = Settings::default();
    for path in paths {
        if !path.exists() {
            continue;
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read settings: {}", path.display()))?;
        let parsed: SettingsFile = toml::from_str(&content)
            .with_context(|| format!("failed to parse settings: {}", path.display()))?;
        settings.merge(parsed);
    }
    Ok(settings)
}

impl Settings {
    fn merge(&mut self, incoming: SettingsFile) {
        if let Some(ocr) = incoming.ocr {
            if let Some(languages) = non_empty(ocr.languages) {
                self.ocr_languages = languages;
            }
            if let Some(conf) = ocr.min_confidence {
                if (0.0..=100.0).contains(&conf) {
                    self.ocr_min_confidence = conf;
                }
            }
            if let Some(secs) = ocr.timeout_secs {
                if secs > 0 {
                    self.ocr_timeout_secs = secs;
                }
            }
            if let Some(granularity) = ocr.granularity {
                self.ocr_granularity = granularity;
            }
        }
        if let Some(overlay) = incoming.overlay {
            if let Some(family) = non_empty(overlay.font_family) {
                self.overlay_font_family = Some(family);
            }
            if let Some(path) = non_empty(overlay.font_path) {
                self.overlay_font_path = Some(path);
            }
            if let Some(color) = non_empty(overlay.mask_color) {
                self.overlay_mask_color = color;
            }
            if let Some(opacity) = overlay.mask_opacity {
                if (0.0..=1.0).contains(&opacity) {
                    self.overlay_mask_opacity = opacity;
                }
            }
            if let Some(color) = non_empty(overlay.text_color) {
                self.overlay_text_color = color;
            }
        }
        if let Some(translation) = incoming.translation {
            if let Some(model) = non_empty(translation.model) {
                self.translation_model = Some(model);
            }
            if let Some(label) = non_empty(translation.source_lang) {
                self.translation_source_lang = label;
            }
        }
        if let Some(fetch) = incoming.fetch {
            if let Some(limit) = fetch.max_image_bytes {
                if limit > 0 {
                    self.fetch_max_image_bytes = limit;
                }
            }
            if let Some(agent) = non_empty(fetch.user_agent) {
                self.fetch_user_agent = agent;
            }
        }
        if let Some(server) = incoming.server {
            if let Some(addr) = non_empty(server.addr) {
                self.server_addr = addr;
            }
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.trim().is_empty())
}

fn ensure_home_settings_file() -> Result<()> {
    let Some(home) = home_dir() else {
        return Ok(());
    };
    fs::create_dir_all(&home)
        .with_context(|| format!("failed to create settings directory: {}", home.display()))?;
    let path = home.join("settings.toml");
    if !path.exists() {
        fs::write(&path, DEFAULT_SETTINGS_TOML)
            .with_context(|| format!("failed to write settings: {}", path.display()))?;
    }
    Ok(())
}

fn home_dir() -> Option<PathBuf> {
    std::env::var("HOME").ok().and_then(|home| {
        let home = home.trim();
        if home.is_empty() {
            None
        } else {
            Some(Path::new(home).join(".chapter-image-translator"))
        }
    })
}
