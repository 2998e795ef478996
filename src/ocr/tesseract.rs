use std::io::Write;
use std::path::Path;
use tokio::process::Command;
use tracing::{debug, warn};

use super::parse::parse_tsv_words;
use super::{DetectFuture, OcrWord, RegionDetector};
use crate::error::{Error, Result};

/// Page segmentation mode 11: sparse text in no particular order, which suits
/// speech bubbles scattered over a page.
const DEFAULT_PSM: u32 = 11;

/// Detector backed by the `tesseract` command line tool.
#[derive(Debug, Clone)]
pub struct TesseractDetector {
    psm: u32,
}

impl Default for TesseractDetector {
    fn default() -> Self {
        Self { psm: DEFAULT_PSM }
    }
}

impl RegionDetector for TesseractDetector {
    fn detect<'a>(&'a self, image_png: &'a [u8], languages: &'a str) -> DetectFuture<'a> {
        Box::pin(async move {
            let languages = normalize_ocr_languages(languages).await?;
            let mut tmp = tempfile::Builder::new()
                .suffix(".png")
                .tempfile()
                .map_err(|err| Error::OcrFailed(format!("failed to create temp file: {}", err)))?;
            tmp.write_all(image_png)
                .and_then(|_| tmp.flush())
                .map_err(|err| Error::OcrFailed(format!("failed to write temp image: {}", err)))?;
            let tsv = run_tesseract_tsv(tmp.path(), &languages, self.psm).await?;
            let words = parse_tsv_words(&tsv);
            debug!("tesseract: {} words (lang={}, psm={})", words.len(), languages, self.psm);
            Ok::<Vec<OcrWord>, Error>(words)
        })
    }
}

pub async fn list_tesseract_languages() -> Result<Vec<String>> {
    let output = Command::new("tesseract")
        .arg("--list-langs")
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|err| Error::OcrFailed(format!("failed to run tesseract --list-langs: {}", err)))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(Error::OcrFailed(format!(
            "tesseract --list-langs failed: {}",
            stderr.trim()
        )));
    }
    let stdout = String::from_utf8_lossy(&output.stdout);
    Ok(parse_language_list(&stdout))
}

fn parse_language_list(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .skip(1)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .collect()
}

async fn normalize_ocr_languages(requested: &str) -> Result<String> {
    let trimmed = requested.trim();
    if trimmed.is_empty() {
        return Err(Error::OcrFailed("ocr languages is empty".to_string()));
    }
    let available = match list_tesseract_languages().await {
        Ok(list) => list,
        Err(err) => {
            debug!("tesseract language list unavailable: {}", err);
            return Ok(trimmed.to_string());
        }
    };
    choose_languages(trimmed, &available)
}

fn choose_languages(requested: &str, available: &[String]) -> Result<String> {
    let mut chosen = Vec::new();
    let mut missing = Vec::new();
    for raw in requested.split(['+', ',', ' ']) {
        let lang = raw.trim();
        if lang.is_empty() {
            continue;
        }
        if available.iter().any(|value| value == lang) {
            chosen.push(lang.to_string());
        } else {
            missing.push(lang.to_string());
        }
    }

    if chosen.is_empty() {
        return Err(Error::OcrFailed(format!(
            "ocr language(s) not available: {} (available: {})",
            missing.join(", "),
            available.join(", ")
        )));
    }
    if !missing.is_empty() {
        warn!(
            "ocr language(s) not available: {} (available: {})",
            missing.join(", "),
            available.join(", ")
        );
    }
    Ok(chosen.join("+"))
}

async fn run_tesseract_tsv(path: &Path, languages: &str, psm: u32) -> Result<String> {
    let output = Command::new("tesseract")
        .arg(path)
        .arg("stdout")
        .arg("-l")
        .arg(languages)
        .arg("--oem")
        .arg("1")
        .arg("--psm")
        .arg(psm.to_string())
        .arg("tsv")
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|err| {
            Error::OcrFailed(format!("failed to run tesseract (is it installed?): {}", err))
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(Error::OcrFailed(format!(
            "tesseract failed: {}",
            stderr.trim()
        )));
    }
    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn available() -> Vec<String> {
        ["eng", "kor", "osd"].iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn language_list_skips_header() {
        let stdout = "List of available languages in \"/usr/share/tessdata/\" (3):\neng\nkor\n\nosd\n";
        assert_eq!(parse_language_list(stdout), available());
    }

    #[test]
    fn missing_languages_are_dropped() {
        let chosen = choose_languages("kor+jpn+eng", &available()).expect("languages");
        assert_eq!(chosen, "kor+eng");
    }

    #[test]
    fn no_available_language_is_an_error() {
        let err = choose_languages("jpn, chi_sim", &available()).unwrap_err();
        assert!(err.to_string().contains("jpn, chi_sim"));
    }
}
