use std::time::Duration;

/// Failure kinds surfaced by one image's fetch/detect/translate/render cycle.
///
/// None of these are process-fatal; callers show the original image with an
/// error state and never retry automatically.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("image is not decoded yet")]
    ImageNotReady,

    #[error("failed to load image: {0}")]
    ImageLoadFailed(String),

    #[error("image is too large ({size} bytes, limit {limit} bytes)")]
    ImageTooLarge { size: usize, limit: usize },

    #[error("failed to fetch {url}: {reason}")]
    FetchFailed { url: String, reason: String },

    #[error("OCR processing timeout after {} seconds", .0.as_secs())]
    OcrTimeout(Duration),

    #[error("OCR failed: {0}")]
    OcrFailed(String),

    #[error("failed to parse translation response: {0}")]
    TranslationParseError(String),

    #[error("translation failed: {0}")]
    TranslationFailed(String),

    #[error("render failed: {0}")]
    Render(String),
}

impl Error {
    pub(crate) fn fetch_failed(url: &str, reason: impl ToString) -> Self {
        Error::FetchFailed {
            url: url.to_string(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_message_reports_seconds() {
        let err = Error::OcrTimeout(Duration::from_secs(30));
        assert_eq!(err.to_string(), "OCR processing timeout after 30 seconds");
    }

    #[test]
    fn fetch_failed_names_the_url() {
        let err = Error::fetch_failed("https://example.com/a.png", "404 Not Found");
        assert_eq!(
            err.to_string(),
            "failed to fetch https://example.com/a.png: 404 Not Found"
        );
    }
}
