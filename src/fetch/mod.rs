use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Url};
use std::collections::HashSet;
use std::time::Duration;
use tracing::debug;

use crate::error::{Error, Result};
use crate::settings::Settings;

pub const FALLBACK_MIME: &str = "image/jpeg";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct FetchedImage {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

pub fn build_client(settings: &Settings) -> anyhow::Result<Client> {
    let client = Client::builder()
        .user_agent(settings.fetch_user_agent.clone())
        .timeout(REQUEST_TIMEOUT)
        .build()?;
    Ok(client)
}

/// Downloads an image, refusing bodies larger than `max_bytes`.
pub async fn fetch_image(client: &Client, url: &str, max_bytes: usize) -> Result<FetchedImage> {
    let parsed = Url::parse(url.trim()).map_err(|err| Error::fetch_failed(url, err))?;
    let mut response = client
        .get(parsed)
        .send()
        .await
        .map_err(|err| Error::fetch_failed(url, err))?;
    let status = response.status();
    if !status.is_success() {
        return Err(Error::fetch_failed(url, format!("status {}", status)));
    }
    if let Some(length) = response.content_length() {
        if length as usize > max_bytes {
            return Err(Error::ImageTooLarge {
                size: length as usize,
                limit: max_bytes,
            });
        }
    }
    let header_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.to_string());

    let mut bytes = Vec::new();
    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(|err| Error::fetch_failed(url, err))?
    {
        if bytes.len() + chunk.len() > max_bytes {
            return Err(Error::ImageTooLarge {
                size: bytes.len() + chunk.len(),
                limit: max_bytes,
            });
        }
        bytes.extend_from_slice(&chunk);
    }
    let content_type = resolve_content_type(header_type.as_deref(), &bytes);
    debug!("fetch: {} ({} bytes, {})", url, bytes.len(), content_type);
    Ok(FetchedImage {
        bytes,
        content_type,
    })
}

/// Header value first, then a sniff of the bytes, then `image/jpeg`.
pub fn resolve_content_type(header: Option<&str>, bytes: &[u8]) -> String {
    if let Some(value) = header.map(str::trim).filter(|value| !value.is_empty()) {
        return value.to_string();
    }
    infer::get(bytes)
        .map(|kind| kind.mime_type().to_string())
        .unwrap_or_else(|| FALLBACK_MIME.to_string())
}

/// Image URLs referenced by `<img src>` on a page, absolute and de-duplicated.
pub async fn scrape_image_urls(client: &Client, page_url: &str) -> Result<Vec<String>> {
    let base = Url::parse(page_url.trim()).map_err(|err| Error::fetch_failed(page_url, err))?;
    let response = client
        .get(base.clone())
        .send()
        .await
        .map_err(|err| Error::fetch_failed(page_url, err))?;
    let status = response.status();
    if !status.is_success() {
        return Err(Error::fetch_failed(page_url, format!("status {}", status)));
    }
    let html = response
        .text()
        .await
        .map_err(|err| Error::fetch_failed(page_url, err))?;
    let urls = extract_image_urls(&html, &base);
    debug!("fetch: {} image(s) on {}", urls.len(), page_url);
    Ok(urls)
}

pub fn extract_image_urls(html: &str, base: &Url) -> Vec<String> {
    use kuchiki::traits::*;

    let document = kuchiki::parse_html().one(html);
    let Ok(images) = document.select("img") else {
        return Vec::new();
    };

    let mut seen = HashSet::new();
    let mut urls = Vec::new();
    for image in images {
        let attrs = image.attributes.borrow();
        let Some(src) = attrs.get("src").map(str::trim).filter(|src| !src.is_empty()) else {
            continue;
        };
        let Ok(resolved) = base.join(src) else {
            continue;
        };
        if !matches!(resolved.scheme(), "http" | "https") {
            continue;
        }
        let resolved = resolved.to_string();
        if seen.insert(resolved.clone()) {
            urls.push(resolved);
        }
    }
    urls
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_MAGIC: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";

    fn base() -> Url {
        Url::parse("https://comics.example.com/series/12/chapter-3").unwrap()
    }

    #[test]
    fn relative_urls_resolve_against_the_page() {
        let html = r#"<html><body>
            <img src="/cdn/001.jpg">
            <img src="002.jpg" alt="p2">
            <img src="//img.example.net/003.webp">
            <img src="https://other.example.org/004.png">
        </body></html>"#;
        assert_eq!(
            extract_image_urls(html, &base()),
            vec![
                "https://comics.example.com/cdn/001.jpg",
                "https://comics.example.com/series/12/002.jpg",
                "https://img.example.net/003.webp",
                "https://other.example.org/004.png",
            ]
        );
    }

    #[test]
    fn duplicates_and_non_http_sources_are_dropped() {
        let html = r#"
            <img src="a.jpg"><img src="data:image/png;base64,AAAA">
            <img src=" a.jpg "><img><img src="">
            <img src="javascript:void(0)"><img src="b.jpg"><img src="/series/12/a.jpg">
        "#;
        assert_eq!(
            extract_image_urls(html, &base()),
            vec![
                "https://comics.example.com/series/12/a.jpg",
                "https://comics.example.com/series/12/b.jpg",
            ]
        );
    }

    #[test]
    fn content_type_prefers_header_then_sniff_then_jpeg() {
        assert_eq!(resolve_content_type(Some("image/webp"), PNG_MAGIC), "image/webp");
        assert_eq!(resolve_content_type(Some("  "), PNG_MAGIC), "image/png");
        assert_eq!(resolve_content_type(None, b"plain bytes"), FALLBACK_MIME);
    }
}
