use anyhow::Result;
use clap::Parser;

use chapter_image_translator::overlay::RenderMode;

#[derive(Parser, Debug)]
#[command(
    name = "chapter-image-translator",
    version,
    about = "Translate text in manga/webtoon pages and draw it back onto the image"
)]
struct Cli {
    /// Image to process (local path or http(s) URL)
    #[arg(short = 'd', long = "data")]
    data: Option<String>,

    /// Chapter page URL; prints its image URLs, or translates them all with --output
    #[arg(short = 'p', long = "page")]
    page: Option<String>,

    /// Output PNG path (single image) or directory (with --page)
    #[arg(short = 'o', long = "output")]
    output: Option<String>,

    /// Render mode: translated or original
    #[arg(long = "mode", default_value = "translated")]
    mode: RenderMode,

    /// Tesseract language set (e.g. kor+jpn+eng)
    #[arg(long = "ocr-languages")]
    ocr_languages: Option<String>,

    /// Drop OCR detections at or below this confidence (0-100)
    #[arg(long = "min-confidence")]
    min_confidence: Option<f32>,

    /// OpenAI model name
    #[arg(short = 'm', long = "model")]
    model: Option<String>,

    /// API key (overrides OPENAI_API_KEY)
    #[arg(short = 'k', long = "key")]
    key: Option<String>,

    /// Read extra settings from a local TOML file
    #[arg(short = 'r', long = "read-settings")]
    read_settings: Option<String>,

    /// Also print the detected and translated regions as JSON
    #[arg(long = "regions-json")]
    regions_json: bool,

    /// Run the HTTP server (address defaults to [server] addr)
    #[arg(long = "server", num_args = 0..=1, default_missing_value = "")]
    server: Option<String>,

    /// Enable verbose logging
    #[arg(long = "verbose")]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    chapter_image_translator::logging::init(cli.verbose)?;

    let output = chapter_image_translator::run(chapter_image_translator::Config {
        data: cli.data,
        page: cli.page,
        output: cli.output,
        mode: cli.mode,
        ocr_languages: cli.ocr_languages,
        min_confidence: cli.min_confidence,
        model: cli.model,
        key: cli.key,
        settings_path: cli.read_settings,
        regions_json: cli.regions_json,
        server: cli.server,
    })
    .await?;

    if !output.is_empty() {
        println!("{}", output);
    }
    Ok(())
}
