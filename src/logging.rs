use anyhow::Result;
use tracing_subscriber::{fmt, EnvFilter};

pub fn init(verbose: bool) -> Result<()> {
    let from_env = std::env::var("RUST_LOG").is_ok();
    if !verbose && !from_env {
        return Ok(());
    }
    let filter = if from_env {
        EnvFilter::from_default_env()
    } else {
        EnvFilter::new("chapter_image_translator=debug,info")
    };
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_level(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .try_init();
    Ok(())
}
