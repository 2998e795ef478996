use anyhow::Context;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use tera::{Context as TeraContext, Tera};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::overlay::TextRegion;
use crate::providers::{MalformedResponse, Provider, ToolSpec};

pub const TOOL_NAME: &str = "deliver_translations";

const SYSTEM_PROMPT: &str = include_str!("prompts/system_prompt.tera");

/// One line of a translation batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchEntry {
    pub index: usize,
    pub text: String,
}

impl BatchEntry {
    pub fn new(index: usize, text: impl Into<String>) -> Self {
        Self {
            index,
            text: text.into(),
        }
    }
}

pub fn tool_spec(tool_name: &str) -> ToolSpec {
    let parameters = json!({
        "type": "object",
        "properties": {
            "translations": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "index": {"type": "integer", "minimum": 0},
                        "text": {"type": "string"}
                    },
                    "required": ["index", "text"]
                }
            }
        },
        "required": ["translations"]
    });

    ToolSpec {
        name: tool_name.to_string(),
        description: "Return the English translation of every indexed text region.".to_string(),
        parameters,
    }
}

pub fn render_system_prompt(source_lang: &str, tool_name: &str) -> anyhow::Result<String> {
    let mut context = TeraContext::new();
    context.insert("source_lang", source_lang.trim());
    context.insert("tool_name", tool_name);
    let rendered = Tera::one_off(SYSTEM_PROMPT, &context, false)
        .with_context(|| "failed to render system prompt")?;
    Ok(rendered.trim().to_string())
}

/// `[index] text`, one entry per line. Line breaks inside an entry are folded
/// so every line stays a single entry.
pub fn format_batch(entries: &[BatchEntry]) -> String {
    entries
        .iter()
        .map(|entry| {
            let text = entry.text.split_whitespace().collect::<Vec<_>>().join(" ");
            format!("[{}] {}", entry.index, text)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn batch_entries(regions: &[TextRegion]) -> Vec<BatchEntry> {
    regions
        .iter()
        .enumerate()
        .map(|(index, region)| BatchEntry::new(index, region.original_text.clone()))
        .collect()
}

/// Maps the tool arguments onto the requested indices. Indices that were not
/// requested are ignored; the last duplicate wins.
pub fn parse_tool_args(value: Value, entries: &[BatchEntry]) -> Result<HashMap<usize, String>> {
    #[derive(Deserialize)]
    struct ToolArgs {
        translations: Vec<BatchEntry>,
    }

    let args: ToolArgs = serde_json::from_value(value)
        .map_err(|err| Error::TranslationParseError(err.to_string()))?;
    let requested = entries
        .iter()
        .map(|entry| entry.index)
        .collect::<HashSet<_>>();

    let mut map = HashMap::new();
    for item in args.translations {
        if !requested.contains(&item.index) {
            debug!("translation: ignoring unknown index {}", item.index);
            continue;
        }
        map.insert(item.index, item.text);
    }
    Ok(map)
}

/// Fills every region's translation: mapped text when present and not blank,
/// the original text otherwise.
pub fn apply_translations(regions: &mut [TextRegion], translations: &HashMap<usize, String>) {
    for (index, region) in regions.iter_mut().enumerate() {
        let translated = translations
            .get(&index)
            .filter(|text| !text.trim().is_empty())
            .cloned()
            .unwrap_or_else(|| region.original_text.clone());
        region.translated_text = Some(translated);
    }
}

pub fn backfill_originals(regions: &mut [TextRegion]) {
    apply_translations(regions, &HashMap::new());
}

/// Same backfill rule as [`apply_translations`], for bare batch entries.
pub fn backfill_entries(
    entries: &[BatchEntry],
    translations: &HashMap<usize, String>,
) -> Vec<BatchEntry> {
    entries
        .iter()
        .map(|entry| {
            let text = translations
                .get(&entry.index)
                .filter(|text| !text.trim().is_empty())
                .cloned()
                .unwrap_or_else(|| entry.text.clone());
            BatchEntry::new(entry.index, text)
        })
        .collect()
}

fn provider_error(err: anyhow::Error) -> Error {
    if err.downcast_ref::<MalformedResponse>().is_some() {
        Error::TranslationParseError(format!("{:#}", err))
    } else {
        Error::TranslationFailed(format!("{:#}", err))
    }
}

#[derive(Debug, Clone)]
pub struct Translator<P: Provider> {
    provider: P,
    source_lang: String,
}

impl<P: Provider> Translator<P> {
    pub fn new(provider: P, source_lang: impl Into<String>) -> Self {
        Self {
            provider,
            source_lang: source_lang.into(),
        }
    }

    pub fn source_lang(&self) -> &str {
        &self.source_lang
    }

    pub fn with_source_lang(&self, source_lang: impl Into<String>) -> Self {
        Self {
            provider: self.provider.clone(),
            source_lang: source_lang.into(),
        }
    }

    /// One tool call for the whole batch.
    pub async fn translate_batch(&self, entries: &[BatchEntry]) -> Result<HashMap<usize, String>> {
        if entries.is_empty() {
            return Ok(HashMap::new());
        }
        let system_prompt = render_system_prompt(&self.source_lang, TOOL_NAME)
            .map_err(|err| Error::TranslationFailed(format!("{:#}", err)))?;
        let response = self
            .provider
            .clone()
            .append_system_input(system_prompt)
            .append_user_input(format_batch(entries))
            .register_tool(tool_spec(TOOL_NAME))
            .call_tool(TOOL_NAME)
            .await
            .map_err(provider_error)?;
        if let Some(usage) = &response.usage {
            debug!(
                "translation: model={} prompt_tokens={:?} completion_tokens={:?}",
                response.model.as_deref().unwrap_or("-"),
                usage.prompt_tokens,
                usage.completion_tokens
            );
        }
        parse_tool_args(response.args, entries)
    }

    /// Translates `regions` in place. Any failure leaves the original text as
    /// the displayed string.
    pub async fn translate_regions(&self, regions: &mut [TextRegion]) {
        let entries = batch_entries(regions);
        match self.translate_batch(&entries).await {
            Ok(map) => apply_translations(regions, &map),
            Err(err) => {
                warn!("translation failed, keeping original text: {}", err);
                backfill_originals(regions);
            }
        }
    }
}
