use anyhow::{anyhow, Result};
use serde::Serialize;
use std::future::Future;
use std::pin::Pin;

mod openai;

pub use openai::OpenAI;

#[derive(Debug, Clone)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProviderUsage {
    pub prompt_tokens: Option<u64>,
    pub completion_tokens: Option<u64>,
    pub total_tokens: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProviderResponse {
    pub args: serde_json::Value,
    pub model: Option<String>,
    pub usage: Option<ProviderUsage>,
}

/// The provider answered, but not with a readable tool call.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct MalformedResponse(pub String);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageRole {
    System,
    User,
}

#[derive(Debug, Clone)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

impl Message {
    pub fn system(content: String) -> Self {
        Self {
            role: MessageRole::System,
            content,
        }
    }

    pub fn user(content: String) -> Self {
        Self {
            role: MessageRole::User,
            content,
        }
    }
}

pub type ProviderFuture = Pin<Box<dyn Future<Output = Result<ProviderResponse>> + Send>>;

/// A language model that can be forced to answer through one registered tool.
///
/// Builders consume and return the provider so a configured base can be cloned
/// per request.
pub trait Provider: Clone + Send + Sync {
    fn append_system_input(self, input: String) -> Self;
    fn append_user_input(self, input: String) -> Self;
    fn register_tool(self, tool: ToolSpec) -> Self;
    fn call_tool(self, tool_name: &str) -> ProviderFuture;
}

/// Builds the OpenAI provider, taking the key from `override_key` or
/// `OPENAI_API_KEY`.
pub fn build_provider(override_key: Option<&str>, model: Option<&str>) -> Result<OpenAI> {
    let key = resolve_key(override_key)?;
    let provider = OpenAI::new(key);
    Ok(match model {
        Some(model) => provider.with_model(model),
        None => provider,
    })
}

pub fn resolve_key(override_key: Option<&str>) -> Result<String> {
    if let Some(key) = override_key.filter(|value| !value.trim().is_empty()) {
        return Ok(key.to_string());
    }
    get_env("OPENAI_API_KEY")
        .ok_or_else(|| anyhow!("API key not found (pass --key or set OPENAI_API_KEY)"))
}

fn get_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
}
