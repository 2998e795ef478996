use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use super::{
    MalformedResponse, Message, MessageRole, Provider, ProviderFuture, ProviderResponse,
    ProviderUsage, ToolSpec,
};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub(crate) const DEFAULT_MODEL: &str = "gpt-4o-mini";

#[derive(Debug, Clone)]
pub struct OpenAI {
    key: String,
    model: String,
    client: reqwest::Client,
    messages: Vec<Message>,
    tools: Vec<ToolSpec>,
}

impl OpenAI {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            model: DEFAULT_MODEL.to_string(),
            client: reqwest::Client::new(),
            messages: Vec::new(),
            tools: Vec::new(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        let model = model.into();
        if !model.trim().is_empty() {
            self.model = model;
        }
        self
    }

    /// Shares a configured client (timeouts, user agent) with other callers.
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn find_tool(&self, name: &str) -> Result<&ToolSpec> {
        self.tools
            .iter()
            .find(|tool| tool.name == name)
            .ok_or_else(|| anyhow!("tool '{}' not registered", name))
    }
}

impl Provider for OpenAI {
    fn append_system_input(mut self, input: String) -> Self {
        self.messages.push(Message::system(input));
        self
    }

    fn append_user_input(mut self, input: String) -> Self {
        self.messages.push(Message::user(input));
        self
    }

    fn register_tool(mut self, tool: ToolSpec) -> Self {
        self.tools.push(tool);
        self
    }

    fn call_tool(self, tool_name: &str) -> ProviderFuture {
        let tool_name = tool_name.to_string();
        Box::pin(async move {
            let tool = self.find_tool(&tool_name)?.clone();
            call_with_chat_completions(self, tool, &tool_name).await
        })
    }
}

fn base_url() -> String {
    std::env::var("OPENAI_BASE_URL")
        .ok()
        .map(|value| value.trim_end_matches('/').to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
}

fn request_body(provider: &OpenAI, tool: &ToolSpec) -> serde_json::Value {
    let messages = provider
        .messages
        .iter()
        .map(|message| {
            let role = match message.role {
                MessageRole::System => "system",
                MessageRole::User => "user",
            };
            json!({"role": role, "content": message.content})
        })
        .collect::<Vec<_>>();

    json!({
        "model": provider.model,
        "messages": messages,
        "tools": [
            {
                "type": "function",
                "function": {
                    "name": tool.name,
                    "description": tool.description,
                    "parameters": tool.parameters
                }
            }
        ],
        "tool_choice": {"type": "function", "function": {"name": tool.name}}
    })
}

async fn call_with_chat_completions(
    provider: OpenAI,
    tool: ToolSpec,
    tool_name: &str,
) -> Result<ProviderResponse> {
    let url = format!("{}/chat/completions", base_url());
    let body = request_body(&provider, &tool);
    debug!("openai: model={} messages={}", provider.model, provider.messages.len());

    let response = provider
        .client
        .post(&url)
        .bearer_auth(&provider.key)
        .json(&body)
        .send()
        .await
        .with_context(|| format!("failed to reach {}", url))?;

    let status = response.status();
    let text = response.text().await.unwrap_or_default();
    if status.is_success() {
        return extract_tool_response(&text, tool_name, &provider.model);
    }
    Err(anyhow!(
        "OpenAI API error ({}): {}",
        status,
        extract_openai_error(&text).unwrap_or(text)
    ))
}

fn extract_tool_response(
    text: &str,
    tool_name: &str,
    fallback_model: &str,
) -> Result<ProviderResponse> {
    let payload: OpenAIResponse = serde_json::from_str(text).map_err(|err| {
        MalformedResponse(format!("failed to parse OpenAI response JSON: {}", err))
    })?;
    let tool_call = payload
        .choices
        .first()
        .and_then(|choice| choice.message.tool_calls.first())
        .ok_or_else(|| MalformedResponse("no tool call returned from OpenAI".to_string()))?;

    if tool_call.function.name != tool_name {
        return Err(anyhow!(
            "unexpected tool name '{}' from OpenAI",
            tool_call.function.name
        ));
    }

    let args: serde_json::Value =
        serde_json::from_str(&tool_call.function.arguments).map_err(|err| {
            MalformedResponse(format!("failed to parse OpenAI tool arguments: {}", err))
        })?;
    let model = payload
        .model
        .filter(|value| !value.trim().is_empty())
        .or_else(|| Some(fallback_model.to_string()));
    let usage = payload.usage.map(|usage| ProviderUsage {
        prompt_tokens: usage.prompt_tokens,
        completion_tokens: usage.completion_tokens,
        total_tokens: usage.total_tokens,
    });
    Ok(ProviderResponse { args, model, usage })
}

fn extract_openai_error(body: &str) -> Option<String> {
    #[derive(Deserialize)]
    struct ErrorBody {
        error: Option<OpenAIError>,
    }

    #[derive(Deserialize)]
    struct OpenAIError {
        message: Option<String>,
        #[serde(rename = "type")]
        kind: Option<String>,
        code: Option<String>,
    }

    let parsed: ErrorBody = serde_json::from_str(body).ok()?;
    let error = parsed.error?;
    let parts = [
        error.message,
        error.kind.map(|kind| format!("type: {}", kind)),
        error.code.map(|code| format!("code: {}", code)),
    ]
    .into_iter()
    .flatten()
    .filter(|part| !part.trim().is_empty())
    .collect::<Vec<_>>();
    if parts.is_empty() {
        Some("unknown error".to_string())
    } else {
        Some(parts.join(" | "))
    }
}

#[derive(Debug, Deserialize)]
struct OpenAIResponse {
    model: Option<String>,
    choices: Vec<OpenAIChoice>,
    usage: Option<OpenAIUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    message: OpenAIMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAIMessage {
    #[serde(default)]
    tool_calls: Vec<OpenAIToolCall>,
}

#[derive(Debug, Deserialize)]
struct OpenAIToolCall {
    function: OpenAIFunctionCall,
}

#[derive(Debug, Deserialize)]
struct OpenAIFunctionCall {
    name: String,
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct OpenAIUsage {
    prompt_tokens: Option<u64>,
    completion_tokens: Option<u64>,
    total_tokens: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use insta::assert_json_snapshot;

    #[test]
    fn openai_extract_tool_args_snapshot() {
        let payload = include_str!(concat!(
            env!("CARGO_MANIFEST_DIR"),
            "/tests/fixtures/openai_tool_response.json"
        ));
        let response =
            extract_tool_response(payload, "deliver_translations", "gpt-4o-mini").unwrap();
        assert_json_snapshot!(response);
    }

    #[test]
    fn wrong_tool_name_is_rejected() {
        let payload = include_str!(concat!(
            env!("CARGO_MANIFEST_DIR"),
            "/tests/fixtures/openai_tool_response.json"
        ));
        let err = extract_tool_response(payload, "other_tool", "gpt-4o-mini").unwrap_err();
        assert!(err.to_string().contains("deliver_translations"));
    }

    #[test]
    fn unreadable_tool_arguments_are_a_malformed_response() {
        let payload = include_str!(concat!(
            env!("CARGO_MANIFEST_DIR"),
            "/tests/fixtures/openai_malformed_arguments.json"
        ));
        let err =
            extract_tool_response(payload, "deliver_translations", "gpt-4o-mini").unwrap_err();
        assert!(err.downcast_ref::<MalformedResponse>().is_some(), "{:#}", err);
        assert!(err.to_string().contains("tool arguments"));

        let err = extract_tool_response("<html>busy</html>", "deliver_translations", "gpt-4o")
            .unwrap_err();
        assert!(err.downcast_ref::<MalformedResponse>().is_some());

        let err = extract_tool_response(
            r#"{"choices":[{"message":{"content":"sorry"}}]}"#,
            "deliver_translations",
            "gpt-4o-mini",
        )
        .unwrap_err();
        assert!(err.downcast_ref::<MalformedResponse>().is_some());
    }

    #[test]
    fn api_error_body_is_summarized() {
        let body = r#"{"error":{"message":"Incorrect API key provided","type":"invalid_request_error","code":"invalid_api_key"}}"#;
        assert_eq!(
            extract_openai_error(body).as_deref(),
            Some("Incorrect API key provided | type: invalid_request_error | code: invalid_api_key")
        );
        assert_eq!(extract_openai_error("<html>"), None);
    }

    #[test]
    fn request_forces_the_registered_tool() {
        let tool = ToolSpec {
            name: "deliver_translations".to_string(),
            description: "d".to_string(),
            parameters: json!({"type": "object"}),
        };
        let provider = OpenAI::new("k")
            .append_system_input("sys".to_string())
            .append_user_input("[0] 안녕".to_string());
        let body = request_body(&provider, &tool);
        assert_eq!(body["tool_choice"]["function"]["name"], "deliver_translations");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "[0] 안녕");
    }
}
