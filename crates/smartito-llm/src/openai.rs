//! OpenAI-compatible chat-completions adapter.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use smartito_core::config::{LlmConfig, RoleModelConfig};

use crate::error::LlmError;
use crate::types::{Message, Reply, ToolCall, ToolSpec};
use crate::LlmCapability;

/// HTTP client for one role: fixed model, temperature, and endpoint.
#[derive(Clone)]
pub struct OpenAiCapability {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f32,
}

impl OpenAiCapability {
    pub fn new(
        base_url: &str,
        api_key: String,
        model: &str,
        temperature: f32,
        timeout: Duration,
    ) -> Result<Self, LlmError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model: model.to_string(),
            temperature,
        })
    }

    /// Build the client for one role from the shared LLM settings.
    pub fn from_config(
        llm: &LlmConfig,
        role: &RoleModelConfig,
        api_key: String,
    ) -> Result<Self, LlmError> {
        Self::new(
            &llm.base_url,
            api_key,
            &role.model,
            role.temperature,
            Duration::from_secs(llm.timeout_secs),
        )
    }

    fn request_body(&self, messages: &[Message], tools: &[ToolSpec]) -> Value {
        let mut body = json!({
            "model": &self.model,
            "temperature": self.temperature,
            "messages": messages.iter().map(wire_message).collect::<Vec<_>>(),
        });
        if !tools.is_empty() {
            body["tools"] = Value::Array(
                tools
                    .iter()
                    .map(|t| {
                        json!({
                            "type": "function",
                            "function": {
                                "name": &t.name,
                                "description": &t.description,
                                "parameters": &t.parameters,
                            }
                        })
                    })
                    .collect(),
            );
        }
        body
    }
}

fn wire_message(message: &Message) -> Value {
    match message {
        Message::System { content } => json!({"role": "system", "content": content}),
        Message::User { content } => json!({"role": "user", "content": content}),
        Message::Assistant { content } => json!({"role": "assistant", "content": content}),
        Message::AssistantToolCall { call } => json!({
            "role": "assistant",
            "content": Value::Null,
            "tool_calls": [{
                "id": &call.id,
                "type": "function",
                "function": {
                    "name": &call.name,
                    "arguments": call.arguments.to_string(),
                }
            }]
        }),
        Message::Tool { call_id, content } => json!({
            "role": "tool",
            "tool_call_id": call_id,
            "content": content,
        }),
    }
}

#[derive(Deserialize)]
struct WireFunction {
    name: String,
    // Arguments arrive as a JSON-encoded string.
    arguments: String,
}

#[derive(Deserialize)]
struct WireToolCall {
    id: String,
    function: WireFunction,
}

#[derive(Deserialize)]
struct WireMessage {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<WireToolCall>,
}

#[derive(Deserialize)]
struct WireChoice {
    message: WireMessage,
}

#[derive(Deserialize)]
struct WireResponse {
    choices: Vec<WireChoice>,
}

/// Turn a chat-completions response body into a [`Reply`].
///
/// Only the first choice is read. If the model requested several tools,
/// the first call wins.
fn parse_reply(body: &str) -> Result<Reply, LlmError> {
    let response: WireResponse = serde_json::from_str(body)?;
    let message = response
        .choices
        .into_iter()
        .next()
        .map(|c| c.message)
        .ok_or_else(|| LlmError::MalformedResponse("no choices".into()))?;

    if let Some(call) = message.tool_calls.into_iter().next() {
        let arguments: Value = if call.function.arguments.trim().is_empty() {
            json!({})
        } else {
            serde_json::from_str(&call.function.arguments)?
        };
        return Ok(Reply::ToolCall(ToolCall {
            id: call.id,
            name: call.function.name,
            arguments,
        }));
    }

    message
        .content
        .map(Reply::Message)
        .ok_or_else(|| LlmError::MalformedResponse("neither content nor tool call".into()))
}

#[async_trait]
impl LlmCapability for OpenAiCapability {
    async fn respond(&self, messages: &[Message], tools: &[ToolSpec]) -> Result<Reply, LlmError> {
        let body = self.request_body(messages, tools);
        debug!(model = %self.model, messages = messages.len(), tools = tools.len(), "LLM request");

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(LlmError::Api {
                status: status.as_u16(),
                body: text.chars().take(500).collect(),
            });
        }

        debug!(
            "LLM raw response: {}",
            text.chars().take(1000).collect::<String>()
        );
        parse_reply(&text)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn capability() -> OpenAiCapability {
        OpenAiCapability::new(
            "http://localhost:9999/v1/",
            "test-key".into(),
            "gpt-4o-mini",
            0.1,
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        assert_eq!(capability().base_url, "http://localhost:9999/v1");
    }

    #[test]
    fn test_from_config_uses_role_model() {
        let llm = LlmConfig::default();
        let cap = OpenAiCapability::from_config(&llm, &llm.data, "k".into()).unwrap();
        assert_eq!(cap.model_name(), "gpt-4o-mini");
        assert!((cap.temperature - 0.1).abs() < f32::EPSILON);
    }

    #[test]
    fn test_request_body_includes_tools() {
        let tools = vec![ToolSpec {
            name: "run_sql".into(),
            description: "Run a query".into(),
            parameters: json!({"type": "object"}),
        }];
        let body = capability().request_body(&[Message::system("s"), Message::user("u")], &tools);
        assert_eq!(body["model"], "gpt-4o-mini");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "u");
        assert_eq!(body["tools"][0]["function"]["name"], "run_sql");
    }

    #[test]
    fn test_request_body_without_tools_omits_key() {
        let body = capability().request_body(&[Message::user("u")], &[]);
        assert!(body.get("tools").is_none());
    }

    #[test]
    fn test_tool_call_round_trip_wire_format() {
        let call = ToolCall {
            id: "call_1".into(),
            name: "run_sql".into(),
            arguments: json!({"query": "SELECT 1"}),
        };
        let wire = wire_message(&Message::AssistantToolCall { call });
        assert_eq!(wire["tool_calls"][0]["id"], "call_1");
        assert_eq!(
            wire["tool_calls"][0]["function"]["arguments"],
            "{\"query\":\"SELECT 1\"}"
        );
        let tool = wire_message(&Message::tool_result("call_1", "[]"));
        assert_eq!(tool["role"], "tool");
        assert_eq!(tool["tool_call_id"], "call_1");
    }

    #[test]
    fn test_parse_content_reply() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"Hola"}}]}"#;
        assert_eq!(parse_reply(body).unwrap(), Reply::Message("Hola".into()));
    }

    #[test]
    fn test_parse_tool_call_reply() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":null,
            "tool_calls":[{"id":"call_9","type":"function",
            "function":{"name":"run_sql","arguments":"{\"query\":\"SELECT 1\"}"}}]}}]}"#;
        match parse_reply(body).unwrap() {
            Reply::ToolCall(call) => {
                assert_eq!(call.id, "call_9");
                assert_eq!(call.name, "run_sql");
                assert_eq!(call.str_arg("query"), Some("SELECT 1"));
            }
            other => panic!("expected tool call, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_tool_call_with_empty_arguments() {
        let body = r#"{"choices":[{"message":{"content":null,
            "tool_calls":[{"id":"c","type":"function","function":{"name":"get_schema_info","arguments":""}}]}}]}"#;
        match parse_reply(body).unwrap() {
            Reply::ToolCall(call) => assert_eq!(call.arguments, json!({})),
            other => panic!("expected tool call, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_no_choices_is_malformed() {
        let result = parse_reply(r#"{"choices":[]}"#);
        assert!(matches!(result, Err(LlmError::MalformedResponse(_))));
    }

    #[test]
    fn test_parse_garbage_is_malformed() {
        assert!(matches!(
            parse_reply("<html>"),
            Err(LlmError::MalformedResponse(_))
        ));
    }
}
