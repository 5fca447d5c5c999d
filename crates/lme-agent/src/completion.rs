//! Chat-completion protocol with function calling.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use lme_core::http::{post_json, ServiceEndpoint};
use lme_core::{LmeError, LmeResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// One function invocation requested by the model. `arguments` is the raw
/// JSON text as sent; it is not guaranteed to parse.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Message {
    fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: Some(content.into()),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn assistant_calls(tool_calls: Vec<ToolCall>) -> Self {
        Self {
            role: Role::Assistant,
            content: None,
            tool_calls,
            tool_call_id: None,
        }
    }

    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: Some(content.into()),
            tool_calls: Vec::new(),
            tool_call_id: Some(tool_call_id.into()),
        }
    }

    fn to_wire(&self) -> Value {
        let mut v = json!({ "role": self.role, "content": self.content });
        if !self.tool_calls.is_empty() {
            v["tool_calls"] = self
                .tool_calls
                .iter()
                .map(|c| {
                    json!({
                        "id": c.id,
                        "type": "function",
                        "function": { "name": c.name, "arguments": c.arguments },
                    })
                })
                .collect();
        }
        if let Some(id) = &self.tool_call_id {
            v["tool_call_id"] = Value::String(id.clone());
        }
        v
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Usage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

pub struct CompletionRequest<'a> {
    pub model: &'a str,
    pub messages: &'a [Message],
    /// Function schemas. Empty disables tool calling.
    pub tools: &'a [Value],
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl CompletionRequest<'_> {
    pub fn to_body(&self) -> Value {
        let mut body = json!({
            "model": self.model,
            "messages": self.messages.iter().map(Message::to_wire).collect::<Vec<_>>(),
        });
        if !self.tools.is_empty() {
            body["tools"] = Value::Array(self.tools.to_vec());
            body["tool_choice"] = json!("auto");
        }
        if let Some(t) = self.temperature {
            body["temperature"] = json!(t);
        }
        if let Some(m) = self.max_tokens {
            body["max_tokens"] = json!(m);
        }
        body
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub message: Message,
    pub usage: Usage,
}

/// A chat-completion service.
pub trait CompletionClient: Send + Sync {
    fn complete(&self, request: &CompletionRequest<'_>) -> LmeResult<Completion>;
}

/// Client for an OpenAI-compatible `/chat/completions` endpoint.
pub struct OpenAiClient {
    endpoint: ServiceEndpoint,
    agent: ureq::Agent,
}

impl OpenAiClient {
    pub fn new(endpoint: ServiceEndpoint) -> Self {
        let agent = endpoint.agent();
        Self { endpoint, agent }
    }
}

impl CompletionClient for OpenAiClient {
    fn complete(&self, request: &CompletionRequest<'_>) -> LmeResult<Completion> {
        let url = self.endpoint.url("chat/completions");
        debug!(
            "completion: model={} messages={} tools={}",
            request.model,
            request.messages.len(),
            request.tools.len()
        );
        let resp = post_json(&self.agent, &self.endpoint, &url, &request.to_body())
            .map_err(LmeError::Completion)?;
        parse_completion(&resp)
    }
}

pub fn parse_completion(json: &Value) -> LmeResult<Completion> {
    let msg = json
        .pointer("/choices/0/message")
        .ok_or_else(|| LmeError::Completion("response has no choices[0].message".into()))?;

    let content = msg
        .get("content")
        .and_then(Value::as_str)
        .map(String::from);

    let mut tool_calls = Vec::new();
    if let Some(calls) = msg.get("tool_calls").and_then(Value::as_array) {
        for call in calls {
            let id = call
                .get("id")
                .and_then(Value::as_str)
                .ok_or_else(|| LmeError::Completion("tool call without id".into()))?;
            let name = call
                .pointer("/function/name")
                .and_then(Value::as_str)
                .ok_or_else(|| LmeError::Completion("tool call without function name".into()))?;
            let arguments = match call.pointer("/function/arguments") {
                Some(Value::String(s)) => s.clone(),
                Some(Value::Null) | None => String::new(),
                Some(other) => other.to_string(),
            };
            tool_calls.push(ToolCall {
                id: id.to_string(),
                name: name.to_string(),
                arguments,
            });
        }
    }

    let usage = json
        .get("usage")
        .map(|u| serde_json::from_value::<Usage>(u.clone()))
        .transpose()?
        .unwrap_or_default();

    Ok(Completion {
        message: Message {
            role: Role::Assistant,
            content,
            tool_calls,
            tool_call_id: None,
        },
        usage,
    })
}
