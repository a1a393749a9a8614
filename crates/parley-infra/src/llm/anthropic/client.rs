//! AnthropicProvider -- concrete [`LlmProvider`] implementation for Anthropic Claude.
//!
//! Sends requests to the Anthropic Messages API (`/v1/messages`) with
//! proper authentication headers.
//!
//! The API key is wrapped in [`secrecy::SecretString`] and is never logged
//! or included in `Debug` output.

use secrecy::{ExposeSecret, SecretString};

use parley_core::llm::provider::LlmProvider;
use parley_types::llm::{
    CompletionRequest, CompletionResponse, LlmError, MessageRole, ProviderCapabilities,
    StopReason, ToolCall, Usage,
};

use super::types::{
    AnthropicContent, AnthropicContentBlock, AnthropicMessage, AnthropicRequest,
    AnthropicRequestBlock, AnthropicResponse, AnthropicTool, OutputConfig, OutputFormat,
};
use crate::llm::http::{REQUEST_TIMEOUT, build_client, classify_status, classify_transport};

/// Anthropic Claude LLM provider.
///
/// The API key is only exposed when constructing HTTP request headers.
pub struct AnthropicProvider {
    client: reqwest::Client,
    api_key: SecretString,
    base_url: String,
    model: String,
    capabilities: ProviderCapabilities,
}

impl AnthropicProvider {
    /// The Anthropic API version header value.
    const API_VERSION: &'static str = "2023-06-01";

    pub const DEFAULT_BASE_URL: &'static str = "https://api.anthropic.com";

    pub fn new(api_key: SecretString, model: String) -> Result<Self, LlmError> {
        Ok(Self {
            client: build_client(REQUEST_TIMEOUT)?,
            api_key,
            base_url: Self::DEFAULT_BASE_URL.to_string(),
            model,
            capabilities: ProviderCapabilities {
                tool_calling: true,
                structured_output: true,
            },
        })
    }

    /// The default model for this provider.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Override the base URL (useful for testing or proxies).
    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    /// Build the full API URL for a given path.
    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Convert a generic [`CompletionRequest`] into an [`AnthropicRequest`].
    ///
    /// System messages in the transcript are folded into the top-level
    /// `system` field. Consecutive tool results share one user turn.
    fn to_anthropic_request(&self, request: &CompletionRequest) -> Result<AnthropicRequest, LlmError> {
        let mut system_parts: Vec<String> = request.system.iter().cloned().collect();
        let mut messages: Vec<AnthropicMessage> = Vec::new();

        for msg in &request.messages {
            match msg.role {
                MessageRole::System => system_parts.push(msg.content.clone()),
                MessageRole::User => messages.push(AnthropicMessage {
                    role: "user".to_string(),
                    content: AnthropicContent::Text(msg.content.clone()),
                }),
                MessageRole::Assistant if msg.tool_calls.is_empty() => {
                    messages.push(AnthropicMessage {
                        role: "assistant".to_string(),
                        content: AnthropicContent::Text(msg.content.clone()),
                    })
                }
                MessageRole::Assistant => {
                    let mut blocks = Vec::with_capacity(msg.tool_calls.len() + 1);
                    if !msg.content.is_empty() {
                        blocks.push(AnthropicRequestBlock::Text {
                            text: msg.content.clone(),
                        });
                    }
                    for call in &msg.tool_calls {
                        let input = serde_json::from_str(&call.arguments).map_err(|e| {
                            LlmError::InvalidRequest(format!(
                                "tool call '{}' has non-JSON arguments: {e}",
                                call.id
                            ))
                        })?;
                        blocks.push(AnthropicRequestBlock::ToolUse {
                            id: call.id.clone(),
                            name: call.name.clone(),
                            input,
                        });
                    }
                    messages.push(AnthropicMessage {
                        role: "assistant".to_string(),
                        content: AnthropicContent::Blocks(blocks),
                    });
                }
                MessageRole::Tool => {
                    let block = AnthropicRequestBlock::ToolResult {
                        tool_use_id: msg.tool_call_id.clone().unwrap_or_default(),
                        content: msg.content.clone(),
                    };
                    match messages.last_mut() {
                        Some(AnthropicMessage {
                            role,
                            content: AnthropicContent::Blocks(blocks),
                        }) if role == "user" => blocks.push(block),
                        _ => messages.push(AnthropicMessage {
                            role: "user".to_string(),
                            content: AnthropicContent::Blocks(vec![block]),
                        }),
                    }
                }
            }
        }

        let tools = request
            .tools
            .iter()
            .map(|tool| AnthropicTool {
                name: tool.name.clone(),
                description: tool.description.clone(),
                input_schema: tool.parameters.clone(),
            })
            .collect();

        let output_config = request.response_schema.as_ref().map(|schema| OutputConfig {
            format: OutputFormat {
                type_field: "json_schema".to_string(),
                schema: schema.schema.clone(),
            },
        });

        Ok(AnthropicRequest {
            model: if request.model.is_empty() {
                self.model.clone()
            } else {
                request.model.clone()
            },
            max_tokens: request.max_tokens,
            messages,
            system: if system_parts.is_empty() {
                None
            } else {
                Some(system_parts.join("\n\n"))
            },
            temperature: request.temperature,
            tools,
            output_config,
        })
    }
}

impl LlmProvider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    fn capabilities(&self) -> &ProviderCapabilities {
        &self.capabilities
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let body = self.to_anthropic_request(request)?;
        let url = self.url("/v1/messages");

        let response = self
            .client
            .post(&url)
            .header("x-api-key", self.api_key.expose_secret())
            .header("anthropic-version", Self::API_VERSION)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(classify_transport)?;

        let status = response.status();
        if !status.is_success() {
            let headers = response.headers().clone();
            let error_body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &headers, error_body));
        }

        let anthropic_resp: AnthropicResponse = response.json().await.map_err(|e| {
            if e.is_timeout() {
                LlmError::Timeout
            } else {
                LlmError::Deserialization(format!("failed to parse response: {e}"))
            }
        })?;

        let mut content = String::new();
        let mut tool_calls = Vec::new();
        for block in anthropic_resp.content {
            match block {
                AnthropicContentBlock::Text { text } => content.push_str(&text),
                AnthropicContentBlock::ToolUse { id, name, input } => tool_calls.push(ToolCall {
                    id,
                    name,
                    arguments: input.to_string(),
                }),
                AnthropicContentBlock::Other => {}
            }
        }

        let stop_reason = match anthropic_resp.stop_reason.as_deref() {
            Some("tool_use") => StopReason::ToolUse,
            Some("max_tokens") => StopReason::MaxTokens,
            Some("stop_sequence") => StopReason::StopSequence,
            _ => StopReason::EndTurn,
        };

        Ok(CompletionResponse {
            id: anthropic_resp.id,
            content,
            model: anthropic_resp.model,
            stop_reason,
            usage: Usage {
                input_tokens: anthropic_resp.usage.input_tokens,
                output_tokens: anthropic_resp.usage.output_tokens,
            },
            tool_calls,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_types::llm::{Message, ResponseSchema, ToolDefinition};
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn make_provider() -> AnthropicProvider {
        AnthropicProvider::new(
            SecretString::from("test-key-not-real".to_string()),
            "claude-sonnet-4-20250514".to_string(),
        )
        .unwrap()
    }

    fn request(messages: Vec<Message>) -> CompletionRequest {
        CompletionRequest {
            model: String::new(),
            messages,
            system: Some("Be helpful".to_string()),
            max_tokens: 1024,
            temperature: Some(0.7),
            tools: Vec::new(),
            response_schema: None,
        }
    }

    #[test]
    fn test_provider_name() {
        let provider = make_provider();
        assert_eq!(provider.name(), "anthropic");
        assert!(provider.capabilities().tool_calling);
    }

    #[test]
    fn test_to_anthropic_request() {
        let provider = make_provider();
        let anthropic_req = provider
            .to_anthropic_request(&request(vec![Message::user("Hello")]))
            .unwrap();
        assert_eq!(anthropic_req.model, "claude-sonnet-4-20250514");
        assert_eq!(anthropic_req.messages.len(), 1);
        assert_eq!(anthropic_req.messages[0].role, "user");
        assert_eq!(anthropic_req.system.as_deref(), Some("Be helpful"));
    }

    #[test]
    fn test_system_messages_fold_into_system_field() {
        let provider = make_provider();
        let req = request(vec![Message::system("Extra rule"), Message::user("Hi")]);
        let anthropic_req = provider.to_anthropic_request(&req).unwrap();
        assert_eq!(anthropic_req.system.as_deref(), Some("Be helpful\n\nExtra rule"));
        assert_eq!(anthropic_req.messages.len(), 1);
    }

    #[test]
    fn test_tool_round_trip_blocks() {
        let provider = make_provider();
        let mut req = request(vec![
            Message::user("weather in Oslo?"),
            Message::assistant_tool_calls(vec![ToolCall {
                id: "toolu_1".into(),
                name: "weather".into(),
                arguments: "{\"city\":\"Oslo\"}".into(),
            }]),
            Message::tool_result("toolu_1", "weather", "{\"status\":\"OK\"}"),
        ]);
        req.tools = vec![ToolDefinition {
            name: "weather".into(),
            description: None,
            parameters: json!({"type": "object", "properties": {"city": {"type": "string"}}}),
        }];

        let body = serde_json::to_value(provider.to_anthropic_request(&req).unwrap()).unwrap();
        assert_eq!(body["messages"][1]["content"][0]["type"], "tool_use");
        assert_eq!(body["messages"][1]["content"][0]["input"]["city"], "Oslo");
        assert_eq!(body["messages"][2]["role"], "user");
        assert_eq!(body["messages"][2]["content"][0]["tool_use_id"], "toolu_1");
        assert_eq!(body["tools"][0]["input_schema"]["type"], "object");
    }

    #[test]
    fn test_non_json_tool_arguments_rejected() {
        let provider = make_provider();
        let req = request(vec![Message::assistant_tool_calls(vec![ToolCall {
            id: "toolu_1".into(),
            name: "weather".into(),
            arguments: "city=Oslo".into(),
        }])]);
        assert!(matches!(
            provider.to_anthropic_request(&req),
            Err(LlmError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_base_url_override() {
        let provider = make_provider().with_base_url("http://localhost:8080/".to_string());
        assert_eq!(provider.url("/v1/messages"), "http://localhost:8080/v1/messages");
    }

    #[tokio::test]
    async fn test_complete_against_mock() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .and(header("x-api-key", "test-key-not-real"))
            .and(header("anthropic-version", "2023-06-01"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "msg_1",
                "model": "claude-sonnet-4-20250514",
                "content": [
                    {"type": "text", "text": "Checking. "},
                    {"type": "tool_use", "id": "toolu_9", "name": "lookup", "input": {"q": "x"}}
                ],
                "stop_reason": "tool_use",
                "usage": {"input_tokens": 30, "output_tokens": 8}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let provider = make_provider().with_base_url(server.uri());
        let mut req = request(vec![Message::user("look it up")]);
        req.response_schema = Some(ResponseSchema::new("Reply", json!({"type": "object"})));
        let resp = provider.complete(&req).await.unwrap();

        assert_eq!(resp.content, "Checking. ");
        assert_eq!(resp.stop_reason, StopReason::ToolUse);
        assert_eq!(resp.tool_calls[0].name, "lookup");
        assert_eq!(resp.tool_calls[0].arguments, "{\"q\":\"x\"}");
        assert_eq!(resp.usage.output_tokens, 8);

        let received = server.received_requests().await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&received[0].body).unwrap();
        assert_eq!(body["output_config"]["format"]["type"], "json_schema");
    }

    #[tokio::test]
    async fn test_overloaded_is_transient() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(529).set_body_string("overloaded"))
            .mount(&server)
            .await;

        let provider = make_provider().with_base_url(server.uri());
        let err = provider
            .complete(&request(vec![Message::user("Hi")]))
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::Overloaded(ref body) if body == "overloaded"));
        assert!(err.is_transient());
    }
}
