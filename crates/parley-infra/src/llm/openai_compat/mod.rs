//! OpenAI-compatible LLM provider implementation.
//!
//! A single [`OpenAiCompatibleProvider`] serves Azure OpenAI, Google Gemini,
//! Groq and self-hosted servers from one codebase via per-family endpoint
//! configs (see [`config`]).

pub mod config;
pub mod types;

use secrecy::ExposeSecret;

use parley_core::llm::provider::LlmProvider;
use parley_types::llm::{
    CompletionRequest, CompletionResponse, LlmError, MessageRole, ProviderCapabilities,
    StopReason, ToolCall, Usage,
};

use super::http::{REQUEST_TIMEOUT, build_client, classify_status, classify_transport};
use self::config::{AuthStyle, OpenAiCompatConfig};
use self::types::{
    ChatFunctionCall, ChatFunctionDef, ChatMessage, ChatRequest, ChatResponse, ChatTool,
    ChatToolCall, JsonSchemaFormat, ResponseFormat,
};

/// Unified provider for any OpenAI-compatible chat completions API.
///
/// Does NOT derive Debug: the config holds the API key.
pub struct OpenAiCompatibleProvider {
    client: reqwest::Client,
    config: OpenAiCompatConfig,
}

impl OpenAiCompatibleProvider {
    pub fn new(config: OpenAiCompatConfig) -> Result<Self, LlmError> {
        Ok(Self {
            client: build_client(REQUEST_TIMEOUT)?,
            config,
        })
    }

    /// Replace the HTTP client (shorter timeouts in tests).
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    /// The model this provider sends when the request does not name one.
    pub fn model(&self) -> &str {
        &self.config.model
    }

    /// Convert a generic [`CompletionRequest`] into a [`ChatRequest`].
    fn build_request(&self, request: &CompletionRequest) -> ChatRequest {
        let mut messages = Vec::with_capacity(request.messages.len() + 1);

        if let Some(ref system) = request.system {
            messages.push(ChatMessage {
                role: "system".to_string(),
                content: Some(system.clone()),
                tool_calls: Vec::new(),
                tool_call_id: None,
            });
        }

        for msg in &request.messages {
            let tool_calls: Vec<ChatToolCall> = msg
                .tool_calls
                .iter()
                .map(|call| ChatToolCall {
                    id: call.id.clone(),
                    kind: "function".to_string(),
                    function: ChatFunctionCall {
                        name: call.name.clone(),
                        arguments: call.arguments.clone(),
                    },
                })
                .collect();

            let content = if msg.role == MessageRole::Assistant
                && !tool_calls.is_empty()
                && msg.content.is_empty()
            {
                None
            } else {
                Some(msg.content.clone())
            };

            messages.push(ChatMessage {
                role: msg.role.to_string(),
                content,
                tool_calls,
                tool_call_id: msg.tool_call_id.clone(),
            });
        }

        let tools = request
            .tools
            .iter()
            .map(|tool| ChatTool {
                kind: "function".to_string(),
                function: ChatFunctionDef {
                    name: tool.name.clone(),
                    description: tool.description.clone(),
                    parameters: tool.parameters.clone(),
                },
            })
            .collect();

        let response_format = request
            .response_schema
            .as_ref()
            .filter(|_| self.config.capabilities.structured_output)
            .map(|schema| ResponseFormat {
                kind: "json_schema".to_string(),
                json_schema: JsonSchemaFormat {
                    name: schema.name.clone(),
                    schema: schema.schema.clone(),
                    strict: schema.strict,
                },
            });

        // Use the model from the request if set, otherwise fall back to config default
        let model = if request.model.is_empty() {
            self.config.model.clone()
        } else {
            request.model.clone()
        };

        ChatRequest {
            model,
            messages,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            tools,
            response_format,
        }
    }
}

impl LlmProvider for OpenAiCompatibleProvider {
    fn name(&self) -> &str {
        &self.config.provider_name
    }

    fn capabilities(&self) -> &ProviderCapabilities {
        &self.config.capabilities
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let body = self.build_request(request);

        let mut builder = self
            .client
            .post(&self.config.completions_url)
            .header("content-type", "application/json")
            .json(&body);

        if let Some(ref key) = self.config.api_key {
            builder = match self.config.auth {
                AuthStyle::Bearer => builder.bearer_auth(key.expose_secret()),
                AuthStyle::ApiKeyHeader => builder.header("api-key", key.expose_secret()),
            };
        }

        let response = builder.send().await.map_err(classify_transport)?;

        let status = response.status();
        if !status.is_success() {
            let headers = response.headers().clone();
            let error_body = response.text().await.unwrap_or_default();
            tracing::debug!(
                provider = %self.config.provider_name,
                status = status.as_u16(),
                "backend returned error status"
            );
            return Err(classify_status(status, &headers, error_body));
        }

        let chat: ChatResponse = response.json().await.map_err(|e| {
            if e.is_timeout() {
                LlmError::Timeout
            } else {
                LlmError::Deserialization(format!("failed to parse response: {e}"))
            }
        })?;

        let choice = chat
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::Deserialization("response has no choices".to_string()))?;

        let tool_calls: Vec<ToolCall> = choice
            .message
            .tool_calls
            .into_iter()
            .map(|call| ToolCall {
                id: call.id,
                name: call.function.name,
                arguments: call.function.arguments,
            })
            .collect();

        let stop_reason = match choice.finish_reason.as_deref() {
            Some("length") => StopReason::MaxTokens,
            Some("tool_calls") | Some("function_call") => StopReason::ToolUse,
            _ if !tool_calls.is_empty() => StopReason::ToolUse,
            _ => StopReason::EndTurn,
        };

        let usage = chat
            .usage
            .map(|u| Usage {
                input_tokens: u.prompt_tokens,
                output_tokens: u.completion_tokens,
            })
            .unwrap_or_default();

        Ok(CompletionResponse {
            id: chat.id,
            content: choice.message.content.unwrap_or_default(),
            model: if chat.model.is_empty() {
                body.model
            } else {
                chat.model
            },
            stop_reason,
            usage,
            tool_calls,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_types::llm::{Message, ResponseSchema, ToolDefinition};
    use secrecy::SecretString;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn key() -> SecretString {
        SecretString::from("test-key-not-real".to_string())
    }

    fn request(messages: Vec<Message>) -> CompletionRequest {
        CompletionRequest {
            model: String::new(),
            messages,
            system: Some("Be brief.".to_string()),
            max_tokens: 128,
            temperature: Some(0.2),
            tools: Vec::new(),
            response_schema: None,
        }
    }

    fn ok_body(content: &str) -> serde_json::Value {
        json!({
            "id": "chatcmpl-1",
            "model": "llama-3.3-70b",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": content},
                "finish_reason": "stop"
            }],
            "usage": {"prompt_tokens": 20, "completion_tokens": 5}
        })
    }

    fn groq(server: &MockServer) -> OpenAiCompatibleProvider {
        OpenAiCompatibleProvider::new(config::groq_defaults(
            key(),
            "llama-3.3-70b",
            Some(&format!("{}/openai/v1", server.uri())),
        ))
        .unwrap()
    }

    #[test]
    fn test_build_request_maps_tool_round_trip() {
        let provider = OpenAiCompatibleProvider::new(config::custom(
            None,
            "http://localhost:1",
            "local-model",
            false,
        ))
        .unwrap();

        let mut req = request(vec![
            Message::user("weather?"),
            Message::assistant_tool_calls(vec![ToolCall {
                id: "call_1".into(),
                name: "weather".into(),
                arguments: "{\"city\":\"Oslo\"}".into(),
            }]),
            Message::tool_result("call_1", "weather", "{\"status\":\"OK\"}"),
        ]);
        req.tools = vec![ToolDefinition {
            name: "weather".into(),
            description: Some("Look up weather".into()),
            parameters: json!({"type": "object", "properties": {}}),
        }];
        req.response_schema = Some(ResponseSchema::new("Reply", json!({"type": "object"})));

        let body = serde_json::to_value(provider.build_request(&req)).unwrap();
        assert_eq!(body["model"], "local-model");
        assert_eq!(body["messages"][0]["role"], "system");
        assert!(body["messages"][2]["content"].is_null());
        assert_eq!(body["messages"][2]["tool_calls"][0]["function"]["name"], "weather");
        assert_eq!(body["messages"][3]["role"], "tool");
        assert_eq!(body["messages"][3]["tool_call_id"], "call_1");
        assert_eq!(body["tools"][0]["type"], "function");
        // No structured output capability: schema is not forwarded.
        assert!(body.get("response_format").is_none());
    }

    #[tokio::test]
    async fn test_complete_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/openai/v1/chat/completions"))
            .and(header("authorization", "Bearer test-key-not-real"))
            .and(body_partial_json(json!({"model": "llama-3.3-70b", "max_tokens": 128})))
            .respond_with(ResponseTemplate::new(200).set_body_json(ok_body("Hi there")))
            .expect(1)
            .mount(&server)
            .await;

        let resp = groq(&server)
            .complete(&request(vec![Message::user("Hello")]))
            .await
            .unwrap();

        assert_eq!(resp.content, "Hi there");
        assert_eq!(resp.stop_reason, StopReason::EndTurn);
        assert_eq!(resp.usage.input_tokens, 20);
        assert!(resp.tool_calls.is_empty());
    }

    #[tokio::test]
    async fn test_azure_uses_api_key_header_and_deployment_url() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/openai/deployments/gpt-4o/chat/completions"))
            .and(query_param("api-version", "2024-08-01-preview"))
            .and(header("api-key", "test-key-not-real"))
            .respond_with(ResponseTemplate::new(200).set_body_json(ok_body("{\"ok\":true}")))
            .expect(1)
            .mount(&server)
            .await;

        let provider = OpenAiCompatibleProvider::new(config::azure_defaults(
            key(),
            &server.uri(),
            "gpt-4o",
            "2024-08-01-preview",
        ))
        .unwrap();

        let mut req = request(vec![Message::user("Hello")]);
        req.response_schema = Some(ResponseSchema::new("Reply", json!({"type": "object"})));
        let resp = provider.complete(&req).await.unwrap();
        assert_eq!(resp.content, "{\"ok\":true}");

        let received = server.received_requests().await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&received[0].body).unwrap();
        assert_eq!(body["response_format"]["type"], "json_schema");
        assert_eq!(body["response_format"]["json_schema"]["name"], "Reply");
        assert_eq!(body["response_format"]["json_schema"]["strict"], true);
    }

    #[tokio::test]
    async fn test_complete_returns_tool_calls() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "chatcmpl-2",
                "model": "llama-3.3-70b",
                "choices": [{
                    "message": {
                        "role": "assistant",
                        "content": null,
                        "tool_calls": [{
                            "id": "call_7",
                            "type": "function",
                            "function": {"name": "lookup", "arguments": "{\"q\":\"rust\"}"}
                        }]
                    },
                    "finish_reason": "tool_calls"
                }]
            })))
            .mount(&server)
            .await;

        let resp = groq(&server)
            .complete(&request(vec![Message::user("search")]))
            .await
            .unwrap();

        assert_eq!(resp.stop_reason, StopReason::ToolUse);
        assert_eq!(resp.content, "");
        assert_eq!(resp.tool_calls.len(), 1);
        assert_eq!(resp.tool_calls[0].id, "call_7");
        assert_eq!(resp.tool_calls[0].arguments, "{\"q\":\"rust\"}");
    }

    #[tokio::test]
    async fn test_rate_limit_is_transient() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "2"))
            .mount(&server)
            .await;

        let err = groq(&server)
            .complete(&request(vec![Message::user("Hello")]))
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::RateLimited { retry_after_ms: Some(2000) }));
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_auth_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
            .mount(&server)
            .await;

        let err = groq(&server)
            .complete(&request(vec![Message::user("Hello")]))
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::AuthenticationFailed));
    }

    #[tokio::test]
    async fn test_client_timeout_maps_to_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(ok_body("late"))
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let client = build_client(Duration::from_millis(50)).unwrap();
        let provider = groq(&server).with_client(client);
        let err = provider
            .complete(&request(vec![Message::user("Hello")]))
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::Timeout));
    }

    #[tokio::test]
    async fn test_malformed_body_is_deserialization_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let err = groq(&server)
            .complete(&request(vec![Message::user("Hello")]))
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::Deserialization(_)));
    }
}
