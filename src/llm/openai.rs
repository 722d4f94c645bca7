// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! OpenAI-compatible streaming chat provider
//!
//! Consumes a `chat/completions` SSE wire. Reasoning-capable models emit a
//! second `reasoning_content` delta channel alongside the answer text; both
//! are surfaced as independent event streams in arrival order.

use async_trait::async_trait;
use futures::StreamExt;
use futures_util::stream;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, BanterError, Result};
use crate::llm::message::{Role, TokenUsage};
use crate::llm::provider::{ChatProvider, CompletionRequest, EventStream, StreamEvent};
use crate::llm::sse::{SseFrame, SseParser};

/// Provider for OpenAI-compatible chat completion endpoints
pub struct OpenAiProvider {
    client: Client,
    base_url: String,
    api_key: String,
}

impl OpenAiProvider {
    /// Create a new provider for the given endpoint
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }

    /// Convert internal messages to the wire format.
    ///
    /// The system prompt travels as the first message; `system` turns inside
    /// the history are skipped (the session keeps the prompt in settings,
    /// not in the list).
    fn convert_messages(request: &CompletionRequest) -> Vec<WireMessage> {
        let mut result = Vec::with_capacity(request.messages.len() + 1);

        if let Some(ref system) = request.system {
            result.push(WireMessage {
                role: "system".to_string(),
                content: system.clone(),
            });
        }

        for m in &request.messages {
            let role = match m.role {
                Role::User => "user",
                Role::Assistant => "assistant",
                Role::System => continue,
            };
            result.push(WireMessage {
                role: role.to_string(),
                content: m.content.clone(),
            });
        }

        result
    }

    fn build_request(request: &CompletionRequest) -> WireRequest {
        WireRequest {
            model: request.model.clone(),
            messages: Self::convert_messages(request),
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            stream: true,
            stream_options: WireStreamOptions {
                include_usage: true,
            },
        }
    }

    /// Parse a non-success status into the error taxonomy.
    fn parse_error(status: u16, body: &str) -> BanterError {
        let message = serde_json::from_str::<WireError>(body)
            .map(|e| e.error.message)
            .unwrap_or_else(|_| body.to_string());

        match status {
            401 | 403 => BanterError::Api(ApiError::AuthenticationFailed),
            429 => BanterError::Api(ApiError::RateLimited(60)),
            _ => BanterError::Api(ApiError::ServerError { status, message }),
        }
    }

    /// Decode one data frame into events. Malformed frames are skipped so a
    /// single bad increment cannot discard an otherwise usable answer.
    fn decode_frame(data: &str, started: &mut bool) -> Vec<StreamEvent> {
        let chunk: WireChunk = match serde_json::from_str(data) {
            Ok(chunk) => chunk,
            Err(e) => {
                tracing::debug!(
                    target: "banter.llm.openai",
                    error = %e,
                    "skipping malformed stream frame"
                );
                return Vec::new();
            }
        };

        let mut events = Vec::new();

        if !*started {
            *started = true;
            events.push(StreamEvent::Start {
                model: chunk.model.clone().unwrap_or_default(),
            });
        }

        if let Some(choice) = chunk.choices.into_iter().next() {
            if let Some(reasoning) = choice.delta.reasoning_content {
                if !reasoning.is_empty() {
                    events.push(StreamEvent::ReasoningDelta(reasoning));
                }
            }
            if let Some(content) = choice.delta.content {
                if !content.is_empty() {
                    events.push(StreamEvent::ContentDelta(content));
                }
            }
        }

        if let Some(usage) = chunk.usage {
            events.push(StreamEvent::Usage(TokenUsage {
                prompt_tokens: usage.prompt_tokens,
                completion_tokens: usage.completion_tokens,
                total_tokens: usage.total_tokens,
            }));
        }

        events
    }
}

#[async_trait]
impl ChatProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai-compatible"
    }

    async fn stream_chat(&self, request: CompletionRequest) -> Result<EventStream> {
        let body = Self::build_request(&request);

        tracing::debug!(
            target: "banter.llm.openai",
            model = %body.model,
            messages = body.messages.len(),
            "opening completion stream"
        );

        let response = self
            .client
            .post(&self.base_url)
            .header("Authorization", format!("Bearer {}", &self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Self::parse_error(status, &body));
        }

        let byte_stream = response.bytes_stream();

        let event_stream = byte_stream
            .map(|result| result.map_err(|e| BanterError::Api(ApiError::StreamError(e.to_string()))))
            .scan(
                (SseParser::new(), false),
                |(parser, started), result| {
                    let chunk = match result {
                        Ok(bytes) => String::from_utf8_lossy(&bytes).to_string(),
                        Err(e) => return futures::future::ready(Some(vec![Err(e)])),
                    };

                    let mut events = Vec::new();
                    for frame in parser.push(&chunk) {
                        match frame {
                            SseFrame::Data(data) => {
                                events.extend(
                                    Self::decode_frame(&data, started).into_iter().map(Ok),
                                );
                            }
                            SseFrame::Done => events.push(Ok(StreamEvent::Done)),
                        }
                    }

                    futures::future::ready(Some(events))
                },
            )
            .flat_map(stream::iter);

        Ok(Box::pin(event_stream))
    }
}

// ==================== Wire types ====================

#[derive(Debug, Serialize)]
struct WireRequest {
    model: String,
    messages: Vec<WireMessage>,
    temperature: f32,
    max_tokens: u32,
    stream: bool,
    stream_options: WireStreamOptions,
}

#[derive(Debug, Serialize)]
struct WireStreamOptions {
    include_usage: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct WireChunk {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    choices: Vec<WireChoice>,
    #[serde(default)]
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct WireChoice {
    #[serde(default)]
    delta: WireDelta,
}

#[derive(Debug, Default, Deserialize)]
struct WireDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    reasoning_content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
    #[serde(default)]
    total_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct WireError {
    error: WireErrorBody,
}

#[derive(Debug, Deserialize)]
struct WireErrorBody {
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::message::ChatMessage;

    #[test]
    fn test_convert_messages_adds_system_first() {
        let request = CompletionRequest::new(
            "chat-1",
            vec![
                ChatMessage::user("Hello"),
                ChatMessage::assistant("Hi"),
            ],
        )
        .with_system("Be helpful");

        let wire = OpenAiProvider::convert_messages(&request);
        assert_eq!(wire.len(), 3);
        assert_eq!(wire[0].role, "system");
        assert_eq!(wire[0].content, "Be helpful");
        assert_eq!(wire[1].role, "user");
        assert_eq!(wire[2].role, "assistant");
    }

    #[test]
    fn test_convert_messages_skips_system_turns_in_history() {
        let request = CompletionRequest::new(
            "chat-1",
            vec![ChatMessage::system("stale"), ChatMessage::user("Hello")],
        );

        let wire = OpenAiProvider::convert_messages(&request);
        assert_eq!(wire.len(), 1);
        assert_eq!(wire[0].role, "user");
    }

    #[test]
    fn test_build_request_sets_stream() {
        let request = CompletionRequest::new("chat-1", vec![ChatMessage::user("Hi")])
            .with_temperature(0.2)
            .with_max_tokens(128);
        let wire = OpenAiProvider::build_request(&request);
        assert!(wire.stream);
        assert!(wire.stream_options.include_usage);
        assert_eq!(wire.max_tokens, 128);
        assert!((wire.temperature - 0.2).abs() < f32::EPSILON);
    }

    #[test]
    fn test_decode_frame_content_delta() {
        let mut started = true;
        let events = OpenAiProvider::decode_frame(
            r#"{"choices":[{"delta":{"content":"Hello"}}]}"#,
            &mut started,
        );
        assert_eq!(events, vec![StreamEvent::ContentDelta("Hello".to_string())]);
    }

    #[test]
    fn test_decode_frame_reasoning_delta() {
        let mut started = true;
        let events = OpenAiProvider::decode_frame(
            r#"{"choices":[{"delta":{"reasoning_content":"hmm"}}]}"#,
            &mut started,
        );
        assert_eq!(
            events,
            vec![StreamEvent::ReasoningDelta("hmm".to_string())]
        );
    }

    #[test]
    fn test_decode_frame_both_channels() {
        let mut started = true;
        let events = OpenAiProvider::decode_frame(
            r#"{"choices":[{"delta":{"content":"a","reasoning_content":"b"}}]}"#,
            &mut started,
        );
        assert_eq!(
            events,
            vec![
                StreamEvent::ReasoningDelta("b".to_string()),
                StreamEvent::ContentDelta("a".to_string()),
            ]
        );
    }

    #[test]
    fn test_decode_frame_emits_start_once() {
        let mut started = false;
        let events = OpenAiProvider::decode_frame(
            r#"{"model":"reasoner-1","choices":[{"delta":{"content":"x"}}]}"#,
            &mut started,
        );
        assert_eq!(
            events[0],
            StreamEvent::Start {
                model: "reasoner-1".to_string()
            }
        );
        assert!(started);

        let again = OpenAiProvider::decode_frame(
            r#"{"choices":[{"delta":{"content":"y"}}]}"#,
            &mut started,
        );
        assert_eq!(again, vec![StreamEvent::ContentDelta("y".to_string())]);
    }

    #[test]
    fn test_decode_frame_empty_delta_is_heartbeat() {
        let mut started = true;
        let events =
            OpenAiProvider::decode_frame(r#"{"choices":[{"delta":{}}]}"#, &mut started);
        assert!(events.is_empty());
    }

    #[test]
    fn test_decode_frame_malformed_skipped() {
        let mut started = true;
        let events = OpenAiProvider::decode_frame("{not json", &mut started);
        assert!(events.is_empty());
    }

    #[test]
    fn test_decode_frame_usage() {
        let mut started = true;
        let events = OpenAiProvider::decode_frame(
            r#"{"choices":[],"usage":{"prompt_tokens":5,"completion_tokens":7,"total_tokens":12}}"#,
            &mut started,
        );
        assert_eq!(
            events,
            vec![StreamEvent::Usage(TokenUsage {
                prompt_tokens: 5,
                completion_tokens: 7,
                total_tokens: 12,
            })]
        );
    }

    #[test]
    fn test_parse_error_authentication() {
        let err = OpenAiProvider::parse_error(401, r#"{"error":{"message":"bad key"}}"#);
        assert!(matches!(
            err,
            BanterError::Api(ApiError::AuthenticationFailed)
        ));
    }

    #[test]
    fn test_parse_error_rate_limited() {
        let err = OpenAiProvider::parse_error(429, "{}");
        assert!(matches!(err, BanterError::Api(ApiError::RateLimited(_))));
    }

    #[test]
    fn test_parse_error_server() {
        let err = OpenAiProvider::parse_error(500, r#"{"error":{"message":"boom"}}"#);
        match err {
            BanterError::Api(ApiError::ServerError { status, message }) => {
                assert_eq!(status, 500);
                assert_eq!(message, "boom");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_parse_error_unparseable_body() {
        let err = OpenAiProvider::parse_error(502, "bad gateway");
        match err {
            BanterError::Api(ApiError::ServerError { status, message }) => {
                assert_eq!(status, 502);
                assert_eq!(message, "bad gateway");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
