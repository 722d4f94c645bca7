// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! End-to-end streaming tests against a synthetic SSE upstream.

use std::sync::Arc;

use futures::StreamExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use banter::chat::controller::{ChatController, NoopChatObserver, SendOptions};
use banter::config::Settings;
use banter::error::{ApiError, BanterError};
use banter::llm::message::ChatMessage;
use banter::llm::openai::OpenAiProvider;
use banter::llm::provider::{ChatProvider, CompletionRequest, StreamEvent};
use banter::session::{MemoryBackend, SessionStore};

async fn mount_sse(server: &MockServer, body: &str) {
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body.to_string(), "text/event-stream"))
        .mount(server)
        .await;
}

fn provider_for(server: &MockServer) -> OpenAiProvider {
    OpenAiProvider::new(format!("{}/chat/completions", server.uri()), "test-key")
}

async fn collect_events(provider: &OpenAiProvider) -> Vec<StreamEvent> {
    let request = CompletionRequest::new("chat-test", vec![ChatMessage::user("hi")]);
    let mut stream = provider.stream_chat(request).await.unwrap();
    let mut events = Vec::new();
    while let Some(event) = stream.next().await {
        events.push(event.unwrap());
    }
    events
}

#[tokio::test]
async fn test_interleaved_channels_preserve_order() {
    let server = MockServer::start().await;
    let body = concat!(
        "data: {\"model\":\"reasoner-test\",\"choices\":[{\"delta\":{\"reasoning_content\":\"x\"}}]}\n\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\"A\"}}]}\n\n",
        "data: {\"choices\":[{\"delta\":{\"reasoning_content\":\"y\"}}]}\n\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\"B\"}}]}\n\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\"C\"}}]}\n\n",
        "data: [DONE]\n\n",
    );
    mount_sse(&server, body).await;

    let events = collect_events(&provider_for(&server)).await;

    let content: String = events
        .iter()
        .filter_map(|e| match e {
            StreamEvent::ContentDelta(t) => Some(t.as_str()),
            _ => None,
        })
        .collect();
    let reasoning: String = events
        .iter()
        .filter_map(|e| match e {
            StreamEvent::ReasoningDelta(t) => Some(t.as_str()),
            _ => None,
        })
        .collect();

    assert_eq!(content, "ABC");
    assert_eq!(reasoning, "xy");
    assert_eq!(events.last(), Some(&StreamEvent::Done));
}

#[tokio::test]
async fn test_premature_close_ends_stream_without_error() {
    let server = MockServer::start().await;
    let body = concat!(
        "data: {\"model\":\"chat-test\",\"choices\":[{\"delta\":{\"content\":\"He\"}}]}\n\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\"llo\"}}]}\n\n",
    );
    mount_sse(&server, body).await;

    let events = collect_events(&provider_for(&server)).await;

    let content: String = events
        .iter()
        .filter_map(|e| match e {
            StreamEvent::ContentDelta(t) => Some(t.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(content, "Hello");
    // No sentinel arrived; the stream just ends
    assert!(!events.contains(&StreamEvent::Done));
}

#[tokio::test]
async fn test_malformed_frame_skipped() {
    let server = MockServer::start().await;
    let body = concat!(
        "data: {\"choices\":[{\"delta\":{\"content\":\"A\"}}]}\n\n",
        "data: {broken json!!\n\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\"B\"}}]}\n\n",
        "data: [DONE]\n\n",
    );
    mount_sse(&server, body).await;

    let events = collect_events(&provider_for(&server)).await;

    let content: String = events
        .iter()
        .filter_map(|e| match e {
            StreamEvent::ContentDelta(t) => Some(t.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(content, "AB");
}

#[tokio::test]
async fn test_heartbeat_frames_ignored() {
    let server = MockServer::start().await;
    let body = concat!(
        ": keep-alive\n\n",
        "data: {\"choices\":[{\"delta\":{}}]}\n\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\"ok\"}}]}\n\n",
        "data: [DONE]\n\n",
    );
    mount_sse(&server, body).await;

    let events = collect_events(&provider_for(&server)).await;

    let deltas = events
        .iter()
        .filter(|e| {
            matches!(
                e,
                StreamEvent::ContentDelta(_) | StreamEvent::ReasoningDelta(_)
            )
        })
        .count();
    assert_eq!(deltas, 1);
}

#[tokio::test]
async fn test_frames_after_done_ignored() {
    let server = MockServer::start().await;
    let body = concat!(
        "data: {\"choices\":[{\"delta\":{\"content\":\"kept\"}}]}\n\n",
        "data: [DONE]\n\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\"dropped\"}}]}\n\n",
    );
    mount_sse(&server, body).await;

    let events = collect_events(&provider_for(&server)).await;

    let content: String = events
        .iter()
        .filter_map(|e| match e {
            StreamEvent::ContentDelta(t) => Some(t.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(content, "kept");
}

#[tokio::test]
async fn test_usage_reported() {
    let server = MockServer::start().await;
    let body = concat!(
        "data: {\"choices\":[{\"delta\":{\"content\":\"x\"}}]}\n\n",
        "data: {\"choices\":[],\"usage\":{\"prompt_tokens\":7,\"completion_tokens\":11,\"total_tokens\":18}}\n\n",
        "data: [DONE]\n\n",
    );
    mount_sse(&server, body).await;

    let events = collect_events(&provider_for(&server)).await;

    let usage = events.iter().find_map(|e| match e {
        StreamEvent::Usage(u) => Some(*u),
        _ => None,
    });
    assert_eq!(usage.unwrap().total_tokens, 18);
}

#[tokio::test]
async fn test_server_error_before_data() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(
            ResponseTemplate::new(500)
                .set_body_string(r#"{"error":{"message":"upstream exploded"}}"#),
        )
        .mount(&server)
        .await;

    let provider = provider_for(&server);
    let result = provider
        .stream_chat(CompletionRequest::new("chat-test", vec![]))
        .await;

    match result {
        Err(BanterError::Api(ApiError::ServerError { status, message })) => {
            assert_eq!(status, 500);
            assert_eq!(message, "upstream exploded");
        }
        Ok(_) => panic!("unexpected result: Ok(stream)"),
        Err(e) => panic!("unexpected result: Err({e:?})"),
    }
}

#[tokio::test]
async fn test_auth_error_before_data() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(401).set_body_string("{}"))
        .mount(&server)
        .await;

    let provider = provider_for(&server);
    let result = provider
        .stream_chat(CompletionRequest::new("chat-test", vec![]))
        .await;

    assert!(matches!(
        result,
        Err(BanterError::Api(ApiError::AuthenticationFailed))
    ));
}

/// Full stack: controller + HTTP provider + synthetic upstream.
#[tokio::test]
async fn test_controller_send_over_http() {
    let server = MockServer::start().await;
    let body = concat!(
        "data: {\"model\":\"chat-test\",\"choices\":[{\"delta\":{\"content\":\"Hi \"}}]}\n\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\"there\"}}]}\n\n",
        "data: {\"choices\":[],\"usage\":{\"prompt_tokens\":2,\"completion_tokens\":3,\"total_tokens\":5}}\n\n",
        "data: [DONE]\n\n",
    );
    mount_sse(&server, body).await;

    let settings = Settings::default();
    let store = SessionStore::open(Box::new(MemoryBackend::new()));
    let provider = Arc::new(provider_for(&server));
    let mut controller = ChatController::new(store, provider, settings);

    let outcome = controller
        .send(
            None,
            "Say hi",
            SendOptions::default(),
            &mut NoopChatObserver,
        )
        .await
        .unwrap();

    let reply = outcome.reply.unwrap();
    assert_eq!(reply.content, "Hi there");
    assert_eq!(reply.usage.unwrap().total_tokens, 5);

    let session = controller.store().get(outcome.session_id).unwrap();
    assert_eq!(session.messages.len(), 2);
    assert_eq!(session.title, "Say hi");
}
