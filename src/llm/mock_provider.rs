// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Mock chat provider for testing
//!
//! Provides a scriptable implementation of the ChatProvider trait that can
//! be used in unit tests without making real API calls.

use async_trait::async_trait;
use futures::stream;
use futures::StreamExt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::chat::controller::{CancelToken, StreamControl};
use crate::error::{ApiError, BanterError, Result};
use crate::llm::message::TokenUsage;
use crate::llm::provider::{ChatProvider, CompletionRequest, EventStream, StreamEvent};

/// One scripted step of a mock stream
#[derive(Debug, Clone)]
pub enum ScriptItem {
    /// Deliver a decoded event
    Event(StreamEvent),
    /// Deliver a mid-stream transport error
    Error(String),
}

/// Cancellation fired from inside a scripted stream
#[derive(Clone)]
enum CancelHook {
    /// Cancel a caller-held token
    Token(CancelToken),
    /// Stop the active stream slot (cancels the controller's own token)
    Control(StreamControl),
}

impl CancelHook {
    fn fire(&self) {
        match self {
            CancelHook::Token(token) => token.cancel(),
            CancelHook::Control(control) => control.stop(),
        }
    }
}

/// A scriptable mock provider
#[derive(Clone, Default)]
pub struct MockChatProvider {
    /// Queued scripts, one per `stream_chat` call (last one repeats)
    scripts: Arc<Mutex<Vec<Vec<ScriptItem>>>>,
    /// Error to return instead of opening a stream
    connect_error: Arc<Mutex<Option<String>>>,
    /// Fire a cancellation after emitting N events
    cancel_hook: Arc<Mutex<Option<(usize, CancelHook)>>>,
    /// Never end the stream after the scripted events
    hang: Arc<Mutex<bool>>,
    /// Call counter
    call_count: Arc<AtomicUsize>,
    /// Recorded requests
    recorded_requests: Arc<Mutex<Vec<CompletionRequest>>>,
}

impl MockChatProvider {
    /// Create a mock that completes with a single content reply
    pub fn new() -> Self {
        Self::default().with_reply("mock reply")
    }

    /// Script a plain completed reply
    pub fn with_reply(self, text: impl Into<String>) -> Self {
        let script = vec![
            ScriptItem::Event(StreamEvent::Start {
                model: "mock-model".to_string(),
            }),
            ScriptItem::Event(StreamEvent::ContentDelta(text.into())),
            ScriptItem::Event(StreamEvent::Usage(TokenUsage {
                prompt_tokens: 1,
                completion_tokens: 1,
                total_tokens: 2,
            })),
            ScriptItem::Event(StreamEvent::Done),
        ];
        self.with_script(script)
    }

    /// Queue a raw script (appended; scripts are consumed per call in order)
    pub fn with_script(self, script: Vec<ScriptItem>) -> Self {
        self.scripts
            .lock()
            .expect("mock scripts lock")
            .push(script);
        self
    }

    /// Fail `stream_chat` itself, before any data
    pub fn with_connect_error(self, message: impl Into<String>) -> Self {
        *self.connect_error.lock().expect("mock connect error lock") = Some(message.into());
        self
    }

    /// Cancel `token` after the stream has emitted `count` events
    pub fn cancel_after(self, count: usize, token: CancelToken) -> Self {
        *self.cancel_hook.lock().expect("mock cancel lock") =
            Some((count, CancelHook::Token(token)));
        self
    }

    /// Call `control.stop()` after the stream has emitted `count` events,
    /// simulating a user pressing stop mid-stream
    pub fn stop_after(self, count: usize, control: StreamControl) -> Self {
        *self.cancel_hook.lock().expect("mock cancel lock") =
            Some((count, CancelHook::Control(control)));
        self
    }

    /// Keep the stream open forever after the scripted events
    pub fn with_hang(self) -> Self {
        *self.hang.lock().expect("mock hang lock") = true;
        self
    }

    /// Number of `stream_chat` calls made
    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    /// Requests recorded so far
    pub fn recorded_requests(&self) -> Vec<CompletionRequest> {
        self.recorded_requests
            .lock()
            .expect("mock requests lock")
            .clone()
    }

    fn next_script(&self) -> Vec<ScriptItem> {
        let mut scripts = self.scripts.lock().expect("mock scripts lock");
        if scripts.len() > 1 {
            scripts.remove(0)
        } else {
            scripts.first().cloned().unwrap_or_default()
        }
    }
}

#[async_trait]
impl ChatProvider for MockChatProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn stream_chat(&self, request: CompletionRequest) -> Result<EventStream> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        self.recorded_requests
            .lock()
            .expect("mock requests lock")
            .push(request);

        if let Some(message) = self
            .connect_error
            .lock()
            .expect("mock connect error lock")
            .clone()
        {
            return Err(BanterError::Api(ApiError::StreamError(message)));
        }

        let script = self.next_script();
        let cancel_hook = self.cancel_hook.lock().expect("mock cancel lock").clone();

        // The hook fires as the Nth item is polled off the stream, not at
        // construction, so cancellation lands mid-stream like the real thing.
        let items = stream::iter(script).enumerate().map(move |(i, item)| {
            if let Some((count, ref hook)) = cancel_hook {
                if i + 1 == count {
                    hook.fire();
                }
            }
            match item {
                ScriptItem::Event(event) => Ok(event),
                ScriptItem::Error(message) => {
                    Err(BanterError::Api(ApiError::StreamError(message)))
                }
            }
        });

        if *self.hang.lock().expect("mock hang lock") {
            Ok(Box::pin(items.chain(stream::pending::<Result<StreamEvent>>())))
        } else {
            Ok(Box::pin(items))
        }
    }
}
