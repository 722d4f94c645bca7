// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Chat provider trait and related types
//!
//! Defines the abstraction over the upstream streaming completion endpoint.

use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;

use crate::error::Result;
use crate::llm::message::{ChatMessage, TokenUsage};

/// A pinned, boxed stream of decoded wire events.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<StreamEvent>> + Send>>;

/// Trait for the upstream chat completion backend.
///
/// The production implementation speaks SSE over HTTP; tests substitute a
/// scripted mock. Errors never escape the stream as panics: transport
/// failures before any data surface as an `Err` from `stream_chat`, later
/// failures as `Err` items on the stream itself.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Provider name for logging (e.g. "openai-compatible", "mock")
    fn name(&self) -> &str;

    /// Open a streaming completion for the given request.
    async fn stream_chat(&self, request: CompletionRequest) -> Result<EventStream>;
}

/// Request for a streaming completion
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    /// Model to use
    pub model: String,

    /// Ordered message history, including the just-appended user turn
    pub messages: Vec<ChatMessage>,

    /// System prompt, prepended conceptually as a `system` turn
    pub system: Option<String>,

    /// Sampling temperature
    pub temperature: f32,

    /// Maximum tokens in the response
    pub max_tokens: u32,
}

impl CompletionRequest {
    /// Create a new completion request
    pub fn new(model: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            model: model.into(),
            messages,
            system: None,
            temperature: 1.0,
            max_tokens: 4096,
        }
    }

    /// Set the system prompt
    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    /// Set temperature
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Set max tokens
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

/// Decoded events from a streaming response.
///
/// Content and reasoning deltas form two logically parallel channels: each
/// preserves its own wire arrival order, but there is no guaranteed relative
/// interleaving between them.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// First frame of the response, carrying the serving model id
    Start { model: String },

    /// Incremental answer text
    ContentDelta(String),

    /// Incremental reasoning text
    ReasoningDelta(String),

    /// Token accounting, delivered near the end of the stream
    Usage(TokenUsage),

    /// Terminal sentinel; no further events follow
    Done,
}
