// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Streaming response accumulation
//!
//! Two append-only buffers, one per logical channel, fed by the
//! demultiplexed wire events and frozen into a single immutable message at
//! terminal time.

use crate::llm::message::{ChatMessage, TokenUsage};
use crate::llm::provider::StreamEvent;

/// Accumulator for one streaming reply
#[derive(Debug, Default)]
pub struct StreamAccumulator {
    /// Accumulated answer text
    content: String,
    /// Accumulated reasoning text
    reasoning: String,
    /// Model id reported by the stream
    model: Option<String>,
    /// Usage reported by the stream
    usage: Option<TokenUsage>,
    /// Whether the terminal sentinel was seen
    saw_done: bool,
}

impl StreamAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one decoded event into the buffers
    pub fn apply(&mut self, event: &StreamEvent) {
        match event {
            StreamEvent::Start { model } => {
                if !model.is_empty() {
                    self.model = Some(model.clone());
                }
            }
            StreamEvent::ContentDelta(text) => self.content.push_str(text),
            StreamEvent::ReasoningDelta(text) => self.reasoning.push_str(text),
            StreamEvent::Usage(usage) => self.usage = Some(*usage),
            StreamEvent::Done => self.saw_done = true,
        }
    }

    /// Answer text accumulated so far
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Reasoning text accumulated so far
    pub fn reasoning(&self) -> &str {
        &self.reasoning
    }

    /// Whether neither channel has produced any text yet
    pub fn is_empty(&self) -> bool {
        self.content.is_empty() && self.reasoning.is_empty()
    }

    /// Whether the terminal sentinel was seen
    pub fn saw_done(&self) -> bool {
        self.saw_done
    }

    /// Freeze the buffers into a completed assistant message.
    ///
    /// Also used when the transport closes before the sentinel: a partial
    /// but usable answer beats discarding everything.
    pub fn finish(self, fallback_model: &str) -> ChatMessage {
        let reasoning = (!self.reasoning.is_empty()).then_some(self.reasoning);
        let model = self
            .model
            .or_else(|| (!fallback_model.is_empty()).then(|| fallback_model.to_string()));
        ChatMessage::assistant_reply(self.content, reasoning, model, self.usage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::message::Role;

    #[test]
    fn test_accumulator_new() {
        let acc = StreamAccumulator::new();
        assert!(acc.is_empty());
        assert!(!acc.saw_done());
    }

    #[test]
    fn test_content_concatenation_order() {
        let mut acc = StreamAccumulator::new();
        for delta in ["A", "B", "C"] {
            acc.apply(&StreamEvent::ContentDelta(delta.to_string()));
        }
        assert_eq!(acc.content(), "ABC");
    }

    #[test]
    fn test_channels_accumulate_independently() {
        let mut acc = StreamAccumulator::new();
        // Interleaving on the wire must not leak across channels
        acc.apply(&StreamEvent::ReasoningDelta("x".to_string()));
        acc.apply(&StreamEvent::ContentDelta("A".to_string()));
        acc.apply(&StreamEvent::ReasoningDelta("y".to_string()));
        acc.apply(&StreamEvent::ContentDelta("B".to_string()));
        acc.apply(&StreamEvent::ContentDelta("C".to_string()));

        assert_eq!(acc.content(), "ABC");
        assert_eq!(acc.reasoning(), "xy");
    }

    #[test]
    fn test_finish_builds_assistant_message() {
        let mut acc = StreamAccumulator::new();
        acc.apply(&StreamEvent::Start {
            model: "reasoner-1".to_string(),
        });
        acc.apply(&StreamEvent::ReasoningDelta("thinking".to_string()));
        acc.apply(&StreamEvent::ContentDelta("Hello".to_string()));
        acc.apply(&StreamEvent::Usage(TokenUsage {
            prompt_tokens: 3,
            completion_tokens: 5,
            total_tokens: 8,
        }));
        acc.apply(&StreamEvent::Done);

        let msg = acc.finish("fallback");
        assert_eq!(msg.role, Role::Assistant);
        assert_eq!(msg.content, "Hello");
        assert_eq!(msg.reasoning_content.as_deref(), Some("thinking"));
        assert_eq!(msg.model.as_deref(), Some("reasoner-1"));
        assert_eq!(msg.usage.unwrap().total_tokens, 8);
    }

    #[test]
    fn test_finish_without_reasoning_leaves_none() {
        let mut acc = StreamAccumulator::new();
        acc.apply(&StreamEvent::ContentDelta("Hi".to_string()));
        let msg = acc.finish("chat-1");
        assert!(msg.reasoning_content.is_none());
    }

    #[test]
    fn test_finish_uses_fallback_model() {
        let mut acc = StreamAccumulator::new();
        acc.apply(&StreamEvent::ContentDelta("Hi".to_string()));
        let msg = acc.finish("chat-1");
        assert_eq!(msg.model.as_deref(), Some("chat-1"));
    }

    #[test]
    fn test_finish_without_done_still_completes() {
        let mut acc = StreamAccumulator::new();
        acc.apply(&StreamEvent::ContentDelta("He".to_string()));
        acc.apply(&StreamEvent::ContentDelta("llo".to_string()));
        assert!(!acc.saw_done());

        let msg = acc.finish("chat-1");
        assert_eq!(msg.content, "Hello");
    }

    #[test]
    fn test_empty_start_model_ignored() {
        let mut acc = StreamAccumulator::new();
        acc.apply(&StreamEvent::Start {
            model: String::new(),
        });
        acc.apply(&StreamEvent::ContentDelta("x".to_string()));
        let msg = acc.finish("chat-1");
        assert_eq!(msg.model.as_deref(), Some("chat-1"));
    }

    #[test]
    fn test_reasoning_only_response() {
        let mut acc = StreamAccumulator::new();
        acc.apply(&StreamEvent::ReasoningDelta("all thought".to_string()));
        assert!(!acc.is_empty());

        let msg = acc.finish("m");
        assert_eq!(msg.content, "");
        assert_eq!(msg.reasoning_content.as_deref(), Some("all thought"));
    }

    #[test]
    fn test_unicode_deltas() {
        let mut acc = StreamAccumulator::new();
        acc.apply(&StreamEvent::ContentDelta("Hello ".to_string()));
        acc.apply(&StreamEvent::ContentDelta("世界".to_string()));
        acc.apply(&StreamEvent::ContentDelta(" \u{1F600}".to_string()));
        assert_eq!(acc.content(), "Hello 世界 \u{1F600}");
    }
}
