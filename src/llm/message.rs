// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Message types for chat conversations
//!
//! Defines the immutable message structures exchanged with the upstream API
//! and persisted inside sessions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single turn in a conversation.
///
/// Messages are immutable once committed to a session; edits happen only by
/// replacing the session's message list, never by mutating a message in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Unique identifier for the message
    pub id: Uuid,

    /// Role of the message sender
    pub role: Role,

    /// Finalized answer text (empty until a streaming reply completes)
    pub content: String,

    /// Auxiliary "thinking" text, present only for assistant messages
    /// produced in reasoning mode
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_content: Option<String>,

    /// When the message was created
    pub timestamp: DateTime<Utc>,

    /// Which upstream model produced an assistant message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Token accounting, present only on completed assistant messages
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
}

/// Role of the message sender
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// User message
    User,
    /// Assistant response
    Assistant,
    /// System prompt
    System,
}

/// Token usage reported by the upstream API
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenUsage {
    /// Tokens in the prompt
    #[serde(default)]
    pub prompt_tokens: u32,
    /// Tokens in the completion
    #[serde(default)]
    pub completion_tokens: u32,
    /// Total tokens
    #[serde(default)]
    pub total_tokens: u32,
}

/// Generate a fresh collision-resistant message identifier.
pub fn generate_id() -> Uuid {
    Uuid::new_v4()
}

impl ChatMessage {
    /// Create a new user message
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            id: generate_id(),
            role: Role::User,
            content: content.into(),
            reasoning_content: None,
            timestamp: Utc::now(),
            model: None,
            usage: None,
        }
    }

    /// Create a new system message
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            id: generate_id(),
            role: Role::System,
            content: content.into(),
            reasoning_content: None,
            timestamp: Utc::now(),
            model: None,
            usage: None,
        }
    }

    /// Create a new assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            id: generate_id(),
            role: Role::Assistant,
            content: content.into(),
            reasoning_content: None,
            timestamp: Utc::now(),
            model: None,
            usage: None,
        }
    }

    /// Create a completed assistant reply with streaming metadata
    pub fn assistant_reply(
        content: impl Into<String>,
        reasoning_content: Option<String>,
        model: Option<String>,
        usage: Option<TokenUsage>,
    ) -> Self {
        Self {
            id: generate_id(),
            role: Role::Assistant,
            content: content.into(),
            reasoning_content,
            timestamp: Utc::now(),
            model,
            usage,
        }
    }

    /// Whether this message carries a reasoning channel
    pub fn has_reasoning(&self) -> bool {
        self.reasoning_content
            .as_ref()
            .is_some_and(|r| !r.is_empty())
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
            Role::System => write!(f, "system"),
        }
    }
}

impl std::fmt::Display for TokenUsage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} prompt + {} completion = {} tokens",
            self.prompt_tokens, self.completion_tokens, self.total_tokens
        )
    }
}
