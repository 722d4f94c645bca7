// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Persisted conversation state
//!
//! A session owns an ordered message list and a settings snapshot. The
//! snapshot may diverge from global defaults: a session that switched to the
//! reasoning model keeps it even if defaults change later.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::DefaultsConfig;
use crate::llm::message::ChatMessage;

/// Generation settings snapshot carried by each session
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatSettings {
    /// Target model for this session
    pub model: String,

    /// Sampling temperature
    pub temperature: f32,

    /// Maximum tokens per response
    pub max_tokens: u32,

    /// System prompt for this session (not stored as a message)
    pub system_message: String,
}

impl ChatSettings {
    /// Snapshot the global defaults for a new session
    pub fn from_defaults(defaults: &DefaultsConfig) -> Self {
        Self {
            model: defaults.model.clone(),
            temperature: defaults.temperature,
            max_tokens: defaults.max_tokens,
            system_message: defaults.system_message.clone(),
        }
    }
}

/// A persisted conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatSession {
    /// Unique session identifier
    pub id: Uuid,

    /// Human-readable label; empty until derived from the first user turn
    #[serde(default)]
    pub title: String,

    /// Ordered message list, append-only except for explicit truncation
    #[serde(default)]
    pub messages: Vec<ChatMessage>,

    /// Fixed at creation
    pub created_at: DateTime<Utc>,

    /// Bumped on every mutation, monotonically non-decreasing
    pub updated_at: DateTime<Utc>,

    /// Settings snapshot for this session
    pub settings: ChatSettings,
}

impl ChatSession {
    /// Create a new empty session with the given settings snapshot
    pub fn new(settings: ChatSettings) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            title: String::new(),
            messages: Vec::new(),
            created_at: now,
            updated_at: now,
            settings,
        }
    }

    /// Bump `updated_at`. Clock adjustments must not move it backwards.
    pub fn touch(&mut self) {
        let now = Utc::now();
        if now > self.updated_at {
            self.updated_at = now;
        }
    }

    /// Append a message and bump the timestamp
    pub fn push_message(&mut self, message: ChatMessage) {
        self.messages.push(message);
        self.touch();
    }

    /// Remove exactly one message by id. Returns whether it was found.
    pub fn remove_message(&mut self, id: Uuid) -> bool {
        let before = self.messages.len();
        self.messages.retain(|m| m.id != id);
        let removed = self.messages.len() < before;
        if removed {
            self.touch();
        }
        removed
    }

    /// Index of the most recent user message
    pub fn last_user_index(&self) -> Option<usize> {
        self.messages
            .iter()
            .rposition(|m| m.role == crate::llm::message::Role::User)
    }
}
