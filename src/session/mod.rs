// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Session persistence
//!
//! The conversation data model and its durable, tolerant store.

pub mod session;
pub mod store;

pub use session::{ChatSession, ChatSettings};
pub use store::{FileBackend, MemoryBackend, SessionStore, StorageBackend};
