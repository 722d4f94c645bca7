// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Chat orchestration
//!
//! Streaming accumulation and the controller the UI shell drives.

pub mod controller;
pub mod streaming;

pub use controller::{
    ChatController, ChatObserver, NoopChatObserver, SendOptions, SendOutcome, StreamControl,
};
pub use streaming::StreamAccumulator;
