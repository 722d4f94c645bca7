// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Incremental SSE frame splitter
//!
//! The transport chunks the byte stream arbitrarily: one frame may arrive
//! split across several reads, and several frames may arrive in one read.
//! `SseParser` buffers partial input and only surfaces a frame once its
//! boundary has been received. After the `[DONE]` sentinel, all further
//! input is ignored.

/// One fully received frame of the upstream wire protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseFrame {
    /// A data frame payload (the text after `data:`)
    Data(String),
    /// The terminal `[DONE]` sentinel
    Done,
}

/// Buffering parser for an SSE byte/text feed.
#[derive(Debug, Default)]
pub struct SseParser {
    buffer: String,
    finished: bool,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the terminal sentinel has been seen.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Feed one transport chunk, returning every frame it completed.
    ///
    /// Comment lines (`:` prefix), blank lines and non-`data:` fields are
    /// framing noise and yield nothing. Input after the sentinel is dropped.
    pub fn push(&mut self, chunk: &str) -> Vec<SseFrame> {
        let mut frames = Vec::new();
        if self.finished {
            return frames;
        }

        self.buffer.push_str(chunk);

        while let Some(line_end) = self.buffer.find('\n') {
            let line = self.buffer[..line_end].trim_end_matches('\r').to_string();
            self.buffer.drain(..=line_end);

            if line.is_empty() || line.starts_with(':') {
                continue;
            }

            let Some(data) = line.strip_prefix("data:") else {
                continue;
            };
            let data = data.strip_prefix(' ').unwrap_or(data);

            if data == "[DONE]" {
                frames.push(SseFrame::Done);
                self.finished = true;
                self.buffer.clear();
                break;
            }

            frames.push(SseFrame::Data(data.to_string()));
        }

        frames
    }
}
