// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Session orchestration
//!
//! The controller is the surface the UI shell calls: send a prompt, stream
//! the reply into transient state, commit the finished message, and support
//! stop/regenerate/delete. It owns the store and the single active-stream
//! slot; the wire protocol never leaks past this module.

use std::ops::RangeInclusive;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures::StreamExt;
use uuid::Uuid;

use crate::chat::streaming::StreamAccumulator;
use crate::config::Settings;
use crate::error::{ApiError, BanterError, Result};
use crate::llm::message::ChatMessage;
use crate::llm::provider::{ChatProvider, CompletionRequest, StreamEvent};
use crate::session::session::{ChatSession, ChatSettings};
use crate::session::store::SessionStore;

/// Title used when the first user turn trims to nothing
pub const DEFAULT_TITLE: &str = "New Conversation";

/// Maximum characters kept when deriving a title from the first user turn
pub const TITLE_MAX_CHARS: usize = 24;

/// Valid sampling temperature range enforced at send time
pub const TEMPERATURE_RANGE: RangeInclusive<f32> = 0.0..=2.0;

/// Valid max-tokens range enforced at send time
pub const MAX_TOKENS_RANGE: RangeInclusive<u32> = 1..=8192;

/// Derive a session title from the first user turn: trimmed, bounded prefix.
pub fn derive_title(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return DEFAULT_TITLE.to_string();
    }
    trimmed.chars().take(TITLE_MAX_CHARS).collect()
}

fn clamp_temperature(temperature: f32) -> f32 {
    temperature.clamp(*TEMPERATURE_RANGE.start(), *TEMPERATURE_RANGE.end())
}

fn clamp_max_tokens(max_tokens: u32) -> u32 {
    max_tokens.clamp(*MAX_TOKENS_RANGE.start(), *MAX_TOKENS_RANGE.end())
}

/// Cooperative cancellation token, checked at suspension points.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Signal cancellation. Idempotent.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Read-only snapshot of the live stream, for display while text arrives
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveStream {
    pub session_id: Uuid,
    pub content: String,
    pub reasoning: String,
}

#[derive(Debug)]
struct ActiveStream {
    session_id: Uuid,
    cancel: CancelToken,
    content: String,
    reasoning: String,
}

/// Shared handle to the single active-stream slot.
///
/// At most one stream is live across the process; starting a new one first
/// cancels the previous. Cloneable so the shell can call `stop()` while a
/// send is in flight.
#[derive(Clone, Default)]
pub struct StreamControl {
    inner: Arc<Mutex<Option<ActiveStream>>>,
}

impl StreamControl {
    fn lock(&self) -> MutexGuard<'_, Option<ActiveStream>> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Register a new stream, cancelling any active one first.
    pub(crate) fn begin(&self, session_id: Uuid) -> CancelToken {
        let mut slot = self.lock();
        if let Some(previous) = slot.take() {
            tracing::debug!(
                target: "banter.chat.controller",
                session_id = %previous.session_id,
                "cancelling active stream before starting a new one"
            );
            previous.cancel.cancel();
        }
        let cancel = CancelToken::new();
        *slot = Some(ActiveStream {
            session_id,
            cancel: cancel.clone(),
            content: String::new(),
            reasoning: String::new(),
        });
        cancel
    }

    /// Cancel the active stream, if any, and clear transient state.
    pub fn stop(&self) {
        if let Some(active) = self.lock().take() {
            active.cancel.cancel();
        }
    }

    /// Whether a stream is currently live
    pub fn is_streaming(&self) -> bool {
        self.lock().is_some()
    }

    /// The live content/reasoning pair, if a stream is active
    pub fn snapshot(&self) -> Option<LiveStream> {
        self.lock().as_ref().map(|active| LiveStream {
            session_id: active.session_id,
            content: active.content.clone(),
            reasoning: active.reasoning.clone(),
        })
    }

    fn push_content(&self, text: &str) {
        if let Some(active) = self.lock().as_mut() {
            active.content.push_str(text);
        }
    }

    fn push_reasoning(&self, text: &str) {
        if let Some(active) = self.lock().as_mut() {
            active.reasoning.push_str(text);
        }
    }

    fn clear(&self) {
        *self.lock() = None;
    }
}

/// Hooks for live display. Deltas arrive in parse order; the send's return
/// value is the terminal event and always comes last.
pub trait ChatObserver {
    fn on_stream_start(&mut self, _session_id: Uuid) {}
    fn on_content_delta(&mut self, _text: &str) {}
    fn on_reasoning_delta(&mut self, _text: &str) {}
}

/// No-op observer for callers that don't need display hooks.
#[derive(Debug, Default)]
pub struct NoopChatObserver;

impl ChatObserver for NoopChatObserver {}

/// Per-send options
#[derive(Debug, Clone, Default)]
pub struct SendOptions {
    /// Request the reasoning model for this send; the override is recorded
    /// into the session's persisted settings so regenerate reproduces it
    pub reasoning: bool,

    /// System prompt override for this send only
    pub system_override: Option<String>,
}

/// Terminal result of a send or regenerate
#[derive(Debug)]
pub struct SendOutcome {
    pub session_id: Uuid,
    /// The committed assistant reply; `None` means the send was cancelled
    pub reply: Option<ChatMessage>,
}

impl SendOutcome {
    pub fn cancelled(&self) -> bool {
        self.reply.is_none()
    }
}

/// Orchestration layer exposed to the surrounding UI
pub struct ChatController {
    store: SessionStore,
    provider: Arc<dyn ChatProvider>,
    settings: Settings,
    control: StreamControl,
    storage_error_reported: bool,
}

impl ChatController {
    pub fn new(store: SessionStore, provider: Arc<dyn ChatProvider>, settings: Settings) -> Self {
        Self {
            store,
            provider,
            settings,
            control: StreamControl::default(),
            storage_error_reported: false,
        }
    }

    /// Read access to the store for listing and display
    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    /// Cloneable handle for stop/snapshot while a send is in flight
    pub fn control(&self) -> StreamControl {
        self.control.clone()
    }

    /// Cancel the in-flight stream for the current session, if any.
    pub fn stop(&self) {
        self.control.stop();
    }

    /// Whether a storage write has failed this process; in-memory state
    /// stays authoritative when it has.
    pub fn storage_degraded(&self) -> bool {
        self.storage_error_reported
    }

    /// Create a new empty session with default settings and make it current.
    pub fn new_session(&mut self) -> Uuid {
        let session = ChatSession::new(ChatSettings::from_defaults(&self.settings.defaults));
        let id = session.id;
        self.persist_session(&session);
        let result = self.store.set_current_session_id(Some(id));
        self.note_storage_result(result);
        id
    }

    /// Make an existing session current.
    pub fn switch_session(&mut self, id: Uuid) -> Result<()> {
        if self.store.get(id).is_none() {
            return Err(BanterError::Session(format!("unknown session {id}")));
        }
        let result = self.store.set_current_session_id(Some(id));
        self.note_storage_result(result);
        Ok(())
    }

    /// Delete a session and re-elect the current pointer if it was current.
    pub fn delete_session(&mut self, id: Uuid) -> Result<bool> {
        let was_current = self.store.current_session_id() == Some(id);
        let existed = match self.store.delete_session(id) {
            Ok(existed) => existed,
            Err(e) => {
                self.note_storage_result(Err(e));
                true
            }
        };

        if was_current {
            let next = self.store.list_sessions().first().map(|s| s.id);
            let result = self.store.set_current_session_id(next);
            self.note_storage_result(result);
        }

        Ok(existed)
    }

    /// Send a user turn and stream the reply.
    ///
    /// The user message is committed synchronously before streaming begins
    /// and survives any later failure. With no session selected, the current
    /// session is used, or a fresh one created.
    pub async fn send(
        &mut self,
        session_id: Option<Uuid>,
        text: &str,
        opts: SendOptions,
        observer: &mut dyn ChatObserver,
    ) -> Result<SendOutcome> {
        let mut session = self.session_for_send(session_id)?;

        session.push_message(ChatMessage::user(text));
        if session.title.is_empty() {
            session.title = derive_title(text);
        }
        if opts.reasoning {
            session.settings.model = self.settings.defaults.reasoning_model.clone();
        }

        self.persist_session(&session);
        let result = self.store.set_current_session_id(Some(session.id));
        self.note_storage_result(result);

        tracing::info!(
            target: "banter.chat.controller",
            session_id = %session.id,
            reasoning = opts.reasoning,
            messages = session.messages.len(),
            "sending user turn"
        );

        self.run_turn(session, opts.system_override, observer).await
    }

    /// Re-issue the last user turn, dropping its previous assistant reply.
    ///
    /// Mode-preserving: the session's stored settings (including a recorded
    /// reasoning-model override) are used as-is.
    pub async fn regenerate(
        &mut self,
        session_id: Option<Uuid>,
        observer: &mut dyn ChatObserver,
    ) -> Result<SendOutcome> {
        let mut session = self.existing_session(session_id)?;

        let user_index = session.last_user_index().ok_or_else(|| {
            BanterError::InvalidInput("no user message to regenerate".to_string())
        })?;

        if let Some(next) = session.messages.get(user_index + 1) {
            if next.role == crate::llm::message::Role::Assistant {
                let reply_id = next.id;
                session.remove_message(reply_id);
            }
        }

        self.persist_session(&session);

        tracing::info!(
            target: "banter.chat.controller",
            session_id = %session.id,
            model = %session.settings.model,
            "regenerating last turn"
        );

        self.run_turn(session, None, observer).await
    }

    /// Remove exactly one message by id. No cascade to adjacent messages.
    pub fn delete_message(&mut self, session_id: Option<Uuid>, message_id: Uuid) -> Result<bool> {
        let mut session = self.existing_session(session_id)?;
        let removed = session.remove_message(message_id);
        if removed {
            self.persist_session(&session);
        }
        Ok(removed)
    }

    /// Render a session transcript as markdown.
    pub fn export_markdown(&self, session_id: Option<Uuid>) -> Result<String> {
        let session = match session_id {
            Some(id) => self
                .store
                .get(id)
                .ok_or_else(|| BanterError::Session(format!("unknown session {id}")))?,
            None => self
                .store
                .current_session_id()
                .and_then(|id| self.store.get(id))
                .ok_or_else(|| BanterError::Session("no session selected".to_string()))?,
        };

        let title = if session.title.is_empty() {
            DEFAULT_TITLE
        } else {
            &session.title
        };

        let mut out = format!("# {title}\n\n");
        for msg in &session.messages {
            out.push_str(&format!("## {}\n\n", msg.role));
            if let Some(reasoning) = &msg.reasoning_content {
                for line in reasoning.lines() {
                    out.push_str(&format!("> {line}\n"));
                }
                out.push('\n');
            }
            out.push_str(&msg.content);
            out.push_str("\n\n");
            if let Some(usage) = &msg.usage {
                out.push_str(&format!("_{usage}_\n\n"));
            }
        }
        Ok(out)
    }

    /// Drive one streaming turn to its terminal state.
    async fn run_turn(
        &mut self,
        mut session: ChatSession,
        system_override: Option<String>,
        observer: &mut dyn ChatObserver,
    ) -> Result<SendOutcome> {
        let session_id = session.id;

        let system = system_override.or_else(|| {
            let message = session.settings.system_message.clone();
            (!message.is_empty()).then_some(message)
        });

        let mut request =
            CompletionRequest::new(session.settings.model.clone(), session.messages.clone())
                .with_temperature(clamp_temperature(session.settings.temperature))
                .with_max_tokens(clamp_max_tokens(session.settings.max_tokens));
        if let Some(system) = system {
            request = request.with_system(system);
        }

        let cancel = self.control.begin(session_id);
        observer.on_stream_start(session_id);

        let model = request.model.clone();
        let mut stream = match self.provider.stream_chat(request).await {
            Ok(stream) => stream,
            Err(e) => {
                self.control.clear();
                return Err(e);
            }
        };

        let idle_timeout = self.settings.api.stream_idle_timeout_secs;
        let mut accumulator = StreamAccumulator::new();

        loop {
            if cancel.is_cancelled() {
                break;
            }

            let next = if idle_timeout > 0 {
                match tokio::time::timeout(Duration::from_secs(idle_timeout), stream.next()).await
                {
                    Ok(next) => next,
                    Err(_) => {
                        self.control.clear();
                        return Err(BanterError::Api(ApiError::Timeout));
                    }
                }
            } else {
                stream.next().await
            };

            match next {
                // Clean close without the sentinel: synthesize completion
                // from whatever has been accumulated.
                None => break,
                Some(Ok(event)) => {
                    match &event {
                        StreamEvent::ContentDelta(text) => {
                            self.control.push_content(text);
                            observer.on_content_delta(text);
                        }
                        StreamEvent::ReasoningDelta(text) => {
                            self.control.push_reasoning(text);
                            observer.on_reasoning_delta(text);
                        }
                        _ => {}
                    }
                    let done = matches!(event, StreamEvent::Done);
                    accumulator.apply(&event);
                    if done {
                        break;
                    }
                }
                Some(Err(e)) => {
                    if accumulator.is_empty() {
                        self.control.clear();
                        return Err(e);
                    }
                    tracing::warn!(
                        target: "banter.chat.controller",
                        session_id = %session_id,
                        error = %e,
                        "stream dropped mid-reply; keeping partial answer"
                    );
                    break;
                }
            }
        }

        self.control.clear();

        if cancel.is_cancelled() {
            tracing::debug!(
                target: "banter.chat.controller",
                session_id = %session_id,
                "send cancelled; no assistant message committed"
            );
            return Ok(SendOutcome {
                session_id,
                reply: None,
            });
        }

        let reply = accumulator.finish(&model);
        session.push_message(reply.clone());
        self.persist_session(&session);

        tracing::info!(
            target: "banter.chat.controller",
            session_id = %session_id,
            content_len = reply.content.len(),
            has_reasoning = reply.has_reasoning(),
            "assistant reply committed"
        );

        Ok(SendOutcome {
            session_id,
            reply: Some(reply),
        })
    }

    /// Target session for a send: explicit id, else current, else a new one.
    fn session_for_send(&mut self, session_id: Option<Uuid>) -> Result<ChatSession> {
        if let Some(id) = session_id {
            return self
                .store
                .get(id)
                .cloned()
                .ok_or_else(|| BanterError::Session(format!("unknown session {id}")));
        }

        if let Some(current) = self.store.current_session_id() {
            if let Some(session) = self.store.get(current) {
                return Ok(session.clone());
            }
        }

        Ok(ChatSession::new(ChatSettings::from_defaults(
            &self.settings.defaults,
        )))
    }

    /// Target session for operations that never create one.
    fn existing_session(&self, session_id: Option<Uuid>) -> Result<ChatSession> {
        let id = session_id
            .or_else(|| self.store.current_session_id())
            .ok_or_else(|| BanterError::Session("no session selected".to_string()))?;
        self.store
            .get(id)
            .cloned()
            .ok_or_else(|| BanterError::Session(format!("unknown session {id}")))
    }

    fn persist_session(&mut self, session: &ChatSession) {
        let result = self.store.save_session(session.clone());
        self.note_storage_result(result);
    }

    /// Storage failures are recoverable: warn once, keep the in-memory
    /// state authoritative for the rest of the process.
    fn note_storage_result(&mut self, result: Result<()>) {
        if let Err(e) = result {
            if !self.storage_error_reported {
                self.storage_error_reported = true;
                tracing::warn!(
                    target: "banter.chat.controller",
                    error = %e,
                    "storage write failed; continuing with in-memory state"
                );
            }
        }
    }
}
