// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Durable session store
//!
//! Sessions live in an in-memory map that is authoritative for the process
//! lifetime and mirrored to a key-value backend on every mutation. Loads are
//! tolerant: corrupt or stale records are dropped with a warning, never
//! raised. Write failures surface as recoverable `Storage` errors while the
//! in-memory state keeps the session usable.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{BanterError, Result};
use crate::session::session::ChatSession;

const SESSION_KEY_PREFIX: &str = "sessions/";
const CURRENT_SESSION_KEY: &str = "current-session";

/// Bumped when the persisted session shape changes incompatibly. Records
/// with another version are dropped on load.
const SESSION_SCHEMA_VERSION: u32 = 1;

/// The durable key-value medium behind the store.
///
/// Reads tolerate absence and IO failure by returning `None`. Prefixes are
/// treated as directory-style paths ending in `/`.
pub trait StorageBackend: Send {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&mut self, key: &str, value: &str) -> Result<()>;
    fn remove(&mut self, key: &str) -> Result<()>;
    fn keys_with_prefix(&self, prefix: &str) -> Vec<String>;
}

/// In-memory backend for tests and ephemeral use
#[derive(Debug, Default)]
pub struct MemoryBackend {
    entries: HashMap<String, String>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an entry directly, bypassing the store (for tests)
    pub fn insert_raw(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(key.into(), value.into());
    }
}

impl StorageBackend for MemoryBackend {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }

    fn keys_with_prefix(&self, prefix: &str) -> Vec<String> {
        self.entries
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect()
    }
}

/// File-per-key backend rooted at a directory
#[derive(Debug)]
pub struct FileBackend {
    root: PathBuf,
}

impl FileBackend {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }
}

impl StorageBackend for FileBackend {
    fn get(&self, key: &str) -> Option<String> {
        std::fs::read_to_string(self.path_for(key)).ok()
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let path = self.path_for(key);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| BanterError::Storage(e.to_string()))?;
        }
        std::fs::write(&path, value).map_err(|e| BanterError::Storage(e.to_string()))
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        match std::fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(BanterError::Storage(e.to_string())),
        }
    }

    fn keys_with_prefix(&self, prefix: &str) -> Vec<String> {
        let dir = self.root.join(prefix.trim_end_matches('/'));
        let Ok(entries) = std::fs::read_dir(dir) else {
            return Vec::new();
        };
        entries
            .filter_map(|entry| {
                let entry = entry.ok()?;
                let name = entry.file_name().into_string().ok()?;
                entry.file_type().ok()?.is_file().then(|| format!("{prefix}{name}"))
            })
            .collect()
    }
}

/// Versioned envelope for persisted sessions
#[derive(Debug, Serialize, Deserialize)]
struct SessionRecord {
    version: u32,
    session: ChatSession,
}

/// Keyed persistence for sessions and the current-session pointer
pub struct SessionStore {
    backend: Box<dyn StorageBackend>,
    sessions: HashMap<Uuid, ChatSession>,
    current: Option<Uuid>,
}

impl SessionStore {
    /// Open a store over the given backend.
    ///
    /// Never fails: records that are missing, corrupt, or of another schema
    /// version are skipped. A current-session pointer that references no
    /// surviving session is discarded.
    pub fn open(backend: Box<dyn StorageBackend>) -> Self {
        let mut sessions = HashMap::new();

        for key in backend.keys_with_prefix(SESSION_KEY_PREFIX) {
            let Some(raw) = backend.get(&key) else {
                continue;
            };
            match decode_record(&raw) {
                Some(session) => {
                    sessions.insert(session.id, session);
                }
                None => {
                    tracing::warn!(
                        target: "banter.session.store",
                        key = %key,
                        "dropping unreadable session record"
                    );
                }
            }
        }

        let current = backend
            .get(CURRENT_SESSION_KEY)
            .and_then(|raw| Uuid::parse_str(raw.trim()).ok())
            .filter(|id| {
                let known = sessions.contains_key(id);
                if !known {
                    tracing::warn!(
                        target: "banter.session.store",
                        session_id = %id,
                        "current-session pointer references a missing session"
                    );
                }
                known
            });

        tracing::debug!(
            target: "banter.session.store",
            sessions = sessions.len(),
            has_current = current.is_some(),
            "session store opened"
        );

        Self {
            backend,
            sessions,
            current,
        }
    }

    /// All sessions, most recently updated first.
    pub fn list_sessions(&self) -> Vec<&ChatSession> {
        let mut sorted: Vec<_> = self.sessions.values().collect();
        sorted.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        sorted
    }

    /// Get a session by id
    pub fn get(&self, id: Uuid) -> Option<&ChatSession> {
        self.sessions.get(&id)
    }

    /// Upsert a session. Bumping `updated_at` is the caller's job.
    ///
    /// The in-memory copy is updated even when the write fails, so the
    /// session stays usable for the rest of the process.
    pub fn save_session(&mut self, session: ChatSession) -> Result<()> {
        let id = session.id;
        let record = SessionRecord {
            version: SESSION_SCHEMA_VERSION,
            session: session.clone(),
        };
        self.sessions.insert(id, session);

        let encoded = serde_json::to_string(&record)?;
        self.backend
            .set(&format!("{SESSION_KEY_PREFIX}{id}"), &encoded)
    }

    /// Remove a session record. Returns whether it existed. Re-electing the
    /// current-session pointer is the caller's responsibility.
    pub fn delete_session(&mut self, id: Uuid) -> Result<bool> {
        let existed = self.sessions.remove(&id).is_some();
        self.backend.remove(&format!("{SESSION_KEY_PREFIX}{id}"))?;
        Ok(existed)
    }

    /// The persisted current-session pointer
    pub fn current_session_id(&self) -> Option<Uuid> {
        self.current
    }

    /// Persist the pointer. Existence of the target is not validated here;
    /// callers own that. Last writer wins.
    pub fn set_current_session_id(&mut self, id: Option<Uuid>) -> Result<()> {
        self.current = id;
        match id {
            Some(id) => self.backend.set(CURRENT_SESSION_KEY, &id.to_string()),
            None => self.backend.remove(CURRENT_SESSION_KEY),
        }
    }
}

fn decode_record(raw: &str) -> Option<ChatSession> {
    let record: SessionRecord = serde_json::from_str(raw).ok()?;
    if record.version != SESSION_SCHEMA_VERSION {
        return None;
    }
    Some(record.session)
}
