//! In-memory conversation store with an optional JSON snapshot file.
//!
//! Sessions and messages live in memory behind a mutex. When a snapshot
//! path is configured the whole state is loaded on open and rewritten after
//! every mutation, so conversations survive restarts.
//!
//! The snapshot is serialized under the state lock and written on the
//! blocking pool. Each write carries the version of the state it captured,
//! and a write older than what is already on disk is skipped.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use corsie_application::{ConversationStore, PurgeReport, StoreError, StoreStats};
use corsie_domain::{Message, MessageMetadata, NewSession, Role, Session, SessionUpdate};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Debug, Default, Serialize, Deserialize)]
struct Snapshot {
    #[serde(default)]
    sessions: Vec<Session>,
    /// In append order
    #[serde(default)]
    messages: Vec<Message>,
}

/// Where the snapshot goes and which version of it is on disk.
struct SnapshotFile {
    path: PathBuf,
    /// Bumped under the state lock on every change
    version: Mutex<u64>,
    /// Highest version written; held for the duration of a write
    written: Arc<Mutex<u64>>,
}

/// A serialized state waiting to be written.
struct PendingWrite {
    path: PathBuf,
    version: u64,
    bytes: Vec<u8>,
    written: Arc<Mutex<u64>>,
}

impl PendingWrite {
    fn write(self) -> std::io::Result<()> {
        let mut written = self.written.lock().unwrap_or_else(|p| p.into_inner());
        if *written >= self.version {
            return Ok(());
        }
        write_snapshot(&self.path, &self.bytes)?;
        *written = self.version;
        Ok(())
    }
}

pub struct InMemoryConversationStore {
    state: Mutex<Snapshot>,
    snapshot: Option<SnapshotFile>,
}

impl InMemoryConversationStore {
    /// A store that forgets everything on exit.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(Snapshot::default()),
            snapshot: None,
        }
    }

    /// Open a store backed by a JSON snapshot, loading it if it exists.
    ///
    /// An unreadable or corrupt snapshot is an error rather than being
    /// silently replaced.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let snapshot = if path.exists() {
            let text = fs::read_to_string(&path)
                .map_err(|e| StoreError::Storage(format!("{}: {e}", path.display())))?;
            serde_json::from_str(&text)
                .map_err(|e| StoreError::Storage(format!("{}: {e}", path.display())))?
        } else {
            Snapshot::default()
        };
        debug!(
            path = %path.display(),
            sessions = snapshot.sessions.len(),
            messages = snapshot.messages.len(),
            "Opened conversation store"
        );
        Ok(Self {
            state: Mutex::new(snapshot),
            snapshot: Some(SnapshotFile {
                path,
                version: Mutex::new(0),
                written: Arc::new(Mutex::new(0)),
            }),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Snapshot> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Apply `change` under the state lock, then save the snapshot if the
    /// change reports that it modified anything.
    async fn mutate<T>(
        &self,
        change: impl FnOnce(&mut Snapshot) -> Result<(T, bool), StoreError>,
    ) -> Result<T, StoreError> {
        let (value, pending) = {
            let mut state = self.lock();
            let (value, changed) = change(&mut *state)?;
            let pending = if changed { self.capture(&state) } else { None };
            (value, pending)
        };
        if let Some(pending) = pending {
            self.flush(pending).await;
        }
        Ok(value)
    }

    /// Serialize the state. Must be called with the state lock held so
    /// versions follow mutation order.
    fn capture(&self, state: &Snapshot) -> Option<PendingWrite> {
        let file = self.snapshot.as_ref()?;
        let bytes = match serde_json::to_vec_pretty(state) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(error = %e, "Failed to serialize conversation snapshot");
                return None;
            }
        };
        let mut version = file.version.lock().unwrap_or_else(|p| p.into_inner());
        *version += 1;
        Some(PendingWrite {
            path: file.path.clone(),
            version: *version,
            bytes,
            written: file.written.clone(),
        })
    }

    async fn flush(&self, pending: PendingWrite) {
        let path = pending.path.clone();
        let result = tokio::task::spawn_blocking(move || pending.write()).await;
        match result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!(path = %path.display(), error = %e, "Failed to write conversation snapshot");
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Snapshot writer stopped");
            }
        }
    }
}

impl Default for InMemoryConversationStore {
    fn default() -> Self {
        Self::new()
    }
}

fn write_snapshot(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)
}

fn new_id() -> String {
    Uuid::new_v4().to_string()
}

#[async_trait]
impl ConversationStore for InMemoryConversationStore {
    async fn create_session(&self, new: NewSession) -> Result<Session, StoreError> {
        self.mutate(|state| {
            let now = Utc::now();
            let session = Session {
                id: new_id(),
                title: new.title,
                created_at: now,
                updated_at: now,
                model: new.model,
                system_prompt: new.system_prompt,
            };
            state.sessions.push(session.clone());
            Ok((session, true))
        })
        .await
    }

    async fn get_session(&self, id: &str) -> Result<Option<Session>, StoreError> {
        Ok(self.lock().sessions.iter().find(|s| s.id == id).cloned())
    }

    async fn list_sessions(
        &self,
        limit: Option<usize>,
        offset: usize,
    ) -> Result<Vec<Session>, StoreError> {
        let mut sessions = self.lock().sessions.clone();
        sessions.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(sessions
            .into_iter()
            .skip(offset)
            .take(limit.unwrap_or(usize::MAX))
            .collect())
    }

    async fn update_session(
        &self,
        id: &str,
        update: SessionUpdate,
    ) -> Result<Session, StoreError> {
        self.mutate(|state| {
            let session = state
                .sessions
                .iter_mut()
                .find(|s| s.id == id)
                .ok_or_else(|| StoreError::SessionNotFound(id.to_string()))?;
            update.apply_to(session, Utc::now());
            Ok((session.clone(), true))
        })
        .await
    }

    async fn delete_session(&self, id: &str) -> Result<bool, StoreError> {
        self.mutate(|state| {
            let before = state.sessions.len();
            state.sessions.retain(|s| s.id != id);
            let deleted = state.sessions.len() != before;
            if deleted {
                state.messages.retain(|m| m.session_id != id);
            }
            Ok((deleted, deleted))
        })
        .await
    }

    async fn append_message(
        &self,
        session_id: &str,
        role: Role,
        content: &str,
        metadata: MessageMetadata,
    ) -> Result<Message, StoreError> {
        self.mutate(|state| {
            let now = Utc::now();
            let session = state
                .sessions
                .iter_mut()
                .find(|s| s.id == session_id)
                .ok_or_else(|| StoreError::SessionNotFound(session_id.to_string()))?;
            session.updated_at = now;

            let message = Message {
                id: new_id(),
                session_id: session_id.to_string(),
                role,
                content: content.to_string(),
                timestamp: now,
                metadata,
            };
            state.messages.push(message.clone());
            Ok((message, true))
        })
        .await
    }

    async fn list_messages(
        &self,
        session_id: &str,
        limit: Option<usize>,
        offset: usize,
    ) -> Result<Vec<Message>, StoreError> {
        Ok(self
            .lock()
            .messages
            .iter()
            .filter(|m| m.session_id == session_id)
            .skip(offset)
            .take(limit.unwrap_or(usize::MAX))
            .cloned()
            .collect())
    }

    async fn update_message(
        &self,
        id: &str,
        content: &str,
        metadata: Option<MessageMetadata>,
    ) -> Result<(), StoreError> {
        self.mutate(|state| {
            let message = state
                .messages
                .iter_mut()
                .find(|m| m.id == id)
                .ok_or_else(|| StoreError::MessageNotFound(id.to_string()))?;
            message.content = content.to_string();
            if let Some(metadata) = metadata {
                message.metadata = metadata;
            }
            Ok(((), true))
        })
        .await
    }

    async fn delete_message(&self, id: &str) -> Result<bool, StoreError> {
        self.mutate(|state| {
            let before = state.messages.len();
            state.messages.retain(|m| m.id != id);
            let deleted = state.messages.len() != before;
            Ok((deleted, deleted))
        })
        .await
    }

    async fn count_messages(&self, session_id: &str) -> Result<usize, StoreError> {
        Ok(self
            .lock()
            .messages
            .iter()
            .filter(|m| m.session_id == session_id)
            .count())
    }

    async fn purge_before(&self, cutoff: DateTime<Utc>) -> Result<PurgeReport, StoreError> {
        self.mutate(|state| {
            let messages_before = state.messages.len();
            state.messages.retain(|m| m.timestamp >= cutoff);
            let messages_deleted = messages_before - state.messages.len();

            let Snapshot { sessions, messages } = state;
            let sessions_before = sessions.len();
            sessions.retain(|s| {
                s.updated_at >= cutoff || messages.iter().any(|m| m.session_id == s.id)
            });
            let sessions_deleted = sessions_before - sessions.len();

            let report = PurgeReport {
                sessions_deleted,
                messages_deleted,
            };
            Ok((report, messages_deleted > 0 || sessions_deleted > 0))
        })
        .await
    }

    async fn stats(&self) -> Result<StoreStats, StoreError> {
        let state = self.lock();
        Ok(StoreStats {
            total_sessions: state.sessions.len(),
            total_messages: state.messages.len(),
            first_session_at: state.sessions.iter().map(|s| s.created_at).min(),
        })
    }
}
