//! Session stores: the agent appends every message and persists once at
//! the end of a run.

use crate::error::SessionError;
use crate::types::Session;
use cairn_types::Message;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::{Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

/// Boxed future returned by [`SessionStore::persist`].
pub type StoreFuture<'a> = Pin<Box<dyn Future<Output = Result<(), SessionError>> + Send + 'a>>;

/// Where the agent records its transcript.
pub trait SessionStore: Send + Sync {
    /// Record one appended message.
    fn append(&self, message: &Message) -> Result<(), SessionError>;

    /// Flush everything recorded so far.
    fn persist(&self) -> StoreFuture<'_>;
}

fn lock(session: &Mutex<Session>) -> MutexGuard<'_, Session> {
    session.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Keeps the session in memory only.
#[derive(Debug)]
pub struct MemorySessionStore {
    session: Mutex<Session>,
}

impl MemorySessionStore {
    pub fn new(session: Session) -> Self {
        Self {
            session: Mutex::new(session),
        }
    }

    /// A copy of the session as recorded so far.
    pub fn snapshot(&self) -> Session {
        lock(&self.session).clone()
    }
}

impl SessionStore for MemorySessionStore {
    fn append(&self, message: &Message) -> Result<(), SessionError> {
        lock(&self.session).push(message.clone());
        Ok(())
    }

    fn persist(&self) -> StoreFuture<'_> {
        Box::pin(async { Ok(()) })
    }
}

/// Writes the session as `<sessions_dir>/<id>.json`.
#[derive(Debug)]
pub struct JsonFileSessionStore {
    sessions_dir: PathBuf,
    session: Mutex<Session>,
}

impl JsonFileSessionStore {
    /// Create a store under `config_dir/sessions`, ensuring the directory exists.
    pub async fn new(config_dir: &Path, session: Session) -> Result<Self, SessionError> {
        let sessions_dir = config_dir.join("sessions");
        tokio::fs::create_dir_all(&sessions_dir).await?;
        Ok(Self {
            sessions_dir,
            session: Mutex::new(session),
        })
    }

    pub fn session_id(&self) -> Uuid {
        lock(&self.session).id
    }

    pub fn path(&self) -> PathBuf {
        session_path(&self.sessions_dir, self.session_id())
    }

    /// Load a previously persisted session.
    pub async fn load(config_dir: &Path, id: Uuid) -> Result<Session, SessionError> {
        let path = session_path(&config_dir.join("sessions"), id);
        if !tokio::fs::try_exists(&path).await? {
            return Err(SessionError::NotFound { id });
        }
        let data = tokio::fs::read_to_string(&path).await?;
        Ok(serde_json::from_str(&data)?)
    }
}

fn session_path(sessions_dir: &Path, id: Uuid) -> PathBuf {
    sessions_dir.join(format!("{id}.json"))
}

impl SessionStore for JsonFileSessionStore {
    fn append(&self, message: &Message) -> Result<(), SessionError> {
        lock(&self.session).push(message.clone());
        Ok(())
    }

    /// Atomic write: `.tmp` then rename.
    fn persist(&self) -> StoreFuture<'_> {
        Box::pin(async move {
            let (path, json) = {
                let session = lock(&self.session);
                (
                    session_path(&self.sessions_dir, session.id),
                    serde_json::to_string_pretty(&*session)?,
                )
            };
            let tmp_path = path.with_extension("tmp");
            tokio::fs::write(&tmp_path, json).await?;
            tokio::fs::rename(&tmp_path, &path).await?;
            tracing::debug!("Session saved to {}", path.display());
            Ok(())
        })
    }
}
