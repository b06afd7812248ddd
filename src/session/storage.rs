//! Session record stores

use super::{CloneStrategy, Session, SessionId, SessionState};
use crate::error::{BurrowError, ErrorExt, Result};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;

/// Key-addressed persistence for session records
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// All records, oldest first
    async fn list(&self) -> Result<Vec<Session>>;

    /// Fails with `NotFound` for an unknown id
    async fn get(&self, id: &SessionId) -> Result<Session>;

    /// Insert or replace
    async fn save(&self, session: &Session) -> Result<()>;

    /// Fails with `NotFound` for an unknown id
    async fn delete(&self, id: &SessionId) -> Result<()>;

    /// Most recently updated recycled record for `remote` provisioned with `strategy`
    async fn find_recyclable(
        &self,
        remote: &str,
        strategy: CloneStrategy,
    ) -> Result<Option<Session>> {
        Ok(self
            .list()
            .await?
            .into_iter()
            .filter(|s| {
                s.state == SessionState::Recycled
                    && s.remote == remote
                    && s.clone_strategy == strategy
            })
            .max_by_key(|s| s.updated_at))
    }
}

fn sorted(records: &BTreeMap<SessionId, Session>) -> Vec<Session> {
    let mut sessions: Vec<Session> = records.values().cloned().collect();
    sessions.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
    sessions
}

/// All records in one JSON file, rewritten atomically on every change
pub struct JsonFileStore {
    path: PathBuf,
    // serializes read-modify-write cycles within this process
    lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_all(&self) -> Result<BTreeMap<SessionId, Session>> {
        if !fs::try_exists(&self.path).await.unwrap_or(false) {
            return Ok(BTreeMap::new());
        }

        let content = fs::read_to_string(&self.path)
            .await
            .to_store_error("Failed to read session store", Some(self.path.clone()))?;
        if content.trim().is_empty() {
            return Ok(BTreeMap::new());
        }

        let sessions: Vec<Session> = serde_json::from_str(&content)
            .to_store_error("Failed to parse session store", Some(self.path.clone()))?;
        Ok(sessions.into_iter().map(|s| (s.id.clone(), s)).collect())
    }

    async fn write_all(&self, records: &BTreeMap<SessionId, Session>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .await
                .to_store_error("Failed to create store directory", Some(parent.to_path_buf()))?;
        }

        let json = serde_json::to_string_pretty(&sorted(records))
            .to_store_error("Failed to serialize sessions", None)?;

        // Write to temp file then rename so readers never see a partial file
        let temp_path = self.path.with_extension("json.tmp");
        fs::write(&temp_path, json)
            .await
            .to_store_error("Failed to write session store", Some(temp_path.clone()))?;
        fs::rename(&temp_path, &self.path)
            .await
            .to_store_error("Failed to replace session store", Some(self.path.clone()))?;
        Ok(())
    }
}

#[async_trait]
impl SessionStore for JsonFileStore {
    async fn list(&self) -> Result<Vec<Session>> {
        let _guard = self.lock.lock().await;
        Ok(sorted(&self.read_all().await?))
    }

    async fn get(&self, id: &SessionId) -> Result<Session> {
        let _guard = self.lock.lock().await;
        self.read_all()
            .await?
            .remove(id)
            .ok_or_else(|| BurrowError::not_found(id.as_str()))
    }

    async fn save(&self, session: &Session) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut records = self.read_all().await?;
        records.insert(session.id.clone(), session.clone());
        self.write_all(&records).await
    }

    async fn delete(&self, id: &SessionId) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut records = self.read_all().await?;
        if records.remove(id).is_none() {
            return Err(BurrowError::not_found(id.as_str()));
        }
        self.write_all(&records).await
    }
}

/// Process-local store
#[derive(Default)]
pub struct InMemoryStore {
    sessions: Mutex<BTreeMap<SessionId, Session>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for InMemoryStore {
    async fn list(&self) -> Result<Vec<Session>> {
        Ok(sorted(&*self.sessions.lock().await))
    }

    async fn get(&self, id: &SessionId) -> Result<Session> {
        self.sessions
            .lock()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| BurrowError::not_found(id.as_str()))
    }

    async fn save(&self, session: &Session) -> Result<()> {
        self.sessions
            .lock()
            .await
            .insert(session.id.clone(), session.clone());
        Ok(())
    }

    async fn delete(&self, id: &SessionId) -> Result<()> {
        self.sessions
            .lock()
            .await
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| BurrowError::not_found(id.as_str()))
    }
}
