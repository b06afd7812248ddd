//! Workspace session records and their state machine

pub mod events;
pub mod state;
pub mod storage;

pub use events::{BroadcastPublisher, EventPublisher, NoOpPublisher, SessionEvent, TracingPublisher};
pub use state::{CloneStrategy, SessionState};
pub use storage::{InMemoryStore, JsonFileStore, SessionStore};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

use crate::error::{BurrowError, Result};

/// Metadata key holding the worktree branch of a worktree session
pub const WORKTREE_BRANCH_KEY: &str = "worktree_branch";

/// Metadata key holding the multiplexer session name chosen at spawn time
pub const MUX_SESSION_KEY: &str = "mux_session";

const MAX_SLUG_LEN: usize = 48;

/// Stable identifier, assigned once and kept across recycle cycles
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Ten lowercase hex characters from a random UUID
    pub fn new() -> Self {
        let hex = Uuid::new_v4().simple().to_string();
        Self(hex[..10].to_string())
    }

    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Path-safe form of a display name: lowercase ASCII alphanumerics joined by
/// single dashes. May be empty.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    slug.truncate(MAX_SLUG_LEN);
    slug.trim_matches('-').to_string()
}

/// Slug for `name`, rejecting names that are empty or slugify to nothing
pub fn validate_name(name: &str) -> Result<String> {
    if name.trim().is_empty() {
        return Err(BurrowError::invalid_input("name", "name must not be empty"));
    }
    let slug = slugify(name);
    if slug.is_empty() {
        return Err(BurrowError::invalid_input(
            "name",
            format!("`{name}` has no characters usable in a slug"),
        ));
    }
    Ok(slug)
}

/// One provisioned workspace
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub name: String,
    pub slug: String,
    pub remote: String,
    /// Never changes once assigned, the directory is reused in place
    pub path: PathBuf,
    pub state: SessionState,
    #[serde(default)]
    pub clone_strategy: CloneStrategy,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    /// A new `Active` session. Fails when `name` has no usable slug.
    pub fn new(
        id: SessionId,
        name: &str,
        remote: impl Into<String>,
        path: PathBuf,
        clone_strategy: CloneStrategy,
    ) -> Result<Self> {
        let slug = validate_name(name)?;
        let now = Utc::now();
        Ok(Self {
            id,
            name: name.to_string(),
            slug,
            remote: remote.into(),
            path,
            state: SessionState::Active,
            clone_strategy,
            metadata: BTreeMap::new(),
            created_at: now,
            updated_at: now,
        })
    }

    fn transition(&mut self, next: SessionState) -> Result<()> {
        if !self.state.can_transition_to(next) {
            let expected = match next {
                SessionState::Recycled => "active",
                SessionState::Active => "recycled or corrupted",
                SessionState::Corrupted => "active or recycled",
            };
            return Err(BurrowError::invalid_state(
                self.id.as_str(),
                self.state,
                expected,
            ));
        }
        self.state = next;
        self.touch();
        Ok(())
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    pub fn mark_recycled(&mut self) -> Result<()> {
        self.transition(SessionState::Recycled)
    }

    /// Reuse a recycled workspace under a new name
    pub fn reactivate(&mut self, name: &str) -> Result<()> {
        if self.state != SessionState::Recycled {
            return Err(BurrowError::invalid_state(
                self.id.as_str(),
                self.state,
                "recycled",
            ));
        }
        let slug = validate_name(name)?;
        self.transition(SessionState::Active)?;
        self.name = name.to_string();
        self.slug = slug;
        Ok(())
    }

    pub fn mark_corrupted(&mut self) -> Result<()> {
        self.transition(SessionState::Corrupted)
    }

    /// Operator confirmed a corrupted workspace is usable again
    pub fn mark_repaired(&mut self) -> Result<()> {
        if self.state != SessionState::Corrupted {
            return Err(BurrowError::invalid_state(
                self.id.as_str(),
                self.state,
                "corrupted",
            ));
        }
        self.transition(SessionState::Active)
    }

    /// Changes name and slug only, never the path
    pub fn rename(&mut self, name: &str) -> Result<()> {
        let slug = validate_name(name)?;
        self.name = name.to_string();
        self.slug = slug;
        self.touch();
        Ok(())
    }

    pub fn worktree_branch(&self) -> Option<&str> {
        self.metadata.get(WORKTREE_BRANCH_KEY).map(String::as_str)
    }

    /// Multiplexer session name for the current slug. Slugs repeat across
    /// sessions, so the id is part of it.
    pub fn default_mux_session_name(&self) -> String {
        format!("{}-{}", self.slug, self.id)
    }

    /// Name of the multiplexer session; survives renames of the record
    pub fn mux_session_name(&self) -> String {
        self.metadata
            .get(MUX_SESSION_KEY)
            .cloned()
            .unwrap_or_else(|| self.default_mux_session_name())
    }
}
