use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Lifecycle state of a workspace.
///
/// ```text
/// Active -> Recycled -> Active
/// Active | Recycled -> Corrupted -> Active (manual repair)
/// ```
///
/// Deletion is possible from every state and is not represented here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Active,
    Recycled,
    Corrupted,
}

impl SessionState {
    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Active, Recycled) | (Recycled, Active) | (Active | Recycled, Corrupted) | (Corrupted, Active)
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Active => "active",
            SessionState::Recycled => "recycled",
            SessionState::Corrupted => "corrupted",
        };
        f.write_str(name)
    }
}

/// How a workspace is provisioned. Fixed for the lifetime of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CloneStrategy {
    #[default]
    Full,
    Worktree,
}

impl fmt::Display for CloneStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloneStrategy::Full => f.write_str("full"),
            CloneStrategy::Worktree => f.write_str("worktree"),
        }
    }
}

impl std::str::FromStr for CloneStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            // records written before strategies existed carry an empty value
            "" | "full" => Ok(CloneStrategy::Full),
            "worktree" => Ok(CloneStrategy::Worktree),
            other => Err(format!("unknown clone strategy `{other}`")),
        }
    }
}

impl<'de> Deserialize<'de> for CloneStrategy {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        raw.as_deref()
            .unwrap_or_default()
            .parse()
            .map_err(serde::de::Error::custom)
    }
}
