use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub mod loader;

pub use loader::ConfigLoader;

use crate::error::{BurrowError, ErrorCode, Result};
use crate::rules::RuleMatcher;
use crate::session::CloneStrategy;

/// Directory for data burrow owns (workspaces, session records)
pub fn get_data_dir() -> PathBuf {
    ProjectDirs::from("dev", "burrow", "burrow")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from(".burrow"))
}

/// Default location of the YAML config file
pub fn get_config_path() -> Option<PathBuf> {
    ProjectDirs::from("dev", "burrow", "burrow").map(|dirs| dirs.config_dir().join("config.yaml"))
}

fn default_repos_dir() -> PathBuf {
    get_data_dir().join("repos")
}

fn default_store_path() -> PathBuf {
    get_data_dir().join("sessions.json")
}

fn default_max_recycled() -> usize {
    5
}

fn default_true() -> bool {
    true
}

fn default_branch() -> String {
    "main".to_string()
}

fn default_recycle_commands() -> Vec<String> {
    vec![
        "git fetch origin".to_string(),
        "git checkout {{ default_branch }}".to_string(),
        "git reset --hard origin/{{ default_branch }}".to_string(),
        "git clean -fdx".to_string(),
    ]
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Root under which every workspace and bare mirror is created
    #[serde(default = "default_repos_dir")]
    pub repos_dir: PathBuf,
    #[serde(default = "default_store_path")]
    pub store_path: PathBuf,
    #[serde(default)]
    pub clone_strategy: CloneStrategy,
    /// Recycled sessions kept per remote when no rule overrides it. 0 means unlimited.
    #[serde(default = "default_max_recycled")]
    pub max_recycled: usize,
    #[serde(default = "default_true")]
    pub auto_delete_corrupted: bool,
    /// Used when a workspace's default branch cannot be determined
    #[serde(default = "default_branch")]
    pub default_branch: String,
    #[serde(default)]
    pub commands: CommandSet,
    #[serde(default)]
    pub windows: Vec<WindowSpec>,
    #[serde(default)]
    pub rules: Vec<Rule>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandSet {
    #[serde(default)]
    pub spawn: Vec<String>,
    #[serde(default)]
    pub batch_spawn: Vec<String>,
    #[serde(default = "default_recycle_commands")]
    pub recycle: Vec<String>,
}

impl Default for CommandSet {
    fn default() -> Self {
        Self {
            spawn: Vec::new(),
            batch_spawn: Vec::new(),
            recycle: default_recycle_commands(),
        }
    }
}

/// A glob relative to the copy source directory
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct CopySpec(pub String);

impl CopySpec {
    pub fn pattern(&self) -> &str {
        &self.0
    }
}

impl From<&str> for CopySpec {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// An unrendered multiplexer window
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct WindowSpec {
    pub name: String,
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub dir: Option<String>,
    #[serde(default)]
    pub focus: bool,
}

/// Settings applied to every remote matching `pattern`
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Rule {
    /// Glob on the remote URL, `re:` prefix for a regex, empty for all remotes
    #[serde(default)]
    pub pattern: String,
    #[serde(default)]
    pub copy: Vec<CopySpec>,
    #[serde(default)]
    pub commands: Vec<String>,
    #[serde(default)]
    pub max_recycled: Option<usize>,
    #[serde(default)]
    pub clone_strategy: Option<CloneStrategy>,
    #[serde(default)]
    pub spawn: Option<Vec<String>>,
    #[serde(default)]
    pub batch_spawn: Option<Vec<String>>,
    #[serde(default)]
    pub windows: Option<Vec<WindowSpec>>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            repos_dir: default_repos_dir(),
            store_path: default_store_path(),
            clone_strategy: CloneStrategy::default(),
            max_recycled: default_max_recycled(),
            auto_delete_corrupted: true,
            default_branch: default_branch(),
            commands: CommandSet::default(),
            windows: Vec::new(),
            rules: Vec::new(),
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn merge_env_vars(&mut self) {
        if let Ok(dir) = std::env::var("BURROW_REPOS_DIR") {
            self.repos_dir = PathBuf::from(dir);
        }

        if let Ok(store) = std::env::var("BURROW_STORE") {
            self.store_path = PathBuf::from(store);
        }

        if let Ok(auto_delete) = std::env::var("BURROW_AUTO_DELETE_CORRUPTED") {
            if let Ok(value) = auto_delete.parse::<bool>() {
                self.auto_delete_corrupted = value;
            }
        }

        if let Ok(max) = std::env::var("BURROW_MAX_RECYCLED") {
            if let Ok(value) = max.parse::<usize>() {
                self.max_recycled = value;
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        RuleMatcher::new(&self.rules)?;

        let rule_windows = self.rules.iter().filter_map(|r| r.windows.as_ref()).flatten();
        if self
            .windows
            .iter()
            .chain(rule_windows)
            .any(|w| w.name.trim().is_empty())
        {
            return Err(BurrowError::config_with_code(
                ErrorCode::VALIDATION_REQUIRED_FIELD,
                "every window needs a name",
            ));
        }

        Ok(())
    }

    pub fn matcher(&self) -> Result<RuleMatcher> {
        RuleMatcher::new(&self.rules)
    }
}
