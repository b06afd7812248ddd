//! # Burrow
//!
//! Provisions, reuses, and retires isolated git workspaces for AI
//! coding-agent sessions.
//!
//! ## Usage
//!
//! ```bash
//! burrow new "Fix login bug" --remote git@github.com:acme/api.git --prompt "..."
//! burrow recycle <id>
//! burrow prune
//! ```
//!
//! ## Modules
//!
//! - `abstractions` - Trait-based abstractions for git and the terminal multiplexer
//! - `config` - YAML configuration, environment overrides, and validation
//! - `error` - Error types with stable numeric codes
//! - `lifecycle` - The session lifecycle engine: create, recycle, delete, prune
//! - `output` - Swappable output routing for subprocess chatter
//! - `rules` - Per-remote rule matching
//! - `session` - Session records, state machine, stores, and events
//! - `subprocess` - Unified subprocess abstraction layer for testing
//! - `template` - Rendering of configured command strings
pub mod abstractions;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod output;
pub mod rules;
pub mod session;
pub mod subprocess;
pub mod template;

pub use error::{BurrowError, ErrorCode, Result};
pub use lifecycle::{CreateOptions, SessionManager, SessionManagerBuilder};
