//! Abstraction layers for external tools
//!
//! Trait-based access to git and the terminal multiplexer, with a real
//! implementation over the process runner and a fake for tests.

pub mod git;
pub mod multiplexer;

pub use git::{GitCall, GitCli, GitOperations, MockGitOperations};
pub use multiplexer::{MockMultiplexer, Multiplexer, MuxCall, Tmux, Window};
