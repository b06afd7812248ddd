//! Session lifecycle engine
//!
//! Decides reuse versus fresh provisioning, drives the session state
//! machine, applies per-remote rules, spawns the agent environment, and
//! keeps recycled workspaces within quota.

mod builder;
mod cleanup;
pub mod copier;
pub mod hooks;
mod manager;
pub mod provision;
mod queries;
pub mod quota;
mod recycler;
pub mod spawner;

#[cfg(test)]
mod tests;

pub use builder::SessionManagerBuilder;
pub use manager::{CreateOptions, SessionManager};
pub use spawner::SpawnStrategy;
