//! Max-recycled-per-remote enforcement

use std::collections::BTreeMap;

use crate::rules::RuleMatcher;
use crate::session::{Session, SessionState};

/// Recycled sessions grouped by remote
pub fn recycled_by_remote(sessions: Vec<Session>) -> BTreeMap<String, Vec<Session>> {
    let mut groups: BTreeMap<String, Vec<Session>> = BTreeMap::new();
    for session in sessions
        .into_iter()
        .filter(|s| s.state == SessionState::Recycled)
    {
        groups.entry(session.remote.clone()).or_default().push(session);
    }
    groups
}

/// The records beyond `limit` once `group` is ordered newest first.
/// A limit of 0 means unlimited.
pub fn excess(mut group: Vec<Session>, limit: usize) -> Vec<Session> {
    if limit == 0 || group.len() <= limit {
        return Vec::new();
    }
    group.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
    group.split_off(limit)
}

/// Every recycled record that quota enforcement would delete, for all remotes
/// or only `remote` when given
pub fn select_evictions(
    sessions: Vec<Session>,
    matcher: &RuleMatcher,
    default_limit: usize,
    remote: Option<&str>,
) -> Vec<Session> {
    recycled_by_remote(sessions)
        .into_iter()
        .filter(|(r, _)| remote.map_or(true, |wanted| wanted == r))
        .flat_map(|(r, group)| {
            let limit = matcher.max_recycled(&r, default_limit);
            let evicted = excess(group, limit);
            if !evicted.is_empty() {
                tracing::debug!(
                    "Remote {} over recycled quota {} by {}",
                    r,
                    limit,
                    evicted.len()
                );
            }
            evicted
        })
        .collect()
}
