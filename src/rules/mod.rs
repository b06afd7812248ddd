//! Matching remotes against configured rules.
//!
//! Two precedence modes coexist on purpose. Copy specs and hook commands are
//! collected from every matching rule in configuration order. Single-valued
//! settings (quota, clone strategy, spawn set, windows) come from the last
//! matching rule that sets them.

use crate::config::{CommandSet, CopySpec, Rule, WindowSpec};
use crate::error::{BurrowError, ErrorCode, Result};
use crate::session::CloneStrategy;

#[derive(Debug, Clone)]
pub enum RulePattern {
    Any,
    Glob(glob::Pattern),
    Regex(regex::Regex),
}

impl RulePattern {
    pub fn parse(pattern: &str) -> Result<Self> {
        let pattern = pattern.trim();
        if pattern.is_empty() {
            return Ok(Self::Any);
        }

        if let Some(expr) = pattern.strip_prefix("re:") {
            return regex::Regex::new(expr).map(Self::Regex).map_err(|e| {
                BurrowError::config_with_code(
                    ErrorCode::CONFIG_INVALID_PATTERN,
                    format!("invalid rule regex `{expr}`: {e}"),
                )
            });
        }

        glob::Pattern::new(pattern).map(Self::Glob).map_err(|e| {
            BurrowError::config_with_code(
                ErrorCode::CONFIG_INVALID_PATTERN,
                format!("invalid rule glob `{pattern}`: {e}"),
            )
        })
    }

    pub fn matches(&self, remote: &str) -> bool {
        match self {
            Self::Any => true,
            Self::Glob(pattern) => pattern.matches(remote),
            Self::Regex(regex) => regex.is_match(remote),
        }
    }
}

/// Resolved spawn configuration before template rendering
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpawnSpec {
    Commands(Vec<String>),
    Windows(Vec<WindowSpec>),
}

#[derive(Debug, Clone, Default)]
pub struct RuleMatcher {
    rules: Vec<(RulePattern, Rule)>,
}

impl RuleMatcher {
    pub fn new(rules: &[Rule]) -> Result<Self> {
        let rules = rules
            .iter()
            .map(|rule| Ok((RulePattern::parse(&rule.pattern)?, rule.clone())))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { rules })
    }

    /// Rules matching `remote`, in configuration order
    pub fn matching<'a>(&'a self, remote: &'a str) -> impl Iterator<Item = &'a Rule> + 'a {
        self.rules
            .iter()
            .filter(move |(pattern, _)| pattern.matches(remote))
            .map(|(_, rule)| rule)
    }

    fn last_set<'a, T>(
        &'a self,
        remote: &'a str,
        field: impl Fn(&'a Rule) -> Option<T>,
    ) -> Option<T> {
        self.matching(remote).filter_map(field).last()
    }

    pub fn copy_specs(&self, remote: &str) -> Vec<CopySpec> {
        self.matching(remote)
            .flat_map(|rule| rule.copy.iter().cloned())
            .collect()
    }

    pub fn hook_commands(&self, remote: &str) -> Vec<String> {
        self.matching(remote)
            .flat_map(|rule| rule.commands.iter().cloned())
            .collect()
    }

    pub fn max_recycled(&self, remote: &str, default: usize) -> usize {
        self.last_set(remote, |rule| rule.max_recycled)
            .unwrap_or(default)
    }

    pub fn clone_strategy(&self, remote: &str, default: CloneStrategy) -> CloneStrategy {
        self.last_set(remote, |rule| rule.clone_strategy)
            .unwrap_or(default)
    }

    /// The spawn set for `remote`, if any is configured.
    ///
    /// A matching rule that sets either commands (of the requested kind) or
    /// windows overrides the global settings. Globally, commands win over windows.
    pub fn spawn(
        &self,
        remote: &str,
        batch: bool,
        commands: &CommandSet,
        windows: &[WindowSpec],
    ) -> Option<SpawnSpec> {
        let from_rule = self.last_set(remote, |rule| {
            let set = if batch { &rule.batch_spawn } else { &rule.spawn };
            match (set, &rule.windows) {
                (Some(cmds), _) if !cmds.is_empty() => Some(SpawnSpec::Commands(cmds.clone())),
                (_, Some(wins)) if !wins.is_empty() => Some(SpawnSpec::Windows(wins.clone())),
                _ => None,
            }
        });
        if from_rule.is_some() {
            return from_rule;
        }

        let global = if batch {
            &commands.batch_spawn
        } else {
            &commands.spawn
        };
        if !global.is_empty() {
            Some(SpawnSpec::Commands(global.clone()))
        } else if !windows.is_empty() {
            Some(SpawnSpec::Windows(windows.to_vec()))
        } else {
            None
        }
    }

    /// Windows for `open`, ignoring command sets
    pub fn windows(&self, remote: &str, default: &[WindowSpec]) -> Vec<WindowSpec> {
        self.last_set(remote, |rule| rule.windows.clone().filter(|w| !w.is_empty()))
            .unwrap_or_else(|| default.to_vec())
    }
}

/// Host, owner, and repository parsed from a remote
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteInfo {
    pub host: String,
    pub owner: String,
    pub repo: String,
}

fn strip_git(name: &str) -> String {
    name.trim_end_matches('/')
        .trim_end_matches(".git")
        .to_string()
}

fn from_path(host: &str, path: &str) -> Option<RemoteInfo> {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    let repo = strip_git(segments.last()?);
    if repo.is_empty() {
        return None;
    }
    let owner = if segments.len() > 1 {
        segments[segments.len() - 2].to_string()
    } else {
        String::new()
    };
    Some(RemoteInfo {
        host: host.to_string(),
        owner,
        repo,
    })
}

/// Parse `https://`, `ssh://`, `file://`, scp-like (`git@host:owner/repo.git`)
/// and plain path remotes
pub fn parse_remote(remote: &str) -> Option<RemoteInfo> {
    let remote = remote.trim();
    if remote.is_empty() {
        return None;
    }

    if remote.contains("://") {
        let url = url::Url::parse(remote).ok()?;
        return from_path(url.host_str().unwrap_or_default(), url.path());
    }

    // scp-like syntax has a colon before the first slash
    if let Some((head, path)) = remote.split_once(':') {
        if !head.contains('/') && !head.is_empty() {
            let host = head.rsplit('@').next().unwrap_or(head);
            return from_path(host, path);
        }
    }

    from_path("", remote)
}

/// Repository name used in workspace directory names
pub fn repo_name(remote: &str) -> String {
    parse_remote(remote)
        .map(|info| info.repo)
        .filter(|repo| {
            !repo.is_empty()
                && repo
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        })
        .unwrap_or_else(|| "repo".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(pattern: &str) -> Rule {
        Rule {
            pattern: pattern.to_string(),
            ..Default::default()
        }
    }

    const ACME: &str = "git@github.com:acme/api.git";

    #[test]
    fn test_pattern_kinds() {
        assert!(RulePattern::parse("").unwrap().matches(ACME));
        assert!(RulePattern::parse("*acme/*").unwrap().matches(ACME));
        assert!(!RulePattern::parse("*gitlab*").unwrap().matches(ACME));
        assert!(RulePattern::parse(r"re:github\.com[:/]acme/")
            .unwrap()
            .matches(ACME));
        assert!(RulePattern::parse("re:[").is_err());
    }

    #[test]
    fn test_copy_and_hooks_collect_all_in_order() {
        let matcher = RuleMatcher::new(&[
            Rule {
                copy: vec![".env".into()],
                commands: vec!["first".to_string()],
                ..rule("")
            },
            Rule {
                commands: vec!["skipped".to_string()],
                ..rule("*gitlab*")
            },
            Rule {
                copy: vec!["secrets/*".into()],
                commands: vec!["second".to_string()],
                ..rule("*acme*")
            },
        ])
        .unwrap();

        assert_eq!(matcher.hook_commands(ACME), vec!["first", "second"]);
        assert_eq!(
            matcher.copy_specs(ACME),
            vec![CopySpec::from(".env"), CopySpec::from("secrets/*")]
        );
    }

    #[test]
    fn test_quota_last_match_wins() {
        let matcher = RuleMatcher::new(&[
            Rule {
                max_recycled: Some(1),
                ..rule("*acme*")
            },
            Rule {
                max_recycled: Some(3),
                ..rule("*github.com*")
            },
            rule("*api*"),
        ])
        .unwrap();

        assert_eq!(matcher.max_recycled(ACME, 5), 3);
        assert_eq!(matcher.max_recycled("https://example.com/x/y.git", 5), 5);
    }

    #[test]
    fn test_clone_strategy_override() {
        let matcher = RuleMatcher::new(&[Rule {
            clone_strategy: Some(CloneStrategy::Worktree),
            ..rule("*acme*")
        }])
        .unwrap();
        assert_eq!(
            matcher.clone_strategy(ACME, CloneStrategy::Full),
            CloneStrategy::Worktree
        );
        assert_eq!(
            matcher.clone_strategy("https://x.org/a/b", CloneStrategy::Full),
            CloneStrategy::Full
        );
    }

    #[test]
    fn test_spawn_resolution() {
        let global = CommandSet {
            spawn: vec!["global".to_string()],
            ..Default::default()
        };
        let editor = WindowSpec {
            name: "editor".to_string(),
            ..Default::default()
        };
        let matcher = RuleMatcher::new(&[Rule {
            windows: Some(vec![editor.clone()]),
            ..rule("*acme*")
        }])
        .unwrap();

        assert_eq!(
            matcher.spawn(ACME, false, &global, &[]),
            Some(SpawnSpec::Windows(vec![editor]))
        );
        assert_eq!(
            matcher.spawn("https://x.org/a/b", false, &global, &[]),
            Some(SpawnSpec::Commands(vec!["global".to_string()]))
        );
        assert_eq!(
            matcher.spawn("https://x.org/a/b", true, &global, &[]),
            None
        );
    }

    #[test]
    fn test_parse_remote_forms() {
        let expected = RemoteInfo {
            host: "github.com".to_string(),
            owner: "acme".to_string(),
            repo: "api".to_string(),
        };
        assert_eq!(parse_remote(ACME), Some(expected.clone()));
        assert_eq!(parse_remote("https://github.com/acme/api.git"), Some(expected.clone()));
        assert_eq!(parse_remote("ssh://git@github.com/acme/api"), Some(expected));

        let local = parse_remote("/srv/git/tools.git").unwrap();
        assert_eq!(local.repo, "tools");
        assert_eq!(local.owner, "git");
        assert_eq!(parse_remote(""), None);
    }

    #[test]
    fn test_repo_name_fallback() {
        assert_eq!(repo_name("https://github.com/acme/api.git"), "api");
        assert_eq!(repo_name("weird remote with spaces"), "repo");
    }
}
