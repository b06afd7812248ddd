use super::*;
use crate::abstractions::{GitCall, MockGitOperations, MockMultiplexer, MuxCall, Window};
use crate::config::{CommandSet, Config, CopySpec, Rule, WindowSpec};
use crate::error::{BurrowError, ErrorCode};
use crate::output::OutputSwitch;
use crate::session::{
    BroadcastPublisher, CloneStrategy, InMemoryStore, Session, SessionEvent, SessionId,
    SessionState, SessionStore, MUX_SESSION_KEY,
};
use crate::subprocess::MockProcessRunner;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

const REMOTE: &str = "git@github.com:acme/api.git";

struct Harness {
    manager: SessionManager,
    store: Arc<InMemoryStore>,
    git: MockGitOperations,
    mux: MockMultiplexer,
    runner: MockProcessRunner,
    events: broadcast::Receiver<SessionEvent>,
    root: TempDir,
}

impl Harness {
    fn new() -> Self {
        Self::with_config(|_| {})
    }

    fn with_config(customize: impl FnOnce(&mut Config)) -> Self {
        let root = TempDir::new().unwrap();
        let mut config = Config {
            repos_dir: root.path().join("repos"),
            store_path: root.path().join("sessions.json"),
            commands: CommandSet {
                spawn: vec!["agent {{ prompt | shq }}".to_string()],
                ..CommandSet::default()
            },
            ..Config::default()
        };
        customize(&mut config);

        let store = Arc::new(InMemoryStore::new());
        let git = MockGitOperations::new();
        let mux = MockMultiplexer::new();
        let runner = MockProcessRunner::permissive();
        let publisher = Arc::new(BroadcastPublisher::default());
        let events = publisher.subscribe();

        let manager = SessionManagerBuilder::new(config)
            .store(store.clone())
            .git(Arc::new(git.clone()))
            .multiplexer(Arc::new(mux.clone()))
            .runner(Arc::new(runner.clone()))
            .events(publisher)
            .output(OutputSwitch::discard())
            .build()
            .unwrap();

        Self {
            manager,
            store,
            git,
            mux,
            runner,
            events,
            root,
        }
    }

    async fn create(&self, name: &str) -> Session {
        self.manager
            .create_session(CreateOptions::new(name).with_remote(REMOTE), &token())
            .await
            .unwrap()
    }

    async fn create_worktree(&self, name: &str) -> Session {
        self.manager
            .create_session(
                CreateOptions::new(name)
                    .with_remote(REMOTE)
                    .with_strategy(CloneStrategy::Worktree),
                &token(),
            )
            .await
            .unwrap()
    }

    async fn state_of(&self, id: &SessionId) -> Option<SessionState> {
        self.store.get(id).await.ok().map(|s| s.state)
    }

    fn event_kinds(&mut self) -> Vec<&'static str> {
        let mut kinds = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            kinds.push(event.kind());
        }
        kinds
    }
}

fn token() -> CancellationToken {
    CancellationToken::new()
}

fn dir_name(path: &Path) -> String {
    path.file_name().unwrap().to_string_lossy().to_string()
}

#[tokio::test]
async fn test_create_provisions_fresh_clone() {
    let mut h = Harness::new();
    let session = h
        .manager
        .create_session(
            CreateOptions::new("Fix login").with_remote(REMOTE).with_prompt("fix it"),
            &token(),
        )
        .await
        .unwrap();

    assert_eq!(session.state, SessionState::Active);
    assert_eq!(session.clone_strategy, CloneStrategy::Full);
    assert!(session.path.starts_with(h.root.path().join("repos")));
    let name = dir_name(&session.path);
    assert!(name.starts_with("api-") && name.len() == "api-".len() + 6);
    assert!(!name.contains("fix-login"));
    let mux_name = format!("fix-login-{}", session.id);
    assert_eq!(session.metadata.get(MUX_SESSION_KEY), Some(&mux_name));

    assert_eq!(
        h.git.calls_for("clone"),
        vec![GitCall::Clone {
            remote: REMOTE.to_string(),
            dest: session.path.clone(),
        }]
    );
    assert_eq!(h.runner.shell_scripts(), vec!["agent 'fix it'"]);
    let history = h.runner.get_call_history();
    assert_eq!(history[0].working_dir.as_deref(), Some(session.path.as_path()));

    assert_eq!(h.store.get(&session.id).await.unwrap(), session);
    assert_eq!(h.event_kinds(), vec!["created"]);
}

#[tokio::test]
async fn test_recycle_keeps_clone_in_place() {
    let mut h = Harness::new();
    let session = h.create("First").await;
    h.runner.reset();

    let recycled = h.manager.recycle_session(&session.id, &token()).await.unwrap();

    assert_eq!(recycled.state, SessionState::Recycled);
    assert_eq!(recycled.path, session.path);
    assert!(session.path.exists());
    assert_eq!(
        h.runner.shell_scripts(),
        vec![
            "git fetch origin",
            "git checkout main",
            "git reset --hard origin/main",
            "git clean -fdx",
        ]
    );
    assert!(h.mux.calls().contains(&MuxCall::Kill {
        name: format!("first-{}", session.id)
    }));
    assert_eq!(h.event_kinds(), vec!["created", "recycled"]);
}

#[tokio::test]
async fn test_recycle_uses_fallback_branch() {
    let h = Harness::with_config(|c| c.default_branch = "trunk".to_string());
    let session = h.create("First").await;
    h.git.fail_on("default_branch");
    h.runner.reset();

    h.manager.recycle_session(&session.id, &token()).await.unwrap();
    assert!(h
        .runner
        .shell_scripts()
        .contains(&"git checkout trunk".to_string()));
}

#[tokio::test]
async fn test_create_reactivates_recycled_clone() {
    let h = Harness::new();
    let first = h.create("First task").await;
    h.manager.recycle_session(&first.id, &token()).await.unwrap();

    let second = h.create("Second task").await;

    assert_eq!(second.id, first.id);
    assert_eq!(second.path, first.path);
    assert_eq!(second.name, "Second task");
    assert_eq!(second.slug, "second-task");
    assert_eq!(second.state, SessionState::Active);
    assert_eq!(h.git.calls_for("clone").len(), 1);
    assert_eq!(h.git.calls_for("pull").len(), 1);
    assert_eq!(h.manager.list_sessions().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_path_survives_cycles_and_renames() {
    let h = Harness::new();
    let session = h.create("Task one").await;
    let path = session.path.clone();

    for name in ["Task two", "Task three"] {
        h.manager.recycle_session(&session.id, &token()).await.unwrap();
        let reused = h.create(name).await;
        assert_eq!(reused.path, path);
    }
    let renamed = h
        .manager
        .rename_session(&session.id, "Something else entirely")
        .await
        .unwrap();
    assert_eq!(renamed.path, path);
    assert!(!dir_name(&path).contains("something"));
}

#[tokio::test]
async fn test_worktree_create_and_reuse() {
    let h = Harness::new();
    let first = h.create_worktree("Feature A").await;

    let name = dir_name(&first.path);
    assert!(name.starts_with("api-wt-"));
    let branch = format!("burrow/feature-a-{}", first.id);
    assert_eq!(first.worktree_branch(), Some(branch.as_str()));
    assert_eq!(h.git.calls_for("clone_bare").len(), 1);
    assert!(h.git.calls_for("clone").is_empty());

    let recycled = h.manager.recycle_session(&first.id, &token()).await.unwrap();
    assert_eq!(recycled.state, SessionState::Recycled);
    assert!(!first.path.exists());
    assert!(matches!(
        h.git.calls_for("worktree_remove").as_slice(),
        [GitCall::WorktreeRemove { branch: b, .. }] if *b == branch
    ));

    let second = h.create_worktree("Feature B").await;
    assert_eq!(second.id, first.id);
    assert_eq!(second.path, first.path);
    assert!(second.path.exists());
    let new_branch = format!("burrow/feature-b-{}", first.id);
    assert_eq!(second.worktree_branch(), Some(new_branch.as_str()));
    // the mirror is only cloned once, later uses fetch it
    assert_eq!(h.git.calls_for("clone_bare").len(), 1);
    assert_eq!(h.git.calls_for("fetch").len(), 1);
}

#[tokio::test]
async fn test_strategy_mismatch_is_never_reused() {
    let h = Harness::new();
    let full = h.create("Full one").await;
    h.manager.recycle_session(&full.id, &token()).await.unwrap();

    let worktree = h.create_worktree("Worktree one").await;

    assert_ne!(worktree.id, full.id);
    assert_ne!(worktree.path, full.path);
    assert_eq!(h.state_of(&full.id).await, Some(SessionState::Recycled));
}

#[tokio::test]
async fn test_rule_sets_clone_strategy() {
    let h = Harness::with_config(|c| {
        c.rules.push(Rule {
            pattern: "*acme*".to_string(),
            clone_strategy: Some(CloneStrategy::Worktree),
            ..Default::default()
        })
    });
    let session = h.create("Ruled").await;
    assert_eq!(session.clone_strategy, CloneStrategy::Worktree);
}

#[tokio::test]
async fn test_invalid_candidate_falls_through_and_is_deleted() {
    let mut h = Harness::new();
    let old = h.create("Old").await;
    h.manager.recycle_session(&old.id, &token()).await.unwrap();
    h.git.mark_invalid(&old.path);
    h.event_kinds();

    let fresh = h.create("New").await;

    assert_ne!(fresh.id, old.id);
    assert_ne!(fresh.path, old.path);
    assert_eq!(h.state_of(&old.id).await, None);
    assert!(!old.path.exists());
    assert_eq!(h.event_kinds(), vec!["corrupted", "deleted", "created"]);
}

#[tokio::test]
async fn test_corrupted_candidate_kept_when_auto_delete_off() {
    let h = Harness::with_config(|c| c.auto_delete_corrupted = false);
    let old = h.create("Old").await;
    h.manager.recycle_session(&old.id, &token()).await.unwrap();
    h.git.fail_on("pull");

    let fresh = h.create("New").await;

    assert_ne!(fresh.id, old.id);
    assert_eq!(h.state_of(&old.id).await, Some(SessionState::Corrupted));
    assert!(old.path.exists());
}

#[tokio::test]
async fn test_recycle_invalid_clone_is_corrupted() {
    let h = Harness::new();
    let session = h.create("Broken").await;
    h.git.mark_invalid(&session.path);

    let err = h
        .manager
        .recycle_session(&session.id, &token())
        .await
        .unwrap_err();

    assert!(matches!(err, BurrowError::Corrupted { .. }));
    assert_eq!(h.state_of(&session.id).await, Some(SessionState::Corrupted));
}

#[tokio::test]
async fn test_recycle_requires_active() {
    let h = Harness::new();
    let session = h.create("Once").await;
    h.manager.recycle_session(&session.id, &token()).await.unwrap();

    let err = h
        .manager
        .recycle_session(&session.id, &token())
        .await
        .unwrap_err();
    assert!(matches!(err, BurrowError::InvalidState { .. }));

    let missing = h
        .manager
        .recycle_session(&SessionId::from("nope"), &token())
        .await
        .unwrap_err();
    assert!(missing.is_not_found());
}

#[tokio::test]
async fn test_quota_keeps_most_recent() {
    let h = Harness::with_config(|c| {
        c.rules.push(Rule {
            pattern: "*acme*".to_string(),
            max_recycled: Some(2),
            ..Default::default()
        })
    });
    let a = h.create("A").await;
    let b = h.create("B").await;
    let c = h.create("C").await;

    for session in [&a, &b, &c] {
        h.manager.recycle_session(&session.id, &token()).await.unwrap();
    }

    assert_eq!(h.state_of(&a.id).await, None);
    assert!(!a.path.exists());
    assert_eq!(h.state_of(&b.id).await, Some(SessionState::Recycled));
    assert_eq!(h.state_of(&c.id).await, Some(SessionState::Recycled));
}

#[tokio::test]
async fn test_prune() {
    let h = Harness::with_config(|c| c.auto_delete_corrupted = false);
    let sessions = [
        h.create("One").await,
        h.create("Two").await,
        h.create("Three").await,
        h.create("Four").await,
    ];
    for s in &sessions[..3] {
        h.manager.recycle_session(&s.id, &token()).await.unwrap();
    }
    h.git.mark_invalid(&sessions[0].path);
    // reuse of the newest recycled clone fails and marks it corrupted
    h.git.mark_invalid(&sessions[2].path);
    let fifth = h.create("Five").await;
    assert_eq!(h.state_of(&sessions[2].id).await, Some(SessionState::Corrupted));

    let removed = h.manager.prune(false, &token()).await.unwrap();
    assert_eq!(removed, 1);
    assert_eq!(h.state_of(&sessions[2].id).await, None);

    let removed = h.manager.prune(true, &token()).await.unwrap();
    assert_eq!(removed, 2);
    let remaining: Vec<SessionId> = h
        .manager
        .list_sessions()
        .await
        .unwrap()
        .into_iter()
        .map(|s| s.id)
        .collect();
    assert_eq!(remaining, vec![sessions[3].id.clone(), fifth.id]);
}

#[tokio::test]
async fn test_delete_failure_keeps_record() {
    let mut h = Harness::new();
    let path = h.root.path().join("repos").join("api-zzzzzz");
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    // a plain file where the workspace directory should be cannot be removed as a directory
    std::fs::write(&path, "not a directory").unwrap();
    let session = Session::new(
        SessionId::from("stuck"),
        "Stuck",
        REMOTE,
        path.clone(),
        CloneStrategy::Full,
    )
    .unwrap();
    h.store.save(&session).await.unwrap();

    let err = h
        .manager
        .delete_session(&session.id, &token())
        .await
        .unwrap_err();

    assert_eq!(err.code(), ErrorCode::OTHER_IO);
    assert_eq!(h.state_of(&session.id).await, Some(SessionState::Active));
    assert!(h.event_kinds().is_empty());
}

#[tokio::test]
async fn test_delete_removes_directory_and_record() {
    let mut h = Harness::new();
    let session = h.create("Doomed").await;

    h.manager.delete_session(&session.id, &token()).await.unwrap();

    assert!(!session.path.exists());
    assert_eq!(h.state_of(&session.id).await, None);
    assert_eq!(h.event_kinds(), vec!["created", "deleted"]);
}

#[tokio::test]
async fn test_rename() {
    let mut h = Harness::new();
    let session = h.create("Before").await;

    let renamed = h.manager.rename_session(&session.id, "After").await.unwrap();
    assert_eq!(renamed.slug, "after");
    assert_eq!(renamed.path, session.path);
    // the multiplexer session keeps the name it was started under
    assert_eq!(renamed.mux_session_name(), format!("before-{}", session.id));

    assert!(h.manager.rename_session(&session.id, "").await.is_err());
    assert!(h.manager.rename_session(&session.id, "***").await.is_err());

    let events: Vec<SessionEvent> = std::iter::from_fn(|| h.events.try_recv().ok()).collect();
    assert!(matches!(
        events.last(),
        Some(SessionEvent::Renamed { old_name, .. }) if old_name == "Before"
    ));
}

#[tokio::test]
async fn test_hook_failure_leaves_nothing_behind() {
    let mut h = Harness::with_config(|c| {
        c.rules.push(Rule {
            commands: vec!["make setup".to_string()],
            ..Default::default()
        })
    });
    h.runner
        .expect_shell("make setup")
        .returns_exit_code(2)
        .returns_stderr("no rule")
        .finish();

    let err = h
        .manager
        .create_session(CreateOptions::new("Hooked").with_remote(REMOTE), &token())
        .await
        .unwrap_err();

    assert_eq!(err.command_output(), Some("no rule\n"));
    assert!(h.manager.list_sessions().await.unwrap().is_empty());
    let repos = std::fs::read_dir(h.root.path().join("repos")).unwrap().count();
    assert_eq!(repos, 0);
    assert!(h.event_kinds().is_empty());
}

#[tokio::test]
async fn test_copies_then_hooks() {
    let h = Harness::with_config(|c| {
        c.rules.push(Rule {
            copy: vec![CopySpec::from(".env")],
            commands: vec!["cat .env".to_string()],
            ..Default::default()
        })
    });
    let source = TempDir::new().unwrap();
    std::fs::write(source.path().join(".env"), "TOKEN=1").unwrap();

    let session = h
        .manager
        .create_session(
            CreateOptions::new("Copy")
                .with_remote(REMOTE)
                .with_source_dir(source.path())
                .no_spawn(),
            &token(),
        )
        .await
        .unwrap();

    assert_eq!(
        std::fs::read_to_string(session.path.join(".env")).unwrap(),
        "TOKEN=1"
    );
    assert_eq!(h.runner.shell_scripts(), vec!["cat .env"]);
}

#[tokio::test]
async fn test_missing_spawn_strategy_is_config_error() {
    let h = Harness::with_config(|c| c.commands.spawn.clear());

    let err = h
        .manager
        .create_session(CreateOptions::new("Nothing").with_remote(REMOTE), &token())
        .await
        .unwrap_err();

    assert_eq!(err.code(), ErrorCode::CONFIG_NO_SPAWN_STRATEGY);
    assert!(h.git.calls().is_empty());

    // suppressing the spawn makes the same config usable
    h.manager
        .create_session(
            CreateOptions::new("Nothing").with_remote(REMOTE).no_spawn(),
            &token(),
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn test_batch_spawn_set() {
    let h = Harness::with_config(|c| c.commands.batch_spawn = vec!["batch {{ slug }}".to_string()]);
    h.manager
        .create_session(
            CreateOptions::new("Nightly").with_remote(REMOTE).batch(),
            &token(),
        )
        .await
        .unwrap();
    assert_eq!(h.runner.shell_scripts(), vec!["batch nightly"]);
}

#[tokio::test]
async fn test_window_spawn_uses_multiplexer() {
    let h = Harness::with_config(|c| {
        c.commands.spawn.clear();
        c.windows = vec![
            WindowSpec {
                name: "agent".to_string(),
                command: Some("claude {{ prompt | shq }}".to_string()),
                focus: true,
                ..Default::default()
            },
            WindowSpec {
                name: "shell".to_string(),
                ..Default::default()
            },
        ];
    });

    let session = h
        .manager
        .create_session(
            CreateOptions::new("Windows").with_remote(REMOTE).with_prompt("go"),
            &token(),
        )
        .await
        .unwrap();

    assert_eq!(
        h.mux.calls(),
        vec![MuxCall::Create {
            name: format!("windows-{}", session.id),
            dir: session.path.clone(),
            windows: vec![
                Window {
                    name: "agent".to_string(),
                    command: Some("claude go".to_string()),
                    dir: None,
                    focus: true,
                },
                Window {
                    name: "shell".to_string(),
                    ..Default::default()
                },
            ],
        }]
    );
    assert!(h.runner.shell_scripts().is_empty());
}

#[tokio::test]
async fn test_same_name_sessions_get_separate_mux_sessions() {
    let h = Harness::with_config(|c| {
        c.commands.spawn.clear();
        c.windows = vec![WindowSpec {
            name: "agent".to_string(),
            ..Default::default()
        }];
    });

    let first = h.create("Fix bug").await;
    let second = h.create("Fix bug").await;
    assert_eq!(first.slug, second.slug);
    assert_ne!(first.mux_session_name(), second.mux_session_name());

    h.manager.recycle_session(&first.id, &token()).await.unwrap();
    assert_eq!(h.mux.running(), vec![second.mux_session_name()]);
    assert!(h.mux.calls().contains(&MuxCall::Kill {
        name: first.mux_session_name()
    }));
}

#[tokio::test]
async fn test_failed_mirror_clone_is_not_reused() {
    let h = Harness::new();
    h.git.fail_on("clone_bare");
    let mirror = provision::mirror_path(&h.manager.config().repos_dir, REMOTE);

    for _ in 0..2 {
        let err = h
            .manager
            .create_session(
                CreateOptions::new("Tree")
                    .with_remote(REMOTE)
                    .with_strategy(CloneStrategy::Worktree),
                &token(),
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::GIT_GENERIC);
        assert!(!mirror.exists());
    }

    // the second attempt clones again instead of fetching into a broken mirror
    assert_eq!(h.git.calls_for("clone_bare").len(), 2);
    assert!(h.git.calls_for("fetch").is_empty());
    assert!(h.manager.list_sessions().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_spawn_failure_after_persist() {
    let mut h = Harness::new();
    h.runner.expect_shell("agent").returns_exit_code(1).finish();

    let err = h
        .manager
        .create_session(CreateOptions::new("Spawn").with_remote(REMOTE), &token())
        .await
        .unwrap_err();

    assert!(matches!(err, BurrowError::Execution { .. }));
    let sessions = h.manager.list_sessions().await.unwrap();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].state, SessionState::Active);
    assert_eq!(h.event_kinds(), vec!["created"]);
}

#[tokio::test]
async fn test_explicit_id() {
    let h = Harness::new();
    let recycled = h.create("Old").await;
    h.manager.recycle_session(&recycled.id, &token()).await.unwrap();

    let id = SessionId::from("chosen0001");
    let session = h
        .manager
        .create_session(
            CreateOptions::new("Mine").with_remote(REMOTE).with_id(id.clone()),
            &token(),
        )
        .await
        .unwrap();
    assert_eq!(session.id, id);
    assert_ne!(session.path, recycled.path);
    assert_eq!(h.state_of(&recycled.id).await, Some(SessionState::Recycled));

    let err = h
        .manager
        .create_session(
            CreateOptions::new("Again").with_remote(REMOTE).with_id(id),
            &token(),
        )
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::SESSION_ALREADY_EXISTS);
}

#[tokio::test]
async fn test_invalid_name_rejected_before_work() {
    let h = Harness::new();
    for name in ["", "   ", "!!!"] {
        let err = h
            .manager
            .create_session(CreateOptions::new(name).with_remote(REMOTE), &token())
            .await
            .unwrap_err();
        assert!(matches!(err, BurrowError::InvalidInput { .. }));
    }
    assert!(h.git.calls().is_empty());
}

#[tokio::test]
async fn test_remote_detection() {
    let h = Harness::new();
    let err = h
        .manager
        .create_session(CreateOptions::new("Detect").no_spawn(), &token())
        .await
        .unwrap_err();
    assert!(matches!(err, BurrowError::InvalidInput { ref field, .. } if field == "remote"));

    h.git.set_remote_url(REMOTE);
    let session = h
        .manager
        .create_session(CreateOptions::new("Detect").no_spawn(), &token())
        .await
        .unwrap();
    assert_eq!(session.remote, REMOTE);
}

#[tokio::test]
async fn test_cancelled_create_persists_nothing() {
    let h = Harness::new();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = h
        .manager
        .create_session(CreateOptions::new("Cancelled").with_remote(REMOTE), &cancel)
        .await
        .unwrap_err();

    assert!(err.is_cancelled());
    assert!(h.manager.list_sessions().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_create_with_setup_rolls_back() {
    let mut h = Harness::new();
    h.runner
        .expect_shell("./bootstrap")
        .returns_exit_code(1)
        .finish();

    let err = h
        .manager
        .create_with_setup(
            CreateOptions::new("Setup").with_remote(REMOTE),
            "./bootstrap {{ slug }}",
            &token(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, BurrowError::Execution { .. }));
    assert!(h.manager.list_sessions().await.unwrap().is_empty());
    assert_eq!(h.event_kinds(), vec!["created", "deleted"]);
    assert_eq!(h.runner.shell_scripts(), vec!["./bootstrap setup"]);
}

#[tokio::test]
async fn test_create_with_setup_spawns_after_setup() {
    let h = Harness::new();
    let session = h
        .manager
        .create_with_setup(
            CreateOptions::new("Setup").with_remote(REMOTE).with_prompt("p"),
            "./bootstrap",
            &token(),
        )
        .await
        .unwrap();

    assert_eq!(h.runner.shell_scripts(), vec!["./bootstrap", "agent p"]);
    assert_eq!(h.state_of(&session.id).await, Some(SessionState::Active));
}

#[tokio::test]
async fn test_open_session() {
    let h = Harness::new();
    let session = h.create("Open me").await;

    h.manager
        .open_session(&session.id, Some("logs"), &token())
        .await
        .unwrap();

    assert_eq!(
        h.mux.calls().last(),
        Some(&MuxCall::Open {
            name: format!("open-me-{}", session.id),
            windows: vec![Window {
                name: "main".to_string(),
                ..Default::default()
            }],
            target_window: Some("logs".to_string()),
        })
    );

    h.manager.recycle_session(&session.id, &token()).await.unwrap();
    let err = h
        .manager
        .open_session(&session.id, None, &token())
        .await
        .unwrap_err();
    assert!(matches!(err, BurrowError::InvalidState { .. }));
}
