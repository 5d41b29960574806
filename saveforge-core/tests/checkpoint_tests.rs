// Integration tests for the branch & checkpoint service against a real
// repository and save directory on disk.

use chrono::Utc;
use saveforge_core::checkpoint::CheckpointService;
use saveforge_core::detector::ChangeDetector;
use saveforge_core::error::Error;
use saveforge_core::hash;
use saveforge_core::metadata::{MetadataStore, SqliteMetadataStore};
use saveforge_core::models::GameEntry;
use saveforge_core::repository::RepositoryManager;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

struct Fixture {
    service: CheckpointService,
    save_dir: PathBuf,
    _repo_dir: TempDir,
    _save_root: TempDir,
}

fn fixture(game_id: i64, game_name: &str) -> Fixture {
    let repo_dir = TempDir::new().expect("repo dir");
    let save_root = TempDir::new().expect("save dir");
    let save_dir = save_root.path().join("saves");
    fs::create_dir_all(&save_dir).unwrap();

    let repo = Arc::new(RepositoryManager::open_or_create(repo_dir.path()).expect("init repo"));
    let meta = Arc::new(SqliteMetadataStore::in_memory().expect("metadata store"));

    meta.upsert_game(&GameEntry {
        game_id,
        name: game_name.to_string(),
        save_paths: vec![save_dir.clone()],
        enabled: true,
        created_at: Utc::now(),
    })
    .unwrap();

    Fixture {
        service: CheckpointService::new(repo, meta),
        save_dir,
        _repo_dir: repo_dir,
        _save_root: save_root,
    }
}

#[test]
fn test_first_checkpoint_creates_branch() {
    let fx = fixture(1, "Skyrim");
    fs::write(fx.save_dir.join("quicksave.sav"), b"dragonborn lvl 5").unwrap();

    let record = fx
        .service
        .create_checkpoint(1, "Main Quest - Dragonbane", "before the fight")
        .unwrap();

    assert_eq!(record.branch_name, "Skyrim-Main-Quest-Dragonbane");

    let history = fx.service.get_history(1).unwrap();
    assert_eq!(history.commits.len(), 1);
    assert_eq!(history.active_branch.as_deref(), Some("Skyrim-Main-Quest-Dragonbane"));
}

#[test]
fn test_second_checkpoint_switches_instead_of_duplicating() {
    let fx = fixture(1, "Skyrim");
    fs::write(fx.save_dir.join("quicksave.sav"), b"dragonborn lvl 5").unwrap();
    fx.service
        .create_checkpoint(1, "Main Quest - Dragonbane", "first")
        .unwrap();

    fs::write(fx.save_dir.join("quicksave.sav"), b"dragonborn lvl 6").unwrap();
    let second = fx
        .service
        .create_checkpoint(1, "Main Quest - Dragonbane", "second")
        .unwrap();

    assert_eq!(second.branch_name, "Skyrim-Main-Quest-Dragonbane");

    let history = fx.service.get_history(1).unwrap();
    // Two commits, still exactly one branch.
    assert_eq!(history.commits.len(), 2);
    assert_eq!(history.branches.len(), 1);
    assert_eq!(history.commits[0].message, "second");
}

#[test]
fn test_checkpoints_for_different_saves_fork_branches() {
    let fx = fixture(1, "Skyrim");
    fs::write(fx.save_dir.join("quicksave.sav"), b"main quest").unwrap();
    fx.service.create_checkpoint(1, "Main Quest", "m").unwrap();

    fs::write(fx.save_dir.join("quicksave.sav"), b"thieves guild").unwrap();
    fx.service.create_checkpoint(1, "Thieves Guild", "t").unwrap();

    let history = fx.service.get_history(1).unwrap();
    assert_eq!(history.branches.len(), 2);
    assert_eq!(history.active_branch.as_deref(), Some("Skyrim-Thieves-Guild"));
}

#[test]
fn test_restore_round_trip_reproduces_fingerprint() {
    let fx = fixture(1, "Skyrim");
    let save_file = fx.save_dir.join("quicksave.sav");

    fs::write(&save_file, b"state at checkpoint C").unwrap();
    let recorded = hash::fingerprint_file(&save_file).unwrap();
    let record = fx.service.create_checkpoint(1, "Main Quest", "C").unwrap();

    // Progress past the checkpoint, then restore.
    fs::write(&save_file, b"state after more play").unwrap();
    fx.service
        .restore_to_commit(1, &record.commit_ref, true)
        .unwrap();

    let restored = hash::fingerprint_file(&save_file).unwrap();
    assert_eq!(restored, recorded);
}

#[test]
fn test_restore_without_confirmation_is_rejected() {
    let fx = fixture(1, "Skyrim");
    let save_file = fx.save_dir.join("quicksave.sav");

    fs::write(&save_file, b"checkpointed").unwrap();
    let record = fx.service.create_checkpoint(1, "Main Quest", "C").unwrap();

    fs::write(&save_file, b"newer progress").unwrap();
    let err = fx
        .service
        .restore_to_commit(1, &record.commit_ref, false)
        .unwrap_err();

    assert!(matches!(err, Error::ConfirmationRequired));
    // Working state untouched.
    assert_eq!(fs::read(&save_file).unwrap(), b"newer progress");
}

#[test]
fn test_restore_unknown_commit() {
    let fx = fixture(1, "Skyrim");
    fs::write(fx.save_dir.join("quicksave.sav"), b"x").unwrap();
    fx.service.create_checkpoint(1, "Main Quest", "C").unwrap();

    let err = fx
        .service
        .restore_to_commit(1, "deadbeefdeadbeefdeadbeefdeadbeefdeadbeef", true)
        .unwrap_err();
    assert!(matches!(err, Error::CommitNotFound(_)));
}

#[test]
fn test_switch_to_missing_branch() {
    let fx = fixture(1, "Skyrim");
    let err = fx.service.switch_branch(1, "Skyrim-Nope").unwrap_err();
    assert!(matches!(err, Error::BranchNotFound(_)));
}

#[test]
fn test_switch_between_save_branches() {
    let fx = fixture(1, "Skyrim");
    fs::write(fx.save_dir.join("quicksave.sav"), b"a").unwrap();
    fx.service.create_checkpoint(1, "SaveA", "a").unwrap();
    fs::write(fx.save_dir.join("quicksave.sav"), b"b").unwrap();
    fx.service.create_checkpoint(1, "SaveB", "b").unwrap();

    fx.service.switch_branch(1, "Skyrim-SaveA").unwrap();

    let history = fx.service.get_history(1).unwrap();
    assert_eq!(history.active_branch.as_deref(), Some("Skyrim-SaveA"));
}

#[test]
fn test_switch_refuses_to_discard_dirty_tree() {
    let fx = fixture(1, "Skyrim");
    fs::write(fx.save_dir.join("quicksave.sav"), b"a").unwrap();
    fx.service.create_checkpoint(1, "SaveA", "a").unwrap();
    fx.service.create_checkpoint(1, "SaveB", "b").unwrap();

    // Scribble directly into the repository working tree.
    let stray = fx.service.repository().root().join("stray.sav");
    fs::write(&stray, b"uncommitted").unwrap();

    let err = fx.service.switch_branch(1, "Skyrim-SaveA").unwrap_err();
    assert!(matches!(err, Error::DirtyWorkingTree));
    assert!(stray.exists());
}

#[test]
fn test_create_branch_records_description() {
    let fx = fixture(1, "Skyrim");
    fs::write(fx.save_dir.join("quicksave.sav"), b"x").unwrap();

    let branch = fx
        .service
        .create_branch(1, "Hardcore Run", Some("no deaths allowed"))
        .unwrap();

    assert_eq!(branch.name, "Skyrim-Hardcore-Run");
    assert_eq!(branch.description.as_deref(), Some("no deaths allowed"));
    assert!(branch.is_active);
}

#[test]
fn test_checkpoint_active_falls_back_to_autosave() {
    let fx = fixture(1, "Skyrim");
    fs::write(fx.save_dir.join("quicksave.sav"), b"x").unwrap();

    let record = fx.service.checkpoint_active(1, "auto").unwrap();
    assert_eq!(record.branch_name, "Skyrim-autosave");

    // With a branch now active, the next auto checkpoint lands on it.
    fs::write(fx.save_dir.join("quicksave.sav"), b"y").unwrap();
    let second = fx.service.checkpoint_active(1, "auto 2").unwrap();
    assert_eq!(second.branch_name, "Skyrim-autosave");
}

#[test]
fn test_restore_then_detector_sees_recorded_state() {
    let fx = fixture(1, "Skyrim");
    let save_file = fx.save_dir.join("quicksave.sav");
    let detector = ChangeDetector::new();

    fs::write(&save_file, b"recorded").unwrap();
    let recorded = detector.prime(&save_file).unwrap();
    let record = fx.service.create_checkpoint(1, "Main Quest", "C").unwrap();

    fs::write(&save_file, b"drifted far away").unwrap();
    fx.service
        .restore_to_commit(1, &record.commit_ref, true)
        .unwrap();

    let fresh = detector.prime(&save_file).unwrap();
    assert_eq!(fresh, recorded);
}

#[test]
fn test_two_games_share_one_repository() {
    let repo_dir = TempDir::new().unwrap();
    let save_root = TempDir::new().unwrap();
    let repo = Arc::new(RepositoryManager::open_or_create(repo_dir.path()).unwrap());
    let meta = Arc::new(SqliteMetadataStore::in_memory().unwrap());

    for (id, name) in [(1, "Skyrim"), (2, "Factorio")] {
        let dir = save_root.path().join(name);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("slot.sav"), name.as_bytes()).unwrap();
        meta.upsert_game(&GameEntry {
            game_id: id,
            name: name.to_string(),
            save_paths: vec![dir],
            enabled: true,
            created_at: Utc::now(),
        })
        .unwrap();
    }

    let service: CheckpointService = CheckpointService::new(repo, meta.clone());
    service.create_checkpoint(1, "run", "skyrim run").unwrap();
    service.create_checkpoint(2, "base", "factorio base").unwrap();

    assert_eq!(service.get_history(1).unwrap().commits.len(), 1);
    assert_eq!(service.get_history(2).unwrap().commits.len(), 1);
    assert_eq!(
        service.get_history(1).unwrap().active_branch.as_deref(),
        Some("Skyrim-run")
    );
}
