use crate::api::{create_router, AppState};
use crate::config::DaemonConfig;
use crate::monitor::{run_watch_probe, SaveMonitor};
use crate::orchestrator::{EngineEvent, EventOrchestrator};
use crate::watcher::spawn_watcher;
use chrono::Utc;
use saveforge_core::checkpoint::CheckpointService;
use saveforge_core::detector::ChangeDetector;
use saveforge_core::error::Result;
use saveforge_core::metadata::{MetadataStore, SqliteMetadataStore};
use saveforge_core::models::{Branch, CommitRecord, GameEntry, SaveHistory};
use saveforge_core::repository::RepositoryManager;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// The running engine: versioning service plus monitoring plumbing.
/// One instance per daemon; commands arrive over the HTTP API.
pub struct VersioningEngine {
    service: Arc<CheckpointService>,
    meta: Arc<dyn MetadataStore>,
    monitor: Arc<SaveMonitor>,
    orchestrator: Arc<EventOrchestrator>,
}

impl VersioningEngine {
    pub fn watch_backend(&self) -> &'static str {
        self.monitor.backend_name()
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<EngineEvent> {
        self.orchestrator.subscribe()
    }

    /// Register a game and start watching its save paths.
    pub async fn enable_versioning(
        &self,
        game_id: i64,
        name: String,
        save_paths: Vec<PathBuf>,
    ) -> Result<()> {
        self.meta.upsert_game(&GameEntry {
            game_id,
            name,
            save_paths: save_paths.clone(),
            enabled: true,
            created_at: Utc::now(),
        })?;
        self.monitor.start_monitoring_game(game_id, &save_paths)?;
        self.orchestrator
            .emit(EngineEvent::MonitoringStarted { game_id });
        Ok(())
    }

    /// Stop watching a game. In-flight checkpoints run to completion; new
    /// events for the game are fenced out immediately.
    pub async fn disable_versioning(&self, game_id: i64) -> Result<()> {
        let mut game = self.meta.get_game(game_id)?;
        game.enabled = false;
        self.meta.upsert_game(&game)?;

        self.monitor.stop_monitoring_game(game_id);
        self.orchestrator.forget_game(game_id);
        self.orchestrator
            .emit(EngineEvent::MonitoringStopped { game_id });
        Ok(())
    }

    pub async fn create_checkpoint(
        &self,
        game_id: i64,
        save_name: Option<String>,
        message: Option<String>,
    ) -> Result<CommitRecord> {
        let service = self.service.clone();
        let message =
            message.unwrap_or_else(|| format!("Manual checkpoint {}", Utc::now().to_rfc3339()));
        run_blocking(move || match save_name {
            Some(save_name) => service.create_checkpoint(game_id, &save_name, &message),
            None => service.checkpoint_active(game_id, &message),
        })
        .await
    }

    pub async fn create_branch(
        &self,
        game_id: i64,
        branch_name: String,
        description: Option<String>,
    ) -> Result<Branch> {
        let service = self.service.clone();
        run_blocking(move || {
            service.create_branch(game_id, &branch_name, description.as_deref())
        })
        .await
    }

    pub async fn switch_branch(&self, game_id: i64, branch_name: String) -> Result<()> {
        let service = self.service.clone();
        run_blocking(move || service.switch_branch(game_id, &branch_name)).await
    }

    pub async fn restore_to_commit(
        &self,
        game_id: i64,
        commit: String,
        confirmed: bool,
    ) -> Result<String> {
        let service = self.service.clone();
        run_blocking(move || service.restore_to_commit(game_id, &commit, confirmed)).await
    }

    pub async fn get_history(&self, game_id: i64) -> Result<SaveHistory> {
        let service = self.service.clone();
        run_blocking(move || service.get_history(game_id)).await
    }
}

async fn run_blocking<T: Send + 'static>(
    f: impl FnOnce() -> Result<T> + Send + 'static,
) -> Result<T> {
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| saveforge_core::Error::InvalidOperation(format!("task failed: {}", e)))?
}

pub struct SaveforgeServer {
    engine: Arc<VersioningEngine>,
}

impl SaveforgeServer {
    /// Wire up the engine: repository, metadata store, detector, watcher,
    /// orchestrator. Must run inside a tokio runtime; monitoring for games
    /// already enabled in the metadata store resumes immediately.
    pub fn new(repo_path: PathBuf, db_path: PathBuf, config: DaemonConfig) -> anyhow::Result<Self> {
        let repo = Arc::new(RepositoryManager::open_or_create(&repo_path)?);
        let meta: Arc<dyn MetadataStore> = Arc::new(SqliteMetadataStore::new(&db_path)?);
        let service = Arc::new(
            CheckpointService::new(repo, meta.clone()).with_op_deadline(config.op_deadline()),
        );
        let detector = Arc::new(ChangeDetector::new());

        let (tx, rx) = mpsc::channel(256);
        let monitor = Arc::new(SaveMonitor::new(spawn_watcher(tx)?));
        info!("File watching via {} backend", monitor.backend_name());

        let orchestrator =
            EventOrchestrator::new(service.clone(), detector, monitor.clone(), config);

        for game in meta.all_games()? {
            if game.enabled {
                if let Err(e) = monitor.start_monitoring_game(game.game_id, &game.save_paths) {
                    warn!("Could not resume monitoring game {}: {}", game.game_id, e);
                }
            }
        }

        tokio::spawn(Arc::clone(&orchestrator).run(rx));
        tokio::spawn(run_watch_probe(Arc::clone(&monitor)));

        let engine = Arc::new(VersioningEngine {
            service,
            meta,
            monitor,
            orchestrator,
        });

        Ok(Self { engine })
    }

    pub fn engine(&self) -> Arc<VersioningEngine> {
        Arc::clone(&self.engine)
    }

    pub async fn serve(self, addr: SocketAddr) -> anyhow::Result<()> {
        let state = AppState {
            engine: self.engine,
        };
        let app = create_router(state);

        info!("Server listening on {}", addr);
        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, app).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_server_creation() {
        let repo_dir = TempDir::new().unwrap();
        let db_dir = TempDir::new().unwrap();

        let server = SaveforgeServer::new(
            repo_dir.path().join("repo"),
            db_dir.path().join("saveforge.db"),
            DaemonConfig::default(),
        );
        assert!(server.is_ok());
    }

    #[tokio::test]
    async fn test_enable_then_checkpoint_through_engine() {
        let repo_dir = TempDir::new().unwrap();
        let db_dir = TempDir::new().unwrap();
        let saves = TempDir::new().unwrap();
        std::fs::write(saves.path().join("slot1.sav"), b"hello").unwrap();

        let server = SaveforgeServer::new(
            repo_dir.path().join("repo"),
            db_dir.path().join("saveforge.db"),
            DaemonConfig::default(),
        )
        .unwrap();
        let engine = server.engine();

        engine
            .enable_versioning(1, "Skyrim".into(), vec![saves.path().to_path_buf()])
            .await
            .unwrap();

        let record = engine
            .create_checkpoint(1, Some("Main Quest".into()), Some("first".into()))
            .await
            .unwrap();
        assert_eq!(record.branch_name, "Skyrim-Main-Quest");

        let history = engine.get_history(1).await.unwrap();
        assert_eq!(history.commits.len(), 1);

        engine.disable_versioning(1).await.unwrap();
    }

    #[tokio::test]
    async fn test_restore_requires_confirmation_via_engine() {
        let repo_dir = TempDir::new().unwrap();
        let db_dir = TempDir::new().unwrap();
        let saves = TempDir::new().unwrap();
        std::fs::write(saves.path().join("slot1.sav"), b"hello").unwrap();

        let server = SaveforgeServer::new(
            repo_dir.path().join("repo"),
            db_dir.path().join("saveforge.db"),
            DaemonConfig::default(),
        )
        .unwrap();
        let engine = server.engine();

        engine
            .enable_versioning(1, "Skyrim".into(), vec![saves.path().to_path_buf()])
            .await
            .unwrap();
        let record = engine
            .create_checkpoint(1, Some("Main Quest".into()), None)
            .await
            .unwrap();

        let err = engine
            .restore_to_commit(1, record.commit_ref, false)
            .await
            .unwrap_err();
        assert!(matches!(err, saveforge_core::Error::ConfirmationRequired));
    }
}
