use crate::error::{Error, Result};
use crate::models::{Branch, CommitRecord, GameEntry};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

const SCHEMA_VERSION: i32 = 1;

/// Narrow persistence interface for branch/commit/game associations.
///
/// The engine only reads and writes through this trait; the store itself
/// is an external collaborator.
pub trait MetadataStore: Send + Sync {
    fn upsert_game(&self, game: &GameEntry) -> Result<()>;
    fn get_game(&self, game_id: i64) -> Result<GameEntry>;
    fn upsert_branch(
        &self,
        game_id: i64,
        branch_name: &str,
        description: Option<&str>,
        active: bool,
    ) -> Result<()>;
    fn record_commit(
        &self,
        branch_name: &str,
        commit_ref: &str,
        message: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<()>;
    fn get_active_branch(&self, game_id: i64) -> Result<Option<Branch>>;
    fn branches_for_game(&self, game_id: i64) -> Result<Vec<Branch>>;
    fn commits_for_game(&self, game_id: i64) -> Result<Vec<CommitRecord>>;
    fn all_games(&self) -> Result<Vec<GameEntry>>;
}

pub struct SqliteMetadataStore {
    conn: Mutex<Connection>,
}

impl SqliteMetadataStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = Connection::open(db_path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.initialize()?;
        Ok(store)
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.initialize()?;
        Ok(store)
    }

    fn initialize(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER PRIMARY KEY
            );

            CREATE TABLE IF NOT EXISTS games (
                game_id INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                save_paths TEXT NOT NULL,
                enabled INTEGER NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS branches (
                name TEXT PRIMARY KEY,
                game_id INTEGER NOT NULL,
                description TEXT,
                is_active INTEGER NOT NULL DEFAULT 0,
                last_commit TEXT,
                created_at TEXT NOT NULL,
                FOREIGN KEY (game_id) REFERENCES games(game_id)
            );

            CREATE TABLE IF NOT EXISTS commits (
                commit_ref TEXT PRIMARY KEY,
                branch_name TEXT NOT NULL,
                message TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                FOREIGN KEY (branch_name) REFERENCES branches(name)
            );

            CREATE INDEX IF NOT EXISTS idx_branches_game ON branches(game_id);
            CREATE INDEX IF NOT EXISTS idx_commits_branch ON commits(branch_name);
            CREATE INDEX IF NOT EXISTS idx_commits_timestamp ON commits(timestamp);
            "#,
        )?;

        let version: Option<i32> = conn
            .query_row("SELECT version FROM schema_version", [], |row| row.get(0))
            .optional()?;

        if version.is_none() {
            conn.execute(
                "INSERT INTO schema_version (version) VALUES (?1)",
                params![SCHEMA_VERSION],
            )?;
        }

        Ok(())
    }

    fn game_from_row(row: &Row) -> rusqlite::Result<GameEntry> {
        let save_paths: String = row.get(2)?;
        let created_at: String = row.get(4)?;
        let paths: Vec<String> = serde_json::from_str(&save_paths).unwrap_or_default();

        Ok(GameEntry {
            game_id: row.get(0)?,
            name: row.get(1)?,
            save_paths: paths.into_iter().map(PathBuf::from).collect(),
            enabled: row.get::<_, i32>(3)? != 0,
            created_at: parse_time(&created_at),
        })
    }

    fn branch_from_row(row: &Row) -> rusqlite::Result<Branch> {
        let created_at: String = row.get(5)?;
        Ok(Branch {
            name: row.get(0)?,
            game_id: row.get(1)?,
            description: row.get(2)?,
            is_active: row.get::<_, i32>(3)? != 0,
            last_commit: row.get(4)?,
            created_at: parse_time(&created_at),
        })
    }

    fn commit_from_row(row: &Row) -> rusqlite::Result<CommitRecord> {
        let timestamp: String = row.get(3)?;
        Ok(CommitRecord {
            commit_ref: row.get(0)?,
            branch_name: row.get(1)?,
            message: row.get(2)?,
            timestamp: parse_time(&timestamp),
        })
    }
}

fn parse_time(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(Into::into)
        .unwrap_or_else(|_| Utc::now())
}

impl MetadataStore for SqliteMetadataStore {
    fn upsert_game(&self, game: &GameEntry) -> Result<()> {
        let save_paths = serde_json::to_string(
            &game
                .save_paths
                .iter()
                .map(|p| p.to_string_lossy().to_string())
                .collect::<Vec<_>>(),
        )?;

        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO games (game_id, name, save_paths, enabled, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(game_id) DO UPDATE SET
                 name = excluded.name,
                 save_paths = excluded.save_paths,
                 enabled = excluded.enabled",
            params![
                game.game_id,
                game.name,
                save_paths,
                game.enabled as i32,
                game.created_at.to_rfc3339(),
            ],
        )?;

        Ok(())
    }

    fn get_game(&self, game_id: i64) -> Result<GameEntry> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT game_id, name, save_paths, enabled, created_at FROM games WHERE game_id = ?1",
            params![game_id],
            Self::game_from_row,
        )
        .map_err(|_| Error::GameNotFound(game_id))
    }

    fn upsert_branch(
        &self,
        game_id: i64,
        branch_name: &str,
        description: Option<&str>,
        active: bool,
    ) -> Result<()> {
        let conn = self.conn.lock().unwrap();

        // At most one active branch per game; both statements run under
        // the same connection guard.
        if active {
            conn.execute(
                "UPDATE branches SET is_active = 0 WHERE game_id = ?1",
                params![game_id],
            )?;
        }

        conn.execute(
            "INSERT INTO branches (name, game_id, description, is_active, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(name) DO UPDATE SET
                 description = COALESCE(excluded.description, branches.description),
                 is_active = excluded.is_active",
            params![
                branch_name,
                game_id,
                description,
                active as i32,
                Utc::now().to_rfc3339(),
            ],
        )?;

        Ok(())
    }

    fn record_commit(
        &self,
        branch_name: &str,
        commit_ref: &str,
        message: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR REPLACE INTO commits (commit_ref, branch_name, message, timestamp)
             VALUES (?1, ?2, ?3, ?4)",
            params![commit_ref, branch_name, message, timestamp.to_rfc3339()],
        )?;
        conn.execute(
            "UPDATE branches SET last_commit = ?1 WHERE name = ?2",
            params![commit_ref, branch_name],
        )?;
        Ok(())
    }

    fn get_active_branch(&self, game_id: i64) -> Result<Option<Branch>> {
        let conn = self.conn.lock().unwrap();
        Ok(conn
            .query_row(
                "SELECT name, game_id, description, is_active, last_commit, created_at
                 FROM branches WHERE game_id = ?1 AND is_active = 1 LIMIT 1",
                params![game_id],
                Self::branch_from_row,
            )
            .optional()?)
    }

    fn branches_for_game(&self, game_id: i64) -> Result<Vec<Branch>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT name, game_id, description, is_active, last_commit, created_at
             FROM branches WHERE game_id = ?1 ORDER BY created_at DESC",
        )?;

        let branches = stmt
            .query_map(params![game_id], Self::branch_from_row)?
            .collect::<rusqlite::Result<Vec<Branch>>>()?;

        Ok(branches)
    }

    fn commits_for_game(&self, game_id: i64) -> Result<Vec<CommitRecord>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT c.commit_ref, c.branch_name, c.message, c.timestamp
             FROM commits c
             JOIN branches b ON b.name = c.branch_name
             WHERE b.game_id = ?1
             ORDER BY c.timestamp DESC",
        )?;

        let commits = stmt
            .query_map(params![game_id], Self::commit_from_row)?
            .collect::<rusqlite::Result<Vec<CommitRecord>>>()?;

        Ok(commits)
    }

    fn all_games(&self) -> Result<Vec<GameEntry>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT game_id, name, save_paths, enabled, created_at FROM games ORDER BY game_id",
        )?;

        let games = stmt
            .query_map([], Self::game_from_row)?
            .collect::<rusqlite::Result<Vec<GameEntry>>>()?;

        Ok(games)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_game(id: i64, name: &str) -> GameEntry {
        GameEntry {
            game_id: id,
            name: name.to_string(),
            save_paths: vec![PathBuf::from("/saves/slot1")],
            enabled: true,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_game_roundtrip() {
        let store = SqliteMetadataStore::in_memory().unwrap();
        let game = sample_game(1, "Skyrim");

        store.upsert_game(&game).unwrap();
        let loaded = store.get_game(1).unwrap();

        assert_eq!(loaded.name, "Skyrim");
        assert_eq!(loaded.save_paths, game.save_paths);
        assert!(loaded.enabled);
    }

    #[test]
    fn test_missing_game() {
        let store = SqliteMetadataStore::in_memory().unwrap();
        assert!(matches!(store.get_game(42), Err(Error::GameNotFound(42))));
    }

    #[test]
    fn test_single_active_branch_invariant() {
        let store = SqliteMetadataStore::in_memory().unwrap();
        store.upsert_game(&sample_game(1, "Skyrim")).unwrap();

        store.upsert_branch(1, "Skyrim-First", None, true).unwrap();
        store.upsert_branch(1, "Skyrim-Second", None, true).unwrap();

        let active = store.get_active_branch(1).unwrap().unwrap();
        assert_eq!(active.name, "Skyrim-Second");

        let branches = store.branches_for_game(1).unwrap();
        assert_eq!(branches.iter().filter(|b| b.is_active).count(), 1);
    }

    #[test]
    fn test_upsert_preserves_description() {
        let store = SqliteMetadataStore::in_memory().unwrap();
        store.upsert_game(&sample_game(1, "Skyrim")).unwrap();

        store
            .upsert_branch(1, "Skyrim-Main", Some("main quest"), true)
            .unwrap();
        // Re-activating without a description keeps the old one.
        store.upsert_branch(1, "Skyrim-Main", None, true).unwrap();

        let branch = store.get_active_branch(1).unwrap().unwrap();
        assert_eq!(branch.description.as_deref(), Some("main quest"));
    }

    #[test]
    fn test_commits_newest_first() {
        let store = SqliteMetadataStore::in_memory().unwrap();
        store.upsert_game(&sample_game(1, "Skyrim")).unwrap();
        store.upsert_branch(1, "Skyrim-Main", None, true).unwrap();

        let older = Utc::now() - chrono::Duration::minutes(5);
        store
            .record_commit("Skyrim-Main", "aaa111", "first", older)
            .unwrap();
        store
            .record_commit("Skyrim-Main", "bbb222", "second", Utc::now())
            .unwrap();

        let commits = store.commits_for_game(1).unwrap();
        assert_eq!(commits.len(), 2);
        assert_eq!(commits[0].commit_ref, "bbb222");

        let branch = store.get_active_branch(1).unwrap().unwrap();
        assert_eq!(branch.last_commit.as_deref(), Some("bbb222"));
    }
}
