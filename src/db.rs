// SQLite persistence for session snapshots and finalized decks.

use std::sync::{Mutex, MutexGuard};

use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};

use crate::draft::deckbuild::DeckPartition;
use crate::draft::session::SessionSnapshot;

/// SQLite-backed persistence. The connection sits behind a mutex; callers
/// hold it only for the duration of one statement batch.
pub struct Database {
    conn: Mutex<Connection>,
}

/// A finalized deck row.
#[derive(Debug, Clone)]
pub struct DeckRow {
    pub id: i64,
    pub session_id: String,
    pub seat: usize,
    pub player: String,
    pub deck: DeckPartition,
}

impl Database {
    /// Open (or create) the database at `path` and ensure the schema exists.
    /// Pass `":memory:"` for an ephemeral database in tests.
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open database at {path}"))?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA busy_timeout = 5000;
             PRAGMA foreign_keys = ON;",
        )
        .context("failed to set database pragmas")?;

        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS sessions (
                id         TEXT PRIMARY KEY,
                snapshot   TEXT NOT NULL,
                sequence   INTEGER NOT NULL,
                finished   INTEGER NOT NULL DEFAULT 0,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS decks (
                id         INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id TEXT NOT NULL,
                seat       INTEGER NOT NULL,
                player     TEXT NOT NULL,
                deck       TEXT NOT NULL,
                created_at TEXT NOT NULL,
                UNIQUE(session_id, seat)
            );
            ",
        )
        .context("failed to create database schema")?;

        Ok(Database {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        // A poisoned lock means another thread panicked mid-statement;
        // the connection itself is still usable.
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Insert or replace a session snapshot.
    pub fn save_session(&self, snapshot: &SessionSnapshot) -> Result<()> {
        let json = serde_json::to_string(snapshot).context("failed to serialize snapshot")?;
        let conn = self.lock();
        conn.execute(
            "INSERT INTO sessions (id, snapshot, sequence, finished, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(id) DO UPDATE SET
                 snapshot = excluded.snapshot,
                 sequence = excluded.sequence,
                 finished = excluded.finished,
                 updated_at = excluded.updated_at",
            params![
                snapshot.id,
                json,
                snapshot.sequence as i64,
                snapshot.finished as i64,
                Utc::now().to_rfc3339(),
            ],
        )
        .with_context(|| format!("failed to save session {}", snapshot.id))?;
        Ok(())
    }

    /// Load one session snapshot by id.
    pub fn load_session(&self, id: &str) -> Result<Option<SessionSnapshot>> {
        let conn = self.lock();
        let json: Option<String> = conn
            .query_row("SELECT snapshot FROM sessions WHERE id = ?1", [id], |row| {
                row.get(0)
            })
            .optional()
            .with_context(|| format!("failed to load session {id}"))?;
        match json {
            Some(json) => {
                let snapshot =
                    serde_json::from_str(&json).context("failed to deserialize snapshot")?;
                Ok(Some(snapshot))
            }
            None => Ok(None),
        }
    }

    /// Load every unfinished session, for crash recovery at startup.
    pub fn load_unfinished_sessions(&self) -> Result<Vec<SessionSnapshot>> {
        let conn = self.lock();
        let mut stmt = conn
            .prepare("SELECT snapshot FROM sessions WHERE finished = 0 ORDER BY id")
            .context("failed to prepare session query")?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .context("failed to query sessions")?;

        let mut snapshots = Vec::new();
        for json in rows {
            let json = json.context("failed to read session row")?;
            snapshots.push(
                serde_json::from_str(&json).context("failed to deserialize snapshot")?,
            );
        }
        Ok(snapshots)
    }

    pub fn delete_session(&self, id: &str) -> Result<()> {
        let conn = self.lock();
        conn.execute("DELETE FROM sessions WHERE id = ?1", [id])
            .with_context(|| format!("failed to delete session {id}"))?;
        Ok(())
    }

    /// Persist a finalized deck; replaces any previous deck for the seat.
    /// Returns the deck row id.
    pub fn save_deck(
        &self,
        session_id: &str,
        seat: usize,
        player: &str,
        deck: &DeckPartition,
    ) -> Result<i64> {
        let json = serde_json::to_string(deck).context("failed to serialize deck")?;
        let conn = self.lock();
        conn.execute(
            "INSERT INTO decks (session_id, seat, player, deck, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(session_id, seat) DO UPDATE SET
                 deck = excluded.deck,
                 player = excluded.player,
                 created_at = excluded.created_at",
            params![
                session_id,
                seat as i64,
                player,
                json,
                Utc::now().to_rfc3339(),
            ],
        )
        .with_context(|| format!("failed to save deck for {session_id} seat {seat}"))?;

        let id: i64 = conn
            .query_row(
                "SELECT id FROM decks WHERE session_id = ?1 AND seat = ?2",
                params![session_id, seat as i64],
                |row| row.get(0),
            )
            .context("failed to read back deck id")?;
        Ok(id)
    }

    pub fn load_deck(&self, id: i64) -> Result<Option<DeckRow>> {
        let conn = self.lock();
        let row = conn
            .query_row(
                "SELECT id, session_id, seat, player, deck FROM decks WHERE id = ?1",
                [id],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                    ))
                },
            )
            .optional()
            .with_context(|| format!("failed to load deck {id}"))?;

        match row {
            Some((id, session_id, seat, player, json)) => {
                let deck = serde_json::from_str(&json).context("failed to deserialize deck")?;
                Ok(Some(DeckRow {
                    id,
                    session_id,
                    seat: seat as usize,
                    player,
                    deck,
                }))
            }
            None => Ok(None),
        }
    }
}
