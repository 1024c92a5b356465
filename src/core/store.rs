use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, Transaction, TransactionBehavior};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use super::error::Result;
use super::peer::{PeerProfile, TraitVector};
use super::record::{parse_timestamp, AnswerRecord, History, LogRecord, RawAnswerRow, RawLogRow};

/// Read-only view of the per-user history.
///
/// Implementations must return `CoreError::StoreUnavailable` when the backing
/// store cannot be reached, instead of empty results.
pub trait HistoryStore {
    /// Log rows for a user, oldest first
    fn log_rows(&self, user_id: &str) -> Result<Vec<RawLogRow>>;

    /// Answer rows for a user, oldest first
    fn answer_rows(&self, user_id: &str) -> Result<Vec<RawAnswerRow>>;

    /// Creation time of the user's earliest well-formed answer
    fn first_answer_at(&self, user_id: &str) -> Result<Option<DateTime<Utc>>>;

    /// Number of answers created in `[start, end)`
    fn count_answers_between(
        &self,
        user_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<usize>;

    /// Every published peer directory entry
    fn peers(&self) -> Result<Vec<PeerProfile>>;

    fn load_history(&self, user_id: &str) -> Result<History> {
        let logs = self.log_rows(user_id)?;
        let answers = self.answer_rows(user_id)?;
        Ok(History::from_rows(logs, answers))
    }
}

/// Persisted set of unlocked achievement ids. Entries are only ever added.
pub trait AchievementLedger {
    fn unlocked_achievements(&self, user_id: &str) -> Result<BTreeMap<String, DateTime<Utc>>>;

    /// Record new unlocks; ids that are already unlocked keep their original time
    fn record_unlocks(&self, user_id: &str, unlocks: &[(String, DateTime<Utc>)]) -> Result<()>;
}

/// SQLite-backed history, peer directory and achievement ledger
pub struct SqliteStore {
    conn: Connection,
}

fn format_timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// How long a connection waits on another instance's write lock before giving up
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

impl SqliteStore {
    /// Open (or create) a store at the given path; `:memory:` opens a private in-memory database
    pub fn new(db_path: PathBuf) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(db_path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Self::init_schema(&conn)?;
        Ok(Self { conn })
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Run `f` inside a `BEGIN IMMEDIATE` transaction.
    ///
    /// The write lock is taken before `f` reads anything, so every connection
    /// to the same database file sees the reads and writes of `f` as one step.
    /// Committed only when `f` succeeds.
    pub fn with_write_lock<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce() -> Result<T>,
    {
        let tx = Transaction::new_unchecked(&self.conn, TransactionBehavior::Immediate)?;
        let value = f()?;
        tx.commit()?;
        Ok(value)
    }

    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS logs (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                event TEXT NOT NULL,
                text TEXT,
                metadata TEXT NOT NULL DEFAULT '{}',
                context TEXT NOT NULL DEFAULT '{}',
                created_at TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS answers (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                question TEXT NOT NULL,
                options TEXT NOT NULL DEFAULT '[]',
                answer TEXT NOT NULL,
                metadata TEXT NOT NULL DEFAULT '{}',
                created_at TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS peer_vectors (
                user_id TEXT PRIMARY KEY,
                display_name TEXT NOT NULL,
                joined_at TEXT NOT NULL,
                vector TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS achievements (
                user_id TEXT NOT NULL,
                achievement_id TEXT NOT NULL,
                unlocked_at TEXT NOT NULL,
                PRIMARY KEY (user_id, achievement_id)
            );
            CREATE INDEX IF NOT EXISTS idx_logs_user ON logs(user_id, created_at);
            CREATE INDEX IF NOT EXISTS idx_answers_user ON answers(user_id, created_at);",
        )?;
        Ok(())
    }

    pub fn insert_log(&self, log: &LogRecord) -> Result<()> {
        self.conn.execute(
            "INSERT INTO logs (id, user_id, event, text, metadata, context, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                &log.id,
                &log.user_id,
                &log.event,
                &log.text,
                serde_json::to_string(&log.metadata)?,
                serde_json::to_string(&log.context)?,
                format_timestamp(&log.created_at),
            ],
        )?;
        Ok(())
    }

    pub fn insert_answer(&self, answer: &AnswerRecord) -> Result<()> {
        self.conn.execute(
            "INSERT INTO answers (id, user_id, question, options, answer, metadata, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                &answer.id,
                &answer.user_id,
                &answer.question,
                serde_json::to_string(&answer.options)?,
                &answer.answer,
                serde_json::to_string(&answer.metadata)?,
                format_timestamp(&answer.created_at),
            ],
        )?;
        Ok(())
    }

    /// Publish (or refresh) a user's entry in the peer directory
    pub fn upsert_peer(&self, peer: &PeerProfile) -> Result<()> {
        self.conn.execute(
            "INSERT INTO peer_vectors (user_id, display_name, joined_at, vector)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(user_id) DO UPDATE SET
                display_name = excluded.display_name,
                joined_at = excluded.joined_at,
                vector = excluded.vector",
            params![
                &peer.user_id,
                &peer.display_name,
                format_timestamp(&peer.joined_at),
                serde_json::to_string(&peer.vector)?,
            ],
        )?;
        Ok(())
    }

    /// Raw createdAt strings of a user's answers; the caller decides what to do with bad ones
    fn answer_timestamps(&self, user_id: &str) -> Result<Vec<(String, String)>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, created_at FROM answers WHERE user_id = ?1")?;
        let rows = stmt
            .query_map(params![user_id], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn parsed_answer_times(&self, user_id: &str) -> Result<Vec<DateTime<Utc>>> {
        let times = self
            .answer_timestamps(user_id)?
            .into_iter()
            .filter_map(|(id, raw)| match parse_timestamp(&id, &raw) {
                Ok(at) => Some(at),
                Err(e) => {
                    tracing::warn!(error = %e, "skipping answer with malformed timestamp");
                    None
                }
            })
            .collect();
        Ok(times)
    }
}

impl HistoryStore for SqliteStore {
    fn log_rows(&self, user_id: &str) -> Result<Vec<RawLogRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, user_id, event, text, metadata, context, created_at
             FROM logs WHERE user_id = ?1 ORDER BY created_at ASC",
        )?;

        let rows = stmt
            .query_map(params![user_id], |row| {
                Ok(RawLogRow {
                    id: row.get(0)?,
                    user_id: row.get(1)?,
                    event: row.get(2)?,
                    text: row.get(3)?,
                    metadata: row.get(4)?,
                    context: row.get(5)?,
                    created_at: row.get(6)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(rows)
    }

    fn answer_rows(&self, user_id: &str) -> Result<Vec<RawAnswerRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, user_id, question, options, answer, metadata, created_at
             FROM answers WHERE user_id = ?1 ORDER BY created_at ASC",
        )?;

        let rows = stmt
            .query_map(params![user_id], |row| {
                Ok(RawAnswerRow {
                    id: row.get(0)?,
                    user_id: row.get(1)?,
                    question: row.get(2)?,
                    options: row.get(3)?,
                    answer: row.get(4)?,
                    metadata: row.get(5)?,
                    created_at: row.get(6)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(rows)
    }

    fn first_answer_at(&self, user_id: &str) -> Result<Option<DateTime<Utc>>> {
        Ok(self.parsed_answer_times(user_id)?.into_iter().min())
    }

    fn count_answers_between(
        &self,
        user_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<usize> {
        // parsed in Rust so offsets other than Z compare correctly
        Ok(self
            .parsed_answer_times(user_id)?
            .into_iter()
            .filter(|at| *at >= start && *at < end)
            .count())
    }

    fn peers(&self) -> Result<Vec<PeerProfile>> {
        let mut stmt = self.conn.prepare(
            "SELECT user_id, display_name, joined_at, vector FROM peer_vectors ORDER BY user_id",
        )?;

        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let peers = rows
            .into_iter()
            .filter_map(|(user_id, display_name, joined_at, vector)| {
                let joined_at = match parse_timestamp(&user_id, &joined_at) {
                    Ok(at) => at,
                    Err(e) => {
                        tracing::warn!(error = %e, "skipping peer with malformed join date");
                        return None;
                    }
                };
                match serde_json::from_str::<TraitVector>(&vector) {
                    Ok(vector) => Some(PeerProfile {
                        user_id,
                        display_name,
                        joined_at,
                        vector,
                    }),
                    Err(e) => {
                        tracing::warn!(user_id, error = %e, "skipping peer with malformed vector");
                        None
                    }
                }
            })
            .collect();

        Ok(peers)
    }
}

impl AchievementLedger for SqliteStore {
    fn unlocked_achievements(&self, user_id: &str) -> Result<BTreeMap<String, DateTime<Utc>>> {
        let mut stmt = self.conn.prepare(
            "SELECT achievement_id, unlocked_at FROM achievements WHERE user_id = ?1",
        )?;

        let rows = stmt
            .query_map(params![user_id], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut unlocked = BTreeMap::new();
        for (id, raw) in rows {
            // a bad timestamp must not re-lock the achievement
            let at = parse_timestamp(&id, &raw).unwrap_or_default();
            unlocked.insert(id, at);
        }
        Ok(unlocked)
    }

    fn record_unlocks(&self, user_id: &str, unlocks: &[(String, DateTime<Utc>)]) -> Result<()> {
        for (id, at) in unlocks {
            self.conn.execute(
                "INSERT OR IGNORE INTO achievements (user_id, achievement_id, unlocked_at)
                 VALUES (?1, ?2, ?3)",
                params![user_id, id, format_timestamp(at)],
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
impl SqliteStore {
    pub(crate) fn insert_raw_answer_timestamp(&self, id: &str, user_id: &str, created_at: &str) -> Result<()> {
        self.conn.execute(
            "INSERT INTO answers (id, user_id, question, answer, created_at)
             VALUES (?1, ?2, 'q', 'a', ?3)",
            params![id, user_id, created_at],
        )?;
        Ok(())
    }

    pub(crate) fn insert_raw_answer_options(&self, id: &str, user_id: &str, options: &str, created_at: &str) -> Result<()> {
        self.conn.execute(
            "INSERT INTO answers (id, user_id, question, options, answer, created_at)
             VALUES (?1, ?2, 'q', ?3, 'a', ?4)",
            params![id, user_id, options, created_at],
        )?;
        Ok(())
    }
}
