use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use super::error::{CoreError, Result};

/// A free-text activity entry in a user's journal
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LogRecord {
    pub id: String,
    pub user_id: String,

    /// Event kind as reported by the client (e.g. "journal", "meal", "workout")
    pub event: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,

    #[serde(default)]
    pub metadata: Map<String, Value>,

    #[serde(default)]
    pub context: Map<String, Value>,

    pub created_at: DateTime<Utc>,
}

/// A structured question/answer entry
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AnswerRecord {
    pub id: String,
    pub user_id: String,
    pub question: String,

    #[serde(default)]
    pub options: Vec<String>,

    pub answer: String,

    #[serde(default)]
    pub metadata: Map<String, Value>,

    pub created_at: DateTime<Utc>,
}

impl LogRecord {
    pub fn new(user_id: &str, event: &str, text: Option<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            event: event.to_string(),
            text,
            metadata: Map::new(),
            context: Map::new(),
            created_at,
        }
    }
}

impl AnswerRecord {
    pub fn new(user_id: &str, question: &str, answer: &str, created_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            question: question.to_string(),
            options: Vec::new(),
            answer: answer.to_string(),
            metadata: Map::new(),
            created_at,
        }
    }
}

/// Log row as it comes out of the store. JSON columns and the timestamp are
/// still text; they are validated when the row becomes a `LogRecord`.
#[derive(Debug, Clone)]
pub struct RawLogRow {
    pub id: String,
    pub user_id: String,
    pub event: String,
    pub text: Option<String>,
    pub metadata: String,
    pub context: String,
    pub created_at: String,
}

/// Answer row as it comes out of the store, still unvalidated text
#[derive(Debug, Clone)]
pub struct RawAnswerRow {
    pub id: String,
    pub user_id: String,
    pub question: String,
    pub options: String,
    pub answer: String,
    pub metadata: String,
    pub created_at: String,
}

pub fn parse_timestamp(id: &str, value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| CoreError::InvalidTimestamp {
            id: id.to_string(),
            value: value.to_string(),
        })
}

fn parse_column<T: serde::de::DeserializeOwned>(id: &str, column: &str, raw: &str) -> Result<T> {
    serde_json::from_str(raw).map_err(|e| CoreError::InvalidRecord {
        id: id.to_string(),
        reason: format!("{}: {}", column, e),
    })
}

impl TryFrom<RawLogRow> for LogRecord {
    type Error = CoreError;

    fn try_from(row: RawLogRow) -> Result<Self> {
        let created_at = parse_timestamp(&row.id, &row.created_at)?;
        let metadata = parse_column(&row.id, "metadata", &row.metadata)?;
        let context = parse_column(&row.id, "context", &row.context)?;
        Ok(LogRecord {
            id: row.id,
            user_id: row.user_id,
            event: row.event,
            text: row.text,
            metadata,
            context,
            created_at,
        })
    }
}

impl TryFrom<RawAnswerRow> for AnswerRecord {
    type Error = CoreError;

    fn try_from(row: RawAnswerRow) -> Result<Self> {
        let created_at = parse_timestamp(&row.id, &row.created_at)?;
        let options = parse_column(&row.id, "options", &row.options)?;
        let metadata = parse_column(&row.id, "metadata", &row.metadata)?;
        Ok(AnswerRecord {
            id: row.id,
            user_id: row.user_id,
            question: row.question,
            options,
            answer: row.answer,
            metadata,
            created_at,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum EntrySource {
    Log,
    Answer,
}

/// One piece of user-authored text, the unit every analyzer scans
#[derive(Debug, Clone, PartialEq)]
pub struct TextEntry {
    pub source: EntrySource,
    pub text: String,
    pub at: DateTime<Utc>,
}

/// A user's validated history, each list ordered by creation time
#[derive(Debug, Clone, Default)]
pub struct History {
    pub logs: Vec<LogRecord>,
    pub answers: Vec<AnswerRecord>,

    /// Rows dropped because their createdAt or a JSON column did not parse
    pub rejected: usize,
}

impl History {
    pub fn new(mut logs: Vec<LogRecord>, mut answers: Vec<AnswerRecord>) -> Self {
        logs.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        answers.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Self {
            logs,
            answers,
            rejected: 0,
        }
    }

    /// Build a history from raw rows, rejecting only the rows that are malformed
    pub fn from_rows(log_rows: Vec<RawLogRow>, answer_rows: Vec<RawAnswerRow>) -> Self {
        let mut rejected = 0;

        let logs = log_rows
            .into_iter()
            .filter_map(|row| match LogRecord::try_from(row) {
                Ok(record) => Some(record),
                Err(e) => {
                    tracing::warn!(error = %e, "rejecting log row");
                    rejected += 1;
                    None
                }
            })
            .collect();

        let answers = answer_rows
            .into_iter()
            .filter_map(|row| match AnswerRecord::try_from(row) {
                Ok(record) => Some(record),
                Err(e) => {
                    tracing::warn!(error = %e, "rejecting answer row");
                    rejected += 1;
                    None
                }
            })
            .collect();

        let mut history = Self::new(logs, answers);
        history.rejected = rejected;
        history
    }

    /// Drop everything created after `as_of`, so results are reproducible for a fixed point in time
    pub fn as_of(&self, as_of: DateTime<Utc>) -> Self {
        Self {
            logs: self.logs.iter().filter(|l| l.created_at <= as_of).cloned().collect(),
            answers: self
                .answers
                .iter()
                .filter(|a| a.created_at <= as_of)
                .cloned()
                .collect(),
            rejected: self.rejected,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.logs.is_empty() && self.answers.is_empty()
    }

    pub fn record_count(&self) -> usize {
        self.logs.len() + self.answers.len()
    }

    /// Text entries from logs and answers, merged in chronological order.
    /// Logs without text and blank answers are skipped.
    pub fn entries(&self) -> Vec<TextEntry> {
        let mut entries: Vec<TextEntry> = self
            .logs
            .iter()
            .filter_map(|log| {
                log.text
                    .as_deref()
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .map(|t| TextEntry {
                        source: EntrySource::Log,
                        text: t.to_string(),
                        at: log.created_at,
                    })
            })
            .chain(self.answers.iter().filter_map(|answer| {
                let text = answer.answer.trim();
                (!text.is_empty()).then(|| TextEntry {
                    source: EntrySource::Answer,
                    text: text.to_string(),
                    at: answer.created_at,
                })
            }))
            .collect();

        // stable sort keeps logs ahead of answers at identical instants
        entries.sort_by_key(|e| e.at);
        entries
    }

    pub fn first_activity(&self) -> Option<DateTime<Utc>> {
        let first_log = self.logs.first().map(|l| l.created_at);
        let first_answer = self.answers.first().map(|a| a.created_at);
        match (first_log, first_answer) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }
}

/// Analyzer output: either a result, or an explicit "not enough history yet"
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "data", rename_all = "camelCase")]
pub enum Insight<T> {
    Ready(T),
    #[serde(rename_all = "camelCase")]
    NotEnoughData { required: usize, observed: usize },
}

impl<T> Insight<T> {
    pub fn ready(self) -> Option<T> {
        match self {
            Insight::Ready(value) => Some(value),
            Insight::NotEnoughData { .. } => None,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, Insight::Ready(_))
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Insight<U> {
        match self {
            Insight::Ready(value) => Insight::Ready(f(value)),
            Insight::NotEnoughData { required, observed } => {
                Insight::NotEnoughData { required, observed }
            }
        }
    }
}
