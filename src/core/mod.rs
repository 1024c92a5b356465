pub mod error;
pub mod peer;
pub mod record;
pub mod store;

pub use error::{CoreError, Result};
pub use peer::{PeerProfile, TraitVector};
pub use record::{
    AnswerRecord, EntrySource, History, Insight, LogRecord, RawAnswerRow, RawLogRow, TextEntry,
};
pub use store::{AchievementLedger, HistoryStore, SqliteStore};
