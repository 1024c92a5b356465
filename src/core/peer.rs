use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Tag frequencies derived from one user's history.
///
/// This is the only per-user data that crosses user boundaries: peers see
/// each other's vectors, never each other's records.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TraitVector {
    counts: BTreeMap<String, u32>,
}

impl TraitVector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_counts(counts: BTreeMap<String, u32>) -> Self {
        Self {
            counts: counts.into_iter().filter(|(_, n)| *n > 0).collect(),
        }
    }

    pub fn add(&mut self, tag: &str, hits: u32) {
        if hits > 0 {
            *self.counts.entry(tag.to_string()).or_insert(0) += hits;
        }
    }

    pub fn get(&self, tag: &str) -> u32 {
        self.counts.get(tag).copied().unwrap_or(0)
    }

    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.counts.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u32)> {
        self.counts.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn total_hits(&self) -> u32 {
        self.counts.values().sum()
    }

    pub fn distinct_tags(&self) -> usize {
        self.counts.len()
    }
}

/// Public directory entry for a potential match
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerProfile {
    pub user_id: String,
    pub display_name: String,
    pub joined_at: DateTime<Utc>,
    pub vector: TraitVector,
}
