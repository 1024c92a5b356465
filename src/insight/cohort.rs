use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeSet;

use crate::core::{Insight, PeerProfile, TraitVector};
use crate::insight::lexicon::describe_tag;

/// A ranked peer with the patterns both users share
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CohortMatch {
    pub user_id: String,
    pub display_name: String,
    pub joined_at: DateTime<Utc>,

    /// 0.0-1.0
    pub similarity: f64,

    pub shared_patterns: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct MatchOptions {
    pub top_k: usize,

    /// Minimum total tag hits in the requester's own vector
    pub min_signal: u32,

    /// Minimum distinct tags in the requester's own vector
    pub min_distinct: usize,
}

impl Default for MatchOptions {
    fn default() -> Self {
        Self {
            top_k: 5,
            min_signal: 5,
            min_distinct: 2,
        }
    }
}

const SHARED_PATTERNS_PER_MATCH: usize = 3;

fn jaccard(a: &TraitVector, b: &TraitVector) -> f64 {
    let a_tags: BTreeSet<&str> = a.tags().collect();
    let b_tags: BTreeSet<&str> = b.tags().collect();
    let union = a_tags.union(&b_tags).count();
    if union == 0 {
        return 0.0;
    }
    a_tags.intersection(&b_tags).count() as f64 / union as f64
}

fn cosine(a: &TraitVector, b: &TraitVector) -> f64 {
    let dot: f64 = a.iter().map(|(tag, n)| n as f64 * b.get(tag) as f64).sum();
    let norm = |v: &TraitVector| v.iter().map(|(_, n)| (n as f64).powi(2)).sum::<f64>().sqrt();
    let denom = norm(a) * norm(b);
    if denom == 0.0 {
        return 0.0;
    }
    dot / denom
}

/// Half tag overlap, half count correlation. Always within [0, 1].
pub fn similarity(a: &TraitVector, b: &TraitVector) -> f64 {
    (0.5 * jaccard(a, b) + 0.5 * cosine(a, b)).clamp(0.0, 1.0)
}

/// Shared tags translated to descriptions, strongest combined signal first
pub fn shared_patterns(a: &TraitVector, b: &TraitVector) -> Vec<String> {
    let mut shared: Vec<(&str, u32)> = a
        .iter()
        .filter(|(tag, _)| b.get(tag) > 0)
        .map(|(tag, n)| (tag, n + b.get(tag)))
        .collect();
    shared.sort_by(|x, y| y.1.cmp(&x.1).then(x.0.cmp(&y.0)));

    shared
        .into_iter()
        .filter_map(|(tag, _)| describe_tag(tag))
        .take(SHARED_PATTERNS_PER_MATCH)
        .map(str::to_string)
        .collect()
}

/// Rank peers by similarity to the requester.
///
/// The requester never appears in its own list, peers sharing nothing are
/// dropped, and ties fall back to earliest join date then user id.
pub fn find_matches(
    user_id: &str,
    vector: &TraitVector,
    peers: &[PeerProfile],
    options: &MatchOptions,
) -> Insight<Vec<CohortMatch>> {
    if vector.total_hits() < options.min_signal || vector.distinct_tags() < options.min_distinct {
        return Insight::NotEnoughData {
            required: options.min_signal as usize,
            observed: vector.total_hits() as usize,
        };
    }

    let mut matches: Vec<CohortMatch> = peers
        .iter()
        .filter(|peer| peer.user_id != user_id)
        .filter_map(|peer| {
            let score = similarity(vector, &peer.vector);
            (score > 0.0).then(|| CohortMatch {
                user_id: peer.user_id.clone(),
                display_name: peer.display_name.clone(),
                joined_at: peer.joined_at,
                similarity: (score * 1000.0).round() / 1000.0,
                shared_patterns: shared_patterns(vector, &peer.vector),
            })
        })
        .collect();

    matches.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.joined_at.cmp(&b.joined_at))
            .then_with(|| a.user_id.cmp(&b.user_id))
    });
    matches.truncate(options.top_k);

    Insight::Ready(matches)
}
