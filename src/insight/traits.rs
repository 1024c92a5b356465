use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::core::{Insight, TextEntry, TraitVector};
use crate::insight::lexicon::{BehavioralTag, CoreValue, EmotionalPattern, Polarity, TagHits, TagMatcher};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum GrowthTrajectory {
    Emerging,
    Developing,
    Deepening,
    Integrated,
}

/// Share of entries per polarity, in whole percent.
///
/// Sums to exactly 100 for any non-empty history; all zeros means there was no text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalSentiment {
    pub positive: u8,
    pub neutral: u8,
    pub challenging: u8,
}

impl JournalSentiment {
    pub const EMPTY: JournalSentiment = JournalSentiment {
        positive: 0,
        neutral: 0,
        challenging: 0,
    };

    pub fn is_empty(&self) -> bool {
        *self == Self::EMPTY
    }

    /// Largest-remainder rounding so the three buckets always total 100
    pub fn from_counts(positive: usize, neutral: usize, challenging: usize) -> Self {
        let total = positive + neutral + challenging;
        if total == 0 {
            return Self::EMPTY;
        }

        let counts = [positive, neutral, challenging];
        let mut shares = counts.map(|c| c * 100 / total);
        let mut remainders: Vec<(usize, usize)> = counts
            .iter()
            .enumerate()
            .map(|(i, c)| (i, c * 100 % total))
            .collect();
        // largest remainder first, bucket order breaks ties
        remainders.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));

        let assigned: usize = shares.iter().sum();
        for (i, _) in remainders.into_iter().take(100 - assigned) {
            shares[i] += 1;
        }

        Self {
            positive: shares[0] as u8,
            neutral: shares[1] as u8,
            challenging: shares[2] as u8,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PsychologicalDepth {
    pub emotional_patterns: Vec<EmotionalPattern>,
    pub values: Vec<CoreValue>,

    /// 0-10
    pub self_awareness: f32,

    /// 0-10
    pub emotional_range: f32,

    /// 0-10
    pub reflection_quality: f32,

    pub growth_trajectory: GrowthTrajectory,
    pub dominant_needs: Vec<String>,
    pub journal_sentiment: JournalSentiment,
}

impl PsychologicalDepth {
    pub fn has_pattern(&self, pattern: EmotionalPattern) -> bool {
        self.emotional_patterns.contains(&pattern)
    }

    pub fn has_value(&self, value: CoreValue) -> bool {
        self.values.contains(&value)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PsychologicalProfile {
    /// Behavioral tags seen at least once
    pub traits: Vec<BehavioralTag>,

    /// Entries per tag, across every tag family
    pub pattern_counts: BTreeMap<String, u32>,

    pub psychological_depth: PsychologicalDepth,
    pub entries_analyzed: usize,
}

impl PsychologicalProfile {
    pub fn count(&self, tag: &str) -> u32 {
        self.pattern_counts.get(tag).copied().unwrap_or(0)
    }

    pub fn has_trait(&self, tag: BehavioralTag) -> bool {
        self.traits.contains(&tag)
    }

    pub fn trait_vector(&self) -> TraitVector {
        TraitVector::from_counts(self.pattern_counts.clone())
    }
}

#[derive(Debug, Clone)]
pub struct ExtractOptions {
    /// Only look at the most recent N entries
    pub window: Option<usize>,

    /// Below this many entries the profile is reported as not enough data
    pub min_entries: usize,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            window: None,
            min_entries: 3,
        }
    }
}

const TOP_PATTERNS: usize = 5;
const TOP_NEEDS: usize = 3;

fn round1(x: f32) -> f32 {
    (x * 10.0).round() / 10.0
}

fn need_for(pattern: EmotionalPattern) -> &'static str {
    match pattern {
        EmotionalPattern::GrowthOriented => "growth",
        EmotionalPattern::Reflective => "understanding",
        EmotionalPattern::ConnectionSeeking => "belonging",
        EmotionalPattern::Achievement => "recognition",
        EmotionalPattern::Grounded => "stability",
        EmotionalPattern::PeaceSeeking => "rest",
        EmotionalPattern::Creative => "expression",
        EmotionalPattern::AutonomyDriven => "autonomy",
        EmotionalPattern::EmotionallyAware => "validation",
    }
}

/// Tags sorted by count desc, declaration order breaking ties
fn ranked<T: Copy + Ord>(all: &[T], counts: &BTreeMap<T, u32>, min_hits: u32) -> Vec<T> {
    let mut ranked: Vec<(T, u32)> = all
        .iter()
        .map(|t| (*t, counts.get(t).copied().unwrap_or(0)))
        .filter(|(_, n)| *n >= min_hits.max(1))
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
    ranked.into_iter().map(|(t, _)| t).collect()
}

pub fn growth_trajectory(self_awareness: f32, entries: usize) -> GrowthTrajectory {
    const BANDS: &[(f32, usize, GrowthTrajectory)] = &[
        (8.0, 50, GrowthTrajectory::Integrated),
        (6.0, 20, GrowthTrajectory::Deepening),
        (3.5, 5, GrowthTrajectory::Developing),
    ];

    BANDS
        .iter()
        .find(|(sa, n, _)| self_awareness >= *sa && entries >= *n)
        .map(|(_, _, band)| *band)
        .unwrap_or(GrowthTrajectory::Emerging)
}

/// Scan entries into a profile. Always produces a result, even for an empty slice.
pub fn analyze(entries: &[TextEntry], matcher: &impl TagMatcher) -> PsychologicalProfile {
    let hits: Vec<TagHits> = entries.iter().map(|e| matcher.scan(&e.text)).collect();
    let n = entries.len();

    let mut behavioral: BTreeMap<BehavioralTag, u32> = BTreeMap::new();
    let mut patterns: BTreeMap<EmotionalPattern, u32> = BTreeMap::new();
    let mut values: BTreeMap<CoreValue, u32> = BTreeMap::new();
    let (mut positive, mut neutral, mut challenging) = (0, 0, 0);
    let mut polarities_seen = [false; 3];
    let mut words = 0usize;

    for (entry, hit) in entries.iter().zip(&hits) {
        for tag in &hit.behavioral {
            *behavioral.entry(*tag).or_insert(0) += 1;
        }
        for tag in &hit.patterns {
            *patterns.entry(*tag).or_insert(0) += 1;
        }
        for tag in &hit.values {
            *values.entry(*tag).or_insert(0) += 1;
        }
        match hit.polarity() {
            Polarity::Positive => {
                positive += 1;
                polarities_seen[0] = true;
            }
            Polarity::Neutral => {
                neutral += 1;
                polarities_seen[1] = true;
            }
            Polarity::Challenging => {
                challenging += 1;
                polarities_seen[2] = true;
            }
        }
        words += entry.text.split_whitespace().count();
    }

    let mut pattern_counts = BTreeMap::new();
    for (tag, count) in &behavioral {
        pattern_counts.insert(tag.as_str().to_string(), *count);
    }
    for (tag, count) in &patterns {
        pattern_counts.insert(tag.as_str().to_string(), *count);
    }
    for (tag, count) in &values {
        pattern_counts.insert(tag.as_str().to_string(), *count);
    }

    let min_hits = if n < 10 { 1 } else { 2 };
    let emotional_patterns: Vec<EmotionalPattern> = ranked(EmotionalPattern::ALL, &patterns, min_hits)
        .into_iter()
        .take(TOP_PATTERNS)
        .collect();
    let top_values: Vec<CoreValue> = ranked(CoreValue::ALL, &values, min_hits)
        .into_iter()
        .take(TOP_PATTERNS)
        .collect();
    let dominant_needs = ranked(EmotionalPattern::ALL, &patterns, 1)
        .into_iter()
        .take(TOP_NEEDS)
        .map(|p| need_for(p).to_string())
        .collect();

    let pattern = |p: EmotionalPattern| patterns.get(&p).copied().unwrap_or(0) as f32;
    let value = |v: CoreValue| values.get(&v).copied().unwrap_or(0) as f32;

    let (self_awareness, reflection_quality, emotional_range) = if n == 0 {
        (0.0, 0.0, 0.0)
    } else {
        let entries_f = n as f32;
        let core = 2.0 * pattern(EmotionalPattern::Reflective)
            + 2.0 * pattern(EmotionalPattern::EmotionallyAware)
            + 1.5 * pattern(EmotionalPattern::GrowthOriented);
        let others: f32 = patterns
            .iter()
            .filter(|(p, _)| {
                !matches!(
                    p,
                    EmotionalPattern::Reflective
                        | EmotionalPattern::EmotionallyAware
                        | EmotionalPattern::GrowthOriented
                )
            })
            .map(|(_, c)| *c as f32)
            .sum();
        let self_awareness = (10.0 * (core + 0.5 * others) / (2.0 * entries_f)).clamp(0.0, 10.0);

        let depth = pattern(EmotionalPattern::Reflective)
            + 0.5 * value(CoreValue::Meaning)
            + 0.5 * value(CoreValue::Authenticity);
        let length_bonus = (words as f32 / entries_f / 20.0).min(3.0);
        let reflection_quality = (10.0 * depth / entries_f + length_bonus).clamp(0.0, 10.0);

        let distinct = patterns.len() as f32 / EmotionalPattern::ALL.len() as f32;
        let seen = polarities_seen.iter().filter(|s| **s).count() as f32;
        let emotional_range = (distinct * 7.0 + 1.5 * (seen - 1.0)).clamp(0.0, 10.0);

        (self_awareness, reflection_quality, emotional_range)
    };

    let self_awareness = round1(self_awareness);

    PsychologicalProfile {
        traits: behavioral.keys().copied().collect(),
        pattern_counts,
        psychological_depth: PsychologicalDepth {
            emotional_patterns,
            values: top_values,
            self_awareness,
            emotional_range: round1(emotional_range),
            reflection_quality: round1(reflection_quality),
            growth_trajectory: growth_trajectory(self_awareness, n),
            dominant_needs,
            journal_sentiment: JournalSentiment::from_counts(positive, neutral, challenging),
        },
        entries_analyzed: n,
    }
}

/// Windowed, thresholded profile extraction
pub fn extract_profile(
    entries: &[TextEntry],
    matcher: &impl TagMatcher,
    options: &ExtractOptions,
) -> Insight<PsychologicalProfile> {
    let windowed = match options.window {
        Some(window) if entries.len() > window => &entries[entries.len() - window..],
        _ => entries,
    };

    if windowed.len() < options.min_entries {
        return Insight::NotEnoughData {
            required: options.min_entries,
            observed: windowed.len(),
        };
    }

    Insight::Ready(analyze(windowed, matcher))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::EntrySource;
    use crate::insight::lexicon::KeywordMatcher;
    use chrono::{Duration, TimeZone, Utc};

    fn entries(texts: &[&str]) -> Vec<TextEntry> {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 8, 0, 0).unwrap();
        texts
            .iter()
            .enumerate()
            .map(|(i, t)| TextEntry {
                source: EntrySource::Log,
                text: t.to_string(),
                at: start + Duration::hours(i as i64),
            })
            .collect()
    }

    #[test]
    fn test_sentiment_sums_to_100() {
        for (p, n, c) in [(1, 1, 1), (2, 0, 1), (5, 3, 9), (0, 7, 0), (1, 2, 4)] {
            let s = JournalSentiment::from_counts(p, n, c);
            assert_eq!(s.positive as u32 + s.neutral as u32 + s.challenging as u32, 100);
        }
        let thirds = JournalSentiment::from_counts(1, 1, 1);
        assert_eq!((thirds.positive, thirds.neutral, thirds.challenging), (34, 33, 33));
    }

    #[test]
    fn test_empty_history_uses_sentinel() {
        let profile = analyze(&[], &KeywordMatcher::default());
        assert!(profile.psychological_depth.journal_sentiment.is_empty());
        assert_eq!(profile.psychological_depth.self_awareness, 0.0);
        assert_eq!(
            profile.psychological_depth.growth_trajectory,
            GrowthTrajectory::Emerging
        );
    }

    #[test]
    fn test_extracts_traits_and_counts() {
        let history = entries(&[
            "Made a tofu salad, trying to eat healthy",
            "Lentil soup for dinner, warm and cozy",
            "Reflecting on how I want to grow this year",
            "I feel proud that I finished the project",
        ]);
        let profile = analyze(&history, &KeywordMatcher::default());

        assert!(profile.has_trait(BehavioralTag::PlantBased));
        assert!(profile.has_trait(BehavioralTag::WarmPreference));
        assert_eq!(profile.count("plantBased"), 2);
        assert!(profile
            .psychological_depth
            .has_pattern(EmotionalPattern::Reflective));
        assert!(profile
            .psychological_depth
            .has_pattern(EmotionalPattern::Achievement));
        assert_eq!(profile.entries_analyzed, 4);
    }

    #[test]
    fn test_scores_stay_in_range() {
        let text = "I feel I'm learning and growing, reflecting and realizing, journaling with insight";
        let history = entries(&[text; 30]);
        let depth = analyze(&history, &KeywordMatcher::default()).psychological_depth;

        for score in [depth.self_awareness, depth.emotional_range, depth.reflection_quality] {
            assert!((0.0..=10.0).contains(&score));
        }
        assert_eq!(depth.self_awareness, 10.0);
        assert_eq!(depth.growth_trajectory, GrowthTrajectory::Deepening);
    }

    #[test]
    fn test_growth_trajectory_bands() {
        assert_eq!(growth_trajectory(9.0, 60), GrowthTrajectory::Integrated);
        assert_eq!(growth_trajectory(9.0, 30), GrowthTrajectory::Deepening);
        assert_eq!(growth_trajectory(4.0, 30), GrowthTrajectory::Developing);
        assert_eq!(growth_trajectory(4.0, 2), GrowthTrajectory::Emerging);
    }

    #[test]
    fn test_window_and_threshold() {
        let history = entries(&["one", "two", "calm quiet evening"]);
        let options = ExtractOptions {
            window: Some(2),
            min_entries: 3,
        };
        assert_eq!(
            extract_profile(&history, &KeywordMatcher::default(), &options),
            Insight::NotEnoughData {
                required: 3,
                observed: 2
            }
        );

        let options = ExtractOptions {
            window: Some(1),
            min_entries: 1,
        };
        let profile = extract_profile(&history, &KeywordMatcher::default(), &options)
            .ready()
            .unwrap();
        assert_eq!(profile.entries_analyzed, 1);
        assert!(profile
            .psychological_depth
            .has_pattern(EmotionalPattern::PeaceSeeking));
    }

    #[test]
    fn test_deterministic() {
        let history = entries(&[
            "Spicy ramen at a new restaurant",
            "Quiet morning meditation, feeling grateful",
            "Stressed about the deadline",
        ]);
        let matcher = KeywordMatcher::default();
        let first = analyze(&history, &matcher);
        for _ in 0..5 {
            assert_eq!(analyze(&history, &matcher), first);
        }
    }
}
