use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::core::{Insight, TextEntry};
use crate::insight::lexicon::{StruggleSignal, TagMatcher};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn of(signal: StruggleSignal) -> Self {
        match signal {
            StruggleSignal::Crisis => Severity::Critical,
            StruggleSignal::Burnout | StruggleSignal::Isolation => Severity::High,
            StruggleSignal::Anxiety | StruggleSignal::Sleep => Severity::Medium,
            StruggleSignal::LowMotivation => Severity::Low,
        }
    }

    /// Entries in the window needed before a signal of this severity is acted on
    pub fn min_hits(&self) -> usize {
        match self {
            Severity::Critical => 1,
            _ => 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Intervention {
    pub severity: Severity,
    pub signal: StruggleSignal,
    pub title: String,
    pub message: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,

    pub detected_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct InterventionOptions {
    pub window_days: i64,
    pub min_entries: usize,
}

impl Default for InterventionOptions {
    fn default() -> Self {
        Self {
            window_days: 7,
            min_entries: 5,
        }
    }
}

fn copy_for(signal: StruggleSignal) -> (&'static str, &'static str, Option<&'static str>) {
    match signal {
        StruggleSignal::Crisis => (
            "You don't have to carry this alone",
            "Some of what you've written lately sounds really heavy. Talking to someone can help right now.",
            Some("If you are in danger, contact local emergency services or a crisis line today."),
        ),
        StruggleSignal::Burnout => (
            "Running on empty",
            "You've described feeling drained several times this week.",
            Some("Block out one evening with nothing scheduled and protect it."),
        ),
        StruggleSignal::Isolation => (
            "Feeling disconnected",
            "Loneliness has come up more than once recently.",
            Some("Send a short message to one person you'd like to hear from."),
        ),
        StruggleSignal::Anxiety => (
            "A lot on your mind",
            "Worry and overwhelm keep showing up in your entries.",
            Some("Try five slow breaths before your next task."),
        ),
        StruggleSignal::Sleep => (
            "Rest is running short",
            "Your sleep seems to have been rough for a few nights.",
            Some("Aim for a screen-free half hour before bed tonight."),
        ),
        StruggleSignal::LowMotivation => (
            "Stuck in neutral",
            "Motivation has been hard to find lately, and that's okay.",
            None,
        ),
    }
}

/// Pick the single most important intervention in the recent window.
///
/// `Ready(None)` means the history is long enough and nothing needs surfacing.
pub fn score_interventions(
    entries: &[TextEntry],
    matcher: &impl TagMatcher,
    as_of: DateTime<Utc>,
    options: &InterventionOptions,
) -> Insight<Option<Intervention>> {
    let observed = entries.iter().filter(|e| e.at <= as_of).count();
    if observed < options.min_entries {
        return Insight::NotEnoughData {
            required: options.min_entries,
            observed,
        };
    }

    let window_start = as_of - Duration::days(options.window_days);

    // signal -> (hits, last detection)
    let mut detected: BTreeMap<StruggleSignal, (usize, DateTime<Utc>)> = BTreeMap::new();
    for entry in entries.iter().filter(|e| e.at > window_start && e.at <= as_of) {
        for signal in matcher.scan(&entry.text).struggles {
            let slot = detected.entry(signal).or_insert((0, entry.at));
            slot.0 += 1;
            slot.1 = slot.1.max(entry.at);
        }
    }

    let surfaced = detected
        .into_iter()
        .filter(|(signal, (hits, _))| *hits >= Severity::of(*signal).min_hits())
        .max_by(|(a, (_, a_at)), (b, (_, b_at))| {
            Severity::of(*a)
                .cmp(&Severity::of(*b))
                .then(a_at.cmp(b_at))
        });

    Insight::Ready(surfaced.map(|(signal, (_, detected_at))| {
        let severity = Severity::of(signal);
        tracing::info!(signal = %signal, ?severity, "intervention surfaced");

        let (title, message, suggestion) = copy_for(signal);
        Intervention {
            severity,
            signal,
            title: title.to_string(),
            message: message.to_string(),
            suggestion: suggestion.map(str::to_string),
            detected_at,
        }
    }))
}
