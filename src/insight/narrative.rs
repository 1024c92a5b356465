use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

use crate::core::{History, Insight};

pub const XP_PER_ANSWER: u64 = 10;
pub const XP_PER_LOG: u64 = 5;
pub const XP_PER_STREAK_DAY: u64 = 15;

/// Raw counts the narrative is built from
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NarrativeInputs {
    pub answers: u64,
    pub logs: u64,
    pub current_streak: u32,
    pub longest_streak: u32,
    pub active_days: u32,
    pub has_archetype: bool,
}

/// (current, longest) runs of consecutive days. The current run counts only
/// if it reaches today or yesterday.
pub fn streaks(days: &BTreeSet<NaiveDate>, today: NaiveDate) -> (u32, u32) {
    let mut longest = 0;
    let mut run = 0;
    let mut previous: Option<NaiveDate> = None;

    for day in days.iter().copied().filter(|d| *d <= today) {
        run = match previous.and_then(|p| p.succ_opt()) {
            Some(next) if next == day => run + 1,
            _ => 1,
        };
        longest = longest.max(run);
        previous = Some(day);
    }

    let current = match previous {
        Some(last) if last == today || last.succ_opt() == Some(today) => run,
        _ => 0,
    };
    (current, longest)
}

impl NarrativeInputs {
    /// Counts from everything created at or before `as_of`, with days taken in the user's timezone
    pub fn from_history(history: &History, as_of: DateTime<Utc>, tz: Tz, has_archetype: bool) -> Self {
        let history = history.as_of(as_of);
        let local_day = |at: &DateTime<Utc>| at.with_timezone(&tz).date_naive();

        let days: BTreeSet<NaiveDate> = history
            .logs
            .iter()
            .map(|l| local_day(&l.created_at))
            .chain(history.answers.iter().map(|a| local_day(&a.created_at)))
            .collect();
        let (current_streak, longest_streak) = streaks(&days, local_day(&as_of));

        Self {
            answers: history.answers.len() as u64,
            logs: history.logs.len() as u64,
            current_streak,
            longest_streak,
            active_days: days.len() as u32,
            has_archetype,
        }
    }

    pub fn total_xp(&self) -> u64 {
        self.answers * XP_PER_ANSWER
            + self.logs * XP_PER_LOG
            + self.longest_streak as u64 * XP_PER_STREAK_DAY
    }
}

/// Total XP needed to reach `level`. Leaving level L costs (L + 1) * 100.
pub fn xp_for_level(level: u32) -> u64 {
    let l = level.max(1) as u64;
    50 * (l - 1) * (l + 2)
}

pub fn level_for(xp: u64) -> u32 {
    let mut level = 1;
    while xp >= xp_for_level(level + 1) {
        level += 1;
    }
    level
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum EvolutionStage {
    Seedling,
    Sprout,
    Sapling,
    Bloom,
    Grove,
    #[serde(rename = "Ancient Forest")]
    AncientForest,
}

const STAGES: &[(u32, EvolutionStage)] = &[
    (25, EvolutionStage::AncientForest),
    (15, EvolutionStage::Grove),
    (10, EvolutionStage::Bloom),
    (6, EvolutionStage::Sapling),
    (3, EvolutionStage::Sprout),
];

pub fn evolution_stage(level: u32) -> EvolutionStage {
    STAGES
        .iter()
        .find(|(from, _)| level >= *from)
        .map(|(_, stage)| *stage)
        .unwrap_or(EvolutionStage::Seedling)
}

/// Story arcs by first level, in order
pub const ARCS: &[(u32, &str)] = &[
    (1, "The Awakening"),
    (4, "The Path Unfolds"),
    (8, "Trials of Reflection"),
    (13, "The Deepening"),
    (21, "Integration"),
];

/// Index into `ARCS` for a level
pub fn arc_index(level: u32) -> usize {
    ARCS.iter().rposition(|(from, _)| level >= *from).unwrap_or(0)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Milestone {
    pub level: u32,
    pub title: String,
    pub xp_remaining: u64,
}

pub fn next_milestone(level: u32, xp: u64) -> Milestone {
    let (level, title) = match ARCS.get(arc_index(level) + 1) {
        Some((from, title)) => (*from, title.to_string()),
        None => (level + 1, format!("Level {}", level + 1)),
    };
    Milestone {
        level,
        title,
        xp_remaining: xp_for_level(level).saturating_sub(xp),
    }
}

pub struct AchievementDef {
    pub id: &'static str,
    pub title: &'static str,
    pub description: &'static str,
    pub qualifies: fn(&NarrativeInputs, u32) -> bool,
}

pub static ACHIEVEMENTS: &[AchievementDef] = &[
    AchievementDef {
        id: "first_answer",
        title: "First Words",
        description: "Answered your first question",
        qualifies: |i, _| i.answers >= 1,
    },
    AchievementDef {
        id: "answers_10",
        title: "Finding Your Voice",
        description: "Answered 10 questions",
        qualifies: |i, _| i.answers >= 10,
    },
    AchievementDef {
        id: "answers_100",
        title: "Open Book",
        description: "Answered 100 questions",
        qualifies: |i, _| i.answers >= 100,
    },
    AchievementDef {
        id: "first_log",
        title: "First Steps",
        description: "Logged your first entry",
        qualifies: |i, _| i.logs >= 1,
    },
    AchievementDef {
        id: "logs_50",
        title: "Chronicler",
        description: "Logged 50 entries",
        qualifies: |i, _| i.logs >= 50,
    },
    AchievementDef {
        id: "streak_3",
        title: "Three in a Row",
        description: "Checked in three days running",
        qualifies: |i, _| i.longest_streak >= 3,
    },
    AchievementDef {
        id: "streak_7",
        title: "Week Strong",
        description: "Checked in every day for a week",
        qualifies: |i, _| i.longest_streak >= 7,
    },
    AchievementDef {
        id: "streak_30",
        title: "Month of Momentum",
        description: "Checked in every day for 30 days",
        qualifies: |i, _| i.longest_streak >= 30,
    },
    AchievementDef {
        id: "active_14_days",
        title: "Regular",
        description: "Showed up on 14 different days",
        qualifies: |i, _| i.active_days >= 14,
    },
    AchievementDef {
        id: "archetype_revealed",
        title: "Know Thyself",
        description: "Revealed your archetype",
        qualifies: |i, _| i.has_archetype,
    },
    AchievementDef {
        id: "level_5",
        title: "Taking Root",
        description: "Reached level 5",
        qualifies: |_, level| level >= 5,
    },
    AchievementDef {
        id: "level_10",
        title: "In Full Bloom",
        description: "Reached level 10",
        qualifies: |_, level| level >= 10,
    },
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Achievement {
    pub id: String,
    pub title: String,
    pub description: String,
    pub unlocked: bool,
    pub unlocked_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NarrativeState {
    pub current_level: u32,
    #[serde(rename = "totalXP")]
    pub total_xp: u64,
    pub evolution_stage: EvolutionStage,
    pub current_streak: u32,
    pub longest_streak: u32,
    pub achievements: Vec<Achievement>,
    pub current_arc: String,

    /// Chapter number, 1-based
    pub story_arc: u32,
    pub next_milestone: Milestone,
}

/// Narrative state plus the unlocks the caller must persist
#[derive(Debug, Clone, PartialEq)]
pub struct NarrativeOutcome {
    pub state: NarrativeState,
    pub newly_unlocked: Vec<(String, DateTime<Utc>)>,
}

/// XP, level, stage, arc and achievements from the inputs.
///
/// Everything is recomputed from counts except achievements, which ratchet:
/// `unlocked` is the persisted set, and the outcome lists the ids that became
/// unlocked on this pass so the caller can write them back.
pub fn build_narrative(
    inputs: &NarrativeInputs,
    unlocked: &BTreeMap<String, DateTime<Utc>>,
    as_of: DateTime<Utc>,
) -> Insight<NarrativeOutcome> {
    let records = (inputs.answers + inputs.logs) as usize;
    if records == 0 {
        return Insight::NotEnoughData {
            required: 1,
            observed: 0,
        };
    }

    let total_xp = inputs.total_xp();
    let level = level_for(total_xp);
    let arc = arc_index(level);

    let mut newly_unlocked = Vec::new();
    let achievements = ACHIEVEMENTS
        .iter()
        .map(|def| {
            let unlocked_at = match unlocked.get(def.id) {
                Some(at) => Some(*at),
                None if (def.qualifies)(inputs, level) => {
                    newly_unlocked.push((def.id.to_string(), as_of));
                    Some(as_of)
                }
                None => None,
            };
            Achievement {
                id: def.id.to_string(),
                title: def.title.to_string(),
                description: def.description.to_string(),
                unlocked: unlocked_at.is_some(),
                unlocked_at,
            }
        })
        .collect();

    Insight::Ready(NarrativeOutcome {
        state: NarrativeState {
            current_level: level,
            total_xp,
            evolution_stage: evolution_stage(level),
            current_streak: inputs.current_streak,
            longest_streak: inputs.longest_streak,
            achievements,
            current_arc: ARCS[arc].1.to_string(),
            story_arc: arc as u32 + 1,
            next_milestone: next_milestone(level, total_xp),
        },
        newly_unlocked,
    })
}
