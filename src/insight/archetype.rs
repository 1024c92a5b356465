use serde::{Deserialize, Serialize};

use crate::insight::lexicon::{BehavioralTag, CoreValue, EmotionalPattern};
use crate::insight::traits::{PsychologicalDepth, PsychologicalProfile};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CohortClassification {
    pub archetype: String,
    pub archetype_description: String,
    pub behavioral_cohort: String,
}

pub struct ArchetypeRule {
    pub name: &'static str,
    pub description: &'static str,
    pub matches: fn(&PsychologicalDepth, &[BehavioralTag]) -> bool,
}

pub struct CohortRule {
    pub name: &'static str,
    pub matches: fn(&PsychologicalProfile) -> bool,
}

pub const FALLBACK_ARCHETYPE: ArchetypeRule = ArchetypeRule {
    name: "The Wanderer",
    description: "Still finding their path. Every entry adds a little more shape to the map.",
    matches: |_, _| true,
};

pub const FALLBACK_COHORT: &str = "Balanced Lifestyle";

pub static ARCHETYPE_RULES: &[ArchetypeRule] = &[
    ArchetypeRule {
        name: "The Seeker",
        description: "Driven by growth and self-discovery, always asking what comes next.",
        matches: |d, _| {
            d.self_awareness >= 7.0
                && d.has_pattern(EmotionalPattern::GrowthOriented)
                && d.has_pattern(EmotionalPattern::Reflective)
        },
    },
    ArchetypeRule {
        name: "The Philosopher",
        description: "Turns experience into insight and looks for the meaning underneath.",
        matches: |d, _| {
            d.has_pattern(EmotionalPattern::Reflective)
                && (d.reflection_quality >= 6.0 || d.has_value(CoreValue::Meaning))
        },
    },
    ArchetypeRule {
        name: "The Nurturer",
        description: "Finds energy in caring for others and keeping people close.",
        matches: |d, _| {
            d.has_pattern(EmotionalPattern::ConnectionSeeking) && d.has_value(CoreValue::Connection)
        },
    },
    ArchetypeRule {
        name: "The Achiever",
        description: "Sets goals, tracks progress and takes pride in finishing what they start.",
        matches: |d, traits| {
            d.has_pattern(EmotionalPattern::Achievement)
                && (d.has_pattern(EmotionalPattern::GrowthOriented)
                    || d.has_value(CoreValue::Growth)
                    || traits.contains(&BehavioralTag::TimeConscious))
        },
    },
    ArchetypeRule {
        name: "The Creator",
        description: "Makes things to make sense of the world, and needs room to express it.",
        matches: |d, _| {
            d.has_pattern(EmotionalPattern::Creative)
                && (d.has_value(CoreValue::Freedom)
                    || d.has_value(CoreValue::Authenticity)
                    || d.emotional_range >= 5.0)
        },
    },
    ArchetypeRule {
        name: "The Sage",
        description: "Calm, steady and present; others lean on their sense of perspective.",
        matches: |d, _| {
            d.self_awareness >= 5.0
                && d.has_pattern(EmotionalPattern::Grounded)
                && d.has_pattern(EmotionalPattern::PeaceSeeking)
        },
    },
    ArchetypeRule {
        name: "The Free Spirit",
        description: "Follows their own compass and resists anything that feels like a cage.",
        matches: |d, traits| {
            d.has_pattern(EmotionalPattern::AutonomyDriven)
                || (d.has_value(CoreValue::Freedom) && traits.contains(&BehavioralTag::Adventurous))
        },
    },
    ArchetypeRule {
        name: "The Guardian",
        description: "Values stability and tradition, and builds safe places for others.",
        matches: |d, traits| {
            d.has_value(CoreValue::Security)
                && (traits.contains(&BehavioralTag::Traditional)
                    || d.has_pattern(EmotionalPattern::Grounded))
        },
    },
    ArchetypeRule {
        name: "The Explorer",
        description: "Curious about everything, happiest with something new on the horizon.",
        matches: |d, traits| traits.contains(&BehavioralTag::Adventurous) || d.emotional_range >= 7.0,
    },
];

pub static COHORT_RULES: &[CohortRule] = &[
    CohortRule {
        name: "Plant-Powered Wellness",
        matches: |p| p.count("plantBased") >= 3 && p.count("healthConscious") >= 3,
    },
    CohortRule {
        name: "Performance Fuelers",
        matches: |p| p.count("proteinFocused") >= 3,
    },
    CohortRule {
        name: "Culinary Adventurers",
        matches: |p| p.count("adventurous") >= 3,
    },
    CohortRule {
        name: "Busy Optimizers",
        matches: |p| p.count("timeConscious") >= 3,
    },
    CohortRule {
        name: "Comfort Traditionalists",
        matches: |p| p.count("comfortSeeker") >= 3 || p.count("traditional") >= 3,
    },
    CohortRule {
        name: "Cozy Warmth Seekers",
        matches: |p| p.count("warmPreference") >= 3,
    },
    CohortRule {
        name: "Mindful Eaters",
        matches: |p| p.count("healthConscious") >= 3,
    },
    CohortRule {
        name: "Plant-Curious",
        matches: |p| p.count("plantBased") >= 2,
    },
];

/// First matching archetype rule, or The Wanderer
pub fn classify_archetype(depth: &PsychologicalDepth, traits: &[BehavioralTag]) -> &'static ArchetypeRule {
    match ARCHETYPE_RULES.iter().find(|rule| (rule.matches)(depth, traits)) {
        Some(rule) => rule,
        None => {
            tracing::debug!("no archetype rule matched, using fallback");
            &FALLBACK_ARCHETYPE
        }
    }
}

/// First matching cohort rule, or Balanced Lifestyle
pub fn classify_cohort(profile: &PsychologicalProfile) -> &'static str {
    COHORT_RULES
        .iter()
        .find(|rule| (rule.matches)(profile))
        .map(|rule| rule.name)
        .unwrap_or(FALLBACK_COHORT)
}

/// Archetype and behavioral cohort for a profile.
///
/// Both come from ordered rule tables evaluated top to bottom. The first rule
/// whose predicate holds wins, even when later rules would also match.
pub fn classify(profile: &PsychologicalProfile) -> CohortClassification {
    let archetype = classify_archetype(&profile.psychological_depth, &profile.traits);
    CohortClassification {
        archetype: archetype.name.to_string(),
        archetype_description: archetype.description.to_string(),
        behavioral_cohort: classify_cohort(profile).to_string(),
    }
}

pub fn archetype_order() -> Vec<&'static str> {
    ARCHETYPE_RULES
        .iter()
        .chain(std::iter::once(&FALLBACK_ARCHETYPE))
        .map(|rule| rule.name)
        .collect()
}

pub fn cohort_order() -> Vec<&'static str> {
    COHORT_RULES
        .iter()
        .map(|rule| rule.name)
        .chain(std::iter::once(FALLBACK_COHORT))
        .collect()
}
