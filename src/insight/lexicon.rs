use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

macro_rules! tag_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $label:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "camelCase")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// Stable camelCase identifier, as used in pattern counts
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $label),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

tag_enum!(
    /// Day-to-day lifestyle tendencies
    BehavioralTag {
        PlantBased => "plantBased",
        ProteinFocused => "proteinFocused",
        Adventurous => "adventurous",
        HealthConscious => "healthConscious",
        TimeConscious => "timeConscious",
        ComfortSeeker => "comfortSeeker",
        Traditional => "traditional",
        WarmPreference => "warmPreference",
    }
);

tag_enum!(
    /// Recurring emotional themes in reflective writing
    EmotionalPattern {
        GrowthOriented => "growthOriented",
        Reflective => "reflective",
        ConnectionSeeking => "connectionSeeking",
        Achievement => "achievement",
        Grounded => "grounded",
        PeaceSeeking => "peaceSeeking",
        Creative => "creative",
        AutonomyDriven => "autonomyDriven",
        EmotionallyAware => "emotionallyAware",
    }
);

tag_enum!(
    CoreValue {
        Growth => "growth",
        Connection => "connection",
        Meaning => "meaning",
        Harmony => "harmony",
        Freedom => "freedom",
        Vitality => "vitality",
        Security => "security",
        Authenticity => "authenticity",
    }
);

tag_enum!(
    /// Activities that refill energy
    NeedCategory {
        Rest => "rest",
        Movement => "movement",
        Connection => "connection",
        Nature => "nature",
        Creativity => "creativity",
        Play => "play",
    }
);

tag_enum!(
    /// Signals that a user may be struggling
    StruggleSignal {
        Crisis => "crisis",
        Burnout => "burnout",
        Isolation => "isolation",
        Anxiety => "anxiety",
        Sleep => "sleep",
        LowMotivation => "lowMotivation",
    }
);

impl BehavioralTag {
    pub fn describe(&self) -> &'static str {
        match self {
            BehavioralTag::PlantBased => "Leans toward plant-based meals",
            BehavioralTag::ProteinFocused => "Builds meals around protein",
            BehavioralTag::Adventurous => "Enjoys trying new things",
            BehavioralTag::HealthConscious => "Keeps health front of mind",
            BehavioralTag::TimeConscious => "Optimizes for busy days",
            BehavioralTag::ComfortSeeker => "Finds comfort in familiar treats",
            BehavioralTag::Traditional => "Values traditional, home-cooked food",
            BehavioralTag::WarmPreference => "Gravitates to warm food and drinks",
        }
    }
}

impl EmotionalPattern {
    pub fn describe(&self) -> &'static str {
        match self {
            EmotionalPattern::GrowthOriented => "Focused on personal growth",
            EmotionalPattern::Reflective => "Takes time to reflect",
            EmotionalPattern::ConnectionSeeking => "Seeks closeness with others",
            EmotionalPattern::Achievement => "Motivated by accomplishment",
            EmotionalPattern::Grounded => "Stays grounded in routine",
            EmotionalPattern::PeaceSeeking => "Looks for calm and quiet",
            EmotionalPattern::Creative => "Expresses themselves creatively",
            EmotionalPattern::AutonomyDriven => "Values doing things their own way",
            EmotionalPattern::EmotionallyAware => "Names and notices feelings",
        }
    }
}

impl CoreValue {
    pub fn describe(&self) -> &'static str {
        match self {
            CoreValue::Growth => "Cares about becoming better",
            CoreValue::Connection => "Cares deeply about relationships",
            CoreValue::Meaning => "Searches for meaning and purpose",
            CoreValue::Harmony => "Values balance and harmony",
            CoreValue::Freedom => "Values freedom and flexibility",
            CoreValue::Vitality => "Values energy and vitality",
            CoreValue::Security => "Values stability and security",
            CoreValue::Authenticity => "Values staying true to themselves",
        }
    }
}

/// Human-readable description for any tag identifier, or None for unknown tags
pub fn describe_tag(tag: &str) -> Option<&'static str> {
    BehavioralTag::ALL
        .iter()
        .find(|t| t.as_str() == tag)
        .map(BehavioralTag::describe)
        .or_else(|| {
            EmotionalPattern::ALL
                .iter()
                .find(|t| t.as_str() == tag)
                .map(EmotionalPattern::describe)
        })
        .or_else(|| {
            CoreValue::ALL
                .iter()
                .find(|t| t.as_str() == tag)
                .map(CoreValue::describe)
        })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Polarity {
    Positive,
    Neutral,
    Challenging,
}

/// Everything one entry's text hits. A tag appears at most once per entry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TagHits {
    pub behavioral: BTreeSet<BehavioralTag>,
    pub patterns: BTreeSet<EmotionalPattern>,
    pub values: BTreeSet<CoreValue>,
    pub needs: BTreeSet<NeedCategory>,
    pub struggles: BTreeSet<StruggleSignal>,

    /// Number of distinct positive keywords hit
    pub positive: u32,

    /// Number of distinct challenging keywords hit
    pub challenging: u32,

    pub draining: bool,
    pub romance: bool,
}

impl TagHits {
    pub fn polarity(&self) -> Polarity {
        match self.positive.cmp(&self.challenging) {
            std::cmp::Ordering::Greater => Polarity::Positive,
            std::cmp::Ordering::Less => Polarity::Challenging,
            std::cmp::Ordering::Equal => Polarity::Neutral,
        }
    }

    pub fn replenishing(&self) -> bool {
        !self.needs.is_empty() || self.polarity() == Polarity::Positive
    }

    pub fn depleting(&self) -> bool {
        self.draining || self.polarity() == Polarity::Challenging
    }
}

/// The narrow text → tags interface every analyzer depends on.
///
/// Analyzers never look at raw text themselves; they ask a `TagMatcher` which
/// tags an entry hits and aggregate from there.
pub trait TagMatcher {
    fn scan(&self, text: &str) -> TagHits;
}

const BEHAVIORAL_KEYWORDS: &[(BehavioralTag, &[&str])] = &[
    (BehavioralTag::PlantBased, &["vegan", "vegetarian", "plant based", "tofu", "lentil", "salad", "veggie", "chickpea", "tempeh", "quinoa"]),
    (BehavioralTag::ProteinFocused, &["protein", "chicken breast", "steak", "eggs", "whey", "macros", "lean meat", "gains "]),
    (BehavioralTag::Adventurous, &["tried new", "try something new", "new restaurant", "adventur", "exotic", "spicy", "explor", "travel", "first time", "spontaneous"]),
    (BehavioralTag::HealthConscious, &["healthy", "nutrition", "vitamin", "workout", "exercise", "hydrat", "calorie", "wellness", "gym ", "jog"]),
    (BehavioralTag::TimeConscious, &["quick", "busy", "meal prep", "no time", "rushed", "schedule", "efficient", "on the go", "grab and go"]),
    (BehavioralTag::ComfortSeeker, &["comfort", "cozy", "cosy", "mac and cheese", "pizza", "ice cream", "treat myself", "snack", "binge", "chocolate"]),
    (BehavioralTag::Traditional, &["tradition", "grandma", "grandmother", "family recipe", "homemade", "classic", "home cooked", "sunday roast", "heritage"]),
    (BehavioralTag::WarmPreference, &["soup", "stew", "hot tea", "warm", "coffee", "curry", "broth", "ramen", "oatmeal"]),
];

const PATTERN_KEYWORDS: &[(EmotionalPattern, &[&str])] = &[
    (EmotionalPattern::GrowthOriented, &["grow", "improv", "learn", "progress", "better version", "develop", "challenge myself", "goal"]),
    (EmotionalPattern::Reflective, &["reflect", "realiz", "realis", "thinking about", "looking back", "noticed", "wonder", "journal", "insight", "understand"]),
    (EmotionalPattern::ConnectionSeeking, &["friend", "family", "together", "talked with", "missed", "missing", "community", "reach out", "reached out", "hang out"]),
    (EmotionalPattern::Achievement, &["accomplish", "achiev", "finished", "completed", "proud", "promotion", "won ", "milestone", "nailed", "crushed it"]),
    (EmotionalPattern::Grounded, &["grounded", "present moment", "being present", "routine", "stable", "steady", "rooted", "centered", "centred"]),
    (EmotionalPattern::PeaceSeeking, &["peace", "calm", "quiet", "relax", "serene", "meditat", "breath", "slow down", "stillness"]),
    (EmotionalPattern::Creative, &["creat", "paint", "draw", "writ", "music", "design", "craft", "compos", "sketch", "poem"]),
    (EmotionalPattern::AutonomyDriven, &["my own", "independen", "on my terms", "decided to", "my choice", "boundar", "self reliant", "solo "]),
    (EmotionalPattern::EmotionallyAware, &["i feel", "i felt", "feeling", "emotion", "mood", "vulnerab", "acknowledg", "sad ", "upset", "grateful"]),
];

const VALUE_KEYWORDS: &[(CoreValue, &[&str])] = &[
    (CoreValue::Growth, &["growth", "learn", "potential", "evolv", "better person", "self improvement"]),
    (CoreValue::Connection, &["connect", "belong", "love", "relationship", "bond", "friendship"]),
    (CoreValue::Meaning, &["meaning", "purpose", "what matters", "legacy", "calling", "significan"]),
    (CoreValue::Harmony, &["harmony", "balance", "peaceful", "getting along", "compromise"]),
    (CoreValue::Freedom, &["freedom", "free ", "flexib", "spontan", "no rules"]),
    (CoreValue::Vitality, &["energ", "alive", "vital", "strong", "fit ", "active"]),
    (CoreValue::Security, &["safe", "secur", "stabil", "savings", "budget", "reliable", "plan ahead"]),
    (CoreValue::Authenticity, &["authentic", "true to myself", "honest", "genuine", "real me"]),
];

const NEED_KEYWORDS: &[(NeedCategory, &[&str])] = &[
    (NeedCategory::Rest, &["nap", "slept well", "sleep in", "slept in", "rest ", "rested", "resting", "day off", "early night", "recharg"]),
    (NeedCategory::Movement, &["walk", "run ", "ran ", "running", "yoga", "gym ", "workout", "swim", "bike", "stretch", "danc", "hike", "hiking"]),
    (NeedCategory::Connection, &["friend", "family", "dinner with", "lunch with", "call with", "talked to", "hang out", "hung out", "visited", "together"]),
    (NeedCategory::Nature, &["park ", "forest", "beach", "garden", "outside", "outdoors", "sunshine", "mountain", "lake", "trail"]),
    (NeedCategory::Creativity, &["paint", "draw", "writ", "music", "guitar", "piano", "craft", "sketch", "bake", "baking", "knit"]),
    (NeedCategory::Play, &["game", "play", "fun ", "movie", "party", "laugh", "hobby", "puzzle"]),
];

const STRUGGLE_KEYWORDS: &[(StruggleSignal, &[&str])] = &[
    (StruggleSignal::Crisis, &["hopeless", "cant go on", "no point in anything", "worthless", "give up on everything", "want to disappear", "end it all"]),
    (StruggleSignal::Burnout, &["burned out", "burnt out", "burnout", "running on empty", "exhausted", "cant keep up", "drained"]),
    (StruggleSignal::Isolation, &["lonely", "loneliness", "isolated", "no one to talk", "nobody cares", "left out", "all alone"]),
    (StruggleSignal::Anxiety, &["anxious", "anxiety", "panic", "overwhelm", "worried", "nervous", "on edge"]),
    (StruggleSignal::Sleep, &["insomnia", "cant sleep", "couldnt sleep", "no sleep", "sleepless", "awake all night", "tossing and turning"]),
    (StruggleSignal::LowMotivation, &["unmotivated", "procrastinat", "no motivation", "stuck", "bored", "meh ", "pointless"]),
];

const POSITIVE_KEYWORDS: &[&str] = &[
    "happy", "great", "good ", "love", "joy", "excit", "grateful", "proud", "wonderful", "amazing", "fun ", "enjoy", "glad", "content ", "delight",
];

const CHALLENGING_KEYWORDS: &[&str] = &[
    "sad ", "stress", "anxious", "angry", "tired", "exhaust", "lonely", "frustrat", "worr", "hard day", "difficult", "awful", "terrible", "hurt", "overwhelm", "bad ",
];

const DRAIN_KEYWORDS: &[&str] = &[
    "exhaust", "drained", "overwork", "deadline", "no sleep", "burn", "stressed", "overtime", "long day", "too much", "overwhelm",
];

const ROMANCE_KEYWORDS: &[&str] = &[
    "date night", "partner", "wife", "husband", "boyfriend", "girlfriend", "romantic", "anniversary", "kiss", "cuddl", "spouse", "fiance",
];

/// Lowercase, drop apostrophes, collapse everything else to single spaces, pad both ends
pub fn normalize(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push(' ');
    for c in text.chars() {
        if c == '\'' || c == '\u{2019}' {
            continue;
        }
        if c.is_alphanumeric() {
            out.extend(c.to_lowercase());
        } else if !out.ends_with(' ') {
            out.push(' ');
        }
    }
    if !out.ends_with(' ') {
        out.push(' ');
    }
    out
}

fn hits_any(normalized: &str, needles: &[String]) -> bool {
    needles.iter().any(|n| normalized.contains(n.as_str()))
}

fn matching<T: Copy + Ord>(normalized: &str, table: &[(T, Vec<String>)]) -> BTreeSet<T> {
    table
        .iter()
        .filter(|(_, needles)| hits_any(normalized, needles))
        .map(|(tag, _)| *tag)
        .collect()
}

fn prepare(keywords: &[&str]) -> Vec<String> {
    keywords.iter().map(|kw| format!(" {}", kw)).collect()
}

fn prepare_table<T: Copy>(table: &[(T, &[&str])]) -> Vec<(T, Vec<String>)> {
    table.iter().map(|(tag, kws)| (*tag, prepare(kws))).collect()
}

/// Keyword-table implementation of `TagMatcher`.
///
/// Keywords are matched against normalized text (lowercase, apostrophes
/// dropped, everything else non-alphanumeric turned into spaces) as word
/// prefixes: `meditat` hits "meditating" but not "premeditated". A trailing
/// space pins a keyword to a whole word (`won ` does not hit "wonder").
#[derive(Debug, Clone)]
pub struct KeywordMatcher {
    behavioral: Vec<(BehavioralTag, Vec<String>)>,
    patterns: Vec<(EmotionalPattern, Vec<String>)>,
    values: Vec<(CoreValue, Vec<String>)>,
    needs: Vec<(NeedCategory, Vec<String>)>,
    struggles: Vec<(StruggleSignal, Vec<String>)>,
    positive: Vec<String>,
    challenging: Vec<String>,
    drain: Vec<String>,
    romance: Vec<String>,
}

impl Default for KeywordMatcher {
    fn default() -> Self {
        Self {
            behavioral: prepare_table(BEHAVIORAL_KEYWORDS),
            patterns: prepare_table(PATTERN_KEYWORDS),
            values: prepare_table(VALUE_KEYWORDS),
            needs: prepare_table(NEED_KEYWORDS),
            struggles: prepare_table(STRUGGLE_KEYWORDS),
            positive: prepare(POSITIVE_KEYWORDS),
            challenging: prepare(CHALLENGING_KEYWORDS),
            drain: prepare(DRAIN_KEYWORDS),
            romance: prepare(ROMANCE_KEYWORDS),
        }
    }
}

impl TagMatcher for KeywordMatcher {
    fn scan(&self, text: &str) -> TagHits {
        let normalized = normalize(text);

        let count = |needles: &[String]| -> u32 {
            needles
                .iter()
                .filter(|n| normalized.contains(n.as_str()))
                .count() as u32
        };

        TagHits {
            behavioral: matching(&normalized, &self.behavioral),
            patterns: matching(&normalized, &self.patterns),
            values: matching(&normalized, &self.values),
            needs: matching(&normalized, &self.needs),
            struggles: matching(&normalized, &self.struggles),
            positive: count(&self.positive),
            challenging: count(&self.challenging),
            draining: hits_any(&normalized, &self.drain),
            romance: hits_any(&normalized, &self.romance),
        }
    }
}
