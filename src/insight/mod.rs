pub mod archetype;
pub mod cohort;
pub mod energy;
pub mod intervention;
pub mod lexicon;
pub mod narrative;
pub mod pacing;
pub mod traits;

pub use archetype::{classify, CohortClassification};
pub use cohort::{find_matches, CohortMatch, MatchOptions};
pub use energy::{analyze_energy, EnergyOptions, EnergyState};
pub use intervention::{score_interventions, Intervention, InterventionOptions, Severity};
pub use lexicon::{KeywordMatcher, TagHits, TagMatcher};
pub use narrative::{build_narrative, NarrativeInputs, NarrativeOutcome, NarrativeState};
pub use pacing::{decide, PacingDecision, PacingGate};
pub use traits::{extract_profile, ExtractOptions, PsychologicalProfile};
