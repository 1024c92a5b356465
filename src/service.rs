use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::Serialize;

use crate::core::{
    AchievementLedger, AnswerRecord, CoreError, History, HistoryStore, Insight, PeerProfile,
    Result, SqliteStore, TextEntry,
};
use crate::insight::archetype::{classify, CohortClassification};
use crate::insight::cohort::{find_matches, CohortMatch, MatchOptions};
use crate::insight::energy::{analyze_energy, EnergyOptions, EnergyState};
use crate::insight::intervention::{score_interventions, Intervention, InterventionOptions};
use crate::insight::lexicon::{KeywordMatcher, TagMatcher};
use crate::insight::narrative::{build_narrative, NarrativeInputs, NarrativeState};
use crate::insight::pacing::{self, PacingDecision, PacingGate};
use crate::insight::traits::{analyze, extract_profile, ExtractOptions, PsychologicalProfile};

#[derive(Debug, Clone, Default)]
pub struct InsightOptions {
    pub extract: ExtractOptions,
    pub matching: MatchOptions,
    pub energy: EnergyOptions,
    pub intervention: InterventionOptions,
}

/// Outcome of one report section
#[derive(Debug, Serialize)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum ComponentResult<T> {
    Completed { value: T },
    Failed { error: String, retryable: bool },
}

impl<T> ComponentResult<T> {
    pub fn is_completed(&self) -> bool {
        matches!(self, ComponentResult::Completed { .. })
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            ComponentResult::Completed { value } => Some(value),
            ComponentResult::Failed { .. } => None,
        }
    }
}

fn isolate<T>(component: &'static str, result: Result<T>) -> ComponentResult<T> {
    match result {
        Ok(value) => ComponentResult::Completed { value },
        Err(e) => {
            tracing::error!(component, error = %e, retryable = e.is_retryable(), "component failed");
            ComponentResult::Failed {
                error: e.to_string(),
                retryable: e.is_retryable(),
            }
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InsightReport {
    pub user_id: String,
    pub as_of: DateTime<Utc>,
    pub profile: ComponentResult<Insight<PsychologicalProfile>>,
    pub classification: ComponentResult<Insight<CohortClassification>>,
    pub matches: ComponentResult<Insight<Vec<CohortMatch>>>,
    pub pacing: ComponentResult<PacingDecision>,
    pub energy: ComponentResult<Insight<EnergyState>>,
    pub intervention: ComponentResult<Insight<Option<Intervention>>>,
    pub narrative: ComponentResult<Insight<NarrativeState>>,
}

/// Per-user facade over the store and every analyzer.
///
/// Each method loads what it needs fresh from the store. `report` runs all of
/// them and isolates failures per component.
pub struct InsightService<S, M = KeywordMatcher> {
    store: S,
    matcher: M,
    tz: Tz,
    options: InsightOptions,
    gate: PacingGate,
}

impl<S> InsightService<S, KeywordMatcher>
where
    S: HistoryStore + AchievementLedger,
{
    pub fn new(store: S, tz: Tz) -> Self {
        Self::with_matcher(store, KeywordMatcher::default(), tz)
    }
}

impl<S, M> InsightService<S, M>
where
    S: HistoryStore + AchievementLedger,
    M: TagMatcher,
{
    pub fn with_matcher(store: S, matcher: M, tz: Tz) -> Self {
        Self {
            store,
            matcher,
            tz,
            options: InsightOptions::default(),
            gate: PacingGate::new(),
        }
    }

    pub fn with_options(mut self, options: InsightOptions) -> Self {
        self.options = options;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    fn history(&self, user_id: &str, as_of: DateTime<Utc>) -> Result<History> {
        let history = self.store.load_history(user_id)?;
        if history.rejected > 0 {
            tracing::warn!(user_id, rejected = history.rejected, "history loaded with rejected rows");
        }
        Ok(history.as_of(as_of))
    }

    fn entries(&self, user_id: &str, as_of: DateTime<Utc>) -> Result<Vec<TextEntry>> {
        Ok(self.history(user_id, as_of)?.entries())
    }

    fn windowed<'a>(&self, entries: &'a [TextEntry]) -> &'a [TextEntry] {
        match self.options.extract.window {
            Some(window) if entries.len() > window => &entries[entries.len() - window..],
            _ => entries,
        }
    }

    pub fn profile(&self, user_id: &str, as_of: DateTime<Utc>) -> Result<Insight<PsychologicalProfile>> {
        let entries = self.entries(user_id, as_of)?;
        Ok(extract_profile(&entries, &self.matcher, &self.options.extract))
    }

    pub fn classification(
        &self,
        user_id: &str,
        as_of: DateTime<Utc>,
    ) -> Result<Insight<CohortClassification>> {
        Ok(self.profile(user_id, as_of)?.map(|profile| classify(&profile)))
    }

    pub fn matches(&self, user_id: &str, as_of: DateTime<Utc>) -> Result<Insight<Vec<CohortMatch>>> {
        let entries = self.entries(user_id, as_of)?;
        let vector = analyze(self.windowed(&entries), &self.matcher).trait_vector();
        let peers = self.store.peers()?;
        Ok(find_matches(user_id, &vector, &peers, &self.options.matching))
    }

    pub fn pacing(&self, user_id: &str, as_of: DateTime<Utc>) -> Result<PacingDecision> {
        pacing::decide(&self.store, user_id, as_of, self.tz)
    }

    pub fn energy(&self, user_id: &str, as_of: DateTime<Utc>) -> Result<Insight<EnergyState>> {
        let entries = self.entries(user_id, as_of)?;
        Ok(analyze_energy(&entries, &self.matcher, as_of, &self.options.energy))
    }

    pub fn intervention(
        &self,
        user_id: &str,
        as_of: DateTime<Utc>,
    ) -> Result<Insight<Option<Intervention>>> {
        let entries = self.entries(user_id, as_of)?;
        Ok(score_interventions(
            &entries,
            &self.matcher,
            as_of,
            &self.options.intervention,
        ))
    }

    /// Narrative state. New unlocks are written to the ledger before returning.
    pub fn narrative(&self, user_id: &str, as_of: DateTime<Utc>) -> Result<Insight<NarrativeState>> {
        let history = self.history(user_id, as_of)?;
        let has_archetype = extract_profile(
            self.windowed(&history.entries()),
            &self.matcher,
            &self.options.extract,
        )
        .is_ready();

        let inputs = NarrativeInputs::from_history(&history, as_of, self.tz, has_archetype);
        let unlocked = self.store.unlocked_achievements(user_id)?;

        match build_narrative(&inputs, &unlocked, as_of) {
            Insight::Ready(outcome) => {
                if !outcome.newly_unlocked.is_empty() {
                    self.store.record_unlocks(user_id, &outcome.newly_unlocked)?;
                    for (id, _) in &outcome.newly_unlocked {
                        tracing::info!(user_id, achievement = %id, "achievement unlocked");
                    }
                }
                Ok(Insight::Ready(outcome.state))
            }
            Insight::NotEnoughData { required, observed } => {
                Ok(Insight::NotEnoughData { required, observed })
            }
        }
    }

    /// Every section computed independently; failures are reported per section
    pub fn report(&self, user_id: &str, as_of: DateTime<Utc>) -> InsightReport {
        tracing::debug!(user_id, %as_of, "building report");

        InsightReport {
            user_id: user_id.to_string(),
            as_of,
            profile: isolate("profile", self.profile(user_id, as_of)),
            classification: isolate("classification", self.classification(user_id, as_of)),
            matches: isolate("matches", self.matches(user_id, as_of)),
            pacing: isolate("pacing", self.pacing(user_id, as_of)),
            energy: isolate("energy", self.energy(user_id, as_of)),
            intervention: isolate("intervention", self.intervention(user_id, as_of)),
            narrative: isolate("narrative", self.narrative(user_id, as_of)),
        }
    }
}

impl<M: TagMatcher> InsightService<SqliteStore, M> {
    /// Store an answer only if today's quota allows another prompt.
    ///
    /// The count, the decision and the insert share one immediate transaction,
    /// so other services on the same database file wait instead of reading a
    /// stale count. The per-user gate is taken inside the transaction.
    pub fn submit_answer(&self, answer: &AnswerRecord) -> Result<PacingDecision> {
        self.store.with_write_lock(|| {
            self.gate
                .decide_and_record(&self.store, &answer.user_id, answer.created_at, self.tz, || {
                    self.store.insert_answer(answer)
                })
        })
    }

    /// Compute the user's trait vector and publish it to the peer directory
    pub fn publish_peer_vector(
        &self,
        user_id: &str,
        display_name: &str,
        as_of: DateTime<Utc>,
    ) -> Result<PeerProfile> {
        let history = self.history(user_id, as_of)?;
        if history.is_empty() {
            return Err(CoreError::NotFound(format!("no history for user {}", user_id)));
        }

        let entries = history.entries();
        let peer = PeerProfile {
            user_id: user_id.to_string(),
            display_name: display_name.to_string(),
            joined_at: history.first_activity().unwrap_or(as_of),
            vector: analyze(self.windowed(&entries), &self.matcher).trait_vector(),
        };
        self.store.upsert_peer(&peer)?;
        tracing::info!(user_id, tags = peer.vector.distinct_tags(), "peer vector published");
        Ok(peer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{LogRecord, RawAnswerRow, RawLogRow};
    use chrono::{Duration, TimeZone};
    use std::collections::BTreeMap;

    fn as_of() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 12, 20, 0, 0).unwrap()
    }

    const JOURNAL: &[&str] = &[
        "Tofu salad for lunch, reflecting on the week",
        "Lentil curry, I feel calm and grateful",
        "Vegan pancakes and a walk in the park",
        "Journaling about what I want to learn",
        "Quinoa bowl, quiet evening",
        "Thinking about how to grow",
    ];

    fn seeded_store() -> SqliteStore {
        let store = SqliteStore::in_memory().unwrap();
        for (i, text) in JOURNAL.iter().enumerate() {
            let at = as_of() - Duration::days(JOURNAL.len() as i64 - i as i64);
            store
                .insert_log(&LogRecord::new("u1", "journal", Some(text.to_string()), at))
                .unwrap();
        }
        store
            .insert_answer(&AnswerRecord::new(
                "u1",
                "How was today?",
                "Good, a happy walk outside",
                as_of() - Duration::hours(3),
            ))
            .unwrap();
        store
    }

    fn peer(id: &str, counts: &[(&str, u32)]) -> PeerProfile {
        let mut vector = crate::core::TraitVector::new();
        for (tag, n) in counts {
            vector.add(tag, *n);
        }
        PeerProfile {
            user_id: id.to_string(),
            display_name: id.to_uppercase(),
            joined_at: as_of() - Duration::days(30),
            vector,
        }
    }

    #[test]
    fn test_full_report() {
        let service = InsightService::new(seeded_store(), Tz::UTC);
        service
            .publish_peer_vector("u1", "Me", as_of())
            .unwrap();
        service
            .store()
            .upsert_peer(&peer("u2", &[("plantBased", 3), ("reflective", 2)]))
            .unwrap();

        let report = service.report("u1", as_of());

        let profile = report.profile.value().unwrap().clone().ready().unwrap();
        assert_eq!(profile.count("plantBased"), 4);
        assert!(report.classification.value().unwrap().is_ready());

        let matches = report.matches.value().unwrap().clone().ready().unwrap();
        let ids: Vec<_> = matches.iter().map(|m| m.user_id.as_str()).collect();
        assert_eq!(ids, vec!["u2"]);

        let pacing = report.pacing.value().unwrap();
        assert_eq!(pacing.prompts_shown_today, 1);
        assert!(report.energy.value().unwrap().is_ready());
        assert_eq!(report.intervention.value().unwrap(), &Insight::Ready(None));
        assert!(report.narrative.value().unwrap().is_ready());

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["pacing"]["outcome"], "completed");
        assert_eq!(json["profile"]["value"]["status"], "ready");
    }

    #[test]
    fn test_brand_new_user() {
        let service = InsightService::new(SqliteStore::in_memory().unwrap(), Tz::UTC);
        let report = service.report("nobody", as_of());

        assert!(!report.profile.value().unwrap().is_ready());
        assert!(!report.matches.value().unwrap().is_ready());
        assert!(!report.energy.value().unwrap().is_ready());
        assert!(!report.intervention.value().unwrap().is_ready());
        assert!(!report.narrative.value().unwrap().is_ready());

        let pacing = report.pacing.value().unwrap();
        assert!(pacing.should_show_prompt);
        assert_eq!(pacing.day_number, 1);
    }

    /// Delegates to a real store except for the parts told to fail
    struct PartialOutage {
        inner: SqliteStore,
        peers_down: bool,
        ledger_down: bool,
    }

    fn unavailable() -> CoreError {
        CoreError::StoreUnavailable("connection refused".to_string())
    }

    impl HistoryStore for PartialOutage {
        fn log_rows(&self, user_id: &str) -> Result<Vec<RawLogRow>> {
            self.inner.log_rows(user_id)
        }

        fn answer_rows(&self, user_id: &str) -> Result<Vec<RawAnswerRow>> {
            self.inner.answer_rows(user_id)
        }

        fn first_answer_at(&self, user_id: &str) -> Result<Option<DateTime<Utc>>> {
            self.inner.first_answer_at(user_id)
        }

        fn count_answers_between(&self, user_id: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<usize> {
            self.inner.count_answers_between(user_id, start, end)
        }

        fn peers(&self) -> Result<Vec<PeerProfile>> {
            if self.peers_down {
                return Err(unavailable());
            }
            self.inner.peers()
        }
    }

    impl AchievementLedger for PartialOutage {
        fn unlocked_achievements(&self, user_id: &str) -> Result<BTreeMap<String, DateTime<Utc>>> {
            if self.ledger_down {
                return Err(unavailable());
            }
            self.inner.unlocked_achievements(user_id)
        }

        fn record_unlocks(&self, user_id: &str, unlocks: &[(String, DateTime<Utc>)]) -> Result<()> {
            if self.ledger_down {
                return Err(unavailable());
            }
            self.inner.record_unlocks(user_id, unlocks)
        }
    }

    #[test]
    fn test_failures_are_isolated_per_component() {
        let store = PartialOutage {
            inner: seeded_store(),
            peers_down: true,
            ledger_down: true,
        };
        let report = InsightService::new(store, Tz::UTC).report("u1", as_of());

        match &report.matches {
            ComponentResult::Failed { retryable, .. } => assert!(retryable),
            other => panic!("expected failure, got {:?}", other),
        }
        assert!(!report.narrative.is_completed());

        assert!(report.profile.is_completed());
        assert!(report.pacing.is_completed());
        assert!(report.energy.is_completed());
        assert!(report.intervention.is_completed());
    }

    #[test]
    fn test_narrative_persists_unlocks() {
        let service = InsightService::new(seeded_store(), Tz::UTC);
        let state = service.narrative("u1", as_of()).unwrap().ready().unwrap();
        assert!(state
            .achievements
            .iter()
            .any(|a| a.id == "first_answer" && a.unlocked));

        let stored = service.store().unlocked_achievements("u1").unwrap();
        assert_eq!(stored.get("first_answer"), Some(&as_of()));

        // looking back to before the answer existed does not re-lock it
        let earlier = as_of() - Duration::days(1);
        let state = service.narrative("u1", earlier).unwrap().ready().unwrap();
        let first_answer = state
            .achievements
            .iter()
            .find(|a| a.id == "first_answer")
            .unwrap();
        assert!(first_answer.unlocked);
        assert_eq!(first_answer.unlocked_at, Some(as_of()));
    }

    #[test]
    fn test_submit_answer_respects_quota() {
        let service = InsightService::new(SqliteStore::in_memory().unwrap(), Tz::UTC);
        // Tuesday, day 1: quota 10
        let morning = Utc.with_ymd_and_hms(2024, 3, 5, 8, 0, 0).unwrap();

        for i in 0..12 {
            let answer = AnswerRecord::new("u1", "q", "a", morning + Duration::minutes(i));
            let decision = service.submit_answer(&answer).unwrap();
            assert_eq!(decision.should_show_prompt, i < 10);
        }

        let evening = Utc.with_ymd_and_hms(2024, 3, 5, 22, 0, 0).unwrap();
        let decision = service.pacing("u1", evening).unwrap();
        assert_eq!(decision.prompts_shown_today, 10);
        assert!(!decision.should_show_prompt);
    }

    #[test]
    fn test_submit_answer_quota_holds_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("shared.db");
        SqliteStore::new(db.clone()).unwrap();

        // Tuesday, day 1: quota 10
        let morning = Utc.with_ymd_and_hms(2024, 3, 5, 8, 0, 0).unwrap();

        let accepted: usize = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|worker| {
                    let db = db.clone();
                    scope.spawn(move || {
                        let service = InsightService::new(SqliteStore::new(db).unwrap(), Tz::UTC);
                        (0..6)
                            .filter(|&i| {
                                let at = morning + Duration::seconds(worker * 10 + i);
                                let answer = AnswerRecord::new("u1", "q", "a", at);
                                service.submit_answer(&answer).unwrap().should_show_prompt
                            })
                            .count()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).sum()
        });

        let store = SqliteStore::new(db).unwrap();
        assert_eq!(accepted, 10);
        assert_eq!(store.load_history("u1").unwrap().answers.len(), 10);
    }

    #[test]
    fn test_publish_requires_history() {
        let service = InsightService::new(SqliteStore::in_memory().unwrap(), Tz::UTC);
        assert!(matches!(
            service.publish_peer_vector("ghost", "Ghost", as_of()),
            Err(CoreError::NotFound(_))
        ));
    }
}
