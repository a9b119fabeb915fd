// 🗂️ Store - in-memory repository over the entity collection
//
// Owns one StoreState. Every write builds the new record (or merged record)
// first, checks it against the rest of the state, and only then commits it,
// so a failed call leaves the state exactly as it was.

use crate::entities::{
    Card, CardDraft, CardPatch, CreditScoreEntry, Institution, InstitutionPatch, StoreState,
};
use crate::error::{LedgerError, Result};
use chrono::{DateTime, Utc};
use tracing::{debug, info};

#[derive(Debug, Clone, Default)]
pub struct Store {
    state: StoreState,
}

impl Store {
    /// Fresh empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap a decoded state after checking its invariants
    pub fn from_state(state: StoreState) -> Result<Self> {
        state.verify_integrity()?;
        Ok(Store { state })
    }

    /// Read-only view, e.g. for the summary engine
    pub fn state(&self) -> &StoreState {
        &self.state
    }

    /// Owned copy of the whole state
    pub fn snapshot(&self) -> StoreState {
        self.state.clone()
    }

    pub fn into_state(self) -> StoreState {
        self.state
    }

    // ========================================================================
    // INSTITUTIONS
    // ========================================================================

    pub fn add_institution(
        &mut self,
        name: &str,
        website: Option<String>,
        contact: Option<String>,
        notes: Option<String>,
    ) -> Result<Institution> {
        let institution = Institution::new(name, website, contact, notes)?;
        self.ensure_name_free(&institution.name, None)?;

        info!(institution_id = %institution.id, name = %institution.name, "institution added");
        self.state.institutions.push(institution.clone());
        Ok(institution)
    }

    pub fn update_institution(&mut self, id: &str, patch: &InstitutionPatch) -> Result<Institution> {
        let index = self
            .state
            .institutions
            .iter()
            .position(|i| i.id == id)
            .ok_or_else(|| LedgerError::not_found("institution", id))?;

        let updated = self.state.institutions[index].apply(patch)?;
        // Renaming to another casing of its own name is fine
        self.ensure_name_free(&updated.name, Some(id))?;

        info!(institution_id = %id, name = %updated.name, "institution updated");
        self.state.institutions[index] = updated.clone();
        Ok(updated)
    }

    /// Remove an institution that no card references
    pub fn remove_institution(&mut self, id: &str) -> Result<Institution> {
        let index = self
            .state
            .institutions
            .iter()
            .position(|i| i.id == id)
            .ok_or_else(|| LedgerError::not_found("institution", id))?;

        let referencing = self
            .state
            .cards
            .iter()
            .filter(|c| c.institution_id == id)
            .count();
        if referencing > 0 {
            return Err(LedgerError::InUse {
                entity: "institution",
                key: self.state.institutions[index].name.clone(),
                count: referencing,
            });
        }

        let removed = self.state.institutions.remove(index);
        info!(institution_id = %id, name = %removed.name, "institution removed");
        Ok(removed)
    }

    pub fn institution(&self, id: &str) -> Option<Institution> {
        self.state.institution(id).cloned()
    }

    pub fn institution_by_name(&self, name: &str) -> Option<Institution> {
        self.state.institution_by_name(name).cloned()
    }

    pub fn list_institutions(&self) -> Vec<Institution> {
        self.state.institutions.clone()
    }

    fn ensure_name_free(&self, name: &str, except_id: Option<&str>) -> Result<()> {
        let taken = self
            .state
            .institutions
            .iter()
            .any(|i| i.matches_name(name) && Some(i.id.as_str()) != except_id);

        if taken {
            debug!(name = %name, "institution name collision");
            return Err(LedgerError::DuplicateName {
                name: name.to_string(),
            });
        }
        Ok(())
    }

    // ========================================================================
    // CARDS
    // ========================================================================

    /// Add a card issued by the institution with this name (case-insensitive)
    pub fn add_card(&mut self, institution_name: &str, draft: CardDraft) -> Result<Card> {
        let institution_id = self
            .state
            .institution_by_name(institution_name)
            .map(|i| i.id.clone())
            .ok_or_else(|| LedgerError::not_found("institution", institution_name))?;

        let card = Card::new(&institution_id, draft)?;

        info!(card_id = %card.id, institution_id = %institution_id, label = %card.label, "card added");
        self.state.cards.push(card.clone());
        Ok(card)
    }

    pub fn update_card(&mut self, id: &str, patch: &CardPatch) -> Result<Card> {
        let index = self
            .state
            .cards
            .iter()
            .position(|c| c.id == id)
            .ok_or_else(|| LedgerError::not_found("card", id))?;

        let updated = self.state.cards[index].apply(patch)?;
        if self.state.institution(&updated.institution_id).is_none() {
            return Err(LedgerError::not_found("institution", updated.institution_id));
        }

        info!(card_id = %id, label = %updated.label, "card updated");
        self.state.cards[index] = updated.clone();
        Ok(updated)
    }

    pub fn remove_card(&mut self, id: &str) -> Result<Card> {
        let index = self
            .state
            .cards
            .iter()
            .position(|c| c.id == id)
            .ok_or_else(|| LedgerError::not_found("card", id))?;

        let removed = self.state.cards.remove(index);
        info!(card_id = %id, label = %removed.label, "card removed");
        Ok(removed)
    }

    pub fn card(&self, id: &str) -> Option<Card> {
        self.state.card(id).cloned()
    }

    /// All cards, or only those issued by one institution
    pub fn list_cards(&self, institution_id: Option<&str>) -> Vec<Card> {
        self.state
            .cards
            .iter()
            .filter(|c| institution_id.map_or(true, |id| c.institution_id == id))
            .cloned()
            .collect()
    }

    // ========================================================================
    // CREDIT SCORES
    // ========================================================================

    /// Record a score observed now
    pub fn record_credit_score(
        &mut self,
        provider: &str,
        score: i64,
        note: Option<String>,
    ) -> Result<CreditScoreEntry> {
        self.record_credit_score_at(provider, score, note, Utc::now())
    }

    /// Record a score observed at an explicit time (backfill)
    pub fn record_credit_score_at(
        &mut self,
        provider: &str,
        score: i64,
        note: Option<String>,
        recorded_at: DateTime<Utc>,
    ) -> Result<CreditScoreEntry> {
        let entry = self
            .state
            .insert_credit_score(provider, score, note, recorded_at)?;

        info!(provider = %entry.provider, score = entry.score, "credit score recorded");
        Ok(entry)
    }

    /// One provider's history (case-insensitive), or every history in
    /// provider order. Each history is chronological.
    pub fn list_credit_score_history(&self, provider: Option<&str>) -> Vec<CreditScoreEntry> {
        match provider {
            Some(provider) => self
                .state
                .provider_key(provider)
                .and_then(|key| self.state.credit_scores.get(key))
                .cloned()
                .unwrap_or_default(),
            None => self
                .state
                .credit_scores
                .values()
                .flat_map(|history| history.iter().cloned())
                .collect(),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::CardType;
    use chrono::TimeZone;

    fn credit_draft(label: &str, limit: f64, balance: f64) -> CardDraft {
        CardDraft {
            credit_limit: Some(limit),
            balance: Some(balance),
            ..CardDraft::new(label, CardType::Credit)
        }
    }

    fn store_with_chase() -> Store {
        let mut store = Store::new();
        store
            .add_institution("Chase", Some("https://www.chase.com".to_string()), None, None)
            .unwrap();
        store
    }

    #[test]
    fn test_add_institution() {
        let store = store_with_chase();

        let institutions = store.list_institutions();
        assert_eq!(institutions.len(), 1);
        assert_eq!(institutions[0].name, "Chase");
        assert!(store.institution_by_name("chase").is_some());
    }

    #[test]
    fn test_duplicate_institution_name_rejected() {
        let mut store = store_with_chase();
        let first_id = store.list_institutions()[0].id.clone();

        let result = store.add_institution("CHASE", None, None, Some("dup".to_string()));
        assert!(matches!(result, Err(LedgerError::DuplicateName { .. })));

        // Only the first survives
        let institutions = store.list_institutions();
        assert_eq!(institutions.len(), 1);
        assert_eq!(institutions[0].id, first_id);
        assert_eq!(institutions[0].notes, None);
    }

    #[test]
    fn test_update_institution() {
        let mut store = store_with_chase();
        let id = store.list_institutions()[0].id.clone();

        let patch = InstitutionPatch {
            contact: Some("800-935-9935".to_string()),
            ..Default::default()
        };
        let updated = store.update_institution(&id, &patch).unwrap();
        assert_eq!(updated.contact.as_deref(), Some("800-935-9935"));
        assert_eq!(store.institution(&id).unwrap(), updated);

        // Re-casing its own name is not a collision
        let recase = InstitutionPatch {
            name: Some("CHASE".to_string()),
            ..Default::default()
        };
        assert_eq!(store.update_institution(&id, &recase).unwrap().name, "CHASE");
    }

    #[test]
    fn test_update_institution_rename_collision() {
        let mut store = store_with_chase();
        let amex = store.add_institution("Amex", None, None, None).unwrap();

        let patch = InstitutionPatch {
            name: Some("chase".to_string()),
            ..Default::default()
        };
        let result = store.update_institution(&amex.id, &patch);
        assert!(matches!(result, Err(LedgerError::DuplicateName { .. })));
        assert_eq!(store.institution(&amex.id).unwrap().name, "Amex");
    }

    #[test]
    fn test_update_missing_institution() {
        let mut store = store_with_chase();
        let result = store.update_institution("no-such-id", &InstitutionPatch::default());
        assert!(matches!(result, Err(LedgerError::NotFound { entity: "institution", .. })));
    }

    #[test]
    fn test_add_card_resolves_institution_case_insensitively() {
        let mut store = store_with_chase();
        let card = store
            .add_card("chase", credit_draft("Freedom Unlimited", 5000.0, 1250.0))
            .unwrap();

        let chase = store.institution_by_name("Chase").unwrap();
        assert_eq!(card.institution_id, chase.id);
        assert_eq!(store.list_cards(None), vec![card.clone()]);
        assert_eq!(store.list_cards(Some(&chase.id)), vec![card]);
    }

    #[test]
    fn test_add_card_unknown_institution() {
        let mut store = store_with_chase();
        store.add_card("Chase", credit_draft("Sapphire", 1000.0, 0.0)).unwrap();

        let result = store.add_card("Wells Fargo", credit_draft("Active Cash", 1000.0, 0.0));
        assert!(matches!(result, Err(LedgerError::NotFound { entity: "institution", .. })));
        assert_eq!(store.list_cards(None).len(), 1);
    }

    #[test]
    fn test_add_card_validation_failure_leaves_store_unchanged() {
        let mut store = store_with_chase();
        let result = store.add_card("Chase", credit_draft("Sapphire", 1000.0, 2000.0));

        assert!(matches!(result, Err(LedgerError::Validation { field: "balance", .. })));
        assert!(store.list_cards(None).is_empty());
    }

    #[test]
    fn test_update_card_over_limit_is_atomic() {
        let mut store = store_with_chase();
        let card = store
            .add_card("Chase", credit_draft("Sapphire", 5000.0, 1200.0))
            .unwrap();

        let patch = CardPatch {
            balance: Some(6000.0),
            label: Some("Renamed".to_string()),
            ..Default::default()
        };
        let result = store.update_card(&card.id, &patch);

        assert!(matches!(result, Err(LedgerError::Validation { .. })));
        assert_eq!(store.card(&card.id).unwrap(), card);
    }

    #[test]
    fn test_update_card_moves_institution() {
        let mut store = store_with_chase();
        let amex = store.add_institution("Amex", None, None, None).unwrap();
        let card = store
            .add_card("Chase", credit_draft("Sapphire", 5000.0, 0.0))
            .unwrap();

        let moved = store
            .update_card(
                &card.id,
                &CardPatch {
                    institution_id: Some(amex.id.clone()),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(moved.institution_id, amex.id);

        let dangling = store.update_card(
            &card.id,
            &CardPatch {
                institution_id: Some("gone".to_string()),
                ..Default::default()
            },
        );
        assert!(matches!(dangling, Err(LedgerError::NotFound { entity: "institution", .. })));
        assert_eq!(store.card(&card.id).unwrap().institution_id, amex.id);
    }

    #[test]
    fn test_remove_institution_rejects_when_referenced() {
        let mut store = store_with_chase();
        let chase = store.institution_by_name("Chase").unwrap();
        let card = store
            .add_card("Chase", credit_draft("Sapphire", 5000.0, 0.0))
            .unwrap();

        let result = store.remove_institution(&chase.id);
        assert!(matches!(result, Err(LedgerError::InUse { count: 1, .. })));
        assert_eq!(store.list_institutions().len(), 1);

        // Cards are deleted independently, then the institution can go
        store.remove_card(&card.id).unwrap();
        assert_eq!(store.remove_institution(&chase.id).unwrap().id, chase.id);
        assert!(store.list_institutions().is_empty());
    }

    #[test]
    fn test_remove_missing_card() {
        let mut store = Store::new();
        assert!(matches!(
            store.remove_card("nope"),
            Err(LedgerError::NotFound { entity: "card", .. })
        ));
    }

    #[test]
    fn test_record_credit_scores_append() {
        let mut store = Store::new();
        store.record_credit_score("Experian", 680, None).unwrap();
        store
            .record_credit_score("Experian", 720, Some("after paydown".to_string()))
            .unwrap();

        let history = store.list_credit_score_history(Some("experian"));
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].score, 680);
        assert_eq!(history[1].score, 720);
    }

    #[test]
    fn test_record_out_of_range_score() {
        let mut store = Store::new();
        let result = store.record_credit_score("Experian", 200, None);

        assert!(matches!(result, Err(LedgerError::Validation { field: "score", .. })));
        assert!(store.list_credit_score_history(None).is_empty());
    }

    #[test]
    fn test_list_all_histories() {
        let mut store = Store::new();
        let t = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        store.record_credit_score_at("TransUnion", 700, None, t).unwrap();
        store.record_credit_score_at("Equifax", 710, None, t).unwrap();

        let providers: Vec<String> = store
            .list_credit_score_history(None)
            .into_iter()
            .map(|e| e.provider)
            .collect();
        assert_eq!(providers, vec!["Equifax".to_string(), "TransUnion".to_string()]);
        assert!(store.list_credit_score_history(Some("Experian")).is_empty());
    }

    #[test]
    fn test_snapshots_are_detached() {
        let mut store = store_with_chase();
        let mut listed = store.list_institutions();
        listed[0].name = "Tampered".to_string();
        listed.clear();

        assert_eq!(store.list_institutions()[0].name, "Chase");

        let snapshot = store.snapshot();
        store.add_institution("Amex", None, None, None).unwrap();
        assert_eq!(snapshot.institutions.len(), 1);
    }

    #[test]
    fn test_from_state_checks_integrity() {
        let mut store = store_with_chase();
        store.add_card("Chase", credit_draft("Sapphire", 100.0, 0.0)).unwrap();

        let mut state = store.into_state();
        assert!(Store::from_state(state.clone()).is_ok());

        state.institutions.clear();
        assert!(Store::from_state(state).is_err());
    }
}
