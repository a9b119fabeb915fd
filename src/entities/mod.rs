// Entity Models
// "Identity persists, values change"
//
// Each entity has:
// - Stable identity (UUID) that NEVER changes
// - Field validation that runs before a record can exist
// - A patch struct listing exactly the fields an update may touch

pub mod institution;
pub mod card;
pub mod credit_score;

pub use institution::{Institution, InstitutionPatch};
pub use card::{Card, CardDraft, CardPatch, CardType};
pub use credit_score::{CreditScoreEntry, MAX_SCORE, MIN_SCORE};

use crate::error::{LedgerError, Result};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashSet};

/// Trim optional free text; blank becomes absent
pub(crate) fn clean_optional(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

// ============================================================================
// STORE STATE
// ============================================================================

/// The complete entity collection: what gets loaded, mutated and saved
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoreState {
    pub institutions: Vec<Institution>,
    pub cards: Vec<Card>,

    /// provider → history ordered by `recorded_at`
    pub credit_scores: BTreeMap<String, Vec<CreditScoreEntry>>,
}

impl StoreState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn institution(&self, id: &str) -> Option<&Institution> {
        self.institutions.iter().find(|i| i.id == id)
    }

    /// Case-insensitive name lookup
    pub fn institution_by_name(&self, name: &str) -> Option<&Institution> {
        self.institutions.iter().find(|i| i.matches_name(name))
    }

    pub fn card(&self, id: &str) -> Option<&Card> {
        self.cards.iter().find(|c| c.id == id)
    }

    /// Existing history key for a provider, matched case-insensitively
    pub fn provider_key(&self, provider: &str) -> Option<&str> {
        let wanted = provider.trim().to_lowercase();
        self.credit_scores
            .keys()
            .find(|key| key.to_lowercase() == wanted)
            .map(String::as_str)
    }

    /// Validate and append one score to its provider's history, keeping the
    /// history in `recorded_at` order. Equal timestamps keep arrival order.
    pub(crate) fn insert_credit_score(
        &mut self,
        provider: &str,
        score: i64,
        note: Option<String>,
        recorded_at: DateTime<Utc>,
    ) -> Result<CreditScoreEntry> {
        let entry = CreditScoreEntry::new(provider, score, note, recorded_at)?;
        Ok(self.insert_entry(entry))
    }

    /// File an already-validated entry under its provider's history
    pub(crate) fn insert_entry(&mut self, mut entry: CreditScoreEntry) -> CreditScoreEntry {
        // First spelling seen becomes the key
        if let Some(key) = self.provider_key(&entry.provider) {
            entry.provider = key.to_string();
        }

        let history = self.credit_scores.entry(entry.provider.clone()).or_default();
        let position = history.partition_point(|e| e.recorded_at <= entry.recorded_at);
        history.insert(position, entry.clone());

        entry
    }

    /// Check every record plus the cross-record invariants:
    /// unique ids, unique institution names, resolvable card institutions,
    /// provider-keyed chronological score histories.
    pub fn verify_integrity(&self) -> Result<()> {
        let mut ids: HashSet<&str> = HashSet::new();
        let mut names: HashSet<String> = HashSet::new();

        for institution in &self.institutions {
            institution.validate()?;
            if !ids.insert(institution.id.as_str()) {
                return Err(duplicate_id(&institution.id));
            }
            if !names.insert(institution.name.to_lowercase()) {
                return Err(LedgerError::DuplicateName {
                    name: institution.name.clone(),
                });
            }
        }

        for card in &self.cards {
            card.validate()?;
            if !ids.insert(card.id.as_str()) {
                return Err(duplicate_id(&card.id));
            }
            if self.institution(&card.institution_id).is_none() {
                return Err(LedgerError::not_found(
                    "institution",
                    format!("{} (referenced by card '{}')", card.institution_id, card.label),
                ));
            }
        }

        let mut providers: HashSet<String> = HashSet::new();
        for (provider, history) in &self.credit_scores {
            if provider.trim().is_empty() {
                return Err(LedgerError::validation("credit score", "provider", "must not be empty"));
            }
            if !providers.insert(provider.to_lowercase()) {
                return Err(LedgerError::validation(
                    "credit score",
                    "provider",
                    format!("'{}' appears more than once", provider),
                ));
            }
            for entry in history {
                entry.validate()?;
                if !ids.insert(entry.id.as_str()) {
                    return Err(duplicate_id(&entry.id));
                }
                if entry.provider.to_lowercase() != provider.to_lowercase() {
                    return Err(LedgerError::validation(
                        "credit score",
                        "provider",
                        format!("entry for '{}' filed under '{}'", entry.provider, provider),
                    ));
                }
            }
            if history.windows(2).any(|w| w[0].recorded_at > w[1].recorded_at) {
                return Err(LedgerError::validation(
                    "credit score",
                    "recorded_at",
                    format!("history for '{}' is not in chronological order", provider),
                ));
            }
        }

        Ok(())
    }
}

fn duplicate_id(id: &str) -> LedgerError {
    LedgerError::validation("store", "id", format!("id {} is used more than once", id))
}

// ============================================================================
// TESTS
// ============================================================================
