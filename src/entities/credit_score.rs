// 📈 Credit Score Entry - Immutable observation
//
// Each entry is a VALUE recorded once and never edited. A correction is a
// new entry; the history per provider is append-only.

use super::clean_optional;
use crate::error::{LedgerError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lowest accepted score (inclusive)
pub const MIN_SCORE: i64 = 300;

/// Highest accepted score (inclusive)
pub const MAX_SCORE: i64 = 850;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreditScoreEntry {
    pub id: String,

    /// Scoring source, e.g. a bureau name
    pub provider: String,

    pub score: u16,

    pub recorded_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl CreditScoreEntry {
    pub fn new(
        provider: &str,
        score: i64,
        note: Option<String>,
        recorded_at: DateTime<Utc>,
    ) -> Result<Self> {
        let provider = provider.trim();
        if provider.is_empty() {
            return Err(LedgerError::validation("credit score", "provider", "must not be empty"));
        }

        let score = validate_score(score)?;

        Ok(CreditScoreEntry {
            id: uuid::Uuid::new_v4().to_string(),
            provider: provider.to_string(),
            score,
            recorded_at,
            note: clean_optional(note),
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(LedgerError::validation("credit score", "id", "must not be empty"));
        }
        if self.provider.trim().is_empty() {
            return Err(LedgerError::validation("credit score", "provider", "must not be empty"));
        }
        validate_score(i64::from(self.score))?;
        Ok(())
    }
}

fn validate_score(score: i64) -> Result<u16> {
    if !(MIN_SCORE..=MAX_SCORE).contains(&score) {
        return Err(LedgerError::validation(
            "credit score",
            "score",
            format!("must be between {} and {}, got {}", MIN_SCORE, MAX_SCORE, score),
        ));
    }
    // In range, so it fits
    Ok(score as u16)
}

// ============================================================================
// TESTS
// ============================================================================
