// 📊 Summary Engine - aggregate views over a read-only StoreState
//
// Pure function of its input: same state, same report. Nothing here mutates
// the store.

use crate::entities::StoreState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Utilisation at or above this is flagged by default
pub const DEFAULT_HIGH_UTILISATION: f64 = 0.7;

// ============================================================================
// REPORT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CardUtilisation {
    pub card_id: String,
    pub label: String,
    pub institution: String,
    pub card_type: String,
    pub balance: f64,
    pub credit_limit: Option<f64>,
    /// None = n/a (debit card, or no positive limit)
    pub utilisation: Option<f64>,
    pub high_utilisation: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderScore {
    pub provider: String,
    pub latest_score: u16,
    pub recorded_at: DateTime<Utc>,
    /// Change vs. the preceding entry (0 with a single entry)
    pub delta: i32,
    pub entries: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryReport {
    pub total_institutions: usize,
    pub total_cards: usize,
    pub high_utilisation_threshold: f64,
    pub cards: Vec<CardUtilisation>,
    pub credit_scores: Vec<ProviderScore>,

    // Aggregates over credit/charge cards
    pub total_balance: f64,
    pub total_credit_limit: f64,
    pub total_available_credit: f64,
    pub overall_utilisation: f64,

    // Over each provider's latest score
    pub highest_credit_score: Option<u16>,
    pub lowest_credit_score: Option<u16>,
    pub average_credit_score: Option<f64>,
}

impl SummaryReport {
    pub fn summary(&self) -> String {
        let scores = match (self.lowest_credit_score, self.highest_credit_score) {
            (Some(low), Some(high)) => format!("scores {}-{}", low, high),
            _ => "no scores".to_string(),
        };
        format!(
            "{} institutions, {} cards | balance {:.2} of {:.2} ({:.1}% utilised, {:.2} available) | {} flagged | {}",
            self.total_institutions,
            self.total_cards,
            self.total_balance,
            self.total_credit_limit,
            self.overall_utilisation * 100.0,
            self.total_available_credit,
            self.flagged_cards().count(),
            scores
        )
    }

    /// Cards at or above the high-utilisation threshold
    pub fn flagged_cards(&self) -> impl Iterator<Item = &CardUtilisation> {
        self.cards.iter().filter(|c| c.high_utilisation)
    }
}

// ============================================================================
// SUMMARY ENGINE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SummaryEngine {
    high_utilisation_threshold: f64,
}

impl SummaryEngine {
    pub fn new(high_utilisation_threshold: f64) -> Self {
        SummaryEngine {
            high_utilisation_threshold,
        }
    }

    pub fn threshold(&self) -> f64 {
        self.high_utilisation_threshold
    }

    pub fn summarize(&self, state: &StoreState) -> SummaryReport {
        let mut total_balance = 0.0;
        let mut total_credit_limit = 0.0;
        let mut total_available_credit = 0.0;

        let cards: Vec<CardUtilisation> = state
            .cards
            .iter()
            .map(|card| {
                if card.card_type.has_credit_line() {
                    total_balance += card.balance;
                    total_credit_limit += card.credit_limit.unwrap_or(0.0);
                    total_available_credit += card.available_credit().unwrap_or(0.0);
                }

                let utilisation = card.utilisation();
                CardUtilisation {
                    card_id: card.id.clone(),
                    label: card.label.clone(),
                    institution: state
                        .institution(&card.institution_id)
                        .map(|i| i.name.clone())
                        .unwrap_or_else(|| card.institution_id.clone()),
                    card_type: card.card_type.as_str().to_string(),
                    balance: card.balance,
                    credit_limit: card.credit_limit,
                    utilisation,
                    high_utilisation: utilisation
                        .map_or(false, |u| u >= self.high_utilisation_threshold),
                }
            })
            .collect();

        let overall_utilisation = if total_credit_limit > 0.0 {
            total_balance / total_credit_limit
        } else {
            0.0
        };

        let credit_scores: Vec<ProviderScore> = state
            .credit_scores
            .iter()
            .filter_map(|(provider, history)| {
                let latest = history.last()?;
                let delta = match history.len() {
                    0 | 1 => 0,
                    n => i32::from(latest.score) - i32::from(history[n - 2].score),
                };
                Some(ProviderScore {
                    provider: provider.clone(),
                    latest_score: latest.score,
                    recorded_at: latest.recorded_at,
                    delta,
                    entries: history.len(),
                })
            })
            .collect();

        let latest: Vec<u16> = credit_scores.iter().map(|s| s.latest_score).collect();
        let average_credit_score = if latest.is_empty() {
            None
        } else {
            Some(latest.iter().map(|&s| f64::from(s)).sum::<f64>() / latest.len() as f64)
        };

        SummaryReport {
            total_institutions: state.institutions.len(),
            total_cards: state.cards.len(),
            high_utilisation_threshold: self.high_utilisation_threshold,
            cards,
            credit_scores,
            total_balance,
            total_credit_limit,
            total_available_credit,
            overall_utilisation,
            highest_credit_score: latest.iter().copied().max(),
            lowest_credit_score: latest.iter().copied().min(),
            average_credit_score,
        }
    }
}

impl Default for SummaryEngine {
    fn default() -> Self {
        Self::new(DEFAULT_HIGH_UTILISATION)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{CardDraft, CardType};
    use crate::store::Store;
    use chrono::TimeZone;

    fn credit(label: &str, limit: f64, balance: f64) -> CardDraft {
        CardDraft {
            credit_limit: Some(limit),
            balance: Some(balance),
            ..CardDraft::new(label, CardType::Credit)
        }
    }

    #[test]
    fn test_single_card_utilisation() {
        let mut store = Store::new();
        store.add_institution("Chase", None, None, None).unwrap();
        store.add_card("Chase", credit("Sapphire", 5000.0, 1200.0)).unwrap();

        let report = SummaryEngine::default().summarize(store.state());

        assert_eq!(report.cards.len(), 1);
        let card = &report.cards[0];
        assert_eq!(card.institution, "Chase");
        assert!((card.utilisation.unwrap() - 0.24).abs() < 1e-9);
        assert!(!card.high_utilisation);
        assert!((report.overall_utilisation - 0.24).abs() < 1e-9);
        assert_eq!(report.total_available_credit, 3800.0);
    }

    #[test]
    fn test_aggregates_over_credit_cards() {
        let mut store = Store::new();
        store.add_institution("Bank A", None, None, None).unwrap();
        store.add_institution("Bank B", None, None, None).unwrap();
        store.add_card("Bank A", credit("Bank A Credit", 4000.0, 1000.0)).unwrap();
        store.add_card("Bank B", credit("Bank B Credit", 6000.0, 500.0)).unwrap();
        store
            .add_card(
                "Bank B",
                CardDraft {
                    balance: Some(2500.0),
                    ..CardDraft::new("Bank B Debit", CardType::Debit)
                },
            )
            .unwrap();

        let report = SummaryEngine::default().summarize(store.state());

        assert_eq!(report.total_institutions, 2);
        assert_eq!(report.total_cards, 3);
        assert_eq!(report.total_balance, 1500.0); // Debit balance excluded
        assert_eq!(report.total_credit_limit, 10000.0);
        assert_eq!(report.total_available_credit, 8500.0);
        assert!((report.overall_utilisation - 0.15).abs() < 1e-9);
        assert_eq!(report.cards[2].utilisation, None);
    }

    #[test]
    fn test_high_utilisation_flag() {
        let mut store = Store::new();
        store.add_institution("Amex", None, None, None).unwrap();
        store.add_card("Amex", credit("Gold", 1000.0, 700.0)).unwrap();
        store.add_card("Amex", credit("Blue", 1000.0, 690.0)).unwrap();

        let report = SummaryEngine::default().summarize(store.state());
        let flagged: Vec<&str> = report.flagged_cards().map(|c| c.label.as_str()).collect();
        assert_eq!(flagged, vec!["Gold"]); // Threshold is inclusive

        let strict = SummaryEngine::new(0.5).summarize(store.state());
        assert_eq!(strict.flagged_cards().count(), 2);
        assert_eq!(strict.high_utilisation_threshold, 0.5);
    }

    #[test]
    fn test_zero_total_limit_is_zero_utilisation() {
        let mut store = Store::new();
        store.add_institution("Chase", None, None, None).unwrap();
        store.add_card("Chase", credit("Zero", 0.0, 0.0)).unwrap();

        let report = SummaryEngine::default().summarize(store.state());
        assert_eq!(report.overall_utilisation, 0.0);
        assert_eq!(report.cards[0].utilisation, None);

        let empty = SummaryEngine::default().summarize(&StoreState::new());
        assert_eq!(empty.overall_utilisation, 0.0);
        assert_eq!(empty.average_credit_score, None);
        assert_eq!(empty.highest_credit_score, None);
    }

    #[test]
    fn test_latest_score_delta() {
        let mut store = Store::new();
        let may = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
        let june = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        store.record_credit_score_at("Experian", 680, None, may).unwrap();
        store.record_credit_score_at("Experian", 720, None, june).unwrap();
        store.record_credit_score_at("Equifax", 700, None, may).unwrap();

        let report = SummaryEngine::default().summarize(store.state());

        let experian = report.credit_scores.iter().find(|s| s.provider == "Experian").unwrap();
        assert_eq!(experian.entries, 2);
        assert_eq!(experian.latest_score, 720);
        assert_eq!(experian.delta, 40);
        assert_eq!(experian.recorded_at, june);

        let equifax = report.credit_scores.iter().find(|s| s.provider == "Equifax").unwrap();
        assert_eq!(equifax.delta, 0);

        assert_eq!(report.highest_credit_score, Some(720));
        assert_eq!(report.lowest_credit_score, Some(700));
        assert_eq!(report.average_credit_score, Some(710.0));
    }

    #[test]
    fn test_negative_delta() {
        let mut store = Store::new();
        store.record_credit_score("TransUnion", 750, None).unwrap();
        store.record_credit_score("TransUnion", 735, None).unwrap();

        let report = SummaryEngine::default().summarize(store.state());
        assert_eq!(report.credit_scores[0].delta, -15);
    }

    #[test]
    fn test_deterministic_and_read_only() {
        let mut store = Store::new();
        store.add_institution("Chase", None, None, None).unwrap();
        store.add_card("Chase", credit("Sapphire", 5000.0, 1200.0)).unwrap();
        store.record_credit_score("Experian", 700, None).unwrap();

        let before = store.snapshot();
        let engine = SummaryEngine::default();
        let first = engine.summarize(store.state());
        let second = engine.summarize(store.state());

        assert_eq!(first, second);
        assert_eq!(store.snapshot(), before);
        assert!(first.summary().contains("1 institutions, 1 cards"));
    }
}
