// 💳 Card Entity - Stable identity with Institution relationship
//
// "Card label is a VALUE (can change), Card UUID is IDENTITY (never changes)"
//
// - Foreign key to Institution entity (institution_id)
// - Credit and charge cards carry a limit and a bounded balance
// - Debit cards carry no limit; their balance may go negative

use super::clean_optional;
use crate::error::{LedgerError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// CARD TYPE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CardType {
    /// Draws directly on an account, no credit line
    Debit,

    /// Revolving credit line
    Credit,

    /// Credit line paid in full each cycle
    Charge,
}

impl CardType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CardType::Debit => "debit",
            CardType::Credit => "credit",
            CardType::Charge => "charge",
        }
    }

    /// Credit and charge cards need a limit; debit cards must not have one
    pub fn has_credit_line(&self) -> bool {
        matches!(self, CardType::Credit | CardType::Charge)
    }
}

impl fmt::Display for CardType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CardType {
    type Err = LedgerError;

    fn from_str(token: &str) -> Result<Self> {
        match token.trim().to_lowercase().as_str() {
            "debit" => Ok(CardType::Debit),
            "credit" => Ok(CardType::Credit),
            "charge" => Ok(CardType::Charge),
            other => Err(LedgerError::validation(
                "card",
                "card_type",
                format!("'{}' is not one of debit, credit, charge", other),
            )),
        }
    }
}

// ============================================================================
// CARD INPUTS
// ============================================================================

/// Everything needed to create a card except its institution
#[derive(Debug, Clone, PartialEq)]
pub struct CardDraft {
    pub label: String,
    pub card_type: CardType,
    pub credit_limit: Option<f64>,
    pub balance: Option<f64>,
    pub rewards: Option<String>,
    pub interest_rate: Option<f64>,
    pub annual_fee: Option<f64>,
    pub notes: Option<String>,
    pub tags: Vec<String>,
}

impl CardDraft {
    pub fn new(label: &str, card_type: CardType) -> Self {
        CardDraft {
            label: label.to_string(),
            card_type,
            credit_limit: None,
            balance: None,
            rewards: None,
            interest_rate: None,
            annual_fee: None,
            notes: None,
            tags: Vec::new(),
        }
    }
}

/// Mutable card fields for `Store::update_card`
///
/// `None` leaves a field untouched. For the optional text fields,
/// `Some("")` clears the stored value; the optional numbers clear with
/// `Some(None)`. `tags` replaces the whole list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CardPatch {
    pub label: Option<String>,
    pub institution_id: Option<String>,
    pub card_type: Option<CardType>,
    pub credit_limit: Option<f64>,
    pub balance: Option<f64>,
    pub rewards: Option<String>,
    pub interest_rate: Option<Option<f64>>,
    pub annual_fee: Option<Option<f64>>,
    pub notes: Option<String>,
    pub tags: Option<Vec<String>>,
}

// ============================================================================
// CARD ENTITY
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Card {
    /// Stable identity (UUID) - NEVER changes
    pub id: String,

    /// Institution ID (foreign key to Institution entity)
    pub institution_id: String,

    pub label: String,

    pub card_type: CardType,

    /// Present for credit/charge cards only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credit_limit: Option<f64>,

    /// Outstanding amount (credit/charge) or account balance (debit)
    #[serde(default)]
    pub balance: f64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rewards: Option<String>,

    /// APR in percent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interest_rate: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annual_fee: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,

    pub created_at: DateTime<Utc>,
}

impl Card {
    /// Create new card entity with UUID
    pub fn new(institution_id: &str, draft: CardDraft) -> Result<Self> {
        let card = Card {
            id: uuid::Uuid::new_v4().to_string(),
            institution_id: institution_id.to_string(),
            label: draft.label,
            card_type: draft.card_type,
            credit_limit: draft.credit_limit,
            balance: draft.balance.unwrap_or(0.0),
            rewards: draft.rewards,
            interest_rate: draft.interest_rate,
            annual_fee: draft.annual_fee,
            notes: draft.notes,
            tags: draft.tags,
            created_at: Utc::now(),
        };

        card.normalized()
    }

    /// Merge a patch into a copy of this card and re-validate the result.
    /// `self` is left untouched either way.
    pub fn apply(&self, patch: &CardPatch) -> Result<Card> {
        let mut next = self.clone();

        if let Some(label) = &patch.label {
            next.label = label.clone();
        }
        if let Some(institution_id) = &patch.institution_id {
            next.institution_id = institution_id.clone();
        }
        if let Some(card_type) = patch.card_type {
            // A card turning into debit loses its credit line unless the
            // patch says otherwise
            if !card_type.has_credit_line() && patch.credit_limit.is_none() {
                next.credit_limit = None;
            }
            next.card_type = card_type;
        }
        if let Some(limit) = patch.credit_limit {
            next.credit_limit = Some(limit);
        }
        if let Some(balance) = patch.balance {
            next.balance = balance;
        }
        if let Some(rewards) = &patch.rewards {
            next.rewards = Some(rewards.clone());
        }
        if let Some(rate) = patch.interest_rate {
            next.interest_rate = rate;
        }
        if let Some(fee) = patch.annual_fee {
            next.annual_fee = fee;
        }
        if let Some(notes) = &patch.notes {
            next.notes = Some(notes.clone());
        }
        if let Some(tags) = &patch.tags {
            next.tags = tags.clone();
        }

        next.normalized()
    }

    /// Canonical form: trimmed text, blank optionals dropped, zero debit
    /// limit dropped, tags de-duplicated. Validates the result.
    fn normalized(mut self) -> Result<Self> {
        self.label = self.label.trim().to_string();
        self.rewards = clean_optional(self.rewards);
        self.notes = clean_optional(self.notes);

        if !self.card_type.has_credit_line() && self.credit_limit == Some(0.0) {
            self.credit_limit = None;
        }

        let mut tags: Vec<String> = Vec::with_capacity(self.tags.len());
        for tag in self.tags.iter().map(|t| t.trim()) {
            if !tag.is_empty() && !tags.iter().any(|t| t == tag) {
                tags.push(tag.to_string());
            }
        }
        self.tags = tags;

        self.validate()?;
        Ok(self)
    }

    /// Field and card-type checks (referential integrity is the Store's job)
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(LedgerError::validation("card", "id", "must not be empty"));
        }
        if self.institution_id.trim().is_empty() {
            return Err(LedgerError::validation("card", "institution_id", "must not be empty"));
        }
        if self.label.trim().is_empty() {
            return Err(LedgerError::validation("card", "label", "must not be empty"));
        }
        if !self.balance.is_finite() {
            return Err(LedgerError::validation("card", "balance", "must be a finite number"));
        }

        if self.card_type.has_credit_line() {
            let limit = self.credit_limit.ok_or_else(|| {
                LedgerError::validation(
                    "card",
                    "credit_limit",
                    format!("required for {} cards", self.card_type),
                )
            })?;
            if !limit.is_finite() || limit < 0.0 {
                return Err(LedgerError::validation(
                    "card",
                    "credit_limit",
                    format!("must be a non-negative number, got {}", limit),
                ));
            }
            if self.balance < 0.0 {
                return Err(LedgerError::validation(
                    "card",
                    "balance",
                    format!("must not be negative for {} cards, got {}", self.card_type, self.balance),
                ));
            }
            if self.balance > limit {
                return Err(LedgerError::validation(
                    "card",
                    "balance",
                    format!("{} exceeds credit limit {}", self.balance, limit),
                ));
            }
        } else if let Some(limit) = self.credit_limit {
            if limit != 0.0 {
                return Err(LedgerError::validation(
                    "card",
                    "credit_limit",
                    "debit cards cannot have a credit limit",
                ));
            }
        }

        if let Some(rate) = self.interest_rate {
            if !rate.is_finite() || !(0.0..=100.0).contains(&rate) {
                return Err(LedgerError::validation(
                    "card",
                    "interest_rate",
                    format!("must be between 0 and 100 percent, got {}", rate),
                ));
            }
        }
        if let Some(fee) = self.annual_fee {
            if !fee.is_finite() || fee < 0.0 {
                return Err(LedgerError::validation(
                    "card",
                    "annual_fee",
                    format!("must be a non-negative number, got {}", fee),
                ));
            }
        }

        Ok(())
    }

    /// balance / limit, for cards with a positive credit line
    pub fn utilisation(&self) -> Option<f64> {
        match self.credit_limit {
            Some(limit) if self.card_type.has_credit_line() && limit > 0.0 => {
                Some(self.balance / limit)
            }
            _ => None,
        }
    }

    /// Remaining credit line (never negative)
    pub fn available_credit(&self) -> Option<f64> {
        if !self.card_type.has_credit_line() {
            return None;
        }
        self.credit_limit.map(|limit| (limit - self.balance).max(0.0))
    }
}

// ============================================================================
// TESTS
// ============================================================================
