// 🏦 Institution Entity - Stable identity + display name
//
// "Institution name is a VALUE (can change), Institution UUID is IDENTITY (never changes)"
//
// Cards point at institutions by UUID, so renaming an institution never
// breaks the cards issued by it.

use super::clean_optional;
use crate::error::{LedgerError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// INSTITUTION ENTITY
// ============================================================================

/// A banking organisation that issues cards
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Institution {
    /// Stable identity (UUID) - NEVER changes
    pub id: String,

    /// Display name, unique across the store (case-insensitive)
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,

    /// Support phone, email, branch address...
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,

    pub created_at: DateTime<Utc>,
}

/// Mutable institution fields for `Store::update_institution`
///
/// `None` leaves a field untouched. For the optional text fields,
/// `Some("")` clears the stored value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InstitutionPatch {
    pub name: Option<String>,
    pub website: Option<String>,
    pub contact: Option<String>,
    pub notes: Option<String>,
}

impl InstitutionPatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.website.is_none() && self.contact.is_none() && self.notes.is_none()
    }
}

impl Institution {
    /// Create new institution entity with UUID
    pub fn new(
        name: &str,
        website: Option<String>,
        contact: Option<String>,
        notes: Option<String>,
    ) -> Result<Self> {
        let institution = Institution {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.trim().to_string(),
            website: clean_optional(website),
            contact: clean_optional(contact),
            notes: clean_optional(notes),
            created_at: Utc::now(),
        };

        institution.validate()?;
        Ok(institution)
    }

    /// Field-level checks (uniqueness is the Store's job)
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(LedgerError::validation("institution", "id", "must not be empty"));
        }
        if self.name.trim().is_empty() {
            return Err(LedgerError::validation("institution", "name", "must not be empty"));
        }
        Ok(())
    }

    /// Case-insensitive exact name match
    pub fn matches_name(&self, name: &str) -> bool {
        self.name.to_lowercase() == name.trim().to_lowercase()
    }

    /// Merge a patch into a copy of this institution and re-validate it.
    /// `self` is left untouched either way.
    pub fn apply(&self, patch: &InstitutionPatch) -> Result<Institution> {
        let mut next = self.clone();

        if let Some(name) = &patch.name {
            next.name = name.trim().to_string();
        }
        if let Some(website) = &patch.website {
            next.website = clean_optional(Some(website.clone()));
        }
        if let Some(contact) = &patch.contact {
            next.contact = clean_optional(Some(contact.clone()));
        }
        if let Some(notes) = &patch.notes {
            next.notes = clean_optional(Some(notes.clone()));
        }

        next.validate()?;
        Ok(next)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_institution_creation() {
        let institution = Institution::new(
            "  Chase ",
            Some("https://www.chase.com".to_string()),
            None,
            Some("   ".to_string()),
        )
        .unwrap();

        assert!(!institution.id.is_empty());
        assert_eq!(institution.name, "Chase");
        assert_eq!(institution.website.as_deref(), Some("https://www.chase.com"));
        assert_eq!(institution.contact, None);
        assert_eq!(institution.notes, None); // Blank input stored as absent
    }

    #[test]
    fn test_institution_requires_name() {
        let err = Institution::new("   ", None, None, None).unwrap_err();
        match err {
            LedgerError::Validation { entity, field, .. } => {
                assert_eq!(entity, "institution");
                assert_eq!(field, "name");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_institution_ids_are_unique() {
        let a = Institution::new("Bank A", None, None, None).unwrap();
        let b = Institution::new("Bank A", None, None, None).unwrap();
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_matches_name_case_insensitive() {
        let institution = Institution::new("Bank of America", None, None, None).unwrap();

        assert!(institution.matches_name("bank of america"));
        assert!(institution.matches_name("BANK OF AMERICA "));
        assert!(!institution.matches_name("Bank of"));
    }

    #[test]
    fn test_apply_patch() {
        let institution = Institution::new(
            "Chase",
            Some("https://chase.com".to_string()),
            Some("800-935-9935".to_string()),
            None,
        )
        .unwrap();

        let patch = InstitutionPatch {
            name: Some("JPMorgan Chase".to_string()),
            website: Some(String::new()), // clear
            notes: Some("Primary bank".to_string()),
            ..Default::default()
        };
        let next = institution.apply(&patch).unwrap();

        assert_eq!(next.id, institution.id); // Identity remains the same!
        assert_eq!(next.name, "JPMorgan Chase");
        assert_eq!(next.website, None);
        assert_eq!(next.contact.as_deref(), Some("800-935-9935"));
        assert_eq!(next.notes.as_deref(), Some("Primary bank"));

        // Original untouched
        assert_eq!(institution.name, "Chase");
    }

    #[test]
    fn test_apply_rejects_blank_name() {
        let institution = Institution::new("Chase", None, None, None).unwrap();
        let patch = InstitutionPatch {
            name: Some(" ".to_string()),
            ..Default::default()
        };

        assert!(institution.apply(&patch).is_err());
        assert!(InstitutionPatch::default().is_empty());
        assert!(!patch.is_empty());
    }
}
