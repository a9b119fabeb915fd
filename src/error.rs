// ⚠️ Error kinds for the ledger data layer
//
// Every failure the Store or the persistence codec can surface is one of
// these variants. The CLI maps each variant to its own exit status.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
    /// A field value violates a documented constraint
    #[error("invalid {entity} field `{field}`: {message}")]
    Validation {
        entity: &'static str,
        field: &'static str,
        message: String,
    },

    /// Institution name collision (case-insensitive)
    #[error("an institution named '{name}' already exists")]
    DuplicateName { name: String },

    /// Referenced institution / card does not exist
    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },

    /// Institution still has cards pointing at it
    #[error("{entity} '{key}' is still referenced by {count} card(s)")]
    InUse {
        entity: &'static str,
        key: String,
        count: usize,
    },

    /// No document at the path yet ("no store yet")
    #[error("no data store found at {}", path.display())]
    MissingDocument { path: PathBuf },

    /// Document exists but does not decode into a valid store
    #[error("corrupt data store at {}: {reason}", path.display())]
    CorruptData { path: PathBuf, reason: String },

    /// Document was written by a newer codec
    #[error(
        "data store at {} uses schema version {found}, newest supported is {supported}",
        path.display()
    )]
    UnsupportedSchema {
        path: PathBuf,
        found: u64,
        supported: u32,
    },

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, LedgerError>;

impl LedgerError {
    pub fn validation(entity: &'static str, field: &'static str, message: impl Into<String>) -> Self {
        LedgerError::Validation {
            entity,
            field,
            message: message.into(),
        }
    }

    pub fn not_found(entity: &'static str, key: impl Into<String>) -> Self {
        LedgerError::NotFound {
            entity,
            key: key.into(),
        }
    }

    /// Process exit status for this error kind (distinct per kind, never 0)
    pub fn exit_code(&self) -> u8 {
        match self {
            LedgerError::Validation { .. } => 3,
            LedgerError::DuplicateName { .. } => 4,
            LedgerError::NotFound { .. } => 5,
            LedgerError::InUse { .. } => 6,
            LedgerError::MissingDocument { .. } => 7,
            LedgerError::CorruptData { .. } => 8,
            LedgerError::UnsupportedSchema { .. } => 9,
            LedgerError::Io { .. } => 10,
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
