// Banking Ledger - Core Library
// Institutions, cards and credit scores kept in one local JSON document.
// Exposes the data layer for the CLI and for tests.

pub mod error;
pub mod entities;
pub mod store;
pub mod persistence;
pub mod summary;
pub mod config;

// Re-export commonly used types
pub use error::{LedgerError, Result};
pub use entities::{
    Institution, InstitutionPatch,
    Card, CardDraft, CardPatch, CardType,
    CreditScoreEntry, MAX_SCORE, MIN_SCORE,
    StoreState,
};
pub use store::Store;
pub use persistence::{load, load_or_empty, save, init, CURRENT_SCHEMA_VERSION};
pub use summary::{
    SummaryEngine, SummaryReport, CardUtilisation, ProviderScore, DEFAULT_HIGH_UTILISATION,
};
pub use config::{default_data_path, resolve_storage_path};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
