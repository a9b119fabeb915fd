// 💾 Persistence Codec - StoreState <-> one JSON document
//
// Document layouts:
// - v1: the first, flat layout. No `schema_version` key, institutions
//   without ids, cards naming their institution, credit scores as a flat
//   list with one entry per provider.
// - v2: `{schema_version, institutions, cards, credit_scores: {provider: [..]}}`
//
// Loading accepts every layout up to CURRENT_SCHEMA_VERSION and upgrades it
// in memory. Saving always writes CURRENT_SCHEMA_VERSION.
//
// Single writer only: there is no file lock, so two processes saving the
// same path race and the last rename wins. Accepted limitation.

use crate::entities::{
    Card, CardDraft, CardType, CreditScoreEntry, Institution, StoreState,
};
use crate::error::{LedgerError, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::Path;
use std::time::UNIX_EPOCH;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Layout written by `save`
pub const CURRENT_SCHEMA_VERSION: u32 = 2;

/// Documents without a `schema_version` key
const LEGACY_SCHEMA_VERSION: u32 = 1;

// ============================================================================
// DOCUMENT LAYOUTS
// ============================================================================

#[derive(Serialize)]
struct DocumentRef<'a> {
    schema_version: u32,
    institutions: &'a [Institution],
    cards: &'a [Card],
    credit_scores: &'a BTreeMap<String, Vec<CreditScoreEntry>>,
}

#[derive(Deserialize)]
struct Document {
    #[serde(default)]
    institutions: Vec<Institution>,
    #[serde(default)]
    cards: Vec<Card>,
    #[serde(default)]
    credit_scores: BTreeMap<String, Vec<CreditScoreEntry>>,
}

#[derive(Deserialize)]
struct LegacyDocument {
    #[serde(default)]
    institutions: Vec<LegacyInstitution>,
    #[serde(default)]
    cards: Vec<LegacyCard>,
    #[serde(default)]
    credit_scores: Vec<LegacyCreditScore>,
}

#[derive(Deserialize)]
struct LegacyInstitution {
    name: String,
    website: Option<String>,
    support_phone: Option<String>,
    notes: Option<String>,
}

#[derive(Deserialize)]
struct LegacyCard {
    #[serde(default)]
    id: Option<String>,
    institution: String,
    name: String,
    card_type: String,
    #[serde(default)]
    credit_limit: f64,
    #[serde(default)]
    balance: f64,
    interest_rate: Option<f64>,
    annual_fee: Option<f64>,
    rewards: Option<String>,
    notes: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
}

#[derive(Deserialize)]
struct LegacyCreditScore {
    provider: String,
    score: i64,
    last_updated: Option<String>,
    notes: Option<String>,
}

// ============================================================================
// LOAD
// ============================================================================

/// Read and decode the document at `path`.
///
/// A missing file is reported as `MissingDocument` so the caller can decide
/// between starting empty and reporting an error. Never writes.
pub fn load(path: &Path) -> Result<StoreState> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(LedgerError::MissingDocument {
                path: path.to_path_buf(),
            })
        }
        Err(source) => {
            return Err(LedgerError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    // Stands in for timestamps the v1 layout never recorded, so repeated
    // loads of an unconverted file agree with each other
    let stamp = fs::metadata(path)
        .and_then(|m| m.modified())
        .map(DateTime::<Utc>::from)
        .unwrap_or_else(|_| DateTime::<Utc>::from(UNIX_EPOCH));

    let state = decode(path, &raw, stamp)?;
    debug!(
        path = %path.display(),
        institutions = state.institutions.len(),
        cards = state.cards.len(),
        providers = state.credit_scores.len(),
        "data store loaded"
    );
    Ok(state)
}

/// `load`, treating a missing file as an empty store
pub fn load_or_empty(path: &Path) -> Result<StoreState> {
    match load(path) {
        Err(LedgerError::MissingDocument { .. }) => {
            debug!(path = %path.display(), "no data store yet, starting empty");
            Ok(StoreState::new())
        }
        other => other,
    }
}

fn decode(path: &Path, raw: &str, legacy_stamp: DateTime<Utc>) -> Result<StoreState> {
    let value: Value = serde_json::from_str(raw)
        .map_err(|e| corrupt(path, format!("invalid JSON: {}", e)))?;

    let found = schema_version_of(path, &value)?;
    if found > u64::from(CURRENT_SCHEMA_VERSION) {
        return Err(LedgerError::UnsupportedSchema {
            path: path.to_path_buf(),
            found,
            supported: CURRENT_SCHEMA_VERSION,
        });
    }

    let state = match found as u32 {
        LEGACY_SCHEMA_VERSION => {
            let legacy: LegacyDocument = serde_json::from_value(value)
                .map_err(|e| corrupt(path, format!("unexpected v1 layout: {}", e)))?;
            upgrade_v1(path, legacy, legacy_stamp)?
        }
        CURRENT_SCHEMA_VERSION => {
            let document: Document = serde_json::from_value(value)
                .map_err(|e| corrupt(path, format!("unexpected v2 layout: {}", e)))?;
            StoreState {
                institutions: document.institutions,
                cards: document.cards,
                credit_scores: document.credit_scores,
            }
        }
        other => return Err(corrupt(path, format!("unknown schema version {}", other))),
    };

    state
        .verify_integrity()
        .map_err(|e| corrupt(path, e.to_string()))?;
    Ok(state)
}

fn schema_version_of(path: &Path, value: &Value) -> Result<u64> {
    let object = value
        .as_object()
        .ok_or_else(|| corrupt(path, "top level is not a JSON object"))?;

    match object.get("schema_version") {
        None => Ok(u64::from(LEGACY_SCHEMA_VERSION)),
        Some(v) => v
            .as_u64()
            .ok_or_else(|| corrupt(path, format!("schema_version must be a non-negative integer, got {}", v))),
    }
}

// ============================================================================
// V1 UPGRADE
// ============================================================================

/// Namespace for ids derived from v1 records, which carried none
/// (cards sometimes did)
const LEGACY_ID_NAMESPACE: Uuid = Uuid::from_u128(0x5b1e_7c2a_93d4_4f0e_8a61_2c9d_0b47_e3f5);

/// Same v1 record, same id, on every load
fn legacy_id(kind: &str, key: &str) -> String {
    Uuid::new_v5(&LEGACY_ID_NAMESPACE, format!("{}:{}", kind, key).as_bytes()).to_string()
}

// The v1 writer accepted free-text card types, a 0.0 default limit and any
// score. Records are repaired where the intent is clear and skipped with a
// warning where it is not. Only a document that is not the v1 shape at all
// is CorruptData.
fn upgrade_v1(path: &Path, legacy: LegacyDocument, stamp: DateTime<Utc>) -> Result<StoreState> {
    let mut state = StoreState::new();
    let mut skipped = 0usize;

    for raw in legacy.institutions {
        if state.institution_by_name(&raw.name).is_some() {
            warn!(name = %raw.name, "skipping duplicate legacy institution");
            skipped += 1;
            continue;
        }
        match Institution::new(&raw.name, raw.website, raw.support_phone, raw.notes) {
            Ok(mut institution) => {
                institution.id = legacy_id("institution", &institution.name.to_lowercase());
                institution.created_at = stamp;
                state.institutions.push(institution);
            }
            Err(e) => {
                warn!(name = %raw.name, error = %e, "skipping legacy institution");
                skipped += 1;
            }
        }
    }

    for (index, raw) in legacy.cards.into_iter().enumerate() {
        let label = raw.name.clone();
        match upgrade_v1_card(&state, index, raw, stamp) {
            Ok(card) => state.cards.push(card),
            Err(reason) => {
                warn!(card = %label, reason = %reason, "skipping legacy card");
                skipped += 1;
            }
        }
    }

    for (index, raw) in legacy.credit_scores.into_iter().enumerate() {
        let recorded_at = match raw.last_updated.as_deref().map(str::trim) {
            None | Some("") => stamp,
            Some(text) => match parse_legacy_timestamp(text) {
                Some(parsed) => parsed,
                None => {
                    warn!(provider = %raw.provider, timestamp = %text, "skipping legacy credit score with bad timestamp");
                    skipped += 1;
                    continue;
                }
            },
        };

        match CreditScoreEntry::new(&raw.provider, raw.score, raw.notes, recorded_at) {
            Ok(mut entry) => {
                entry.id = legacy_id(
                    "credit-score",
                    &format!("{}:{}", index, entry.provider.to_lowercase()),
                );
                state.insert_entry(entry);
            }
            Err(e) => {
                warn!(provider = %raw.provider, error = %e, "skipping legacy credit score");
                skipped += 1;
            }
        }
    }

    info!(path = %path.display(), skipped, "upgraded v1 data store in memory");
    Ok(state)
}

fn upgrade_v1_card(
    state: &StoreState,
    index: usize,
    raw: LegacyCard,
    stamp: DateTime<Utc>,
) -> std::result::Result<Card, String> {
    let institution_id = state
        .institution_by_name(&raw.institution)
        .map(|i| i.id.clone())
        .ok_or_else(|| format!("unknown institution '{}'", raw.institution))?;

    let card_type = legacy_card_type(&raw.card_type)
        .ok_or_else(|| format!("unrecognised card type '{}'", raw.card_type))?;

    let mut balance = raw.balance;
    let credit_limit = if card_type.has_credit_line() {
        if balance < 0.0 {
            warn!(card = %raw.name, balance, "clamping negative legacy balance to 0");
            balance = 0.0;
        }
        let mut limit = raw.credit_limit;
        if limit < balance {
            warn!(card = %raw.name, limit, balance, "raising legacy credit limit to cover balance");
            limit = balance;
        }
        Some(limit)
    } else {
        if raw.credit_limit != 0.0 {
            warn!(card = %raw.name, limit = raw.credit_limit, "dropping credit limit from legacy debit card");
        }
        None
    };

    let interest_rate = raw.interest_rate.filter(|r| r.is_finite() && (0.0..=100.0).contains(r));
    if interest_rate != raw.interest_rate {
        warn!(card = %raw.name, rate = ?raw.interest_rate, "dropping out-of-range legacy interest rate");
    }
    let annual_fee = raw.annual_fee.filter(|f| f.is_finite() && *f >= 0.0);
    if annual_fee != raw.annual_fee {
        warn!(card = %raw.name, fee = ?raw.annual_fee, "dropping negative legacy annual fee");
    }

    let draft = CardDraft {
        label: raw.name.clone(),
        card_type,
        credit_limit,
        balance: Some(balance),
        rewards: raw.rewards,
        interest_rate,
        annual_fee,
        notes: raw.notes,
        tags: raw.tags,
    };
    let mut card = Card::new(&institution_id, draft).map_err(|e| e.to_string())?;

    // Keep the identity the old layout already assigned
    card.id = raw
        .id
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| legacy_id("card", &format!("{}:{}", index, raw.name)));
    if state.card(&card.id).is_some() {
        return Err(format!("id {} is used more than once", card.id));
    }
    card.created_at = stamp;
    Ok(card)
}

/// Exact tokens first, then the free text the v1 CLI accepted
/// ("Credit Card", "prepaid debit", ...)
fn legacy_card_type(text: &str) -> Option<CardType> {
    if let Ok(card_type) = text.parse() {
        return Some(card_type);
    }
    let lower = text.to_lowercase();
    if lower.contains("charge") {
        Some(CardType::Charge)
    } else if lower.contains("debit") {
        Some(CardType::Debit)
    } else if lower.contains("credit") {
        Some(CardType::Credit)
    } else {
        None
    }
}

/// RFC 3339, or naive ISO date/datetime read as UTC
fn parse_legacy_timestamp(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
        return Some(parsed.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(naive.and_utc());
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

// ============================================================================
// SAVE
// ============================================================================

/// Serialize the whole state and atomically replace the file at `path`
pub fn save(path: &Path, state: &StoreState) -> Result<()> {
    let document = DocumentRef {
        schema_version: CURRENT_SCHEMA_VERSION,
        institutions: &state.institutions,
        cards: &state.cards,
        credit_scores: &state.credit_scores,
    };

    let mut json = serde_json::to_string_pretty(&document)
        .map_err(|e| io_error(path, io::Error::new(io::ErrorKind::InvalidData, e)))?;
    json.push('\n');

    write_atomically(path, json.as_bytes())?;
    debug!(path = %path.display(), bytes = json.len(), "data store saved");
    Ok(())
}

/// Write a fresh empty document, replacing whatever was there
pub fn init(path: &Path) -> Result<StoreState> {
    let state = StoreState::new();
    save(path, &state)?;
    info!(path = %path.display(), "initialised empty data store");
    Ok(state)
}

/// Temp file in the same directory + rename, so a crash mid-write never
/// leaves a truncated document at `path`
fn write_atomically(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| io_error(parent, e))?;
    }

    let file_name = path.file_name().ok_or_else(|| {
        io_error(
            path,
            io::Error::new(io::ErrorKind::InvalidInput, "path has no file name"),
        )
    })?;
    let tmp = path.with_file_name(format!(".{}.tmp", file_name.to_string_lossy()));

    let written = File::create(&tmp).and_then(|mut file| {
        file.write_all(bytes)?;
        file.sync_all()
    });
    if let Err(e) = written {
        let _ = fs::remove_file(&tmp);
        return Err(io_error(&tmp, e));
    }

    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(io_error(path, e));
    }
    sync_parent_dir(path)
}

/// fsync the directory so the rename itself survives a power loss
#[cfg(unix)]
fn sync_parent_dir(path: &Path) -> Result<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    File::open(parent)
        .and_then(|dir| dir.sync_all())
        .map_err(|e| io_error(parent, e))
}

#[cfg(not(unix))]
fn sync_parent_dir(_path: &Path) -> Result<()> {
    Ok(())
}

fn corrupt(path: &Path, reason: impl Into<String>) -> LedgerError {
    LedgerError::CorruptData {
        path: path.to_path_buf(),
        reason: reason.into(),
    }
}

fn io_error(path: &Path, source: io::Error) -> LedgerError {
    LedgerError::Io {
        path: path.to_path_buf(),
        source,
    }
}

// ============================================================================
// TESTS
// ============================================================================
