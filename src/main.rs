use anyhow::Result;
use banking_ledger::{
    config, persistence, Card, CardDraft, CardPatch, CardType, Institution, InstitutionPatch,
    LedgerError, Store, SummaryEngine, DEFAULT_HIGH_UTILISATION,
};
use chrono::{DateTime, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(
    name = "banking-ledger",
    version,
    about = "Manage banking institutions, cards and credit scores from a single command line tool"
)]
struct Cli {
    /// JSON file used for storing data (default: <config dir>/banking-ledger/data.json)
    #[arg(long, global = true, env = "BANKING_LEDGER_STORAGE")]
    storage: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Initialise or reset the data store
    Init,

    #[command(flatten)]
    Ledger(LedgerCommand),
}

/// Commands that work on the loaded store
#[derive(Subcommand, Debug)]
enum LedgerCommand {
    /// Add a new banking institution
    AddInstitution {
        name: String,
        #[arg(long)]
        website: Option<String>,
        /// Support phone, email...
        #[arg(long, alias = "support-phone")]
        contact: Option<String>,
        #[arg(long)]
        notes: Option<String>,
    },

    /// Update an institution (by name or id); pass "" to clear a field
    UpdateInstitution {
        institution: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        website: Option<String>,
        #[arg(long)]
        contact: Option<String>,
        #[arg(long)]
        notes: Option<String>,
    },

    /// Remove an institution that has no cards
    RemoveInstitution { institution: String },

    /// List all institutions
    ListInstitutions,

    /// Add a payment card
    AddCard {
        /// Friendly name of the card
        label: String,
        /// Institution issuing the card (must exist)
        #[arg(long)]
        institution: String,
        /// debit, credit or charge
        #[arg(long)]
        card_type: String,
        #[arg(long)]
        credit_limit: Option<f64>,
        #[arg(long, allow_hyphen_values = true)]
        balance: Option<f64>,
        /// APR in percent
        #[arg(long)]
        interest_rate: Option<f64>,
        #[arg(long)]
        annual_fee: Option<f64>,
        #[arg(long)]
        rewards: Option<String>,
        #[arg(long)]
        notes: Option<String>,
        /// Tag to associate with the card (repeatable)
        #[arg(long = "tag")]
        tags: Vec<String>,
    },

    /// Update a card by id; pass "" to clear a text field
    UpdateCard {
        id: String,
        #[arg(long)]
        label: Option<String>,
        /// Move the card to another institution
        #[arg(long)]
        institution: Option<String>,
        #[arg(long)]
        card_type: Option<String>,
        #[arg(long)]
        credit_limit: Option<f64>,
        #[arg(long, allow_hyphen_values = true)]
        balance: Option<f64>,
        #[arg(long)]
        interest_rate: Option<f64>,
        /// Remove the stored interest rate
        #[arg(long, conflicts_with = "interest_rate")]
        clear_interest_rate: bool,
        #[arg(long)]
        annual_fee: Option<f64>,
        /// Remove the stored annual fee
        #[arg(long, conflicts_with = "annual_fee")]
        clear_annual_fee: bool,
        #[arg(long)]
        rewards: Option<String>,
        #[arg(long)]
        notes: Option<String>,
        /// Replace the tag list (repeatable)
        #[arg(long = "tag")]
        tags: Vec<String>,
        /// Remove all tags
        #[arg(long, conflicts_with = "tags")]
        clear_tags: bool,
    },

    /// Remove a card by id
    RemoveCard { id: String },

    /// List stored cards
    ListCards {
        /// Only show cards from the given institution
        #[arg(long)]
        institution: Option<String>,
    },

    /// Record a credit score observation
    #[command(alias = "update-credit-score")]
    RecordScore {
        provider: String,
        score: i64,
        #[arg(long, alias = "notes")]
        note: Option<String>,
        /// When the score was observed (YYYY-MM-DD or RFC 3339), default now
        #[arg(long)]
        date: Option<String>,
    },

    /// List credit score history
    #[command(alias = "list-credit-scores")]
    ListScores {
        #[arg(long)]
        provider: Option<String>,
    },

    /// Overview of utilisation and credit scores
    Summary {
        /// Flag cards at or above this utilisation
        #[arg(long, default_value_t = DEFAULT_HIGH_UTILISATION)]
        threshold: f64,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("❌ {:#}", err);
            let code = err
                .downcast_ref::<LedgerError>()
                .map_or(1, LedgerError::exit_code);
            ExitCode::from(code)
        }
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: Cli) -> Result<()> {
    let path = config::resolve_storage_path(cli.storage.as_deref());

    // Init never reads the old document, so it also recovers a corrupt one
    let command = match cli.command {
        Command::Init => {
            persistence::init(&path)?;
            println!("Initialised data store at {}", path.display());
            return Ok(());
        }
        Command::Ledger(command) => command,
    };

    // Missing file = empty store; it gets created on the first write
    let mut store = Store::from_state(persistence::load_or_empty(&path)?)?;

    match command {
        LedgerCommand::AddInstitution { name, website, contact, notes } => {
            let institution = store.add_institution(&name, website, contact, notes)?;
            commit(&path, &store)?;
            println!("Added institution: {}", institution.name);
        }

        LedgerCommand::UpdateInstitution { institution, name, website, contact, notes } => {
            let id = resolve_institution(&store, &institution)?.id;
            let patch = InstitutionPatch { name, website, contact, notes };
            let updated = store.update_institution(&id, &patch)?;
            commit(&path, &store)?;
            println!("Updated institution: {}", updated.name);
        }

        LedgerCommand::RemoveInstitution { institution } => {
            let id = resolve_institution(&store, &institution)?.id;
            let removed = store.remove_institution(&id)?;
            commit(&path, &store)?;
            println!("Removed institution: {}", removed.name);
        }

        LedgerCommand::ListInstitutions => {
            let institutions = store.list_institutions();
            if institutions.is_empty() {
                println!("No institutions stored.");
            }
            for institution in &institutions {
                println!("{}", describe_institution(institution));
            }
        }

        LedgerCommand::AddCard {
            label,
            institution,
            card_type,
            credit_limit,
            balance,
            interest_rate,
            annual_fee,
            rewards,
            notes,
            tags,
        } => {
            let draft = CardDraft {
                credit_limit,
                balance,
                rewards,
                interest_rate,
                annual_fee,
                notes,
                tags,
                ..CardDraft::new(&label, card_type.parse::<CardType>()?)
            };
            let card = store.add_card(&institution, draft)?;
            commit(&path, &store)?;
            println!(
                "Added card '{}' for {} with id {}",
                card.label,
                institution_name(&store, &card),
                card.id
            );
        }

        LedgerCommand::UpdateCard {
            id,
            label,
            institution,
            card_type,
            credit_limit,
            balance,
            interest_rate,
            clear_interest_rate,
            annual_fee,
            clear_annual_fee,
            rewards,
            notes,
            tags,
            clear_tags,
        } => {
            let institution_id = match institution {
                Some(key) => Some(resolve_institution(&store, &key)?.id),
                None => None,
            };
            let card_type = card_type.map(|t| t.parse::<CardType>()).transpose()?;
            let tags = if clear_tags {
                Some(Vec::new())
            } else if tags.is_empty() {
                None
            } else {
                Some(tags)
            };

            let patch = CardPatch {
                label,
                institution_id,
                card_type,
                credit_limit,
                balance,
                rewards,
                interest_rate: optional_number(interest_rate, clear_interest_rate),
                annual_fee: optional_number(annual_fee, clear_annual_fee),
                notes,
                tags,
            };
            let card = store.update_card(&id, &patch)?;
            commit(&path, &store)?;
            println!("Updated card '{}' ({})", card.label, card.id);
        }

        LedgerCommand::RemoveCard { id } => {
            let card = store.remove_card(&id)?;
            commit(&path, &store)?;
            println!("Removed card '{}' ({})", card.label, card.id);
        }

        LedgerCommand::ListCards { institution } => {
            let filter = match institution {
                Some(key) => Some(resolve_institution(&store, &key)?.id),
                None => None,
            };
            let cards = store.list_cards(filter.as_deref());
            if cards.is_empty() {
                println!("No cards stored.");
            }
            for card in &cards {
                println!("{}", describe_card(&store, card));
            }
        }

        LedgerCommand::RecordScore { provider, score, note, date } => {
            let entry = match date {
                Some(raw) => store.record_credit_score_at(&provider, score, note, parse_date(&raw)?)?,
                None => store.record_credit_score(&provider, score, note)?,
            };
            commit(&path, &store)?;
            println!("Stored credit score for {}: {}", entry.provider, entry.score);
        }

        LedgerCommand::ListScores { provider } => {
            let history = store.list_credit_score_history(provider.as_deref());
            if history.is_empty() {
                println!("No credit scores stored.");
            }
            for entry in &history {
                let mut line = format!(
                    "- {}: {} (recorded {})",
                    entry.provider,
                    entry.score,
                    entry.recorded_at.date_naive()
                );
                if let Some(note) = &entry.note {
                    line.push_str(&format!("\n  Notes: {}", note));
                }
                println!("{}", line);
            }
        }

        LedgerCommand::Summary { threshold, json } => {
            let report = SummaryEngine::new(threshold).summarize(store.state());
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("{}", report.summary());
                for card in &report.cards {
                    let utilisation = card
                        .utilisation
                        .map_or_else(|| "n/a".to_string(), |u| format!("{:.1}%", u * 100.0));
                    let flag = if card.high_utilisation { "  ⚠️ high" } else { "" };
                    println!("- {} [{}] {}: {}{}", card.label, card.card_type, card.institution, utilisation, flag);
                }
                for score in &report.credit_scores {
                    println!(
                        "- {}: {} ({:+}) over {} entries",
                        score.provider, score.latest_score, score.delta, score.entries
                    );
                }
            }
        }
    }

    Ok(())
}

fn commit(path: &Path, store: &Store) -> Result<()> {
    persistence::save(path, store.state())?;
    Ok(())
}

/// `--x VALUE` sets, `--clear-x` clears, neither leaves the field alone
fn optional_number(value: Option<f64>, clear: bool) -> Option<Option<f64>> {
    if clear {
        Some(None)
    } else {
        value.map(Some)
    }
}

/// Look an institution up by id first, then by name
fn resolve_institution(store: &Store, key: &str) -> std::result::Result<Institution, LedgerError> {
    store
        .institution(key)
        .or_else(|| store.institution_by_name(key))
        .ok_or_else(|| LedgerError::not_found("institution", key))
}

fn institution_name(store: &Store, card: &Card) -> String {
    store
        .institution(&card.institution_id)
        .map(|i| i.name)
        .unwrap_or_else(|| card.institution_id.clone())
}

fn parse_date(raw: &str) -> std::result::Result<DateTime<Utc>, LedgerError> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Ok(parsed.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
        .ok_or_else(|| {
            LedgerError::validation(
                "credit score",
                "recorded_at",
                format!("'{}' is not YYYY-MM-DD or RFC 3339", raw),
            )
        })
}

fn describe_institution(institution: &Institution) -> String {
    let mut description = institution.name.clone();
    let extras: Vec<&str> = [&institution.website, &institution.contact]
        .into_iter()
        .filter_map(|v| v.as_deref())
        .collect();
    if !extras.is_empty() {
        description.push_str(&format!(" ({})", extras.join(", ")));
    }
    if let Some(notes) = &institution.notes {
        description.push_str(&format!("\n  Notes: {}", notes));
    }
    format!("- {}", description)
}

fn describe_card(store: &Store, card: &Card) -> String {
    let mut description = format!(
        "- {} [{}] from {} ({})\n  Balance: {:.2}",
        card.label,
        card.card_type,
        institution_name(store, card),
        card.id,
        card.balance
    );
    if let Some(limit) = card.credit_limit {
        description.push_str(&format!(" Limit: {:.2}", limit));
    }
    if let Some(rate) = card.interest_rate {
        description.push_str(&format!(" APR: {:.2}%", rate));
    }
    if let Some(fee) = card.annual_fee {
        description.push_str(&format!(" Annual fee: {:.2}", fee));
    }
    if let Some(rewards) = &card.rewards {
        description.push_str(&format!("\n  Rewards: {}", rewards));
    }
    if !card.tags.is_empty() {
        description.push_str(&format!("\n  Tags: {}", card.tags.join(", ")));
    }
    if let Some(notes) = &card.notes {
        description.push_str(&format!("\n  Notes: {}", notes));
    }
    description
}
