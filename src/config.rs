// ⚙️ Configuration - where the data store lives
//
// The storage path is the only setting. The CLI takes it from `--storage`
// or the BANKING_LEDGER_STORAGE environment variable; otherwise it lives in
// the per-user configuration directory.

use std::path::{Path, PathBuf};

/// Directory created under the user's config dir
pub const APP_DIR_NAME: &str = "banking-ledger";

pub const DATA_FILE_NAME: &str = "data.json";

/// `<config dir>/banking-ledger/data.json`, falling back to the home
/// directory, then the working directory
pub fn default_data_path() -> PathBuf {
    dirs::config_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR_NAME)
        .join(DATA_FILE_NAME)
}

/// The override if one was given (with a leading `~` expanded), else the default
pub fn resolve_storage_path(override_path: Option<&Path>) -> PathBuf {
    match override_path {
        Some(path) => expand_home(path),
        None => default_data_path(),
    }
}

fn expand_home(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => match dirs::home_dir() {
            Some(home) => home.join(rest),
            None => path.to_path_buf(),
        },
        Err(_) => path.to_path_buf(),
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_path_shape() {
        let path = default_data_path();
        assert!(path.ends_with(Path::new(APP_DIR_NAME).join(DATA_FILE_NAME)));
    }

    #[test]
    fn test_override_wins() {
        let path = resolve_storage_path(Some(Path::new("/tmp/ledger/custom.json")));
        assert_eq!(path, PathBuf::from("/tmp/ledger/custom.json"));
        assert_eq!(resolve_storage_path(None), default_data_path());
    }

    #[test]
    fn test_tilde_expansion() {
        let expanded = resolve_storage_path(Some(Path::new("~/ledger.json")));
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expanded, home.join("ledger.json"));
        }

        // Only a leading `~` component is expanded
        let untouched = resolve_storage_path(Some(Path::new("data/~/ledger.json")));
        assert_eq!(untouched, PathBuf::from("data/~/ledger.json"));
    }
}
