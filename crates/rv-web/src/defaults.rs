//! Instrument script directory
//!
//! Each instrument has a folder under the scripts root holding its reduction
//! script and a `reduce_vars.json` file with the default reduction variables.

use std::path::{Path, PathBuf};

use rv_core::ReductionArguments;
use rv_storage::Storage;
use serde::Serialize;
use thiserror::Error;
use tracing::info;

pub const VARIABLES_FILE: &str = "reduce_vars.json";
pub const SCRIPT_FILE: &str = "reduce.py";

#[derive(Error, Debug)]
pub enum DefaultsError {
    #[error("reduce_vars.json is missing for this instrument")]
    Missing,

    #[error("reduce_vars.json could not be read: {0}")]
    Unreadable(#[from] std::io::Error),

    #[error("reduce_vars.json has a syntax error: {0}")]
    Invalid(String),
}

pub fn instrument_dir(scripts_root: &Path, instrument: &str) -> PathBuf {
    scripts_root.join(instrument)
}

pub fn has_reduction_script(scripts_root: &Path, instrument: &str) -> bool {
    instrument_dir(scripts_root, instrument)
        .join(SCRIPT_FILE)
        .is_file()
}

/// Load the default variables shipped with an instrument.
pub fn load_default_arguments(
    scripts_root: &Path,
    instrument: &str,
) -> Result<ReductionArguments, DefaultsError> {
    let path = instrument_dir(scripts_root, instrument).join(VARIABLES_FILE);
    if !path.exists() {
        return Err(DefaultsError::Missing);
    }

    let content = std::fs::read_to_string(&path)?;
    let value: serde_json::Value =
        serde_json::from_str(&content).map_err(|e| DefaultsError::Invalid(e.to_string()))?;
    ReductionArguments::from_value(value).map_err(|e| DefaultsError::Invalid(e.to_string()))
}

/// Defaults for display: a failed load is reported as a reason string and an
/// empty set of variables.
pub fn defaults_for_display(scripts_root: &Path, instrument: &str) -> (ReductionArguments, String) {
    match load_default_arguments(scripts_root, instrument) {
        Ok(arguments) => (arguments, String::new()),
        Err(e) => (ReductionArguments::default(), e.to_string()),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstrumentActivity {
    pub name: String,
    pub is_active: bool,
    pub changed: bool,
}

/// Mark each instrument active exactly when its reduction script exists.
pub async fn sync_instrument_activity(
    storage: &Storage,
    scripts_root: &Path,
) -> rv_storage::Result<Vec<InstrumentActivity>> {
    let mut report = Vec::new();

    for instrument in storage.list_instruments().await? {
        let is_active = has_reduction_script(scripts_root, &instrument.name);
        let changed = instrument.is_active != is_active;
        if changed {
            storage.set_instrument_active(&instrument.name, is_active).await?;
            info!(
                "Instrument {} is now {}",
                instrument.name,
                if is_active { "active" } else { "inactive" }
            );
        }
        report.push(InstrumentActivity {
            name: instrument.name,
            is_active,
            changed,
        });
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(root: &Path, instrument: &str, file: &str, content: &str) {
        let dir = instrument_dir(root, instrument);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(file), content).unwrap();
    }

    #[test]
    fn test_load_default_arguments() {
        let root = tempfile::tempdir().unwrap();
        write(
            root.path(),
            "MARI",
            VARIABLES_FILE,
            r#"{"standard_vars": {"ei": 10}, "advanced_vars": {"mask": "m.xml"}}"#,
        );

        let arguments = load_default_arguments(root.path(), "MARI").unwrap();
        assert_eq!(arguments.standard_vars["ei"], serde_json::json!(10));

        assert!(matches!(
            load_default_arguments(root.path(), "WISH"),
            Err(DefaultsError::Missing)
        ));
    }

    #[test]
    fn test_invalid_defaults_give_reason() {
        let root = tempfile::tempdir().unwrap();
        write(root.path(), "MARI", VARIABLES_FILE, "{not json");

        let (arguments, reason) = defaults_for_display(root.path(), "MARI");
        assert!(arguments.is_empty());
        assert!(reason.starts_with("reduce_vars.json has a syntax error"));

        let (_, reason) = defaults_for_display(root.path(), "GEM");
        assert_eq!(reason, "reduce_vars.json is missing for this instrument");
    }

    #[tokio::test]
    async fn test_sync_instrument_activity() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::new(Some(dir.path().join("test.db"))).await.unwrap();
        let root = dir.path().join("scripts");
        write(&root, "MARI", SCRIPT_FILE, "print('reduce')");

        storage.create_instrument("MARI").await.unwrap();
        storage.create_instrument("WISH").await.unwrap();

        let report = sync_instrument_activity(&storage, &root).await.unwrap();
        assert_eq!(
            report,
            vec![
                InstrumentActivity {
                    name: "MARI".to_string(),
                    is_active: true,
                    changed: false,
                },
                InstrumentActivity {
                    name: "WISH".to_string(),
                    is_active: false,
                    changed: true,
                },
            ]
        );
        assert!(!storage.get_instrument("WISH").await.unwrap().is_active);
    }
}
