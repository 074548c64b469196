//! Application configuration.
//!
//! Settings are layered: built-in defaults, then an optional `mar-editor.toml`
//! in the working directory (or an explicit file), then `MAR_`-prefixed
//! environment variables with `__` between nested keys, e.g.
//! `MAR_GRID__DISCONTINUED_CODE=DISC`.

use crate::models::LegendEntry;
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub grid: GridConfig,
    pub ui: UiConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("mar-editor.db"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is not set.
    pub level: String,
    pub file: PathBuf,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: PathBuf::from("mar-editor.log"),
        }
    }
}

/// Rules of the administration grid that vary between page variants.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    /// Initials value that marks a discontinuation.
    pub discontinued_code: String,
    /// Longest code or initials value accepted in a medication cell.
    pub max_initials_len: usize,
    /// Built-in legend codes shown on every form.
    pub legend: Vec<LegendEntry>,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            discontinued_code: "DC".to_string(),
            max_initials_len: 4,
            legend: builtin_legend(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UiConfig {
    /// How long status and error messages stay on screen.
    pub message_timeout_secs: u64,
    pub framerate: f64,
    /// Owner of custom legend codes created in this session.
    pub clinician_id: String,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            message_timeout_secs: 5,
            framerate: 30.0,
            clinician_id: "default".to_string(),
        }
    }
}

pub fn builtin_legend() -> Vec<LegendEntry> {
    vec![
        LegendEntry::new("DC", "Discontinued"),
        LegendEntry::new("H", "Hospitalized"),
        LegendEntry::new("R", "Refused"),
        LegendEntry::new("LOA", "Leave of absence"),
        LegendEntry::new("NA", "Not available"),
        LegendEntry::new("HD", "Held"),
        LegendEntry::new("SA", "Self-administered"),
    ]
}

/// Loads the configuration.
///
/// # Arguments
///
/// * `path` - An explicit configuration file. It must exist when given. Without
///   it, `mar-editor.toml` is read from the working directory if present.
///
/// # Errors
///
/// Returns an error if a file cannot be parsed or a value has the wrong type.
pub fn load(path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    let file = match path {
        Some(path) => File::from(path).required(true),
        None => File::with_name("mar-editor").required(false),
    };
    Config::builder()
        .add_source(file)
        .add_source(
            Environment::with_prefix("MAR")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .build()?
        .try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_apply_without_a_file() {
        let config = AppConfig::default();
        assert_eq!(config.grid.discontinued_code, "DC");
        assert_eq!(config.grid.max_initials_len, 4);
        assert!(config.grid.legend.iter().any(|e| e.code == "LOA"));
        assert_eq!(config.ui.message_timeout_secs, 5);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn file_values_override_defaults_per_field() {
        let path = std::env::temp_dir().join(format!("mar-editor-test-{}.toml", std::process::id()));
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "[grid]\nmax_initials_len = 3\n\n[database]\npath = \"ward.db\"").unwrap();
        drop(file);

        let config = load(Some(&path)).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(config.grid.max_initials_len, 3);
        assert_eq!(config.grid.discontinued_code, "DC");
        assert_eq!(config.database.path, PathBuf::from("ward.db"));
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        assert!(load(Some(Path::new("/nonexistent/mar-editor.toml"))).is_err());
    }
}
