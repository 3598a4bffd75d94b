//! Layered configuration
//!
//! Values resolve from, in priority order: `ZARF_<DOTTED_KEY>` environment
//! variables (dots become underscores, uppercased), then the config file
//! named by `ZARF_CONFIG`, then nothing. Flag defaults consult this layer
//! so automation can pin options without touching the command line.

use std::path::PathBuf;

/// Environment variable naming the config file
pub const CONFIG_ENV: &str = "ZARF_CONFIG";

/// Environment variable controlling the log filter
pub const LOG_LEVEL_ENV: &str = "ZARF_LOG_LEVEL";

/// The loaded configuration layer
#[derive(Debug, Default)]
pub struct Config {
    file: Option<serde_yaml::Value>,
}

impl Config {
    /// Load the config file named by `ZARF_CONFIG`, if any
    pub fn load() -> Self {
        let Some(path) = std::env::var_os(CONFIG_ENV).map(PathBuf::from) else {
            return Self::default();
        };

        match std::fs::read_to_string(&path) {
            Ok(content) => match serde_yaml::from_str(&content) {
                Ok(value) => Self { file: Some(value) },
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "ignoring unparseable config file");
                    Self::default()
                }
            },
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "ignoring unreadable config file");
                Self::default()
            }
        }
    }

    /// Look a dotted key up, environment first
    pub fn get(&self, dotted_key: &str) -> Option<String> {
        let env_key = format!(
            "ZARF_{}",
            dotted_key.replace(['.', '-'], "_").to_uppercase()
        );
        if let Ok(value) = std::env::var(&env_key) {
            return Some(value);
        }

        let mut current = self.file.as_ref()?;
        for segment in dotted_key.split('.') {
            current = current.get(segment)?;
        }

        match current {
            serde_yaml::Value::String(s) => Some(s.clone()),
            serde_yaml::Value::Bool(b) => Some(b.to_string()),
            serde_yaml::Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// Boolean view of a key
    pub fn get_bool(&self, dotted_key: &str) -> Option<bool> {
        self.get(dotted_key).map(|v| v == "true" || v == "1")
    }
}

/// Whether interactive prompting should be suppressed
pub fn is_ci() -> bool {
    std::env::var("CI").map(|v| v == "true").unwrap_or(false)
}
