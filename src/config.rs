use crate::auth::{CredentialTable, UserEntry};
use crate::graph::ChartOptions;
use crate::mailer::MailSettings;
use crate::report::DEFAULT_TITLE;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

// Environment variables overriding the SMTP login
pub const EMAIL_USER_VAR: &str = "EMAIL_USER";
pub const EMAIL_PASS_VAR: &str = "EMAIL_PASS";

/// Application configuration, read from a JSON file
///
/// Every field has a default, so a partial file (or none at all) is valid.
///
/// ```json
/// {
///   "bind_address": "127.0.0.1:3000",
///   "database_path": "database/report_app.db",
///   "users": [
///     { "username": "admin", "password_hash": "$argon2id$...", "role": "admin" }
///   ],
///   "smtp": {
///     "host": "smtp.gmail.com", "port": 587, "security": "starttls",
///     "username": "reports@example.com", "from": "Reports <reports@example.com>"
///   }
/// }
/// ```
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub bind_address: String,
    pub database_path: PathBuf,
    pub report_title: String,
    pub chart_width: u32,
    pub chart_height: u32,
    /// Rows shown in the dashboard preview
    pub preview_rows: usize,
    pub users: Vec<UserEntry>,
    pub smtp: Option<MailSettings>,
}

impl Default for AppConfig {
    fn default() -> Self {
        let chart = ChartOptions::default();
        Self {
            bind_address: "127.0.0.1:3000".to_string(),
            database_path: PathBuf::from("database/report_app.db"),
            report_title: DEFAULT_TITLE.to_string(),
            chart_width: chart.width,
            chart_height: chart.height,
            preview_rows: 50,
            users: Vec::new(),
            smtp: None,
        }
    }
}

impl AppConfig {
    /// Load configuration from `path`, falling back to defaults when the file is absent
    ///
    /// SMTP credentials from `EMAIL_USER` / `EMAIL_PASS` take precedence over
    /// the file.
    ///
    /// # Errors
    /// * Returns an error if the file exists but cannot be read or parsed
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Box<dyn std::error::Error>> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let contents = fs::read_to_string(path)?;
            serde_json::from_str(&contents)
                .map_err(|e| format!("Failed to parse {}: {}", path.display(), e))?
        } else {
            log::warn!("No config file at {}, using defaults", path.display());
            AppConfig::default()
        };

        config.apply_env(
            std::env::var(EMAIL_USER_VAR).ok(),
            std::env::var(EMAIL_PASS_VAR).ok(),
        );
        Ok(config)
    }

    /// Override the SMTP login with values from the environment
    pub fn apply_env(&mut self, user: Option<String>, pass: Option<String>) {
        if let Some(smtp) = self.smtp.as_mut() {
            if let Some(user) = user {
                smtp.username = user;
            }
            if let Some(pass) = pass {
                smtp.password = pass;
            }
        }
    }

    pub fn chart_options(&self) -> ChartOptions {
        ChartOptions {
            width: self.chart_width,
            height: self.chart_height,
        }
    }

    pub fn credentials(&self) -> CredentialTable {
        CredentialTable::new(self.users.clone())
    }
}
