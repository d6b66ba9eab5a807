//! Configuration for the permanence server.
//!
//! Settings are read from `.permanence/permanence.toml` when it exists and
//! layered file → environment → CLI flags.
//!
//! ```toml
//! [server]
//! host = "127.0.0.1"
//! port = 3141
//! db_path = ".permanence/permanence.db"
//! dev_mode = false
//!
//! [email]
//! api_url = "https://api.resend.com/emails"
//! from_name = "Permanence parlementaire"
//! from_email = "noreply@example.org"
//! reply_to = "contact@example.org"
//! admin_email = "contact@example.org"
//! timeout_secs = 10
//!
//! [admin]
//! tokens = []
//! ```
//!
//! Secrets are better kept in the environment: `EMAIL_API_KEY` and
//! `ADMIN_TOKEN` (appended to `admin.tokens`).

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::portal::email::EmailSettings;
use crate::portal::mailer::DEFAULT_EMAIL_API_URL;
use crate::portal::validation::is_valid_email;

pub const CONFIG_DIR: &str = ".permanence";
pub const CONFIG_FILE: &str = "permanence.toml";

pub fn default_config_path() -> PathBuf {
    Path::new(CONFIG_DIR).join(CONFIG_FILE)
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PortalConfig {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub email: EmailSection,
    #[serde(default)]
    pub admin: AdminSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
    /// Permissive CORS for a front end served from another origin.
    #[serde(default)]
    pub dev_mode: bool,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3141
}

fn default_db_path() -> PathBuf {
    Path::new(CONFIG_DIR).join("permanence.db")
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            db_path: default_db_path(),
            dev_mode: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailSection {
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// Without a key, emails are logged instead of sent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default = "default_from_name")]
    pub from_name: String,
    #[serde(default = "default_from_email")]
    pub from_email: String,
    #[serde(default = "default_reply_to")]
    pub reply_to: String,
    /// Receives an alert for every new submission. Empty disables alerts.
    #[serde(default)]
    pub admin_email: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_api_url() -> String {
    DEFAULT_EMAIL_API_URL.to_string()
}

fn default_from_name() -> String {
    "Permanence parlementaire".to_string()
}

fn default_from_email() -> String {
    "noreply@example.org".to_string()
}

fn default_reply_to() -> String {
    "contact@example.org".to_string()
}

fn default_timeout_secs() -> u64 {
    10
}

impl Default for EmailSection {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            api_key: None,
            from_name: default_from_name(),
            from_email: default_from_email(),
            reply_to: default_reply_to(),
            admin_email: String::new(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AdminSection {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tokens: Vec<String>,
}

impl PortalConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse permanence.toml")
    }

    /// Missing file means defaults.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let content = toml::to_string_pretty(self).context("Failed to serialize permanence.toml")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_env_with(|key| std::env::var(key).ok())
    }

    /// Overlay environment variables read through `lookup`.
    pub fn apply_env_with<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(key) = get("EMAIL_API_KEY") {
            self.email.api_key = Some(key);
        }
        if let Some(token) = get("ADMIN_TOKEN") {
            self.admin.tokens.push(token);
        }
        if let Some(port) = get("PERMANENCE_PORT") {
            self.server.port = port
                .parse()
                .with_context(|| format!("Invalid PERMANENCE_PORT: {}", port))?;
        }
        if let Some(path) = get("PERMANENCE_DB_PATH") {
            self.server.db_path = PathBuf::from(path);
        }
        Ok(())
    }

    /// Problems that would make the server misbehave. Empty means valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.server.port == 0 {
            errors.push("server.port must be non-zero".to_string());
        }
        if self.server.host.trim().is_empty() {
            errors.push("server.host must not be empty".to_string());
        }
        if self.email.from_email.trim().is_empty() {
            errors.push("email.from_email must not be empty".to_string());
        } else if !is_valid_email(&self.email.from_email) {
            errors.push(format!(
                "email.from_email is not a valid address: {}",
                self.email.from_email
            ));
        }
        if !self.email.reply_to.is_empty() && !is_valid_email(&self.email.reply_to) {
            errors.push(format!(
                "email.reply_to is not a valid address: {}",
                self.email.reply_to
            ));
        }
        if !self.email.admin_email.is_empty() && !is_valid_email(&self.email.admin_email) {
            errors.push(format!(
                "email.admin_email is not a valid address: {}",
                self.email.admin_email
            ));
        }
        if !self.email.api_url.starts_with("http://") && !self.email.api_url.starts_with("https://") {
            errors.push(format!("email.api_url must be an http(s) URL: {}", self.email.api_url));
        }
        if self.email.timeout_secs == 0 {
            errors.push("email.timeout_secs must be at least 1".to_string());
        }
        errors
    }

    pub fn email_settings(&self) -> EmailSettings {
        EmailSettings {
            from_name: self.email.from_name.clone(),
            from_email: self.email.from_email.clone(),
            reply_to: self.email.reply_to.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn defaults_are_valid() {
        let config = PortalConfig::default();
        assert_eq!(config.server.port, 3141);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.db_path, PathBuf::from(".permanence/permanence.db"));
        assert_eq!(config.email.api_url, "https://api.resend.com/emails");
        assert!(config.validate().is_empty());
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let config = PortalConfig::parse(
            r#"
[server]
port = 8080

[email]
from_name = "Permanence de la députée"
"#,
        )
        .unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.email.from_name, "Permanence de la députée");
        assert_eq!(config.email.timeout_secs, 10);
        assert!(config.admin.tokens.is_empty());
    }

    #[test]
    fn invalid_toml_is_an_error() {
        let err = PortalConfig::parse("[server\nport = 1").unwrap_err();
        assert!(err.to_string().contains("permanence.toml"));
    }

    #[test]
    fn env_overrides_file() {
        let env: HashMap<&str, &str> = [
            ("EMAIL_API_KEY", "re_123"),
            ("ADMIN_TOKEN", "from-env"),
            ("PERMANENCE_PORT", "9000"),
            ("PERMANENCE_DB_PATH", "/var/lib/permanence/db.sqlite"),
        ]
        .into_iter()
        .collect();
        let mut config = PortalConfig::parse("[admin]\ntokens = [\"from-file\"]").unwrap();
        config
            .apply_env_with(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.email.api_key.as_deref(), Some("re_123"));
        assert_eq!(config.admin.tokens, vec!["from-file", "from-env"]);
        assert_eq!(config.server.port, 9000);
        assert_eq!(
            config.server.db_path,
            PathBuf::from("/var/lib/permanence/db.sqlite")
        );
    }

    #[test]
    fn bad_env_port_is_an_error() {
        let mut config = PortalConfig::default();
        let err = config
            .apply_env_with(|k| (k == "PERMANENCE_PORT").then(|| "http".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains("PERMANENCE_PORT"));
    }

    #[test]
    fn validate_reports_every_problem() {
        let mut config = PortalConfig::default();
        config.server.port = 0;
        config.email.from_email = String::new();
        config.email.admin_email = "bureau".into();
        let errors = config.validate();
        assert_eq!(errors.len(), 3);
        assert!(errors.iter().any(|e| e.contains("server.port")));
        assert!(errors.iter().any(|e| e.contains("from_email")));
        assert!(errors.iter().any(|e| e.contains("admin_email")));
    }

    #[test]
    fn save_then_load_preserves_settings() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join(CONFIG_FILE);
        let mut config = PortalConfig::default();
        config.server.dev_mode = true;
        config.email.admin_email = "bureau@example.org".into();
        config.save(&path).unwrap();

        let loaded = PortalConfig::load(&path).unwrap();
        assert!(loaded.server.dev_mode);
        assert_eq!(loaded.email.admin_email, "bureau@example.org");
    }

    #[test]
    fn missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let config = PortalConfig::load_or_default(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.server.port, 3141);
    }
}
