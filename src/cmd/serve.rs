//! Server commands: `permanence serve` and `permanence init-db`.

use std::path::PathBuf;

use anyhow::{Result, bail};
use permanence::config::PortalConfig;
use permanence::portal::server::{ServerConfig, open_database, start_server};

/// CLI flags, the last configuration layer.
#[derive(Debug, Default)]
pub struct ServeOverrides {
    pub port: Option<u16>,
    pub host: Option<String>,
    pub db_path: Option<PathBuf>,
    pub dev: bool,
}

impl ServeOverrides {
    pub fn apply(self, config: &mut PortalConfig) {
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(host) = self.host {
            config.server.host = host;
        }
        if let Some(db_path) = self.db_path {
            config.server.db_path = db_path;
        }
        if self.dev {
            config.server.dev_mode = true;
        }
    }
}

pub async fn cmd_serve(mut config: PortalConfig, overrides: ServeOverrides) -> Result<()> {
    overrides.apply(&mut config);

    let errors = config.validate();
    if !errors.is_empty() {
        for error in &errors {
            tracing::error!("invalid configuration: {}", error);
        }
        bail!("Configuration has {} error(s)", errors.len());
    }

    start_server(ServerConfig::from(&config)).await
}

pub fn cmd_init_db(config: &PortalConfig, db_path: Option<PathBuf>) -> Result<()> {
    let db_path = db_path.unwrap_or_else(|| config.server.db_path.clone());
    open_database(&db_path)?;
    println!("Database initialized at {}", db_path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_flags_override_config() {
        let mut config = PortalConfig::default();
        ServeOverrides {
            port: Some(8080),
            host: Some("0.0.0.0".into()),
            db_path: None,
            dev: true,
        }
        .apply(&mut config);
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.db_path, PathBuf::from(".permanence/permanence.db"));
        assert!(config.server.dev_mode);
    }

    #[test]
    fn absent_flags_keep_config() {
        let mut config = PortalConfig::default();
        config.server.dev_mode = true;
        ServeOverrides::default().apply(&mut config);
        assert_eq!(config.server.port, 3141);
        assert!(config.server.dev_mode);
    }
}
