//! CLI command implementations.
//!
//! | Module   | Commands handled     |
//! |----------|----------------------|
//! | `serve`  | `Serve`, `InitDb`    |
//! | `config` | `Config`             |

pub mod config;
pub mod serve;

use std::path::Path;

use anyhow::Result;
use permanence::config::{PortalConfig, default_config_path};

pub use config::cmd_config;
pub use serve::{ServeOverrides, cmd_init_db, cmd_serve};

/// File then environment. An explicitly named file must exist.
pub fn load_config(explicit: Option<&Path>) -> Result<PortalConfig> {
    let mut config = match explicit {
        Some(path) => PortalConfig::load(path)?,
        None => PortalConfig::load_or_default(&default_config_path())?,
    };
    config.apply_env()?;
    Ok(config)
}
