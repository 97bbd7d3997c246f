//! Engine configuration, read from `roster.toml`.
//!
//! ```toml
//! [database]
//! url = "env:DATABASE_URL"
//!
//! [elevation]
//! disabled_role = "disabled"
//! webmaster_role = "webmaster"
//! admin_org = "admin"
//! webmaster_level = "master"
//! spread_level = "leader"
//!
//! [transaction]
//! isolation = "serializable"
//! ```

use crate::error::RbacError;
use crate::graph::RoleGraph;
use crate::privilege::PrivLevel;
use crate::recalc::ElevationRule;
use sea_orm::IsolationLevel;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::{env, fs};

pub const CONFIG_FILE: &str = "roster.toml";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    pub database: DatabaseConfig,
    pub elevation: ElevationConfig,
    pub transaction: TransactionConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DatabaseConfig {
    /// Connection string, or `env:VAR` to read it from the environment
    pub url: Option<String>,
}

/// Tags naming the roles and org the fixed elevation rules refer to. `None` turns a rule off.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ElevationConfig {
    pub disabled_role: Option<String>,
    pub webmaster_role: Option<String>,
    pub admin_org: Option<String>,
    /// Level the webmaster role grants on the admin org
    pub webmaster_level: PrivLevel,
    /// Minimum level on the admin org that is copied onto every other org
    pub spread_level: PrivLevel,
}

impl Default for ElevationConfig {
    fn default() -> Self {
        Self {
            disabled_role: Some("disabled".to_owned()),
            webmaster_role: Some("webmaster".to_owned()),
            admin_org: Some("admin".to_owned()),
            webmaster_level: PrivLevel::Master,
            spread_level: PrivLevel::Leader,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TransactionConfig {
    pub isolation: Isolation,
}

/// Isolation requested when a [`RosterContext`](crate::RosterContext) begins its transaction.
/// Recalculation reads the same tables several times, so anything weaker than a snapshot is
/// unsafe on a server that supports one.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Isolation {
    #[default]
    Serializable,
    RepeatableRead,
    ReadCommitted,
    /// Leave it to the backend, e.g. SQLite, which is always serializable
    None,
}

impl Isolation {
    pub fn level(self) -> Option<IsolationLevel> {
        match self {
            Isolation::Serializable => Some(IsolationLevel::Serializable),
            Isolation::RepeatableRead => Some(IsolationLevel::RepeatableRead),
            Isolation::ReadCommitted => Some(IsolationLevel::ReadCommitted),
            Isolation::None => None,
        }
    }
}

impl EngineConfig {
    pub fn from_toml(content: &str) -> Result<Self, RbacError> {
        toml::from_str(content).map_err(|e| RbacError::Config(e.to_string()))
    }

    pub fn from_file(path: &Path) -> Result<Self, RbacError> {
        let content = fs::read_to_string(path)
            .map_err(|e| RbacError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml(&content)
    }

    /// Read `roster.toml` from the current directory or its parent, defaults if neither has one.
    pub fn load() -> Result<Self, RbacError> {
        match find_config_file()? {
            Some(path) => {
                tracing::debug!(path = %path.display(), "loading engine config");
                Self::from_file(&path)
            }
            None => Ok(Self::default()),
        }
    }

    /// The connection string, following an `env:VAR` indirection.
    pub fn database_url(&self) -> Result<Option<String>, RbacError> {
        match self.database.url.as_deref() {
            Some(url) => match url.strip_prefix("env:") {
                Some(var) => env::var(var)
                    .map(Some)
                    .map_err(|e| RbacError::Config(format!("{var}: {e}"))),
                None => Ok(Some(url.to_owned())),
            },
            None => Ok(None),
        }
    }

    /// The elevation rules in force for `graph`.
    pub fn elevation_rules(&self, graph: &RoleGraph) -> Vec<ElevationRule> {
        ElevationRule::from_config(&self.elevation, graph)
    }

    pub fn isolation(&mut self, isolation: Isolation) -> &mut Self {
        self.transaction.isolation = isolation;
        self
    }

    pub fn disabled_role(&mut self, tag: Option<&str>) -> &mut Self {
        self.elevation.disabled_role = tag.map(str::to_owned);
        self
    }

    pub fn webmaster_role(&mut self, tag: Option<&str>) -> &mut Self {
        self.elevation.webmaster_role = tag.map(str::to_owned);
        self
    }

    pub fn admin_org(&mut self, tag: Option<&str>) -> &mut Self {
        self.elevation.admin_org = tag.map(str::to_owned);
        self
    }

    pub fn webmaster_level(&mut self, level: PrivLevel) -> &mut Self {
        self.elevation.webmaster_level = level;
        self
    }

    pub fn spread_level(&mut self, level: PrivLevel) -> &mut Self {
        self.elevation.spread_level = level;
        self
    }
}

fn find_config_file() -> Result<Option<PathBuf>, RbacError> {
    let current_dir = env::current_dir().map_err(|e| RbacError::Config(e.to_string()))?;
    let candidates = std::iter::once(current_dir.as_path()).chain(current_dir.parent());
    for dir in candidates {
        let path = dir.join(CONFIG_FILE);
        if path.exists() {
            return Ok(Some(path));
        }
    }
    Ok(None)
}
