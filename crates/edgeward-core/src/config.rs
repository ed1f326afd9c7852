//! edgeward.toml configuration parser.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EdgewardConfig {
    pub router: RouterConfig,
    pub tls: TlsSettings,
    pub render: RenderConfig,
    pub api: ApiConfig,
    pub stats: StatsConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Minimum time between two reloads of the proxy.
    pub reload_interval: String,
    pub allow_wildcard_routes: bool,
    /// Render with unbound ports until the initial sync completed.
    pub bind_ports_after_sync: bool,
    /// Commit once at startup without waiting for the first interval.
    pub commit_on_start: bool,
    /// Only admit objects from these namespaces. `None` admits all.
    pub namespaces: Option<Vec<String>>,
    /// Let routes from different namespaces share a host or wildcard
    /// subdomain.
    pub disable_namespace_ownership_check: bool,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            reload_interval: "5s".to_string(),
            allow_wildcard_routes: false,
            bind_ports_after_sync: false,
            commit_on_start: true,
            namespaces: None,
            disable_namespace_ownership_check: false,
        }
    }
}

impl RouterConfig {
    pub fn reload_interval(&self) -> Result<Duration, ConfigError> {
        parse_duration(&self.reload_interval)
    }
}

/// How reencrypt routes without a destination CA are treated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingDestinationCa {
    /// Admit the route and let the renderer apply its own policy.
    #[default]
    Defer,
    /// Reject the route.
    Reject,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TlsSettings {
    pub missing_destination_ca: MissingDestinationCa,
    /// CA bundle used to verify reencrypt backends that bring no CA of
    /// their own, typically the service-serving CA.
    pub default_destination_ca_path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub output_dir: PathBuf,
    /// Executed after the configuration is written.
    pub reload_command: Option<PathBuf>,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("/var/lib/edgeward"),
            reload_command: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub listen: SocketAddr,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([0, 0, 0, 0], 1936)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatsConfig {
    pub user: Option<String>,
    pub password: Option<String>,
    /// Port the proxy exposes its own statistics page on.
    pub port: u16,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            user: None,
            password: None,
            port: 1936,
        }
    }
}

impl StatsConfig {
    /// Credentials are only enforced when both halves are set.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (self.user.as_deref(), self.password.as_deref()) {
            (Some(user), Some(password)) if !user.is_empty() => Some((user, password)),
            _ => None,
        }
    }
}

impl EdgewardConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: EdgewardConfig = toml::from_str(content)?;
        config.router.reload_interval()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }
}

/// Parse a duration string like "250ms", "5s", "2m", "1h". A bare number
/// is seconds.
pub fn parse_duration(s: &str) -> Result<Duration, ConfigError> {
    let s = s.trim();
    let invalid = || ConfigError::InvalidDuration(s.to_string());

    let (digits, millis_per_unit) = if let Some(ms) = s.strip_suffix("ms") {
        (ms, 1)
    } else if let Some(secs) = s.strip_suffix('s') {
        (secs, 1_000)
    } else if let Some(mins) = s.strip_suffix('m') {
        (mins, 60_000)
    } else if let Some(hours) = s.strip_suffix('h') {
        (hours, 3_600_000)
    } else {
        (s, 1_000)
    };

    let value = digits.trim().parse::<u64>().map_err(|_| invalid())?;
    let millis = value.checked_mul(millis_per_unit).ok_or_else(invalid)?;
    Ok(Duration::from_millis(millis))
}
