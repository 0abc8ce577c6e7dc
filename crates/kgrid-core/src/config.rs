//! kgrid.toml settings parser.
//!
//! Every section is optional; an absent file yields the defaults.
//!
//! ```toml
//! [store]
//! path = "/tmp/kgrid/config.yaml"
//!
//! [timeouts]
//! control_plane_active = "20m"
//! control_plane_poll = "9s"
//! node_ready_attempts = 24
//! app_ready = "5m"
//!
//! [binaries]
//! aws = "/usr/local/bin/aws"
//! kots = "/opt/kots/kots"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("failed to render settings: {0}")]
    Render(#[from] toml::ser::Error),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub store: StoreSettings,
    pub timeouts: Timeouts,
    pub binaries: BinarySettings,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    /// Location of the grids document. Defaults to `~/.kgrid/config.yaml`.
    pub path: Option<PathBuf>,
}

/// Poll intervals, deadlines and attempt limits for every wait loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    /// Overall deadline for an EKS control plane to report ACTIVE.
    #[serde(with = "duration_str")]
    pub control_plane_active: Duration,
    #[serde(with = "duration_str")]
    pub control_plane_poll: Duration,
    /// Attempts at reaching the Kubernetes API server after provisioning.
    pub api_server_attempts: u32,
    /// Attempts at seeing every node Ready.
    pub node_ready_attempts: u32,
    /// Sleep between API server, node and node group polls.
    #[serde(with = "duration_str")]
    pub node_poll: Duration,
    /// Attempts at seeing a deleted node group disappear.
    pub node_group_delete_attempts: u32,
    /// Attempts at seeing a NAT gateway become available.
    pub nat_gateway_attempts: u32,
    /// Deadline for an installed application to report ready.
    #[serde(with = "duration_str")]
    pub app_ready: Duration,
    /// Sleep between application status polls.
    #[serde(with = "duration_str")]
    pub app_poll: Duration,
    #[serde(with = "duration_str")]
    pub app_install: Duration,
    #[serde(with = "duration_str")]
    pub app_status: Duration,
    #[serde(with = "duration_str")]
    pub support_bundle: Duration,
    /// Bound on any single kubectl or aws invocation.
    #[serde(with = "duration_str")]
    pub command: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            control_plane_active: Duration::from_secs(20 * 60),
            control_plane_poll: Duration::from_secs(9),
            api_server_attempts: 24,
            node_ready_attempts: 24,
            node_poll: Duration::from_secs(10),
            node_group_delete_attempts: 24,
            nat_gateway_attempts: 10,
            app_ready: Duration::from_secs(5 * 60),
            app_poll: Duration::from_secs(10),
            app_install: Duration::from_secs(10 * 60),
            app_status: Duration::from_secs(5),
            support_bundle: Duration::from_secs(5 * 60),
            command: Duration::from_secs(2 * 60),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BinarySettings {
    pub aws: PathBuf,
    pub kubectl: PathBuf,
    /// Pre-installed `kots` binary. When unset the release is downloaded.
    pub kots: Option<PathBuf>,
    /// Pre-installed `support-bundle` binary. When unset the latest release is downloaded.
    pub support_bundle: Option<PathBuf>,
}

impl Default for BinarySettings {
    fn default() -> Self {
        Self {
            aws: PathBuf::from("aws"),
            kubectl: PathBuf::from("kubectl"),
            kots: None,
            support_bundle: None,
        }
    }
}

impl Settings {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load `path` if given, else `~/.kgrid/kgrid.toml` if it exists, else defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = path {
            return Self::from_file(path);
        }
        match kgrid_home().map(|home| home.join("kgrid.toml")) {
            Some(default) if default.is_file() => Self::from_file(&default),
            _ => Ok(Self::default()),
        }
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Store path from settings, falling back to `~/.kgrid/config.yaml`.
    pub fn store_path(&self) -> PathBuf {
        self.store
            .path
            .clone()
            .or_else(|| kgrid_home().map(|home| home.join("config.yaml")))
            .unwrap_or_else(|| PathBuf::from(".kgrid/config.yaml"))
    }
}

fn kgrid_home() -> Option<PathBuf> {
    std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".kgrid"))
}

/// Parse `"500ms"`, `"9s"`, `"20m"` or a bare number of seconds.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Some(ms) = s.strip_suffix("ms") {
        ms.parse::<u64>().ok().map(Duration::from_millis)
    } else if let Some(secs) = s.strip_suffix('s') {
        secs.parse::<u64>().ok().map(Duration::from_secs)
    } else if let Some(mins) = s.strip_suffix('m') {
        mins.parse::<u64>().ok().map(|m| Duration::from_secs(m * 60))
    } else if let Some(hours) = s.strip_suffix('h') {
        hours.parse::<u64>().ok().map(|h| Duration::from_secs(h * 3600))
    } else {
        s.parse::<u64>().ok().map(Duration::from_secs)
    }
}

fn format_duration(d: &Duration) -> String {
    let millis = d.as_millis();
    if millis % 1000 != 0 {
        format!("{millis}ms")
    } else if d.as_secs() % 60 == 0 && d.as_secs() > 0 {
        format!("{}m", d.as_secs() / 60)
    } else {
        format!("{}s", d.as_secs())
    }
}

mod duration_str {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format_duration(d))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(deserializer)?;
        super::parse_duration(&raw)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid duration {raw:?}")))
    }
}
