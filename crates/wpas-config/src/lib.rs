//! Configuration for the wpas station and AP tooling.
//!
//! A single TOML file holds the station options, the WPS policy, the
//! network profiles, and any AP interfaces. Values layer as built-in
//! defaults, then the file, then `WPAS_*` environment variables.
//! Passphrases resolve through an env var, the system keyring, or
//! plaintext, in that order.

mod backend;
mod network;
mod station;

use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use wpas_core::ap::ApConfig;
use wpas_core::{CoreError, ProfileStore, StationOptions};

pub use backend::{FileApSource, FileBackend, Pbkdf2Psk, derive_psk, pp_path};
pub use network::{NetworkEntry, Security, resolve_passphrase};
pub use station::{StationSection, WpsSection};

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no passphrase or PSK configured for network '{network}'")]
    NoCredentials { network: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

impl From<ConfigError> for CoreError {
    fn from(err: ConfigError) -> Self {
        Self::Config {
            message: err.to_string(),
        }
    }
}

impl ConfigError {
    pub(crate) fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

// ── Top-level config ────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub station: StationSection,

    #[serde(default)]
    pub wps: WpsSection,

    /// Network profiles, in priority-group order.
    #[serde(default)]
    pub networks: Vec<NetworkEntry>,

    /// AP interfaces; each entry's first BSS names the radio.
    #[serde(default)]
    pub ap: Vec<ApConfig>,
}

impl Config {
    pub fn station_options(&self) -> Result<StationOptions, ConfigError> {
        self.station.to_options(&self.wps)
    }

    /// Build the profile store, resolving every passphrase.
    pub fn profile_store(&self) -> Result<ProfileStore, ConfigError> {
        let profiles = self
            .networks
            .iter()
            .map(NetworkEntry::to_profile)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ProfileStore::from_profiles(profiles))
    }

    /// AP interface whose primary BSS is `iface`.
    pub fn find_ap(&self, iface: &str) -> Option<&ApConfig> {
        self.ap
            .iter()
            .find(|ap| ap.bss.first().is_some_and(|b| b.iface == iface))
    }

    /// Every problem found, rather than just the first.
    pub fn problems(&self) -> Vec<ConfigError> {
        let mut out = Vec::new();
        if let Err(err) = self.station_options() {
            out.push(err);
        }
        for (idx, net) in self.networks.iter().enumerate() {
            if let Err(err) = net.to_profile() {
                out.push(match err {
                    ConfigError::Validation { field, reason } => {
                        ConfigError::invalid(format!("networks[{idx}].{field}"), reason)
                    }
                    other => other,
                });
            }
        }
        for (idx, ap) in self.ap.iter().enumerate() {
            if let Err(err) = ap.check() {
                out.push(ConfigError::invalid(format!("ap[{idx}]"), err.to_string()));
            }
        }
        out
    }
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("org", "wpas", "wpas").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("wpas");
    p
}

// ── Loading ─────────────────────────────────────────────────────────

/// Load from `path` with environment overrides (`WPAS_STATION__IFNAME`).
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("WPAS_").split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

/// Load the file alone, without environment overrides.
pub fn read_config_file(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path));
    Ok(figment.extract()?)
}

pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load config, returning a default if the file doesn't exist.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

// ── Saving ──────────────────────────────────────────────────────────

pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<(), ConfigError> {
    save_config_to(cfg, &config_path())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;
    use wpas_core::ap::BssConfig;

    use super::*;

    fn write(dir: &tempfile::TempDir, body: &str) -> PathBuf {
        let path = dir.path().join("config.toml");
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = read_config_file(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(cfg, Config::default());
        assert_eq!(cfg.station.ifname, "wlan0");
    }

    #[test]
    fn file_values_override_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            &dir,
            r#"
[station]
ifname = "wlp2s0"
scan_interval = 10

[wps]
allow_pbc_overlap = true

[[networks]]
ssid = "home"
security = "wpa2-psk"
passphrase = "correct horse"
"#,
        );
        let cfg = read_config_file(&path).unwrap();
        assert_eq!(cfg.station.ifname, "wlp2s0");
        assert_eq!(cfg.station.scan_interval, 10);
        assert!(cfg.wps.allow_pbc_overlap);
        assert_eq!(cfg.networks.len(), 1);
        assert_eq!(cfg.station.blacklist_fail_max, 5);
    }

    #[test]
    fn save_then_load_keeps_everything() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let mut cfg = Config::default();
        cfg.networks.push(NetworkEntry::open("cafe"));
        cfg.ap.push(ApConfig::new(vec![BssConfig::new("wlan1", "lab")]));

        save_config_to(&cfg, &path).unwrap();
        assert_eq!(read_config_file(&path).unwrap(), cfg);
    }

    #[test]
    fn problems_are_collected_per_section() {
        let mut cfg = Config::default();
        cfg.station.ap_scan = 7;
        cfg.networks.push(NetworkEntry {
            psk: Some("abcd".into()),
            ..NetworkEntry::new("home", Security::Wpa2Psk)
        });
        cfg.ap.push(ApConfig::new(Vec::new()));

        let problems = cfg.problems();
        assert_eq!(problems.len(), 3);
        assert!(problems[1].to_string().contains("networks[0].psk"));
        assert!(problems[2].to_string().starts_with("invalid ap[0]"));
    }

    #[test]
    fn find_ap_matches_primary_bss() {
        let mut cfg = Config::default();
        cfg.ap.push(ApConfig::new(vec![
            BssConfig::new("wlan1", "a"),
            BssConfig::new("wlan1_0", "b"),
        ]));
        assert!(cfg.find_ap("wlan1").is_some());
        assert!(cfg.find_ap("wlan1_0").is_none());
    }

    #[test]
    fn config_error_becomes_core_error() {
        let err: CoreError = ConfigError::NoCredentials {
            network: "home".into(),
        }
        .into();
        assert!(matches!(err, CoreError::Config { .. }));
    }
}
