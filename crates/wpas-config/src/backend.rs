// ── Persistence backends ──
//
// The file-backed implementations of the core's configuration seams:
// profile write-back, the `.pp` SSID record, PSK derivation, and AP
// configuration re-reads.

use std::ffi::OsString;
use std::io::Write;
use std::path::{Path, PathBuf};

use pbkdf2::pbkdf2_hmac;
use sha1::Sha1;
use tracing::{debug, info};

use wpas_core::ap::{ApConfig, ApConfigSource, PskDeriver};
use wpas_core::model::ssid_text;
use wpas_core::{ConfigBackend, CoreError, NetworkProfile, ProfileStore};

use crate::network::NetworkEntry;
use crate::{Config, read_config_file, save_config_to};

/// PBKDF2 rounds fixed by IEEE 802.11i for passphrase-to-PSK mapping.
const PSK_ROUNDS: u32 = 4096;

/// WPA passphrase to 256-bit PSK: PBKDF2-HMAC-SHA1 salted with the SSID.
pub fn derive_psk(passphrase: &str, ssid: &[u8]) -> [u8; 32] {
    let mut psk = [0u8; 32];
    pbkdf2_hmac::<Sha1>(passphrase.as_bytes(), ssid, PSK_ROUNDS, &mut psk);
    psk
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Pbkdf2Psk;

impl PskDeriver for Pbkdf2Psk {
    fn derive(&self, passphrase: &str, ssid: &[u8]) -> [u8; 32] {
        derive_psk(passphrase, ssid)
    }
}

/// Where the SSIDs of WPS-provisioned networks are recorded.
pub fn pp_path(config: &Path) -> PathBuf {
    let mut raw = OsString::from(config.as_os_str());
    raw.push(".pp");
    PathBuf::from(raw)
}

// ── Profile write-back ──────────────────────────────────────────────

/// Writes the profile store back into the TOML file it came from,
/// keeping every other section untouched.
#[derive(Debug, Clone)]
pub struct FileBackend {
    path: PathBuf,
}

impl FileBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn merged(&self, profiles: &ProfileStore) -> Result<Config, crate::ConfigError> {
        let mut cfg = read_config_file(&self.path)?;
        let previous = std::mem::take(&mut cfg.networks);
        cfg.networks = profiles
            .iter()
            .filter(|(_, p)| !p.temporary)
            .map(|(_, p)| {
                let fresh = NetworkEntry::from_profile(p);
                match previous
                    .iter()
                    .find(|old| old.ssid == fresh.ssid && old.security == fresh.security)
                {
                    Some(old) => fresh.keep_origin(old),
                    None => fresh,
                }
            })
            .collect();
        Ok(cfg)
    }
}

impl ConfigBackend for FileBackend {
    fn update_psk(&mut self, profile: &mut NetworkProfile) {
        if let Some(pass) = &profile.passphrase {
            profile.psk = Some(derive_psk(pass.expose(), &profile.ssid));
        }
    }

    fn write(&mut self, profiles: &ProfileStore) -> Result<(), CoreError> {
        let cfg = self.merged(profiles)?;
        save_config_to(&cfg, &self.path)?;
        info!(path = %self.path.display(), networks = cfg.networks.len(), "configuration written");
        Ok(())
    }

    fn record_wps_ssid(&mut self, ssid: &[u8]) -> Result<(), CoreError> {
        let path = pp_path(&self.path);
        let line = ssid_text(ssid);
        let existing = match std::fs::read_to_string(&path) {
            Ok(body) => body,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(err) => return Err(io_error(&err)),
        };
        if existing.lines().any(|l| l == line) {
            debug!(ssid = %line, "SSID already recorded");
            return Ok(());
        }
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| io_error(&e))?;
        writeln!(file, "{line}").map_err(|e| io_error(&e))?;
        Ok(())
    }
}

fn io_error(err: &std::io::Error) -> CoreError {
    CoreError::Config {
        message: err.to_string(),
    }
}

// ── AP configuration source ─────────────────────────────────────────

/// Re-reads one AP interface's section from the config file.
#[derive(Debug, Clone)]
pub struct FileApSource {
    path: PathBuf,
    iface: String,
}

impl FileApSource {
    pub fn new(path: impl Into<PathBuf>, iface: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            iface: iface.into(),
        }
    }
}

impl ApConfigSource for FileApSource {
    fn read(&mut self) -> Result<ApConfig, CoreError> {
        let cfg = read_config_file(&self.path)?;
        cfg.find_ap(&self.iface)
            .cloned()
            .ok_or_else(|| CoreError::Config {
                message: format!(
                    "{} has no AP section for {}",
                    self.path.display(),
                    self.iface
                ),
            })
    }
}
