// ── Network entries ──
//
// The on-disk form of a network profile and its translation to and
// from `NetworkProfile`. Passphrases resolve env → keyring → plaintext.

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use tracing::debug;

use wpas_core::model::{
    AuthAlg, Cipher, Disabled, EapConfig, KeyMgmt, MfpPolicy, NUM_WEP_KEYS, OpMode, Passphrase,
    Proto, ssid_text,
};
use wpas_core::{MacAddr, NetworkProfile};

use crate::ConfigError;
use crate::backend::derive_psk;

/// Security preset; expands to key management, protocol, and ciphers.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, Display, EnumString,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum Security {
    #[default]
    Open,
    Wep,
    WpaPsk,
    Wpa2Psk,
    WpaEap,
    Wpa2Eap,
    Ieee8021x,
}

impl Security {
    pub fn uses_psk(self) -> bool {
        matches!(self, Self::WpaPsk | Self::Wpa2Psk)
    }

    /// Closest preset for an existing profile.
    pub fn of(profile: &NetworkProfile) -> Self {
        let rsn_only = profile.proto == Proto::RSN;
        if profile.key_mgmt.is_wpa_psk() {
            if rsn_only { Self::Wpa2Psk } else { Self::WpaPsk }
        } else if profile.key_mgmt.is_wpa_ieee8021x() {
            if rsn_only { Self::Wpa2Eap } else { Self::WpaEap }
        } else if profile.key_mgmt.contains(KeyMgmt::IEEE8021X_NO_WPA) {
            Self::Ieee8021x
        } else if profile.has_wep_key() {
            Self::Wep
        } else {
            Self::Open
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct NetworkEntry {
    /// Label used for the keyring entry; defaults to the SSID.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    pub ssid: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bssid: Option<MacAddr>,

    #[serde(default)]
    pub security: Security,

    /// Plaintext passphrase (prefer keyring or env var).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub passphrase: Option<String>,

    /// Environment variable holding the passphrase.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub passphrase_env: Option<String>,

    /// Raw 256-bit PSK as 64 hex digits.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub psk: Option<String>,

    /// Hex WEP keys, up to four.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub wep_keys: Vec<String>,

    #[serde(default)]
    pub wep_tx_keyidx: usize,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eap: Option<EapConfig>,

    #[serde(default)]
    pub priority: i32,

    #[serde(default)]
    pub disabled: bool,

    #[serde(default)]
    pub mode: OpMode,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub freq_list: Vec<u32>,

    #[serde(default)]
    pub ieee80211w: MfpPolicy,
}

impl NetworkEntry {
    pub fn new(ssid: impl Into<String>, security: Security) -> Self {
        Self {
            name: None,
            ssid: ssid.into(),
            bssid: None,
            security,
            passphrase: None,
            passphrase_env: None,
            psk: None,
            wep_keys: Vec::new(),
            wep_tx_keyidx: 0,
            eap: None,
            priority: 0,
            disabled: false,
            mode: OpMode::Infra,
            freq_list: Vec::new(),
            ieee80211w: MfpPolicy::Disabled,
        }
    }

    pub fn open(ssid: impl Into<String>) -> Self {
        Self::new(ssid, Security::Open)
    }

    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.ssid)
    }

    /// Translate to a `NetworkProfile`, deriving the PSK when a
    /// passphrase is available.
    pub fn to_profile(&self) -> Result<NetworkProfile, ConfigError> {
        let ssid = self.ssid.as_bytes();
        if ssid.len() > 32 {
            return Err(ConfigError::invalid("ssid", "longer than 32 bytes"));
        }
        let mut profile = NetworkProfile {
            ssid: ssid.to_vec(),
            bssid: self.bssid,
            priority: self.priority,
            mode: self.mode,
            freq_list: self.freq_list.clone(),
            ieee80211w: self.ieee80211w,
            disabled: if self.disabled {
                Disabled::USER
            } else {
                Disabled::empty()
            },
            ..NetworkProfile::default()
        };
        self.apply_security(&mut profile);
        if let Some(eap) = &self.eap {
            profile.eap = eap.clone();
        }
        self.apply_wep_keys(&mut profile)?;

        if self.security.uses_psk() {
            let raw = self.raw_psk()?;
            if let Some(psk) = raw {
                profile.psk = Some(psk);
            } else {
                let secret = resolve_passphrase(self)?.ok_or_else(|| {
                    ConfigError::NoCredentials {
                        network: self.label().to_owned(),
                    }
                })?;
                let passphrase = secret.expose_secret();
                if !(8..=63).contains(&passphrase.len()) {
                    return Err(ConfigError::invalid(
                        "passphrase",
                        "must be 8 to 63 characters",
                    ));
                }
                profile.psk = Some(derive_psk(passphrase, ssid));
                profile.passphrase = Some(Passphrase::new(passphrase));
            }
        }
        Ok(profile)
    }

    fn apply_security(&self, profile: &mut NetworkProfile) {
        let (key_mgmt, proto, cipher) = match self.security {
            Security::Open | Security::Wep => {
                profile.key_mgmt = KeyMgmt::NONE;
                if self.security == Security::Wep {
                    profile.auth_alg = AuthAlg::OPEN | AuthAlg::SHARED;
                }
                return;
            }
            Security::Ieee8021x => {
                profile.key_mgmt = KeyMgmt::IEEE8021X_NO_WPA;
                return;
            }
            Security::WpaPsk => (KeyMgmt::PSK, Proto::WPA | Proto::RSN, Cipher::CCMP | Cipher::TKIP),
            Security::Wpa2Psk => (KeyMgmt::PSK, Proto::RSN, Cipher::CCMP),
            Security::WpaEap => (
                KeyMgmt::IEEE8021X,
                Proto::WPA | Proto::RSN,
                Cipher::CCMP | Cipher::TKIP,
            ),
            Security::Wpa2Eap => (KeyMgmt::IEEE8021X, Proto::RSN, Cipher::CCMP),
        };
        profile.key_mgmt = key_mgmt;
        profile.proto = proto;
        profile.pairwise = cipher;
        profile.group = cipher;
    }

    fn apply_wep_keys(&self, profile: &mut NetworkProfile) -> Result<(), ConfigError> {
        if self.wep_keys.len() > NUM_WEP_KEYS {
            return Err(ConfigError::invalid(
                "wep_keys",
                format!("at most {NUM_WEP_KEYS} keys"),
            ));
        }
        for (slot, raw) in self.wep_keys.iter().enumerate() {
            let key = hex::decode(raw)
                .map_err(|e| ConfigError::invalid("wep_keys", e.to_string()))?;
            if !matches!(key.len(), 0 | 5 | 13 | 16) {
                return Err(ConfigError::invalid(
                    "wep_keys",
                    format!("key {slot} has invalid length {}", key.len()),
                ));
            }
            profile.wep_keys[slot] = key;
        }
        if self.security == Security::Wep && !profile.has_wep_key() {
            return Err(ConfigError::invalid("wep_keys", "WEP selected without a key"));
        }
        if self.wep_tx_keyidx >= NUM_WEP_KEYS {
            return Err(ConfigError::invalid("wep_tx_keyidx", "must be 0 to 3"));
        }
        profile.wep_tx_keyidx = self.wep_tx_keyidx;
        Ok(())
    }

    fn raw_psk(&self) -> Result<Option<[u8; 32]>, ConfigError> {
        let Some(raw) = self.psk.as_deref() else {
            return Ok(None);
        };
        let mut psk = [0u8; 32];
        hex::decode_to_slice(raw, &mut psk)
            .map_err(|_| ConfigError::invalid("psk", "expected 64 hex digits"))?;
        Ok(Some(psk))
    }

    /// On-disk form of `profile`. Secrets are written as plaintext or
    /// raw PSK, whichever the profile has.
    pub fn from_profile(profile: &NetworkProfile) -> Self {
        let security = Security::of(profile);
        let mut entry = Self::new(ssid_text(&profile.ssid), security);
        entry.bssid = profile.bssid;
        entry.priority = profile.priority;
        entry.disabled = profile.disabled.contains(Disabled::USER);
        entry.mode = profile.mode;
        entry.freq_list.clone_from(&profile.freq_list);
        entry.ieee80211w = profile.ieee80211w;
        if security.uses_psk() {
            match &profile.passphrase {
                Some(pass) => entry.passphrase = Some(pass.expose().to_owned()),
                None => entry.psk = profile.psk.map(hex::encode),
            }
        }
        entry.wep_keys = profile
            .wep_keys
            .iter()
            .rposition(|k| !k.is_empty())
            .map(|last| profile.wep_keys[..=last].iter().map(hex::encode).collect())
            .unwrap_or_default();
        entry.wep_tx_keyidx = profile.wep_tx_keyidx;
        if !profile.eap.methods.is_empty() {
            entry.eap = Some(profile.eap.clone());
        }
        entry
    }

    /// Carry over what the file knew that a profile does not: the
    /// label and where the passphrase lives.
    pub(crate) fn keep_origin(mut self, old: &Self) -> Self {
        self.name.clone_from(&old.name);
        if old.passphrase_env.is_some() || (old.passphrase.is_none() && old.psk.is_none()) {
            self.passphrase_env.clone_from(&old.passphrase_env);
            self.passphrase = None;
            self.psk = None;
        }
        self
    }
}

// ── Credential resolution ───────────────────────────────────────────

/// Resolve a network's passphrase from the credential chain.
pub fn resolve_passphrase(entry: &NetworkEntry) -> Result<Option<SecretString>, ConfigError> {
    // 1. Env var named by the entry
    if let Some(ref env_name) = entry.passphrase_env {
        if let Ok(val) = std::env::var(env_name) {
            return Ok(Some(SecretString::from(val)));
        }
        debug!(network = %entry.label(), env = %env_name, "passphrase env var not set");
    }

    // 2. System keyring
    if let Ok(keyring_entry) = keyring::Entry::new("wpas", &format!("{}/psk", entry.label())) {
        if let Ok(secret) = keyring_entry.get_password() {
            return Ok(Some(SecretString::from(secret)));
        }
    }

    // 3. Plaintext in config
    Ok(entry.passphrase.clone().map(SecretString::from))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn psk_entry(passphrase: &str) -> NetworkEntry {
        NetworkEntry {
            passphrase: Some(passphrase.into()),
            ..NetworkEntry::new("home", Security::Wpa2Psk)
        }
    }

    #[test]
    fn open_entry_maps_to_open_profile() {
        let profile = NetworkEntry::open("cafe").to_profile().unwrap();
        assert_eq!(profile.key_mgmt, KeyMgmt::NONE);
        assert_eq!(profile.ssid, b"cafe");
        assert!(profile.psk.is_none());
    }

    #[test]
    fn passphrase_is_derived_into_psk() {
        let profile = psk_entry("password").to_profile().unwrap();
        assert_eq!(profile.proto, Proto::RSN);
        assert_eq!(profile.psk, Some(derive_psk("password", b"home")));
        assert_eq!(profile.passphrase.unwrap().expose(), "password");
    }

    #[test]
    fn raw_psk_wins_over_passphrase() {
        let entry = NetworkEntry {
            psk: Some("11".repeat(32)),
            ..psk_entry("password")
        };
        assert_eq!(entry.to_profile().unwrap().psk, Some([0x11; 32]));
    }

    #[test]
    fn short_passphrase_rejected() {
        let err = psk_entry("short").to_profile().unwrap_err();
        assert!(err.to_string().contains("passphrase"));
    }

    #[test]
    fn unset_env_falls_back_to_plaintext() {
        let entry = NetworkEntry {
            passphrase_env: Some("WPAS_TEST_SURELY_UNSET_VARIABLE".into()),
            ..psk_entry("from-the-file")
        };
        let secret = resolve_passphrase(&entry).unwrap().unwrap();
        assert_eq!(secret.expose_secret(), "from-the-file");
    }

    #[test]
    fn wep_needs_a_key_of_valid_length() {
        let mut entry = NetworkEntry::new("old", Security::Wep);
        assert!(entry.to_profile().is_err());

        entry.wep_keys = vec!["0102030405".into()];
        let profile = entry.to_profile().unwrap();
        assert!(profile.has_wep_key());
        assert_eq!(profile.auth_alg, AuthAlg::OPEN | AuthAlg::SHARED);

        entry.wep_keys = vec!["0102".into()];
        assert!(entry.to_profile().is_err());
    }

    #[test]
    fn security_is_recovered_from_profile() {
        assert_eq!(
            Security::of(&NetworkProfile::wpa2_psk("x", "password")),
            Security::Wpa2Psk
        );
        assert_eq!(Security::of(&NetworkProfile::open("x")), Security::Open);
        assert_eq!("wpa2-eap".parse::<Security>().unwrap(), Security::Wpa2Eap);
    }

    #[test]
    fn from_profile_writes_passphrase_or_psk() {
        let with_pass = NetworkEntry::from_profile(&NetworkProfile::wpa2_psk("x", "password"));
        assert_eq!(with_pass.passphrase.as_deref(), Some("password"));
        assert!(with_pass.psk.is_none());

        let mut raw = NetworkProfile::wpa2_psk("x", "password");
        raw.passphrase = None;
        raw.psk = Some([0xab; 32]);
        let with_psk = NetworkEntry::from_profile(&raw);
        assert_eq!(with_psk.psk, Some("ab".repeat(32)));
    }

    #[test]
    fn keep_origin_preserves_env_reference() {
        let old = NetworkEntry {
            name: Some("house".into()),
            passphrase_env: Some("HOME_PSK".into()),
            ..NetworkEntry::new("home", Security::Wpa2Psk)
        };
        let fresh = NetworkEntry::from_profile(&NetworkProfile::wpa2_psk("home", "password"));
        let merged = fresh.keep_origin(&old);
        assert_eq!(merged.name.as_deref(), Some("house"));
        assert_eq!(merged.passphrase_env.as_deref(), Some("HOME_PSK"));
        assert!(merged.passphrase.is_none());
    }
}
