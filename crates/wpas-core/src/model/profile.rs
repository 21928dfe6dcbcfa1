// ── Network profiles ──
//
// A NetworkProfile describes one network the station may join. Profiles
// live in the ProfileStore; the state machines reference them by
// ProfileId and mutate individual fields in place.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::fmt;
use strum::{Display, EnumString};

use super::addr::MacAddr;
use super::security::{AuthAlg, Cipher, EapolFlags, KeyMgmt, MfpPolicy, Proto};

pub const NUM_WEP_KEYS: usize = 4;

/// EAP identity used by a WPS enrollee bootstrap profile.
pub const WPS_ENROLLEE_IDENTITY: &str = "WFA-SimpleConfig-Enrollee-1-0";
/// EAP identity used by a WPS registrar bootstrap profile.
pub const WPS_REGISTRAR_IDENTITY: &str = "WFA-SimpleConfig-Registrar-1-0";

// ── ProfileId ───────────────────────────────────────────────────────

/// Stable identifier assigned by the ProfileStore.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProfileId(pub u32);

impl fmt::Display for ProfileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ── Disabled state ──────────────────────────────────────────────────

bitflags! {
    /// Why a profile is not eligible for selection.
    ///
    /// `WPS_TEMP` is layered on top of the user's own setting so a WPS
    /// session can restore exactly what it found.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct Disabled: u8 {
        const USER             = 1 << 0;
        const PERSISTENT_GROUP = 1 << 1;
        const WPS_TEMP         = 1 << 2;
    }
}

bitflags! {
    /// Provenance markers.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct ProfileFlags: u8 {
        const ACCESS_THRU_WPS = 1 << 0;
    }
}

/// Operating mode requested by a profile.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum OpMode {
    #[default]
    Infra,
    Ibss,
    Ap,
}

// ── EAP ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
pub enum EapMethod {
    Wsc,
    Peap,
    Ttls,
    Tls,
    Sim,
    Aka,
    Md5,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EapConfig {
    #[serde(default)]
    pub methods: Vec<EapMethod>,
    pub identity: Option<String>,
    pub phase1: Option<String>,
    pub fragment_size: Option<u16>,
}

impl EapConfig {
    fn is_wsc(&self) -> bool {
        self.methods.contains(&EapMethod::Wsc)
    }

    fn phase1_has(&self, token: &str) -> bool {
        self.phase1
            .as_deref()
            .is_some_and(|p| p.split_whitespace().any(|t| t.starts_with(token)))
    }

    pub fn is_wps_pbc_enrollee(&self) -> bool {
        self.is_wsc() && self.phase1_has("pbc=1")
    }

    pub fn is_wps_pin_enrollee(&self) -> bool {
        self.is_wsc() && self.phase1_has("pin=")
    }

    pub fn needs_smartcard(&self) -> bool {
        self.methods
            .iter()
            .any(|m| matches!(m, EapMethod::Sim | EapMethod::Aka))
    }
}

// ── Secrets ─────────────────────────────────────────────────────────

/// ASCII passphrase, 8..=63 bytes. Debug output is redacted.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Passphrase(String);

impl Passphrase {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Passphrase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Passphrase(***)")
    }
}

// ── NetworkProfile ──────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkProfile {
    /// Configured SSID; empty is a wildcard.
    pub ssid: Vec<u8>,
    /// Pinned BSSID, if any.
    pub bssid: Option<MacAddr>,
    pub key_mgmt: KeyMgmt,
    pub proto: Proto,
    pub pairwise: Cipher,
    pub group: Cipher,
    pub auth_alg: AuthAlg,
    pub wep_keys: [Vec<u8>; NUM_WEP_KEYS],
    pub wep_tx_keyidx: usize,
    pub psk: Option<[u8; 32]>,
    pub passphrase: Option<Passphrase>,
    pub export_keys: bool,
    pub eap: EapConfig,
    pub eapol_flags: EapolFlags,
    pub disabled: Disabled,
    /// Runtime-synthesized; never written back to configuration.
    pub temporary: bool,
    pub priority: i32,
    /// Allowed frequencies in MHz; empty allows all.
    pub freq_list: Vec<u32>,
    pub mode: OpMode,
    pub ieee80211w: MfpPolicy,
    pub mixed_cell: bool,
    pub p2p_group: bool,
    pub flags: ProfileFlags,
}

impl Default for NetworkProfile {
    fn default() -> Self {
        Self {
            ssid: Vec::new(),
            bssid: None,
            key_mgmt: KeyMgmt::PSK | KeyMgmt::IEEE8021X,
            proto: Proto::WPA | Proto::RSN,
            pairwise: Cipher::CCMP | Cipher::TKIP,
            group: Cipher::CCMP | Cipher::TKIP | Cipher::WEP104 | Cipher::WEP40,
            auth_alg: AuthAlg::empty(),
            wep_keys: Default::default(),
            wep_tx_keyidx: 0,
            psk: None,
            passphrase: None,
            export_keys: false,
            eap: EapConfig::default(),
            eapol_flags: EapolFlags::REQUIRE_KEY_UNICAST | EapolFlags::REQUIRE_KEY_BROADCAST,
            disabled: Disabled::empty(),
            temporary: false,
            priority: 0,
            freq_list: Vec::new(),
            mode: OpMode::Infra,
            ieee80211w: MfpPolicy::Disabled,
            mixed_cell: false,
            p2p_group: false,
            flags: ProfileFlags::empty(),
        }
    }
}

impl NetworkProfile {
    /// Open profile for `ssid` with no keying.
    pub fn open(ssid: impl AsRef<[u8]>) -> Self {
        Self {
            ssid: ssid.as_ref().to_vec(),
            key_mgmt: KeyMgmt::NONE,
            ..Self::default()
        }
    }

    /// WPA2-PSK profile with CCMP only.
    pub fn wpa2_psk(ssid: impl AsRef<[u8]>, passphrase: impl Into<String>) -> Self {
        Self {
            ssid: ssid.as_ref().to_vec(),
            key_mgmt: KeyMgmt::PSK,
            proto: Proto::RSN,
            pairwise: Cipher::CCMP,
            group: Cipher::CCMP,
            passphrase: Some(Passphrase::new(passphrase)),
            ..Self::default()
        }
    }

    pub fn is_disabled(&self) -> bool {
        !self.disabled.is_empty()
    }

    pub fn is_wps(&self) -> bool {
        self.key_mgmt.contains(KeyMgmt::WPS)
    }

    pub fn has_wep_key(&self) -> bool {
        self.wep_keys.iter().any(|k| !k.is_empty())
    }

    pub fn tx_wep_key_len(&self) -> usize {
        self.wep_keys.get(self.wep_tx_keyidx).map_or(0, Vec::len)
    }

    pub fn ssid_text(&self) -> String {
        ssid_text(&self.ssid)
    }

    /// Clear WPS-related EAP settings so the profile can carry a credential.
    pub fn clear_eap(&mut self) {
        self.eap = EapConfig::default();
    }
}

/// Printable form of a raw SSID, escaping non-printable bytes.
pub fn ssid_text(ssid: &[u8]) -> String {
    ssid.iter()
        .flat_map(|b| std::ascii::escape_default(*b))
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pin_enrollee_detection() {
        let eap = EapConfig {
            methods: vec![EapMethod::Wsc],
            identity: Some(WPS_ENROLLEE_IDENTITY.into()),
            phase1: Some("pin=12345670 dev_pw_id=0".into()),
            fragment_size: None,
        };
        assert!(eap.is_wps_pin_enrollee());
        assert!(!eap.is_wps_pbc_enrollee());
    }

    #[test]
    fn pin_token_requires_wsc_method() {
        let eap = EapConfig {
            methods: vec![EapMethod::Peap],
            phase1: Some("pin=1".into()),
            ..EapConfig::default()
        };
        assert!(!eap.is_wps_pin_enrollee());
    }

    #[test]
    fn disabled_flags_layer() {
        let mut p = NetworkProfile::open("lab");
        p.disabled |= Disabled::USER;
        p.disabled |= Disabled::WPS_TEMP;
        p.disabled -= Disabled::WPS_TEMP;
        assert!(p.is_disabled());
    }

    #[test]
    fn passphrase_debug_is_redacted() {
        let p = Passphrase::new("hunter22");
        assert_eq!(format!("{p:?}"), "Passphrase(***)");
    }

    #[test]
    fn ssid_text_escapes() {
        assert_eq!(ssid_text(b"a\x01b"), "a\\x01b");
    }
}
