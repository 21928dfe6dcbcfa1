// ── AP configuration ──
//
// One `ApConfig` per radio, holding a list of BSS sections. Reload and
// BSS add/update match sections by interface name, never by position.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::model::{HwModeKind, MacAddr, Proto};

/// Upper bound on BSSes sharing one radio.
pub const MAX_BSSID: usize = 32;

const MAX_SSID_LEN: usize = 32;
const PASSPHRASE_LEN: std::ops::RangeInclusive<usize> = 8..=63;

/// Radio-wide settings plus every BSS hosted on the radio.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApConfig {
    /// ISO 3166-1 alpha-2 code; setting it makes bring-up wait for the
    /// regulatory domain to settle.
    #[serde(default)]
    pub country: Option<String>,
    /// Zero selects a channel automatically (ACS).
    #[serde(default)]
    pub channel: u8,
    #[serde(default)]
    pub hw_mode: Option<HwModeKind>,
    #[serde(default)]
    pub ieee80211n: bool,
    #[serde(default)]
    pub ieee80211h: bool,
    #[serde(default)]
    pub rts_threshold: Option<u32>,
    #[serde(default)]
    pub fragm_threshold: Option<u32>,
    #[serde(default)]
    pub total_assoc_limit: Option<u32>,
    /// Station idle time before it is dropped.
    #[serde(default = "default_max_inactivity")]
    pub ap_max_inactivity: u64,
    pub bss: Vec<BssConfig>,
}

fn default_max_inactivity() -> u64 {
    300
}

/// Settings for one virtual AP.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BssConfig {
    pub iface: String,
    pub ssid: String,
    #[serde(default)]
    pub bssid: Option<MacAddr>,
    /// WPA versions to advertise. Empty means no WPA.
    #[serde(default)]
    pub wpa: Proto,
    #[serde(default)]
    pub wpa_passphrase: Option<String>,
    /// Hex PSK; takes precedence over the passphrase.
    #[serde(default)]
    pub wpa_psk: Option<String>,
    #[serde(default)]
    pub ieee8021x: bool,
    /// Static WEP key, hex.
    #[serde(default)]
    pub wep_key: Option<String>,
    #[serde(default)]
    pub ignore_broadcast_ssid: bool,
    #[serde(default)]
    pub wmm_enabled: Option<bool>,
    #[serde(default)]
    pub wps_state: u8,
    #[serde(default)]
    pub ap_pin: Option<String>,
    #[serde(default)]
    pub max_num_sta: Option<u32>,
    #[serde(default)]
    pub auth_servers: Vec<String>,
}

impl BssConfig {
    pub fn new(iface: impl Into<String>, ssid: impl Into<String>) -> Self {
        Self {
            iface: iface.into(),
            ssid: ssid.into(),
            bssid: None,
            wpa: Proto::empty(),
            wpa_passphrase: None,
            wpa_psk: None,
            ieee8021x: false,
            wep_key: None,
            ignore_broadcast_ssid: false,
            wmm_enabled: None,
            wps_state: 0,
            ap_pin: None,
            max_num_sta: None,
            auth_servers: Vec::new(),
        }
    }

    pub fn wpa_enabled(&self) -> bool {
        !self.wpa.is_empty()
    }

    /// Stations must go through 802.1X or a WPA handshake before they
    /// are authorized.
    pub fn needs_port_auth(&self) -> bool {
        self.ieee8021x || self.wpa_enabled()
    }

    pub fn wps_enabled(&self) -> bool {
        self.wps_state != 0
    }

    pub(crate) fn check(&self) -> Result<(), CoreError> {
        let fail = |message: String| Err(CoreError::ValidationFailed { message });

        if self.iface.is_empty() {
            return fail("BSS without an interface name".into());
        }
        if self.ssid.is_empty() || self.ssid.len() > MAX_SSID_LEN {
            return fail(format!("{}: SSID must be 1..={MAX_SSID_LEN} bytes", self.iface));
        }
        if let Some(psk) = &self.wpa_psk {
            if psk.len() != 64 || hex::decode(psk).is_err() {
                return fail(format!("{}: wpa_psk must be 64 hex digits", self.iface));
            }
        }
        if let Some(pass) = &self.wpa_passphrase {
            if !PASSPHRASE_LEN.contains(&pass.len()) {
                return fail(format!(
                    "{}: wpa_passphrase must be 8..=63 characters",
                    self.iface
                ));
            }
        }
        if self.wpa_enabled()
            && !self.ieee8021x
            && self.wpa_psk.is_none()
            && self.wpa_passphrase.is_none()
        {
            return fail(format!(
                "{}: WPA-PSK enabled, but PSK or passphrase is not set",
                self.iface
            ));
        }
        if self.wpa_enabled() && self.wep_key.is_some() {
            return fail(format!("{}: WEP and WPA cannot be mixed", self.iface));
        }
        if let Some(key) = &self.wep_key {
            if !matches!(key.len(), 10 | 26 | 32) || hex::decode(key).is_err() {
                return fail(format!("{}: invalid WEP key length", self.iface));
            }
        }
        Ok(())
    }
}

impl ApConfig {
    pub fn new(bss: Vec<BssConfig>) -> Self {
        Self {
            country: None,
            channel: 0,
            hw_mode: None,
            ieee80211n: false,
            ieee80211h: false,
            rts_threshold: None,
            fragm_threshold: None,
            total_assoc_limit: None,
            ap_max_inactivity: default_max_inactivity(),
            bss,
        }
    }

    pub fn find_bss(&self, iface: &str) -> Option<&BssConfig> {
        self.bss.iter().find(|b| b.iface == iface)
    }

    /// Sanity check run before enable and reload.
    pub fn check(&self) -> Result<(), CoreError> {
        if self.bss.is_empty() {
            return Err(CoreError::ValidationFailed {
                message: "no BSS configured".into(),
            });
        }
        if self.bss.len() > MAX_BSSID {
            return Err(CoreError::ValidationFailed {
                message: format!("too many BSSes ({} > {MAX_BSSID})", self.bss.len()),
            });
        }
        if let Some(cc) = &self.country {
            if cc.len() != 2 || !cc.bytes().all(|b| b.is_ascii_alphabetic()) {
                return Err(CoreError::ValidationFailed {
                    message: format!("invalid country code '{cc}'"),
                });
            }
        }
        if self.ieee80211h && self.country.is_none() {
            return Err(CoreError::ValidationFailed {
                message: "ieee80211h requires a country code".into(),
            });
        }
        for (i, bss) in self.bss.iter().enumerate() {
            bss.check()?;
            if self.bss[..i].iter().any(|b| b.iface == bss.iface) {
                return Err(CoreError::ValidationFailed {
                    message: format!("duplicate BSS interface '{}'", bss.iface),
                });
            }
            if let Some(addr) = bss.bssid {
                if self.bss[..i].iter().any(|b| b.bssid == Some(addr)) {
                    return Err(CoreError::ValidationFailed {
                        message: format!("duplicate BSSID {addr}"),
                    });
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn psk_bss(iface: &str) -> BssConfig {
        BssConfig {
            wpa: Proto::RSN,
            wpa_passphrase: Some("correct horse".into()),
            ..BssConfig::new(iface, "lab")
        }
    }

    #[test]
    fn parses_minimal_toml_shape() {
        let conf: ApConfig = serde_json::from_str(
            r#"{"channel": 6, "country": "US", "bss": [{"iface": "wlan0", "ssid": "lab"}]}"#,
        )
        .unwrap();
        assert_eq!(conf.channel, 6);
        assert_eq!(conf.ap_max_inactivity, 300);
        assert_eq!(conf.bss[0].wpa, Proto::empty());
        conf.check().unwrap();
    }

    #[test]
    fn psk_without_secret_is_rejected() {
        let mut bss = psk_bss("wlan0");
        bss.wpa_passphrase = None;
        let err = ApConfig::new(vec![bss]).check().unwrap_err();
        assert!(err.to_string().contains("PSK or passphrase"));
    }

    #[test]
    fn duplicate_interfaces_are_rejected() {
        let err = ApConfig::new(vec![psk_bss("wlan0"), psk_bss("wlan0")])
            .check()
            .unwrap_err();
        assert!(err.to_string().contains("duplicate BSS interface"));
    }

    #[test]
    fn short_passphrase_is_rejected() {
        let mut bss = psk_bss("wlan0");
        bss.wpa_passphrase = Some("short".into());
        assert!(ApConfig::new(vec![bss]).check().is_err());
    }

    #[test]
    fn dfs_needs_country() {
        let mut conf = ApConfig::new(vec![psk_bss("wlan0")]);
        conf.ieee80211h = true;
        assert!(conf.check().is_err());
        conf.country = Some("DE".into());
        conf.check().unwrap();
    }

    #[test]
    fn empty_config_is_rejected() {
        assert!(ApConfig::new(Vec::new()).check().is_err());
    }
}
