// ── Station and WPS sections ──
//
// Durations are whole seconds in the file and `Duration` once turned
// into `StationOptions`.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use wpas_core::ie::wps::QUANTENNA_OUI;
use wpas_core::select::DEFAULT_BLACKLIST_FAIL_MAX;
use wpas_core::station::StationOptions;
use wpas_core::wps::{PIN_SCAN_IGNORE_SEL_REG, WpsDeviceOptions, WpsOptions};
use wpas_core::{MacAddr, RoamingPolicy};

use crate::ConfigError;

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct StationSection {
    #[serde(default = "default_ifname")]
    pub ifname: String,

    /// Hardware address; read from the driver when unset.
    #[serde(default)]
    pub own_addr: Option<MacAddr>,

    /// 1: scan and select here, 2: let the driver pick.
    #[serde(default = "default_ap_scan")]
    pub ap_scan: u8,

    #[serde(default = "default_scan_interval")]
    pub scan_interval: u64,

    #[serde(default = "default_sched_scan_timeout")]
    pub sched_scan_timeout: u64,

    #[serde(default = "default_blacklist_fail_max")]
    pub blacklist_fail_max: u32,

    #[serde(default = "default_true")]
    pub auto_reconnect: bool,

    #[serde(default)]
    pub delayed_mic_error_report: bool,

    /// Hex pairing identifier; enables the pairing-hash check.
    #[serde(default)]
    pub pairing_id: Option<String>,

    #[serde(default)]
    pub roaming: RoamingPolicy,
}

impl Default for StationSection {
    fn default() -> Self {
        Self {
            ifname: default_ifname(),
            own_addr: None,
            ap_scan: default_ap_scan(),
            scan_interval: default_scan_interval(),
            sched_scan_timeout: default_sched_scan_timeout(),
            blacklist_fail_max: default_blacklist_fail_max(),
            auto_reconnect: true,
            delayed_mic_error_report: false,
            pairing_id: None,
            roaming: RoamingPolicy::default(),
        }
    }
}

fn default_ifname() -> String {
    "wlan0".into()
}
fn default_ap_scan() -> u8 {
    1
}
fn default_scan_interval() -> u64 {
    5
}
fn default_sched_scan_timeout() -> u64 {
    30
}
fn default_blacklist_fail_max() -> u32 {
    DEFAULT_BLACKLIST_FAIL_MAX
}
fn default_true() -> bool {
    true
}
fn default_session_timeout() -> u64 {
    120
}
fn default_pin_scan_ignore_sel_reg() -> u32 {
    PIN_SCAN_IGNORE_SEL_REG
}

impl StationSection {
    pub fn to_options(&self, wps: &WpsSection) -> Result<StationOptions, ConfigError> {
        if !matches!(self.ap_scan, 1 | 2) {
            return Err(ConfigError::invalid(
                "station.ap_scan",
                format!("expected 1 or 2, got {}", self.ap_scan),
            ));
        }
        if self.scan_interval == 0 {
            return Err(ConfigError::invalid("station.scan_interval", "must be positive"));
        }
        if self.roaming.bands.windows(2).any(|w| w[0].0 >= w[1].0) {
            return Err(ConfigError::invalid(
                "station.roaming.bands",
                "thresholds must be strictly increasing",
            ));
        }
        let pairing_id = self
            .pairing_id
            .as_deref()
            .map(hex::decode)
            .transpose()
            .map_err(|e| ConfigError::invalid("station.pairing_id", e.to_string()))?;

        Ok(StationOptions {
            ifname: self.ifname.clone(),
            own_addr: self.own_addr.unwrap_or(MacAddr::ZERO),
            ap_scan: self.ap_scan,
            scan_interval: Duration::from_secs(self.scan_interval),
            sched_scan_timeout: Duration::from_secs(self.sched_scan_timeout),
            blacklist_fail_max: self.blacklist_fail_max,
            roaming: self.roaming.clone(),
            auto_reconnect: self.auto_reconnect,
            delayed_mic_error_report: self.delayed_mic_error_report,
            pairing_id,
            wps: wps.to_options()?,
        })
    }
}

// ── WPS ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct WpsSection {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Tolerate PBC overlap among APs carrying `preferred_oui`.
    #[serde(default, alias = "wps_allow_pbc_overlap")]
    pub allow_pbc_overlap: bool,

    /// Vendor OUI, e.g. `00:26:86`.
    #[serde(default)]
    pub preferred_oui: Option<String>,

    #[serde(default = "default_session_timeout")]
    pub pbc_timeout: u64,

    #[serde(default = "default_session_timeout")]
    pub pin_timeout: u64,

    /// Scans after which a PIN enrollee stops requiring Selected
    /// Registrar.
    #[serde(default = "default_pin_scan_ignore_sel_reg")]
    pub pin_scan_ignore_sel_reg: u32,

    #[serde(default)]
    pub fragment_size: Option<u16>,

    #[serde(default)]
    pub cred_processing: u8,

    #[serde(default)]
    pub update_config: bool,

    #[serde(default)]
    pub non_wps_pp_enable: bool,

    #[serde(default)]
    pub reg_disable_open: bool,

    #[serde(default)]
    pub device: WpsDeviceOptions,
}

impl Default for WpsSection {
    fn default() -> Self {
        Self {
            enabled: true,
            allow_pbc_overlap: false,
            preferred_oui: None,
            pbc_timeout: default_session_timeout(),
            pin_timeout: default_session_timeout(),
            pin_scan_ignore_sel_reg: default_pin_scan_ignore_sel_reg(),
            fragment_size: None,
            cred_processing: 0,
            update_config: false,
            non_wps_pp_enable: false,
            reg_disable_open: false,
            device: WpsDeviceOptions::default(),
        }
    }
}

impl WpsSection {
    pub fn to_options(&self) -> Result<WpsOptions, ConfigError> {
        if self.cred_processing > 2 {
            return Err(ConfigError::invalid(
                "wps.cred_processing",
                format!("expected 0, 1 or 2, got {}", self.cred_processing),
            ));
        }
        let preferred_oui = match self.preferred_oui.as_deref() {
            Some(raw) => parse_oui(raw)?,
            None => QUANTENNA_OUI,
        };
        Ok(WpsOptions {
            enabled: self.enabled,
            allow_pbc_overlap: self.allow_pbc_overlap,
            preferred_oui,
            pbc_timeout: Duration::from_secs(self.pbc_timeout),
            pin_timeout: Duration::from_secs(self.pin_timeout),
            pin_scan_ignore_sel_reg: self.pin_scan_ignore_sel_reg,
            fragment_size: self.fragment_size,
            cred_processing: self.cred_processing,
            update_config: self.update_config,
            non_wps_pp_enable: self.non_wps_pp_enable,
            reg_disable_open: self.reg_disable_open,
            device: self.device.clone(),
        })
    }
}

fn parse_oui(raw: &str) -> Result<[u8; 3], ConfigError> {
    let bare: String = raw.chars().filter(|c| *c != ':' && *c != '-').collect();
    let mut oui = [0u8; 3];
    hex::decode_to_slice(&bare, &mut oui)
        .map_err(|_| ConfigError::invalid("wps.preferred_oui", format!("not an OUI: {raw}")))?;
    Ok(oui)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn defaults_match_station_defaults() {
        let opts = StationSection::default()
            .to_options(&WpsSection::default())
            .unwrap();
        let core = StationOptions::default();
        assert_eq!(opts.scan_interval, core.scan_interval);
        assert_eq!(opts.blacklist_fail_max, core.blacklist_fail_max);
        assert_eq!(opts.roaming, core.roaming);
        assert_eq!(opts.wps, WpsOptions::default());
    }

    #[test]
    fn rejects_unknown_ap_scan() {
        let section = StationSection {
            ap_scan: 0,
            ..StationSection::default()
        };
        let err = section.to_options(&WpsSection::default()).unwrap_err();
        assert!(err.to_string().contains("station.ap_scan"));
    }

    #[test]
    fn rejects_unordered_roaming_bands() {
        let section = StationSection {
            roaming: RoamingPolicy {
                bands: vec![(-70, 4), (-80, 2)],
                ..RoamingPolicy::default()
            },
            ..StationSection::default()
        };
        assert!(section.to_options(&WpsSection::default()).is_err());
    }

    #[test]
    fn pairing_id_is_hex() {
        let section = StationSection {
            pairing_id: Some("0a0b".into()),
            ..StationSection::default()
        };
        let opts = section.to_options(&WpsSection::default()).unwrap();
        assert_eq!(opts.pairing_id, Some(vec![0x0a, 0x0b]));
    }

    #[test]
    fn preferred_oui_accepts_separators() {
        let wps = WpsSection {
            preferred_oui: Some("00-50-f2".into()),
            ..WpsSection::default()
        };
        assert_eq!(wps.to_options().unwrap().preferred_oui, [0x00, 0x50, 0xf2]);

        let bad = WpsSection {
            preferred_oui: Some("zz".into()),
            ..WpsSection::default()
        };
        assert!(bad.to_options().is_err());
    }
}
