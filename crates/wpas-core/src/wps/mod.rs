// ── WPS provisioning ──
//
// The enrollee side of Wi-Fi Protected Setup as seen by the station:
// session bookkeeping, scan-time WPS checks, credential application,
// device parameters, and the callback seam the protocol engine drives.
// The station-facing operations (start, cancel, timeout) live with the
// station in `station::wps`.

pub mod callbacks;
pub mod cred;
pub mod device;
pub mod pin;
pub mod scan;

pub use callbacks::{WpsCallbacks, WpsEvent, WpsFailure, WpsM2d};
pub use cred::{Credential, WpsAuthType, WpsEncrType};
pub use device::{ChangedParams, ConfigMethods, RfBands, WpsDeviceConfig, WpsDeviceOptions};
pub use pin::{generate_pin, pin_checksum, pin_valid};

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::model::KeyMgmt;
use crate::store::ProfileStore;

/// Scans after which a PIN enrollee accepts APs that do not advertise
/// an active registrar.
pub const PIN_SCAN_IGNORE_SEL_REG: u32 = 3;

/// Default walk time for PBC and PIN sessions.
pub const DEFAULT_SESSION_TIMEOUT: Duration = Duration::from_secs(120);

/// How long the driver keeps the fast-reassociation hint after a
/// credential arrives.
pub const FAST_REASSOC_HOLD: Duration = Duration::from_secs(2);

/// `config_error` value for "multiple PBC sessions detected".
pub const CONFIG_ERROR_MULTIPLE_PBC: u16 = 12;

/// `msg` value for a failure raised from Beacon processing.
pub const MSG_BEACON: u8 = 1;

// ── Options ─────────────────────────────────────────────────────────

/// Station-level WPS policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WpsOptions {
    pub enabled: bool,
    /// Tolerate PBC overlap when every candidate carries the preferred
    /// vendor extension.
    pub allow_pbc_overlap: bool,
    pub preferred_oui: [u8; 3],
    pub pbc_timeout: Duration,
    pub pin_timeout: Duration,
    pub pin_scan_ignore_sel_reg: u32,
    pub fragment_size: Option<u16>,
    /// 0: process credentials internally, 1: only report them,
    /// 2: both.
    pub cred_processing: u8,
    /// Write profiles back after a credential is applied.
    pub update_config: bool,
    /// Record credential SSIDs in the `.pp` list.
    pub non_wps_pp_enable: bool,
    /// Keep credentials for open networks disabled until the user
    /// selects them.
    pub reg_disable_open: bool,
    pub device: WpsDeviceOptions,
}

impl Default for WpsOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            allow_pbc_overlap: false,
            preferred_oui: crate::ie::wps::QUANTENNA_OUI,
            pbc_timeout: DEFAULT_SESSION_TIMEOUT,
            pin_timeout: DEFAULT_SESSION_TIMEOUT,
            pin_scan_ignore_sel_reg: PIN_SCAN_IGNORE_SEL_REG,
            fragment_size: None,
            cred_processing: 0,
            update_config: false,
            non_wps_pp_enable: false,
            reg_disable_open: false,
            device: WpsDeviceOptions::default(),
        }
    }
}

// ── External state ──────────────────────────────────────────────────

/// Coarse WPS progress reported to the outside world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WpsExtState {
    #[default]
    Initial,
    Start,
    Success,
    Error,
    Overlap,
    Timeout,
}

impl WpsExtState {
    pub fn code(self) -> u8 {
        match self {
            Self::Initial => 0,
            Self::Start => 1,
            Self::Success => 2,
            Self::Error => 3,
            Self::Overlap => 4,
            Self::Timeout => 5,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Initial => "WPS_INITIAL",
            Self::Start => "WPS_START",
            Self::Success => "WPS_SUCCESS",
            Self::Error => "WPS_ERROR",
            Self::Overlap => "WPS_OVERLAP",
            Self::Timeout => "WPS_TIMEOUT",
        }
    }

    /// Status line in the `"N (NAME)\n"` form.
    pub fn status_line(self) -> String {
        format!("{} ({})\n", self.code(), self.name())
    }
}

impl fmt::Display for WpsExtState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Which kind of session armed the walk timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WpsOp {
    Pbc,
    Pin,
    Registrar,
}

/// State of the driver's fast-reassociation hint while a credential is
/// being applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FastReassoc {
    #[default]
    Default,
    /// We turned the hint on and must turn it back off.
    WpsEnabled,
}

// ── Session ─────────────────────────────────────────────────────────

/// Per-station WPS bookkeeping.
#[derive(Debug, Clone, Default)]
pub struct WpsSession {
    pub ext_state: WpsExtState,
    /// Registration reported success for the current session.
    pub success: bool,
    pub blacklist_cleared: u32,
    /// Scans remaining that stay on `freq` after a credential lands.
    pub after_wps: u32,
    pub freq: u32,
    pub fast_reassoc: FastReassoc,
    /// Operation the pending walk timer belongs to.
    pub op: Option<WpsOp>,
    /// Last PBC overlap pass found only preferred-vendor APs.
    pub only_preferred: bool,
    pub device: WpsDeviceConfig,
}

impl WpsSession {
    pub fn status_line(&self) -> String {
        self.ext_state.status_line()
    }
}

// ── Store predicates ────────────────────────────────────────────────

/// A not-disabled profile whose only key management is WPS exists.
pub fn in_progress(store: &ProfileStore) -> bool {
    store
        .iter()
        .any(|(_, p)| !p.is_disabled() && p.key_mgmt == KeyMgmt::WPS)
}

/// Any enabled profile allows WPS.
pub fn searching(store: &ProfileStore) -> bool {
    store.iter().any(|(_, p)| !p.is_disabled() && p.is_wps())
}

// ── Message tables ──────────────────────────────────────────────────

const MESSAGE_NAMES: [&str; 15] = [
    "WPS_Beacon",
    "WPS_ProbeRequest",
    "WPS_ProbeResponse",
    "WPS_M1",
    "WPS_M2",
    "WPS_M2D",
    "WPS_M3",
    "WPS_M4",
    "WPS_M5",
    "WPS_M6",
    "WPS_M7",
    "WPS_M8",
    "WPS_WSC_ACK",
    "WPS_WSC_NACK",
    "WPS_WSC_DONE",
];

const CONFIG_ERRORS: [&str; 19] = [
    "WPS_CFG_NO_ERROR",
    "WPS_CFG_OOB_IFACE_READ_ERROR",
    "WPS_CFG_DECRYPTION_CRC_FAILURE",
    "WPS_CFG_24_CHAN_NOT_SUPPORTED",
    "WPS_CFG_50_CHAN_NOT_SUPPORTED",
    "WPS_CFG_SIGNAL_TOO_WEAK",
    "WPS_CFG_NETWORK_AUTH_FAILURE",
    "WPS_CFG_NETWORK_ASSOC_FAILURE",
    "WPS_CFG_NO_DHCP_RESPONSE",
    "WPS_CFG_FAILED_DHCP_CONFIG",
    "WPS_CFG_IP_ADDR_CONFLICT",
    "WPS_CFG_NO_CONN_TO_REGISTRAR",
    "WPS_CFG_MULTIPLE_PBC_DETECTED",
    "WPS_CFG_ROGUE_SUSPECTED",
    "WPS_CFG_DEVICE_BUSY",
    "WPS_CFG_SETUP_LOCKED",
    "WPS_CFG_MSG_TIMEOUT",
    "WPS_CFG_REG_SESS_TIMEOUT",
    "WPS_CFG_DEV_PASSWORD_AUTH_FAILURE",
];

const FAIL_REASONS: [&str; 3] = ["No Error", "TKIP Only Prohibited", "WEP Prohibited"];

/// Name of a protocol message number (1 = Beacon .. 15 = WSC_DONE).
pub fn message_name(msg: u8) -> &'static str {
    usize::from(msg)
        .checked_sub(1)
        .and_then(|i| MESSAGE_NAMES.get(i))
        .copied()
        .unwrap_or("Unknown")
}

pub fn config_error_name(code: u16) -> &'static str {
    CONFIG_ERRORS
        .get(usize::from(code))
        .copied()
        .unwrap_or("Unknown")
}

/// Text for an `error_indication`; only 1 and 2 are reported.
pub fn fail_reason(indication: u16) -> Option<&'static str> {
    match indication {
        1 | 2 => FAIL_REASONS.get(usize::from(indication)).copied(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Disabled, NetworkProfile};

    #[test]
    fn message_table_edges() {
        assert_eq!(message_name(1), "WPS_Beacon");
        assert_eq!(message_name(15), "WPS_WSC_DONE");
        assert_eq!(message_name(0), "Unknown");
        assert_eq!(message_name(16), "Unknown");
    }

    #[test]
    fn config_error_table_edges() {
        assert_eq!(config_error_name(12), "WPS_CFG_MULTIPLE_PBC_DETECTED");
        assert_eq!(config_error_name(18), "WPS_CFG_DEV_PASSWORD_AUTH_FAILURE");
        assert_eq!(config_error_name(19), "Unknown");
    }

    #[test]
    fn fail_reasons_skip_no_error() {
        assert_eq!(fail_reason(0), None);
        assert_eq!(fail_reason(2), Some("WEP Prohibited"));
        assert_eq!(fail_reason(3), None);
    }

    #[test]
    fn status_line_format() {
        assert_eq!(WpsExtState::Overlap.status_line(), "4 (WPS_OVERLAP)\n");
    }

    #[test]
    fn in_progress_needs_exact_wps() {
        let mixed = NetworkProfile {
            key_mgmt: KeyMgmt::WPS | KeyMgmt::PSK,
            ..NetworkProfile::default()
        };
        let store = ProfileStore::from_profiles([mixed.clone()]);
        assert!(!in_progress(&store));
        assert!(searching(&store));

        let disabled = NetworkProfile {
            key_mgmt: KeyMgmt::WPS,
            disabled: Disabled::USER,
            ..NetworkProfile::default()
        };
        let store = ProfileStore::from_profiles([mixed, disabled]);
        assert!(!in_progress(&store));
    }
}
