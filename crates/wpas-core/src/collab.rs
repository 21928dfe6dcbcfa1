// ── Collaborator seams ──
//
// Everything the station state machine talks to but does not own: the
// radio driver, the EAPOL and WPA handshake engines, and a handful of
// optional feature hooks. Optional features are `Option<Box<dyn _>>` in
// `Collaborators`; an absent feature is simply skipped.

use std::time::Duration;

use bitflags::bitflags;

use crate::error::CoreError;
use crate::ie::wpa::{ParsedSecurityIe, Pmkid};
use crate::model::{
    AssocInfo, AuthAlg, Cipher, HwMode, KeyMgmt, MacAddr, MfpPolicy, NetworkProfile, OpMode,
    ProfileId, Proto, ReasonCode, ScanResult,
};
use crate::store::ProfileStore;

// ── Driver ──────────────────────────────────────────────────────────

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct DriverFlags: u32 {
        /// Driver runs the 4-way handshake itself.
        const FOUR_WAY_HANDSHAKE        = 1 << 0;
        /// Station-side MLME is in user space.
        const SME                       = 1 << 1;
        /// Static WEP keys must be re-set after association.
        const SET_KEYS_AFTER_ASSOC_DONE = 1 << 2;
        /// Driver picks BSSes and roams on its own.
        const BSS_SELECTION             = 1 << 3;
        const SCHED_SCAN                = 1 << 4;
        const AP                        = 1 << 5;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DriverCapabilities {
    pub flags: DriverFlags,
    /// Key management suites the driver can negotiate.
    pub key_mgmt: KeyMgmt,
    /// Ciphers the driver can install.
    pub enc: Cipher,
    pub mfp: MfpPolicy,
}

/// Parameters for one association request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssocParams {
    pub bssid: Option<MacAddr>,
    pub ssid: Vec<u8>,
    pub freq: u32,
    pub profile: ProfileId,
    pub mode: OpMode,
    pub key_mgmt: KeyMgmt,
    pub proto: Proto,
    pub pairwise: Cipher,
    pub group: Cipher,
    pub auth_alg: AuthAlg,
    /// WPA/RSN element to put in the request, if any.
    pub wpa_ie: Vec<u8>,
}

/// Radio driver. Completions arrive later as `DriverEvent`s.
pub trait Driver: Send {
    fn get_scan_results(&mut self) -> Result<Vec<ScanResult>, CoreError>;
    /// Start a scan; an empty `freqs` scans every channel.
    fn scan(&mut self, freqs: &[u32]) -> Result<(), CoreError>;
    fn associate(&mut self, params: &AssocParams) -> Result<(), CoreError>;
    fn deauthenticate(&mut self, bssid: MacAddr, reason: ReasonCode) -> Result<(), CoreError>;
    fn disassociate(&mut self, bssid: MacAddr, reason: ReasonCode) -> Result<(), CoreError>;
    fn set_countermeasures(&mut self, enabled: bool) -> Result<(), CoreError>;
    fn capabilities(&self) -> Result<DriverCapabilities, CoreError>;
    fn get_bssid(&mut self) -> Result<MacAddr, CoreError>;

    /// SSID of the current association.
    fn get_ssid(&mut self) -> Result<Vec<u8>, CoreError> {
        Err(CoreError::Unsupported {
            operation: "get_ssid".into(),
        })
    }

    fn sched_scan(&mut self, _interval: Duration) -> Result<(), CoreError> {
        Err(CoreError::Unsupported {
            operation: "sched_scan".into(),
        })
    }

    fn stop_sched_scan(&mut self) -> Result<(), CoreError> {
        Ok(())
    }

    fn hw_modes(&mut self) -> Vec<HwMode> {
        Vec::new()
    }

    /// Name of the physical radio; interfaces sharing it share scans.
    fn radio_name(&self) -> Option<String> {
        None
    }

    /// Per-BSSID pairing hash reported by the driver, if any.
    fn pairing_hash(&mut self, _bssid: MacAddr) -> Result<Option<[u8; 32]>, CoreError> {
        Ok(None)
    }

    /// Toggle the fast-reassociation hint; returns the previous value.
    fn set_fast_reassoc(&mut self, _enabled: bool) -> Result<bool, CoreError> {
        Ok(false)
    }

    fn set_wep_keys(&mut self, _profile: &NetworkProfile) -> Result<(), CoreError> {
        Ok(())
    }

    fn clear_keys(&mut self) {}

    /// Free-form status line for the vendor status channel.
    fn status_message(&mut self, _msg: &str) {}
}

// ── EAPOL / WPA ─────────────────────────────────────────────────────

pub trait Eapol: Send {
    fn notify_port_enabled(&mut self, enabled: bool);
    fn notify_port_valid(&mut self, valid: bool);
    fn notify_eap_success(&mut self, success: bool);
    fn invalidate_cached_session(&mut self);
    fn set_config(&mut self, profile: Option<&NetworkProfile>);
    fn notify_pmkid_attempt(&mut self) {}
    fn rx_eapol(&mut self, _src: MacAddr, _data: &[u8]) {}
}

pub trait WpaSm: Send {
    fn notify_assoc(&mut self, bssid: MacAddr);
    fn notify_disassoc(&mut self);
    fn set_assoc_wpa_ie(&mut self, ie: Option<&[u8]>);
    fn parse_own_wpa_ie(&self) -> Result<ParsedSecurityIe, CoreError>;
    fn key_request(&mut self, error: bool, pairwise: bool);
    fn set_config(&mut self, profile: Option<&NetworkProfile>);

    fn set_ap_wpa_ie(&mut self, _ie: Option<&[u8]>) {}
    fn set_ap_rsn_ie(&mut self, _ie: Option<&[u8]>) {}

    /// Make `pmkid` the current PMKSA; false when not cached.
    fn pmksa_set_current(&mut self, _pmkid: &Pmkid) -> bool {
        false
    }

    fn pmksa_candidate_add(&mut self, _bssid: MacAddr, _index: i32, _preauth: bool) {}
    fn ft_is_completed(&self) -> bool {
        false
    }
    fn update_replay_ctr(&mut self, _replay_ctr: [u8; 8]) {}
    fn preauth_scan_results(&mut self, _results: &[ScanResult]) {}
}

// ── Optional feature hooks ──────────────────────────────────────────

pub trait SmartCard: Send {
    fn init(&mut self, profile: &NetworkProfile) -> Result<(), CoreError>;
}

pub trait FtHandler: Send {
    fn validate_reassoc_resp(&mut self, info: &AssocInfo) -> Result<(), CoreError>;
    fn response(&mut self, _data: &[u8]) {}
}

pub trait SmeHandler: Send {
    fn auth(&mut self, _bssid: MacAddr, _status_code: u16) {}
    fn assoc_reject(&mut self, _bssid: Option<MacAddr>, _status_code: u16) {}
    fn auth_timed_out(&mut self, _addr: MacAddr) {}
    fn assoc_timed_out(&mut self, _addr: MacAddr) {}
    fn disassoc_while_authenticating(&mut self, _prev_bssid: MacAddr) {}
}

pub trait P2pHooks: Send {
    /// A pending P2P scan consumed the results; stop here.
    fn scan_complete_pending(&mut self) -> bool {
        false
    }
    /// PBC overlap seen; true when P2P took over handling.
    fn notif_pbc_overlap(&mut self) -> bool {
        false
    }
    /// In a group-formation provisioning window.
    fn in_provisioning(&self) -> bool {
        false
    }
    fn wps_success(&mut self, _bssid: MacAddr) {}
    fn wps_failed(&mut self) {}
    fn forwarded(&mut self, _data: &[u8]) {}
}

pub trait BackgroundScan: Send {
    /// True when background scanning consumed the results.
    fn notify_scan(&mut self, results: &[ScanResult]) -> bool;
    fn notify_signal_change(&mut self, _level: i32) {}
}

/// Hooks used when the station interface runs an AP.
pub trait ApHooks: Send {
    fn scan_cb(&mut self, _results: &[ScanResult]) {}
    fn notif_assoc(&mut self, _addr: MacAddr, _req_ies: &[u8], _reassoc: bool) {}
    fn notif_disassoc(&mut self, _addr: MacAddr) {}
    fn rx_mgmt(&mut self, _frame: &[u8]) {}
    fn rx_action(&mut self, _src: MacAddr, _category: u8, _data: &[u8]) {}
    fn rx_probe_req(&mut self, _sa: MacAddr, _ies: &[u8]) {}
    fn tx_status(&mut self, _dst: MacAddr, _ack: bool) {}
    fn wps_cancel(&mut self) {}
}

pub trait IbssRsn: Send {
    fn init(&mut self) -> Result<(), CoreError>;
    fn start(&mut self, _peer: MacAddr) {}
    fn peer_lost(&mut self, _peer: MacAddr) {}
}

pub trait RandomPool: Send {
    fn add_randomness(&mut self, data: &[u8]);
}

/// Persistence side of the configuration store.
pub trait ConfigBackend: Send {
    /// Derive `psk` from `passphrase` and `ssid`.
    fn update_psk(&mut self, profile: &mut NetworkProfile);
    fn write(&mut self, profiles: &ProfileStore) -> Result<(), CoreError>;
    /// Append `ssid` to the `.pp` record unless already listed.
    fn record_wps_ssid(&mut self, _ssid: &[u8]) -> Result<(), CoreError> {
        Ok(())
    }
}

// ── Bundle ──────────────────────────────────────────────────────────

/// Everything a station needs injected.
pub struct Collaborators {
    pub driver: Box<dyn Driver>,
    pub eapol: Box<dyn Eapol>,
    pub wpa: Box<dyn WpaSm>,
    pub scard: Option<Box<dyn SmartCard>>,
    pub ft: Option<Box<dyn FtHandler>>,
    pub sme: Option<Box<dyn SmeHandler>>,
    pub p2p: Option<Box<dyn P2pHooks>>,
    pub bgscan: Option<Box<dyn BackgroundScan>>,
    pub ap: Option<Box<dyn ApHooks>>,
    pub ibss_rsn: Option<Box<dyn IbssRsn>>,
    pub random: Option<Box<dyn RandomPool>>,
    pub config: Option<Box<dyn ConfigBackend>>,
}

impl Collaborators {
    pub fn new(driver: Box<dyn Driver>, eapol: Box<dyn Eapol>, wpa: Box<dyn WpaSm>) -> Self {
        Self {
            driver,
            eapol,
            wpa,
            scard: None,
            ft: None,
            sme: None,
            p2p: None,
            bgscan: None,
            ap: None,
            ibss_rsn: None,
            random: None,
            config: None,
        }
    }

    #[must_use]
    pub fn with_scard(mut self, scard: Box<dyn SmartCard>) -> Self {
        self.scard = Some(scard);
        self
    }

    #[must_use]
    pub fn with_ft(mut self, ft: Box<dyn FtHandler>) -> Self {
        self.ft = Some(ft);
        self
    }

    #[must_use]
    pub fn with_sme(mut self, sme: Box<dyn SmeHandler>) -> Self {
        self.sme = Some(sme);
        self
    }

    #[must_use]
    pub fn with_p2p(mut self, p2p: Box<dyn P2pHooks>) -> Self {
        self.p2p = Some(p2p);
        self
    }

    #[must_use]
    pub fn with_bgscan(mut self, bgscan: Box<dyn BackgroundScan>) -> Self {
        self.bgscan = Some(bgscan);
        self
    }

    #[must_use]
    pub fn with_ap(mut self, ap: Box<dyn ApHooks>) -> Self {
        self.ap = Some(ap);
        self
    }

    #[must_use]
    pub fn with_ibss_rsn(mut self, ibss: Box<dyn IbssRsn>) -> Self {
        self.ibss_rsn = Some(ibss);
        self
    }

    #[must_use]
    pub fn with_random(mut self, random: Box<dyn RandomPool>) -> Self {
        self.random = Some(random);
        self
    }

    #[must_use]
    pub fn with_config(mut self, config: Box<dyn ConfigBackend>) -> Self {
        self.config = Some(config);
        self
    }
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators")
            .field("scard", &self.scard.is_some())
            .field("ft", &self.ft.is_some())
            .field("sme", &self.sme.is_some())
            .field("p2p", &self.p2p.is_some())
            .field("bgscan", &self.bgscan.is_some())
            .field("ap", &self.ap.is_some())
            .field("ibss_rsn", &self.ibss_rsn.is_some())
            .finish_non_exhaustive()
    }
}
