// ── Simulated collaborators ──
//
// In-memory driver, EAPOL, WPA and configuration backends. All of them
// share one `SimWorld`: the test (or the replay tool) scripts what the
// "radio" reports and reads back the log of every command the station
// issued. Nothing here touches hardware.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use indexmap::IndexMap;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::collab::{
    AssocParams, Collaborators, ConfigBackend, Driver, DriverCapabilities, DriverFlags, Eapol,
    WpaSm,
};
use crate::error::CoreError;
use crate::ie::wpa::ParsedSecurityIe;
use crate::model::{
    Cipher, HwMode, KeyMgmt, MacAddr, MfpPolicy, NetworkProfile, ReasonCode, ScanResult,
};
use crate::store::ProfileStore;

/// One command observed by a simulated collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "call", rename_all = "snake_case")]
pub enum Call {
    Scan { freqs: Vec<u32> },
    Associate { bssid: Option<MacAddr>, ssid: String, freq: u32, key_mgmt: String },
    Deauthenticate { bssid: MacAddr, reason: u16 },
    Disassociate { bssid: MacAddr, reason: u16 },
    Countermeasures { enabled: bool },
    SchedScan { interval_ms: u64 },
    StopSchedScan,
    FastReassoc { enabled: bool },
    ClearKeys,
    SetWepKeys,
    Status { message: String },
    PortEnabled { enabled: bool },
    PortValid { valid: bool },
    EapSuccess { success: bool },
    EapolConfig { set: bool },
    EapolRx { src: MacAddr, len: usize },
    WpaAssoc { bssid: MacAddr },
    WpaDisassoc,
    WpaConfig { set: bool },
    AssocWpaIe { len: Option<usize> },
    KeyRequest { error: bool, pairwise: bool },
    ConfigWrite { profiles: usize },
    RecordSsid { ssid: String },
}

/// Scriptable state behind every simulated collaborator.
#[derive(Debug)]
pub struct WorldState {
    pub calls: Vec<Call>,
    pub scan_results: Vec<ScanResult>,
    pub bssid: MacAddr,
    pub ssid: Vec<u8>,
    pub caps: DriverCapabilities,
    pub hw_modes: Vec<HwMode>,
    pub radio: Option<String>,
    pub fail_scan: bool,
    pub fail_scan_results: bool,
    pub fail_associate: bool,
    pub fast_reassoc: bool,
    /// What the WPA engine reports as our own association IE.
    pub own_ie: Option<ParsedSecurityIe>,
    pub pairing_hashes: IndexMap<MacAddr, [u8; 32]>,
    pub fail_pairing_hash: bool,
    pub fail_config_write: bool,
}

impl Default for WorldState {
    fn default() -> Self {
        Self {
            calls: Vec::new(),
            scan_results: Vec::new(),
            bssid: MacAddr::ZERO,
            ssid: Vec::new(),
            caps: SimWorld::full_caps(),
            hw_modes: Vec::new(),
            radio: None,
            fail_scan: false,
            fail_scan_results: false,
            fail_associate: false,
            fast_reassoc: false,
            own_ie: None,
            pairing_hashes: IndexMap::new(),
            fail_pairing_hash: false,
            fail_config_write: false,
        }
    }
}

/// Shared handle on the simulated radio.
#[derive(Debug, Clone, Default)]
pub struct SimWorld(Arc<Mutex<WorldState>>);

impl SimWorld {
    pub fn new() -> Self {
        Self::default()
    }

    /// A driver that can do everything short of SME and offload.
    pub fn full_caps() -> DriverCapabilities {
        DriverCapabilities {
            flags: DriverFlags::empty(),
            key_mgmt: KeyMgmt::PSK
                | KeyMgmt::IEEE8021X
                | KeyMgmt::FT_PSK
                | KeyMgmt::FT_IEEE8021X
                | KeyMgmt::PSK_SHA256
                | KeyMgmt::IEEE8021X_SHA256
                | KeyMgmt::WPA_NONE,
            enc: Cipher::CCMP | Cipher::TKIP | Cipher::WEP40 | Cipher::WEP104,
            mfp: MfpPolicy::Optional,
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, WorldState> {
        self.0.lock().expect("sim world lock poisoned")
    }

    fn record(&self, call: Call) {
        self.lock().calls.push(call);
    }

    pub fn set_scan_results(&self, results: Vec<ScanResult>) {
        self.lock().scan_results = results;
    }

    pub fn set_bssid(&self, bssid: MacAddr) {
        self.lock().bssid = bssid;
    }

    pub fn set_ssid(&self, ssid: impl AsRef<[u8]>) {
        self.lock().ssid = ssid.as_ref().to_vec();
    }

    pub fn set_caps(&self, caps: DriverCapabilities) {
        self.lock().caps = caps;
    }

    pub fn set_radio(&self, radio: impl Into<String>) {
        self.lock().radio = Some(radio.into());
    }

    pub fn set_own_ie(&self, ie: Option<ParsedSecurityIe>) {
        self.lock().own_ie = ie;
    }

    pub fn set_pairing_hash(&self, bssid: MacAddr, hash: [u8; 32]) {
        self.lock().pairing_hashes.insert(bssid, hash);
    }

    pub fn fail_scans(&self, fail: bool) {
        self.lock().fail_scan = fail;
    }

    pub fn fail_scan_results(&self, fail: bool) {
        self.lock().fail_scan_results = fail;
    }

    pub fn fail_associate(&self, fail: bool) {
        self.lock().fail_associate = fail;
    }

    pub fn fail_pairing_hash(&self, fail: bool) {
        self.lock().fail_pairing_hash = fail;
    }

    pub fn fail_config_write(&self, fail: bool) {
        self.lock().fail_config_write = fail;
    }

    pub fn fast_reassoc(&self) -> bool {
        self.lock().fast_reassoc
    }

    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    /// Return the log and start a fresh one.
    pub fn take_calls(&self) -> Vec<Call> {
        std::mem::take(&mut self.lock().calls)
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.lock().calls.iter().filter(|c| pred(c)).count()
    }

    pub fn status_messages(&self) -> Vec<String> {
        self.lock()
            .calls
            .iter()
            .filter_map(|c| match c {
                Call::Status { message } => Some(message.clone()),
                _ => None,
            })
            .collect()
    }

    /// Every association request, in order.
    pub fn associations(&self) -> Vec<Call> {
        self.lock()
            .calls
            .iter()
            .filter(|c| matches!(c, Call::Associate { .. }))
            .cloned()
            .collect()
    }

    /// Driver, EAPOL and WPA engines plus a config backend, all bound to
    /// this world.
    pub fn collaborators(&self) -> Collaborators {
        Collaborators::new(
            Box::new(SimDriver(self.clone())),
            Box::new(SimEapol(self.clone())),
            Box::new(SimWpa(self.clone())),
        )
        .with_config(Box::new(SimConfig(self.clone())))
    }
}

// ── Driver ──────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct SimDriver(SimWorld);

impl Driver for SimDriver {
    fn get_scan_results(&mut self) -> Result<Vec<ScanResult>, CoreError> {
        let world = self.0.lock();
        if world.fail_scan_results {
            return Err(CoreError::ScanResultsUnavailable {
                reason: "simulated failure".into(),
            });
        }
        Ok(world.scan_results.clone())
    }

    fn scan(&mut self, freqs: &[u32]) -> Result<(), CoreError> {
        let fail = self.0.lock().fail_scan;
        self.0.record(Call::Scan {
            freqs: freqs.to_vec(),
        });
        if fail {
            return Err(CoreError::driver("scan", "simulated failure"));
        }
        Ok(())
    }

    fn associate(&mut self, params: &AssocParams) -> Result<(), CoreError> {
        let fail = self.0.lock().fail_associate;
        self.0.record(Call::Associate {
            bssid: params.bssid,
            ssid: String::from_utf8_lossy(&params.ssid).into_owned(),
            freq: params.freq,
            key_mgmt: format!("{:?}", params.key_mgmt),
        });
        if fail {
            return Err(CoreError::driver("associate", "simulated failure"));
        }
        Ok(())
    }

    fn deauthenticate(&mut self, bssid: MacAddr, reason: ReasonCode) -> Result<(), CoreError> {
        self.0.record(Call::Deauthenticate {
            bssid,
            reason: reason.0,
        });
        Ok(())
    }

    fn disassociate(&mut self, bssid: MacAddr, reason: ReasonCode) -> Result<(), CoreError> {
        self.0.record(Call::Disassociate {
            bssid,
            reason: reason.0,
        });
        Ok(())
    }

    fn set_countermeasures(&mut self, enabled: bool) -> Result<(), CoreError> {
        self.0.record(Call::Countermeasures { enabled });
        Ok(())
    }

    fn capabilities(&self) -> Result<DriverCapabilities, CoreError> {
        Ok(self.0.lock().caps)
    }

    fn get_bssid(&mut self) -> Result<MacAddr, CoreError> {
        Ok(self.0.lock().bssid)
    }

    fn get_ssid(&mut self) -> Result<Vec<u8>, CoreError> {
        let ssid = self.0.lock().ssid.clone();
        if ssid.is_empty() {
            return Err(CoreError::Unsupported {
                operation: "get_ssid".into(),
            });
        }
        Ok(ssid)
    }

    fn sched_scan(&mut self, interval: Duration) -> Result<(), CoreError> {
        let interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        self.0.record(Call::SchedScan { interval_ms });
        Ok(())
    }

    fn stop_sched_scan(&mut self) -> Result<(), CoreError> {
        self.0.record(Call::StopSchedScan);
        Ok(())
    }

    fn hw_modes(&mut self) -> Vec<HwMode> {
        self.0.lock().hw_modes.clone()
    }

    fn radio_name(&self) -> Option<String> {
        self.0.lock().radio.clone()
    }

    fn pairing_hash(&mut self, bssid: MacAddr) -> Result<Option<[u8; 32]>, CoreError> {
        let world = self.0.lock();
        if world.fail_pairing_hash {
            return Err(CoreError::driver("pairing_hash", "not available"));
        }
        Ok(world.pairing_hashes.get(&bssid).copied())
    }

    fn set_fast_reassoc(&mut self, enabled: bool) -> Result<bool, CoreError> {
        let prev = std::mem::replace(&mut self.0.lock().fast_reassoc, enabled);
        self.0.record(Call::FastReassoc { enabled });
        Ok(prev)
    }

    fn set_wep_keys(&mut self, _profile: &NetworkProfile) -> Result<(), CoreError> {
        self.0.record(Call::SetWepKeys);
        Ok(())
    }

    fn clear_keys(&mut self) {
        self.0.record(Call::ClearKeys);
    }

    fn status_message(&mut self, msg: &str) {
        self.0.record(Call::Status {
            message: msg.to_owned(),
        });
    }
}

// ── EAPOL / WPA ─────────────────────────────────────────────────────

#[derive(Debug)]
pub struct SimEapol(SimWorld);

impl Eapol for SimEapol {
    fn notify_port_enabled(&mut self, enabled: bool) {
        self.0.record(Call::PortEnabled { enabled });
    }

    fn notify_port_valid(&mut self, valid: bool) {
        self.0.record(Call::PortValid { valid });
    }

    fn notify_eap_success(&mut self, success: bool) {
        self.0.record(Call::EapSuccess { success });
    }

    fn invalidate_cached_session(&mut self) {}

    fn set_config(&mut self, profile: Option<&NetworkProfile>) {
        self.0.record(Call::EapolConfig {
            set: profile.is_some(),
        });
    }

    fn rx_eapol(&mut self, src: MacAddr, data: &[u8]) {
        self.0.record(Call::EapolRx {
            src,
            len: data.len(),
        });
    }
}

#[derive(Debug)]
pub struct SimWpa(SimWorld);

impl WpaSm for SimWpa {
    fn notify_assoc(&mut self, bssid: MacAddr) {
        self.0.record(Call::WpaAssoc { bssid });
    }

    fn notify_disassoc(&mut self) {
        self.0.record(Call::WpaDisassoc);
    }

    fn set_assoc_wpa_ie(&mut self, ie: Option<&[u8]>) {
        self.0.record(Call::AssocWpaIe {
            len: ie.map(<[u8]>::len),
        });
    }

    fn parse_own_wpa_ie(&self) -> Result<ParsedSecurityIe, CoreError> {
        self.0.lock().own_ie.clone().ok_or(CoreError::MalformedIe {
            reason: "no own WPA IE".into(),
        })
    }

    fn key_request(&mut self, error: bool, pairwise: bool) {
        self.0.record(Call::KeyRequest { error, pairwise });
    }

    fn set_config(&mut self, profile: Option<&NetworkProfile>) {
        self.0.record(Call::WpaConfig {
            set: profile.is_some(),
        });
    }
}

// ── Configuration ───────────────────────────────────────────────────

/// Records writes; derives a stand-in PSK so callers can see that
/// derivation was requested.
#[derive(Debug)]
pub struct SimConfig(SimWorld);

impl ConfigBackend for SimConfig {
    fn update_psk(&mut self, profile: &mut NetworkProfile) {
        let Some(pass) = profile.passphrase.as_ref() else {
            return;
        };
        let mut hasher = Sha256::new();
        hasher.update(&profile.ssid);
        hasher.update(pass.expose().as_bytes());
        profile.psk = Some(hasher.finalize().into());
    }

    fn write(&mut self, profiles: &ProfileStore) -> Result<(), CoreError> {
        if self.0.lock().fail_config_write {
            return Err(CoreError::Config {
                message: "simulated write failure".into(),
            });
        }
        let persistent = profiles.iter().filter(|(_, p)| !p.temporary).count();
        self.0.record(Call::ConfigWrite {
            profiles: persistent,
        });
        Ok(())
    }

    fn record_wps_ssid(&mut self, ssid: &[u8]) -> Result<(), CoreError> {
        self.0.record(Call::RecordSsid {
            ssid: String::from_utf8_lossy(ssid).into_owned(),
        });
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn calls_are_shared_across_collaborators() {
        let world = SimWorld::new();
        let mut collab = world.collaborators();
        collab.driver.scan(&[2412]).unwrap();
        collab.eapol.notify_port_enabled(true);
        collab.wpa.notify_disassoc();
        assert_eq!(
            world.take_calls(),
            vec![
                Call::Scan { freqs: vec![2412] },
                Call::PortEnabled { enabled: true },
                Call::WpaDisassoc,
            ]
        );
        assert!(world.calls().is_empty());
    }

    #[test]
    fn fast_reassoc_reports_previous_value() {
        let world = SimWorld::new();
        let mut driver = SimDriver(world.clone());
        assert!(!driver.set_fast_reassoc(true).unwrap());
        assert!(driver.set_fast_reassoc(false).unwrap());
        assert!(!world.fast_reassoc());
    }

    #[test]
    fn scripted_failures_surface_as_errors() {
        let world = SimWorld::new();
        world.fail_scan_results(true);
        let mut driver = SimDriver(world.clone());
        assert!(driver.get_scan_results().is_err());
        world.fail_scans(true);
        assert!(driver.scan(&[]).is_err());
        assert_eq!(world.count(|c| matches!(c, Call::Scan { .. })), 1);
    }
}
