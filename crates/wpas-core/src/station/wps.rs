// ── WPS provisioning controller ──
//
// Station-side WPS operations. A session adds one temporary profile
// (key_mgmt WPS, EAP-WSC), parks every other profile behind
// `Disabled::WPS_TEMP`, and forces a reassociation. Every way out of a
// session (credential, failure, timeout, cancel) removes the temporary
// profile and clears only the WPS_TEMP bit it set, so a profile the
// user had disabled stays disabled.

use std::time::Duration;

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::CoreError;
use crate::model::{
    Disabled, EapMethod, KeyMgmt, MacAddr, NetworkProfile, Notification, ProfileFlags, ProfileId,
    ReasonCode, WPS_ENROLLEE_IDENTITY, WPS_REGISTRAR_IDENTITY, WpaState, ssid_text,
};
use crate::wps::cred::{apply_credential, reset_security, security_workaround};
use crate::wps::{
    CONFIG_ERROR_MULTIPLE_PBC, ChangedParams, Credential, FAST_REASSOC_HOLD, FastReassoc,
    MSG_BEACON, WpsAuthType, WpsCallbacks, WpsDeviceOptions, WpsEvent, WpsExtState, WpsFailure,
    WpsM2d, WpsOp, callbacks, fail_reason, generate_pin,
};

use super::{ScanRequest, Station, TimerKind};

/// Scans kept on the credential's channel after provisioning.
const AFTER_WPS_SCANS: u32 = 5;
/// Settle time between the post-credential deauth and the next scan.
const CREDENTIAL_RESCAN_DELAY: Duration = Duration::from_millis(100);
/// Rescan delay after a PIN failure once the blacklist has been
/// cleared for this session.
const PIN_RETRY_AFTER_CLEAR: Duration = Duration::from_secs(5);

/// New AP settings a registrar pushes while configuring an AP.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewApSettings {
    pub ssid_hex: String,
    pub auth: String,
    pub encr: String,
    pub key_hex: String,
}

/// EAP phase1 string for a PIN enrollee.
pub fn pin_phase1(pin: u32, dev_pw_id: u16) -> String {
    format!("pin={pin:08} dev_pw_id={dev_pw_id}")
}

/// EAP phase1 string for a registrar, optionally reconfiguring the AP.
pub fn registrar_phase1(pin: &str, settings: Option<&NewApSettings>) -> String {
    match settings {
        Some(s) => format!(
            "pin={pin} new_ssid={} new_auth={} new_encr={} new_key={}",
            s.ssid_hex, s.auth, s.encr, s.key_hex
        ),
        None => format!("pin={pin}"),
    }
}

impl Station {
    // ── Session start ───────────────────────────────────────────────

    /// Start a push-button session, optionally pinned to `bssid`.
    pub fn start_pbc(&mut self, bssid: Option<MacAddr>, p2p_group: bool) -> Result<(), CoreError> {
        self.ensure_wps_enabled()?;
        self.clear_wps();
        self.blacklist.clear();
        let id = self.add_wps_network(false, bssid, p2p_group, "pbc=1".into());
        let timeout = self.opts.wps.pbc_timeout;
        self.arm_wps_timeout(WpsOp::Pbc, timeout);
        self.wps_reassoc(id);

        self.collab.driver.status_message("WPS PBC start");
        self.on_event(WpsEvent::PbcStart);
        Ok(())
    }

    /// Start a PIN enrollee session. A PIN is generated when none is
    /// given; the PIN in use is returned.
    pub fn start_pin(
        &mut self,
        bssid: Option<MacAddr>,
        pin: Option<u32>,
        p2p_group: bool,
        dev_pw_id: u16,
    ) -> Result<u32, CoreError> {
        self.ensure_wps_enabled()?;
        self.clear_wps();
        self.blacklist.clear();
        let pin = pin.unwrap_or_else(generate_pin);
        let id = self.add_wps_network(false, bssid, p2p_group, pin_phase1(pin, dev_pw_id));
        let timeout = self.opts.wps.pin_timeout;
        self.arm_wps_timeout(WpsOp::Pin, timeout);
        self.wps_reassoc(id);

        self.collab.driver.status_message("WPS PIN start");
        self.on_event(WpsEvent::PinStart);
        Ok(pin)
    }

    /// Act as an external registrar towards the AP at `bssid` using the
    /// AP's PIN.
    pub fn start_reg(
        &mut self,
        bssid: Option<MacAddr>,
        pin: &str,
        settings: Option<&NewApSettings>,
    ) -> Result<(), CoreError> {
        if pin.is_empty() {
            return Err(CoreError::PinRequired);
        }
        self.ensure_wps_enabled()?;
        self.clear_wps();
        let id = self.add_wps_network(true, bssid, false, registrar_phase1(pin, settings));
        let timeout = self.opts.wps.pin_timeout;
        self.arm_wps_timeout(WpsOp::Registrar, timeout);
        self.wps_reassoc(id);
        Ok(())
    }

    fn ensure_wps_enabled(&self) -> Result<(), CoreError> {
        if self.opts.wps.enabled {
            Ok(())
        } else {
            warn!(ifname = %self.opts.ifname, "WPS disabled in configuration");
            Err(CoreError::WpsDisabled)
        }
    }

    fn arm_wps_timeout(&mut self, op: WpsOp, timeout: Duration) {
        self.wps.op = Some(op);
        self.timers.schedule(TimerKind::WpsTimeout, timeout);
    }

    /// Add the temporary bootstrap profile and return its ID.
    fn add_wps_network(
        &mut self,
        registrar: bool,
        bssid: Option<MacAddr>,
        p2p_group: bool,
        phase1: String,
    ) -> ProfileId {
        let identity = if registrar {
            WPS_REGISTRAR_IDENTITY
        } else {
            WPS_ENROLLEE_IDENTITY
        };
        let mut profile = NetworkProfile {
            key_mgmt: KeyMgmt::WPS,
            temporary: true,
            p2p_group,
            ..NetworkProfile::default()
        };
        profile.eap.methods = vec![EapMethod::Wsc];
        profile.eap.identity = Some(identity.into());
        profile.eap.phase1 = Some(phase1);
        profile.eap.fragment_size = self.opts.wps.fragment_size;

        if let Some(bssid) = bssid {
            profile.bssid = Some(bssid);
            let mut seen = self.last_scan.iter().filter(|r| r.bssid == bssid);
            match (seen.next(), seen.next()) {
                (Some(bss), None) => {
                    debug!(ssid = %bss.ssid_text(), "WPS: picked SSID from scan results");
                    profile.ssid = bss.ssid().to_vec();
                }
                (Some(_), Some(_)) => {
                    debug!("WPS: more than one SSID found for the AP; use wildcard");
                }
                _ => {}
            }
        }

        let id = self.store.add(profile);
        self.notify(Notification::NetworkAdded { id });
        id
    }

    /// Park every other profile and force a fresh association pass
    /// towards `selected`.
    fn wps_reassoc(&mut self, selected: ProfileId) {
        if self.current.is_some() {
            self.deauthenticate(ReasonCode::DEAUTH_LEAVING);
        }

        let mut changed = Vec::new();
        for (id, profile) in self.store.iter_mut() {
            if id == selected || profile.disabled.contains(Disabled::PERSISTENT_GROUP) {
                continue;
            }
            let was_enabled = !profile.is_disabled();
            profile.disabled |= Disabled::WPS_TEMP;
            if was_enabled {
                changed.push(id);
            }
        }
        for id in changed {
            self.notify(Notification::NetworkEnabledChanged { id, enabled: false });
        }

        self.disconnected = false;
        self.reassociate = true;
        self.scan_runs = 0;
        self.wps.success = false;
        self.wps.blacklist_cleared = 0;

        self.deauthenticate(ReasonCode::DEAUTH_LEAVING);
        self.req_scan(Duration::ZERO);
    }

    // ── Session end ─────────────────────────────────────────────────

    /// Drop every WPS bootstrap profile and the walk timer.
    pub(crate) fn clear_wps(&mut self) {
        self.timers.cancel(TimerKind::WpsTimeout);
        let prev_current = self.current;

        for id in self.store.ids() {
            if !self.store.get(id).is_some_and(NetworkProfile::is_wps) {
                continue;
            }
            if self.current == Some(id) {
                self.current = None;
                self.notify(Notification::NetworkChanged { id: None });
            }
            if prev_current == Some(id) {
                self.collab.wpa.set_config(None);
                self.collab.eapol.set_config(None);
            }
            self.notify(Notification::NetworkRemoved { id });
            self.store.remove(id);
        }
    }

    /// Clear the WPS_TEMP bit everywhere. Returns how many profiles
    /// became selectable again.
    fn restore_profiles(&mut self) -> usize {
        let mut restored = 0;
        for (_, profile) in self.store.iter_mut() {
            if profile.disabled.contains(Disabled::WPS_TEMP) {
                profile.disabled.remove(Disabled::WPS_TEMP);
                if !profile.is_disabled() {
                    restored += 1;
                }
            }
        }
        debug!(ifname = %self.opts.ifname, restored, "WPS: restored profiles");
        restored
    }

    fn rescan_after_wps(&mut self) {
        self.restore_profiles();
        self.disconnected = false;
        self.reassociate = true;
        self.scan_req = ScanRequest::Manual;
        self.req_scan(Duration::ZERO);
    }

    /// Walk timer expired.
    pub(super) fn wps_timeout(&mut self) {
        self.notify(Notification::WpsTimeout);
        self.clear_wps();
        let msg = match self.wps.op.take() {
            Some(WpsOp::Pbc) => "WPS PBC timeout",
            Some(WpsOp::Pin) => "WPS PIN timeout",
            Some(WpsOp::Registrar) | None => "WPS timeout",
        };
        self.collab.driver.status_message(msg);
        self.on_event(WpsEvent::Timeout);
        self.rescan_after_wps();
    }

    /// Abort a running session. A no-op when none is in progress.
    pub fn wps_cancel(&mut self) {
        if !crate::wps::in_progress(&self.store) {
            return;
        }
        if self.ap_mode {
            debug!("WPS: cancelling in AP mode");
            if let Some(ap) = self.collab.ap.as_mut() {
                ap.wps_cancel();
            }
            return;
        }

        if matches!(self.state, WpaState::Scanning | WpaState::Disconnected) {
            debug!("WPS: cancel operation - cancel scan");
            self.cancel_scan();
            self.clear_wps();
        } else if self.state >= WpaState::Associated {
            debug!("WPS: cancel operation - deauthenticate");
            self.deauthenticate(ReasonCode::DEAUTH_LEAVING);
            self.clear_wps();
        }
        self.on_event(WpsEvent::Cancel);
        self.rescan_after_wps();
    }

    /// Extended status line, e.g. `"1 (WPS_START)\n"`.
    pub fn wps_status(&self) -> String {
        self.wps.status_line()
    }

    /// Refresh the advertised device parameters after a configuration
    /// change.
    pub fn wps_update_config(
        &mut self,
        device: WpsDeviceOptions,
        changed: ChangedParams,
        sibling_uuid: Option<Uuid>,
    ) {
        self.wps.device.update(&device, changed, sibling_uuid);
        self.opts.wps.device = device;
    }

    // ── Overlap ─────────────────────────────────────────────────────

    /// Selection found a second active PBC registrar.
    pub(crate) fn pbc_overlap_detected(&mut self) {
        self.notify(Notification::WpsOverlap);
        self.on_event(WpsEvent::Fail(WpsFailure {
            msg: MSG_BEACON,
            config_error: CONFIG_ERROR_MULTIPLE_PBC,
            error_indication: 0,
        }));
        self.on_event(WpsEvent::PbcOverlap);
        if self
            .collab
            .p2p
            .as_mut()
            .is_some_and(|p2p| p2p.notif_pbc_overlap())
        {
            return;
        }
        self.wps_cancel();
    }

    // ── EAPOL completion ────────────────────────────────────────────

    /// The EAP exchange on a WPS profile finished. Returns true when WPS
    /// took over what happens next, so the caller must not run its
    /// normal post-EAPOL processing.
    pub fn wps_eapol_complete(&mut self) -> bool {
        let pin_enrollee = self
            .current_profile()
            .is_some_and(|p| p.eap.is_wps_pin_enrollee());
        if !self.wps.success && pin_enrollee {
            let bssid = if self.bssid.is_zero() {
                self.pending_bssid
            } else {
                self.bssid
            };
            info!(%bssid, "WPS: PIN registration did not succeed - keep looking for a suitable AP");
            self.blacklist.add(bssid);
            self.deauthenticate(ReasonCode::DEAUTH_LEAVING);
            self.reassociate = true;
            let delay = if self.wps.blacklist_cleared > 0 {
                PIN_RETRY_AFTER_CLEAR
            } else {
                Duration::ZERO
            };
            self.req_scan(delay);
            self.wps.blacklist_cleared = 0;
            return true;
        }

        self.timers.cancel(TimerKind::WpsTimeout);
        let wps_km = self.key_mgmt == KeyMgmt::WPS;
        if wps_km && !self.wps.success {
            self.notify(Notification::WpsFail {
                msg: 0,
                config_error: 0,
                error_indication: None,
            });
        }
        if !wps_km {
            return false;
        }

        let Some(current) = self.current_profile() else {
            return false;
        };
        if current.is_wps() {
            debug!("WPS: registration completed - waiting for external credential processing");
            self.clear_wps();
            self.deauthenticate(ReasonCode::DEAUTH_LEAVING);
            return true;
        }

        let disabled = current.is_disabled();
        let freq = self.assoc_freq;
        debug!(freq, "WPS: network configuration replaced - associate with the received credential");
        self.deauthenticate(ReasonCode::DEAUTH_LEAVING);
        if disabled {
            debug!("WPS: current network is disabled - wait for user to enable");
            return true;
        }
        self.wps.after_wps = AFTER_WPS_SCANS;
        self.wps.freq = freq;
        self.reassociate = true;
        self.wps.fast_reassoc = match self.collab.driver.set_fast_reassoc(true) {
            Ok(false) => FastReassoc::WpsEnabled,
            Ok(true) => FastReassoc::Default,
            Err(err) => {
                debug!(%err, "fast reassociation hint unavailable");
                FastReassoc::Default
            }
        };
        self.timers.schedule(TimerKind::StopFastReassoc, FAST_REASSOC_HOLD);
        self.req_scan(CREDENTIAL_RESCAN_DELAY);
        true
    }

    /// Revert the fast-reassociation hint if WPS turned it on.
    pub(super) fn clear_fast_reassoc(&mut self) {
        self.timers.cancel(TimerKind::StopFastReassoc);
        if self.wps.fast_reassoc != FastReassoc::WpsEnabled {
            return;
        }
        self.wps.fast_reassoc = FastReassoc::Default;
        if let Err(err) = self.collab.driver.set_fast_reassoc(false) {
            debug!(%err, "failed to clear the fast reassociation hint");
        }
    }

    // ── Credential ──────────────────────────────────────────────────

    fn wps_credential(&mut self, cred: &Credential) -> Result<(), CoreError> {
        let report = matches!(self.opts.wps.cred_processing, 1 | 2);
        let attr_hex = cred
            .cred_attr
            .as_ref()
            .filter(|_| report)
            .map(hex::encode);
        self.notify(Notification::WpsCredReceived { attr_hex });
        if self.opts.wps.cred_processing == 1 {
            return Ok(());
        }

        debug!(
            ssid = %ssid_text(&cred.ssid),
            auth = ?cred.auth_type,
            encr = ?cred.encr_type,
            key_idx = cred.key_idx,
            mac = %cred.mac_addr,
            "WPS: received credential"
        );
        let Some(auth) = cred.effective_auth() else {
            debug!(auth = ?cred.auth_type, "WPS: ignored credential for unsupported authentication type");
            return Ok(());
        };

        let placeholder = self
            .current
            .filter(|id| self.store.get(*id).is_some_and(NetworkProfile::is_wps));
        let (mut profile, registrar) = match placeholder.and_then(|id| self.store.get(id)) {
            Some(existing) => {
                debug!("WPS: replace WPS network block based on the received credential");
                let mut profile = existing.clone();
                let registrar = profile.eap.identity.as_deref() == Some(WPS_REGISTRAR_IDENTITY);
                profile.clear_eap();
                if !profile.p2p_group {
                    profile.temporary = false;
                }
                profile.bssid = None;
                (profile, registrar)
            }
            None => {
                debug!("WPS: create a new network based on the received credential");
                (NetworkProfile::default(), false)
            }
        };

        reset_security(&mut profile);
        profile.ssid.clone_from(&cred.ssid);
        let applied = apply_credential(&mut profile, cred, auth)?;
        if applied.derive_psk {
            match self.collab.config.as_mut() {
                Some(config) => config.update_psk(&mut profile),
                None => warn!("WPS: no configuration backend to derive the PSK"),
            }
        }

        let bss = self
            .last_scan
            .iter()
            .find(|r| r.bssid == cred.mac_addr && r.ssid() == profile.ssid.as_slice());
        security_workaround(&mut profile, bss, &self.caps, self.opts.ap_scan);
        profile.flags |= ProfileFlags::ACCESS_THRU_WPS;
        profile.ieee80211w = self.caps.mfp;

        let disable_open =
            registrar && auth == WpsAuthType::OPEN && self.opts.wps.reg_disable_open;
        if disable_open {
            profile.disabled |= Disabled::USER;
        }
        let ssid = profile.ssid.clone();
        let id = match placeholder {
            Some(id) => {
                if let Some(slot) = self.store.get_mut(id) {
                    *slot = profile;
                }
                id
            }
            None => {
                let id = self.store.add(profile);
                self.notify(Notification::NetworkAdded { id });
                id
            }
        };
        if disable_open {
            self.notify(Notification::WpsOpenNetwork { id });
        }

        if self.opts.wps.update_config {
            let Some(config) = self.collab.config.as_mut() else {
                warn!("WPS: update_config set but no configuration backend attached");
                return Ok(());
            };
            config.write(&self.store).inspect_err(|err| {
                debug!(%err, "WPS: failed to update configuration");
            })?;
            if self.opts.wps.non_wps_pp_enable {
                config.record_wps_ssid(&ssid).inspect_err(|err| {
                    debug!(%err, "WPS: failed to update the pp configuration");
                })?;
            }
        }
        Ok(())
    }

    // ── Engine events ───────────────────────────────────────────────

    fn wps_m2d(&mut self, m2d: WpsM2d) {
        self.notify(Notification::WpsM2d {
            dev_password_id: m2d.dev_password_id,
            config_error: m2d.config_error,
        });
        let line = callbacks::m2d_status(&m2d);
        self.collab.driver.status_message(&line);
        self.wps.ext_state = WpsExtState::Error;
        if m2d.config_error == CONFIG_ERROR_MULTIPLE_PBC {
            if let Some(p2p) = self.collab.p2p.as_mut() {
                p2p.notif_pbc_overlap();
            }
        }
    }

    fn wps_fail(&mut self, fail: WpsFailure) {
        let error_indication =
            fail_reason(fail.error_indication).map(|r| (fail.error_indication, r.to_owned()));
        self.notify(Notification::WpsFail {
            msg: fail.msg,
            config_error: fail.config_error,
            error_indication,
        });
        let line = callbacks::fail_status(&fail);
        self.collab.driver.status_message(&line);

        self.clear_wps();
        if let Some(p2p) = self.collab.p2p.as_mut() {
            p2p.wps_failed();
        }
        self.wps.ext_state = WpsExtState::Error;
        self.rescan_after_wps();
    }

    fn wps_success(&mut self) {
        self.notify(Notification::WpsSuccess);
        self.collab.driver.status_message("WPS success");
        self.wps.success = true;
        let bssid = self.bssid;
        if let Some(p2p) = self.collab.p2p.as_mut() {
            p2p.wps_success(bssid);
        }
        self.wps.ext_state = WpsExtState::Success;
    }
}

impl WpsCallbacks for Station {
    fn on_credential(&mut self, cred: &Credential) -> Result<(), CoreError> {
        self.wps_credential(cred)
    }

    fn on_event(&mut self, event: WpsEvent) {
        debug!(ifname = %self.opts.ifname, ?event, "WPS event");
        match event {
            WpsEvent::M2d(m2d) => self.wps_m2d(m2d),
            WpsEvent::Fail(fail) => self.wps_fail(fail),
            WpsEvent::Success => self.wps_success(),
            WpsEvent::PbcStart | WpsEvent::PinStart => self.wps.ext_state = WpsExtState::Start,
            WpsEvent::PbcOverlap => self.wps.ext_state = WpsExtState::Overlap,
            WpsEvent::Timeout => {
                self.notify(Notification::WpsFailTimeout);
                self.collab.driver.status_message("WPS timeout");
                self.wps.ext_state = WpsExtState::Timeout;
            }
            WpsEvent::Cancel => {
                if self.wps.ext_state == WpsExtState::Start {
                    self.wps.ext_state = WpsExtState::Initial;
                }
            }
        }
    }
}
