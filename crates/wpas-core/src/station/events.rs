// ── Association-lifecycle events ──
//
// Handlers for the driver events that move the station through the
// association FSM. Dispatch (which handler runs for which event, and
// what is ignored while the interface is disabled) is in `dispatch`.

use std::time::Duration;

use bytes::Bytes;
use rand::Rng;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::collab::DriverFlags;
use crate::error::CoreError;
use crate::ie::{EID_RSN, EID_VENDOR_SPECIFIC, Elements};
use crate::model::{
    AssocInfo, InterfaceStatusKind, KeyMgmt, MacAddr, Notification, OpMode, ReasonCode, WpaState,
};
use crate::select::find_bss;

use super::assoc::dynamic_keys;
use super::{
    AUTH_TIMEOUT, COUNTERMEASURES_DURATION, MIC_FAILURE_WINDOW, PENDING_EAPOL_MAX_AGE,
    PendingEapol, Station, TimerKind,
};

/// Body prefix of a WPA vendor element: OUI 00:50:F2, type 1, version 1.
const WPA_IE_PREFIX: [u8; 6] = [0x00, 0x50, 0xf2, 0x01, 0x01, 0x00];
/// Auth timeout once EAP is underway for 802.1X and WPS.
const EAP_AUTH_TIMEOUT: Duration = Duration::from_secs(70);
/// Pause before re-associating after an unexpected disconnect.
const RECONNECT_DELAY: Duration = Duration::from_millis(100);

/// Pairing hash expected from an AP we are allowed to pair with.
pub fn pairing_hash(pairing_id: &[u8], bssid: MacAddr) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(pairing_id);
    hasher.update(bssid.as_bytes());
    hasher.finalize().into()
}

fn is_wpa_element(id: u8, body: &[u8]) -> bool {
    id == EID_VENDOR_SPECIFIC && body.starts_with(&WPA_IE_PREFIX)
}

fn is_rsn_element(id: u8, body: &[u8]) -> bool {
    id == EID_RSN && body.len() >= 2
}

impl Station {
    // ── ASSOCINFO ───────────────────────────────────────────────────

    /// Absorb the association IEs. Returns false when the association
    /// was torn down.
    pub(crate) fn event_associnfo(&mut self, info: &AssocInfo) -> bool {
        let own = Elements::new(&info.req_ies)
            .find(|e| is_wpa_element(e.id, e.body) || is_rsn_element(e.id, e.body));
        match own {
            Some(elem) => {
                self.collab.wpa.set_assoc_wpa_ie(Some(elem.raw));
                self.find_assoc_pmkid();
            }
            None if !info.req_ies.is_empty() => self.collab.wpa.set_assoc_wpa_ie(None),
            None => {}
        }

        let ft = self
            .key_mgmt
            .intersects(KeyMgmt::FT_IEEE8021X | KeyMgmt::FT_PSK);
        if ft {
            if let Some(handler) = self.collab.ft.as_mut() {
                if let Err(err) = handler.validate_reassoc_resp(info) {
                    warn!(%err, "FT: validation of reassociation response failed");
                    self.deauthenticate(ReasonCode::INVALID_IE);
                    return false;
                }
            }
        }

        let ap_wpa = Elements::new(&info.beacon_ies).find(|e| is_wpa_element(e.id, e.body));
        let ap_rsn = Elements::new(&info.beacon_ies).find(|e| is_rsn_element(e.id, e.body));
        if ap_wpa.is_some() || !info.beacon_ies.is_empty() {
            self.collab.wpa.set_ap_wpa_ie(ap_wpa.map(|e| e.raw));
        }
        if ap_rsn.is_some() || !info.beacon_ies.is_empty() {
            self.collab.wpa.set_ap_rsn_ie(ap_rsn.map(|e| e.raw));
        }
        if ap_wpa.is_some() || ap_rsn.is_some() {
            self.ap_ies_from_associnfo = true;
        }

        if self.assoc_freq != 0 && info.freq != 0 && self.assoc_freq != info.freq {
            info!(old = self.assoc_freq, new = info.freq, "operating frequency changed");
            self.refresh_scan_cache();
        }
        self.assoc_freq = info.freq;
        true
    }

    // ── ASSOC ───────────────────────────────────────────────────────

    pub(crate) fn event_assoc(&mut self, info: &AssocInfo) {
        if self.opts.pairing_id.is_some() && !self.pairing_ok() {
            return;
        }
        if self.ap_mode {
            if let (Some(addr), Some(ap)) = (info.addr, self.collab.ap.as_mut()) {
                ap.notif_assoc(addr, &info.req_ies, info.reassoc);
            }
            return;
        }

        let ft_completed = self.collab.wpa.ft_is_completed();
        if !self.event_associnfo(info) {
            return;
        }
        self.set_state(WpaState::Associated);
        self.clear_fast_reassoc();

        match self.collab.driver.get_bssid() {
            Ok(bssid) if bssid != self.bssid => {
                if !self.bssid_changed(bssid, ft_completed) {
                    return;
                }
            }
            Ok(_) => {}
            Err(err) => debug!(%err, "driver BSSID unavailable"),
        }

        let bssid = self.bssid;
        self.notify(Notification::Associated { bssid });
        if let (Some(scard), Some(profile)) = (
            self.collab.scard.as_mut(),
            self.current.and_then(|id| self.store.get(id)),
        ) {
            if profile.eap.needs_smartcard() {
                if let Err(err) = scard.init(profile) {
                    warn!(%err, "smartcard initialization failed");
                }
            }
        }
        self.collab.wpa.notify_assoc(bssid);

        if !ft_completed {
            self.collab.eapol.notify_port_enabled(false);
            self.collab.eapol.notify_port_valid(false);
        }
        if self.key_mgmt.is_wpa_psk() || ft_completed {
            self.collab.eapol.notify_eap_success(false);
        }
        // Re-enable the port so EAPOL drops any stale SUCCESS state.
        self.collab.eapol.notify_port_enabled(true);

        let ibss = self.current_profile().is_some_and(|p| p.mode == OpMode::Ibss);
        if self.key_mgmt == KeyMgmt::NONE || self.key_mgmt == KeyMgmt::WPA_NONE || ibss {
            self.cancel_auth_timeout();
            self.set_state(WpaState::Completed);
        } else if !ft_completed {
            self.req_auth_timeout(AUTH_TIMEOUT);
        }
        self.cancel_scan();

        let driver_4way = self.caps.flags.contains(DriverFlags::FOUR_WAY_HANDSHAKE);
        if driver_4way && self.key_mgmt.is_wpa_psk() {
            self.cancel_auth_timeout();
            self.set_state(WpaState::Completed);
            self.collab.eapol.notify_port_valid(true);
            self.collab.eapol.notify_eap_success(true);
        } else if driver_4way && self.key_mgmt.is_wpa_ieee8021x() {
            self.collab.eapol.notify_port_valid(true);
        } else if ft_completed {
            self.cancel_auth_timeout();
            self.set_state(WpaState::Completed);
            self.collab.eapol.notify_port_valid(true);
            self.collab.eapol.notify_eap_success(true);
        }

        if let Some(pending) = self.pending_eapol.take() {
            let age = self.now().saturating_sub(pending.at);
            if age < PENDING_EAPOL_MAX_AGE && pending.src == bssid {
                debug!(?age, "process pending EAPOL frame received just before association");
                self.rx_eapol(pending.src, pending.data);
            }
        }

        let static_wep =
            self.key_mgmt == KeyMgmt::NONE || self.key_mgmt == KeyMgmt::IEEE8021X_NO_WPA;
        if static_wep && self.caps.flags.contains(DriverFlags::SET_KEYS_AFTER_ASSOC_DONE) {
            if let Some(profile) = self.current.and_then(|id| self.store.get(id)) {
                if let Err(err) = self.collab.driver.set_wep_keys(profile) {
                    warn!(%err, "failed to set static WEP keys");
                }
            }
        }

        let keyed = self.key_mgmt != KeyMgmt::NONE && self.key_mgmt != KeyMgmt::WPA_NONE;
        if ibss && keyed && !self.ibss_rsn_active {
            let started = self.collab.ibss_rsn.as_mut().map_or_else(
                || {
                    Err(CoreError::Unsupported {
                        operation: "ibss_rsn".into(),
                    })
                },
                |ibss| ibss.init(),
            );
            match started {
                Ok(()) => self.ibss_rsn_active = true,
                Err(err) => {
                    warn!(%err, "Failed to init IBSS RSN");
                    self.deauthenticate(ReasonCode::DEAUTH_LEAVING);
                }
            }
        }
    }

    /// The driver reports a different BSSID. Returns false when no
    /// profile matches and the association was dropped.
    fn bssid_changed(&mut self, bssid: MacAddr, ft_completed: bool) -> bool {
        if let Some(random) = self.collab.random.as_mut() {
            random.add_randomness(bssid.as_bytes());
        }
        debug!(%bssid, "associated to a new BSS");
        self.bssid = bssid;
        self.pending_bssid = MacAddr::ZERO;
        self.mic.seen = 0;
        self.notify(Notification::BssidChanged { bssid });

        if dynamic_keys(self.key_mgmt, self.current_profile()) && !ft_completed {
            self.collab.driver.clear_keys();
        }
        if self.select_config().is_err() {
            self.disassociate(ReasonCode::DEAUTH_LEAVING);
            return false;
        }

        let ssid = self.current_profile().map(|p| p.ssid.clone()).unwrap_or_default();
        let by_ssid = if ssid.is_empty() {
            None
        } else {
            find_bss(&self.last_scan, bssid, &ssid)
        };
        let found = by_ssid
            .or_else(|| self.last_scan.iter().find(|r| r.bssid == bssid))
            .cloned();
        if found.is_some() {
            self.current_bss = found;
        }
        true
    }

    /// Verify the driver's pairing hash for the current BSSID.
    fn pairing_ok(&mut self) -> bool {
        let Some(pairing_id) = self.opts.pairing_id.clone() else {
            return true;
        };
        let bssid = match self.collab.driver.get_bssid() {
            Ok(bssid) => bssid,
            Err(err) => {
                warn!(%err, "pairing check failed - BSSID unavailable");
                return false;
            }
        };
        let reported = match self.collab.driver.pairing_hash(bssid) {
            Ok(Some(hash)) => hash,
            Ok(None) => return true,
            Err(err) => {
                warn!(%err, "pairing check failed - hash unavailable");
                return false;
            }
        };
        if reported == pairing_hash(&pairing_id, bssid) {
            return true;
        }
        warn!(%bssid, "pairing hash mismatch - disassociating");
        if let Err(err) = self
            .collab
            .driver
            .disassociate(bssid, ReasonCode::INVALID_IE)
        {
            warn!(%err, "disassociate failed");
        }
        false
    }

    // ── DISASSOC / DEAUTH ───────────────────────────────────────────

    pub(crate) fn event_disassoc(&mut self, reason: ReasonCode) {
        let authenticating = self.state == WpaState::Authenticating;
        let prev_pending = self.pending_bssid;

        if self.key_mgmt == KeyMgmt::WPA_NONE {
            debug!("disassociation event - ignore in IBSS mode");
            return;
        }
        if self.state == WpaState::FourWay && self.key_mgmt.is_wpa_psk() {
            self.notify(Notification::FourWayFailed);
        }

        let mic_hold = reason == ReasonCode::MICHAEL_MIC_FAILURE && self.countermeasures;
        let auto = self.opts.auto_reconnect || self.key_mgmt == KeyMgmt::WPS;
        if auto && !mic_hold {
            debug!("auto connect enabled: try to reconnect");
            if self.state >= WpaState::Associating {
                self.req_scan(RECONNECT_DELAY);
            }
        } else if !auto {
            debug!("auto connect disabled: do not try to re-connect");
            self.disconnected = true;
            self.reassociate = false;
            self.cancel_sched_scan();
        }

        let bssid = if self.bssid.is_zero() {
            self.pending_bssid
        } else {
            self.bssid
        };
        self.connection_failed(bssid);
        if mic_hold {
            debug!("TKIP countermeasures active - not reconnecting");
            self.cancel_scan();
        }
        self.collab.wpa.notify_disassoc();
        self.notify(Notification::Disconnected { bssid, reason });

        if dynamic_keys(self.key_mgmt, self.current_profile()) {
            debug!("disconnect event - remove keys");
            self.collab.driver.clear_keys();
        }
        self.mark_disassoc();

        if authenticating && self.caps.flags.contains(DriverFlags::SME) {
            if let Some(sme) = self.collab.sme.as_mut() {
                sme.disassoc_while_authenticating(prev_pending);
            }
        }
    }

    // ── Michael MIC failure ─────────────────────────────────────────

    pub(crate) fn mic_failure(&mut self, unicast: bool) {
        let now = self.now();
        self.notify(Notification::MichaelMicFailure);
        let pairwise = unicast;

        let in_window = self
            .mic
            .last
            .is_some_and(|last| now.saturating_sub(last) <= MIC_FAILURE_WINDOW);
        if in_window || self.mic.pending.is_some() {
            if let Some(pending_pairwise) = self.mic.pending.take() {
                self.timers.cancel(TimerKind::DelayedMicReport);
                self.collab.wpa.key_request(true, pending_pairwise);
            }
            self.collab.wpa.key_request(true, pairwise);
            self.countermeasures = true;
            self.notify(Notification::CountermeasuresStarted);
            if let Err(err) = self.collab.driver.set_countermeasures(true) {
                warn!(%err, "failed to enable TKIP countermeasures");
            }
            self.deauthenticate(ReasonCode::MICHAEL_MIC_FAILURE);
            self.timers
                .schedule(TimerKind::StopCountermeasures, COUNTERMEASURES_DURATION);
        } else if self.opts.delayed_mic_error_report && self.mic.seen > 0 {
            let delay = Duration::from_micros(rand::thread_rng().gen_range(0..60_000_000));
            debug!(?delay, "delay MIC failure report");
            self.mic.pending = Some(pairwise);
            self.timers.schedule(TimerKind::DelayedMicReport, delay);
        } else {
            self.collab.wpa.key_request(true, pairwise);
        }

        self.mic.last = Some(now);
        self.mic.seen = self.mic.seen.saturating_add(1);
    }

    pub(super) fn delayed_mic_report(&mut self) {
        if let Some(pairwise) = self.mic.pending.take() {
            debug!("sending pending MIC failure report");
            self.collab.wpa.key_request(true, pairwise);
        }
    }

    pub(super) fn stop_countermeasures(&mut self) {
        if !self.countermeasures {
            return;
        }
        self.countermeasures = false;
        if let Err(err) = self.collab.driver.set_countermeasures(false) {
            warn!(%err, "failed to disable TKIP countermeasures");
        }
        self.notify(Notification::CountermeasuresStopped);
        self.req_scan(Duration::ZERO);
    }

    // ── EAPOL ───────────────────────────────────────────────────────

    /// Deliver an EAPOL frame, holding it back if ASSOC has not yet
    /// been seen.
    pub(crate) fn rx_eapol(&mut self, src: MacAddr, data: Bytes) {
        if self.state < WpaState::Associated {
            debug!(%src, "not associated - delay processing of received EAPOL frame");
            self.pending_eapol = Some(PendingEapol {
                src,
                data,
                at: self.now(),
            });
            return;
        }
        if self.countermeasures {
            info!("countermeasures - dropped EAPOL packet");
            return;
        }

        let driver_psk = self.caps.flags.contains(DriverFlags::FOUR_WAY_HANDSHAKE)
            && self.key_mgmt.is_wpa_psk();
        let ibss = self.current_profile().is_some_and(|p| p.mode == OpMode::Ibss);
        if self.eapol_received == 0 && (!driver_psk || self.state != WpaState::Completed) && !ibss {
            let eap = self.key_mgmt.is_wpa_ieee8021x()
                || self.key_mgmt == KeyMgmt::IEEE8021X_NO_WPA
                || self.key_mgmt == KeyMgmt::WPS;
            self.req_auth_timeout(if eap { EAP_AUTH_TIMEOUT } else { AUTH_TIMEOUT });
        }
        self.eapol_received = self.eapol_received.saturating_add(1);
        self.collab.eapol.rx_eapol(src, &data);
    }

    // ── Interface status ────────────────────────────────────────────

    /// Returns true when this interface was just removed.
    pub(crate) fn interface_status(&mut self, ifname: &str, status: InterfaceStatusKind) -> bool {
        if ifname != self.opts.ifname {
            return false;
        }
        match status {
            InterfaceStatusKind::Added => {
                if !self.interface_removed {
                    return false;
                }
                debug!(ifname, "configured interface was added");
                self.interface_removed = false;
                self.reinit_driver();
                false
            }
            InterfaceStatusKind::Removed => {
                debug!(ifname, "configured interface was removed");
                self.interface_removed = true;
                self.mark_disassoc();
                self.set_state(WpaState::InterfaceDisabled);
                self.ibss_rsn_active = false;
                true
            }
        }
    }

    fn reinit_driver(&mut self) {
        match self.collab.driver.capabilities() {
            Ok(caps) => self.caps = caps,
            Err(err) => warn!(%err, "driver capabilities unavailable"),
        }
        self.hw_modes = self.collab.driver.hw_modes();
        self.set_state(WpaState::Disconnected);
        self.req_new_scan(RECONNECT_DELAY);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pairing_hash_binds_bssid() {
        let a = MacAddr::new([2, 0, 0, 0, 0, 1]);
        let b = MacAddr::new([2, 0, 0, 0, 0, 2]);
        assert_eq!(pairing_hash(b"pair", a), pairing_hash(b"pair", a));
        assert_ne!(pairing_hash(b"pair", a), pairing_hash(b"pair", b));
        assert_ne!(pairing_hash(b"pair", a), pairing_hash(b"other", a));
    }

    #[test]
    fn wpa_element_needs_full_prefix() {
        assert!(is_wpa_element(221, &[0x00, 0x50, 0xf2, 0x01, 0x01, 0x00, 0x00]));
        assert!(!is_wpa_element(221, &[0x00, 0x50, 0xf2, 0x04, 0x10]));
        assert!(is_rsn_element(48, &[0x01, 0x00]));
        assert!(!is_rsn_element(48, &[0x01]));
    }
}
