// ── Association driver ──
//
// Turning a selected (BSS, profile) pair into a driver association
// request, plus the bookkeeping around it: suite negotiation, the
// current-profile switch, blacklisting on failure, and finding the
// profile the driver actually associated with.

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::collab::{AssocParams, DriverCapabilities, DriverFlags};
use crate::error::CoreError;
use crate::ie::wpa::{ParsedSecurityIe, build_security_ie, parse_rsn_ie, parse_wpa_ie};
use crate::model::{
    AuthAlg, Cipher, EapolFlags, KeyMgmt, MacAddr, MfpPolicy, NetworkProfile, Notification,
    OpMode, ProfileId, Proto, RSN_CAP_MFPC, ScanResult, WpaState,
};
use crate::wps;

use super::{ASSOC_FAILED_TIMEOUT, AUTH_TIMEOUT, SCARD_RETRY, Station};

const RSN_CAP_MFPR: u16 = 1 << 6;

const GROUP_PREFERENCE: [Cipher; 4] = [Cipher::CCMP, Cipher::TKIP, Cipher::WEP104, Cipher::WEP40];
const PAIRWISE_PREFERENCE: [Cipher; 3] = [Cipher::CCMP, Cipher::TKIP, Cipher::NONE];
const KEY_MGMT_PREFERENCE: [KeyMgmt; 7] = [
    KeyMgmt::FT_IEEE8021X,
    KeyMgmt::FT_PSK,
    KeyMgmt::IEEE8021X_SHA256,
    KeyMgmt::PSK_SHA256,
    KeyMgmt::IEEE8021X,
    KeyMgmt::PSK,
    KeyMgmt::WPA_NONE,
];

/// Whether `key_mgmt` installs keys after association, so stale keys
/// must be cleared on every BSSID change.
pub fn dynamic_keys(key_mgmt: KeyMgmt, profile: Option<&NetworkProfile>) -> bool {
    if key_mgmt == KeyMgmt::NONE || key_mgmt == KeyMgmt::WPA_NONE {
        return false;
    }
    if key_mgmt == KeyMgmt::IEEE8021X_NO_WPA {
        return profile.is_some_and(|p| {
            p.eapol_flags
                .intersects(EapolFlags::REQUIRE_KEY_UNICAST | EapolFlags::REQUIRE_KEY_BROADCAST)
        });
    }
    true
}

/// Key management and ciphers for a profile that does not use WPA/RSN.
///
/// Static WEP ciphers follow the length of the first configured key.
pub fn non_wpa_policy(profile: &NetworkProfile) -> (KeyMgmt, Cipher, Cipher) {
    let key_mgmt = if profile.key_mgmt.contains(KeyMgmt::IEEE8021X_NO_WPA) {
        KeyMgmt::IEEE8021X_NO_WPA
    } else if profile.is_wps() {
        KeyMgmt::WPS
    } else {
        KeyMgmt::NONE
    };
    let cipher = profile
        .wep_keys
        .iter()
        .find(|k| !k.is_empty())
        .map_or(Cipher::NONE, |k| {
            if k.len() > 5 {
                Cipher::WEP104
            } else {
                Cipher::WEP40
            }
        });
    (key_mgmt, cipher, cipher)
}

fn pick<T: Copy + PartialEq>(order: &[T], allowed: impl Fn(T) -> bool) -> Option<T> {
    order.iter().copied().find(|c| allowed(*c))
}

/// Negotiate the suites for our own WPA/RSN element.
///
/// With `ap` the choice is the intersection of the profile and the
/// AP's advertisement; without it (driver-side selection) the profile
/// alone decides.
pub fn select_suites(
    profile: &NetworkProfile,
    ap: Option<&ParsedSecurityIe>,
) -> Result<ParsedSecurityIe, CoreError> {
    let rejected = |message: &str| CoreError::Rejected {
        message: message.to_owned(),
    };

    let (ap_proto, ap_group, ap_pairwise, ap_km, ap_caps) = match ap {
        Some(ie) => (ie.proto, ie.group, ie.pairwise, ie.key_mgmt, Some(ie.capabilities)),
        None => (Proto::all(), Cipher::all(), Cipher::all(), KeyMgmt::all(), None),
    };

    let proto = if profile.proto.contains(Proto::RSN) && ap_proto.contains(Proto::RSN) {
        Proto::RSN
    } else if profile.proto.contains(Proto::WPA) && ap_proto.contains(Proto::WPA) {
        Proto::WPA
    } else {
        return Err(rejected("no common WPA protocol version"));
    };

    let group = pick(&GROUP_PREFERENCE, |c| {
        profile.group.contains(c) && ap_group.contains(c)
    })
    .ok_or_else(|| rejected("failed to select group cipher"))?;
    let pairwise = pick(&PAIRWISE_PREFERENCE, |c| {
        profile.pairwise.contains(c) && ap_pairwise.contains(c)
    })
    .ok_or_else(|| rejected("failed to select pairwise cipher"))?;
    let key_mgmt = pick(&KEY_MGMT_PREFERENCE, |k| {
        profile.key_mgmt.contains(k) && ap_km.contains(k)
    })
    .ok_or_else(|| rejected("failed to select key management"))?;

    let mut capabilities = 0;
    let mut mgmt_group = None;
    if proto == Proto::RSN && profile.ieee80211w != MfpPolicy::Disabled {
        let ap_mfpc = ap_caps.is_none_or(|caps| caps & RSN_CAP_MFPC != 0);
        if ap_mfpc {
            capabilities |= RSN_CAP_MFPC;
            mgmt_group = Some(Cipher::AES_128_CMAC);
            if profile.ieee80211w == MfpPolicy::Required {
                capabilities |= RSN_CAP_MFPR;
            }
        } else if profile.ieee80211w == MfpPolicy::Required {
            return Err(rejected("management frame protection required but not supported by AP"));
        }
    }

    debug!(?proto, ?group, ?pairwise, ?key_mgmt, "WPA suites selected");
    Ok(ParsedSecurityIe {
        proto,
        group,
        pairwise,
        key_mgmt,
        capabilities,
        pmkids: Vec::new(),
        mgmt_group,
    })
}

fn ap_security_ie(bss: &ScanResult) -> Option<ParsedSecurityIe> {
    bss.rsn_ie()
        .and_then(|e| parse_rsn_ie(e.body).ok())
        .or_else(|| bss.wpa_ie().and_then(|e| parse_wpa_ie(e.body).ok()))
}

impl Station {
    /// Associate with `results[idx]` for profile `id` unless that
    /// association is already underway.
    pub(crate) fn connect(
        &mut self,
        results: &[ScanResult],
        idx: usize,
        id: ProfileId,
    ) -> Result<(), CoreError> {
        let bss = results.get(idx).ok_or(CoreError::BssNotFound {
            bssid: MacAddr::ZERO,
        })?;
        let profile = self
            .store
            .get(id)
            .ok_or(CoreError::ProfileNotFound { id: id.0 })?;

        let overlap_check = !(self.opts.wps.allow_pbc_overlap && self.wps.only_preferred);
        if overlap_check && wps::scan::scan_pbc_overlap(results, idx, profile) {
            self.pbc_overlap_detected();
            return Err(CoreError::Rejected {
                message: "PBC session overlap".into(),
            });
        }

        let pending_other = !self.state.is_connecting() || bss.bssid != self.pending_bssid;
        if !self.reassociate && (bss.bssid == self.bssid || !pending_other) {
            debug!(bssid = %bss.bssid, "already associated with the selected AP");
            return Ok(());
        }

        if profile.eap.needs_smartcard() {
            if let Some(scard) = self.collab.scard.as_mut() {
                if let Err(err) = scard.init(profile) {
                    warn!(%err, "smartcard initialization failed - retry later");
                    self.req_new_scan(SCARD_RETRY);
                    return Ok(());
                }
            }
        }
        self.associate(Some(bss), id);
        Ok(())
    }

    /// Issue an association request for profile `id`, optionally to a
    /// specific BSS.
    pub fn associate(&mut self, bss: Option<&ScanResult>, id: ProfileId) {
        let Some(profile) = self.store.get(id).cloned() else {
            warn!(%id, "associate: unknown profile");
            return;
        };

        if profile.mode == OpMode::Ap {
            self.start_ap_mode(bss, id);
            return;
        }

        self.reassociate = false;
        match bss {
            Some(b) => self.notify(Notification::Trying {
                bssid: b.bssid,
                ssid: b.ssid_text(),
                freq: b.freq,
            }),
            None => info!(ssid = %profile.ssid_text(), "trying to associate with SSID"),
        }
        self.cancel_sched_scan();
        self.cancel_scan();

        let ap_ie = bss.and_then(ap_security_ie);
        let wants_wpa = profile.key_mgmt.is_wpa() || profile.key_mgmt.contains(KeyMgmt::WPA_NONE);
        let (key_mgmt, proto, pairwise, group, wpa_ie) =
            if wants_wpa && (bss.is_none() || ap_ie.is_some()) {
                let suites = match select_suites(&profile, ap_ie.as_ref()) {
                    Ok(s) => s,
                    Err(err) => {
                        warn!(%err, "failed to select WPA/RSN suites");
                        return;
                    }
                };
                let ie = build_security_ie(&suites);
                self.collab.wpa.set_assoc_wpa_ie(Some(&ie));
                (suites.key_mgmt, suites.proto, suites.pairwise, suites.group, ie)
            } else {
                let (km, pairwise, group) = non_wpa_policy(&profile);
                self.collab.wpa.set_assoc_wpa_ie(None);
                (km, Proto::empty(), pairwise, group, Vec::new())
            };
        self.key_mgmt = key_mgmt;
        self.eapol_received = 0;
        self.pairwise_cipher = pairwise;
        self.group_cipher = group;

        let params = AssocParams {
            bssid: bss.map(|b| b.bssid),
            ssid: bss.map_or_else(|| profile.ssid.clone(), |b| b.ssid().to_vec()),
            freq: bss.map_or(0, |b| b.freq),
            profile: id,
            mode: profile.mode,
            key_mgmt,
            proto,
            pairwise,
            group,
            auth_alg: if profile.auth_alg.is_empty() {
                AuthAlg::OPEN
            } else {
                profile.auth_alg
            },
            wpa_ie,
        };

        let connecting = if self.caps.flags.contains(DriverFlags::SME) {
            WpaState::Authenticating
        } else {
            WpaState::Associating
        };
        self.set_state(connecting);
        self.pending_bssid = params.bssid.unwrap_or(MacAddr::ZERO);

        let timeout = match self.collab.driver.associate(&params) {
            Ok(()) => AUTH_TIMEOUT,
            Err(err) => {
                warn!(%err, "association request to the driver failed");
                ASSOC_FAILED_TIMEOUT
            }
        };
        if key_mgmt != KeyMgmt::WPA_NONE {
            self.req_auth_timeout(timeout);
        }

        self.current_bss = bss.cloned();
        self.set_current(id, &profile);
    }

    fn start_ap_mode(&mut self, bss: Option<&ScanResult>, id: ProfileId) {
        if !self.caps.flags.contains(DriverFlags::AP) || self.collab.ap.is_none() {
            warn!(%id, "driver does not support AP mode");
            return;
        }
        info!(%id, "starting AP mode");
        self.ap_mode = true;
        self.current_bss = bss.cloned();
        if let Some(profile) = self.store.get(id).cloned() {
            self.set_current(id, &profile);
        }
        self.set_state(WpaState::Completed);
    }

    fn set_current(&mut self, id: ProfileId, profile: &NetworkProfile) {
        let changed = self.current != Some(id);
        self.current = Some(id);
        self.collab.wpa.set_config(Some(profile));
        self.collab.eapol.set_config(Some(profile));
        if changed {
            self.collab.eapol.invalidate_cached_session();
            self.notify(Notification::NetworkChanged { id: Some(id) });
        }
    }

    /// Find the profile matching the BSS the driver associated with and
    /// make it current.
    pub(crate) fn select_config(&mut self) -> Result<ProfileId, CoreError> {
        let bssid = self.bssid;
        let ssid = match self.collab.driver.get_ssid() {
            Ok(ssid) => ssid,
            Err(err) => {
                debug!(%err, "driver SSID unavailable - using scan cache");
                self.last_scan
                    .iter()
                    .find(|r| r.bssid == bssid)
                    .map(|r| r.ssid().to_vec())
                    .or_else(|| self.current_profile().map(|p| p.ssid.clone()))
                    .unwrap_or_default()
            }
        };

        let matches = |p: &NetworkProfile| {
            !p.is_disabled()
                && (p.ssid == ssid || (p.ssid.is_empty() && p.is_wps()))
                && p.bssid.is_none_or(|pin| pin == bssid)
        };
        let found = self
            .current
            .filter(|id| self.store.get(*id).is_some_and(matches))
            .or_else(|| {
                self.store
                    .iter()
                    .find(|(_, p)| matches(p))
                    .map(|(id, _)| id)
            });

        let Some(id) = found else {
            self.notify(Notification::NoNetworkConfig);
            return Err(CoreError::Rejected {
                message: "no network configuration for the current AP".into(),
            });
        };
        if let Some(profile) = self.store.get(id).cloned() {
            self.set_current(id, &profile);
        }
        Ok(id)
    }

    /// Blacklist `bssid` after a failed attempt and schedule a rescan
    /// with a delay that grows with the failure count.
    pub(crate) fn connection_failed(&mut self, bssid: MacAddr) {
        self.cancel_auth_timeout();
        if bssid.is_zero() {
            return;
        }
        let mut count = self.blacklist.add(bssid);
        if count == 1 && self.another_bss_in_ess(bssid) {
            debug!(%bssid, "another BSS in this ESS has been seen; try it next");
            count = self.blacklist.add(bssid);
        }
        let delay = match count {
            1 => Duration::from_millis(100),
            2 => Duration::from_millis(500),
            3 => Duration::from_secs(1),
            _ => Duration::from_secs(5),
        };
        debug!(%bssid, count, ?delay, "connection failed");
        self.req_scan(delay);
    }

    fn another_bss_in_ess(&self, bssid: MacAddr) -> bool {
        let Some(current) = self.current_bss.as_ref() else {
            return false;
        };
        let ssid = current.ssid();
        self.last_scan
            .iter()
            .any(|r| r.bssid != bssid && r.ssid() == ssid && !self.blacklist.contains(r.bssid))
    }

    /// Point the PMKSA cache at a PMKID we put in our association
    /// request, if it is still cached.
    pub(crate) fn find_assoc_pmkid(&mut self) {
        let Ok(own) = self.collab.wpa.parse_own_wpa_ie() else {
            return;
        };
        if own.pmkids.is_empty() {
            return;
        }
        let found = own.pmkids.iter().any(|p| self.collab.wpa.pmksa_set_current(p));
        if found {
            self.collab.eapol.notify_pmkid_attempt();
        }
        debug!(
            "RSN: PMKID from assoc IE {}found from PMKSA cache",
            if found { "" } else { "not " }
        );
    }

    pub(crate) fn driver_caps(&self) -> &DriverCapabilities {
        &self.caps
    }
}
