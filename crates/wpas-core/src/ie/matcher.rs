// ── Profile/BSS security matcher ──
//
// Pure checks of one scanned BSS against one network profile. RSN is
// tried before the legacy WPA vendor element, and a WEP group cipher
// inside either is accepted for WEP-only profiles (TSN).

use tracing::debug;

use crate::model::{
    Cipher, EapolFlags, HwMode, HwModeKind, KeyMgmt, MacAddr, MfpPolicy, NetworkProfile, Proto,
    RSN_CAP_MFPC, ScanResult,
};
use crate::wps;

use super::wpa::{parse_rsn_ie, parse_wpa_ie};
use super::{EID_EXT_SUPP_RATES, EID_SUPP_RATES};

/// BSS membership selector for "HT PHY required".
const BSS_MEMBERSHIP_SELECTOR_HT_PHY: u8 = 127;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchOutcome {
    Match,
    NoMatch,
}

/// Matcher verdict plus the reason it was reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IeMatch {
    pub outcome: MatchOutcome,
    pub reason: &'static str,
}

impl IeMatch {
    pub const fn matched(reason: &'static str) -> Self {
        Self {
            outcome: MatchOutcome::Match,
            reason,
        }
    }

    pub const fn rejected(reason: &'static str) -> Self {
        Self {
            outcome: MatchOutcome::NoMatch,
            reason,
        }
    }

    pub fn is_match(&self) -> bool {
        self.outcome == MatchOutcome::Match
    }
}

/// Station facts the WPS side of matching depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchContext {
    pub own_addr: MacAddr,
    /// Scans run since the current WPS session started.
    pub scan_runs: u32,
    /// After this many scans a PIN enrollee stops insisting on an
    /// active registrar.
    pub pin_scan_ignore_sel_reg: u32,
}

impl MatchContext {
    pub fn new(own_addr: MacAddr) -> Self {
        Self {
            own_addr,
            scan_runs: 0,
            pin_scan_ignore_sel_reg: wps::PIN_SCAN_IGNORE_SEL_REG,
        }
    }
}

enum Element {
    Rsn,
    Wpa,
}

impl Element {
    fn proto(&self) -> Proto {
        match self {
            Self::Rsn => Proto::RSN,
            Self::Wpa => Proto::WPA,
        }
    }
}

/// Check one element. `None` means "keep looking" (the caller moves on
/// to the next element); `Some` is final.
fn match_element(
    kind: &Element,
    body: &[u8],
    profile: &NetworkProfile,
    wep_ok: bool,
) -> Option<IeMatch> {
    let (parsed, label) = match kind {
        Element::Rsn => (parse_rsn_ie(body), "RSN"),
        Element::Wpa => (parse_wpa_ie(body), "WPA"),
    };
    let Ok(ie) = parsed else {
        debug!("   skip {label} IE - parse failed");
        return None;
    };

    if wep_ok && ie.group.intersects(Cipher::WEP40 | Cipher::WEP104) {
        return Some(IeMatch::matched(match kind {
            Element::Rsn => "selected based on TSN in RSN IE",
            Element::Wpa => "selected based on TSN in WPA IE",
        }));
    }
    if !ie.proto.intersects(profile.proto) {
        debug!("   skip {label} IE - proto mismatch");
        return None;
    }
    if !ie.pairwise.intersects(profile.pairwise) {
        debug!("   skip {label} IE - PTK cipher mismatch");
        return None;
    }
    if !ie.group.intersects(profile.group) {
        debug!("   skip {label} IE - GTK cipher mismatch");
        return None;
    }
    if !ie.key_mgmt.intersects(profile.key_mgmt) {
        debug!("   skip {label} IE - key mgmt mismatch");
        return None;
    }
    if matches!(kind, Element::Rsn)
        && ie.capabilities & RSN_CAP_MFPC == 0
        && profile.ieee80211w == MfpPolicy::Required
    {
        debug!("   skip RSN IE - no mgmt frame protection");
        return None;
    }
    Some(IeMatch::matched(match kind {
        Element::Rsn => "selected based on RSN IE",
        Element::Wpa => "selected based on WPA IE",
    }))
}

/// Decide whether `bss`'s security elements satisfy `profile`.
///
/// WPS profiles are judged by the WPS element first; the generic
/// RSN/WPA rules apply only when WPS has no opinion.
pub fn ssid_bss_match(profile: &NetworkProfile, bss: &ScanResult, ctx: &MatchContext) -> IeMatch {
    if let Some(verdict) = wps::scan::ssid_bss_match(profile, bss, ctx) {
        return verdict;
    }

    let km = profile.key_mgmt;
    let wep_ok = !km.is_wpa()
        && ((km.contains(KeyMgmt::NONE) && profile.tx_wep_key_len() > 0)
            || km.contains(KeyMgmt::IEEE8021X_NO_WPA));

    let mut proto_match = 0_u32;
    let candidates = [
        (Element::Rsn, bss.rsn_ie().map(|e| e.body)),
        (Element::Wpa, bss.wpa_ie().map(|e| e.body)),
    ];
    for (kind, body) in &candidates {
        let Some(body) = body else { continue };
        if !profile.proto.intersects(kind.proto()) {
            continue;
        }
        proto_match += 1;
        if let Some(verdict) = match_element(kind, body, profile, wep_ok) {
            return verdict;
        }
    }

    if profile.proto.intersects(Proto::WPA | Proto::RSN) && km.is_wpa() && proto_match == 0 {
        return IeMatch::rejected("skip - no WPA/RSN proto match");
    }
    if !km.is_wpa() {
        return IeMatch::matched("allow in non-WPA/WPA2");
    }
    IeMatch::rejected("reject due to mismatch with WPA/WPA2")
}

/// The BSS privacy bit must agree with whether the profile encrypts.
pub fn match_privacy(bss: &ScanResult, profile: &NetworkProfile) -> bool {
    if profile.mixed_cell || profile.is_wps() {
        return true;
    }
    let privacy = profile.has_wep_key()
        || (profile.key_mgmt.contains(KeyMgmt::IEEE8021X_NO_WPA)
            && profile
                .eapol_flags
                .intersects(EapolFlags::REQUIRE_KEY_UNICAST | EapolFlags::REQUIRE_KEY_BROADCAST))
        || profile.key_mgmt.is_wpa();
    bss.privacy() == privacy
}

pub fn freq_allowed(freq_list: &[u32], freq: u32) -> bool {
    freq_list.is_empty() || freq_list.contains(&freq)
}

/// Every basic rate the BSS requires must be supported by the radio
/// mode covering its channel.
pub fn rate_match(bss: &ScanResult, modes: &[HwMode]) -> bool {
    if bss.freq == 0 || modes.is_empty() {
        return true;
    }

    let mut mode: Option<&HwMode> = None;
    for candidate in modes {
        if !candidate.channels.contains(&bss.freq) {
            continue;
        }
        // 802.11b never replaces 802.11g for the same channel.
        if mode.is_some_and(|m| m.mode == HwModeKind::G) {
            continue;
        }
        mode = Some(candidate);
    }
    let Some(mode) = mode else {
        debug!(freq = bss.freq, "   no hardware mode covers the BSS channel");
        return false;
    };

    for id in [EID_SUPP_RATES, EID_EXT_SUPP_RATES] {
        let Some(elem) = bss.ie(id) else { continue };
        for &byte in elem.body {
            if byte & 0x80 == 0 {
                continue;
            }
            let value = byte & 0x7f;
            if value == BSS_MEMBERSHIP_SELECTOR_HT_PHY {
                if !mode.ht_supported() {
                    debug!("   hardware does not support HT PHY");
                    return false;
                }
                continue;
            }
            let rate = u32::from(value) * 5;
            if !mode.rates.contains(&rate) {
                debug!(
                    "   hardware does not support required rate {}.{} Mbps",
                    rate / 10,
                    rate % 10
                );
                return false;
            }
        }
    }
    true
}
