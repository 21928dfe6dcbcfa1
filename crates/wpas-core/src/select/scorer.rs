// ── Candidate scorer ──
//
// Decides whether one (BSS, profile) pair is eligible. The checks run in
// a fixed order and the first failure names the reason.

use serde::Serialize;
use tracing::debug;

use crate::ie::matcher::{freq_allowed, match_privacy, rate_match, ssid_bss_match};
use crate::model::{KeyMgmt, MacAddr, NetworkProfile, ProfileId, ScanResult};
use crate::wps;

use super::SelectContext;

/// BSS-level gate applied before any profile is looked at.
pub fn check_bss(ctx: &SelectContext<'_>, bss: &ScanResult) -> Result<(), &'static str> {
    let count = ctx.blacklist.count(bss.bssid);
    if count > 0 && count >= ctx.blacklist_fail_max {
        return Err("skip - blacklisted");
    }
    if bss.ssid().is_empty() && !ctx.wps_in_progress() {
        return Err("skip - SSID not known");
    }
    Ok(())
}

/// Profile-level checks; `Ok` carries the matcher's reason.
pub fn check_profile(
    ctx: &SelectContext<'_>,
    bss: &ScanResult,
    profile: &NetworkProfile,
) -> Result<&'static str, &'static str> {
    let wpa = bss.wpa_ie().is_some() || bss.rsn_ie().is_some();
    let mut check_ssid = wpa || !profile.ssid.is_empty();

    if profile.is_disabled() {
        return Err("skip - disabled");
    }
    if profile.is_wps() && ctx.blacklist.count(bss.bssid) > 0 {
        return Err("skip - blacklisted (WPS)");
    }
    if wpa && profile.ssid.is_empty() && wps::scan::wildcard_ok(profile, bss, &ctx.matching) {
        check_ssid = false;
    }
    if !wpa && profile.is_wps() {
        // Wildcard SSID only when the AP advertises WPS activity that
        // fits our mode.
        check_ssid = true;
        if profile.ssid.is_empty() && wps::scan::wildcard_ok(profile, bss, &ctx.matching) {
            check_ssid = false;
        }
    }
    if profile.ssid.is_empty() && profile.bssid == Some(bss.bssid) {
        check_ssid = false;
    }

    if check_ssid && bss.ssid() != profile.ssid.as_slice() {
        return Err("skip - SSID mismatch");
    }
    if profile.bssid.is_some_and(|pin| pin != bss.bssid) {
        return Err("skip - BSSID mismatch");
    }

    let verdict = ssid_bss_match(profile, bss, &ctx.matching);
    if !verdict.is_match() {
        return Err(verdict.reason);
    }

    if !wpa
        && !profile
            .key_mgmt
            .intersects(KeyMgmt::NONE | KeyMgmt::WPS | KeyMgmt::IEEE8021X_NO_WPA)
    {
        return Err("skip - non-WPA network not allowed");
    }
    if !match_privacy(bss, profile) {
        return Err("skip - privacy mismatch");
    }
    if bss.is_ibss() {
        return Err("skip - IBSS (adhoc) network");
    }
    if !freq_allowed(&profile.freq_list, bss.freq) {
        return Err("skip - frequency not allowed");
    }
    if !rate_match(bss, ctx.hw_modes) {
        return Err("skip - rate sets do not match");
    }
    Ok(verdict.reason)
}

/// First profile of `group` that `bss` satisfies.
pub fn scan_res_match(
    ctx: &SelectContext<'_>,
    index: usize,
    bss: &ScanResult,
    group: &[ProfileId],
) -> Option<ProfileId> {
    debug!(
        "{index}: {} ssid='{}' wpa_ie={} rsn_ie={} caps={:#x} level={}{}",
        bss.bssid,
        bss.ssid_text(),
        bss.wpa_ie().is_some(),
        bss.rsn_ie().is_some(),
        bss.caps.bits(),
        bss.level,
        if bss.has_wps_ie() { " wps" } else { "" }
    );

    if let Err(reason) = check_bss(ctx, bss) {
        debug!("   {reason}");
        return None;
    }
    for &id in group {
        let Some(profile) = ctx.store.get(id) else {
            continue;
        };
        match check_profile(ctx, bss, profile) {
            Ok(reason) => {
                debug!(profile = %id, "   {reason}");
                return Some(id);
            }
            Err(reason) => debug!(profile = %id, "   {reason}"),
        }
    }
    None
}

// ── Candidate table ─────────────────────────────────────────────────

/// One evaluated (BSS, profile) pair, for reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Candidate {
    pub bssid: MacAddr,
    pub ssid: String,
    pub level: i32,
    pub freq: u32,
    pub profile: Option<ProfileId>,
    pub eligible: bool,
    pub reason: String,
}

/// Evaluate every BSS against every profile without selecting.
pub fn evaluate(ctx: &SelectContext<'_>, results: &[ScanResult]) -> Vec<Candidate> {
    let mut out = Vec::new();
    for bss in results {
        let row = |profile: Option<ProfileId>, eligible: bool, reason: &str| Candidate {
            bssid: bss.bssid,
            ssid: bss.ssid_text(),
            level: bss.level,
            freq: bss.freq,
            profile,
            eligible,
            reason: reason.to_owned(),
        };
        if let Err(reason) = check_bss(ctx, bss) {
            out.push(row(None, false, reason));
            continue;
        }
        for (id, profile) in ctx.store.iter() {
            match check_profile(ctx, bss, profile) {
                Ok(reason) => out.push(row(Some(id), true, reason)),
                Err(reason) => out.push(row(Some(id), false, reason)),
            }
        }
    }
    out
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::blacklist::Blacklist;
    use crate::ie::matcher::MatchContext;
    use crate::ie::wpa::{ParsedSecurityIe, build_security_ie};
    use crate::model::{BssCaps, Cipher, Proto, ScanResultBuilder};
    use crate::store::ProfileStore;
    use pretty_assertions::assert_eq;

    fn addr(n: u8) -> MacAddr {
        MacAddr::new([2, 0, 0, 0, 0, n])
    }

    fn rsn_psk() -> Vec<u8> {
        build_security_ie(&ParsedSecurityIe {
            proto: Proto::RSN,
            group: Cipher::CCMP,
            pairwise: Cipher::CCMP,
            key_mgmt: KeyMgmt::PSK,
            ..ParsedSecurityIe::default()
        })
    }

    fn ctx<'a>(store: &'a ProfileStore, bl: &'a Blacklist) -> SelectContext<'a> {
        SelectContext {
            store,
            blacklist: bl,
            hw_modes: &[],
            matching: MatchContext::new(addr(0x10)),
            blacklist_fail_max: 2,
        }
    }

    #[test]
    fn ssid_mismatch_is_reported() {
        let store = ProfileStore::from_profiles([NetworkProfile::wpa2_psk("home", "password1")]);
        let bl = Blacklist::new();
        let bss = ScanResultBuilder::new(addr(1), 2412, -40)
            .ssid("work")
            .privacy()
            .element(&rsn_psk())
            .build();
        let profile = store.get(ProfileId(0)).unwrap();
        assert_eq!(
            check_profile(&ctx(&store, &bl), &bss, profile),
            Err("skip - SSID mismatch")
        );
    }

    #[test]
    fn ibss_is_never_eligible() {
        let store = ProfileStore::from_profiles([NetworkProfile::open("adhoc")]);
        let bl = Blacklist::new();
        let bss = ScanResultBuilder::new(addr(1), 2412, -40)
            .ssid("adhoc")
            .caps(BssCaps::IBSS)
            .build();
        assert_eq!(
            scan_res_match(&ctx(&store, &bl), 0, &bss, &[ProfileId(0)]),
            None
        );
    }

    #[test]
    fn blacklist_limit_gates_bss() {
        let store = ProfileStore::from_profiles([NetworkProfile::open("lab")]);
        let mut bl = Blacklist::new();
        let bss = ScanResultBuilder::new(addr(1), 2412, -40).ssid("lab").build();
        bl.add(bss.bssid);
        assert!(check_bss(&ctx(&store, &bl), &bss).is_ok());
        bl.add(bss.bssid);
        assert_eq!(check_bss(&ctx(&store, &bl), &bss), Err("skip - blacklisted"));
    }

    #[test]
    fn hidden_ssid_needs_wps() {
        let store = ProfileStore::from_profiles([NetworkProfile::open("lab")]);
        let bl = Blacklist::new();
        let bss = ScanResultBuilder::new(addr(1), 2412, -40).build();
        assert_eq!(check_bss(&ctx(&store, &bl), &bss), Err("skip - SSID not known"));
    }

    #[test]
    fn evaluate_lists_every_pair() {
        let store = ProfileStore::from_profiles([
            NetworkProfile::open("lab"),
            NetworkProfile::wpa2_psk("lab", "password1"),
        ]);
        let bl = Blacklist::new();
        let bss = ScanResultBuilder::new(addr(1), 2412, -40).ssid("lab").build();
        let rows = evaluate(&ctx(&store, &bl), &[bss]);
        assert_eq!(rows.len(), 2);
        assert!(rows[0].eligible);
        assert!(!rows[1].eligible);
    }
}
