// ── Scan-time WPS checks ──

use tracing::{debug, info, warn};

use crate::ie::matcher::{IeMatch, MatchContext};
use crate::model::{NetworkProfile, ScanResult, WpsAvailability};

/// WPS opinion on a (profile, BSS) pair. `None` defers to the RSN/WPA
/// matcher.
pub fn ssid_bss_match(
    profile: &NetworkProfile,
    bss: &ScanResult,
    ctx: &MatchContext,
) -> Option<IeMatch> {
    if !profile.is_wps() {
        return None;
    }
    let wps = bss.wps_ie();

    if profile.eap.is_wps_pbc_enrollee() {
        let Some(wps) = wps else {
            return Some(IeMatch::rejected("skip - non-WPS AP"));
        };
        if !wps.is_selected_pbc_registrar() {
            return Some(IeMatch::rejected(
                "skip - WPS AP without active PBC Registrar",
            ));
        }
        return Some(IeMatch::matched("selected based on WPS IE (Active PBC)"));
    }

    if profile.eap.is_wps_pin_enrollee() {
        let Some(wps) = wps else {
            return Some(IeMatch::rejected("skip - non-WPS AP"));
        };
        if wps.is_addr_authorized(ctx.own_addr, true) {
            return Some(IeMatch::matched(
                "selected based on WPS IE (Authorized MAC or Active PIN)",
            ));
        }
        if ctx.scan_runs < ctx.pin_scan_ignore_sel_reg {
            return Some(IeMatch::rejected(
                "skip - WPS AP without active PIN Registrar",
            ));
        }
        warn!(
            bssid = %bss.bssid,
            scan_runs = ctx.scan_runs,
            "accepting WPS AP without an active PIN registrar"
        );
        return Some(IeMatch::matched("selected based on WPS IE"));
    }

    wps.map(|_| IeMatch::matched("selected based on WPS IE"))
}

/// Whether a WPS enrollee may match `bss` with a wildcard SSID.
pub fn wildcard_ok(profile: &NetworkProfile, bss: &ScanResult, ctx: &MatchContext) -> bool {
    let ok = if profile.eap.is_wps_pbc_enrollee() {
        bss.wps_ie().is_some_and(|w| w.is_selected_pbc_registrar())
    } else if profile.eap.is_wps_pin_enrollee() {
        bss.wps_ie().is_some_and(|w| {
            w.is_addr_authorized(ctx.own_addr, true)
                || ctx.scan_runs >= ctx.pin_scan_ignore_sel_reg
        })
    } else {
        false
    };
    ok || profile.bssid == Some(bss.bssid)
}

/// Whether a BSS other than `results[selected]` runs an active PBC
/// registrar for a different device.
///
/// Two BSSes sharing a UUID are one multi-radio AP and do not overlap.
pub fn scan_pbc_overlap(results: &[ScanResult], selected: usize, profile: &NetworkProfile) -> bool {
    if !profile.eap.is_wps_pbc_enrollee() {
        return false;
    }
    let Some(chosen) = results.get(selected) else {
        return false;
    };
    debug!(bssid = %chosen.bssid, "checking for PBC session overlap");
    let sel_uuid = chosen.wps_ie().and_then(|w| w.uuid_e);
    if sel_uuid.is_none() {
        debug!("selected BSS has no WPS UUID");
    }

    for (i, bss) in results.iter().enumerate() {
        if i == selected {
            continue;
        }
        let Some(wps) = bss.wps_ie() else { continue };
        if !wps.is_selected_pbc_registrar() {
            continue;
        }
        debug!(bssid = %bss.bssid, "another BSS in active PBC mode");
        let same_device = matches!((sel_uuid, wps.uuid_e), (Some(a), Some(b)) if a == b);
        if same_device {
            info!("no PBC overlap - same UUID");
        } else if bss.bssid != chosen.bssid {
            info!("WPS: PBC overlap detected: {} and {}", chosen.bssid, bss.bssid);
            return true;
        }
    }
    false
}

/// Strongest WPS advertisement among `results`, if any.
pub fn availability(results: &[ScanResult], ctx: &MatchContext) -> Option<WpsAvailability> {
    let (mut pbc, mut auth, mut pin, mut any) = (0_u32, 0_u32, 0_u32, 0_u32);
    for wps in results.iter().filter_map(ScanResult::wps_ie) {
        if wps.is_selected_pbc_registrar() {
            pbc += 1;
        } else if wps.is_addr_authorized(ctx.own_addr, false) {
            auth += 1;
        } else if wps.is_selected_pin_registrar() {
            pin += 1;
        } else {
            any += 1;
        }
    }
    if pbc > 0 {
        Some(WpsAvailability::Pbc)
    } else if auth > 0 {
        Some(WpsAvailability::Auth)
    } else if pin > 0 {
        Some(WpsAvailability::Pin)
    } else if any > 0 {
        Some(WpsAvailability::Any)
    } else {
        None
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::ie::WpsIe;
    use crate::ie::wps::{DEV_PW_DEFAULT, DEV_PW_PUSHBUTTON};
    use crate::model::{
        EapConfig, EapMethod, KeyMgmt, MacAddr, ScanResultBuilder, WPS_ENROLLEE_IDENTITY,
    };

    fn addr(n: u8) -> MacAddr {
        MacAddr::new([2, 0, 0, 0, 0, n])
    }

    fn enrollee(phase1: &str) -> NetworkProfile {
        NetworkProfile {
            key_mgmt: KeyMgmt::WPS,
            eap: EapConfig {
                methods: vec![EapMethod::Wsc],
                identity: Some(WPS_ENROLLEE_IDENTITY.into()),
                phase1: Some(phase1.into()),
                fragment_size: None,
            },
            ..NetworkProfile::default()
        }
    }

    fn wps_bss(n: u8, pw_id: u16, selected: bool, uuid: u8) -> ScanResult {
        let ie = WpsIe {
            version: Some(0x10),
            selected_registrar: selected,
            dev_password_id: Some(pw_id),
            uuid_e: Some([uuid; 16]),
            ..WpsIe::default()
        };
        ScanResultBuilder::new(addr(n), 2437, -50)
            .ssid("ap")
            .element(&ie.to_element())
            .build()
    }

    #[test]
    fn distinct_pbc_registrars_overlap() {
        let results = [
            wps_bss(1, DEV_PW_PUSHBUTTON, true, 0xaa),
            wps_bss(2, DEV_PW_PUSHBUTTON, true, 0xbb),
        ];
        assert!(scan_pbc_overlap(&results, 0, &enrollee("pbc=1")));
    }

    #[test]
    fn same_uuid_is_one_device() {
        let results = [
            wps_bss(1, DEV_PW_PUSHBUTTON, true, 0xaa),
            wps_bss(2, DEV_PW_PUSHBUTTON, true, 0xaa),
        ];
        assert!(!scan_pbc_overlap(&results, 0, &enrollee("pbc=1")));
    }

    #[test]
    fn pin_enrollee_relaxes_after_scans() {
        let bss = wps_bss(1, DEV_PW_DEFAULT, false, 0xaa);
        let profile = enrollee("pin=12345670");
        let mut ctx = MatchContext::new(addr(9));
        assert!(!ssid_bss_match(&profile, &bss, &ctx).unwrap().is_match());
        assert!(!wildcard_ok(&profile, &bss, &ctx));
        ctx.scan_runs = 3;
        assert!(ssid_bss_match(&profile, &bss, &ctx).unwrap().is_match());
        assert!(wildcard_ok(&profile, &bss, &ctx));
    }

    #[test]
    fn pbc_enrollee_needs_active_registrar() {
        let ctx = MatchContext::new(addr(9));
        let idle = wps_bss(1, DEV_PW_PUSHBUTTON, false, 0xaa);
        let verdict = ssid_bss_match(&enrollee("pbc=1"), &idle, &ctx).unwrap();
        assert_eq!(verdict.reason, "skip - WPS AP without active PBC Registrar");
    }

    #[test]
    fn non_wps_profile_defers() {
        let bss = wps_bss(1, DEV_PW_PUSHBUTTON, true, 0xaa);
        let ctx = MatchContext::new(addr(9));
        assert!(ssid_bss_match(&NetworkProfile::open("ap"), &bss, &ctx).is_none());
    }

    #[test]
    fn availability_prefers_pbc() {
        let ctx = MatchContext::new(addr(9));
        let results = [
            wps_bss(1, DEV_PW_DEFAULT, true, 1),
            wps_bss(2, DEV_PW_PUSHBUTTON, true, 2),
        ];
        assert_eq!(availability(&results, &ctx), Some(WpsAvailability::Pbc));
        assert_eq!(availability(&results[..1], &ctx), Some(WpsAvailability::Pin));
        assert_eq!(availability(&[], &ctx), None);
    }
}
