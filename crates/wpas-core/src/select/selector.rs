// ── Priority-group selector ──
//
// Walks priority groups highest first and, within a group, scan results
// in the order the driver reported them. The first eligible pair wins.

use tracing::{debug, info};

use crate::blacklist::Blacklist;
use crate::ie::matcher::MatchContext;
use crate::model::{HwMode, OpMode, ProfileId, ScanResult};
use crate::store::ProfileStore;

use super::SelectContext;
use super::scorer::scan_res_match;

/// Everything `pick_network` needs besides the blacklist it may clear.
#[derive(Debug, Clone, Copy)]
pub struct PickParams<'a> {
    pub store: &'a ProfileStore,
    pub hw_modes: &'a [HwMode],
    pub matching: MatchContext,
    pub blacklist_fail_max: u32,
    /// When set, BSSes carrying this vendor extension in their WPS
    /// element are tried first, and PBC overlap among them is tolerated.
    pub preferred_wps_oui: Option<[u8; 3]>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PickOutcome {
    /// Index into the scan results and the matching profile.
    pub selected: Option<(usize, ProfileId)>,
    /// Selection came from the preferred-vendor subset.
    pub only_preferred: bool,
    /// Times the blacklist was wiped to let WPS retry.
    pub blacklist_cleared: u32,
}

/// First BSS (in scan order) that matches a profile from `group`.
pub fn select_bss<'r>(
    ctx: &SelectContext<'_>,
    results: impl IntoIterator<Item = (usize, &'r ScanResult)>,
    group: &[ProfileId],
) -> Option<(usize, ProfileId)> {
    results
        .into_iter()
        .find_map(|(i, bss)| scan_res_match(ctx, i, bss, group).map(|id| (i, id)))
}

fn select_in_groups<'r>(
    ctx: &SelectContext<'_>,
    results: &[(usize, &'r ScanResult)],
) -> Option<(usize, ProfileId)> {
    ctx.store
        .groups()
        .iter()
        .find_map(|group| select_bss(ctx, results.iter().copied(), group))
}

/// BSSes whose WPS element carries `oui`, strongest first.
fn preferred_subset(results: &[ScanResult], oui: [u8; 3]) -> Vec<(usize, &ScanResult)> {
    let mut subset: Vec<_> = results
        .iter()
        .enumerate()
        .filter(|(_, bss)| bss.wps_ie().is_some_and(|w| w.has_vendor_ext(oui)))
        .collect();
    subset.sort_by(|a, b| b.1.level.cmp(&a.1.level));
    subset
}

/// Pick a (BSS, profile) pair across all priority groups.
///
/// If nothing matches while a WPS session is running and the blacklist
/// is non-empty, the blacklist is cleared and selection retried.
pub fn pick_network(
    params: &PickParams<'_>,
    blacklist: &mut Blacklist,
    results: &[ScanResult],
) -> PickOutcome {
    let mut outcome = PickOutcome::default();

    if let Some(oui) = params.preferred_wps_oui {
        let subset = preferred_subset(results, oui);
        if !subset.is_empty() {
            debug!(count = subset.len(), "trying vendor-preferred WPS APs first");
            let ctx = context(params, blacklist);
            if let Some(hit) = select_in_groups(&ctx, &subset) {
                outcome.selected = Some(hit);
                outcome.only_preferred = true;
                return outcome;
            }
        }
    }

    let all: Vec<(usize, &ScanResult)> = results.iter().enumerate().collect();
    loop {
        let ctx = context(params, blacklist);
        if let Some(hit) = select_in_groups(&ctx, &all) {
            outcome.selected = Some(hit);
            return outcome;
        }
        if !blacklist.is_empty() && ctx.wps_in_progress() {
            info!("no APs found - clear blacklist and try again");
            blacklist.clear();
            outcome.blacklist_cleared += 1;
            continue;
        }
        return outcome;
    }
}

fn context<'a>(params: &PickParams<'a>, blacklist: &'a Blacklist) -> SelectContext<'a> {
    SelectContext {
        store: params.store,
        blacklist,
        hw_modes: params.hw_modes,
        matching: params.matching,
        blacklist_fail_max: params.blacklist_fail_max,
    }
}

/// First enabled IBSS or AP profile, used when no BSS was selected.
pub fn pick_new_network(store: &ProfileStore) -> Option<ProfileId> {
    store.groups().into_iter().flatten().find(|id| {
        store
            .get(*id)
            .is_some_and(|p| !p.is_disabled() && matches!(p.mode, OpMode::Ibss | OpMode::Ap))
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::ie::WpsIe;
    use crate::ie::wps::QUANTENNA_OUI;
    use crate::model::{KeyMgmt, MacAddr, NetworkProfile, ScanResultBuilder};
    use pretty_assertions::assert_eq;

    fn addr(n: u8) -> MacAddr {
        MacAddr::new([2, 0, 0, 0, 0, n])
    }

    fn params(store: &ProfileStore) -> PickParams<'_> {
        PickParams {
            store,
            hw_modes: &[],
            matching: MatchContext::new(addr(0x10)),
            blacklist_fail_max: 5,
            preferred_wps_oui: None,
        }
    }

    fn open_bss(n: u8, ssid: &str, level: i32) -> ScanResult {
        ScanResultBuilder::new(addr(n), 2412, level).ssid(ssid).build()
    }

    #[test]
    fn higher_priority_group_wins_over_scan_order() {
        let low = NetworkProfile::open("cafe");
        let high = NetworkProfile {
            priority: 10,
            ..NetworkProfile::open("home")
        };
        let store = ProfileStore::from_profiles([low, high]);
        let results = [open_bss(1, "cafe", -30), open_bss(2, "home", -80)];
        let mut bl = Blacklist::new();
        let out = pick_network(&params(&store), &mut bl, &results);
        assert_eq!(out.selected, Some((1, ProfileId(1))));
    }

    #[test]
    fn scan_order_breaks_ties_within_group() {
        let store = ProfileStore::from_profiles([NetworkProfile::open("net")]);
        let results = [open_bss(1, "net", -80), open_bss(2, "net", -30)];
        let mut bl = Blacklist::new();
        let out = pick_network(&params(&store), &mut bl, &results);
        assert_eq!(out.selected, Some((0, ProfileId(0))));
    }

    #[test]
    fn blacklist_survives_without_wps() {
        let store = ProfileStore::from_profiles([NetworkProfile::open("other")]);
        let results = [open_bss(1, "net", -40)];
        let mut bl = Blacklist::new();
        bl.add(addr(1));
        let out = pick_network(&params(&store), &mut bl, &results);
        assert_eq!(out.selected, None);
        assert_eq!(out.blacklist_cleared, 0);
        assert_eq!(bl.count(addr(1)), 1);
    }

    #[test]
    fn wps_session_clears_blacklist_once() {
        let wps = NetworkProfile {
            key_mgmt: KeyMgmt::WPS,
            ..NetworkProfile::default()
        };
        let store = ProfileStore::from_profiles([wps]);
        let results = [open_bss(1, "net", -40)];
        let mut bl = Blacklist::new();
        bl.add(addr(1));
        let out = pick_network(&params(&store), &mut bl, &results);
        assert_eq!(out.selected, None);
        assert_eq!(out.blacklist_cleared, 1);
        assert!(bl.is_empty());
    }

    fn vendor_bss(n: u8, ssid: &str, level: i32) -> ScanResult {
        let ie = WpsIe {
            version: Some(0x10),
            vendor_exts: vec![(QUANTENNA_OUI, vec![0x01])],
            ..WpsIe::default()
        };
        ScanResultBuilder::new(addr(n), 2412, level)
            .ssid(ssid)
            .element(&ie.to_element())
            .build()
    }

    fn preferring(store: &ProfileStore) -> PickParams<'_> {
        PickParams {
            preferred_wps_oui: Some(QUANTENNA_OUI),
            ..params(store)
        }
    }

    #[test]
    fn preferred_vendor_is_tried_before_scan_order() {
        let store = ProfileStore::from_profiles([NetworkProfile::open("net")]);
        let results = [
            open_bss(1, "net", -30),
            vendor_bss(2, "net", -80),
            vendor_bss(3, "net", -60),
        ];
        let mut bl = Blacklist::new();

        let out = pick_network(&preferring(&store), &mut bl, &results);
        assert_eq!(out.selected, Some((2, ProfileId(0))));
        assert!(out.only_preferred);

        let out = pick_network(&params(&store), &mut bl, &results);
        assert_eq!(out.selected, Some((0, ProfileId(0))));
        assert!(!out.only_preferred);
    }

    #[test]
    fn unmatched_preferred_subset_falls_back_to_every_bss() {
        let store = ProfileStore::from_profiles([NetworkProfile::open("net")]);
        let results = [vendor_bss(1, "elsewhere", -30), open_bss(2, "net", -70)];
        let mut bl = Blacklist::new();
        let out = pick_network(&preferring(&store), &mut bl, &results);
        assert_eq!(out.selected, Some((1, ProfileId(0))));
        assert!(!out.only_preferred);
    }

    #[test]
    fn new_network_needs_ibss_or_ap_mode() {
        let ibss = NetworkProfile {
            mode: OpMode::Ibss,
            ..NetworkProfile::open("adhoc")
        };
        let store = ProfileStore::from_profiles([NetworkProfile::open("x"), ibss]);
        assert_eq!(pick_new_network(&store), Some(ProfileId(1)));
    }
}
