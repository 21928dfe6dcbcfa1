// ── BSS selection ──
//
// Scoring, priority-group selection, and the roaming decision. All of
// it runs over a borrowed snapshot of the station: nothing here owns a
// profile or a scan result.

pub mod roam;
pub mod scorer;
pub mod selector;

pub use roam::{RoamInput, RoamingPolicy, need_to_roam};
pub use scorer::{Candidate, check_bss, check_profile, evaluate, scan_res_match};
pub use selector::{PickOutcome, PickParams, pick_network, pick_new_network, select_bss};

use crate::blacklist::Blacklist;
use crate::ie::matcher::MatchContext;
use crate::model::{HwMode, MacAddr, ScanResult};
use crate::store::ProfileStore;
use crate::wps;

/// Default failure count at which a BSSID stops being considered.
pub const DEFAULT_BLACKLIST_FAIL_MAX: u32 = 5;

/// Read-only view of everything selection consults.
#[derive(Debug, Clone, Copy)]
pub struct SelectContext<'a> {
    pub store: &'a ProfileStore,
    pub blacklist: &'a Blacklist,
    pub hw_modes: &'a [HwMode],
    pub matching: MatchContext,
    pub blacklist_fail_max: u32,
}

impl SelectContext<'_> {
    pub fn wps_in_progress(&self) -> bool {
        wps::in_progress(self.store)
    }
}

/// Index of the BSS matching `bssid` and `ssid` in `results`.
pub fn find_bss<'r>(
    results: &'r [ScanResult],
    bssid: MacAddr,
    ssid: &[u8],
) -> Option<&'r ScanResult> {
    results
        .iter()
        .find(|r| r.bssid == bssid && r.ssid() == ssid)
}
