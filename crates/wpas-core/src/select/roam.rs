// ── Roaming decision ──
//
// Whether to leave the current BSS for a newly selected one. The signal
// hysteresis is a table of (level threshold, minimum gain) bands so it
// can be tuned from configuration.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::model::{MacAddr, NetworkProfile, ProfileId, ScanResult, WpaState};

use super::find_bss;

/// Signal hysteresis for roaming between BSSes of the same network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoamingPolicy {
    /// `(threshold, min_diff)` pairs, checked in order: the first band
    /// whose threshold is above the current level applies.
    pub bands: Vec<(i32, u32)>,
    /// Gain required when the current level is below zero but above
    /// every band.
    pub weak_default: u32,
    /// Gain required when the level is not in dBm (non-negative).
    pub default_min_diff: u32,
}

impl Default for RoamingPolicy {
    fn default() -> Self {
        Self {
            bands: vec![(-85, 1), (-80, 2), (-75, 3), (-70, 4)],
            weak_default: 5,
            default_min_diff: 2,
        }
    }
}

impl RoamingPolicy {
    /// Minimum level gain needed to roam away from `current_level`.
    pub fn min_diff(&self, current_level: i32) -> u32 {
        if current_level >= 0 {
            return self.default_min_diff;
        }
        self.bands
            .iter()
            .find(|(threshold, _)| current_level < *threshold)
            .map_or(self.weak_default, |(_, diff)| *diff)
    }
}

/// Snapshot of the station consulted by `need_to_roam`.
#[derive(Debug, Clone, Copy)]
pub struct RoamInput<'a> {
    pub reassociate: bool,
    pub state: WpaState,
    pub current: Option<(ProfileId, &'a NetworkProfile)>,
    pub selected: ProfileId,
    pub selected_bss: &'a ScanResult,
    pub current_bssid: MacAddr,
    /// Driver picks the BSS itself; never second-guess it.
    pub driver_bss_selection: bool,
    pub results: &'a [ScanResult],
}

/// Decide whether to roam to `input.selected_bss`.
pub fn need_to_roam(input: &RoamInput<'_>, policy: &RoamingPolicy) -> bool {
    let Some((current_id, current)) = input.current else {
        return true;
    };
    if input.reassociate || input.state < WpaState::Associated || current_id != input.selected {
        return true;
    }
    if input.driver_bss_selection {
        debug!("driver-based BSS selection - do not roam");
        return false;
    }

    let Some(current_bss) = find_bss(input.results, input.current_bssid, &current.ssid) else {
        return true;
    };

    debug!("considering within-ESS reassociation");
    debug!(
        "current BSS: {} level={}",
        current_bss.bssid, current_bss.level
    );
    debug!(
        "selected BSS: {} level={}",
        input.selected_bss.bssid, input.selected_bss.level
    );

    if current.bssid == Some(input.selected_bss.bssid) {
        debug!("allow reassociation - selected BSS matches the pinned BSSID");
        return true;
    }

    let min_diff = policy.min_diff(current_bss.level);
    if current_bss.level.abs_diff(input.selected_bss.level) < min_diff {
        debug!("skip roam - too small difference in signal level");
        return false;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ScanResultBuilder;

    fn bss(n: u8, level: i32) -> ScanResult {
        ScanResultBuilder::new(MacAddr::new([2, 0, 0, 0, 0, n]), 2412, level)
            .ssid("home")
            .build()
    }

    fn input<'a>(
        profile: &'a NetworkProfile,
        results: &'a [ScanResult],
        selected: &'a ScanResult,
    ) -> RoamInput<'a> {
        RoamInput {
            reassociate: false,
            state: WpaState::Completed,
            current: Some((ProfileId(0), profile)),
            selected: ProfileId(0),
            selected_bss: selected,
            current_bssid: results[0].bssid,
            driver_bss_selection: false,
            results,
        }
    }

    #[test]
    fn band_table_matches_defaults() {
        let p = RoamingPolicy::default();
        assert_eq!(p.min_diff(-90), 1);
        assert_eq!(p.min_diff(-82), 2);
        assert_eq!(p.min_diff(-77), 3);
        assert_eq!(p.min_diff(-72), 4);
        assert_eq!(p.min_diff(-60), 5);
        assert_eq!(p.min_diff(40), 2);
    }

    #[test]
    fn small_gain_is_not_worth_roaming() {
        let profile = NetworkProfile::open("home");
        let results = [bss(1, -72), bss(2, -70)];
        assert!(!need_to_roam(
            &input(&profile, &results, &results[1]),
            &RoamingPolicy::default()
        ));
    }

    #[test]
    fn sufficient_gain_roams() {
        let profile = NetworkProfile::open("home");
        let results = [bss(1, -72), bss(2, -68)];
        assert!(need_to_roam(
            &input(&profile, &results, &results[1]),
            &RoamingPolicy::default()
        ));
    }

    #[test]
    fn different_profile_always_roams() {
        let profile = NetworkProfile::open("home");
        let results = [bss(1, -72), bss(2, -71)];
        let mut inp = input(&profile, &results, &results[1]);
        inp.selected = ProfileId(7);
        assert!(need_to_roam(&inp, &RoamingPolicy::default()));
    }

    #[test]
    fn driver_selection_suppresses_roam() {
        let profile = NetworkProfile::open("home");
        let results = [bss(1, -90), bss(2, -30)];
        let mut inp = input(&profile, &results, &results[1]);
        inp.driver_bss_selection = true;
        assert!(!need_to_roam(&inp, &RoamingPolicy::default()));
    }
}
