// ── Scan-results pipeline ──
//
// SCAN_RESULTS handling: fetch, entropy feed, the one-shot handler
// override, WPS availability, then selection, roaming and connect.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use crate::model::{Notification, ScanResult, WpaState};
use crate::select::{PickParams, RoamInput, need_to_roam, pick_network, pick_new_network};
use crate::wps;

use super::{P2P_PROVISIONING_SCAN, Station};

/// How many results contribute to the entropy pool.
const RANDOMNESS_SAMPLES: usize = 10;

impl Station {
    /// Process a SCAN_RESULTS event. Returns true when results were
    /// handled, so siblings on the same radio may process theirs.
    pub(crate) fn scan_results_event(&mut self) -> bool {
        if let Some(p2p) = self.collab.p2p.as_mut() {
            if p2p.scan_complete_pending() {
                debug!("P2P scan completion consumed the results");
                return false;
            }
        }

        let results: Arc<[ScanResult]> = match self.collab.driver.get_scan_results() {
            Ok(results) => results.into(),
            Err(err) => {
                if self.opts.ap_scan == 2 || self.ap_mode {
                    return false;
                }
                debug!(%err, "failed to get scan results - try scanning again");
                self.req_new_scan(Duration::from_secs(1));
                return false;
            }
        };
        self.feed_randomness(&results);
        self.last_scan = Arc::clone(&results);

        if let Some(handler) = self.scan_handler.take() {
            debug!("scan results consumed by a one-shot handler");
            handler(self, &results);
            return true;
        }

        if self.ap_mode {
            debug!("ignore scan results in AP mode");
            if let Some(ap) = self.collab.ap.as_mut() {
                ap.scan_cb(&results);
            }
            return true;
        }

        info!(count = results.len(), "scan results available");
        self.notify(Notification::ScanResults);
        self.notify_wps_availability(&results);

        if self.opts.ap_scan == 2 && !wps::searching(&self.store) {
            return true;
        }
        if self.disconnected {
            self.set_state(WpaState::Disconnected);
            return true;
        }
        if !self.driver_bss_selection() {
            if let Some(bgscan) = self.collab.bgscan.as_mut() {
                if bgscan.notify_scan(&results) {
                    return true;
                }
            }
        }

        self.select_from(&results)
    }

    fn select_from(&mut self, results: &[ScanResult]) -> bool {
        let params = PickParams {
            store: &self.store,
            hw_modes: &self.hw_modes,
            matching: self.match_context(),
            blacklist_fail_max: self.opts.blacklist_fail_max,
            preferred_wps_oui: self
                .opts
                .wps
                .allow_pbc_overlap
                .then_some(self.opts.wps.preferred_oui),
        };
        let outcome = pick_network(&params, &mut self.blacklist, results);
        self.wps.only_preferred = outcome.only_preferred;
        self.wps.blacklist_cleared = self
            .wps
            .blacklist_cleared
            .saturating_add(outcome.blacklist_cleared);

        if let Some((idx, id)) = outcome.selected {
            let Some(bss) = results.get(idx) else {
                return false;
            };
            let roam = need_to_roam(
                &RoamInput {
                    reassociate: self.reassociate,
                    state: self.state,
                    current: self.current.and_then(|cur| self.store.get(cur).map(|p| (cur, p))),
                    selected: id,
                    selected_bss: bss,
                    current_bssid: self.bssid,
                    driver_bss_selection: self.driver_bss_selection(),
                    results,
                },
                &self.opts.roaming,
            );
            if !roam {
                self.collab.wpa.preauth_scan_results(results);
                return true;
            }
            if let Err(err) = self.connect(results, idx, id) {
                debug!(%err, "connect failed");
                return false;
            }
            self.collab.wpa.preauth_scan_results(results);
            return true;
        }

        debug!("no suitable network found");
        if let Some(id) = pick_new_network(&self.store) {
            debug!(%id, "setup a new network");
            self.associate(None, id);
            self.collab.wpa.preauth_scan_results(results);
        } else if self.collab.p2p.as_ref().is_some_and(|p2p| p2p.in_provisioning()) {
            // Group formation is time critical; scan again quickly.
            self.req_new_scan(P2P_PROVISIONING_SCAN);
        } else if !self.req_sched_scan() {
            self.req_new_scan(self.opts.scan_interval);
        }
        true
    }

    fn feed_randomness(&mut self, results: &[ScanResult]) {
        let Some(random) = self.collab.random.as_mut() else {
            return;
        };
        for r in results.iter().take(RANDOMNESS_SAMPLES) {
            let sample = [
                r.bssid.octets()[5],
                r.qual.to_le_bytes()[0],
                r.noise.to_le_bytes()[0],
                r.level.to_le_bytes()[0],
                r.tsf.to_le_bytes()[0],
            ];
            random.add_randomness(&sample);
        }
    }

    fn notify_wps_availability(&mut self, results: &[ScanResult]) {
        if !self.opts.wps.enabled {
            return;
        }
        if let Some(kind) = wps::scan::availability(results, &self.match_context()) {
            self.notify(Notification::WpsApAvailable { availability: kind });
        }
    }

    /// Re-read the driver's results into the cache without selecting.
    pub(crate) fn refresh_scan_cache(&mut self) {
        match self.collab.driver.get_scan_results() {
            Ok(results) => self.last_scan = results.into(),
            Err(err) => debug!(%err, "scan cache refresh failed"),
        }
    }

    /// Scheduled scanning stopped; restart it if it only timed out.
    pub(crate) fn sched_scan_stopped(&mut self) {
        self.sched_scanning = false;
        if self.sched_scan_timed_out {
            self.req_sched_scan();
        }
    }
}
