// ── Session ──
//
// The set of interfaces one process manages, in registration order.
// Owns every Station, routes driver events by interface name, keeps a
// single virtual clock for all of them, and performs the cross-interface
// work a Station reports in its `Followup`: sibling scan fan-out on a
// shared radio and shutdown once the last interface disappears.

use std::time::Duration;

use indexmap::IndexMap;
use serde::Serialize;
use tracing::{debug, info};

use crate::collab::Collaborators;
use crate::error::CoreError;
use crate::model::{DriverEvent, Notification};
use crate::station::{Followup, Station, StationOptions};
use crate::store::ProfileStore;

/// Session-wide behavior switches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionOptions {
    /// Stop the run loop once no interface is left.
    pub terminate_on_last_interface: bool,
}

/// A notification together with the interface that raised it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaggedNotification {
    pub ifname: String,
    pub notification: Notification,
}

#[derive(Debug, Default)]
pub struct Session {
    opts: SessionOptions,
    stations: IndexMap<String, Station>,
    outbox: Vec<TaggedNotification>,
    now: Duration,
    terminate: bool,
}

impl Session {
    pub fn new(opts: SessionOptions) -> Self {
        Self {
            opts,
            ..Self::default()
        }
    }

    // ── Registry ────────────────────────────────────────────────────

    /// Register an interface. The first registered interface donates its
    /// WPS UUID to later ones that do not configure their own.
    pub fn add_station(
        &mut self,
        opts: StationOptions,
        collab: Collaborators,
        store: ProfileStore,
    ) -> Result<&mut Station, CoreError> {
        if self.stations.contains_key(&opts.ifname) {
            return Err(CoreError::Rejected {
                message: format!("interface '{}' already added", opts.ifname),
            });
        }
        let sibling_uuid = self
            .stations
            .values()
            .next()
            .map(|st| st.wps_session().device.uuid);
        let ifname = opts.ifname.clone();
        let mut station = Station::new(opts, collab, store, sibling_uuid)?;
        station.advance(self.now);
        info!(%ifname, total = self.stations.len() + 1, "interface added");

        let entry = self.stations.entry(ifname).or_insert(station);
        Ok(entry)
    }

    /// Unregister an interface, returning it so the caller can inspect
    /// its final state.
    pub fn remove_station(&mut self, ifname: &str) -> Result<Station, CoreError> {
        let mut station = self
            .stations
            .shift_remove(ifname)
            .ok_or_else(|| not_found(ifname))?;
        self.collect(&mut station);
        info!(%ifname, remaining = self.stations.len(), "interface removed");
        Ok(station)
    }

    pub fn station(&self, ifname: &str) -> Option<&Station> {
        self.stations.get(ifname)
    }

    pub fn station_mut(&mut self, ifname: &str) -> Option<&mut Station> {
        self.stations.get_mut(ifname)
    }

    pub fn ifnames(&self) -> impl Iterator<Item = &str> {
        self.stations.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.stations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stations.is_empty()
    }

    /// Some registered interface still exists in the system.
    pub fn any_interfaces(&self) -> bool {
        self.stations.values().any(|st| !st.interface_removed())
    }

    pub fn terminate_requested(&self) -> bool {
        self.terminate
    }

    pub fn now(&self) -> Duration {
        self.now
    }

    // ── Inputs ──────────────────────────────────────────────────────

    /// Start every registered interface.
    pub fn start_all(&mut self) {
        let mut raised = Vec::new();
        for (name, station) in &mut self.stations {
            station.start();
            raised.push((name.clone(), station.drain_notifications()));
        }
        for (name, notes) in raised {
            self.push_all(&name, notes);
        }
    }

    /// Run `op` against one interface and collect what it raised.
    pub fn with_station<R>(
        &mut self,
        ifname: &str,
        op: impl FnOnce(&mut Station) -> R,
    ) -> Result<R, CoreError> {
        let station = self
            .stations
            .get_mut(ifname)
            .ok_or_else(|| not_found(ifname))?;
        let out = op(station);
        let notes = station.drain_notifications();
        self.push_all(ifname, notes);
        Ok(out)
    }

    /// Deliver one driver event to `ifname` and do the cross-interface
    /// follow-up work it calls for.
    pub fn handle_event(&mut self, ifname: &str, event: DriverEvent) -> Result<(), CoreError> {
        let followup = self.with_station(ifname, |st| st.handle_event(event))?;
        self.apply(ifname, &followup);
        Ok(())
    }

    /// Move the shared clock to `now`, firing due timers everywhere.
    pub fn advance(&mut self, now: Duration) {
        self.now = self.now.max(now);
        let now = self.now;
        let mut raised = Vec::new();
        for (name, station) in &mut self.stations {
            station.advance(now);
            raised.push((name.clone(), station.drain_notifications()));
        }
        for (name, notes) in raised {
            self.push_all(&name, notes);
        }
    }

    /// Earliest armed timer across all interfaces.
    pub fn next_deadline(&self) -> Option<Duration> {
        self.stations
            .values()
            .filter_map(Station::next_deadline)
            .min()
    }

    /// Take every notification raised since the last call.
    pub fn drain_notifications(&mut self) -> Vec<TaggedNotification> {
        std::mem::take(&mut self.outbox)
    }

    // ── Internals ───────────────────────────────────────────────────

    fn apply(&mut self, origin: &str, followup: &Followup) {
        if let Some(radio) = followup.radio_scan.as_deref() {
            self.fan_out_scan(origin, radio);
        }
        if followup.interface_removed && !self.any_interfaces() {
            if self.opts.terminate_on_last_interface {
                info!("last interface removed, terminating");
                self.outbox.push(TaggedNotification {
                    ifname: origin.to_owned(),
                    notification: Notification::TerminateRequested,
                });
                self.terminate = true;
            } else {
                debug!("no interfaces left");
            }
        }
    }

    /// Let every other interface on `radio` process the fresh results.
    /// Their own follow-ups are ignored so the fan-out never recurses.
    fn fan_out_scan(&mut self, origin: &str, radio: &str) {
        let siblings: Vec<String> = self
            .stations
            .iter()
            .filter(|(name, st)| {
                name.as_str() != origin && st.radio_name().as_deref() == Some(radio)
            })
            .map(|(name, _)| name.clone())
            .collect();
        for name in siblings {
            debug!(%radio, from = %origin, to = %name, "sharing scan results");
            if let Some(station) = self.stations.get_mut(&name) {
                let _ = station.handle_event(DriverEvent::ScanResults);
                let notes = station.drain_notifications();
                self.push_all(&name, notes);
            }
        }
    }

    fn collect(&mut self, station: &mut Station) {
        let ifname = station.ifname().to_owned();
        let notes = station.drain_notifications();
        self.push_all(&ifname, notes);
    }

    fn push_all(&mut self, ifname: &str, notes: Vec<Notification>) {
        self.outbox
            .extend(notes.into_iter().map(|notification| TaggedNotification {
                ifname: ifname.to_owned(),
                notification,
            }));
    }
}

fn not_found(ifname: &str) -> CoreError {
    CoreError::InterfaceNotFound {
        name: ifname.to_owned(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::model::{InterfaceStatusKind, MacAddr, NetworkProfile, ScanResultBuilder, WpaState};
    use crate::sim::{Call, SimWorld};
    use pretty_assertions::assert_eq;

    fn world(radio: &str) -> SimWorld {
        let world = SimWorld::new();
        world.set_radio(radio);
        world.set_scan_results(vec![
            ScanResultBuilder::new(MacAddr::new([2, 0, 0, 0, 0, 1]), 2412, -40)
                .ssid("lab")
                .build(),
        ]);
        world
    }

    fn add(session: &mut Session, ifname: &str, world: &SimWorld) {
        let opts = StationOptions {
            ifname: ifname.into(),
            ..StationOptions::default()
        };
        let store = ProfileStore::from_profiles([NetworkProfile::open("lab")]);
        session
            .add_station(opts, world.collaborators(), store)
            .unwrap();
    }

    fn associations(world: &SimWorld) -> usize {
        world.count(|c| matches!(c, Call::Associate { .. }))
    }

    #[test]
    fn duplicate_interface_is_rejected() {
        let mut session = Session::new(SessionOptions::default());
        let w = world("phy0");
        add(&mut session, "wlan0", &w);
        let err = session
            .add_station(
                StationOptions::default(),
                w.collaborators(),
                ProfileStore::default(),
            )
            .unwrap_err();
        assert!(matches!(err, CoreError::Rejected { .. }));
        assert_eq!(session.len(), 1);
    }

    #[test]
    fn later_interfaces_share_the_first_uuid() {
        let mut session = Session::new(SessionOptions::default());
        add(&mut session, "wlan0", &world("phy0"));
        add(&mut session, "wlan1", &world("phy1"));
        let first = session.station("wlan0").unwrap().wps_session().device.uuid;
        let second = session.station("wlan1").unwrap().wps_session().device.uuid;
        assert_eq!(first, second);
    }

    #[test]
    fn scan_results_fan_out_to_same_radio_only() {
        let mut session = Session::new(SessionOptions::default());
        let (a, b, c) = (world("phy0"), world("phy0"), world("phy1"));
        add(&mut session, "wlan0", &a);
        add(&mut session, "wlan1", &b);
        add(&mut session, "wlan2", &c);

        session.handle_event("wlan0", DriverEvent::ScanResults).unwrap();

        assert_eq!(associations(&a), 1);
        assert_eq!(associations(&b), 1);
        assert_eq!(associations(&c), 0);
        let tagged: Vec<String> = session
            .drain_notifications()
            .iter()
            .filter(|n| n.notification == Notification::ScanResults)
            .map(|n| n.ifname.clone())
            .collect();
        assert_eq!(tagged, ["wlan0", "wlan1"]);
    }

    #[test]
    fn unknown_interface_is_an_error() {
        let mut session = Session::new(SessionOptions::default());
        let err = session
            .handle_event("wlan9", DriverEvent::ScanResults)
            .unwrap_err();
        assert!(matches!(err, CoreError::InterfaceNotFound { .. }));
    }

    #[test]
    fn removing_last_interface_requests_termination() {
        let mut session = Session::new(SessionOptions {
            terminate_on_last_interface: true,
        });
        add(&mut session, "wlan0", &world("phy0"));
        add(&mut session, "wlan1", &world("phy1"));

        let removed = |ifname: &str| DriverEvent::InterfaceStatus {
            ifname: ifname.into(),
            status: InterfaceStatusKind::Removed,
        };
        session.handle_event("wlan0", removed("wlan0")).unwrap();
        assert!(!session.terminate_requested());
        assert_eq!(
            session.station("wlan0").unwrap().state(),
            WpaState::InterfaceDisabled
        );

        session.handle_event("wlan1", removed("wlan1")).unwrap();
        assert!(session.terminate_requested());
        assert!(
            session
                .drain_notifications()
                .iter()
                .any(|n| n.notification == Notification::TerminateRequested)
        );
    }

    #[test]
    fn last_interface_without_terminate_keeps_running() {
        let mut session = Session::new(SessionOptions::default());
        add(&mut session, "wlan0", &world("phy0"));
        session
            .handle_event(
                "wlan0",
                DriverEvent::InterfaceStatus {
                    ifname: "wlan0".into(),
                    status: InterfaceStatusKind::Removed,
                },
            )
            .unwrap();
        assert!(!session.any_interfaces());
        assert!(!session.terminate_requested());
    }

    #[test]
    fn shared_clock_fires_timers_on_every_interface() {
        let mut session = Session::new(SessionOptions::default());
        let (a, b) = (world("phy0"), world("phy1"));
        add(&mut session, "wlan0", &a);
        add(&mut session, "wlan1", &b);
        session.start_all();
        assert_eq!(session.next_deadline(), Some(Duration::ZERO));

        session.advance(Duration::ZERO);
        assert_eq!(a.count(|c| matches!(c, Call::Scan { .. })), 1);
        assert_eq!(b.count(|c| matches!(c, Call::Scan { .. })), 1);
    }
}
