//! `wpas replay`: drive a station over the in-memory radio.
//!
//! A scenario is a JSON object with optional `station`, `wps` and
//! `networks` overrides and a list of `steps`. Sections left out come
//! from the configuration file.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tabled::Tabled;
use tracing::debug;

use wpas_config::{Config, NetworkEntry, StationSection, WpsSection};
use wpas_core::ie::wps::DEV_PW_DEFAULT;
use wpas_core::sim::SimWorld;
use wpas_core::{DriverEvent, MacAddr, Notification, ProfileId, Station, WpaState};

use crate::cli::{GlobalOpts, ReplayArgs};
use crate::error::CliError;
use crate::output;
use crate::scan::{ScanEntry, read_json, to_results};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct Scenario {
    #[serde(default)]
    station: Option<StationSection>,
    #[serde(default)]
    wps: Option<WpsSection>,
    #[serde(default)]
    networks: Option<Vec<NetworkEntry>>,
    steps: Vec<Step>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
enum Step {
    /// Publish a scan and deliver the scan-results event.
    ScanResults { bss: Vec<ScanEntry> },
    Event { event: DriverEvent },
    /// Move the virtual clock forward, firing due timers.
    Advance { secs: u64 },
    SetBssid { bssid: MacAddr },
    SetSsid { ssid: String },
    WpsPbc {
        #[serde(default)]
        bssid: Option<MacAddr>,
    },
    WpsPin {
        #[serde(default)]
        bssid: Option<MacAddr>,
        #[serde(default)]
        pin: Option<u32>,
    },
    WpsCancel,
}

#[derive(Debug, Serialize)]
struct Logged {
    at_ms: u64,
    #[serde(flatten)]
    notification: Notification,
}

#[derive(Debug, Serialize)]
struct ReplayReport {
    notifications: Vec<Logged>,
    state: WpaState,
    bssid: MacAddr,
    network: Option<ProfileId>,
    associations: usize,
}

#[derive(Tabled)]
struct LogRow {
    #[tabled(rename = "Time")]
    time: String,
    #[tabled(rename = "Event")]
    event: String,
}

pub fn handle(args: &ReplayArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let scenario: Scenario = read_json(&args.scenario)?;
    let cfg = super::load(global)?;
    let cfg = Config {
        station: scenario.station.unwrap_or(cfg.station),
        wps: scenario.wps.unwrap_or(cfg.wps),
        networks: scenario.networks.unwrap_or(cfg.networks),
        ap: Vec::new(),
    };

    let world = SimWorld::new();
    let mut st = Station::new(
        cfg.station_options()?,
        world.collaborators(),
        cfg.profile_store()?,
        None,
    )?;
    st.start();

    let mut log = Vec::new();
    collect(&mut st, &mut log);
    for (idx, step) in scenario.steps.into_iter().enumerate() {
        debug!(idx, ?step, "replay step");
        apply(&mut st, &world, step)?;
        collect(&mut st, &mut log);
    }

    let report = ReplayReport {
        notifications: log,
        state: st.state(),
        bssid: st.bssid(),
        network: st.current(),
        associations: world.associations().len(),
    };
    let out = output::render_single(global.output, &report, detail, |r| {
        r.notifications
            .iter()
            .map(|l| format!("{} {}", l.at_ms, l.notification))
            .chain(std::iter::once(format!("{} {}", r.state, r.bssid)))
            .collect::<Vec<_>>()
            .join("\n")
    });
    output::print_output(&out, global.quiet);
    Ok(())
}

fn apply(st: &mut Station, world: &SimWorld, step: Step) -> Result<(), CliError> {
    match step {
        Step::ScanResults { bss } => {
            world.set_scan_results(to_results(&bss)?);
            st.handle_event(DriverEvent::ScanResults);
        }
        Step::Event { event } => {
            st.handle_event(event);
        }
        Step::Advance { secs } => {
            let until = st.now() + Duration::from_secs(secs);
            st.advance(until);
        }
        Step::SetBssid { bssid } => world.set_bssid(bssid),
        Step::SetSsid { ssid } => world.set_ssid(ssid),
        Step::WpsPbc { bssid } => st.start_pbc(bssid, false)?,
        Step::WpsPin { bssid, pin } => {
            st.start_pin(bssid, pin, false, DEV_PW_DEFAULT)?;
        }
        Step::WpsCancel => st.wps_cancel(),
    }
    Ok(())
}

fn collect(st: &mut Station, log: &mut Vec<Logged>) {
    let at_ms = u64::try_from(st.now().as_millis()).unwrap_or(u64::MAX);
    log.extend(
        st.drain_notifications()
            .into_iter()
            .map(|notification| Logged {
                at_ms,
                notification,
            }),
    );
}

fn detail(report: &ReplayReport) -> String {
    let rows: Vec<LogRow> = report
        .notifications
        .iter()
        .map(|l| LogRow {
            time: format!("{}.{:03}s", l.at_ms / 1000, l.at_ms % 1000),
            event: l.notification.to_string(),
        })
        .collect();
    let network = report
        .network
        .map_or_else(|| "-".to_owned(), |id| id.to_string());
    let summary = format!(
        "State: {}\nBSSID: {}\nNetwork: {network}\nAssociations: {}",
        report.state, report.bssid, report.associations
    );
    if rows.is_empty() {
        summary
    } else {
        format!("{}\n{summary}", output::render_table(&rows))
    }
}
