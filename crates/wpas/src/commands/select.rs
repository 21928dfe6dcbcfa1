//! `wpas select`: evaluate a scan against the configured networks.

use serde::Serialize;
use tabled::Tabled;
use tracing::info;

use wpas_core::ie::matcher::MatchContext;
use wpas_core::model::ssid_text;
use wpas_core::select::{Candidate, PickParams, evaluate, pick_network};
use wpas_core::{Blacklist, MacAddr, ProfileId, SelectContext};

use crate::cli::{GlobalOpts, SelectArgs};
use crate::error::CliError;
use crate::output;
use crate::scan::{ScanEntry, read_json, to_results};

#[derive(Debug, Serialize)]
struct Selected {
    bssid: MacAddr,
    ssid: String,
    network: ProfileId,
}

#[derive(Debug, Serialize)]
struct SelectReport {
    candidates: Vec<Candidate>,
    selected: Option<Selected>,
}

#[derive(Tabled)]
struct CandidateRow {
    #[tabled(rename = "")]
    mark: String,
    #[tabled(rename = "BSSID")]
    bssid: String,
    #[tabled(rename = "SSID")]
    ssid: String,
    #[tabled(rename = "Freq")]
    freq: u32,
    #[tabled(rename = "Level")]
    level: i32,
    #[tabled(rename = "Network")]
    network: String,
    #[tabled(rename = "Eligible")]
    eligible: String,
    #[tabled(rename = "Reason")]
    reason: String,
}

pub fn handle(args: &SelectArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let cfg = super::load(global)?;
    let opts = cfg.station_options()?;
    let store = cfg.profile_store()?;
    let own_addr = match &args.own_addr {
        Some(raw) => raw.parse::<MacAddr>()?,
        None => opts.own_addr,
    };

    let entries: Vec<ScanEntry> = read_json(&args.scan)?;
    let results = to_results(&entries)?;
    info!(bss = results.len(), networks = store.len(), "evaluating scan");

    let matching = MatchContext {
        pin_scan_ignore_sel_reg: opts.wps.pin_scan_ignore_sel_reg,
        ..MatchContext::new(own_addr)
    };
    let mut blacklist = Blacklist::new();
    let candidates = evaluate(
        &SelectContext {
            store: &store,
            blacklist: &blacklist,
            hw_modes: &[],
            matching,
            blacklist_fail_max: opts.blacklist_fail_max,
        },
        &results,
    );
    let outcome = pick_network(
        &PickParams {
            store: &store,
            hw_modes: &[],
            matching,
            blacklist_fail_max: opts.blacklist_fail_max,
            preferred_wps_oui: opts
                .wps
                .allow_pbc_overlap
                .then_some(opts.wps.preferred_oui),
        },
        &mut blacklist,
        &results,
    );

    let selected = outcome.selected.and_then(|(idx, network)| {
        let bss = results.get(idx)?;
        Some(Selected {
            bssid: bss.bssid,
            ssid: bss.ssid_text(),
            network,
        })
    });
    let report = SelectReport {
        candidates,
        selected,
    };

    let color = output::should_color(global.color);
    let labels = |id: ProfileId| {
        store
            .get(id)
            .map_or_else(|| id.to_string(), |p| format!("{id} {}", ssid_text(&p.ssid)))
    };
    let out = output::render_single(
        global.output,
        &report,
        |r| detail(r, &labels, color),
        |r| {
            r.selected
                .as_ref()
                .map_or_else(String::new, |s| format!("{} {}", s.bssid, s.network))
        },
    );
    output::print_output(&out, global.quiet);
    Ok(())
}

fn is_selected(report: &SelectReport, c: &Candidate) -> bool {
    report
        .selected
        .as_ref()
        .is_some_and(|s| s.bssid == c.bssid && c.profile == Some(s.network))
}

fn detail(report: &SelectReport, labels: &dyn Fn(ProfileId) -> String, color: bool) -> String {
    if report.candidates.is_empty() {
        return "No BSS in scan".into();
    }
    let rows: Vec<CandidateRow> = report
        .candidates
        .iter()
        .map(|c| {
            let picked = is_selected(report, c);
            CandidateRow {
                mark: if picked { output::highlight("*", color) } else { String::new() },
                bssid: c.bssid.to_string(),
                ssid: c.ssid.clone(),
                freq: c.freq,
                level: c.level,
                network: c.profile.map(labels).unwrap_or_default(),
                eligible: output::verdict(c.eligible, color),
                reason: c.reason.clone(),
            }
        })
        .collect();

    let summary = match &report.selected {
        Some(s) => format!(
            "Selected {} ({}) on network {}",
            output::highlight(&s.bssid.to_string(), color),
            s.ssid,
            s.network
        ),
        None => "No network selected".into(),
    };
    format!("{}\n{summary}", output::render_table(&rows))
}
