#![allow(clippy::unwrap_used)]

use std::time::Duration;

use pretty_assertions::assert_eq;

use super::sim::{ApCall, SimPsk, SimRadio};
use super::*;
use crate::error::CoreError;
use crate::model::{MacAddr, Proto};

const STA: MacAddr = MacAddr::new([0x02, 0, 0, 0, 0, 0x55]);
const STA2: MacAddr = MacAddr::new([0x02, 0, 0, 0, 0, 0x56]);

fn open(iface: &str) -> BssConfig {
    BssConfig::new(iface, "lab")
}

fn rsn(iface: &str) -> BssConfig {
    BssConfig {
        wpa: Proto::RSN,
        wpa_passphrase: Some("password123".into()),
        ..open(iface)
    }
}

fn conf(bss: Vec<BssConfig>) -> ApConfig {
    ApConfig {
        channel: 6,
        ..ApConfig::new(bss)
    }
}

fn iface(radio: &SimRadio, conf: ApConfig) -> ApInterface {
    ApInterface::new(conf, radio.driver(), Box::new(SimPsk)).with_config_source(radio.source())
}

fn enabled(radio: &SimRadio, conf: ApConfig) -> ApInterface {
    let mut iface = iface(radio, conf);
    iface.enable().unwrap();
    assert_eq!(iface.state(), IfaceState::Enabled);
    iface.drain_events();
    radio.take_calls();
    iface
}

fn names(iface: &ApInterface) -> Vec<&str> {
    iface.bss().iter().map(ApBss::name).collect()
}

// ── Bring-up ────────────────────────────────────────────────────────

#[test]
fn state_names_match_control_interface() {
    assert_eq!(IfaceState::CountryUpdate.to_string(), "COUNTRY_UPDATE");
    assert_eq!(IfaceState::HtScan.to_string(), "HT_SCAN");
    assert_eq!(IfaceState::Uninitialized.to_string(), "UNINITIALIZED");
    assert_eq!(
        ApEvent::StateChanged {
            from: IfaceState::Disabled,
            to: IfaceState::Enabled
        }
        .to_string(),
        "interface state DISABLED->ENABLED"
    );
}

#[test]
fn enable_without_country_goes_straight_to_enabled() {
    let radio = SimRadio::new();
    let mut iface = iface(&radio, conf(vec![rsn("wlan0")]));
    iface.enable().unwrap();

    assert_eq!(
        iface.drain_events(),
        vec![
            ApEvent::StateChanged {
                from: IfaceState::Uninitialized,
                to: IfaceState::Enabled
            },
            ApEvent::Enabled,
        ]
    );
    assert_eq!(iface.freq(), 2437);
    assert_eq!(iface.phy(), Some("phy0"));
    let calls = radio.calls();
    assert_eq!(calls[0], ApCall::Init { ifname: "wlan0".into() });
    assert!(calls.contains(&ApCall::SetFreq { freq: 2437 }));
    assert!(calls.contains(&ApCall::Commit { bss: "wlan0".into() }));
    assert!(calls.iter().any(|c| matches!(c, ApCall::SetGenericElem { len, .. } if *len > 0)));
}

#[test]
fn enable_twice_is_rejected() {
    let radio = SimRadio::new();
    let mut iface = enabled(&radio, conf(vec![open("wlan0")]));
    let err = iface.enable().unwrap_err();
    assert!(matches!(err, CoreError::Rejected { .. }));
}

#[test]
fn driver_init_failure_leaves_interface_down() {
    let radio = SimRadio::new();
    radio.lock().fail_init = true;
    let mut iface = iface(&radio, conf(vec![open("wlan0")]));
    assert!(iface.enable().is_err());
    assert!(!iface.is_enabled());
    assert_eq!(iface.state(), IfaceState::Uninitialized);
}

#[test]
fn invalid_config_blocks_enable() {
    let radio = SimRadio::new();
    let mut bad = rsn("wlan0");
    bad.wpa_passphrase = None;
    let mut iface = iface(&radio, conf(vec![bad]));
    assert!(matches!(iface.enable(), Err(CoreError::ValidationFailed { .. })));
    assert!(radio.calls().is_empty());
}

#[test]
fn setup_failure_lands_in_disabled() {
    let radio = SimRadio::new();
    radio.lock().fail_set_freq = true;
    let mut iface = iface(&radio, conf(vec![open("wlan0")]));
    assert!(iface.enable().is_err());
    assert_eq!(iface.state(), IfaceState::Disabled);
    assert!(!iface.is_enabled());
    assert!(radio.calls().contains(&ApCall::Deinit));
}

#[test]
fn country_change_waits_for_user_channel_list_update() {
    let radio = SimRadio::new();
    let mut iface = iface(
        &radio,
        ApConfig {
            country: Some("US".into()),
            ..conf(vec![open("wlan0")])
        },
    );
    iface.enable().unwrap();
    assert_eq!(iface.state(), IfaceState::CountryUpdate);
    assert!(iface.waiting_for_channel_list());
    assert_eq!(iface.next_deadline(), Some(CHANNEL_LIST_UPDATE_TIMEOUT));
    assert!(radio.calls().contains(&ApCall::SetCountry { country: "US".into() }));

    // Only a user-initiated update resumes setup.
    iface.channel_list_updated(RegdomInitiator::Driver).unwrap();
    assert_eq!(iface.state(), IfaceState::CountryUpdate);

    iface.channel_list_updated(RegdomInitiator::User).unwrap();
    assert_eq!(iface.state(), IfaceState::Enabled);
    assert_eq!(iface.next_deadline(), None);
}

#[test]
fn channel_list_timeout_continues_setup() {
    let radio = SimRadio::new();
    let mut iface = iface(
        &radio,
        ApConfig {
            country: Some("US".into()),
            ..conf(vec![open("wlan0")])
        },
    );
    iface.enable().unwrap();

    iface.advance(Duration::from_millis(4900));
    assert_eq!(iface.state(), IfaceState::CountryUpdate);
    iface.advance(Duration::from_secs(5));
    assert_eq!(iface.state(), IfaceState::Enabled);
    assert!(!iface.waiting_for_channel_list());
}

#[test]
fn unchanged_country_does_not_wait() {
    let radio = SimRadio::new();
    radio.lock().country = Some("us".into());
    let mut iface = iface(
        &radio,
        ApConfig {
            country: Some("US".into()),
            ..conf(vec![open("wlan0")])
        },
    );
    iface.enable().unwrap();
    let states: Vec<IfaceState> = iface
        .drain_events()
        .into_iter()
        .filter_map(|e| match e {
            ApEvent::StateChanged { to, .. } => Some(to),
            _ => None,
        })
        .collect();
    assert_eq!(states, vec![IfaceState::CountryUpdate, IfaceState::Enabled]);
}

#[test]
fn acs_defers_until_completion_reported() {
    let radio = SimRadio::new();
    radio.lock().acs = true;
    let mut iface = iface(&radio, ApConfig::new(vec![open("wlan0")]));
    iface.enable().unwrap();
    assert_eq!(iface.state(), IfaceState::Acs);

    iface.setup_complete(Ok(())).unwrap();
    assert_eq!(iface.state(), IfaceState::Enabled);
}

#[test]
fn failed_acs_disables_interface() {
    let radio = SimRadio::new();
    radio.lock().acs = true;
    let mut iface = iface(&radio, ApConfig::new(vec![open("wlan0")]));
    iface.enable().unwrap();
    let err = iface
        .setup_complete(Err(CoreError::driver("acs", "no usable channel")))
        .unwrap_err();
    assert!(matches!(err, CoreError::Driver { .. }));
    assert_eq!(iface.state(), IfaceState::Disabled);
}

#[test]
fn ht_scan_defers_setup() {
    let radio = SimRadio::new();
    radio.lock().ht_scan = true;
    let mut iface = iface(
        &radio,
        ApConfig {
            ieee80211n: true,
            ..conf(vec![open("wlan0")])
        },
    );
    iface.enable().unwrap();
    assert_eq!(iface.state(), IfaceState::HtScan);
    iface.setup_complete(Ok(())).unwrap();
    assert_eq!(iface.state(), IfaceState::Enabled);
}

#[test]
fn dfs_channel_waits_for_cac() {
    let radio = SimRadio::new();
    {
        let mut state = radio.lock();
        state.dfs = true;
        state.country = Some("DE".into());
    }
    let mut iface = iface(
        &radio,
        ApConfig {
            channel: 100,
            ieee80211h: true,
            country: Some("DE".into()),
            ..ApConfig::new(vec![open("wlan0")])
        },
    );
    iface.enable().unwrap();
    assert_eq!(iface.state(), IfaceState::Dfs);
    assert_eq!(radio.count(|c| matches!(c, ApCall::SetFreq { .. })), 0);

    iface.setup_complete(Ok(())).unwrap();
    assert_eq!(iface.state(), IfaceState::Enabled);
    assert!(radio.calls().contains(&ApCall::SetFreq { freq: 5500 }));
}

#[test]
fn secondary_bss_gets_its_own_interface() {
    let radio = SimRadio::new();
    let iface = enabled(&radio, conf(vec![open("wlan0"), open("wlan0_1")]));
    let bss = iface.bss();
    assert!(bss[0].is_primary());
    assert!(!bss[1].is_primary());
    assert_eq!(bss[0].own_addr(), MacAddr::new([0x02, 0, 0, 0, 0xa0, 0]));
    assert_eq!(bss[1].own_addr(), MacAddr::new([0x02, 0, 0, 0, 0xa0, 1]));
    assert_eq!(iface.default_pbc_bss(), Some("wlan0"));
}

#[test]
fn passphrase_and_hex_psk_both_produce_keys() {
    let radio = SimRadio::new();
    let hex_psk = "11".repeat(32);
    let iface = enabled(
        &radio,
        conf(vec![
            rsn("wlan0"),
            BssConfig {
                wpa: Proto::RSN,
                wpa_psk: Some(hex_psk),
                ..open("wlan0_1")
            },
        ]),
    );
    assert_eq!(
        iface.bss()[0].psk(),
        Some(&SimPsk.derive("password123", b"lab"))
    );
    assert_eq!(iface.bss()[1].psk(), Some(&[0x11; 32]));
}

// ── Teardown ────────────────────────────────────────────────────────

#[test]
fn disable_deauthenticates_and_removes_secondaries() {
    let radio = SimRadio::new();
    let mut iface = enabled(&radio, conf(vec![open("wlan0"), open("wlan0_1")]));
    iface.new_assoc_sta("wlan0", STA, AssocFlags::default()).unwrap();
    iface.drain_events();

    iface.disable();
    assert_eq!(
        iface.drain_events(),
        vec![
            ApEvent::Disabled,
            ApEvent::StateChanged {
                from: IfaceState::Enabled,
                to: IfaceState::Disabled
            },
        ]
    );
    let calls = radio.take_calls();
    assert!(calls.contains(&ApCall::StaDeauth {
        bss: "wlan0".into(),
        addr: MacAddr::BROADCAST,
        reason: 3
    }));
    assert!(calls.contains(&ApCall::IfRemove { bss: "wlan0_1".into() }));
    assert_eq!(calls.last(), Some(&ApCall::Deinit));
    assert!(iface.bss()[0].station(STA).is_none());
    assert_eq!(iface.next_deadline(), None);

    // A second disable is a no-op, and the interface comes back cleanly.
    iface.disable();
    assert!(radio.calls().is_empty());
    iface.enable().unwrap();
    assert_eq!(iface.state(), IfaceState::Enabled);
    assert_eq!(radio.count(|c| matches!(c, ApCall::IfAdd { .. })), 1);
}

#[test]
fn disable_keeps_retained_ap_pin() {
    let radio = SimRadio::new();
    let wps = BssConfig {
        wps_state: 2,
        ap_pin: Some("12345670".into()),
        ..open("wlan0")
    };
    let mut iface = enabled(&radio, conf(vec![wps.clone()]));
    iface
        .update_bss(BssConfig {
            ap_pin: None,
            ..wps
        })
        .unwrap();
    iface.disable();
    iface.enable().unwrap();
    assert_eq!(iface.bss()[0].ap_pin(), Some("12345670"));
}

#[test]
fn clear_old_flushes_every_bss() {
    let radio = SimRadio::new();
    let mut iface = enabled(&radio, conf(vec![open("wlan0"), open("wlan0_1")]));
    iface.new_assoc_sta("wlan0", STA, AssocFlags::default()).unwrap();
    iface.new_assoc_sta("wlan0_1", STA2, AssocFlags::default()).unwrap();
    radio.take_calls();

    iface.clear_old();
    assert_eq!(iface.bss().iter().flat_map(ApBss::stations).count(), 0);
    assert_eq!(radio.count(|c| matches!(c, ApCall::Flush { .. })), 2);
    assert_eq!(radio.count(|c| matches!(c, ApCall::ClearWep { .. })), 2);
    assert!(iface.bss().iter().all(|b| b.radius().flushes() == 1));
}

// ── BSS add / remove / update ───────────────────────────────────────

#[test]
fn primary_bss_cannot_be_deleted() {
    let radio = SimRadio::new();
    let mut iface = enabled(&radio, conf(vec![open("wlan0"), open("wlan0_1")]));
    let err = iface.del_bss("wlan0").unwrap_err();
    assert_eq!(err.to_string(), "Operation rejected: Could not remove primary interface");
    assert!(matches!(
        iface.del_bss("wlan9"),
        Err(CoreError::BssNameNotFound { .. })
    ));
}

#[test]
fn deleting_a_bss_preserves_order() {
    let radio = SimRadio::new();
    let mut iface = enabled(
        &radio,
        conf(vec![open("wlan0"), open("wlan0_1"), open("wlan0_2"), open("wlan0_3")]),
    );
    iface.del_bss("wlan0_1").unwrap();
    assert_eq!(names(&iface), vec!["wlan0", "wlan0_2", "wlan0_3"]);
    let conf_names: Vec<&str> = iface.conf().bss.iter().map(|b| b.iface.as_str()).collect();
    assert_eq!(conf_names, vec!["wlan0", "wlan0_2", "wlan0_3"]);
    assert!(radio.calls().contains(&ApCall::IfRemove { bss: "wlan0_1".into() }));
}

#[test]
fn add_bss_sets_up_and_commits() {
    let radio = SimRadio::new();
    let mut iface = enabled(&radio, conf(vec![open("wlan0")]));
    iface.add_bss(rsn("wlan0_1")).unwrap();
    assert_eq!(names(&iface), vec!["wlan0", "wlan0_1"]);
    assert!(iface.bss()[1].is_started());
    let calls = radio.calls();
    assert!(calls.iter().any(|c| matches!(c, ApCall::IfAdd { bss, .. } if bss == "wlan0_1")));
    assert!(calls.contains(&ApCall::Commit { bss: "wlan0_1".into() }));

    assert!(matches!(
        iface.add_bss(open("wlan0_1")),
        Err(CoreError::Rejected { .. })
    ));
}

#[test]
fn failed_add_bss_leaves_no_trace() {
    let radio = SimRadio::new();
    let mut iface = enabled(&radio, conf(vec![open("wlan0")]));
    radio.lock().fail_if_add = true;
    assert!(iface.add_bss(open("wlan0_1")).is_err());
    assert_eq!(names(&iface), vec!["wlan0"]);
    assert_eq!(iface.conf().bss.len(), 1);
}

#[test]
fn add_bss_by_name_reads_the_config_source() {
    let radio = SimRadio::new();
    let mut iface = enabled(&radio, conf(vec![open("wlan0")]));
    radio.set_file(conf(vec![open("wlan0"), open("guest")]));
    iface.add_bss_by_name("guest").unwrap();
    assert_eq!(names(&iface), vec!["wlan0", "guest"]);
    assert!(matches!(
        iface.add_bss_by_name("missing"),
        Err(CoreError::BssNameNotFound { .. })
    ));
}

#[test]
fn update_bss_retains_ap_pin_and_flushes_stations() {
    let radio = SimRadio::new();
    let wps = BssConfig {
        wps_state: 2,
        ap_pin: Some("12345670".into()),
        ..open("wlan0")
    };
    let mut iface = enabled(&radio, conf(vec![wps.clone()]));
    iface.new_assoc_sta("wlan0", STA, AssocFlags::default()).unwrap();

    iface
        .update_bss(BssConfig {
            ssid: "lab2".into(),
            ap_pin: None,
            ..wps
        })
        .unwrap();
    let bss = &iface.bss()[0];
    assert_eq!(bss.ap_pin(), Some("12345670"));
    assert_eq!(bss.conf().ssid, "lab2");
    assert!(bss.station(STA).is_none());
    let calls = radio.calls();
    assert!(calls.contains(&ApCall::SetSsid {
        bss: "wlan0".into(),
        ssid: "lab2".into()
    }));
    assert!(calls.contains(&ApCall::Commit { bss: "wlan0".into() }));
}

#[test]
fn dropping_wpa_tears_down_the_authenticator() {
    let radio = SimRadio::new();
    let mut iface = enabled(&radio, conf(vec![rsn("wlan0")]));
    assert!(iface.bss()[0].wpa_auth().is_some());

    iface.update_bss(open("wlan0")).unwrap();
    assert!(iface.bss()[0].wpa_auth().is_none());
    let calls = radio.calls();
    assert!(calls.contains(&ApCall::SetGenericElem {
        bss: "wlan0".into(),
        len: 0
    }));
    assert!(calls.contains(&ApCall::SetIeee8021x {
        bss: "wlan0".into(),
        enabled: false
    }));
}

#[test]
fn enabling_wpa_on_reload_brings_up_authenticator() {
    let radio = SimRadio::new();
    let mut iface = enabled(&radio, conf(vec![open("wlan0")]));
    iface.update_bss(rsn("wlan0")).unwrap();
    let auth = iface.bss()[0].wpa_auth().unwrap();
    assert_eq!(auth.proto(), Proto::RSN);
    assert_eq!(auth.reconfigurations(), 0);

    iface.update_bss(rsn("wlan0")).unwrap();
    assert_eq!(iface.bss()[0].wpa_auth().unwrap().reconfigurations(), 1);
}

// ── Whole-config reload ─────────────────────────────────────────────

#[test]
fn reload_config_applies_diff_by_name() {
    let radio = SimRadio::new();
    let mut iface = enabled(&radio, conf(vec![open("wlan0"), open("wlan0_1")]));
    radio.set_file(conf(vec![open("wlan0"), open("wlan0_2")]));

    iface.reload_config().unwrap();
    assert_eq!(names(&iface), vec!["wlan0", "wlan0_2"]);
    let calls = radio.calls();
    assert!(calls.contains(&ApCall::IfRemove { bss: "wlan0_1".into() }));
    assert!(calls.iter().any(|c| matches!(c, ApCall::IfAdd { bss, .. } if bss == "wlan0_2")));
    assert!(calls.contains(&ApCall::Commit { bss: "wlan0".into() }));
}

#[test]
fn reload_config_follows_new_order_with_primary_first() {
    let radio = SimRadio::new();
    let mut iface = enabled(&radio, conf(vec![open("wlan0"), open("a"), open("b")]));
    radio.set_file(conf(vec![open("b"), open("wlan0"), open("a")]));
    iface.reload_config().unwrap();
    assert_eq!(names(&iface), vec!["wlan0", "b", "a"]);
    assert!(iface.bss()[0].is_primary());
}

#[test]
fn reload_config_keeps_live_radius_client() {
    let radio = SimRadio::new();
    let mut bss = open("wlan0");
    bss.auth_servers = vec!["10.0.0.1".into()];
    let mut iface = enabled(&radio, conf(vec![bss.clone()]));

    bss.auth_servers = vec!["10.0.0.2".into()];
    radio.set_file(conf(vec![bss]));
    iface.reload_config().unwrap();
    let radius = iface.bss()[0].radius();
    assert_eq!(radius.servers(), ["10.0.0.2".to_owned()]);
    assert_eq!(radius.reconfigurations(), 1);
    assert_eq!(radius.flushes(), 1);
}

#[test]
fn reload_config_refuses_to_drop_primary() {
    let radio = SimRadio::new();
    let mut iface = enabled(&radio, conf(vec![open("wlan0"), open("wlan0_1")]));
    radio.set_file(conf(vec![open("wlan0_1")]));
    assert!(matches!(
        iface.reload_config(),
        Err(CoreError::Rejected { .. })
    ));
    assert_eq!(names(&iface), vec!["wlan0", "wlan0_1"]);
}

#[test]
fn reload_config_needs_a_source() {
    let radio = SimRadio::new();
    let mut iface = ApInterface::new(conf(vec![open("wlan0")]), radio.driver(), Box::new(SimPsk));
    iface.enable().unwrap();
    assert!(matches!(
        iface.reload_config(),
        Err(CoreError::Unsupported { .. })
    ));
}

#[test]
fn reload_reapplies_current_config() {
    let radio = SimRadio::new();
    let mut iface = enabled(&radio, conf(vec![rsn("wlan0"), open("wlan0_1")]));
    iface.reload().unwrap();
    assert_eq!(radio.count(|c| matches!(c, ApCall::SetBeacon { .. })), 2);
    assert_eq!(iface.bss()[0].wpa_auth().unwrap().reconfigurations(), 1);
    assert_eq!(iface.bss()[0].conf().wmm_enabled, Some(false));
}

// ── Stations ────────────────────────────────────────────────────────

#[test]
fn open_station_is_authorized_at_once() {
    let radio = SimRadio::new();
    let mut iface = enabled(&radio, conf(vec![open("wlan0")]));
    iface.new_assoc_sta("wlan0", STA, AssocFlags::default()).unwrap();
    let sta = iface.bss()[0].station(STA).unwrap();
    assert!(sta.authorized);
    assert!(sta.accounting);
    assert_eq!(sta.auth_event, None);
    assert_eq!(
        iface.drain_events(),
        vec![ApEvent::StaConnected {
            bss: "wlan0".into(),
            addr: STA
        }]
    );
}

#[test]
fn wpa_station_waits_for_handshake() {
    let radio = SimRadio::new();
    let mut iface = enabled(&radio, conf(vec![rsn("wlan0")]));
    let event = |iface: &mut ApInterface, flags| {
        iface.new_assoc_sta("wlan0", STA, flags).unwrap();
        iface.bss()[0].station(STA).unwrap().auth_event
    };

    assert_eq!(event(&mut iface, AssocFlags::default()), Some(StaAuthEvent::Associated));
    let reassoc = AssocFlags {
        reassoc: true,
        ..AssocFlags::default()
    };
    assert_eq!(event(&mut iface, reassoc), Some(StaAuthEvent::Reauth));
    assert_eq!(
        event(&mut iface, AssocFlags { wps: true, ..reassoc }),
        Some(StaAuthEvent::ReauthEapol)
    );
    assert_eq!(event(&mut iface, AssocFlags { ft: true, ..reassoc }), None);

    let sta = iface.bss()[0].station(STA).unwrap();
    assert!(!sta.authorized);
    assert_eq!(sta.reassociations, 3);
    assert!(iface.drain_events().is_empty());
}

#[test]
fn countermeasures_refuse_new_stations() {
    let radio = SimRadio::new();
    let mut iface = enabled(&radio, conf(vec![rsn("wlan0")]));
    iface.set_tkip_countermeasures(true);
    iface.new_assoc_sta("wlan0", STA, AssocFlags::default()).unwrap();
    assert!(iface.bss()[0].station(STA).is_none());
    assert_eq!(
        radio.calls(),
        vec![ApCall::StaDeauth {
            bss: "wlan0".into(),
            addr: STA,
            reason: 14
        }]
    );
}

#[test]
fn station_moving_between_bsses_is_pruned() {
    let radio = SimRadio::new();
    let mut iface = enabled(&radio, conf(vec![open("wlan0"), open("wlan0_1")]));
    iface.new_assoc_sta("wlan0", STA, AssocFlags::default()).unwrap();
    iface.new_assoc_sta("wlan0_1", STA, AssocFlags::default()).unwrap();
    assert!(iface.bss()[0].station(STA).is_none());
    assert!(iface.bss()[1].station(STA).is_some());
}

#[test]
fn idle_station_is_deauthenticated() {
    let radio = SimRadio::new();
    let mut iface = enabled(&radio, conf(vec![open("wlan0")]));
    iface.new_assoc_sta("wlan0", STA, AssocFlags::default()).unwrap();
    iface.drain_events();

    iface.advance(Duration::from_secs(299));
    assert!(iface.bss()[0].station(STA).is_some());
    iface.advance(Duration::from_secs(300));
    assert!(iface.bss()[0].station(STA).is_none());
    assert!(radio.calls().contains(&ApCall::StaDeauth {
        bss: "wlan0".into(),
        addr: STA,
        reason: 4
    }));
    assert_eq!(
        iface.drain_events(),
        vec![ApEvent::StaDisconnected {
            bss: "wlan0".into(),
            addr: STA
        }]
    );
}

#[test]
fn driver_inactivity_timer_replaces_ours() {
    let radio = SimRadio::new();
    radio.lock().inactivity_timer = true;
    let mut iface = enabled(&radio, conf(vec![open("wlan0")]));
    iface.new_assoc_sta("wlan0", STA, AssocFlags::default()).unwrap();
    assert_eq!(iface.next_deadline(), None);
}

#[test]
fn total_association_limit_is_enforced() {
    let radio = SimRadio::new();
    let mut iface = enabled(
        &radio,
        ApConfig {
            total_assoc_limit: Some(1),
            ..conf(vec![open("wlan0"), open("wlan0_1")])
        },
    );
    iface.new_assoc_sta("wlan0", STA, AssocFlags::default()).unwrap();
    assert!(matches!(
        iface.new_assoc_sta("wlan0_1", STA2, AssocFlags::default()),
        Err(CoreError::Rejected { .. })
    ));
    assert!(radio.calls().contains(&ApCall::StaDeauth {
        bss: "wlan0_1".into(),
        addr: STA2,
        reason: 5
    }));
    // The station already counted may still reassociate.
    let reassoc = AssocFlags {
        reassoc: true,
        ..AssocFlags::default()
    };
    iface.new_assoc_sta("wlan0", STA, reassoc).unwrap();
}

#[test]
fn disconnect_forgets_station() {
    let radio = SimRadio::new();
    let mut iface = enabled(&radio, conf(vec![open("wlan0")]));
    iface.new_assoc_sta("wlan0", STA, AssocFlags::default()).unwrap();
    iface.drain_events();
    iface.sta_disconnected("wlan0", STA).unwrap();
    assert!(iface.bss()[0].station(STA).is_none());
    assert_eq!(iface.next_deadline(), None);
    assert_eq!(iface.drain_events().len(), 1);
}

// ── Channel switch ──────────────────────────────────────────────────

fn csa(freq: u32) -> CsaSettings {
    CsaSettings {
        freq,
        cs_count: 5,
        block_tx: false,
        ht_enabled: false,
        sec_channel_offset: 0,
    }
}

#[test]
fn channel_switch_runs_one_at_a_time() {
    let radio = SimRadio::new();
    let mut iface = enabled(&radio, conf(vec![open("wlan0")]));

    iface.switch_channel(csa(2462)).unwrap();
    assert!(iface.csa_in_progress());
    assert!(matches!(
        iface.switch_channel(csa(2412)),
        Err(CoreError::Rejected { .. })
    ));

    iface.channel_switch_done(2462);
    assert!(!iface.csa_in_progress());
    assert_eq!(iface.freq(), 2462);
    assert_eq!(iface.conf().channel, 11);
    assert_eq!(
        iface.drain_events(),
        vec![
            ApEvent::ChannelSwitchStarted { freq: 2462 },
            ApEvent::ChannelSwitchFinished { freq: 2462 },
        ]
    );
}

#[test]
fn channel_switch_needs_an_operating_channel() {
    let radio = SimRadio::new();
    let mut iface = iface(&radio, conf(vec![open("wlan0")]));
    assert!(matches!(
        iface.switch_channel(csa(2462)),
        Err(CoreError::Rejected { .. })
    ));
}

#[test]
fn failed_channel_switch_clears_state() {
    let radio = SimRadio::new();
    let mut iface = enabled(&radio, conf(vec![open("wlan0")]));
    assert!(matches!(
        iface.switch_channel(csa(3000)),
        Err(CoreError::ValidationFailed { .. })
    ));
    radio.lock().fail_switch = true;
    assert!(iface.switch_channel(csa(2462)).is_err());
    assert!(!iface.csa_in_progress());
    assert_eq!(iface.freq(), 2437);
}

// ── Registry ────────────────────────────────────────────────────────

#[test]
fn registry_removes_interfaces_and_bsses() {
    let radio0 = SimRadio::new();
    let radio1 = SimRadio::new();
    let mut reg = ApRegistry::new();
    reg.add_iface(enabled(&radio0, conf(vec![open("wlan0"), open("wlan0_1")])))
        .unwrap();
    reg.add_iface(enabled(&radio1, conf(vec![open("wlan1")])))
        .unwrap();
    assert!(matches!(
        reg.add_iface(iface(&radio1, conf(vec![open("wlan1")]))),
        Err(CoreError::Rejected { .. })
    ));

    match reg.remove_iface("wlan0_1").unwrap() {
        Removed::Bss { iface } => assert_eq!(iface, "wlan0"),
        Removed::Interface(_) => panic!("expected BSS removal"),
    }
    assert_eq!(reg.get("wlan0").unwrap().bss().len(), 1);

    match reg.remove_iface("wlan1").unwrap() {
        Removed::Interface(iface) => assert_eq!(iface.state(), IfaceState::Disabled),
        Removed::Bss { .. } => panic!("expected interface removal"),
    }
    assert_eq!(reg.len(), 1);
    assert!(matches!(
        reg.remove_iface("wlan7"),
        Err(CoreError::InterfaceNotFound { .. })
    ));
}

#[test]
fn registry_tags_events_and_drives_timers() {
    let radio = SimRadio::new();
    let mut reg = ApRegistry::new();
    let iface = reg
        .add_iface(enabled(&radio, conf(vec![open("wlan0")])))
        .unwrap();
    iface.new_assoc_sta("wlan0", STA, AssocFlags::default()).unwrap();
    assert_eq!(reg.next_deadline(), Some(Duration::from_secs(300)));

    reg.advance(Duration::from_secs(300));
    let events = reg.drain_events();
    assert_eq!(events.len(), 2);
    assert!(events.iter().all(|(name, _)| name == "wlan0"));
}
