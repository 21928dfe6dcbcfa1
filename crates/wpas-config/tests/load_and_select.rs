//! A station built from a config file picks the right network.

#![allow(clippy::unwrap_used)]

use pretty_assertions::assert_eq;
use wpas_config::{FileBackend, read_config_file};
use wpas_core::model::ScanResultBuilder;
use wpas_core::sim::SimWorld;
use wpas_core::{DriverEvent, MacAddr, ProfileId, Station};

const RSN_PSK_CCMP: [u8; 22] = [
    48, 20, 1, 0, 0x00, 0x0f, 0xac, 4, 1, 0, 0x00, 0x0f, 0xac, 4, 1, 0, 0x00, 0x0f, 0xac, 2, 0, 0,
];

const CONFIG: &str = r#"
[station]
ifname = "wlan2"
scan_interval = 7

[[networks]]
ssid = "office"
security = "wpa2-eap"
priority = 5
disabled = true

[[networks]]
ssid = "home"
security = "wpa2-psk"
passphrase = "correct horse"
priority = 1
"#;

#[test]
fn configured_station_joins_enabled_network() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, CONFIG).unwrap();

    let cfg = read_config_file(&path).unwrap();
    assert!(cfg.problems().is_empty());
    let opts = cfg.station_options().unwrap();
    assert_eq!(opts.ifname, "wlan2");

    let world = SimWorld::new();
    let mut collab = world.collaborators();
    collab.config = Some(Box::new(FileBackend::new(&path)));
    let mut st = Station::new(opts, collab, cfg.profile_store().unwrap(), None).unwrap();

    let home = MacAddr::new([2, 0, 0, 0, 0, 1]);
    world.set_scan_results(vec![
        ScanResultBuilder::new(home, 2437, -60)
            .ssid("home")
            .privacy()
            .element(&RSN_PSK_CCMP)
            .build(),
    ]);
    st.handle_event(DriverEvent::ScanResults);

    assert_eq!(st.current(), Some(ProfileId(1)));
    assert!(st.current_profile().unwrap().psk.is_some());
    assert_eq!(world.associations().len(), 1);
}
