// ── Per-BSS runtime state ──
//
// Every BSS on a radio shares the driver but owns its configuration,
// authenticator, WPS registrar, RADIUS client, and station table.

use indexmap::IndexMap;
use serde::Serialize;

use crate::ap::config::BssConfig;
use crate::ie::wpa::{ParsedSecurityIe, build_security_ie};
use crate::model::{Cipher, KeyMgmt, MacAddr, Proto};

/// What the authenticator was told about a newly associated station.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StaAuthEvent {
    Associated,
    /// Reassociation without FT: restart the 4-way handshake.
    Reauth,
    /// Reassociation during WPS: restart EAPOL only.
    ReauthEapol,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApStation {
    pub addr: MacAddr,
    pub authorized: bool,
    pub accounting: bool,
    pub ieee8021x: bool,
    pub wps: bool,
    pub auth_event: Option<StaAuthEvent>,
    pub reassociations: u32,
}

impl ApStation {
    fn new(addr: MacAddr) -> Self {
        Self {
            addr,
            authorized: false,
            accounting: false,
            ieee8021x: false,
            wps: false,
            auth_event: None,
            reassociations: 0,
        }
    }
}

/// WPA/RSN authenticator as far as the lifecycle manager cares: the
/// elements it advertises and the PSK it checks against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WpaAuthenticator {
    proto: Proto,
    ie: Vec<u8>,
    psk: Option<[u8; 32]>,
    reconfigurations: u32,
}

impl WpaAuthenticator {
    pub(crate) fn new(conf: &BssConfig, psk: Option<[u8; 32]>) -> Self {
        Self {
            proto: conf.wpa,
            ie: advertised_elements(conf),
            psk,
            reconfigurations: 0,
        }
    }

    pub(crate) fn reconfigure(&mut self, conf: &BssConfig, psk: Option<[u8; 32]>) {
        self.proto = conf.wpa;
        self.ie = advertised_elements(conf);
        self.psk = psk;
        self.reconfigurations += 1;
    }

    pub fn proto(&self) -> Proto {
        self.proto
    }

    /// WPA and/or RSN elements for beacons and probe responses.
    pub fn ie(&self) -> &[u8] {
        &self.ie
    }

    pub fn psk(&self) -> Option<&[u8; 32]> {
        self.psk.as_ref()
    }

    pub fn reconfigurations(&self) -> u32 {
        self.reconfigurations
    }
}

fn advertised_elements(conf: &BssConfig) -> Vec<u8> {
    let key_mgmt = if conf.ieee8021x {
        KeyMgmt::IEEE8021X
    } else {
        KeyMgmt::PSK
    };
    // Mixed mode keeps a TKIP group key so legacy WPA clients can join.
    let group = if conf.wpa.contains(Proto::WPA) {
        Cipher::TKIP
    } else {
        Cipher::CCMP
    };
    let mut out = Vec::new();
    if conf.wpa.contains(Proto::WPA) {
        out.extend(build_security_ie(&ParsedSecurityIe {
            proto: Proto::WPA,
            group,
            pairwise: Cipher::TKIP,
            key_mgmt,
            ..ParsedSecurityIe::default()
        }));
    }
    if conf.wpa.contains(Proto::RSN) {
        out.extend(build_security_ie(&ParsedSecurityIe {
            proto: Proto::RSN,
            group,
            pairwise: Cipher::CCMP,
            key_mgmt,
            ..ParsedSecurityIe::default()
        }));
    }
    out
}

/// WPS registrar state that outlives a reload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WpsRegistrar {
    pub ap_pin: Option<String>,
}

/// RADIUS client. Reconfiguration updates the server list in place so
/// pending exchanges survive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RadiusClient {
    servers: Vec<String>,
    reconfigurations: u32,
    flushes: u32,
}

impl RadiusClient {
    fn new(servers: &[String]) -> Self {
        Self {
            servers: servers.to_vec(),
            ..Self::default()
        }
    }

    pub(crate) fn reconfigure(&mut self, servers: &[String]) {
        servers.clone_into(&mut self.servers);
        self.reconfigurations += 1;
    }

    pub(crate) fn flush(&mut self) {
        self.flushes += 1;
    }

    pub fn servers(&self) -> &[String] {
        &self.servers
    }

    pub fn reconfigurations(&self) -> u32 {
        self.reconfigurations
    }

    pub fn flushes(&self) -> u32 {
        self.flushes
    }
}

/// One virtual AP on the radio.
#[derive(Debug, Clone)]
pub struct ApBss {
    pub(crate) conf: BssConfig,
    pub(crate) own_addr: MacAddr,
    pub(crate) primary: bool,
    pub(crate) started: bool,
    pub(crate) interface_added: bool,
    pub(crate) psk: Option<[u8; 32]>,
    pub(crate) wpa_auth: Option<WpaAuthenticator>,
    pub(crate) wps: Option<WpsRegistrar>,
    pub(crate) radius: RadiusClient,
    pub(crate) stations: IndexMap<MacAddr, ApStation>,
}

impl ApBss {
    pub(crate) fn new(conf: BssConfig) -> Self {
        let radius = RadiusClient::new(&conf.auth_servers);
        Self {
            conf,
            own_addr: MacAddr::ZERO,
            primary: false,
            started: false,
            interface_added: false,
            psk: None,
            wpa_auth: None,
            wps: None,
            radius,
            stations: IndexMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.conf.iface
    }

    pub fn conf(&self) -> &BssConfig {
        &self.conf
    }

    pub fn own_addr(&self) -> MacAddr {
        self.own_addr
    }

    pub fn is_primary(&self) -> bool {
        self.primary
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    pub fn psk(&self) -> Option<&[u8; 32]> {
        self.psk.as_ref()
    }

    pub fn wpa_auth(&self) -> Option<&WpaAuthenticator> {
        self.wpa_auth.as_ref()
    }

    pub fn ap_pin(&self) -> Option<&str> {
        self.wps.as_ref().and_then(|w| w.ap_pin.as_deref())
    }

    pub fn radius(&self) -> &RadiusClient {
        &self.radius
    }

    pub fn stations(&self) -> impl Iterator<Item = &ApStation> {
        self.stations.values()
    }

    pub fn station(&self, addr: MacAddr) -> Option<&ApStation> {
        self.stations.get(&addr)
    }

    pub(crate) fn station_entry(&mut self, addr: MacAddr) -> &mut ApStation {
        self.stations
            .entry(addr)
            .or_insert_with(|| ApStation::new(addr))
    }

    /// Tear down the WPS registrar, keeping its AP PIN for the next init.
    pub(crate) fn deinit_wps(&mut self) -> Option<String> {
        self.wps.take().and_then(|w| w.ap_pin)
    }

    pub(crate) fn init_wps(&mut self, retained_pin: Option<String>) {
        if !self.conf.wps_enabled() {
            self.wps = None;
            return;
        }
        let ap_pin = self.conf.ap_pin.clone().or(retained_pin);
        self.wps = Some(WpsRegistrar { ap_pin });
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::ie::wpa::parse_security_ie;
    use pretty_assertions::assert_eq;

    #[test]
    fn rsn_only_advertises_ccmp() {
        let conf = BssConfig {
            wpa: Proto::RSN,
            wpa_passphrase: Some("password123".into()),
            ..BssConfig::new("wlan0", "lab")
        };
        let auth = WpaAuthenticator::new(&conf, None);
        let ie = parse_security_ie(auth.ie()).unwrap();
        assert_eq!(ie.proto, Proto::RSN);
        assert_eq!(ie.group, Cipher::CCMP);
        assert_eq!(ie.key_mgmt, KeyMgmt::PSK);
    }

    #[test]
    fn mixed_mode_emits_both_elements() {
        let conf = BssConfig {
            wpa: Proto::WPA | Proto::RSN,
            ieee8021x: true,
            ..BssConfig::new("wlan0", "lab")
        };
        let ie = advertised_elements(&conf);
        // Vendor-specific WPA element first, then RSN.
        assert_eq!(ie[0], 0xdd);
        let rsn_at = 2 + usize::from(ie[1]);
        assert_eq!(ie[rsn_at], 0x30);
    }

    #[test]
    fn configured_pin_beats_retained_pin() {
        let mut bss = ApBss::new(BssConfig {
            wps_state: 2,
            ap_pin: Some("12345670".into()),
            ..BssConfig::new("wlan0", "lab")
        });
        bss.init_wps(Some("00000000".into()));
        assert_eq!(bss.ap_pin(), Some("12345670"));

        bss.conf.ap_pin = None;
        let kept = bss.deinit_wps();
        bss.init_wps(kept);
        assert_eq!(bss.ap_pin(), Some("12345670"));
    }

    #[test]
    fn wps_disabled_drops_registrar() {
        let mut bss = ApBss::new(BssConfig::new("wlan0", "lab"));
        bss.init_wps(Some("12345670".into()));
        assert_eq!(bss.ap_pin(), None);
    }
}
