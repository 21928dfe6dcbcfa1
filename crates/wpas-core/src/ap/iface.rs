// ── AP interface lifecycle ──
//
// Bring-up runs UNINITIALIZED → (COUNTRY_UPDATE) → (ACS | HT_SCAN | DFS)
// → ENABLED, with any failure landing in DISABLED. Steps that wait on
// the radio return early and resume through `channel_list_updated`,
// the channel-list timer, or `setup_complete`.
//
// Every reconfiguration pass deauthenticates all stations and flushes
// keys before touching a BSS.

use std::fmt;
use std::time::Duration;

use serde::Serialize;
use strum::Display;
use tracing::{debug, error, info, warn};

use crate::ap::bss::{ApBss, StaAuthEvent, WpaAuthenticator};
use crate::ap::config::{ApConfig, BssConfig, MAX_BSSID};
use crate::ap::driver::{
    ApConfigSource, ApDriver, CsaSettings, PskDeriver, RegdomInitiator, SetupStep,
};
use crate::error::CoreError;
use crate::model::{MacAddr, ReasonCode};
use crate::timer::TimerQueue;

/// How long bring-up waits for the regulatory update after a country
/// change before carrying on regardless.
pub const CHANNEL_LIST_UPDATE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Display)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum IfaceState {
    Uninitialized,
    Disabled,
    CountryUpdate,
    Acs,
    HtScan,
    Dfs,
    Enabled,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum ApTimer {
    ChannelListUpdate,
    Inactivity(MacAddr),
}

/// How a station came to be associated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AssocFlags {
    pub reassoc: bool,
    /// Station is running WPS.
    pub wps: bool,
    /// Fast BSS transition.
    pub ft: bool,
}

/// Control-interface event from the AP side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ApEvent {
    StateChanged { from: IfaceState, to: IfaceState },
    Enabled,
    Disabled,
    StaConnected { bss: String, addr: MacAddr },
    StaDisconnected { bss: String, addr: MacAddr },
    ChannelSwitchStarted { freq: u32 },
    ChannelSwitchFinished { freq: u32 },
}

impl fmt::Display for ApEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StateChanged { from, to } => write!(f, "interface state {from}->{to}"),
            Self::Enabled => f.write_str("AP-ENABLED "),
            Self::Disabled => f.write_str("AP-DISABLED "),
            Self::StaConnected { addr, .. } => write!(f, "AP-STA-CONNECTED {addr}"),
            Self::StaDisconnected { addr, .. } => write!(f, "AP-STA-DISCONNECTED {addr}"),
            Self::ChannelSwitchStarted { freq } => {
                write!(f, "CTRL-EVENT-STARTED-CHANNEL-SWITCH freq={freq}")
            }
            Self::ChannelSwitchFinished { freq } => write!(f, "AP-CSA-FINISHED freq={freq}"),
        }
    }
}

/// One radio and the BSSes it hosts.
pub struct ApInterface {
    conf: ApConfig,
    bss: Vec<ApBss>,
    driver: Box<dyn ApDriver>,
    psk: Box<dyn PskDeriver>,
    source: Option<Box<dyn ApConfigSource>>,
    state: IfaceState,
    phy: Option<String>,
    freq: u32,
    driver_ready: bool,
    wait_channel_update: bool,
    csa: Option<CsaSettings>,
    tkip_countermeasures: bool,
    default_pbc_bss: Option<String>,
    timers: TimerQueue<ApTimer>,
    outbox: Vec<ApEvent>,
}

impl fmt::Debug for ApInterface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApInterface")
            .field("name", &self.name())
            .field("state", &self.state)
            .field("freq", &self.freq)
            .field("bss", &self.bss.len())
            .finish_non_exhaustive()
    }
}

impl ApInterface {
    pub fn new(conf: ApConfig, driver: Box<dyn ApDriver>, psk: Box<dyn PskDeriver>) -> Self {
        let bss = conf.bss.iter().cloned().map(ApBss::new).collect();
        Self {
            conf,
            bss,
            driver,
            psk,
            source: None,
            state: IfaceState::Uninitialized,
            phy: None,
            freq: 0,
            driver_ready: false,
            wait_channel_update: false,
            csa: None,
            tkip_countermeasures: false,
            default_pbc_bss: None,
            timers: TimerQueue::new(),
            outbox: Vec::new(),
        }
    }

    /// Where `reload_config` and the by-name BSS operations read from.
    #[must_use]
    pub fn with_config_source(mut self, source: Box<dyn ApConfigSource>) -> Self {
        self.source = Some(source);
        self
    }

    // ── Accessors ───────────────────────────────────────────────────

    /// Name of the primary BSS, which is also the radio's interface.
    pub fn name(&self) -> &str {
        self.bss.first().map_or("", ApBss::name)
    }

    pub fn state(&self) -> IfaceState {
        self.state
    }

    pub fn conf(&self) -> &ApConfig {
        &self.conf
    }

    pub fn bss(&self) -> &[ApBss] {
        &self.bss
    }

    pub fn find_bss(&self, name: &str) -> Option<&ApBss> {
        self.bss.iter().find(|b| b.name() == name)
    }

    pub fn phy(&self) -> Option<&str> {
        self.phy.as_deref()
    }

    /// Operating frequency; zero until bring-up picked a channel.
    pub fn freq(&self) -> u32 {
        self.freq
    }

    pub fn is_enabled(&self) -> bool {
        self.driver_ready
    }

    pub fn waiting_for_channel_list(&self) -> bool {
        self.wait_channel_update
    }

    pub fn csa_in_progress(&self) -> bool {
        self.csa.is_some()
    }

    pub fn default_pbc_bss(&self) -> Option<&str> {
        self.default_pbc_bss.as_deref()
    }

    pub fn set_tkip_countermeasures(&mut self, active: bool) {
        self.tkip_countermeasures = active;
    }

    pub fn drain_events(&mut self) -> Vec<ApEvent> {
        std::mem::take(&mut self.outbox)
    }

    fn position(&self, name: &str) -> Result<usize, CoreError> {
        self.bss
            .iter()
            .position(|b| b.name() == name)
            .ok_or_else(|| CoreError::BssNameNotFound { name: name.into() })
    }

    fn set_state(&mut self, to: IfaceState) {
        let from = self.state;
        if from == to {
            return;
        }
        info!("{}: interface state {from}->{to}", self.name());
        self.state = to;
        self.outbox.push(ApEvent::StateChanged { from, to });
    }

    // ── Timers ──────────────────────────────────────────────────────

    pub fn next_deadline(&self) -> Option<Duration> {
        self.timers.next_deadline()
    }

    pub fn advance(&mut self, now: Duration) {
        while let Some(timer) = self.timers.pop_due(now) {
            match timer {
                ApTimer::ChannelListUpdate => self.channel_list_update_timeout(),
                ApTimer::Inactivity(addr) => self.station_inactive(addr),
            }
        }
        self.timers.set_now(now);
    }

    fn channel_list_update_timeout(&mut self) {
        if !self.wait_channel_update {
            info!("Channel list update timeout, but interface was not waiting");
            return;
        }
        // Proceed anyway; the update may have been lost.
        info!("Channel list update timeout - try to continue anyway");
        if let Err(err) = self.setup_interface2() {
            warn!(iface = %self.name(), %err, "setup after channel list timeout failed");
        }
    }

    fn station_inactive(&mut self, addr: MacAddr) {
        let Some(idx) = self.bss.iter().position(|b| b.stations.contains_key(&addr)) else {
            return;
        };
        let name = self.bss[idx].name().to_owned();
        info!(bss = %name, %addr, "station inactive, deauthenticating");
        let reason = ReasonCode::DISASSOC_DUE_TO_INACTIVITY;
        if let Err(err) = self.driver.sta_deauth(&name, addr, reason) {
            debug!(%err, "inactivity deauth failed");
        }
        self.bss[idx].stations.shift_remove(&addr);
        self.outbox.push(ApEvent::StaDisconnected { bss: name, addr });
    }

    // ── Bring-up ────────────────────────────────────────────────────

    /// Bring the driver up and start interface setup. Fails if the
    /// interface is already enabled.
    pub fn enable(&mut self) -> Result<(), CoreError> {
        if self.driver_ready {
            return Err(CoreError::Rejected {
                message: format!("interface {} already enabled", self.name()),
            });
        }
        self.conf.check().inspect_err(|_| {
            error!("Invalid configuration - cannot enable");
        })?;
        let name = self.name().to_owned();
        self.driver.init(&name)?;
        self.driver_ready = true;
        if let Err(err) = self.setup() {
            error!(iface = %name, %err, "enable failed");
            self.driver.deinit();
            self.driver_ready = false;
            return Err(err);
        }
        Ok(())
    }

    fn setup(&mut self) -> Result<(), CoreError> {
        let Some(first) = self.bss.first_mut() else {
            return Err(CoreError::ValidationFailed {
                message: "no BSS configured".into(),
            });
        };
        first.primary = true;
        self.default_pbc_bss = Some(first.name().to_owned());
        self.phy = self.driver.radio_name();
        self.validate_bssids()?;

        if let Some(country) = self.conf.country.clone() {
            let previous = self.driver.get_country();
            self.set_state(IfaceState::CountryUpdate);
            self.driver.set_country(&country).inspect_err(|_| {
                error!("Failed to set country code");
            })?;
            let unchanged = previous
                .as_deref()
                .is_some_and(|p| p.eq_ignore_ascii_case(&country));
            if !unchanged {
                debug!("Continue interface setup after channel list update");
                self.wait_channel_update = true;
                self.timers
                    .schedule(ApTimer::ChannelListUpdate, CHANNEL_LIST_UPDATE_TIMEOUT);
                return Ok(());
            }
        }
        self.setup_interface2()
    }

    /// Configured BSSIDs may not clash with each other or with the
    /// radio's own address on a secondary BSS.
    fn validate_bssids(&self) -> Result<(), CoreError> {
        let radio = self.driver.own_addr();
        for bss in self.bss.iter().skip(1) {
            if bss.conf.bssid == Some(radio) {
                return Err(CoreError::ValidationFailed {
                    message: format!("{}: BSSID {radio} belongs to the primary BSS", bss.name()),
                });
            }
        }
        Ok(())
    }

    /// The regulatory domain changed. Resumes bring-up when it was
    /// waiting on a user-initiated change.
    pub fn channel_list_updated(&mut self, initiator: RegdomInitiator) -> Result<(), CoreError> {
        if !self.wait_channel_update || initiator != RegdomInitiator::User {
            return Ok(());
        }
        debug!("Channel list updated - continue setup");
        self.timers.cancel(ApTimer::ChannelListUpdate);
        self.setup_interface2()
    }

    fn setup_interface2(&mut self) -> Result<(), CoreError> {
        self.wait_channel_update = false;

        if self.driver.hw_features().is_some() {
            match self.driver.select_hw_mode(&self.conf) {
                Err(err) => {
                    error!("Could not select hw_mode and channel");
                    return self.setup_complete(Err(err));
                }
                Ok(SetupStep::Pending) => {
                    self.set_state(IfaceState::Acs);
                    return Ok(());
                }
                Ok(SetupStep::Ready) => {}
            }
            match self.driver.check_ht_capab(&self.conf) {
                Err(err) => return self.setup_complete(Err(err)),
                Ok(SetupStep::Pending) => {
                    debug!("Interface initialization will be completed in a callback");
                    self.set_state(IfaceState::HtScan);
                    return Ok(());
                }
                Ok(SetupStep::Ready) => {}
            }
        } else {
            // Not every driver reports hardware features.
            debug!("continuing without hw feature data");
        }
        self.setup_complete(Ok(()))
    }

    /// Finish bring-up. `result` carries the outcome of whatever
    /// asynchronous step (ACS, HT scan, CAC) the driver ran.
    pub fn setup_complete(&mut self, result: Result<(), CoreError>) -> Result<(), CoreError> {
        let after_cac = self.state == IfaceState::Dfs;
        let outcome = result.and_then(|()| self.complete_setup(after_cac));
        match outcome {
            Ok(()) => Ok(()),
            Err(err) => {
                error!(iface = %self.name(), %err, "Interface initialization failed");
                self.set_state(IfaceState::Disabled);
                Err(err)
            }
        }
    }

    fn complete_setup(&mut self, after_cac: bool) -> Result<(), CoreError> {
        debug!(iface = %self.name(), "Completing interface initialization");
        if self.conf.channel != 0 {
            let channel = self.conf.channel;
            let freq = self
                .driver
                .channel_to_freq(channel)
                .ok_or_else(|| CoreError::ValidationFailed {
                    message: format!("channel {channel} not supported by the radio"),
                })?;
            self.freq = freq;
            info!(
                "Mode: IEEE 802.11{} Channel: {channel} Frequency: {freq} MHz",
                self.conf
                    .hw_mode
                    .map_or_else(|| "any".to_owned(), |m| format!("{m:?}").to_lowercase())
            );
            if self.conf.ieee80211h
                && !after_cac
                && self.driver.handle_dfs(freq)? == SetupStep::Pending
            {
                self.set_state(IfaceState::Dfs);
                return Ok(());
            }
            self.driver
                .set_freq(freq, self.conf.ieee80211n)
                .inspect_err(|_| error!("Could not set channel for kernel driver"))?;
        }
        if let Some(rts) = self.conf.rts_threshold {
            self.driver
                .set_rts(rts)
                .inspect_err(|_| error!("Could not set RTS threshold for kernel driver"))?;
        }
        if let Some(frag) = self.conf.fragm_threshold {
            self.driver.set_frag(frag).inspect_err(|_| {
                error!("Could not set fragmentation threshold for kernel driver");
            })?;
        }

        for idx in 0..self.bss.len() {
            self.setup_bss(idx, idx == 0)?;
        }
        let primary = self.name().to_owned();
        self.driver.commit(&primary)?;

        self.set_state(IfaceState::Enabled);
        self.outbox.push(ApEvent::Enabled);
        info!("{primary}: AP-ENABLED");
        Ok(())
    }

    fn setup_bss(&mut self, idx: usize, first: bool) -> Result<(), CoreError> {
        if self.bss[idx].started {
            return Ok(());
        }
        let name = self.bss[idx].name().to_owned();
        if first {
            let addr = self.bss[idx].conf.bssid.unwrap_or_else(|| self.driver.own_addr());
            self.bss[idx].own_addr = addr;
        } else {
            let addr = self
                .driver
                .if_add(&name, self.bss[idx].conf.bssid)
                .inspect_err(|_| error!("Failed to add BSS {name}"))?;
            self.bss[idx].own_addr = addr;
            self.bss[idx].interface_added = true;
        }
        debug!(bss = %name, bssid = %self.bss[idx].own_addr, "setting up BSS");

        self.flush_old_stations(idx, ReasonCode::PREV_AUTH_NOT_VALID);
        self.driver.set_privacy(&name, false)?;
        self.driver.clear_wep(&name);
        setup_encryption(&mut *self.driver, &self.bss[idx].conf)?;

        let ssid = self.bss[idx].conf.ssid.clone();
        if self.driver.get_ssid(&name).as_deref() != Some(ssid.as_bytes()) {
            self.driver
                .set_ssid(&name, ssid.as_bytes())
                .inspect_err(|_| error!("Could not set SSID for kernel driver"))?;
        }

        let psk = derive_psk(&*self.psk, &self.bss[idx].conf)?;
        let bss = &mut self.bss[idx];
        bss.psk = psk;
        self.driver.set_ieee8021x(&name, bss.conf.needs_port_auth())?;
        if bss.conf.wpa_enabled() {
            let auth = WpaAuthenticator::new(&bss.conf, psk);
            self.driver.set_generic_elem(&name, auth.ie())?;
            bss.wpa_auth = Some(auth);
        }
        bss.init_wps(None);
        self.driver
            .set_broadcast_ssid(&name, bss.conf.ignore_broadcast_ssid)?;
        if let Some(limit) = bss.conf.max_num_sta {
            self.driver.set_assoc_limit(&name, limit)?;
        }
        self.driver.set_beacon(&name)?;
        bss.started = true;
        Ok(())
    }

    // ── Teardown ────────────────────────────────────────────────────

    /// Deauthenticate everyone and take the radio down. Disabling an
    /// interface that is not enabled is a no-op.
    pub fn disable(&mut self) {
        if !self.driver_ready {
            info!(iface = %self.name(), "Disable: interface already disabled");
            return;
        }
        self.outbox.push(ApEvent::Disabled);
        info!("{}: AP-DISABLED", self.name());

        for idx in 0..self.bss.len() {
            self.flush_old_stations(idx, ReasonCode::DEAUTH_LEAVING);
            let bss = &mut self.bss[idx];
            let name = bss.conf.iface.clone();
            self.driver.clear_wep(&name);
            bss.wpa_auth = None;
            // Keep the PIN in the config copy so re-enable restores it.
            if let Some(pin) = bss.deinit_wps() {
                bss.conf.ap_pin.get_or_insert(pin);
            }
            bss.started = false;
            if bss.interface_added {
                if let Err(err) = self.driver.if_remove(&name) {
                    warn!(bss = %name, %err, "failed to remove BSS interface");
                }
                bss.interface_added = false;
            }
        }
        self.driver.deinit();
        self.driver_ready = false;

        self.timers.cancel(ApTimer::ChannelListUpdate);
        self.wait_channel_update = false;
        self.csa = None;
        self.freq = 0;
        self.set_state(IfaceState::Disabled);
    }

    /// Drop every station of one BSS.
    fn flush_old_stations(&mut self, idx: usize, reason: ReasonCode) {
        let name = self.bss[idx].name().to_owned();
        debug!(bss = %name, "Flushing old station entries");
        if let Err(err) = self.driver.flush(&name) {
            warn!(bss = %name, %err, "Could not connect to kernel driver");
        }
        debug!(bss = %name, "Deauthenticate all stations");
        if let Err(err) = self.driver.sta_deauth(&name, MacAddr::BROADCAST, reason) {
            debug!(bss = %name, %err, "broadcast deauth failed");
        }
        for (addr, _) in self.bss[idx].stations.drain(..) {
            self.timers.cancel(ApTimer::Inactivity(addr));
        }
    }

    /// Kick every station off every BSS and flush broadcast keys and
    /// RADIUS state ahead of a reconfiguration.
    pub fn clear_old(&mut self) {
        for idx in 0..self.bss.len() {
            self.flush_old_stations(idx, ReasonCode::PREV_AUTH_NOT_VALID);
            let name = self.bss[idx].name().to_owned();
            self.driver.clear_wep(&name);
            self.bss[idx].radius.flush();
        }
    }

    // ── Reconfiguration ─────────────────────────────────────────────

    /// Re-apply the in-memory configuration to every BSS.
    pub fn reload(&mut self) -> Result<(), CoreError> {
        self.conf.check().inspect_err(|_| {
            error!("Updated configuration is invalid");
        })?;
        self.clear_old();
        for idx in 0..self.bss.len() {
            self.reload_bss(idx)?;
        }
        Ok(())
    }

    /// Push one BSS's (possibly changed) configuration to the driver,
    /// bringing WPA up, reconfiguring it, or tearing it down.
    fn reload_bss(&mut self, idx: usize) -> Result<(), CoreError> {
        let name = self.bss[idx].name().to_owned();
        let ht = self.conf.ieee80211n;
        let psk = derive_psk(&*self.psk, &self.bss[idx].conf)?;
        let bss = &mut self.bss[idx];

        let servers = bss.conf.auth_servers.clone();
        bss.radius.reconfigure(&servers);
        bss.conf.wmm_enabled.get_or_insert(ht);
        bss.psk = psk;

        if let Err(err) = self.driver.set_ieee8021x(&name, bss.conf.needs_port_auth()) {
            warn!(bss = %name, %err, "Could not set IEEE 802.1X mode");
        }

        if bss.conf.wpa_enabled() {
            let ie = match &mut bss.wpa_auth {
                Some(auth) => {
                    auth.reconfigure(&bss.conf, psk);
                    auth.ie().to_vec()
                }
                slot @ None => slot
                    .insert(WpaAuthenticator::new(&bss.conf, psk))
                    .ie()
                    .to_vec(),
            };
            if let Err(err) = self.driver.set_generic_elem(&name, &ie) {
                error!(bss = %name, %err, "Failed to configure WPA IE for the kernel driver");
            }
        } else if bss.wpa_auth.is_some() {
            debug!(bss = %name, "disabling WPA");
            for sta in bss.stations.values_mut() {
                sta.auth_event = None;
            }
            bss.wpa_auth = None;
            self.driver.set_privacy(&name, false)?;
            self.driver.clear_wep(&name);
            setup_encryption(&mut *self.driver, &bss.conf)?;
            self.driver.set_generic_elem(&name, &[])?;
        }

        if let Err(err) = self
            .driver
            .set_broadcast_ssid(&name, bss.conf.ignore_broadcast_ssid)
        {
            warn!(bss = %name, %err, "Could not modify broadcast SSID flag");
        }
        if let Err(err) = self.driver.set_beacon(&name) {
            warn!(bss = %name, %err, "Failed to update beacon");
        }

        let retained = bss.deinit_wps();
        bss.init_wps(retained);

        if let Err(err) = self.driver.set_ssid(&name, bss.conf.ssid.as_bytes()) {
            error!(bss = %name, %err, "Could not set SSID for kernel driver");
        }
        if let Some(limit) = bss.conf.max_num_sta {
            if let Err(err) = self.driver.set_assoc_limit(&name, limit) {
                warn!(bss = %name, %err, "Could not set association limit");
            }
        }
        debug!(bss = %name, "Reconfigured interface");
        Ok(())
    }

    fn read_source(&mut self) -> Result<ApConfig, CoreError> {
        let source = self.source.as_mut().ok_or_else(|| CoreError::Unsupported {
            operation: "configuration re-read".into(),
        })?;
        source.read()
    }

    /// Re-read the configuration and apply it BSS by BSS, matching on
    /// interface name. BSSes missing from the new file are removed, new
    /// ones are created, and surviving ones keep their AP PIN and live
    /// RADIUS client.
    pub fn reload_config(&mut self) -> Result<(), CoreError> {
        let newconf = self.read_source()?;
        newconf.check()?;
        let primary = self.name().to_owned();
        if newconf.find_bss(&primary).is_none() {
            return Err(CoreError::Rejected {
                message: format!("new configuration drops primary BSS {primary}"),
            });
        }

        self.clear_old();

        let mut idx = self.bss.len();
        while idx > 1 {
            idx -= 1;
            if newconf.find_bss(self.bss[idx].name()).is_none() {
                info!(bss = %self.bss[idx].name(), "BSS removed from configuration");
                self.remove_bss(idx);
            }
        }

        for conf in &newconf.bss {
            match self.bss.iter().position(|b| b.name() == conf.iface) {
                Some(idx) => {
                    self.bss[idx].conf = conf.clone();
                    self.reload_bss(idx)?;
                }
                None => {
                    self.bss.push(ApBss::new(conf.clone()));
                    if self.state == IfaceState::Enabled {
                        let idx = self.bss.len() - 1;
                        if let Err(err) = self.setup_bss(idx, false) {
                            self.bss.pop();
                            return Err(err);
                        }
                    }
                }
            }
        }

        // Secondary BSSes follow the file's order; the primary stays first.
        let order = |name: &str| newconf.bss.iter().position(|b| b.iface == name);
        self.bss.sort_by_key(|b| (!b.primary, order(b.name())));
        self.conf = newconf;
        self.conf.bss = self.bss.iter().map(|b| b.conf.clone()).collect();

        if self.state == IfaceState::Enabled {
            self.driver.commit(&primary)?;
        }
        Ok(())
    }

    /// Add a BSS to a running interface.
    pub fn add_bss(&mut self, conf: BssConfig) -> Result<(), CoreError> {
        if self.find_bss(&conf.iface).is_some() {
            return Err(CoreError::Rejected {
                message: format!("BSS {} already exists", conf.iface),
            });
        }
        if self.bss.len() >= MAX_BSSID {
            return Err(CoreError::Rejected {
                message: format!("cannot add BSS: {MAX_BSSID} already configured"),
            });
        }
        conf.check()?;

        self.conf.bss.push(conf.clone());
        self.bss.push(ApBss::new(conf));
        if self.state != IfaceState::Enabled {
            return Ok(());
        }
        let idx = self.bss.len() - 1;
        let result = self
            .setup_bss(idx, false)
            .and_then(|()| self.driver.commit(self.bss[idx].name()));
        if let Err(err) = result {
            self.remove_bss(idx);
            return Err(err);
        }
        Ok(())
    }

    /// Add the BSS `name` as described by a fresh read of the
    /// configuration source.
    pub fn add_bss_by_name(&mut self, name: &str) -> Result<(), CoreError> {
        let newconf = self.read_source()?;
        let conf = newconf
            .find_bss(name)
            .cloned()
            .ok_or_else(|| CoreError::BssNameNotFound { name: name.into() })?;
        self.add_bss(conf)
    }

    /// Remove a secondary BSS. The primary BSS owns the radio and can
    /// only go away with the whole interface.
    pub fn del_bss(&mut self, name: &str) -> Result<(), CoreError> {
        let idx = self.position(name)?;
        if self.bss[idx].primary {
            return Err(CoreError::Rejected {
                message: "Could not remove primary interface".into(),
            });
        }
        if self.default_pbc_bss.as_deref() == Some(name) {
            self.default_pbc_bss = Some(self.name().to_owned());
        }
        self.remove_bss(idx);
        Ok(())
    }

    /// Tear down and drop `bss[idx]`, keeping the others in order.
    pub(crate) fn remove_bss(&mut self, idx: usize) {
        self.flush_old_stations(idx, ReasonCode::DEAUTH_LEAVING);
        let bss = self.bss.remove(idx);
        if bss.interface_added {
            if let Err(err) = self.driver.if_remove(bss.name()) {
                warn!(bss = %bss.name(), %err, "failed to remove BSS interface");
            }
        }
        self.conf.bss.retain(|c| c.iface != bss.name());
        debug!(bss = %bss.name(), remaining = self.bss.len(), "BSS removed");
    }

    /// Swap in a new configuration for one existing BSS.
    pub fn update_bss(&mut self, conf: BssConfig) -> Result<(), CoreError> {
        let idx = self.position(&conf.iface)?;
        conf.check()?;
        let name = conf.iface.clone();

        self.flush_old_stations(idx, ReasonCode::PREV_AUTH_NOT_VALID);
        self.driver.clear_wep(&name);
        self.bss[idx].radius.flush();

        if let Some(slot) = self.conf.bss.iter_mut().find(|c| c.iface == name) {
            slot.clone_from(&conf);
        }
        self.bss[idx].conf = conf;
        self.reload_bss(idx)?;

        if self.driver.is_if_up(&name) {
            self.driver.commit(&name)?;
        }
        Ok(())
    }

    /// Refresh BSS `name` from the configuration source.
    pub fn update_bss_by_name(&mut self, name: &str) -> Result<(), CoreError> {
        let newconf = self.read_source()?;
        let conf = newconf
            .find_bss(name)
            .cloned()
            .ok_or_else(|| CoreError::BssNameNotFound { name: name.into() })?;
        self.update_bss(conf)
    }

    // ── Stations ────────────────────────────────────────────────────

    /// A station finished (re)association with `bss`.
    pub fn new_assoc_sta(
        &mut self,
        bss: &str,
        addr: MacAddr,
        flags: AssocFlags,
    ) -> Result<(), CoreError> {
        let idx = self.position(bss)?;
        let name = bss.to_owned();

        if self.tkip_countermeasures {
            debug!(%addr, "TKIP countermeasures active, rejecting station");
            self.bss[idx].stations.shift_remove(&addr);
            return self
                .driver
                .sta_deauth(&name, addr, ReasonCode::MICHAEL_MIC_FAILURE);
        }

        if let Some(limit) = self.conf.total_assoc_limit {
            let others = self
                .bss
                .iter()
                .flat_map(ApBss::stations)
                .filter(|s| s.addr != addr)
                .count();
            if u32::try_from(others).unwrap_or(u32::MAX) >= limit {
                self.driver
                    .sta_deauth(&name, addr, ReasonCode::DISASSOC_AP_BUSY)?;
                return Err(CoreError::Rejected {
                    message: format!("total association limit {limit} reached"),
                });
            }
        }

        self.prune_associations(idx, addr);

        let bss = &mut self.bss[idx];
        let open = !bss.conf.needs_port_auth();
        let ieee8021x = bss.conf.ieee8021x;
        let has_wpa = bss.wpa_auth.is_some();
        let sta = bss.station_entry(addr);
        sta.ieee8021x = ieee8021x;
        sta.wps = flags.wps;
        if flags.reassoc {
            sta.reassociations += 1;
        }
        if open {
            sta.authorized = true;
            sta.accounting = true;
        }
        if has_wpa {
            sta.auth_event = match (flags.reassoc, flags.ft, flags.wps) {
                (false, _, _) => Some(StaAuthEvent::Associated),
                (true, true, _) => None,
                (true, false, false) => Some(StaAuthEvent::Reauth),
                (true, false, true) => Some(StaAuthEvent::ReauthEapol),
            };
        }
        if open {
            self.outbox.push(ApEvent::StaConnected {
                bss: name.clone(),
                addr,
            });
        }

        if !self.driver.has_inactivity_timer() {
            let idle = Duration::from_secs(self.conf.ap_max_inactivity);
            debug!(%addr, ?idle, "reschedule inactivity timer");
            self.timers.schedule(ApTimer::Inactivity(addr), idle);
        }
        Ok(())
    }

    /// Forget `addr` on every other BSS of this radio.
    fn prune_associations(&mut self, keep: usize, addr: MacAddr) {
        for (i, bss) in self.bss.iter_mut().enumerate() {
            if i != keep && bss.stations.shift_remove(&addr).is_some() {
                debug!(bss = %bss.name(), %addr, "pruned stale association");
            }
        }
    }

    /// The driver reported that `addr` left `bss`.
    pub fn sta_disconnected(&mut self, bss: &str, addr: MacAddr) -> Result<(), CoreError> {
        let idx = self.position(bss)?;
        if self.bss[idx].stations.shift_remove(&addr).is_some() {
            self.timers.cancel(ApTimer::Inactivity(addr));
            self.outbox.push(ApEvent::StaDisconnected {
                bss: bss.to_owned(),
                addr,
            });
        }
        Ok(())
    }

    // ── Channel switch ──────────────────────────────────────────────

    /// Announce a move to `settings.freq` in the beacons of the primary
    /// BSS. Only one switch can be in flight.
    pub fn switch_channel(&mut self, settings: CsaSettings) -> Result<(), CoreError> {
        if self.freq == 0 {
            return Err(CoreError::Rejected {
                message: "interface is not operating on a channel".into(),
            });
        }
        if self.csa.is_some() {
            return Err(CoreError::Rejected {
                message: "channel switch already in progress".into(),
            });
        }
        if self.driver.freq_to_channel(settings.freq).is_none() {
            return Err(CoreError::ValidationFailed {
                message: format!("frequency {} MHz not supported", settings.freq),
            });
        }
        let primary = self.name().to_owned();
        self.driver
            .switch_channel(&primary, &settings)
            .inspect_err(|err| error!(%err, "switch_channel failed"))?;
        self.csa = Some(settings);
        self.outbox.push(ApEvent::ChannelSwitchStarted {
            freq: settings.freq,
        });
        Ok(())
    }

    /// The driver finished moving the radio to `freq`.
    pub fn channel_switch_done(&mut self, freq: u32) {
        if self.csa.take().is_none() {
            debug!(freq, "channel switch without a pending announcement");
        }
        self.freq = freq;
        if let Some(channel) = self.driver.freq_to_channel(freq) {
            self.conf.channel = channel;
        }
        for bss in &self.bss {
            if let Err(err) = self.driver.set_beacon(bss.name()) {
                warn!(bss = %bss.name(), %err, "beacon update after channel switch failed");
            }
        }
        self.outbox.push(ApEvent::ChannelSwitchFinished { freq });
    }
}

fn derive_psk(deriver: &dyn PskDeriver, conf: &BssConfig) -> Result<Option<[u8; 32]>, CoreError> {
    if let Some(hex_psk) = &conf.wpa_psk {
        let mut psk = [0u8; 32];
        hex::decode_to_slice(hex_psk, &mut psk).map_err(|e| CoreError::Config {
            message: format!("{}: wpa_psk: {e}", conf.iface),
        })?;
        return Ok(Some(psk));
    }
    Ok(conf
        .wpa_passphrase
        .as_deref()
        .map(|pass| deriver.derive(pass, conf.ssid.as_bytes())))
}

fn setup_encryption(driver: &mut dyn ApDriver, conf: &BssConfig) -> Result<(), CoreError> {
    let Some(key) = &conf.wep_key else {
        return Ok(());
    };
    let key = hex::decode(key).map_err(|e| CoreError::Config {
        message: format!("{}: wep_key: {e}", conf.iface),
    })?;
    driver.set_wep_key(&conf.iface, 0, &key)?;
    driver.set_privacy(&conf.iface, true)
}
