// ── Station ──
//
// One supplicant interface: the association state machine, its scan
// cache, blacklist and timers, and the WPS session layered on top. A
// Station is driven from outside, one input at a time: driver events
// through `handle_event`, time through `advance`, and user requests
// through the public operations. Nothing in here blocks.
//
// Notifications pile up in an outbox that the owner drains after each
// input.

pub mod assoc;
pub mod dispatch;
pub mod events;
pub mod scan;
pub mod wps;

pub use assoc::{dynamic_keys, non_wpa_policy, select_suites};
pub use dispatch::Followup;
pub use wps::{NewApSettings, pin_phase1, registrar_phase1};

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::blacklist::Blacklist;
use crate::collab::{Collaborators, DriverCapabilities, DriverFlags};
use crate::error::CoreError;
use crate::ie::matcher::MatchContext;
use crate::model::{
    Cipher, HwMode, KeyMgmt, MacAddr, NetworkProfile, Notification, ProfileId, ReasonCode,
    ScanResult, WpaState,
};
use crate::select::{DEFAULT_BLACKLIST_FAIL_MAX, RoamingPolicy};
use crate::store::ProfileStore;
use crate::timer::TimerQueue;
use crate::wps::{WpsDeviceConfig, WpsOptions, WpsSession};

/// Wait for the first EAPOL frame after association.
pub const AUTH_TIMEOUT: Duration = Duration::from_secs(10);
/// Shorter wait when the driver already refused the request.
pub const ASSOC_FAILED_TIMEOUT: Duration = Duration::from_secs(5);
/// Two MIC failures closer than this start countermeasures.
pub const MIC_FAILURE_WINDOW: Duration = Duration::from_secs(60);
pub const COUNTERMEASURES_DURATION: Duration = Duration::from_secs(60);
/// A deferred EAPOL frame older than this is dropped.
pub const PENDING_EAPOL_MAX_AGE: Duration = Duration::from_millis(100);
/// Retry delay while a smartcard refuses to initialize.
pub const SCARD_RETRY: Duration = Duration::from_secs(10);
/// Rescan delay during P2P group formation.
pub const P2P_PROVISIONING_SCAN: Duration = Duration::from_millis(250);

// ── Options ─────────────────────────────────────────────────────────

/// Per-interface settings, usually built from configuration.
#[derive(Debug, Clone)]
pub struct StationOptions {
    pub ifname: String,
    pub own_addr: MacAddr,
    /// 1: the station scans and selects; 2: the driver does.
    pub ap_scan: u8,
    pub scan_interval: Duration,
    pub sched_scan_timeout: Duration,
    pub blacklist_fail_max: u32,
    pub roaming: RoamingPolicy,
    pub auto_reconnect: bool,
    /// Spread MIC failure reports over a random delay.
    pub delayed_mic_error_report: bool,
    /// Enables the pairing-hash check on association.
    pub pairing_id: Option<Vec<u8>>,
    pub wps: WpsOptions,
}

impl Default for StationOptions {
    fn default() -> Self {
        Self {
            ifname: "wlan0".into(),
            own_addr: MacAddr::ZERO,
            ap_scan: 1,
            scan_interval: Duration::from_secs(5),
            sched_scan_timeout: Duration::from_secs(30),
            blacklist_fail_max: DEFAULT_BLACKLIST_FAIL_MAX,
            roaming: RoamingPolicy::default(),
            auto_reconnect: true,
            delayed_mic_error_report: false,
            pairing_id: None,
            wps: WpsOptions::default(),
        }
    }
}

// ── Timers ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimerKind {
    Scan,
    AuthTimeout,
    StopCountermeasures,
    DelayedMicReport,
    WpsTimeout,
    StopFastReassoc,
    SchedScanTimeout,
}

/// Why the next scan runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScanRequest {
    /// Periodic; suppressed while the station is disconnected.
    #[default]
    Normal,
    /// Explicit user or WPS request; runs even when disconnected.
    Manual,
}

// ── Small state records ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BestChannel {
    pub freq_24: u32,
    pub freq_5: u32,
    pub freq_overall: u32,
}

#[derive(Debug, Clone, Default)]
struct MicFailures {
    last: Option<Duration>,
    seen: u32,
    /// Delayed report waiting to go out; the flag is `pairwise`.
    pending: Option<bool>,
}

#[derive(Debug, Clone)]
struct PendingEapol {
    src: MacAddr,
    data: Bytes,
    at: Duration,
}

/// One-shot consumer for the next scan results.
pub type ScanHandler = Box<dyn FnOnce(&mut Station, &[ScanResult]) + Send>;

// ── Station ─────────────────────────────────────────────────────────

pub struct Station {
    opts: StationOptions,
    collab: Collaborators,
    store: ProfileStore,
    blacklist: Blacklist,
    timers: TimerQueue<TimerKind>,
    outbox: Vec<Notification>,

    state: WpaState,
    bssid: MacAddr,
    pending_bssid: MacAddr,
    current: Option<ProfileId>,
    current_bss: Option<ScanResult>,
    assoc_freq: u32,
    reassociate: bool,
    disconnected: bool,
    new_connection: bool,
    interface_removed: bool,
    ap_mode: bool,
    ibss_rsn_active: bool,

    scan_req: ScanRequest,
    scan_runs: u32,
    last_scan: Arc<[ScanResult]>,
    scan_handler: Option<ScanHandler>,
    sched_scanning: bool,
    sched_scan_timed_out: bool,
    hw_modes: Vec<HwMode>,
    caps: DriverCapabilities,

    key_mgmt: KeyMgmt,
    pairwise_cipher: Cipher,
    group_cipher: Cipher,
    ap_ies_from_associnfo: bool,
    countermeasures: bool,
    mic: MicFailures,
    pending_eapol: Option<PendingEapol>,
    eapol_received: u32,
    best_channel: BestChannel,

    wps: WpsSession,
}

impl fmt::Debug for Station {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Station")
            .field("ifname", &self.opts.ifname)
            .field("state", &self.state)
            .field("bssid", &self.bssid)
            .field("pending_bssid", &self.pending_bssid)
            .field("current", &self.current)
            .field("wps", &self.wps.ext_state)
            .finish_non_exhaustive()
    }
}

impl Station {
    /// Build a station. Does not scan; call [`start`](Self::start).
    ///
    /// `sibling_uuid` is the WPS UUID of an interface registered
    /// earlier, shared when configuration does not set one.
    pub fn new(
        opts: StationOptions,
        mut collab: Collaborators,
        store: ProfileStore,
        sibling_uuid: Option<Uuid>,
    ) -> Result<Self, CoreError> {
        let caps = collab.driver.capabilities().unwrap_or_else(|err| {
            warn!(ifname = %opts.ifname, %err, "driver capabilities unavailable");
            DriverCapabilities::default()
        });
        let hw_modes = collab.driver.hw_modes();
        let device = WpsDeviceConfig::init(&opts.wps.device, &hw_modes, opts.own_addr, sibling_uuid)?;

        Ok(Self {
            opts,
            collab,
            store,
            blacklist: Blacklist::new(),
            timers: TimerQueue::new(),
            outbox: Vec::new(),
            state: WpaState::Disconnected,
            bssid: MacAddr::ZERO,
            pending_bssid: MacAddr::ZERO,
            current: None,
            current_bss: None,
            assoc_freq: 0,
            reassociate: false,
            disconnected: false,
            new_connection: true,
            interface_removed: false,
            ap_mode: false,
            ibss_rsn_active: false,
            scan_req: ScanRequest::Normal,
            scan_runs: 0,
            last_scan: Arc::from(Vec::new()),
            scan_handler: None,
            sched_scanning: false,
            sched_scan_timed_out: false,
            hw_modes,
            caps,
            key_mgmt: KeyMgmt::NONE,
            pairwise_cipher: Cipher::NONE,
            group_cipher: Cipher::NONE,
            ap_ies_from_associnfo: false,
            countermeasures: false,
            mic: MicFailures::default(),
            pending_eapol: None,
            eapol_received: 0,
            best_channel: BestChannel::default(),
            wps: WpsSession {
                device,
                ..WpsSession::default()
            },
        })
    }

    /// Kick off the first scan, or go inactive with nothing enabled.
    pub fn start(&mut self) {
        info!(ifname = %self.opts.ifname, addr = %self.opts.own_addr, "station starting");
        self.req_new_scan(Duration::ZERO);
    }

    // ── Accessors ───────────────────────────────────────────────────

    pub fn ifname(&self) -> &str {
        &self.opts.ifname
    }

    pub fn options(&self) -> &StationOptions {
        &self.opts
    }

    pub fn state(&self) -> WpaState {
        self.state
    }

    pub fn bssid(&self) -> MacAddr {
        self.bssid
    }

    pub fn pending_bssid(&self) -> MacAddr {
        self.pending_bssid
    }

    pub fn current(&self) -> Option<ProfileId> {
        self.current
    }

    pub fn current_profile(&self) -> Option<&NetworkProfile> {
        self.current.and_then(|id| self.store.get(id))
    }

    pub fn current_bss(&self) -> Option<&ScanResult> {
        self.current_bss.as_ref()
    }

    pub fn key_mgmt(&self) -> KeyMgmt {
        self.key_mgmt
    }

    pub fn store(&self) -> &ProfileStore {
        &self.store
    }

    /// Direct access for configuration changes made while running.
    pub fn store_mut(&mut self) -> &mut ProfileStore {
        &mut self.store
    }

    pub fn blacklist(&self) -> &Blacklist {
        &self.blacklist
    }

    pub fn wps_session(&self) -> &WpsSession {
        &self.wps
    }

    pub fn last_scan(&self) -> &[ScanResult] {
        &self.last_scan
    }

    pub fn best_channel(&self) -> BestChannel {
        self.best_channel
    }

    pub fn countermeasures_active(&self) -> bool {
        self.countermeasures
    }

    pub fn is_disconnected(&self) -> bool {
        self.disconnected
    }

    pub fn reassociate_pending(&self) -> bool {
        self.reassociate
    }

    pub fn scan_runs(&self) -> u32 {
        self.scan_runs
    }

    pub fn interface_removed(&self) -> bool {
        self.interface_removed
    }

    pub fn radio_name(&self) -> Option<String> {
        self.collab.driver.radio_name().filter(|n| !n.is_empty())
    }

    pub fn now(&self) -> Duration {
        self.timers.now()
    }

    pub fn timer_pending(&self, kind: TimerKind) -> bool {
        self.timers.is_pending(kind)
    }

    pub fn timer_remaining(&self, kind: TimerKind) -> Option<Duration> {
        self.timers.remaining(kind)
    }

    /// Take every notification raised since the last call.
    pub fn drain_notifications(&mut self) -> Vec<Notification> {
        std::mem::take(&mut self.outbox)
    }

    /// Consume the next scan results with `handler` instead of running
    /// selection.
    pub fn set_scan_handler(&mut self, handler: ScanHandler) {
        self.scan_handler = Some(handler);
    }

    // ── Time ────────────────────────────────────────────────────────

    /// Absolute virtual time of the next armed timer.
    pub fn next_deadline(&self) -> Option<Duration> {
        self.timers.next_deadline()
    }

    /// Fire every timer due at or before `now`, in deadline order.
    pub fn advance(&mut self, now: Duration) {
        while let Some(kind) = self.timers.pop_due(now) {
            debug!(ifname = %self.opts.ifname, ?kind, at = ?self.timers.now(), "timer fired");
            self.on_timer(kind);
        }
        self.timers.set_now(now);
    }

    fn on_timer(&mut self, kind: TimerKind) {
        match kind {
            TimerKind::Scan => self.run_scan(),
            TimerKind::AuthTimeout => self.auth_timeout(),
            TimerKind::StopCountermeasures => self.stop_countermeasures(),
            TimerKind::DelayedMicReport => self.delayed_mic_report(),
            TimerKind::WpsTimeout => self.wps_timeout(),
            TimerKind::StopFastReassoc => self.clear_fast_reassoc(),
            TimerKind::SchedScanTimeout => self.sched_scan_timeout(),
        }
    }

    // ── State ───────────────────────────────────────────────────────

    /// Move the FSM. Also the entry point the handshake engine uses to
    /// report 4-way/group progress.
    pub fn set_state(&mut self, to: WpaState) {
        let from = self.state;
        if !to.is_connecting() {
            self.pending_bssid = MacAddr::ZERO;
        }
        if from == to {
            return;
        }
        debug!(ifname = %self.opts.ifname, %from, %to, "state change");
        self.state = to;
        self.notify(Notification::StateChanged { from, to });

        if to == WpaState::Completed {
            self.cancel_auth_timeout();
            if self.new_connection {
                self.new_connection = false;
                self.wps.after_wps = 0;
                self.notify(Notification::Connected {
                    bssid: self.bssid,
                    id: self.current,
                });
            }
        } else if matches!(
            to,
            WpaState::Disconnected | WpaState::Associating | WpaState::Associated
        ) {
            self.new_connection = true;
        }
    }

    pub(crate) fn notify(&mut self, note: Notification) {
        info!(ifname = %self.opts.ifname, "{note}");
        self.outbox.push(note);
    }

    pub(crate) fn match_context(&self) -> MatchContext {
        MatchContext {
            own_addr: self.opts.own_addr,
            scan_runs: self.scan_runs,
            pin_scan_ignore_sel_reg: self.opts.wps.pin_scan_ignore_sel_reg,
        }
    }

    pub(crate) fn driver_bss_selection(&self) -> bool {
        self.caps.flags.contains(DriverFlags::BSS_SELECTION)
    }

    fn enabled_networks(&self) -> bool {
        self.store.iter().any(|(_, p)| !p.is_disabled())
    }

    // ── Scan scheduling ─────────────────────────────────────────────

    /// Arm the scan timer, replacing any earlier request.
    pub fn req_scan(&mut self, delay: Duration) {
        debug!(ifname = %self.opts.ifname, ?delay, "scan requested");
        self.timers.schedule(TimerKind::Scan, delay);
    }

    pub fn cancel_scan(&mut self) {
        if self.timers.cancel(TimerKind::Scan) {
            debug!(ifname = %self.opts.ifname, "cancelling scan request");
        }
    }

    /// Like `req_scan`, but goes INACTIVE at once when no profile is
    /// enabled.
    pub(crate) fn req_new_scan(&mut self, delay: Duration) {
        if !self.enabled_networks() {
            self.set_state(WpaState::Inactive);
            return;
        }
        self.req_scan(delay);
    }

    /// Prefer a driver-scheduled scan; false when the driver cannot.
    pub(crate) fn req_sched_scan(&mut self) -> bool {
        if !self.caps.flags.contains(DriverFlags::SCHED_SCAN) {
            return false;
        }
        match self.collab.driver.sched_scan(self.opts.scan_interval) {
            Ok(()) => {
                self.sched_scanning = true;
                self.sched_scan_timed_out = false;
                let timeout = self.opts.sched_scan_timeout;
                self.timers.schedule(TimerKind::SchedScanTimeout, timeout);
                true
            }
            Err(err) => {
                debug!(ifname = %self.opts.ifname, %err, "scheduled scan refused");
                false
            }
        }
    }

    pub(crate) fn cancel_sched_scan(&mut self) {
        if !self.sched_scanning {
            return;
        }
        self.timers.cancel(TimerKind::SchedScanTimeout);
        if let Err(err) = self.collab.driver.stop_sched_scan() {
            debug!(ifname = %self.opts.ifname, %err, "stop scheduled scan failed");
        }
    }

    fn sched_scan_timeout(&mut self) {
        debug!(ifname = %self.opts.ifname, "scheduled scan timed out");
        self.sched_scan_timed_out = true;
        self.cancel_sched_scan();
    }

    fn run_scan(&mut self) {
        let req = std::mem::take(&mut self.scan_req);
        if self.disconnected && req == ScanRequest::Normal {
            debug!(ifname = %self.opts.ifname, "disconnected - do not scan");
            self.set_state(WpaState::Disconnected);
            return;
        }
        if !self.enabled_networks() && !crate::wps::searching(&self.store) {
            debug!(ifname = %self.opts.ifname, "no enabled networks - do not scan");
            self.set_state(WpaState::Inactive);
            return;
        }
        if self.ap_mode || self.state == WpaState::InterfaceDisabled {
            return;
        }

        let freqs = if self.wps.after_wps > 0 && self.wps.freq > 0 {
            self.wps.after_wps -= 1;
            debug!(freq = self.wps.freq, "scan only the frequency the credential came from");
            vec![self.wps.freq]
        } else {
            Vec::new()
        };

        if matches!(self.state, WpaState::Disconnected | WpaState::Inactive) {
            self.set_state(WpaState::Scanning);
        }
        self.scan_runs = self.scan_runs.saturating_add(1);
        if let Err(err) = self.collab.driver.scan(&freqs) {
            warn!(ifname = %self.opts.ifname, %err, "failed to initiate scan");
            self.req_scan(Duration::from_secs(1));
        }
    }

    // ── Auth timeout ────────────────────────────────────────────────

    pub(crate) fn req_auth_timeout(&mut self, timeout: Duration) {
        self.timers.schedule(TimerKind::AuthTimeout, timeout);
    }

    pub(crate) fn cancel_auth_timeout(&mut self) {
        self.timers.cancel(TimerKind::AuthTimeout);
    }

    fn auth_timeout(&mut self) {
        let bssid = if self.bssid.is_zero() {
            self.pending_bssid
        } else {
            self.bssid
        };
        self.notify(Notification::AuthTimeout { bssid });
        self.connection_failed(bssid);
        self.collab.wpa.notify_disassoc();
        self.deauthenticate(ReasonCode::DEAUTH_LEAVING);
        self.reassociate = true;
    }

    // ── Teardown helpers ────────────────────────────────────────────

    /// Deauthenticate from the current (or pending) BSS and reset the
    /// association fields.
    pub fn deauthenticate(&mut self, reason: ReasonCode) {
        let target = if self.bssid.is_zero() {
            self.pending_bssid
        } else {
            self.bssid
        };
        if !target.is_zero() {
            if let Err(err) = self.collab.driver.deauthenticate(target, reason) {
                warn!(ifname = %self.opts.ifname, %err, "deauthenticate failed");
            }
        }
        self.collab.driver.clear_keys();
        self.mark_disassoc();
    }

    pub fn disassociate(&mut self, reason: ReasonCode) {
        if !self.bssid.is_zero() {
            if let Err(err) = self.collab.driver.disassociate(self.bssid, reason) {
                warn!(ifname = %self.opts.ifname, %err, "disassociate failed");
            }
        }
        self.collab.driver.clear_keys();
        self.mark_disassoc();
    }

    /// Reset association state after losing (or leaving) the BSS.
    pub fn mark_disassoc(&mut self) {
        if self.ibss_rsn_active {
            debug!(ifname = %self.opts.ifname, "IBSS RSN deinit");
            self.ibss_rsn_active = false;
        }
        if self.ap_mode {
            debug!(ifname = %self.opts.ifname, "AP mode deinit");
            self.ap_mode = false;
        }
        if self.state == WpaState::InterfaceDisabled {
            return;
        }

        self.set_state(WpaState::Disconnected);
        let bssid_changed = !self.bssid.is_zero();
        self.bssid = MacAddr::ZERO;
        self.pending_bssid = MacAddr::ZERO;
        self.current_bss = None;
        self.assoc_freq = 0;
        if bssid_changed {
            self.notify(Notification::BssidChanged {
                bssid: MacAddr::ZERO,
            });
        }

        self.collab.eapol.notify_port_enabled(false);
        self.collab.eapol.notify_port_valid(false);
        if self.key_mgmt.is_wpa_psk() {
            self.collab.eapol.notify_eap_success(false);
        }
        self.ap_ies_from_associnfo = false;
    }

    // ── Control operations ──────────────────────────────────────────

    /// Leave the network and stop reconnecting until `reassociate`.
    pub fn disconnect(&mut self) {
        self.scan_req = ScanRequest::Normal;
        self.disconnected = true;
        self.reassociate = false;
        self.cancel_sched_scan();
        self.deauthenticate(ReasonCode::DEAUTH_LEAVING);
    }

    /// Force a fresh selection pass even if already connected.
    pub fn reassociate(&mut self) {
        self.disconnected = false;
        self.reassociate = true;
        self.scan_req = ScanRequest::Manual;
        self.req_scan(Duration::ZERO);
    }
}
