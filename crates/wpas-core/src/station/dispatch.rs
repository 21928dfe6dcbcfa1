// ── Event dispatcher ──
//
// The top-level switch over driver events. One event is handled to
// completion before the next; cross-interface work (sibling scan
// fan-out, last-interface shutdown) is reported back to the session in
// a `Followup` instead of being done from in here.

use std::time::Duration;

use tracing::{debug, info, trace, warn};

use crate::collab::{ApHooks, DriverFlags, SmeHandler};
use crate::model::{DriverEvent, ForwardedKind, MacAddr, Notification, WpaState};

use super::{ScanRequest, Station};

/// 802.11 action category for Fast BSS Transition.
const ACTION_CATEGORY_FT: u8 = 6;

/// Cross-interface work left for the session after an event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Followup {
    /// Scan results were processed on this radio; siblings sharing it
    /// should process theirs.
    pub radio_scan: Option<String>,
    /// The interface just disappeared.
    pub interface_removed: bool,
}

impl Station {
    /// Handle one driver event.
    pub fn handle_event(&mut self, event: DriverEvent) -> Followup {
        let mut followup = Followup::default();

        if self.state == WpaState::InterfaceDisabled
            && !matches!(
                event,
                DriverEvent::InterfaceEnabled | DriverEvent::InterfaceStatus { .. }
            )
        {
            debug!(event = event.name(), "ignoring event while interface is disabled");
            return followup;
        }
        trace!(ifname = %self.opts.ifname, event = event.name(), "driver event");

        match event {
            DriverEvent::Auth { bssid, status_code } => {
                if let Some(sme) = self.sme_hook() {
                    sme.auth(bssid, status_code);
                }
            }
            DriverEvent::Assoc(info) => self.event_assoc(&info),
            DriverEvent::AssocInfo(info) => {
                self.event_associnfo(&info);
            }
            DriverEvent::Disassoc(info) | DriverEvent::Deauth(info) => {
                if self.ap_mode {
                    self.ap_disassoc(info.addr);
                } else {
                    self.event_disassoc(info.reason);
                }
            }
            DriverEvent::MichaelMicFailure { unicast, .. } => self.mic_failure(unicast),
            DriverEvent::ScanResults => {
                if self.scan_results_event() {
                    followup.radio_scan = self.radio_name();
                }
            }
            DriverEvent::InterfaceStatus { ifname, status } => {
                followup.interface_removed = self.interface_status(&ifname, status);
            }
            DriverEvent::PmkidCandidate {
                bssid,
                index,
                preauth,
            } => self.collab.wpa.pmksa_candidate_add(bssid, index, preauth),
            DriverEvent::TxStatus { dst, ack } => match self.ap_hooks() {
                Some(ap) => ap.tx_status(dst, ack),
                None => debug!(%dst, ack, "TX status outside AP mode"),
            },
            DriverEvent::RxMgmt { frame } => match self.ap_hooks() {
                Some(ap) => ap.rx_mgmt(&frame),
                None => debug!(len = frame.len(), "management frame outside AP mode"),
            },
            DriverEvent::RxAction {
                src,
                category,
                data,
            } => {
                if category == ACTION_CATEGORY_FT {
                    if let Some(ft) = self.collab.ft.as_mut() {
                        ft.response(&data);
                        return followup;
                    }
                }
                match self.ap_hooks() {
                    Some(ap) => ap.rx_action(src, category, &data),
                    None => debug!(%src, category, "unhandled action frame"),
                }
            }
            DriverEvent::RxProbeReq { sa, ies } => match self.ap_hooks() {
                Some(ap) => ap.rx_probe_req(sa, &ies),
                None => trace!(%sa, "probe request outside AP mode"),
            },
            DriverEvent::InterfaceEnabled => self.interface_enabled(),
            DriverEvent::InterfaceDisabled => {
                debug!("interface was disabled");
                self.mark_disassoc();
                self.set_state(WpaState::InterfaceDisabled);
            }
            DriverEvent::ChannelListChanged => {
                self.hw_modes = self.collab.driver.hw_modes();
                debug!(modes = self.hw_modes.len(), "channel list changed");
            }
            DriverEvent::SchedScanStopped => self.sched_scan_stopped(),
            DriverEvent::WpsButtonPushed => {
                if let Err(err) = self.start_pbc(None, false) {
                    warn!(%err, "push button: failed to start WPS PBC");
                }
            }
            DriverEvent::AssocReject { bssid, status_code } => {
                self.notify(Notification::AssocReject { bssid, status_code });
                if let Some(sme) = self.sme_hook() {
                    sme.assoc_reject(bssid, status_code);
                }
            }
            DriverEvent::AuthTimedOut { addr } => {
                if let Some(sme) = self.sme_hook() {
                    sme.auth_timed_out(addr);
                }
            }
            DriverEvent::AssocTimedOut { addr } => {
                if let Some(sme) = self.sme_hook() {
                    sme.assoc_timed_out(addr);
                }
            }
            DriverEvent::EapolRx { src, data } => self.rx_eapol(src, data),
            DriverEvent::SignalChange { level } => {
                if let Some(bgscan) = self.collab.bgscan.as_mut() {
                    bgscan.notify_signal_change(level);
                }
            }
            DriverEvent::BestChannel {
                freq_24,
                freq_5,
                freq_overall,
            } => {
                debug!(freq_24, freq_5, freq_overall, "best channel");
                self.best_channel = super::BestChannel {
                    freq_24,
                    freq_5,
                    freq_overall,
                };
            }
            DriverEvent::UnprotDeauth { sa, da, reason } => {
                info!(%sa, %da, %reason, "unprotected deauthentication frame");
            }
            DriverEvent::UnprotDisassoc { sa, da, reason } => {
                info!(%sa, %da, %reason, "unprotected disassociation frame");
            }
            DriverEvent::DriverGtkRekey { bssid, replay_ctr } => {
                if bssid == self.bssid {
                    debug!(%bssid, "driver GTK rekey");
                    self.collab.wpa.update_replay_ctr(replay_ctr);
                }
            }
            DriverEvent::IbssPeerLost { peer } => {
                if let Some(ibss) = self.collab.ibss_rsn.as_mut() {
                    ibss.peer_lost(peer);
                }
            }
            DriverEvent::Forwarded { kind, peer, data } => self.forward(kind, peer, &data),
        }
        followup
    }

    fn sme_hook(&mut self) -> Option<&mut (dyn SmeHandler + 'static)> {
        if self.caps.flags.contains(DriverFlags::SME) {
            self.collab.sme.as_deref_mut()
        } else {
            None
        }
    }

    fn ap_hooks(&mut self) -> Option<&mut (dyn ApHooks + 'static)> {
        if self.ap_mode {
            self.collab.ap.as_deref_mut()
        } else {
            None
        }
    }

    fn ap_disassoc(&mut self, addr: Option<MacAddr>) {
        match (addr, self.collab.ap.as_mut()) {
            (Some(addr), Some(ap)) => ap.notif_disassoc(addr),
            _ => debug!("AP mode disconnect without a station address - ignored"),
        }
    }

    fn interface_enabled(&mut self) {
        if self.state != WpaState::InterfaceDisabled {
            return;
        }
        debug!("interface was enabled");
        if self.ap_mode {
            self.set_state(WpaState::Completed);
        } else {
            self.set_state(WpaState::Disconnected);
            self.scan_req = ScanRequest::Manual;
            self.req_scan(Duration::ZERO);
        }
    }

    fn forward(&mut self, kind: ForwardedKind, peer: Option<MacAddr>, data: &[u8]) {
        match kind {
            ForwardedKind::FtResponse => {
                if let Some(ft) = self.collab.ft.as_mut() {
                    ft.response(data);
                }
            }
            ForwardedKind::IbssRsnStart => {
                if let (Some(ibss), Some(peer)) = (self.collab.ibss_rsn.as_mut(), peer) {
                    ibss.start(peer);
                }
            }
            ForwardedKind::P2p => {
                if let Some(p2p) = self.collab.p2p.as_mut() {
                    p2p.forwarded(data);
                }
            }
            ForwardedKind::Tdls | ForwardedKind::Stkstart => {
                debug!(?kind, peer = ?peer, len = data.len(), "no handler for forwarded event");
            }
        }
    }
}
