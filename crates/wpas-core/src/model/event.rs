// ── Events ──
//
// Inbound: the tagged union the driver delivers, one at a time.
// Outbound: typed control-interface notifications. Their Display impl
// renders the familiar `CTRL-EVENT-*` / `WPS-*` text.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::addr::MacAddr;
use super::hex_bytes;
use super::profile::ProfileId;
use super::state::{ReasonCode, WpaState};

// ── Driver events ───────────────────────────────────────────────────

/// Association information carried by ASSOC and ASSOCINFO.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssocInfo {
    #[serde(default)]
    pub reassoc: bool,
    /// IEs of the (Re)Association Request we sent.
    #[serde(with = "hex_bytes", default)]
    pub req_ies: Bytes,
    #[serde(with = "hex_bytes", default)]
    pub resp_ies: Bytes,
    #[serde(with = "hex_bytes", default)]
    pub beacon_ies: Bytes,
    #[serde(default)]
    pub freq: u32,
    /// Peer address; only meaningful in AP mode.
    #[serde(default)]
    pub addr: Option<MacAddr>,
}

/// Payload for DISASSOC and DEAUTH.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisconnectInfo {
    #[serde(default = "default_reason")]
    pub reason: ReasonCode,
    #[serde(default)]
    pub addr: Option<MacAddr>,
    #[serde(with = "hex_bytes", default)]
    pub ies: Bytes,
}

fn default_reason() -> ReasonCode {
    ReasonCode::UNSPECIFIED
}

impl Default for DisconnectInfo {
    fn default() -> Self {
        Self {
            reason: ReasonCode::UNSPECIFIED,
            addr: None,
            ies: Bytes::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterfaceStatusKind {
    Added,
    Removed,
}

/// Sub-event families handed to their collaborators without inspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForwardedKind {
    FtResponse,
    Tdls,
    IbssRsnStart,
    Stkstart,
    P2p,
}

/// One asynchronous driver notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DriverEvent {
    Auth {
        bssid: MacAddr,
        #[serde(default)]
        status_code: u16,
    },
    Assoc(AssocInfo),
    #[serde(rename = "associnfo")]
    AssocInfo(AssocInfo),
    Disassoc(DisconnectInfo),
    Deauth(DisconnectInfo),
    MichaelMicFailure {
        #[serde(default)]
        unicast: bool,
        #[serde(default)]
        src: Option<MacAddr>,
    },
    ScanResults,
    InterfaceStatus {
        ifname: String,
        status: InterfaceStatusKind,
    },
    PmkidCandidate {
        bssid: MacAddr,
        #[serde(default)]
        index: i32,
        #[serde(default)]
        preauth: bool,
    },
    TxStatus {
        dst: MacAddr,
        #[serde(default)]
        ack: bool,
    },
    RxMgmt {
        #[serde(with = "hex_bytes", default)]
        frame: Bytes,
    },
    RxAction {
        src: MacAddr,
        category: u8,
        #[serde(with = "hex_bytes", default)]
        data: Bytes,
    },
    RxProbeReq {
        sa: MacAddr,
        #[serde(with = "hex_bytes", default)]
        ies: Bytes,
    },
    InterfaceEnabled,
    InterfaceDisabled,
    ChannelListChanged,
    SchedScanStopped,
    WpsButtonPushed,
    AssocReject {
        #[serde(default)]
        bssid: Option<MacAddr>,
        status_code: u16,
    },
    AuthTimedOut {
        addr: MacAddr,
    },
    AssocTimedOut {
        addr: MacAddr,
    },
    EapolRx {
        src: MacAddr,
        #[serde(with = "hex_bytes", default)]
        data: Bytes,
    },
    SignalChange {
        level: i32,
    },
    BestChannel {
        #[serde(default)]
        freq_24: u32,
        #[serde(default)]
        freq_5: u32,
        #[serde(default)]
        freq_overall: u32,
    },
    UnprotDeauth {
        sa: MacAddr,
        da: MacAddr,
        reason: ReasonCode,
    },
    UnprotDisassoc {
        sa: MacAddr,
        da: MacAddr,
        reason: ReasonCode,
    },
    DriverGtkRekey {
        bssid: MacAddr,
        replay_ctr: [u8; 8],
    },
    IbssPeerLost {
        peer: MacAddr,
    },
    Forwarded {
        kind: ForwardedKind,
        #[serde(default)]
        peer: Option<MacAddr>,
        #[serde(with = "hex_bytes", default)]
        data: Bytes,
    },
}

impl DriverEvent {
    /// Short name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Auth { .. } => "AUTH",
            Self::Assoc(_) => "ASSOC",
            Self::AssocInfo(_) => "ASSOCINFO",
            Self::Disassoc(_) => "DISASSOC",
            Self::Deauth(_) => "DEAUTH",
            Self::MichaelMicFailure { .. } => "MICHAEL_MIC_FAILURE",
            Self::ScanResults => "SCAN_RESULTS",
            Self::InterfaceStatus { .. } => "INTERFACE_STATUS",
            Self::PmkidCandidate { .. } => "PMKID_CANDIDATE",
            Self::TxStatus { .. } => "TX_STATUS",
            Self::RxMgmt { .. } => "RX_MGMT",
            Self::RxAction { .. } => "RX_ACTION",
            Self::RxProbeReq { .. } => "RX_PROBE_REQ",
            Self::InterfaceEnabled => "INTERFACE_ENABLED",
            Self::InterfaceDisabled => "INTERFACE_DISABLED",
            Self::ChannelListChanged => "CHANNEL_LIST_CHANGED",
            Self::SchedScanStopped => "SCHED_SCAN_STOPPED",
            Self::WpsButtonPushed => "WPS_BUTTON_PUSHED",
            Self::AssocReject { .. } => "ASSOC_REJECT",
            Self::AuthTimedOut { .. } => "AUTH_TIMED_OUT",
            Self::AssocTimedOut { .. } => "ASSOC_TIMED_OUT",
            Self::EapolRx { .. } => "EAPOL_RX",
            Self::SignalChange { .. } => "SIGNAL_CHANGE",
            Self::BestChannel { .. } => "BEST_CHANNEL",
            Self::UnprotDeauth { .. } => "UNPROT_DEAUTH",
            Self::UnprotDisassoc { .. } => "UNPROT_DISASSOC",
            Self::DriverGtkRekey { .. } => "DRIVER_GTK_REKEY",
            Self::IbssPeerLost { .. } => "IBSS_PEER_LOST",
            Self::Forwarded { .. } => "FORWARDED",
        }
    }
}

// ── Notifications ───────────────────────────────────────────────────

/// How many WPS-capable APs of each kind the last scan saw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WpsAvailability {
    Pbc,
    Auth,
    Pin,
    Any,
}

/// Control-interface event emitted by a station.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notification {
    StateChanged {
        from: WpaState,
        to: WpaState,
    },
    Trying {
        bssid: MacAddr,
        ssid: String,
        freq: u32,
    },
    Associated {
        bssid: MacAddr,
    },
    Connected {
        bssid: MacAddr,
        id: Option<ProfileId>,
    },
    Disconnected {
        bssid: MacAddr,
        reason: ReasonCode,
    },
    AssocReject {
        bssid: Option<MacAddr>,
        status_code: u16,
    },
    ScanResults,
    AuthTimeout {
        bssid: MacAddr,
    },
    NoNetworkConfig,
    FourWayFailed,
    MichaelMicFailure,
    CountermeasuresStarted,
    CountermeasuresStopped,
    BssidChanged {
        bssid: MacAddr,
    },
    NetworkAdded {
        id: ProfileId,
    },
    NetworkRemoved {
        id: ProfileId,
    },
    NetworkEnabledChanged {
        id: ProfileId,
        enabled: bool,
    },
    NetworkChanged {
        id: Option<ProfileId>,
    },
    WpsOverlap,
    WpsCredReceived {
        attr_hex: Option<String>,
    },
    WpsM2d {
        dev_password_id: u16,
        config_error: u16,
    },
    WpsFail {
        msg: u8,
        config_error: u16,
        error_indication: Option<(u16, String)>,
    },
    WpsFailTimeout,
    WpsTimeout,
    WpsSuccess,
    WpsOpenNetwork {
        id: ProfileId,
    },
    WpsApAvailable {
        availability: WpsAvailability,
    },
    TerminateRequested,
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StateChanged { from, to } => {
                write!(f, "CTRL-EVENT-STATE-CHANGE {from} -> {to}")
            }
            Self::Trying { bssid, ssid, freq } => write!(
                f,
                "Trying to associate with {bssid} (SSID='{ssid}' freq={freq} MHz)"
            ),
            Self::Associated { bssid } => write!(f, "Associated with {bssid}"),
            Self::Connected { bssid, id } => {
                write!(f, "CTRL-EVENT-CONNECTED - Connection to {bssid} completed")?;
                match id {
                    Some(id) => write!(f, " [id={id}]"),
                    None => Ok(()),
                }
            }
            Self::Disconnected { bssid, reason } => {
                write!(f, "CTRL-EVENT-DISCONNECTED bssid={bssid} reason={reason}")
            }
            Self::AssocReject { bssid, status_code } => {
                f.write_str("CTRL-EVENT-ASSOC-REJECT ")?;
                if let Some(bssid) = bssid {
                    write!(f, "bssid={bssid} ")?;
                }
                write!(f, "status_code={status_code}")
            }
            Self::ScanResults => f.write_str("CTRL-EVENT-SCAN-RESULTS "),
            Self::AuthTimeout { bssid } => {
                write!(f, "Authentication with {bssid} timed out.")
            }
            Self::NoNetworkConfig => {
                f.write_str("No network configuration found for the current AP")
            }
            Self::FourWayFailed => f.write_str(
                "WPA: 4-Way Handshake failed - pre-shared key may be incorrect",
            ),
            Self::MichaelMicFailure => f.write_str("Michael MIC failure detected"),
            Self::CountermeasuresStarted => f.write_str("TKIP countermeasures started"),
            Self::CountermeasuresStopped => f.write_str("WPA: TKIP countermeasures stopped"),
            Self::BssidChanged { bssid } => write!(f, "BSSID changed to {bssid}"),
            Self::NetworkAdded { id } => write!(f, "CTRL-EVENT-NETWORK-ADDED {id}"),
            Self::NetworkRemoved { id } => write!(f, "CTRL-EVENT-NETWORK-REMOVED {id}"),
            Self::NetworkEnabledChanged { id, enabled } => {
                write!(f, "Network {id} enabled={}", u8::from(*enabled))
            }
            Self::NetworkChanged { id } => match id {
                Some(id) => write!(f, "Current network changed to {id}"),
                None => f.write_str("Current network cleared"),
            },
            Self::WpsOverlap => f.write_str("WPS-OVERLAP-DETECTED PBC session overlap"),
            Self::WpsCredReceived { attr_hex } => {
                write!(f, "WPS-CRED-RECEIVED {}", attr_hex.as_deref().unwrap_or(""))
            }
            Self::WpsM2d {
                dev_password_id,
                config_error,
            } => write!(
                f,
                "WPS-M2D dev_password_id={dev_password_id} config_error={config_error}"
            ),
            Self::WpsFail {
                msg,
                config_error,
                error_indication,
            } => {
                write!(f, "WPS-FAIL msg={msg} config_error={config_error}")?;
                match error_indication {
                    Some((code, text)) => write!(f, " reason={code} ({text})"),
                    None => Ok(()),
                }
            }
            Self::WpsFailTimeout => f.write_str("WPS-FAIL timeout"),
            Self::WpsTimeout => f.write_str("WPS-TIMEOUT Requested operation timed out"),
            Self::WpsSuccess => f.write_str("WPS-SUCCESS "),
            Self::WpsOpenNetwork { id } => write!(
                f,
                "WPS-OPEN-NETWORK id={id} - Credentials for an open network disabled by \
                 default - use 'select_network {id}' to enable"
            ),
            Self::WpsApAvailable { availability } => f.write_str(match availability {
                WpsAvailability::Pbc => "WPS-AP-AVAILABLE-PBC ",
                WpsAvailability::Auth => "WPS-AP-AVAILABLE-AUTH ",
                WpsAvailability::Pin => "WPS-AP-AVAILABLE-PIN ",
                WpsAvailability::Any => "WPS-AP-AVAILABLE ",
            }),
            Self::TerminateRequested => f.write_str("CTRL-EVENT-TERMINATING "),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn disconnected_text() {
        let n = Notification::Disconnected {
            bssid: "02:00:00:00:00:01".parse().unwrap(),
            reason: ReasonCode::DEAUTH_LEAVING,
        };
        assert_eq!(
            n.to_string(),
            "CTRL-EVENT-DISCONNECTED bssid=02:00:00:00:00:01 reason=3"
        );
    }

    #[test]
    fn assoc_reject_omits_missing_bssid() {
        let n = Notification::AssocReject {
            bssid: None,
            status_code: 17,
        };
        assert_eq!(n.to_string(), "CTRL-EVENT-ASSOC-REJECT status_code=17");
    }

    #[test]
    fn driver_events_decode_from_json() {
        let ev: DriverEvent = serde_json::from_str(
            r#"{"event":"disassoc","reason":14,"addr":"02:00:00:00:00:09"}"#,
        )
        .unwrap();
        let DriverEvent::Disassoc(info) = ev else {
            panic!("wrong variant");
        };
        assert_eq!(info.reason, ReasonCode::MICHAEL_MIC_FAILURE);

        let ev: DriverEvent =
            serde_json::from_str(r#"{"event":"michael_mic_failure","unicast":true}"#).unwrap();
        assert_eq!(ev.name(), "MICHAEL_MIC_FAILURE");
    }
}
