// ── Station state ──
//
// The supplicant FSM value and the 802.11 reason codes the dispatcher
// emits. Ordering on WpaState follows the association progression so
// callers can write `state >= WpaState::Associated`.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Default,
    Serialize,
    Deserialize,
    Display,
    EnumString,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WpaState {
    #[default]
    #[strum(serialize = "DISCONNECTED")]
    Disconnected,
    #[strum(serialize = "INTERFACE_DISABLED")]
    InterfaceDisabled,
    #[strum(serialize = "INACTIVE")]
    Inactive,
    #[strum(serialize = "SCANNING")]
    Scanning,
    #[strum(serialize = "AUTHENTICATING")]
    Authenticating,
    #[strum(serialize = "ASSOCIATING")]
    Associating,
    #[strum(serialize = "ASSOCIATED")]
    Associated,
    #[strum(serialize = "4WAY_HANDSHAKE")]
    #[serde(rename = "4WAY_HANDSHAKE")]
    FourWay,
    #[strum(serialize = "GROUP_HANDSHAKE")]
    #[serde(rename = "GROUP_HANDSHAKE")]
    Group,
    #[strum(serialize = "COMPLETED")]
    Completed,
}

impl WpaState {
    /// Mid-association: a pending BSSID is meaningful only here.
    pub fn is_connecting(self) -> bool {
        matches!(self, Self::Authenticating | Self::Associating)
    }
}

/// IEEE 802.11 reason code carried by deauthentication and
/// disassociation frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReasonCode(pub u16);

impl ReasonCode {
    pub const UNSPECIFIED: Self = Self(1);
    pub const PREV_AUTH_NOT_VALID: Self = Self(2);
    pub const DEAUTH_LEAVING: Self = Self(3);
    pub const DISASSOC_DUE_TO_INACTIVITY: Self = Self(4);
    pub const DISASSOC_AP_BUSY: Self = Self(5);
    pub const INVALID_IE: Self = Self(13);
    pub const MICHAEL_MIC_FAILURE: Self = Self(14);
}

impl std::fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
