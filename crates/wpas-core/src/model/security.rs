// ── Security suites ──
//
// Bitmask types for key management, protocol versions, and ciphers.
// Network profiles carry *sets* of allowed values; an associated
// station narrows each set to a single negotiated bit.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

bitflags! {
    /// Authentication and key management suites.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct KeyMgmt: u32 {
        const IEEE8021X        = 1 << 0;
        const PSK              = 1 << 1;
        const NONE             = 1 << 2;
        const IEEE8021X_NO_WPA = 1 << 3;
        const WPA_NONE         = 1 << 4;
        const FT_IEEE8021X     = 1 << 5;
        const FT_PSK           = 1 << 6;
        const IEEE8021X_SHA256 = 1 << 7;
        const PSK_SHA256       = 1 << 8;
        const WPS              = 1 << 9;
    }
}

impl KeyMgmt {
    pub fn is_wpa_psk(self) -> bool {
        self.intersects(Self::PSK | Self::FT_PSK | Self::PSK_SHA256)
    }

    pub fn is_wpa_ieee8021x(self) -> bool {
        self.intersects(Self::IEEE8021X | Self::FT_IEEE8021X | Self::IEEE8021X_SHA256)
    }

    /// True when any suite needs a WPA/RSN handshake.
    pub fn is_wpa(self) -> bool {
        self.is_wpa_psk() || self.is_wpa_ieee8021x()
    }
}

bitflags! {
    /// Protocol versions: legacy WPA vendor IE and RSN (WPA2).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct Proto: u8 {
        const WPA = 1 << 0;
        const RSN = 1 << 1;
    }
}

bitflags! {
    /// Pairwise, group, and management cipher suites.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct Cipher: u8 {
        const NONE         = 1 << 0;
        const WEP40        = 1 << 1;
        const WEP104       = 1 << 2;
        const TKIP         = 1 << 3;
        const CCMP         = 1 << 4;
        const AES_128_CMAC = 1 << 5;
    }
}

bitflags! {
    /// 802.11 authentication algorithms.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct AuthAlg: u8 {
        const OPEN   = 1 << 0;
        const SHARED = 1 << 1;
        const LEAP   = 1 << 2;
        const FT     = 1 << 3;
    }
}

bitflags! {
    /// Dynamic WEP requirements for IEEE 802.1X without WPA.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct EapolFlags: u8 {
        const REQUIRE_KEY_UNICAST   = 1 << 0;
        const REQUIRE_KEY_BROADCAST = 1 << 1;
    }
}

/// Management frame protection (802.11w) policy.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MfpPolicy {
    #[default]
    Disabled,
    Optional,
    Required,
}

/// RSN capability bit: management frame protection capable.
pub const RSN_CAP_MFPC: u16 = 1 << 7;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wpa_classification() {
        assert!(KeyMgmt::PSK.is_wpa());
        assert!(KeyMgmt::FT_IEEE8021X.is_wpa());
        assert!(!KeyMgmt::NONE.is_wpa());
        assert!(!KeyMgmt::WPS.is_wpa());
        assert!(!(KeyMgmt::IEEE8021X_NO_WPA | KeyMgmt::WPA_NONE).is_wpa());
    }

    #[test]
    fn psk_family() {
        assert!(KeyMgmt::PSK_SHA256.is_wpa_psk());
        assert!(!KeyMgmt::IEEE8021X.is_wpa_psk());
    }

    #[test]
    fn mfp_policy_parses() {
        assert_eq!("required".parse::<MfpPolicy>().ok(), Some(MfpPolicy::Required));
    }
}
