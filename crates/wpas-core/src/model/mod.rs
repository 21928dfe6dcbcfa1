// ── Domain model ──
//
// Plain data types shared by every state machine in the crate.

pub mod addr;
pub mod bss;
pub mod event;
pub mod profile;
pub mod security;
pub mod state;

pub use addr::MacAddr;
pub use bss::{BssCaps, HwMode, HwModeFlags, HwModeKind, ScanResult, ScanResultBuilder};
pub use event::{
    AssocInfo, DisconnectInfo, DriverEvent, ForwardedKind, InterfaceStatusKind, Notification,
    WpsAvailability,
};
pub use profile::{
    Disabled, EapConfig, EapMethod, NUM_WEP_KEYS, NetworkProfile, OpMode, Passphrase, ProfileFlags,
    ProfileId, WPS_ENROLLEE_IDENTITY, WPS_REGISTRAR_IDENTITY, ssid_text,
};
pub use security::{AuthAlg, Cipher, EapolFlags, KeyMgmt, MfpPolicy, Proto, RSN_CAP_MFPC};
pub use state::{ReasonCode, WpaState};

/// Serde adapter: `Bytes` as a lowercase hex string.
pub(crate) mod hex_bytes {
    use bytes::Bytes;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &Bytes, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Bytes, D::Error> {
        let raw = String::deserialize(deserializer)?;
        hex::decode(raw.trim())
            .map(Bytes::from)
            .map_err(serde::de::Error::custom)
    }
}
