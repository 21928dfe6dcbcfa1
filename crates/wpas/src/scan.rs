//! Scan-result files.
//!
//! A scan file is a JSON array of BSS entries. Each entry names its
//! security preset instead of spelling out raw elements; `ies` appends
//! extra hex-encoded elements verbatim.

use std::path::Path;

use serde::Deserialize;
use serde::de::DeserializeOwned;

use wpas_core::ie::WpsIe;
use wpas_core::model::{BssCaps, ScanResultBuilder};
use wpas_core::{MacAddr, ScanResult};

use crate::error::CliError;

/// RSN, CCMP pairwise and group, PSK.
const RSN_PSK: [u8; 22] = [
    48, 20, 1, 0, 0x00, 0x0f, 0xac, 4, 1, 0, 0x00, 0x0f, 0xac, 4, 1, 0, 0x00, 0x0f, 0xac, 2, 0, 0,
];
/// RSN, CCMP pairwise and group, 802.1X.
const RSN_EAP: [u8; 22] = [
    48, 20, 1, 0, 0x00, 0x0f, 0xac, 4, 1, 0, 0x00, 0x0f, 0xac, 4, 1, 0, 0x00, 0x0f, 0xac, 1, 0, 0,
];
/// WPA vendor element, TKIP pairwise and group, PSK.
const WPA_PSK: [u8; 24] = [
    221, 22, 0x00, 0x50, 0xf2, 1, 1, 0, 0x00, 0x50, 0xf2, 2, 1, 0, 0x00, 0x50, 0xf2, 2, 1, 0,
    0x00, 0x50, 0xf2, 2,
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BssSecurity {
    #[default]
    Open,
    Wep,
    WpaPsk,
    Wpa2Psk,
    Wpa2Eap,
}

/// WPS registrar state advertised by the BSS.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WpsMode {
    /// WPS configured, no active registrar.
    Idle,
    Pbc,
    Pin,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScanEntry {
    pub bssid: MacAddr,
    pub freq: u32,
    pub level: i32,
    #[serde(default)]
    pub ssid: Option<String>,
    #[serde(default)]
    pub security: BssSecurity,
    #[serde(default)]
    pub ibss: bool,
    #[serde(default)]
    pub wps: Option<WpsMode>,
    /// 16-byte WPS UUID as hex; defaults to one derived from the BSSID.
    #[serde(default)]
    pub wps_uuid: Option<String>,
    #[serde(default)]
    pub ies: Option<String>,
}

impl ScanEntry {
    pub fn to_result(&self) -> Result<ScanResult, CliError> {
        let mut builder = ScanResultBuilder::new(self.bssid, self.freq, self.level);
        if self.ibss {
            builder = builder.caps(BssCaps::IBSS);
        }
        if let Some(ssid) = &self.ssid {
            builder = builder.ssid(ssid);
        }
        builder = match self.security {
            BssSecurity::Open => builder,
            BssSecurity::Wep => builder.privacy(),
            BssSecurity::WpaPsk => builder.privacy().element(&WPA_PSK),
            BssSecurity::Wpa2Psk => builder.privacy().element(&RSN_PSK),
            BssSecurity::Wpa2Eap => builder.privacy().element(&RSN_EAP),
        };
        if let Some(mode) = self.wps {
            builder = builder.element(&self.wps_ie(mode)?.to_element());
        }
        if let Some(raw) = &self.ies {
            let bytes = decode_hex(raw).map_err(|reason| CliError::Validation {
                field: format!("ies of {}", self.bssid),
                reason,
            })?;
            builder = builder.element(&bytes);
        }
        Ok(builder.build())
    }

    fn wps_ie(&self, mode: WpsMode) -> Result<WpsIe, CliError> {
        let uuid = match &self.wps_uuid {
            Some(raw) => {
                let bytes = decode_hex(raw).map_err(|reason| CliError::Validation {
                    field: format!("wps_uuid of {}", self.bssid),
                    reason,
                })?;
                <[u8; 16]>::try_from(bytes.as_slice()).map_err(|_| CliError::Validation {
                    field: format!("wps_uuid of {}", self.bssid),
                    reason: "expected 16 bytes".into(),
                })?
            }
            None => {
                let mut uuid = [0u8; 16];
                uuid[..6].copy_from_slice(self.bssid.as_bytes());
                uuid
            }
        };
        Ok(WpsIe {
            version: Some(0x10),
            wps_state: Some(2),
            selected_registrar: mode != WpsMode::Idle,
            dev_password_id: match mode {
                WpsMode::Idle => None,
                WpsMode::Pbc => Some(wpas_core::ie::wps::DEV_PW_PUSHBUTTON),
                WpsMode::Pin => Some(wpas_core::ie::wps::DEV_PW_DEFAULT),
            },
            uuid_e: Some(uuid),
            ..WpsIe::default()
        })
    }
}

/// Hex decoding that tolerates whitespace and colons.
fn decode_hex(raw: &str) -> Result<Vec<u8>, String> {
    let bare: String = raw
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ':')
        .collect();
    hex::decode(bare).map_err(|err| err.to_string())
}

/// Read and parse a JSON file.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, CliError> {
    let body = std::fs::read_to_string(path).map_err(|source| CliError::Read {
        path: path.display().to_string(),
        source,
    })?;
    serde_json::from_str(&body).map_err(|source| CliError::Json {
        path: path.display().to_string(),
        source,
    })
}

pub fn to_results(entries: &[ScanEntry]) -> Result<Vec<ScanResult>, CliError> {
    entries.iter().map(ScanEntry::to_result).collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn entry(json: &str) -> ScanEntry {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn presets_add_security_elements() {
        let bss = entry(
            r#"{"bssid":"02:00:00:00:00:01","freq":2412,"level":-40,
                "ssid":"home","security":"wpa2-psk"}"#,
        )
        .to_result()
        .unwrap();
        assert_eq!(bss.ssid(), b"home");
        assert!(bss.privacy());
        assert!(bss.rsn_ie().is_some());
        assert!(bss.wpa_ie().is_none());
    }

    #[test]
    fn pbc_registrar_is_advertised() {
        let bss = entry(
            r#"{"bssid":"02:00:00:00:00:02","freq":2437,"level":-50,
                "ssid":"guest","wps":"pbc"}"#,
        )
        .to_result()
        .unwrap();
        assert!(bss.wps_ie().unwrap().is_selected_pbc_registrar());
    }

    #[test]
    fn odd_hex_is_rejected() {
        let bad = entry(r#"{"bssid":"02:00:00:00:00:03","freq":2412,"level":-40,"ies":"abc"}"#);
        assert!(bad.to_result().is_err());
    }

    #[test]
    fn ibss_flag_sets_caps() {
        let bss = entry(r#"{"bssid":"02:00:00:00:00:04","freq":2412,"level":-40,"ibss":true}"#)
            .to_result()
            .unwrap();
        assert!(bss.is_ibss());
    }
}
