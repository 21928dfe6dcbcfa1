// ── BSS records ──
//
// One ScanResult per observed access point, immutable for the duration
// of a selection pass. Information elements are kept as the raw buffer
// and decoded lazily through the `ie` module.

use bitflags::bitflags;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use super::addr::MacAddr;
use super::hex_bytes;
use super::profile::ssid_text;
use crate::ie::{self, EID_RSN, EID_SSID, Element, WPA_IE_VENDOR_TYPE, WPS_IE_VENDOR_TYPE};

bitflags! {
    /// Capability Information field bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct BssCaps: u16 {
        const ESS     = 0x0001;
        const IBSS    = 0x0002;
        const PRIVACY = 0x0010;
    }
}

/// One scanned BSS.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanResult {
    pub bssid: MacAddr,
    /// Channel center frequency in MHz.
    pub freq: u32,
    #[serde(default)]
    pub caps: BssCaps,
    /// Signal level in dBm.
    pub level: i32,
    #[serde(default)]
    pub qual: i32,
    #[serde(default)]
    pub noise: i32,
    #[serde(default)]
    pub tsf: u64,
    /// Raw information elements, hex encoded on the wire.
    #[serde(with = "hex_bytes", default)]
    pub ies: Bytes,
}

impl ScanResult {
    pub fn ie(&self, id: u8) -> Option<Element<'_>> {
        ie::find_ie(&self.ies, id)
    }

    pub fn vendor_ie(&self, vendor_type: u32) -> Option<Element<'_>> {
        ie::find_vendor_ie(&self.ies, vendor_type)
    }

    /// Advertised SSID; empty when hidden or absent.
    pub fn ssid(&self) -> &[u8] {
        self.ie(EID_SSID).map_or(&[][..], |e| e.body)
    }

    pub fn ssid_text(&self) -> String {
        ssid_text(self.ssid())
    }

    pub fn rsn_ie(&self) -> Option<Element<'_>> {
        self.ie(EID_RSN)
    }

    pub fn wpa_ie(&self) -> Option<Element<'_>> {
        self.vendor_ie(WPA_IE_VENDOR_TYPE)
    }

    pub fn has_wps_ie(&self) -> bool {
        self.vendor_ie(WPS_IE_VENDOR_TYPE).is_some()
    }

    /// Decoded WPS attributes; a malformed element counts as absent.
    pub fn wps_ie(&self) -> Option<ie::WpsIe> {
        ie::WpsIe::from_ies(&self.ies).and_then(Result::ok)
    }

    pub fn privacy(&self) -> bool {
        self.caps.contains(BssCaps::PRIVACY)
    }

    pub fn is_ibss(&self) -> bool {
        self.caps.contains(BssCaps::IBSS)
    }
}

// ── Builder ─────────────────────────────────────────────────────────

/// Assembles a ScanResult element by element.
#[derive(Debug, Clone)]
pub struct ScanResultBuilder {
    result: ScanResult,
    ies: Vec<u8>,
}

impl ScanResultBuilder {
    pub fn new(bssid: MacAddr, freq: u32, level: i32) -> Self {
        Self {
            result: ScanResult {
                bssid,
                freq,
                caps: BssCaps::ESS,
                level,
                qual: 0,
                noise: 0,
                tsf: 0,
                ies: Bytes::new(),
            },
            ies: Vec::new(),
        }
    }

    pub fn ssid(mut self, ssid: impl AsRef<[u8]>) -> Self {
        let ssid = ssid.as_ref();
        self.ies.push(EID_SSID);
        self.ies.push(u8::try_from(ssid.len()).unwrap_or(u8::MAX));
        self.ies.extend_from_slice(ssid);
        self
    }

    pub fn caps(mut self, caps: BssCaps) -> Self {
        self.result.caps = caps;
        self
    }

    pub fn privacy(mut self) -> Self {
        self.result.caps |= BssCaps::PRIVACY;
        self
    }

    /// Append a complete element (header included).
    pub fn element(mut self, raw: &[u8]) -> Self {
        self.ies.extend_from_slice(raw);
        self
    }

    /// Append the basic and extended supported-rate elements.
    pub fn rates(mut self, rates: &[u8]) -> Self {
        let (basic, ext) = rates.split_at(rates.len().min(8));
        for (id, chunk) in [(ie::EID_SUPP_RATES, basic), (ie::EID_EXT_SUPP_RATES, ext)] {
            if chunk.is_empty() {
                continue;
            }
            self.ies.push(id);
            self.ies.push(u8::try_from(chunk.len()).unwrap_or(u8::MAX));
            self.ies.extend_from_slice(chunk);
        }
        self
    }

    pub fn build(mut self) -> ScanResult {
        self.result.ies = Bytes::from(self.ies);
        self.result
    }
}

// ── Hardware modes ──────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HwModeKind {
    B,
    G,
    A,
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct HwModeFlags: u8 {
        const HT_INFO_KNOWN = 1 << 0;
    }
}

/// One radio band/mode and the rates it supports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HwMode {
    pub mode: HwModeKind,
    /// Channel center frequencies in MHz.
    pub channels: Vec<u32>,
    /// Supported rates in 100 kbps units.
    pub rates: Vec<u32>,
    #[serde(default)]
    pub mcs_set: [u8; 16],
    #[serde(default)]
    pub flags: HwModeFlags,
}

impl HwMode {
    /// Whether the radio can join an HT-only BSS in this mode.
    pub fn ht_supported(&self) -> bool {
        if !self.flags.contains(HwModeFlags::HT_INFO_KNOWN) {
            // No HT information: assume support.
            return true;
        }
        // MCS 0-7 must be supported.
        self.mcs_set[0] == 0xff
    }
}
