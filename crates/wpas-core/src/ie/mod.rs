// ── Information elements ──
//
// Tag-length-value walking over raw 802.11 element buffers, plus the
// security (RSN/WPA) and WPS decoders and the profile matcher built on
// top of them.

pub mod matcher;
pub mod wpa;
pub mod wps;

pub use matcher::{IeMatch, MatchOutcome, ssid_bss_match};
pub use wpa::{ParsedSecurityIe, parse_rsn_ie, parse_wpa_ie};
pub use wps::WpsIe;

// ── Element IDs ─────────────────────────────────────────────────────

pub const EID_SSID: u8 = 0;
pub const EID_SUPP_RATES: u8 = 1;
pub const EID_RSN: u8 = 48;
pub const EID_EXT_SUPP_RATES: u8 = 50;
pub const EID_MOBILITY_DOMAIN: u8 = 54;
pub const EID_VENDOR_SPECIFIC: u8 = 221;

/// `00:50:F2` type 1: WPA.
pub const WPA_IE_VENDOR_TYPE: u32 = 0x0050_f201;
/// `00:50:F2` type 4: WPS.
pub const WPS_IE_VENDOR_TYPE: u32 = 0x0050_f204;

pub const MOBILITY_DOMAIN_ID_LEN: usize = 2;

// ── Element walking ─────────────────────────────────────────────────

/// One element as found in a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Element<'a> {
    pub id: u8,
    pub body: &'a [u8],
    /// Header plus body, as transmitted.
    pub raw: &'a [u8],
}

impl Element<'_> {
    /// Vendor OUI and type packed as `0xOOOOOOTT`, for vendor elements.
    pub fn vendor_type(&self) -> Option<u32> {
        if self.id != EID_VENDOR_SPECIFIC {
            return None;
        }
        let head: [u8; 4] = self.body.get(..4)?.try_into().ok()?;
        Some(u32::from_be_bytes(head))
    }
}

/// Iterator over the elements of a buffer.
///
/// Stops at the first truncated element; `truncated()` reports whether
/// that happened.
#[derive(Debug, Clone)]
pub struct Elements<'a> {
    rest: &'a [u8],
    truncated: bool,
}

impl<'a> Elements<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self {
            rest: buf,
            truncated: false,
        }
    }

    pub fn truncated(&self) -> bool {
        self.truncated
    }
}

impl<'a> Iterator for Elements<'a> {
    type Item = Element<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let &[id, len, ..] = self.rest else {
            if !self.rest.is_empty() {
                self.truncated = true;
                self.rest = &[];
            }
            return None;
        };
        let total = usize::from(len) + 2;
        if total > self.rest.len() {
            self.truncated = true;
            self.rest = &[];
            return None;
        }
        let (whole, rest) = self.rest.split_at(total);
        self.rest = rest;
        Some(Element {
            id,
            body: whole.get(2..).unwrap_or_default(),
            raw: whole,
        })
    }
}

/// First element with `id`.
pub fn find_ie(buf: &[u8], id: u8) -> Option<Element<'_>> {
    Elements::new(buf).find(|e| e.id == id)
}

/// First vendor element of `vendor_type`.
pub fn find_vendor_ie(buf: &[u8], vendor_type: u32) -> Option<Element<'_>> {
    Elements::new(buf).find(|e| e.vendor_type() == Some(vendor_type))
}

/// Payloads (after OUI and type) of every vendor element of
/// `vendor_type`, concatenated. WPS attributes may span elements.
pub fn vendor_ie_concat(buf: &[u8], vendor_type: u32) -> Option<Vec<u8>> {
    let mut out: Option<Vec<u8>> = None;
    for e in Elements::new(buf).filter(|e| e.vendor_type() == Some(vendor_type)) {
        out.get_or_insert_with(Vec::new)
            .extend_from_slice(e.body.get(4..).unwrap_or_default());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn walks_elements() {
        let buf = [0, 3, b'a', b'b', b'c', 1, 1, 0x82];
        let ids: Vec<u8> = Elements::new(&buf).map(|e| e.id).collect();
        assert_eq!(ids, vec![0, 1]);
    }

    #[test]
    fn stops_on_truncation() {
        let buf = [0, 3, b'a', 1, 5, 0];
        let mut it = Elements::new(&buf);
        assert!(it.next().is_none());
        assert!(it.truncated());
    }

    #[test]
    fn concatenates_vendor_payloads() {
        let buf = [
            221, 6, 0x00, 0x50, 0xf2, 0x04, 0x10, 0x4a, //
            221, 5, 0x00, 0x50, 0xf2, 0x04, 0x00,
        ];
        let joined = vendor_ie_concat(&buf, WPS_IE_VENDOR_TYPE);
        assert_eq!(joined, Some(vec![0x10, 0x4a, 0x00]));
    }

    #[test]
    fn vendor_type_requires_four_bytes() {
        let buf = [221, 2, 0x00, 0x50];
        assert!(find_vendor_ie(&buf, WPA_IE_VENDOR_TYPE).is_none());
    }
}
