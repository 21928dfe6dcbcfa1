// ── WPS element codec ──
//
// The WPS vendor element (00:50:F2 type 4) carries big-endian
// type-length-value attributes and may be split across several
// elements. Only the attributes that drive BSS selection are decoded.

use nom::IResult;
use nom::bytes::complete::take;
use nom::number::complete::{be_u16, be_u8};

use crate::error::CoreError;
use crate::model::MacAddr;

use super::{WPS_IE_VENDOR_TYPE, vendor_ie_concat};

// ── Attribute types ─────────────────────────────────────────────────

pub const ATTR_CONFIG_METHODS: u16 = 0x1008;
pub const ATTR_DEVICE_NAME: u16 = 0x1011;
pub const ATTR_DEV_PASSWORD_ID: u16 = 0x1012;
pub const ATTR_SELECTED_REGISTRAR: u16 = 0x1041;
pub const ATTR_WPS_STATE: u16 = 0x1044;
pub const ATTR_UUID_E: u16 = 0x1047;
pub const ATTR_VENDOR_EXT: u16 = 0x1049;
pub const ATTR_VERSION: u16 = 0x104a;
pub const ATTR_SELECTED_REGISTRAR_CONFIG_METHODS: u16 = 0x1053;

/// Wi-Fi Alliance vendor extension OUI.
pub const WFA_OUI: [u8; 3] = [0x00, 0x37, 0x2a];
pub const WFA_ELEM_VERSION2: u8 = 0x00;
pub const WFA_ELEM_AUTHORIZEDMACS: u8 = 0x01;

/// Vendor extension OUI whose presence marks a "quantenna" BSS.
pub const QUANTENNA_OUI: [u8; 3] = [0x00, 0x26, 0x86];

// ── Device password IDs ─────────────────────────────────────────────

pub const DEV_PW_DEFAULT: u16 = 0x0000;
pub const DEV_PW_USER_SPECIFIED: u16 = 0x0001;
pub const DEV_PW_PUSHBUTTON: u16 = 0x0004;
pub const DEV_PW_REGISTRAR_SPECIFIED: u16 = 0x0005;

/// Decoded WPS attributes relevant to selection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WpsIe {
    pub version: Option<u8>,
    pub version2: Option<u8>,
    pub wps_state: Option<u8>,
    pub selected_registrar: bool,
    pub dev_password_id: Option<u16>,
    pub sel_reg_config_methods: Option<u16>,
    pub config_methods: Option<u16>,
    pub uuid_e: Option<[u8; 16]>,
    pub device_name: Option<String>,
    pub authorized_macs: Vec<MacAddr>,
    pub vendor_exts: Vec<([u8; 3], Vec<u8>)>,
}

fn attribute(input: &[u8]) -> IResult<&[u8], (u16, &[u8])> {
    let (input, kind) = be_u16(input)?;
    let (input, len) = be_u16(input)?;
    let (input, value) = take(len)(input)?;
    Ok((input, (kind, value)))
}

fn subelement(input: &[u8]) -> IResult<&[u8], (u8, &[u8])> {
    let (input, id) = be_u8(input)?;
    let (input, len) = be_u8(input)?;
    let (input, value) = take(len)(input)?;
    Ok((input, (id, value)))
}

impl WpsIe {
    /// Decode from a raw element buffer. `None` when no WPS element is present.
    pub fn from_ies(ies: &[u8]) -> Option<Result<Self, CoreError>> {
        vendor_ie_concat(ies, WPS_IE_VENDOR_TYPE).map(|attrs| Self::parse(&attrs))
    }

    /// Decode a concatenated attribute payload.
    pub fn parse(mut attrs: &[u8]) -> Result<Self, CoreError> {
        let mut out = Self::default();
        while !attrs.is_empty() {
            let (rest, (kind, value)) = attribute(attrs).map_err(|_| CoreError::MalformedIe {
                reason: "truncated WPS attribute".into(),
            })?;
            attrs = rest;
            out.apply(kind, value);
        }
        Ok(out)
    }

    fn apply(&mut self, kind: u16, value: &[u8]) {
        match kind {
            ATTR_VERSION => self.version = value.first().copied(),
            ATTR_WPS_STATE => self.wps_state = value.first().copied(),
            ATTR_SELECTED_REGISTRAR => {
                self.selected_registrar = value.first().is_some_and(|v| *v != 0);
            }
            ATTR_DEV_PASSWORD_ID => self.dev_password_id = be16(value),
            ATTR_CONFIG_METHODS => self.config_methods = be16(value),
            ATTR_SELECTED_REGISTRAR_CONFIG_METHODS => self.sel_reg_config_methods = be16(value),
            ATTR_UUID_E => self.uuid_e = <[u8; 16]>::try_from(value).ok(),
            ATTR_DEVICE_NAME => {
                self.device_name = Some(String::from_utf8_lossy(value).into_owned());
            }
            ATTR_VENDOR_EXT => self.apply_vendor_ext(value),
            _ => {}
        }
    }

    fn apply_vendor_ext(&mut self, value: &[u8]) {
        let Some((oui, data)) = value.split_first_chunk::<3>() else {
            return;
        };
        if *oui == WFA_OUI {
            let mut rest = data;
            while let Ok((next, (id, body))) = subelement(rest) {
                match id {
                    WFA_ELEM_VERSION2 => self.version2 = body.first().copied(),
                    WFA_ELEM_AUTHORIZEDMACS => self
                        .authorized_macs
                        .extend(body.chunks_exact(6).filter_map(MacAddr::from_slice)),
                    _ => {}
                }
                rest = next;
            }
        }
        self.vendor_exts.push((*oui, data.to_vec()));
    }

    // ── Predicates ───────────────────────────────────────────────────

    /// Registrar is active and waiting for a push-button enrollee.
    pub fn is_selected_pbc_registrar(&self) -> bool {
        self.selected_registrar && self.dev_password_id == Some(DEV_PW_PUSHBUTTON)
    }

    /// Registrar is active for PIN enrollment (absent ID means PIN).
    pub fn is_selected_pin_registrar(&self) -> bool {
        self.selected_registrar && self.dev_password_id != Some(DEV_PW_PUSHBUTTON)
    }

    /// Whether the AP's AuthorizedMACs list admits `addr`.
    ///
    /// A WPS 1.0 AP has no such list; with `ver1_compat` the selected
    /// PIN registrar flag stands in for it.
    pub fn is_addr_authorized(&self, addr: MacAddr, ver1_compat: bool) -> bool {
        if self.version2.is_none() && ver1_compat {
            return self.is_selected_pin_registrar();
        }
        self.authorized_macs
            .iter()
            .any(|m| *m == addr || m.is_broadcast())
    }

    pub fn has_vendor_ext(&self, oui: [u8; 3]) -> bool {
        self.vendor_exts.iter().any(|(o, _)| *o == oui)
    }

    // ── Encoding ─────────────────────────────────────────────────────

    /// Encode as a single WPS vendor element.
    pub fn to_element(&self) -> Vec<u8> {
        let mut attrs = Vec::new();
        let mut put = |kind: u16, value: &[u8]| {
            attrs.extend_from_slice(&kind.to_be_bytes());
            let len = u16::try_from(value.len()).unwrap_or(u16::MAX);
            attrs.extend_from_slice(&len.to_be_bytes());
            attrs.extend_from_slice(value);
        };
        put(ATTR_VERSION, &[self.version.unwrap_or(0x10)]);
        if let Some(state) = self.wps_state {
            put(ATTR_WPS_STATE, &[state]);
        }
        if self.selected_registrar {
            put(ATTR_SELECTED_REGISTRAR, &[1]);
        }
        if let Some(id) = self.dev_password_id {
            put(ATTR_DEV_PASSWORD_ID, &id.to_be_bytes());
        }
        if let Some(methods) = self.sel_reg_config_methods {
            put(ATTR_SELECTED_REGISTRAR_CONFIG_METHODS, &methods.to_be_bytes());
        }
        if let Some(uuid) = self.uuid_e {
            put(ATTR_UUID_E, &uuid);
        }
        if self.version2.is_some() || !self.authorized_macs.is_empty() {
            let mut wfa = WFA_OUI.to_vec();
            if let Some(v2) = self.version2 {
                wfa.extend_from_slice(&[WFA_ELEM_VERSION2, 1, v2]);
            }
            if !self.authorized_macs.is_empty() {
                let len = u8::try_from(self.authorized_macs.len() * 6).unwrap_or(u8::MAX);
                wfa.extend_from_slice(&[WFA_ELEM_AUTHORIZEDMACS, len]);
                for mac in &self.authorized_macs {
                    wfa.extend_from_slice(mac.as_bytes());
                }
            }
            put(ATTR_VENDOR_EXT, &wfa);
        }
        for (oui, data) in self.vendor_exts.iter().filter(|(o, _)| *o != WFA_OUI) {
            let mut ext = oui.to_vec();
            ext.extend_from_slice(data);
            put(ATTR_VENDOR_EXT, &ext);
        }

        let mut out = vec![super::EID_VENDOR_SPECIFIC, 0];
        out.extend_from_slice(&WPS_IE_VENDOR_TYPE.to_be_bytes());
        out.extend_from_slice(&attrs);
        out[1] = u8::try_from(out.len() - 2).unwrap_or(u8::MAX);
        out
    }
}

fn be16(value: &[u8]) -> Option<u16> {
    value.first_chunk::<2>().map(|b| u16::from_be_bytes(*b))
}
