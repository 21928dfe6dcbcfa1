// ── RSN / WPA element codec ──
//
// Decodes the RSN element (IEEE 802.11-2016 9.4.2.25) and the legacy
// WPA vendor element into a ParsedSecurityIe. Trailing fields are
// optional; each one that is absent keeps its protocol default. A
// field that starts but is cut short is an error.

use nom::IResult;
use nom::bytes::complete::{tag, take};
use nom::combinator::map_res;
use nom::multi::length_count;
use nom::number::complete::le_u16;

use crate::error::CoreError;
use crate::model::{Cipher, KeyMgmt, Proto};

use super::{EID_RSN, EID_VENDOR_SPECIFIC, WPA_IE_VENDOR_TYPE};

const RSN_OUI: [u8; 3] = [0x00, 0x0f, 0xac];
const WPA_OUI: [u8; 3] = [0x00, 0x50, 0xf2];
const SUPPORTED_VERSION: u16 = 1;

pub type Pmkid = [u8; 16];

/// Decoded RSN or WPA element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedSecurityIe {
    pub proto: Proto,
    pub group: Cipher,
    pub pairwise: Cipher,
    pub key_mgmt: KeyMgmt,
    pub capabilities: u16,
    pub pmkids: Vec<Pmkid>,
    pub mgmt_group: Option<Cipher>,
}

impl ParsedSecurityIe {
    fn rsn_defaults() -> Self {
        Self {
            proto: Proto::RSN,
            group: Cipher::CCMP,
            pairwise: Cipher::CCMP,
            key_mgmt: KeyMgmt::IEEE8021X,
            capabilities: 0,
            pmkids: Vec::new(),
            mgmt_group: None,
        }
    }

    fn wpa_defaults() -> Self {
        Self {
            proto: Proto::WPA,
            group: Cipher::TKIP,
            pairwise: Cipher::TKIP,
            ..Self::rsn_defaults()
        }
    }
}

impl Default for ParsedSecurityIe {
    fn default() -> Self {
        Self::rsn_defaults()
    }
}

// ── Suite selectors ─────────────────────────────────────────────────

fn cipher_from_selector(oui: [u8; 3], selector: [u8; 4]) -> Cipher {
    if selector[..3] != oui {
        return Cipher::empty();
    }
    match selector[3] {
        0 => Cipher::NONE,
        1 => Cipher::WEP40,
        2 => Cipher::TKIP,
        4 => Cipher::CCMP,
        5 => Cipher::WEP104,
        6 if oui == RSN_OUI => Cipher::AES_128_CMAC,
        _ => Cipher::empty(),
    }
}

fn rsn_akm_from_selector(selector: [u8; 4]) -> KeyMgmt {
    if selector[..3] != RSN_OUI {
        return KeyMgmt::empty();
    }
    match selector[3] {
        1 => KeyMgmt::IEEE8021X,
        2 => KeyMgmt::PSK,
        3 => KeyMgmt::FT_IEEE8021X,
        4 => KeyMgmt::FT_PSK,
        5 => KeyMgmt::IEEE8021X_SHA256,
        6 => KeyMgmt::PSK_SHA256,
        _ => KeyMgmt::empty(),
    }
}

fn wpa_akm_from_selector(selector: [u8; 4]) -> KeyMgmt {
    if selector[..3] != WPA_OUI {
        return KeyMgmt::empty();
    }
    match selector[3] {
        0 => KeyMgmt::WPA_NONE,
        1 => KeyMgmt::IEEE8021X,
        2 => KeyMgmt::PSK,
        _ => KeyMgmt::empty(),
    }
}

fn cipher_selector(oui: [u8; 3], cipher: Cipher) -> Option<[u8; 4]> {
    let id = match cipher {
        c if c == Cipher::NONE => 0,
        c if c == Cipher::WEP40 => 1,
        c if c == Cipher::TKIP => 2,
        c if c == Cipher::CCMP => 4,
        c if c == Cipher::WEP104 => 5,
        c if c == Cipher::AES_128_CMAC && oui == RSN_OUI => 6,
        _ => return None,
    };
    Some([oui[0], oui[1], oui[2], id])
}

fn akm_selector(proto: Proto, akm: KeyMgmt) -> Option<[u8; 4]> {
    let (oui, id) = if proto == Proto::RSN {
        let id = match akm {
            k if k == KeyMgmt::IEEE8021X => 1,
            k if k == KeyMgmt::PSK => 2,
            k if k == KeyMgmt::FT_IEEE8021X => 3,
            k if k == KeyMgmt::FT_PSK => 4,
            k if k == KeyMgmt::IEEE8021X_SHA256 => 5,
            k if k == KeyMgmt::PSK_SHA256 => 6,
            _ => return None,
        };
        (RSN_OUI, id)
    } else {
        let id = match akm {
            k if k == KeyMgmt::WPA_NONE => 0,
            k if k == KeyMgmt::IEEE8021X => 1,
            k if k == KeyMgmt::PSK => 2,
            _ => return None,
        };
        (WPA_OUI, id)
    };
    Some([oui[0], oui[1], oui[2], id])
}

// ── nom parsers ─────────────────────────────────────────────────────

fn selector(input: &[u8]) -> IResult<&[u8], [u8; 4]> {
    map_res(take(4usize), <[u8; 4]>::try_from)(input)
}

fn pmkid(input: &[u8]) -> IResult<&[u8], Pmkid> {
    map_res(take(16usize), <Pmkid>::try_from)(input)
}

fn malformed(what: &str) -> CoreError {
    CoreError::MalformedIe {
        reason: what.to_owned(),
    }
}

/// Version check plus the shared suite layout of RSN and WPA bodies.
fn parse_suites(
    input: &[u8],
    oui: [u8; 3],
    akm_from: fn([u8; 4]) -> KeyMgmt,
    mut out: ParsedSecurityIe,
) -> Result<(ParsedSecurityIe, &[u8]), CoreError> {
    let (rest, version) =
        le_u16::<_, nom::error::Error<&[u8]>>(input).map_err(|_| malformed("too short"))?;
    if version != SUPPORTED_VERSION {
        return Err(malformed("unsupported version"));
    }
    if rest.is_empty() {
        return Ok((out, rest));
    }

    let (rest, group) = selector(rest).map_err(|_| malformed("truncated group suite"))?;
    out.group = cipher_from_selector(oui, group);
    if rest.is_empty() {
        return Ok((out, rest));
    }

    let (rest, pairwise) =
        length_count(le_u16, selector)(rest).map_err(|_| malformed("truncated pairwise list"))?;
    if pairwise.is_empty() {
        return Err(malformed("empty pairwise list"));
    }
    out.pairwise = pairwise
        .into_iter()
        .fold(Cipher::empty(), |acc, s| acc | cipher_from_selector(oui, s));
    if rest.is_empty() {
        return Ok((out, rest));
    }

    let (rest, akms) =
        length_count(le_u16, selector)(rest).map_err(|_| malformed("truncated AKM list"))?;
    if akms.is_empty() {
        return Err(malformed("empty AKM list"));
    }
    out.key_mgmt = akms
        .into_iter()
        .fold(KeyMgmt::empty(), |acc, s| acc | akm_from(s));
    Ok((out, rest))
}

/// Decode an RSN element body (after the two-byte header).
pub fn parse_rsn_ie(body: &[u8]) -> Result<ParsedSecurityIe, CoreError> {
    let (mut out, rest) = parse_suites(
        body,
        RSN_OUI,
        rsn_akm_from_selector,
        ParsedSecurityIe::rsn_defaults(),
    )?;
    if rest.is_empty() {
        return Ok(out);
    }

    let (rest, caps) = le_u16::<_, nom::error::Error<&[u8]>>(rest)
        .map_err(|_| malformed("truncated capabilities"))?;
    out.capabilities = caps;
    if rest.is_empty() {
        return Ok(out);
    }

    let (rest, pmkids) =
        length_count(le_u16, pmkid)(rest).map_err(|_| malformed("truncated PMKID list"))?;
    out.pmkids = pmkids;
    if rest.is_empty() {
        return Ok(out);
    }

    let (_, mgmt) = selector(rest).map_err(|_| malformed("truncated group mgmt suite"))?;
    out.mgmt_group = Some(cipher_from_selector(RSN_OUI, mgmt));
    Ok(out)
}

/// Decode a WPA vendor element body (starting at the OUI).
pub fn parse_wpa_ie(body: &[u8]) -> Result<ParsedSecurityIe, CoreError> {
    let vendor = WPA_IE_VENDOR_TYPE.to_be_bytes();
    let (rest, _) = tag::<_, _, nom::error::Error<&[u8]>>(&vendor[..])(body)
        .map_err(|_| malformed("not a WPA element"))?;
    let (out, _) = parse_suites(
        rest,
        WPA_OUI,
        wpa_akm_from_selector,
        ParsedSecurityIe::wpa_defaults(),
    )?;
    Ok(out)
}

/// Decode either flavor from a complete element (header included).
pub fn parse_security_ie(raw: &[u8]) -> Result<ParsedSecurityIe, CoreError> {
    match raw {
        [EID_RSN, _, body @ ..] => parse_rsn_ie(body),
        [EID_VENDOR_SPECIFIC, _, body @ ..] => parse_wpa_ie(body),
        _ => Err(malformed("not a security element")),
    }
}

// ── Encoding ────────────────────────────────────────────────────────

/// Encode as a complete element. RSN when `proto` contains RSN, else WPA.
///
/// Each set bit of `pairwise` and `key_mgmt` becomes one list entry.
pub fn build_security_ie(ie: &ParsedSecurityIe) -> Vec<u8> {
    let rsn = ie.proto.contains(Proto::RSN);
    let oui = if rsn { RSN_OUI } else { WPA_OUI };
    let proto = if rsn { Proto::RSN } else { Proto::WPA };

    let mut body = Vec::new();
    if !rsn {
        body.extend_from_slice(&WPA_IE_VENDOR_TYPE.to_be_bytes());
    }
    body.extend_from_slice(&SUPPORTED_VERSION.to_le_bytes());
    body.extend_from_slice(&cipher_selector(oui, ie.group).unwrap_or([oui[0], oui[1], oui[2], 0]));

    let pairwise: Vec<[u8; 4]> = ie
        .pairwise
        .iter()
        .filter_map(|c| cipher_selector(oui, c))
        .collect();
    push_list(&mut body, &pairwise);

    let akms: Vec<[u8; 4]> = ie
        .key_mgmt
        .iter()
        .filter_map(|k| akm_selector(proto, k))
        .collect();
    push_list(&mut body, &akms);

    if rsn {
        body.extend_from_slice(&ie.capabilities.to_le_bytes());
        if !ie.pmkids.is_empty() || ie.mgmt_group.is_some() {
            push_list(&mut body, &ie.pmkids);
        }
        if let Some(sel) = ie.mgmt_group.and_then(|c| cipher_selector(oui, c)) {
            body.extend_from_slice(&sel);
        }
    }

    let id = if rsn { EID_RSN } else { EID_VENDOR_SPECIFIC };
    let mut out = Vec::with_capacity(body.len() + 2);
    out.push(id);
    out.push(u8::try_from(body.len()).unwrap_or(u8::MAX));
    out.extend_from_slice(&body);
    out
}

fn push_list<const N: usize>(out: &mut Vec<u8>, items: &[[u8; N]]) {
    let n = u16::try_from(items.len()).unwrap_or(u16::MAX);
    out.extend_from_slice(&n.to_le_bytes());
    for item in items {
        out.extend_from_slice(item);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn wpa2_psk() -> ParsedSecurityIe {
        ParsedSecurityIe {
            proto: Proto::RSN,
            group: Cipher::CCMP,
            pairwise: Cipher::CCMP,
            key_mgmt: KeyMgmt::PSK,
            capabilities: 0,
            pmkids: Vec::new(),
            mgmt_group: None,
        }
    }

    #[test]
    fn parses_minimal_rsn_with_defaults() {
        let ie = parse_rsn_ie(&[1, 0]).unwrap();
        assert_eq!(ie.group, Cipher::CCMP);
        assert_eq!(ie.pairwise, Cipher::CCMP);
        assert_eq!(ie.key_mgmt, KeyMgmt::IEEE8021X);
    }

    #[test]
    fn parses_full_rsn_psk() {
        let raw = [
            48, 20, 1, 0, 0x00, 0x0f, 0xac, 4, 1, 0, 0x00, 0x0f, 0xac, 4, 1, 0, 0x00, 0x0f, 0xac,
            2, 0x80, 0,
        ];
        let ie = parse_security_ie(&raw).unwrap();
        assert_eq!(ie.key_mgmt, KeyMgmt::PSK);
        assert_eq!(ie.capabilities, 0x80);
    }

    #[test]
    fn rejects_wrong_version() {
        assert!(parse_rsn_ie(&[2, 0]).is_err());
    }

    #[test]
    fn rejects_truncated_pairwise_list() {
        assert!(parse_rsn_ie(&[1, 0, 0x00, 0x0f, 0xac, 4, 2, 0, 0x00, 0x0f]).is_err());
    }

    #[test]
    fn rejects_empty_akm_list() {
        let body = [1, 0, 0x00, 0x0f, 0xac, 4, 1, 0, 0x00, 0x0f, 0xac, 4, 0, 0];
        assert!(parse_rsn_ie(&body).is_err());
    }

    #[test]
    fn wpa_defaults_are_tkip() {
        let ie = parse_wpa_ie(&[0x00, 0x50, 0xf2, 0x01, 1, 0]).unwrap();
        assert_eq!(ie.proto, Proto::WPA);
        assert_eq!(ie.group, Cipher::TKIP);
    }

    #[test]
    fn builder_output_parses_back() {
        let mut ie = wpa2_psk();
        ie.pmkids.push([7; 16]);
        let raw = build_security_ie(&ie);
        assert_eq!(parse_security_ie(&raw).unwrap(), ie);
    }

    #[test]
    fn wpa_builder_uses_vendor_element() {
        let ie = ParsedSecurityIe {
            proto: Proto::WPA,
            group: Cipher::TKIP,
            pairwise: Cipher::TKIP,
            ..wpa2_psk()
        };
        let raw = build_security_ie(&ie);
        assert_eq!(raw[0], EID_VENDOR_SPECIFIC);
        assert_eq!(parse_security_ie(&raw).unwrap().pairwise, Cipher::TKIP);
    }
}
