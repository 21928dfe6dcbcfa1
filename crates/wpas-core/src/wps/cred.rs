// ── WPS credentials ──
//
// Turning a Credential delivered by the registration protocol into the
// fields of a network profile, plus the scan-result based upgrade to
// WPA2/CCMP for APs that under-report their own security.

use bitflags::bitflags;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::collab::DriverCapabilities;
use crate::error::CoreError;
use crate::ie::wpa::{parse_rsn_ie, parse_wpa_ie};
use crate::model::{
    AuthAlg, Cipher, KeyMgmt, MacAddr, NUM_WEP_KEYS, NetworkProfile, Passphrase, Proto,
    ScanResult, ssid_text,
};

bitflags! {
    /// Authentication Type Flags attribute.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct WpsAuthType: u16 {
        const OPEN    = 0x0001;
        const WPAPSK  = 0x0002;
        const SHARED  = 0x0004;
        const WPA     = 0x0008;
        const WPA2    = 0x0010;
        const WPA2PSK = 0x0020;
    }
}

bitflags! {
    /// Encryption Type Flags attribute.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct WpsEncrType: u16 {
        const NONE = 0x0001;
        const WEP  = 0x0002;
        const TKIP = 0x0004;
        const AES  = 0x0008;
    }
}

/// Network settings handed over by a registrar.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    #[serde(with = "ssid_string")]
    pub ssid: Vec<u8>,
    pub auth_type: WpsAuthType,
    pub encr_type: WpsEncrType,
    #[serde(default)]
    pub key_idx: u8,
    /// Network key exactly as received: ASCII passphrase, hex PSK or
    /// WEP key.
    #[serde(with = "ssid_string", default)]
    pub key: Vec<u8>,
    pub mac_addr: MacAddr,
    /// Raw Credential attribute, when the engine preserved it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cred_attr: Option<Bytes>,
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("ssid", &ssid_text(&self.ssid))
            .field("auth_type", &self.auth_type)
            .field("encr_type", &self.encr_type)
            .field("key_idx", &self.key_idx)
            .field("key", &"***")
            .field("mac_addr", &self.mac_addr)
            .finish_non_exhaustive()
    }
}

mod ssid_string {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&String::from_utf8_lossy(value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        String::deserialize(d).map(String::into_bytes)
    }
}

impl Credential {
    /// Authentication type the station will configure, or `None` when
    /// the credential should be ignored. Mixed WPA/WPA2-PSK collapses
    /// to WPA2-PSK.
    pub fn effective_auth(&self) -> Option<WpsAuthType> {
        let auth = if self.auth_type == WpsAuthType::WPAPSK | WpsAuthType::WPA2PSK {
            debug!("WPS: converting mixed-mode auth_type into WPA2PSK");
            WpsAuthType::WPA2PSK
        } else {
            self.auth_type
        };
        [
            WpsAuthType::OPEN,
            WpsAuthType::SHARED,
            WpsAuthType::WPAPSK,
            WpsAuthType::WPA2PSK,
        ]
        .contains(&auth)
        .then_some(auth)
    }
}

/// What the caller still has to do after `apply_credential`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Applied {
    /// A passphrase was stored; derive the PSK from it.
    pub derive_psk: bool,
}

fn invalid(reason: impl Into<String>) -> CoreError {
    let reason = reason.into();
    error!("WPS: {reason}");
    CoreError::InvalidCredential { reason }
}

/// Reset the security fields to their unconfigured defaults.
pub fn reset_security(profile: &mut NetworkProfile) {
    let defaults = NetworkProfile::default();
    profile.key_mgmt = defaults.key_mgmt;
    profile.proto = defaults.proto;
    profile.pairwise = defaults.pairwise;
    profile.group = defaults.group;
    profile.auth_alg = defaults.auth_alg;
    profile.eapol_flags = defaults.eapol_flags;
}

/// Write `cred` into `profile`, which must already have its SSID set.
pub fn apply_credential(
    profile: &mut NetworkProfile,
    cred: &Credential,
    auth: WpsAuthType,
) -> Result<Applied, CoreError> {
    if cred.encr_type == WpsEncrType::WEP && !cred.key.is_empty() {
        apply_wep_key(profile, cred)?;
    } else if cred.encr_type == WpsEncrType::TKIP {
        profile.pairwise = Cipher::TKIP;
    } else if cred.encr_type == WpsEncrType::AES {
        profile.pairwise = Cipher::CCMP;
    }

    let (alg, km, proto) = match auth {
        a if a == WpsAuthType::SHARED => (AuthAlg::SHARED, KeyMgmt::NONE, Proto::empty()),
        a if a == WpsAuthType::WPAPSK => (AuthAlg::OPEN, KeyMgmt::PSK, Proto::WPA),
        a if a == WpsAuthType::WPA2PSK => (AuthAlg::OPEN, KeyMgmt::PSK, Proto::RSN),
        _ => (AuthAlg::OPEN, KeyMgmt::NONE, Proto::empty()),
    };
    profile.auth_alg = alg;
    profile.key_mgmt = km;
    profile.proto = proto;

    let mut applied = Applied::default();
    if profile.key_mgmt == KeyMgmt::PSK {
        match cred.key.len() {
            64 => {
                let mut psk = [0_u8; 32];
                hex::decode_to_slice(&cred.key, &mut psk)
                    .map_err(|_| invalid("invalid network key"))?;
                profile.psk = Some(psk);
                profile.passphrase = None;
            }
            8..=63 => {
                let text = String::from_utf8(cred.key.clone())
                    .map_err(|_| invalid("network key is not ASCII"))?;
                profile.passphrase = Some(Passphrase::new(text));
                profile.psk = None;
                applied.derive_psk = true;
            }
            n => return Err(invalid(format!("invalid network key length {n}"))),
        }
        profile.export_keys = true;
    }
    Ok(applied)
}

fn apply_wep_key(profile: &mut NetworkProfile, cred: &Credential) -> Result<(), CoreError> {
    let len = cred.key.len();
    if !matches!(len, 5 | 13 | 10 | 26) {
        return Err(invalid(format!("invalid WEP key length {len}")));
    }
    if usize::from(cred.key_idx) > NUM_WEP_KEYS {
        return Err(invalid(format!("invalid WEP key index {}", cred.key_idx)));
    }
    let idx = usize::from(cred.key_idx.saturating_sub(1));
    let key = if len == 10 || len == 26 {
        hex::decode(&cred.key).map_err(|_| invalid(format!("invalid WEP key {idx}")))?
    } else {
        cred.key.clone()
    };
    let Some(slot) = profile.wep_keys.get_mut(idx) else {
        return Err(invalid(format!("invalid WEP key index {}", cred.key_idx)));
    };
    *slot = key;
    profile.wep_tx_keyidx = idx;
    Ok(())
}

/// Upgrade a freshly applied credential to WPA2 and/or CCMP when the
/// AP's own advertisement shows it supports them.
pub fn security_workaround(
    profile: &mut NetworkProfile,
    bss: Option<&ScanResult>,
    caps: &DriverCapabilities,
    ap_scan: u8,
) {
    let Some(bss) = bss else {
        debug!("WPS: the AP was not found from BSS table - use credential as-is");
        return;
    };
    debug!("WPS: AP found from BSS table");

    let mut wpa2 = false;
    let mut ccmp = false;
    let mut advertised = false;
    let rsn = bss.rsn_ie().and_then(|e| parse_rsn_ie(e.body).ok());
    if let Some(adv) = rsn {
        advertised = true;
        wpa2 = true;
        ccmp = adv.pairwise.contains(Cipher::CCMP);
    } else if let Some(elem) = bss.wpa_ie() {
        advertised = true;
        ccmp = parse_wpa_ie(elem.body).is_ok_and(|adv| adv.pairwise.contains(Cipher::CCMP));
    }

    if !advertised && profile.proto.contains(Proto::WPA) && profile.pairwise.contains(Cipher::TKIP)
    {
        debug!("WPS: the AP did not yet advertise WPA support - use credential as-is");
        return;
    }

    if ccmp
        && !profile.pairwise.contains(Cipher::CCMP)
        && profile.pairwise.contains(Cipher::TKIP)
        && caps.key_mgmt.contains(KeyMgmt::PSK)
    {
        debug!("WPS: add CCMP into the credential based on scan results");
        if ap_scan == 1 {
            profile.pairwise |= Cipher::CCMP;
        } else {
            profile.pairwise = Cipher::CCMP;
        }
    }

    if wpa2
        && !profile.proto.contains(Proto::RSN)
        && profile.proto.contains(Proto::WPA)
        && caps.enc.contains(Cipher::CCMP)
    {
        debug!("WPS: add WPA2 into the credential based on scan results");
        if ap_scan == 1 {
            profile.proto |= Proto::RSN;
        } else {
            profile.proto = Proto::RSN;
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::collab::DriverFlags;
    use crate::ie::wpa::{ParsedSecurityIe, build_security_ie};
    use crate::model::{MfpPolicy, ScanResultBuilder};
    use pretty_assertions::assert_eq;

    fn cred(auth: WpsAuthType, encr: WpsEncrType, key: &[u8]) -> Credential {
        Credential {
            ssid: b"home".to_vec(),
            auth_type: auth,
            encr_type: encr,
            key_idx: 0,
            key: key.to_vec(),
            mac_addr: MacAddr::new([2, 0, 0, 0, 0, 1]),
            cred_attr: None,
        }
    }

    fn caps() -> DriverCapabilities {
        DriverCapabilities {
            flags: DriverFlags::empty(),
            key_mgmt: KeyMgmt::PSK | KeyMgmt::IEEE8021X,
            enc: Cipher::CCMP | Cipher::TKIP,
            mfp: MfpPolicy::Disabled,
        }
    }

    #[test]
    fn mixed_psk_collapses_to_wpa2() {
        let c = cred(WpsAuthType::WPAPSK | WpsAuthType::WPA2PSK, WpsEncrType::AES, b"");
        assert_eq!(c.effective_auth(), Some(WpsAuthType::WPA2PSK));
        let c = cred(WpsAuthType::WPA2, WpsEncrType::AES, b"");
        assert_eq!(c.effective_auth(), None);
    }

    #[test]
    fn passphrase_credential_requests_derivation() {
        let c = cred(WpsAuthType::WPA2PSK, WpsEncrType::AES, b"correct horse");
        let mut p = NetworkProfile::default();
        let applied = apply_credential(&mut p, &c, WpsAuthType::WPA2PSK).unwrap();
        assert!(applied.derive_psk);
        assert_eq!(p.key_mgmt, KeyMgmt::PSK);
        assert_eq!(p.proto, Proto::RSN);
        assert_eq!(p.pairwise, Cipher::CCMP);
        assert!(p.export_keys);
    }

    #[test]
    fn hex_psk_is_decoded() {
        let key = "ab".repeat(32);
        let c = cred(WpsAuthType::WPAPSK, WpsEncrType::TKIP, key.as_bytes());
        let mut p = NetworkProfile::default();
        let applied = apply_credential(&mut p, &c, WpsAuthType::WPAPSK).unwrap();
        assert!(!applied.derive_psk);
        assert_eq!(p.psk, Some([0xab; 32]));
        assert_eq!(p.proto, Proto::WPA);
    }

    #[test]
    fn short_key_is_rejected() {
        let c = cred(WpsAuthType::WPA2PSK, WpsEncrType::AES, b"short");
        let mut p = NetworkProfile::default();
        assert!(apply_credential(&mut p, &c, WpsAuthType::WPA2PSK).is_err());
    }

    #[test]
    fn wep_hex_key_lands_in_slot() {
        let mut c = cred(WpsAuthType::OPEN, WpsEncrType::WEP, b"0102030405");
        c.key_idx = 2;
        let mut p = NetworkProfile::default();
        apply_credential(&mut p, &c, WpsAuthType::OPEN).unwrap();
        assert_eq!(p.wep_keys[1], vec![1, 2, 3, 4, 5]);
        assert_eq!(p.wep_tx_keyidx, 1);
        assert_eq!(p.key_mgmt, KeyMgmt::NONE);
    }

    #[test]
    fn wep_bad_length_is_rejected() {
        let c = cred(WpsAuthType::OPEN, WpsEncrType::WEP, b"123");
        let mut p = NetworkProfile::default();
        assert!(apply_credential(&mut p, &c, WpsAuthType::OPEN).is_err());
    }

    #[test]
    fn workaround_upgrades_to_wpa2_ccmp() {
        let rsn = build_security_ie(&ParsedSecurityIe {
            proto: Proto::RSN,
            pairwise: Cipher::CCMP | Cipher::TKIP,
            group: Cipher::TKIP,
            key_mgmt: KeyMgmt::PSK,
            ..ParsedSecurityIe::default()
        });
        let bss = ScanResultBuilder::new(MacAddr::new([2, 0, 0, 0, 0, 1]), 2412, -40)
            .ssid("home")
            .privacy()
            .element(&rsn)
            .build();
        let mut p = NetworkProfile {
            proto: Proto::WPA,
            pairwise: Cipher::TKIP,
            ..NetworkProfile::default()
        };
        security_workaround(&mut p, Some(&bss), &caps(), 1);
        assert_eq!(p.pairwise, Cipher::TKIP | Cipher::CCMP);
        assert_eq!(p.proto, Proto::WPA | Proto::RSN);

        let mut p = NetworkProfile {
            proto: Proto::WPA,
            pairwise: Cipher::TKIP,
            ..NetworkProfile::default()
        };
        security_workaround(&mut p, Some(&bss), &caps(), 2);
        assert_eq!(p.pairwise, Cipher::CCMP);
        assert_eq!(p.proto, Proto::RSN);
    }

    #[test]
    fn workaround_keeps_credential_without_advertisement() {
        let bss = ScanResultBuilder::new(MacAddr::new([2, 0, 0, 0, 0, 1]), 2412, -40)
            .ssid("home")
            .build();
        let mut p = NetworkProfile {
            proto: Proto::WPA,
            pairwise: Cipher::TKIP,
            ..NetworkProfile::default()
        };
        security_workaround(&mut p, Some(&bss), &caps(), 1);
        assert_eq!(p.pairwise, Cipher::TKIP);
    }

    #[test]
    fn debug_redacts_key() {
        let c = cred(WpsAuthType::WPA2PSK, WpsEncrType::AES, b"secretpass");
        assert!(!format!("{c:?}").contains("secretpass"));
    }
}
