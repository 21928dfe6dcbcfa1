// ── Simulated AP radio ──
//
// Scriptable `ApDriver` plus an in-memory configuration source. Tests
// flip the knobs on `SimRadio` and read back the command log.

use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::ap::config::ApConfig;
use crate::ap::driver::{ApConfigSource, ApDriver, CsaSettings, PskDeriver, SetupStep};
use crate::error::CoreError;
use crate::model::{HwMode, HwModeFlags, HwModeKind, MacAddr, ReasonCode};

/// One command the lifecycle manager sent to the radio.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "call", rename_all = "snake_case")]
pub enum ApCall {
    Init { ifname: String },
    Deinit,
    SetCountry { country: String },
    SetFreq { freq: u32 },
    SetRts { threshold: u32 },
    SetFrag { threshold: u32 },
    IfAdd { bss: String, addr: MacAddr },
    IfRemove { bss: String },
    Flush { bss: String },
    StaDeauth { bss: String, addr: MacAddr, reason: u16 },
    SetPrivacy { bss: String, enabled: bool },
    ClearWep { bss: String },
    SetWepKey { bss: String, len: usize },
    SetIeee8021x { bss: String, enabled: bool },
    SetGenericElem { bss: String, len: usize },
    SetBroadcastSsid { bss: String, hidden: bool },
    SetSsid { bss: String, ssid: String },
    SetAssocLimit { bss: String, limit: u32 },
    SetBeacon { bss: String },
    Commit { bss: String },
    SwitchChannel { bss: String, freq: u32 },
}

#[derive(Debug)]
pub struct RadioState {
    pub calls: Vec<ApCall>,
    pub own_addr: MacAddr,
    pub radio: Option<String>,
    pub country: Option<String>,
    pub hw_modes: Option<Vec<HwMode>>,
    pub acs: bool,
    pub ht_scan: bool,
    pub dfs: bool,
    pub inactivity_timer: bool,
    pub fail_init: bool,
    pub fail_set_freq: bool,
    pub fail_switch: bool,
    pub fail_if_add: bool,
    pub up: bool,
    pub next_if_octet: u8,
    /// Configuration handed out by the config source.
    pub file: Option<ApConfig>,
}

impl Default for RadioState {
    fn default() -> Self {
        Self {
            calls: Vec::new(),
            own_addr: MacAddr::new([0x02, 0, 0, 0, 0xa0, 0]),
            radio: Some("phy0".into()),
            country: None,
            hw_modes: Some(vec![HwMode {
                mode: HwModeKind::G,
                channels: vec![2412, 2417, 2422, 2427, 2432, 2437, 2442, 2447, 2452, 2457, 2462],
                rates: vec![10, 20, 55, 110, 60, 90, 120, 180, 240, 360, 480, 540],
                mcs_set: [0; 16],
                flags: HwModeFlags::empty(),
            }]),
            acs: false,
            ht_scan: false,
            dfs: false,
            inactivity_timer: false,
            fail_init: false,
            fail_set_freq: false,
            fail_switch: false,
            fail_if_add: false,
            up: true,
            next_if_octet: 1,
            file: None,
        }
    }
}

/// Shared handle on the simulated radio.
#[derive(Debug, Clone, Default)]
pub struct SimRadio(Arc<Mutex<RadioState>>);

impl SimRadio {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lock(&self) -> MutexGuard<'_, RadioState> {
        self.0.lock().expect("sim radio lock poisoned")
    }

    fn record(&self, call: ApCall) {
        self.lock().calls.push(call);
    }

    pub fn calls(&self) -> Vec<ApCall> {
        self.lock().calls.clone()
    }

    pub fn take_calls(&self) -> Vec<ApCall> {
        std::mem::take(&mut self.lock().calls)
    }

    pub fn count(&self, pred: impl Fn(&ApCall) -> bool) -> usize {
        self.lock().calls.iter().filter(|c| pred(c)).count()
    }

    /// Replace what the next configuration re-read returns.
    pub fn set_file(&self, conf: ApConfig) {
        self.lock().file = Some(conf);
    }

    pub fn driver(&self) -> Box<dyn ApDriver> {
        Box::new(SimApDriver(self.clone()))
    }

    pub fn source(&self) -> Box<dyn ApConfigSource> {
        Box::new(SimConfigSource(self.clone()))
    }
}

/// Channel number for a 2.4/5 GHz center frequency.
fn chan_of(freq: u32) -> Option<u8> {
    let chan = match freq {
        2484 => 14,
        2412..=2472 => (freq - 2407) / 5,
        5000..=5900 => (freq - 5000) / 5,
        _ => return None,
    };
    u8::try_from(chan).ok()
}

fn freq_of(channel: u8) -> Option<u32> {
    match channel {
        1..=13 => Some(2407 + 5 * u32::from(channel)),
        14 => Some(2484),
        36..=177 => Some(5000 + 5 * u32::from(channel)),
        _ => None,
    }
}

#[derive(Debug)]
pub struct SimApDriver(SimRadio);

impl SimApDriver {
    fn ok(&self, call: ApCall) -> Result<(), CoreError> {
        self.0.record(call);
        Ok(())
    }
}

impl ApDriver for SimApDriver {
    fn init(&mut self, ifname: &str) -> Result<(), CoreError> {
        if self.0.lock().fail_init {
            return Err(CoreError::driver("init", "no such device"));
        }
        self.ok(ApCall::Init {
            ifname: ifname.into(),
        })
    }

    fn deinit(&mut self) {
        self.0.record(ApCall::Deinit);
    }

    fn radio_name(&self) -> Option<String> {
        self.0.lock().radio.clone()
    }

    fn own_addr(&self) -> MacAddr {
        self.0.lock().own_addr
    }

    fn has_inactivity_timer(&self) -> bool {
        self.0.lock().inactivity_timer
    }

    fn get_country(&mut self) -> Option<String> {
        self.0.lock().country.clone()
    }

    fn set_country(&mut self, country: &str) -> Result<(), CoreError> {
        self.0.lock().country = Some(country.to_owned());
        self.ok(ApCall::SetCountry {
            country: country.into(),
        })
    }

    fn hw_features(&mut self) -> Option<Vec<HwMode>> {
        self.0.lock().hw_modes.clone()
    }

    fn select_hw_mode(&mut self, conf: &ApConfig) -> Result<SetupStep, CoreError> {
        let state = self.0.lock();
        if conf.channel == 0 && state.acs {
            return Ok(SetupStep::Pending);
        }
        if conf.channel != 0 && freq_of(conf.channel).is_none() {
            return Err(CoreError::ValidationFailed {
                message: format!("channel {} unsupported", conf.channel),
            });
        }
        Ok(SetupStep::Ready)
    }

    fn check_ht_capab(&mut self, conf: &ApConfig) -> Result<SetupStep, CoreError> {
        Ok(if conf.ieee80211n && self.0.lock().ht_scan {
            SetupStep::Pending
        } else {
            SetupStep::Ready
        })
    }

    fn handle_dfs(&mut self, freq: u32) -> Result<SetupStep, CoreError> {
        Ok(if freq >= 5260 && self.0.lock().dfs {
            SetupStep::Pending
        } else {
            SetupStep::Ready
        })
    }

    fn channel_to_freq(&self, channel: u8) -> Option<u32> {
        freq_of(channel)
    }

    fn freq_to_channel(&self, freq: u32) -> Option<u8> {
        chan_of(freq)
    }

    fn set_freq(&mut self, freq: u32, _ht_enabled: bool) -> Result<(), CoreError> {
        if self.0.lock().fail_set_freq {
            return Err(CoreError::driver("set_freq", "rejected by kernel"));
        }
        self.ok(ApCall::SetFreq { freq })
    }

    fn set_rts(&mut self, threshold: u32) -> Result<(), CoreError> {
        self.ok(ApCall::SetRts { threshold })
    }

    fn set_frag(&mut self, threshold: u32) -> Result<(), CoreError> {
        self.ok(ApCall::SetFrag { threshold })
    }

    fn if_add(&mut self, bss: &str, addr: Option<MacAddr>) -> Result<MacAddr, CoreError> {
        let addr = {
            let mut state = self.0.lock();
            if state.fail_if_add {
                return Err(CoreError::driver("if_add", "too many interfaces"));
            }
            addr.unwrap_or_else(|| {
                let mut octets = state.own_addr.octets();
                octets[5] = state.next_if_octet;
                state.next_if_octet += 1;
                MacAddr::new(octets)
            })
        };
        self.0.record(ApCall::IfAdd {
            bss: bss.into(),
            addr,
        });
        Ok(addr)
    }

    fn if_remove(&mut self, bss: &str) -> Result<(), CoreError> {
        self.ok(ApCall::IfRemove { bss: bss.into() })
    }

    fn is_if_up(&mut self, _bss: &str) -> bool {
        self.0.lock().up
    }

    fn flush(&mut self, bss: &str) -> Result<(), CoreError> {
        self.ok(ApCall::Flush { bss: bss.into() })
    }

    fn sta_deauth(
        &mut self,
        bss: &str,
        addr: MacAddr,
        reason: ReasonCode,
    ) -> Result<(), CoreError> {
        self.ok(ApCall::StaDeauth {
            bss: bss.into(),
            addr,
            reason: reason.0,
        })
    }

    fn set_privacy(&mut self, bss: &str, enabled: bool) -> Result<(), CoreError> {
        self.ok(ApCall::SetPrivacy {
            bss: bss.into(),
            enabled,
        })
    }

    fn clear_wep(&mut self, bss: &str) {
        self.0.record(ApCall::ClearWep { bss: bss.into() });
    }

    fn set_wep_key(&mut self, bss: &str, _idx: u8, key: &[u8]) -> Result<(), CoreError> {
        self.ok(ApCall::SetWepKey {
            bss: bss.into(),
            len: key.len(),
        })
    }

    fn set_ieee8021x(&mut self, bss: &str, enabled: bool) -> Result<(), CoreError> {
        self.ok(ApCall::SetIeee8021x {
            bss: bss.into(),
            enabled,
        })
    }

    fn set_generic_elem(&mut self, bss: &str, elem: &[u8]) -> Result<(), CoreError> {
        self.ok(ApCall::SetGenericElem {
            bss: bss.into(),
            len: elem.len(),
        })
    }

    fn set_broadcast_ssid(&mut self, bss: &str, hidden: bool) -> Result<(), CoreError> {
        self.ok(ApCall::SetBroadcastSsid {
            bss: bss.into(),
            hidden,
        })
    }

    fn get_ssid(&mut self, _bss: &str) -> Option<Vec<u8>> {
        None
    }

    fn set_ssid(&mut self, bss: &str, ssid: &[u8]) -> Result<(), CoreError> {
        self.ok(ApCall::SetSsid {
            bss: bss.into(),
            ssid: String::from_utf8_lossy(ssid).into_owned(),
        })
    }

    fn set_assoc_limit(&mut self, bss: &str, limit: u32) -> Result<(), CoreError> {
        self.ok(ApCall::SetAssocLimit {
            bss: bss.into(),
            limit,
        })
    }

    fn set_beacon(&mut self, bss: &str) -> Result<(), CoreError> {
        self.ok(ApCall::SetBeacon { bss: bss.into() })
    }

    fn commit(&mut self, bss: &str) -> Result<(), CoreError> {
        self.ok(ApCall::Commit { bss: bss.into() })
    }

    fn switch_channel(&mut self, bss: &str, settings: &CsaSettings) -> Result<(), CoreError> {
        if self.0.lock().fail_switch {
            return Err(CoreError::driver("switch_channel", "busy"));
        }
        self.ok(ApCall::SwitchChannel {
            bss: bss.into(),
            freq: settings.freq,
        })
    }
}

#[derive(Debug)]
pub struct SimConfigSource(SimRadio);

impl ApConfigSource for SimConfigSource {
    fn read(&mut self) -> Result<ApConfig, CoreError> {
        self.0.lock().file.clone().ok_or_else(|| CoreError::Config {
            message: "configuration file missing".into(),
        })
    }
}

/// Fast stand-in for PBKDF2: deterministic, not a real key derivation.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimPsk;

impl PskDeriver for SimPsk {
    fn derive(&self, passphrase: &str, ssid: &[u8]) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(passphrase.as_bytes());
        hasher.update(ssid);
        hasher.finalize().into()
    }
}
