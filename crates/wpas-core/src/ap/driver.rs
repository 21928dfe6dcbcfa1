// ── AP collaborator traits ──
//
// The lifecycle manager never touches a radio directly. Everything it
// needs from the kernel driver goes through `ApDriver`; configuration
// re-reads go through `ApConfigSource`; passphrase hashing through
// `PskDeriver`.

use crate::ap::config::ApConfig;
use crate::error::CoreError;
use crate::model::{HwMode, MacAddr, ReasonCode};

/// Outcome of a bring-up step that may have to wait for the radio.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupStep {
    Ready,
    /// The driver kicked off something asynchronous; bring-up resumes
    /// when the caller reports completion through `setup_complete`.
    Pending,
}

/// Who changed the regulatory domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegdomInitiator {
    Core,
    User,
    Driver,
    CountryIe,
}

/// Channel switch request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CsaSettings {
    pub freq: u32,
    pub cs_count: u8,
    pub block_tx: bool,
    pub ht_enabled: bool,
    pub sec_channel_offset: i8,
}

/// What the lifecycle manager asks of the kernel driver.
pub trait ApDriver: Send {
    fn init(&mut self, ifname: &str) -> Result<(), CoreError>;
    fn deinit(&mut self);

    /// Name of the physical radio, when the driver exposes one.
    fn radio_name(&self) -> Option<String>;
    fn own_addr(&self) -> MacAddr;
    /// Whether the driver times out idle stations on its own.
    fn has_inactivity_timer(&self) -> bool {
        false
    }

    fn get_country(&mut self) -> Option<String>;
    fn set_country(&mut self, country: &str) -> Result<(), CoreError>;
    fn hw_features(&mut self) -> Option<Vec<HwMode>>;
    /// Pick the operating mode; `Pending` means automatic channel
    /// selection is running.
    fn select_hw_mode(&mut self, conf: &ApConfig) -> Result<SetupStep, CoreError>;
    /// Check HT capabilities; `Pending` means a 20/40 MHz coexistence
    /// scan is running.
    fn check_ht_capab(&mut self, conf: &ApConfig) -> Result<SetupStep, CoreError>;
    /// Start DFS on `freq` if the channel needs it; `Pending` means the
    /// channel availability check is running.
    fn handle_dfs(&mut self, freq: u32) -> Result<SetupStep, CoreError>;
    fn channel_to_freq(&self, channel: u8) -> Option<u32>;
    fn freq_to_channel(&self, freq: u32) -> Option<u8>;
    fn set_freq(&mut self, freq: u32, ht_enabled: bool) -> Result<(), CoreError>;
    fn set_rts(&mut self, threshold: u32) -> Result<(), CoreError>;
    fn set_frag(&mut self, threshold: u32) -> Result<(), CoreError>;

    /// Create a secondary BSS interface. Returns the address the driver
    /// assigned when `addr` is `None`.
    fn if_add(&mut self, bss: &str, addr: Option<MacAddr>) -> Result<MacAddr, CoreError>;
    fn if_remove(&mut self, bss: &str) -> Result<(), CoreError>;
    fn is_if_up(&mut self, bss: &str) -> bool;

    /// Drop every station on `bss`.
    fn flush(&mut self, bss: &str) -> Result<(), CoreError>;
    fn sta_deauth(&mut self, bss: &str, addr: MacAddr, reason: ReasonCode)
    -> Result<(), CoreError>;
    fn set_privacy(&mut self, bss: &str, enabled: bool) -> Result<(), CoreError>;
    fn clear_wep(&mut self, bss: &str);
    fn set_wep_key(&mut self, bss: &str, idx: u8, key: &[u8]) -> Result<(), CoreError>;
    fn set_ieee8021x(&mut self, bss: &str, enabled: bool) -> Result<(), CoreError>;
    fn set_generic_elem(&mut self, bss: &str, elem: &[u8]) -> Result<(), CoreError>;
    fn set_broadcast_ssid(&mut self, bss: &str, hidden: bool) -> Result<(), CoreError>;
    fn get_ssid(&mut self, bss: &str) -> Option<Vec<u8>>;
    fn set_ssid(&mut self, bss: &str, ssid: &[u8]) -> Result<(), CoreError>;
    fn set_assoc_limit(&mut self, bss: &str, limit: u32) -> Result<(), CoreError>;
    fn set_beacon(&mut self, bss: &str) -> Result<(), CoreError>;
    fn commit(&mut self, bss: &str) -> Result<(), CoreError>;

    fn switch_channel(&mut self, bss: &str, settings: &CsaSettings) -> Result<(), CoreError>;
}

/// Re-reads the interface's configuration from wherever it lives.
pub trait ApConfigSource: Send {
    fn read(&mut self) -> Result<ApConfig, CoreError>;
}

/// Turns an ASCII passphrase into a 256-bit PSK for `ssid`.
pub trait PskDeriver: Send {
    fn derive(&self, passphrase: &str, ssid: &[u8]) -> [u8; 32];
}
