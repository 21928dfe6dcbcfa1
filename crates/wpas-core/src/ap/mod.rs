// ── AP lifecycle ──
//
// The access-point side of the daemon: interface bring-up and
// teardown, per-BSS configuration, reloads, and channel switches.

pub mod bss;
pub mod config;
pub mod driver;
pub mod iface;
pub mod registry;
pub mod sim;

pub use bss::{ApBss, ApStation, StaAuthEvent};
pub use config::{ApConfig, BssConfig, MAX_BSSID};
pub use driver::{ApConfigSource, ApDriver, CsaSettings, PskDeriver, RegdomInitiator, SetupStep};
pub use iface::{ApEvent, ApInterface, AssocFlags, CHANNEL_LIST_UPDATE_TIMEOUT, IfaceState};
pub use registry::{ApRegistry, Removed};

#[cfg(test)]
mod tests;
