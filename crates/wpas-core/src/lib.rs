//! Association state machines for a WPA/WPA2/WPS station and the
//! lifecycle of the access points sharing its radios.
//!
//! - **[`Station`]**: one supplicant interface. Scans, picks a BSS,
//!   associates, reacts to every driver event, and runs WPS enrollment.
//!   Driven one input at a time and fully deterministic on a virtual
//!   clock.
//!
//! - **[`Session`]**: every station of the process, with scan-result
//!   fan-out to interfaces on the same radio and the
//!   terminate-on-last-interface rule.
//!
//! - **[`Runtime`]**: a `tokio` loop that feeds a [`Session`] from an
//!   `mpsc` channel, maps its timers onto real time, and broadcasts
//!   [`Notification`]s.
//!
//! - **[`ap`]**: hostapd-style interface bring-up, per-BSS reload,
//!   BSS add/remove, and channel switches over an [`ap::ApDriver`].
//!
//! - **Selection** ([`select`]) and **IE parsing** ([`ie`]) are plain
//!   functions over borrowed snapshots, usable offline.
//!
//! Every hardware-facing seam is a trait in [`collab`]; [`sim`] and
//! [`ap::sim`] provide in-memory implementations for tests and replay.

pub mod ap;
pub mod blacklist;
pub mod collab;
pub mod error;
pub mod ie;
pub mod model;
pub mod runtime;
pub mod select;
pub mod session;
pub mod sim;
pub mod station;
pub mod store;
pub mod timer;
pub mod wps;

// ── Primary re-exports ──────────────────────────────────────────────
pub use blacklist::Blacklist;
pub use collab::{Collaborators, ConfigBackend, Driver, DriverCapabilities};
pub use error::CoreError;
pub use runtime::{Request, Runtime, RuntimeHandle};
pub use select::{RoamingPolicy, SelectContext};
pub use session::{Session, SessionOptions, TaggedNotification};
pub use station::{Station, StationOptions};
pub use store::ProfileStore;
pub use timer::TimerQueue;

pub use model::{
    DriverEvent, MacAddr, NetworkProfile, Notification, ProfileId, ReasonCode, ScanResult,
    WpaState,
};
