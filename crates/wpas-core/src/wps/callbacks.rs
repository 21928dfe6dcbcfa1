// ── Registration-protocol callbacks ──
//
// The enrollee/registrar protocol engine reports back through
// `WpsCallbacks`. The station implements it; tests and the replay tool
// drive it directly.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

use super::cred::Credential;
use super::{config_error_name, message_name};

/// M2D received: the registrar cannot (yet) provide credentials.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WpsM2d {
    pub dev_password_id: u16,
    pub config_error: u16,
}

/// Protocol run aborted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WpsFailure {
    /// Message number the failure was raised on.
    pub msg: u8,
    pub config_error: u16,
    #[serde(default)]
    pub error_indication: u16,
}

/// Progress events raised by the protocol engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum WpsEvent {
    M2d(WpsM2d),
    Fail(WpsFailure),
    Success,
    PbcStart,
    PinStart,
    PbcOverlap,
    Timeout,
    Cancel,
}

pub trait WpsCallbacks {
    /// A credential arrived. An error rejects the credential but does
    /// not abort the session.
    fn on_credential(&mut self, cred: &Credential) -> Result<(), CoreError>;

    fn on_event(&mut self, event: WpsEvent);
}

/// Vendor status line for an M2D.
pub fn m2d_status(m2d: &WpsM2d) -> String {
    format!(
        "WPS m2d [{}] {}",
        config_error_name(m2d.config_error),
        m2d.dev_password_id
    )
}

/// Vendor status line for a failure.
pub fn fail_status(fail: &WpsFailure) -> String {
    format!(
        "WPS failed [{} - {} - {}]",
        message_name(fail.msg),
        fail.config_error,
        config_error_name(fail.config_error)
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn status_lines() {
        let fail = WpsFailure {
            msg: 1,
            config_error: 12,
            error_indication: 0,
        };
        assert_eq!(
            fail_status(&fail),
            "WPS failed [WPS_Beacon - 12 - WPS_CFG_MULTIPLE_PBC_DETECTED]"
        );
        let m2d = WpsM2d {
            dev_password_id: 4,
            config_error: 0,
        };
        assert_eq!(m2d_status(&m2d), "WPS m2d [WPS_CFG_NO_ERROR] 4");
    }

    #[test]
    fn events_decode_tagged() {
        let ev: WpsEvent =
            serde_json::from_str(r#"{"event":"fail","msg":8,"config_error":18}"#).unwrap();
        assert_eq!(
            ev,
            WpsEvent::Fail(WpsFailure {
                msg: 8,
                config_error: 18,
                error_indication: 0,
            })
        );
    }
}
