//! `wpas wps-pin`: generate or validate an 8-digit device PIN.

use serde::Serialize;

use wpas_core::wps::{generate_pin, pin_valid};

use crate::cli::{GlobalOpts, WpsPinArgs};
use crate::error::CliError;
use crate::output;

#[derive(Debug, Serialize)]
struct PinReport {
    pin: String,
    valid: bool,
}

pub fn handle(args: &WpsPinArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let report = match &args.check {
        Some(raw) => check(raw)?,
        None => PinReport {
            pin: format!("{:08}", generate_pin()),
            valid: true,
        },
    };

    let color = output::should_color(global.color);
    let out = output::render_single(
        global.output,
        &report,
        |r| format!("{} (checksum ok: {})", r.pin, output::verdict(r.valid, color)),
        |r| r.pin.clone(),
    );
    output::print_output(&out, global.quiet);

    if report.valid {
        Ok(())
    } else {
        Err(CliError::Rejected {
            message: format!("PIN {} has a bad checksum digit", report.pin),
        })
    }
}

fn check(raw: &str) -> Result<PinReport, CliError> {
    let digits: String = raw.chars().filter(|c| *c != '-' && *c != ' ').collect();
    if digits.len() != 8 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(CliError::Validation {
            field: "PIN".into(),
            reason: format!("'{raw}' is not eight digits"),
        });
    }
    let value: u32 = digits.parse().map_err(|_| CliError::Validation {
        field: "PIN".into(),
        reason: format!("'{raw}' is not eight digits"),
    })?;
    Ok(PinReport {
        pin: digits,
        valid: pin_valid(value),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn dashes_are_ignored() {
        let r = check("1234-5670").unwrap();
        assert_eq!(r.pin, "12345670");
        assert!(r.valid);
    }

    #[test]
    fn short_pin_is_a_usage_error() {
        assert!(matches!(check("1234"), Err(CliError::Validation { .. })));
    }

    #[test]
    fn bad_checksum_is_reported() {
        assert!(!check("12345678").unwrap().valid);
    }
}
