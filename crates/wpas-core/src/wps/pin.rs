// ── Device PINs ──
//
// Eight-digit PINs whose last digit is the WPS checksum over the first
// seven.

use rand::Rng;

/// Checksum digit for a seven-digit PIN body.
pub fn pin_checksum(mut body: u32) -> u32 {
    let mut accum = 0;
    while body > 0 {
        accum += 3 * (body % 10);
        body /= 10;
        accum += body % 10;
        body /= 10;
    }
    (10 - accum % 10) % 10
}

/// Whether an eight-digit PIN carries a valid checksum.
pub fn pin_valid(pin: u32) -> bool {
    pin <= 99_999_999 && pin_checksum(pin / 10) == pin % 10
}

/// Fresh random PIN with a valid checksum.
pub fn generate_pin() -> u32 {
    let body = rand::thread_rng().gen_range(0..10_000_000);
    body * 10 + pin_checksum(body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_pins_validate() {
        assert!(pin_valid(12_345_670));
        assert!(!pin_valid(12_345_678));
        assert_eq!(pin_checksum(1_234_567), 0);
    }

    #[test]
    fn generated_pins_validate() {
        for _ in 0..64 {
            assert!(pin_valid(generate_pin()));
        }
    }

    #[test]
    fn oversized_pin_is_invalid() {
        assert!(!pin_valid(123_456_789));
    }
}
