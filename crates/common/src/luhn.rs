//! Luhn mod-10 checksum
//!
//! Order numbers are accepted only if they pass this check. The function is
//! pure; callers decide how to report a failure.

/// Returns true if `number` is a non-empty string of ASCII digits whose
/// Luhn checksum is zero.
pub fn is_valid(number: &str) -> bool {
    if number.is_empty() {
        return false;
    }

    let mut sum = 0u32;
    for (i, c) in number.bytes().rev().enumerate() {
        if !c.is_ascii_digit() {
            return false;
        }
        let mut digit = u32::from(c - b'0');
        if i % 2 == 1 {
            digit *= 2;
            if digit > 9 {
                digit -= 9;
            }
        }
        sum += digit;
    }

    sum % 10 == 0
}
