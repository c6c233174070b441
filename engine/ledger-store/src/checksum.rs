//! Luhn (mod 10) check digit validation for order numbers

/// Check if `number` is a non-empty string of ASCII digits whose Luhn sum is a
/// multiple of ten.
pub fn is_valid(number: &str) -> bool {
    if number.is_empty() {
        return false;
    }

    match luhn_sum(number, false) {
        Some(sum) => sum % 10 == 0,
        None => false,
    }
}

/// Check digit that makes `payload` followed by the digit valid
pub fn check_digit(payload: &str) -> Option<u8> {
    let sum = luhn_sum(payload, true)?;
    Some(((10 - sum % 10) % 10) as u8)
}

// Sum of the digits from the right, doubling every second one. With
// `shifted` the doubling starts at the rightmost digit, as it does once a
// check digit is appended.
fn luhn_sum(digits: &str, shifted: bool) -> Option<u32> {
    let mut sum = 0u32;

    for (i, byte) in digits.bytes().rev().enumerate() {
        if !byte.is_ascii_digit() {
            return None;
        }

        let digit = u32::from(byte - b'0');
        let doubled = (i % 2 == 1) != shifted;
        sum += if doubled {
            let d = digit * 2;
            if d > 9 {
                d - 9
            } else {
                d
            }
        } else {
            digit
        };
    }

    Some(sum)
}
