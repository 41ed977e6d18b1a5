//! Luhn checksum as used by Swedish identity and organization numbers.

/// Compute the Luhn check digit over nine digits (positions 3–11 of the
/// twelve-digit form). Weights alternate 2,1,2,… and multi-digit products
/// contribute their digit sum.
pub(crate) fn check_digit(digits: &[u8]) -> u8 {
    debug_assert_eq!(digits.len(), 9);
    let sum: u32 = digits
        .iter()
        .enumerate()
        .map(|(i, &d)| {
            let product = u32::from(d) * if i % 2 == 0 { 2 } else { 1 };
            product / 10 + product % 10
        })
        .sum();
    ((10 - sum % 10) % 10) as u8
}

/// Verify a ten-digit block: nine payload digits plus trailing check digit
pub(crate) fn verify(block: &[u8]) -> bool {
    block.len() == 10 && check_digit(&block[..9]) == block[9]
}
