use alloy_primitives::Address;

use crate::error::EncodingError;

/// Parses a hex address.
///
/// All-lowercase and all-uppercase inputs are accepted as-is. Mixed-case input is
/// treated as an EIP-55 checksum and rejected if the checksum does not match.
pub fn parse_address(input: &str) -> Result<Address, EncodingError> {
    let invalid = |reason: &str| EncodingError::InvalidAddress {
        input: input.to_string(),
        reason: reason.to_string(),
    };

    let hex = input
        .strip_prefix("0x")
        .or_else(|| input.strip_prefix("0X"))
        .unwrap_or(input);
    if hex.len() != 40 {
        return Err(invalid("expected 20 bytes of hex"));
    }
    if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(invalid("non-hex character"));
    }

    let has_lower = hex.chars().any(|c| c.is_ascii_lowercase());
    let has_upper = hex.chars().any(|c| c.is_ascii_uppercase());
    if has_lower && has_upper {
        return Address::parse_checksummed(format!("0x{hex}"), None)
            .map_err(|_| invalid("bad EIP-55 checksum"));
    }

    hex.parse::<Address>().map_err(|e| invalid(&e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::address;
    use test_case::test_case;

    const CHECKSUMMED: &str = "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed";

    #[test_case("0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaed" ; "lowercase")]
    #[test_case("0x5AAEB6053F3E94C9B9A09F33669435E7EF1BEAED" ; "uppercase")]
    #[test_case(CHECKSUMMED ; "checksummed")]
    #[test_case("5aaeb6053f3e94c9b9a09f33669435e7ef1beaed" ; "no prefix")]
    fn parses_equivalent_forms(input: &str) {
        let parsed = parse_address(input).unwrap();
        assert_eq!(parsed, address!("5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed"));
        assert_eq!(parsed.to_checksum(None), CHECKSUMMED);
    }

    #[test_case("0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAeD" ; "bad checksum")]
    #[test_case("0x5aaeb6053f3e94c9b9a09f33669435e7ef1bea" ; "too short")]
    #[test_case("0xzzaeb6053f3e94c9b9a09f33669435e7ef1beaed" ; "not hex")]
    fn rejects_malformed(input: &str) {
        assert!(matches!(
            parse_address(input),
            Err(EncodingError::InvalidAddress { .. })
        ));
    }
}
