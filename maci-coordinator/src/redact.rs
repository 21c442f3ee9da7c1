//! Shortening of addresses and long hex values for logs.

use ethers::types::{Address, H256};

const KEEP_HEAD: usize = 6;
const KEEP_TAIL: usize = 4;

/// `0x1234…cdef` for anything longer than head + tail.
pub fn redact(value: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    if chars.len() <= KEEP_HEAD + KEEP_TAIL {
        return value.to_string();
    }
    let head: String = chars[..KEEP_HEAD].iter().collect();
    let tail: String = chars[chars.len() - KEEP_TAIL..].iter().collect();
    format!("{head}…{tail}")
}

pub fn redact_address(address: &Address) -> String {
    redact(&format!("{address:#x}"))
}

pub fn redact_tx(hash: &H256) -> String {
    redact(&format!("{hash:#x}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shortens_long_values() {
        assert_eq!(
            redact("0x1234567890abcdef1234567890abcdef12345678"),
            "0x1234…5678"
        );
        assert_eq!(redact("0x12"), "0x12");
        assert_eq!(redact("0123456789"), "0123456789");
    }

    #[test]
    fn addresses_render_lowercase_hex() {
        let address: Address = "0x00000000000000000000000000000000000000ff".parse().unwrap();
        assert_eq!(redact_address(&address), "0x0000…00ff");
        assert_eq!(redact_tx(&H256::zero()), "0x0000…0000");
    }
}
