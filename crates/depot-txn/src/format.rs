//! Rendering keys for error messages.

use std::fmt::Write;

/// Renders an encoded key of a keyspace for humans.
pub trait KeyFormatter: Send + Sync {
    /// Formats `key` of `keyspace`.
    fn format_key(&self, keyspace: &str, key: &[u8]) -> String;
}

/// Renders keys as hex.
#[derive(Debug, Clone, Copy, Default)]
pub struct HexKeys;

impl KeyFormatter for HexKeys {
    fn format_key(&self, _keyspace: &str, key: &[u8]) -> String {
        let mut out = String::with_capacity(2 + key.len() * 2);
        out.push_str("0x");
        for b in key {
            let _ = write!(out, "{b:02x}");
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_keys() {
        assert_eq!(HexKeys.format_key("rev", &[0x00, 0xab, 0x10]), "0x00ab10");
        assert_eq!(HexKeys.format_key("rev", &[]), "0x");
    }
}
