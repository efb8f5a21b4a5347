//! Unit Conversion Utilities
//!
//! Satoshi formatting for logs and configuration summaries, and lenient
//! satoshi parsing for environment values.

/// Satoshis per Bitcoin
pub const SATS_PER_BTC: u64 = 100_000_000;

/// Convert satoshis to BTC string (e.g., "0.00100000")
///
/// Integer arithmetic only; large amounts keep every digit.
pub fn sats_to_btc_string(sats: u64) -> String {
    format!("{}.{:08}", sats / SATS_PER_BTC, sats % SATS_PER_BTC)
}

/// Convert satoshis to human-readable string
/// e.g., 100000 -> "100,000 sats (0.00100000 BTC)"
pub fn sats_to_display(sats: u64) -> String {
    format!("{} sats ({} BTC)", format_with_commas(sats), sats_to_btc_string(sats))
}

/// Format number with thousands separators
fn format_with_commas(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + s.len() / 3);

    for (i, c) in s.chars().enumerate() {
        if i > 0 && (s.len() - i) % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }

    result
}

/// Parse satoshi amount from string, ignoring `,` and `_` separators
pub fn parse_sats(s: &str) -> Option<u64> {
    s.trim().replace([',', '_'], "").parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sats_to_btc() {
        assert_eq!(sats_to_btc_string(0), "0.00000000");
        assert_eq!(sats_to_btc_string(1), "0.00000001");
        assert_eq!(sats_to_btc_string(100_000_000), "1.00000000");
        assert_eq!(sats_to_btc_string(98_900_000), "0.98900000");
        assert_eq!(sats_to_btc_string(2_100_000_000_000_000), "21000000.00000000");
    }

    #[test]
    fn test_display_format() {
        let display = sats_to_display(1_000_000);
        assert_eq!(display, "1,000,000 sats (0.01000000 BTC)");
        assert_eq!(sats_to_display(999), "999 sats (0.00000999 BTC)");
    }

    #[test]
    fn test_parse_sats() {
        assert_eq!(parse_sats("1000"), Some(1000));
        assert_eq!(parse_sats("1,000,000"), Some(1_000_000));
        assert_eq!(parse_sats("10_000_000"), Some(10_000_000));
        assert_eq!(parse_sats("  42  "), Some(42));
        assert_eq!(parse_sats("-5"), None);
        assert_eq!(parse_sats("invalid"), None);
    }
}
