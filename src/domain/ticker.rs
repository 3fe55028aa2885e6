//! Ticker syntax validation. `spec.md` gives two distinct patterns: the
//! warehouse-wide identifier convention `[A-Z0-9._-]{1,10}` (§3) and the
//! stricter universe-loading filter `[A-Z0-9._-]{2,10}` (§4.3). No `regex`
//! dependency appears anywhere in the reference pack for this kind of
//! fixed-alphabet check, so both are hand-rolled over `char` iteration.

/// Warehouse-wide ticker identifier check: 1-10 chars from `[A-Z0-9._-]`.
pub fn is_valid_ticker(s: &str) -> bool {
    is_valid_ticker_len(s, 1, 10)
}

/// Universe-loading filter: 2-10 chars from `[A-Z0-9._-]`. Tickers failing
/// this are dropped when building a shard's universe (§4.3).
pub fn is_valid_universe_ticker(s: &str) -> bool {
    is_valid_ticker_len(s, 2, 10)
}

fn is_valid_ticker_len(s: &str, min_len: usize, max_len: usize) -> bool {
    let len = s.chars().count();
    if len < min_len || len > max_len {
        return false;
    }
    s.chars()
        .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || matches!(c, '.' | '_' | '-'))
}

/// Normalizes a raw ticker for universe loading: uppercase + trim.
pub fn normalize_ticker(raw: &str) -> String {
    raw.trim().to_ascii_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_alnum_tickers() {
        assert!(is_valid_ticker("FPT"));
        assert!(is_valid_ticker("HPG"));
        assert!(is_valid_ticker("A"));
        assert!(is_valid_ticker("VN30F1M"));
    }

    #[test]
    fn accepts_dotted_and_hyphenated_tickers() {
        assert!(is_valid_ticker("VIC.VN"));
        assert!(is_valid_ticker("A-B_C"));
    }

    #[test]
    fn rejects_lowercase_and_other_punctuation() {
        assert!(!is_valid_ticker("fpt"));
        assert!(!is_valid_ticker("FP T"));
        assert!(!is_valid_ticker("FP/T"));
    }

    #[test]
    fn rejects_overlong_tickers() {
        assert!(!is_valid_ticker("ABCDEFGHIJK"));
    }

    #[test]
    fn universe_filter_requires_at_least_two_chars() {
        assert!(!is_valid_universe_ticker("A"));
        assert!(is_valid_universe_ticker("AA"));
    }

    #[test]
    fn normalize_uppercases_and_trims() {
        assert_eq!(normalize_ticker("  fpt \n"), "FPT");
    }
}
