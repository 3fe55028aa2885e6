//! Deterministic ticker -> shard mapping (C3, §4.3): `shard_of(ticker,
//! shard_count) = sha1(ticker)[0..8]_as_uint32 mod shard_count`. Pure and
//! stable across processes/versions per §8's round-trip law.

use sha1::{Digest, Sha1};

/// Maps `ticker` onto `[0, shard_count)`. `shard_count` must be positive;
/// callers are expected to validate configuration before calling this.
pub fn shard_of(ticker: &str, shard_count: i32) -> i32 {
    assert!(shard_count > 0, "shard_count must be positive");
    let digest = Sha1::digest(ticker.as_bytes());
    let first8 = u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]);
    (first8 % shard_count as u32) as i32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shard_of_is_deterministic() {
        let a = shard_of("FPT", 8);
        let b = shard_of("FPT", 8);
        assert_eq!(a, b);
    }

    #[test]
    fn shard_of_is_in_range() {
        for ticker in ["FPT", "HPG", "VNM", "VIC", "MSN"] {
            let s = shard_of(ticker, 4);
            assert!((0..4).contains(&s));
        }
    }

    #[test]
    fn shard_of_varies_by_shard_count() {
        // Not a universal law, but with a handful of distinct tickers and a
        // larger modulus we should see more than one bucket used.
        let shards: std::collections::HashSet<i32> = ["FPT", "HPG", "VNM", "VIC", "MSN", "MWG", "SSI"]
            .iter()
            .map(|t| shard_of(t, 16))
            .collect();
        assert!(shards.len() > 1);
    }
}
