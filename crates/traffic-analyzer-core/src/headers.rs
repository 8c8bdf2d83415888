//! Content-addressed header identity (C4, pure half).
//!
//! The cache and store lookups live in the server; this module only computes
//! the deterministic id two equal `(name, value)` pairs always share.

use md5::{Digest, Md5};

/// `header_id = md5(name || value)`, hex-encoded.
pub fn header_id(name: &str, value: &str) -> String {
    let mut hasher = Md5::new();
    hasher.update(name.as_bytes());
    hasher.update(value.as_bytes());
    let digest = hasher.finalize();
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic_for_equal_input() {
        assert_eq!(header_id("Content-Type", "text/plain"), header_id("Content-Type", "text/plain"));
    }

    #[test]
    fn differs_on_value() {
        assert_ne!(header_id("Content-Type", "text/plain"), header_id("Content-Type", "application/json"));
    }
}
