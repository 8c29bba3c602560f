//! Hashing, time, and input validation helpers.

use sha2::{Digest, Sha256};
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

use crate::error::{QvoteError, Result};

// ---------------------------------------------------------------------------
// Hashing
// ---------------------------------------------------------------------------

pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut h = Sha256::new();
    h.update(data);
    h.finalize().into()
}

pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(sha256(data))
}

// ---------------------------------------------------------------------------
// Time
// ---------------------------------------------------------------------------

pub fn now_utc_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}

// ---------------------------------------------------------------------------
// Validation helpers
// ---------------------------------------------------------------------------

/// Party identifiers: starts with alphanumeric, then up to 63 more
/// alphanumeric / hyphen / underscore characters.
static PARTY_RE: std::sync::LazyLock<regex::Regex> = std::sync::LazyLock::new(|| {
    regex::Regex::new(r"^[A-Za-z0-9][A-Za-z0-9\-_]{0,63}$").unwrap()
});

pub fn validate_party_id(party_id: &str) -> Result<()> {
    if party_id.is_empty() {
        return Err(QvoteError::invalid("party_id", "must not be empty"));
    }
    if !PARTY_RE.is_match(party_id) {
        return Err(QvoteError::invalid(
            "party_id",
            format!("'{party_id}': 1-64 chars, alphanumeric/hyphen/underscore"),
        ));
    }
    Ok(())
}

/// Validate that a path is not empty and does not contain null bytes.
pub fn validate_path(p: &std::path::Path, label: &str) -> Result<()> {
    let s = p.to_string_lossy();
    if s.is_empty() {
        return Err(QvoteError::invalid(label, "path is empty"));
    }
    if s.contains('\0') {
        return Err(QvoteError::invalid(label, "path contains null byte"));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Version constants (set by build.rs)
// ---------------------------------------------------------------------------

pub const GIT_HASH: &str = env!("QVOTE_GIT_HASH");
pub const BUILD_TS: &str = env!("QVOTE_BUILD_TS");
pub const BUILD_PROFILE: &str = env!("QVOTE_BUILD_PROFILE");
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// One-line version string for display.
pub fn version_string() -> String {
    format!("qvote v{VERSION} (git {GIT_HASH}, {BUILD_PROFILE} build {BUILD_TS})")
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_known_vector() {
        // SHA-256 of empty string
        let digest = sha256(b"");
        assert_eq!(
            hex::encode(digest),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn sha256_hex_matches() {
        assert_eq!(
            sha256_hex(b"hello"),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[test]
    fn valid_party_ids() {
        assert!(validate_party_id("PARTY_A").is_ok());
        assert!(validate_party_id("green-2").is_ok());
        assert!(validate_party_id("7").is_ok());
    }

    #[test]
    fn invalid_party_ids() {
        for bad in ["", "-leading", "has space", "semi;colon"] {
            let err = validate_party_id(bad).unwrap_err();
            assert_eq!(err.field(), Some("party_id"));
        }
        assert!(validate_party_id(&"A".repeat(65)).is_err());
    }

    #[test]
    fn empty_path_rejected() {
        assert!(validate_path(std::path::Path::new(""), "db").is_err());
        assert!(validate_path(std::path::Path::new("votes.db"), "db").is_ok());
    }

    #[test]
    fn timestamp_is_rfc3339() {
        let ts = now_utc_rfc3339();
        assert!(OffsetDateTime::parse(&ts, &Rfc3339).is_ok());
    }

    #[test]
    fn version_string_non_empty() {
        let v = version_string();
        assert!(v.starts_with(&format!("qvote v{VERSION}")));
        assert!(v.contains(BUILD_PROFILE));
        assert!(!BUILD_PROFILE.is_empty());
    }
}
