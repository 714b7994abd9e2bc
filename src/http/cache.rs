//! `ETag` and `Cache-Control` helpers for static assets

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Quoted content hash, e.g. `"9f1c2a"`
pub fn generate_etag(content: &[u8]) -> String {
    let mut hasher = DefaultHasher::new();
    content.hash(&mut hasher);
    format!("\"{:x}\"", hasher.finish())
}

/// Whether `If-None-Match` (single, list, or `*`) matches `etag`
pub fn check_etag_match(if_none_match: Option<&str>, etag: &str) -> bool {
    if_none_match.is_some_and(|client_etag| {
        client_etag
            .split(',')
            .any(|e| e.trim() == etag || e.trim() == "*")
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CachePolicy {
    /// Fingerprinted build output
    Public(u32),
    /// Entry document; must be revalidated so new deploys are picked up
    NoCache,
}

impl CachePolicy {
    pub fn to_header_value(self) -> String {
        match self {
            Self::Public(max_age) => format!("public, max-age={max_age}"),
            Self::NoCache => "no-cache".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_etag_is_stable_per_content() {
        let etag = generate_etag(b"<html></html>");
        assert!(etag.starts_with('"') && etag.ends_with('"'));
        assert_eq!(etag, generate_etag(b"<html></html>"));
        assert_ne!(etag, generate_etag(b"<html> </html>"));
    }

    #[test]
    fn test_check_etag_match() {
        let etag = "\"abc123\"";
        assert!(check_etag_match(Some("\"abc123\""), etag));
        assert!(check_etag_match(Some("\"xyz\", \"abc123\""), etag));
        assert!(check_etag_match(Some("*"), etag));
        assert!(!check_etag_match(Some("\"different\""), etag));
        assert!(!check_etag_match(None, etag));
    }

    #[test]
    fn test_cache_policy_header() {
        assert_eq!(CachePolicy::Public(3600).to_header_value(), "public, max-age=3600");
        assert_eq!(CachePolicy::NoCache.to_header_value(), "no-cache");
    }
}
