//! Short image id expansion
//!
//! The runtime API reports abbreviated ids (12 hex characters) from create
//! and commit calls but full ids from list calls. The controller normalizes
//! a short id into a full one by prefix-matching against the current listing.

use crate::{CoreError, Result};

/// Expand an abbreviated id against a snapshot of full candidate ids.
///
/// Exactly one prefix match is required; zero or several matches are an
/// internal-consistency fault, not an expected user error.
pub fn expand_short_id(short: &str, candidates: &[String]) -> Result<String> {
    let matches: Vec<&String> = candidates.iter().filter(|c| c.starts_with(short)).collect();
    match matches.as_slice() {
        [full] => Ok((*full).clone()),
        _ => Err(CoreError::AmbiguousOrMissingId {
            prefix: short.to_string(),
            matches: matches.len(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expands_unique_prefix() {
        let candidates = vec![
            "abc123456789fe0123456789abcdef".to_string(),
            "def999888777aa9988776655443322".to_string(),
        ];
        let full = expand_short_id("abc123456789", &candidates).unwrap();
        assert_eq!(full, "abc123456789fe0123456789abcdef");
    }

    #[test]
    fn test_missing_prefix_fails() {
        let candidates = vec!["def999".to_string()];
        let err = expand_short_id("abc123", &candidates).unwrap_err();
        assert!(matches!(
            err,
            CoreError::AmbiguousOrMissingId { matches: 0, .. }
        ));
    }

    #[test]
    fn test_ambiguous_prefix_fails() {
        let candidates = vec!["abc123aaa".to_string(), "abc123bbb".to_string()];
        let err = expand_short_id("abc123", &candidates).unwrap_err();
        assert!(matches!(
            err,
            CoreError::AmbiguousOrMissingId { matches: 2, .. }
        ));
    }
}
