//! # Utilities Module
//!
//! General-purpose helpers shared across the workspace: opaque record
//! identifiers and clock formatting.

use chrono::Utc;
use uuid::Uuid;

/// Generates a new opaque record identifier (hyphenated UUID v4).
pub fn record_id() -> String {
    Uuid::new_v4().to_string()
}

/// Returns the current UTC time as an RFC 3339 string.
pub fn time_now_iso() -> String {
    Utc::now().to_rfc3339()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_id_is_unique_and_hyphenated() {
        let a = record_id();
        let b = record_id();
        assert_ne!(a, b);
        assert_eq!(a.len(), 36);
        assert_eq!(a.matches('-').count(), 4);
    }

    #[test]
    fn test_time_now_iso_parses_back() {
        let now = time_now_iso();
        assert!(chrono::DateTime::parse_from_rfc3339(&now).is_ok());
    }
}
