//! Opaque identifiers and timestamps.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Milliseconds since UNIX epoch (for record timestamps).
pub fn now_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}

/// Seconds since UNIX epoch (for validity-window comparisons).
pub fn now_secs() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs() as i64
}

macro_rules! opaque_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Generate a fresh random identifier.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Parse from the canonical hyphenated form.
            pub fn parse(s: &str) -> Option<Self> {
                Uuid::parse_str(s).ok().map(Self)
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }
    };
}

opaque_id!(
    /// Identifier of an upload record.
    UploadId
);
opaque_id!(
    /// Identifier of a persisted certificate row.
    CertificateId
);
opaque_id!(
    /// Identifier of a persisted CRL row.
    CrlId
);
opaque_id!(
    /// Identifier of a persisted master list row.
    MasterListId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_distinct() {
        let a = UploadId::new();
        let b = UploadId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn display_roundtrip() {
        let a = CertificateId::new();
        assert_eq!(CertificateId::parse(&a.to_string()), Some(a));
    }

    #[test]
    fn clock_is_sane() {
        assert!(now_ms() > 1_600_000_000_000);
        assert!(now_secs() > 1_600_000_000);
    }
}
