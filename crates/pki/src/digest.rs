//! Digest registry keyed by algorithm OID.

use crate::PkiError;
use ring::digest;

/// SHA-1 (legacy Data Group hashes).
pub const OID_SHA1: &str = "1.3.14.3.2.26";
/// SHA-256.
pub const OID_SHA256: &str = "2.16.840.1.101.3.4.2.1";
/// SHA-384.
pub const OID_SHA384: &str = "2.16.840.1.101.3.4.2.2";
/// SHA-512.
pub const OID_SHA512: &str = "2.16.840.1.101.3.4.2.3";

/// Resolve a digest OID to its algorithm.
pub fn algorithm_for(oid: &str) -> Result<&'static digest::Algorithm, PkiError> {
    match oid {
        OID_SHA1 => Ok(&digest::SHA1_FOR_LEGACY_USE_ONLY),
        OID_SHA256 => Ok(&digest::SHA256),
        OID_SHA384 => Ok(&digest::SHA384),
        OID_SHA512 => Ok(&digest::SHA512),
        other => Err(PkiError::UnsupportedAlgorithm(other.to_string())),
    }
}

/// Hash `data` with the algorithm named by `oid`.
pub fn compute(oid: &str, data: &[u8]) -> Result<Vec<u8>, PkiError> {
    Ok(digest::digest(algorithm_for(oid)?, data).as_ref().to_vec())
}
