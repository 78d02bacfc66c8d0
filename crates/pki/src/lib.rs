//! X.509 / CMS parsing and verification for ICAO PKD trust material.
//!
//! One decode path for certificates ([`cert::ParsedCert`]), one signature
//! dispatch table ([`verify`]), CMS plumbing shared between the Master
//! List and the SOD ([`cms_util`]), and the embedded-anchor bundle used
//! to judge master list signers ([`anchors`]).

#![deny(unsafe_code)]

pub mod anchors;
pub mod cert;
pub mod cms_util;
pub mod crl;
pub mod digest;
pub mod masterlist;
pub mod sod;
pub mod testing;
pub mod verify;

use thiserror::Error;

/// Errors from PKI parsing and verification.
#[derive(Debug, Error)]
pub enum PkiError {
    #[error("certificate decode: {0}")]
    CertDecode(String),
    #[error("crl decode: {0}")]
    CrlDecode(String),
    #[error("malformed cms: {0}")]
    MalformedCms(String),
    #[error("malformed security object: {0}")]
    MalformedSod(String),
    #[error("unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),
    #[error("signature verification failed")]
    SignatureInvalid,
    #[error("message digest mismatch")]
    DigestMismatch,
    #[error("signed data carries no signer certificate")]
    NoSignerCert,
}
