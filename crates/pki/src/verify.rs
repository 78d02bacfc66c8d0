//! Signature verification dispatched by algorithm OID.
//!
//! The table maps the signature-algorithm OIDs seen in the CSCA/DSC
//! population onto `ring` verification algorithms. Unknown OIDs are a
//! verification error, never a panic; SHA-1 RSA stays accepted because
//! a number of older national CSCAs still carry it.

use crate::cert::ParsedCert;
use crate::PkiError;
use ring::signature::{self, VerificationAlgorithm};

/// RSA PKCS#1 v1.5 with SHA-1 (legacy CSCA population).
pub const OID_SHA1_RSA: &str = "1.2.840.113549.1.1.5";
/// RSA PKCS#1 v1.5 with SHA-256.
pub const OID_SHA256_RSA: &str = "1.2.840.113549.1.1.11";
/// RSA PKCS#1 v1.5 with SHA-384.
pub const OID_SHA384_RSA: &str = "1.2.840.113549.1.1.12";
/// RSA PKCS#1 v1.5 with SHA-512.
pub const OID_SHA512_RSA: &str = "1.2.840.113549.1.1.13";
/// Bare rsaEncryption; CMS pairs it with a separate digest algorithm.
pub const OID_RSA_ENCRYPTION: &str = "1.2.840.113549.1.1.1";
/// ECDSA with SHA-256.
pub const OID_ECDSA_SHA256: &str = "1.2.840.10045.4.3.2";
/// ECDSA with SHA-384.
pub const OID_ECDSA_SHA384: &str = "1.2.840.10045.4.3.3";

/// Resolve a certificate-style "hash-with-algorithm" OID.
fn algorithm_for(sig_oid: &str) -> Option<&'static dyn VerificationAlgorithm> {
    match sig_oid {
        OID_SHA1_RSA => Some(&signature::RSA_PKCS1_1024_8192_SHA1_FOR_LEGACY_USE_ONLY),
        OID_SHA256_RSA => Some(&signature::RSA_PKCS1_2048_8192_SHA256),
        OID_SHA384_RSA => Some(&signature::RSA_PKCS1_2048_8192_SHA384),
        OID_SHA512_RSA => Some(&signature::RSA_PKCS1_2048_8192_SHA512),
        OID_ECDSA_SHA256 => Some(&signature::ECDSA_P256_SHA256_ASN1),
        OID_ECDSA_SHA384 => Some(&signature::ECDSA_P384_SHA384_ASN1),
        _ => None,
    }
}

/// Resolve a CMS signer algorithm, where RSA may appear as bare
/// `rsaEncryption` with the hash carried in the digest algorithm.
pub fn cms_algorithm_for(
    sig_oid: &str,
    digest_oid: &str,
) -> Result<&'static dyn VerificationAlgorithm, PkiError> {
    if sig_oid == OID_RSA_ENCRYPTION {
        return match digest_oid {
            crate::digest::OID_SHA1 => {
                Ok(&signature::RSA_PKCS1_1024_8192_SHA1_FOR_LEGACY_USE_ONLY)
            }
            crate::digest::OID_SHA256 => Ok(&signature::RSA_PKCS1_2048_8192_SHA256),
            crate::digest::OID_SHA384 => Ok(&signature::RSA_PKCS1_2048_8192_SHA384),
            crate::digest::OID_SHA512 => Ok(&signature::RSA_PKCS1_2048_8192_SHA512),
            other => Err(PkiError::UnsupportedAlgorithm(format!(
                "rsaEncryption with digest {other}"
            ))),
        };
    }
    algorithm_for(sig_oid).ok_or_else(|| PkiError::UnsupportedAlgorithm(sig_oid.to_string()))
}

/// Verify `signature` over `message` with the given public key and OID.
pub fn verify_raw(
    public_key: &[u8],
    sig_oid: &str,
    message: &[u8],
    sig: &[u8],
) -> Result<(), PkiError> {
    let alg =
        algorithm_for(sig_oid).ok_or_else(|| PkiError::UnsupportedAlgorithm(sig_oid.to_string()))?;
    signature::UnparsedPublicKey::new(alg, public_key)
        .verify(message, sig)
        .map_err(|_| PkiError::SignatureInvalid)
}

/// Verify that `cert` was signed by `issuer`'s key.
pub fn verify_issued_by(cert: &ParsedCert, issuer: &ParsedCert) -> Result<(), PkiError> {
    verify_raw(&issuer.public_key_der, &cert.sig_alg_oid, &cert.tbs_der, &cert.signature)
}

/// Verify a self-signed certificate against its own key.
pub fn verify_self_signed(cert: &ParsedCert) -> Result<(), PkiError> {
    verify_issued_by(cert, cert)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;

    #[test]
    fn csca_self_signature_verifies() {
        let csca = ParsedCert::decode(&testing::csca_der()).unwrap();
        verify_self_signed(&csca).unwrap();
    }

    #[test]
    fn dsc_chains_to_csca() {
        let csca = ParsedCert::decode(&testing::csca_der()).unwrap();
        let dsc = ParsedCert::decode(&testing::dsc_der()).unwrap();
        verify_issued_by(&dsc, &csca).unwrap();
    }

    #[test]
    fn wrong_issuer_fails() {
        let other = ParsedCert::decode(&testing::master_list_signer_der()).unwrap();
        let dsc = ParsedCert::decode(&testing::dsc_der()).unwrap();
        assert!(matches!(verify_issued_by(&dsc, &other), Err(PkiError::SignatureInvalid)));
    }

    #[test]
    fn unknown_oid_is_unsupported_not_panic() {
        let dsc = ParsedCert::decode(&testing::dsc_der()).unwrap();
        let err = verify_raw(&dsc.public_key_der, "1.2.3.4", b"m", b"s").unwrap_err();
        assert!(matches!(err, PkiError::UnsupportedAlgorithm(_)));
    }

    #[test]
    fn tampered_tbs_fails() {
        let csca = ParsedCert::decode(&testing::csca_der()).unwrap();
        let mut tampered = csca.clone();
        tampered.tbs_der[10] ^= 0xFF;
        assert!(verify_self_signed(&tampered).is_err());
    }
}
