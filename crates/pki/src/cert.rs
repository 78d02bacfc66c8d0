//! Certificate decoding.
//!
//! All certificate DER in the system flows through [`ParsedCert::decode`],
//! which owns the fields the pipeline needs (DNs are normalized here,
//! through the shared helper, and nowhere else). The raw DER is kept so
//! chains can be re-verified on demand.

use crate::PkiError;
use pkd_core::dn;
use x509_parser::prelude::{FromDer, X509Certificate};

/// An owned view over one decoded X.509 certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCert {
    /// Normalized subject DN.
    pub subject_dn: String,
    /// Normalized issuer DN.
    pub issuer_dn: String,
    /// Uppercase hex serial number.
    pub serial_hex: String,
    pub subject_country: Option<String>,
    pub issuer_country: Option<String>,
    /// Validity window, seconds since epoch.
    pub not_before: i64,
    pub not_after: i64,
    /// Basic Constraints present with `cA=true`.
    pub is_ca: bool,
    /// Basic Constraints extension was present at all.
    pub has_basic_constraints: bool,
    pub has_key_cert_sign: bool,
    pub has_digital_signature: bool,
    /// Contents of the SPKI BIT STRING, the shape `ring` consumes:
    /// DER RSAPublicKey for RSA, uncompressed point for EC.
    pub public_key_der: Vec<u8>,
    /// Raw TBSCertificate DER (the signed message).
    pub tbs_der: Vec<u8>,
    /// Signature bytes.
    pub signature: Vec<u8>,
    /// Dotted signature-algorithm OID.
    pub sig_alg_oid: String,
    /// The certificate exactly as received.
    pub der: Vec<u8>,
}

impl ParsedCert {
    /// Decode DER bytes into an owned view.
    pub fn decode(der: &[u8]) -> Result<Self, PkiError> {
        let (_, cert) =
            X509Certificate::from_der(der).map_err(|e| PkiError::CertDecode(e.to_string()))?;
        let subject_dn = dn::normalize(&cert.subject().to_string());
        let issuer_dn = dn::normalize(&cert.issuer().to_string());
        let basic_constraints = cert
            .basic_constraints()
            .map_err(|e| PkiError::CertDecode(format!("basic constraints: {e}")))?;
        let key_usage = cert
            .key_usage()
            .map_err(|e| PkiError::CertDecode(format!("key usage: {e}")))?;
        Ok(Self {
            subject_country: dn::extract_country(&subject_dn),
            issuer_country: dn::extract_country(&issuer_dn),
            subject_dn,
            issuer_dn,
            serial_hex: hex::encode_upper(cert.tbs_certificate.raw_serial()),
            not_before: cert.validity().not_before.timestamp(),
            not_after: cert.validity().not_after.timestamp(),
            is_ca: basic_constraints.as_ref().is_some_and(|bc| bc.value.ca),
            has_basic_constraints: basic_constraints.is_some(),
            has_key_cert_sign: key_usage.as_ref().is_some_and(|ku| ku.value.key_cert_sign()),
            has_digital_signature: key_usage
                .as_ref()
                .is_some_and(|ku| ku.value.digital_signature()),
            public_key_der: cert.public_key().subject_public_key.as_ref().to_vec(),
            tbs_der: cert.tbs_certificate.as_ref().to_vec(),
            signature: cert.signature_value.as_ref().to_vec(),
            sig_alg_oid: cert.signature_algorithm.algorithm.to_id_string(),
            der: der.to_vec(),
        })
    }

    /// Issuer and subject DN coincide (the self-signed shape of a CSCA).
    pub fn is_self_issued(&self) -> bool {
        self.subject_dn == self.issuer_dn
    }

    /// The validity window contains `now` (seconds since epoch).
    pub fn valid_at(&self, now: i64) -> bool {
        self.not_before <= now && now <= self.not_after
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;

    #[test]
    fn decodes_self_signed_csca() {
        let cert = ParsedCert::decode(&testing::csca_der()).unwrap();
        assert!(cert.is_self_issued());
        assert!(cert.is_ca);
        assert!(cert.has_key_cert_sign);
        assert_eq!(cert.subject_country.as_deref(), Some("UT"));
        assert!(cert.valid_at(pkd_core::ids::now_secs()));
    }

    #[test]
    fn decodes_dsc_with_issuer_link() {
        let csca = ParsedCert::decode(&testing::csca_der()).unwrap();
        let dsc = ParsedCert::decode(&testing::dsc_der()).unwrap();
        assert!(!dsc.is_self_issued());
        assert_eq!(dsc.issuer_dn, csca.subject_dn);
        assert!(dsc.has_digital_signature);
        assert!(!dsc.is_ca);
    }

    #[test]
    fn expired_cert_window() {
        let cert = ParsedCert::decode(&testing::expired_csca_der()).unwrap();
        assert!(!cert.valid_at(pkd_core::ids::now_secs()));
    }

    #[test]
    fn garbage_is_a_decode_error() {
        assert!(matches!(ParsedCert::decode(&[0u8; 16]), Err(PkiError::CertDecode(_))));
    }

    #[test]
    fn serial_is_uppercase_hex() {
        let cert = ParsedCert::decode(&testing::dsc_der()).unwrap();
        assert!(!cert.serial_hex.is_empty());
        assert!(cert.serial_hex.chars().all(|c| c.is_ascii_digit() || c.is_ascii_uppercase()));
    }
}
