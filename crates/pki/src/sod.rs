//! The ePassport Security Object Document (SOD).
//!
//! A CMS SignedData whose encapsulated content is an LDSSecurityObject:
//! the hash algorithm plus one hash per present Data Group. The signing
//! DSC is mandated to travel in the certificate set.

use crate::cert::ParsedCert;
use crate::{cms_util, digest, PkiError};
use cms::signed_data::SignedData;
use der::asn1::{ObjectIdentifier as Oid, OctetString};
use der::{Decode, Sequence};
use std::collections::BTreeMap;
use x509_cert::spki::AlgorithmIdentifierOwned;

/// id-icao-mrtd-security-ldsSecurityObject.
pub const OID_LDS_SECURITY_OBJECT: Oid = Oid::new_unwrap("2.23.136.1.1.1");

/// One Data Group hash entry.
#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub struct DataGroupHash {
    /// Data Group number (1..=16).
    pub data_group_number: u8,
    /// Hash of the DG content under the object's hash algorithm.
    pub data_group_hash_value: OctetString,
}

/// The encapsulated LDSSecurityObject.
#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub struct LdsSecurityObject {
    /// Version (v0 or v1).
    pub version: u64,
    /// Hash algorithm for every DG hash.
    pub hash_algorithm: AlgorithmIdentifierOwned,
    /// Per-DG hashes.
    pub data_group_hash_values: Vec<DataGroupHash>,
}

/// A parsed SOD ready for Passive Authentication.
#[derive(Debug, Clone)]
pub struct Sod {
    signed_data: SignedData,
    /// Dotted OID of the DG hash algorithm.
    pub digest_alg_oid: String,
    /// DG number to expected hash.
    pub dg_hashes: BTreeMap<u8, Vec<u8>>,
    /// DER of the embedded signing DSC.
    pub dsc_der: Vec<u8>,
}

impl Sod {
    /// Parse a DER SOD.
    ///
    /// The outer tag must be a SEQUENCE (the raw ContentInfo); anything
    /// else is `MalformedSod`.
    pub fn parse(bytes: &[u8]) -> Result<Self, PkiError> {
        if bytes.first() != Some(&0x30) {
            return Err(PkiError::MalformedSod("outer tag is not a SEQUENCE".into()));
        }
        let sd =
            cms_util::decode_signed_data(bytes).map_err(|e| PkiError::MalformedSod(e.to_string()))?;
        if sd.encap_content_info.econtent_type != OID_LDS_SECURITY_OBJECT {
            return Err(PkiError::MalformedSod(format!(
                "encapsulated content {} is not an LDSSecurityObject",
                sd.encap_content_info.econtent_type
            )));
        }
        let content = cms_util::encapsulated_bytes(&sd)?;
        let lds = LdsSecurityObject::from_der(&content)
            .map_err(|e| PkiError::MalformedSod(e.to_string()))?;
        let dsc_der = cms_util::resolve_signer_cert(&sd).map_err(|_| PkiError::NoSignerCert)?;
        let mut dg_hashes = BTreeMap::new();
        for entry in &lds.data_group_hash_values {
            dg_hashes.insert(entry.data_group_number, entry.data_group_hash_value.as_bytes().to_vec());
        }
        Ok(Self {
            digest_alg_oid: lds.hash_algorithm.oid.to_string(),
            dg_hashes,
            dsc_der,
            signed_data: sd,
        })
    }

    /// The embedded DSC, decoded.
    pub fn dsc(&self) -> Result<ParsedCert, PkiError> {
        ParsedCert::decode(&self.dsc_der)
    }

    /// Verify the SignedData signature against the embedded DSC.
    pub fn verify_signature(&self, dsc: &ParsedCert) -> Result<(), PkiError> {
        cms_util::verify_signer(&self.signed_data, dsc)
    }

    /// Check one provided Data Group against the SOD hash table.
    ///
    /// `None` when the SOD lists no hash for that group (not an error).
    pub fn check_data_group(&self, number: u8, content: &[u8]) -> Result<Option<bool>, PkiError> {
        let Some(want) = self.dg_hashes.get(&number) else {
            return Ok(None);
        };
        let got = digest::compute(&self.digest_alg_oid, content)?;
        Ok(Some(&got == want))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;

    #[test]
    fn parses_and_lists_dg_hashes() {
        let sod = Sod::parse(&testing::sod_cms()).unwrap();
        assert_eq!(sod.digest_alg_oid, digest::OID_SHA256);
        assert_eq!(sod.dg_hashes.len(), 2);
        assert!(sod.dg_hashes.contains_key(&1));
        assert!(sod.dg_hashes.contains_key(&2));
    }

    #[test]
    fn embedded_dsc_matches_fixture() {
        let sod = Sod::parse(&testing::sod_cms()).unwrap();
        let dsc = sod.dsc().unwrap();
        let expected = ParsedCert::decode(&testing::dsc_der()).unwrap();
        assert_eq!(dsc.subject_dn, expected.subject_dn);
        assert_eq!(dsc.serial_hex, expected.serial_hex);
    }

    #[test]
    fn signature_verifies_with_embedded_dsc() {
        let sod = Sod::parse(&testing::sod_cms()).unwrap();
        let dsc = sod.dsc().unwrap();
        sod.verify_signature(&dsc).unwrap();
    }

    #[test]
    fn signature_fails_with_wrong_cert() {
        let sod = Sod::parse(&testing::sod_cms()).unwrap();
        let wrong = ParsedCert::decode(&testing::csca_der()).unwrap();
        assert!(sod.verify_signature(&wrong).is_err());
    }

    #[test]
    fn data_group_hashes_check_out() {
        let sod = Sod::parse(&testing::sod_cms()).unwrap();
        assert_eq!(sod.check_data_group(1, testing::DG1_CONTENT).unwrap(), Some(true));
        assert_eq!(sod.check_data_group(2, testing::DG2_CONTENT).unwrap(), Some(true));
        assert_eq!(sod.check_data_group(2, b"tampered").unwrap(), Some(false));
        assert_eq!(sod.check_data_group(14, b"absent").unwrap(), None);
    }

    #[test]
    fn non_sequence_outer_tag_rejected() {
        let err = Sod::parse(&[0x04, 0x02, 0xAA, 0xBB]).unwrap_err();
        assert!(matches!(err, PkiError::MalformedSod(_)));
    }

    #[test]
    fn master_list_is_not_an_sod() {
        let err = Sod::parse(&testing::master_list_cms()).unwrap_err();
        assert!(matches!(err, PkiError::MalformedSod(_)));
    }
}
