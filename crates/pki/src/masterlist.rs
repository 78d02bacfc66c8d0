//! ICAO CSCA Master List (9303 Part 12 §9).
//!
//! A Master List is a CMS ContentInfo holding SignedData whose
//! encapsulated content is a `CscaMasterList`: an INTEGER version and a
//! SET OF Certificate. The container is kept whole; the inner CSCAs are
//! re-encoded individually so the pipeline can materialize them.

use crate::anchors::TrustAnchors;
use crate::cert::ParsedCert;
use crate::{cms_util, PkiError};
use der::asn1::{ObjectIdentifier as Oid, SetOfVec};
use der::{Decode, Encode, Sequence};
use x509_cert::Certificate;

/// id-icao-cscaMasterList.
pub const OID_CSCA_MASTER_LIST: Oid = Oid::new_unwrap("2.23.136.1.1.2");

/// Encapsulated content of a Master List.
#[derive(Clone, Debug, Sequence)]
pub struct CscaMasterListContent {
    /// Version (v0).
    pub version: u64,
    /// The trusted CSCA certificates.
    pub cert_list: SetOfVec<Certificate>,
}

/// A parsed Master List upload.
#[derive(Debug, Clone)]
pub struct MasterList {
    /// Country of the list signer, from its certificate subject.
    pub signer_country: Option<String>,
    /// The signer certificate, when resolvable from the container.
    pub signer_cert: Option<ParsedCert>,
    /// DER of every contained CSCA, in list order.
    pub cscas_der: Vec<Vec<u8>>,
    /// The signer did not chain to the configured anchor bundle.
    pub untrusted_signer: bool,
    /// The whole CMS blob, republished as-is.
    pub raw: Vec<u8>,
}

impl MasterList {
    /// Parse and signature-check a Master List file.
    ///
    /// An unverifiable or unanchored signer is recorded, not fatal: the
    /// CSCAs still extract, and the upload carries the warning.
    pub fn parse(bytes: &[u8], anchors: &TrustAnchors) -> Result<Self, PkiError> {
        let sd = cms_util::decode_signed_data(bytes)?;
        if sd.encap_content_info.econtent_type != OID_CSCA_MASTER_LIST {
            return Err(PkiError::MalformedCms(format!(
                "encapsulated content {} is not a CSCA master list",
                sd.encap_content_info.econtent_type
            )));
        }
        let content = cms_util::encapsulated_bytes(&sd)?;
        let list = CscaMasterListContent::from_der(&content)
            .map_err(|e| PkiError::MalformedCms(e.to_string()))?;
        let mut cscas_der = Vec::with_capacity(list.cert_list.len());
        for cert in list.cert_list.iter() {
            cscas_der.push(cert.to_der().map_err(|e| PkiError::MalformedCms(e.to_string()))?);
        }

        let signer_cert = cms_util::resolve_signer_cert(&sd)
            .ok()
            .and_then(|der| ParsedCert::decode(&der).ok());
        let untrusted_signer = match &signer_cert {
            Some(cert) => {
                cms_util::verify_signer(&sd, cert).is_err() || !anchors.is_anchored(cert)
            }
            None => true,
        };
        Ok(Self {
            signer_country: signer_cert.as_ref().and_then(|c| c.subject_country.clone()),
            signer_cert,
            cscas_der,
            untrusted_signer,
            raw: bytes.to_vec(),
        })
    }

    /// Number of contained CSCAs.
    pub fn csca_count(&self) -> usize {
        self.cscas_der.len()
    }
}
