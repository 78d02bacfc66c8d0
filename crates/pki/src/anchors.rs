//! Trust anchor bundle for Master List signer checks.
//!
//! The bundle is supplied by configuration (a directory of DER files in
//! the deployment). A signer is anchored when its exact DER is in the
//! bundle, or when an anchor's subject matches its issuer and the
//! signature verifies.

use crate::cert::ParsedCert;
use crate::verify;
use std::path::Path;

/// An immutable set of anchor certificates, loaded at startup.
#[derive(Debug, Clone, Default)]
pub struct TrustAnchors {
    anchors: Vec<ParsedCert>,
}

impl TrustAnchors {
    /// An empty bundle; every signer is then untrusted.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Add one anchor certificate (DER). Undecodable input is skipped;
    /// the caller decides whether to log it.
    pub fn add_der(&mut self, der: &[u8]) -> bool {
        match ParsedCert::decode(der) {
            Ok(cert) => {
                self.anchors.push(cert);
                true
            }
            Err(_) => false,
        }
    }

    /// Load every regular file in `dir` as a DER anchor. Files that do
    /// not decode are counted but skipped.
    pub fn load_dir(dir: &Path) -> std::io::Result<(Self, usize)> {
        let mut bundle = Self::empty();
        let mut skipped = 0usize;
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if !path.is_file() {
                continue;
            }
            let bytes = std::fs::read(&path)?;
            if !bundle.add_der(&bytes) {
                skipped += 1;
            }
        }
        Ok((bundle, skipped))
    }

    /// Number of anchors in the bundle.
    pub fn len(&self) -> usize {
        self.anchors.len()
    }

    /// Whether the bundle is empty.
    pub fn is_empty(&self) -> bool {
        self.anchors.is_empty()
    }

    /// Whether `cert` chains to (or is) one of the anchors.
    pub fn is_anchored(&self, cert: &ParsedCert) -> bool {
        self.anchors.iter().any(|anchor| {
            anchor.der == cert.der
                || (anchor.subject_dn == cert.issuer_dn
                    && verify::verify_issued_by(cert, anchor).is_ok())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;

    #[test]
    fn exact_der_match_is_anchored() {
        let mut bundle = TrustAnchors::empty();
        assert!(bundle.add_der(&testing::master_list_signer_der()));
        let signer = ParsedCert::decode(&testing::master_list_signer_der()).unwrap();
        assert!(bundle.is_anchored(&signer));
    }

    #[test]
    fn issuer_chain_is_anchored() {
        let mut bundle = TrustAnchors::empty();
        bundle.add_der(&testing::csca_der());
        let dsc = ParsedCert::decode(&testing::dsc_der()).unwrap();
        assert!(bundle.is_anchored(&dsc));
    }

    #[test]
    fn empty_bundle_trusts_nothing() {
        let bundle = TrustAnchors::empty();
        let signer = ParsedCert::decode(&testing::master_list_signer_der()).unwrap();
        assert!(bundle.is_empty());
        assert!(!bundle.is_anchored(&signer));
    }

    #[test]
    fn bad_der_is_skipped() {
        let mut bundle = TrustAnchors::empty();
        assert!(!bundle.add_der(b"junk"));
        assert_eq!(bundle.len(), 0);
    }
}
