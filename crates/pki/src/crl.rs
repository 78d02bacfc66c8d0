//! Certificate revocation lists.

use crate::PkiError;
use pkd_core::dn;
use std::collections::HashSet;
use x509_parser::prelude::{CertificateRevocationList, FromDer};

/// An owned view over one decoded CRL.
#[derive(Debug, Clone)]
pub struct ParsedCrl {
    /// Normalized issuer DN.
    pub issuer_dn: String,
    pub issuer_country: Option<String>,
    /// Seconds since epoch.
    pub this_update: i64,
    /// `None` when the CRL carries no nextUpdate.
    pub next_update: Option<i64>,
    /// Uppercase hex serials of revoked certificates.
    pub revoked_serials: HashSet<String>,
    pub der: Vec<u8>,
}

impl ParsedCrl {
    /// Decode DER bytes into an owned view.
    pub fn decode(der: &[u8]) -> Result<Self, PkiError> {
        let (_, crl) = CertificateRevocationList::from_der(der)
            .map_err(|e| PkiError::CrlDecode(e.to_string()))?;
        let issuer_dn = dn::normalize(&crl.issuer().to_string());
        Ok(Self {
            issuer_country: dn::extract_country(&issuer_dn),
            issuer_dn,
            this_update: crl.last_update().timestamp(),
            next_update: crl.next_update().map(|t| t.timestamp()),
            revoked_serials: crl
                .iter_revoked_certificates()
                .map(|rc| hex::encode_upper(rc.raw_serial()))
                .collect(),
            der: der.to_vec(),
        })
    }

    /// Number of revoked entries.
    pub fn revoked_count(&self) -> usize {
        self.revoked_serials.len()
    }

    /// The CRL window covers `now` (`thisUpdate <= now <= nextUpdate`).
    ///
    /// A CRL without nextUpdate never qualifies for revocation decisions.
    pub fn current_at(&self, now: i64) -> bool {
        self.this_update <= now && self.next_update.is_some_and(|n| now <= n)
    }

    /// Whether the given uppercase-hex serial is revoked.
    pub fn revokes(&self, serial_hex: &str) -> bool {
        self.revoked_serials.contains(serial_hex)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cert::ParsedCert;
    use crate::testing;

    #[test]
    fn decodes_and_matches_issuer() {
        let crl = ParsedCrl::decode(&testing::crl_der()).unwrap();
        let csca = ParsedCert::decode(&testing::csca_der()).unwrap();
        assert_eq!(crl.issuer_dn, csca.subject_dn);
        assert_eq!(crl.issuer_country.as_deref(), Some("UT"));
        assert!(crl.current_at(pkd_core::ids::now_secs()));
    }

    #[test]
    fn revoked_serial_membership() {
        let crl = ParsedCrl::decode(&testing::crl_der()).unwrap();
        let revoked = ParsedCert::decode(&testing::revoked_dsc_der()).unwrap();
        let good = ParsedCert::decode(&testing::dsc_der()).unwrap();
        assert!(crl.revokes(&revoked.serial_hex));
        assert!(!crl.revokes(&good.serial_hex));
        assert_eq!(crl.revoked_count(), 1);
    }

    #[test]
    fn garbage_is_a_decode_error() {
        assert!(matches!(ParsedCrl::decode(b"not a crl"), Err(PkiError::CrlDecode(_))));
    }
}
