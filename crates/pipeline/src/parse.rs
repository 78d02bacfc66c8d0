//! Parsing stage: LDIF scan and Master List unwrap into value objects.

use ldif::{Entry, LdifError, Reader};
use pkd_core::value::{CertData, CrlData, MasterListEnvelope};
use pkd_core::{dn, CertKind, ParseFault, SourceType};
use pki::anchors::TrustAnchors;
use pki::masterlist::MasterList;
use pki::PkiError;
use std::io::BufRead;

/// Everything one parse pass produced.
#[derive(Debug, Default)]
pub struct ParseOutput {
    pub certs: Vec<CertData>,
    pub crls: Vec<CrlData>,
    pub master_list: Option<MasterListEnvelope>,
    pub faults: Vec<ParseFault>,
}

impl ParseOutput {
    /// Total extracted items.
    pub fn extracted(&self) -> usize {
        self.certs.len() + self.crls.len()
    }
}

/// What one LDIF entry contributed.
enum EntryYield {
    Cert(CertData),
    Crl(CrlData),
    Nothing,
}

/// DIT-based classification of an LDIF entry.
///
/// `o=csca` → CSCA, `o=dsc` → DSC, `o=nc-dsc` or a `dc=nc-data` branch
/// → non-conformant DSC, `o=crl` → CRL. Entries without a marker fall
/// back to the attribute that carried the binary value.
fn classify_dn(entry_dn: &str) -> Option<CertKind> {
    let mut in_nc_branch = false;
    let mut org: Option<String> = None;
    for comp in dn::split_components(&dn::normalize(entry_dn)) {
        if let Some((attr, value)) = comp.split_once('=') {
            match attr {
                "DC" if value.eq_ignore_ascii_case("nc-data") => in_nc_branch = true,
                "O" if org.is_none() => org = Some(value.to_ascii_lowercase()),
                _ => {}
            }
        }
    }
    match org.as_deref() {
        Some("csca") => Some(CertKind::Csca),
        Some("nc-dsc") => Some(CertKind::DscNc),
        Some("dsc") if in_nc_branch => Some(CertKind::DscNc),
        Some("dsc") => Some(CertKind::Dsc),
        _ if in_nc_branch => Some(CertKind::DscNc),
        _ => None,
    }
}

fn extract(entry: &Entry) -> EntryYield {
    if let Some((_, der)) =
        entry.first_binary_of(&["certificateRevocationList;binary", "certificateRevocationList"])
    {
        return EntryYield::Crl(CrlData {
            der: der.to_vec(),
            entry_dn: Some(entry.dn.clone()),
        });
    }
    let cert_attr = entry.first_binary_of(&[
        "userCertificate;binary",
        "cACertificate;binary",
        "userCertificate",
        "cACertificate",
    ]);
    let Some((attr_name, der)) = cert_attr else {
        return EntryYield::Nothing;
    };
    let kind = classify_dn(&entry.dn).unwrap_or_else(|| {
        if attr_name.to_ascii_lowercase().starts_with("cacertificate") {
            CertKind::Csca
        } else {
            CertKind::Dsc
        }
    });
    EntryYield::Cert(CertData {
        kind,
        source: SourceType::Ldif,
        der: der.to_vec(),
        entry_dn: Some(entry.dn.clone()),
    })
}

/// Single-pass LDIF scan. `on_entry` runs after every record (parsed or
/// faulted) so the caller can emit progress; memory stays bounded by
/// one entry plus the accumulated value objects.
pub fn parse_ldif<R: BufRead>(
    src: R,
    mut on_entry: impl FnMut(usize, &ParseOutput),
) -> ParseOutput {
    let mut out = ParseOutput::default();
    for (index, item) in Reader::new(src).enumerate() {
        match item {
            Ok(entry) => {
                // The entry DN participates in classification; decode
                // faults on the DER itself surface during validation.
                match extract(&entry) {
                    EntryYield::Cert(cert) => out.certs.push(cert),
                    EntryYield::Crl(crl) => out.crls.push(crl),
                    EntryYield::Nothing => {}
                }
            }
            Err(LdifError::BadBase64 { index, attr }) => {
                out.faults.push(ParseFault { index, reason: format!("bad base64 in {attr}") });
            }
            Err(LdifError::MalformedEntry { index, reason }) => {
                out.faults.push(ParseFault { index, reason });
            }
            Err(LdifError::Io(e)) => {
                out.faults.push(ParseFault { index, reason: format!("io: {e}") });
            }
        }
        on_entry(index + 1, &out);
    }
    out
}

/// Unwrap a Master List file: the container rides along whole, the
/// inner CSCAs become value objects with `MASTER_LIST` provenance.
pub fn parse_master_list(bytes: &[u8], anchors: &TrustAnchors) -> Result<ParseOutput, PkiError> {
    let ml = MasterList::parse(bytes, anchors)?;
    let mut out = ParseOutput {
        master_list: Some(MasterListEnvelope {
            signer_country: ml.signer_country.clone(),
            raw_cms: ml.raw.clone(),
            contained_csca_count: ml.csca_count(),
            untrusted_signer: ml.untrusted_signer,
        }),
        ..Default::default()
    };
    for der in ml.cscas_der {
        out.certs.push(CertData {
            kind: CertKind::Csca,
            source: SourceType::MasterList,
            der,
            entry_dn: None,
        });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ldif::{write_entry, AttrValue};
    use std::io::Cursor;

    fn ldif_with(dn_str: &str, attr: &str, der: &[u8]) -> String {
        let mut out = String::new();
        write_entry(
            &mut out,
            &Entry {
                dn: dn_str.into(),
                attrs: vec![(attr.into(), AttrValue::Binary(der.to_vec()))],
            },
        );
        out
    }

    #[test]
    fn classification_follows_the_dit() {
        assert_eq!(classify_dn("cn=x,o=csca,c=KR,dc=data"), Some(CertKind::Csca));
        assert_eq!(classify_dn("cn=x,o=dsc,c=KR,dc=data"), Some(CertKind::Dsc));
        assert_eq!(classify_dn("cn=x,o=nc-dsc,c=KR,dc=data"), Some(CertKind::DscNc));
        assert_eq!(classify_dn("cn=x,o=dsc,c=KR,dc=nc-data,dc=download"), Some(CertKind::DscNc));
        assert_eq!(classify_dn("cn=x,c=KR"), None);
    }

    #[test]
    fn scan_yields_certs_crls_and_faults() {
        let mut src = String::new();
        src.push_str(&ldif_with(
            "cn=a,o=csca,c=UT,dc=data",
            "cACertificate;binary",
            &pki::testing::csca_der(),
        ));
        src.push_str(&ldif_with(
            "cn=b,o=dsc,c=UT,dc=data",
            "userCertificate;binary",
            &pki::testing::dsc_der(),
        ));
        src.push_str("dn: cn=broken,o=dsc,c=UT,dc=data\nuserCertificate;binary:: @@@@\n\n");
        src.push_str(&ldif_with(
            "cn=c,o=crl,c=UT,dc=data",
            "certificateRevocationList;binary",
            &pki::testing::crl_der(),
        ));

        let mut seen = 0;
        let out = parse_ldif(Cursor::new(src.into_bytes()), |n, _| seen = n);
        assert_eq!(out.certs.len(), 2);
        assert_eq!(out.crls.len(), 1);
        assert_eq!(out.faults.len(), 1);
        assert_eq!(seen, 4);
        assert_eq!(out.certs[0].kind, CertKind::Csca);
        assert_eq!(out.certs[1].kind, CertKind::Dsc);
    }

    #[test]
    fn master_list_yields_envelope_and_cscas() {
        let anchors = pki::testing::anchors_with_master_list_signer();
        let out = parse_master_list(&pki::testing::master_list_cms(), &anchors).unwrap();
        let env = out.master_list.expect("envelope");
        assert_eq!(env.signer_country.as_deref(), Some("LV"));
        assert!(!env.untrusted_signer);
        assert_eq!(env.contained_csca_count, 1);
        assert_eq!(out.certs.len(), 1);
        assert_eq!(out.certs[0].source, SourceType::MasterList);
    }

    #[test]
    fn empty_scan_extracts_nothing() {
        let out = parse_ldif(Cursor::new(b"".to_vec()), |_, _| {});
        assert_eq!(out.extracted(), 0);
    }
}
