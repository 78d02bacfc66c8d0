//! Domain entities mapped to directory entries.

use crate::dit::DitConfig;
use pkd_core::{CertKind, CertificateRecord, CrlRecord, MasterListRecord};

/// pkdVersion attribute stamped on every certificate entry.
pub const PKD_VERSION: &str = "1150";

/// One attribute value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttrVal {
    Text(String),
    Binary(Vec<u8>),
}

impl AttrVal {
    /// The value as raw bytes, whichever representation it holds.
    pub fn bytes(&self) -> &[u8] {
        match self {
            AttrVal::Text(t) => t.as_bytes(),
            AttrVal::Binary(b) => b,
        }
    }
}

/// An entry ready for an LDAP Add.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub dn: String,
    /// Attribute name to values, in add order.
    pub attrs: Vec<(String, Vec<AttrVal>)>,
}

impl DirEntry {
    /// First value of the named attribute (case-insensitive).
    pub fn get(&self, name: &str) -> Option<&AttrVal> {
        self.attrs
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .and_then(|(_, vs)| vs.first())
    }
}

fn text(v: impl Into<String>) -> AttrVal {
    AttrVal::Text(v.into())
}

/// Build the entry for one certificate row.
pub fn certificate_entry(dit: &DitConfig, cert: &CertificateRecord) -> DirEntry {
    let non_conformant = cert.kind == CertKind::DscNc;
    let org = match cert.kind {
        CertKind::Csca => "csca",
        CertKind::Dsc | CertKind::DscNc => "dsc",
    };
    let dn = dit.certificate_dn(
        &cert.subject_dn,
        &cert.serial_hex,
        org,
        cert.subject_country.as_deref(),
        non_conformant,
    );
    let mut object_classes = vec![
        text("top"),
        text("person"),
        text("organizationalPerson"),
        text("inetOrgPerson"),
        text("pkdDownload"),
    ];
    if cert.kind == CertKind::Csca {
        object_classes.push(text("pkdMasterList"));
    }
    DirEntry {
        dn,
        attrs: vec![
            ("objectClass".into(), object_classes),
            ("cn".into(), vec![text(cert.subject_dn.clone())]),
            ("sn".into(), vec![text(cert.serial_hex.clone())]),
            ("userCertificate;binary".into(), vec![AttrVal::Binary(cert.der.clone())]),
            ("pkdVersion".into(), vec![text(PKD_VERSION)]),
        ],
    }
}

/// Build the entry for one CRL row.
pub fn crl_entry(dit: &DitConfig, crl: &CrlRecord) -> DirEntry {
    DirEntry {
        dn: dit.crl_dn(&crl.issuer_dn, crl.issuer_country.as_deref()),
        attrs: vec![
            ("objectClass".into(), vec![text("top"), text("cRLDistributionPoint")]),
            ("cn".into(), vec![text(crl.issuer_dn.clone())]),
            (
                "certificateRevocationList;binary".into(),
                vec![AttrVal::Binary(crl.der.clone())],
            ),
        ],
    }
}

/// Build the single entry holding a whole master list blob.
pub fn master_list_entry(dit: &DitConfig, ml: &MasterListRecord) -> DirEntry {
    let label = format!(
        "masterlist-{}",
        ml.signer_country.as_deref().unwrap_or(crate::dit::UNKNOWN_COUNTRY)
    );
    DirEntry {
        dn: dit.master_list_dn(&label, ml.signer_country.as_deref()),
        attrs: vec![
            ("objectClass".into(), vec![text("top"), text("pkdMasterList")]),
            ("cn".into(), vec![text(label)]),
            ("pkdMasterListContent".into(), vec![AttrVal::Binary(ml.raw_cms.clone())]),
        ],
    }
}

/// Minimal entry materializing a missing intermediate node.
///
/// The shape follows the leading attribute: `dc` nodes become domains,
/// `c` nodes countries, `o` nodes organizations.
pub fn intermediate_entry(node_dn: &str) -> Option<DirEntry> {
    let first = pkd_core::dn::split_components(node_dn).into_iter().next()?;
    let (attr, value) = first.split_once('=')?;
    let attr = attr.trim().to_ascii_lowercase();
    let value = value.trim().to_string();
    let object_classes = match attr.as_str() {
        "dc" => vec![text("top"), text("domain")],
        "c" => vec![text("top"), text("country")],
        "o" => vec![text("top"), text("organization")],
        _ => vec![text("top"), text("organizationalUnit")],
    };
    Some(DirEntry {
        dn: node_dn.to_string(),
        attrs: vec![("objectClass".into(), object_classes), (attr, vec![text(value)])],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pkd_core::{CertificateId, Fingerprint, UploadId};
    use std::collections::BTreeSet;

    fn dit() -> DitConfig {
        DitConfig::new("dc=root")
    }

    fn cert(kind: CertKind) -> CertificateRecord {
        CertificateRecord {
            id: CertificateId::new(),
            upload_id: UploadId::new(),
            kind,
            source: pkd_core::SourceType::Ldif,
            subject_dn: "CN=Signer,O=Gov,C=UT".into(),
            issuer_dn: "CN=Root,O=Gov,C=UT".into(),
            serial_hex: "2002".into(),
            subject_country: Some("UT".into()),
            issuer_country: Some("UT".into()),
            not_before: 0,
            not_after: i64::MAX,
            fingerprint_sha256: Fingerprint::of(b"der"),
            der: vec![0x30, 0x03, 0x02, 0x01, 0x00],
            validation: pkd_core::ValidationStatus::Valid,
            errors: BTreeSet::new(),
            uploaded_to_ldap: false,
            created_ms: 0,
        }
    }

    #[test]
    fn csca_gets_master_list_class() {
        let e = certificate_entry(&dit(), &cert(CertKind::Csca));
        let classes = &e.attrs[0].1;
        assert!(classes.contains(&AttrVal::Text("pkdMasterList".into())));
        assert!(e.dn.contains(",o=csca,c=UT,"));
    }

    #[test]
    fn dsc_has_binary_cert_and_version() {
        let e = certificate_entry(&dit(), &cert(CertKind::Dsc));
        assert!(matches!(e.get("userCertificate;binary"), Some(AttrVal::Binary(_))));
        assert_eq!(e.get("pkdVersion"), Some(&AttrVal::Text(PKD_VERSION.into())));
        assert!(!e.attrs[0].1.contains(&AttrVal::Text("pkdMasterList".into())));
    }

    #[test]
    fn nc_dsc_lands_in_nc_branch() {
        let e = certificate_entry(&dit(), &cert(CertKind::DscNc));
        assert!(e.dn.contains("dc=nc-data"));
        assert!(e.dn.contains(",o=dsc,"));
    }

    #[test]
    fn intermediate_shapes() {
        let c = intermediate_entry("c=KR,dc=data,dc=root").unwrap();
        assert!(c.attrs[0].1.contains(&AttrVal::Text("country".into())));
        assert_eq!(c.get("c"), Some(&AttrVal::Text("KR".into())));
        let o = intermediate_entry("o=dsc,c=KR,dc=root").unwrap();
        assert!(o.attrs[0].1.contains(&AttrVal::Text("organization".into())));
        let d = intermediate_entry("dc=download,dc=root").unwrap();
        assert!(d.attrs[0].1.contains(&AttrVal::Text("domain".into())));
    }
}
