//! The Directory Information Tree this service publishes into.
//!
//! ```text
//! <root>
//! └── dc=pkd
//!     └── dc=download
//!         ├── dc=data           standard material
//!         │   └── c=<CC>
//!         │       ├── o=csca    (and master list blobs at o=ml)
//!         │       ├── o=dsc
//!         │       └── o=crl
//!         └── dc=nc-data        non-conformant DSCs
//!             └── c=<CC>
//!                 └── o=dsc
//! ```

use pkd_core::dn;

/// Country bucket used when no country could be extracted from a DN.
/// ZZ is the ISO 3166 user-assigned "unknown" code.
pub const UNKNOWN_COUNTRY: &str = "ZZ";

/// Root and derived base DNs of the published tree.
#[derive(Debug, Clone)]
pub struct DitConfig {
    /// Directory root, e.g. `dc=ldap,dc=smartcoreinc,dc=com`.
    pub root: String,
}

impl DitConfig {
    /// Configure with the directory root.
    pub fn new(root: impl Into<String>) -> Self {
        Self { root: root.into() }
    }

    /// Base DN of the standard branch.
    pub fn data_base(&self) -> String {
        format!("dc=data,dc=download,dc=pkd,{}", self.root)
    }

    /// Base DN of the non-conformant branch.
    pub fn nc_base(&self) -> String {
        format!("dc=nc-data,dc=download,dc=pkd,{}", self.root)
    }

    /// `o=<marker>,c=<CC>` node under the standard branch.
    pub fn org_base(&self, org: &str, country: &str) -> String {
        format!("o={},c={},{}", org, country, self.data_base())
    }

    /// `o=dsc,c=<CC>` node under the non-conformant branch.
    pub fn nc_org_base(&self, country: &str) -> String {
        format!("o=dsc,c={},{}", country, self.nc_base())
    }

    /// Leaf DN for a certificate: `cn=<escaped-subject>+sn=<serial>`
    /// under the proper organizational node.
    pub fn certificate_dn(
        &self,
        subject_dn: &str,
        serial_hex: &str,
        org: &str,
        country: Option<&str>,
        non_conformant: bool,
    ) -> String {
        let country = country.unwrap_or(UNKNOWN_COUNTRY);
        let parent = if non_conformant {
            self.nc_org_base(country)
        } else {
            self.org_base(org, country)
        };
        format!("cn={}+sn={},{}", dn::escape_rdn_value(subject_dn), serial_hex, parent)
    }

    /// Leaf DN for a CRL, keyed by its issuer.
    pub fn crl_dn(&self, issuer_dn: &str, country: Option<&str>) -> String {
        let parent = self.org_base("crl", country.unwrap_or(UNKNOWN_COUNTRY));
        format!("cn={},{}", dn::escape_rdn_value(issuer_dn), parent)
    }

    /// Leaf DN for a master list blob under `o=ml,c=<signer>`.
    pub fn master_list_dn(&self, label: &str, country: Option<&str>) -> String {
        let parent = self.org_base("ml", country.unwrap_or(UNKNOWN_COUNTRY));
        format!("cn={},{}", dn::escape_rdn_value(label), parent)
    }

    /// Rewrite rule for imported LDIF: a trailing `dc=icao,dc=int` in a
    /// source DN is replaced with the configured root.
    pub fn rewrite_source_dn(&self, source_dn: &str) -> String {
        let normalized = dn::normalize(source_dn);
        match normalized.strip_suffix("DC=icao,DC=int") {
            Some(prefix) => format!("{}{}", prefix, self.root),
            None => source_dn.to_string(),
        }
    }
}

/// Ancestor DNs of `leaf_dn` below `root`, ordered root-first, leaf's
/// parent last. Empty when the leaf is not under the root.
pub fn parent_chain(leaf_dn: &str, root: &str) -> Vec<String> {
    let components = dn::split_components(leaf_dn);
    let root_components = dn::split_components(root);
    if components.len() <= root_components.len()
        || !dn::normalize(leaf_dn).ends_with(&dn::normalize(root))
    {
        return Vec::new();
    }
    let stop = components.len() - root_components.len();
    // chain below root, excluding the leaf component itself
    (1..stop)
        .rev()
        .map(|i| components[i..].join(","))
        .collect()
}
