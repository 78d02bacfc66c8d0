//! In-memory directory for tests and offline runs.
//!
//! Entries are keyed by normalized DN; the filter support covers the
//! shapes this service issues: `(attr=value)` and an AND of them.

use crate::{AddOutcome, AttrVal, DirEntry, Directory, DirectoryError};
use dashmap::DashMap;
use pkd_core::dn;

/// A concurrent map standing in for the LDAP server.
#[derive(Default)]
pub struct InMemoryDirectory {
    entries: DashMap<String, DirEntry>,
}

impl InMemoryDirectory {
    /// Fresh empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries present.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the directory is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries whose DN falls under `base_dn` (inclusive).
    pub fn under(&self, base_dn: &str) -> Vec<DirEntry> {
        let base = dn::normalize(base_dn);
        self.entries
            .iter()
            .filter(|kv| kv.key().ends_with(&base))
            .map(|kv| kv.value().clone())
            .collect()
    }
}

/// Undo `ldap3::ldap_escape`-style `\XX` hex escapes in a filter value.
fn unescape_filter_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch == '\\' {
            let hi = chars.next();
            let lo = chars.next();
            if let (Some(hi), Some(lo)) = (hi, lo) {
                if let Ok(byte) = u8::from_str_radix(&format!("{hi}{lo}"), 16) {
                    out.push(byte as char);
                    continue;
                }
            }
            out.push(ch);
            if let Some(hi) = hi {
                out.push(hi);
            }
            if let Some(lo) = lo {
                out.push(lo);
            }
        } else {
            out.push(ch);
        }
    }
    out
}

/// Parse the filter shapes the service uses into (attr, value) pairs.
///
/// Simple clauses only; composite openers (`(&`, `(|`) are skipped and
/// their inner clauses collected.
fn parse_filter(filter: &str) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    let chars: Vec<char> = filter.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        if chars[i] != '(' {
            i += 1;
            continue;
        }
        let mut j = i + 1;
        while j < chars.len() && chars[j] != ')' && chars[j] != '(' {
            j += 1;
        }
        if j < chars.len() && chars[j] == ')' {
            let clause: String = chars[i + 1..j].iter().collect();
            if let Some((attr, value)) = clause.split_once('=') {
                let attr = attr.trim();
                if !attr.is_empty() && !matches!(attr, "&" | "|" | "!") {
                    pairs.push((attr.to_string(), unescape_filter_value(value)));
                }
            }
            i = j + 1;
        } else {
            i += 1;
        }
    }
    pairs
}

fn entry_matches(entry: &DirEntry, pairs: &[(String, String)]) -> bool {
    pairs.iter().all(|(attr, want)| {
        entry.attrs.iter().any(|(name, values)| {
            let base_name = name.split(';').next().unwrap_or(name);
            (name.eq_ignore_ascii_case(attr) || base_name.eq_ignore_ascii_case(attr))
                && values.iter().any(|v| match v {
                    AttrVal::Text(t) => (want == "*") || t == want,
                    AttrVal::Binary(_) => want == "*",
                })
        })
    })
}

impl Directory for InMemoryDirectory {
    async fn add(&self, entry: &DirEntry) -> Result<AddOutcome, DirectoryError> {
        if entry.dn.is_empty() {
            return Err(DirectoryError::InvalidDn("empty dn".into()));
        }
        let key = dn::normalize(&entry.dn);
        match self.entries.entry(key) {
            dashmap::mapref::entry::Entry::Occupied(_) => Ok(AddOutcome::DuplicateSkipped),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(entry.clone());
                Ok(AddOutcome::Added)
            }
        }
    }

    async fn exists(&self, dn_str: &str) -> Result<bool, DirectoryError> {
        Ok(self.entries.contains_key(&dn::normalize(dn_str)))
    }

    async fn fetch_binary_attr(
        &self,
        base_dn: &str,
        filter: &str,
        attr: &str,
    ) -> Result<Option<Vec<u8>>, DirectoryError> {
        let pairs = parse_filter(filter);
        let base = dn::normalize(base_dn);
        for kv in self.entries.iter() {
            if !kv.key().ends_with(&base) || !entry_matches(kv.value(), &pairs) {
                continue;
            }
            if let Some(AttrVal::Binary(bytes)) = kv.value().get(attr) {
                return Ok(Some(bytes.clone()));
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(dn: &str, cn: &str, der: &[u8]) -> DirEntry {
        DirEntry {
            dn: dn.into(),
            attrs: vec![
                ("objectClass".into(), vec![AttrVal::Text("pkdDownload".into())]),
                ("cn".into(), vec![AttrVal::Text(cn.into())]),
                ("userCertificate;binary".into(), vec![AttrVal::Binary(der.to_vec())]),
            ],
        }
    }

    #[tokio::test]
    async fn add_is_duplicate_tolerant() {
        let dir = InMemoryDirectory::new();
        let e = entry("cn=x,o=csca,c=UT,dc=root", "x", b"d");
        assert_eq!(dir.add(&e).await.unwrap(), AddOutcome::Added);
        assert_eq!(dir.add(&e).await.unwrap(), AddOutcome::DuplicateSkipped);
        assert_eq!(dir.len(), 1);
    }

    #[tokio::test]
    async fn dn_matching_is_normalized() {
        let dir = InMemoryDirectory::new();
        dir.add(&entry("cn=x,o=csca,c=UT,dc=root", "x", b"d")).await.unwrap();
        assert!(dir.exists("CN=x, O=csca, C=UT, DC=root").await.unwrap());
    }

    #[tokio::test]
    async fn search_filters_on_leaf_attributes_under_base() {
        let dir = InMemoryDirectory::new();
        dir.add(&entry("cn=target,o=csca,c=UT,dc=root", "CN=Root,C=UT", b"csca-der"))
            .await
            .unwrap();
        dir.add(&entry("cn=other,o=dsc,c=UT,dc=root", "CN=Root,C=UT", b"dsc-der")).await.unwrap();

        let got = dir
            .fetch_binary_attr(
                "o=csca,c=UT,dc=root",
                "(&(objectClass=pkdDownload)(cn=CN=Root,C=UT))",
                "userCertificate;binary",
            )
            .await
            .unwrap();
        assert_eq!(got.as_deref(), Some(&b"csca-der"[..]));

        let miss = dir
            .fetch_binary_attr("o=csca,c=UT,dc=root", "(cn=nobody)", "userCertificate;binary")
            .await
            .unwrap();
        assert!(miss.is_none());
    }

    #[test]
    fn filter_hex_escapes_unescape() {
        assert_eq!(unescape_filter_value(r"a\2ab"), "a*b");
        assert_eq!(unescape_filter_value("plain"), "plain");
    }

    #[test]
    fn and_filters_parse_to_clauses() {
        let pairs = parse_filter("(&(objectClass=pkdDownload)(cn=CN=Root,C=UT))");
        assert_eq!(
            pairs,
            vec![
                ("objectClass".to_string(), "pkdDownload".to_string()),
                ("cn".to_string(), "CN=Root,C=UT".to_string()),
            ]
        );
    }
}
