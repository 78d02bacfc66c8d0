//! Batched publication with parent materialization.

use crate::dit::{parent_chain, DitConfig};
use crate::entry::{intermediate_entry, DirEntry};
use crate::{AddOutcome, Directory, DirectoryError};
use dashmap::DashSet;
use pkd_core::dn;
use std::sync::Arc;
use tracing::{debug, info_span, warn, Instrument};

/// Aggregated result of one batch add.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    pub added: usize,
    pub duplicate_skipped: usize,
    /// `(dn, reason)` for entries that failed with non-duplicate errors.
    pub failed: Vec<(String, String)>,
}

impl BatchOutcome {
    /// Entries that ended up present in the directory.
    pub fn succeeded(&self) -> usize {
        self.added + self.duplicate_skipped
    }
}

/// Publishes entries, materializing missing organizational nodes first.
///
/// The known-present parent cache is a concurrent set with
/// last-write-wins semantics; parent adds are idempotent so a stale
/// insert is harmless.
pub struct Publisher<D: Directory> {
    dir: Arc<D>,
    dit: DitConfig,
    known_parents: DashSet<String>,
}

impl<D: Directory> Publisher<D> {
    /// Wrap a directory with the configured DIT.
    pub fn new(dir: Arc<D>, dit: DitConfig) -> Self {
        Self { dir, dit, known_parents: DashSet::new() }
    }

    /// The DIT this publisher writes into.
    pub fn dit(&self) -> &DitConfig {
        &self.dit
    }

    /// Make sure every ancestor of `leaf_dn` below the root exists.
    pub async fn ensure_parents(&self, leaf_dn: &str) -> Result<(), DirectoryError> {
        for ancestor in parent_chain(leaf_dn, &self.dit.root) {
            let key = dn::normalize(&ancestor);
            if self.known_parents.contains(&key) {
                continue;
            }
            if !self.dir.exists(&ancestor).await? {
                let Some(node) = intermediate_entry(&ancestor) else {
                    return Err(DirectoryError::InvalidDn(ancestor));
                };
                // Another worker may have won the race; duplicates are fine.
                let _ = self.dir.add(&node).await?;
                debug!(dn = %ancestor, "materialized intermediate node");
            }
            self.known_parents.insert(key);
        }
        Ok(())
    }

    /// Add one entry after materializing its ancestry.
    pub async fn add(&self, entry: &DirEntry) -> Result<AddOutcome, DirectoryError> {
        self.ensure_parents(&entry.dn).await?;
        self.dir.add(entry).await
    }

    /// Add a batch; per-entry failures are collected, not propagated.
    /// Order of individual adds within the batch is unspecified.
    pub async fn add_batch(&self, entries: &[DirEntry]) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();
        async {
            for entry in entries {
                match self.add(entry).await {
                    Ok(AddOutcome::Added) => outcome.added += 1,
                    Ok(AddOutcome::DuplicateSkipped) => outcome.duplicate_skipped += 1,
                    Err(e) => {
                        warn!(dn = %entry.dn, error = %e, "ldap add failed");
                        outcome.failed.push((entry.dn.clone(), e.to_string()));
                    }
                }
            }
        }
        .instrument(info_span!("ldap.batch_add", size = entries.len()))
        .await;
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::AttrVal;
    use crate::memory::InMemoryDirectory;

    fn leaf(dn: &str) -> DirEntry {
        DirEntry {
            dn: dn.into(),
            attrs: vec![("objectClass".into(), vec![AttrVal::Text("pkdDownload".into())])],
        }
    }

    fn publisher(dir: Arc<InMemoryDirectory>) -> Publisher<InMemoryDirectory> {
        Publisher::new(dir, DitConfig::new("dc=root"))
    }

    #[tokio::test]
    async fn parents_materialize_once() {
        let dir = Arc::new(InMemoryDirectory::new());
        let p = publisher(dir.clone());
        let dn = "cn=x+sn=01,o=dsc,c=KR,dc=data,dc=download,dc=pkd,dc=root";
        p.add(&leaf(dn)).await.unwrap();
        // leaf + 5 intermediates
        assert_eq!(dir.len(), 6);
        assert!(dir.exists("c=KR,dc=data,dc=download,dc=pkd,dc=root").await.unwrap());

        // Second leaf under the same branch adds exactly one entry.
        p.add(&leaf("cn=y+sn=02,o=dsc,c=KR,dc=data,dc=download,dc=pkd,dc=root")).await.unwrap();
        assert_eq!(dir.len(), 7);
    }

    #[tokio::test]
    async fn batch_counts_adds_and_duplicates() {
        let dir = Arc::new(InMemoryDirectory::new());
        let p = publisher(dir);
        let a = leaf("cn=a,o=csca,c=UT,dc=data,dc=download,dc=pkd,dc=root");
        let b = leaf("cn=b,o=csca,c=UT,dc=data,dc=download,dc=pkd,dc=root");
        let first = p.add_batch(&[a.clone(), b.clone()]).await;
        assert_eq!((first.added, first.duplicate_skipped), (2, 0));

        let again = p.add_batch(&[a, b]).await;
        assert_eq!((again.added, again.duplicate_skipped), (0, 2));
        assert_eq!(again.succeeded(), 2);
        assert!(again.failed.is_empty());
    }

    #[tokio::test]
    async fn invalid_entry_is_collected_not_fatal() {
        let dir = Arc::new(InMemoryDirectory::new());
        let p = publisher(dir);
        let good = leaf("cn=ok,o=crl,c=UT,dc=data,dc=download,dc=pkd,dc=root");
        let bad = leaf("");
        let outcome = p.add_batch(&[bad, good]).await;
        assert_eq!(outcome.added, 1);
        assert_eq!(outcome.failed.len(), 1);
    }
}
