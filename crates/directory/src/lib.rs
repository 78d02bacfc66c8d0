//! LDAP publication layer.
//!
//! Maps domain entities onto the prescribed DIT, executes batched adds
//! with duplicate tolerance, and materializes missing organizational
//! nodes on the way down. The wire client is `ldap3` behind the
//! [`Directory`] abstraction; an in-memory directory backs tests and
//! offline runs.

#![deny(unsafe_code)]

pub mod dit;
pub mod entry;
pub mod ldap;
pub mod memory;
pub mod publisher;

use std::future::Future;
use thiserror::Error;

pub use dit::DitConfig;
pub use entry::{certificate_entry, crl_entry, master_list_entry, AttrVal, DirEntry};
pub use ldap::{LdapDirectory, LdapSettings};
pub use memory::InMemoryDirectory;
pub use publisher::{BatchOutcome, Publisher};

/// Errors from directory operations.
#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("ldap: {0}")]
    Protocol(String),
    #[error("ldap timeout")]
    Timeout,
    #[error("invalid dn: {0}")]
    InvalidDn(String),
    #[error("directory connection failed: {0}")]
    Connect(String),
}

/// Per-entry outcome of an Add.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    /// Entry created.
    Added,
    /// Entry already existed under that DN; benign for the pipeline.
    DuplicateSkipped,
}

/// The directory operations the pipeline and the verifier need.
pub trait Directory: Send + Sync + 'static {
    /// Add one entry; an existing DN reports `DuplicateSkipped`.
    fn add(
        &self,
        entry: &DirEntry,
    ) -> impl Future<Output = Result<AddOutcome, DirectoryError>> + Send;

    /// Whether an entry exists at exactly this DN.
    fn exists(&self, dn: &str) -> impl Future<Output = Result<bool, DirectoryError>> + Send;

    /// Subtree search under `base_dn` returning the first value of a
    /// binary attribute, or `None` when nothing matches.
    fn fetch_binary_attr(
        &self,
        base_dn: &str,
        filter: &str,
        attr: &str,
    ) -> impl Future<Output = Result<Option<Vec<u8>>, DirectoryError>> + Send;
}
