//! `ldap3`-backed directory with a bounded connection pool.
//!
//! Connections age out after [`LdapSettings::max_conn_age`]; every
//! operation borrows a pooled connection and carries the configured
//! per-operation timeout. Duplicate adds come back as a defined skip,
//! not an error.

use crate::entry::DirEntry;
use crate::{AddOutcome, Directory, DirectoryError};
use ldap3::{Ldap, LdapConnAsync, LdapConnSettings, Scope, SearchEntry};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, Semaphore};
use tracing::debug;

/// LDAP result code `entryAlreadyExists`.
const RC_ENTRY_ALREADY_EXISTS: u32 = 68;
/// LDAP result code `noSuchObject`.
const RC_NO_SUCH_OBJECT: u32 = 32;
/// Result code ldap3 reports for a timed-out operation.
const RC_TIMEOUT: u32 = 85;

/// Connection and pool settings.
#[derive(Debug, Clone)]
pub struct LdapSettings {
    /// Server URL, e.g. `ldap://localhost:389`.
    pub url: String,
    pub bind_dn: Option<String>,
    pub bind_password: Option<String>,
    /// Connections opened eagerly at startup.
    pub pool_min: usize,
    /// Upper bound on concurrent connections.
    pub pool_max: usize,
    /// Pooled connections older than this are reopened.
    pub max_conn_age: Duration,
    pub connect_timeout: Duration,
    pub op_timeout: Duration,
}

impl Default for LdapSettings {
    fn default() -> Self {
        Self {
            url: "ldap://localhost:389".into(),
            bind_dn: None,
            bind_password: None,
            pool_min: 3,
            pool_max: 20,
            max_conn_age: Duration::from_secs(15 * 60),
            connect_timeout: Duration::from_secs(30),
            op_timeout: Duration::from_secs(60),
        }
    }
}

struct PooledConn {
    ldap: Ldap,
    created: Instant,
}

/// The production [`Directory`] implementation.
pub struct LdapDirectory {
    settings: LdapSettings,
    idle: Mutex<Vec<PooledConn>>,
    permits: Arc<Semaphore>,
}

impl LdapDirectory {
    /// Connect, warming `pool_min` connections.
    pub async fn connect(settings: LdapSettings) -> Result<Self, DirectoryError> {
        let dir = Self {
            permits: Arc::new(Semaphore::new(settings.pool_max.max(1))),
            idle: Mutex::new(Vec::new()),
            settings,
        };
        let mut warm = Vec::with_capacity(dir.settings.pool_min);
        for _ in 0..dir.settings.pool_min {
            warm.push(dir.open().await?);
        }
        *dir.idle.lock().await = warm;
        Ok(dir)
    }

    async fn open(&self) -> Result<PooledConn, DirectoryError> {
        let conn_settings =
            LdapConnSettings::new().set_conn_timeout(self.settings.connect_timeout);
        let (conn, mut ldap) = LdapConnAsync::with_settings(conn_settings, &self.settings.url)
            .await
            .map_err(|e| DirectoryError::Connect(e.to_string()))?;
        ldap3::drive!(conn);
        if let (Some(dn), Some(pw)) = (&self.settings.bind_dn, &self.settings.bind_password) {
            ldap.simple_bind(dn, pw)
                .await
                .map_err(|e| DirectoryError::Connect(e.to_string()))?
                .success()
                .map_err(|e| DirectoryError::Connect(format!("bind: {e}")))?;
        }
        debug!(url = %self.settings.url, "opened ldap connection");
        Ok(PooledConn { ldap, created: Instant::now() })
    }

    async fn acquire(&self) -> Result<PooledConn, DirectoryError> {
        // The permit bounds concurrent connections; it is re-acquired
        // implicitly on release because we only park young connections.
        loop {
            let candidate = self.idle.lock().await.pop();
            match candidate {
                Some(conn) if conn.created.elapsed() < self.settings.max_conn_age => {
                    return Ok(conn)
                }
                Some(conn) => drop(conn), // aged out; fall through and reopen
                None => return self.open().await,
            }
        }
    }

    async fn release(&self, conn: PooledConn) {
        if conn.created.elapsed() < self.settings.max_conn_age {
            self.idle.lock().await.push(conn);
        }
    }

    fn map_result(rc: u32, text: &str) -> Result<AddOutcome, DirectoryError> {
        match rc {
            0 => Ok(AddOutcome::Added),
            RC_ENTRY_ALREADY_EXISTS => Ok(AddOutcome::DuplicateSkipped),
            RC_TIMEOUT => Err(DirectoryError::Timeout),
            other => Err(DirectoryError::Protocol(format!("rc={other}: {text}"))),
        }
    }
}

/// ldap3 wants one value type for names and values; everything rides
/// as raw bytes.
fn wire_attrs(entry: &DirEntry) -> Vec<(Vec<u8>, HashSet<Vec<u8>>)> {
    entry
        .attrs
        .iter()
        .map(|(name, values)| {
            (
                name.clone().into_bytes(),
                values.iter().map(|v| v.bytes().to_vec()).collect::<HashSet<_>>(),
            )
        })
        .collect()
}

impl Directory for LdapDirectory {
    async fn add(&self, entry: &DirEntry) -> Result<AddOutcome, DirectoryError> {
        let _permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| DirectoryError::Connect("pool closed".into()))?;
        let mut conn = self.acquire().await?;
        let result = conn
            .ldap
            .with_timeout(self.settings.op_timeout)
            .add(&entry.dn, wire_attrs(entry))
            .await;
        self.release(conn).await;
        match result {
            Ok(res) => Self::map_result(res.rc, &res.text),
            Err(e) => Err(DirectoryError::Protocol(e.to_string())),
        }
    }

    async fn exists(&self, dn: &str) -> Result<bool, DirectoryError> {
        let _permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| DirectoryError::Connect("pool closed".into()))?;
        let mut conn = self.acquire().await?;
        let result = conn
            .ldap
            .with_timeout(self.settings.op_timeout)
            .search(dn, Scope::Base, "(objectClass=*)", vec!["1.1"])
            .await;
        self.release(conn).await;
        match result {
            Ok(res) => match res.1.rc {
                0 => Ok(!res.0.is_empty()),
                RC_NO_SUCH_OBJECT => Ok(false),
                RC_TIMEOUT => Err(DirectoryError::Timeout),
                other => Err(DirectoryError::Protocol(format!("rc={other}: {}", res.1.text))),
            },
            Err(e) => Err(DirectoryError::Protocol(e.to_string())),
        }
    }

    async fn fetch_binary_attr(
        &self,
        base_dn: &str,
        filter: &str,
        attr: &str,
    ) -> Result<Option<Vec<u8>>, DirectoryError> {
        let _permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| DirectoryError::Connect("pool closed".into()))?;
        let mut conn = self.acquire().await?;
        let result = conn
            .ldap
            .with_timeout(self.settings.op_timeout)
            .search(base_dn, Scope::Subtree, filter, vec![attr])
            .await;
        self.release(conn).await;
        let res = match result {
            Ok(res) => res,
            Err(e) => return Err(DirectoryError::Protocol(e.to_string())),
        };
        match res.1.rc {
            0 => {}
            RC_NO_SUCH_OBJECT => return Ok(None),
            RC_TIMEOUT => return Err(DirectoryError::Timeout),
            other => {
                return Err(DirectoryError::Protocol(format!("rc={other}: {}", res.1.text)))
            }
        }
        for raw in res.0 {
            let entry = SearchEntry::construct(raw);
            if let Some(values) = entry.bin_attrs.get(attr) {
                if let Some(first) = values.first() {
                    return Ok(Some(first.clone()));
                }
            }
            if let Some(values) = entry.attrs.get(attr) {
                if let Some(first) = values.first() {
                    return Ok(Some(first.clone().into_bytes()));
                }
            }
        }
        Ok(None)
    }
}
