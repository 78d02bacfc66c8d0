//! Passive Authentication (ICAO 9303 Part 11).
//!
//! Verifies an SOD against the CSCA chain held in the directory and
//! matches Data Group hashes. The CSCA lookup is LDAP-only: the
//! relational certificate table belongs to the ingest context, and the
//! directory is the single real-time source of truth here. The search
//! narrows the base DN to the `o=csca` node and filters on leaf
//! attributes only; organizational components are nodes, not
//! searchable attributes.

#![deny(unsafe_code)]

pub mod request;

use directory::{Directory, DitConfig};
use pkd_core::dn;
use pki::cert::ParsedCert;
use pki::sod::Sod;
use pki::verify;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, instrument};

pub use request::{PaRequest, RequestError};

/// Aggregate verification status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaStatus {
    /// Chain, SOD signature, and every provided DG hash check out.
    Valid,
    /// At least one check failed; sub-results say which.
    Invalid,
    /// A structural or I/O failure prevented any check.
    Error,
}

/// One named check.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckDetail {
    pub valid: bool,
    pub message: String,
}

impl CheckDetail {
    fn ok(message: impl Into<String>) -> Self {
        Self { valid: true, message: message.into() }
    }

    fn fail(message: impl Into<String>) -> Self {
        Self { valid: false, message: message.into() }
    }
}

/// The Data Group check with per-DG outcomes.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DataGroupDetail {
    pub valid: bool,
    pub message: String,
    pub per_dg: BTreeMap<String, bool>,
}

/// The verification result a transport serializes as-is.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaResponse {
    pub status: PaStatus,
    pub certificate_chain_validation: CheckDetail,
    pub sod_signature_validation: CheckDetail,
    pub data_group_validation: DataGroupDetail,
}

impl PaResponse {
    fn error(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            status: PaStatus::Error,
            certificate_chain_validation: CheckDetail::fail(message.clone()),
            sod_signature_validation: CheckDetail::fail(message.clone()),
            data_group_validation: DataGroupDetail {
                valid: false,
                message,
                per_dg: BTreeMap::new(),
            },
        }
    }
}

/// The Passive Authentication verifier.
pub struct Verifier<D: Directory> {
    dir: Arc<D>,
    dit: DitConfig,
}

impl<D: Directory> Verifier<D> {
    /// Wrap a directory with the configured DIT.
    pub fn new(dir: Arc<D>, dit: DitConfig) -> Self {
        Self { dir, dit }
    }

    /// Verify a transport-level request (base64 payloads).
    pub async fn verify(&self, req: &PaRequest) -> Result<PaResponse, RequestError> {
        let decoded = req.decode()?;
        Ok(self.verify_decoded(&decoded.sod, &decoded.data_groups).await)
    }

    /// Verify a parsed SOD against provided Data Group contents.
    #[instrument(skip_all)]
    pub async fn verify_decoded(
        &self,
        sod_der: &[u8],
        data_groups: &BTreeMap<u8, Vec<u8>>,
    ) -> PaResponse {
        let sod = match Sod::parse(sod_der) {
            Ok(sod) => sod,
            Err(e) => return PaResponse::error(format!("malformed SOD: {e}")),
        };
        let dsc = match sod.dsc() {
            Ok(dsc) => dsc,
            Err(e) => return PaResponse::error(format!("embedded DSC unreadable: {e}")),
        };

        let (chain, csca) = match self.lookup_csca(&dsc).await {
            Err(message) => return PaResponse::error(message),
            Ok(None) => (
                CheckDetail::fail(format!(
                    "CSCA not found in LDAP for issuer {}",
                    dsc.issuer_dn
                )),
                None,
            ),
            Ok(Some(csca)) => match verify::verify_issued_by(&dsc, &csca) {
                Ok(()) => (CheckDetail::ok("DSC chains to stored CSCA"), Some(csca)),
                Err(_) => (
                    CheckDetail::fail("DSC signature does not verify against stored CSCA"),
                    Some(csca),
                ),
            },
        };

        let sod_sig = if csca.is_some() {
            match sod.verify_signature(&dsc) {
                Ok(()) => CheckDetail::ok("SOD signature verifies against embedded DSC"),
                Err(e) => CheckDetail::fail(format!("SOD signature invalid: {e}")),
            }
        } else {
            CheckDetail::fail("could not verify without DSC issuer")
        };

        let dg = self.check_data_groups(&sod, data_groups);

        let status = if chain.valid && sod_sig.valid && dg.valid {
            PaStatus::Valid
        } else {
            PaStatus::Invalid
        };
        info!(?status, "passive authentication finished");
        PaResponse {
            status,
            certificate_chain_validation: chain,
            sod_signature_validation: sod_sig,
            data_group_validation: dg,
        }
    }

    /// Fetch the issuing CSCA from the directory.
    ///
    /// Base narrowed to `o=csca,c=<CC>`; the filter touches leaf
    /// attributes only. `Ok(None)` when the search comes back empty,
    /// `Err` on directory failure (an ERROR-level condition).
    async fn lookup_csca(&self, dsc: &ParsedCert) -> Result<Option<ParsedCert>, String> {
        let Some(country) = dn::extract_country(&dsc.issuer_dn) else {
            return Ok(None);
        };
        let base = self.dit.org_base("csca", &country);
        let filter = format!(
            "(&(objectClass=pkdDownload)(cn={}))",
            ldap3::ldap_escape(dsc.issuer_dn.as_str())
        );
        debug!(%base, %filter, "csca lookup");
        let der = self
            .dir
            .fetch_binary_attr(&base, &filter, "userCertificate;binary")
            .await
            .map_err(|e| format!("directory lookup failed: {e}"))?;
        match der {
            None => Ok(None),
            Some(der) => match ParsedCert::decode(&der) {
                Ok(cert) => Ok(Some(cert)),
                Err(e) => Err(format!("stored CSCA unreadable: {e}")),
            },
        }
    }

    fn check_data_groups(
        &self,
        sod: &Sod,
        data_groups: &BTreeMap<u8, Vec<u8>>,
    ) -> DataGroupDetail {
        let mut per_dg = BTreeMap::new();
        let mut mismatched = Vec::new();
        for (number, content) in data_groups {
            match sod.check_data_group(*number, content) {
                Ok(Some(matches)) => {
                    per_dg.insert(format!("DG{number}"), matches);
                    if !matches {
                        mismatched.push(format!("DG{number}_HASH_MISMATCH"));
                    }
                }
                // A DG the SOD does not list is not an error.
                Ok(None) => {}
                Err(e) => {
                    per_dg.insert(format!("DG{number}"), false);
                    mismatched.push(format!("DG{number}: {e}"));
                }
            }
        }
        if mismatched.is_empty() {
            DataGroupDetail {
                valid: true,
                message: format!("{} data group(s) match", per_dg.len()),
                per_dg,
            }
        } else {
            DataGroupDetail { valid: false, message: mismatched.join("; "), per_dg }
        }
    }
}
