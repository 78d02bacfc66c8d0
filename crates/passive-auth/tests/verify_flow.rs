//! Passive Authentication flows against an in-memory directory.

use directory::{certificate_entry, Directory, DitConfig, InMemoryDirectory};
use passive_auth::{PaStatus, Verifier};
use pkd_core::{CertKind, CertificateId, CertificateRecord, Fingerprint, UploadId};
use pki::cert::ParsedCert;
use pki::testing;
use std::collections::BTreeMap;
use std::sync::Arc;

const ROOT: &str = "dc=ldap,dc=example,dc=com";

fn csca_record() -> CertificateRecord {
    let parsed = ParsedCert::decode(&testing::csca_der()).unwrap();
    CertificateRecord {
        id: CertificateId::new(),
        upload_id: UploadId::new(),
        kind: CertKind::Csca,
        source: pkd_core::SourceType::Ldif,
        subject_dn: parsed.subject_dn.clone(),
        issuer_dn: parsed.issuer_dn.clone(),
        serial_hex: parsed.serial_hex.clone(),
        subject_country: parsed.subject_country.clone(),
        issuer_country: parsed.issuer_country.clone(),
        not_before: parsed.not_before,
        not_after: parsed.not_after,
        fingerprint_sha256: Fingerprint::of(&testing::csca_der()),
        der: testing::csca_der(),
        validation: pkd_core::ValidationStatus::Valid,
        errors: Default::default(),
        uploaded_to_ldap: true,
        created_ms: pkd_core::ids::now_ms(),
    }
}

async fn directory_with_csca() -> Arc<InMemoryDirectory> {
    let dir = Arc::new(InMemoryDirectory::new());
    let entry = certificate_entry(&DitConfig::new(ROOT), &csca_record());
    dir.add(&entry).await.unwrap();
    dir
}

fn dgs(pairs: &[(u8, &[u8])]) -> BTreeMap<u8, Vec<u8>> {
    pairs.iter().map(|(n, c)| (*n, c.to_vec())).collect()
}

#[tokio::test]
async fn valid_passport_passes_all_three_checks() {
    let verifier = Verifier::new(directory_with_csca().await, DitConfig::new(ROOT));
    let response = verifier
        .verify_decoded(
            &testing::sod_cms(),
            &dgs(&[(1, testing::DG1_CONTENT), (2, testing::DG2_CONTENT)]),
        )
        .await;
    assert_eq!(response.status, PaStatus::Valid);
    assert!(response.certificate_chain_validation.valid);
    assert!(response.sod_signature_validation.valid);
    assert!(response.data_group_validation.valid);
    assert_eq!(
        response.data_group_validation.per_dg,
        BTreeMap::from([("DG1".to_string(), true), ("DG2".to_string(), true)])
    );
}

#[tokio::test]
async fn missing_csca_is_invalid_with_explanations() {
    let empty = Arc::new(InMemoryDirectory::new());
    let verifier = Verifier::new(empty, DitConfig::new(ROOT));
    let response = verifier
        .verify_decoded(&testing::sod_cms(), &dgs(&[(1, testing::DG1_CONTENT)]))
        .await;
    assert_eq!(response.status, PaStatus::Invalid);
    assert!(!response.certificate_chain_validation.valid);
    assert!(response.certificate_chain_validation.message.contains("not found in LDAP"));
    assert!(!response.sod_signature_validation.valid);
    assert!(response
        .sod_signature_validation
        .message
        .contains("could not verify without DSC issuer"));
    // The DG table itself still checks out.
    assert!(response.data_group_validation.valid);
}

#[tokio::test]
async fn tampered_data_group_reports_mismatch() {
    let verifier = Verifier::new(directory_with_csca().await, DitConfig::new(ROOT));
    let response = verifier
        .verify_decoded(
            &testing::sod_cms(),
            &dgs(&[(1, testing::DG1_CONTENT), (2, b"not the face image")]),
        )
        .await;
    assert_eq!(response.status, PaStatus::Invalid);
    assert!(response.certificate_chain_validation.valid);
    assert!(response.sod_signature_validation.valid);
    assert!(!response.data_group_validation.valid);
    assert!(response.data_group_validation.message.contains("DG2_HASH_MISMATCH"));
    assert_eq!(response.data_group_validation.per_dg.get("DG2"), Some(&false));
    assert_eq!(response.data_group_validation.per_dg.get("DG1"), Some(&true));
}

#[tokio::test]
async fn unlisted_data_group_is_not_an_error() {
    let verifier = Verifier::new(directory_with_csca().await, DitConfig::new(ROOT));
    let response = verifier
        .verify_decoded(
            &testing::sod_cms(),
            &dgs(&[(1, testing::DG1_CONTENT), (14, b"chip security infos")]),
        )
        .await;
    assert_eq!(response.status, PaStatus::Valid);
    assert!(!response.data_group_validation.per_dg.contains_key("DG14"));
}

#[tokio::test]
async fn malformed_sod_is_an_error_status() {
    let verifier = Verifier::new(directory_with_csca().await, DitConfig::new(ROOT));
    let response =
        verifier.verify_decoded(&[0x04, 0x02, 0xAA, 0xBB], &dgs(&[(1, b"x")])).await;
    assert_eq!(response.status, PaStatus::Error);
}

#[tokio::test]
async fn transport_request_decodes_and_verifies() {
    use base64::engine::general_purpose::STANDARD as BASE64;
    use base64::Engine as _;

    let verifier = Verifier::new(directory_with_csca().await, DitConfig::new(ROOT));
    let request = serde_json::from_value::<passive_auth::PaRequest>(serde_json::json!({
        "issuingCountry": "UT",
        "documentNumber": "M12345678",
        "sod": BASE64.encode(testing::sod_cms()),
        "dataGroups": {
            "DG1": BASE64.encode(testing::DG1_CONTENT),
            "DG2": BASE64.encode(testing::DG2_CONTENT),
        },
    }))
    .unwrap();
    let response = verifier.verify(&request).await.unwrap();
    assert_eq!(response.status, PaStatus::Valid);

    let mut bad = request.clone();
    bad.issuing_country = "utopia".into();
    assert!(verifier.verify(&bad).await.is_err());
}

#[tokio::test]
async fn response_serializes_with_wire_field_names() {
    let verifier = Verifier::new(directory_with_csca().await, DitConfig::new(ROOT));
    let response = verifier
        .verify_decoded(&testing::sod_cms(), &dgs(&[(1, testing::DG1_CONTENT)]))
        .await;
    let json = serde_json::to_value(&response).unwrap();
    assert_eq!(json["status"], "VALID");
    assert!(json["certificateChainValidation"]["valid"].as_bool().unwrap());
    assert!(json["dataGroupValidation"]["perDg"]["DG1"].as_bool().unwrap());
}
