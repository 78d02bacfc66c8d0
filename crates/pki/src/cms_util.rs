//! Shared CMS SignedData plumbing for the Master List and the SOD.

use crate::cert::ParsedCert;
use crate::{digest, verify, PkiError};
use cms::cert::CertificateChoices;
use cms::content_info::ContentInfo;
use cms::signed_data::{SignedData, SignerIdentifier, SignerInfo};
use der::asn1::{ObjectIdentifier as Oid, OctetString};
use der::{Decode, Encode};

/// id-signedData (RFC 5652).
pub const OID_SIGNED_DATA: Oid = Oid::new_unwrap("1.2.840.113549.1.7.2");
/// id-messageDigest signed attribute.
pub const OID_MESSAGE_DIGEST: Oid = Oid::new_unwrap("1.2.840.113549.1.9.4");

/// Decode an outer ContentInfo and require a SignedData payload.
pub fn decode_signed_data(bytes: &[u8]) -> Result<SignedData, PkiError> {
    let ci =
        ContentInfo::from_der(bytes).map_err(|e| PkiError::MalformedCms(e.to_string()))?;
    if ci.content_type != OID_SIGNED_DATA {
        return Err(PkiError::MalformedCms(format!(
            "content type {} is not signedData",
            ci.content_type
        )));
    }
    ci.content.decode_as::<SignedData>().map_err(|e| PkiError::MalformedCms(e.to_string()))
}

/// The encapsulated content bytes (inner OCTET STRING payload).
pub fn encapsulated_bytes(sd: &SignedData) -> Result<Vec<u8>, PkiError> {
    let econtent = sd
        .encap_content_info
        .econtent
        .as_ref()
        .ok_or_else(|| PkiError::MalformedCms("detached content".into()))?;
    let octets = econtent
        .decode_as::<OctetString>()
        .map_err(|e| PkiError::MalformedCms(e.to_string()))?;
    Ok(octets.as_bytes().to_vec())
}

/// The first SignerInfo; ICAO containers carry exactly one.
pub fn first_signer(sd: &SignedData) -> Result<&SignerInfo, PkiError> {
    sd.signer_infos
        .0
        .iter()
        .next()
        .ok_or_else(|| PkiError::MalformedCms("no signer info".into()))
}

/// Resolve the signer's certificate from the embedded set by matching
/// the SignerIdentifier (issuer + serial, or subject key id is not
/// supported by the PKD population and treated as absent).
pub fn resolve_signer_cert(sd: &SignedData) -> Result<Vec<u8>, PkiError> {
    let signer = first_signer(sd)?;
    let SignerIdentifier::IssuerAndSerialNumber(want) = &signer.sid else {
        return Err(PkiError::NoSignerCert);
    };
    let want_issuer =
        want.issuer.to_der().map_err(|e| PkiError::MalformedCms(e.to_string()))?;
    if let Some(set) = &sd.certificates {
        for choice in set.0.iter() {
            if let CertificateChoices::Certificate(cert) = choice {
                let issuer = cert
                    .tbs_certificate
                    .issuer
                    .to_der()
                    .map_err(|e| PkiError::MalformedCms(e.to_string()))?;
                if issuer == want_issuer
                    && cert.tbs_certificate.serial_number == want.serial_number
                {
                    return cert.to_der().map_err(|e| PkiError::MalformedCms(e.to_string()));
                }
            }
        }
    }
    Err(PkiError::NoSignerCert)
}

/// Verify the SignedData signature against the signer certificate.
///
/// With signed attributes present (the normal shape), the messageDigest
/// attribute must equal the hash of the encapsulated content, and the
/// signature covers the DER of the attribute SET. Without attributes the
/// signature covers the content directly.
pub fn verify_signer(sd: &SignedData, signer_cert: &ParsedCert) -> Result<(), PkiError> {
    let signer = first_signer(sd)?;
    let content = encapsulated_bytes(sd)?;
    let digest_oid = signer.digest_alg.oid.to_string();
    let message: Vec<u8> = match &signer.signed_attrs {
        Some(attrs) => {
            let want_digest = message_digest_attr(signer)?;
            let got_digest = digest::compute(&digest_oid, &content)?;
            if want_digest != got_digest {
                return Err(PkiError::DigestMismatch);
            }
            attrs.to_der().map_err(|e| PkiError::MalformedCms(e.to_string()))?
        }
        None => content,
    };
    let alg = verify::cms_algorithm_for(
        &signer.signature_algorithm.oid.to_string(),
        &digest_oid,
    )?;
    ring::signature::UnparsedPublicKey::new(alg, &signer_cert.public_key_der)
        .verify(&message, signer.signature.as_bytes())
        .map_err(|_| PkiError::SignatureInvalid)
}

fn message_digest_attr(signer: &SignerInfo) -> Result<Vec<u8>, PkiError> {
    let attrs = signer
        .signed_attrs
        .as_ref()
        .ok_or_else(|| PkiError::MalformedCms("no signed attributes".into()))?;
    for attr in attrs.iter() {
        if attr.oid == OID_MESSAGE_DIGEST {
            let value = attr
                .values
                .iter()
                .next()
                .ok_or_else(|| PkiError::MalformedCms("empty messageDigest".into()))?;
            let octets = value
                .decode_as::<OctetString>()
                .map_err(|e| PkiError::MalformedCms(e.to_string()))?;
            return Ok(octets.as_bytes().to_vec());
        }
    }
    Err(PkiError::MalformedCms("messageDigest attribute missing".into()))
}
