//! Transport-level request DTO and its validation rules.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::collections::BTreeMap;
use thiserror::Error;

static COUNTRY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Z]{2,3}$").expect("country regex"));
static DG_KEY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^DG([1-9]|1[0-6])$").expect("dg key regex"));

/// Body of a verification request.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaRequest {
    /// Two- or three-letter uppercase issuing country.
    pub issuing_country: String,
    #[serde(default)]
    pub document_number: Option<String>,
    /// Base64 DER SOD.
    pub sod: String,
    /// `"DG1"`-style keys to base64 contents; at least one required.
    pub data_groups: BTreeMap<String, String>,
}

/// Request rejection reasons (HTTP 400 material).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    #[error("issuingCountry must be 2 or 3 uppercase letters")]
    BadCountry,
    #[error("sod is required")]
    MissingSod,
    #[error("sod is not valid base64")]
    BadSodEncoding,
    #[error("at least one data group is required")]
    NoDataGroups,
    #[error("data group key {0} does not match DG1..DG16")]
    BadDataGroupKey(String),
    #[error("data group {0} is not valid base64")]
    BadDataGroupEncoding(String),
}

/// A request with payloads decoded.
#[derive(Debug, Clone)]
pub struct DecodedRequest {
    pub sod: Vec<u8>,
    /// DG number to raw content.
    pub data_groups: BTreeMap<u8, Vec<u8>>,
}

impl PaRequest {
    /// Validate field shapes and decode the base64 payloads.
    pub fn decode(&self) -> Result<DecodedRequest, RequestError> {
        if !COUNTRY_RE.is_match(&self.issuing_country) {
            return Err(RequestError::BadCountry);
        }
        if self.sod.trim().is_empty() {
            return Err(RequestError::MissingSod);
        }
        if self.data_groups.is_empty() {
            return Err(RequestError::NoDataGroups);
        }
        let sod = BASE64
            .decode(self.sod.trim().as_bytes())
            .map_err(|_| RequestError::BadSodEncoding)?;
        let mut data_groups = BTreeMap::new();
        for (key, value) in &self.data_groups {
            let caps = DG_KEY_RE
                .captures(key)
                .ok_or_else(|| RequestError::BadDataGroupKey(key.clone()))?;
            let number: u8 = caps[1].parse().expect("regex-bounded integer");
            let content = BASE64
                .decode(value.as_bytes())
                .map_err(|_| RequestError::BadDataGroupEncoding(key.clone()))?;
            data_groups.insert(number, content);
        }
        Ok(DecodedRequest { sod, data_groups })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> PaRequest {
        PaRequest {
            issuing_country: "KR".into(),
            document_number: Some("M12345678".into()),
            sod: BASE64.encode(b"sod-bytes"),
            data_groups: BTreeMap::from([("DG1".to_string(), BASE64.encode(b"dg1"))]),
        }
    }

    #[test]
    fn well_formed_request_decodes() {
        let d = request().decode().unwrap();
        assert_eq!(d.data_groups.get(&1).map(Vec::as_slice), Some(&b"dg1"[..]));
        assert_eq!(d.sod, b"sod-bytes");
    }

    #[test]
    fn country_shape_enforced() {
        for bad in ["K", "kr", "KORX", "K1"] {
            let mut r = request();
            r.issuing_country = bad.into();
            assert_eq!(r.decode().unwrap_err(), RequestError::BadCountry);
        }
        for good in ["KR", "KOR"] {
            let mut r = request();
            r.issuing_country = good.into();
            assert!(r.decode().is_ok());
        }
    }

    #[test]
    fn dg_keys_bounded_one_to_sixteen() {
        for bad in ["DG0", "DG17", "dg1", "DG"] {
            let mut r = request();
            r.data_groups = BTreeMap::from([(bad.to_string(), BASE64.encode(b"x"))]);
            assert!(matches!(r.decode().unwrap_err(), RequestError::BadDataGroupKey(_)));
        }
        let mut r = request();
        r.data_groups = BTreeMap::from([("DG16".to_string(), BASE64.encode(b"x"))]);
        assert_eq!(r.decode().unwrap().data_groups.keys().copied().collect::<Vec<_>>(), vec![16]);
    }

    #[test]
    fn sod_and_dgs_required() {
        let mut r = request();
        r.sod = "  ".into();
        assert_eq!(r.decode().unwrap_err(), RequestError::MissingSod);

        let mut r = request();
        r.data_groups.clear();
        assert_eq!(r.decode().unwrap_err(), RequestError::NoDataGroups);

        let mut r = request();
        r.sod = "!!not base64!!".into();
        assert_eq!(r.decode().unwrap_err(), RequestError::BadSodEncoding);
    }
}
