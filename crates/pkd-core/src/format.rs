//! Upload format detection.

use crate::entity::FileFormat;

/// How many leading bytes [`detect`] inspects.
pub const SNIFF_LEN: usize = 64;

/// Detect the file format from the name and the leading bytes.
///
/// `icaopkd-001-*.ml` is the ICAO master list naming scheme; `*.ldif`
/// must additionally start with printable ASCII and a `dn:` or
/// `version:` line. Anything else is rejected by the caller.
pub fn detect(file_name: &str, leading: &[u8]) -> Option<FileFormat> {
    let lower = file_name.to_ascii_lowercase();
    if lower.starts_with("icaopkd-001-") && lower.ends_with(".ml") {
        return Some(FileFormat::MasterList);
    }
    if lower.ends_with(".ldif") && looks_like_ldif(leading) {
        return Some(FileFormat::Ldif);
    }
    None
}

fn looks_like_ldif(leading: &[u8]) -> bool {
    let head = &leading[..leading.len().min(SNIFF_LEN)];
    if !head.iter().all(|b| b.is_ascii_graphic() || b" \t\r\n".contains(b)) {
        return false;
    }
    let text = String::from_utf8_lossy(head);
    text.lines()
        .map(str::trim_start)
        .find(|l| !l.is_empty() && !l.starts_with('#'))
        .is_some_and(|l| l.starts_with("dn:") || l.starts_with("version:"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn master_list_by_name() {
        assert_eq!(
            detect("icaopkd-001-ml-000325.ml", &[0x30, 0x82]),
            Some(FileFormat::MasterList)
        );
        assert_eq!(detect("ICAOPKD-001-ML-000001.ML", &[0x30]), Some(FileFormat::MasterList));
    }

    #[test]
    fn ldif_needs_text_prefix() {
        assert_eq!(
            detect("icaopkd-002-dsccrl-006660.ldif", b"dn: dc=data,dc=download\n"),
            Some(FileFormat::Ldif)
        );
        assert_eq!(detect("upload.ldif", b"version: 1\ndn: c=KR\n"), Some(FileFormat::Ldif));
        assert_eq!(detect("upload.ldif", &[0x30, 0x82, 0x01, 0x00]), None);
    }

    #[test]
    fn comments_may_precede_dn() {
        assert_eq!(detect("x.ldif", b"# exported\ndn: c=FR\n"), Some(FileFormat::Ldif));
    }

    #[test]
    fn everything_else_rejected() {
        assert_eq!(detect("certificate.cer", &[0x30]), None);
        assert_eq!(detect("masterlist.ml", &[0x30]), None); // wrong naming scheme
    }
}
