//! Distinguished-name handling.
//!
//! DN strings from different sources (X.509 subjects, LDIF entry DNs,
//! free-form "CSCA-XX" shorthands) are never compared byte-for-byte.
//! [`normalize`] is the sole normalizer and [`extract_country`] the sole
//! country extractor; both are invoked from every site that needs them.

use once_cell::sync::Lazy;
use regex::Regex;

static CSCA_SHORTHAND: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^CSCA-([A-Z]{2})$").expect("csca shorthand regex"));
static COUNTRY_COMPONENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:^|,)\s*C=\s*([A-Za-z]{2,3})\s*(?:,|$)").expect("country component regex")
});

/// Extract an uppercase country code from any DN-bearing string.
///
/// Tried in order: the `CSCA-XX` shorthand, then a `C=` component anywhere
/// in the string (case-insensitive, 2- or 3-letter codes). Returns `None`
/// when neither pattern matches.
pub fn extract_country(input: &str) -> Option<String> {
    if let Some(caps) = CSCA_SHORTHAND.captures(input.trim()) {
        return Some(caps[1].to_string());
    }
    COUNTRY_COMPONENT.captures(input).map(|caps| caps[1].to_ascii_uppercase())
}

/// Split a DN into components on unescaped commas.
///
/// Multi-valued RDNs (joined with `+`) stay inside a single component.
pub fn split_components(dn: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut cur = String::new();
    let mut escaped = false;
    for ch in dn.chars() {
        if escaped {
            cur.push('\\');
            cur.push(ch);
            escaped = false;
        } else if ch == '\\' {
            escaped = true;
        } else if ch == ',' {
            out.push(cur.clone());
            cur.clear();
        } else {
            cur.push(ch);
        }
    }
    if escaped {
        // dangling backslash is kept verbatim
        cur.push('\\');
    }
    out.push(cur);
    out
}

/// Normalize a DN for comparison: attribute types uppercased, whitespace
/// around types and values trimmed, components re-joined with `,`.
///
/// Values keep their case; only structure and type case are canonicalized.
pub fn normalize(dn: &str) -> String {
    let mut parts = Vec::new();
    for comp in split_components(dn) {
        let comp = comp.trim();
        if comp.is_empty() {
            continue;
        }
        match find_unescaped(comp, '=') {
            Some(idx) => {
                let (attr, value) = comp.split_at(idx);
                parts.push(format!(
                    "{}={}",
                    attr.trim().to_ascii_uppercase(),
                    value[1..].trim()
                ));
            }
            None => parts.push(comp.to_string()),
        }
    }
    parts.join(",")
}

/// Compare two DNs after normalization.
pub fn equivalent(a: &str, b: &str) -> bool {
    normalize(a) == normalize(b)
}

fn find_unescaped(s: &str, needle: char) -> Option<usize> {
    let mut escaped = false;
    for (idx, ch) in s.char_indices() {
        if escaped {
            escaped = false;
        } else if ch == '\\' {
            escaped = true;
        } else if ch == needle {
            return Some(idx);
        }
    }
    None
}

/// Characters requiring a backslash escape inside an RDN value (RFC 4514).
const RDN_SPECIALS: &[char] = &[',', '=', '+', '<', '>', '#', ';', '"'];

/// Escape an RDN value for embedding in a DN.
///
/// A single pass over the input escapes backslashes together with the
/// specials, so a `\` in the source can never be double-escaped.
pub fn escape_rdn_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        if ch == '\\' || RDN_SPECIALS.contains(&ch) {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

/// Invert [`escape_rdn_value`].
pub fn unescape_rdn_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut escaped = false;
    for ch in value.chars() {
        if escaped {
            out.push(ch);
            escaped = false;
        } else if ch == '\\' {
            escaped = true;
        } else {
            out.push(ch);
        }
    }
    if escaped {
        out.push('\\');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shorthand_wins() {
        assert_eq!(extract_country("CSCA-KR").as_deref(), Some("KR"));
        assert_eq!(extract_country("  CSCA-DE ").as_deref(), Some("DE"));
    }

    #[test]
    fn country_component_any_case() {
        assert_eq!(extract_country("CN=CSCA,O=Gov,C=KR").as_deref(), Some("KR"));
        assert_eq!(extract_country("cn=x, c=de, o=y").as_deref(), Some("DE"));
        assert_eq!(extract_country("C=usa").as_deref(), Some("USA"));
        assert_eq!(extract_country("CN=no country here"), None);
    }

    #[test]
    fn country_is_component_not_substring() {
        // "DC=..." must not match the C= pattern.
        assert_eq!(extract_country("DC=int,DC=icao"), None);
    }

    #[test]
    fn extraction_is_idempotent() {
        for input in ["CSCA-FR", "CN=x,C=FR,O=y", "no match"] {
            let first = extract_country(input);
            let again = match &first {
                Some(c) => extract_country(&format!("C={c}")),
                None => extract_country(input),
            };
            assert_eq!(first, again);
        }
    }

    #[test]
    fn normalize_types_and_whitespace() {
        assert_eq!(normalize("cn = Foo Bar , c=KR ,o= csca"), "CN=Foo Bar,C=KR,O=csca");
        assert!(equivalent("C=KR,O=dsc", " c = KR , o = dsc"));
    }

    #[test]
    fn normalize_keeps_escaped_commas() {
        let dn = r"CN=ACME\, Inc.,C=US";
        assert_eq!(normalize(dn), r"CN=ACME\, Inc.,C=US");
        assert_eq!(split_components(dn).len(), 2);
    }

    #[test]
    fn escape_then_unescape_is_identity() {
        for raw in [r"plain", r"a,b=c+d", r"back\slash", r#"quo"te;#"#, r"<angles>"] {
            assert_eq!(unescape_rdn_value(&escape_rdn_value(raw)), raw);
        }
    }

    proptest::proptest! {
        #[test]
        fn escape_roundtrips_any_value(raw in "[ -~]{0,64}") {
            proptest::prop_assert_eq!(unescape_rdn_value(&escape_rdn_value(&raw)), raw);
        }

        #[test]
        fn normalize_is_idempotent(dn in "[a-zA-Z0-9 =,+._-]{0,64}") {
            let once = normalize(&dn);
            proptest::prop_assert_eq!(normalize(&once), once.clone());
        }
    }

    #[test]
    fn escape_backslash_single_pass() {
        assert_eq!(escape_rdn_value(r"a\b"), r"a\\b");
        assert_eq!(escape_rdn_value(r"a,b"), r"a\,b");
    }
}
