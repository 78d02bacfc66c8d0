//! Streaming LDIF (RFC 2849) reader and writer.
//!
//! The reader is a single-pass scanner over lines: entries are separated
//! by blank lines, a line starting with a single space continues the
//! previous logical line, and `attr:: value` / `attr;binary:: value`
//! carry base64. Continuation folding is applied *before* base64 decoding
//! so folded binary values reassemble correctly. Memory use stays
//! proportional to one entry, never to the file.

#![deny(unsafe_code)]

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use std::io::BufRead;
use thiserror::Error;

/// Errors from reading or writing LDIF.
#[derive(Debug, Error)]
pub enum LdifError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("entry {index}: {reason}")]
    MalformedEntry { index: usize, reason: String },
    #[error("entry {index}: bad base64 in attribute {attr}")]
    BadBase64 { index: usize, attr: String },
}

/// One attribute value: textual, or binary when base64-encoded in source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttrValue {
    Text(String),
    Binary(Vec<u8>),
}

impl AttrValue {
    /// Binary bytes, when this value is binary.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            AttrValue::Binary(b) => Some(b),
            AttrValue::Text(_) => None,
        }
    }

    /// Textual value, when this value is text.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            AttrValue::Text(t) => Some(t),
            AttrValue::Binary(_) => None,
        }
    }
}

/// A parsed LDIF entry: a DN plus its attributes in source order.
///
/// Attribute names keep their transfer option (`userCertificate;binary`)
/// exactly as written; lookups compare case-insensitively.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Entry {
    pub dn: String,
    pub attrs: Vec<(String, AttrValue)>,
}

impl Entry {
    /// First value of the named attribute (ASCII case-insensitive match).
    pub fn get(&self, name: &str) -> Option<&AttrValue> {
        self.attrs.iter().find(|(n, _)| n.eq_ignore_ascii_case(name)).map(|(_, v)| v)
    }

    /// First binary value among the given attribute names.
    pub fn first_binary_of(&self, names: &[&str]) -> Option<(&str, &[u8])> {
        for (n, v) in &self.attrs {
            if names.iter().any(|want| n.eq_ignore_ascii_case(want)) {
                if let AttrValue::Binary(b) = v {
                    return Some((n.as_str(), b.as_slice()));
                }
            }
        }
        None
    }
}

/// Streaming reader yielding one [`Entry`] per record.
///
/// Iteration yields `Err` for a malformed record and then continues with
/// the next one, so callers can accumulate per-entry faults without
/// aborting the scan.
pub struct Reader<R: BufRead> {
    src: std::io::Lines<R>,
    /// Logical (unfolded) lines of the record being assembled.
    pending: Vec<String>,
    entry_index: usize,
    done: bool,
}

impl<R: BufRead> Reader<R> {
    /// Wrap a buffered source.
    pub fn new(src: R) -> Self {
        Self { src: src.lines(), pending: Vec::new(), entry_index: 0, done: false }
    }

    /// Index of the next entry to be returned.
    pub fn entry_index(&self) -> usize {
        self.entry_index
    }

    fn take_record(&mut self) -> Result<Option<Vec<String>>, std::io::Error> {
        loop {
            match self.src.next() {
                Some(Ok(line)) => {
                    let line = line.strip_suffix('\r').map(str::to_owned).unwrap_or(line);
                    if line.is_empty() {
                        if self.pending.is_empty() {
                            continue; // leading blank lines
                        }
                        return Ok(Some(std::mem::take(&mut self.pending)));
                    }
                    if let Some(cont) = line.strip_prefix(' ') {
                        // Continuation of the previous logical line; a fold
                        // with nothing before it is kept as its own line and
                        // reported as malformed by the record parser.
                        match self.pending.last_mut() {
                            Some(prev) => prev.push_str(cont),
                            None => self.pending.push(cont.to_string()),
                        }
                    } else {
                        self.pending.push(line);
                    }
                }
                Some(Err(e)) => return Err(e),
                None => {
                    self.done = true;
                    if self.pending.is_empty() {
                        return Ok(None);
                    }
                    return Ok(Some(std::mem::take(&mut self.pending)));
                }
            }
        }
    }

    fn parse_record(&self, index: usize, lines: Vec<String>) -> Result<Entry, LdifError> {
        let mut entry = Entry::default();
        let mut saw_dn = false;
        for line in lines {
            if line.starts_with('#') {
                continue;
            }
            // `version: 1` headers appear before the first entry.
            if !saw_dn && line.starts_with("version:") {
                continue;
            }
            let (name, rest) = line.split_once(':').ok_or_else(|| LdifError::MalformedEntry {
                index,
                reason: format!("attribute line without separator: {line:.40}"),
            })?;
            let name = name.trim();
            if name.is_empty() {
                return Err(LdifError::MalformedEntry {
                    index,
                    reason: "empty attribute name".into(),
                });
            }
            let value = if let Some(b64) = rest.strip_prefix(':') {
                let decoded = BASE64.decode(b64.trim().as_bytes()).map_err(|_| {
                    LdifError::BadBase64 { index, attr: name.to_string() }
                })?;
                AttrValue::Binary(decoded)
            } else {
                AttrValue::Text(rest.trim_start().to_string())
            };
            if name.eq_ignore_ascii_case("dn") {
                entry.dn = match &value {
                    AttrValue::Text(t) => t.clone(),
                    // dn:: base64 of a UTF-8 DN
                    AttrValue::Binary(b) => String::from_utf8_lossy(b).into_owned(),
                };
                saw_dn = true;
            } else {
                entry.attrs.push((name.to_string(), value));
            }
        }
        if !saw_dn {
            return Err(LdifError::MalformedEntry { index, reason: "record without dn".into() });
        }
        Ok(entry)
    }
}

impl<R: BufRead> Iterator for Reader<R> {
    type Item = Result<Entry, LdifError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done && self.pending.is_empty() {
            return None;
        }
        let record = match self.take_record() {
            Ok(Some(lines)) => lines,
            Ok(None) => return None,
            Err(e) => return Some(Err(e.into())),
        };
        let index = self.entry_index;
        self.entry_index += 1;
        // Records holding only comments or a version header are skipped.
        if record.iter().all(|l| l.starts_with('#') || l.starts_with("version:")) {
            self.entry_index -= 1;
            return self.next();
        }
        Some(self.parse_record(index, record))
    }
}

/// RFC 2849 says to wrap long lines; 76 columns matches common exporters.
const WRAP_COLUMN: usize = 76;

/// Serialize one entry, folding long and base64 lines at [`WRAP_COLUMN`].
pub fn write_entry(out: &mut String, entry: &Entry) {
    push_folded(out, &format!("dn: {}", entry.dn));
    for (name, value) in &entry.attrs {
        match value {
            AttrValue::Text(t) => push_folded(out, &format!("{name}: {t}")),
            AttrValue::Binary(b) => {
                push_folded(out, &format!("{name}:: {}", BASE64.encode(b)));
            }
        }
    }
    out.push('\n');
}

fn push_folded(out: &mut String, logical: &str) {
    let mut chars = logical.chars();
    let first: String = chars.by_ref().take(WRAP_COLUMN).collect();
    out.push_str(&first);
    out.push('\n');
    let mut rest: Vec<char> = chars.collect();
    while !rest.is_empty() {
        let take = rest.len().min(WRAP_COLUMN - 1);
        out.push(' ');
        out.extend(rest.drain(..take));
        out.push('\n');
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn read_all(src: &str) -> Vec<Result<Entry, LdifError>> {
        Reader::new(Cursor::new(src.as_bytes())).collect()
    }

    #[test]
    fn two_entries_blank_separated() {
        let src = "dn: c=KR,dc=data\nobjectClass: country\n\ndn: c=DE,dc=data\nobjectClass: country\n";
        let entries: Vec<_> = read_all(src).into_iter().map(Result::unwrap).collect();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].dn, "c=KR,dc=data");
        assert_eq!(entries[1].get("objectClass").unwrap().as_text(), Some("country"));
    }

    #[test]
    fn continuation_lines_fold_before_decode() {
        // "hello world" base64 split across a folded line.
        let b64 = BASE64.encode(b"hello world");
        let (a, b) = b64.split_at(6);
        let src = format!("dn: cn=x\nuserCertificate;binary:: {a}\n {b}\n");
        let entries: Vec<_> = read_all(&src).into_iter().map(Result::unwrap).collect();
        let (_, bytes) =
            entries[0].first_binary_of(&["userCertificate;binary"]).expect("binary attr");
        assert_eq!(bytes, b"hello world");
    }

    #[test]
    fn bad_base64_is_an_entry_error_not_a_stop() {
        let src = "dn: cn=bad\ncACertificate;binary:: !!!!\n\ndn: cn=good\ndescription: ok\n";
        let results = read_all(src);
        assert_eq!(results.len(), 2);
        assert!(matches!(results[0], Err(LdifError::BadBase64 { index: 0, .. })));
        assert_eq!(results[1].as_ref().unwrap().dn, "cn=good");
    }

    #[test]
    fn version_header_and_comments_skipped() {
        let src = "version: 1\n\n# a comment\n\ndn: cn=x\ndescription: y\n";
        let entries: Vec<_> = read_all(src).into_iter().map(Result::unwrap).collect();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].dn, "cn=x");
    }

    #[test]
    fn record_without_dn_is_malformed() {
        let src = "description: lonely\n";
        let results = read_all(src);
        assert!(matches!(results[0], Err(LdifError::MalformedEntry { .. })));
    }

    #[test]
    fn crlf_input_accepted() {
        let src = "dn: cn=x\r\ndescription: y\r\n\r\n";
        let entries: Vec<_> = read_all(src).into_iter().map(Result::unwrap).collect();
        assert_eq!(entries[0].get("description").unwrap().as_text(), Some("y"));
    }

    #[test]
    fn writer_reader_roundtrip_preserves_bytes() {
        let der: Vec<u8> = (0u16..600).map(|i| (i % 251) as u8).collect();
        let entry = Entry {
            dn: "cn=O=Gov\\, CN=CSCA+sn=1A2B,o=csca,c=KR,dc=data".into(),
            attrs: vec![
                ("objectClass".into(), AttrValue::Text("pkdDownload".into())),
                ("userCertificate;binary".into(), AttrValue::Binary(der.clone())),
            ],
        };
        let mut out = String::new();
        write_entry(&mut out, &entry);
        let entries: Vec<_> = read_all(&out).into_iter().map(Result::unwrap).collect();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].dn, entry.dn);
        let (_, bytes) =
            entries[0].first_binary_of(&["userCertificate;binary"]).expect("binary attr");
        assert_eq!(bytes, der.as_slice());
    }

    proptest::proptest! {
        #[test]
        fn arbitrary_binary_roundtrips(der in proptest::collection::vec(proptest::prelude::any::<u8>(), 0..2048)) {
            let entry = Entry {
                dn: "cn=prop,o=dsc,c=FR,dc=data".into(),
                attrs: vec![("userCertificate;binary".into(), AttrValue::Binary(der.clone()))],
            };
            let mut out = String::new();
            write_entry(&mut out, &entry);
            let reread = read_all(&out).pop().unwrap().unwrap();
            let (_, bytes) = reread.first_binary_of(&["userCertificate;binary"]).unwrap();
            proptest::prop_assert_eq!(bytes, der.as_slice());
        }
    }

    #[test]
    fn folded_output_stays_under_wrap() {
        let entry = Entry {
            dn: "cn=x".into(),
            attrs: vec![("a".into(), AttrValue::Binary(vec![0xAB; 300]))],
        };
        let mut out = String::new();
        write_entry(&mut out, &entry);
        assert!(out.lines().all(|l| l.chars().count() <= WRAP_COLUMN));
    }
}
