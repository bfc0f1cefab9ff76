//! Well-formedness check for the XML payload.
//!
//! quick-xml is a streaming tokenizer. It happily reports events for
//! documents that are cut short, have several roots, use names that are not
//! XML names or put `--` inside a comment. Those rules are enforced here on
//! top of its events, after the payload has been decoded to UTF-8 according
//! to its byte order mark or XML declaration.

use crate::{ConvertError, Result};
use encoding_rs::{Encoding, UTF_16BE, UTF_16LE, UTF_8};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::borrow::Cow;
use std::collections::{HashMap, HashSet};
use std::fmt::Display;

/// Returns `Ok(())` when `data` is a well-formed XML document.
///
/// The encoding is taken from a byte order mark, then from the XML
/// declaration, and defaults to UTF-8. General entities declared in an
/// internal DTD subset are resolved; references to external entities are
/// rejected.
///
/// Failures carry a 1-based line/column position of the problem.
pub(crate) fn check_well_formed(data: &[u8]) -> Result<()> {
    let text = decode(data)?;
    check_characters(&text)?;
    Scanner::new(&text).run()
}

// ── Decoding ──────────────────────────────────────────────────────────────────

fn decode(data: &[u8]) -> Result<Cow<'_, str>> {
    if let Some((encoding, bom_length)) = Encoding::for_bom(data) {
        return decode_as(encoding, &data[bom_length..]);
    }
    // UTF-16 without a byte order mark still starts with `<?`.
    if data.starts_with(&[b'<', 0, b'?', 0]) {
        return decode_as(UTF_16LE, data);
    }
    if data.starts_with(&[0, b'<', 0, b'?']) {
        return decode_as(UTF_16BE, data);
    }

    match declared_encoding(data)? {
        Some(encoding) if !encoding.is_ascii_compatible() => Err(syntax_error(
            data,
            0,
            format!("document declares {} but is not encoded in it", encoding.name()),
        )),
        Some(encoding) => decode_as(encoding, data),
        None => decode_as(UTF_8, data),
    }
}

/// The `encoding` pseudo-attribute of a leading XML declaration.
fn declared_encoding(data: &[u8]) -> Result<Option<&'static Encoding>> {
    let mut reader = Reader::from_reader(data);
    let Ok(Event::Decl(decl)) = reader.read_event() else {
        return Ok(None);
    };
    let Some(label) = decl.encoding() else {
        return Ok(None);
    };
    let label = label.map_err(|e| syntax_error(data, 0, e.to_string()))?;

    Encoding::for_label(&label).map(Some).ok_or_else(|| {
        syntax_error(
            data,
            0,
            format!("unsupported encoding {:?}", String::from_utf8_lossy(&label)),
        )
    })
}

fn decode_as<'a>(encoding: &'static Encoding, bytes: &'a [u8]) -> Result<Cow<'a, str>> {
    if encoding == UTF_8 {
        return std::str::from_utf8(bytes)
            .map(Cow::Borrowed)
            .map_err(|e| syntax_error(bytes, e.valid_up_to(), format!("invalid UTF-8: {e}")));
    }
    encoding
        .decode_without_bom_handling_and_without_replacement(bytes)
        .ok_or_else(|| syntax_error(bytes, 0, format!("input is not valid {}", encoding.name())))
}

/// Every character must be an XML `Char`.
fn check_characters(text: &str) -> Result<()> {
    match text.char_indices().find(|&(_, c)| !is_xml_char(c)) {
        Some((offset, c)) => Err(syntax_error(
            text.as_bytes(),
            offset,
            format!("character U+{:04X} is not allowed in XML", c as u32),
        )),
        None => Ok(()),
    }
}

// ── Scanner ───────────────────────────────────────────────────────────────────

/// Document-level rules on top of the quick-xml token stream.
struct Scanner<'a> {
    text: &'a str,
    entities: HashMap<String, String>,
    external_entities: HashSet<String>,
    /// Namespace prefixes declared by each open element.
    scopes: Vec<Vec<String>>,
}

impl<'a> Scanner<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            text,
            entities: HashMap::new(),
            external_entities: HashSet::new(),
            scopes: Vec::new(),
        }
    }

    fn run(mut self) -> Result<()> {
        let mut reader = Reader::from_reader(self.text.as_bytes());
        let mut seen_root = false;
        let mut first_event = true;

        loop {
            let start = reader.buffer_position();
            let event = reader
                .read_event()
                .map_err(|e| self.error(reader.buffer_position(), e))?;
            let is_first = std::mem::replace(&mut first_event, false);

            match event {
                Event::Decl(_) if !is_first => {
                    return Err(self.error(start, "XML declaration not at start of document"));
                }
                Event::DocType(ref doctype) => {
                    if seen_root {
                        return Err(self.error(start, "DOCTYPE after the root element"));
                    }
                    self.declare_entities(&String::from_utf8_lossy(doctype));
                }
                Event::Start(ref tag) | Event::Empty(ref tag) => {
                    if self.scopes.is_empty() {
                        if seen_root {
                            return Err(self.error(start, "junk after document element"));
                        }
                        seen_root = true;
                    }
                    let declared = self.check_tag(start, tag)?;
                    if let Event::Start(_) = event {
                        self.scopes.push(declared);
                    }
                }
                Event::End(_) => {
                    if self.scopes.pop().is_none() {
                        return Err(self.error(start, "closing tag without an open element"));
                    }
                }
                Event::Text(ref text) => {
                    if self.scopes.is_empty() {
                        if !text.iter().all(u8::is_ascii_whitespace) {
                            return Err(self.error(start, "text outside the root element"));
                        }
                    } else {
                        if text.windows(3).any(|w| w == b"]]>") {
                            return Err(self.error(start, "']]>' is not allowed in character data"));
                        }
                        if let Err(e) = text.unescape_with(|name| self.resolve_entity(name)) {
                            return Err(self.error(start, self.reference_error(text, e)));
                        }
                    }
                }
                Event::CData(_) if self.scopes.is_empty() => {
                    return Err(self.error(start, "CDATA outside the root element"));
                }
                Event::Comment(ref comment) => {
                    if comment.windows(2).any(|w| w == b"--") || comment.ends_with(b"-") {
                        return Err(self.error(start, "'--' is not allowed inside a comment"));
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if !self.scopes.is_empty() {
            return Err(self.error(self.text.len(), "unclosed element at end of input"));
        }
        if !seen_root {
            return Err(self.error(self.text.len(), "no root element"));
        }

        Ok(())
    }

    /// Names must be XML names, attributes well-formed, unique and free of a
    /// raw `<`, and every prefix bound. Returns the prefixes the tag declares.
    fn check_tag(&self, position: usize, tag: &BytesStart<'_>) -> Result<Vec<String>> {
        let name = String::from_utf8_lossy(tag.name().as_ref()).into_owned();
        check_qualified_name(&name).map_err(|m| self.error(position, m))?;

        let mut declared = Vec::new();
        let mut prefixed = Vec::new();

        for attribute in tag.attributes() {
            let attribute = attribute.map_err(|e| self.error(position, e))?;
            let key = String::from_utf8_lossy(attribute.key.as_ref()).into_owned();
            check_qualified_name(&key).map_err(|m| self.error(position, m))?;

            if attribute.value.contains(&b'<') {
                return Err(self.error(
                    position,
                    format!("'<' is not allowed in the value of attribute {key}"),
                ));
            }
            if let Err(e) = attribute.unescape_value_with(|name| self.resolve_entity(name)) {
                return Err(self.error(position, self.reference_error(&attribute.value, e)));
            }

            match key.split_once(':') {
                Some(("xmlns", prefix)) => declared.push(prefix.to_owned()),
                Some((prefix, _)) => prefixed.push(prefix.to_owned()),
                None => {}
            }
        }

        let element_prefix = name.split_once(':').map(|(prefix, _)| prefix.to_owned());
        for prefix in element_prefix.iter().chain(&prefixed) {
            let bound = prefix == "xml"
                || declared.contains(prefix)
                || self.scopes.iter().any(|scope| scope.contains(prefix));
            if !bound {
                return Err(self.error(position, format!("unbound namespace prefix {prefix:?}")));
            }
        }

        Ok(declared)
    }

    /// Collect `<!ENTITY name "value">` declarations from a DOCTYPE. The
    /// first declaration of a name wins; parameter entities are ignored.
    fn declare_entities(&mut self, doctype: &str) {
        let mut rest = doctype;
        while let Some(at) = rest.find("<!ENTITY") {
            rest = rest[at + "<!ENTITY".len()..].trim_start();
            if rest.starts_with('%') {
                continue;
            }

            let name_end = rest
                .find(|c: char| c.is_ascii_whitespace())
                .unwrap_or(rest.len());
            let name = rest[..name_end].to_owned();
            rest = rest[name_end..].trim_start();

            match rest.chars().next() {
                Some(quote @ ('"' | '\'')) => {
                    let Some(close) = rest[1..].find(quote) else { break };
                    let value = rest[1..=close].to_owned();
                    self.entities.entry(name).or_insert(value);
                    rest = &rest[close + 2..];
                }
                _ => {
                    self.external_entities.insert(name);
                }
            }
        }
    }

    fn resolve_entity(&self, name: &str) -> Option<&str> {
        match name {
            "amp" => Some("&"),
            "lt" => Some("<"),
            "gt" => Some(">"),
            "apos" => Some("'"),
            "quot" => Some("\""),
            _ => self.entities.get(name).map(String::as_str),
        }
    }

    /// Name the external entity when that is what failed to resolve.
    fn reference_error(&self, raw: &[u8], error: impl Display) -> String {
        self.external_entities
            .iter()
            .find(|name| {
                let reference = format!("&{name};");
                raw.windows(reference.len()).any(|w| w == reference.as_bytes())
            })
            .map(|name| format!("external entity &{name}; cannot be resolved"))
            .unwrap_or_else(|| error.to_string())
    }

    fn error(&self, offset: usize, message: impl Display) -> ConvertError {
        syntax_error(self.text.as_bytes(), offset, message.to_string())
    }
}

// ── Names and characters ──────────────────────────────────────────────────────

/// `Name`, and in namespace terms at most one `:` with both sides non-empty.
fn check_qualified_name(name: &str) -> std::result::Result<(), String> {
    if !is_xml_name(name) {
        return Err(format!("{name:?} is not a valid XML name"));
    }
    let mut parts = name.split(':');
    let well_qualified = match (parts.next(), parts.next(), parts.next()) {
        (Some(_), None, None) => true,
        (Some(prefix), Some(local), None) => !prefix.is_empty() && !local.is_empty(),
        _ => false,
    };
    if !well_qualified {
        return Err(format!("{name:?} is not a valid qualified name"));
    }
    Ok(())
}

fn is_xml_name(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if is_name_start_char(c)) && chars.all(is_name_char)
}

fn is_name_start_char(c: char) -> bool {
    matches!(c,
        ':' | 'A'..='Z' | '_' | 'a'..='z'
        | '\u{C0}'..='\u{D6}' | '\u{D8}'..='\u{F6}' | '\u{F8}'..='\u{2FF}'
        | '\u{370}'..='\u{37D}' | '\u{37F}'..='\u{1FFF}' | '\u{200C}'..='\u{200D}'
        | '\u{2070}'..='\u{218F}' | '\u{2C00}'..='\u{2FEF}' | '\u{3001}'..='\u{D7FF}'
        | '\u{F900}'..='\u{FDCF}' | '\u{FDF0}'..='\u{FFFD}' | '\u{10000}'..='\u{EFFFF}')
}

fn is_name_char(c: char) -> bool {
    is_name_start_char(c)
        || matches!(c, '-' | '.' | '0'..='9' | '\u{B7}' | '\u{300}'..='\u{36F}' | '\u{203F}'..='\u{2040}')
}

fn is_xml_char(c: char) -> bool {
    matches!(c,
        '\t' | '\n' | '\r'
        | '\u{20}'..='\u{D7FF}' | '\u{E000}'..='\u{FFFD}' | '\u{10000}'..='\u{10FFFF}')
}

// ── Positions ─────────────────────────────────────────────────────────────────

fn syntax_error(data: &[u8], offset: usize, message: impl Into<String>) -> ConvertError {
    let (line, column) = line_column(data, offset);
    ConvertError::InvalidAttachment {
        line,
        column,
        message: message.into(),
    }
}

/// Convert a byte offset into a 1-based line and a 1-based column counted in
/// characters.
fn line_column(data: &[u8], offset: usize) -> (usize, usize) {
    let prefix = &data[..offset.min(data.len())];
    let line = prefix.iter().filter(|&&b| b == b'\n').count() + 1;
    let line_start = prefix.iter().rposition(|&b| b == b'\n').map_or(0, |newline| newline + 1);
    // UTF-8 continuation bytes do not start a character.
    let column = prefix[line_start..]
        .iter()
        .filter(|&&b| b & 0xC0 != 0x80)
        .count()
        + 1;
    (line, column)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn position(err: ConvertError) -> (usize, usize) {
        match err {
            ConvertError::InvalidAttachment { line, column, .. } => (line, column),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    fn message(err: ConvertError) -> String {
        match err {
            ConvertError::InvalidAttachment { message, .. } => message,
            other => panic!("unexpected error: {other:?}"),
        }
    }

    fn utf16le(text: &str) -> Vec<u8> {
        let mut bytes = vec![0xFF, 0xFE];
        for unit in text.encode_utf16() {
            bytes.extend_from_slice(&unit.to_le_bytes());
        }
        bytes
    }

    #[test]
    fn accepts_invoice() {
        assert!(check_well_formed(b"<Invoice><Id>1</Id></Invoice>").is_ok());
    }

    #[test]
    fn accepts_prolog_comments_and_trailing_whitespace() {
        let xml = b"<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<!-- cii -->\n<rsm:CrossIndustryInvoice xmlns:rsm=\"urn:x\">\n  <a b=\"1 &amp; 2\"/>\n</rsm:CrossIndustryInvoice>\n";
        assert!(check_well_formed(xml).is_ok());
    }

    #[test]
    fn rejects_empty_input() {
        let (line, column) = position(check_well_formed(b"").unwrap_err());
        assert_eq!((line, column), (1, 1));
    }

    #[test]
    fn rejects_whitespace_only_input() {
        assert!(check_well_formed(b"  \n ").is_err());
    }

    #[test]
    fn rejects_unclosed_tag_with_position() {
        let err = check_well_formed(b"<Invoice>\n<Id>1</Id>\n").unwrap_err();
        assert_eq!(position(err), (3, 1));
    }

    #[test]
    fn rejects_mismatched_tags() {
        let err = check_well_formed(b"<a>\n  <b>\n</a>").unwrap_err();
        assert_eq!(position(err).0, 3);
    }

    #[test]
    fn rejects_two_roots() {
        assert!(check_well_formed(b"<a/><b/>").is_err());
    }

    #[test]
    fn rejects_text_outside_root() {
        assert!(check_well_formed(b"<a/>trailing").is_err());
        assert!(check_well_formed(b"leading<a/>").is_err());
    }

    #[test]
    fn rejects_undefined_entity() {
        assert!(check_well_formed(b"<a>&nbsp;</a>").is_err());
    }

    #[test]
    fn rejects_duplicate_attribute() {
        assert!(check_well_formed(b"<a x=\"1\" x=\"2\"/>").is_err());
    }

    // ── Lexical rules the tokenizer does not enforce ──────────────────────────

    #[test]
    fn rejects_element_name_starting_with_digit() {
        let err = check_well_formed(b"<1a/>").unwrap_err();
        assert!(message(err).contains("not a valid XML name"));
    }

    #[test]
    fn rejects_invalid_attribute_name() {
        assert!(check_well_formed(b"<a 1b=\"x\"/>").is_err());
    }

    #[test]
    fn rejects_raw_less_than_in_attribute_value() {
        let err = check_well_formed(b"<a b=\"<\"/>").unwrap_err();
        assert!(message(err).contains("'<'"));
    }

    #[test]
    fn rejects_double_hyphen_in_comment() {
        let err = check_well_formed(b"<a><!-- a -- b --></a>").unwrap_err();
        assert_eq!(position(err), (1, 4));
        assert!(check_well_formed(b"<a><!-- trailing hyphen ---></a>").is_err());
    }

    #[test]
    fn rejects_cdata_end_in_text() {
        assert!(check_well_formed(b"<a>x ]]> y</a>").is_err());
    }

    #[test]
    fn rejects_control_characters() {
        let err = check_well_formed(b"<a>\x01</a>").unwrap_err();
        assert_eq!(position(err), (1, 4));
    }

    #[test]
    fn rejects_late_xml_declaration() {
        assert!(check_well_formed(b" <?xml version=\"1.0\"?><a/>").is_err());
    }

    #[test]
    fn rejects_unbound_prefixes() {
        assert!(check_well_formed(b"<x:a/>").is_err());
        assert!(check_well_formed(b"<a x:b=\"1\"/>").is_err());
        assert!(check_well_formed(b"<a:b:c xmlns:a=\"urn:a\"/>").is_err());
    }

    #[test]
    fn prefixes_are_scoped_to_their_element() {
        assert!(check_well_formed(b"<r xmlns:p=\"urn:p\"><p:a/><p:b p:c=\"1\"/></r>").is_ok());
        assert!(check_well_formed(b"<r><a xmlns:p=\"urn:p\"/><p:b/></r>").is_err());
        assert!(check_well_formed(b"<a xml:lang=\"de\"/>").is_ok());
    }

    // ── Encodings ─────────────────────────────────────────────────────────────

    #[test]
    fn accepts_declared_latin1() {
        let xml = b"<?xml version=\"1.0\" encoding=\"ISO-8859-1\"?><a>Gr\xFC\xDFe</a>";
        assert!(check_well_formed(xml).is_ok());
    }

    #[test]
    fn accepts_utf16_with_byte_order_mark() {
        assert!(check_well_formed(&utf16le("<a/>")).is_ok());
        assert!(check_well_formed(&utf16le("<?xml version=\"1.0\" encoding=\"UTF-16\"?>\n<a>\u{e4}</a>")).is_ok());
        assert!(check_well_formed(&utf16le("<a>")).is_err());
    }

    #[test]
    fn accepts_utf8_byte_order_mark() {
        assert!(check_well_formed(b"\xEF\xBB\xBF<a/>").is_ok());
    }

    #[test]
    fn rejects_invalid_utf8_with_position() {
        let err = check_well_formed(b"<a>\n  \xFF</a>").unwrap_err();
        assert_eq!(position(err), (2, 3));
    }

    #[test]
    fn rejects_unknown_or_mismatched_encoding_declaration() {
        assert!(check_well_formed(b"<?xml version=\"1.0\" encoding=\"x-klingon\"?><a/>").is_err());
        assert!(check_well_formed(b"<?xml version=\"1.0\" encoding=\"UTF-16\"?><a/>").is_err());
    }

    // ── Internal DTD subset ───────────────────────────────────────────────────

    #[test]
    fn resolves_internal_entities() {
        assert!(check_well_formed(b"<!DOCTYPE a [<!ENTITY e \"x\">]><a>&e;</a>").is_ok());
        assert!(check_well_formed(b"<!DOCTYPE a [<!ENTITY e 'x'>]><a b=\"&e;\"/>").is_ok());
    }

    #[test]
    fn rejects_external_entity_reference() {
        let xml = b"<!DOCTYPE a [<!ENTITY ext SYSTEM \"file:///etc/passwd\">]><a>&ext;</a>";
        assert!(message(check_well_formed(xml).unwrap_err()).contains("external entity &ext;"));
    }

    #[test]
    fn rejects_doctype_after_root() {
        assert!(check_well_formed(b"<a/><!DOCTYPE a>").is_err());
    }

    #[test]
    fn line_column_counts_from_one() {
        assert_eq!(line_column(b"ab\ncd", 0), (1, 1));
        assert_eq!(line_column(b"ab\ncd", 4), (2, 2));
        assert_eq!(line_column(b"ab", 99), (1, 3));
        assert_eq!(line_column("\u{e4}b".as_bytes(), 3), (1, 3));
    }
}
