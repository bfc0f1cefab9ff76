//! Shared PDF object helpers used across multiple modules.

use lopdf::{Dictionary, Document, Object, StringFormat};

/// Encode `text` as a PDF text string.
///
/// ASCII stays a literal string; anything else becomes UTF-16BE with a byte
/// order mark, the only Unicode encoding every PDF reader understands.
pub fn text_string(text: &str) -> Object {
    if text.is_ascii() {
        return Object::string_literal(text);
    }
    let mut bytes = vec![0xFE, 0xFF];
    for unit in text.encode_utf16() {
        bytes.extend_from_slice(&unit.to_be_bytes());
    }
    Object::String(bytes, StringFormat::Hexadecimal)
}

/// Portable `/F` file name: every character outside printable ASCII becomes
/// `_`. The Unicode name belongs in `/UF`.
pub fn ascii_file_name(name: &str) -> Object {
    let portable: String = name
        .chars()
        .map(|c| if c.is_ascii_graphic() || c == ' ' { c } else { '_' })
        .collect();
    Object::string_literal(portable)
}

/// Decode the bytes of a PDF text string written by [`text_string`] or by
/// another producer (UTF-16BE with BOM, otherwise treated as UTF-8).
pub fn decode_text(bytes: &[u8]) -> String {
    match bytes {
        [0xFE, 0xFF, rest @ ..] => {
            let units: Vec<u16> = rest
                .chunks_exact(2)
                .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
                .collect();
            String::from_utf16_lossy(&units)
        }
        _ => String::from_utf8_lossy(bytes).into_owned(),
    }
}

/// Extract a string value from a PDF dictionary for a given key.
///
/// Returns `Some(String)` if the key exists and contains a valid non-empty string,
/// `None` otherwise.
pub fn extract_string_from_dict(dict: &Dictionary, key: &[u8]) -> Option<String> {
    dict.get(key)
        .ok()
        .and_then(|v| v.as_str().ok())
        .map(decode_text)
        .filter(|s| !s.is_empty())
}

/// Resolve a value that might be inline or a reference to a dictionary.
pub fn resolve_dict<'a>(document: &'a Document, value: &'a Object) -> Option<&'a Dictionary> {
    match value.as_reference() {
        Ok(id) => document.get_dictionary(id).ok(),
        Err(_) => value.as_dict().ok(),
    }
}

/// Resolve a value that might be inline or a reference to an array.
pub fn resolve_array<'a>(document: &'a Document, value: &'a Object) -> Option<&'a Vec<Object>> {
    match value.as_reference() {
        Ok(id) => document.get_object(id).ok().and_then(|o| o.as_array().ok()),
        Err(_) => value.as_array().ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ascii_text_stays_literal() {
        let obj = text_string("invoice_42.xml");
        assert_eq!(obj.as_str().unwrap(), b"invoice_42.xml");
    }

    #[test]
    fn unicode_text_round_trips_through_utf16() {
        let obj = text_string("Rechnung_März.xml");
        let bytes = obj.as_str().unwrap();
        assert_eq!(&bytes[..2], &[0xFE, 0xFF]);
        assert_eq!(decode_text(bytes), "Rechnung_März.xml");
    }

    #[test]
    fn file_names_are_reduced_to_ascii() {
        let obj = ascii_file_name("invoice_März €.xml");
        assert_eq!(obj.as_str().unwrap(), b"invoice_M_rz _.xml");
        assert_eq!(ascii_file_name("invoice_7.xml").as_str().unwrap(), b"invoice_7.xml");
    }

    #[test]
    fn empty_strings_are_treated_as_absent() {
        let mut dict = Dictionary::new();
        dict.set("Desc", Object::string_literal(""));
        assert_eq!(extract_string_from_dict(&dict, b"Desc"), None);
        assert_eq!(extract_string_from_dict(&dict, b"Missing"), None);
    }
}
