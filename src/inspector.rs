use crate::catalog::CONFORMANCE_KEYS;
use crate::pdf_utils::{decode_text, extract_string_from_dict, resolve_array, resolve_dict};
use crate::{ConvertError, EmbeddedFile, EmbeddedFileMetadata, Result};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use std::collections::HashSet;
use std::path::Path;

// ── OutputInspector ───────────────────────────────────────────────────────────

/// Read-only view of a PDF, used to check what a conversion produced.
///
/// Works on any PDF, not only on documents this crate wrote.
///
/// ```no_run
/// use pdfa3embed::OutputInspector;
///
/// let inspector = OutputInspector::from_path("invoice_1001_pdfa3.pdf").unwrap();
/// println!("{:?}", inspector.conformance_level());
/// for file in inspector.associated_files().unwrap() {
///     println!("{} ({} bytes)", file.filename, file.data.len());
/// }
/// ```
pub struct OutputInspector {
    document: Document,
}

impl OutputInspector {
    // ── Constructors ──────────────────────────────────────────────────────────

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(Self::from_document(Document::load_mem(bytes)?))
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        Self::from_bytes(&bytes)
    }

    pub fn from_document(document: Document) -> Self {
        Self { document }
    }

    /// The underlying lopdf document.
    pub fn document(&self) -> &Document {
        &self.document
    }

    // ── Structure ─────────────────────────────────────────────────────────────

    pub fn page_count(&self) -> usize {
        self.document.get_pages().len()
    }

    /// Catalog keys a converted document must carry that this one lacks,
    /// in catalog order. `Names` only counts when it holds `EmbeddedFiles`.
    pub fn missing_catalog_keys(&self) -> Result<Vec<&'static str>> {
        let catalog = self.catalog()?;
        Ok(CONFORMANCE_KEYS
            .into_iter()
            .filter(|key| match *key {
                "Names" => !catalog
                    .get(b"Names")
                    .ok()
                    .and_then(|names| resolve_dict(&self.document, names))
                    .is_some_and(|names| names.has(b"EmbeddedFiles")),
                _ => !catalog.has(key.as_bytes()),
            })
            .collect())
    }

    // ── PDF/A-3 conformance ───────────────────────────────────────────────────

    /// `true` when the XMP metadata declares `pdfaid:part` 3 with conformance
    /// level A, B or U. A document without XMP metadata is simply not PDF/A-3.
    pub fn is_pdfa3(&self) -> bool {
        self.xmp_packet()
            .map(|xmp| xmp_part(&xmp) == Some("3") && xmp_conformance(&xmp).is_some())
            .unwrap_or(false)
    }

    /// Human-readable level such as `"PDF/A-3B"`, when the XMP declares one.
    pub fn conformance_level(&self) -> Option<String> {
        let xmp = self.xmp_packet().ok()?;
        let part = xmp_part(&xmp)?;
        let level = xmp_conformance(&xmp)?;
        Some(format!("PDF/A-{part}{level}"))
    }

    /// Walk catalog → `/Metadata` → stream → UTF-8 text.
    pub fn xmp_packet(&self) -> Result<String> {
        let catalog = self.catalog()?;

        let meta_id = catalog
            .get(b"Metadata")
            .and_then(Object::as_reference)
            .map_err(|_| inspection("catalog has no indirect /Metadata entry"))?;

        let stream = self
            .document
            .get_object(meta_id)
            .and_then(Object::as_stream)
            .map_err(|e| inspection(format!("cannot resolve /Metadata stream: {e}")))?;

        Ok(String::from_utf8_lossy(&stream_content(stream)).into_owned())
    }

    // ── Embedded files ────────────────────────────────────────────────────────

    /// Names listed in the `/Names/EmbeddedFiles` name tree, in tree order.
    pub fn embedded_file_names(&self) -> Result<Vec<String>> {
        Ok(self
            .embedded_file_specs()?
            .into_iter()
            .map(|(name, _)| name)
            .collect())
    }

    /// Every file linked from the catalog's `/AF` array, with its content and
    /// `/Params` metadata.
    pub fn associated_files(&self) -> Result<Vec<EmbeddedFile>> {
        let catalog = self.catalog()?;
        let Ok(af) = catalog.get(b"AF") else {
            return Ok(Vec::new());
        };
        let entries = resolve_array(&self.document, af)
            .ok_or_else(|| inspection("/AF is not an array"))?;

        entries
            .iter()
            .map(|entry| {
                let spec_id = entry
                    .as_reference()
                    .map_err(|_| inspection("/AF entry is not an indirect reference"))?;
                self.parse_file_spec(spec_id)
            })
            .collect()
    }

    // ── Private helpers ───────────────────────────────────────────────────────

    fn catalog(&self) -> Result<&Dictionary> {
        self.document
            .catalog()
            .map_err(|e| inspection(format!("cannot read catalog: {e}")))
    }

    /// `(name, file spec id)` pairs from `/Names/EmbeddedFiles`, inline or
    /// indirect, following `/Kids` into intermediate nodes.
    fn embedded_file_specs(&self) -> Result<Vec<(String, ObjectId)>> {
        let catalog = self.catalog()?;
        let Some(names) = catalog
            .get(b"Names")
            .ok()
            .and_then(|value| resolve_dict(&self.document, value))
        else {
            return Ok(Vec::new());
        };
        let Some(root) = names
            .get(b"EmbeddedFiles")
            .ok()
            .and_then(|value| resolve_dict(&self.document, value))
        else {
            return Ok(Vec::new());
        };

        let mut specs = Vec::new();
        let mut visited = HashSet::new();
        self.walk_name_tree(root, &mut specs, &mut visited);
        Ok(specs)
    }

    fn walk_name_tree(
        &self,
        node: &Dictionary,
        out: &mut Vec<(String, ObjectId)>,
        visited: &mut HashSet<ObjectId>,
    ) {
        // Leaf node: [key value key value …]
        if let Some(names) = node
            .get(b"Names")
            .ok()
            .and_then(|value| resolve_array(&self.document, value))
        {
            for pair in names.chunks_exact(2) {
                if let (Ok(name), Ok(spec_id)) = (pair[0].as_str(), pair[1].as_reference()) {
                    out.push((decode_text(name), spec_id));
                }
            }
        }

        // Intermediate node
        if let Some(kids) = node
            .get(b"Kids")
            .ok()
            .and_then(|value| resolve_array(&self.document, value))
        {
            for kid in kids {
                let Ok(kid_id) = kid.as_reference() else { continue };
                if !visited.insert(kid_id) {
                    continue;
                }
                if let Ok(kid_dict) = self.document.get_dictionary(kid_id) {
                    self.walk_name_tree(kid_dict, out, visited);
                }
            }
        }
    }

    /// Read a file specification:
    ///
    /// ```text
    /// << /Type /Filespec /F (name) /UF (name) /Desc (…) /AFRelationship /Data
    ///    /EF << /F <stream-ref> /UF <stream-ref> >> >>
    /// ```
    fn parse_file_spec(&self, spec_id: ObjectId) -> Result<EmbeddedFile> {
        let spec = self
            .document
            .get_dictionary(spec_id)
            .map_err(|_| inspection(format!("file spec {} {} R is not a dictionary", spec_id.0, spec_id.1)))?;

        let ef = spec
            .get(b"EF")
            .ok()
            .and_then(|value| resolve_dict(&self.document, value))
            .ok_or_else(|| inspection("file spec has no /EF dictionary"))?;

        // /UF preferred over /F
        let stream_id = ef
            .get(b"UF")
            .or_else(|_| ef.get(b"F"))
            .and_then(Object::as_reference)
            .map_err(|_| inspection("/EF has no indirect /F or /UF stream"))?;

        let stream = self
            .document
            .get_object(stream_id)
            .and_then(Object::as_stream)
            .map_err(|_| inspection("embedded file object is not a stream"))?;

        let fallback = format!("attachment_{}", spec_id.0);
        Ok(EmbeddedFile {
            filename: best_filename(spec).unwrap_or(fallback),
            data: stream_content(stream),
            metadata: read_metadata(spec, &stream.dict),
        })
    }
}

fn inspection(message: impl Into<String>) -> ConvertError {
    ConvertError::Inspection(message.into())
}

/// Raw bytes of an unfiltered stream, decoded bytes otherwise. Undecodable
/// content is returned as stored.
fn stream_content(stream: &Stream) -> Vec<u8> {
    if !stream.dict.has(b"Filter") {
        return stream.content.clone();
    }
    stream
        .decompressed_content()
        .unwrap_or_else(|_| stream.content.clone())
}

/// Unicode (/UF) over ASCII (/F).
fn best_filename(spec: &Dictionary) -> Option<String> {
    extract_string_from_dict(spec, b"UF").or_else(|| extract_string_from_dict(spec, b"F"))
}

fn read_metadata(spec: &Dictionary, stream_dict: &Dictionary) -> EmbeddedFileMetadata {
    let mut metadata = EmbeddedFileMetadata {
        description: extract_string_from_dict(spec, b"Desc"),
        relationship: name_value(spec, b"AFRelationship"),
        mime_type: name_value(stream_dict, b"Subtype"),
        ..Default::default()
    };

    if let Ok(params) = stream_dict.get(b"Params").and_then(Object::as_dict) {
        metadata.creation_date = extract_string_from_dict(params, b"CreationDate");
        metadata.modification_date = extract_string_from_dict(params, b"ModDate");
        metadata.size = params
            .get(b"Size")
            .and_then(Object::as_i64)
            .ok()
            .and_then(|n| usize::try_from(n).ok());
        metadata.checksum = extract_string_from_dict(params, b"CheckSum");
    }

    metadata
}

/// A name object as text, with `#xx` escapes decoded.
fn name_value(dict: &Dictionary, key: &[u8]) -> Option<String> {
    let raw = dict.get(key).and_then(Object::as_name).ok()?;
    let mut decoded = Vec::with_capacity(raw.len());
    let mut i = 0;
    while i < raw.len() {
        let escape = raw.get(i + 1..i + 3).filter(|hex| hex.iter().all(u8::is_ascii_hexdigit));
        if let (b'#', Some(hex)) = (raw[i], escape) {
            if let Ok(byte) = u8::from_str_radix(&String::from_utf8_lossy(hex), 16) {
                decoded.push(byte);
                i += 3;
                continue;
            }
        }
        decoded.push(raw[i]);
        i += 1;
    }
    Some(String::from_utf8_lossy(&decoded).into_owned())
}

// ── XMP scanning ──────────────────────────────────────────────────────────────
//
// XMP allows both attribute syntax (`pdfaid:part="3"`) and element syntax
// (`<pdfaid:part>3</pdfaid:part>`).

fn xmp_declares(xmp: &str, property: &str, value: &str) -> bool {
    xmp.contains(&format!(r#"pdfaid:{property}="{value}""#))
        || xmp.contains(&format!("<pdfaid:{property}>{value}</pdfaid:{property}>"))
}

fn xmp_part(xmp: &str) -> Option<&'static str> {
    ["3", "2", "1"]
        .into_iter()
        .find(|part| xmp_declares(xmp, "part", part))
}

/// Conformance level, case-sensitive.
fn xmp_conformance(xmp: &str) -> Option<&'static str> {
    ["A", "B", "U"]
        .into_iter()
        .find(|level| xmp_declares(xmp, "conformance", level))
}
