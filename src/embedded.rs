use crate::attachment::md5_checksum;

// ── EmbeddedFile ─────────────────────────────────────────────────────────────

/// A file embedded inside a PDF document, as read back by
/// [`crate::OutputInspector::associated_files`].
#[derive(Debug, Clone)]
pub struct EmbeddedFile {
    /// The filename as declared in the PDF file specification object
    /// (Unicode name preferred over ASCII name when both are present).
    pub filename: String,

    /// The raw, decompressed file content.
    pub data: Vec<u8>,

    /// Metadata read from the file specification and stream parameter
    /// dictionaries.
    pub metadata: EmbeddedFileMetadata,
}

impl EmbeddedFile {
    /// `true` when `/Params/Size` is present and equals the content length.
    pub fn size_matches(&self) -> bool {
        self.metadata.size == Some(self.data.len())
    }

    /// `true` when `/Params/CheckSum` is present and equals the uppercase hex
    /// MD5 of the content, recomputed here.
    ///
    /// ```
    /// # use pdfa3embed::{EmbeddedFile, EmbeddedFileMetadata};
    /// let file = EmbeddedFile {
    ///     filename: "invoice_1.xml".into(),
    ///     data: b"abc".to_vec(),
    ///     metadata: EmbeddedFileMetadata {
    ///         checksum: Some("900150983CD24FB0D6963F7D28E17F72".into()),
    ///         ..Default::default()
    ///     },
    /// };
    /// assert!(file.checksum_matches());
    /// ```
    pub fn checksum_matches(&self) -> bool {
        self.metadata.checksum.as_deref() == Some(md5_checksum(&self.data).as_str())
    }
}

// ── EmbeddedFileMetadata ──────────────────────────────────────────────────────

/// Metadata associated with an [`EmbeddedFile`], sourced from the PDF file
/// specification dictionary and the embedded stream's `/Params` sub-dictionary.
///
/// All fields are optional: a conforming PDF need not populate them.
#[derive(Debug, Clone, Default)]
pub struct EmbeddedFileMetadata {
    /// MIME type declared in the embedded stream's `/Subtype` entry
    /// (e.g. `"application/xml"`).
    pub mime_type: Option<String>,

    /// Human-readable description from the `/Desc` entry.
    pub description: Option<String>,

    /// `/AFRelationship` of the file specification (e.g. `"Data"`).
    pub relationship: Option<String>,

    /// Modification date from `/Params/ModDate` in PDF date format
    /// (`D:YYYYMMDDHHmmSSOHH'mm'`).
    pub modification_date: Option<String>,

    /// Creation date from `/Params/CreationDate`.
    pub creation_date: Option<String>,

    /// Uncompressed file size in bytes, from `/Params/Size`.
    pub size: Option<usize>,

    /// Checksum string from `/Params/CheckSum`, if present.
    pub checksum: Option<String>,
}

impl EmbeddedFileMetadata {
    /// Returns `true` when the declared MIME type contains the string `"xml"`.
    pub fn is_xml(&self) -> bool {
        self.mime_type
            .as_deref()
            .map(|m| m.to_ascii_lowercase().contains("xml"))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(data: &[u8], metadata: EmbeddedFileMetadata) -> EmbeddedFile {
        EmbeddedFile {
            filename: "invoice_1.xml".into(),
            data: data.to_vec(),
            metadata,
        }
    }

    #[test]
    fn missing_params_never_match() {
        let f = file(b"<a/>", EmbeddedFileMetadata::default());
        assert!(!f.size_matches());
        assert!(!f.checksum_matches());
    }

    #[test]
    fn lowercase_checksum_does_not_match() {
        let f = file(
            b"abc",
            EmbeddedFileMetadata {
                checksum: Some("900150983cd24fb0d6963f7d28e17f72".into()),
                size: Some(3),
                ..Default::default()
            },
        );
        assert!(f.size_matches());
        assert!(!f.checksum_matches());
    }

    #[test]
    fn xml_mime_type_detection() {
        let meta = EmbeddedFileMetadata {
            mime_type: Some("Application/XML".into()),
            ..Default::default()
        };
        assert!(meta.is_xml());
        assert!(!EmbeddedFileMetadata::default().is_xml());
    }
}
