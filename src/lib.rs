//! # pdfa3embed
//!
//! A Rust library that turns an ordinary PDF plus an XML payload (typically an
//! electronic invoice) into a PDF/A-3 document that carries the XML as an
//! associated file.
//!
//! ## What this crate does
//!
//! 1. **Check the XML**: the payload must be well-formed before anything is
//!    touched.
//! 2. **Copy the pages**: every page of the input PDF is structurally copied
//!    into a fresh document (content streams are shared, never re-rendered).
//! 3. **Rewrite the catalog**: `/Version`, `/MarkInfo`, `/StructTreeRoot`,
//!    `/ID` and an XMP `/Metadata` stream declaring PDF/A-3B.
//! 4. **Embed the XML**: an embedded-file stream plus a file specification
//!    linked from both `/Names/EmbeddedFiles` and `/AF`.
//! 5. **Serialize**: the object graph is written back to bytes.
//!
//! ## Quick example
//!
//! ```no_run
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let pdf = std::fs::read("invoice.pdf")?;
//! let xml = std::fs::read("invoice.xml")?;
//!
//! let pdf_a3 = pdfa3embed::convert(&pdf, &xml, "1001")?;
//! std::fs::write("invoice_pdfa3.pdf", &pdf_a3)?;
//! # Ok(())
//! # }
//! ```

use thiserror::Error;

mod attachment;
mod catalog;
mod converter;
mod embedded;
mod inspector;
mod loader;
mod metadata;
mod pdf_utils;
mod serializer;
mod timestamp;
mod xml_check;

pub use attachment::SequenceNo;
pub use converter::{ConversionMetrics, PdfA3Converter};
pub use embedded::{EmbeddedFile, EmbeddedFileMetadata};
pub use inspector::OutputInspector;
pub use timestamp::{DocumentId, Timestamp};

// ── Configuration ────────────────────────────────────────────────────────────

/// Runtime configuration for [`PdfA3Converter`].
///
/// Every string ends up in the document information dictionary, the XMP
/// packet, or the file specification of the embedded payload.
#[derive(Debug, Clone)]
pub struct ConverterConfig {
    /// `/Title` and `dc:title`.
    pub title: String,

    /// `/Author` and `dc:creator`.
    pub author: String,

    /// `/Subject`.
    pub subject: String,

    /// `/Keywords`; omitted from the information dictionary when `None`.
    pub keywords: Option<String>,

    /// `/Creator` and `xmp:CreatorTool`.
    pub creator_tool: String,

    /// `/Producer` and `pdf:Producer`.
    pub producer: String,

    /// `/Desc` of the embedded XML file specification.
    pub attachment_description: String,

    /// If set, [`PdfA3Converter::convert`] rejects XML payloads larger than
    /// this many bytes with [`ConvertError::AttachmentTooLarge`].
    pub max_attachment_size: Option<usize>,
}

impl Default for ConverterConfig {
    fn default() -> Self {
        let tool = concat!("pdfa3embed ", env!("CARGO_PKG_VERSION"));
        Self {
            title: "PDF/A-3 Document with XML Attachment".into(),
            author: "pdfa3embed".into(),
            subject: "PDF/A-3 compliant document with embedded electronic invoice".into(),
            keywords: Some("PDF/A-3, Electronic Invoice, XML Attachment".into()),
            creator_tool: tool.into(),
            producer: tool.into(),
            attachment_description: "Electronic Invoice XML Data".into(),
            max_attachment_size: None,
        }
    }
}

// ── Error type ───────────────────────────────────────────────────────────────

/// Every error that this crate can produce.
#[derive(Error, Debug)]
pub enum ConvertError {
    /// The input bytes do not form a structurally valid PDF document.
    #[error("Malformed input PDF: {0}")]
    MalformedInput(String),

    /// The XML payload is not well-formed. Line and column are 1-based.
    #[error("Invalid XML attachment at line {line}, column {column}: {message}")]
    InvalidAttachment {
        line: usize,
        column: usize,
        message: String,
    },

    /// The XML payload exceeds the configured `max_attachment_size`.
    #[error("XML attachment is {size} bytes, the configured maximum is {max}")]
    AttachmentTooLarge { size: usize, max: usize },

    /// The assembled object graph could not be written out.
    #[error("Serialization failed: {0}")]
    Serialization(String),

    /// A filesystem I/O error occurred (file-based helpers only).
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// A produced document could not be read back by [`OutputInspector`].
    #[error("Inspection failed: {0}")]
    Inspection(String),

    /// The underlying lopdf parser returned an error while inspecting.
    #[error("PDF parse error: {0}")]
    ParseError(#[from] lopdf::Error),
}

impl ConvertError {
    /// `true` when the failure is caused by the caller's input rather than by
    /// the conversion pipeline itself. Hosting layers map these to a
    /// client-error status and everything else to a server error.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ConvertError::MalformedInput(_)
                | ConvertError::InvalidAttachment { .. }
                | ConvertError::AttachmentTooLarge { .. }
        )
    }
}

/// Convenience alias used throughout this crate.
pub type Result<T> = std::result::Result<T, ConvertError>;

/// Convert `pdf` into a PDF/A-3 document embedding `xml` as
/// `invoice_<sequence_no>.xml`, using the default [`ConverterConfig`].
///
/// Shorthand for `PdfA3Converter::new().convert(pdf, xml, sequence_no)`.
pub fn convert(pdf: &[u8], xml: &[u8], sequence_no: impl Into<SequenceNo>) -> Result<Vec<u8>> {
    PdfA3Converter::new().convert(pdf, xml, sequence_no)
}
