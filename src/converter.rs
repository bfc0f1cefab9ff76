use crate::attachment::{AttachmentEmbedder, SequenceNo};
use crate::catalog::ConformanceBuilder;
use crate::loader::{OutputDocument, SourceDocument};
use crate::serializer::serialize;
use crate::timestamp::Timestamp;
use crate::{ConverterConfig, Result};
use std::path::Path;

// ── PdfA3Converter ────────────────────────────────────────────────────────────

/// Entry point for PDF → PDF/A-3 conversion.
///
/// A converter only holds its configuration. Every call builds its own output
/// document, so one converter can serve concurrent conversions.
///
/// ```no_run
/// use pdfa3embed::{ConverterConfig, PdfA3Converter};
///
/// let pdf = std::fs::read("invoice.pdf").unwrap();
/// let xml = std::fs::read("factur-x.xml").unwrap();
///
/// // Default configuration
/// let out = PdfA3Converter::new().convert(&pdf, &xml, 1001).unwrap();
///
/// // With custom configuration
/// let cfg = ConverterConfig {
///     title: "Invoice 1001".into(),
///     max_attachment_size: Some(10 * 1024 * 1024),
///     ..Default::default()
/// };
/// let out = PdfA3Converter::with_config(cfg).convert(&pdf, &xml, "1001").unwrap();
/// ```
#[derive(Debug, Clone, Default)]
pub struct PdfA3Converter {
    config: ConverterConfig,
}

impl PdfA3Converter {
    // ── Constructors ──────────────────────────────────────────────────────────

    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: ConverterConfig) -> Self {
        Self { config }
    }

    /// Returns a reference to the active [`ConverterConfig`].
    pub fn config(&self) -> &ConverterConfig {
        &self.config
    }

    // ── Conversion ────────────────────────────────────────────────────────────

    /// Convert `pdf` into a PDF/A-3 document embedding `xml` as
    /// `invoice_<sequence_no>.xml`, stamped with the current time.
    ///
    /// # Errors
    ///
    /// * [`ConvertError::InvalidAttachment`] / [`ConvertError::AttachmentTooLarge`]
    ///   when the XML is rejected. This is checked before the PDF is parsed.
    /// * [`ConvertError::MalformedInput`] when the PDF cannot be parsed.
    /// * [`ConvertError::Serialization`] when the assembled graph cannot be
    ///   written, which indicates a defect rather than bad input.
    ///
    /// [`ConvertError::InvalidAttachment`]: crate::ConvertError::InvalidAttachment
    /// [`ConvertError::AttachmentTooLarge`]: crate::ConvertError::AttachmentTooLarge
    /// [`ConvertError::MalformedInput`]: crate::ConvertError::MalformedInput
    /// [`ConvertError::Serialization`]: crate::ConvertError::Serialization
    pub fn convert(&self, pdf: &[u8], xml: &[u8], sequence_no: impl Into<SequenceNo>) -> Result<Vec<u8>> {
        self.convert_at(pdf, xml, sequence_no, Timestamp::now())
    }

    /// Same as [`convert`](Self::convert) with an explicit timestamp. The
    /// output is a pure function of the inputs and `timestamp`.
    pub fn convert_at(
        &self,
        pdf: &[u8],
        xml: &[u8],
        sequence_no: impl Into<SequenceNo>,
        timestamp: Timestamp,
    ) -> Result<Vec<u8>> {
        let sequence_no = sequence_no.into();
        let embedder = AttachmentEmbedder::new(&self.config, timestamp);

        // Reject the payload before anything else is built.
        let attachment = embedder.prepare(xml, &sequence_no)?;

        let source = SourceDocument::parse(pdf)?;
        let mut output = OutputDocument::new();
        let pages = output.copy_pages_from(&source)?;
        log::debug!(
            "sequence {sequence_no}: {pages} of {} page(s) copied",
            source.page_count()
        );

        ConformanceBuilder::new(&self.config, timestamp).apply(&mut output);
        let attached = embedder.link(&attachment, &mut output);
        log::debug!(
            "sequence {sequence_no}: {} attached as {} {} R (stream {} {} R), checksum {}",
            attached.filename,
            attached.spec_id.0,
            attached.spec_id.1,
            attached.stream_id.0,
            attached.stream_id.1,
            attachment.checksum()
        );

        serialize(output)
    }

    /// Read `pdf_path` and `xml_path`, convert, and write the result to
    /// `output_path`. Returns the size metrics of the conversion.
    pub fn convert_files<P, X, O>(
        &self,
        pdf_path: P,
        xml_path: X,
        sequence_no: impl Into<SequenceNo>,
        output_path: O,
    ) -> Result<ConversionMetrics>
    where
        P: AsRef<Path>,
        X: AsRef<Path>,
        O: AsRef<Path>,
    {
        let pdf = std::fs::read(pdf_path)?;
        let xml = std::fs::read(xml_path)?;

        let output = self.convert(&pdf, &xml, sequence_no)?;
        std::fs::write(output_path, &output)?;

        Ok(ConversionMetrics::new(&pdf, &xml, &output))
    }
}

// ── ConversionMetrics ─────────────────────────────────────────────────────────

/// Byte sizes a hosting layer reports back after a successful conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConversionMetrics {
    pub original_pdf_size: usize,
    pub xml_size: usize,
    pub pdf_a3_size: usize,
}

impl ConversionMetrics {
    pub fn new(pdf: &[u8], xml: &[u8], output: &[u8]) -> Self {
        Self {
            original_pdf_size: pdf.len(),
            xml_size: xml.len(),
            pdf_a3_size: output.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::fixtures::sample_pdf;
    use crate::ConvertError;
    use lopdf::Document;

    const INVOICE: &[u8] = b"<Invoice><Id>1</Id></Invoice>";

    #[test]
    fn invalid_xml_is_reported_before_the_pdf_is_parsed() {
        // Both inputs are bad; the XML error wins.
        let err = PdfA3Converter::new()
            .convert(b"garbage", b"<open>", 1)
            .unwrap_err();
        assert!(matches!(err, ConvertError::InvalidAttachment { .. }));
        assert!(err.is_client_error());
    }

    #[test]
    fn malformed_pdf_is_a_client_error() {
        let err = PdfA3Converter::new().convert(b"%PDF", INVOICE, 1).unwrap_err();
        assert!(matches!(err, ConvertError::MalformedInput(_)));
        assert!(err.is_client_error());
    }

    #[test]
    fn output_keeps_page_count() {
        let bytes = PdfA3Converter::new()
            .convert(&sample_pdf(4), INVOICE, "1001")
            .unwrap();
        let doc = Document::load_mem(&bytes).unwrap();
        assert_eq!(doc.get_pages().len(), 4);
    }

    #[test]
    fn fixed_timestamp_gives_identical_output() {
        let converter = PdfA3Converter::new();
        let pdf = sample_pdf(1);
        let ts = Timestamp::now();

        let a = converter.convert_at(&pdf, INVOICE, 5, ts).unwrap();
        let b = converter.convert_at(&pdf, INVOICE, 5, ts).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn metrics_are_byte_lengths() {
        let metrics = ConversionMetrics::new(b"12345", b"<a/>", b"1234567890");
        assert_eq!(metrics.original_pdf_size, 5);
        assert_eq!(metrics.xml_size, 4);
        assert_eq!(metrics.pdf_a3_size, 10);
    }

    #[test]
    fn converter_is_shareable_across_threads() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<PdfA3Converter>();
    }
}
