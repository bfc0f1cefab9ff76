use crate::loader::OutputDocument;
use crate::pdf_utils::{ascii_file_name, text_string};
use crate::timestamp::Timestamp;
use crate::xml_check::check_well_formed;
use crate::{ConvertError, ConverterConfig, Result};
use lopdf::{dictionary, Object, ObjectId, Stream};
use md5::{Digest, Md5};
use std::fmt;

/// MIME type of the payload. Stored unescaped: lopdf's writer escapes the
/// `/` delimiter, so the file reads `/application#2Fxml`.
pub(crate) const XML_MIME_TYPE: &[u8] = b"application/xml";

// ── SequenceNo ────────────────────────────────────────────────────────────────

/// Identifier the embedded file is named after (`invoice_<sequence_no>.xml`).
///
/// Accepts strings and integers alike:
///
/// ```
/// use pdfa3embed::SequenceNo;
///
/// assert_eq!(SequenceNo::from(1001).attachment_filename(), "invoice_1001.xml");
/// assert_eq!(SequenceNo::from("INV-7").attachment_filename(), "invoice_INV-7.xml");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SequenceNo(String);

impl SequenceNo {
    pub fn attachment_filename(&self) -> String {
        format!("invoice_{}.xml", self.0)
    }
}

impl fmt::Display for SequenceNo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SequenceNo {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl From<String> for SequenceNo {
    fn from(value: String) -> Self {
        Self(value)
    }
}

macro_rules! sequence_no_from_integer {
    ($($int:ty),*) => {
        $(impl From<$int> for SequenceNo {
            fn from(value: $int) -> Self {
                Self(value.to_string())
            }
        })*
    };
}

sequence_no_from_integer!(i32, i64, u32, u64, usize);

// ── AttachmentRef ─────────────────────────────────────────────────────────────

/// Where an embedded payload ended up in the output object graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct AttachmentRef {
    /// `invoice_<sequence_no>.xml`
    pub(crate) filename: String,
    /// The file specification, shared by the name tree and `/AF`.
    pub(crate) spec_id: ObjectId,
    /// The embedded-file stream holding the payload.
    pub(crate) stream_id: ObjectId,
}

// ── XmlAttachment ─────────────────────────────────────────────────────────────

/// An XML payload that passed validation and is ready to be embedded.
///
/// Construction is the only fallible step, so once a value exists the
/// embedding itself cannot fail half-way and leave a partially linked
/// document behind.
pub(crate) struct XmlAttachment<'a> {
    data: &'a [u8],
    filename: String,
    checksum: String,
}

impl<'a> XmlAttachment<'a> {
    /// Validate `data` against the configured size limit and XML
    /// well-formedness.
    pub(crate) fn prepare(data: &'a [u8], sequence_no: &SequenceNo, config: &ConverterConfig) -> Result<Self> {
        if let Some(max) = config.max_attachment_size {
            if data.len() > max {
                return Err(ConvertError::AttachmentTooLarge {
                    size: data.len(),
                    max,
                });
            }
        }

        check_well_formed(data)?;

        Ok(Self {
            data,
            filename: sequence_no.attachment_filename(),
            checksum: md5_checksum(data),
        })
    }

    #[cfg(test)]
    pub(crate) fn filename(&self) -> &str {
        &self.filename
    }

    pub(crate) fn checksum(&self) -> &str {
        &self.checksum
    }

    /// Add the embedded-file stream and file specification to `output` and
    /// link the specification from `/Names/EmbeddedFiles` and `/AF`.
    ///
    /// Existing entries are kept; embedding twice yields two entries in each.
    pub(crate) fn embed_into(
        &self,
        output: &mut OutputDocument,
        description: &str,
        timestamp: Timestamp,
    ) -> AttachmentRef {
        let date = timestamp.pdf_date();

        let mut stream = Stream::new(
            dictionary! {
                "Type" => "EmbeddedFile",
                "Subtype" => Object::Name(XML_MIME_TYPE.to_vec()),
                "Params" => dictionary! {
                    "Size" => self.data.len() as i64,
                    "CreationDate" => Object::string_literal(date.as_str()),
                    "ModDate" => Object::string_literal(date.as_str()),
                    "CheckSum" => Object::string_literal(self.checksum.as_str()),
                },
            },
            self.data.to_vec(),
        );
        stream.allows_compression = false;
        let stream_id = output.document.add_object(stream);

        let spec_id = output.document.add_object(dictionary! {
            "Type" => "Filespec",
            "F" => ascii_file_name(&self.filename),
            "UF" => text_string(&self.filename),
            "Desc" => text_string(description),
            "EF" => dictionary! {
                "F" => stream_id,
                "UF" => stream_id,
            },
            "AFRelationship" => "Data",
        });

        output
            .catalog
            .ensure_embedded_files_tree()
            .append(self.filename.as_str(), spec_id);
        output.catalog.append_associated_file(spec_id);

        log::debug!(
            "embedded {} ({} bytes) as {} {} R, {} file(s) in name tree, {} in /AF",
            self.filename,
            self.data.len(),
            spec_id.0,
            spec_id.1,
            output.catalog.embedded_files().map_or(0, |tree| tree.len()),
            output.catalog.associated_files().len()
        );

        AttachmentRef {
            filename: self.filename.clone(),
            spec_id,
            stream_id,
        }
    }
}

// ── AttachmentEmbedder ────────────────────────────────────────────────────────

/// Validates and embeds XML payloads into an [`OutputDocument`].
pub(crate) struct AttachmentEmbedder<'a> {
    config: &'a ConverterConfig,
    timestamp: Timestamp,
}

impl<'a> AttachmentEmbedder<'a> {
    pub(crate) fn new(config: &'a ConverterConfig, timestamp: Timestamp) -> Self {
        Self { config, timestamp }
    }

    pub(crate) fn prepare<'x>(&self, xml: &'x [u8], sequence_no: &SequenceNo) -> Result<XmlAttachment<'x>> {
        XmlAttachment::prepare(xml, sequence_no, self.config)
    }

    pub(crate) fn link(&self, attachment: &XmlAttachment<'_>, output: &mut OutputDocument) -> AttachmentRef {
        attachment.embed_into(output, &self.config.attachment_description, self.timestamp)
    }
}

#[cfg(test)]
impl AttachmentEmbedder<'_> {
    /// Validate then embed in one step. An invalid payload returns before
    /// `output` is touched.
    pub(crate) fn embed(&self, output: &mut OutputDocument, xml: &[u8], sequence_no: &SequenceNo) -> Result<AttachmentRef> {
        let attachment = self.prepare(xml, sequence_no)?;
        Ok(self.link(&attachment, output))
    }
}

/// Uppercase hex MD5 digest, as written to `/Params/CheckSum`.
pub(crate) fn md5_checksum(data: &[u8]) -> String {
    hex::encode_upper(Md5::digest(data))
}
