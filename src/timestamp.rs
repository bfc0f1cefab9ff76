use chrono::{DateTime, SecondsFormat, Utc};
use lopdf::{Object, StringFormat};
use sha2::{Digest, Sha256};
use std::fmt;
use uuid::Uuid;

// ── Timestamp ─────────────────────────────────────────────────────────────────

/// The single instant a conversion is stamped with.
///
/// Every date written into the output (information dictionary, XMP packet,
/// embedded-file parameters) and the document id are derived from one
/// `Timestamp`, so the different representations can never drift apart
/// within a conversion.
///
/// ```
/// use chrono::{TimeZone, Utc};
/// use pdfa3embed::Timestamp;
///
/// let ts = Timestamp::at(Utc.with_ymd_and_hms(2024, 3, 5, 14, 7, 9).unwrap());
/// assert_eq!(ts.pdf_date(), "D:20240305140709+00'00'");
/// assert_eq!(ts.xmp_date(), "2024-03-05T14:07:09+00:00");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Capture the current UTC instant.
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Use a fixed instant.
    pub fn at(instant: DateTime<Utc>) -> Self {
        Self(instant)
    }

    pub fn instant(&self) -> DateTime<Utc> {
        self.0
    }

    /// Classic PDF date string (`D:YYYYMMDDHHmmSS+00'00'`).
    pub fn pdf_date(&self) -> String {
        self.0.format("D:%Y%m%d%H%M%S+00'00'").to_string()
    }

    /// XMP date string (`YYYY-MM-DDTHH:MM:SS+00:00`).
    pub fn xmp_date(&self) -> String {
        self.0.format("%Y-%m-%dT%H:%M:%S+00:00").to_string()
    }

    /// Derive the document id from a SHA-256 of the nanosecond-precision
    /// instant, truncated to 16 bytes.
    pub fn document_id(&self) -> DocumentId {
        let rendered = self.0.to_rfc3339_opts(SecondsFormat::Nanos, true);
        let digest = Sha256::digest(rendered.as_bytes());

        let mut bytes = [0u8; 16];
        bytes.copy_from_slice(&digest[..16]);
        DocumentId(bytes)
    }
}

// ── DocumentId ────────────────────────────────────────────────────────────────

/// 16-byte document identifier written into both slots of `/ID`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DocumentId([u8; 16]);

impl DocumentId {
    /// The same 128 bits rendered as `uuid:xxxxxxxx-xxxx-…` for
    /// `xmpMM:DocumentID`.
    pub fn to_uuid_urn(&self) -> String {
        format!("uuid:{}", Uuid::from_bytes(self.0).hyphenated())
    }

    /// `/ID` entries are byte strings; hex form keeps the file ASCII-clean.
    pub(crate) fn to_object(self) -> Object {
        Object::String(self.0.to_vec(), StringFormat::Hexadecimal)
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode_upper(self.0))
    }
}
