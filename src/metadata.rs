use crate::catalog::PDF_VERSION;
use crate::pdf_utils::text_string;
use crate::timestamp::{DocumentId, Timestamp};
use crate::ConverterConfig;
use lopdf::{dictionary, Dictionary, Stream};
use quick_xml::escape::escape;

/// PDF/A identification written into the XMP packet.
pub(crate) const PDFA_PART: u8 = 3;
pub(crate) const PDFA_CONFORMANCE: &str = "B";

/// `id` of the XMP packet wrapper, fixed by the XMP specification.
const XPACKET_ID: &str = "W5M0MpCehiHzreSzNTczkc9d";

// ── Document information dictionary ───────────────────────────────────────────

/// The classic `/Info` dictionary referenced from the trailer.
pub(crate) fn information_dictionary(config: &ConverterConfig, timestamp: Timestamp) -> Dictionary {
    let date = timestamp.pdf_date();

    let mut info = dictionary! {
        "Title" => text_string(&config.title),
        "Author" => text_string(&config.author),
        "Subject" => text_string(&config.subject),
        "Creator" => text_string(&config.creator_tool),
        "Producer" => text_string(&config.producer),
        "CreationDate" => text_string(&date),
        "ModDate" => text_string(&date),
    };
    if let Some(keywords) = &config.keywords {
        info.set("Keywords", text_string(keywords));
    }

    info
}

// ── XmpPacket ─────────────────────────────────────────────────────────────────

/// The XMP metadata packet declaring PDF/A-3B.
///
/// It carries the same title, tool and dates as the information dictionary,
/// all taken from one [`Timestamp`].
pub(crate) struct XmpPacket<'a> {
    config: &'a ConverterConfig,
    timestamp: Timestamp,
    document_id: DocumentId,
}

impl<'a> XmpPacket<'a> {
    pub(crate) fn new(config: &'a ConverterConfig, timestamp: Timestamp, document_id: DocumentId) -> Self {
        Self {
            config,
            timestamp,
            document_id,
        }
    }

    pub(crate) fn render(&self) -> String {
        let date = self.timestamp.xmp_date();
        let document_id = self.document_id.to_uuid_urn();

        format!(
            r#"<?xpacket begin="{bom}" id="{XPACKET_ID}"?>
<x:xmpmeta xmlns:x="adobe:ns:meta/" x:xmptk="{tool}">
   <rdf:RDF xmlns:rdf="http://www.w3.org/1999/02/22-rdf-syntax-ns#">
      <rdf:Description rdf:about=""
            xmlns:xmp="http://ns.adobe.com/xap/1.0/"
            xmlns:dc="http://purl.org/dc/elements/1.1/"
            xmlns:pdf="http://ns.adobe.com/pdf/1.3/"
            xmlns:pdfaid="http://www.aiim.org/pdfa/ns/id/"
            xmlns:xmpMM="http://ns.adobe.com/xap/1.0/mm/">
         <xmp:CreateDate>{date}</xmp:CreateDate>
         <xmp:ModifyDate>{date}</xmp:ModifyDate>
         <xmp:MetadataDate>{date}</xmp:MetadataDate>
         <xmp:CreatorTool>{tool}</xmp:CreatorTool>
         <xmpMM:DocumentID>{document_id}</xmpMM:DocumentID>
         <dc:format>application/pdf</dc:format>
         <dc:title>
            <rdf:Alt>
               <rdf:li xml:lang="x-default">{title}</rdf:li>
            </rdf:Alt>
         </dc:title>
         <dc:creator>
            <rdf:Seq>
               <rdf:li>{author}</rdf:li>
            </rdf:Seq>
         </dc:creator>
         <pdf:PDFVersion>{PDF_VERSION}</pdf:PDFVersion>
         <pdf:Producer>{producer}</pdf:Producer>
         <pdfaid:part>{PDFA_PART}</pdfaid:part>
         <pdfaid:conformance>{PDFA_CONFORMANCE}</pdfaid:conformance>
      </rdf:Description>
   </rdf:RDF>
</x:xmpmeta>
<?xpacket end="w"?>"#,
            bom = '\u{feff}',
            tool = escape(self.config.creator_tool.as_str()),
            title = escape(self.config.title.as_str()),
            author = escape(self.config.author.as_str()),
            producer = escape(self.config.producer.as_str()),
        )
    }

    /// `/Type /Metadata /Subtype /XML` stream. `/Length` is taken from the
    /// rendered bytes; the stream is never compressed so archival readers can
    /// scan it directly.
    pub(crate) fn to_stream(&self) -> Stream {
        let bytes = self.render().into_bytes();
        let length = bytes.len() as i64;

        let mut stream = Stream::new(
            dictionary! {
                "Type" => "Metadata",
                "Subtype" => "XML",
                "Length" => length,
            },
            bytes,
        );
        stream.allows_compression = false;
        stream
    }
}
