use crate::loader::OutputDocument;
use crate::{ConvertError, Result};
use lopdf::{Document, Object, ObjectId};

/// Flatten the catalog model and write the object graph (objects, xref
/// table, trailer) to bytes.
///
/// Nothing PDF/A specific happens here; the only checks are that the catalog
/// is complete and that no reference in the graph dangles.
pub(crate) fn serialize(mut output: OutputDocument) -> Result<Vec<u8>> {
    let catalog_id = output.catalog_id();
    output.catalog.write_into(&mut output.document, catalog_id)?;

    if let Some((holder, target)) = find_dangling_reference(&output.document) {
        return Err(ConvertError::Serialization(format!(
            "object {} {} R references missing object {} {} R",
            holder.0, holder.1, target.0, target.1
        )));
    }

    let mut buffer = Vec::new();
    output
        .document
        .save_to(&mut buffer)
        .map_err(|e| ConvertError::Serialization(e.to_string()))?;

    log::debug!(
        "serialized {} object(s) into {} bytes",
        output.document.objects.len(),
        buffer.len()
    );
    Ok(buffer)
}

/// First `(holder, missing target)` pair found, trailer reported as `(0, 0)`.
fn find_dangling_reference(document: &Document) -> Option<(ObjectId, ObjectId)> {
    for (&id, object) in &document.objects {
        if let Some(target) = dangling_in(document, object) {
            return Some((id, target));
        }
    }
    document
        .trailer
        .iter()
        .find_map(|(_, value)| dangling_in(document, value))
        .map(|target| ((0, 0), target))
}

fn dangling_in(document: &Document, object: &Object) -> Option<ObjectId> {
    match object {
        Object::Reference(id) if !document.objects.contains_key(id) => Some(*id),
        Object::Array(items) => items.iter().find_map(|o| dangling_in(document, o)),
        Object::Dictionary(dict) => dict.iter().find_map(|(_, o)| dangling_in(document, o)),
        Object::Stream(stream) => stream.dict.iter().find_map(|(_, o)| dangling_in(document, o)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attachment::{AttachmentEmbedder, SequenceNo};
    use crate::catalog::ConformanceBuilder;
    use crate::timestamp::Timestamp;
    use crate::ConverterConfig;

    fn complete_output() -> OutputDocument {
        let config = ConverterConfig::default();
        let ts = Timestamp::now();
        let mut output = OutputDocument::new();
        ConformanceBuilder::new(&config, ts).apply(&mut output);
        AttachmentEmbedder::new(&config, ts)
            .embed(&mut output, b"<a/>", &SequenceNo::from(1))
            .unwrap();
        output
    }

    #[test]
    fn writes_a_loadable_pdf() {
        let bytes = serialize(complete_output()).unwrap();
        assert!(bytes.starts_with(b"%PDF-1.7"));
        assert!(Document::load_mem(&bytes).is_ok());
    }

    #[test]
    fn mime_type_name_is_escaped() {
        let bytes = serialize(complete_output()).unwrap();
        let needle = b"/application#2Fxml";
        assert!(bytes.windows(needle.len()).any(|w| w == needle));
    }

    #[test]
    fn dangling_reference_is_rejected() {
        let mut output = complete_output();
        output.document.trailer.set("Bogus", Object::Reference((9999, 0)));

        let err = serialize(output).unwrap_err();
        assert!(matches!(err, ConvertError::Serialization(ref m) if m.contains("9999")));
    }

    #[test]
    fn incomplete_catalog_is_rejected() {
        let output = OutputDocument::new();
        assert!(matches!(serialize(output), Err(ConvertError::Serialization(_))));
    }
}
