use crate::loader::OutputDocument;
use crate::metadata::{information_dictionary, XmpPacket};
use crate::pdf_utils::text_string;
use crate::timestamp::{DocumentId, Timestamp};
use crate::{ConvertError, ConverterConfig, Result};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId};

/// PDF/A-3 requires a PDF 1.7 (or earlier) structure.
pub(crate) const PDF_VERSION: &str = "1.7";

/// Catalog keys every converted document must carry.
pub(crate) const CONFORMANCE_KEYS: [&str; 8] = [
    "Pages",
    "Version",
    "MarkInfo",
    "StructTreeRoot",
    "ID",
    "Metadata",
    "Names",
    "AF",
];

// ── EmbeddedFilesTree ─────────────────────────────────────────────────────────

/// The `/Names/EmbeddedFiles` name tree, kept as a single flat leaf node.
///
/// Entries stay in insertion order; appending never replaces an existing
/// entry, even one with the same name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct EmbeddedFilesTree {
    entries: Vec<(String, ObjectId)>,
}

impl EmbeddedFilesTree {
    pub(crate) fn append(&mut self, name: impl Into<String>, file_spec: ObjectId) {
        self.entries.push((name.into(), file_spec));
    }

    #[cfg(test)]
    pub(crate) fn entries(&self) -> &[(String, ObjectId)] {
        &self.entries
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// `<< /Names [(name) ref (name) ref …] >>`
    fn to_dictionary(&self) -> Dictionary {
        let names: Vec<Object> = self
            .entries
            .iter()
            .flat_map(|(name, spec)| [text_string(name), Object::Reference(*spec)])
            .collect();
        dictionary! { "Names" => names }
    }
}

// ── Catalog ───────────────────────────────────────────────────────────────────

/// Typed model of the document catalog.
///
/// Each PDF/A-3 relevant key has its own field; the dictionary form only
/// exists once [`Catalog::write_into`] flattens the model, and that refuses
/// to run while a required key is still missing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Catalog {
    pages: ObjectId,
    version: Option<&'static str>,
    marked: Option<bool>,
    struct_tree_root: Option<ObjectId>,
    id: Option<DocumentId>,
    metadata: Option<ObjectId>,
    embedded_files: Option<EmbeddedFilesTree>,
    associated_files: Option<Vec<ObjectId>>,
}

impl Catalog {
    pub(crate) fn new(pages: ObjectId) -> Self {
        Self {
            pages,
            version: None,
            marked: None,
            struct_tree_root: None,
            id: None,
            metadata: None,
            embedded_files: None,
            associated_files: None,
        }
    }

    pub(crate) fn pages(&self) -> ObjectId {
        self.pages
    }

    pub(crate) fn set_version(&mut self, version: &'static str) {
        self.version = Some(version);
    }

    pub(crate) fn set_marked(&mut self, marked: bool) {
        self.marked = Some(marked);
    }

    pub(crate) fn set_struct_tree_root(&mut self, id: ObjectId) {
        self.struct_tree_root = Some(id);
    }

    pub(crate) fn set_document_id(&mut self, id: DocumentId) {
        self.id = Some(id);
    }

    pub(crate) fn set_metadata(&mut self, id: ObjectId) {
        self.metadata = Some(id);
    }

    /// The embedded-files name tree, created empty on first use.
    pub(crate) fn ensure_embedded_files_tree(&mut self) -> &mut EmbeddedFilesTree {
        self.embedded_files.get_or_insert_with(EmbeddedFilesTree::default)
    }

    pub(crate) fn embedded_files(&self) -> Option<&EmbeddedFilesTree> {
        self.embedded_files.as_ref()
    }

    /// Append `file_spec` to `/AF`, creating the array on first use.
    pub(crate) fn append_associated_file(&mut self, file_spec: ObjectId) {
        self.associated_files.get_or_insert_with(Vec::new).push(file_spec);
    }

    pub(crate) fn associated_files(&self) -> &[ObjectId] {
        self.associated_files.as_deref().unwrap_or(&[])
    }

    /// Required keys that have not been set yet, in [`CONFORMANCE_KEYS`] order.
    pub(crate) fn missing_conformance_keys(&self) -> Vec<&'static str> {
        let present = [
            true,
            self.version.is_some(),
            self.marked.is_some(),
            self.struct_tree_root.is_some(),
            self.id.is_some(),
            self.metadata.is_some(),
            self.embedded_files.is_some(),
            self.associated_files.is_some(),
        ];
        CONFORMANCE_KEYS
            .iter()
            .zip(present)
            .filter(|(_, present)| !present)
            .map(|(key, _)| *key)
            .collect()
    }

    /// Flatten the model into the catalog object `catalog_id` of `document`.
    pub(crate) fn write_into(&self, document: &mut Document, catalog_id: ObjectId) -> Result<()> {
        let missing = self.missing_conformance_keys();
        if !missing.is_empty() {
            return Err(ConvertError::Serialization(format!(
                "catalog is missing /{}",
                missing.join(", /")
            )));
        }
        document
            .objects
            .insert(catalog_id, Object::Dictionary(self.to_dictionary()));
        Ok(())
    }

    fn to_dictionary(&self) -> Dictionary {
        let mut dict = dictionary! {
            "Type" => "Catalog",
            "Pages" => self.pages,
        };

        if let Some(version) = self.version {
            dict.set("Version", Object::Name(version.as_bytes().to_vec()));
        }
        if let Some(marked) = self.marked {
            dict.set("MarkInfo", dictionary! { "Marked" => marked });
        }
        if let Some(root) = self.struct_tree_root {
            dict.set("StructTreeRoot", root);
        }
        if let Some(id) = self.id {
            dict.set("ID", id_array(id));
        }
        if let Some(metadata) = self.metadata {
            dict.set("Metadata", metadata);
        }
        if let Some(tree) = &self.embedded_files {
            dict.set("Names", dictionary! { "EmbeddedFiles" => tree.to_dictionary() });
        }
        if let Some(files) = &self.associated_files {
            let refs: Vec<Object> = files.iter().map(|&id| Object::Reference(id)).collect();
            dict.set("AF", refs);
        }

        dict
    }
}

/// `[<id> <id>]`: original and modification id are equal at creation.
fn id_array(id: DocumentId) -> Vec<Object> {
    vec![id.to_object(), id.to_object()]
}

// ── ConformanceBuilder ────────────────────────────────────────────────────────

/// Applies the structural subset of PDF/A-3 to an [`OutputDocument`]:
/// version, tagged-content marker, structure-tree stub, document id and
/// metadata.
///
/// The structure tree is a placeholder. There is no real tag tree behind the
/// `/MarkInfo` claim, so validators that check tag-tree depth will still
/// reject the output.
pub(crate) struct ConformanceBuilder<'a> {
    config: &'a ConverterConfig,
    timestamp: Timestamp,
}

impl<'a> ConformanceBuilder<'a> {
    pub(crate) fn new(config: &'a ConverterConfig, timestamp: Timestamp) -> Self {
        Self { config, timestamp }
    }

    /// Mutate `output`'s catalog. Returns the document id that was assigned.
    pub(crate) fn apply(&self, output: &mut OutputDocument) -> DocumentId {
        output.catalog.set_version(PDF_VERSION);
        output.catalog.set_marked(true);

        let struct_tree_root = output.document.add_object(dictionary! {
            "Type" => "StructTreeRoot",
            "K" => Vec::<Object>::new(),
            "ParentTree" => dictionary! { "Nums" => Vec::<Object>::new() },
        });
        output.catalog.set_struct_tree_root(struct_tree_root);

        let document_id = self.timestamp.document_id();
        output.catalog.set_document_id(document_id);
        output.document.trailer.set("ID", id_array(document_id));

        let info_id = output
            .document
            .add_object(information_dictionary(self.config, self.timestamp));
        output.document.trailer.set("Info", info_id);

        let packet = XmpPacket::new(self.config, self.timestamp, document_id);
        let metadata_id = output.document.add_object(packet.to_stream());
        output.catalog.set_metadata(metadata_id);

        log::debug!("catalog marked PDF/A-3B, document id {document_id}");
        document_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn applied() -> OutputDocument {
        let mut output = OutputDocument::new();
        let config = ConverterConfig::default();
        ConformanceBuilder::new(&config, Timestamp::now()).apply(&mut output);
        output
    }

    #[test]
    fn fresh_catalog_only_has_pages() {
        let catalog = Catalog::new((1, 0));
        assert_eq!(
            catalog.missing_conformance_keys(),
            vec!["Version", "MarkInfo", "StructTreeRoot", "ID", "Metadata", "Names", "AF"]
        );
    }

    #[test]
    fn builder_leaves_only_attachment_keys_missing() {
        let output = applied();
        assert_eq!(output.catalog.missing_conformance_keys(), vec!["Names", "AF"]);
    }

    #[test]
    fn incomplete_catalog_refuses_to_serialize() {
        let mut output = applied();
        let catalog_id = output.catalog_id();
        let catalog = output.catalog.clone();

        let err = catalog.write_into(&mut output.document, catalog_id).unwrap_err();
        assert!(matches!(err, ConvertError::Serialization(ref m) if m.contains("/Names")));
    }

    #[test]
    fn embedded_files_tree_appends() {
        let mut catalog = Catalog::new((1, 0));
        catalog.ensure_embedded_files_tree().append("a.xml", (5, 0));
        catalog.ensure_embedded_files_tree().append("a.xml", (6, 0));

        let tree = catalog.embedded_files().unwrap();
        assert_eq!(tree.len(), 2);
        assert_eq!(tree.entries()[1], ("a.xml".to_string(), (6, 0)));
    }

    #[test]
    fn associated_files_append() {
        let mut catalog = Catalog::new((1, 0));
        assert!(catalog.associated_files().is_empty());
        catalog.append_associated_file((7, 0));
        catalog.append_associated_file((8, 0));
        assert_eq!(catalog.associated_files(), &[(7, 0), (8, 0)]);
    }

    #[test]
    fn complete_catalog_is_flattened() {
        let mut output = applied();
        output.catalog.ensure_embedded_files_tree().append("invoice_1.xml", (40, 0));
        output.catalog.append_associated_file((40, 0));

        let catalog_id = output.catalog_id();
        let catalog = output.catalog.clone();
        catalog.write_into(&mut output.document, catalog_id).unwrap();

        let dict = output.document.get_dictionary(catalog_id).unwrap();
        assert_eq!(dict.get(b"Version").unwrap().as_name().unwrap(), b"1.7");
        let mark_info = dict.get(b"MarkInfo").unwrap().as_dict().unwrap();
        assert!(mark_info.get(b"Marked").unwrap().as_bool().unwrap());

        let ids = dict.get(b"ID").unwrap().as_array().unwrap();
        assert_eq!(ids.len(), 2);
        assert_eq!(ids[0].as_str().unwrap(), ids[1].as_str().unwrap());
        assert_eq!(ids[0].as_str().unwrap().len(), 16);

        let names = dict
            .get(b"Names")
            .and_then(Object::as_dict)
            .and_then(|n| n.get(b"EmbeddedFiles"))
            .and_then(Object::as_dict)
            .and_then(|e| e.get(b"Names"))
            .and_then(Object::as_array)
            .unwrap();
        assert_eq!(names.len(), 2);
        assert_eq!(names[0].as_str().unwrap(), b"invoice_1.xml");
        assert_eq!(names[1].as_reference().unwrap(), (40, 0));
    }

    #[test]
    fn struct_tree_root_is_a_stub() {
        let mut output = applied();
        output.catalog.ensure_embedded_files_tree();
        output.catalog.append_associated_file((1, 0));

        let catalog_id = output.catalog_id();
        let catalog = output.catalog.clone();
        catalog.write_into(&mut output.document, catalog_id).unwrap();

        let dict = output.document.get_dictionary(catalog_id).unwrap();
        let root_id = dict.get(b"StructTreeRoot").unwrap().as_reference().unwrap();
        let root = output.document.get_dictionary(root_id).unwrap();
        assert_eq!(root.get(b"Type").unwrap().as_name().unwrap(), b"StructTreeRoot");
        assert!(root.get(b"K").unwrap().as_array().unwrap().is_empty());
    }

    #[test]
    fn trailer_carries_id_and_info() {
        let output = applied();
        assert!(output.document.trailer.has(b"ID"));
        assert!(output.document.trailer.get(b"Info").unwrap().as_reference().is_ok());
    }
}
