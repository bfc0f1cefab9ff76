use crate::catalog::Catalog;
use crate::{ConvertError, Result};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream};
use std::collections::HashMap;

/// Page attributes a page may inherit from its ancestors in the page tree.
const INHERITABLE_PAGE_KEYS: [&[u8]; 4] = [b"Resources", b"MediaBox", b"CropBox", b"Rotate"];

/// Guards against `/Parent` cycles in broken page trees.
const MAX_PAGE_TREE_DEPTH: usize = 64;

// ── SourceDocument ────────────────────────────────────────────────────────────

/// The parsed input PDF. Read-only for the whole conversion.
pub(crate) struct SourceDocument {
    document: Document,
}

impl SourceDocument {
    /// Parse `data` as a PDF.
    ///
    /// Anything lopdf cannot load (empty input, no `%PDF-` header, broken
    /// cross-reference table) and documents without a catalog are reported as
    /// [`ConvertError::MalformedInput`] carrying the parser diagnostic.
    pub(crate) fn parse(data: &[u8]) -> Result<Self> {
        let document =
            Document::load_mem(data).map_err(|e| ConvertError::MalformedInput(e.to_string()))?;

        document
            .catalog()
            .map_err(|e| ConvertError::MalformedInput(format!("missing or invalid catalog: {e}")))?;

        Ok(Self { document })
    }

    pub(crate) fn document(&self) -> &Document {
        &self.document
    }

    /// Page object ids in document order.
    pub(crate) fn page_ids(&self) -> Vec<ObjectId> {
        // get_pages() is keyed by 1-based page number, so values() is ordered.
        self.document.get_pages().into_values().collect()
    }

    pub(crate) fn page_count(&self) -> usize {
        self.document.get_pages().len()
    }

    /// Every intermediate `/Pages` node reachable from the catalog.
    fn page_tree_nodes(&self) -> Vec<ObjectId> {
        let mut nodes = Vec::new();

        let root = match self
            .document
            .catalog()
            .and_then(|c| c.get(b"Pages"))
            .and_then(Object::as_reference)
        {
            Ok(id) => id,
            Err(_) => return nodes,
        };

        let mut pending = vec![root];
        while let Some(id) = pending.pop() {
            if nodes.contains(&id) {
                continue;
            }
            let node = match self.document.get_dictionary(id) {
                Ok(d) => d,
                Err(_) => continue,
            };
            if let Ok(kids) = node.get(b"Kids").and_then(Object::as_array) {
                nodes.push(id);
                pending.extend(kids.iter().filter_map(|k| k.as_reference().ok()));
            }
        }

        nodes
    }
}

// ── OutputDocument ────────────────────────────────────────────────────────────

/// The document being assembled. Every component of the pipeline writes into
/// this one object graph; the typed [`Catalog`] is only flattened into the
/// object table by the serializer.
pub(crate) struct OutputDocument {
    pub(crate) document: Document,
    pub(crate) catalog: Catalog,
    catalog_id: ObjectId,
    kids: Vec<ObjectId>,
}

impl OutputDocument {
    /// An empty PDF 1.7 document with a page-tree root and a catalog.
    pub(crate) fn new() -> Self {
        let mut document = Document::with_version("1.7");
        let pages_id = document.new_object_id();
        let catalog_id = document.new_object_id();

        document.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => Vec::<Object>::new(),
                "Count" => 0i64,
            }),
        );
        document.objects.insert(
            catalog_id,
            Object::Dictionary(dictionary! {
                "Type" => "Catalog",
                "Pages" => pages_id,
            }),
        );
        document.trailer.set("Root", catalog_id);

        Self {
            document,
            catalog: Catalog::new(pages_id),
            catalog_id,
            kids: Vec::new(),
        }
    }

    pub(crate) fn catalog_id(&self) -> ObjectId {
        self.catalog_id
    }

    #[cfg(test)]
    pub(crate) fn page_count(&self) -> usize {
        self.kids.len()
    }

    /// Structurally copy every page of `source`, in order, below our page-tree
    /// root. Returns the number of pages copied.
    ///
    /// Objects reachable from a page are copied once and stay shared between
    /// pages that shared them; stream bytes are copied verbatim.
    pub(crate) fn copy_pages_from(&mut self, source: &SourceDocument) -> Result<usize> {
        let page_ids = source.page_ids();
        let pages_id = self.catalog.pages();

        let mut copier = ObjectCopier::new(source.document(), &mut self.document);

        // Source page-tree nodes collapse onto our root, so a page's /Parent
        // (or any stray reference into the old tree) lands there.
        for node in source.page_tree_nodes() {
            copier.alias(node, pages_id);
        }

        // Reserve page ids up front: link annotations and destinations may
        // point at pages that have not been copied yet.
        let targets: Vec<ObjectId> = page_ids.iter().map(|&id| copier.reserve(id)).collect();

        for (&page_id, &target_id) in page_ids.iter().zip(&targets) {
            copier.copy_page(page_id, target_id, pages_id)?;
        }
        copier.drain();

        log::debug!(
            "copied {} page(s), {} object(s) in output",
            targets.len(),
            self.document.objects.len()
        );

        self.kids.extend(targets);
        self.update_page_tree();
        Ok(self.kids.len())
    }

    fn update_page_tree(&mut self) {
        let kids: Vec<Object> = self.kids.iter().map(|&id| Object::Reference(id)).collect();
        self.document.objects.insert(
            self.catalog.pages(),
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => self.kids.len() as i64,
            }),
        );
    }
}

// ── ObjectCopier ──────────────────────────────────────────────────────────────

/// Copies objects from one document into another, renumbering references.
///
/// Referenced objects are queued rather than copied recursively so long
/// reference chains cannot exhaust the stack.
struct ObjectCopier<'a> {
    source: &'a Document,
    target: &'a mut Document,
    mapping: HashMap<ObjectId, ObjectId>,
    pending: Vec<ObjectId>,
}

impl<'a> ObjectCopier<'a> {
    fn new(source: &'a Document, target: &'a mut Document) -> Self {
        Self {
            source,
            target,
            mapping: HashMap::new(),
            pending: Vec::new(),
        }
    }

    /// Map `source_id` to an existing target object without copying it.
    fn alias(&mut self, source_id: ObjectId, target_id: ObjectId) {
        self.mapping.insert(source_id, target_id);
    }

    /// Allocate a target id for `source_id` without queueing a copy.
    fn reserve(&mut self, source_id: ObjectId) -> ObjectId {
        if let Some(&id) = self.mapping.get(&source_id) {
            return id;
        }
        let id = self.target.new_object_id();
        self.mapping.insert(source_id, id);
        id
    }

    fn copy_page(&mut self, page_id: ObjectId, target_id: ObjectId, parent: ObjectId) -> Result<()> {
        let source = self.source;
        let page = source.get_dictionary(page_id).map_err(|e| {
            ConvertError::MalformedInput(format!("page {} {} R is unreadable: {e}", page_id.0, page_id.1))
        })?;

        let mut page = page.clone();
        for key in INHERITABLE_PAGE_KEYS {
            if page.has(key) {
                continue;
            }
            if let Some(value) = inherited_attribute(source, &page, key) {
                page.set(key.to_vec(), value.clone());
            }
        }

        let mut copied = self.rewrite_dict(&page);
        copied.set("Type", "Page");
        copied.set("Parent", parent);
        self.target.objects.insert(target_id, Object::Dictionary(copied));
        Ok(())
    }

    /// Copy everything queued so far, including what those copies queue.
    fn drain(&mut self) {
        let source = self.source;
        while let Some(source_id) = self.pending.pop() {
            let copied = match source.get_object(source_id) {
                Ok(object) => self.rewrite(object),
                // A reference to a missing object reads as null.
                Err(_) => Object::Null,
            };
            let target_id = self.mapping[&source_id];
            self.target.objects.insert(target_id, copied);
        }
    }

    fn map_reference(&mut self, source_id: ObjectId) -> ObjectId {
        if let Some(&id) = self.mapping.get(&source_id) {
            return id;
        }
        let id = self.target.new_object_id();
        self.mapping.insert(source_id, id);
        self.pending.push(source_id);
        id
    }

    fn rewrite(&mut self, object: &Object) -> Object {
        match object {
            Object::Reference(id) => Object::Reference(self.map_reference(*id)),
            Object::Array(items) => Object::Array(items.iter().map(|o| self.rewrite(o)).collect()),
            Object::Dictionary(dict) => Object::Dictionary(self.rewrite_dict(dict)),
            Object::Stream(stream) => {
                // Stream::new recomputes /Length; an indirect one would be
                // copied as an orphan.
                let mut dict = stream.dict.clone();
                dict.remove(b"Length");
                let mut copy = Stream::new(self.rewrite_dict(&dict), stream.content.clone());
                copy.allows_compression = stream.allows_compression;
                Object::Stream(copy)
            }
            other => other.clone(),
        }
    }

    fn rewrite_dict(&mut self, dict: &Dictionary) -> Dictionary {
        let mut out = Dictionary::new();
        for (key, value) in dict.iter() {
            out.set(key.clone(), self.rewrite(value));
        }
        out
    }
}

/// Look `key` up on the ancestors of `page`.
fn inherited_attribute<'a>(document: &'a Document, page: &Dictionary, key: &[u8]) -> Option<&'a Object> {
    let mut parent = page.get(b"Parent").and_then(Object::as_reference).ok();

    for _ in 0..MAX_PAGE_TREE_DEPTH {
        let node = document.get_dictionary(parent?).ok()?;
        if let Ok(value) = node.get(key) {
            return Some(value);
        }
        parent = node.get(b"Parent").and_then(Object::as_reference).ok();
    }

    None
}

// ── Test fixtures ─────────────────────────────────────────────────────────────
