use lopdf::{Dictionary, Object, ObjectId};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::viewport::{compute_viewport, Viewport};

/// US Letter, used when a page declares neither a CropBox nor a MediaBox.
const DEFAULT_PAGE_BOX: [f64; 4] = [0.0, 0.0, 612.0, 792.0];

/// How far into the buffer the `%PDF-` marker may appear.
const HEADER_SEARCH_WINDOW: usize = 1024;

/// Guards the `/Parent` walk against cyclic page trees.
const MAX_TREE_DEPTH: usize = 32;

static NEXT_DOCUMENT_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocumentId(u64);

impl DocumentId {
    fn next() -> Self {
        Self(NEXT_DOCUMENT_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DocumentError {
    #[error("corrupt document: {0}")]
    Corrupt(String),
    #[error("unsupported document: {0}")]
    Unsupported(String),
    #[error("page {page} out of range (page_count={page_count})")]
    PageOutOfRange { page: u32, page_count: u32 },
}

/// Intrinsic page rotation, clockwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Rotation {
    #[default]
    None,
    Cw90,
    Cw180,
    Cw270,
}

impl Rotation {
    /// Normalizes a `/Rotate` value. Returns `None` for angles that are not a
    /// multiple of 90.
    pub fn from_degrees(degrees: i64) -> Option<Self> {
        match degrees.rem_euclid(360) {
            0 => Some(Self::None),
            90 => Some(Self::Cw90),
            180 => Some(Self::Cw180),
            270 => Some(Self::Cw270),
            _ => None,
        }
    }

    pub fn degrees(self) -> u16 {
        match self {
            Self::None => 0,
            Self::Cw90 => 90,
            Self::Cw180 => 180,
            Self::Cw270 => 270,
        }
    }

    /// Whether the rotation swaps the page's width and height on screen.
    pub fn is_quarter_turn(self) -> bool {
        matches!(self, Self::Cw90 | Self::Cw270)
    }
}

/// Decoded content of a page, or the reason it could not be read.
///
/// An unreadable stream only fails its own page when rasterized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageContent {
    Stream(Vec<u8>),
    Unreadable(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    index: u32,
    page_box: [f64; 4],
    rotation: Rotation,
    content: PageContent,
}

impl Page {
    /// Builds a page from already-validated geometry.
    pub fn new(index: u32, page_box: [f64; 4], rotation: Rotation, content: PageContent) -> Self {
        Self { index, page_box: normalize_box(page_box), rotation, content }
    }

    /// 1-based position in the document.
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Intrinsic width in points, before rotation.
    pub fn width(&self) -> f64 {
        self.page_box[2] - self.page_box[0]
    }

    /// Intrinsic height in points, before rotation.
    pub fn height(&self) -> f64 {
        self.page_box[3] - self.page_box[1]
    }

    /// The visible page box `[x0, y0, x1, y1]` in PDF user space.
    pub fn page_box(&self) -> [f64; 4] {
        self.page_box
    }

    pub fn rotation(&self) -> Rotation {
        self.rotation
    }

    pub fn content(&self) -> &PageContent {
        &self.content
    }

    pub fn viewport(&self, scale: f64) -> Viewport {
        compute_viewport(self, scale)
    }
}

#[derive(Debug)]
pub struct Document {
    id: DocumentId,
    pages: Vec<Page>,
}

impl Document {
    pub fn open(bytes: &[u8]) -> Result<Self, DocumentError> {
        let window = &bytes[..bytes.len().min(HEADER_SEARCH_WINDOW)];
        if !window.windows(b"%PDF-".len()).any(|candidate| candidate == b"%PDF-") {
            return Err(DocumentError::Corrupt("missing %PDF- header".to_owned()));
        }

        let doc = lopdf::Document::load_mem(bytes)
            .map_err(|err| DocumentError::Corrupt(err.to_string()))?;

        if doc.trailer.get(b"Encrypt").is_ok() {
            return Err(DocumentError::Unsupported("encrypted documents".to_owned()));
        }

        let mut pages = Vec::new();
        for (number, object_id) in doc.get_pages() {
            pages.push(read_page(&doc, number, object_id)?);
        }

        if pages.is_empty() {
            return Err(DocumentError::Corrupt("document has no pages".to_owned()));
        }

        let document = Self { id: DocumentId::next(), pages };
        log::debug!("opened document {} with {} page(s)", document.id.raw(), document.page_count());

        Ok(document)
    }

    /// Wraps already-built pages, mainly for alternative backends and tests.
    pub fn from_pages(pages: Vec<Page>) -> Result<Self, DocumentError> {
        if pages.is_empty() {
            return Err(DocumentError::Corrupt("document has no pages".to_owned()));
        }

        Ok(Self { id: DocumentId::next(), pages })
    }

    pub fn id(&self) -> DocumentId {
        self.id
    }

    pub fn page_count(&self) -> u32 {
        self.pages.len() as u32
    }

    pub fn page(&self, index: u32) -> Result<&Page, DocumentError> {
        index
            .checked_sub(1)
            .and_then(|zero_based| self.pages.get(zero_based as usize))
            .ok_or(DocumentError::PageOutOfRange { page: index, page_count: self.page_count() })
    }

    pub fn pages(&self) -> impl Iterator<Item = &Page> {
        self.pages.iter()
    }
}

fn read_page(doc: &lopdf::Document, index: u32, object_id: ObjectId) -> Result<Page, DocumentError> {
    let dict = doc.get_dictionary(object_id).map_err(|err| {
        DocumentError::Corrupt(format!("page {index} is not a dictionary: {err}"))
    })?;

    let page_box = match inherited_box(doc, dict, b"CropBox") {
        Some(crop) => crop,
        None => inherited_box(doc, dict, b"MediaBox").unwrap_or(DEFAULT_PAGE_BOX),
    };
    let page_box = normalize_box(page_box);

    if page_box[2] - page_box[0] <= 0.0 || page_box[3] - page_box[1] <= 0.0 {
        return Err(DocumentError::Corrupt(format!("page {index} has an empty page box")));
    }

    let rotation = match inherited(doc, dict, b"Rotate") {
        Some(value) => {
            let degrees = value.as_i64().map_err(|err| {
                DocumentError::Corrupt(format!("page {index} has a non-integer /Rotate: {err}"))
            })?;
            Rotation::from_degrees(degrees).ok_or_else(|| {
                DocumentError::Unsupported(format!("page {index} is rotated by {degrees} degrees"))
            })?
        }
        None => Rotation::None,
    };

    Ok(Page::new(index, page_box, rotation, read_content(doc, dict)))
}

/// Looks `key` up on the page, then on its ancestors in the page tree.
fn inherited<'a>(doc: &'a lopdf::Document, page: &'a Dictionary, key: &[u8]) -> Option<&'a Object> {
    let mut node = page;

    for _ in 0..MAX_TREE_DEPTH {
        if let Ok(value) = node.get(key) {
            return resolve(doc, value);
        }

        let parent = node.get(b"Parent").ok()?.as_reference().ok()?;
        node = doc.get_dictionary(parent).ok()?;
    }

    None
}

fn inherited_box(doc: &lopdf::Document, page: &Dictionary, key: &[u8]) -> Option<[f64; 4]> {
    let array = inherited(doc, page, key)?.as_array().ok()?;
    if array.len() != 4 {
        return None;
    }

    let mut values = [0.0; 4];
    for (slot, item) in values.iter_mut().zip(array) {
        *slot = f64::from(resolve(doc, item)?.as_float().ok()?);
    }

    Some(values)
}

fn resolve<'a>(doc: &'a lopdf::Document, object: &'a Object) -> Option<&'a Object> {
    match object {
        Object::Reference(id) => doc.get_object(*id).ok(),
        other => Some(other),
    }
}

fn read_content(doc: &lopdf::Document, page: &Dictionary) -> PageContent {
    let Ok(contents) = page.get(b"Contents") else {
        return PageContent::Stream(Vec::new());
    };

    let Some(contents) = resolve(doc, contents) else {
        return PageContent::Unreadable("dangling /Contents reference".to_owned());
    };

    let parts: Vec<&Object> = match contents {
        Object::Array(items) => items.iter().collect(),
        single => vec![single],
    };

    let mut bytes = Vec::new();
    for part in parts {
        let stream = match resolve(doc, part).map(Object::as_stream) {
            Some(Ok(stream)) => stream,
            _ => return PageContent::Unreadable("/Contents entry is not a stream".to_owned()),
        };

        if stream.dict.get(b"Filter").is_ok() {
            match stream.decompressed_content() {
                Ok(decoded) => bytes.extend_from_slice(&decoded),
                Err(err) => return PageContent::Unreadable(format!("stream filter failed: {err}")),
            }
        } else {
            bytes.extend_from_slice(&stream.content);
        }

        // Content streams split across parts are concatenated on whitespace.
        bytes.push(b'\n');
    }

    PageContent::Stream(bytes)
}

fn normalize_box([x0, y0, x1, y1]: [f64; 4]) -> [f64; 4] {
    [x0.min(x1), y0.min(y1), x0.max(x1), y0.max(y1)]
}
