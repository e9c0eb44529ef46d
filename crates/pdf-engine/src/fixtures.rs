//! In-memory PDF builders for tests.

use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Object, Stream};

#[derive(Debug, Clone)]
pub struct FixturePage {
    pub media_box: [f32; 4],
    pub crop_box: Option<[f32; 4]>,
    pub rotate: Option<i64>,
    pub operations: Vec<Operation>,
}

/// An unrotated US Letter page with a dark header bar and a ruled line.
pub fn letter_page() -> FixturePage {
    let mut operations = filled_rect([0.2, 0.2, 0.2], 36.0, 720.0, 540.0, 36.0);
    operations.extend([
        Operation::new("q", vec![]),
        Operation::new("w", vec![Object::Real(2.0)]),
        Operation::new("RG", vec![Object::Real(0.0), Object::Real(0.0), Object::Real(1.0)]),
        Operation::new("m", vec![Object::Integer(36), Object::Integer(400)]),
        Operation::new("l", vec![Object::Integer(576), Object::Integer(400)]),
        Operation::new("S", vec![]),
        Operation::new("Q", vec![]),
    ]);

    FixturePage { media_box: [0.0, 0.0, 612.0, 792.0], crop_box: None, rotate: None, operations }
}

/// A page whose `re` operator carries a name instead of numbers.
pub fn malformed_page() -> FixturePage {
    FixturePage {
        operations: vec![
            Operation::new("re", vec![Object::Name(b"oops".to_vec())]),
            Operation::new("f", vec![]),
        ],
        ..letter_page()
    }
}

/// Fills a rectangle given in PDF user space with an RGB colour.
pub fn filled_rect(rgb: [f32; 3], x: f32, y: f32, width: f32, height: f32) -> Vec<Operation> {
    vec![
        Operation::new("q", vec![]),
        Operation::new("rg", rgb.iter().map(|&channel| Object::Real(channel)).collect()),
        Operation::new(
            "re",
            vec![Object::Real(x), Object::Real(y), Object::Real(width), Object::Real(height)],
        ),
        Operation::new("f", vec![]),
        Operation::new("Q", vec![]),
    ]
}

pub fn two_page_letter() -> Vec<u8> {
    build_pdf(&[letter_page(), letter_page()], false)
}

/// Serializes `pages` into a complete PDF file.
///
/// With `encrypted` set the trailer references a standard security handler
/// dictionary; the page content itself is left in the clear.
pub fn build_pdf(pages: &[FixturePage], encrypted: bool) -> Vec<u8> {
    let mut doc = lopdf::Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let mut kids = Vec::with_capacity(pages.len());
    for page in pages {
        let content = Content { operations: page.operations.clone() };
        let encoded = content.encode().expect("fixture content should encode");
        let content_id = doc.add_object(Stream::new(Dictionary::new(), encoded));

        let mut dict = Dictionary::new();
        dict.set("Type", Object::Name(b"Page".to_vec()));
        dict.set("Parent", Object::Reference(pages_id));
        dict.set("MediaBox", rect(page.media_box));
        if let Some(crop_box) = page.crop_box {
            dict.set("CropBox", rect(crop_box));
        }
        if let Some(rotate) = page.rotate {
            dict.set("Rotate", Object::Integer(rotate));
        }
        dict.set("Contents", Object::Reference(content_id));

        kids.push(Object::Reference(doc.add_object(dict)));
    }

    let mut tree = Dictionary::new();
    tree.set("Type", Object::Name(b"Pages".to_vec()));
    tree.set("Count", Object::Integer(kids.len() as i64));
    tree.set("Kids", Object::Array(kids));
    doc.objects.insert(pages_id, Object::Dictionary(tree));

    let mut catalog = Dictionary::new();
    catalog.set("Type", Object::Name(b"Catalog".to_vec()));
    catalog.set("Pages", Object::Reference(pages_id));
    let catalog_id = doc.add_object(catalog);
    doc.trailer.set("Root", Object::Reference(catalog_id));

    if encrypted {
        let mut handler = Dictionary::new();
        handler.set("Filter", Object::Name(b"Standard".to_vec()));
        handler.set("V", Object::Integer(1));
        handler.set("R", Object::Integer(2));
        handler.set("P", Object::Integer(-44));
        let handler_id = doc.add_object(handler);
        doc.trailer.set("Encrypt", Object::Reference(handler_id));
    }

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).expect("fixture document should serialize");
    bytes
}

fn rect([x0, y0, x1, y1]: [f32; 4]) -> Object {
    Object::Array(vec![Object::Real(x0), Object::Real(y0), Object::Real(x1), Object::Real(y1)])
}
