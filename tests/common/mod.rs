#![allow(dead_code)]

use lopdf::{Document, Object, ObjectId, Stream, dictionary};

use field_locator::Rect;

pub const LETTER: [i64; 4] = [0, 0, 612, 792];
pub const A4: [i64; 4] = [0, 0, 595, 842];

/// Page 1 (Letter), Helvetica 10pt:
///   "GAP Premium: $500.00"     baseline y=700
///   "Refund Method: Pro Rata"  baseline y=680
pub const PAGE_ONE: &[u8] = b"BT /F1 10 Tf 100 700 Td (GAP Premium: $500.00) Tj ET
BT /F1 10 Tf 100 680 Td (Refund Method: Pro Rata) Tj ET";

/// Page 2 (A4): a kerned Helvetica line and a Courier 12pt line.
pub const PAGE_TWO: &[u8] = b"BT /F1 10 Tf 72 720 Td [(Cancel) 20 (lation Fee: $75.00)] TJ ET
BT /F2 12 Tf 72 600 Td (Dealer: Acme Motors) Tj ET";

fn font(base: &str) -> Object {
    Object::Dictionary(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => base,
        "Encoding" => "WinAnsiEncoding",
    })
}

/// Build a PDF from `(MediaBox, content stream)` pairs. Fonts `F1`
/// (Helvetica) and `F2` (Courier) are inherited from the page tree.
pub fn build_pdf(pages: &[([i64; 4], &[u8])]) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id: ObjectId = doc.new_object_id();

    let mut kids: Vec<Object> = Vec::new();
    for (media_box, content) in pages {
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.to_vec()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => media_box.iter().map(|v| Object::Integer(*v)).collect::<Vec<_>>(),
            "Contents" => content_id,
        });
        kids.push(page_id.into());
    }

    let fonts_id = doc.add_object(dictionary! {
        "F1" => font("Helvetica"),
        "F2" => font("Courier"),
    });
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => pages.len() as i64,
            "Resources" => dictionary! { "Font" => fonts_id },
        }),
    );

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut buf = Vec::new();
    doc.save_to(&mut buf).unwrap();
    buf
}

pub fn contract_pdf() -> Vec<u8> {
    build_pdf(&[(LETTER, PAGE_ONE), (A4, PAGE_TWO)])
}

pub fn assert_rect_near(actual: Rect, expected: Rect) {
    let close = |a: f64, b: f64| (a - b).abs() < 1e-6;
    assert!(
        close(actual.x, expected.x)
            && close(actual.y, expected.y)
            && close(actual.width, expected.width)
            && close(actual.height, expected.height),
        "expected {}, got {}",
        expected,
        actual
    );
}
