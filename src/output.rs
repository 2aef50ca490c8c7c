use euclid::{point2, vec2};

use crate::types::{MediaBox, Rect, Transform};

/// Fraction of the em box above the baseline.
const ASCENT: f64 = 0.8;
/// Fraction of the em box below the baseline.
const DESCENT: f64 = 0.2;

/// One decoded character placed on the page.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Glyph {
    pub(crate) text: String,
    pub(crate) bbox: Rect,
    /// Baseline start, in page space.
    pub(crate) origin: (f64, f64),
    /// Baseline end after the advance, in page space.
    pub(crate) end: (f64, f64),
    /// Rendered em size in page units.
    pub(crate) size: f64,
}

impl Glyph {
    pub(crate) fn is_whitespace(&self) -> bool {
        self.text.chars().all(char::is_whitespace)
    }
}

/// Text content of a single page, glyphs in content-stream order.
#[derive(Debug, Clone, Default)]
pub(crate) struct PageText {
    pub(crate) page: u32,
    pub(crate) glyphs: Vec<Glyph>,
}

impl PageText {
    pub(crate) fn empty(page: u32) -> PageText {
        PageText {
            page,
            glyphs: Vec::new(),
        }
    }
}

pub(crate) struct GlyphCollector {
    flip_ctm: Transform,
    page: u32,
    glyphs: Vec<Glyph>,
}

impl GlyphCollector {
    pub(crate) fn new(page: u32, media_box: &MediaBox) -> GlyphCollector {
        GlyphCollector {
            // Move the MediaBox origin to its top-left corner and point y down.
            flip_ctm: Transform::new(1., 0., 0., -1., -media_box.llx, media_box.ury),
            page,
            glyphs: Vec::new(),
        }
    }

    /// Record one character. `trm` maps unscaled text space to user space,
    /// `width` is the advance in text-space units.
    pub(crate) fn output_character(
        &mut self,
        trm: &Transform,
        width: f64,
        font_size: f64,
        char: &str,
    ) {
        if char.is_empty() {
            return;
        }
        let full = trm.then(&self.flip_ctm);
        let advance = width * font_size;
        let corners = [
            (0., -DESCENT * font_size),
            (advance, -DESCENT * font_size),
            (0., ASCENT * font_size),
            (advance, ASCENT * font_size),
        ]
        .map(|(x, y)| {
            let p = full.transform_point(point2(x, y));
            (p.x, p.y)
        });
        let Some(bbox) = Rect::from_points(corners) else {
            return;
        };
        let origin = full.transform_point(point2(0., 0.));
        let end = full.transform_point(point2(advance, 0.));
        let size = full.transform_vector(vec2(0., font_size)).length();

        let normalized_char = if char == "\t" { " " } else { char };
        self.glyphs.push(Glyph {
            text: normalized_char.to_owned(),
            bbox,
            origin: (origin.x, origin.y),
            end: (end.x, end.y),
            size,
        });
    }

    pub(crate) fn into_page_text(self) -> PageText {
        PageText {
            page: self.page,
            glyphs: self.glyphs,
        }
    }
}
