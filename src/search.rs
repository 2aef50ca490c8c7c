//! Approximate snippet search over a page's text layer.
//!
//! Page text and snippet are both NFKC-normalized, typographic quotes and
//! hyphens are folded to ASCII, and whitespace runs collapse to one space.
//! Matching then tries, in order: exact, case-insensitive, and
//! whitespace-insensitive comparison. The first occurrence wins.

use tracing::debug;
use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

use crate::output::{Glyph, PageText};
use crate::types::Rect;

// Horizontal gap, as a fraction of the em size, that reads as a word break.
const SPACE_THRESHOLD_RATIO: f64 = 0.15;
// Baseline shift, as a fraction of the em size, that reads as a new line.
const LINE_THRESHOLD_RATIO: f64 = 0.5;

/// Inclusive range of glyph indices a character was produced from.
type GlyphSpan = (usize, usize);

/// Flattened page text where every character remembers its glyphs.
/// Whitespace maps to no glyph so it never widens a match.
#[derive(Debug, Default)]
struct TextIndex {
    chars: Vec<char>,
    sources: Vec<Option<GlyphSpan>>,
}

impl TextIndex {
    fn push(&mut self, c: char, source: Option<GlyphSpan>) {
        if c.is_whitespace() {
            if self.chars.last().is_some_and(|last| *last != ' ') {
                self.chars.push(' ');
                self.sources.push(None);
            }
        } else {
            self.chars.push(c);
            self.sources.push(source);
        }
    }

    fn finish(mut self) -> TextIndex {
        if self.chars.last() == Some(&' ') {
            self.chars.pop();
            self.sources.pop();
        }
        self
    }

    fn lowercase(&self) -> TextIndex {
        TextIndex {
            chars: self.chars.iter().map(|c| lower(*c)).collect(),
            sources: self.sources.clone(),
        }
    }

    fn compact(&self) -> TextIndex {
        let (chars, sources) = self
            .chars
            .iter()
            .zip(&self.sources)
            .filter(|(c, _)| **c != ' ')
            .map(|(c, s)| (*c, *s))
            .unzip();
        TextIndex { chars, sources }
    }

    fn find(&self, needle: &[char]) -> Option<std::ops::Range<usize>> {
        if needle.is_empty() || needle.len() > self.chars.len() {
            return None;
        }
        self.chars
            .windows(needle.len())
            .position(|window| window == needle)
            .map(|start| start..start + needle.len())
    }
}

fn fold(c: char) -> char {
    match c {
        '\u{2018}' | '\u{2019}' | '\u{201b}' | '\u{2032}' => '\'',
        '\u{201c}' | '\u{201d}' | '\u{201f}' | '\u{2033}' => '"',
        '\u{2010}' | '\u{2011}' | '\u{2212}' => '-',
        _ => c,
    }
}

fn lower(c: char) -> char {
    let mut lowered = c.to_lowercase();
    match (lowered.next(), lowered.next()) {
        (Some(l), None) => l,
        _ => c,
    }
}

fn normalize_into(index: &mut TextIndex, text: &str, source: Option<GlyphSpan>) {
    for c in text.nfkc() {
        index.push(fold(c), source);
    }
}

fn normalize_snippet(snippet: &str) -> Vec<char> {
    let mut index = TextIndex::default();
    normalize_into(&mut index, snippet, None);
    index.finish().chars
}

/// Whether a word or line break sits between two consecutive glyphs.
fn breaks_between(prev: &Glyph, next: &Glyph) -> bool {
    let size = prev.size.max(next.size).max(f64::EPSILON);
    let dy = (next.origin.1 - prev.end.1).abs();
    if dy > size * LINE_THRESHOLD_RATIO {
        return true;
    }
    let gap = next.origin.0 - prev.end.0;
    gap > size * SPACE_THRESHOLD_RATIO || gap < -size * LINE_THRESHOLD_RATIO
}

fn is_mark_only(text: &str) -> bool {
    !text.is_empty() && text.chars().all(is_combining_mark)
}

/// A base glyph plus any combining marks drawn as glyphs of their own.
/// Normalizing the cluster as a whole lets `e` followed by U+0301 compose.
struct Cluster {
    text: String,
    span: GlyphSpan,
}

fn clusters(page: &PageText) -> Vec<Cluster> {
    let mut clusters: Vec<Cluster> = Vec::with_capacity(page.glyphs.len());
    for (i, glyph) in page.glyphs.iter().enumerate() {
        if is_mark_only(&glyph.text) {
            if let Some(base) = clusters
                .last_mut()
                .filter(|c| !page.glyphs[c.span.1].is_whitespace())
            {
                base.text.push_str(&glyph.text);
                base.span.1 = i;
                continue;
            }
        }
        clusters.push(Cluster {
            text: glyph.text.clone(),
            span: (i, i),
        });
    }
    clusters
}

fn build_index(page: &PageText) -> TextIndex {
    let mut index = TextIndex::default();
    let mut prev: Option<&Glyph> = None;
    for cluster in clusters(page) {
        let first = &page.glyphs[cluster.span.0];
        if let Some(prev) = prev {
            if !prev.is_whitespace() && !first.is_whitespace() && breaks_between(prev, first) {
                index.push(' ', None);
            }
        }
        normalize_into(&mut index, &cluster.text, Some(cluster.span));
        prev = Some(&page.glyphs[cluster.span.1]);
    }
    index.finish()
}

fn union_of(page: &PageText, sources: &[Option<GlyphSpan>]) -> Option<Rect> {
    sources
        .iter()
        .flatten()
        .flat_map(|&(first, last)| first..=last)
        .map(|i| page.glyphs[i].bbox)
        .reduce(|acc, bbox| acc.union(&bbox))
}

/// The flattened, normalized text of a page as matching sees it.
pub(crate) fn page_string(page: &PageText) -> String {
    build_index(page).chars.into_iter().collect()
}

/// Find `snippet` on `page` and return the union of the glyph boxes it covers.
pub(crate) fn locate_in_page(page: &PageText, snippet: &str) -> Option<Rect> {
    let needle = normalize_snippet(snippet);
    if needle.is_empty() {
        return None;
    }

    let index = build_index(page);
    if let Some(range) = index.find(&needle) {
        return union_of(page, &index.sources[range]);
    }

    let lowered = index.lowercase();
    let lowered_needle: Vec<char> = needle.iter().map(|c| lower(*c)).collect();
    if let Some(range) = lowered.find(&lowered_needle) {
        debug!("case-insensitive match on page {}", page.page);
        return union_of(page, &lowered.sources[range]);
    }

    let compact = lowered.compact();
    let compact_needle: Vec<char> = lowered_needle.into_iter().filter(|c| *c != ' ').collect();
    if let Some(range) = compact.find(&compact_needle) {
        debug!("whitespace-insensitive match on page {}", page.page);
        return union_of(page, &compact.sources[range]);
    }

    None
}
