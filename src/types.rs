use std::fmt;
use std::path::Path;
use std::sync::Arc;

use euclid::Transform2D;
use serde::{Deserialize, Serialize};

pub(crate) struct Space;
pub(crate) type Transform = Transform2D<f64, Space, Space>;

/// Axis-aligned rectangle in page space.
///
/// Page space is PDF points with the origin at the top-left corner of the
/// page's MediaBox and y growing downward. Values are not validated: negative
/// or out-of-page coordinates are carried as given.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    #[serde(alias = "w")]
    pub width: f64,
    #[serde(alias = "h")]
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Rect {
        Rect {
            x,
            y,
            width,
            height,
        }
    }

    /// Smallest rectangle containing every point given.
    pub fn from_points(points: impl IntoIterator<Item = (f64, f64)>) -> Option<Rect> {
        let mut points = points.into_iter();
        let (x0, y0) = points.next()?;
        let (mut min_x, mut min_y, mut max_x, mut max_y) = (x0, y0, x0, y0);
        for (x, y) in points {
            min_x = min_x.min(x);
            min_y = min_y.min(y);
            max_x = max_x.max(x);
            max_y = max_y.max(y);
        }
        Some(Rect::new(min_x, min_y, max_x - min_x, max_y - min_y))
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    pub fn area(&self) -> f64 {
        self.width.max(0.) * self.height.max(0.)
    }

    pub fn union(&self, other: &Rect) -> Rect {
        let x = self.x.min(other.x);
        let y = self.y.min(other.y);
        Rect::new(
            x,
            y,
            self.right().max(other.right()) - x,
            self.bottom().max(other.bottom()) - y,
        )
    }

    /// Overlapping region, or `None` when the rectangles do not overlap.
    pub fn intersection(&self, other: &Rect) -> Option<Rect> {
        let x = self.x.max(other.x);
        let y = self.y.max(other.y);
        let right = self.right().min(other.right());
        let bottom = self.bottom().min(other.bottom());
        if right <= x || bottom <= y {
            return None;
        }
        Some(Rect::new(x, y, right - x, bottom - y))
    }
}

impl fmt::Display for Rect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "(x: {:.1}, y: {:.1}, w: {:.1}, h: {:.1})",
            self.x, self.y, self.width, self.height
        )
    }
}

/// Size of a page's MediaBox in points.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageSize {
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct MediaBox {
    pub llx: f64,
    pub lly: f64,
    pub urx: f64,
    pub ury: f64,
}

impl MediaBox {
    pub(crate) fn size(&self) -> PageSize {
        PageSize {
            width: (self.urx - self.llx).abs(),
            height: (self.ury - self.lly).abs(),
        }
    }
}

/// Where an extracted value came from in the source document.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceLocation {
    /// 1-based page number.
    #[serde(default)]
    pub page: Option<u32>,
    /// Snippet expected to appear on the page near the value.
    #[serde(default)]
    pub text: Option<String>,
    /// Previously resolved box; trusted without re-verification.
    #[serde(default)]
    pub bbox: Option<Rect>,
}

/// One AI-extracted contract field, as delivered by the data layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedField {
    pub field_key: String,
    #[serde(default)]
    pub display_name: String,
    /// Extraction confidence, 0 to 100.
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub source: Option<SourceLocation>,
}

impl ExtractedField {
    pub fn new(field_key: impl Into<String>, display_name: impl Into<String>) -> ExtractedField {
        ExtractedField {
            field_key: field_key.into(),
            display_name: display_name.into(),
            confidence: None,
            source: None,
        }
    }

    pub fn with_confidence(mut self, confidence: f64) -> ExtractedField {
        self.confidence = Some(confidence);
        self
    }

    pub fn with_source(mut self, source: SourceLocation) -> ExtractedField {
        self.source = Some(source);
        self
    }

    /// Name shown to the reviewer, falling back to the key.
    pub fn label(&self) -> &str {
        if self.display_name.is_empty() {
            &self.field_key
        } else {
            &self.display_name
        }
    }
}

/// A resolved, colored rectangle for one field on one page.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Highlight {
    /// The field's stable key.
    pub field_name: String,
    pub display_name: String,
    pub page: u32,
    pub bbox: Rect,
    pub color: String,
    pub confidence: Option<f64>,
}

impl Highlight {
    pub(crate) fn for_field(
        field: &ExtractedField,
        page: u32,
        bbox: Rect,
        palette: &Palette,
    ) -> Highlight {
        Highlight {
            field_name: field.field_key.clone(),
            display_name: field.label().to_owned(),
            page,
            bbox,
            color: palette.color_for(field.confidence).to_owned(),
            confidence: field.confidence,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfidenceTier {
    High,
    Medium,
    Low,
    /// No confidence was reported. Distinct from `Low`.
    Unset,
}

impl ConfidenceTier {
    pub fn of(confidence: Option<f64>) -> ConfidenceTier {
        match confidence {
            None => ConfidenceTier::Unset,
            Some(c) if c >= 90. => ConfidenceTier::High,
            Some(c) if c >= 70. => ConfidenceTier::Medium,
            Some(_) => ConfidenceTier::Low,
        }
    }
}

/// Overlay colors per confidence tier.
#[derive(Debug, Clone, PartialEq)]
pub struct Palette {
    pub high: String,
    pub medium: String,
    pub low: String,
    pub unset: String,
}

impl Default for Palette {
    fn default() -> Self {
        Palette {
            high: "rgba(34, 197, 94, 0.35)".to_owned(),
            medium: "rgba(234, 179, 8, 0.35)".to_owned(),
            low: "rgba(239, 68, 68, 0.35)".to_owned(),
            unset: "rgba(59, 130, 246, 0.35)".to_owned(),
        }
    }
}

impl Palette {
    pub fn color(&self, tier: ConfidenceTier) -> &str {
        match tier {
            ConfidenceTier::High => &self.high,
            ConfidenceTier::Medium => &self.medium,
            ConfidenceTier::Low => &self.low,
            ConfidenceTier::Unset => &self.unset,
        }
    }

    pub fn color_for(&self, confidence: Option<f64>) -> &str {
        self.color(ConfidenceTier::of(confidence))
    }
}

/// A ready-to-parse document and the identity it is known by.
#[derive(Debug, Clone)]
pub struct DocumentSource {
    id: String,
    bytes: Arc<[u8]>,
}

impl DocumentSource {
    pub fn new(id: impl Into<String>, bytes: impl Into<Arc<[u8]>>) -> DocumentSource {
        DocumentSource {
            id: id.into(),
            bytes: bytes.into(),
        }
    }

    /// Read a document from disk, using the path as its identity.
    pub fn from_path<P: AsRef<Path>>(path: P) -> std::io::Result<DocumentSource> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)?;
        Ok(DocumentSource::new(path.display().to_string(), bytes))
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub(crate) fn shared_bytes(&self) -> Arc<[u8]> {
        Arc::clone(&self.bytes)
    }
}
