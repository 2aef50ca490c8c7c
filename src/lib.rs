//! Field location and highlight synchronization for PDF contracts
//!
//! This library maps AI-extracted contract fields onto the PDF pages they came
//! from. Fields that carry a cached box are used as-is; the rest are located by
//! searching each page's text layer for the field's snippet. The resulting
//! highlights are rendered as per-page overlays, and a viewport controller
//! keeps track of the current page while honoring programmatic jumps.

mod error;
mod extract;
mod fonts;
mod output;
mod overlay;
mod processor;
mod resolver;
mod search;
mod tracker;
mod types;
mod utils;
mod viewport;

// Re-export error types
pub use error::{LoadError, LocateError, NotLoadedError, ResolveError};

// Re-export text layer API
pub use extract::{
    ExtractorGuard, Located, PdfTextLayer, PdfTextLayerBuilder, PdfTextLayerFactory, TextLayer,
    TextLayerFactory,
};

// Re-export resolution, rendering and navigation
pub use overlay::{OverlayRect, PageOverlay, render_page_overlay};
pub use resolver::{FieldLocationResolver, Phase, ResolverState};
pub use tracker::{
    PageViewport, PageVisibility, TrackerConfig, ViewportPageTracker, VisibilitySource,
    visible_ratio,
};
pub use viewport::{DocumentViewportController, ScrollContainer, ZoomConfig};

// Re-export public types
pub use types::{
    ConfidenceTier, DocumentSource, ExtractedField, Highlight, PageSize, Palette, Rect,
    SourceLocation,
};
