use std::collections::BTreeMap;
use std::time::Instant;

use tokio::sync::watch;
use tracing::debug;

use crate::overlay::{PageOverlay, render_page_overlay};
use crate::resolver::ResolverState;
use crate::tracker::{
    PageViewport, PageVisibility, TrackerConfig, ViewportPageTracker, VisibilitySource,
};
use crate::types::{Highlight, PageSize, Rect};

/// The surface that actually scrolls pages into view.
pub trait ScrollContainer {
    fn scroll_to_page(&mut self, page: u32);
}

/// Zoom limits and step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZoomConfig {
    pub min: f64,
    pub max: f64,
    pub step: f64,
    pub default: f64,
}

impl Default for ZoomConfig {
    fn default() -> Self {
        ZoomConfig {
            min: 0.5,
            max: 3.0,
            step: 0.25,
            default: 1.0,
        }
    }
}

impl ZoomConfig {
    /// Bounds may be given in either order. Non-finite bounds are ignored.
    pub fn with_range(mut self, min: f64, max: f64) -> Self {
        if min.is_finite() && max.is_finite() {
            self.min = min.min(max);
            self.max = min.max(max);
        }
        self
    }

    pub fn with_step(mut self, step: f64) -> Self {
        if step.is_finite() {
            self.step = step;
        }
        self
    }

    pub fn with_default(mut self, default: f64) -> Self {
        if default.is_finite() {
            self.default = default;
        }
        self
    }

    // Tolerates hand-built configs with inverted or NaN bounds.
    fn clamp(&self, zoom: f64) -> f64 {
        let (low, high) = (self.min.min(self.max), self.min.max(self.max));
        zoom.max(low).min(high)
    }
}

/// Composition root for one open document: page geometry, zoom, current
/// page tracking, navigation and per-page overlays.
pub struct DocumentViewportController<S: ScrollContainer> {
    scroll: S,
    tracker: ViewportPageTracker,
    zoom_config: ZoomConfig,
    zoom: f64,
    page_sizes: Vec<PageSize>,
    highlights: BTreeMap<u32, Vec<Highlight>>,
}

impl<S: ScrollContainer> DocumentViewportController<S> {
    pub fn new(scroll: S, page_sizes: Vec<PageSize>) -> Self {
        let zoom_config = ZoomConfig::default();
        DocumentViewportController {
            scroll,
            tracker: ViewportPageTracker::default(),
            zoom: zoom_config.default,
            zoom_config,
            page_sizes,
            highlights: BTreeMap::new(),
        }
    }

    pub fn with_tracker_config(mut self, config: TrackerConfig) -> Self {
        self.tracker = ViewportPageTracker::new(config);
        self
    }

    pub fn with_zoom_config(mut self, config: ZoomConfig) -> Self {
        let zoom = config.clamp(config.default);
        self.zoom_config = config;
        self.zoom = if zoom.is_finite() { zoom } else { 1.0 };
        self
    }

    pub fn scroll_container(&self) -> &S {
        &self.scroll
    }

    pub fn page_count(&self) -> u32 {
        self.page_sizes.len() as u32
    }

    pub fn page_size(&self, page: u32) -> Option<PageSize> {
        let index = usize::try_from(page).ok()?.checked_sub(1)?;
        self.page_sizes.get(index).copied()
    }

    /// Switch to another document. Highlights and tracking start over.
    pub fn set_page_sizes(&mut self, page_sizes: Vec<PageSize>) {
        self.page_sizes = page_sizes;
        self.highlights.clear();
        self.tracker.reset();
    }

    pub fn current_page(&self) -> u32 {
        self.tracker.current_page()
    }

    pub fn zoom(&self) -> f64 {
        self.zoom
    }

    /// Set the overlay scale, clamped to the zoom range. Non-finite input
    /// leaves the current zoom unchanged.
    pub fn set_zoom(&mut self, zoom: f64) -> f64 {
        if !zoom.is_finite() {
            return self.zoom;
        }
        self.zoom = self.zoom_config.clamp(zoom);
        self.zoom
    }

    pub fn zoom_in(&mut self) -> f64 {
        self.set_zoom(self.zoom + self.zoom_config.step)
    }

    pub fn zoom_out(&mut self) -> f64 {
        self.set_zoom(self.zoom - self.zoom_config.step)
    }

    pub fn reset_zoom(&mut self) -> f64 {
        self.set_zoom(self.zoom_config.default)
    }

    /// Scroll to `page`, clamped to the document, and make it current.
    /// Returns the page jumped to, or `None` for an empty document.
    pub fn jump_to_page(&mut self, page: u32, now: Instant) -> Option<u32> {
        let count = self.page_count();
        if count == 0 {
            return None;
        }
        let target = page.clamp(1, count);
        self.tracker.jump_to_page(target, now);
        self.scroll.scroll_to_page(target);
        Some(target)
    }

    /// Jump to the page holding `field_name`'s highlight.
    pub fn jump_to_field(&mut self, field_name: &str, now: Instant) -> Option<u32> {
        let page = self
            .highlights
            .values()
            .flatten()
            .find(|h| h.field_name == field_name)
            .map(|h| h.page)?;
        self.jump_to_page(page, now)
    }

    pub fn observe(&mut self, batch: &[PageVisibility], now: Instant) -> Option<u32> {
        self.tracker.observe(batch, now)
    }

    pub fn observe_layout(
        &mut self,
        pages: &[PageViewport],
        viewport: &Rect,
        now: Instant,
    ) -> Option<u32> {
        self.tracker.observe_layout(pages, viewport, now)
    }

    /// Feed observations from `source` into the tracker until it ends.
    pub async fn follow_visibility<V: VisibilitySource>(&mut self, source: &mut V) {
        while let Some(batch) = source.next_batch().await {
            self.observe(&batch, Instant::now());
        }
        debug!("visibility source closed");
    }

    /// Apply a resolver snapshot. Page sizes measured by the pass replace
    /// the current ones when they differ.
    pub fn apply_resolver_state(&mut self, state: &ResolverState) {
        if !state.page_sizes.is_empty() && state.page_sizes != self.page_sizes {
            debug!("pass {} measured {} pages", state.generation, state.page_sizes.len());
            self.page_sizes = state.page_sizes.clone();
        }
        self.set_highlights(&state.highlights);
    }

    /// Mirror resolver snapshots into the overlays until the resolver is
    /// dropped. The snapshot current at the call is applied first.
    pub async fn follow_resolver(&mut self, updates: &mut watch::Receiver<ResolverState>) {
        loop {
            let state = updates.borrow_and_update().clone();
            self.apply_resolver_state(&state);
            if updates.changed().await.is_err() {
                break;
            }
        }
        debug!("resolver closed");
    }

    /// Replace all highlights, grouped by page.
    pub fn set_highlights(&mut self, highlights: &[Highlight]) {
        self.highlights.clear();
        for highlight in highlights {
            self.highlights
                .entry(highlight.page)
                .or_default()
                .push(highlight.clone());
        }
    }

    pub fn highlights_for_page(&self, page: u32) -> &[Highlight] {
        self.highlights.get(&page).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn overlay_for_page(&self, page: u32) -> Option<PageOverlay> {
        let size = self.page_size(page)?;
        render_page_overlay(self.highlights_for_page(page), self.zoom, size.width, size.height)
    }

    /// Overlays for every page that has highlights, keyed by page number.
    pub fn overlays(&self) -> BTreeMap<u32, PageOverlay> {
        self.highlights
            .keys()
            .filter_map(|&page| Some((page, self.overlay_for_page(page)?)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::sync::mpsc;

    use super::*;
    use crate::resolver::Phase;

    #[derive(Debug, Default)]
    struct RecordingScroll {
        scrolled: Vec<u32>,
    }

    impl ScrollContainer for RecordingScroll {
        fn scroll_to_page(&mut self, page: u32) {
            self.scrolled.push(page);
        }
    }

    fn letter_pages(n: usize) -> Vec<PageSize> {
        vec![
            PageSize {
                width: 612.,
                height: 792.,
            };
            n
        ]
    }

    fn new_controller(pages: Vec<PageSize>) -> DocumentViewportController<RecordingScroll> {
        DocumentViewportController::new(RecordingScroll::default(), pages)
    }

    fn highlight(name: &str, page: u32) -> Highlight {
        Highlight {
            field_name: name.to_owned(),
            display_name: name.to_owned(),
            page,
            bbox: Rect::new(10., 10., 50., 12.),
            color: "rgba(59, 130, 246, 0.35)".to_owned(),
            confidence: None,
        }
    }

    #[test]
    fn jump_clamps_and_scrolls() {
        let now = Instant::now();
        let mut controller = new_controller(letter_pages(6));
        assert_eq!(controller.jump_to_page(5, now), Some(5));
        assert_eq!(controller.current_page(), 5);
        assert_eq!(controller.jump_to_page(0, now), Some(1));
        assert_eq!(controller.jump_to_page(42, now), Some(6));
        assert_eq!(controller.scroll_container().scrolled, [5, 1, 6]);
    }

    #[test]
    fn jump_on_empty_document_does_nothing() {
        let mut controller = new_controller(Vec::new());
        assert_eq!(controller.jump_to_page(3, Instant::now()), None);
        assert!(controller.scroll_container().scrolled.is_empty());
    }

    #[test]
    fn jump_to_field_uses_its_highlight_page() {
        let now = Instant::now();
        let mut controller = new_controller(letter_pages(4));
        controller.set_highlights(&[highlight("gapPremium", 1), highlight("refundMethod", 3)]);
        assert_eq!(controller.jump_to_field("refundMethod", now), Some(3));
        assert_eq!(controller.jump_to_field("cancellationFee", now), None);
        assert_eq!(controller.current_page(), 3);
    }

    #[test]
    fn in_transit_pages_do_not_override_jump() {
        let t0 = Instant::now();
        let mut controller = new_controller(letter_pages(8));
        controller.jump_to_page(5, t0);
        for page in 2..=4 {
            controller.observe(&[PageVisibility::new(page, 1.0)], t0 + Duration::from_millis(50));
        }
        assert_eq!(controller.current_page(), 5);
    }

    #[test]
    fn zoom_is_clamped() {
        let mut controller = new_controller(letter_pages(1));
        assert_eq!(controller.zoom(), 1.0);
        assert_eq!(controller.zoom_in(), 1.25);
        assert_eq!(controller.set_zoom(10.), 3.0);
        assert_eq!(controller.zoom_in(), 3.0);
        assert_eq!(controller.set_zoom(0.1), 0.5);
        assert_eq!(controller.zoom_out(), 0.5);
        assert_eq!(controller.reset_zoom(), 1.0);
    }

    #[test]
    fn zoom_range_may_be_given_in_either_order() {
        let config = ZoomConfig::default().with_range(3.0, 0.5);
        assert_eq!((config.min, config.max), (0.5, 3.0));
        let config = config.with_range(f64::NAN, 2.0);
        assert_eq!((config.min, config.max), (0.5, 3.0));

        let inverted = ZoomConfig {
            min: 2.0,
            max: 1.0,
            ..ZoomConfig::default()
        };
        let mut controller =
            new_controller(letter_pages(1)).with_zoom_config(inverted.with_default(4.0));
        assert_eq!(controller.zoom(), 2.0);
        assert_eq!(controller.set_zoom(0.1), 1.0);
    }

    #[test]
    fn non_finite_zoom_keeps_current_scale() {
        let mut controller = new_controller(letter_pages(1));
        controller.set_zoom(2.0);
        assert_eq!(controller.set_zoom(f64::NAN), 2.0);
        assert_eq!(controller.set_zoom(f64::INFINITY), 2.0);
        assert_eq!(controller.zoom(), 2.0);

        let config = ZoomConfig::default().with_default(f64::NAN);
        let controller = new_controller(letter_pages(1)).with_zoom_config(config);
        assert_eq!(controller.zoom(), 1.0);
    }

    #[test]
    fn overlays_only_for_pages_with_highlights() {
        let mut controller = new_controller(letter_pages(3));
        controller.set_highlights(&[highlight("a", 1), highlight("b", 3), highlight("c", 3)]);
        controller.set_zoom(2.0);

        let overlays = controller.overlays();
        assert_eq!(overlays.keys().copied().collect::<Vec<_>>(), [1, 3]);
        assert_eq!(overlays[&3].rects.len(), 2);
        assert_eq!(overlays[&1].scaled_width(), 1224.);
        assert_eq!(controller.overlay_for_page(2), None);

        controller.set_highlights(&[highlight("d", 2)]);
        assert_eq!(controller.overlays().keys().copied().collect::<Vec<_>>(), [2]);
    }

    #[test]
    fn highlights_on_missing_pages_render_nothing() {
        let mut controller = new_controller(letter_pages(1));
        controller.set_highlights(&[highlight("a", 7)]);
        assert!(controller.overlays().is_empty());
    }

    #[test_log::test(tokio::test)]
    async fn follows_visibility_until_source_closes() {
        let mut controller = new_controller(letter_pages(3));
        let (tx, mut rx) = mpsc::unbounded_channel();
        tx.send(vec![PageVisibility::new(1, 0.2), PageVisibility::new(2, 0.8)])
            .unwrap();
        drop(tx);

        controller.follow_visibility(&mut rx).await;
        assert_eq!(controller.current_page(), 2);
    }

    #[test_log::test(tokio::test)]
    async fn follows_resolver_until_it_closes() {
        let mut controller = new_controller(Vec::new());
        let (tx, mut rx) = watch::channel(ResolverState::default());
        tx.send_replace(ResolverState {
            generation: 1,
            phase: Phase::Resolved,
            highlights: vec![highlight("gapPremium", 1), highlight("refundMethod", 2)],
            page_sizes: letter_pages(2),
            ..Default::default()
        });
        drop(tx);

        controller.follow_resolver(&mut rx).await;
        assert_eq!(controller.page_count(), 2);
        assert_eq!(controller.highlights_for_page(2).len(), 1);
        assert_eq!(controller.overlays().len(), 2);
    }

    #[test]
    fn resolver_state_without_sizes_keeps_geometry() {
        let mut controller = new_controller(letter_pages(3));
        controller.apply_resolver_state(&ResolverState {
            highlights: vec![highlight("a", 3)],
            ..Default::default()
        });
        assert_eq!(controller.page_count(), 3);
        assert_eq!(controller.highlights_for_page(3).len(), 1);
    }
}
