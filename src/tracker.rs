//! Current-page tracking from page visibility.
//!
//! The tracker never looks at a rendering surface. It is fed batches of
//! `(page, visible ratio)` observations, either from a [`VisibilitySource`]
//! or computed from layout geometry with [`visible_ratio`], and picks the
//! most visible page. After a programmatic jump it ignores observations for
//! a suppression window so pages scrolled past in transit cannot steal the
//! current page from the jump target.

use std::collections::BTreeMap;
use std::future::Future;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::types::Rect;

/// Tracker tuning.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackerConfig {
    /// Minimum visible ratio for a page to be considered at all.
    pub threshold: f64,
    /// How long observations are ignored after a jump.
    pub suppression: Duration,
    /// Ratios closer than this are treated as tied.
    pub tie_epsilon: f64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        TrackerConfig {
            threshold: 0.1,
            suppression: Duration::from_millis(1000),
            tie_epsilon: 1e-6,
        }
    }
}

impl TrackerConfig {
    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_suppression(mut self, suppression: Duration) -> Self {
        self.suppression = suppression;
        self
    }

    pub fn with_tie_epsilon(mut self, tie_epsilon: f64) -> Self {
        self.tie_epsilon = tie_epsilon;
        self
    }
}

/// Fraction of one page currently inside the viewport.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageVisibility {
    pub page: u32,
    pub ratio: f64,
}

impl PageVisibility {
    pub fn new(page: u32, ratio: f64) -> Self {
        Self { page, ratio }
    }
}

/// Where a rendered page sits in the scroll container's coordinate space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageViewport {
    pub page: u32,
    pub rect: Rect,
}

/// Visible area of `page` inside `viewport`, over the page's own area.
pub fn visible_ratio(page: &Rect, viewport: &Rect) -> f64 {
    let area = page.area();
    if area <= 0. {
        return 0.;
    }
    page.intersection(viewport)
        .map_or(0., |visible| (visible.area() / area).min(1.))
}

/// Async stream of visibility observations. `None` ends the stream.
pub trait VisibilitySource {
    fn next_batch(&mut self) -> impl Future<Output = Option<Vec<PageVisibility>>> + Send;
}

impl VisibilitySource for mpsc::Receiver<Vec<PageVisibility>> {
    async fn next_batch(&mut self) -> Option<Vec<PageVisibility>> {
        self.recv().await
    }
}

impl VisibilitySource for mpsc::UnboundedReceiver<Vec<PageVisibility>> {
    async fn next_batch(&mut self) -> Option<Vec<PageVisibility>> {
        self.recv().await
    }
}

#[derive(Debug, Clone)]
pub struct ViewportPageTracker {
    config: TrackerConfig,
    current_page: u32,
    suppressed_until: Option<Instant>,
    ratios: BTreeMap<u32, f64>,
}

impl Default for ViewportPageTracker {
    fn default() -> Self {
        Self::new(TrackerConfig::default())
    }
}

impl ViewportPageTracker {
    pub fn new(config: TrackerConfig) -> Self {
        ViewportPageTracker {
            config,
            current_page: 1,
            suppressed_until: None,
            ratios: BTreeMap::new(),
        }
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn current_page(&self) -> u32 {
        self.current_page
    }

    pub fn is_suppressed(&self, now: Instant) -> bool {
        self.suppressed_until.is_some_and(|until| now < until)
    }

    /// Forget all observations and return to page 1.
    pub fn reset(&mut self) {
        self.current_page = 1;
        self.suppressed_until = None;
        self.ratios.clear();
    }

    /// Make `page` current right away and ignore observations until the
    /// suppression window has passed.
    pub fn jump_to_page(&mut self, page: u32, now: Instant) {
        debug!("jump to page {}, suppressing visibility updates", page);
        self.current_page = page;
        self.suppressed_until = Some(now + self.config.suppression);
    }

    /// Record a batch of observations. Returns the new current page when it
    /// changed.
    pub fn observe(&mut self, batch: &[PageVisibility], now: Instant) -> Option<u32> {
        for seen in batch {
            self.ratios.insert(seen.page, seen.ratio);
        }
        if self.is_suppressed(now) {
            trace!("ignoring {} observations during suppression", batch.len());
            return None;
        }
        self.suppressed_until = None;

        let next = self.most_visible()?;
        if next == self.current_page {
            return None;
        }
        debug!("current page {} -> {}", self.current_page, next);
        self.current_page = next;
        Some(next)
    }

    /// Derive ratios from layout geometry and observe them.
    pub fn observe_layout(
        &mut self,
        pages: &[PageViewport],
        viewport: &Rect,
        now: Instant,
    ) -> Option<u32> {
        let batch: Vec<_> = pages
            .iter()
            .map(|p| PageVisibility::new(p.page, visible_ratio(&p.rect, viewport)))
            .collect();
        self.observe(&batch, now)
    }

    fn most_visible(&self) -> Option<u32> {
        let candidates = self
            .ratios
            .iter()
            .filter(|(_, ratio)| **ratio >= self.config.threshold);
        let best = candidates.clone().map(|(_, ratio)| *ratio).reduce(f64::max)?;

        let mut leaders = candidates
            .filter(|(_, ratio)| best - **ratio <= self.config.tie_epsilon)
            .map(|(page, _)| *page);
        let lowest = leaders.clone().next()?;
        if leaders.any(|page| page == self.current_page) {
            Some(self.current_page)
        } else {
            Some(lowest)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    fn seen(pairs: &[(u32, f64)]) -> Vec<PageVisibility> {
        pairs.iter().map(|&(page, ratio)| PageVisibility::new(page, ratio)).collect()
    }

    #[test]
    fn most_visible_page_wins() {
        let t0 = Instant::now();
        let mut tracker = ViewportPageTracker::default();
        assert_eq!(tracker.observe(&seen(&[(1, 0.3), (2, 0.7)]), t0), Some(2));
        assert_eq!(tracker.current_page(), 2);
        assert_eq!(tracker.observe(&seen(&[(2, 0.6)]), t0), None);
    }

    #[test]
    fn below_threshold_changes_nothing() {
        let t0 = Instant::now();
        let mut tracker = ViewportPageTracker::default();
        assert_eq!(tracker.observe(&seen(&[(3, 0.05)]), t0), None);
        assert_eq!(tracker.current_page(), 1);
    }

    #[test]
    fn ties_keep_the_previous_page() {
        let t0 = Instant::now();
        let mut tracker = ViewportPageTracker::default();
        tracker.observe(&seen(&[(2, 1.0)]), t0);
        assert_eq!(tracker.observe(&seen(&[(2, 0.5), (3, 0.5)]), t0), None);
        assert_eq!(tracker.current_page(), 2);

        // Previous page no longer among the leaders: lowest page wins.
        assert_eq!(
            tracker.observe(&seen(&[(2, 0.2), (3, 0.4), (4, 0.4)]), t0),
            Some(3)
        );
    }

    #[test]
    fn jump_suppresses_pages_in_transit() {
        let t0 = Instant::now();
        let mut tracker = ViewportPageTracker::default();
        tracker.observe(&seen(&[(1, 1.0)]), t0);

        tracker.jump_to_page(5, t0);
        assert_eq!(tracker.current_page(), 5);
        assert!(tracker.is_suppressed(t0 + ms(10)));

        for (i, page) in [2, 3, 4].into_iter().enumerate() {
            let now = t0 + ms(100 * (i as u64 + 1));
            let batch = seen(&[(page - 1, 0.0), (page, 1.0)]);
            assert_eq!(tracker.observe(&batch, now), None);
            assert_eq!(tracker.current_page(), 5);
        }

        let after = t0 + ms(1000);
        assert!(!tracker.is_suppressed(after));
        assert_eq!(tracker.observe(&seen(&[(4, 0.0), (5, 1.0)]), after), None);
        assert_eq!(tracker.current_page(), 5);
        assert_eq!(tracker.observe(&seen(&[(5, 0.3), (6, 0.7)]), after), Some(6));
    }

    #[test]
    fn ratios_recorded_during_suppression_count_later() {
        let t0 = Instant::now();
        let config = TrackerConfig::default().with_suppression(ms(200));
        let mut tracker = ViewportPageTracker::new(config);
        tracker.jump_to_page(5, t0);
        tracker.observe(&seen(&[(5, 0.2), (6, 0.8)]), t0 + ms(50));
        assert_eq!(tracker.current_page(), 5);
        assert_eq!(tracker.observe(&[], t0 + ms(250)), Some(6));
    }

    #[test]
    fn visible_ratio_from_geometry() {
        let viewport = Rect::new(0., 0., 600., 800.);
        assert_eq!(visible_ratio(&Rect::new(0., 0., 600., 800.), &viewport), 1.);
        assert_eq!(visible_ratio(&Rect::new(0., 400., 600., 800.), &viewport), 0.5);
        assert_eq!(visible_ratio(&Rect::new(0., 900., 600., 800.), &viewport), 0.);
        assert_eq!(visible_ratio(&Rect::new(0., 0., 0., 0.), &viewport), 0.);
    }

    #[test]
    fn observe_layout_picks_page_filling_viewport() {
        let t0 = Instant::now();
        let mut tracker = ViewportPageTracker::default();
        let pages: Vec<_> = (1..=3)
            .map(|page| PageViewport {
                page,
                rect: Rect::new(0., (page - 1) as f64 * 810., 600., 800.),
            })
            .collect();
        let viewport = Rect::new(0., 700., 600., 800.);
        assert_eq!(tracker.observe_layout(&pages, &viewport, t0), Some(2));
    }
}
