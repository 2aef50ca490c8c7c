use std::fmt::Write;

use crate::types::{Highlight, Rect};

/// One highlight rectangle on a page overlay, in unscaled page space.
#[derive(Debug, Clone, PartialEq)]
pub struct OverlayRect {
    pub field_name: String,
    pub bbox: Rect,
    pub color: String,
    /// Tooltip text.
    pub label: String,
}

/// Visual layer aligned with one rendered page.
///
/// Rect coordinates stay in page space; the layer as a whole is drawn at
/// `scale`, so `scaled_width`/`scaled_height` give the surface size.
#[derive(Debug, Clone, PartialEq)]
pub struct PageOverlay {
    pub page_width: f64,
    pub page_height: f64,
    pub scale: f64,
    pub rects: Vec<OverlayRect>,
}

fn label(highlight: &Highlight) -> String {
    let name = if highlight.display_name.is_empty() {
        &highlight.field_name
    } else {
        &highlight.display_name
    };
    match highlight.confidence {
        Some(confidence) => format!("{} ({}% confidence)", name, confidence),
        None => name.clone(),
    }
}

/// Build the overlay for one page. Returns `None` when the page has no
/// highlights, so untouched pages get no layer at all.
///
/// Highlights are drawn in the order given; boxes are neither clamped nor
/// validated.
pub fn render_page_overlay(
    highlights: &[Highlight],
    scale: f64,
    page_width: f64,
    page_height: f64,
) -> Option<PageOverlay> {
    if highlights.is_empty() {
        return None;
    }
    let rects = highlights
        .iter()
        .map(|h| OverlayRect {
            field_name: h.field_name.clone(),
            bbox: h.bbox,
            color: h.color.clone(),
            label: label(h),
        })
        .collect();
    Some(PageOverlay {
        page_width,
        page_height,
        scale,
        rects,
    })
}

fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

impl PageOverlay {
    pub fn scaled_width(&self) -> f64 {
        self.page_width * self.scale
    }

    pub fn scaled_height(&self) -> f64 {
        self.page_height * self.scale
    }

    /// Serialize as a standalone SVG layer. The `viewBox` is the unscaled
    /// page, so rects are emitted in page coordinates.
    pub fn to_svg(&self) -> String {
        let mut svg = String::new();
        // Writing to a String cannot fail.
        let _ = writeln!(
            svg,
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="{}" height="{}" viewBox="0 0 {} {}">"#,
            self.scaled_width(),
            self.scaled_height(),
            self.page_width,
            self.page_height
        );
        for rect in &self.rects {
            let _ = writeln!(
                svg,
                r#"  <rect data-field="{}" x="{}" y="{}" width="{}" height="{}" fill="{}"><title>{}</title></rect>"#,
                escape(&rect.field_name),
                rect.bbox.x,
                rect.bbox.y,
                rect.bbox.width,
                rect.bbox.height,
                escape(&rect.color),
                escape(&rect.label)
            );
        }
        svg.push_str("</svg>\n");
        svg
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn highlight(name: &str, bbox: Rect, confidence: Option<f64>) -> Highlight {
        Highlight {
            field_name: name.to_owned(),
            display_name: String::new(),
            page: 1,
            bbox,
            color: "rgba(34, 197, 94, 0.35)".to_owned(),
            confidence,
        }
    }

    #[test]
    fn no_highlights_render_nothing() {
        assert_eq!(render_page_overlay(&[], 1.5, 612., 792.), None);
    }

    #[test]
    fn rects_keep_page_coordinates_and_order() {
        let highlights = [
            highlight("b", Rect::new(10., 20., 30., 40.), Some(95.)),
            highlight("a", Rect::new(-5., -5., 10., 10.), None),
        ];
        let overlay = render_page_overlay(&highlights, 2., 612., 792.).unwrap();

        assert_eq!(overlay.scaled_width(), 1224.);
        assert_eq!(overlay.scaled_height(), 1584.);
        assert_eq!(overlay.rects[0].field_name, "b");
        assert_eq!(overlay.rects[0].bbox, Rect::new(10., 20., 30., 40.));
        assert_eq!(overlay.rects[1].bbox, Rect::new(-5., -5., 10., 10.));
    }

    #[test]
    fn labels_show_confidence_when_known() {
        let mut named = highlight("gapPremium", Rect::new(0., 0., 1., 1.), Some(95.));
        named.display_name = "GAP Premium".to_owned();
        assert_eq!(label(&named), "GAP Premium (95% confidence)");
        assert_eq!(
            label(&highlight("refundMethod", Rect::new(0., 0., 1., 1.), None)),
            "refundMethod"
        );
    }

    #[test]
    fn svg_scales_surface_not_coordinates() {
        let highlights = [highlight("a<b>", Rect::new(100., 100., 200., 20.), Some(72.5))];
        let svg = render_page_overlay(&highlights, 1.5, 600., 800.)
            .unwrap()
            .to_svg();

        assert!(svg.contains(r#"width="900" height="1200" viewBox="0 0 600 800""#));
        assert!(svg.contains(r#"x="100" y="100" width="200" height="20""#));
        assert!(svg.contains(r#"data-field="a&lt;b&gt;""#));
        assert!(svg.contains("<title>a&lt;b&gt; (72.5% confidence)</title>"));
    }
}
