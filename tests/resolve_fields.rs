mod common;

use common::{assert_rect_near, contract_pdf};
use field_locator::{
    DocumentSource, DocumentViewportController, ExtractedField, FieldLocationResolver, LoadError,
    PageSize, Palette, PdfTextLayerFactory, Phase, Rect, ResolveError, ScrollContainer,
};

const FIELDS: &str = r#"[
    {
        "fieldKey": "gapPremium",
        "displayName": "GAP Premium",
        "confidence": 95,
        "source": {"page": 1, "text": "GAP Premium: $500.00", "bbox": {"x": 100, "y": 100, "w": 200, "h": 20}}
    },
    {
        "fieldKey": "refundMethod",
        "displayName": "Refund Method",
        "confidence": 72,
        "source": {"page": 1, "text": "Pro Rata"}
    },
    {
        "fieldKey": "cancellationFee",
        "displayName": "Cancellation Fee",
        "source": {"page": 2, "text": "Cancellation Fee: $75.00"}
    },
    {
        "fieldKey": "dealerName",
        "displayName": "Dealer",
        "confidence": 40,
        "source": {"page": 1, "text": "Acme Motors"}
    },
    {
        "fieldKey": "termMonths",
        "displayName": "Term",
        "source": {"page": 2}
    }
]"#;

fn fields() -> Vec<ExtractedField> {
    serde_json::from_str(FIELDS).unwrap()
}

fn contract() -> Option<DocumentSource> {
    Some(DocumentSource::new("contract-42", contract_pdf()))
}

#[test_log::test(tokio::test)]
async fn resolves_cached_and_searched_fields() {
    let mut resolver = FieldLocationResolver::new(PdfTextLayerFactory::default());
    resolver.resolve(contract(), fields());
    let state = resolver.settled().await;

    assert_eq!(state.phase, Phase::Resolved);
    assert!(state.error.is_none());

    let names: Vec<_> = state.highlights.iter().map(|h| h.field_name.as_str()).collect();
    // "Acme Motors" is on page 2, not page 1; "termMonths" has no snippet.
    assert_eq!(names, ["gapPremium", "refundMethod", "cancellationFee"]);

    let palette = Palette::default();
    let [gap, refund, fee] = &state.highlights[..] else {
        panic!("expected three highlights");
    };
    assert_eq!(gap.bbox, Rect::new(100., 100., 200., 20.));
    assert_eq!(gap.color, palette.high);
    assert_eq!(refund.page, 1);
    assert_rect_near(refund.bbox, Rect::new(175., 104., 40., 10.));
    assert_eq!(refund.color, palette.medium);
    assert_eq!(fee.page, 2);
    assert_eq!(fee.color, palette.unset);
    assert_eq!(fee.display_name, "Cancellation Fee");
}

#[test_log::test(tokio::test)]
async fn unreadable_document_fails_but_keeps_cached_boxes() {
    let mut resolver = FieldLocationResolver::new(PdfTextLayerFactory::default());
    resolver.resolve(
        Some(DocumentSource::new("broken", b"%PDF-1.5 truncated".to_vec())),
        fields(),
    );
    let state = resolver.settled().await;

    assert_eq!(state.phase, Phase::Failed);
    match state.error.as_deref() {
        Some(ResolveError::Load { document, source }) => {
            assert_eq!(document, "broken");
            assert!(matches!(source, LoadError::Pdf(_) | LoadError::NoPages));
        }
        other => panic!("unexpected error {:?}", other),
    }
    assert_eq!(state.highlights.len(), 1);
    assert_eq!(state.highlights[0].field_name, "gapPremium");
}

#[test_log::test(tokio::test)]
async fn subscribers_see_resolution_finish() {
    let mut resolver = FieldLocationResolver::new(PdfTextLayerFactory::default());
    let mut updates = resolver.subscribe();
    resolver.resolve(contract(), fields());

    let state = updates
        .wait_for(|state| state.phase == Phase::Resolved)
        .await
        .unwrap()
        .clone();
    assert_eq!(state.highlights.len(), 3);
    assert!(!state.is_loading());
}

struct NoScroll;

impl ScrollContainer for NoScroll {
    fn scroll_to_page(&mut self, _page: u32) {}
}

#[test_log::test(tokio::test)]
async fn highlights_flow_into_page_overlays() {
    let mut resolver = FieldLocationResolver::new(PdfTextLayerFactory::default());
    resolver.resolve(contract(), fields());
    let state = resolver.settled().await;

    assert_eq!(
        state.page_sizes,
        [
            PageSize {
                width: 612.,
                height: 792.
            },
            PageSize {
                width: 595.,
                height: 842.
            }
        ]
    );
    let mut controller = DocumentViewportController::new(NoScroll, Vec::new());
    controller.apply_resolver_state(&state);

    let overlays = controller.overlays();
    assert_eq!(overlays[&1].rects.len(), 2);
    assert_eq!(overlays[&2].rects.len(), 1);
    assert_eq!(
        overlays[&1].rects[0].label,
        "GAP Premium (95% confidence)"
    );

    let now = std::time::Instant::now();
    assert_eq!(controller.jump_to_field("cancellationFee", now), Some(2));
    assert_eq!(controller.current_page(), 2);
}

#[test_log::test(tokio::test)]
async fn controller_follows_resolver_updates() {
    let mut resolver = FieldLocationResolver::new(PdfTextLayerFactory::default());
    let mut updates = resolver.subscribe();
    resolver.resolve(contract(), fields());
    resolver.settled().await;
    drop(resolver);

    let mut controller = DocumentViewportController::new(NoScroll, Vec::new());
    controller.follow_resolver(&mut updates).await;
    assert_eq!(controller.page_count(), 2);
    assert_eq!(controller.page_size(2).map(|size| size.width), Some(595.));
    assert_eq!(controller.highlights_for_page(1).len(), 2);
    assert_eq!(controller.overlays().len(), 2);
}
