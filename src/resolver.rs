//! Turns a contract's extracted fields into page highlights.
//!
//! Each call to [`FieldLocationResolver::resolve`] starts a resolution pass
//! for one `(document, fields)` pair. Fields that ship a cached box become
//! highlights immediately; fields that only carry a page and a snippet are
//! searched through a [`TextLayer`] created for that pass alone. Starting a
//! new pass supersedes the old one: its task is aborted, its extractor is
//! destroyed, and anything it still tries to publish is rejected by
//! generation.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{LocateError, NotLoadedError, ResolveError};
use crate::extract::{ExtractorGuard, TextLayer, TextLayerFactory};
use crate::types::{DocumentSource, ExtractedField, Highlight, PageSize, Palette, Rect};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Idle,
    Resolving,
    Resolved,
    Failed,
}

/// Snapshot of the resolver's read surface.
#[derive(Debug, Clone, Default)]
pub struct ResolverState {
    /// Pass that produced this snapshot.
    pub generation: u64,
    pub phase: Phase,
    pub highlights: Vec<Highlight>,
    pub error: Option<Arc<ResolveError>>,
    /// Page sizes measured while searching, empty when the pass never
    /// loaded the document.
    pub page_sizes: Vec<PageSize>,
}

impl ResolverState {
    pub fn is_loading(&self) -> bool {
        self.phase == Phase::Resolving
    }
}

/// How a field can be turned into a highlight.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Locatability<'a> {
    Cached { page: u32, bbox: Rect },
    Searchable { page: u32, snippet: &'a str },
    Unlocatable,
}

pub(crate) fn classify(field: &ExtractedField) -> Locatability<'_> {
    let Some(source) = &field.source else {
        return Locatability::Unlocatable;
    };
    match (source.page, source.bbox, source.text.as_deref()) {
        (Some(page), Some(bbox), _) => Locatability::Cached { page, bbox },
        (Some(page), None, Some(snippet)) if !snippet.trim().is_empty() => {
            Locatability::Searchable { page, snippet }
        }
        _ => Locatability::Unlocatable,
    }
}

#[derive(Debug, Clone)]
struct SearchTarget {
    field: ExtractedField,
    page: u32,
    snippet: String,
}

fn partition(
    fields: &[ExtractedField],
    palette: &Palette,
) -> (Vec<Highlight>, Vec<SearchTarget>) {
    let mut cached = Vec::new();
    let mut searchable = Vec::new();
    for field in fields {
        match classify(field) {
            Locatability::Cached { page, bbox } => {
                debug!("{}: cached box on page {}", field.field_key, page);
                cached.push(Highlight::for_field(field, page, bbox, palette));
            }
            Locatability::Searchable { page, snippet } => {
                debug!("{}: searching page {}", field.field_key, page);
                searchable.push(SearchTarget {
                    field: field.clone(),
                    page,
                    snippet: snippet.to_owned(),
                });
            }
            Locatability::Unlocatable => {
                debug!("{}: no usable source location", field.field_key);
            }
        }
    }
    (cached, searchable)
}

/// Replace the published state unless it already belongs to a newer pass.
fn publish(state: &watch::Sender<ResolverState>, next: ResolverState) -> bool {
    state.send_if_modified(|current| {
        if next.generation < current.generation {
            return false;
        }
        *current = next;
        true
    })
}

#[derive(Debug)]
struct SearchOutcome {
    page_sizes: Vec<PageSize>,
    found: Vec<Highlight>,
}

async fn search_fields<L: TextLayer>(
    layer: &mut L,
    document: &DocumentSource,
    targets: &[SearchTarget],
    palette: &Palette,
) -> Result<SearchOutcome, ResolveError> {
    let not_loaded = |source: NotLoadedError| ResolveError::NotLoaded {
        document: document.id().to_owned(),
        source,
    };
    layer
        .load(document)
        .await
        .map_err(|source| ResolveError::Load {
            document: document.id().to_owned(),
            source,
        })?;
    let page_sizes = layer.page_sizes().map_err(not_loaded)?;

    let mut found = Vec::with_capacity(targets.len());
    for target in targets {
        match layer.locate(&target.snippet, target.page).await {
            Ok(located) => {
                found.push(Highlight::for_field(
                    &target.field,
                    located.page,
                    located.bbox,
                    palette,
                ));
            }
            Err(LocateError::NotFound { .. }) => {
                debug!(
                    "{}: {:?} not found on page {}",
                    target.field.field_key, target.snippet, target.page
                );
            }
            Err(LocateError::NotLoaded(source)) => return Err(not_loaded(source)),
        }
    }
    Ok(SearchOutcome { page_sizes, found })
}

async fn run_pass<F: TextLayerFactory>(
    factory: Arc<F>,
    palette: Arc<Palette>,
    state: Arc<watch::Sender<ResolverState>>,
    generation: u64,
    document: DocumentSource,
    cached: Vec<Highlight>,
    targets: Vec<SearchTarget>,
) {
    // The extractor is destroyed before the outcome is published.
    let outcome = {
        let mut layer = ExtractorGuard::new(factory.create());
        search_fields(&mut *layer, &document, &targets, &palette).await
    };

    let mut highlights = cached;
    let next = match outcome {
        Ok(SearchOutcome { page_sizes, found }) => {
            info!(
                "resolved {}: {} of {} searched fields located",
                document.id(),
                found.len(),
                targets.len()
            );
            highlights.extend(found);
            ResolverState {
                generation,
                phase: Phase::Resolved,
                highlights,
                error: None,
                page_sizes,
            }
        }
        Err(e) => {
            warn!("resolution failed: {}", e);
            ResolverState {
                generation,
                phase: Phase::Failed,
                highlights,
                error: Some(Arc::new(e)),
                page_sizes: Vec::new(),
            }
        }
    };
    if !publish(&state, next) {
        debug!("discarding results of superseded pass {}", generation);
    }
}

/// Resolves extracted fields against a document, one pass at a time.
///
/// Passes run on the current Tokio runtime; `resolve`, `update` and
/// `shutdown` must be called from within one.
///
/// # Examples
///
/// ```no_run
/// use field_locator::{DocumentSource, ExtractedField, FieldLocationResolver, PdfTextLayerFactory};
///
/// # async fn run(fields: Vec<ExtractedField>) -> std::io::Result<()> {
/// let mut resolver = FieldLocationResolver::new(PdfTextLayerFactory::default());
/// resolver.resolve(Some(DocumentSource::from_path("contract.pdf")?), fields);
/// let state = resolver.settled().await;
/// for highlight in &state.highlights {
///     println!("{} on page {}", highlight.field_name, highlight.page);
/// }
/// # Ok(())
/// # }
/// ```
pub struct FieldLocationResolver<F: TextLayerFactory> {
    factory: Arc<F>,
    palette: Arc<Palette>,
    state: Arc<watch::Sender<ResolverState>>,
    generation: u64,
    current: Option<(Option<String>, Vec<ExtractedField>)>,
    task: Option<JoinHandle<()>>,
}

impl<F: TextLayerFactory> FieldLocationResolver<F> {
    pub fn new(factory: F) -> Self {
        let (state, _) = watch::channel(ResolverState::default());
        FieldLocationResolver {
            factory: Arc::new(factory),
            palette: Arc::new(Palette::default()),
            state: Arc::new(state),
            generation: 0,
            current: None,
            task: None,
        }
    }

    pub fn with_palette(mut self, palette: Palette) -> Self {
        self.palette = Arc::new(palette);
        self
    }

    pub fn subscribe(&self) -> watch::Receiver<ResolverState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> ResolverState {
        self.state.borrow().clone()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Wait until the latest pass has left `Resolving`.
    pub async fn settled(&self) -> ResolverState {
        let generation = self.generation;
        let mut rx = self.state.subscribe();
        match rx
            .wait_for(|s| s.generation >= generation && !s.is_loading())
            .await
        {
            Ok(state) => (*state).clone(),
            Err(_) => self.state(),
        }
    }

    fn supersede(&mut self) -> u64 {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.generation += 1;
        self.generation
    }

    /// Start a new resolution pass, superseding any pass in flight.
    pub fn resolve(&mut self, document: Option<DocumentSource>, fields: Vec<ExtractedField>) {
        let generation = self.supersede();
        self.current = Some((document.as_ref().map(|d| d.id().to_owned()), fields.clone()));

        let document = match document {
            Some(document) if !fields.is_empty() => document,
            _ => {
                debug!("pass {}: nothing to resolve", generation);
                publish(
                    &self.state,
                    ResolverState {
                        generation,
                        phase: Phase::Resolved,
                        ..Default::default()
                    },
                );
                return;
            }
        };

        let (cached, targets) = partition(&fields, &self.palette);
        info!(
            "pass {} for {}: {} cached, {} to search, {} unlocatable",
            generation,
            document.id(),
            cached.len(),
            targets.len(),
            fields.len() - cached.len() - targets.len()
        );

        if targets.is_empty() {
            publish(
                &self.state,
                ResolverState {
                    generation,
                    phase: Phase::Resolved,
                    highlights: cached,
                    ..Default::default()
                },
            );
            return;
        }

        publish(
            &self.state,
            ResolverState {
                generation,
                phase: Phase::Resolving,
                highlights: cached.clone(),
                ..Default::default()
            },
        );
        self.task = Some(tokio::spawn(run_pass(
            Arc::clone(&self.factory),
            Arc::clone(&self.palette),
            Arc::clone(&self.state),
            generation,
            document,
            cached,
            targets,
        )));
    }

    /// Start a pass only if the `(document, fields)` pair changed.
    /// Returns whether a pass was started.
    pub fn update(
        &mut self,
        document: Option<DocumentSource>,
        fields: Vec<ExtractedField>,
    ) -> bool {
        if let Some((current_id, current_fields)) = &self.current {
            let same_document = current_id.as_deref() == document.as_ref().map(|d| d.id());
            if same_document && *current_fields == fields {
                return false;
            }
        }
        self.resolve(document, fields);
        true
    }

    /// Abandon the current pass without starting another.
    pub fn shutdown(&mut self) {
        let generation = self.supersede();
        self.current = None;
        publish(
            &self.state,
            ResolverState {
                generation,
                ..Default::default()
            },
        );
    }
}

impl<F: TextLayerFactory> Drop for FieldLocationResolver<F> {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
