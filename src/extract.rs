use std::future::Future;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use lopdf::{Dictionary, Document};
use tracing::{debug, info, warn};

use crate::error::{LoadError, LocateError, NotLoadedError};
use crate::output::{GlyphCollector, PageText};
use crate::processor::Processor;
use crate::search;
use crate::types::{DocumentSource, PageSize, Rect};
use crate::utils::{get_inherited, page_media_box};

/// A snippet found on a page.
#[derive(Debug, Clone, PartialEq)]
pub struct Located {
    pub text: String,
    pub page: u32,
    pub bbox: Rect,
}

/// Searchable text layer over one document.
///
/// `load` must succeed, exactly once, before `page_count` or `locate` can
/// answer. `destroy` releases the parsed document; it is idempotent and safe
/// to call in any state.
pub trait TextLayer: Send + Sync + 'static {
    fn load(
        &mut self,
        source: &DocumentSource,
    ) -> impl Future<Output = Result<(), LoadError>> + Send;

    fn page_count(&self) -> Result<u32, NotLoadedError>;

    /// Size of every page, in page order.
    fn page_sizes(&self) -> Result<Vec<PageSize>, NotLoadedError>;

    fn locate(
        &self,
        snippet: &str,
        page: u32,
    ) -> impl Future<Output = Result<Located, LocateError>> + Send;

    fn destroy(&mut self);
}

/// Creates text layers on demand, one per resolution pass that needs one.
pub trait TextLayerFactory: Send + Sync + 'static {
    type Layer: TextLayer;

    fn create(&self) -> Self::Layer;
}

/// Owns a text layer for one scope and destroys it when the scope ends,
/// whether the scope finished, failed, or was cancelled.
pub struct ExtractorGuard<L: TextLayer> {
    layer: L,
}

impl<L: TextLayer> ExtractorGuard<L> {
    pub fn new(layer: L) -> Self {
        Self { layer }
    }
}

impl<L: TextLayer> Deref for ExtractorGuard<L> {
    type Target = L;

    fn deref(&self) -> &L {
        &self.layer
    }
}

impl<L: TextLayer> DerefMut for ExtractorGuard<L> {
    fn deref_mut(&mut self) -> &mut L {
        &mut self.layer
    }
}

impl<L: TextLayer> Drop for ExtractorGuard<L> {
    fn drop(&mut self) {
        self.layer.destroy();
    }
}

/// Text content and geometry of every page, extracted while loading.
#[derive(Debug)]
struct LoadedDocument {
    pages: Vec<PageText>,
    sizes: Vec<PageSize>,
}

impl LoadedDocument {
    fn parse(bytes: &[u8], password: Option<&str>) -> Result<LoadedDocument, LoadError> {
        let mut doc = Document::load_mem(bytes)?;
        if doc.is_encrypted() {
            doc.decrypt(password.unwrap_or(""))?;
        }

        let page_ids = doc.get_pages();
        if page_ids.is_empty() {
            return Err(LoadError::NoPages);
        }

        let empty_resources = Dictionary::new();
        let mut pages = Vec::with_capacity(page_ids.len());
        let mut sizes = Vec::with_capacity(page_ids.len());
        for (page_num, object_id) in page_ids {
            let Ok(page_dict) = doc.get_dictionary(object_id) else {
                warn!("page {} is not a dictionary", page_num);
                pages.push(PageText::empty(page_num));
                sizes.push(page_media_box(&doc, &empty_resources).size());
                continue;
            };
            let media_box = page_media_box(&doc, page_dict);
            sizes.push(media_box.size());

            let resources = get_inherited::<&Dictionary>(&doc, page_dict, b"Resources")
                .unwrap_or(&empty_resources);
            let content = match doc.get_page_content(object_id) {
                Ok(content) => content,
                Err(e) => {
                    warn!("no readable content on page {}: {}", page_num, e);
                    pages.push(PageText::empty(page_num));
                    continue;
                }
            };

            let mut output = GlyphCollector::new(page_num, &media_box);
            Processor::new(&doc).process_page(&content, resources, &mut output, page_num);
            let text = output.into_page_text();
            debug!("page {}: {} glyphs", page_num, text.glyphs.len());
            pages.push(text);
        }

        Ok(LoadedDocument { pages, sizes })
    }

    fn page(&self, page: u32) -> Option<&PageText> {
        let index = usize::try_from(page).ok()?.checked_sub(1)?;
        self.pages.get(index)
    }
}

#[derive(Debug)]
enum LayerState {
    Empty,
    Loading,
    Loaded(Arc<LoadedDocument>),
    Failed,
    Destroyed,
}

/// Builder for configuring a [`PdfTextLayer`].
///
/// # Examples
///
/// ```no_run
/// use field_locator::PdfTextLayer;
///
/// let layer = PdfTextLayer::builder().password("secret").build();
/// ```
#[derive(Debug, Clone, Default)]
pub struct PdfTextLayerBuilder {
    password: Option<String>,
}

impl PdfTextLayerBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the password for encrypted PDFs.
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Build an unloaded text layer.
    pub fn build(self) -> PdfTextLayer {
        PdfTextLayer {
            password: self.password,
            state: LayerState::Empty,
        }
    }
}

/// lopdf-backed [`TextLayer`].
///
/// Parsing runs on the blocking pool; every page's text is extracted once,
/// during `load`, and searched in memory afterwards.
///
/// # Examples
///
/// ```no_run
/// use field_locator::{DocumentSource, PdfTextLayer, TextLayer};
///
/// # async fn run() -> Result<(), Box<dyn std::error::Error>> {
/// let mut layer = PdfTextLayer::default();
/// layer.load(&DocumentSource::from_path("contract.pdf")?).await?;
/// let found = layer.locate("GAP Premium: $500.00", 1).await?;
/// println!("{} at {}", found.text, found.bbox);
/// layer.destroy();
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct PdfTextLayer {
    password: Option<String>,
    state: LayerState,
}

impl Default for PdfTextLayer {
    fn default() -> Self {
        PdfTextLayerBuilder::default().build()
    }
}

impl PdfTextLayer {
    /// Create a builder for configuring extraction options.
    pub fn builder() -> PdfTextLayerBuilder {
        PdfTextLayerBuilder::new()
    }

    fn loaded(&self) -> Result<&Arc<LoadedDocument>, NotLoadedError> {
        match &self.state {
            LayerState::Loaded(doc) => Ok(doc),
            _ => Err(NotLoadedError),
        }
    }

    /// The page's text as the matcher sees it, or `None` for a page that
    /// does not exist.
    pub fn text_content(&self, page: u32) -> Result<Option<String>, NotLoadedError> {
        Ok(self.loaded()?.page(page).map(search::page_string))
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self.state, LayerState::Loaded(_))
    }
}

impl TextLayer for PdfTextLayer {
    async fn load(&mut self, source: &DocumentSource) -> Result<(), LoadError> {
        match self.state {
            LayerState::Empty => {}
            LayerState::Destroyed => return Err(LoadError::Destroyed),
            _ => return Err(LoadError::AlreadyLoaded),
        }
        self.state = LayerState::Loading;

        let bytes = source.shared_bytes();
        let password = self.password.clone();
        let parsed = tokio::task::spawn_blocking(move || {
            LoadedDocument::parse(&bytes, password.as_deref())
        })
        .await
        .unwrap_or_else(|e| Err(LoadError::Task(e.to_string())));

        match parsed {
            Ok(doc) => {
                info!("loaded {} ({} pages)", source.id(), doc.pages.len());
                self.state = LayerState::Loaded(Arc::new(doc));
                Ok(())
            }
            Err(e) => {
                warn!("failed to load {}: {}", source.id(), e);
                self.state = LayerState::Failed;
                Err(e)
            }
        }
    }

    fn page_count(&self) -> Result<u32, NotLoadedError> {
        Ok(self.loaded()?.pages.len() as u32)
    }

    fn page_sizes(&self) -> Result<Vec<PageSize>, NotLoadedError> {
        Ok(self.loaded()?.sizes.clone())
    }

    async fn locate(&self, snippet: &str, page: u32) -> Result<Located, LocateError> {
        let doc = Arc::clone(self.loaded()?);
        // Keep long field lists from monopolizing the event loop.
        tokio::task::yield_now().await;

        let bbox = doc
            .page(page)
            .and_then(|text| search::locate_in_page(text, snippet))
            .ok_or_else(|| LocateError::not_found(snippet, page))?;
        debug!("located {:?} on page {} at {}", snippet, page, bbox);
        Ok(Located {
            text: snippet.to_owned(),
            page,
            bbox,
        })
    }

    fn destroy(&mut self) {
        if let LayerState::Loaded(_) = self.state {
            debug!("releasing parsed document");
        }
        self.state = LayerState::Destroyed;
    }
}

/// Creates [`PdfTextLayer`]s sharing one configuration.
#[derive(Debug, Clone, Default)]
pub struct PdfTextLayerFactory {
    builder: PdfTextLayerBuilder,
}

impl PdfTextLayerFactory {
    pub fn new(builder: PdfTextLayerBuilder) -> Self {
        Self { builder }
    }
}

impl TextLayerFactory for PdfTextLayerFactory {
    type Layer = PdfTextLayer;

    fn create(&self) -> PdfTextLayer {
        self.builder.clone().build()
    }
}
