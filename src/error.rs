use thiserror::Error;

/// A method that needs a parsed document was called before `load` succeeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("document has not been loaded")]
pub struct NotLoadedError;

/// The document source could not be turned into a searchable document.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("load may only be called once per extractor")]
    AlreadyLoaded,
    #[error("extractor has been destroyed")]
    Destroyed,
    #[error("PDF error: {0}")]
    Pdf(#[from] lopdf::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("document has no pages")]
    NoPages,
    #[error("parser task failed: {0}")]
    Task(String),
}

/// Why a snippet could not be located.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LocateError {
    #[error(transparent)]
    NotLoaded(#[from] NotLoadedError),
    #[error("snippet {snippet:?} not found on page {page}")]
    NotFound { snippet: String, page: u32 },
}

impl LocateError {
    pub(crate) fn not_found(snippet: &str, page: u32) -> LocateError {
        LocateError::NotFound {
            snippet: snippet.to_owned(),
            page,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, LocateError::NotFound { .. })
    }
}

/// Whole-document failure surfaced on the resolver's `error`.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("failed to load document {document}: {source}")]
    Load {
        document: String,
        #[source]
        source: LoadError,
    },
    #[error("text layer for document {document} was not ready: {source}")]
    NotLoaded {
        document: String,
        #[source]
        source: NotLoadedError,
    },
}
