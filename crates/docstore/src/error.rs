use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum DocStoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid document path: {0}")]
    InvalidPath(String),

    #[error("Document not found: {0}")]
    DocumentNotFound(String),

    #[error("Document already exists: {0}")]
    DocumentExists(String),

    #[error("Heading not found: {0}")]
    HeadingNotFound(String),

    #[error("Duplicate heading slug '{slug}' among depth-{depth} siblings")]
    DuplicateHeading { slug: String, depth: u8 },

    #[error("File changed on disk since snapshot: {0}")]
    StaleWrite(PathBuf),

    #[error("Heading capacity exhausted loading {path}: {requested} headings over a cap of {cap}")]
    HeadingCapExceeded {
        path: String,
        requested: usize,
        cap: usize,
    },

    #[error("Watcher error: {0}")]
    Watch(String),

    #[error("Archive error: {0}")]
    Archive(String),

    #[error("Config error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, DocStoreError>;
