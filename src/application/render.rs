use std::{io, path::{Path, PathBuf}};

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::tree::DocumentTree;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("pdf engine failure: {0}")]
    Engine(String),
    #[error("failed to write artifact: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("document tree has no pages")]
    EmptyDocument,
    #[error("document would exceed {limit} pages")]
    TooManyPages { limit: usize },
}

impl RenderError {
    pub fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Serializes a document tree to a PDF file at `output`.
///
/// Implementations must leave no file behind, or a truncated one at worst,
/// when they return an error. The pipeline never reads the artifact after a
/// failed render.
#[async_trait]
pub trait Renderer: Send + Sync {
    async fn render(&self, tree: &DocumentTree, output: &Path) -> Result<(), RenderError>;
}
