//! Index pipeline: discover → load → chunk → embed → store. Builds a vector index
//! from a folder of documents, or restores a previously persisted one.

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::chunks::Chunker;
use crate::documents::{discover_documents, ScanError};
use crate::gateway::{embed_all, Batching, Embedder, GatewayError};
use crate::loader::{LoadError, LoaderRegistry};
use crate::store::{IndexPaths, StoreError, VectorIndex};
use crate::text_unit::TextUnit;

/// Everything ingestion needs besides the documents themselves.
pub struct Ingestion<'a, E: Embedder + ?Sized> {
    pub loaders: &'a LoaderRegistry,
    pub chunker: Chunker,
    pub embedder: &'a E,
    pub batching: Batching,
    /// Checked against the first embedding when set.
    pub expected_dimension: Option<usize>,
}

/// Loads every supported document under `root` and chunks it, in path order.
/// Documents that produce no text are logged and skipped.
pub fn load_documents(
    root: &Path,
    loaders: &LoaderRegistry,
    chunker: &Chunker,
) -> Result<Vec<TextUnit>, IngestError> {
    let paths = discover_documents(root, &loaders.extensions())?;
    if paths.is_empty() {
        return Err(IngestError::NoInputFound(root.to_path_buf()));
    }
    let mut pages = Vec::new();
    for path in &paths {
        info!(path = %path.display(), "loading");
        let units = loaders.load(path)?;
        if units.is_empty() {
            warn!(path = %path.display(), "no text found, skipping document");
            continue;
        }
        pages.extend(units);
    }
    info!(documents = paths.len(), pages = pages.len(), "documents loaded");
    let chunks = chunker.chunk(&pages);
    info!(chunks = chunks.len(), "chunks created");
    Ok(chunks)
}

/// Runs the full pipeline and returns the populated index. The index
/// dimension is taken from the first embedding.
pub async fn build_index<E: Embedder + ?Sized>(
    root: &Path,
    ingestion: &Ingestion<'_, E>,
) -> Result<VectorIndex, IngestError> {
    let chunks = load_documents(root, ingestion.loaders, &ingestion.chunker)?;
    if chunks.is_empty() {
        return Err(IngestError::NoContent(root.to_path_buf()));
    }

    let texts: Vec<String> = chunks.iter().map(|c| c.content().to_string()).collect();
    let embeddings = embed_all(ingestion.embedder, &texts, ingestion.batching).await?;

    let dimension = embeddings.first().map(Vec::len).unwrap_or_default();
    if dimension == 0 {
        return Err(StoreError::DimensionMismatch("embedding service returned empty vectors".into()).into());
    }
    if let Some(expected) = ingestion.expected_dimension {
        if expected != dimension {
            return Err(StoreError::DimensionMismatch(format!(
                "embedding model returned dimension {dimension}, configured {expected}"
            ))
            .into());
        }
    }

    let mut index = VectorIndex::new(dimension);
    index.insert(embeddings, chunks)?;
    info!(count = index.len(), dimension, "index built");
    Ok(index)
}

/// Restores the index from `paths` when its artifacts exist; otherwise (or
/// when they are corrupt) rebuilds it from `root` and persists it.
pub async fn open_or_build_index<E: Embedder + ?Sized>(
    root: &Path,
    paths: &IndexPaths,
    ingestion: &Ingestion<'_, E>,
    force_rebuild: bool,
) -> Result<VectorIndex, IngestError> {
    if !force_rebuild && paths.any_exist() {
        match VectorIndex::restore(paths, ingestion.expected_dimension) {
            Ok(index) => {
                info!(count = index.len(), dimension = index.dimension(), "loaded existing index");
                return Ok(index);
            }
            Err(StoreError::CorruptState(reason)) => {
                warn!(%reason, "stored index unusable, rebuilding from source documents");
            }
            Err(e) => return Err(e.into()),
        }
    }
    info!(root = %root.display(), "building index (this may take a few minutes)");
    let index = build_index(root, ingestion).await?;
    index.persist(paths)?;
    Ok(index)
}

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("no source documents found in {0}")]
    NoInputFound(PathBuf),
    #[error("no text could be extracted from the documents in {0}")]
    NoContent(PathBuf),
    #[error("scan error: {0}")]
    Scan(#[from] ScanError),
    #[error("load error: {0}")]
    Load(#[from] LoadError),
    #[error("embedding error: {0}")]
    Gateway(#[from] GatewayError),
    #[error("index error: {0}")]
    Store(#[from] StoreError),
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::loader::TextFileLoader;

    /// 3-dimensional bag-of-letters embedding: counts of 'a', 'b' and 'c'.
    struct Letters {
        calls: AtomicUsize,
    }

    impl Letters {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Embedder for Letters {
        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, GatewayError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(texts
                .iter()
                .map(|t| {
                    ['a', 'b', 'c']
                        .iter()
                        .map(|ch| t.chars().filter(|x| x == ch).count() as f32)
                        .collect()
                })
                .collect())
        }
    }

    fn ingestion<'a>(loaders: &'a LoaderRegistry, embedder: &'a Letters) -> Ingestion<'a, Letters> {
        Ingestion {
            loaders,
            chunker: Chunker::new(3, 1).unwrap(),
            embedder,
            batching: Batching {
                batch_size: 2,
                concurrency: 2,
            },
            expected_dimension: None,
        }
    }

    fn corpus() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "aaa aa a b").unwrap();
        std::fs::write(dir.path().join("b.md"), "bbb bb").unwrap();
        std::fs::write(dir.path().join("empty.txt"), "   ").unwrap();
        std::fs::write(dir.path().join("skip.png"), "ccc").unwrap();
        dir
    }

    #[tokio::test]
    async fn builds_aligned_index_from_folder() {
        let dir = corpus();
        let loaders = LoaderRegistry::new().with(TextFileLoader);
        let embedder = Letters::new();
        let index = build_index(dir.path(), &ingestion(&loaders, &embedder)).await.unwrap();

        assert_eq!(index.dimension(), 3);
        // a.txt: [aaa aa a] [a b]; b.md: [bbb bb]
        let contents: Vec<_> = index.documents().iter().map(|u| u.content()).collect();
        assert_eq!(contents, vec!["aaa aa a", "a b", "bbb bb"]);
        let hits = index.search(&[0.0, 5.0, 0.0], 1).unwrap();
        assert_eq!(hits[0].content(), "bbb bb");
        assert!(hits[0].source().unwrap().ends_with("b.md"));
        assert_eq!(hits[0].chunk_index(), Some(0));
    }

    #[tokio::test]
    async fn empty_folder_is_no_input() {
        let dir = tempfile::tempdir().unwrap();
        let loaders = LoaderRegistry::new().with(TextFileLoader);
        let embedder = Letters::new();
        let err = build_index(dir.path(), &ingestion(&loaders, &embedder)).await.unwrap_err();
        assert!(matches!(err, IngestError::NoInputFound(_)));
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn configured_dimension_must_match_model() {
        let dir = corpus();
        let loaders = LoaderRegistry::new().with(TextFileLoader);
        let embedder = Letters::new();
        let mut ing = ingestion(&loaders, &embedder);
        ing.expected_dimension = Some(1024);
        let err = build_index(dir.path(), &ing).await.unwrap_err();
        assert!(matches!(err, IngestError::Store(StoreError::DimensionMismatch(_))));
    }

    #[tokio::test]
    async fn second_open_restores_instead_of_embedding() {
        let dir = corpus();
        let out = tempfile::tempdir().unwrap();
        let paths = IndexPaths::in_dir(out.path());
        let loaders = LoaderRegistry::new().with(TextFileLoader);
        let embedder = Letters::new();
        let ing = ingestion(&loaders, &embedder);

        let built = open_or_build_index(dir.path(), &paths, &ing, false).await.unwrap();
        let calls = embedder.calls.load(Ordering::SeqCst);
        assert!(calls > 0);

        let reopened = open_or_build_index(dir.path(), &paths, &ing, false).await.unwrap();
        assert_eq!(embedder.calls.load(Ordering::SeqCst), calls);
        assert_eq!(reopened.documents(), built.documents());
    }

    #[tokio::test]
    async fn corrupt_artifacts_are_rebuilt() {
        let dir = corpus();
        let out = tempfile::tempdir().unwrap();
        let paths = IndexPaths::in_dir(out.path());
        std::fs::write(&paths.vectors, b"junk").unwrap();
        let loaders = LoaderRegistry::new().with(TextFileLoader);
        let embedder = Letters::new();
        let index = open_or_build_index(dir.path(), &paths, &ingestion(&loaders, &embedder), false)
            .await
            .unwrap();
        assert_eq!(index.len(), 3);
        assert!(paths.documents.exists());
        VectorIndex::restore(&paths, Some(3)).unwrap();
    }
}
