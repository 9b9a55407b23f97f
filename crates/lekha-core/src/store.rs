//! Vector index for chunk embeddings: append-only insert, exact nearest-neighbor
//! search under squared Euclidean distance, and paired save/load.
//!
//! Vectors and their text units are two parallel collections; row `i` of the
//! vector matrix always belongs to `documents[i]`.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::text_unit::TextUnit;

const VECTORS_FILENAME: &str = "vectors.bin";
const DOCUMENTS_FILENAME: &str = "documents.json";
const FORMAT_VERSION: u32 = 2;

/// An index shared between ingestion and querying. The lock serializes
/// inserts against searches.
pub type SharedIndex = Arc<RwLock<VectorIndex>>;

/// Locations of the two artifacts that make up a persisted index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexPaths {
    pub vectors: PathBuf,
    pub documents: PathBuf,
}

impl IndexPaths {
    pub fn new(vectors: impl Into<PathBuf>, documents: impl Into<PathBuf>) -> Self {
        Self {
            vectors: vectors.into(),
            documents: documents.into(),
        }
    }

    /// `vectors.bin` and `documents.json` inside `dir`.
    pub fn in_dir(dir: &Path) -> Self {
        Self::new(dir.join(VECTORS_FILENAME), dir.join(DOCUMENTS_FILENAME))
    }

    /// True if either artifact is on disk.
    pub fn any_exist(&self) -> bool {
        self.vectors.exists() || self.documents.exists()
    }
}

/// On-disk form of the vector half. `documents_sha256` pins it to the exact
/// documents file it was saved with.
#[derive(Serialize, Deserialize)]
struct VectorArtifact {
    format_version: u32,
    dimension: u64,
    count: u64,
    documents_sha256: [u8; 32],
    vectors: Vec<f32>,
}

/// Exact (brute-force) L2 index over fixed-dimension vectors.
#[derive(Debug, Clone)]
pub struct VectorIndex {
    dimension: usize,
    /// Row-major, `len() * dimension` values.
    vectors: Vec<f32>,
    documents: Vec<TextUnit>,
}

impl VectorIndex {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            vectors: Vec::new(),
            documents: Vec::new(),
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Number of stored units.
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn documents(&self) -> &[TextUnit] {
        &self.documents
    }

    pub fn into_shared(self) -> SharedIndex {
        Arc::new(RwLock::new(self))
    }

    /// Append vectors and their units in lock-step. Everything is validated
    /// before anything is stored.
    pub fn insert(&mut self, vectors: Vec<Vec<f32>>, units: Vec<TextUnit>) -> Result<(), StoreError> {
        if self.dimension == 0 {
            return Err(StoreError::DimensionMismatch("index dimension is zero".into()));
        }
        if vectors.len() != units.len() {
            return Err(StoreError::DimensionMismatch(format!(
                "{} vectors for {} text units",
                vectors.len(),
                units.len()
            )));
        }
        if let Some((i, v)) = vectors
            .iter()
            .enumerate()
            .find(|(_, v)| v.len() != self.dimension)
        {
            return Err(StoreError::DimensionMismatch(format!(
                "vector {i} has length {}, index dimension is {}",
                v.len(),
                self.dimension
            )));
        }
        self.vectors.reserve(vectors.len() * self.dimension);
        for v in vectors {
            self.vectors.extend_from_slice(&v);
        }
        self.documents.extend(units);
        Ok(())
    }

    /// The `k` nearest units, nearest first.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<TextUnit>, StoreError> {
        Ok(self
            .search_with_distances(query, k)?
            .into_iter()
            .map(|(unit, _)| unit)
            .collect())
    }

    /// Like [`search`](Self::search), with each unit's squared distance to `query`.
    /// Equal distances keep insertion order.
    pub fn search_with_distances(
        &self,
        query: &[f32],
        k: usize,
    ) -> Result<Vec<(TextUnit, f32)>, StoreError> {
        if self.is_empty() {
            return Err(StoreError::Empty);
        }
        if query.len() != self.dimension {
            return Err(StoreError::DimensionMismatch(format!(
                "query has length {}, index dimension is {}",
                query.len(),
                self.dimension
            )));
        }
        let mut scored: Vec<(usize, f32)> = self
            .vectors
            .chunks_exact(self.dimension)
            .map(|row| squared_l2(query, row))
            .enumerate()
            .collect();
        // sort_by is stable, so ties stay in insertion order.
        scored.sort_by(|a, b| a.1.total_cmp(&b.1));
        Ok(scored
            .into_iter()
            .take(k)
            .map(|(i, d)| (self.documents[i].clone(), d))
            .collect())
    }

    /// Write both artifacts. Both temporary files are written before either
    /// is renamed into place; a pair torn between two saves fails
    /// [`restore`](Self::restore) on the documents digest.
    pub fn persist(&self, paths: &IndexPaths) -> Result<(), StoreError> {
        let document_bytes = serde_json::to_vec_pretty(&self.documents)
            .map_err(|e| StoreError::Serialize(e.to_string()))?;
        let artifact = VectorArtifact {
            format_version: FORMAT_VERSION,
            dimension: self.dimension as u64,
            count: self.len() as u64,
            documents_sha256: Sha256::digest(&document_bytes).into(),
            vectors: self.vectors.clone(),
        };
        let vector_bytes =
            bincode::serialize(&artifact).map_err(|e| StoreError::Serialize(e.to_string()))?;

        let vectors_tmp = write_temp(&paths.vectors, &vector_bytes)?;
        let documents_tmp = match write_temp(&paths.documents, &document_bytes) {
            Ok(tmp) => tmp,
            Err(e) => {
                let _ = fs::remove_file(&vectors_tmp);
                return Err(e);
            }
        };
        fs::rename(&vectors_tmp, &paths.vectors)
            .map_err(|e| StoreError::Write(paths.vectors.clone(), e))?;
        fs::rename(&documents_tmp, &paths.documents)
            .map_err(|e| StoreError::Write(paths.documents.clone(), e))?;
        tracing::info!(
            vectors = %paths.vectors.display(),
            documents = %paths.documents.display(),
            count = self.len(),
            "index persisted"
        );
        Ok(())
    }

    /// Load an index from its two artifacts. When `expected_dimension` is
    /// given, the stored dimension must match it.
    pub fn restore(paths: &IndexPaths, expected_dimension: Option<usize>) -> Result<Self, StoreError> {
        let vector_bytes = read_artifact(&paths.vectors)?;
        let document_bytes = read_artifact(&paths.documents)?;
        let artifact: VectorArtifact = bincode::deserialize(&vector_bytes).map_err(|e| {
            StoreError::CorruptState(format!("{}: {e}", paths.vectors.display()))
        })?;
        let documents: Vec<TextUnit> = serde_json::from_slice(&document_bytes).map_err(|e| {
            StoreError::CorruptState(format!("{}: {e}", paths.documents.display()))
        })?;

        if artifact.format_version != FORMAT_VERSION {
            return Err(StoreError::CorruptState(format!(
                "unknown vector format version {}",
                artifact.format_version
            )));
        }
        if artifact.documents_sha256 != <[u8; 32]>::from(Sha256::digest(&document_bytes)) {
            return Err(StoreError::CorruptState(format!(
                "{} does not belong to {}",
                paths.documents.display(),
                paths.vectors.display()
            )));
        }
        let dimension = usize::try_from(artifact.dimension)
            .map_err(|_| StoreError::CorruptState("stored dimension out of range".into()))?;
        if dimension == 0 {
            return Err(StoreError::CorruptState("stored dimension is zero".into()));
        }
        let expected_values = dimension.checked_mul(documents.len()).ok_or_else(|| {
            StoreError::CorruptState(format!("stored dimension {dimension} is implausible"))
        })?;
        if artifact.count != documents.len() as u64 || artifact.vectors.len() != expected_values {
            return Err(StoreError::CorruptState(format!(
                "{} vector values (dimension {dimension}, count {}) for {} documents",
                artifact.vectors.len(),
                artifact.count,
                documents.len()
            )));
        }
        if let Some(expected) = expected_dimension {
            if expected != dimension {
                return Err(StoreError::DimensionMismatch(format!(
                    "stored index has dimension {dimension}, expected {expected}"
                )));
            }
        }
        Ok(Self {
            dimension,
            vectors: artifact.vectors,
            documents,
        })
    }
}

fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

fn read_artifact(path: &Path) -> Result<Vec<u8>, StoreError> {
    fs::read(path).map_err(|e| StoreError::CorruptState(format!("{}: {e}", path.display())))
}

fn temp_path(path: &Path) -> PathBuf {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    PathBuf::from(tmp)
}

/// Writes `bytes` next to `path` and returns the temporary file's path.
fn write_temp(path: &Path, bytes: &[u8]) -> Result<PathBuf, StoreError> {
    let write_err = |e| StoreError::Write(path.to_path_buf(), e);
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(write_err)?;
    }
    let tmp = temp_path(path);
    fs::write(&tmp, bytes).map_err(write_err)?;
    Ok(tmp)
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("dimension mismatch: {0}")]
    DimensionMismatch(String),
    #[error("index is empty")]
    Empty,
    #[error("corrupt index state: {0}")]
    CorruptState(String),
    #[error("failed to write {0}: {1}")]
    Write(PathBuf, std::io::Error),
    #[error("failed to serialize index: {0}")]
    Serialize(String),
    #[error("index lock poisoned")]
    Poisoned,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(name: &str) -> TextUnit {
        TextUnit::page(format!("{name}.pdf"), 1, name)
    }

    fn sample() -> VectorIndex {
        let mut idx = VectorIndex::new(2);
        idx.insert(
            vec![vec![0.0, 0.0], vec![1.0, 0.0], vec![0.0, 3.0], vec![5.0, 5.0]],
            vec![unit("origin"), unit("east"), unit("north"), unit("far")],
        )
        .unwrap();
        idx
    }

    fn names(units: &[TextUnit]) -> Vec<&str> {
        units.iter().map(|u| u.content()).collect()
    }

    #[test]
    fn nearest_first_with_exact_match_at_zero() {
        let idx = sample();
        let hits = idx.search_with_distances(&[1.0, 0.0], 4).unwrap();
        assert_eq!(hits[0].0.content(), "east");
        assert_eq!(hits[0].1, 0.0);
        assert!(hits.windows(2).all(|w| w[0].1 <= w[1].1));
        assert_eq!(hits[1].1, 1.0);
    }

    #[test]
    fn k_larger_than_len_returns_everything() {
        let idx = sample();
        let hits = idx.search(&[0.0, 0.0], 100).unwrap();
        assert_eq!(names(&hits), vec!["origin", "east", "north", "far"]);
        assert!(idx.search(&[0.0, 0.0], 0).unwrap().is_empty());
    }

    #[test]
    fn ties_keep_insertion_order() {
        let mut idx = VectorIndex::new(1);
        idx.insert(
            vec![vec![2.0], vec![-2.0], vec![2.0], vec![0.5]],
            vec![unit("a"), unit("b"), unit("c"), unit("d")],
        )
        .unwrap();
        let hits = idx.search(&[0.0], 4).unwrap();
        assert_eq!(names(&hits), vec!["d", "a", "b", "c"]);
    }

    #[test]
    fn bad_insert_leaves_index_untouched() {
        let mut idx = sample();
        let err = idx
            .insert(vec![vec![1.0, 1.0]], vec![unit("x"), unit("y")])
            .unwrap_err();
        assert!(matches!(err, StoreError::DimensionMismatch(_)));
        let err = idx
            .insert(vec![vec![1.0, 1.0], vec![1.0]], vec![unit("x"), unit("y")])
            .unwrap_err();
        assert!(matches!(err, StoreError::DimensionMismatch(_)));
        assert_eq!(idx.len(), 4);
        assert_eq!(idx.vectors.len(), 8);
    }

    #[test]
    fn search_validates_state_and_query() {
        let empty = VectorIndex::new(3);
        assert!(matches!(empty.search(&[0.0; 3], 1), Err(StoreError::Empty)));
        assert!(matches!(
            sample().search(&[0.0; 3], 1),
            Err(StoreError::DimensionMismatch(_))
        ));
    }

    #[test]
    fn persist_then_restore_searches_identically() {
        let dir = tempfile::tempdir().unwrap();
        let paths = IndexPaths::in_dir(&dir.path().join("index"));
        let idx = sample();
        idx.persist(&paths).unwrap();

        let restored = VectorIndex::restore(&paths, Some(2)).unwrap();
        assert_eq!(restored.len(), idx.len());
        for q in [[0.2, 0.1], [4.0, 4.0], [0.0, 2.0]] {
            assert_eq!(restored.search(&q, 3).unwrap(), idx.search(&q, 3).unwrap());
        }
    }

    #[test]
    fn restore_needs_both_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let paths = IndexPaths::in_dir(dir.path());
        sample().persist(&paths).unwrap();
        fs::remove_file(&paths.documents).unwrap();
        assert!(paths.any_exist());
        assert!(matches!(
            VectorIndex::restore(&paths, None),
            Err(StoreError::CorruptState(_))
        ));
    }

    #[test]
    fn restore_rejects_misaligned_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let paths = IndexPaths::in_dir(dir.path());
        sample().persist(&paths).unwrap();
        // Three documents against four stored vectors.
        let docs = vec![unit("a"), unit("b"), unit("c")];
        fs::write(&paths.documents, serde_json::to_vec(&docs).unwrap()).unwrap();
        assert!(matches!(
            VectorIndex::restore(&paths, None),
            Err(StoreError::CorruptState(_))
        ));
    }

    #[test]
    fn restore_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let paths = IndexPaths::in_dir(dir.path());
        fs::write(&paths.vectors, b"not bincode").unwrap();
        fs::write(&paths.documents, b"[]").unwrap();
        assert!(matches!(
            VectorIndex::restore(&paths, None),
            Err(StoreError::CorruptState(_))
        ));
    }

    fn one_dimensional(docs: [(&str, f32); 2]) -> VectorIndex {
        let mut idx = VectorIndex::new(1);
        idx.insert(
            docs.iter().map(|(_, x)| vec![*x]).collect(),
            docs.iter().map(|(name, _)| unit(name)).collect(),
        )
        .unwrap();
        idx
    }

    #[test]
    fn failed_save_keeps_previous_pair() {
        let dir = tempfile::tempdir().unwrap();
        let paths = IndexPaths::in_dir(dir.path());
        one_dimensional([("old-zero", 0.0), ("old-ten", 10.0)])
            .persist(&paths)
            .unwrap();

        // The documents temp file cannot be created.
        fs::create_dir(temp_path(&paths.documents)).unwrap();
        let newer = one_dimensional([("new-ten", 10.0), ("new-zero", 0.0)]);
        assert!(matches!(newer.persist(&paths), Err(StoreError::Write(..))));
        assert!(!temp_path(&paths.vectors).exists());

        let restored = VectorIndex::restore(&paths, Some(1)).unwrap();
        assert_eq!(restored.search(&[0.0], 1).unwrap()[0].content(), "old-zero");
    }

    #[test]
    fn vectors_from_another_save_are_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let old = IndexPaths::in_dir(&dir.path().join("old"));
        let new = IndexPaths::in_dir(&dir.path().join("new"));
        one_dimensional([("old-zero", 0.0), ("old-ten", 10.0)])
            .persist(&old)
            .unwrap();
        one_dimensional([("new-ten", 10.0), ("new-zero", 0.0)])
            .persist(&new)
            .unwrap();

        // Same count and dimension, different documents.
        fs::copy(&new.vectors, &old.vectors).unwrap();
        assert!(matches!(
            VectorIndex::restore(&old, Some(1)),
            Err(StoreError::CorruptState(_))
        ));
    }

    #[test]
    fn huge_stored_dimension_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let paths = IndexPaths::in_dir(dir.path());
        let docs = serde_json::to_vec_pretty(&vec![unit("a"), unit("b"), unit("c")]).unwrap();
        let artifact = VectorArtifact {
            format_version: FORMAT_VERSION,
            dimension: u64::MAX / 2,
            count: 3,
            documents_sha256: Sha256::digest(&docs).into(),
            vectors: Vec::new(),
        };
        fs::write(&paths.vectors, bincode::serialize(&artifact).unwrap()).unwrap();
        fs::write(&paths.documents, &docs).unwrap();
        assert!(matches!(
            VectorIndex::restore(&paths, None),
            Err(StoreError::CorruptState(_))
        ));
    }

    #[test]
    fn zero_dimension_index_rejects_inserts() {
        let mut idx = VectorIndex::new(0);
        assert!(matches!(
            idx.insert(vec![vec![]], vec![unit("a")]),
            Err(StoreError::DimensionMismatch(_))
        ));
        assert!(matches!(idx.search(&[], 1), Err(StoreError::Empty)));
    }

    #[test]
    fn restore_against_other_dimension_fails() {
        let dir = tempfile::tempdir().unwrap();
        let paths = IndexPaths::in_dir(dir.path());
        sample().persist(&paths).unwrap();
        assert!(matches!(
            VectorIndex::restore(&paths, Some(1024)),
            Err(StoreError::DimensionMismatch(_))
        ));
    }
}
