//! Exact inner-product flat index with positionally paired metadata.
//!
//! Vectors are L2-normalized on the way in, so the inner product of stored
//! rows with a normalized query equals cosine similarity. Slot `i` of the
//! vector data and slot `i` of the metadata always describe the same chunk;
//! that pairing is the sole correctness invariant of the store and is
//! asserted after every mutation.

use std::cmp::Ordering;
use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use noctua_core::{Error, Result};

/// File name of the binary vector artifact inside the persistence directory.
pub const INDEX_FILE: &str = "index.bin";

/// File name of the metadata artifact inside the persistence directory.
pub const META_FILE: &str = "meta.json";

/// Lifecycle state of a [`FlatIndex`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexStatus {
    /// No vector has ever been added or loaded; the dimension is unset.
    Uninitialized,
    /// The dimension is locked but the index holds no entries.
    Empty,
    /// The index holds at least one entry.
    Populated,
}

/// A single ranked match returned by [`FlatIndex::search`].
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChunk {
    /// Inner-product similarity in `[-1, 1]`.
    pub score: f32,
    /// The stored chunk text.
    pub text: String,
}

/// Metadata record paired with the vector stored at the same slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct ChunkRecord {
    text: String,
}

/// On-disk form of the vector artifact.
#[derive(Serialize, Deserialize)]
struct IndexArtifact {
    dimension: usize,
    data: Vec<f32>,
}

#[derive(Default)]
struct IndexInner {
    dimension: Option<usize>,
    /// Normalized vectors, row-major, stride = dimension.
    data: Vec<f32>,
    metadata: Vec<ChunkRecord>,
}

impl IndexInner {
    /// Positional pairing invariant, checked after every mutation.
    fn assert_paired(&self) {
        let expected = self.dimension.unwrap_or(0) * self.metadata.len();
        assert_eq!(
            self.data.len(),
            expected,
            "vector data and metadata diverged"
        );
    }
}

/// Exact (non-approximate) inner-product index over L2-normalized vectors,
/// with `{text}` metadata paired by slot and synchronous persistence.
///
/// Growth is append-only; there is no delete or update. A single internal
/// lock serializes writers (`add`, `load`, `clear`) while allowing
/// concurrent readers between writes, so the index can be shared behind an
/// `Arc`. Persistence of the two artifacts is not atomic as a pair.
pub struct FlatIndex {
    persist_dir: PathBuf,
    inner: RwLock<IndexInner>,
}

impl FlatIndex {
    /// Creates an empty, uninitialized index persisting under `persist_dir`.
    ///
    /// The directory is created if absent.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the directory cannot be created.
    pub fn new(persist_dir: impl Into<PathBuf>) -> Result<Self> {
        let persist_dir = persist_dir.into();
        fs::create_dir_all(&persist_dir).map_err(|e| Error::storage(&persist_dir, e))?;
        Ok(Self {
            persist_dir,
            inner: RwLock::new(IndexInner::default()),
        })
    }

    /// Returns the persistence directory.
    #[must_use]
    pub fn persist_dir(&self) -> &Path {
        &self.persist_dir
    }

    /// Returns `true` when both persisted artifacts exist.
    ///
    /// Whether to attempt [`FlatIndex::load`] at startup is the caller's
    /// decision; the index never guesses.
    #[must_use]
    pub fn artifacts_exist(&self) -> bool {
        self.index_path().exists() && self.meta_path().exists()
    }

    /// Lifecycle state, distinguishing "never used" from "used but empty".
    #[must_use]
    pub fn status(&self) -> IndexStatus {
        let inner = self.inner.read();
        match inner.dimension {
            None => IndexStatus::Uninitialized,
            Some(_) if inner.metadata.is_empty() => IndexStatus::Empty,
            Some(_) => IndexStatus::Populated,
        }
    }

    /// Locked vector dimension, if any vector was ever added or loaded.
    #[must_use]
    pub fn dimension(&self) -> Option<usize> {
        self.inner.read().dimension
    }

    /// Number of stored entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().metadata.len()
    }

    /// Returns `true` when no entries are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Appends normalized vectors with their paired texts, then persists
    /// both artifacts before returning. Every successful add is durable.
    ///
    /// The first insertion locks the index dimension to `vectors[0]`'s
    /// length. The whole batch is validated before anything is mutated, so
    /// a failure leaves prior entries untouched.
    ///
    /// # Errors
    ///
    /// Returns a validation error for an empty or unpaired batch, a
    /// dimension mismatch if any vector disagrees with the locked
    /// dimension, or a storage error if persistence fails.
    pub fn add(&self, vectors: Vec<Vec<f32>>, texts: Vec<String>) -> Result<usize> {
        if vectors.is_empty() || texts.is_empty() {
            return Err(Error::validation("cannot add an empty batch"));
        }
        if vectors.len() != texts.len() {
            return Err(Error::validation(format!(
                "{} vectors paired with {} texts",
                vectors.len(),
                texts.len()
            )));
        }

        let mut inner = self.inner.write();

        let dimension = match inner.dimension {
            Some(dimension) => dimension,
            None => {
                let dimension = vectors[0].len();
                if dimension == 0 {
                    return Err(Error::validation("embedding vectors must be non-empty"));
                }
                dimension
            }
        };
        for vector in &vectors {
            if vector.len() != dimension {
                return Err(Error::DimensionMismatch {
                    expected: dimension,
                    actual: vector.len(),
                });
            }
        }

        if inner.dimension.is_none() {
            tracing::info!(dimension, "initialized flat index");
        }
        inner.dimension = Some(dimension);

        let appended = vectors.len();
        for mut vector in vectors {
            l2_normalize(&mut vector);
            inner.data.extend_from_slice(&vector);
        }
        inner
            .metadata
            .extend(texts.into_iter().map(|text| ChunkRecord { text }));
        inner.assert_paired();

        self.save_inner(&inner)?;
        tracing::debug!(appended, total = inner.metadata.len(), "added entries");
        Ok(appended)
    }

    /// Exact search: normalized dot product of the query against every
    /// stored row.
    ///
    /// `top_k` is clamped to the number of entries. Results come back in
    /// descending score order, ties broken by the lower insertion slot. An
    /// initialized but empty index returns an empty list.
    ///
    /// # Errors
    ///
    /// Returns a validation error for `top_k == 0` or an index that was
    /// never initialized, and a dimension mismatch if the query length
    /// disagrees with the locked dimension.
    pub fn search(&self, query: &[f32], top_k: usize) -> Result<Vec<ScoredChunk>> {
        if top_k == 0 {
            return Err(Error::validation("top_k must be positive"));
        }

        let inner = self.inner.read();
        let Some(dimension) = inner.dimension else {
            return Err(Error::validation(
                "index is uninitialized; add or load documents first",
            ));
        };
        if query.len() != dimension {
            return Err(Error::DimensionMismatch {
                expected: dimension,
                actual: query.len(),
            });
        }
        if inner.metadata.is_empty() {
            tracing::warn!("search on an initialized but empty index");
            return Ok(Vec::new());
        }

        let mut query = query.to_vec();
        l2_normalize(&mut query);

        let mut scored: Vec<(usize, f32)> = inner
            .data
            .chunks_exact(dimension)
            .map(|row| dot(row, &query))
            .enumerate()
            .collect();
        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });
        scored.truncate(top_k.min(inner.metadata.len()));

        Ok(scored
            .into_iter()
            .map(|(slot, score)| ScoredChunk {
                score,
                text: inner.metadata[slot].text.clone(),
            })
            .collect())
    }

    /// Serializes both artifacts to the persistence directory.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the index was never initialized, or a
    /// storage error on write failure.
    pub fn save(&self) -> Result<()> {
        let inner = self.inner.read();
        self.save_inner(&inner)
    }

    fn save_inner(&self, inner: &IndexInner) -> Result<()> {
        let Some(dimension) = inner.dimension else {
            return Err(Error::validation("nothing to save: index is uninitialized"));
        };

        let index_path = self.index_path();
        let artifact = IndexArtifact {
            dimension,
            data: inner.data.clone(),
        };
        let bytes = bincode::serialize(&artifact).map_err(|e| Error::storage(&index_path, e))?;
        fs::write(&index_path, bytes).map_err(|e| Error::storage(&index_path, e))?;

        let meta_path = self.meta_path();
        let meta = serde_json::to_vec(&inner.metadata).map_err(|e| Error::storage(&meta_path, e))?;
        fs::write(&meta_path, meta).map_err(|e| Error::storage(&meta_path, e))?;

        tracing::debug!(
            dir = %self.persist_dir.display(),
            entries = inner.metadata.len(),
            "persisted index"
        );
        Ok(())
    }

    /// Restores both artifacts, re-establishing the dimension from the
    /// loaded index. A failure at any point leaves the in-memory state
    /// exactly as it was.
    ///
    /// # Errors
    ///
    /// Returns a storage error naming the first missing path if either
    /// artifact is absent, or describing the corruption if the artifacts
    /// disagree with each other.
    pub fn load(&self) -> Result<()> {
        let index_path = self.index_path();
        let meta_path = self.meta_path();
        for path in [&index_path, &meta_path] {
            if !path.exists() {
                return Err(Error::storage(path, "artifact not found"));
            }
        }

        let bytes = fs::read(&index_path).map_err(|e| Error::storage(&index_path, e))?;
        let artifact: IndexArtifact =
            bincode::deserialize(&bytes).map_err(|e| Error::storage(&index_path, e))?;

        let meta_bytes = fs::read(&meta_path).map_err(|e| Error::storage(&meta_path, e))?;
        let metadata: Vec<ChunkRecord> =
            serde_json::from_slice(&meta_bytes).map_err(|e| Error::storage(&meta_path, e))?;

        if artifact.dimension == 0 {
            return Err(Error::storage(&index_path, "artifact has zero dimension"));
        }
        if artifact.data.len() % artifact.dimension != 0 {
            return Err(Error::storage(
                &index_path,
                "vector data is not a whole number of rows",
            ));
        }
        let rows = artifact.data.len() / artifact.dimension;
        if rows != metadata.len() {
            return Err(Error::storage(
                &meta_path,
                format!(
                    "metadata count {} does not match {rows} stored vectors",
                    metadata.len()
                ),
            ));
        }

        let mut inner = self.inner.write();
        inner.dimension = Some(artifact.dimension);
        inner.data = artifact.data;
        inner.metadata = metadata;
        inner.assert_paired();

        tracing::info!(
            dir = %self.persist_dir.display(),
            entries = inner.metadata.len(),
            dimension = artifact.dimension,
            "loaded index"
        );
        Ok(())
    }

    /// Discards the persisted artifacts and resets to
    /// [`IndexStatus::Uninitialized`].
    ///
    /// Best-effort: the two removals are not atomic as a pair, and a crash
    /// between them can leave one artifact behind.
    ///
    /// # Errors
    ///
    /// Returns a storage error if an existing artifact cannot be removed.
    pub fn clear(&self) -> Result<()> {
        let mut inner = self.inner.write();
        for path in [self.index_path(), self.meta_path()] {
            if path.exists() {
                fs::remove_file(&path).map_err(|e| Error::storage(&path, e))?;
            }
        }
        *inner = IndexInner::default();
        tracing::info!(dir = %self.persist_dir.display(), "cleared index");
        Ok(())
    }

    fn index_path(&self) -> PathBuf {
        self.persist_dir.join(INDEX_FILE)
    }

    fn meta_path(&self) -> PathBuf {
        self.persist_dir.join(META_FILE)
    }
}

/// Scales `vector` to unit Euclidean length.
///
/// Zero-norm vectors are left untouched rather than divided toward NaN.
pub fn l2_normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for x in vector.iter_mut() {
            *x /= norm;
        }
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    use tempfile::TempDir;

    fn index(dir: &TempDir) -> FlatIndex {
        FlatIndex::new(dir.path()).unwrap()
    }

    #[test]
    fn positional_pairing_holds_across_adds() {
        let dir = TempDir::new().unwrap();
        let index = index(&dir);

        index
            .add(vec![vec![1.0, 0.0]], vec!["first".to_string()])
            .unwrap();
        index
            .add(
                vec![vec![0.0, 1.0], vec![1.0, 1.0]],
                vec!["second".to_string(), "third".to_string()],
            )
            .unwrap();

        assert_eq!(index.len(), 3);
        assert_eq!(index.status(), IndexStatus::Populated);

        let results = index.search(&[1.0, 0.0], 3).unwrap();
        assert_eq!(results[0].text, "first");
    }

    #[test]
    fn dimension_locks_on_first_add() {
        let dir = TempDir::new().unwrap();
        let index = index(&dir);

        index
            .add(vec![vec![0.5; 384]], vec!["a".to_string()])
            .unwrap();
        assert_eq!(index.dimension(), Some(384));

        let err = index
            .add(vec![vec![0.5; 768]], vec!["b".to_string()])
            .unwrap_err();
        assert!(matches!(
            err,
            Error::DimensionMismatch {
                expected: 384,
                actual: 768
            }
        ));

        // Prior entries unchanged.
        assert_eq!(index.len(), 1);
        assert_eq!(index.search(&vec![0.5; 384], 1).unwrap().len(), 1);
    }

    #[test]
    fn normalization_makes_self_similarity_one() {
        let dir = TempDir::new().unwrap();
        let index = index(&dir);

        index
            .add(vec![vec![3.0, 4.0]], vec!["pythagoras".to_string()])
            .unwrap();

        // Same direction, wildly different magnitude.
        let results = index.search(&[30.0, 40.0], 1).unwrap();
        assert!((results[0].score - 1.0).abs() < 1e-6);
    }

    #[test]
    fn search_orders_by_score_then_insertion_slot() {
        let dir = TempDir::new().unwrap();
        let index = index(&dir);

        index
            .add(
                vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![1.0, 0.0]],
                vec!["A".to_string(), "B".to_string(), "C".to_string()],
            )
            .unwrap();

        let results = index.search(&[1.0, 0.0], 2).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].text, "A");
        assert_eq!(results[1].text, "C");
    }

    #[test]
    fn uninitialized_search_is_an_error_but_empty_is_not() {
        let dir = TempDir::new().unwrap();
        let fresh = index(&dir);

        let err = fresh.search(&[1.0, 0.0], 1).unwrap_err();
        assert!(err.is_validation());

        // An initialized-but-empty index is only reachable through loaded
        // artifacts; write a zero-row pair by hand.
        let artifact = IndexArtifact {
            dimension: 2,
            data: Vec::new(),
        };
        fs::write(
            dir.path().join(INDEX_FILE),
            bincode::serialize(&artifact).unwrap(),
        )
        .unwrap();
        fs::write(dir.path().join(META_FILE), b"[]").unwrap();

        fresh.load().unwrap();
        assert_eq!(fresh.status(), IndexStatus::Empty);
        assert!(fresh.search(&[1.0, 0.0], 5).unwrap().is_empty());
    }

    #[test]
    fn top_k_clamps_to_entry_count() {
        let dir = TempDir::new().unwrap();
        let index = index(&dir);

        index
            .add(
                vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![1.0, 1.0]],
                vec!["a".to_string(), "b".to_string(), "c".to_string()],
            )
            .unwrap();

        assert_eq!(index.search(&[1.0, 0.0], 100).unwrap().len(), 3);
    }

    #[test]
    fn zero_top_k_is_rejected() {
        let dir = TempDir::new().unwrap();
        let index = index(&dir);
        index
            .add(vec![vec![1.0, 0.0]], vec!["a".to_string()])
            .unwrap();

        assert!(index.search(&[1.0, 0.0], 0).unwrap_err().is_validation());
    }

    #[test]
    fn round_trip_preserves_text_and_scores() {
        let dir = TempDir::new().unwrap();
        let first = index(&dir);

        first
            .add(
                vec![vec![0.2, 0.9, 0.1], vec![0.8, 0.1, 0.4]],
                vec!["alpha".to_string(), "beta".to_string()],
            )
            .unwrap();
        let query = [0.3, 0.7, 0.2];
        let before = first.search(&query, 2).unwrap();

        // Every successful add is durable; a fresh instance only needs load.
        let second = FlatIndex::new(dir.path()).unwrap();
        second.load().unwrap();
        let after = second.search(&query, 2).unwrap();

        assert_eq!(before.len(), after.len());
        for (b, a) in before.iter().zip(after.iter()) {
            assert_eq!(b.text, a.text);
            assert!((b.score - a.score).abs() < 1e-6);
        }
    }

    #[test]
    fn load_reports_the_missing_path() {
        let dir = TempDir::new().unwrap();
        let index = index(&dir);

        let err = index.load().unwrap_err();
        match err {
            Error::Storage { path, .. } => {
                assert!(path.ends_with(INDEX_FILE));
            }
            other => panic!("expected storage error, got {other:?}"),
        }
    }

    #[test]
    fn failed_load_leaves_state_intact() {
        let dir = TempDir::new().unwrap();
        let index = index(&dir);

        index
            .add(vec![vec![1.0, 0.0]], vec!["keep me".to_string()])
            .unwrap();
        fs::remove_file(dir.path().join(META_FILE)).unwrap();

        assert!(index.load().is_err());
        assert_eq!(index.len(), 1);
        assert_eq!(index.search(&[1.0, 0.0], 1).unwrap()[0].text, "keep me");
    }

    #[test]
    fn save_on_uninitialized_index_fails_loudly() {
        let dir = TempDir::new().unwrap();
        assert!(index(&dir).save().unwrap_err().is_validation());
    }

    #[test]
    fn clear_removes_artifacts_and_resets() {
        let dir = TempDir::new().unwrap();
        let index = index(&dir);

        index
            .add(vec![vec![1.0, 0.0]], vec!["gone".to_string()])
            .unwrap();
        assert!(index.artifacts_exist());

        index.clear().unwrap();
        assert_eq!(index.status(), IndexStatus::Uninitialized);
        assert!(!index.artifacts_exist());
        assert!(index.search(&[1.0, 0.0], 1).is_err());
    }

    #[test]
    fn unpaired_batch_is_rejected() {
        let dir = TempDir::new().unwrap();
        let index = index(&dir);

        assert!(index.add(Vec::new(), Vec::new()).unwrap_err().is_validation());
        assert!(index
            .add(vec![vec![1.0]], vec!["a".to_string(), "b".to_string()])
            .unwrap_err()
            .is_validation());
    }
}
