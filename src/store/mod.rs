//! Vector Index Store
//!
//! Persists chunk text, embedding vectors, and metadata, and serves
//! nearest-neighbour retrieval by cosine similarity. Brute-force scoring is
//! sufficient for documentation corpora of a few thousand chunks.
//!
//! All entries in one index share a dimensionality and an embedding model
//! version, both fixed at construction; a mismatch on either is a
//! configuration error, never silently tolerated.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info};

/// Bumped when the persisted layout changes shape.
const FORMAT_VERSION: u32 = 1;

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("index file is corrupt: {0}")]
    Corrupt(String),
    #[error("embedding dimension mismatch: index has {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
    #[error("embedding model mismatch: index built with '{index}', got '{other}'")]
    ModelMismatch { index: String, other: String },
}

/// The durable unit stored by the index.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexEntry {
    /// Chunk identifier, `{doc_id}#{seq}`
    pub chunk_id: String,
    /// Source document identifier
    pub doc_id: String,
    /// Sequence index of the chunk within its document
    pub seq: u32,
    /// Raw chunk text
    pub text: String,
    /// Embedding vector
    pub vector: Vec<f32>,
    /// Category tag inherited from the document
    pub category: String,
    /// Heading path of the nearest enclosing sections
    pub heading: Option<String>,
    /// Embedding model version the vector was produced with
    pub model_version: String,
}

/// A scored retrieval result.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub entry: IndexEntry,
    pub score: f32,
}

#[derive(Serialize, Deserialize)]
struct IndexFile {
    format_version: u32,
    model_version: String,
    dimension: usize,
    entries: Vec<IndexEntry>,
}

struct IndexInner {
    model_version: String,
    dimension: usize,
    /// Insertion order is retained; search ties break on it.
    entries: Vec<IndexEntry>,
}

/// In-memory vector index with JSON persistence.
///
/// Writers take the exclusive lock for the duration of an in-memory
/// mutation only; no lock is ever held across I/O or an await point.
/// Reads proceed concurrently against the last committed state.
pub struct IndexStore {
    inner: RwLock<IndexInner>,
}

impl IndexStore {
    /// Create an empty index bound to an embedding model version and
    /// dimensionality.
    pub fn new(model_version: impl Into<String>, dimension: usize) -> Self {
        Self {
            inner: RwLock::new(IndexInner {
                model_version: model_version.into(),
                dimension,
                entries: Vec::new(),
            }),
        }
    }

    pub fn model_version(&self) -> String {
        self.inner.read().model_version.clone()
    }

    pub fn dimension(&self) -> usize {
        self.inner.read().dimension
    }

    pub fn len(&self) -> usize {
        self.inner.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().entries.is_empty()
    }

    /// Snapshot of all entries in insertion order.
    pub fn entries(&self) -> Vec<IndexEntry> {
        self.inner.read().entries.clone()
    }

    /// Distinct document identifiers present in the index, sorted.
    pub fn document_ids(&self) -> Vec<String> {
        let inner = self.inner.read();
        let ids: BTreeSet<String> = inner.entries.iter().map(|e| e.doc_id.clone()).collect();
        ids.into_iter().collect()
    }

    /// Insert an entry, or replace the entry with the same chunk id in
    /// place (retaining its insertion slot).
    pub fn upsert(&self, entry: IndexEntry) -> Result<(), IndexError> {
        let mut inner = self.inner.write();

        if entry.vector.len() != inner.dimension {
            return Err(IndexError::DimensionMismatch {
                expected: inner.dimension,
                got: entry.vector.len(),
            });
        }
        if entry.model_version != inner.model_version {
            return Err(IndexError::ModelMismatch {
                index: inner.model_version.clone(),
                other: entry.model_version,
            });
        }

        if let Some(existing) = inner
            .entries
            .iter_mut()
            .find(|e| e.chunk_id == entry.chunk_id)
        {
            *existing = entry;
        } else {
            inner.entries.push(entry);
        }
        Ok(())
    }

    /// Remove every entry belonging to a document. Returns the number of
    /// entries removed.
    pub fn delete_by_document(&self, doc_id: &str) -> usize {
        let mut inner = self.inner.write();
        let before = inner.entries.len();
        inner.entries.retain(|e| e.doc_id != doc_id);
        before - inner.entries.len()
    }

    /// Top-k retrieval by cosine similarity.
    ///
    /// Results are strictly descending by score; ties keep insertion
    /// order. At most `k` results; entries scoring below `floor` (when
    /// set) are dropped. Never mutates the store.
    pub fn search(
        &self,
        query: &[f32],
        k: usize,
        floor: Option<f32>,
    ) -> Result<Vec<SearchHit>, IndexError> {
        let inner = self.inner.read();

        if query.len() != inner.dimension {
            return Err(IndexError::DimensionMismatch {
                expected: inner.dimension,
                got: query.len(),
            });
        }

        let mut hits: Vec<SearchHit> = inner
            .entries
            .iter()
            .map(|entry| SearchHit {
                entry: entry.clone(),
                score: cosine_similarity(query, &entry.vector),
            })
            .filter(|hit| floor.map(|f| hit.score >= f).unwrap_or(true))
            .collect();

        // Stable sort: equal scores retain insertion order
        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(k);

        debug!(k, hits = hits.len(), "index search");
        Ok(hits)
    }

    /// Write the index to disk. `load(persist())` reproduces an index that
    /// answers `search` identically.
    pub fn persist(&self, path: &Path) -> Result<(), IndexError> {
        let file = {
            let inner = self.inner.read();
            IndexFile {
                format_version: FORMAT_VERSION,
                model_version: inner.model_version.clone(),
                dimension: inner.dimension,
                entries: inner.entries.clone(),
            }
        };

        let json = serde_json::to_string(&file).map_err(|e| IndexError::Corrupt(e.to_string()))?;
        atomic_write(path, &json)?;
        info!(path = %path.display(), entries = file.entries.len(), "persisted index");
        Ok(())
    }

    /// Load and validate a persisted index. Any inconsistency is fatal;
    /// a partially valid file is never served.
    pub fn load(path: &Path) -> Result<Self, IndexError> {
        let data = fs::read_to_string(path)?;
        let file: IndexFile =
            serde_json::from_str(&data).map_err(|e| IndexError::Corrupt(e.to_string()))?;

        if file.format_version != FORMAT_VERSION {
            return Err(IndexError::Corrupt(format!(
                "unsupported format version {}",
                file.format_version
            )));
        }

        for entry in &file.entries {
            if entry.vector.len() != file.dimension {
                return Err(IndexError::Corrupt(format!(
                    "entry {} has {} dimensions, index declares {}",
                    entry.chunk_id,
                    entry.vector.len(),
                    file.dimension
                )));
            }
            if entry.model_version != file.model_version {
                return Err(IndexError::Corrupt(format!(
                    "entry {} was embedded with '{}', index declares '{}'",
                    entry.chunk_id, entry.model_version, file.model_version
                )));
            }
        }

        info!(path = %path.display(), entries = file.entries.len(), "loaded index");
        Ok(Self {
            inner: RwLock::new(IndexInner {
                model_version: file.model_version,
                dimension: file.dimension,
                entries: file.entries,
            }),
        })
    }
}

/// Atomic write: write to a .tmp sibling then rename into place.
fn atomic_write(path: &Path, contents: &str) -> Result<(), std::io::Error> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, contents)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

/// Cosine similarity between two vectors of equal length.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}
