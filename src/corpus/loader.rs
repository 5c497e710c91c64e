//! Corpus Loader
//!
//! Walks documentation root directories and produces Documents for
//! ingestion. Read-only: never modifies the corpus.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Extensions treated as documentation text.
const DOC_EXTENSIONS: &[&str] = &["md", "markdown", "txt"];

#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid corpus root: {0}")]
    InvalidRoot(String),
}

/// A per-file read failure. The loader reports it and moves on to the
/// next file; a batch run collects these into its summary.
#[derive(Error, Debug)]
#[error("{path}: {source}")]
pub struct ReadError {
    pub path: String,
    #[source]
    pub source: std::io::Error,
}

impl ReadError {
    fn new(path: &Path, source: std::io::Error) -> Self {
        Self {
            path: path.to_string_lossy().to_string(),
            source,
        }
    }
}

/// A source document with path-derived metadata
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    /// Stable identifier: root directory name + path relative to the root
    pub id: String,
    /// Category tag (first directory component under the root)
    pub category: String,
    /// Raw text content
    pub text: String,
    /// Last modified
    pub modified: DateTime<Utc>,
}

/// A discovered file, before its content is read.
#[derive(Debug, Clone)]
pub struct SourceFile {
    root: PathBuf,
    path: PathBuf,
}

/// Walks one or more documentation roots and yields Documents.
pub struct CorpusLoader {
    roots: Vec<PathBuf>,
}

impl CorpusLoader {
    /// Build a loader over the given root directories. Each root must
    /// exist and be a directory.
    pub fn new(roots: Vec<PathBuf>) -> Result<Self, LoaderError> {
        if roots.is_empty() {
            return Err(LoaderError::InvalidRoot(
                "at least one corpus root is required".to_string(),
            ));
        }

        let mut canonical = Vec::with_capacity(roots.len());
        for root in roots {
            let path = root.canonicalize().map_err(|_| {
                LoaderError::InvalidRoot(format!("cannot resolve {}", root.display()))
            })?;
            if !path.is_dir() {
                return Err(LoaderError::InvalidRoot(format!(
                    "{} is not a directory",
                    path.display()
                )));
            }
            canonical.push(path);
        }

        Ok(Self { roots: canonical })
    }

    /// Discover document files under all roots, sorted by path so two
    /// runs over an unchanged tree produce the same sequence.
    /// Unreadable directories are recorded and skipped.
    pub fn discover(&self) -> (Vec<SourceFile>, Vec<ReadError>) {
        let mut files = Vec::new();
        let mut errors = Vec::new();

        for root in &self.roots {
            walk_directory(root, root, &mut files, &mut errors);
        }

        files.sort_by(|a, b| a.path.cmp(&b.path));
        debug!(files = files.len(), errors = errors.len(), "corpus discovery");
        (files, errors)
    }

    /// Read one discovered file into a Document.
    pub fn read_document(&self, file: &SourceFile) -> Result<Document, ReadError> {
        let text = fs::read_to_string(&file.path).map_err(|e| ReadError::new(&file.path, e))?;

        let relative = file
            .path
            .strip_prefix(&file.root)
            .map(|p| p.to_string_lossy().to_string())
            .unwrap_or_else(|_| file.path.to_string_lossy().to_string());

        let root_name = file
            .root
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "corpus".to_string());

        let category = match relative.find('/') {
            Some(idx) => relative[..idx].to_string(),
            None => root_name.clone(),
        };

        let modified: DateTime<Utc> = fs::metadata(&file.path)
            .and_then(|m| m.modified())
            .map(|t| t.into())
            .unwrap_or_else(|_| Utc::now());

        Ok(Document {
            id: format!("{}/{}", root_name, relative),
            category,
            text,
            modified,
        })
    }

    /// Lazy sequence over all documents. Discovery errors surface first,
    /// then each file is read on demand; a failed read yields an `Err`
    /// item and the sequence continues.
    pub fn documents(&self) -> impl Iterator<Item = Result<Document, ReadError>> + '_ {
        let (files, errors) = self.discover();
        errors
            .into_iter()
            .map(Err)
            .chain(files.into_iter().map(move |f| self.read_document(&f)))
    }
}

/// Recursively collect document files, skipping hidden entries.
fn walk_directory(
    root: &Path,
    dir: &Path,
    files: &mut Vec<SourceFile>,
    errors: &mut Vec<ReadError>,
) {
    let entries = match fs::read_dir(dir) {
        Ok(e) => e,
        Err(e) => {
            errors.push(ReadError::new(dir, e));
            return;
        }
    };

    for entry in entries {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                errors.push(ReadError::new(dir, e));
                continue;
            }
        };

        let path = entry.path();

        // Skip hidden files and directories
        if path
            .file_name()
            .map(|n| n.to_string_lossy().starts_with('.'))
            .unwrap_or(false)
        {
            continue;
        }

        if path.is_dir() {
            walk_directory(root, &path, files, errors);
        } else if has_doc_extension(&path) {
            files.push(SourceFile {
                root: root.to_path_buf(),
                path,
            });
        }
    }
}

fn has_doc_extension(path: &Path) -> bool {
    path.extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .map(|e| DOC_EXTENSIONS.contains(&e.as_str()))
        .unwrap_or(false)
}
