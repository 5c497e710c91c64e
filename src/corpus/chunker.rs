//! Document Chunking
//!
//! Splits documents into overlapping fixed-size chunks for embedding and
//! retrieval. Boundaries are a pure function of (text, chunk_size, overlap),
//! so re-chunking an unchanged document reproduces the same chunks.

use serde::{Deserialize, Serialize};

use super::loader::Document;

/// A chunk of a document
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    /// Parent document identifier
    pub doc_id: String,
    /// Sequence index within the document
    pub seq: u32,
    /// Content of the chunk
    pub text: String,
    /// Start position in the original document (bytes)
    pub start: usize,
    /// End position in the original document (bytes)
    pub end: usize,
    /// Heading path of the nearest enclosing sections, e.g. "Setup > USB"
    pub heading: Option<String>,
}

impl Chunk {
    /// Identifier of the index entry this chunk becomes.
    pub fn id(&self) -> String {
        format!("{}#{}", self.doc_id, self.seq)
    }
}

/// A markdown section header and its byte offset.
struct Heading {
    offset: usize,
    level: u8,
    title: String,
}

/// Split a document into overlapping chunks.
///
/// Each window covers at most `chunk_size` bytes (snapped outward to char
/// boundaries); the next window starts `overlap` bytes before the previous
/// end. Requires `overlap < chunk_size`, which the pipeline config
/// validates before any run.
pub fn chunk_document(doc: &Document, chunk_size: usize, overlap: usize) -> Vec<Chunk> {
    let text = &doc.text;
    let mut chunks = Vec::new();

    if text.trim().is_empty() {
        return chunks;
    }

    let headings = scan_headings(text);
    let len = text.len();
    let mut pos = 0usize;
    let mut seq = 0u32;

    loop {
        let end = snap_to_char_boundary(text, (pos + chunk_size).min(len));

        chunks.push(Chunk {
            doc_id: doc.id.clone(),
            seq,
            text: text[pos..end].to_string(),
            start: pos,
            end,
            heading: heading_path_at(&headings, pos),
        });
        seq += 1;

        if end >= len {
            break;
        }

        let mut next = end.saturating_sub(overlap);
        while !text.is_char_boundary(next) {
            next += 1;
        }
        // Forward progress even under a degenerate overlap configuration
        if next <= pos {
            next = end;
        }
        pos = next;
    }

    chunks
}

/// Round a byte position up to the nearest UTF-8 character boundary.
fn snap_to_char_boundary(text: &str, pos: usize) -> usize {
    if pos >= text.len() {
        return text.len();
    }
    let mut p = pos;
    while p < text.len() && !text.is_char_boundary(p) {
        p += 1;
    }
    p
}

/// Collect markdown headers with their byte offsets.
fn scan_headings(text: &str) -> Vec<Heading> {
    let mut headings = Vec::new();
    let mut pos = 0usize;
    let bytes = text.as_bytes();

    for line in text.lines() {
        if line.starts_with('#') {
            let level = line.chars().take_while(|c| *c == '#').count();
            let title = line.trim_start_matches('#').trim();
            if level <= 6 && !title.is_empty() {
                headings.push(Heading {
                    offset: pos,
                    level: level as u8,
                    title: title.to_string(),
                });
            }
        }

        pos += line.len();
        // Only add 1 for newline if there actually is one at this position
        if pos < bytes.len() && bytes[pos] == b'\n' {
            pos += 1;
        }
    }

    headings
}

/// Heading path active at `offset`: the stack of enclosing sections,
/// outermost first, joined with " > ".
fn heading_path_at(headings: &[Heading], offset: usize) -> Option<String> {
    let mut stack: Vec<&Heading> = Vec::new();

    for heading in headings {
        if heading.offset > offset {
            break;
        }
        while stack
            .last()
            .map(|top| top.level >= heading.level)
            .unwrap_or(false)
        {
            stack.pop();
        }
        stack.push(heading);
    }

    if stack.is_empty() {
        None
    } else {
        Some(
            stack
                .iter()
                .map(|h| h.title.as_str())
                .collect::<Vec<_>>()
                .join(" > "),
        )
    }
}
