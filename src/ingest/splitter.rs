//! Recursive character splitter.
//!
//! Text is split on the first separator from `["\n\n", "\n", " ", ""]` that
//! occurs in it. Pieces shorter than the chunk size are merged greedily; a
//! piece that is still too long is split again with the next separator. When a
//! chunk is emitted, the tail of the window (up to `chunk_overlap` characters)
//! is carried into the next chunk. Separators stay attached to the start of
//! the piece that follows them. Lengths are counted in chars, not bytes.

use std::collections::VecDeque;

use crate::config::RetrievalConfig;
use crate::ingest::SourceDocument;
use crate::models::DocumentChunk;

const SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl From<&RetrievalConfig> for ChunkConfig {
    fn from(config: &RetrievalConfig) -> Self {
        Self {
            chunk_size: config.chunk_size,
            chunk_overlap: config.chunk_overlap,
        }
    }
}

/// Split every document and number the chunks in sequence.
pub fn split_documents(docs: &[SourceDocument], config: &ChunkConfig) -> Vec<DocumentChunk> {
    let mut chunks = Vec::new();
    for doc in docs {
        for content in split_text(&doc.text, config) {
            chunks.push(DocumentChunk {
                id: chunks.len(),
                source: doc.source.clone(),
                page: doc.page,
                content,
            });
        }
    }
    chunks
}

pub fn split_text(text: &str, config: &ChunkConfig) -> Vec<String> {
    recursive_split(text, &SEPARATORS, config)
}

fn recursive_split(text: &str, separators: &[&str], config: &ChunkConfig) -> Vec<String> {
    let mut separator = "";
    let mut remaining: &[&str] = &[];
    for (i, s) in separators.iter().enumerate() {
        if s.is_empty() || text.contains(s) {
            separator = s;
            remaining = &separators[i + 1..];
            break;
        }
    }

    let mut chunks = Vec::new();
    let mut pending: Vec<&str> = Vec::new();

    for piece in split_keeping_separator(text, separator) {
        if char_len(piece) < config.chunk_size {
            pending.push(piece);
            continue;
        }

        if !pending.is_empty() {
            chunks.extend(merge_pieces(&pending, config));
            pending.clear();
        }

        if remaining.is_empty() {
            let trimmed = piece.trim();
            if !trimmed.is_empty() {
                chunks.push(trimmed.to_string());
            }
        } else {
            chunks.extend(recursive_split(piece, remaining, config));
        }
    }

    if !pending.is_empty() {
        chunks.extend(merge_pieces(&pending, config));
    }

    chunks
}

/// Split `text` so that each separator starts the piece after it.
/// An empty separator splits into single chars.
fn split_keeping_separator<'a>(text: &'a str, separator: &str) -> Vec<&'a str> {
    if separator.is_empty() {
        return text
            .char_indices()
            .map(|(i, c)| &text[i..i + c.len_utf8()])
            .collect();
    }

    let mut pieces = Vec::new();
    let mut start = 0;
    for (i, _) in text.match_indices(separator) {
        if i > start {
            pieces.push(&text[start..i]);
        }
        start = i;
    }
    if start < text.len() {
        pieces.push(&text[start..]);
    }
    pieces
}

fn merge_pieces(pieces: &[&str], config: &ChunkConfig) -> Vec<String> {
    let mut out = Vec::new();
    let mut window: VecDeque<(&str, usize)> = VecDeque::new();
    let mut total = 0usize;

    for &piece in pieces {
        let len = char_len(piece);
        if total + len > config.chunk_size && !window.is_empty() {
            push_window(&window, &mut out);
            // Drop from the front until what is left fits the overlap budget
            // and leaves room for the incoming piece.
            while total > config.chunk_overlap || (total + len > config.chunk_size && total > 0) {
                match window.pop_front() {
                    Some((_, l)) => total -= l,
                    None => break,
                }
            }
        }
        window.push_back((piece, len));
        total += len;
    }

    push_window(&window, &mut out);
    out
}

fn push_window(window: &VecDeque<(&str, usize)>, out: &mut Vec<String>) {
    let joined: String = window.iter().map(|(p, _)| *p).collect();
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        out.push(trimmed.to_string());
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}
