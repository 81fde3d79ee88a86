//! Document ingestion: walk the corpus directory, extract page text, and split it into chunks.

pub mod splitter;

use std::path::{Path, PathBuf};
use walkdir::WalkDir;

pub use splitter::{split_documents, split_text, ChunkConfig};

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("documents directory not found: {}", .0.display())]
    MissingDirectory(PathBuf),
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to extract text from {}: {message}", .path.display())]
    Pdf { path: PathBuf, message: String },
}

/// One page of text from a source file.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceDocument {
    /// Path relative to the documents directory, `/`-separated
    pub source: String,
    /// 1-based page number (always 1 for plain text)
    pub page: usize,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DocumentKind {
    Pdf,
    Text,
}

impl DocumentKind {
    fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_lowercase();
        match ext.as_str() {
            "pdf" => Some(DocumentKind::Pdf),
            "txt" | "md" | "markdown" => Some(DocumentKind::Text),
            _ => None,
        }
    }
}

/// Load every supported document under `dir`, in path order.
pub fn load_documents(dir: &Path) -> Result<Vec<SourceDocument>, IngestError> {
    if !dir.is_dir() {
        return Err(IngestError::MissingDirectory(dir.to_path_buf()));
    }

    let mut docs = Vec::new();

    for entry in WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_hidden(e))
    {
        let entry = entry.map_err(|e| IngestError::Io {
            path: e.path().map(Path::to_path_buf).unwrap_or_else(|| dir.to_path_buf()),
            source: e.into(),
        })?;

        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let Some(kind) = DocumentKind::from_path(path) else {
            continue;
        };

        let source = path
            .strip_prefix(dir)
            .unwrap_or(path)
            .to_string_lossy()
            .replace('\\', "/");

        match kind {
            DocumentKind::Pdf => {
                for (page, text) in extract_pdf_pages(path)? {
                    docs.push(SourceDocument {
                        source: source.clone(),
                        page,
                        text,
                    });
                }
            }
            DocumentKind::Text => {
                let text = std::fs::read_to_string(path).map_err(|e| IngestError::Io {
                    path: path.to_path_buf(),
                    source: e,
                })?;
                if !text.trim().is_empty() {
                    docs.push(SourceDocument {
                        source,
                        page: 1,
                        text,
                    });
                }
            }
        }
    }

    tracing::info!("Loaded {} document pages from {}", docs.len(), dir.display());
    Ok(docs)
}

fn is_hidden(entry: &walkdir::DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .map(|s| s.starts_with('.'))
        .unwrap_or(false)
}

fn extract_pdf_pages(path: &Path) -> Result<Vec<(usize, String)>, IngestError> {
    let bytes = std::fs::read(path).map_err(|e| IngestError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;

    let text = pdf_extract::extract_text_from_mem(&bytes).map_err(|e| IngestError::Pdf {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    let pages = split_pages(&text);
    if pages.is_empty() {
        tracing::warn!(
            "No text extracted from {}; it may be a scanned document",
            path.display()
        );
    }
    Ok(pages)
}

/// Split extracted PDF text on form feeds. Page numbers count blank pages too.
fn split_pages(text: &str) -> Vec<(usize, String)> {
    text.split('\x0c')
        .enumerate()
        .filter(|(_, page)| !page.trim().is_empty())
        .map(|(i, page)| (i + 1, page.trim().to_string()))
        .collect()
}
