use anyhow::{Context, Result};
use tantivy::collector::TopDocs;
use tantivy::query::QueryParser;
use tantivy::schema::*;
use tantivy::{doc, Index, IndexReader, IndexWriter, ReloadPolicy};

use crate::models::DocumentChunk;

/// BM25 keyword index built on tantivy.
///
/// Lives in RAM only: it is rebuilt from the chunk sequence together with the
/// dense index, so the two always describe the same corpus.
pub struct Bm25Index {
    index: Index,
    reader: IndexReader,
    // Field handles
    f_chunk_id: Field,
    f_content: Field,
    doc_count: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Bm25Hit {
    pub chunk_id: usize,
    pub score: f32,
}

impl Bm25Index {
    /// Index every chunk in a fresh in-memory index.
    pub fn build(chunks: &[DocumentChunk]) -> Result<Self> {
        let mut schema_builder = Schema::builder();
        let f_chunk_id =
            schema_builder.add_u64_field("chunk_id", NumericOptions::default() | STORED);
        let f_content = schema_builder.add_text_field("content", TEXT);
        let schema = schema_builder.build();

        let index = Index::create_in_ram(schema);

        let mut writer: IndexWriter = index
            .writer(50_000_000)
            .context("Failed to create index writer")?;

        for chunk in chunks {
            writer.add_document(doc!(
                f_chunk_id => chunk.id as u64,
                f_content => chunk.content.clone(),
            ))?;
        }

        writer.commit().context("Failed to commit index")?;

        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()
            .context("Failed to create reader")?;

        Ok(Self {
            index,
            reader,
            f_chunk_id,
            f_content,
            doc_count: chunks.len(),
        })
    }

    pub fn len(&self) -> usize {
        self.doc_count
    }

    pub fn is_empty(&self) -> bool {
        self.doc_count == 0
    }

    /// Search the index and return hits ordered by score, ties by chunk id.
    ///
    /// Free text is parsed leniently: query-syntax characters in a user's
    /// question (quotes, colons, parentheses) never make the search fail.
    pub fn search(&self, query_str: &str, limit: usize) -> Result<Vec<Bm25Hit>> {
        if limit == 0 || query_str.trim().is_empty() || self.is_empty() {
            return Ok(Vec::new());
        }

        let searcher = self.reader.searcher();

        let query_parser = QueryParser::for_index(&self.index, vec![self.f_content]);
        let (query, errors) = query_parser.parse_query_lenient(query_str);
        if !errors.is_empty() {
            tracing::debug!("Lenient parse of '{query_str}' dropped {} fragments", errors.len());
        }

        let top_docs = searcher
            .search(&query, &TopDocs::with_limit(limit))
            .context("Search failed")?;

        let mut hits = Vec::with_capacity(top_docs.len());
        for (score, doc_address) in top_docs {
            let doc: TantivyDocument = searcher
                .doc(doc_address)
                .context("Failed to retrieve document")?;

            let Some(chunk_id) = doc.get_first(self.f_chunk_id).and_then(|v| v.as_u64()) else {
                continue;
            };

            hits.push(Bm25Hit {
                chunk_id: chunk_id as usize,
                score,
            });
        }

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.chunk_id.cmp(&b.chunk_id))
        });
        Ok(hits)
    }
}
