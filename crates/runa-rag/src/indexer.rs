// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};

use crate::chunker::{split_text, DEFAULT_MAX_CHUNK_SIZE, MIN_CHUNK_CHARS};
use crate::embedder::{Embedder, INDEX_BATCH_SIZE};
use crate::loader::{self, Page};
use crate::store::{build_payload, point_id, Point, VectorStore};
use crate::vision::VisionDescriber;

/// Orchestrates one indexing run: load → reset collection → chunk +
/// describe → embed → upsert.
pub struct Indexer {
    store: Arc<VectorStore>,
    embedder: Arc<Embedder>,
    vision: VisionDescriber,
    root: PathBuf,
    max_chunk_size: usize,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct IndexStats {
    pub pages: usize,
    pub text_documents: usize,
    pub image_documents: usize,
    pub skipped_images: usize,
}

/// A document waiting for its embedding.
struct PendingDoc {
    /// Source path the point id is derived from.
    source: String,
    content: String,
    source_type: &'static str,
    metadata: HashMap<String, String>,
    image_path: Option<String>,
}

impl Indexer {
    pub fn new(
        store: Arc<VectorStore>,
        embedder: Arc<Embedder>,
        vision: VisionDescriber,
        root: PathBuf,
    ) -> Self {
        Self {
            store,
            embedder,
            vision,
            root,
            max_chunk_size: DEFAULT_MAX_CHUNK_SIZE,
        }
    }

    /// Index the whole corpus from scratch.  The collection is reset so
    /// stale documents from removed pages cannot linger.
    pub async fn index(&self) -> anyhow::Result<IndexStats> {
        let pages = loader::load_dir(&self.root);
        info!(pages = pages.len(), root = %self.root.display(), "indexing wiki");

        self.store
            .delete_collection()
            .await
            .context("cannot reset collection")?;
        self.store
            .ensure_collection()
            .await
            .context("cannot create collection")?;

        let mut stats = IndexStats {
            pages: pages.len(),
            ..Default::default()
        };

        let mut docs: Vec<PendingDoc> = Vec::new();
        for page in &pages {
            let text_docs = text_documents_for_page(page, self.max_chunk_size);
            stats.text_documents += text_docs.len();
            docs.extend(text_docs);

            for image in &page.images {
                match self.vision.describe(&image.path).await {
                    Ok(description) => {
                        stats.image_documents += 1;
                        docs.push(image_document(page, &image.path, description));
                    }
                    Err(e) => {
                        stats.skipped_images += 1;
                        warn!(image = %image.path.display(), "skipping image: {e}");
                    }
                }
            }
            info!(page = %page.title, "prepared page");
        }

        for batch in docs.chunks(INDEX_BATCH_SIZE) {
            let texts: Vec<String> = batch.iter().map(|d| d.content.clone()).collect();
            let vectors = self
                .embedder
                .embed_batch(&texts)
                .await
                .context("embedding batch failed")?;
            let points: Vec<Point> = batch
                .iter()
                .zip(vectors)
                .map(|(doc, vector)| Point {
                    id: point_id(&doc.source, &doc.content),
                    vector,
                    payload: build_payload(
                        &doc.content,
                        doc.source_type,
                        &doc.metadata,
                        doc.image_path.as_deref(),
                    ),
                })
                .collect();
            self.store.upsert(&points).await?;
        }

        info!(
            text = stats.text_documents,
            images = stats.image_documents,
            skipped = stats.skipped_images,
            "indexing complete"
        );
        Ok(stats)
    }
}

/// Emit the text documents for one page: every chunk is sub-chunked under
/// the budget and very short fragments are dropped.
fn text_documents_for_page(page: &Page, max_chunk_size: usize) -> Vec<PendingDoc> {
    let source = page.path.to_string_lossy().into_owned();
    let mut docs = Vec::new();
    for chunk in &page.chunks {
        for piece in split_text(&chunk.text, max_chunk_size) {
            if piece.len() < MIN_CHUNK_CHARS {
                continue;
            }
            docs.push(PendingDoc {
                source: source.clone(),
                content: piece,
                source_type: "text",
                metadata: page_metadata(page, Some(chunk.kind.as_str())),
                image_path: None,
            });
        }
    }
    docs
}

fn image_document(page: &Page, image: &std::path::Path, description: String) -> PendingDoc {
    PendingDoc {
        source: image.to_string_lossy().into_owned(),
        content: description,
        source_type: "image",
        metadata: page_metadata(page, None),
        image_path: Some(image.to_string_lossy().into_owned()),
    }
}

fn page_metadata(page: &Page, chunk_kind: Option<&str>) -> HashMap<String, String> {
    let mut metadata = HashMap::new();
    metadata.insert("title".to_string(), page.title.clone());
    metadata.insert(
        "source".to_string(),
        page.path.to_string_lossy().into_owned(),
    );
    if let Some(kind) = chunk_kind {
        metadata.insert("chunk_kind".to_string(), kind.to_string());
    }
    metadata
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::path::Path;

    use crate::loader::{ChunkKind, TextChunk};

    use super::*;

    fn page_with(chunks: Vec<TextChunk>) -> Page {
        Page {
            title: "Test Page".into(),
            path: Path::new("/wiki/test.html").to_path_buf(),
            chunks,
            images: vec![],
        }
    }

    #[test]
    fn short_chunks_are_dropped() {
        let page = page_with(vec![
            TextChunk {
                kind: ChunkKind::Heading,
                text: "tiny".into(),
            },
            TextChunk {
                kind: ChunkKind::Paragraph,
                text: "long enough to be worth embedding as a document".into(),
            },
        ]);
        let docs = text_documents_for_page(&page, 500);
        assert_eq!(docs.len(), 1);
        assert!(docs[0].content.starts_with("long enough"));
    }

    #[test]
    fn oversized_chunks_are_sub_chunked() {
        let sentence = "This sentence is repeated to exceed the budget. ";
        let page = page_with(vec![TextChunk {
            kind: ChunkKind::Paragraph,
            text: sentence.repeat(20),
        }]);
        let docs = text_documents_for_page(&page, 100);
        assert!(docs.len() > 1, "expected sub-chunking");
        for doc in &docs {
            assert!(doc.content.len() >= MIN_CHUNK_CHARS);
        }
    }

    #[test]
    fn documents_carry_page_metadata() {
        let page = page_with(vec![TextChunk {
            kind: ChunkKind::List,
            text: "item one; item two; item three and more".into(),
        }]);
        let docs = text_documents_for_page(&page, 500);
        assert_eq!(docs[0].metadata["title"], "Test Page");
        assert_eq!(docs[0].metadata["source"], "/wiki/test.html");
        assert_eq!(docs[0].metadata["chunk_kind"], "list");
        assert_eq!(docs[0].source_type, "text");
    }

    #[test]
    fn image_documents_reference_their_file() {
        let page = page_with(vec![]);
        let doc = image_document(
            &page,
            Path::new("/wiki/diagram.png"),
            "an architecture diagram".into(),
        );
        assert_eq!(doc.source_type, "image");
        assert_eq!(doc.image_path.as_deref(), Some("/wiki/diagram.png"));
        assert_eq!(doc.content, "an architecture diagram");
    }

    #[test]
    fn same_page_yields_same_point_ids() {
        // Indexing twice must produce identical ids so upserts overwrite.
        let page = page_with(vec![TextChunk {
            kind: ChunkKind::Paragraph,
            text: "a stable paragraph that is comfortably long enough".into(),
        }]);
        let ids = |p: &Page| -> Vec<uuid::Uuid> {
            text_documents_for_page(p, 500)
                .iter()
                .map(|d| point_id(&d.source, &d.content))
                .collect()
        };
        assert_eq!(ids(&page), ids(&page));
    }
}
