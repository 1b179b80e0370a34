// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Retrieval-augmented search over an HTML wiki export.
//!
//! The pipeline walks an HTML corpus, slices it into typed chunks, turns
//! images into text through a vision model (with a persistent description
//! cache), embeds everything, and stores the vectors in a Qdrant
//! collection.  Queries embed the question and rank stored documents by
//! cosine similarity.

pub mod chunker;
pub mod embedder;
pub mod indexer;
pub mod loader;
pub mod store;
pub mod vision;

pub use embedder::Embedder;
pub use indexer::{IndexStats, Indexer};
pub use loader::{ChunkKind, ImageRef, Page, TextChunk};
pub use store::{SearchHit, VectorStore};
pub use vision::VisionDescriber;
