// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::sync::Arc;

use anyhow::{bail, Context};
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use runa_rag::{Embedder, SearchHit, VectorStore};

use crate::Tool;

/// Excerpt cap per hit in the rendered result.
const EXCERPT_CHARS: usize = 500;

const DEFAULT_LIMIT: usize = 5;

/// Semantic search over the indexed wiki.
///
/// Borrows the RAG pipeline's embedder and vector-store handles; the
/// pipeline (and ultimately the binary) owns them.
pub struct WikiTool {
    embedder: Arc<Embedder>,
    store: Arc<VectorStore>,
}

impl WikiTool {
    pub fn new(embedder: Arc<Embedder>, store: Arc<VectorStore>) -> Self {
        Self { embedder, store }
    }
}

#[async_trait]
impl Tool for WikiTool {
    fn name(&self) -> &str {
        "wiki"
    }

    fn description(&self) -> &str {
        "Search the indexed wiki documentation by meaning. Use action 'search' \
         with a natural-language query to retrieve relevant pages, diagrams, \
         and code snippets; use action 'count' to see how many documents are \
         indexed."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "action": {
                    "type": "string",
                    "enum": ["search", "count"],
                    "description": "What to do"
                },
                "query": {
                    "type": "string",
                    "description": "Natural-language search query (required for 'search')"
                },
                "limit": {
                    "type": "integer",
                    "description": "Maximum number of results (default 5)"
                }
            },
            "required": ["action"]
        })
    }

    async fn invoke(&self, args: &Value) -> anyhow::Result<String> {
        let action = match args.get("action").and_then(Value::as_str) {
            Some(a) if !a.is_empty() => a,
            _ => bail!("action parameter required (search or count)"),
        };

        match action {
            "count" => {
                let count = self.store.count().await.context("wiki count failed")?;
                Ok(format!(
                    "The wiki index contains {count} documents in collection '{}'.",
                    self.store.collection()
                ))
            }
            "search" => {
                let query = match args.get("query").and_then(Value::as_str) {
                    Some(q) if !q.is_empty() => q,
                    _ => bail!("query parameter required for search"),
                };
                let limit = args
                    .get("limit")
                    .and_then(Value::as_u64)
                    .map(|l| l as usize)
                    .filter(|l| *l > 0)
                    .unwrap_or(DEFAULT_LIMIT);

                debug!(query = %query, limit, "wiki search");
                let vector = self
                    .embedder
                    .embed(query)
                    .await
                    .context("cannot embed query")?;
                let hits = self
                    .store
                    .search(&vector, limit)
                    .await
                    .context("wiki search failed")?;
                Ok(format_hits(&hits))
            }
            other => bail!("unknown action '{other}' (expected search or count)"),
        }
    }
}

/// Render hits as numbered blocks with source tag, title, score, and a
/// capped excerpt.
pub(crate) fn format_hits(hits: &[SearchHit]) -> String {
    if hits.is_empty() {
        return "No relevant results found in the wiki.".to_string();
    }
    let mut out = String::new();
    for (i, hit) in hits.iter().enumerate() {
        let source_type = hit.payload["source_type"].as_str().unwrap_or("text");
        let title = hit.payload["metadata"]["title"]
            .as_str()
            .unwrap_or("(untitled)");
        let content = hit.payload["content"].as_str().unwrap_or("");
        out.push_str(&format!(
            "{}. [{}] {} (score: {:.2})\n   {}\n",
            i + 1,
            source_type,
            title,
            hit.score,
            truncate_chars(content, EXCERPT_CHARS)
        ));
    }
    out.trim_end().to_string()
}

fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let cut: String = s.chars().take(max).collect();
    format!("{cut}…")
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
