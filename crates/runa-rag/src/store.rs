// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! HTTP adapter for the Qdrant REST API.
//!
//! Upserts are write-through (`wait=true`) so a search issued right after
//! indexing sees the new points.  Point ids are deterministic UUID-v5
//! values derived from source path + content, which makes re-indexing the
//! same corpus idempotent: identical input produces identical ids and the
//! points overwrite in place.

use std::collections::HashMap;

use anyhow::{bail, Context};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, info};
use uuid::Uuid;

/// Default collection name.
pub const DEFAULT_COLLECTION: &str = "confluence_wiki";

/// Vector dimension of the embedding model.
pub const VECTOR_SIZE: usize = 768;

/// One stored point ready for upsert.
#[derive(Debug, Clone, Serialize)]
pub struct Point {
    pub id: Uuid,
    pub vector: Vec<f32>,
    pub payload: Value,
}

/// One search result with its similarity score.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub score: f32,
    pub payload: Value,
}

/// Deterministic point id: UUID-v5 under the URL namespace over
/// path + content.
pub fn point_id(path: &str, content: &str) -> Uuid {
    Uuid::new_v5(&Uuid::NAMESPACE_URL, format!("{path}{content}").as_bytes())
}

/// Build the stored payload for a document.
pub fn build_payload(
    content: &str,
    source_type: &str,
    metadata: &HashMap<String, String>,
    image_path: Option<&str>,
) -> Value {
    let mut payload = json!({
        "content": content,
        "source_type": source_type,
        "metadata": metadata,
    });
    if let Some(image) = image_path {
        payload["image_path"] = json!(image);
    }
    payload
}

pub struct VectorStore {
    client: reqwest::Client,
    base_url: String,
    collection: String,
}

impl VectorStore {
    pub fn new(base_url: &str, collection: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            collection: collection.into(),
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    fn collection_url(&self) -> String {
        format!("{}/collections/{}", self.base_url, self.collection)
    }

    /// Create the collection if it does not exist.  Idempotent.
    pub async fn ensure_collection(&self) -> anyhow::Result<()> {
        let resp = self
            .client
            .get(self.collection_url())
            .send()
            .await
            .context("vector store unreachable")?;
        if resp.status().is_success() {
            return Ok(());
        }
        if resp.status().as_u16() != 404 {
            bail!("vector store error {} on collection lookup", resp.status());
        }

        info!(collection = %self.collection, "creating vector collection");
        let body = json!({
            "vectors": { "size": VECTOR_SIZE, "distance": "Cosine" }
        });
        let resp = self
            .client
            .put(self.collection_url())
            .json(&body)
            .send()
            .await
            .context("collection create request failed")?;
        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            bail!("cannot create collection: {status}: {text}");
        }
        Ok(())
    }

    /// Delete the collection.  A missing collection is silent success.
    pub async fn delete_collection(&self) -> anyhow::Result<()> {
        let resp = self
            .client
            .delete(self.collection_url())
            .send()
            .await
            .context("collection delete request failed")?;
        if resp.status().is_success() || resp.status().as_u16() == 404 {
            return Ok(());
        }
        bail!("cannot delete collection: {}", resp.status());
    }

    /// Upsert points, waiting for the write to be applied before returning.
    pub async fn upsert(&self, points: &[Point]) -> anyhow::Result<()> {
        if points.is_empty() {
            return Ok(());
        }
        debug!(count = points.len(), collection = %self.collection, "upserting points");
        let url = format!("{}/points?wait=true", self.collection_url());
        let resp = self
            .client
            .put(&url)
            .json(&json!({ "points": points }))
            .send()
            .await
            .context("upsert request failed")?;
        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            bail!("upsert failed: {status}: {text}");
        }
        Ok(())
    }

    /// Top-`limit` points by cosine similarity to `vector`.
    pub async fn search(&self, vector: &[f32], limit: usize) -> anyhow::Result<Vec<SearchHit>> {
        let url = format!("{}/points/search", self.collection_url());
        let body = json!({
            "vector": vector,
            "limit": limit,
            "with_payload": true,
        });
        let resp = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .context("search request failed")?;
        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            bail!("search failed: {status}: {text}");
        }

        let v: Value = resp.json().await.context("invalid search response body")?;
        let hits = v["result"]
            .as_array()
            .context("search response has no result array")?
            .iter()
            .map(|hit| SearchHit {
                score: hit["score"].as_f64().unwrap_or(0.0) as f32,
                payload: hit["payload"].clone(),
            })
            .collect();
        Ok(hits)
    }

    /// Exact number of stored points.
    pub async fn count(&self) -> anyhow::Result<usize> {
        let url = format!("{}/points/count", self.collection_url());
        let resp = self
            .client
            .post(&url)
            .json(&json!({ "exact": true }))
            .send()
            .await
            .context("count request failed")?;
        if !resp.status().is_success() {
            bail!("count failed: {}", resp.status());
        }
        let v: Value = resp.json().await.context("invalid count response body")?;
        Ok(v["result"]["count"].as_u64().unwrap_or(0) as usize)
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
