// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use anyhow::{bail, Context};
use serde_json::{json, Value};
use tracing::debug;

/// Batch size used while indexing.
pub const INDEX_BATCH_SIZE: usize = 10;

/// Maps text to fixed-dimension vectors through an OpenAI-compatible
/// `/embeddings` endpoint.
pub struct Embedder {
    client: reqwest::Client,
    embeddings_url: String,
    model: String,
}

impl Embedder {
    /// `base_url` ends before `/embeddings`, e.g. `http://localhost:11434/v1`.
    pub fn new(base_url: &str, model: impl Into<String>) -> Self {
        let base = base_url.trim_end_matches('/');
        Self {
            client: reqwest::Client::new(),
            embeddings_url: format!("{base}/embeddings"),
            model: model.into(),
        }
    }

    pub async fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        let input = vec![text.to_string()];
        let mut vectors = self.embed_batch(&input).await?;
        match vectors.pop() {
            Some(v) if vectors.is_empty() => Ok(v),
            _ => bail!("embeddings backend returned an unexpected vector count"),
        }
    }

    pub async fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        debug!(count = texts.len(), model = %self.model, "embedding batch");

        let body = json!({ "model": self.model, "input": texts });
        let resp = self
            .client
            .post(&self.embeddings_url)
            .json(&body)
            .send()
            .await
            .context("embeddings request failed")?;
        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            bail!("embeddings backend error {status}: {text}");
        }

        let v: Value = resp
            .json()
            .await
            .context("invalid embeddings response body")?;
        let data = v["data"]
            .as_array()
            .context("embeddings response has no data array")?;
        if data.len() != texts.len() {
            bail!(
                "embeddings backend returned {} vectors for {} inputs",
                data.len(),
                texts.len()
            );
        }

        let mut vectors = Vec::with_capacity(data.len());
        for item in data {
            let embedding = item["embedding"]
                .as_array()
                .context("embeddings item has no vector")?;
            vectors.push(
                embedding
                    .iter()
                    .map(|x| x.as_f64().unwrap_or(0.0) as f32)
                    .collect(),
            );
        }
        Ok(vectors)
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
