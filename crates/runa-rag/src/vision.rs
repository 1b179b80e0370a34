// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Image-to-text description through a vision model.
//!
//! Descriptions are expensive (seconds per image on local hardware), so
//! they are cached in a JSON file at the wiki root keyed by absolute image
//! path.  A cache hit never touches the backend.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{bail, Context};
use base64::Engine;
use serde_json::{json, Value};
use tracing::{debug, warn};

/// Cache file name, stored directly under the wiki root.
pub const VISION_CACHE_FILE: &str = ".vision_cache.json";

const DESCRIBE_PROMPT: &str =
    "Describe this image in detail. Identify: the type of diagram or picture, \
     the components or entities shown, the relationships between them, any \
     visible text or labels, and the overall purpose of the image.";

/// Persistent absolute-path → description map.
pub(crate) struct VisionCache {
    path: PathBuf,
    entries: HashMap<String, String>,
}

impl VisionCache {
    /// Load the cache for `wiki_root`, starting empty when the file is
    /// missing or unreadable.
    pub(crate) fn load(wiki_root: &Path) -> Self {
        let path = wiki_root.join(VISION_CACHE_FILE);
        let entries = std::fs::read_to_string(&path)
            .ok()
            .and_then(|text| serde_json::from_str(&text).ok())
            .unwrap_or_default();
        Self { path, entries }
    }

    pub(crate) fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).cloned()
    }

    /// Insert and write through to disk.  A failed write is logged; the
    /// description is still usable for this run.
    pub(crate) fn insert(&mut self, key: String, description: String) {
        self.entries.insert(key, description);
        match serde_json::to_string_pretty(&self.entries) {
            Ok(text) => {
                if let Err(e) = std::fs::write(&self.path, text) {
                    warn!(cache = %self.path.display(), "cannot persist vision cache: {e}");
                }
            }
            Err(e) => warn!("cannot serialise vision cache: {e}"),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Calls the vision backend for images that are not in the cache.
pub struct VisionDescriber {
    client: reqwest::Client,
    chat_url: String,
    model: String,
    cache: Mutex<VisionCache>,
}

impl VisionDescriber {
    /// `base_url` ends before `/chat/completions`.  The cache lives at
    /// `<wiki_root>/.vision_cache.json`.
    pub fn new(base_url: &str, model: impl Into<String>, wiki_root: &Path) -> Self {
        let base = base_url.trim_end_matches('/');
        Self {
            client: reqwest::Client::new(),
            chat_url: format!("{base}/chat/completions"),
            model: model.into(),
            cache: Mutex::new(VisionCache::load(wiki_root)),
        }
    }

    /// Describe the image at `path`, consulting the cache first.
    pub async fn describe(&self, path: &Path) -> anyhow::Result<String> {
        let key = path
            .canonicalize()
            .unwrap_or_else(|_| path.to_path_buf())
            .to_string_lossy()
            .into_owned();

        if let Some(hit) = self.cache.lock().unwrap().get(&key) {
            debug!(image = %key, "vision cache hit");
            return Ok(hit);
        }

        let bytes =
            std::fs::read(path).with_context(|| format!("cannot read image {}", path.display()))?;
        let description = self.describe_bytes(&bytes, mime_for(path)).await?;

        self.cache
            .lock()
            .unwrap()
            .insert(key, description.clone());
        Ok(description)
    }

    async fn describe_bytes(&self, bytes: &[u8], mime: &str) -> anyhow::Result<String> {
        let data_url = format!(
            "data:{mime};base64,{}",
            base64::engine::general_purpose::STANDARD.encode(bytes)
        );
        let body = json!({
            "model": self.model,
            "messages": [{
                "role": "user",
                "content": [
                    { "type": "text", "text": DESCRIBE_PROMPT },
                    { "type": "image_url", "image_url": { "url": data_url } },
                ],
            }],
            "stream": false,
        });

        let resp = self
            .client
            .post(&self.chat_url)
            .json(&body)
            .send()
            .await
            .context("vision request failed")?;
        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            bail!("vision backend error {status}: {text}");
        }
        let v: Value = resp.json().await.context("invalid vision response body")?;
        let description = v["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or_default()
            .trim()
            .to_string();
        if description.is_empty() {
            bail!("vision backend returned an empty description");
        }
        Ok(description)
    }

    /// Number of cached descriptions (for progress reporting).
    pub fn cached_count(&self) -> usize {
        self.cache.lock().unwrap().len()
    }
}

fn mime_for(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("svg") => "image/svg+xml",
        Some("webp") => "image/webp",
        Some("bmp") => "image/bmp",
        _ => "image/png",
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    use super::*;

    /// Serve canned JSON over HTTP/1.1, counting requests.
    async fn stub_backend(body: &'static str) -> (String, Arc<AtomicUsize>) {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        tokio::spawn(async move {
            loop {
                let Ok((mut sock, _)) = listener.accept().await else {
                    break;
                };
                counter.fetch_add(1, Ordering::SeqCst);
                // Drain the request: headers, then content-length bytes.
                let mut buf = Vec::new();
                let mut tmp = [0u8; 4096];
                loop {
                    let Ok(n) = sock.read(&mut tmp).await else { break };
                    if n == 0 {
                        break;
                    }
                    buf.extend_from_slice(&tmp[..n]);
                    if let Some(header_end) =
                        buf.windows(4).position(|w| w == b"\r\n\r\n")
                    {
                        let headers = String::from_utf8_lossy(&buf[..header_end]);
                        let content_length = headers
                            .lines()
                            .find_map(|l| {
                                l.to_ascii_lowercase()
                                    .strip_prefix("content-length:")
                                    .map(|v| v.trim().parse::<usize>().unwrap_or(0))
                            })
                            .unwrap_or(0);
                        if buf.len() >= header_end + 4 + content_length {
                            break;
                        }
                    }
                }
                let resp = format!(
                    "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\n\
                     content-length: {}\r\nconnection: close\r\n\r\n{}",
                    body.len(),
                    body
                );
                let _ = sock.write_all(resp.as_bytes()).await;
            }
        });
        (format!("http://{addr}/v1"), calls)
    }

    #[tokio::test]
    async fn describing_the_same_image_twice_calls_the_backend_once() {
        let dir = tempfile::tempdir().unwrap();
        let image = dir.path().join("net.png");
        std::fs::write(&image, b"\x89PNG").unwrap();

        let (base_url, calls) =
            stub_backend(r#"{"choices":[{"message":{"content":"a network diagram"}}]}"#).await;
        let describer = VisionDescriber::new(&base_url, "llava", dir.path());

        let first = describer.describe(&image).await.unwrap();
        let second = describer.describe(&image).await.unwrap();
        assert_eq!(first, "a network diagram");
        assert_eq!(second, first);
        assert_eq!(calls.load(Ordering::SeqCst), 1, "second call must be a cache hit");
        assert_eq!(describer.cached_count(), 1);
    }

    #[test]
    fn cache_starts_empty_without_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let cache = VisionCache::load(dir.path());
        assert_eq!(cache.len(), 0);
        assert!(cache.get("/any/path.png").is_none());
    }

    #[test]
    fn cache_persists_between_loads() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = VisionCache::load(dir.path());
        cache.insert("/img/a.png".into(), "a flow chart".into());

        let reloaded = VisionCache::load(dir.path());
        assert_eq!(reloaded.get("/img/a.png").as_deref(), Some("a flow chart"));
    }

    #[test]
    fn cache_file_is_plain_json_keyed_by_path() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = VisionCache::load(dir.path());
        cache.insert("/img/b.png".into(), "a sequence diagram".into());

        let raw = std::fs::read_to_string(dir.path().join(VISION_CACHE_FILE)).unwrap();
        let parsed: HashMap<String, String> = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed["/img/b.png"], "a sequence diagram");
    }

    #[test]
    fn corrupt_cache_file_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(VISION_CACHE_FILE), "{not json").unwrap();
        let cache = VisionCache::load(dir.path());
        assert_eq!(cache.len(), 0);
    }

    #[tokio::test]
    async fn cache_hit_bypasses_the_backend_entirely() {
        let dir = tempfile::tempdir().unwrap();
        let image = dir.path().join("x.png");
        std::fs::write(&image, b"\x89PNG").unwrap();
        let key = image.canonicalize().unwrap().to_string_lossy().into_owned();

        // Pre-seed the cache, then point the describer at an unroutable
        // backend: a hit must return without any network activity.
        let mut cache = VisionCache::load(dir.path());
        cache.insert(key, "cached description".into());
        drop(cache);

        let describer = VisionDescriber::new("http://127.0.0.1:1/v1", "llava", dir.path());
        let out = describer.describe(&image).await.unwrap();
        assert_eq!(out, "cached description");
    }

    #[tokio::test]
    async fn unreadable_image_is_an_error_not_a_panic() {
        let dir = tempfile::tempdir().unwrap();
        let describer = VisionDescriber::new("http://127.0.0.1:1/v1", "llava", dir.path());
        let err = describer
            .describe(&dir.path().join("missing.png"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("cannot read image"));
    }

    #[test]
    fn mime_is_derived_from_extension() {
        assert_eq!(mime_for(Path::new("a.jpg")), "image/jpeg");
        assert_eq!(mime_for(Path::new("a.svg")), "image/svg+xml");
        assert_eq!(mime_for(Path::new("a.unknown")), "image/png");
    }
}
