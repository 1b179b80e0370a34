// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! HTML corpus loader.
//!
//! Walks a directory tree and turns every `.html`/`.htm` file into a
//! [`Page`]: a title plus an ordered list of typed text chunks and image
//! references.  A page that fails to load is logged and skipped; one
//! corrupt export must not kill an indexing run.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context};
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Structural role of an extracted text chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkKind {
    Heading,
    Paragraph,
    List,
    Code,
}

impl ChunkKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkKind::Heading => "heading",
            ChunkKind::Paragraph => "paragraph",
            ChunkKind::List => "list",
            ChunkKind::Code => "code",
        }
    }
}

#[derive(Debug, Clone)]
pub struct TextChunk {
    pub kind: ChunkKind,
    pub text: String,
}

/// A reference to an image file that exists on disk next to the page.
#[derive(Debug, Clone)]
pub struct ImageRef {
    /// Absolute path to the image file.
    pub path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct Page {
    pub title: String,
    /// Source file the page was loaded from.
    pub path: PathBuf,
    pub chunks: Vec<TextChunk>,
    pub images: Vec<ImageRef>,
}

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "svg", "webp", "bmp"];

/// Load every HTML page under `root`.  Per-file failures are logged and the
/// walk continues.
pub fn load_dir(root: &Path) -> Vec<Page> {
    let mut pages = Vec::new();
    for entry in WalkDir::new(root).into_iter().filter_map(Result::ok) {
        let path = entry.path();
        if !entry.file_type().is_file() {
            continue;
        }
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        if !matches!(ext.as_deref(), Some("html") | Some("htm")) {
            continue;
        }
        match load_page(path) {
            Ok(page) => {
                debug!(page = %path.display(), chunks = page.chunks.len(), "loaded page");
                pages.push(page);
            }
            Err(e) => warn!(page = %path.display(), "skipping page: {e}"),
        }
    }
    pages
}

pub fn load_page(path: &Path) -> anyhow::Result<Page> {
    let html = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read {}", path.display()))?;
    parse_page(&html, path)
}

/// Parse one HTML document into a [`Page`].
///
/// Chunks come out in document order.  Nested lists are folded into their
/// outermost `<ul>`/`<ol>`, and paragraphs inside list items are part of
/// the list chunk rather than separate paragraphs.
pub fn parse_page(html: &str, path: &Path) -> anyhow::Result<Page> {
    let doc = Html::parse_document(html);

    let title = doc
        .select(&selector("title")?)
        .next()
        .map(|el| collapse_ws(&el.text().collect::<String>()))
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| {
            path.file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default()
        });

    let content = selector("h1, h2, h3, h4, h5, h6, p, ul, ol, pre, img")?;

    let mut chunks = Vec::new();
    let mut images = Vec::new();
    let page_dir = path.parent().unwrap_or_else(|| Path::new("."));

    for el in doc.select(&content) {
        match el.value().name() {
            "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
                push_chunk(&mut chunks, ChunkKind::Heading, el)
            }
            "p" => {
                // Paragraphs inside list items or code blocks already
                // belong to the enclosing chunk.
                if !has_ancestor(el, &["li", "pre"]) {
                    push_chunk(&mut chunks, ChunkKind::Paragraph, el);
                }
            }
            "ul" | "ol" => {
                if !has_ancestor(el, &["ul", "ol"]) {
                    push_chunk(&mut chunks, ChunkKind::List, el);
                }
            }
            "pre" => push_chunk(&mut chunks, ChunkKind::Code, el),
            "img" => {
                if let Some(img) = resolve_image(el.value().attr("src"), page_dir) {
                    images.push(img);
                }
            }
            _ => {}
        }
    }

    Ok(Page {
        title,
        path: path.to_path_buf(),
        chunks,
        images,
    })
}

fn selector(spec: &str) -> anyhow::Result<Selector> {
    Selector::parse(spec).map_err(|e| anyhow!("invalid selector {spec:?}: {e}"))
}

fn push_chunk(chunks: &mut Vec<TextChunk>, kind: ChunkKind, el: ElementRef<'_>) {
    let text = collapse_ws(&el.text().collect::<String>());
    if !text.is_empty() {
        chunks.push(TextChunk { kind, text });
    }
}

fn has_ancestor(el: ElementRef<'_>, names: &[&str]) -> bool {
    el.ancestors()
        .filter_map(ElementRef::wrap)
        .any(|a| names.contains(&a.value().name()))
}

/// Accept only relative `src` paths that resolve to an existing file with
/// an image extension.  Data URIs and absolute URLs are not local content.
fn resolve_image(src: Option<&str>, page_dir: &Path) -> Option<ImageRef> {
    let src = src?.trim();
    if src.is_empty()
        || src.starts_with("data:")
        || src.starts_with("http://")
        || src.starts_with("https://")
        || src.starts_with('/')
    {
        return None;
    }
    let candidate = page_dir.join(src);
    let ext = candidate.extension()?.to_str()?.to_ascii_lowercase();
    if !IMAGE_EXTENSIONS.contains(&ext.as_str()) {
        return None;
    }
    if !candidate.is_file() {
        return None;
    }
    let path = candidate.canonicalize().unwrap_or(candidate);
    Some(ImageRef { path })
}

/// Collapse runs of whitespace to single spaces.
pub(crate) fn collapse_ws(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(html: &str) -> Page {
        parse_page(html, Path::new("/wiki/page.html")).unwrap()
    }

    #[test]
    fn title_is_extracted_and_collapsed() {
        let page = parse("<html><head><title>  My\n  Page </title></head><body></body></html>");
        assert_eq!(page.title, "My Page");
    }

    #[test]
    fn missing_title_falls_back_to_file_stem() {
        let page = parse("<html><body><p>text</p></body></html>");
        assert_eq!(page.title, "page");
    }

    #[test]
    fn all_four_chunk_kinds_are_extracted() {
        let page = parse(
            "<html><body>\
             <h1>Architecture</h1>\
             <p>The system has three layers.</p>\
             <ul><li>frontend</li><li>backend</li></ul>\
             <pre>fn main() {}</pre>\
             </body></html>",
        );
        let kinds: Vec<ChunkKind> = page.chunks.iter().map(|c| c.kind).collect();
        assert_eq!(
            kinds,
            vec![
                ChunkKind::Heading,
                ChunkKind::Paragraph,
                ChunkKind::List,
                ChunkKind::Code
            ]
        );
        assert_eq!(page.chunks[0].text, "Architecture");
        assert_eq!(page.chunks[1].text, "The system has three layers.");
    }

    #[test]
    fn whitespace_is_collapsed_inside_chunks() {
        let page = parse("<html><body><p>spread   over\n\n   lines</p></body></html>");
        assert_eq!(page.chunks[0].text, "spread over lines");
    }

    #[test]
    fn chunks_preserve_document_order() {
        let page = parse(
            "<html><body><p>one</p><h2>two</h2><p>three</p></body></html>",
        );
        let texts: Vec<&str> = page.chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["one", "two", "three"]);
    }

    #[test]
    fn nested_lists_fold_into_the_outer_chunk() {
        let page = parse(
            "<html><body><ul><li>a<ul><li>a1</li></ul></li><li>b</li></ul></body></html>",
        );
        let lists: Vec<&TextChunk> = page
            .chunks
            .iter()
            .filter(|c| c.kind == ChunkKind::List)
            .collect();
        assert_eq!(lists.len(), 1, "nested <ul> must not become its own chunk");
        assert!(lists[0].text.contains("a1"));
        assert!(lists[0].text.contains('b'));
    }

    #[test]
    fn empty_elements_are_dropped() {
        let page = parse("<html><body><p>   </p><p>kept</p></body></html>");
        assert_eq!(page.chunks.len(), 1);
        assert_eq!(page.chunks[0].text, "kept");
    }

    // ── Image references ──────────────────────────────────────────────────────

    #[test]
    fn data_uri_and_remote_images_are_ignored() {
        let page = parse(
            "<html><body>\
             <img src=\"data:image/png;base64,AAAA\">\
             <img src=\"https://example.com/x.png\">\
             <img src=\"/absolute/y.png\">\
             </body></html>",
        );
        assert!(page.images.is_empty());
    }

    #[test]
    fn relative_image_must_exist_on_disk() {
        let page = parse("<html><body><img src=\"missing.png\"></body></html>");
        assert!(page.images.is_empty());
    }

    #[test]
    fn existing_relative_image_is_accepted() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("diagram.png"), b"\x89PNG").unwrap();
        let html = "<html><body><img src=\"diagram.png\"></body></html>";
        let page = parse_page(html, &dir.path().join("page.html")).unwrap();
        assert_eq!(page.images.len(), 1);
        assert!(page.images[0].path.ends_with("diagram.png"));
    }

    #[test]
    fn non_image_extension_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"hi").unwrap();
        let html = "<html><body><img src=\"notes.txt\"></body></html>";
        let page = parse_page(html, &dir.path().join("page.html")).unwrap();
        assert!(page.images.is_empty());
    }

    // ── Directory walking ─────────────────────────────────────────────────────

    #[test]
    fn load_dir_picks_up_html_and_htm_only() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("a.html"),
            "<html><body><p>page a content</p></body></html>",
        )
        .unwrap();
        std::fs::write(
            dir.path().join("b.htm"),
            "<html><body><p>page b content</p></body></html>",
        )
        .unwrap();
        std::fs::write(dir.path().join("c.txt"), "not html").unwrap();
        let pages = load_dir(dir.path());
        assert_eq!(pages.len(), 2);
    }

    #[test]
    fn load_dir_recurses_into_subdirectories() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(
            dir.path().join("sub/deep.html"),
            "<html><body><p>deep page</p></body></html>",
        )
        .unwrap();
        let pages = load_dir(dir.path());
        assert_eq!(pages.len(), 1);
    }
}
