//! Main-text extraction from scraped encyclopedia pages.

use scraper::{ElementRef, Html, Node, Selector};
use std::path::Path;
use tracing::warn;

use crate::types::Document;

pub const MAX_HTML_BYTES: usize = 10_000_000;
pub const MAX_TEXT_CHARS: usize = 1_000_000;

/// Tried in order; the first selector with a match wins.
const CONTENT_SELECTORS: &[&str] = &[
    "#main-text",
    ".entry-content",
    "#content",
    "main",
    ".main-content",
    "article",
    ".article",
    "#article",
    ".post-content",
    ".entry-text",
];

const SKIPPED_ELEMENTS: &[&str] = &["script", "style", "noscript", "template"];

pub struct HtmlExtractor {
    content: Vec<Selector>,
    title: Option<Selector>,
    body: Option<Selector>,
}

impl Default for HtmlExtractor {
    fn default() -> Self { Self::new() }
}

impl HtmlExtractor {
    pub fn new() -> Self {
        Self {
            content: CONTENT_SELECTORS.iter().filter_map(|s| Selector::parse(s).ok()).collect(),
            title: Selector::parse("title").ok(),
            body: Selector::parse("body").ok(),
        }
    }

    /// Extract title and main text. `filename` supplies the entry name (its
    /// stem) and the title fallback.
    pub fn extract(&self, html: &str, filename: &str) -> Document {
        let entry_name = entry_name_from(filename);

        let html = if html.len() > MAX_HTML_BYTES {
            warn!(filename, bytes = html.len(), "html exceeds size cap, truncating");
            truncate_bytes(html, MAX_HTML_BYTES)
        } else {
            html
        };
        let document = Html::parse_document(html);

        let title = self
            .title
            .as_ref()
            .and_then(|sel| document.select(sel).next())
            .map(collect_text)
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| title_case(&entry_name));

        let mut content = collect_text(self.pick_root(&document));
        if let Some((cut, _)) = content.char_indices().nth(MAX_TEXT_CHARS) {
            warn!(filename, "extracted text exceeds {} chars, truncating", MAX_TEXT_CHARS);
            content.truncate(cut);
        }

        Document { entry_name, title, filename: filename.to_string(), content, scraped_at: None }
    }

    fn pick_root<'a>(&self, document: &'a Html) -> ElementRef<'a> {
        self.content
            .iter()
            .find_map(|sel| document.select(sel).next())
            .or_else(|| self.body.as_ref().and_then(|sel| document.select(sel).next()))
            .unwrap_or_else(|| document.root_element())
    }
}

/// File stem of `filename`, e.g. `free-will.html` -> `free-will`.
pub fn entry_name_from(filename: &str) -> String {
    Path::new(filename)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| filename.to_string())
}

/// `free-will` -> `Free Will`.
pub fn title_case(entry_name: &str) -> String {
    entry_name
        .split(['-', '_', ' '])
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

fn collect_text(root: ElementRef<'_>) -> String {
    let mut buf = String::new();
    for node in root.descendants() {
        if let Node::Text(text) = node.value() {
            let hidden = node.ancestors().any(|a| {
                a.value().as_element().is_some_and(|el| SKIPPED_ELEMENTS.contains(&el.name()))
            });
            if !hidden {
                buf.push_str(text);
            }
        }
    }
    collapse_whitespace(&buf)
}

fn collapse_whitespace(input: &str) -> String {
    let mut buf = String::with_capacity(input.len());
    let mut last_space = false;
    for ch in input.chars() {
        if ch.is_whitespace() {
            if !last_space && !buf.is_empty() {
                buf.push(' ');
            }
            last_space = true;
        } else {
            buf.push(ch);
            last_space = false;
        }
    }
    buf.trim_end().to_string()
}

fn truncate_bytes(s: &str, max: usize) -> &str {
    let mut end = max.min(s.len());
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
