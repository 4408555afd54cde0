//! Document text extraction for ingestion.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;

use ragbot_types::Document;

use crate::error::ProviderError;

/// File extensions the plain text parser understands.
const TEXT_EXTENSIONS: &[&str] = &["txt", "md", "markdown"];
const HTML_EXTENSIONS: &[&str] = &["html", "htm"];

static SCRIPT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<(script|style)[^>]*>.*?</(script|style)>").expect("valid regex"));
static BLOCK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)</?(p|div|h[1-6]|li|br|tr|section|article)[^>]*>").expect("valid regex"));
static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").expect("valid regex"));
static SPACES_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ \t]+").expect("valid regex"));
static BLANK_LINES_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n\s*\n+").expect("valid regex"));

/// Trait for turning a file into a [`Document`].
#[async_trait]
pub trait DocumentParser: Send + Sync {
    async fn parse(&self, path: &Path) -> Result<Document, ProviderError>;
}

/// Parser for UTF-8 text, Markdown and HTML files.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlainTextParser;

impl PlainTextParser {
    pub fn new() -> Self {
        Self
    }

    /// Whether `path` has an extension this parser accepts.
    pub fn supports(path: &Path) -> bool {
        extension(path)
            .map(|ext| TEXT_EXTENSIONS.contains(&ext.as_str()) || HTML_EXTENSIONS.contains(&ext.as_str()))
            .unwrap_or(false)
    }
}

#[async_trait]
impl DocumentParser for PlainTextParser {
    async fn parse(&self, path: &Path) -> Result<Document, ProviderError> {
        let ext = extension(path).unwrap_or_default();
        let is_html = HTML_EXTENSIONS.contains(&ext.as_str());
        if !is_html && !TEXT_EXTENSIONS.contains(&ext.as_str()) {
            return Err(ProviderError::UnsupportedFormat(path.display().to_string()));
        }

        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| ProviderError::Parse {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;
        let text = if is_html { strip_html_tags(&raw) } else { raw };

        let source_id = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());

        let mut doc = Document::new(text, source_id);
        doc.metadata
            .insert("path".to_string(), path.display().to_string());
        doc.metadata.insert("format".to_string(), ext);
        Ok(doc)
    }
}

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
}

/// HTML to text, keeping block elements as paragraph breaks.
fn strip_html_tags(html: &str) -> String {
    let without_scripts = SCRIPT_RE.replace_all(html, "");
    let with_breaks = BLOCK_RE.replace_all(&without_scripts, "\n\n");
    let text = TAG_RE.replace_all(&with_breaks, "");
    let text = text
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'");
    let collapsed = SPACES_RE.replace_all(&text, " ");
    BLANK_LINES_RE
        .replace_all(&collapsed, "\n\n")
        .trim()
        .to_string()
}

/// Collect parseable files from a path (file or directory), sorted for stable ids.
///
/// A file is returned as-is even when its format is unsupported, so the parser
/// reports it; directories are walked recursively and filtered by extension.
pub fn collect_documents(path: &Path) -> Result<Vec<PathBuf>, ProviderError> {
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }

    if !path.is_dir() {
        return Err(ProviderError::Parse {
            path: path.display().to_string(),
            reason: "no such file or directory".to_string(),
        });
    }

    let mut files = Vec::new();
    for entry in std::fs::read_dir(path)? {
        let entry = entry?;
        let entry_path = entry.path();
        if entry_path.is_file() {
            if PlainTextParser::supports(&entry_path) {
                files.push(entry_path);
            }
        } else if entry_path.is_dir() {
            files.extend(collect_documents(&entry_path)?);
        }
    }
    files.sort();

    Ok(files)
}
