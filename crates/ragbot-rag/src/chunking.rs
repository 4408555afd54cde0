//! Recursive text chunking for document indexing.

use std::collections::VecDeque;

use once_cell::sync::Lazy;
use regex::Regex;
use sha2::{Digest, Sha256};

use ragbot_config::ChunkingConfig;
use ragbot_types::{Document, Segment};

static PARAGRAPH_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n[ \t]*\n\s*").expect("valid regex"));
static SENTENCE_END_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[.!?]+\s+").expect("valid regex"));

/// Splits documents into bounded, overlapping segments.
///
/// Text is cut at paragraph boundaries first, then at sentence boundaries,
/// then at word or raw character boundaries, so no segment is longer than
/// `max_chars` characters. Consecutive pieces are packed greedily; when a
/// segment is closed, up to `overlap` trailing characters are repeated at the
/// start of the next one.
#[derive(Debug, Clone)]
pub struct Chunker {
    max_chars: usize,
    overlap: usize,
    min_chars: usize,
}

/// An atomic piece of text no longer than `max_chars`.
struct Piece {
    text: String,
    starts_paragraph: bool,
}

impl Chunker {
    /// `overlap` is clamped below `max_chars`.
    pub fn new(max_chars: usize, overlap: usize) -> Self {
        let max_chars = max_chars.max(1);
        Self {
            max_chars,
            overlap: overlap.min(max_chars - 1),
            min_chars: 1,
        }
    }

    pub fn from_config(config: &ChunkingConfig) -> Self {
        Self::new(config.max_chars, config.overlap).with_min_chars(config.min_chars)
    }

    /// Drop segments whose trimmed text is shorter than `min_chars`.
    pub fn with_min_chars(mut self, min_chars: usize) -> Self {
        self.min_chars = min_chars.max(1);
        self
    }

    pub fn max_chars(&self) -> usize {
        self.max_chars
    }

    /// Split a document into segments with ids `"{source_id}::{n}"`.
    pub fn split(&self, document: &Document) -> Vec<Segment> {
        self.split_text(&document.text)
            .into_iter()
            .enumerate()
            .map(|(i, text)| {
                let hash = hash_text(&text);
                Segment::new(format!("{}::{i}", document.source_id), text, &document.source_id)
                    .with_metadata("index", i.to_string())
                    .with_metadata("hash", hash)
            })
            .collect()
    }

    /// Split raw text into segment texts.
    pub fn split_text(&self, text: &str) -> Vec<String> {
        let mut pieces: VecDeque<Piece> = self.pieces(text).into();

        let mut chunks: Vec<String> = Vec::new();
        let mut current = String::new();

        while let Some(piece) = pieces.pop_front() {
            let sep = if piece.starts_paragraph { "\n\n" } else { " " };
            if current.is_empty() {
                current = piece.text;
                continue;
            }

            let piece_len = char_len(&piece.text);
            let sep_len = char_len(sep);
            if char_len(&current) + sep_len + piece_len <= self.max_chars {
                current.push_str(sep);
                current.push_str(&piece.text);
                continue;
            }

            // Close the current chunk and seed the next one with its tail
            let tail = overlap_tail(&current, self.overlap);
            chunks.push(std::mem::take(&mut current));
            let Some(tail) = tail else {
                current = piece.text;
                continue;
            };

            if char_len(&tail) + sep_len + piece_len <= self.max_chars {
                current = format!("{tail}{sep}{}", piece.text);
                continue;
            }

            // Re-cut the piece so every part fits after a full overlap
            let width = self.max_chars.saturating_sub(self.overlap + 2);
            if width == 0 {
                current = piece.text;
                continue;
            }
            let parts = hard_split(&piece.text, width);
            for (i, part) in parts.into_iter().enumerate().rev() {
                pieces.push_front(Piece {
                    text: part,
                    starts_paragraph: piece.starts_paragraph && i == 0,
                });
            }
            current = tail;
        }
        if !current.is_empty() {
            chunks.push(current);
        }

        chunks
            .into_iter()
            .map(|c| c.trim().to_string())
            .filter(|c| char_len(c) >= self.min_chars)
            .collect()
    }

    /// Break text into pieces that each fit in `max_chars`.
    fn pieces(&self, text: &str) -> Vec<Piece> {
        let mut pieces = Vec::new();
        for paragraph in PARAGRAPH_RE.split(text) {
            let paragraph = paragraph.trim();
            if paragraph.is_empty() {
                continue;
            }
            if char_len(paragraph) <= self.max_chars {
                pieces.push(Piece {
                    text: paragraph.to_string(),
                    starts_paragraph: true,
                });
                continue;
            }

            let mut first = true;
            for sentence in split_sentences(paragraph) {
                let parts = if char_len(sentence) <= self.max_chars {
                    vec![sentence.to_string()]
                } else {
                    hard_split(sentence, self.max_chars)
                };
                for part in parts {
                    pieces.push(Piece {
                        text: part,
                        starts_paragraph: first,
                    });
                    first = false;
                }
            }
        }
        pieces
    }
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// Split after sentence-ending punctuation followed by whitespace.
fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    for m in SENTENCE_END_RE.find_iter(text) {
        let sentence = text[start..m.end()].trim();
        if !sentence.is_empty() {
            sentences.push(sentence);
        }
        start = m.end();
    }
    let rest = text[start..].trim();
    if !rest.is_empty() {
        sentences.push(rest);
    }
    sentences
}

/// Cut text into pieces of at most `max_chars`, preferring whitespace boundaries.
fn hard_split(text: &str, max_chars: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let mut parts = Vec::new();
    let mut start = 0;

    while start < chars.len() {
        let mut end = (start + max_chars).min(chars.len());
        if end < chars.len() {
            if let Some(ws) = chars[start..end].iter().rposition(|c| c.is_whitespace()) {
                if ws > 0 {
                    end = start + ws;
                }
            }
        }
        let part: String = chars[start..end].iter().collect();
        let part = part.trim();
        if !part.is_empty() {
            parts.push(part.to_string());
        }
        start = end;
        while start < chars.len() && chars[start].is_whitespace() {
            start += 1;
        }
    }
    parts
}

/// The last `max_chars` characters of `text`, without a leading partial word.
fn overlap_tail(text: &str, max_chars: usize) -> Option<String> {
    if max_chars == 0 {
        return None;
    }
    let chars: Vec<char> = text.chars().collect();
    let start = chars.len().saturating_sub(max_chars);
    let mut tail = &chars[start..];

    let cut_mid_word = start > 0 && !chars[start - 1].is_whitespace();
    if cut_mid_word {
        if let Some(ws) = tail.iter().position(|c| c.is_whitespace()) {
            tail = &tail[ws..];
        }
    }

    let tail: String = tail.iter().collect();
    let tail = tail.trim();
    (!tail.is_empty()).then(|| tail.to_string())
}

fn hash_text(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}
