//! Text chunking.
//!
//! Two strategies are supported:
//! - `character`: fixed windows of `chunk_size` characters advancing by
//!   `chunk_size - chunk_overlap`, cut at a sentence end when one falls in
//!   the last fifth of the window.
//! - `recursive`: split on paragraph, line, word and finally character
//!   boundaries, then greedily merge the pieces back up to `chunk_size`,
//!   carrying up to `chunk_overlap` characters of tail into the next chunk.
//!
//! Sizes are measured in characters, never bytes.

use serde::Serialize;
use serde_json::Value;

use crate::core::config::RagSettings;
use crate::documents::Document;

const SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];
const SENTENCE_ENDINGS: [&str; 6] = [". ", "! ", "? ", ".\n", "!\n", "?\n"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SplitStrategy {
    Recursive,
    Character,
}

impl SplitStrategy {
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "character" | "char" => SplitStrategy::Character,
            _ => SplitStrategy::Recursive,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SplitStrategy::Recursive => "recursive",
            SplitStrategy::Character => "character",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SplitterConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub strategy: SplitStrategy,
}

impl SplitterConfig {
    pub fn new(chunk_size: usize, chunk_overlap: usize, strategy: SplitStrategy) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            chunk_size,
            chunk_overlap: chunk_overlap.min(chunk_size - 1),
            strategy,
        }
    }

    pub fn recursive(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self::new(chunk_size, chunk_overlap, SplitStrategy::Recursive)
    }

    pub fn character(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self::new(chunk_size, chunk_overlap, SplitStrategy::Character)
    }

    pub fn from_settings(settings: &RagSettings) -> Self {
        Self::new(
            settings.chunk_size,
            settings.chunk_overlap,
            SplitStrategy::parse(&settings.split_strategy),
        )
    }
}

impl Default for SplitterConfig {
    fn default() -> Self {
        Self::recursive(1000, 200)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChunk {
    pub text: String,
    /// Character offset of the chunk within the source text.
    pub start_offset: usize,
    pub chunk_index: usize,
}

#[derive(Debug, Clone, Default)]
pub struct TextSplitter {
    config: SplitterConfig,
}

impl TextSplitter {
    pub fn new(config: SplitterConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SplitterConfig {
        &self.config
    }

    pub fn split_text(&self, text: &str) -> Vec<TextChunk> {
        let pieces = match self.config.strategy {
            SplitStrategy::Character => self.split_windows(text),
            SplitStrategy::Recursive => {
                let merged = self.split_recursive(text, &SEPARATORS);
                locate_offsets(text, merged)
            }
        };

        pieces
            .into_iter()
            .filter(|(piece, _)| !piece.is_empty())
            .enumerate()
            .map(|(chunk_index, (text, start_offset))| TextChunk {
                text,
                start_offset,
                chunk_index,
            })
            .collect()
    }

    /// Splits every document, copying its metadata onto each chunk and adding
    /// `chunk_index` and `start_offset`.
    pub fn split_documents(&self, docs: &[Document]) -> Vec<Document> {
        let mut out = Vec::new();
        for doc in docs {
            for chunk in self.split_text(&doc.page_content) {
                let mut metadata = doc.metadata.clone();
                metadata.insert("chunk_index".to_string(), Value::from(chunk.chunk_index));
                metadata.insert("start_offset".to_string(), Value::from(chunk.start_offset));
                out.push(Document {
                    page_content: chunk.text,
                    metadata,
                });
            }
        }
        out
    }

    fn split_windows(&self, text: &str) -> Vec<(String, usize)> {
        let chars: Vec<char> = text.chars().collect();
        let total = chars.len();
        let size = self.config.chunk_size;
        let overlap = self.config.chunk_overlap;

        let mut out = Vec::new();
        let mut start = 0;
        while start < total {
            let end = (start + size).min(total);
            let window = &chars[start..end];
            let taken = if end < total {
                sentence_cut(window)
            } else {
                window.len()
            };

            let chunk: String = window[..taken].iter().collect();
            out.push((chunk.trim().to_string(), start));

            if end == total {
                break;
            }
            start += taken.saturating_sub(overlap).max(1);
        }
        out
    }

    fn split_recursive(&self, text: &str, separators: &[&str]) -> Vec<String> {
        let size = self.config.chunk_size;

        let (separator, rest) = separators
            .iter()
            .position(|sep| sep.is_empty() || text.contains(sep))
            .map(|idx| (separators[idx], &separators[idx + 1..]))
            .unwrap_or(("", &[][..]));

        let splits: Vec<String> = if separator.is_empty() {
            text.chars().map(String::from).collect()
        } else {
            text.split(separator)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        };

        let mut chunks = Vec::new();
        let mut good: Vec<String> = Vec::new();
        for split in splits {
            if char_len(&split) < size {
                good.push(split);
                continue;
            }
            if !good.is_empty() {
                chunks.extend(self.merge_splits(&good, separator));
                good.clear();
            }
            if rest.is_empty() {
                chunks.push(split);
            } else {
                chunks.extend(self.split_recursive(&split, rest));
            }
        }
        if !good.is_empty() {
            chunks.extend(self.merge_splits(&good, separator));
        }
        chunks
    }

    fn merge_splits(&self, splits: &[String], separator: &str) -> Vec<String> {
        let size = self.config.chunk_size;
        let overlap = self.config.chunk_overlap;
        let sep_len = char_len(separator);

        let mut docs = Vec::new();
        let mut current: Vec<&str> = Vec::new();
        let mut total = 0usize;

        for split in splits {
            let len = char_len(split);
            let joiner = if current.is_empty() { 0 } else { sep_len };
            if total + len + joiner > size && !current.is_empty() {
                push_joined(&mut docs, &current, separator);
                while !current.is_empty() && (total > overlap || total + len + sep_len > size) {
                    let trailing_sep = if current.len() > 1 { sep_len } else { 0 };
                    total = total.saturating_sub(char_len(current[0]) + trailing_sep);
                    current.remove(0);
                }
            }
            let joiner = if current.is_empty() { 0 } else { sep_len };
            current.push(split);
            total += len + joiner;
        }
        push_joined(&mut docs, &current, separator);
        docs
    }
}

fn push_joined(docs: &mut Vec<String>, parts: &[&str], separator: &str) {
    let joined = parts.join(separator);
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        docs.push(trimmed.to_string());
    }
}

/// Number of chars to keep from a non-final window.
fn sentence_cut(window: &[char]) -> usize {
    let search_start = window.len() * 4 / 5;
    let tail: String = window[search_start..].iter().collect();
    let best = SENTENCE_ENDINGS
        .iter()
        .filter_map(|ending| tail.rfind(ending).map(|pos| pos + ending.len()))
        .max();
    match best {
        Some(byte_end) => search_start + tail[..byte_end].chars().count(),
        None => window.len(),
    }
}

fn locate_offsets(text: &str, chunks: Vec<String>) -> Vec<(String, usize)> {
    let mut cursor = 0usize;
    let mut last_offset = 0usize;
    chunks
        .into_iter()
        .map(|chunk| {
            let offset = match text[cursor..].find(chunk.as_str()) {
                Some(found) => {
                    let byte = cursor + found;
                    last_offset = text[..byte].chars().count();
                    cursor = byte + chunk.chars().next().map(char::len_utf8).unwrap_or(0);
                    last_offset
                }
                None => last_offset,
            };
            (chunk, offset)
        })
        .collect()
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}
