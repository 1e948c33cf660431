use std::collections::VecDeque;
use std::sync::OnceLock;

use tiktoken_rs::CoreBPE;
use tracing::warn;

use adaptrag_core::types::Document;

/// Get or initialize the cl100k_base tokenizer.
fn tokenizer() -> &'static CoreBPE {
    static TOKENIZER: OnceLock<CoreBPE> = OnceLock::new();
    TOKENIZER.get_or_init(|| {
        tiktoken_rs::cl100k_base().expect("Failed to load cl100k_base tokenizer")
    })
}

/// Token count under cl100k_base.
pub fn count_tokens(text: &str) -> usize {
    tokenizer().encode_ordinary(text).len()
}

const DEFAULT_SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];

/// Recursive splitter that measures chunk length in tokens.
///
/// Text is cut on the coarsest separator that occurs in it; pieces that are
/// still too long are cut again on the next separator. Adjacent pieces are
/// then merged back up to `chunk_size` tokens, keeping up to `chunk_overlap`
/// tokens of trailing context between consecutive chunks.
pub struct TokenTextSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
    separators: Vec<String>,
    length: fn(&str) -> usize,
}

impl TokenTextSplitter {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self {
            chunk_size,
            chunk_overlap,
            separators: DEFAULT_SEPARATORS.iter().map(|s| s.to_string()).collect(),
            length: count_tokens,
        }
    }

    /// Measure length with a different function (e.g. characters in tests).
    pub fn with_length_fn(mut self, length: fn(&str) -> usize) -> Self {
        self.length = length;
        self
    }

    pub fn split_text(&self, text: &str) -> Vec<String> {
        self.split_recursive(text, &self.separators)
    }

    /// Split every document, copying its metadata onto each chunk.
    pub fn split_documents(&self, documents: &[Document]) -> Vec<Document> {
        documents
            .iter()
            .flat_map(|doc| {
                self.split_text(&doc.content)
                    .into_iter()
                    .map(move |chunk| Document {
                        content: chunk,
                        metadata: doc.metadata.clone(),
                    })
            })
            .collect()
    }

    fn split_recursive(&self, text: &str, separators: &[String]) -> Vec<String> {
        let (index, separator) = separators
            .iter()
            .enumerate()
            .find(|(_, s)| s.is_empty() || text.contains(s.as_str()))
            .map(|(i, s)| (i, s.as_str()))
            .unwrap_or((separators.len(), ""));
        let remaining = separators.get(index + 1..).unwrap_or(&[]);

        let pieces: Vec<&str> = if separator.is_empty() {
            text.char_indices()
                .map(|(i, c)| &text[i..i + c.len_utf8()])
                .collect()
        } else {
            text.split(separator).filter(|p| !p.is_empty()).collect()
        };

        let mut chunks = Vec::new();
        let mut fitting: Vec<&str> = Vec::new();

        for piece in pieces {
            if (self.length)(piece) < self.chunk_size {
                fitting.push(piece);
                continue;
            }
            if !fitting.is_empty() {
                chunks.extend(self.merge(&fitting, separator));
                fitting.clear();
            }
            if remaining.is_empty() {
                chunks.push(piece.to_string());
            } else {
                chunks.extend(self.split_recursive(piece, remaining));
            }
        }
        if !fitting.is_empty() {
            chunks.extend(self.merge(&fitting, separator));
        }
        chunks
    }

    fn merge(&self, pieces: &[&str], separator: &str) -> Vec<String> {
        let sep_len = (self.length)(separator);
        let mut chunks = Vec::new();
        let mut current: VecDeque<&str> = VecDeque::new();
        let mut total = 0usize;

        for &piece in pieces {
            let len = (self.length)(piece);
            let joiner = if current.is_empty() { 0 } else { sep_len };

            if total + len + joiner > self.chunk_size && !current.is_empty() {
                if total > self.chunk_size {
                    warn!(
                        size = total,
                        chunk_size = self.chunk_size,
                        "Created a chunk longer than the configured size"
                    );
                }
                push_joined(&mut chunks, &current, separator);

                // Drop leading pieces until only the overlap remains and the
                // next piece fits.
                while total > self.chunk_overlap
                    || (total > 0
                        && total + len + if current.is_empty() { 0 } else { sep_len }
                            > self.chunk_size)
                {
                    let Some(first) = current.pop_front() else {
                        break;
                    };
                    total -= (self.length)(first);
                    if !current.is_empty() {
                        total -= sep_len;
                    }
                }
            }

            if !current.is_empty() {
                total += sep_len;
            }
            current.push_back(piece);
            total += len;
        }

        push_joined(&mut chunks, &current, separator);
        chunks
    }
}

fn push_joined(chunks: &mut Vec<String>, pieces: &VecDeque<&str>, separator: &str) {
    if pieces.is_empty() {
        return;
    }
    let joined = pieces.iter().copied().collect::<Vec<_>>().join(separator);
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        chunks.push(trimmed.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn chars(text: &str) -> usize {
        text.chars().count()
    }

    #[test]
    fn test_short_text_is_single_chunk() {
        let splitter = TokenTextSplitter::new(100, 0).with_length_fn(chars);
        let chunks = splitter.split_text("Task decomposition breaks goals into steps.");
        assert_eq!(chunks, vec!["Task decomposition breaks goals into steps."]);
    }

    #[test]
    fn test_paragraphs_merge_until_full() {
        let splitter = TokenTextSplitter::new(12, 0).with_length_fn(chars);
        let chunks = splitter.split_text("aaaa\n\nbbbb\n\ncccc\n\ndddd");
        assert_eq!(chunks, vec!["aaaa\n\nbbbb", "cccc\n\ndddd"]);
    }

    #[test]
    fn test_long_paragraph_falls_back_to_words() {
        let splitter = TokenTextSplitter::new(10, 0).with_length_fn(chars);
        let chunks = splitter.split_text("short\n\nthis paragraph is long");
        assert_eq!(chunks[0], "short");
        assert!(chunks.iter().all(|c| chars(c) <= 10));
        assert_eq!(chunks[1..].join(" "), "this paragraph is long");
    }

    #[test]
    fn test_overlap_repeats_trailing_piece() {
        let splitter = TokenTextSplitter::new(9, 4).with_length_fn(chars);
        let chunks = splitter.split_text("one two three four");
        assert_eq!(chunks, vec!["one two", "two three", "four"]);
    }

    #[test]
    fn test_split_documents_copies_metadata() {
        let mut metadata = HashMap::new();
        metadata.insert("source".to_string(), serde_json::json!("https://example.com"));
        let doc = Document {
            content: "aaaa\n\nbbbb\n\ncccc".to_string(),
            metadata,
        };
        let splitter = TokenTextSplitter::new(6, 0).with_length_fn(chars);
        let chunks = splitter.split_documents(&[doc]);
        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|c| c.source() == Some("https://example.com")));
    }

    #[test]
    fn test_token_length_counts_tokens() {
        assert_eq!(count_tokens("hello"), 1);
        let splitter = TokenTextSplitter::new(500, 0);
        let text = "Agents use memory. ".repeat(400);
        let chunks = splitter.split_text(&text);
        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| count_tokens(c) <= 500));
    }
}
