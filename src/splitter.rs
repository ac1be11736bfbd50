//! Text splitting for indexing.
//!
//! Splitting is deliberately a black box to the rest of the crate: the
//! pricing and payment layers only ever see ordered text spans with
//! character counts. `CharacterSplitter` is the built-in implementation;
//! anything fancier (sentence-aware, markdown-aware) plugs in behind the
//! same trait.

/// Produces ordered text spans from a document's content.
pub trait TextSplitter: Send + Sync {
    /// Split `text` into ordered chunks. May return an empty vec for
    /// empty or whitespace-only input.
    fn split(&self, text: &str) -> Vec<String>;
}

/// Paragraph-first character splitter.
///
/// Splits on blank lines, then greedily packs adjacent paragraphs into
/// chunks of at most `chunk_size` characters. A single paragraph longer
/// than `chunk_size` is hard-split with `chunk_overlap` characters of
/// overlap between the pieces.
#[derive(Debug, Clone)]
pub struct CharacterSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl CharacterSplitter {
    /// Create a splitter with the given size and overlap (both in characters).
    ///
    /// `chunk_overlap` is clamped below `chunk_size`.
    #[must_use]
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            chunk_size,
            chunk_overlap: chunk_overlap.min(chunk_size - 1),
        }
    }

    fn hard_split(&self, text: &str, out: &mut Vec<String>) {
        let chars: Vec<char> = text.chars().collect();
        let step = self.chunk_size - self.chunk_overlap;
        let mut start = 0;
        while start < chars.len() {
            let end = (start + self.chunk_size).min(chars.len());
            out.push(chars[start..end].iter().collect());
            if end == chars.len() {
                break;
            }
            start += step;
        }
    }
}

impl TextSplitter for CharacterSplitter {
    fn split(&self, text: &str) -> Vec<String> {
        let mut chunks = Vec::new();
        let mut current = String::new();

        for paragraph in text.split("\n\n").filter(|p| !p.trim().is_empty()) {
            let para_chars = paragraph.chars().count();

            if para_chars > self.chunk_size {
                if !current.is_empty() {
                    chunks.push(std::mem::take(&mut current));
                }
                self.hard_split(paragraph, &mut chunks);
                continue;
            }

            let current_chars = current.chars().count();
            let joined = if current.is_empty() {
                para_chars
            } else {
                current_chars + 2 + para_chars
            };

            if joined > self.chunk_size && !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
                current.push_str(paragraph);
            } else {
                if !current.is_empty() {
                    current.push_str("\n\n");
                }
                current.push_str(paragraph);
            }
        }

        if !current.is_empty() {
            chunks.push(current);
        }

        chunks
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_input() {
        let splitter = CharacterSplitter::new(100, 10);
        assert!(splitter.split("").is_empty());
        assert!(splitter.split("\n\n  \n\n").is_empty());
    }

    #[test]
    fn test_short_text_single_chunk() {
        let splitter = CharacterSplitter::new(100, 10);
        let chunks = splitter.split("hello world");
        assert_eq!(chunks, vec!["hello world".to_string()]);
    }

    #[test]
    fn test_paragraphs_kept_separate_when_too_big_together() {
        let splitter = CharacterSplitter::new(300, 0);
        let a = "a".repeat(100);
        let b = "b".repeat(300);
        let text = format!("{a}\n\n{b}");

        let chunks = splitter.split(&text);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].chars().count(), 100);
        assert_eq!(chunks[1].chars().count(), 300);
    }

    #[test]
    fn test_paragraphs_merged_when_they_fit() {
        let splitter = CharacterSplitter::new(100, 0);
        let chunks = splitter.split("one\n\ntwo\n\nthree");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0], "one\n\ntwo\n\nthree");
    }

    #[test]
    fn test_oversized_paragraph_hard_split_with_overlap() {
        let splitter = CharacterSplitter::new(10, 2);
        let text = "x".repeat(25);
        let chunks = splitter.split(&text);

        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 10);
        }
        // Every character is covered.
        let covered: usize = chunks.iter().map(|c| c.chars().count()).sum();
        assert!(covered >= 25);
    }

    #[test]
    fn test_multibyte_boundaries() {
        let splitter = CharacterSplitter::new(4, 1);
        let chunks = splitter.split("héllo wörld ünïcode");
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 4);
        }
    }
}
