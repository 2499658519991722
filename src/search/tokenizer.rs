use std::ops::Range;

use once_cell::sync::Lazy;
use tiktoken_rs::{cl100k_base, CoreBPE};

/// cl100k_base, the encoding shared by the OpenAI embedding and chat models.
/// `None` only if the bundled vocabulary fails to load.
static TOKENIZER: Lazy<Option<CoreBPE>> = Lazy::new(|| cl100k_base().ok());

/// A UTF-8 character spans at most 4 bytes, so a valid boundary is never more than
/// this many tokens away from any cut point.
const BOUNDARY_SLACK: usize = 4;

type Decode<'a> = dyn Fn(Range<usize>) -> Option<String> + 'a;

/// Token-level view of text used by the chunker and the embedding service.
#[derive(Clone, Copy)]
pub struct Tokenizer {
    bpe: Option<&'static CoreBPE>,
}

impl Default for Tokenizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Tokenizer {
    pub fn new() -> Self {
        Self {
            bpe: TOKENIZER.as_ref(),
        }
    }

    /// Count exact tokens; falls back to a ~4 chars/token estimate without a vocabulary.
    pub fn count(&self, text: &str) -> usize {
        match self.bpe {
            Some(bpe) => bpe.encode_with_special_tokens(text).len(),
            None => text.chars().count().div_ceil(4),
        }
    }

    /// Consecutive non-overlapping windows of at most `max_tokens` tokens, decoded back to text.
    ///
    /// Window ends are nudged to the nearest UTF-8 boundary so multi-token characters are
    /// never cut in half. When `max_tokens` is smaller than the character at the window
    /// start, that window runs past the limit to the next boundary, by at most
    /// `BOUNDARY_SLACK` extra tokens.
    pub fn windows(&self, text: &str, max_tokens: usize) -> Vec<String> {
        let max_tokens = max_tokens.max(1);
        let Some(bpe) = self.bpe else {
            return char_windows(text, max_tokens * 4);
        };

        let tokens = bpe.encode_with_special_tokens(text);
        let decode = |range: Range<usize>| bpe.decode(tokens[range].to_vec()).ok();

        let mut windows = Vec::new();
        let mut start = 0;
        while start < tokens.len() {
            let limit = (start + max_tokens).min(tokens.len());
            let (end, piece) = window_end(&decode, start, limit, tokens.len());
            windows.push(piece);
            start = end;
        }
        windows
    }

    /// Halve the token sequence until every piece fits in `max_tokens`.
    ///
    /// Text that already fits comes back unchanged as a single piece. Each split point lies
    /// strictly inside its range, so every piece is shorter than its parent and the
    /// bisection terminates. A piece with no clean split point is kept whole even if it is
    /// over the limit, which only happens when `max_tokens` is below the token width of
    /// a single character.
    pub fn bisect(&self, text: &str, max_tokens: usize) -> Vec<String> {
        let max_tokens = max_tokens.max(1);
        let Some(bpe) = self.bpe else {
            return char_bisect(text, max_tokens * 4);
        };

        let tokens = bpe.encode_with_special_tokens(text);
        if tokens.len() <= max_tokens {
            return vec![text.to_string()];
        }
        let decode = |range: Range<usize>| bpe.decode(tokens[range].to_vec()).ok();

        let mut pieces = Vec::new();
        let mut pending = vec![0..tokens.len()];
        while let Some(range) = pending.pop() {
            let split = if range.len() > max_tokens {
                midpoint(&decode, &range)
            } else {
                None
            };
            match split {
                Some(mid) => {
                    // Right half first so the left half is processed next.
                    pending.push(mid..range.end);
                    pending.push(range.start..mid);
                }
                None => pieces.push(decode(range).unwrap_or_default()),
            }
        }
        pieces
    }

    /// Cut text down to its first `max_tokens` tokens.
    pub fn truncate(&self, text: &str, max_tokens: usize) -> String {
        self.windows(text, max_tokens)
            .into_iter()
            .next()
            .unwrap_or_default()
    }
}

/// Largest end in `(start, limit]` that decodes cleanly, else the nearest one past `limit`.
fn window_end(decode: &Decode<'_>, start: usize, limit: usize, len: usize) -> (usize, String) {
    let backward = (start + 1..=limit).rev();
    let forward = limit + 1..=(limit + BOUNDARY_SLACK).min(len);
    for end in backward.chain(forward) {
        if let Some(piece) = decode(start..end) {
            return (end, piece);
        }
    }
    (limit, String::new())
}

/// A split point near the middle of `range` whose left side decodes cleanly.
fn midpoint(decode: &Decode<'_>, range: &Range<usize>) -> Option<usize> {
    let mid = range.start + range.len() / 2;
    (0..BOUNDARY_SLACK)
        .flat_map(|offset| [mid.checked_sub(offset), Some(mid + offset)])
        .flatten()
        .filter(|&m| m > range.start && m < range.end)
        .find(|&m| decode(range.start..m).is_some())
}

fn char_windows(text: &str, width: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(width.max(1))
        .map(|c| c.iter().collect())
        .collect()
}

fn char_bisect(text: &str, width: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= width {
        return vec![text.to_string()];
    }
    let mid = chars.len() / 2;
    let left: String = chars[..mid].iter().collect();
    let right: String = chars[mid..].iter().collect();
    let mut pieces = char_bisect(&left, width);
    pieces.extend(char_bisect(&right, width));
    pieces
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_count_tokens() {
        let tokenizer = Tokenizer::new();
        let count = tokenizer.count("The quick brown fox jumps over the lazy dog.");
        assert!(count > 5);
        assert!(count < 20);
    }

    #[test]
    fn test_windows_respect_limit() {
        let tokenizer = Tokenizer::new();
        let text = "alpha beta gamma delta epsilon zeta eta theta iota kappa ".repeat(20);
        let windows = tokenizer.windows(&text, 16);
        assert!(windows.len() > 1);
        assert_eq!(windows.concat(), text);
        for w in &windows[..windows.len() - 1] {
            assert!(tokenizer.count(w) <= 16);
        }
    }

    #[test]
    fn test_windows_keep_multibyte_text_intact() {
        let tokenizer = Tokenizer::new();
        let text = "용인시 청년 월세 지원 사업 안내 ".repeat(10);
        let windows = tokenizer.windows(&text, 7);
        assert_eq!(windows.concat(), text);
    }

    #[test]
    fn test_tiny_limits_keep_characters_whole() {
        let tokenizer = Tokenizer::new();
        let text = "용인시 청년 🎉👨‍👩‍👧 월세 지원 🚀 ".repeat(8);

        for limit in [1, 2, 3] {
            let windows = tokenizer.windows(&text, limit);
            assert_eq!(windows.concat(), text);
            assert!(windows
                .iter()
                .all(|w| tokenizer.count(w) <= limit + BOUNDARY_SLACK));

            let pieces = tokenizer.bisect(&text, limit);
            assert_eq!(pieces.concat(), text);
            assert!(pieces
                .iter()
                .all(|p| tokenizer.count(p) <= limit + BOUNDARY_SLACK));
        }

        // Once the limit covers the widest character, pieces fit exactly
        for piece in tokenizer.bisect(&text, 8) {
            assert!(tokenizer.count(&piece) <= 8);
        }
    }

    #[test]
    fn test_bisect_short_text_unchanged() {
        let tokenizer = Tokenizer::new();
        assert_eq!(tokenizer.bisect("short text", 100), vec!["short text"]);
    }

    #[test]
    fn test_bisect_long_text() {
        let tokenizer = Tokenizer::new();
        let text = "one two three four five six seven eight nine ten ".repeat(30);
        let pieces = tokenizer.bisect(&text, 40);
        assert!(pieces.len() >= 2);
        assert_eq!(pieces.concat(), text);
        for piece in &pieces {
            assert!(tokenizer.count(piece) <= 40);
        }
    }

    #[test]
    fn test_truncate() {
        let tokenizer = Tokenizer::new();
        let text = "word ".repeat(500);
        let cut = tokenizer.truncate(&text, 50);
        assert!(tokenizer.count(&cut) <= 50);
        assert!(text.starts_with(&cut));
    }

    #[test]
    fn test_truncate_empty() {
        assert_eq!(Tokenizer::new().truncate("", 10), "");
    }
}
