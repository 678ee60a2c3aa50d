use once_cell::sync::Lazy;
use regex::Regex;

pub const TERM_ID_WIDTH: usize = 4;
pub const OFFSET_WIDTH: usize = 6;

pub fn keep_token(term_idx: usize, offset: usize) -> String {
    format!("<<MT_KEEP:{term_idx:0TERM_ID_WIDTH$}:{offset:0OFFSET_WIDTH$}>>")
}

pub static KEEP_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<<MT_KEEP:\d{4,}:\d{6,}>>").expect("keep token regex"));

/// A slice of text that is either free to rewrite or a placeholder that must pass through.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Span<'a> {
    Plain { start: usize, text: &'a str },
    Token { start: usize, text: &'a str },
}

/// Splits `text` into alternating plain/token spans. Empty plain spans are omitted.
pub fn split_keep_tokens(text: &str) -> Vec<Span<'_>> {
    let mut spans = Vec::new();
    let mut pos = 0usize;
    for m in KEEP_RE.find_iter(text) {
        if m.start() > pos {
            spans.push(Span::Plain {
                start: pos,
                text: &text[pos..m.start()],
            });
        }
        spans.push(Span::Token {
            start: m.start(),
            text: m.as_str(),
        });
        pos = m.end();
    }
    if pos < text.len() {
        spans.push(Span::Plain {
            start: pos,
            text: &text[pos..],
        });
    }
    spans
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_embeds_index_and_offset() {
        assert_eq!(keep_token(3, 42), "<<MT_KEEP:0003:000042>>");
        assert!(KEEP_RE.is_match(&keep_token(12345, 1234567)));
    }

    #[test]
    fn split_separates_tokens_from_plain_text() {
        let text = format!("a {} b{}", keep_token(0, 2), keep_token(1, 30));
        let spans = split_keep_tokens(&text);
        assert_eq!(spans.len(), 4);
        assert!(matches!(spans[0], Span::Plain { start: 0, text: "a " }));
        assert!(matches!(spans[1], Span::Token { start: 2, .. }));
        assert!(matches!(spans[2], Span::Plain { text: " b", .. }));
        assert!(matches!(spans[3], Span::Token { .. }));
    }
}
