pub const PARAGRAPH_SEPARATOR: &str = "\n\n";

#[inline]
pub fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// Escaped regex for `term`, guarded by `\b` on each side that starts or ends with a word char.
pub fn word_bounded(term: &str) -> String {
    let is_word = |c: char| c.is_alphanumeric() || c == '_';
    let mut pat = String::with_capacity(term.len() + 8);
    if term.chars().next().is_some_and(is_word) {
        pat.push_str(r"\b");
    }
    pat.push_str(&regex::escape(term));
    if term.chars().last().is_some_and(is_word) {
        pat.push_str(r"\b");
    }
    pat
}

/// Splits `text` into paragraph-aligned chunks of at most `max_chars` characters.
///
/// Paragraphs are packed greedily. A paragraph that alone exceeds `max_chars` becomes its own
/// oversized chunk; it is never cut. Chunks are not trimmed, so `join_chunks` restores the input.
pub fn chunk_paragraphs(text: &str, max_chars: usize) -> Vec<String> {
    if char_len(text) <= max_chars {
        return vec![text.to_string()];
    }

    let sep_len = char_len(PARAGRAPH_SEPARATOR);
    let mut chunks: Vec<String> = Vec::new();
    let mut current: Option<(String, usize)> = None;

    for para in text.split(PARAGRAPH_SEPARATOR) {
        let para_len = char_len(para);
        current = match current.take() {
            Some((mut buf, len)) if len + para_len + sep_len <= max_chars => {
                buf.push_str(PARAGRAPH_SEPARATOR);
                buf.push_str(para);
                Some((buf, len + sep_len + para_len))
            }
            Some((buf, _)) => {
                chunks.push(buf);
                Some((para.to_string(), para_len))
            }
            None => Some((para.to_string(), para_len)),
        };
    }
    if let Some((buf, _)) = current {
        chunks.push(buf);
    }
    chunks
}

pub fn join_chunks(chunks: &[String]) -> String {
    chunks.join(PARAGRAPH_SEPARATOR)
}

/// Human-readable language name for prompts. Unknown codes are returned as-is.
pub fn lang_label(code: &str) -> String {
    match code.trim().to_ascii_lowercase().as_str() {
        "en" => "English".to_string(),
        "nl" => "Dutch".to_string(),
        "pt" => "Portuguese".to_string(),
        "de" => "German".to_string(),
        "fr" => "French".to_string(),
        "es" => "Spanish".to_string(),
        "it" => "Italian".to_string(),
        other => other.to_string(),
    }
}

/// First `max_chars` characters of `text` on one line, for log output.
pub fn preview(text: &str, max_chars: usize) -> String {
    let flat = text.replace('\n', " ");
    if char_len(&flat) <= max_chars {
        return flat;
    }
    let mut out: String = flat.chars().take(max_chars).collect();
    out.push('…');
    out
}
