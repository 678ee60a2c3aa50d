use std::collections::HashMap;

use anyhow::Context;
use regex::Regex;

use crate::sentinels::{keep_token, split_keep_tokens, Span, KEEP_RE};
use crate::textutil::{char_len, word_bounded};

#[derive(Debug, Clone)]
pub struct ProtectResult {
    pub text: String,
    pub restore_map: HashMap<String, String>,
}

/// Shields a fixed vocabulary from rewriting by swapping each occurrence for a placeholder.
///
/// Terms are matched case-insensitively, longest first; the stored original keeps its casing.
/// A placeholder's offset is the byte position in the text as it stood when that term was
/// substituted, so later terms count earlier placeholders rather than the source bytes. The
/// pair of term index and offset is still unique within one call.
#[derive(Debug, Clone, Default)]
pub struct TermGuard {
    terms: Vec<Regex>,
}

impl TermGuard {
    pub fn new<I, S>(terms: I) -> anyhow::Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut list: Vec<String> = Vec::new();
        for t in terms {
            let t = t.as_ref().trim();
            if t.is_empty() || list.iter().any(|seen| seen.eq_ignore_ascii_case(t)) {
                continue;
            }
            list.push(t.to_string());
        }
        // Stable: equal lengths keep configuration order.
        list.sort_by_key(|t| std::cmp::Reverse(char_len(t)));

        let terms = list
            .into_iter()
            .map(|term| {
                Regex::new(&format!("(?i){}", word_bounded(&term)))
                    .with_context(|| format!("protected term pattern: {term}"))
            })
            .collect::<anyhow::Result<Vec<_>>>()?;
        Ok(Self { terms })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.terms.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn protect(&self, text: &str) -> ProtectResult {
        let mut restore_map: HashMap<String, String> = HashMap::new();
        if text.is_empty() {
            return ProtectResult {
                text: String::new(),
                restore_map,
            };
        }

        // Marker-shaped text already in the input goes into the map under the reserved index, so
        // every placeholder left in the text afterwards is one we issued.
        let reserved: Vec<(usize, usize)> = KEEP_RE
            .find_iter(text)
            .map(|m| (m.start(), m.end()))
            .collect();
        let mut current = replace_spans(text, &reserved, self.terms.len(), &mut restore_map);

        for (idx, pattern) in self.terms.iter().enumerate() {
            let mut spans: Vec<(usize, usize)> = Vec::new();
            for span in split_keep_tokens(&current) {
                if let Span::Plain { start, text: plain } = span {
                    spans.extend(
                        pattern
                            .find_iter(plain)
                            .map(|m| (start + m.start(), start + m.end()))
                            .filter(|&(s, e)| !in_hyphen_compound(&current, s, e)),
                    );
                }
            }
            if !spans.is_empty() {
                current = replace_spans(&current, &spans, idx, &mut restore_map);
            }
        }

        ProtectResult {
            text: current,
            restore_map,
        }
    }
}

/// True when the match is one half of a hyphenated compound such as `Ad-free`. Compounds are
/// left to the dictionary and the backend as a whole word.
fn in_hyphen_compound(text: &str, start: usize, end: usize) -> bool {
    let word = |c: Option<char>| c.is_some_and(char::is_alphanumeric);
    let matched = &text[start..end];
    let mut before = text[..start].chars().rev();
    let mut after = text[end..].chars();
    (word(matched.chars().next()) && before.next() == Some('-') && word(before.next()))
        || (word(matched.chars().next_back()) && after.next() == Some('-') && word(after.next()))
}

/// Replaces `spans` (ascending, non-overlapping) right-to-left so earlier offsets stay valid.
fn replace_spans(
    text: &str,
    spans: &[(usize, usize)],
    term_idx: usize,
    restore_map: &mut HashMap<String, String>,
) -> String {
    let mut out = text.to_string();
    for &(start, end) in spans.iter().rev() {
        let token = keep_token(term_idx, start);
        restore_map.insert(token.clone(), text[start..end].to_string());
        out.replace_range(start..end, &token);
    }
    out
}

pub fn restore(text: &str, restore_map: &HashMap<String, String>) -> String {
    if restore_map.is_empty() || text.is_empty() {
        return text.to_string();
    }
    KEEP_RE
        .replace_all(text, |caps: &regex::Captures<'_>| {
            let tok = &caps[0];
            restore_map
                .get(tok)
                .cloned()
                .unwrap_or_else(|| tok.to_string())
        })
        .into_owned()
}

/// Placeholders from `restore_map` that no longer occur in `text`, in a stable order.
pub fn missing_tokens(text: &str, restore_map: &HashMap<String, String>) -> Vec<String> {
    let mut missing: Vec<String> = restore_map
        .keys()
        .filter(|tok| !text.contains(tok.as_str()))
        .cloned()
        .collect();
    missing.sort();
    missing
}
