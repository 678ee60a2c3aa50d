use anyhow::Context;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::freezer::{restore, TermGuard};
use crate::sentinels::{split_keep_tokens, Span};
use crate::textutil::{char_len, word_bounded};

/// One configured `source => target` pair.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermPair(pub String, pub String);

#[derive(Clone, Debug)]
struct TermEntry {
    src: String,
    tgt: String,
    pattern: Regex,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CasePattern {
    Upper,
    Capitalized,
    Lower,
    Mixed,
}

pub fn detect_case(s: &str) -> CasePattern {
    let cased: Vec<char> = s
        .chars()
        .filter(|c| c.is_uppercase() || c.is_lowercase())
        .collect();
    let Some((first, rest)) = cased.split_first() else {
        return CasePattern::Mixed;
    };
    if cased.len() > 1 && cased.iter().all(|c| c.is_uppercase()) {
        CasePattern::Upper
    } else if first.is_uppercase() && rest.iter().all(|c| c.is_lowercase()) {
        CasePattern::Capitalized
    } else if cased.iter().all(|c| c.is_lowercase()) {
        CasePattern::Lower
    } else {
        CasePattern::Mixed
    }
}

pub fn apply_case(target: &str, case: CasePattern) -> String {
    match case {
        CasePattern::Upper => target.to_uppercase(),
        CasePattern::Lower => target.to_lowercase(),
        CasePattern::Capitalized => {
            let mut chars = target.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        }
        CasePattern::Mixed => target.to_string(),
    }
}

/// Case-preserving phrase substitution, longest source phrase first.
#[derive(Clone, Debug, Default)]
pub struct TermDictionary {
    entries: Vec<TermEntry>,
}

impl TermDictionary {
    pub fn new(pairs: impl IntoIterator<Item = TermPair>) -> anyhow::Result<Self> {
        let mut entries: Vec<TermEntry> = Vec::new();
        for TermPair(src, tgt) in pairs {
            let src = src.trim();
            let tgt = tgt.trim();
            if src.is_empty() || tgt.is_empty() {
                continue;
            }
            // A phrase with whitespace cannot straddle an unrelated word, so plain substring
            // matching is enough; single words need boundaries ("chat" vs "chatbot").
            let body = if src.chars().any(char::is_whitespace) {
                regex::escape(src)
            } else {
                word_bounded(src)
            };
            let pattern = Regex::new(&format!("(?i){body}"))
                .with_context(|| format!("dictionary pattern: {src}"))?;
            entries.push(TermEntry {
                src: src.to_string(),
                tgt: tgt.to_string(),
                pattern,
            });
        }
        entries.sort_by_key(|e| std::cmp::Reverse(char_len(&e.src)));
        Ok(Self { entries })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Substitutes every entry in `text`. Placeholders and already-substituted targets are locked,
    /// so shorter entries never rewrite them.
    pub fn translate(&self, text: &str) -> String {
        if self.entries.is_empty() || text.is_empty() {
            return text.to_string();
        }

        let mut pieces: Vec<(String, bool)> = split_keep_tokens(text)
            .into_iter()
            .map(|span| match span {
                Span::Plain { text, .. } => (text.to_string(), false),
                Span::Token { text, .. } => (text.to_string(), true),
            })
            .collect();

        for entry in &self.entries {
            let mut next: Vec<(String, bool)> = Vec::with_capacity(pieces.len());
            for (piece, locked) in pieces {
                if locked || !entry.pattern.is_match(&piece) {
                    next.push((piece, locked));
                    continue;
                }
                let mut pos = 0usize;
                for m in entry.pattern.find_iter(&piece) {
                    if m.start() > pos {
                        next.push((piece[pos..m.start()].to_string(), false));
                    }
                    next.push((apply_case(&entry.tgt, detect_case(m.as_str())), true));
                    pos = m.end();
                }
                if pos < piece.len() {
                    next.push((piece[pos..].to_string(), false));
                }
            }
            pieces = next;
        }

        pieces.into_iter().map(|(piece, _)| piece).collect()
    }
}

/// Dictionary substitution with the protected vocabulary shielded for the duration of the pass.
pub struct GuardedDictionary<'a> {
    pub guard: &'a TermGuard,
    pub dictionary: &'a TermDictionary,
}

impl GuardedDictionary<'_> {
    pub fn translate(&self, text: &str) -> String {
        let protected = self.guard.protect(text);
        let translated = self.dictionary.translate(&protected.text);
        restore(&translated, &protected.restore_map)
    }
}
