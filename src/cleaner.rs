use anyhow::Context;
use once_cell::sync::Lazy;
use regex::Regex;

static BLANK_RUN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").expect("blank run regex"));

/// Openers a generative backend puts in front of the actual translation.
pub const DEFAULT_PREAMBLE_PATTERNS: &[&str] = &[
    r"\s*(?:(?:sure|certainly|of course)[!,.]?\s+)?here(?:'s|’s| is) (?:the|your|a) (?:[\p{L}-]+ )?translation[^\n:]*:[ \t]*\n*",
    r"\s*hier is de (?:nederlandse )?vertaling[^\n:]*:[ \t]*\n*",
    r"\s*aqui está a tradução[^\n:]*:[ \t]*\n*",
];

/// Closing notes, continuation offers and truncation caveats.
pub const DEFAULT_POSTAMBLE_PATTERNS: &[&str] = &[
    r"\n*\[note:[^\]]*\]",
    r"\n*\[continu[^\]]*\]",
    r"\n*\[would you like[^\]]*\]",
    r"\n*\[bericht me[^\]]*\]",
    r"\n*(?:note: )?would you like me to continue[^\n]*",
    r"\n*i can do it in parts if you prefer[^\n]*",
    r"\n*due to length limitations[^\n]*",
    r"\n*continued translation follows[^\n]*",
];

/// Strips backend preamble/postamble noise. `clean` is idempotent.
#[derive(Clone, Debug)]
pub struct ArtifactCleaner {
    preamble: Vec<Regex>,
    postamble: Vec<Regex>,
}

impl Default for ArtifactCleaner {
    fn default() -> Self {
        let preamble = owned(DEFAULT_PREAMBLE_PATTERNS);
        let postamble = owned(DEFAULT_POSTAMBLE_PATTERNS);
        Self::new(&preamble, &postamble).expect("default cleaner patterns")
    }
}

impl ArtifactCleaner {
    /// Patterns are compiled case-insensitively; preamble patterns are anchored to the start of
    /// the text, postamble patterns to the end (trailing whitespace allowed).
    pub fn new(preamble: &[String], postamble: &[String]) -> anyhow::Result<Self> {
        let preamble = preamble
            .iter()
            .map(|p| {
                Regex::new(&format!(r"(?i)\A(?:{p})"))
                    .with_context(|| format!("preamble pattern: {p}"))
            })
            .collect::<anyhow::Result<Vec<_>>>()?;
        let postamble = postamble
            .iter()
            .map(|p| {
                Regex::new(&format!(r"(?i)(?:{p})\s*\z"))
                    .with_context(|| format!("postamble pattern: {p}"))
            })
            .collect::<anyhow::Result<Vec<_>>>()?;
        Ok(Self {
            preamble,
            postamble,
        })
    }

    pub fn clean(&self, text: &str) -> String {
        let mut current = text.to_string();
        loop {
            let next = self.clean_once(&current);
            if next == current {
                return next;
            }
            current = next;
        }
    }

    // One ordered round. Removing one artifact can expose another, which is why `clean` repeats
    // rounds until nothing changes.
    fn clean_once(&self, text: &str) -> String {
        let mut s = text.to_string();
        for re in &self.preamble {
            if let Some(end) = re.find(&s).map(|m| m.end()) {
                s.replace_range(..end, "");
            }
        }
        for re in &self.postamble {
            if let Some(start) = re.find(&s).map(|m| m.start()) {
                s.truncate(start);
            }
        }
        let s = BLANK_RUN_RE.replace_all(&s, "\n\n");
        s.trim().to_string()
    }
}

fn owned(patterns: &[&str]) -> Vec<String> {
    patterns.iter().map(|p| p.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_preamble_and_note() {
        let c = ArtifactCleaner::default();
        let raw = "Here's the Dutch translation:\n\nOnbeperkt berichten.\n\n[Note: continued in next message]";
        assert_eq!(c.clean(raw), "Onbeperkt berichten.");
    }

    #[test]
    fn stacked_artifacts_are_removed_in_one_call() {
        let c = ArtifactCleaner::default();
        let raw = "Sure! Here is the translation into Dutch:\n\nTekst.\n\n[Note: a]\n[Continue below]\n\nWould you like me to continue?";
        assert_eq!(c.clean(raw), "Tekst.");
    }

    #[test]
    fn clean_is_idempotent() {
        let c = ArtifactCleaner::default();
        let samples = [
            "",
            "   ",
            "plain text",
            "Hier is de Nederlandse vertaling:\nA\n\n\n\nB",
            "A [Note: inline] B",
            "text\n\n[Note: x]\n\n[Would you like more?]   \n",
            "Here is your translation:\nHere's the translation:\nX\n\n\n",
            "Due to length limitations I stopped.\nreal\ncontent\nDue to length limitations, part 2 follows.",
        ];
        for s in samples {
            let once = c.clean(s);
            assert_eq!(c.clean(&once), once, "sample: {s:?}");
        }
    }

    #[test]
    fn mid_text_notes_are_kept() {
        let c = ArtifactCleaner::default();
        assert_eq!(c.clean("A [Note: inline] B"), "A [Note: inline] B");
    }

    #[test]
    fn blank_runs_collapse_to_one_empty_line() {
        let c = ArtifactCleaner::new(&[], &[]).unwrap();
        assert_eq!(c.clean("\n\nA\n\n\n\n\nB\n"), "A\n\nB");
    }

    #[test]
    fn invalid_pattern_is_reported() {
        assert!(ArtifactCleaner::new(&["(".to_string()], &[]).is_err());
    }

    use proptest::prelude::*;

    fn artifact_text() -> impl Strategy<Value = String> {
        let piece = prop_oneof![
            Just("Here's the Dutch translation:\n\n".to_string()),
            Just("Sure! Here is your translation:\n".to_string()),
            Just("Hier is de vertaling:".to_string()),
            Just("\n\n[Note: continued in next message]".to_string()),
            Just("[Continue below]".to_string()),
            Just("\nWould you like me to continue?".to_string()),
            Just("\n\n\n".to_string()),
            "[a-zA-Z .,:\\[\\]]{0,15}",
            "\\PC{0,10}",
        ];
        proptest::collection::vec(piece, 0..8).prop_map(|parts| parts.concat())
    }

    proptest! {
        #[test]
        fn prop_clean_is_idempotent(text in artifact_text()) {
            let c = ArtifactCleaner::default();
            let once = c.clean(&text);
            prop_assert_eq!(c.clean(&once), once);
        }
    }
}
