use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context};

pub const DEFAULT_PROMPTS_DIR: &str = "prompts";
pub const DEFAULT_TRANSLATE_PROMPT_FILE: &str = "translate.txt";

pub const DEFAULT_TRANSLATE_PROMPT: &str = r#"Translate the following {{source_lang}} text into {{target_lang}}.

Rules:
- Reply with the translation ONLY: no explanation, no notes, no questions.
- Do NOT add lines such as "Here is the translation:" or "[Note: ...]".
- Do NOT omit content; do NOT summarize.
- Keep all formatting and structure (paragraphs, lists, markdown, line breaks).
- Tokens like <<MT_KEEP:0001:000042>> are protected terms: copy them exactly, unchanged.

Text to translate:

{{text}}"#;

/// Replaces `{{name}}` markers with their values.
pub fn render_template(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = template.to_string();
    for (k, v) in vars {
        let pat = format!("{{{{{k}}}}}");
        out = out.replace(&pat, v);
    }
    out
}

/// Loads the translate prompt. Without a configured path the built-in template is used; a
/// configured file must exist.
pub fn load_translate_prompt(
    config_path: &Path,
    configured: Option<&str>,
) -> anyhow::Result<String> {
    let Some(rel) = configured.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(DEFAULT_TRANSLATE_PROMPT.to_string());
    };
    let config_dir = config_path.parent().unwrap_or_else(|| Path::new("."));
    let mut p = PathBuf::from(rel);
    if p.is_relative() {
        p = config_dir.join(&p);
    }
    if !p.exists() {
        return Err(anyhow!(
            "prompt file not found: {} (run: record-localizer --init-config)",
            p.display()
        ));
    }
    let text = std::fs::read_to_string(&p)
        .with_context(|| format!("read prompt: {}", p.display()))?;
    let text = text.trim_start_matches('\u{FEFF}').to_string();
    if !text.contains("{{text}}") {
        return Err(anyhow!("prompt {} has no {{{{text}}}} marker", p.display()));
    }
    Ok(text)
}
