use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context};
use tracing::{info, warn};

use crate::cleaner::{ArtifactCleaner, DEFAULT_POSTAMBLE_PATTERNS, DEFAULT_PREAMBLE_PATTERNS};
use crate::config::{
    find_default_config, load_config, AppConfig, CleanerSection, LanguageSection,
    PipelineSection, RecordsSection, StoreSection, TranslatorSection,
};
use crate::freezer::TermGuard;
use crate::plans::FieldPolicy;
use crate::quality::IdempotenceGate;
use crate::terminology::TermDictionary;
use crate::textutil::lang_label;

use super::prompts::{
    load_translate_prompt, DEFAULT_PROMPTS_DIR, DEFAULT_TRANSLATE_PROMPT,
    DEFAULT_TRANSLATE_PROMPT_FILE,
};
use super::vocab::{builtin_language, BUILTIN_LANGUAGES};

pub const CONFIG_FILENAME: &str = "record-localizer.toml";
pub const CONFIG_ENV: &str = "RECORD_LOCALIZER_CONFIG";

const DEFAULT_SOURCE_LANG: &str = "en";
const DEFAULT_MAX_CHUNK_CHARS: usize = 9000;
const DEFAULT_MIN_LENGTH_RATIO: f64 = 0.8;
const DEFAULT_MIN_ABSOLUTE_LENGTH: usize = 1;
const DEFAULT_SHORT_RESULT_RATIO: f64 = 0.3;
const DEFAULT_THROTTLE_MS: u64 = 2000;
const DEFAULT_TRACE_DIR: &str = "_trace";
const DEFAULT_LOG_MAX_CHARS: usize = 120;

const DEFAULT_KEY_FIELD: &str = "slug (from companion)";
const DEFAULT_LANG_FIELD: &str = "language";
const DEFAULT_TEXT_FIELDS: &[&str] = &["my_verdict", "body_text"];
const DEFAULT_PLAN_FIELD: &str = "pricing_plans";

const DEFAULT_STORE_URL: &str = "https://api.airtable.com/v0";
const DEFAULT_TABLE: &str = "Companion_Translations";
const DEFAULT_BASE_ID_ENV: &str = "AIRTABLE_BASE_ID_CG";
const DEFAULT_TOKEN_ENV: &str = "AIRTABLE_TOKEN_CG";
const DEFAULT_PAGE_SIZE: usize = 100;
const DEFAULT_STORE_TIMEOUT_SECS: u64 = 30;

const DEFAULT_TRANSLATOR_URL: &str = "https://api.anthropic.com/v1/messages";
const DEFAULT_API_KEY_ENV: &str = "ANTHROPIC_API_KEY";
const DEFAULT_MODEL: &str = "claude-3-5-sonnet-20241022";
const DEFAULT_MAX_TOKENS: u32 = 8000;
const DEFAULT_TRANSLATOR_TIMEOUT_SECS: u64 = 300;

/// Command-line choices that shape a run.
#[derive(Clone, Debug, Default)]
pub struct RunArgs {
    pub lang: String,
    pub field: Option<String>,
    pub config: Option<PathBuf>,
    pub clean_only: bool,
    pub dry_run: bool,
}

/// Immutable per-language vocabulary shared by every component of a run.
#[derive(Clone, Debug)]
pub struct LanguageProfile {
    pub code: String,
    pub name: String,
    pub guard: TermGuard,
    pub dictionary: TermDictionary,
}

impl LanguageProfile {
    pub fn from_section(code: &str, section: &LanguageSection) -> anyhow::Result<Self> {
        let guard = TermGuard::new(&section.protected_terms)
            .with_context(|| format!("protected terms for {code}"))?;
        let dictionary = TermDictionary::new(section.dictionary.iter().cloned())
            .with_context(|| format!("dictionary for {code}"))?;
        Ok(Self {
            code: code.to_string(),
            name: section
                .name
                .clone()
                .unwrap_or_else(|| lang_label(code)),
            guard,
            dictionary,
        })
    }
}

#[derive(Clone, Debug)]
pub struct StoreConfig {
    pub api_url: String,
    pub table: String,
    pub base_id_env: String,
    pub token_env: String,
    pub page_size: usize,
    pub timeout: Duration,
}

#[derive(Clone, Debug)]
pub struct TranslatorConfig {
    pub api_url: String,
    pub api_key_env: String,
    pub model: String,
    pub max_tokens: u32,
    pub timeout: Duration,
    pub prompt: String,
}

#[derive(Clone, Debug)]
pub struct PipelineConfig {
    pub config_path: PathBuf,

    pub source_lang: String,
    pub language: LanguageProfile,
    pub clean_only: bool,
    pub dry_run: bool,

    pub key_field: String,
    pub lang_field: String,
    pub text_fields: Vec<String>,
    pub plan_field: Option<String>,
    pub plan_policy: FieldPolicy,

    pub max_chunk_chars: usize,
    pub gate: IdempotenceGate,
    pub throttle: Duration,
    pub cleaner: ArtifactCleaner,

    pub trace_dir: PathBuf,
    pub trace_enabled: bool,
    pub checkpoint: Option<PathBuf>,
    pub log_max_chars: usize,

    pub store: StoreConfig,
    pub translator: TranslatorConfig,
}

impl PipelineConfig {
    /// Locates and reads the config file (`--config`, then the env var, then an upward search
    /// from the working directory), then applies `args`.
    pub fn load(args: &RunArgs) -> anyhow::Result<Self> {
        let workdir = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        let cfg_file = args
            .config
            .clone()
            .or_else(|| std::env::var(CONFIG_ENV).ok().map(PathBuf::from))
            .or_else(|| find_default_config(&workdir, CONFIG_FILENAME));

        let mut file_cfg = AppConfig::default();
        if let Some(p) = cfg_file.as_ref() {
            if p.exists() {
                file_cfg = load_config(p)?;
                info!(config = %p.display(), "loaded config");
            } else if args.config.is_some() {
                bail!("config file not found: {}", p.display());
            }
        }
        let cfg_path = cfg_file.unwrap_or_else(|| workdir.join(CONFIG_FILENAME));
        Self::from_app_config(&file_cfg, &cfg_path, args)
    }

    pub fn from_app_config(
        cfg: &AppConfig,
        config_path: &Path,
        args: &RunArgs,
    ) -> anyhow::Result<Self> {
        let config_dir = config_path.parent().unwrap_or_else(|| Path::new("."));
        let p = &cfg.pipeline;
        let r = &cfg.records;

        let source_lang = p
            .source_lang
            .clone()
            .unwrap_or_else(|| DEFAULT_SOURCE_LANG.to_string())
            .to_ascii_lowercase();
        let target = args.lang.trim().to_ascii_lowercase();
        if target.is_empty() {
            bail!("target language is required (--lang)");
        }
        if target == source_lang {
            bail!("target language {target} is the source language");
        }

        let language = match cfg.languages.get(&target) {
            Some(section) => LanguageProfile::from_section(&target, section)?,
            None => match builtin_language(&target) {
                Some(section) => LanguageProfile::from_section(&target, &section)?,
                None => {
                    warn!(
                        lang = %target,
                        "no vocabulary configured; protected terms and dictionary are empty"
                    );
                    LanguageProfile::from_section(&target, &LanguageSection::default())?
                }
            },
        };

        let mut text_fields: Vec<String> = r
            .text_fields
            .clone()
            .unwrap_or_else(|| DEFAULT_TEXT_FIELDS.iter().map(|s| s.to_string()).collect());
        let mut plan_field = r
            .plan_field
            .clone()
            .or_else(|| Some(DEFAULT_PLAN_FIELD.to_string()))
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        if let Some(only) = args.field.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            if plan_field.as_deref() == Some(only) {
                text_fields.clear();
            } else {
                text_fields = vec![only.to_string()];
                plan_field = None;
            }
        }
        if args.clean_only {
            // Plan lists are dictionary-translated and carry no backend artifacts.
            plan_field = None;
        }

        let gate = IdempotenceGate::new(
            p.min_length_ratio.unwrap_or(DEFAULT_MIN_LENGTH_RATIO),
            p.min_absolute_length.unwrap_or(DEFAULT_MIN_ABSOLUTE_LENGTH),
            p.short_result_ratio.unwrap_or(DEFAULT_SHORT_RESULT_RATIO),
        );

        let cleaner = build_cleaner(&cfg.cleaner)?;

        let trace_dir = p
            .trace_dir
            .clone()
            .unwrap_or_else(|| DEFAULT_TRACE_DIR.to_string());
        let trace_dir = resolve_path(config_dir, &trace_dir);
        let checkpoint = p
            .checkpoint
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| resolve_path(config_dir, s));

        let s = &cfg.store;
        let store = StoreConfig {
            api_url: s.api_url.clone().unwrap_or_else(|| DEFAULT_STORE_URL.to_string()),
            table: s.table.clone().unwrap_or_else(|| DEFAULT_TABLE.to_string()),
            base_id_env: s.base_id_env.clone().unwrap_or_else(|| DEFAULT_BASE_ID_ENV.to_string()),
            token_env: s.token_env.clone().unwrap_or_else(|| DEFAULT_TOKEN_ENV.to_string()),
            page_size: s.page_size.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, 100),
            timeout: Duration::from_secs(s.timeout_secs.unwrap_or(DEFAULT_STORE_TIMEOUT_SECS)),
        };

        let t = &cfg.translator;
        let translator = TranslatorConfig {
            api_url: t.api_url.clone().unwrap_or_else(|| DEFAULT_TRANSLATOR_URL.to_string()),
            api_key_env: t.api_key_env.clone().unwrap_or_else(|| DEFAULT_API_KEY_ENV.to_string()),
            model: t.model.clone().unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            max_tokens: t.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS).max(1),
            timeout: Duration::from_secs(t.timeout_secs.unwrap_or(DEFAULT_TRANSLATOR_TIMEOUT_SECS)),
            prompt: load_translate_prompt(config_path, t.prompt.as_deref()).context("load prompt")?,
        };

        Ok(Self {
            config_path: config_path.to_path_buf(),
            source_lang,
            language,
            clean_only: args.clean_only,
            dry_run: args.dry_run,
            key_field: r.key_field.clone().unwrap_or_else(|| DEFAULT_KEY_FIELD.to_string()),
            lang_field: r.lang_field.clone().unwrap_or_else(|| DEFAULT_LANG_FIELD.to_string()),
            text_fields,
            plan_field,
            plan_policy: FieldPolicy::with_overrides(&r.plan_policy),
            max_chunk_chars: p.max_chunk_chars.unwrap_or(DEFAULT_MAX_CHUNK_CHARS).max(1),
            gate,
            throttle: Duration::from_millis(p.throttle_ms.unwrap_or(DEFAULT_THROTTLE_MS)),
            cleaner,
            trace_dir,
            trace_enabled: p.trace_enabled.unwrap_or(false),
            checkpoint,
            log_max_chars: p.log_max_chars.unwrap_or(DEFAULT_LOG_MAX_CHARS),
            store,
            translator,
        })
    }
}

fn build_cleaner(section: &CleanerSection) -> anyhow::Result<ArtifactCleaner> {
    let owned = |d: &[&str]| d.iter().map(|s| s.to_string()).collect::<Vec<_>>();
    let preamble = section
        .preamble_patterns
        .clone()
        .unwrap_or_else(|| owned(DEFAULT_PREAMBLE_PATTERNS));
    let postamble = section
        .postamble_patterns
        .clone()
        .unwrap_or_else(|| owned(DEFAULT_POSTAMBLE_PATTERNS));
    ArtifactCleaner::new(&preamble, &postamble).context("compile cleaner patterns")
}

fn resolve_path(base: &Path, p: &str) -> PathBuf {
    let p = PathBuf::from(p);
    if p.is_relative() {
        base.join(p)
    } else {
        p
    }
}

/// A config with every option spelled out at its default value.
pub fn default_app_config() -> AppConfig {
    let languages = BUILTIN_LANGUAGES
        .iter()
        .filter_map(|code| builtin_language(code).map(|l| (code.to_string(), l)))
        .collect();
    AppConfig {
        pipeline: PipelineSection {
            source_lang: Some(DEFAULT_SOURCE_LANG.to_string()),
            max_chunk_chars: Some(DEFAULT_MAX_CHUNK_CHARS),
            min_length_ratio: Some(DEFAULT_MIN_LENGTH_RATIO),
            min_absolute_length: Some(DEFAULT_MIN_ABSOLUTE_LENGTH),
            short_result_ratio: Some(DEFAULT_SHORT_RESULT_RATIO),
            throttle_ms: Some(DEFAULT_THROTTLE_MS),
            trace_dir: Some(DEFAULT_TRACE_DIR.to_string()),
            trace_enabled: Some(false),
            checkpoint: None,
            log_max_chars: Some(DEFAULT_LOG_MAX_CHARS),
        },
        records: RecordsSection {
            key_field: Some(DEFAULT_KEY_FIELD.to_string()),
            lang_field: Some(DEFAULT_LANG_FIELD.to_string()),
            text_fields: Some(DEFAULT_TEXT_FIELDS.iter().map(|s| s.to_string()).collect()),
            plan_field: Some(DEFAULT_PLAN_FIELD.to_string()),
            plan_policy: Default::default(),
        },
        store: StoreSection {
            api_url: Some(DEFAULT_STORE_URL.to_string()),
            table: Some(DEFAULT_TABLE.to_string()),
            base_id_env: Some(DEFAULT_BASE_ID_ENV.to_string()),
            token_env: Some(DEFAULT_TOKEN_ENV.to_string()),
            page_size: Some(DEFAULT_PAGE_SIZE),
            timeout_secs: Some(DEFAULT_STORE_TIMEOUT_SECS),
        },
        translator: TranslatorSection {
            api_url: Some(DEFAULT_TRANSLATOR_URL.to_string()),
            api_key_env: Some(DEFAULT_API_KEY_ENV.to_string()),
            model: Some(DEFAULT_MODEL.to_string()),
            max_tokens: Some(DEFAULT_MAX_TOKENS),
            timeout_secs: Some(DEFAULT_TRANSLATOR_TIMEOUT_SECS),
            prompt: Some(format!("{DEFAULT_PROMPTS_DIR}/{DEFAULT_TRANSLATE_PROMPT_FILE}")),
        },
        cleaner: CleanerSection {
            preamble_patterns: Some(
                DEFAULT_PREAMBLE_PATTERNS.iter().map(|s| s.to_string()).collect(),
            ),
            postamble_patterns: Some(
                DEFAULT_POSTAMBLE_PATTERNS.iter().map(|s| s.to_string()).collect(),
            ),
        },
        languages,
    }
}

const CONFIG_HEADER: &str = "# record-localizer configuration.
# Secrets are read from the environment variables named in [store] and [translator]
# (a .env file in the working directory is loaded first).
# Plan-field rules can be extended under [records.plan_policy] with
# \"pass\", \"translate\" or \"translate_each\".

";

/// Writes the default config and prompt file into `dir`. Existing files are kept unless `force`.
pub fn init_default_config(dir: &Path, force: bool) -> anyhow::Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("create config dir: {}", dir.display()))?;
    let cfg_path = dir.join(CONFIG_FILENAME);

    let prompts_dir = dir.join(DEFAULT_PROMPTS_DIR);
    std::fs::create_dir_all(&prompts_dir)
        .with_context(|| format!("create prompts dir: {}", prompts_dir.display()))?;
    let prompt_path = prompts_dir.join(DEFAULT_TRANSLATE_PROMPT_FILE);
    if !prompt_path.exists() || force {
        std::fs::write(&prompt_path, DEFAULT_TRANSLATE_PROMPT)
            .with_context(|| format!("write prompt: {}", prompt_path.display()))?;
    }

    if cfg_path.exists() && !force {
        return Ok(cfg_path);
    }
    let body = toml::to_string_pretty(&default_app_config()).context("serialize default config")?;
    let mut cfg_text = String::from(CONFIG_HEADER);
    cfg_text.push_str(&body);
    std::fs::write(&cfg_path, cfg_text)
        .with_context(|| format!("write config: {}", cfg_path.display()))?;
    Ok(cfg_path)
}
