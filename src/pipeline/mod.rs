mod checkpoint;
mod config;
mod prompts;
mod trace;
mod translator;
mod vocab;

pub use checkpoint::{checkpoint_key, source_digest, Checkpoint};
pub use config::{
    default_app_config, init_default_config, LanguageProfile, PipelineConfig, RunArgs,
    StoreConfig, TranslatorConfig, CONFIG_ENV, CONFIG_FILENAME,
};
pub use prompts::{render_template, DEFAULT_TRANSLATE_PROMPT};
pub use translator::{
    FieldOutcome, FieldReport, FieldState, RunSummary, SkipReason, TranslatorPipeline,
};
pub use vocab::{builtin_language, PROTECTED_TERMS};
