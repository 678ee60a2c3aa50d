use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::Parser;
use tracing::{info, warn};

use record_localizer::models::anthropic::{AnthropicSettings, AnthropicTranslator};
use record_localizer::pipeline::{init_default_config, PipelineConfig, RunArgs, TranslatorPipeline};
use record_localizer::store::{AirtableSettings, AirtableStore};

#[derive(Parser, Debug)]
#[command(name = "record-localizer")]
#[command(
    about = "Translate content records into a target language, keeping product terms intact",
    long_about = None
)]
struct Args {
    /// Generate default config + prompt file, then exit
    #[arg(long)]
    init_config: bool,

    /// Directory to write config/prompt files (default: current directory)
    #[arg(long, value_name = "DIR")]
    init_config_dir: Option<PathBuf>,

    /// Overwrite existing config/prompt files when used with --init-config
    #[arg(long)]
    force: bool,

    /// Target language code (e.g. nl, pt)
    #[arg(long, required_unless_present = "init_config")]
    lang: Option<String>,

    /// Process only this field (a text field or the plan field)
    #[arg(long)]
    field: Option<String>,

    /// Config file path (default: search for record-localizer.toml upwards)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Strip backend artifacts from existing translations instead of translating
    #[arg(long)]
    clean_only: bool,

    /// Do everything except writing to the record store and the checkpoint
    #[arg(long)]
    dry_run: bool,
}

fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("record_localizer=info".parse()?),
        )
        .init();

    let args = Args::parse();

    if args.init_config {
        let dir = args
            .init_config_dir
            .clone()
            .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));
        let cfg_path = init_default_config(&dir, args.force).context("init default config")?;
        eprintln!("Wrote config: {}", cfg_path.display());
        return Ok(());
    }

    let run_args = RunArgs {
        lang: args.lang.clone().unwrap_or_default(),
        field: args.field.clone(),
        config: args.config.clone(),
        clean_only: args.clean_only,
        dry_run: args.dry_run,
    };
    let cfg = PipelineConfig::load(&run_args).context("build config")?;

    let store_cfg = &cfg.store;
    let store = AirtableStore::new(AirtableSettings {
        api_url: store_cfg.api_url.clone(),
        base_id: required_env(&store_cfg.base_id_env)?,
        table: store_cfg.table.clone(),
        token: required_env(&store_cfg.token_env)?,
        page_size: store_cfg.page_size,
        timeout: store_cfg.timeout,
    })?;

    let needs_translator = !cfg.clean_only && !cfg.text_fields.is_empty();
    let api_key = std::env::var(&cfg.translator.api_key_env)
        .ok()
        .filter(|k| !k.trim().is_empty());
    let translator = match api_key {
        Some(api_key) => Some(AnthropicTranslator::new(AnthropicSettings {
            api_url: cfg.translator.api_url.clone(),
            api_key,
            model: cfg.translator.model.clone(),
            max_tokens: cfg.translator.max_tokens,
            timeout: cfg.translator.timeout,
            source_lang: cfg.source_lang.clone(),
            prompt: cfg.translator.prompt.clone(),
        })?),
        None if needs_translator => {
            bail!("{} must be set to translate text fields", cfg.translator.api_key_env)
        }
        None => None,
    };

    info!(
        lang = %cfg.language.code,
        source = %cfg.source_lang,
        fields = ?cfg.text_fields,
        plans = ?cfg.plan_field,
        clean_only = cfg.clean_only,
        dry_run = cfg.dry_run,
        "starting"
    );
    let mut pipeline = TranslatorPipeline::new(cfg, store, translator)?;
    let summary = pipeline.run()?;
    print!("{}", summary.render());
    if summary.errored > 0 {
        warn!(errored = summary.errored, "some fields failed");
        std::process::exit(1);
    }
    Ok(())
}

fn required_env(name: &str) -> anyhow::Result<String> {
    std::env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .with_context(|| format!("{name} must be set"))
}
