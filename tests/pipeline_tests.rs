use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;

use serde_json::{json, Value};

use record_localizer::config::AppConfig;
use record_localizer::errors::PipelineError;
use record_localizer::ir::Record;
use record_localizer::models::Translator;
use record_localizer::pipeline::{
    FieldOutcome, FieldState, PipelineConfig, RunArgs, SkipReason, TranslatorPipeline,
};
use record_localizer::store::MemoryStore;

const SOURCE_TEXT: &str =
    "This AI Companion offers unlimited chat.\n\nIt remembers every conversation.";
const DUTCH_TEXT: &str = "Deze AI Companion biedt onbeperkt gesprek.\n\nHet onthoudt elk gesprek.";
const PLANS: &str = r#"[{"name":"Free","price":0,"period":"monthly","features":["Unlimited AI chat","No ads"]}]"#;

const BASE_CONFIG: &str = r#"
[pipeline]
throttle_ms = 0
min_absolute_length = 10

[records]
key_field = "slug"
text_fields = ["my_verdict"]
plan_field = "pricing_plans"

[languages.nl]
protected_terms = ["AI Companion", "AI chat"]
dictionary = [
  ["monthly", "maandelijks"],
  ["No ads", "Geen advertenties"],
  ["chat", "gesprek"],
]
"#;

type Script = Box<dyn FnMut(usize, &str) -> anyhow::Result<String>>;

struct ScriptedTranslator {
    script: Script,
    calls: Rc<RefCell<Vec<String>>>,
}

impl ScriptedTranslator {
    fn new(script: Script) -> (Self, Rc<RefCell<Vec<String>>>) {
        let calls = Rc::new(RefCell::new(Vec::new()));
        (
            Self {
                script,
                calls: Rc::clone(&calls),
            },
            calls,
        )
    }

    fn chatty() -> (Self, Rc<RefCell<Vec<String>>>) {
        Self::new(Box::new(|_, text| Ok(chatty_dutch(text))))
    }
}

impl Translator for ScriptedTranslator {
    fn name(&self) -> &str {
        "scripted"
    }

    fn translate(&mut self, text: &str, target_lang: &str) -> anyhow::Result<String> {
        assert_eq!(target_lang, "nl");
        let n = {
            let mut calls = self.calls.borrow_mut();
            calls.push(text.to_string());
            calls.len()
        };
        (self.script)(n, text)
    }
}

/// Word-level "translation" wrapped in the kind of noise a chat backend adds.
fn chatty_dutch(text: &str) -> String {
    let body = text
        .replace("This ", "Deze ")
        .replace("offers", "biedt")
        .replace("unlimited", "onbeperkt")
        .replace("It remembers every conversation.", "Het onthoudt elk gesprek.")
        .replace("chat", "gesprek");
    format!("Here's the Dutch translation:\n\n{body}\n\n[Note: continued in next message]")
}

fn record(id: &str, fields: Value) -> Record {
    let Value::Object(fields) = fields else {
        panic!("fields must be an object")
    };
    Record::new(id, fields)
}

fn luna_records() -> Vec<Record> {
    vec![
        record(
            "en1",
            json!({"slug": "luna", "language": "en", "my_verdict": SOURCE_TEXT, "pricing_plans": PLANS}),
        ),
        record(
            "nl1",
            json!({"slug": ["luna"], "language": "nl", "my_verdict": "", "pricing_plans": PLANS}),
        ),
        record("pt1", json!({"slug": ["luna"], "language": "pt", "my_verdict": ""})),
    ]
}

fn config_with(dir: &Path, extra: &str, args: RunArgs) -> PipelineConfig {
    let app: AppConfig = toml::from_str(&format!("{BASE_CONFIG}\n{extra}")).unwrap();
    PipelineConfig::from_app_config(&app, &dir.join("record-localizer.toml"), &args).unwrap()
}

fn nl_args() -> RunArgs {
    RunArgs {
        lang: "nl".into(),
        ..RunArgs::default()
    }
}

fn config(dir: &Path) -> PipelineConfig {
    config_with(dir, "", nl_args())
}

fn translated_plans() -> Value {
    json!([{"name":"Free","price":0,"period":"maandelijks","features":["Unlimited AI chat","Geen advertenties"]}])
}

fn stored_plans(store: &MemoryStore, id: &str) -> Value {
    let raw = store.record(id).unwrap().text("pricing_plans");
    serde_json::from_str(raw).unwrap()
}

fn new_pipeline(
    cfg: PipelineConfig,
    records: Vec<Record>,
    translator: Option<ScriptedTranslator>,
) -> TranslatorPipeline<MemoryStore, ScriptedTranslator> {
    TranslatorPipeline::new(cfg, MemoryStore::new(records), translator).unwrap()
}

#[test]
fn translates_text_and_plans_once() {
    let dir = tempfile::tempdir().unwrap();
    let (translator, calls) = ScriptedTranslator::chatty();
    let mut pipeline = new_pipeline(config(dir.path()), luna_records(), Some(translator));

    let summary = pipeline.run().unwrap();
    assert_eq!((summary.updated, summary.skipped, summary.errored), (2, 0, 0));

    let store = pipeline.into_store();
    let nl = store.record("nl1").unwrap();
    assert_eq!(nl.text("my_verdict"), DUTCH_TEXT);
    assert_eq!(stored_plans(&store, "nl1"), translated_plans());
    // Plans were stored as a JSON string and stay one.
    assert!(nl.get("pricing_plans").unwrap().is_string());
    // Source and other languages are never written.
    assert!(store.patches().iter().all(|(id, _)| id == "nl1"));
    assert_eq!(store.patches().len(), 2);

    // The protected phrase never reached the backend.
    assert_eq!(calls.borrow().len(), 1);
    assert!(!calls.borrow()[0].contains("AI Companion"));
    assert!(calls.borrow()[0].contains("<<MT_KEEP:"));
}

#[test]
fn second_run_changes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let (translator, _) = ScriptedTranslator::chatty();
    let mut first = new_pipeline(config(dir.path()), luna_records(), Some(translator));
    first.run().unwrap();
    let after_first: Vec<Record> = first.store().records().to_vec();

    let (translator, calls) = ScriptedTranslator::chatty();
    let mut second = new_pipeline(config(dir.path()), after_first.clone(), Some(translator));
    let summary = second.run().unwrap();

    assert_eq!((summary.updated, summary.skipped, summary.errored), (0, 2, 0));
    for report in &summary.details {
        assert_eq!(report.outcome, FieldOutcome::Skipped(SkipReason::AlreadyTranslated));
        assert_eq!(report.state, FieldState::Done);
    }
    assert!(calls.borrow().is_empty());
    let store = second.into_store();
    assert!(store.patches().is_empty());
    assert_eq!(store.records(), after_first.as_slice());
}

#[test]
fn failed_chunk_leaves_the_field_untouched() {
    let dir = tempfile::tempdir().unwrap();
    // The paragraphs do not fit one chunk together.
    let mut cfg = config(dir.path());
    cfg.max_chunk_chars = 45;
    let (translator, calls) = ScriptedTranslator::new(Box::new(|n, text| {
        if n == 2 {
            anyhow::bail!("upstream timeout")
        }
        Ok(chatty_dutch(text))
    }));
    let mut pipeline = new_pipeline(cfg, luna_records(), Some(translator));
    let summary = pipeline.run().unwrap();

    assert_eq!(calls.borrow().len(), 2);
    let report = summary.report_for("nl1", "my_verdict").unwrap();
    assert_eq!(report.state, FieldState::Failed);
    assert!(matches!(
        &report.outcome,
        FieldOutcome::Failed(PipelineError::ExternalTranslateFailure(msg))
            if msg.contains("upstream timeout")
    ));
    assert_eq!(summary.errored, 1);

    let store = pipeline.into_store();
    assert_eq!(store.record("nl1").unwrap().text("my_verdict"), "");
    assert!(store
        .patches()
        .iter()
        .all(|(_, fields)| !fields.contains_key("my_verdict")));
}

#[test]
fn oversized_paragraphs_are_sent_whole() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = config(dir.path());
    cfg.max_chunk_chars = 20;
    let (translator, calls) = ScriptedTranslator::chatty();
    let mut pipeline = new_pipeline(cfg, luna_records(), Some(translator));
    let summary = pipeline.run().unwrap();

    assert_eq!(calls.borrow().len(), 2);
    assert_eq!(
        summary.report_for("nl1", "my_verdict").unwrap().outcome,
        FieldOutcome::Updated
    );
    assert_eq!(
        pipeline.store().record("nl1").unwrap().text("my_verdict"),
        DUTCH_TEXT
    );
}

#[test]
fn dropped_placeholder_fails_the_field() {
    let dir = tempfile::tempdir().unwrap();
    let (translator, _) =
        ScriptedTranslator::new(Box::new(|_, _| Ok("Deze metgezel is geweldig.".to_string())));
    let mut pipeline = new_pipeline(config(dir.path()), luna_records(), Some(translator));
    let summary = pipeline.run().unwrap();

    let report = summary.report_for("nl1", "my_verdict").unwrap();
    assert!(matches!(
        &report.outcome,
        FieldOutcome::Failed(PipelineError::ExternalTranslateFailure(msg))
            if msg.contains("AI Companion")
    ));
    assert_eq!(pipeline.store().record("nl1").unwrap().text("my_verdict"), "");
}

#[test]
fn protected_phrase_survives_a_full_pass() {
    let dir = tempfile::tempdir().unwrap();
    let records = vec![
        record(
            "en1",
            json!({
                "slug": "luna",
                "language": "en",
                "my_verdict": "This AI Companion offers unlimited chat",
                "pricing_plans": [{"name": "Pro", "description": "This AI Companion offers unlimited chat"}]
            }),
        ),
        record("nl1", json!({"slug": "luna", "language": "nl"})),
    ];
    let (translator, _) = ScriptedTranslator::chatty();
    let mut pipeline = new_pipeline(config(dir.path()), records, Some(translator));
    let summary = pipeline.run().unwrap();
    assert_eq!(summary.updated, 2);

    let nl = pipeline.store().record("nl1").unwrap();
    assert_eq!(nl.text("my_verdict"), "Deze AI Companion biedt onbeperkt gesprek");
    // Native arrays are written back as native arrays.
    assert_eq!(
        nl.get("pricing_plans").unwrap(),
        &json!([{"name": "Pro", "description": "This AI Companion offers unlimited gesprek"}])
    );
}

#[test]
fn clean_only_patches_dirty_fields() {
    let dir = tempfile::tempdir().unwrap();
    let records = vec![
        record(
            "nl1",
            json!({
                "slug": "a",
                "language": "nl",
                "my_verdict": "Hier is de Nederlandse vertaling:\n\nGoede tekst.\n\n[Note: continued in next message]"
            }),
        ),
        record("nl2", json!({"slug": "b", "language": "nl", "my_verdict": "Al schoon."})),
        record("nl3", json!({"slug": "c", "language": "nl", "my_verdict": ""})),
        record("en1", json!({"slug": "a", "language": "en", "my_verdict": "Good text."})),
    ];
    let args = RunArgs {
        clean_only: true,
        ..nl_args()
    };
    let cfg = config_with(dir.path(), "", args);
    let mut pipeline = new_pipeline(cfg, records, None);
    let summary = pipeline.run().unwrap();

    assert_eq!((summary.updated, summary.skipped, summary.errored), (1, 2, 0));
    assert_eq!(
        summary.report_for("nl2", "my_verdict").unwrap().outcome,
        FieldOutcome::Skipped(SkipReason::Unchanged)
    );
    assert_eq!(
        summary.report_for("nl3", "my_verdict").unwrap().outcome,
        FieldOutcome::Skipped(SkipReason::EmptyTarget)
    );
    // Plans are not part of a clean-only run.
    assert!(summary.details.iter().all(|r| r.field == "my_verdict"));

    let store = pipeline.into_store();
    assert_eq!(store.patches().len(), 1);
    assert_eq!(store.record("nl1").unwrap().text("my_verdict"), "Goede tekst.");
}

#[test]
fn dry_run_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let args = RunArgs {
        dry_run: true,
        ..nl_args()
    };
    let cfg = config_with(dir.path(), "", args);
    let (translator, calls) = ScriptedTranslator::chatty();
    let mut pipeline = new_pipeline(cfg, luna_records(), Some(translator));
    let summary = pipeline.run().unwrap();

    assert_eq!(summary.updated, 2);
    assert!(summary.render().starts_with("nl run: would update 2"));
    assert_eq!(calls.borrow().len(), 1);
    let store = pipeline.into_store();
    assert!(store.patches().is_empty());
    assert_eq!(store.records(), luna_records().as_slice());
}

#[test]
fn missing_source_fails_text_but_translates_own_plans() {
    let dir = tempfile::tempdir().unwrap();
    let records = vec![record(
        "nl9",
        json!({"slug": ["ghost"], "language": "nl", "my_verdict": "",
               "pricing_plans": [{"name": "Free", "period": "monthly"}]}),
    )];
    let (translator, calls) = ScriptedTranslator::chatty();
    let mut pipeline = new_pipeline(config(dir.path()), records, Some(translator));
    let summary = pipeline.run().unwrap();

    assert_eq!(
        summary.report_for("nl9", "my_verdict").unwrap().outcome,
        FieldOutcome::Failed(PipelineError::SourceMissing {
            key: "ghost".into(),
            lang: "en".into()
        })
    );
    assert_eq!(
        summary.report_for("nl9", "pricing_plans").unwrap().outcome,
        FieldOutcome::Updated
    );
    assert!(calls.borrow().is_empty());
    assert_eq!(
        pipeline.store().record("nl9").unwrap().get("pricing_plans").unwrap(),
        &json!([{"name": "Free", "period": "maandelijks"}])
    );
}

#[test]
fn malformed_plans_are_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let records = vec![
        record("en1", json!({"slug": "luna", "language": "en", "pricing_plans": "{broken"})),
        record("nl1", json!({"slug": "luna", "language": "nl"})),
    ];
    let args = RunArgs {
        field: Some("pricing_plans".into()),
        ..nl_args()
    };
    let cfg = config_with(dir.path(), "", args);
    let mut pipeline = new_pipeline(cfg, records, None);
    let summary = pipeline.run().unwrap();

    assert_eq!(summary.details.len(), 1);
    assert!(matches!(
        summary.details[0].outcome,
        FieldOutcome::Skipped(SkipReason::Malformed(PipelineError::MalformedStructuredField { .. }))
    ));
    assert!(pipeline.store().patches().is_empty());
}

#[test]
fn store_failure_is_reported_per_field() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = MemoryStore::new(luna_records());
    store.fail_patches_for("nl1");
    let (translator, _) = ScriptedTranslator::chatty();
    let mut pipeline =
        TranslatorPipeline::new(config(dir.path()), store, Some(translator)).unwrap();
    let summary = pipeline.run().unwrap();

    assert_eq!(summary.errored, 2);
    assert!(summary.details.iter().all(|r| matches!(
        r.outcome,
        FieldOutcome::Failed(PipelineError::RecordStoreFailure(_))
    )));
}

#[test]
fn checkpoint_skips_translated_sources() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = config(dir.path());
    cfg.checkpoint = Some(dir.path().join("checkpoint.json"));
    cfg.plan_field = None;

    let (translator, _) = ScriptedTranslator::chatty();
    let mut first = new_pipeline(cfg.clone(), luna_records(), Some(translator));
    assert_eq!(first.run().unwrap().updated, 1);
    assert!(dir.path().join("checkpoint.json").exists());

    // The target was emptied by hand, but its source has not changed since the last run.
    let (translator, calls) = ScriptedTranslator::chatty();
    let mut second = new_pipeline(cfg, luna_records(), Some(translator));
    let summary = second.run().unwrap();
    assert_eq!(
        summary.report_for("nl1", "my_verdict").unwrap().outcome,
        FieldOutcome::Skipped(SkipReason::Checkpointed)
    );
    assert!(calls.borrow().is_empty());
}

#[test]
fn text_run_without_translator_fails_fields() {
    let dir = tempfile::tempdir().unwrap();
    let mut pipeline = new_pipeline(config(dir.path()), luna_records(), None);
    let summary = pipeline.run().unwrap();
    assert!(matches!(
        summary.report_for("nl1", "my_verdict").unwrap().outcome,
        FieldOutcome::Failed(PipelineError::ExternalTranslateFailure(_))
    ));
    assert_eq!(
        summary.report_for("nl1", "pricing_plans").unwrap().outcome,
        FieldOutcome::Updated
    );
}

#[test]
fn trace_keeps_every_chunk_stage() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = config(dir.path());
    cfg.trace_enabled = true;
    cfg.trace_dir = dir.path().join("_trace");
    let (translator, _) = ScriptedTranslator::chatty();
    let mut pipeline = new_pipeline(cfg, luna_records(), Some(translator));
    pipeline.run().unwrap();

    let trace = dir.path().join("_trace");
    for stage in ["source", "raw", "cleaned"] {
        assert!(trace.join(format!("nl.nl1.my_verdict.c001.{stage}.txt")).exists(), "{stage}");
    }
    let raw = std::fs::read_to_string(trace.join("nl.nl1.my_verdict.c001.raw.txt")).unwrap();
    assert!(raw.starts_with("Here's the Dutch translation:"));
}

#[test]
fn short_field_reaches_a_fixed_point_with_default_thresholds() {
    let dir = tempfile::tempdir().unwrap();
    // Only what the record layout needs; every threshold keeps its default.
    let app: AppConfig = toml::from_str(
        r#"
[pipeline]
throttle_ms = 0

[records]
key_field = "slug"
text_fields = ["my_verdict"]
plan_field = ""
"#,
    )
    .unwrap();
    let config_path = dir.path().join("record-localizer.toml");
    let cfg = PipelineConfig::from_app_config(&app, &config_path, &nl_args()).unwrap();
    let records = vec![
        record(
            "en1",
            json!({
                "slug": "luna",
                "language": "en",
                "my_verdict": "Luna is a warm and witty companion."
            }),
        ),
        record("nl1", json!({"slug": "luna", "language": "nl", "my_verdict": ""})),
    ];

    let (translator, calls) = ScriptedTranslator::new(Box::new(|_, _| {
        Ok("Luna is een warme en geestige metgezel.".to_string())
    }));
    let mut pipeline = new_pipeline(cfg, records, Some(translator));
    for _ in 0..3 {
        pipeline.run().unwrap();
    }

    assert_eq!(calls.borrow().len(), 1);
    assert_eq!(pipeline.store().patches().len(), 1);
    assert_eq!(
        pipeline.store().record("nl1").unwrap().text("my_verdict"),
        "Luna is een warme en geestige metgezel."
    );
}
