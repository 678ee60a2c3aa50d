use std::collections::HashMap;
use std::fmt;

use anyhow::Context;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::errors::PipelineError;
use crate::freezer::{missing_tokens, restore};
use crate::ir::Record;
use crate::models::Translator;
use crate::plans::{decode_plans, encode_plans, StructuralWalker};
use crate::store::{fetch_all, RecordFilter, RecordStore};
use crate::terminology::GuardedDictionary;
use crate::textutil::{char_len, chunk_paragraphs, join_chunks, preview};

use super::checkpoint::{checkpoint_key, Checkpoint};
use super::trace::TraceWriter;
use super::PipelineConfig;

/// Lifecycle of one field within a run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldState {
    Pending,
    InProgress,
    Cleaned,
    Assembled,
    Done,
    Failed,
}

impl FieldState {
    pub fn can_advance_to(self, next: FieldState) -> bool {
        use FieldState::*;
        matches!(
            (self, next),
            (Pending, InProgress | Done)
                | (InProgress, Cleaned | Assembled | Failed)
                | (Cleaned, Assembled | Done | Failed)
                | (Assembled, Done | Failed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, FieldState::Done | FieldState::Failed)
    }
}

struct FieldTracker<'a> {
    record_id: &'a str,
    field: &'a str,
    state: FieldState,
}

impl<'a> FieldTracker<'a> {
    fn new(record_id: &'a str, field: &'a str) -> Self {
        Self {
            record_id,
            field,
            state: FieldState::Pending,
        }
    }

    fn advance(&mut self, next: FieldState) {
        debug_assert!(
            self.state.can_advance_to(next),
            "illegal field transition {:?} -> {next:?}",
            self.state
        );
        debug!(
            record = self.record_id,
            field = self.field,
            from = ?self.state,
            to = ?next,
            "field state"
        );
        self.state = next;
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum SkipReason {
    EmptySource,
    EmptyTarget,
    /// The idempotence gate considers the stored value finished.
    AlreadyTranslated,
    /// The checkpoint holds the digest of the current source text.
    Checkpointed,
    /// Cleaning left the stored text as it was.
    Unchanged,
    Malformed(PipelineError),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::EmptySource => write!(f, "source is empty"),
            SkipReason::EmptyTarget => write!(f, "target is empty"),
            SkipReason::AlreadyTranslated => write!(f, "already translated"),
            SkipReason::Checkpointed => write!(f, "checkpoint is current"),
            SkipReason::Unchanged => write!(f, "unchanged"),
            SkipReason::Malformed(e) => write!(f, "{e}"),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum FieldOutcome {
    Updated,
    Skipped(SkipReason),
    Failed(PipelineError),
}

impl fmt::Display for FieldOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldOutcome::Updated => write!(f, "updated"),
            FieldOutcome::Skipped(r) => write!(f, "skipped ({r})"),
            FieldOutcome::Failed(e) => write!(f, "FAILED: {e}"),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct FieldReport {
    pub record_id: String,
    pub key: Option<String>,
    pub field: String,
    pub state: FieldState,
    pub outcome: FieldOutcome,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct RunSummary {
    pub lang: String,
    pub dry_run: bool,
    pub updated: usize,
    pub skipped: usize,
    pub errored: usize,
    pub details: Vec<FieldReport>,
}

impl RunSummary {
    fn push(&mut self, report: FieldReport) {
        match report.outcome {
            FieldOutcome::Updated => self.updated += 1,
            FieldOutcome::Skipped(_) => self.skipped += 1,
            FieldOutcome::Failed(_) => self.errored += 1,
        }
        self.details.push(report);
    }

    pub fn report_for(&self, record_id: &str, field: &str) -> Option<&FieldReport> {
        self.details
            .iter()
            .find(|r| r.record_id == record_id && r.field == field)
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        let verb = if self.dry_run { "would update" } else { "updated" };
        out.push_str(&format!(
            "{} run: {verb} {}, skipped {}, errored {}\n",
            self.lang, self.updated, self.skipped, self.errored
        ));
        for r in &self.details {
            out.push_str(&format!(
                "  {} [{}] {}: {}\n",
                r.record_id,
                r.key.as_deref().unwrap_or("-"),
                r.field,
                r.outcome
            ));
        }
        out
    }
}

/// Drives one target language over the whole record set, one record and one field at a time.
pub struct TranslatorPipeline<S, T> {
    cfg: PipelineConfig,
    store: S,
    translator: Option<T>,
    trace: TraceWriter,
    checkpoint: Option<Checkpoint>,
    calls: usize,
}

impl<S: RecordStore, T: Translator> TranslatorPipeline<S, T> {
    /// `translator` may be `None` for runs that never call the backend (clean-only, plan-only).
    pub fn new(cfg: PipelineConfig, store: S, translator: Option<T>) -> anyhow::Result<Self> {
        let trace = match TraceWriter::new(cfg.trace_dir.clone(), cfg.trace_enabled) {
            Ok(t) => t,
            Err(e) => {
                warn!("trace disabled: {e:#}");
                TraceWriter::disabled()
            }
        };
        let checkpoint = match cfg.checkpoint.as_deref() {
            Some(p) => Some(Checkpoint::open(p)?),
            None => None,
        };
        Ok(Self {
            cfg,
            store,
            translator,
            trace,
            checkpoint,
            calls: 0,
        })
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    pub fn run(&mut self) -> anyhow::Result<RunSummary> {
        let lang = self.cfg.language.code.clone();
        let filter = RecordFilter::language(&self.cfg.lang_field, &lang);
        let backend = self.translator.as_ref().map_or("none", |t| t.name());
        info!(lang = %lang, translator = backend, dry_run = self.cfg.dry_run, "run started");
        let targets = fetch_all(&mut self.store, &filter).context("list target records")?;
        info!(lang = %lang, records = targets.len(), "fetched target records");

        let sources = if self.cfg.clean_only {
            HashMap::new()
        } else {
            self.fetch_sources()?
        };

        let mut summary = RunSummary {
            lang: lang.clone(),
            dry_run: self.cfg.dry_run,
            ..RunSummary::default()
        };
        let text_fields = self.cfg.text_fields.clone();
        let plan_field = self.cfg.plan_field.clone();
        let total = targets.len();

        for (i, record) in targets.iter().enumerate() {
            let key = record.scalar_text(&self.cfg.key_field);
            let source = key.as_ref().and_then(|k| sources.get(k));
            info!(
                "[{}/{total}] {} ({})",
                i + 1,
                key.as_deref().unwrap_or("-"),
                record.id
            );
            for field in &text_fields {
                let report = if self.cfg.clean_only {
                    self.clean_text_field(record, key.as_deref(), field)
                } else {
                    self.translate_text_field(record, key.as_deref(), source, field)
                };
                summary.push(report);
            }
            if let Some(field) = plan_field.as_deref() {
                summary.push(self.translate_plan_field(record, key.as_deref(), source, field));
            }
        }

        info!(
            lang = %lang,
            updated = summary.updated,
            skipped = summary.skipped,
            errored = summary.errored,
            dry_run = self.cfg.dry_run,
            "run finished"
        );
        Ok(summary)
    }

    fn fetch_sources(&mut self) -> anyhow::Result<HashMap<String, Record>> {
        let filter = RecordFilter::language(&self.cfg.lang_field, &self.cfg.source_lang);
        let records = fetch_all(&mut self.store, &filter).context("list source records")?;
        let mut by_key: HashMap<String, Record> = HashMap::with_capacity(records.len());
        for record in records {
            let Some(key) = record.scalar_text(&self.cfg.key_field) else {
                debug!(record = %record.id, "source record without key");
                continue;
            };
            if by_key.contains_key(&key) {
                warn!(
                    key = %key,
                    record = %record.id,
                    "duplicate source record; keeping the first"
                );
                continue;
            }
            by_key.insert(key, record);
        }
        info!(records = by_key.len(), lang = %self.cfg.source_lang, "indexed source records");
        Ok(by_key)
    }

    fn translate_text_field(
        &mut self,
        record: &Record,
        key: Option<&str>,
        source: Option<&Record>,
        field: &str,
    ) -> FieldReport {
        let mut tracker = FieldTracker::new(&record.id, field);
        let Some(source) = source else {
            let err = PipelineError::SourceMissing {
                key: key.unwrap_or("-").to_string(),
                lang: self.cfg.source_lang.clone(),
            };
            warn!(record = %record.id, field, "{err}");
            tracker.advance(FieldState::InProgress);
            tracker.advance(FieldState::Failed);
            return report(record, key, &tracker, FieldOutcome::Failed(err));
        };

        let source_text = source.text(field);
        if source_text.trim().is_empty() {
            tracker.advance(FieldState::Done);
            return report(
                record,
                key,
                &tracker,
                FieldOutcome::Skipped(SkipReason::EmptySource),
            );
        }
        let existing = record.text(field);
        let cp_key = checkpoint_key(&self.cfg.language.code, &record.id, field);
        if self
            .checkpoint
            .as_ref()
            .is_some_and(|cp| cp.is_current(&cp_key, source_text))
        {
            debug!(record = %record.id, field, "checkpoint is current");
            tracker.advance(FieldState::Done);
            return report(
                record,
                key,
                &tracker,
                FieldOutcome::Skipped(SkipReason::Checkpointed),
            );
        }
        if !self.cfg.gate.needs_work(source_text, existing) {
            debug!(
                record = %record.id,
                field,
                chars = char_len(existing),
                "already translated"
            );
            tracker.advance(FieldState::Done);
            return report(
                record,
                key,
                &tracker,
                FieldOutcome::Skipped(SkipReason::AlreadyTranslated),
            );
        }

        tracker.advance(FieldState::InProgress);
        info!(
            record = %record.id,
            field,
            source_chars = char_len(source_text),
            existing_chars = char_len(existing),
            "translating"
        );
        let text = match self.translate_text(&mut tracker, &record.id, field, source_text) {
            Ok(text) => text,
            Err(err) => {
                warn!(record = %record.id, field, "{err}; field left unchanged");
                tracker.advance(FieldState::Failed);
                return report(record, key, &tracker, FieldOutcome::Failed(err));
            }
        };
        if let Err(err) = self.cfg.gate.check_result_length(source_text, &text) {
            warn!(record = %record.id, field, "{err}; writing anyway");
        }

        if let Err(err) = self.write_field(&record.id, field, Value::String(text)) {
            warn!(record = %record.id, field, "{err}");
            tracker.advance(FieldState::Failed);
            return report(record, key, &tracker, FieldOutcome::Failed(err));
        }
        tracker.advance(FieldState::Done);
        self.mark_checkpoint(cp_key, source_text);
        report(record, key, &tracker, FieldOutcome::Updated)
    }

    /// protect -> chunk -> translate/clean each chunk in order -> join -> restore.
    fn translate_text(
        &mut self,
        tracker: &mut FieldTracker<'_>,
        record_id: &str,
        field: &str,
        source: &str,
    ) -> Result<String, PipelineError> {
        let lang = self.cfg.language.code.clone();
        let max_chars = self.cfg.max_chunk_chars;
        let protected = self.cfg.language.guard.protect(source);
        let chunks = chunk_paragraphs(&protected.text, max_chars);
        debug!(
            record = record_id,
            field,
            chunks = chunks.len(),
            placeholders = protected.restore_map.len(),
            "chunked"
        );

        let mut cleaned: Vec<String> = Vec::with_capacity(chunks.len());
        for (i, chunk) in chunks.iter().enumerate() {
            let chars = char_len(chunk);
            if chars > max_chars {
                let err = PipelineError::ChunkOversize { chars, max_chars };
                warn!(record = record_id, field, chunk = i + 1, "{err}; sending as-is");
            }
            self.throttle();
            let translator = self.translator.as_mut().ok_or_else(|| {
                PipelineError::ExternalTranslateFailure("no translator configured".to_string())
            })?;
            let raw = translator
                .translate(chunk, &lang)
                .map_err(|e| PipelineError::translate(&e))?;
            let out = self.cfg.cleaner.clean(&raw);
            debug!(
                record = record_id,
                field,
                chunk = i + 1,
                of = chunks.len(),
                chars = char_len(&out),
                "chunk: {}",
                preview(&out, self.cfg.log_max_chars)
            );
            self.trace_chunk(record_id, field, i, "source", chunk);
            self.trace_chunk(record_id, field, i, "raw", &raw);
            self.trace_chunk(record_id, field, i, "cleaned", &out);
            cleaned.push(out);
        }
        tracker.advance(FieldState::Cleaned);

        let joined = join_chunks(&cleaned);
        tracker.advance(FieldState::Assembled);

        let lost = missing_tokens(&joined, &protected.restore_map);
        if !lost.is_empty() {
            let terms: Vec<&str> = lost
                .iter()
                .filter_map(|t| protected.restore_map.get(t).map(String::as_str))
                .collect();
            return Err(PipelineError::ExternalTranslateFailure(format!(
                "translation dropped {} protected term(s): {}",
                lost.len(),
                terms.join(", ")
            )));
        }
        let restored = restore(&joined, &protected.restore_map);
        if restored.trim().is_empty() {
            return Err(PipelineError::ExternalTranslateFailure(
                "translation is empty after cleaning".to_string(),
            ));
        }
        Ok(restored)
    }

    fn clean_text_field(&mut self, record: &Record, key: Option<&str>, field: &str) -> FieldReport {
        let mut tracker = FieldTracker::new(&record.id, field);
        let existing = record.text(field);
        if existing.trim().is_empty() {
            tracker.advance(FieldState::Done);
            return report(
                record,
                key,
                &tracker,
                FieldOutcome::Skipped(SkipReason::EmptyTarget),
            );
        }
        tracker.advance(FieldState::InProgress);
        let cleaned = self.cfg.cleaner.clean(existing);
        tracker.advance(FieldState::Cleaned);
        if cleaned == existing {
            tracker.advance(FieldState::Done);
            return report(
                record,
                key,
                &tracker,
                FieldOutcome::Skipped(SkipReason::Unchanged),
            );
        }
        info!(
            record = %record.id,
            field,
            before = char_len(existing),
            after = char_len(&cleaned),
            "cleaning"
        );
        if let Err(err) = self.write_field(&record.id, field, Value::String(cleaned)) {
            warn!(record = %record.id, field, "{err}");
            tracker.advance(FieldState::Failed);
            return report(record, key, &tracker, FieldOutcome::Failed(err));
        }
        tracker.advance(FieldState::Done);
        report(record, key, &tracker, FieldOutcome::Updated)
    }

    fn translate_plan_field(
        &mut self,
        record: &Record,
        key: Option<&str>,
        source: Option<&Record>,
        field: &str,
    ) -> FieldReport {
        let mut tracker = FieldTracker::new(&record.id, field);
        let stored = record.get(field).filter(|v| !is_blank(v));
        let input = match source.and_then(|s| s.get(field)).filter(|v| !is_blank(v)) {
            Some(v) => v,
            None => match stored {
                Some(v) => {
                    debug!(
                        record = %record.id,
                        field,
                        "no source plans; translating stored plans in place"
                    );
                    v
                }
                None => {
                    tracker.advance(FieldState::Done);
                    return report(
                        record,
                        key,
                        &tracker,
                        FieldOutcome::Skipped(SkipReason::EmptySource),
                    );
                }
            },
        };

        let (plans, source_encoding) = match decode_plans(field, input) {
            Ok(decoded) => decoded,
            Err(err) => {
                warn!(record = %record.id, "{err}; skipping");
                tracker.advance(FieldState::Done);
                return report(
                    record,
                    key,
                    &tracker,
                    FieldOutcome::Skipped(SkipReason::Malformed(err)),
                );
            }
        };
        let existing = stored.and_then(|v| decode_plans(field, v).ok());
        let encoding = existing.as_ref().map_or(source_encoding, |(_, enc)| *enc);

        let leaf = GuardedDictionary {
            guard: &self.cfg.language.guard,
            dictionary: &self.cfg.language.dictionary,
        };
        let walked = StructuralWalker::new(&self.cfg.plan_policy).translate(&plans, &leaf);

        let walked_value = Value::Array(walked);
        let existing_value = existing.map(|(p, _)| Value::Array(p));
        if !self
            .cfg
            .gate
            .plans_need_work(existing_value.as_ref(), &walked_value)
        {
            debug!(record = %record.id, field, "plans already translated");
            tracker.advance(FieldState::Done);
            return report(
                record,
                key,
                &tracker,
                FieldOutcome::Skipped(SkipReason::AlreadyTranslated),
            );
        }

        tracker.advance(FieldState::InProgress);
        let encoded = encode_plans(walked_value, encoding);
        tracker.advance(FieldState::Assembled);
        info!(record = %record.id, field, plans = plans.len(), "translating plans");

        if let Err(err) = self.write_field(&record.id, field, encoded) {
            warn!(record = %record.id, field, "{err}");
            tracker.advance(FieldState::Failed);
            return report(record, key, &tracker, FieldOutcome::Failed(err));
        }
        tracker.advance(FieldState::Done);
        report(record, key, &tracker, FieldOutcome::Updated)
    }

    /// One patch per field; nothing is written in a dry run.
    fn write_field(
        &mut self,
        record_id: &str,
        field: &str,
        value: Value,
    ) -> Result<(), PipelineError> {
        if self.cfg.dry_run {
            info!(record = record_id, field, "dry run: not writing");
            return Ok(());
        }
        let mut fields = Map::new();
        fields.insert(field.to_string(), value);
        self.store
            .patch_one(record_id, fields)
            .map_err(|e| PipelineError::store(&e))?;
        info!(record = record_id, field, "updated");
        Ok(())
    }

    fn mark_checkpoint(&mut self, key: String, source: &str) {
        if self.cfg.dry_run {
            return;
        }
        if let Some(cp) = self.checkpoint.as_mut() {
            cp.mark(key, source);
            if let Err(e) = cp.save() {
                warn!("checkpoint not saved: {e:#}");
            }
        }
    }

    fn throttle(&mut self) {
        if self.calls > 0 && !self.cfg.throttle.is_zero() {
            std::thread::sleep(self.cfg.throttle);
        }
        self.calls += 1;
    }

    fn trace_chunk(&self, record_id: &str, field: &str, chunk: usize, stage: &str, text: &str) {
        if let Err(e) = self.trace.write_chunk_text(
            &self.cfg.language.code,
            record_id,
            field,
            chunk + 1,
            stage,
            text,
        ) {
            warn!("trace write failed: {e:#}");
        }
    }
}

fn report(
    record: &Record,
    key: Option<&str>,
    tracker: &FieldTracker<'_>,
    outcome: FieldOutcome,
) -> FieldReport {
    debug_assert!(tracker.state.is_terminal());
    FieldReport {
        record_id: record.id.clone(),
        key: key.map(str::to_string),
        field: tracker.field.to_string(),
        state: tracker.state,
        outcome,
    }
}

fn is_blank(v: &Value) -> bool {
    match v {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(a) => a.is_empty(),
        _ => false,
    }
}
