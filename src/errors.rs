use thiserror::Error;

/// Classified failures of a single field translation.
///
/// None of these abort a run: the orchestrator logs them, records them in the run summary and
/// moves on to the next field.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PipelineError {
    /// A single paragraph is larger than the chunk budget; it is sent as-is.
    #[error("paragraph of {chars} chars exceeds chunk budget of {max_chars}")]
    ChunkOversize { chars: usize, max_chars: usize },

    #[error("external translate failed: {0}")]
    ExternalTranslateFailure(String),

    #[error("record store request failed: {0}")]
    RecordStoreFailure(String),

    /// The plan-list field is not a list of maps/scalars.
    #[error("malformed structured field {field}: {reason}")]
    MalformedStructuredField { field: String, reason: String },

    #[error("implausibly short result: {target_chars} chars for {source_chars} source chars")]
    ImplausiblyShortResult {
        source_chars: usize,
        target_chars: usize,
    },

    #[error("no {lang} source record for key {key}")]
    SourceMissing { key: String, lang: String },
}

impl PipelineError {
    pub fn translate(err: &anyhow::Error) -> Self {
        Self::ExternalTranslateFailure(format!("{err:#}"))
    }

    pub fn store(err: &anyhow::Error) -> Self {
        Self::RecordStoreFailure(format!("{err:#}"))
    }
}
