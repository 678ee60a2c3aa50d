use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

const SCHEMA: &str = "record_localizer.checkpoint.v1";

#[derive(Clone, Debug, Serialize, Deserialize)]
struct CheckpointFile {
    schema: String,
    /// `{lang}:{record}:{field}` -> sha256 of the source text that was translated.
    entries: BTreeMap<String, String>,
}

/// Local record of which source texts have already been translated.
#[derive(Clone, Debug)]
pub struct Checkpoint {
    path: PathBuf,
    entries: BTreeMap<String, String>,
    dirty: bool,
}

pub fn source_digest(text: &str) -> String {
    hex::encode(Sha256::digest(text.as_bytes()))
}

pub fn checkpoint_key(lang: &str, record_id: &str, field: &str) -> String {
    format!("{lang}:{record_id}:{field}")
}

impl Checkpoint {
    /// Opens `path`; a missing file starts an empty checkpoint.
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        let entries = if path.exists() {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("read checkpoint: {}", path.display()))?;
            let file: CheckpointFile = serde_json::from_str(text.trim_start_matches('\u{FEFF}'))
                .with_context(|| format!("parse checkpoint: {}", path.display()))?;
            file.entries
        } else {
            BTreeMap::new()
        };
        Ok(Self {
            path: path.to_path_buf(),
            entries,
            dirty: false,
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// True when `source` is exactly what was translated last time under `key`.
    pub fn is_current(&self, key: &str, source: &str) -> bool {
        self.entries
            .get(key)
            .is_some_and(|d| *d == source_digest(source))
    }

    pub fn mark(&mut self, key: String, source: &str) {
        let digest = source_digest(source);
        if self.entries.get(&key) != Some(&digest) {
            self.entries.insert(key, digest);
            self.dirty = true;
        }
    }

    /// Writes through a temporary file so an interrupted save never truncates the checkpoint.
    pub fn save(&mut self) -> anyhow::Result<()> {
        if !self.dirty {
            return Ok(());
        }
        let file = CheckpointFile {
            schema: SCHEMA.to_string(),
            entries: self.entries.clone(),
        };
        let json = serde_json::to_string_pretty(&file).context("serialize checkpoint")?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create checkpoint dir: {}", parent.display()))?;
        }
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json).with_context(|| format!("write checkpoint: {}", tmp.display()))?;
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("replace checkpoint: {}", self.path.display()))?;
        self.dirty = false;
        Ok(())
    }
}
