use std::collections::HashSet;
use std::time::Duration;

use anyhow::{anyhow, bail, Context};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::debug;

use crate::ir::{Record, RecordPage};

/// Equality filter on one field, e.g. `language = nl`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordFilter {
    pub field: String,
    pub value: String,
}

impl RecordFilter {
    pub fn language(lang_field: &str, lang: &str) -> Self {
        Self {
            field: lang_field.to_string(),
            value: lang.to_string(),
        }
    }

    /// Airtable formula form: `{language} = 'nl'`.
    pub fn formula(&self) -> String {
        let field = self.field.replace('}', "\\}");
        let value = self.value.replace('\\', "\\\\").replace('\'', "\\'");
        format!("{{{field}}} = '{value}'")
    }

    pub fn matches(&self, record: &Record) -> bool {
        record.scalar_text(&self.field).as_deref() == Some(self.value.as_str())
    }
}

/// Paged access to the content table plus single-record updates.
pub trait RecordStore {
    fn fetch_page(
        &mut self,
        filter: &RecordFilter,
        offset: Option<&str>,
    ) -> anyhow::Result<RecordPage>;

    /// Writes `fields` onto record `id`; fields not named are left alone.
    fn patch_one(&mut self, id: &str, fields: Map<String, Value>) -> anyhow::Result<()>;
}

/// Follows continuation tokens until the store stops returning one.
pub fn fetch_all<S: RecordStore + ?Sized>(
    store: &mut S,
    filter: &RecordFilter,
) -> anyhow::Result<Vec<Record>> {
    let mut out = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    let mut offset: Option<String> = None;
    loop {
        let page = store
            .fetch_page(filter, offset.as_deref())
            .with_context(|| format!("fetch records where {}", filter.formula()))?;
        debug!(
            records = page.records.len(),
            has_more = page.offset.is_some(),
            "fetched page"
        );
        out.extend(page.records);
        match page.offset {
            Some(next) => {
                if !seen.insert(next.clone()) {
                    bail!("record store repeated continuation token {next}");
                }
                offset = Some(next);
            }
            None => return Ok(out),
        }
    }
}

#[derive(Clone, Debug)]
pub struct AirtableSettings {
    pub api_url: String,
    pub base_id: String,
    pub table: String,
    pub token: String,
    pub page_size: usize,
    pub timeout: Duration,
}

pub struct AirtableStore {
    settings: AirtableSettings,
    client: reqwest::blocking::Client,
}

#[derive(Serialize)]
struct PatchBody<'a> {
    fields: &'a Map<String, Value>,
}

impl AirtableStore {
    pub fn new(settings: AirtableSettings) -> anyhow::Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(settings.timeout)
            .build()
            .context("build record store http client")?;
        Ok(Self { settings, client })
    }

    fn url(&self, record_id: Option<&str>) -> anyhow::Result<reqwest::Url> {
        let mut url = reqwest::Url::parse(&self.settings.api_url)
            .with_context(|| format!("record store url: {}", self.settings.api_url))?;
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| {
                    anyhow!("record store url cannot be a base: {}", self.settings.api_url)
                })?;
            segments.pop_if_empty();
            segments.push(&self.settings.base_id);
            segments.push(&self.settings.table);
            if let Some(id) = record_id {
                segments.push(id);
            }
        }
        Ok(url)
    }
}

impl RecordStore for AirtableStore {
    fn fetch_page(
        &mut self,
        filter: &RecordFilter,
        offset: Option<&str>,
    ) -> anyhow::Result<RecordPage> {
        let mut query: Vec<(&str, String)> = vec![
            ("filterByFormula", filter.formula()),
            ("pageSize", self.settings.page_size.clamp(1, 100).to_string()),
        ];
        if let Some(offset) = offset {
            query.push(("offset", offset.to_string()));
        }
        let response = self
            .client
            .get(self.url(None)?)
            .bearer_auth(&self.settings.token)
            .query(&query)
            .send()
            .context("send list request")?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().unwrap_or_default();
            bail!("record store list failed ({status}): {body}");
        }
        response.json::<RecordPage>().context("parse list response")
    }

    fn patch_one(&mut self, id: &str, fields: Map<String, Value>) -> anyhow::Result<()> {
        let response = self
            .client
            .patch(self.url(Some(id))?)
            .bearer_auth(&self.settings.token)
            .json(&PatchBody { fields: &fields })
            .send()
            .with_context(|| format!("send patch for {id}"))?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().unwrap_or_default();
            bail!("record store patch of {id} failed ({status}): {body}");
        }
        Ok(())
    }
}

/// In-process store with the same paging contract. Patches merge into the held records and
/// are logged in order.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    records: Vec<Record>,
    page_size: usize,
    patches: Vec<(String, Map<String, Value>)>,
    failing_ids: HashSet<String>,
}

impl MemoryStore {
    pub fn new(records: Vec<Record>) -> Self {
        Self {
            records,
            page_size: 100,
            ..Self::default()
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Makes every patch of record `id` fail.
    pub fn fail_patches_for(&mut self, id: &str) {
        self.failing_ids.insert(id.to_string());
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn record(&self, id: &str) -> Option<&Record> {
        self.records.iter().find(|r| r.id == id)
    }

    pub fn patches(&self) -> &[(String, Map<String, Value>)] {
        &self.patches
    }
}

impl RecordStore for MemoryStore {
    fn fetch_page(
        &mut self,
        filter: &RecordFilter,
        offset: Option<&str>,
    ) -> anyhow::Result<RecordPage> {
        let start = match offset {
            Some(token) => token
                .parse::<usize>()
                .map_err(|_| anyhow!("invalid offset token: {token}"))?,
            None => 0,
        };
        let matching: Vec<&Record> = self.records.iter().filter(|r| filter.matches(r)).collect();
        let end = (start + self.page_size).min(matching.len());
        let records = matching
            .get(start..end)
            .unwrap_or_default()
            .iter()
            .map(|r| (*r).clone())
            .collect();
        let offset = (end < matching.len()).then(|| end.to_string());
        Ok(RecordPage { records, offset })
    }

    fn patch_one(&mut self, id: &str, fields: Map<String, Value>) -> anyhow::Result<()> {
        if self.failing_ids.contains(id) {
            bail!("patch rejected for {id}");
        }
        let record = self
            .records
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| anyhow!("unknown record {id}"))?;
        for (k, v) in &fields {
            record.fields.insert(k.clone(), v.clone());
        }
        self.patches.push((id.to_string(), fields));
        Ok(())
    }
}
