use std::time::Duration;

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::Translator;
use crate::pipeline::render_template;
use crate::textutil::{char_len, lang_label};

pub const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Clone, Debug)]
pub struct AnthropicSettings {
    pub api_url: String,
    pub api_key: String,
    pub model: String,
    pub max_tokens: u32,
    pub timeout: Duration,
    pub source_lang: String,
    pub prompt: String,
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<Message<'a>>,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'a str,
    content: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
    #[serde(default)]
    stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

pub struct AnthropicTranslator {
    settings: AnthropicSettings,
    client: reqwest::blocking::Client,
}

impl AnthropicTranslator {
    pub fn new(settings: AnthropicSettings) -> anyhow::Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(settings.timeout)
            .build()
            .context("build translator http client")?;
        Ok(Self { settings, client })
    }

    fn render_prompt(&self, text: &str, target_lang: &str) -> String {
        let source = lang_label(&self.settings.source_lang);
        let target = lang_label(target_lang);
        render_template(
            &self.settings.prompt,
            &[
                ("source_lang", source.as_str()),
                ("target_lang", target.as_str()),
                ("text", text),
            ],
        )
    }
}

impl Translator for AnthropicTranslator {
    fn name(&self) -> &str {
        &self.settings.model
    }

    fn translate(&mut self, text: &str, target_lang: &str) -> anyhow::Result<String> {
        let request = MessagesRequest {
            model: &self.settings.model,
            max_tokens: self.settings.max_tokens,
            messages: vec![Message {
                role: "user",
                content: self.render_prompt(text, target_lang),
            }],
        };
        debug!(model = %self.settings.model, chars = char_len(text), "translate request");

        let response = self
            .client
            .post(&self.settings.api_url)
            .header("x-api-key", &self.settings.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&request)
            .send()
            .context("send translate request")?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .unwrap_or_else(|e| format!("<failed to read body: {e}>"));
            bail!("translate api error ({status}): {body}");
        }
        let parsed: MessagesResponse = response.json().context("parse translate response")?;
        parse_response(parsed)
    }
}

/// Concatenates the text blocks of a response.
pub(crate) fn parse_response(response: MessagesResponse) -> anyhow::Result<String> {
    if response.stop_reason.as_deref() == Some("max_tokens") {
        warn!("translate response stopped at max_tokens; output may be truncated");
    }
    let text: String = response
        .content
        .into_iter()
        .filter(|b| b.kind == "text")
        .filter_map(|b| b.text)
        .collect();
    let text = text.trim();
    if text.is_empty() {
        bail!("translate response contained no text");
    }
    Ok(text.to_string())
}
