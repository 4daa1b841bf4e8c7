//! Content oracle interface.
//!
//! The oracle is an untrusted text-generation service asked for candidate
//! topics with supporting papers. Its output is opaque text until the
//! candidate filter has looked at it.

pub mod gemini;
pub mod prompt;

pub use gemini::GeminiOracle;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::error::OracleError;
use crate::types::RawCandidate;

/// Source of raw candidate text.
#[async_trait]
pub trait ContentOracle: Send + Sync {
    /// Ask for up to `batch_size` candidates for `category`.
    async fn request_candidates(
        &self,
        category: &str,
        batch_size: usize,
    ) -> Result<Vec<RawCandidate>, OracleError>;

    /// Name used in logs and errors.
    fn name(&self) -> &str;
}

/// Settings for the HTTP oracle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OracleConfig {
    pub model: String,
    /// API base URL. `None` uses the public Gemini endpoint.
    pub base_url: Option<String>,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    pub timeout_secs: u64,
    pub connect_timeout_secs: u64,
    pub temperature: f32,
    pub max_output_tokens: u32,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            model: "gemini-2.0-flash".into(),
            base_url: None,
            api_key_env: "GEMINI_API_KEY".into(),
            timeout_secs: 120,
            connect_timeout_secs: 10,
            temperature: 0.7,
            max_output_tokens: 8192,
        }
    }
}

/// Split an oracle response into one raw candidate per proposed topic.
///
/// JSON responses are split on the `candidates`, `topics` or `subcategories`
/// array (or a bare array). Plain text is split on `---` separator lines, or
/// on paragraphs that open with a `Topic:` label. Anything else is a single
/// candidate.
pub fn split_candidates(text: &str) -> Vec<RawCandidate> {
    let trimmed = strip_fences(text);
    if trimmed.is_empty() {
        return Vec::new();
    }
    if let Some(candidates) = split_json(trimmed) {
        return candidates;
    }

    let separated: Vec<&str> = split_on_separator_lines(trimmed);
    if separated.len() > 1 {
        return separated.into_iter().map(RawCandidate::from).collect();
    }
    split_topic_paragraphs(trimmed)
}

fn strip_fences(text: &str) -> &str {
    let t = text.trim();
    let Some(rest) = t.strip_prefix("```") else {
        return t;
    };
    let rest = rest.split_once('\n').map_or("", |(_, body)| body);
    rest.trim_end().trim_end_matches("```").trim()
}

fn split_json(text: &str) -> Option<Vec<RawCandidate>> {
    let value: Value = serde_json::from_str(text).ok()?;
    let items = match value {
        Value::Array(items) => items,
        Value::Object(mut map) => {
            match ["candidates", "topics", "subcategories"]
                .iter()
                .find_map(|k| map.remove(*k).filter(Value::is_array))
            {
                Some(Value::Array(items)) => items,
                _ => vec![Value::Object(map)],
            }
        }
        Value::String(s) => return Some(vec![RawCandidate::new(s)]),
        other => vec![other],
    };
    Some(
        items
            .into_iter()
            .map(|item| match item {
                Value::String(s) => RawCandidate::new(s),
                other => RawCandidate::new(other.to_string()),
            })
            .collect(),
    )
}

fn split_on_separator_lines(text: &str) -> Vec<&str> {
    let mut blocks = Vec::new();
    let mut start = 0;
    let mut offset = 0;
    for line in text.split_inclusive('\n') {
        let t = line.trim();
        if t.len() >= 3 && t.chars().all(|c| c == '-') {
            blocks.push(&text[start..offset]);
            start = offset + line.len();
        }
        offset += line.len();
    }
    blocks.push(&text[start..]);
    blocks
        .into_iter()
        .map(str::trim)
        .filter(|b| !b.is_empty())
        .collect()
}

fn split_topic_paragraphs(text: &str) -> Vec<RawCandidate> {
    let mut candidates: Vec<String> = Vec::new();
    for paragraph in text.split("\n\n").map(str::trim).filter(|p| !p.is_empty()) {
        let opens_topic = paragraph
            .trim_start_matches(|c: char| c.is_ascii_digit() || "-*#. ".contains(c))
            .to_lowercase()
            .starts_with("topic:");
        if opens_topic || candidates.is_empty() {
            candidates.push(paragraph.to_string());
        } else if let Some(current) = candidates.last_mut() {
            current.push_str("\n\n");
            current.push_str(paragraph);
        }
    }
    candidates.into_iter().map(RawCandidate::from).collect()
}

/// Oracle that replays a fixed script of responses.
///
/// Each call pops the next scripted result; once the script is exhausted every
/// call returns an empty batch.
pub struct ScriptedOracle {
    name: String,
    script: Mutex<VecDeque<Result<Vec<RawCandidate>, OracleError>>>,
    batch_sizes: Mutex<Vec<usize>>,
    calls: AtomicUsize,
    delay: Duration,
}

impl Default for ScriptedOracle {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedOracle {
    pub fn new() -> Self {
        Self {
            name: "scripted".into(),
            script: Mutex::new(VecDeque::new()),
            batch_sizes: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
            delay: Duration::ZERO,
        }
    }

    /// Wait this long inside every call before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Queue a successful batch.
    pub fn push_batch<I, C>(&self, candidates: I)
    where
        I: IntoIterator<Item = C>,
        C: Into<RawCandidate>,
    {
        self.push(Ok(candidates.into_iter().map(Into::into).collect()));
    }

    /// Queue a failed call.
    pub fn push_error(&self, error: OracleError) {
        self.push(Err(error));
    }

    pub fn push(&self, result: Result<Vec<RawCandidate>, OracleError>) {
        self.script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(result);
    }

    /// Number of calls received so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Batch size requested by each call, in order.
    pub fn batch_sizes(&self) -> Vec<usize> {
        self.batch_sizes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Scripted results not yet consumed.
    pub fn remaining(&self) -> usize {
        self.script.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

#[async_trait]
impl ContentOracle for ScriptedOracle {
    async fn request_candidates(
        &self,
        _category: &str,
        batch_size: usize,
    ) -> Result<Vec<RawCandidate>, OracleError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.batch_sizes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(batch_size);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let next = self
            .script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();
        next.unwrap_or_else(|| Ok(Vec::new()))
    }

    fn name(&self) -> &str {
        &self.name
    }
}
