//! Turns a filtered raw candidate into a typed topic draft.
//!
//! Two shapes are understood: the JSON object the oracle is prompted for
//! (optionally wrapped in a `subcategory` key, optionally fenced or
//! surrounded by prose), and a labelled plain-text fallback.

use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::error::ParseError;
use crate::types::{Citation, CitationRecord, RawCandidate};

/// A topic proposal with its well-formed citations, not yet graded.
#[derive(Debug, Clone, PartialEq)]
pub struct TopicDraft {
    pub name: String,
    pub description: String,
    pub expected_effect: String,
    pub citations: Vec<Citation>,
}

#[derive(Debug, Default, Deserialize)]
struct DraftRecord {
    #[serde(default, alias = "topic", alias = "subcategory_name")]
    name: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default, alias = "expectedEffect", alias = "effect")]
    expected_effect: Option<String>,
    #[serde(default, alias = "citations", alias = "references")]
    papers: Vec<CitationRecord>,
    #[serde(default)]
    paper: Option<CitationRecord>,
}

/// Parse one raw candidate.
pub fn parse_candidate(raw: &RawCandidate) -> Result<TopicDraft, ParseError> {
    let text = raw.as_str();
    let record = match json_span(text) {
        Some(span) => parse_json(span)?,
        None => parse_labelled(text).ok_or(ParseError::NoStructure)?,
    };
    into_draft(record)
}

fn json_span(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (start < end).then(|| &text[start..=end])
}

fn parse_json(span: &str) -> Result<DraftRecord, ParseError> {
    let mut value: Value =
        serde_json::from_str(span).map_err(|e| ParseError::InvalidJson {
            message: e.to_string(),
        })?;
    if let Some(inner) = value.get_mut("subcategory").filter(|v| v.is_object()) {
        value = inner.take();
    }
    serde_json::from_value(value).map_err(|e| ParseError::InvalidJson {
        message: e.to_string(),
    })
}

/// Labelled `Key: value` lines. Returns `None` when no known label is present.
fn parse_labelled(text: &str) -> Option<DraftRecord> {
    let mut draft = DraftRecord::default();
    let mut current: Option<CitationRecord> = None;
    let mut recognised = false;

    for line in text.lines() {
        let line = line.trim().trim_start_matches(['-', '*', '•']).trim();
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim().to_lowercase().replace('_', " ");
        let value = value.trim();
        if value.is_empty() {
            continue;
        }

        match key.as_str() {
            "topic" | "name" | "subcategory" => draft.name = Some(value.to_string()),
            "description" => draft.description = Some(value.to_string()),
            "expected effect" | "effect" => draft.expected_effect = Some(value.to_string()),
            "paper" | "title" => {
                let starts_new = key == "paper"
                    || current.as_ref().is_some_and(|c| c.title.is_some());
                if starts_new {
                    draft.papers.extend(current.take());
                }
                current.get_or_insert_with(CitationRecord::default).title =
                    Some(value.to_string());
            }
            "authors" | "author" => {
                current.get_or_insert_with(CitationRecord::default).authors =
                    Some(value.to_string())
            }
            "journal" | "venue" => {
                current.get_or_insert_with(CitationRecord::default).journal =
                    Some(value.to_string())
            }
            "year" => {
                current.get_or_insert_with(CitationRecord::default).year =
                    crate::leading_number(value).map(|n| n.round() as i64)
            }
            "doi" => {
                current.get_or_insert_with(CitationRecord::default).doi = Some(value.to_string())
            }
            "impact factor" | "impact" => {
                current.get_or_insert_with(CitationRecord::default).impact_factor =
                    crate::leading_number(value)
            }
            "citations" | "citation count" => {
                current.get_or_insert_with(CitationRecord::default).citations =
                    crate::leading_number(value).map(|n| n.round() as i64)
            }
            "type" | "study type" | "paper type" => {
                current.get_or_insert_with(CitationRecord::default).paper_type =
                    Some(value.to_string())
            }
            _ => continue,
        }
        recognised = true;
    }

    draft.papers.extend(current);
    recognised.then_some(draft)
}

fn into_draft(record: DraftRecord) -> Result<TopicDraft, ParseError> {
    let citations: Vec<Citation> = record
        .papers
        .into_iter()
        .chain(record.paper)
        .filter_map(|r| match Citation::try_from(r) {
            Ok(c) => Some(c),
            Err(e) => {
                debug!(error = %e, "Dropping malformed citation");
                None
            }
        })
        .collect();

    let Some(lead) = citations.first() else {
        return Err(ParseError::NoCitations);
    };
    let name = record
        .name
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| lead.title.clone());

    Ok(TopicDraft {
        name,
        description: record.description.unwrap_or_default().trim().to_string(),
        expected_effect: record.expected_effect.unwrap_or_default().trim().to_string(),
        citations,
    })
}
