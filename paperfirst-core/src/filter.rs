//! Candidate filter.
//!
//! Rejects oracle responses that carry no citation, or that admit there is
//! no literature behind the claim, before anything is parsed or scored:
//! - Evasion phrases ("could not find", "literature is limited", ...)
//! - A bare `null` response
//! - Responses without any paper-presence signal (labels, "X et al.",
//!   parenthetical years, DOI-shaped tokens)
//!
//! Evasion always wins over presence: a response that names a paper and
//! then admits it found nothing relevant is still rejected.

use regex::Regex;
use serde::{Deserialize, Serialize};
use unicode_normalization::UnicodeNormalization;

use crate::error::ConfigError;

/// A named regular expression whose match counts as evidence a paper is cited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalPattern {
    pub name: String,
    pub pattern: String,
}

impl SignalPattern {
    pub fn new(name: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            pattern: pattern.into(),
        }
    }
}

/// Filter settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Phrases that mark a response as evasive. Matched case-insensitively
    /// after Unicode normalization.
    pub evasion_phrases: Vec<String>,
    /// Signals of which at least one must match for a response to pass.
    pub paper_presence_signals: Vec<SignalPattern>,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            evasion_phrases: default_evasion_phrases(),
            paper_presence_signals: default_presence_signals(),
        }
    }
}

fn default_evasion_phrases() -> Vec<String> {
    [
        "could not find",
        "couldn't find",
        "cannot find",
        "unable to find",
        "unable to locate",
        "no relevant studies",
        "no relevant papers",
        "no relevant research",
        "literature is limited",
        "limited literature",
        "not aware of any",
        "no published studies",
        "there is no research",
        "no scientific evidence",
        "논문이 없",
        "찾을 수 없",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_presence_signals() -> Vec<SignalPattern> {
    vec![
        SignalPattern::new(
            "label",
            r"(?im)^\s*[-*]?\s*(?:paper|study|source|reference|citation)\s*:",
        ),
        SignalPattern::new("json_key", r#"(?i)"(?:papers|title)"\s*:"#),
        SignalPattern::new(
            "author_list",
            r"\b\p{Lu}[\p{L}'\-]+(?:\s+\p{Lu}{1,3})?,?\s+et\.?\s+al\b",
        ),
        SignalPattern::new("year", r"\([^()]{0,80}?\b(?:1[89]|20)\d{2}[a-z]?\b[^()]{0,80}\)"),
        SignalPattern::new("doi", r#"\b10\.\d{4,9}/[^\s"'<>]+"#),
    ]
}

/// Outcome of classifying one raw candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum FilterVerdict {
    /// At least one presence signal matched and no evasion phrase did.
    Accepted { signals: Vec<String> },
    /// An evasion phrase matched.
    Evasive { phrase: String },
    /// No presence signal matched.
    Unsupported,
}

impl FilterVerdict {
    pub fn is_accepted(&self) -> bool {
        matches!(self, FilterVerdict::Accepted { .. })
    }
}

/// Heuristic classifier for raw oracle candidates.
#[derive(Debug, Clone)]
pub struct CandidateFilter {
    evasion_phrases: Vec<String>,
    signals: Vec<(String, Regex)>,
}

impl Default for CandidateFilter {
    fn default() -> Self {
        Self {
            evasion_phrases: normalized_phrases(&default_evasion_phrases()),
            signals: default_presence_signals()
                .into_iter()
                .filter_map(|s| Regex::new(&s.pattern).ok().map(|re| (s.name, re)))
                .collect(),
        }
    }
}

impl CandidateFilter {
    /// Build a filter, compiling every configured signal.
    pub fn new(config: &FilterConfig) -> Result<Self, ConfigError> {
        let signals = config
            .paper_presence_signals
            .iter()
            .map(|s| {
                Regex::new(&s.pattern)
                    .map(|re| (s.name.clone(), re))
                    .map_err(|e| ConfigError::InvalidPattern {
                        name: s.name.clone(),
                        message: e.to_string(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            evasion_phrases: normalized_phrases(&config.evasion_phrases),
            signals,
        })
    }

    /// Classify a raw candidate.
    pub fn classify(&self, text: &str) -> FilterVerdict {
        let normalized = normalize_text(text);
        if normalized == "null" {
            return FilterVerdict::Evasive {
                phrase: "null".into(),
            };
        }
        if let Some(phrase) = self
            .evasion_phrases
            .iter()
            .find(|p| normalized.contains(p.as_str()))
        {
            return FilterVerdict::Evasive {
                phrase: phrase.clone(),
            };
        }

        let signals: Vec<String> = self
            .signals
            .iter()
            .filter(|(_, re)| re.is_match(text))
            .map(|(name, _)| name.clone())
            .collect();
        if signals.is_empty() {
            FilterVerdict::Unsupported
        } else {
            FilterVerdict::Accepted { signals }
        }
    }

    /// Whether a raw candidate appears to cite at least one paper.
    pub fn is_paper_backed(&self, text: &str) -> bool {
        self.classify(text).is_accepted()
    }
}

fn normalized_phrases(phrases: &[String]) -> Vec<String> {
    phrases
        .iter()
        .map(|p| normalize_text(p))
        .filter(|p| !p.is_empty())
        .collect()
}

/// NFKC, lowercase, fold typographic apostrophes, collapse whitespace.
fn normalize_text(text: &str) -> String {
    let folded: String = text
        .nfkc()
        .map(|c| match c {
            '\u{2018}' | '\u{2019}' | '\u{02BC}' | '\u{FF07}' => '\'',
            other => other,
        })
        .flat_map(char::to_lowercase)
        .collect();
    crate::fold_whitespace(&folded)
}
