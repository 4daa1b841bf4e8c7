//! Core data model: citations, grades, quality metrics, and topics.
//!
//! Oracle output enters as an opaque [`RawCandidate`]. Only after it passes
//! the candidate filter is it parsed into loosely-typed [`CitationRecord`]s,
//! and only records that satisfy the [`Citation`] invariants are graded.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::EvaluationError;

/// Unparsed text of one oracle candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawCandidate(String);

impl RawCandidate {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl From<&str> for RawCandidate {
    fn from(text: &str) -> Self {
        Self::new(text)
    }
}

impl From<String> for RawCandidate {
    fn from(text: String) -> Self {
        Self(text)
    }
}

/// Study design of a cited paper.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StudyType {
    MetaAnalysis,
    SystematicReview,
    RandomizedTrial,
    Review,
    OriginalResearch,
    Other,
}

impl StudyType {
    /// Classify a free-text study design label.
    ///
    /// Combined designs resolve to the stronger one, so
    /// "Systematic Review & Meta-analysis" is a meta-analysis.
    pub fn from_label(label: &str) -> Self {
        let lower = label.trim().to_lowercase().replace(['_', '-'], " ");
        if lower.is_empty() {
            return StudyType::Other;
        }
        if lower.contains("meta") && lower.contains("analys") {
            StudyType::MetaAnalysis
        } else if lower.contains("systematic") && lower.contains("review") {
            StudyType::SystematicReview
        } else if lower.contains("randomi")
            || lower.split_whitespace().any(|w| w == "rct" || w == "rcts")
            || lower.contains("controlled trial")
        {
            StudyType::RandomizedTrial
        } else if lower.contains("review") {
            StudyType::Review
        } else if ["original", "research", "study", "article", "trial", "cohort"]
            .iter()
            .any(|kw| lower.contains(kw))
        {
            StudyType::OriginalResearch
        } else {
            StudyType::Other
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StudyType::MetaAnalysis => "meta-analysis",
            StudyType::SystematicReview => "systematic-review",
            StudyType::RandomizedTrial => "randomized-trial",
            StudyType::Review => "review",
            StudyType::OriginalResearch => "original-research",
            StudyType::Other => "other",
        }
    }
}

impl fmt::Display for StudyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Letter grade summarizing a citation's quality. Ordered from worst to best.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Grade {
    #[serde(rename = "C")]
    C,
    #[serde(rename = "B")]
    B,
    #[serde(rename = "B+")]
    BPlus,
    #[serde(rename = "A")]
    A,
    #[serde(rename = "A+")]
    APlus,
}

impl Grade {
    /// Grade for a total score. Lower bounds are inclusive.
    pub fn from_score(total: f64) -> Self {
        if total >= 80.0 {
            Grade::APlus
        } else if total >= 70.0 {
            Grade::A
        } else if total >= 60.0 {
            Grade::BPlus
        } else if total >= 50.0 {
            Grade::B
        } else {
            Grade::C
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Grade::APlus => "A+",
            Grade::A => "A",
            Grade::BPlus => "B+",
            Grade::B => "B",
            Grade::C => "C",
        }
    }
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Grade {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "A+" | "APLUS" | "A_PLUS" => Ok(Grade::APlus),
            "A" => Ok(Grade::A),
            "B+" | "BPLUS" | "B_PLUS" => Ok(Grade::BPlus),
            "B" => Ok(Grade::B),
            "C" => Ok(Grade::C),
            other => Err(format!("unknown grade '{other}' (expected A+, A, B+, B, or C)")),
        }
    }
}

/// How the citation sub-score treats citation counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CitationBasis {
    /// Total citations divided by ten.
    #[default]
    Raw,
    /// Citations per year since publication, doubled.
    PerYear,
}

/// A bibliographic record as the oracle proposed it. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CitationRecord {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_authors")]
    pub authors: Option<String>,
    #[serde(default, alias = "venue")]
    pub journal: Option<String>,
    #[serde(default, alias = "publication_year", deserialize_with = "lenient::opt_i64")]
    pub year: Option<i64>,
    #[serde(default, alias = "identifier")]
    pub doi: Option<String>,
    #[serde(default, alias = "impact_weight", deserialize_with = "lenient::opt_f64")]
    pub impact_factor: Option<f64>,
    #[serde(default, alias = "citation_count", deserialize_with = "lenient::opt_i64")]
    pub citations: Option<i64>,
    #[serde(default, alias = "study_type", alias = "type")]
    pub paper_type: Option<String>,
}

/// Earliest publication year accepted for a citation.
pub const MIN_PUBLICATION_YEAR: i32 = 1900;

/// A validated academic source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    pub title: String,
    pub authors: String,
    pub venue: String,
    pub year: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
    #[serde(default)]
    pub impact_weight: f64,
    #[serde(default)]
    pub citation_count: u64,
    pub study_type: StudyType,
}

impl Citation {
    /// Check the required-field invariant.
    pub fn validate(&self) -> Result<(), EvaluationError> {
        if self.title.trim().is_empty() {
            return Err(EvaluationError::MalformedCitation {
                reason: "title is empty".into(),
            });
        }
        if self.authors.trim().is_empty() {
            return Err(EvaluationError::MalformedCitation {
                reason: "authors are empty".into(),
            });
        }
        if self.year < MIN_PUBLICATION_YEAR {
            return Err(EvaluationError::MalformedCitation {
                reason: format!("year {} is before {MIN_PUBLICATION_YEAR}", self.year),
            });
        }
        Ok(())
    }

    /// Key used to recognise the same source proposed twice.
    pub fn dedup_key(&self) -> String {
        format!(
            "{}|{}",
            crate::fold_whitespace(&self.title.to_lowercase()),
            crate::fold_whitespace(&self.authors.to_lowercase())
        )
    }
}

impl TryFrom<CitationRecord> for Citation {
    type Error = EvaluationError;

    fn try_from(record: CitationRecord) -> Result<Self, Self::Error> {
        let title = record.title.unwrap_or_default().trim().to_string();
        let authors = record.authors.unwrap_or_default().trim().to_string();
        let year = match record.year {
            Some(y) if (i64::from(MIN_PUBLICATION_YEAR)..=9999).contains(&y) => y as i32,
            Some(y) => {
                return Err(EvaluationError::MalformedCitation {
                    reason: format!("year {y} is not a plausible publication year"),
                });
            }
            None => {
                return Err(EvaluationError::MalformedCitation {
                    reason: "publication year is missing".into(),
                });
            }
        };
        let impact_weight = match record.impact_factor {
            Some(v) if v.is_finite() && v > 0.0 => v,
            _ => 0.0,
        };
        let citation = Citation {
            title,
            authors,
            venue: record.journal.unwrap_or_default().trim().to_string(),
            year,
            identifier: record
                .doi
                .map(|d| d.trim().to_string())
                .filter(|d| !d.is_empty() && !d.eq_ignore_ascii_case("null")),
            impact_weight,
            citation_count: record.citations.unwrap_or(0).max(0) as u64,
            study_type: record
                .paper_type
                .as_deref()
                .map(StudyType::from_label)
                .unwrap_or(StudyType::Other),
        };
        citation.validate()?;
        Ok(citation)
    }
}

/// Rubric scores for one citation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityMetrics {
    pub study_type_score: f64,
    pub impact_score: f64,
    pub citation_score: f64,
    pub recency_score: f64,
    /// Rounded sum of the four sub-scores, clamped to [0, 100].
    pub total: f64,
    pub grade: Grade,
    pub citation_basis: CitationBasis,
}

/// A citation stored together with the scores it was accepted on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradedCitation {
    #[serde(flatten)]
    pub citation: Citation,
    pub metrics: QualityMetrics,
}

/// An accepted content theme backed by at least one graded citation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Topic {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub expected_effect: String,
    /// Best citation first.
    pub citations: Vec<GradedCitation>,
    /// Metrics of the best-supporting citation.
    pub quality: QualityMetrics,
}

impl Topic {
    /// The best-supporting citation. `None` only for a hand-built topic
    /// without citations.
    pub fn lead(&self) -> Option<&GradedCitation> {
        self.citations.first()
    }

    pub fn grade(&self) -> Grade {
        self.quality.grade
    }
}

/// How a discovery call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    /// Served from a live cache entry without calling the oracle.
    CacheHit,
    /// The target count was reached.
    TargetReached,
    /// The attempt budget ran out but partial results were accepted.
    PartialAccepted,
    /// The attempt budget ran out below the target.
    Exhausted,
    /// The caller cancelled the run.
    Cancelled,
}

/// Outcome of one discovery call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryResult {
    pub topics: Vec<Topic>,
    /// False when fewer topics than requested were found.
    pub complete: bool,
    pub termination: Termination,
    /// Attempts consumed, including failed oracle calls.
    pub attempts: usize,
    /// Oracle calls that returned a response.
    pub oracle_calls: usize,
}

impl DiscoveryResult {
    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }
}

/// Tolerant deserializers for oracle-proposed numbers and author lists.
mod lenient {
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    fn number(value: Value) -> Option<f64> {
        match value {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => crate::leading_number(&s),
            _ => None,
        }
    }

    pub fn opt_f64<'de, D: Deserializer<'de>>(d: D) -> Result<Option<f64>, D::Error> {
        Ok(Option::<Value>::deserialize(d)?.and_then(number))
    }

    pub fn opt_i64<'de, D: Deserializer<'de>>(d: D) -> Result<Option<i64>, D::Error> {
        Ok(Option::<Value>::deserialize(d)?
            .and_then(number)
            .map(|n| n.round() as i64))
    }

    pub fn opt_authors<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
        Ok(match Option::<Value>::deserialize(d)? {
            Some(Value::String(s)) => Some(s),
            Some(Value::Array(items)) => Some(
                items
                    .into_iter()
                    .filter_map(|v| match v {
                        Value::String(s) => Some(s),
                        Value::Object(map) => map
                            .get("name")
                            .and_then(|n| n.as_str())
                            .map(str::to_string),
                        _ => None,
                    })
                    .collect::<Vec<_>>()
                    .join(", "),
            ),
            _ => None,
        })
    }
}
