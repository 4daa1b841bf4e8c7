//! # Paper-First Core
//!
//! Core library for paper-first topic discovery.
//! Provides the discovery orchestrator, content oracle interface, candidate
//! filter, citation quality evaluator, result cache, configuration, and
//! fundamental types.

pub mod cache;
pub mod config;
pub mod discovery;
pub mod error;
pub mod evaluator;
pub mod filter;
pub mod oracle;
pub mod parse;
pub mod types;

// Re-export commonly used types at the crate root.
pub use cache::{CacheConfig, CacheStats, Fingerprint, RequestKind, ResultCache};
pub use config::{PaperFirstConfig, config_exists, load_config, load_validated};
pub use discovery::{DiscoveryConfig, DiscoveryOrchestrator};
pub use error::{PaperFirstError, Result};
pub use evaluator::{
    EvaluatorConfig, QualityAssessment, QualityEvaluator, QualityNote, QualitySummary,
};
pub use filter::{CandidateFilter, FilterConfig, FilterVerdict};
pub use oracle::{ContentOracle, GeminiOracle, OracleConfig, ScriptedOracle};
pub use parse::{TopicDraft, parse_candidate};
pub use types::{
    Citation, CitationBasis, CitationRecord, DiscoveryResult, GradedCitation, Grade,
    QualityMetrics, RawCandidate, StudyType, Termination, Topic,
};

/// Collapse runs of whitespace to single spaces and trim the ends.
pub(crate) fn fold_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// First number in `text`. `,` thousands separators are accepted and
/// everything after the number is ignored, so `"4.5 (2020)"` is `4.5`.
pub(crate) fn leading_number(text: &str) -> Option<f64> {
    let bytes = text.as_bytes();
    let start = bytes.iter().position(u8::is_ascii_digit)?;
    let mut number = String::new();
    if start > 0 && bytes[start - 1] == b'-' {
        number.push('-');
    }
    let mut fraction = false;
    for (i, &b) in bytes.iter().enumerate().skip(start) {
        let next = &bytes[i + 1..];
        if b.is_ascii_digit() {
            number.push(char::from(b));
        } else if b == b',' && !fraction && is_thousands_group(next) {
            continue;
        } else if b == b'.' && !fraction && next.first().is_some_and(u8::is_ascii_digit) {
            fraction = true;
            number.push('.');
        } else {
            break;
        }
    }
    number.parse().ok()
}

/// Exactly three digits, then a non-digit or the end.
fn is_thousands_group(rest: &[u8]) -> bool {
    rest.len() >= 3
        && rest[..3].iter().all(u8::is_ascii_digit)
        && !rest.get(3).is_some_and(u8::is_ascii_digit)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fold_whitespace() {
        assert_eq!(fold_whitespace("  a \t b\n\nc  "), "a b c");
        assert_eq!(fold_whitespace(""), "");
    }

    #[test]
    fn test_leading_number() {
        assert_eq!(leading_number("5.2 (2023)"), Some(5.2));
        assert_eq!(leading_number("4.5 (2020)"), Some(4.5));
        assert_eq!(leading_number("about 1200."), Some(1200.0));
        assert_eq!(leading_number("1,234"), Some(1234.0));
        assert_eq!(leading_number("12,345,678 citations"), Some(12_345_678.0));
        assert_eq!(leading_number("1,234.5"), Some(1234.5));
        assert_eq!(leading_number("3, 4"), Some(3.0));
        assert_eq!(leading_number("12,3456"), Some(12.0));
        assert_eq!(leading_number("-2.5"), Some(-2.5));
        assert_eq!(leading_number("2019-2020"), Some(2019.0));
        assert_eq!(leading_number("n/a"), None);
    }
}
