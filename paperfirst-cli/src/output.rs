//! Input readers and plain-text rendering for CLI output.

use anyhow::Context;
use paperfirst_core::{
    CacheStats, CitationRecord, DiscoveryResult, FilterVerdict, QualityAssessment, QualitySummary,
    Termination, Topic,
};
use serde_json::Value;
use std::fmt::Write as _;
use std::io::Read;
use std::path::Path;

/// Read a file, or stdin when `path` is `-`.
pub fn read_input(path: &Path) -> anyhow::Result<String> {
    if path.as_os_str() == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read stdin")?;
        return Ok(buf);
    }
    std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

/// Accepts a single citation object, an array of them, or an object holding
/// them under `papers` or `citations`.
pub fn parse_citation_records(text: &str) -> anyhow::Result<Vec<CitationRecord>> {
    let value: Value = serde_json::from_str(text).context("Input is not valid JSON")?;
    let items = match value {
        Value::Array(items) => items,
        Value::Object(mut map) => {
            // `citations` is also the count field of a single record.
            let key = ["papers", "citations"]
                .into_iter()
                .find(|k| map.get(*k).is_some_and(Value::is_array));
            match key.and_then(|k| map.remove(k)) {
                Some(Value::Array(items)) => items,
                _ => vec![Value::Object(map)],
            }
        }
        _ => anyhow::bail!("Expected a citation object or an array of citations"),
    };
    items
        .into_iter()
        .enumerate()
        .map(|(i, item)| {
            serde_json::from_value(item).with_context(|| format!("Citation #{} is malformed", i + 1))
        })
        .collect()
}

fn termination_label(termination: Termination) -> &'static str {
    match termination {
        Termination::CacheHit => "served from cache",
        Termination::TargetReached => "target reached",
        Termination::PartialAccepted => "partial result accepted",
        Termination::Exhausted => "attempts exhausted",
        Termination::Cancelled => "cancelled",
    }
}

fn render_topic(out: &mut String, index: usize, topic: &Topic) {
    let _ = writeln!(
        out,
        "{index}. {} [{} | {:.0}]",
        topic.name,
        topic.grade(),
        topic.quality.total
    );
    if !topic.description.is_empty() {
        let _ = writeln!(out, "   {}", topic.description);
    }
    if !topic.expected_effect.is_empty() {
        let _ = writeln!(out, "   Expected effect: {}", topic.expected_effect);
    }
    for graded in &topic.citations {
        let c = &graded.citation;
        let _ = write!(out, "   - {} ({}, {} {})", c.title, c.authors, c.venue, c.year);
        if let Some(id) = &c.identifier {
            let _ = write!(out, " doi:{id}");
        }
        let _ = writeln!(
            out,
            " [{} | {} | {:.0}]",
            c.study_type, graded.metrics.grade, graded.metrics.total
        );
    }
}

pub fn render_discovery(category: &str, result: &DiscoveryResult) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{category}: {} topic(s), {} ({} attempt(s))",
        result.topics.len(),
        termination_label(result.termination),
        result.attempts
    );
    if result.is_empty() {
        let _ = writeln!(out, "No paper-backed topics found.");
        return out;
    }
    for (i, topic) in result.topics.iter().enumerate() {
        let _ = writeln!(out);
        render_topic(&mut out, i + 1, topic);
    }
    out
}

pub fn render_assessments(assessments: &[QualityAssessment], summary: &QualitySummary) -> String {
    let mut out = String::new();
    for (i, a) in assessments.iter().enumerate() {
        let m = &a.metrics;
        let _ = writeln!(
            out,
            "#{}: {} ({:.0}) = type {:.1} + impact {:.1} + citations {:.1} + recency {:.1}",
            i + 1,
            m.grade,
            m.total,
            m.study_type_score,
            m.impact_score,
            m.citation_score,
            m.recency_score
        );
        for note in &a.strengths {
            let _ = writeln!(out, "    + {note}");
        }
        for note in &a.weaknesses {
            let _ = writeln!(out, "    - {note}");
        }
    }
    match summary.average_grade {
        Some(grade) => {
            let distribution = summary
                .distribution
                .iter()
                .rev()
                .map(|(g, n)| format!("{g}: {n}"))
                .collect::<Vec<_>>()
                .join(", ");
            let _ = writeln!(
                out,
                "\n{} citation(s), average {:.1} ({grade}); {distribution}",
                summary.count, summary.average_total
            );
        }
        None => {
            let _ = writeln!(out, "No citations could be graded.");
        }
    }
    out
}

pub fn render_verdict(index: usize, verdict: &FilterVerdict) -> String {
    match verdict {
        FilterVerdict::Accepted { signals } => {
            format!("#{index}: accepted ({})", signals.join(", "))
        }
        FilterVerdict::Evasive { phrase } => format!("#{index}: evasive (\"{phrase}\")"),
        FilterVerdict::Unsupported => format!("#{index}: no paper citation found"),
    }
}

pub fn render_stats(stats: &CacheStats, directory: Option<&Path>) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Entries in memory: {}", stats.entries);
    match directory {
        Some(dir) => {
            let _ = writeln!(out, "Entries on disk:   {} ({})", stats.persisted, dir.display());
        }
        None => {
            let _ = writeln!(out, "Entries on disk:   persistence disabled");
        }
    }
    let _ = writeln!(
        out,
        "Hits / misses:     {} / {} ({:.0}%)",
        stats.hits,
        stats.misses,
        stats.hit_rate() * 100.0
    );
    let _ = writeln!(out, "Evictions:         {}", stats.evictions);
    let _ = writeln!(out, "Corrupt files:     {}", stats.corrupt);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use paperfirst_core::{Citation, QualityEvaluator, StudyType};
    use pretty_assertions::assert_eq;

    fn citation() -> Citation {
        Citation {
            title: "Sleep extension and athletic performance".into(),
            authors: "Mah CD et al.".into(),
            venue: "Sleep".into(),
            year: 2011,
            identifier: Some("10.5665/SLEEP.1132".into()),
            impact_weight: 5.6,
            citation_count: 900,
            study_type: StudyType::RandomizedTrial,
        }
    }

    #[test]
    fn test_parse_citation_records_shapes() {
        let single = r#"{"title": "A", "authors": "B", "year": 2020}"#;
        assert_eq!(parse_citation_records(single).unwrap().len(), 1);

        let array = r#"[{"title": "A"}, {"title": "B"}]"#;
        assert_eq!(parse_citation_records(array).unwrap().len(), 2);

        let wrapped = r#"{"papers": [{"title": "A"}, {"title": "B"}, {"title": "C"}]}"#;
        assert_eq!(parse_citation_records(wrapped).unwrap().len(), 3);

        let wrapped = r#"{"citations": [{"title": "A"}]}"#;
        let records = parse_citation_records(wrapped).unwrap();
        assert_eq!(records[0].title.as_deref(), Some("A"));

        let counted = r#"{"title": "A", "citations": 150}"#;
        let records = parse_citation_records(counted).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].citations, Some(150));
    }

    #[test]
    fn test_parse_citation_records_rejects_bad_input() {
        assert!(parse_citation_records("not json").is_err());
        assert!(parse_citation_records("42").is_err());
        assert!(parse_citation_records(r#"[{"title": "A"}, 7]"#).is_err());
    }

    #[test]
    fn test_read_input_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("input.json");
        std::fs::write(&path, "[]").unwrap();
        assert_eq!(read_input(&path).unwrap(), "[]");
        assert!(read_input(&dir.path().join("missing.json")).is_err());
    }

    #[test]
    fn test_render_discovery() {
        let evaluator = QualityEvaluator::default().with_reference_year(2025);
        let graded = evaluator.grade(citation()).unwrap();
        let topic = Topic {
            id: uuid::Uuid::nil(),
            name: "Sleep extension".into(),
            description: "Longer sleep improved sprint times".into(),
            expected_effect: String::new(),
            quality: graded.metrics.clone(),
            citations: vec![graded],
        };
        let result = DiscoveryResult {
            topics: vec![topic],
            complete: true,
            termination: Termination::TargetReached,
            attempts: 2,
            oracle_calls: 2,
        };
        let text = render_discovery("sleep", &result);
        assert!(text.starts_with("sleep: 1 topic(s), target reached (2 attempt(s))"));
        assert!(text.contains("1. Sleep extension ["));
        assert!(text.contains("doi:10.5665/SLEEP.1132"));
        assert!(!text.contains("Expected effect"));
    }

    #[test]
    fn test_render_empty_discovery() {
        let result = DiscoveryResult {
            topics: vec![],
            complete: false,
            termination: Termination::Exhausted,
            attempts: 15,
            oracle_calls: 15,
        };
        assert_eq!(
            render_discovery("sleep", &result),
            "sleep: 0 topic(s), attempts exhausted (15 attempt(s))\nNo paper-backed topics found.\n"
        );
    }

    #[test]
    fn test_render_assessments_and_summary() {
        let evaluator = QualityEvaluator::default().with_reference_year(2025);
        let assessment = evaluator.assess(&citation()).unwrap();
        let graded = evaluator.grade(citation()).unwrap();
        let summary = evaluator.summarize(&[graded]);
        let text = render_assessments(&[assessment], &summary);
        assert!(text.starts_with("#1: "));
        assert!(text.contains("+ widely cited"));
        assert!(text.contains("- dated work"));
        assert!(text.contains("1 citation(s), average"));

        let empty = evaluator.summarize(&[]);
        assert_eq!(render_assessments(&[], &empty), "No citations could be graded.\n");
    }

    #[test]
    fn test_render_verdict() {
        let accepted = FilterVerdict::Accepted {
            signals: vec!["author_list".into(), "year".into()],
        };
        assert_eq!(render_verdict(1, &accepted), "#1: accepted (author_list, year)");
        let evasive = FilterVerdict::Evasive {
            phrase: "could not find".into(),
        };
        assert_eq!(render_verdict(2, &evasive), "#2: evasive (\"could not find\")");
        assert_eq!(
            render_verdict(3, &FilterVerdict::Unsupported),
            "#3: no paper citation found"
        );
    }

    #[test]
    fn test_render_stats() {
        let stats = CacheStats {
            entries: 2,
            persisted: 1,
            hits: 3,
            misses: 1,
            evictions: 0,
            corrupt: 0,
        };
        let text = render_stats(&stats, None);
        assert!(text.contains("Entries in memory: 2"));
        assert!(text.contains("persistence disabled"));
        assert!(text.contains("3 / 1 (75%)"));
    }
}
