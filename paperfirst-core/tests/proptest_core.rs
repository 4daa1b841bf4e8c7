//! Property-based tests for core components using proptest.

use proptest::prelude::*;

use paperfirst_core::cache::{Fingerprint, RequestKind};
use paperfirst_core::{
    CandidateFilter, Citation, CitationBasis, EvaluatorConfig, FilterVerdict, Grade, QualityEvaluator,
    StudyType,
};

const REFERENCE_YEAR: i32 = 2025;

fn study_type() -> impl Strategy<Value = StudyType> {
    prop_oneof![
        Just(StudyType::MetaAnalysis),
        Just(StudyType::SystematicReview),
        Just(StudyType::RandomizedTrial),
        Just(StudyType::Review),
        Just(StudyType::OriginalResearch),
        Just(StudyType::Other),
    ]
}

fn citation(study_type: StudyType, impact: f64, cites: u64, year: i32) -> Citation {
    Citation {
        title: "Exercise and cognition".into(),
        authors: "Erickson KI et al.".into(),
        venue: "PNAS".into(),
        year,
        identifier: None,
        impact_weight: impact,
        citation_count: cites,
        study_type,
    }
}

fn evaluator(basis: CitationBasis) -> QualityEvaluator {
    QualityEvaluator::new(&EvaluatorConfig {
        citation_basis: basis,
        ..Default::default()
    })
    .with_reference_year(REFERENCE_YEAR)
}

// --- Evaluator bounds ---

proptest! {
    #[test]
    fn total_is_bounded_rounded_sum(
        st in study_type(),
        impact in -50.0f64..200.0,
        cites in 0u64..1_000_000,
        year in 1900i32..=REFERENCE_YEAR + 1,
        per_year in any::<bool>(),
    ) {
        let basis = if per_year { CitationBasis::PerYear } else { CitationBasis::Raw };
        let m = evaluator(basis).evaluate(&citation(st, impact, cites, year)).unwrap();
        prop_assert!((0.0..=100.0).contains(&m.total));
        let sum = m.study_type_score + m.impact_score + m.citation_score + m.recency_score;
        prop_assert_eq!(m.total, sum.round().clamp(0.0, 100.0));
        prop_assert_eq!(m.grade, Grade::from_score(m.total));
        prop_assert_eq!(m.citation_basis, basis);
    }

    #[test]
    fn sub_scores_stay_within_ceilings(
        st in study_type(),
        impact in any::<f64>(),
        cites in any::<u64>(),
        year in 1900i32..=REFERENCE_YEAR + 1,
    ) {
        let m = evaluator(CitationBasis::Raw).evaluate(&citation(st, impact, cites, year)).unwrap();
        prop_assert!((0.0..=35.0).contains(&m.study_type_score));
        prop_assert!((0.0..=30.0).contains(&m.impact_score));
        prop_assert!((0.0..=20.0).contains(&m.citation_score));
        prop_assert!((0.0..=15.0).contains(&m.recency_score));
    }

    #[test]
    fn high_impact_saturates(impact in 15.0f64..1_000.0, st in study_type()) {
        let m = evaluator(CitationBasis::Raw).evaluate(&citation(st, impact, 0, 2000)).unwrap();
        prop_assert_eq!(m.impact_score, 30.0);
    }

    #[test]
    fn many_citations_saturate_raw_basis(cites in 200u64..10_000_000) {
        let m = evaluator(CitationBasis::Raw)
            .evaluate(&citation(StudyType::Review, 0.0, cites, 2000))
            .unwrap();
        prop_assert_eq!(m.citation_score, 20.0);
    }

    #[test]
    fn old_papers_get_no_recency(age in 5i32..=REFERENCE_YEAR - 1900) {
        let m = evaluator(CitationBasis::Raw)
            .evaluate(&citation(StudyType::Review, 0.0, 0, REFERENCE_YEAR - age))
            .unwrap();
        prop_assert_eq!(m.recency_score, 0.0);
    }

    #[test]
    fn current_and_next_year_papers_are_fully_recent(ahead in 0i32..=1, st in study_type()) {
        let m = evaluator(CitationBasis::Raw)
            .evaluate(&citation(st, 0.0, 0, REFERENCE_YEAR + ahead))
            .unwrap();
        prop_assert_eq!(m.recency_score, 15.0);
    }

    #[test]
    fn newer_is_never_less_recent(year in 1900i32..=REFERENCE_YEAR) {
        let e = evaluator(CitationBasis::Raw);
        let older = e.evaluate(&citation(StudyType::Review, 0.0, 0, year)).unwrap();
        let newer = e.evaluate(&citation(StudyType::Review, 0.0, 0, year + 1)).unwrap();
        prop_assert!(newer.recency_score >= older.recency_score);
    }

    #[test]
    fn implausible_years_are_rejected(
        year in prop_oneof![0i32..1900, REFERENCE_YEAR + 2..10_000],
        st in study_type(),
    ) {
        prop_assert!(evaluator(CitationBasis::Raw).evaluate(&citation(st, 15.0, 300, year)).is_err());
    }
}

// --- Filter precedence ---

const EVASIONS: &[&str] = &[
    "could not find",
    "no relevant studies",
    "literature is limited",
    "논문이 없",
];

proptest! {
    #[test]
    fn evasion_always_rejects(
        idx in 0..EVASIONS.len(),
        prefix in "[a-zA-Z ]{0,40}",
        suffix in "[a-zA-Z ]{0,40}",
        year in 1950u32..2025,
    ) {
        let filter = CandidateFilter::default();
        let text = format!(
            "{prefix} Smith et al. ({year}) doi 10.1000/xyz {} {suffix}",
            EVASIONS[idx].to_uppercase()
        );
        prop_assert!(!filter.is_paper_backed(&text));
    }

    #[test]
    fn author_list_with_year_is_accepted(
        surname in "[A-Z][a-z]{2,12}",
        year in 1950u32..2025,
        claim in "[a-z]{3,10}( [a-z]{3,10}){0,6}",
    ) {
        let filter = CandidateFilter::default();
        prop_assume!(!matches!(filter.classify(&claim), FilterVerdict::Evasive { .. }));
        let text = format!("{claim} ({surname} et al., {year})");
        prop_assert!(filter.is_paper_backed(&text));
    }
}

// --- Fingerprints ---

proptest! {
    #[test]
    fn fingerprint_ignores_case_and_spacing(words in prop::collection::vec("[a-z]{1,8}", 1..6)) {
        let compact = words.join(" ");
        let loose = format!("  {}  ", words.join("   ").to_uppercase());
        prop_assert_eq!(
            Fingerprint::new(RequestKind::Category, &compact),
            Fingerprint::new(RequestKind::Category, &loose)
        );
        prop_assert_ne!(
            Fingerprint::new(RequestKind::Category, &compact),
            Fingerprint::new(RequestKind::Topic, &compact)
        );
    }
}
