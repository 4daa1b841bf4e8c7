//! Deterministic citation quality rubric.
//!
//! Four bounded sub-scores are summed into a 0-100 total and mapped to a
//! letter grade:
//!
//! | Sub-score  | Formula                                   | Ceiling |
//! |------------|-------------------------------------------|---------|
//! | study type | lookup in [`StudyTypeWeights`]            | 35      |
//! | impact     | `impact_weight * 2`                       | 30      |
//! | citations  | `citation_count / 10` (or per-year basis) | 20      |
//! | recency    | `15 - 3 * age_in_years`, floor 0          | 15      |
//!
//! The evaluator holds no mutable state and never calls out.

use chrono::Datelike;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::EvaluationError;
use crate::types::{Citation, CitationBasis, GradedCitation, Grade, QualityMetrics, StudyType};

const IMPACT_CEILING: f64 = 30.0;
const CITATION_CEILING: f64 = 20.0;
const RECENCY_CEILING: f64 = 15.0;
const RECENCY_DECAY_PER_YEAR: f64 = 3.0;

/// Point values per study design.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StudyTypeWeights {
    pub meta_analysis: f64,
    pub systematic_review: f64,
    pub randomized_trial: f64,
    pub review: f64,
    pub original_research: f64,
    pub other: f64,
}

impl Default for StudyTypeWeights {
    fn default() -> Self {
        Self {
            meta_analysis: 35.0,
            systematic_review: 30.0,
            randomized_trial: 25.0,
            review: 20.0,
            original_research: 10.0,
            other: 10.0,
        }
    }
}

impl StudyTypeWeights {
    pub fn score(&self, study_type: StudyType) -> f64 {
        match study_type {
            StudyType::MetaAnalysis => self.meta_analysis,
            StudyType::SystematicReview => self.systematic_review,
            StudyType::RandomizedTrial => self.randomized_trial,
            StudyType::Review => self.review,
            StudyType::OriginalResearch => self.original_research,
            StudyType::Other => self.other,
        }
    }

    /// Largest configured weight; bounds the study-type sub-score.
    pub fn max_weight(&self) -> f64 {
        [
            self.meta_analysis,
            self.systematic_review,
            self.randomized_trial,
            self.review,
            self.original_research,
            self.other,
        ]
        .into_iter()
        .fold(0.0, f64::max)
    }
}

/// Evaluator settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluatorConfig {
    pub study_type_weights: StudyTypeWeights,
    pub citation_basis: CitationBasis,
}

/// Observations explaining why a citation scored the way it did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityNote {
    StrongStudyDesign,
    WeakStudyDesign,
    HighImpactVenue,
    LowImpactVenue,
    WidelyCited,
    RarelyCited,
    Recent,
    Dated,
}

impl fmt::Display for QualityNote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            QualityNote::StrongStudyDesign => "high level of evidence in the study design",
            QualityNote::WeakStudyDesign => "low level of evidence in the study design",
            QualityNote::HighImpactVenue => "published in a high-impact venue",
            QualityNote::LowImpactVenue => "published in a low-impact venue",
            QualityNote::WidelyCited => "widely cited",
            QualityNote::RarelyCited => "rarely cited",
            QualityNote::Recent => "recent work",
            QualityNote::Dated => "dated work",
        };
        f.write_str(text)
    }
}

/// Metrics plus the strengths and weaknesses behind them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityAssessment {
    pub metrics: QualityMetrics,
    pub strengths: Vec<QualityNote>,
    pub weaknesses: Vec<QualityNote>,
}

/// Aggregate view over a set of graded citations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualitySummary {
    pub count: usize,
    /// Mean total, rounded to one decimal.
    pub average_total: f64,
    /// Grade of the mean total; `None` for an empty set.
    pub average_grade: Option<Grade>,
    pub distribution: BTreeMap<Grade, usize>,
}

/// Grades citations against a fixed, explainable rubric.
#[derive(Debug, Clone)]
pub struct QualityEvaluator {
    weights: StudyTypeWeights,
    basis: CitationBasis,
    reference_year: Option<i32>,
}

impl Default for QualityEvaluator {
    fn default() -> Self {
        Self::new(&EvaluatorConfig::default())
    }
}

impl QualityEvaluator {
    pub fn new(config: &EvaluatorConfig) -> Self {
        Self {
            weights: config.study_type_weights.clone(),
            basis: config.citation_basis,
            reference_year: None,
        }
    }

    /// Pin the year recency is measured against instead of the current year.
    pub fn with_reference_year(mut self, year: i32) -> Self {
        self.reference_year = Some(year);
        self
    }

    pub fn reference_year(&self) -> i32 {
        self.reference_year
            .unwrap_or_else(|| chrono::Utc::now().year())
    }

    pub fn basis(&self) -> CitationBasis {
        self.basis
    }

    /// Score a citation.
    ///
    /// Fails when required text fields are missing or the year is implausible
    /// (before 1900 or more than a year past the reference year). Every other
    /// numeric input is clamped into its valid range.
    pub fn evaluate(&self, citation: &Citation) -> Result<QualityMetrics, EvaluationError> {
        citation.validate()?;

        let reference_year = self.reference_year();
        if citation.year > reference_year + 1 {
            return Err(EvaluationError::MalformedCitation {
                reason: format!(
                    "year {} is after {}",
                    citation.year,
                    reference_year + 1
                ),
            });
        }
        let age = (reference_year - citation.year).max(0);

        let study_type_score = clamp_score(
            self.weights.score(citation.study_type),
            self.weights.max_weight(),
        );
        let impact_score = clamp_score(citation.impact_weight * 2.0, IMPACT_CEILING);
        let citation_score = match self.basis {
            CitationBasis::Raw => {
                clamp_score(citation.citation_count as f64 / 10.0, CITATION_CEILING)
            }
            CitationBasis::PerYear => {
                let per_year = citation.citation_count as f64 / age.max(1) as f64;
                clamp_score(per_year * 2.0, CITATION_CEILING)
            }
        };
        let recency_score = clamp_score(
            RECENCY_CEILING - RECENCY_DECAY_PER_YEAR * age as f64,
            RECENCY_CEILING,
        );

        let total = (study_type_score + impact_score + citation_score + recency_score)
            .round()
            .clamp(0.0, 100.0);

        Ok(QualityMetrics {
            study_type_score,
            impact_score,
            citation_score,
            recency_score,
            total,
            grade: Grade::from_score(total),
            citation_basis: self.basis,
        })
    }

    /// Score a citation and attach it to its metrics.
    pub fn grade(&self, citation: Citation) -> Result<GradedCitation, EvaluationError> {
        let metrics = self.evaluate(&citation)?;
        Ok(GradedCitation { citation, metrics })
    }

    /// Score a citation and explain the result.
    pub fn assess(&self, citation: &Citation) -> Result<QualityAssessment, EvaluationError> {
        let metrics = self.evaluate(citation)?;
        let mut strengths = Vec::new();
        let mut weaknesses = Vec::new();

        if metrics.study_type_score >= 30.0 {
            strengths.push(QualityNote::StrongStudyDesign);
        } else if metrics.study_type_score <= 15.0 {
            weaknesses.push(QualityNote::WeakStudyDesign);
        }
        if metrics.impact_score >= 20.0 {
            strengths.push(QualityNote::HighImpactVenue);
        } else if metrics.impact_score <= 10.0 {
            weaknesses.push(QualityNote::LowImpactVenue);
        }
        if metrics.citation_score >= 15.0 {
            strengths.push(QualityNote::WidelyCited);
        } else if metrics.citation_score <= 5.0 {
            weaknesses.push(QualityNote::RarelyCited);
        }
        if metrics.recency_score >= 12.0 {
            strengths.push(QualityNote::Recent);
        } else if metrics.recency_score <= 3.0 {
            weaknesses.push(QualityNote::Dated);
        }

        Ok(QualityAssessment {
            metrics,
            strengths,
            weaknesses,
        })
    }

    /// Summarize a set of already graded citations.
    pub fn summarize(&self, graded: &[GradedCitation]) -> QualitySummary {
        if graded.is_empty() {
            return QualitySummary {
                count: 0,
                average_total: 0.0,
                average_grade: None,
                distribution: BTreeMap::new(),
            };
        }

        let mut distribution = BTreeMap::new();
        for g in graded {
            *distribution.entry(g.metrics.grade).or_insert(0) += 1;
        }
        let mean = graded.iter().map(|g| g.metrics.total).sum::<f64>() / graded.len() as f64;

        QualitySummary {
            count: graded.len(),
            average_total: (mean * 10.0).round() / 10.0,
            average_grade: Some(Grade::from_score(mean)),
            distribution,
        }
    }
}

/// Clamp into `[0, ceiling]`, mapping NaN to zero.
fn clamp_score(value: f64, ceiling: f64) -> f64 {
    if value.is_nan() {
        return 0.0;
    }
    value.clamp(0.0, ceiling.max(0.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    const YEAR: i32 = 2025;

    fn evaluator() -> QualityEvaluator {
        QualityEvaluator::default().with_reference_year(YEAR)
    }

    fn citation(study_type: StudyType, impact: f64, cites: u64, year: i32) -> Citation {
        Citation {
            title: "Resistance training volume and hypertrophy".into(),
            authors: "Schoenfeld BJ et al.".into(),
            venue: "Journal of Sports Sciences".into(),
            year,
            identifier: Some("10.1080/02640414.2016.1210197".into()),
            impact_weight: impact,
            citation_count: cites,
            study_type,
        }
    }

    #[test]
    fn test_study_type_lookup() {
        let e = evaluator();
        let score = |t| e.evaluate(&citation(t, 0.0, 0, 2000)).unwrap().study_type_score;
        assert_eq!(score(StudyType::MetaAnalysis), 35.0);
        assert_eq!(score(StudyType::SystematicReview), 30.0);
        assert_eq!(score(StudyType::RandomizedTrial), 25.0);
        assert_eq!(score(StudyType::Review), 20.0);
        assert_eq!(score(StudyType::OriginalResearch), 10.0);
        assert_eq!(score(StudyType::Other), 10.0);
    }

    #[test]
    fn test_impact_ceiling() {
        let e = evaluator();
        let m = e
            .evaluate(&citation(StudyType::Review, 4.5, 0, YEAR))
            .unwrap();
        assert_eq!(m.impact_score, 9.0);
        let m = e
            .evaluate(&citation(StudyType::Review, 15.0, 0, YEAR))
            .unwrap();
        assert_eq!(m.impact_score, 30.0);
        let m = e
            .evaluate(&citation(StudyType::Review, 64.8, 0, YEAR))
            .unwrap();
        assert_eq!(m.impact_score, 30.0);
    }

    #[test]
    fn test_citation_ceiling_raw() {
        let e = evaluator();
        let m = e
            .evaluate(&citation(StudyType::Review, 0.0, 55, YEAR))
            .unwrap();
        assert!((m.citation_score - 5.5).abs() < 1e-9);
        let m = e
            .evaluate(&citation(StudyType::Review, 0.0, 200, YEAR))
            .unwrap();
        assert_eq!(m.citation_score, 20.0);
        assert_eq!(m.citation_basis, CitationBasis::Raw);
    }

    #[test]
    fn test_citation_per_year_basis() {
        let config = EvaluatorConfig {
            citation_basis: CitationBasis::PerYear,
            ..Default::default()
        };
        let e = QualityEvaluator::new(&config).with_reference_year(YEAR);
        // 40 citations over 4 years -> 10/year -> 20 points
        let m = e
            .evaluate(&citation(StudyType::Review, 0.0, 40, YEAR - 4))
            .unwrap();
        assert_eq!(m.citation_score, 20.0);
        // Same-year paper divides by one year, not zero
        let m = e
            .evaluate(&citation(StudyType::Review, 0.0, 3, YEAR))
            .unwrap();
        assert_eq!(m.citation_score, 6.0);
        assert_eq!(m.citation_basis, CitationBasis::PerYear);
    }

    #[test]
    fn test_recency_decay() {
        let e = evaluator();
        let recency = |year| {
            e.evaluate(&citation(StudyType::Review, 0.0, 0, year))
                .unwrap()
                .recency_score
        };
        assert_eq!(recency(YEAR), 15.0);
        assert_eq!(recency(YEAR - 1), 12.0);
        assert_eq!(recency(YEAR - 4), 3.0);
        assert_eq!(recency(YEAR - 5), 0.0);
        assert_eq!(recency(YEAR - 30), 0.0);
        // In-press papers dated next year never exceed the ceiling
        assert_eq!(recency(YEAR + 1), 15.0);
    }

    #[test]
    fn test_implausible_years_are_rejected() {
        let e = evaluator();
        let eval = |year| e.evaluate(&citation(StudyType::MetaAnalysis, 15.0, 300, year));
        assert!(eval(YEAR + 1).is_ok());
        assert!(matches!(
            eval(YEAR + 2),
            Err(EvaluationError::MalformedCitation { .. })
        ));
        assert!(eval(9999).is_err());
        assert!(eval(1900).is_ok());
        assert!(eval(1899).is_err());
        assert!(eval(1000).is_err());
    }

    #[test]
    fn test_total_and_grade() {
        let e = evaluator();
        // 35 + 10.4 + 15 + 12 = 72.4 -> 72 -> A
        let m = e
            .evaluate(&citation(StudyType::MetaAnalysis, 5.2, 150, YEAR - 1))
            .unwrap();
        assert_eq!(m.total, 72.0);
        assert_eq!(m.grade, Grade::A);

        // 35 + 30 + 20 + 15 = 100 -> A+
        let m = e
            .evaluate(&citation(StudyType::MetaAnalysis, 20.0, 500, YEAR))
            .unwrap();
        assert_eq!(m.total, 100.0);
        assert_eq!(m.grade, Grade::APlus);

        // 10 + 0 + 0 + 0 -> C
        let m = e
            .evaluate(&citation(StudyType::Other, 0.0, 0, 1990))
            .unwrap();
        assert_eq!(m.total, 10.0);
        assert_eq!(m.grade, Grade::C);
    }

    #[test]
    fn test_out_of_range_inputs_clamp() {
        let e = evaluator();
        let mut c = citation(StudyType::Review, f64::NAN, 0, YEAR);
        assert_eq!(e.evaluate(&c).unwrap().impact_score, 0.0);
        c.impact_weight = -7.0;
        assert_eq!(e.evaluate(&c).unwrap().impact_score, 0.0);
        c.impact_weight = f64::INFINITY;
        assert_eq!(e.evaluate(&c).unwrap().impact_score, 30.0);
        c.citation_count = u64::MAX;
        assert_eq!(e.evaluate(&c).unwrap().citation_score, 20.0);
    }

    #[test]
    fn test_malformed_citation_fails() {
        let e = evaluator();
        let mut c = citation(StudyType::Review, 1.0, 1, YEAR);
        c.title = String::new();
        assert!(matches!(
            e.evaluate(&c),
            Err(EvaluationError::MalformedCitation { .. })
        ));
        let mut c = citation(StudyType::Review, 1.0, 1, YEAR);
        c.authors = "  ".into();
        assert!(e.evaluate(&c).is_err());
    }

    #[test]
    fn test_custom_weights() {
        let config = EvaluatorConfig {
            study_type_weights: StudyTypeWeights {
                original_research: 18.0,
                ..Default::default()
            },
            ..Default::default()
        };
        let e = QualityEvaluator::new(&config).with_reference_year(YEAR);
        let m = e
            .evaluate(&citation(StudyType::OriginalResearch, 0.0, 0, 2000))
            .unwrap();
        assert_eq!(m.study_type_score, 18.0);
    }

    #[test]
    fn test_assess_notes() {
        let e = evaluator();
        let a = e
            .assess(&citation(StudyType::MetaAnalysis, 12.0, 300, YEAR))
            .unwrap();
        assert_eq!(
            a.strengths,
            vec![
                QualityNote::StrongStudyDesign,
                QualityNote::HighImpactVenue,
                QualityNote::WidelyCited,
                QualityNote::Recent
            ]
        );
        assert!(a.weaknesses.is_empty());

        let a = e
            .assess(&citation(StudyType::Other, 1.0, 10, 2001))
            .unwrap();
        assert!(a.strengths.is_empty());
        assert_eq!(
            a.weaknesses,
            vec![
                QualityNote::WeakStudyDesign,
                QualityNote::LowImpactVenue,
                QualityNote::RarelyCited,
                QualityNote::Dated
            ]
        );
    }

    #[test]
    fn test_summarize() {
        let e = evaluator();
        let graded: Vec<_> = [
            citation(StudyType::MetaAnalysis, 20.0, 500, YEAR),
            citation(StudyType::Other, 0.0, 0, 1990),
        ]
        .into_iter()
        .map(|c| e.grade(c).unwrap())
        .collect();
        let summary = e.summarize(&graded);
        assert_eq!(summary.count, 2);
        assert_eq!(summary.average_total, 55.0);
        assert_eq!(summary.average_grade, Some(Grade::B));
        assert_eq!(summary.distribution.get(&Grade::APlus), Some(&1));
        assert_eq!(summary.distribution.get(&Grade::C), Some(&1));
    }

    #[test]
    fn test_summarize_empty() {
        let summary = evaluator().summarize(&[]);
        assert_eq!(summary.count, 0);
        assert!(summary.average_grade.is_none());
        assert!(summary.distribution.is_empty());
    }

    #[test]
    fn test_quality_note_display() {
        assert_eq!(QualityNote::WidelyCited.to_string(), "widely cited");
    }
}
