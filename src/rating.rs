// 🏅 SAC Rating Engine - knowledge + compliance + reduction effort → score, grade, percentile
//
// overall = knowledge * w_k + compliance * w_c + reduction * w_r
//
// Weights and grade thresholds are configuration, never constants in the
// scoring path. The defaults weight the three signals equally and use the
// A / B+ / B / C / D scale shown on the dashboard.

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{CarbonError, Result};
use crate::models::{RatingAssessment, SubScores};
use crate::store::RecordStore;

/// Allowed drift when checking that the weights sum to one.
const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

// ============================================================================
// CONFIGURATION
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RatingWeights {
    pub knowledge_weight: f64,
    pub compliance_weight: f64,
    pub reduction_weight: f64,
}

impl Default for RatingWeights {
    fn default() -> Self {
        RatingWeights {
            knowledge_weight: 1.0 / 3.0,
            compliance_weight: 1.0 / 3.0,
            reduction_weight: 1.0 / 3.0,
        }
    }
}

impl RatingWeights {
    pub fn validate(&self) -> Result<()> {
        let named = [
            ("knowledgeWeight", self.knowledge_weight),
            ("complianceWeight", self.compliance_weight),
            ("reductionWeight", self.reduction_weight),
        ];

        for (name, weight) in named {
            if !weight.is_finite() || weight < 0.0 {
                return Err(CarbonError::out_of_range(
                    name,
                    format!("weight {} must be a non-negative number", weight),
                ));
            }
        }

        let sum: f64 = named.iter().map(|(_, w)| w).sum();
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(CarbonError::out_of_range(
                "weights",
                format!("weights sum to {}, expected 1.0", sum),
            ));
        }

        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeBand {
    pub min_score: f64,
    pub grade: String,
}

impl GradeBand {
    fn new(min_score: f64, grade: &str) -> Self {
        GradeBand {
            min_score,
            grade: grade.to_string(),
        }
    }
}

/// Step function from overall score to letter grade. Bands are checked in
/// order; the first whose `min_score` the score reaches wins, otherwise the
/// floor grade applies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeScale {
    pub bands: Vec<GradeBand>,
    pub floor_grade: String,
}

impl Default for GradeScale {
    fn default() -> Self {
        GradeScale {
            bands: vec![
                GradeBand::new(90.0, "A"),
                GradeBand::new(80.0, "B+"),
                GradeBand::new(70.0, "B"),
                GradeBand::new(60.0, "C"),
            ],
            floor_grade: "D".to_string(),
        }
    }
}

impl GradeScale {
    /// Thresholds must sit in [0, 100] and strictly descend so the mapping
    /// stays monotonic.
    pub fn validate(&self) -> Result<()> {
        if self.floor_grade.trim().is_empty() {
            return Err(CarbonError::out_of_range("floorGrade", "grade label is empty"));
        }

        let mut previous: Option<f64> = None;
        for band in &self.bands {
            if !band.min_score.is_finite() || !(0.0..=100.0).contains(&band.min_score) {
                return Err(CarbonError::out_of_range(
                    "minScore",
                    format!("threshold {} for grade {} is outside [0, 100]", band.min_score, band.grade),
                ));
            }
            if band.grade.trim().is_empty() {
                return Err(CarbonError::out_of_range("grade", "grade label is empty"));
            }
            if let Some(prev) = previous {
                if band.min_score >= prev {
                    return Err(CarbonError::out_of_range(
                        "minScore",
                        format!("thresholds must strictly descend: {} follows {}", band.min_score, prev),
                    ));
                }
            }
            previous = Some(band.min_score);
        }

        Ok(())
    }

    pub fn grade_for(&self, score: f64) -> &str {
        self.bands
            .iter()
            .find(|band| score >= band.min_score)
            .map(|band| band.grade.as_str())
            .unwrap_or(&self.floor_grade)
    }

    pub fn top_grade(&self) -> &str {
        self.bands
            .first()
            .map(|band| band.grade.as_str())
            .unwrap_or(&self.floor_grade)
    }

    pub fn bottom_grade(&self) -> &str {
        &self.floor_grade
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RatingConfig {
    pub weights: RatingWeights,
    pub grade_scale: GradeScale,
}

// ============================================================================
// RESULTS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rating {
    pub overall: f64,
    pub grade: String,
    pub sub_scores: SubScores,
}

/// Position of a company within its peer group. Rank 1 is the best score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Percentile {
    pub rank: usize,
    pub peer_count: usize,
    /// Rank expressed as "top N%": rank 1 of 4 is 25.0.
    pub top_percent: f64,
}

impl Percentile {
    pub fn label(&self) -> String {
        format!("top {:.0}%", self.top_percent.ceil())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RatingTrend {
    FirstAssessment,
    Improved,
    Declined,
    Unchanged,
}

impl RatingTrend {
    pub fn as_str(&self) -> &'static str {
        match self {
            RatingTrend::FirstAssessment => "First assessment",
            RatingTrend::Improved => "Improved",
            RatingTrend::Declined => "Declined",
            RatingTrend::Unchanged => "Unchanged",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RatingSummary {
    pub overall: f64,
    pub grade: String,
    pub sub_scores: SubScores,
    pub percentile: Option<Percentile>,
    pub trend: RatingTrend,
    /// Compliance points gained since the previous assessment.
    pub compliance_change: Option<f64>,
    pub assessment_date: NaiveDate,
}

// ============================================================================
// RATING ENGINE
// ============================================================================

pub struct RatingEngine {
    weights: RatingWeights,
    scale: GradeScale,
}

impl RatingEngine {
    /// Build an engine from configuration, rejecting weights that do not sum
    /// to one and grade scales that are not monotonic.
    pub fn new(config: RatingConfig) -> Result<Self> {
        config.weights.validate()?;
        config.grade_scale.validate()?;

        Ok(RatingEngine {
            weights: config.weights,
            scale: config.grade_scale,
        })
    }

    pub fn weights(&self) -> &RatingWeights {
        &self.weights
    }

    pub fn grade_scale(&self) -> &GradeScale {
        &self.scale
    }

    pub fn compute_rating(&self, knowledge: f64, compliance: f64, reduction: f64) -> Result<Rating> {
        check_score("knowledgeScore", knowledge)?;
        check_score("complianceScore", compliance)?;
        check_score("reductionScore", reduction)?;

        let raw = knowledge * self.weights.knowledge_weight
            + compliance * self.weights.compliance_weight
            + reduction * self.weights.reduction_weight;

        // Two decimals absorbs float drift from weights like 1/3
        let overall = ((raw * 100.0).round() / 100.0).clamp(0.0, 100.0);

        Ok(Rating {
            overall,
            grade: self.scale.grade_for(overall).to_string(),
            sub_scores: SubScores {
                knowledge,
                compliance,
                reduction,
            },
        })
    }

    /// Rate a company and append the assessment to its history.
    pub fn assess<S: RecordStore + ?Sized>(
        &self,
        store: &mut S,
        company_id: &str,
        scores: SubScores,
        assessment_date: NaiveDate,
        notes: Option<String>,
    ) -> Result<RatingAssessment> {
        let rating = self.compute_rating(scores.knowledge, scores.compliance, scores.reduction)?;

        let assessment = RatingAssessment {
            id: uuid::Uuid::new_v4().to_string(),
            company_id: company_id.to_string(),
            knowledge_score: scores.knowledge,
            compliance_score: scores.compliance,
            reduction_score: scores.reduction,
            overall_score: rating.overall,
            grade: rating.grade,
            assessment_date,
            notes,
            created_at: Utc::now(),
        };

        let stored = store.insert_assessment(&assessment)?;
        tracing::info!(
            company_id,
            overall = stored.overall_score,
            grade = %stored.grade,
            "recorded SAC assessment"
        );

        Ok(stored)
    }

    /// Percentile of `company_id` among `peers`. Only each company's latest
    /// assessment counts. Higher scores rank first; equal scores go to the
    /// earlier assessment.
    pub fn rank(company_id: &str, peers: &[RatingAssessment]) -> Result<Percentile> {
        let mut latest: HashMap<&str, &RatingAssessment> = HashMap::new();
        for assessment in peers {
            latest
                .entry(assessment.company_id.as_str())
                .and_modify(|current| {
                    if (assessment.assessment_date, assessment.created_at)
                        > (current.assessment_date, current.created_at)
                    {
                        *current = assessment;
                    }
                })
                .or_insert(assessment);
        }

        let mut ranked: Vec<&RatingAssessment> = latest.into_values().collect();
        ranked.sort_by(|a, b| {
            b.overall_score
                .total_cmp(&a.overall_score)
                .then(a.assessment_date.cmp(&b.assessment_date))
                .then(a.created_at.cmp(&b.created_at))
                .then(a.company_id.cmp(&b.company_id))
        });

        let position = ranked
            .iter()
            .position(|a| a.company_id == company_id)
            .ok_or_else(|| CarbonError::not_found("rating assessment", company_id))?;

        let rank = position + 1;
        let peer_count = ranked.len();

        Ok(Percentile {
            rank,
            peer_count,
            top_percent: rank as f64 / peer_count as f64 * 100.0,
        })
    }

    /// Rank a company against every company registered in the same location.
    pub fn rank_in_location<S: RecordStore + ?Sized>(
        store: &S,
        company_id: &str,
    ) -> Result<Percentile> {
        let company = store.get_company(company_id)?;
        let peers = store.list_assessments_in_location(&company.location)?;
        Self::rank(company_id, &peers)
    }

    /// Latest rating for the dashboard, or None before the first assessment.
    pub fn summary<S: RecordStore + ?Sized>(
        store: &S,
        company_id: &str,
    ) -> Result<Option<RatingSummary>> {
        // An unknown company is NotFound, not "no assessment yet"
        store.get_company(company_id)?;

        let history = store.list_assessments(company_id)?;
        let Some(latest) = latest_assessment(&history) else {
            return Ok(None);
        };

        let percentile = match Self::rank_in_location(store, company_id) {
            Ok(p) => Some(p),
            Err(CarbonError::NotFound { .. }) => None,
            Err(e) => return Err(e),
        };

        Ok(Some(RatingSummary {
            overall: latest.overall_score,
            grade: latest.grade.clone(),
            sub_scores: latest.sub_scores(),
            percentile,
            trend: trend(&history),
            compliance_change: compliance_change(&history),
            assessment_date: latest.assessment_date,
        }))
    }
}

fn check_score(field: &str, score: f64) -> Result<()> {
    if !score.is_finite() || !(0.0..=100.0).contains(&score) {
        return Err(CarbonError::out_of_range(
            field,
            format!("score {} is outside [0, 100]", score),
        ));
    }
    Ok(())
}

fn latest_assessment(history: &[RatingAssessment]) -> Option<&RatingAssessment> {
    history
        .iter()
        .max_by(|a, b| {
            (a.assessment_date, a.created_at).cmp(&(b.assessment_date, b.created_at))
        })
}

fn chronological(history: &[RatingAssessment]) -> Vec<&RatingAssessment> {
    let mut ordered: Vec<&RatingAssessment> = history.iter().collect();
    ordered.sort_by_key(|a| (a.assessment_date, a.created_at));
    ordered
}

/// Compare the two most recent assessments.
pub fn trend(history: &[RatingAssessment]) -> RatingTrend {
    match chronological(history).as_slice() {
        [] | [_] => RatingTrend::FirstAssessment,
        [.., previous, latest] => {
            if latest.overall_score > previous.overall_score {
                RatingTrend::Improved
            } else if latest.overall_score < previous.overall_score {
                RatingTrend::Declined
            } else {
                RatingTrend::Unchanged
            }
        }
    }
}

/// Latest compliance score minus the one before it, in points.
pub fn compliance_change(history: &[RatingAssessment]) -> Option<f64> {
    match chronological(history).as_slice() {
        [.., previous, latest] => Some(latest.compliance_score - previous.compliance_score),
        _ => None,
    }
}

// ============================================================================
// TESTS
// ============================================================================
