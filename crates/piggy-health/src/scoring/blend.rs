use super::fallback::FallbackScorer;
use super::persona::PersonaAssigner;
use super::{InferenceError, Record, Savings, ScoreResult, ScoreSource, Scorer};
use crate::model::ModelArtifact;
use serde::Serialize;
use std::sync::Arc;
use tracing::warn;

/// Upper bound of the learned consumption-pattern share of the final score.
pub const PATTERN_SCORE_CEILING: f64 = 80.0;

/// Breakdown of the 0-20 rule-based financial ratio sub-score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FinancialRatioScore {
    pub savings: f64,
    pub income: f64,
    pub efficiency: f64,
}

impl FinancialRatioScore {
    pub fn total(&self) -> f64 {
        self.savings + self.income + self.efficiency
    }
}

pub fn financial_ratio_score(income: f64, total_spending: f64) -> FinancialRatioScore {
    let rate = Savings::compute(income, total_spending).rate;
    let savings = if rate >= 0.3 {
        12.0
    } else if rate >= 0.2 {
        10.0
    } else if rate >= 0.1 {
        8.0
    } else if rate >= 0.0 {
        5.0
    } else {
        (5.0 + rate * 25.0).max(0.0)
    };

    let income_points = if income >= 600.0 {
        4.0
    } else if income >= 400.0 {
        3.0
    } else if income >= 250.0 {
        2.0
    } else {
        1.0
    };

    let spend_ratio = if income > 0.0 {
        total_spending / income
    } else {
        2.0
    };
    let efficiency = if spend_ratio <= 0.6 {
        4.0
    } else if spend_ratio <= 0.8 {
        3.0
    } else if spend_ratio <= 1.0 {
        2.0
    } else {
        (2.0 - (spend_ratio - 1.0) * 2.0).max(0.0)
    };

    FinancialRatioScore {
        savings,
        income: income_points,
        efficiency,
    }
}

/// Scores a record with the consumption-pattern model, blended with the financial ratio score.
#[derive(Debug, Clone)]
pub struct ModelBackedScorer {
    artifact: Arc<ModelArtifact>,
}

impl ModelBackedScorer {
    pub fn new(artifact: Arc<ModelArtifact>) -> Self {
        Self { artifact }
    }

    pub fn artifact(&self) -> &ModelArtifact {
        &self.artifact
    }
}

impl Scorer for ModelBackedScorer {
    fn score(&self, record: &Record) -> Result<ScoreResult, InferenceError> {
        let prediction = self.artifact.predict_record(record)?;
        if !prediction.consumption_score.is_finite() {
            return Err(InferenceError::NonFinite("consumption score"));
        }
        if prediction.probabilities.iter().any(|p| !p.is_finite()) {
            return Err(InferenceError::NonFinite("class probability"));
        }

        let score = ScoreBlender::combine(prediction.consumption_score, record);
        Ok(ScoreResult {
            score,
            risk_class: prediction.risk_class,
            probabilities: prediction.probabilities,
            persona: PersonaAssigner::assign(score, record),
            savings: record.savings(),
            source: ScoreSource::Model,
        })
    }
}

/// Produces the final score: the model path when one is loaded, the fallback otherwise.
///
/// Never fails; any inference error routes the record to [`FallbackScorer`].
#[derive(Debug, Clone, Default)]
pub struct ScoreBlender {
    model: Option<ModelBackedScorer>,
    fallback: FallbackScorer,
}

impl ScoreBlender {
    pub fn new(artifact: Option<Arc<ModelArtifact>>) -> Self {
        Self {
            model: artifact.map(ModelBackedScorer::new),
            fallback: FallbackScorer,
        }
    }

    pub fn rules_only() -> Self {
        Self::default()
    }

    pub fn model(&self) -> Option<&ModelBackedScorer> {
        self.model.as_ref()
    }

    /// clip(clip(consumption, 0, 80) + financial ratio score, 0, 100)
    pub fn combine(consumption_score: f64, record: &Record) -> f64 {
        let pattern = consumption_score.clamp(0.0, PATTERN_SCORE_CEILING);
        let ratio = financial_ratio_score(record.income, record.total_spending);
        (pattern + ratio.total()).clamp(0.0, 100.0)
    }

    pub fn score(&self, record: &Record) -> ScoreResult {
        if let Some(model) = &self.model {
            match model.score(record) {
                Ok(result) => {
                    metrics::counter!("piggy_scores_total", "source" => "model").increment(1);
                    return result;
                }
                Err(err) => {
                    warn!(error = %err, "consumption model failed; using rule-based fallback");
                    metrics::counter!("piggy_model_failures_total").increment(1);
                }
            }
        }

        metrics::counter!("piggy_scores_total", "source" => "fallback").increment(1);
        self.fallback.result(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scoring::RawRatios;

    fn record(income: f64, total_spending: f64) -> Record {
        Record::new(total_spending, 2.0, 100, income, &RawRatios::default())
    }

    #[test]
    fn maximal_inputs_blend_to_exactly_one_hundred() {
        let ratio = financial_ratio_score(1000.0, 500.0);
        assert_eq!(ratio.total(), 20.0);
        assert_eq!(ScoreBlender::combine(80.0, &record(1000.0, 500.0)), 100.0);
        assert_eq!(ScoreBlender::combine(95.0, &record(1000.0, 500.0)), 100.0);
    }

    #[test]
    fn deep_deficit_never_blends_below_zero() {
        // no income: savings rate -1, efficiency ratio 2; the income tier keeps its 1 point
        let ratio = financial_ratio_score(0.0, 300.0);
        assert_eq!(ratio.savings, 0.0);
        assert_eq!(ratio.efficiency, 0.0);
        assert_eq!(ratio.income, 1.0);
        let blended = ScoreBlender::combine(-5.0, &record(0.0, 300.0));
        assert_eq!(blended, 1.0);
        assert!(ScoreBlender::combine(f64::NEG_INFINITY, &record(0.0, 300.0)) >= 0.0);
    }

    #[test]
    fn partial_deficit_scales_savings_points() {
        let ratio = financial_ratio_score(400.0, 440.0);
        assert!((ratio.savings - 2.5).abs() < 1e-12);
        assert_eq!(ratio.income, 3.0);
        assert!((ratio.efficiency - 1.8).abs() < 1e-12);
    }

    #[test]
    fn blender_without_model_uses_fallback() {
        let result = ScoreBlender::rules_only().score(&record(500.0, 300.0));
        assert_eq!(result.source, ScoreSource::Fallback);
        assert!((0.0..=100.0).contains(&result.score));
    }
}
