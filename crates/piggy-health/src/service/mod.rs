//! Request validation and response shaping around the scoring engine.

pub mod router;

#[cfg(test)]
mod tests;

pub use router::scoring_router;

use crate::config::ScoringConfig;
use crate::model::{ModelArtifact, TrainingMetadata};
use crate::scoring::{
    DebtReference, InferenceError, PersonaDescriptor, QuintileTable, RawRatios, RealisticScorer,
    Record, RiskInfo, ScoreBlender, ScoreResult, ScoreSource,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Inference payload. Amounts are in 10k KRW; ratios may be omitted or unnormalized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreRequest {
    pub total_spending: f64,
    pub mean_spending: f64,
    pub n_transactions: f64,
    #[serde(alias = "est_income")]
    pub income: f64,
    #[serde(flatten)]
    pub ratios: RawRatios,
}

impl ScoreRequest {
    fn record(&self) -> Result<Record, ScoringServiceError> {
        for (field, value) in [
            ("total_spending", self.total_spending),
            ("mean_spending", self.mean_spending),
            ("n_transactions", self.n_transactions),
            ("income", self.income),
        ] {
            if !value.is_finite() {
                return Err(ScoringServiceError::Invalid {
                    field,
                    reason: "must be a finite number",
                });
            }
            if value < 0.0 {
                return Err(ScoringServiceError::Invalid {
                    field,
                    reason: "must not be negative",
                });
            }
        }

        Ok(Record::new(
            self.total_spending,
            self.mean_spending,
            self.n_transactions.round().min(f64::from(u32::MAX)) as u32,
            self.income,
            &self.ratios,
        ))
    }
}

/// Score payload for the debt-reference path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RealisticRequest {
    #[serde(flatten)]
    pub household: ScoreRequest,
    #[serde(alias = "dsr")]
    pub debt_service_ratio: f64,
    #[serde(alias = "debt_asset_ratio")]
    pub debt_to_asset_ratio: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreResponse {
    pub score: f64,
    pub risk_label: usize,
    pub risk_info: RiskInfo,
    pub persona: PersonaDescriptor,
    pub probabilities: [f64; 4],
    pub savings: f64,
    /// Percent, not a fraction.
    pub savings_rate: f64,
    pub income: f64,
    pub total_spending: f64,
    pub source: ScoreSource,
}

impl ScoreResponse {
    fn from_result(result: ScoreResult, record: &Record) -> Self {
        Self {
            score: round1(result.score),
            risk_label: result.risk_class.index(),
            risk_info: result.risk_class.info(),
            persona: result.persona,
            probabilities: result.probabilities,
            savings: round1(result.savings.amount),
            savings_rate: round1(result.savings.rate * 100.0),
            income: round1(record.income),
            total_spending: round1(record.total_spending),
            source: result.source,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RealisticResponse {
    #[serde(flatten)]
    pub result: ScoreResponse,
    pub label: u8,
    pub quintile: u8,
}

/// What the service currently scores with.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelInfo {
    pub model_loaded: bool,
    pub version: Option<String>,
    pub metadata: Option<TrainingMetadata>,
    pub top_features: Vec<(String, f64)>,
    pub reference_table_loaded: bool,
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Entry point for HTTP and CLI scoring. Holds the shared model artifact, if any.
#[derive(Debug, Clone, Default)]
pub struct ScoringService {
    blender: ScoreBlender,
    realistic: Option<RealisticScorer>,
}

impl ScoringService {
    pub fn new(blender: ScoreBlender, realistic: Option<RealisticScorer>) -> Self {
        Self { blender, realistic }
    }

    pub fn rules_only() -> Self {
        Self::default()
    }

    /// Loads the artifact and reference table named in config. Either one failing to load
    /// leaves that path disabled rather than stopping the service.
    pub fn from_config(config: &ScoringConfig) -> Self {
        let artifact = match (&config.model_path, config.use_model) {
            (Some(path), true) => match ModelArtifact::load(path) {
                Ok(artifact) => {
                    info!(
                        path = %path.display(),
                        version = artifact.version(),
                        "model artifact loaded"
                    );
                    Some(Arc::new(artifact))
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "model artifact unavailable; scoring with rules"
                    );
                    None
                }
            },
            (_, false) => {
                info!("model disabled by configuration; scoring with rules");
                None
            }
            (None, true) => None,
        };

        let realistic = config.reference_table.as_ref().and_then(|path| {
            match QuintileTable::from_path(path) {
                Ok(table) => Some(RealisticScorer::new(Arc::new(table))),
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "reference table unavailable");
                    None
                }
            }
        });

        Self::new(ScoreBlender::new(artifact), realistic)
    }

    pub fn with_model(mut self, artifact: Arc<ModelArtifact>) -> Self {
        self.blender = ScoreBlender::new(Some(artifact));
        self
    }

    pub fn with_reference_table(mut self, table: Arc<QuintileTable>) -> Self {
        self.realistic = Some(RealisticScorer::new(table));
        self
    }

    pub fn has_model(&self) -> bool {
        self.blender.model().is_some()
    }

    pub fn score(&self, request: &ScoreRequest) -> Result<ScoreResponse, ScoringServiceError> {
        let record = request.record()?;
        let result = self.blender.score(&record);
        debug!(score = result.score, source = ?result.source, "household scored");
        Ok(ScoreResponse::from_result(result, &record))
    }

    pub fn score_realistic(
        &self,
        request: &RealisticRequest,
    ) -> Result<RealisticResponse, ScoringServiceError> {
        let scorer = self
            .realistic
            .as_ref()
            .ok_or(ScoringServiceError::RealisticUnavailable)?;
        let record = request.household.record()?.with_debt(DebtReference {
            debt_service_ratio: request.debt_service_ratio,
            debt_to_asset_ratio: request.debt_to_asset_ratio,
        });

        let (outcome, result) = scorer.assess(&record)?;
        Ok(RealisticResponse {
            result: ScoreResponse::from_result(result, &record),
            label: outcome.label,
            quintile: outcome.quintile,
        })
    }

    pub fn model_info(&self) -> ModelInfo {
        let artifact = self.blender.model().map(|model| model.artifact());
        ModelInfo {
            model_loaded: artifact.is_some(),
            version: artifact.map(|artifact| artifact.version().to_string()),
            metadata: artifact.map(|artifact| artifact.metadata().clone()),
            top_features: artifact
                .map(|artifact| artifact.importances().top_regressor(10).to_vec())
                .unwrap_or_default(),
            reference_table_loaded: self.realistic.is_some(),
        }
    }
}

/// Error raised by the scoring service.
#[derive(Debug, thiserror::Error)]
pub enum ScoringServiceError {
    #[error("invalid `{field}`: {reason}")]
    Invalid {
        field: &'static str,
        reason: &'static str,
    },
    #[error("realistic scoring needs a reference table")]
    RealisticUnavailable,
    #[error(transparent)]
    Inference(#[from] InferenceError),
}
