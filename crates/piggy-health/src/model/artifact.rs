use super::calibration::CalibratedClassifier;
use super::dataset::DataQualityReport;
use super::ensemble::{Classifier, EnsembleKind, Regressor};
use super::features::{FeatureEngineer, FeatureFrame};
use super::metrics::argmax;
use super::scaler::StandardScaler;
use super::tree::StructureError;
use super::{ModelError, Prediction};
use crate::scoring::{Record, RiskClass, PATTERN_SCORE_CEILING};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use thiserror::Error;

pub const ARTIFACT_VERSION: &str = "consumption_pattern_v1.0";

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("artifact io failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("artifact is not valid json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unsupported artifact version `{found}` (expected `{ARTIFACT_VERSION}`)")]
    Version { found: String },
    #[error("malformed artifact: {0}")]
    Structure(#[from] StructureError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingMetadata {
    pub timestamp: String,
    pub model_type: EnsembleKind,
    pub model_purpose: String,
    /// Share of the final score the consumption pattern head accounts for.
    pub score_contribution: f64,
    pub n_features: usize,
    pub n_samples: usize,
    pub train_size: usize,
    pub test_size: usize,
    pub calibrated: bool,
    pub class_distribution: BTreeMap<String, usize>,
    pub data_quality: DataQualityReport,
}

/// Normalized importances per head, keyed by feature name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureImportances {
    pub regressor: Vec<(String, f64)>,
    pub classifier: Vec<(String, f64)>,
}

impl FeatureImportances {
    pub fn new(names: &[String], regressor: &[f64], classifier: &[f64]) -> Self {
        let pair = |values: &[f64]| -> Vec<(String, f64)> {
            let mut ranked: Vec<(String, f64)> =
                names.iter().cloned().zip(values.iter().copied()).collect();
            ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
            ranked
        };
        Self {
            regressor: pair(regressor),
            classifier: pair(classifier),
        }
    }

    pub fn top_regressor(&self, n: usize) -> &[(String, f64)] {
        &self.regressor[..n.min(self.regressor.len())]
    }
}

/// Everything needed to score a record, immutable once trained.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    version: String,
    feature_names: Vec<String>,
    scaler: StandardScaler,
    regressor: Regressor,
    classifier: Classifier,
    calibrated: Option<CalibratedClassifier>,
    metadata: TrainingMetadata,
    importances: FeatureImportances,
}

impl ModelArtifact {
    pub(crate) fn new(
        feature_names: Vec<String>,
        scaler: StandardScaler,
        regressor: Regressor,
        classifier: Classifier,
        calibrated: Option<CalibratedClassifier>,
        metadata: TrainingMetadata,
        importances: FeatureImportances,
    ) -> Self {
        Self {
            version: ARTIFACT_VERSION.to_string(),
            feature_names,
            scaler,
            regressor,
            classifier,
            calibrated,
            metadata,
            importances,
        }
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn metadata(&self) -> &TrainingMetadata {
        &self.metadata
    }

    pub fn importances(&self) -> &FeatureImportances {
        &self.importances
    }

    pub fn is_calibrated(&self) -> bool {
        self.calibrated.is_some()
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ArtifactError> {
        let file = File::create(path.as_ref())?;
        serde_json::to_writer(BufWriter::new(file), self)?;
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ArtifactError> {
        let file = File::open(path.as_ref())?;
        let artifact: Self = serde_json::from_reader(BufReader::new(file))?;
        artifact.validate()
    }

    pub fn to_json(&self) -> Result<String, ArtifactError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, ArtifactError> {
        let artifact: Self = serde_json::from_str(json)?;
        artifact.validate()
    }

    /// Every tree, scaler and calibrator must fit the feature list before inference runs.
    fn validate(self) -> Result<Self, ArtifactError> {
        if self.version != ARTIFACT_VERSION {
            return Err(ArtifactError::Version {
                found: self.version,
            });
        }

        let n_features = self.feature_names.len();
        self.scaler.check(n_features)?;
        self.regressor.check(n_features)?;
        self.classifier.check(n_features)?;
        if let Some(calibrated) = &self.calibrated {
            calibrated.check(n_features)?;
        }
        Ok(self)
    }

    /// Columns are matched by name, so a reordered frame scores the same.
    pub fn predict(&self, frame: &FeatureFrame) -> Result<Vec<Prediction>, ModelError> {
        frame
            .select(&self.feature_names)?
            .iter()
            .map(|row| self.predict_row(row))
            .collect()
    }

    pub fn predict_record(&self, record: &Record) -> Result<Prediction, ModelError> {
        let frame = FeatureEngineer::frame(std::slice::from_ref(record));
        let rows = frame.select(&self.feature_names)?;
        match rows.first() {
            Some(row) => self.predict_row(row),
            None => Err(ModelError::DimensionMismatch {
                expected: 1,
                found: 0,
            }),
        }
    }

    fn predict_row(&self, row: &[f64]) -> Result<Prediction, ModelError> {
        let scaled = self.scaler.transform_row(row)?;
        let consumption_score = self
            .regressor
            .predict(&scaled)
            .clamp(0.0, PATTERN_SCORE_CEILING);
        let probabilities = match &self.calibrated {
            Some(calibrated) => calibrated.predict_proba(&scaled),
            None => self.classifier.predict_proba(&scaled),
        };
        let risk_class =
            RiskClass::from_index(argmax(&probabilities)).unwrap_or(RiskClass::HighRisk);

        Ok(Prediction {
            consumption_score,
            risk_class,
            probabilities,
        })
    }
}
