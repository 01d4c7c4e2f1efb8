//! Consumption-pattern model: feature engineering, tree ensembles, calibration and artifacts.

pub mod artifact;
pub mod calibration;
pub mod dataset;
pub mod ensemble;
pub mod features;
pub mod metrics;
pub mod scaler;
pub mod split;
pub mod tree;

pub use artifact::{ArtifactError, FeatureImportances, ModelArtifact, TrainingMetadata};
pub use dataset::{
    synthesize, write_labelled, DataQualityReport, DatasetError, LabelledRecord, TrainingTable,
};
pub use ensemble::EnsembleKind;
pub use features::{FeatureEngineer, FeatureFrame, FEATURE_NAMES};
pub use metrics::{ClassificationMetrics, RegressionMetrics};
pub use tree::StructureError;

use crate::scoring::{RiskClass, PATTERN_SCORE_CEILING};
use calibration::CalibratedClassifier;
use chrono::Utc;
use ensemble::{Classifier, EnsembleParams, Regressor, TrainingMatrix};
use scaler::StandardScaler;
use serde::{Deserialize, Serialize};
use split::stratified_split;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

/// Regression target share of the rule score.
const PATTERN_SHARE: f64 = PATTERN_SCORE_CEILING / 100.0;
const MIN_TRAINING_ROWS: usize = 2;

/// Problems with training input. Fatal to a training run.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("missing required columns: {}", .0.join(", "))]
    MissingColumns(Vec<String>),
    #[error("no rows left after cleaning")]
    EmptyAfterCleaning,
    #[error("need at least {MIN_TRAINING_ROWS} rows after cleaning, found {found}")]
    TooFewRows { found: usize },
    #[error("test size must be between 0 and 1 exclusive, got {0}")]
    InvalidTestSize(f64),
}

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("model not trained")]
    NotTrained,
    #[error("feature mismatch, missing: {}", .missing.join(", "))]
    FeatureMismatch { missing: Vec<String> },
    #[error("expected {expected} features, found {found}")]
    DimensionMismatch { expected: usize, found: usize },
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelOptions {
    pub ensemble: EnsembleKind,
    pub n_estimators: usize,
    pub calibrate: bool,
    pub seed: u64,
    pub max_bins: usize,
}

impl Default for ModelOptions {
    fn default() -> Self {
        Self {
            ensemble: EnsembleKind::GradientBoosting,
            n_estimators: 400,
            calibrate: true,
            seed: 42,
            max_bins: tree::MAX_BINS,
        }
    }
}

impl ModelOptions {
    fn params(&self) -> EnsembleParams {
        EnsembleParams {
            kind: self.ensemble,
            n_estimators: self.n_estimators,
            seed: self.seed,
        }
    }
}

/// One model output: the bounded consumption sub-score and the risk distribution.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Prediction {
    pub consumption_score: f64,
    pub risk_class: RiskClass,
    pub probabilities: [f64; RiskClass::COUNT],
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrainingReport {
    pub regression: RegressionMetrics,
    pub classification: ClassificationMetrics,
    pub calibrated: Option<ClassificationMetrics>,
    pub metadata: TrainingMetadata,
}

#[derive(Debug, Clone)]
enum ModelState {
    Untrained,
    Trained(Arc<ModelArtifact>),
}

/// Dual-head model trained to reproduce the rule score. Trains once, then serves a shared artifact.
#[derive(Debug, Clone)]
pub struct ConsumptionPatternModel {
    options: ModelOptions,
    state: ModelState,
}

impl ConsumptionPatternModel {
    pub fn new(options: ModelOptions) -> Self {
        Self {
            options,
            state: ModelState::Untrained,
        }
    }

    pub fn from_artifact(artifact: Arc<ModelArtifact>) -> Self {
        Self {
            options: ModelOptions {
                ensemble: artifact.metadata().model_type,
                calibrate: artifact.is_calibrated(),
                ..ModelOptions::default()
            },
            state: ModelState::Trained(artifact),
        }
    }

    pub fn options(&self) -> &ModelOptions {
        &self.options
    }

    pub fn is_trained(&self) -> bool {
        matches!(self.state, ModelState::Trained(_))
    }

    pub fn artifact(&self) -> Result<Arc<ModelArtifact>, ModelError> {
        match &self.state {
            ModelState::Trained(artifact) => Ok(Arc::clone(artifact)),
            ModelState::Untrained => Err(ModelError::NotTrained),
        }
    }

    pub fn predict(&self, frame: &FeatureFrame) -> Result<Vec<Prediction>, ModelError> {
        match &self.state {
            ModelState::Trained(artifact) => artifact.predict(frame),
            ModelState::Untrained => Err(ModelError::NotTrained),
        }
    }

    /// Cleans the table, fits scaler and both heads on a stratified split and evaluates on
    /// the held-out rows.
    pub fn train(
        &mut self,
        table: &TrainingTable,
        test_size: f64,
    ) -> Result<TrainingReport, ModelError> {
        if !(test_size > 0.0 && test_size < 1.0) {
            return Err(ValidationError::InvalidTestSize(test_size).into());
        }

        let (records, data_quality) = table.clean()?;
        if records.len() < MIN_TRAINING_ROWS {
            return Err(ValidationError::TooFewRows {
                found: records.len(),
            }
            .into());
        }
        if data_quality.removal_rate > 0.5 {
            warn!(
                removal_rate = data_quality.removal_rate,
                "more than half of the training rows were removed"
            );
        }

        let feature_names = FeatureEngineer::feature_names();
        let frame = FeatureEngineer::frame(
            &records
                .iter()
                .map(|labelled| labelled.record.clone())
                .collect::<Vec<_>>(),
        );
        let features = frame.select(&feature_names)?;
        let targets: Vec<f64> = records
            .iter()
            .map(|labelled| labelled.rule_score * PATTERN_SHARE)
            .collect();
        let classes: Vec<usize> = records
            .iter()
            .map(|labelled| RiskClass::from_score(labelled.rule_score).index())
            .collect();

        let partition = stratified_split(&classes, test_size, self.options.seed);
        let gather = |indices: &[usize]| -> Vec<Vec<f64>> {
            indices.iter().map(|&i| features[i].clone()).collect()
        };
        let train_rows = gather(&partition.train);
        let test_rows = gather(&partition.test);
        let train_targets: Vec<f64> = partition.train.iter().map(|&i| targets[i]).collect();
        let train_classes: Vec<usize> = partition.train.iter().map(|&i| classes[i]).collect();

        let scaler = StandardScaler::fit(&train_rows);
        let scaled_train = scaler.transform(&train_rows)?;
        let scaled_test = scaler.transform(&test_rows)?;

        info!(
            ensemble = self.options.ensemble.label(),
            train = scaled_train.len(),
            test = scaled_test.len(),
            features = feature_names.len(),
            "training consumption pattern model"
        );

        let params = self.options.params();
        let matrix = TrainingMatrix::new(&scaled_train, self.options.max_bins);
        let samples: Vec<usize> = (0..scaled_train.len()).collect();
        let regressor = Regressor::fit(&matrix, &train_targets, &samples, &params);
        let classifier = Classifier::fit(&matrix, &train_classes, &samples, &params);
        let calibrated = if self.options.calibrate {
            let calibrated =
                CalibratedClassifier::fit(&matrix, &train_classes, &samples, &params);
            if calibrated.is_none() {
                warn!("too few rows for calibration, using the raw classifier");
            }
            calibrated
        } else {
            None
        };

        let test_targets: Vec<f64> = partition.test.iter().map(|&i| targets[i]).collect();
        let test_classes: Vec<usize> = partition.test.iter().map(|&i| classes[i]).collect();
        let predicted: Vec<f64> = scaled_test
            .iter()
            .map(|row| regressor.model.predict(row).clamp(0.0, PATTERN_SCORE_CEILING))
            .collect();
        let regression = RegressionMetrics::evaluate(&test_targets, &predicted);
        let raw_proba: Vec<_> = scaled_test
            .iter()
            .map(|row| classifier.model.predict_proba(row))
            .collect();
        let classification = ClassificationMetrics::evaluate(&test_classes, &raw_proba);
        let calibrated_metrics = calibrated.as_ref().map(|calibrated| {
            let proba: Vec<_> = scaled_test
                .iter()
                .map(|row| calibrated.predict_proba(row))
                .collect();
            ClassificationMetrics::evaluate(&test_classes, &proba)
        });

        let mut class_distribution = BTreeMap::new();
        for class in &classes {
            if let Some(class) = RiskClass::from_index(*class) {
                *class_distribution
                    .entry(class.info().level.to_string())
                    .or_insert(0) += 1;
            }
        }

        let metadata = TrainingMetadata {
            timestamp: Utc::now().to_rfc3339(),
            model_type: self.options.ensemble,
            model_purpose: "consumption_pattern_analysis".to_string(),
            score_contribution: PATTERN_SHARE,
            n_features: feature_names.len(),
            n_samples: records.len(),
            train_size: partition.train.len(),
            test_size: partition.test.len(),
            calibrated: calibrated.is_some(),
            class_distribution,
            data_quality,
        };

        info!(
            rmse = regression.rmse,
            r2 = regression.r2,
            accuracy = classification.accuracy,
            calibrated_accuracy = calibrated_metrics.as_ref().map(|m| m.accuracy),
            "consumption pattern model trained"
        );

        let importances =
            FeatureImportances::new(&feature_names, &regressor.importances, &classifier.importances);
        let artifact = ModelArtifact::new(
            feature_names,
            scaler,
            regressor.model,
            classifier.model,
            calibrated,
            metadata.clone(),
            importances,
        );
        self.state = ModelState::Trained(Arc::new(artifact));

        Ok(TrainingReport {
            regression,
            classification,
            calibrated: calibrated_metrics,
            metadata,
        })
    }
}
