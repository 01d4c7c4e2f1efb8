use piggy_health::config::ScoringConfig;
use piggy_health::model::{
    synthesize, ArtifactError, ConsumptionPatternModel, EnsembleKind, FeatureEngineer,
    FeatureFrame, ModelArtifact, ModelError, ModelOptions, StructureError, TrainingTable,
    ValidationError,
};
use piggy_health::scoring::{RawRatios, ScoreBlender, ScoreSource};
use piggy_health::service::ScoreRequest;
use piggy_health::ScoringService;
use serde_json::{json, Value};
use std::sync::Arc;

fn options(ensemble: EnsembleKind) -> ModelOptions {
    ModelOptions {
        ensemble,
        n_estimators: 20,
        ..ModelOptions::default()
    }
}

fn table() -> TrainingTable {
    TrainingTable::from_labelled(&synthesize(300, 7))
}

fn trained(ensemble: EnsembleKind) -> ConsumptionPatternModel {
    let mut model = ConsumptionPatternModel::new(options(ensemble));
    model.train(&table(), 0.2).expect("synthetic data trains");
    model
}

fn sample_frame() -> FeatureFrame {
    let records: Vec<_> = synthesize(25, 99)
        .into_iter()
        .map(|labelled| labelled.record)
        .collect();
    FeatureEngineer::frame(&records)
}

#[test]
fn untrained_model_refuses_to_predict() {
    let model = ConsumptionPatternModel::new(ModelOptions::default());
    assert!(!model.is_trained());
    assert!(matches!(
        model.predict(&sample_frame()),
        Err(ModelError::NotTrained)
    ));
    assert!(matches!(model.artifact(), Err(ModelError::NotTrained)));
}

#[test]
fn both_ensembles_train_and_produce_bounded_predictions() {
    for ensemble in [EnsembleKind::GradientBoosting, EnsembleKind::RandomForest] {
        let mut model = ConsumptionPatternModel::new(options(ensemble));
        let report = model.train(&table(), 0.2).expect("synthetic data trains");

        assert!(model.is_trained());
        assert_eq!(report.metadata.model_type, ensemble);
        assert_eq!(report.metadata.n_features, 21);
        assert_eq!(
            report.metadata.train_size + report.metadata.test_size,
            report.metadata.n_samples
        );
        assert_eq!(
            report.metadata.n_samples,
            report.metadata.data_quality.final_size
        );
        assert!(report.regression.rmse.is_finite());
        assert!((0.0..=1.0).contains(&report.classification.accuracy));
        assert!(report.calibrated.is_some());

        let predictions = model.predict(&sample_frame()).expect("features match");
        assert_eq!(predictions.len(), 25);
        for prediction in predictions {
            assert!((0.0..=80.0).contains(&prediction.consumption_score));
            let total: f64 = prediction.probabilities.iter().sum();
            assert!((total - 1.0).abs() < 1e-9);
        }
    }
}

#[test]
fn forest_regressor_beats_the_mean() {
    let mut model = ConsumptionPatternModel::new(options(EnsembleKind::RandomForest));
    let report = model.train(&table(), 0.2).expect("synthetic data trains");
    assert!(report.regression.r2 > 0.0, "r2 = {}", report.regression.r2);
}

#[test]
fn training_is_reproducible_for_a_seed() {
    let frame = sample_frame();
    let first = trained(EnsembleKind::GradientBoosting)
        .predict(&frame)
        .expect("features match");
    let second = trained(EnsembleKind::GradientBoosting)
        .predict(&frame)
        .expect("features match");
    assert_eq!(first, second);
}

#[test]
fn feature_columns_are_matched_by_name() {
    let model = trained(EnsembleKind::RandomForest);
    let frame = sample_frame();
    let expected = model.predict(&frame).expect("features match");

    let names: Vec<String> = frame.names().iter().rev().cloned().collect();
    let rows: Vec<Vec<f64>> = frame
        .rows()
        .iter()
        .map(|row| row.iter().rev().copied().collect())
        .collect();
    let reversed = FeatureFrame::new(names, rows).expect("consistent frame");
    assert_eq!(model.predict(&reversed).expect("features match"), expected);

    let housing = frame
        .names()
        .iter()
        .position(|name| name == "housing")
        .expect("housing feature");
    let names: Vec<String> = frame
        .names()
        .iter()
        .filter(|name| *name != "housing")
        .cloned()
        .collect();
    let rows: Vec<Vec<f64>> = frame
        .rows()
        .iter()
        .map(|row| {
            row.iter()
                .enumerate()
                .filter(|(index, _)| *index != housing)
                .map(|(_, value)| *value)
                .collect()
        })
        .collect();
    let missing = FeatureFrame::new(names, rows).expect("consistent frame");
    match model.predict(&missing) {
        Err(ModelError::FeatureMismatch { missing }) => assert_eq!(missing, vec!["housing"]),
        other => panic!("expected feature mismatch, got {other:?}"),
    }
}

#[test]
fn artifacts_round_trip_through_json_and_disk() {
    let model = trained(EnsembleKind::GradientBoosting);
    let artifact = model.artifact().expect("trained");
    let frame = sample_frame();
    let expected = artifact.predict(&frame).expect("features match");

    let json = artifact.to_json().expect("serializes");
    let restored = ModelArtifact::from_json(&json).expect("deserializes");
    assert_eq!(restored.predict(&frame).expect("features match"), expected);

    let path = std::env::temp_dir().join(format!("piggy-artifact-{}.json", std::process::id()));
    artifact.save(&path).expect("writes artifact");
    let loaded = ModelArtifact::load(&path).expect("reads artifact");
    std::fs::remove_file(&path).ok();
    assert_eq!(loaded.metadata(), artifact.metadata());

    let reloaded = ConsumptionPatternModel::from_artifact(Arc::new(loaded));
    assert!(reloaded.is_trained());
    assert_eq!(reloaded.predict(&frame).expect("features match"), expected);
}

#[test]
fn artifacts_with_another_version_are_rejected() {
    let artifact = trained(EnsembleKind::RandomForest)
        .artifact()
        .expect("trained");
    let json = artifact
        .to_json()
        .expect("serializes")
        .replace("consumption_pattern_v1.0", "consumption_pattern_v0.9");
    assert!(matches!(
        ModelArtifact::from_json(&json),
        Err(ArtifactError::Version { found }) if found == "consumption_pattern_v0.9"
    ));
}

/// Overwrites the first `key` found in a depth-first walk.
fn overwrite_first(value: &mut Value, key: &str, replacement: &Value) -> bool {
    match value {
        Value::Object(map) => {
            if let Some(slot) = map.get_mut(key) {
                *slot = replacement.clone();
                return true;
            }
            map.values_mut()
                .any(|child| overwrite_first(child, key, replacement))
        }
        Value::Array(items) => items
            .iter_mut()
            .any(|child| overwrite_first(child, key, replacement)),
        _ => false,
    }
}

fn tampered_json(key: &str, replacement: Value) -> String {
    let artifact = trained(EnsembleKind::GradientBoosting)
        .artifact()
        .expect("trained");
    let mut document: Value =
        serde_json::from_str(&artifact.to_json().expect("serializes")).expect("valid json");
    assert!(overwrite_first(&mut document, key, &replacement));
    document.to_string()
}

#[test]
fn artifacts_with_out_of_range_features_are_rejected() {
    let json = tampered_json("feature", json!(999));
    assert!(matches!(
        ModelArtifact::from_json(&json),
        Err(ArtifactError::Structure(StructureError::FeatureOutOfRange {
            feature: 999,
            n_features: 21,
            ..
        }))
    ));
}

#[test]
fn artifacts_with_backward_links_are_rejected() {
    let json = tampered_json("left", json!(0));
    assert!(matches!(
        ModelArtifact::from_json(&json),
        Err(ArtifactError::Structure(StructureError::BadChild { child: 0, .. }))
    ));
}

#[test]
fn corrupted_artifact_on_disk_leaves_rule_scoring_in_place() {
    let path = std::env::temp_dir().join(format!("piggy-corrupt-{}.json", std::process::id()));
    std::fs::write(&path, tampered_json("feature", json!(999))).expect("writes artifact");

    let service = ScoringService::from_config(&ScoringConfig {
        model_path: Some(path.clone()),
        use_model: true,
        reference_table: None,
    });
    std::fs::remove_file(&path).ok();
    assert!(!service.has_model());

    let response = service
        .score(&ScoreRequest {
            total_spending: 300.0,
            mean_spending: 2.0,
            n_transactions: 150.0,
            income: 400.0,
            ratios: RawRatios::default(),
        })
        .expect("valid request");
    assert_eq!(response.source, ScoreSource::Fallback);
    assert!((0.0..=100.0).contains(&response.score));
}

#[test]
fn invalid_training_input_is_rejected() {
    let mut model = ConsumptionPatternModel::new(options(EnsembleKind::RandomForest));
    assert!(matches!(
        model.train(&table(), 1.0),
        Err(ModelError::Validation(ValidationError::InvalidTestSize(_)))
    ));

    let partial = TrainingTable::from_reader("total_spending,income\n10,20\n".as_bytes())
        .expect("valid csv");
    assert!(matches!(
        model.train(&partial, 0.2),
        Err(ModelError::Validation(ValidationError::MissingColumns(_)))
    ));
    assert!(!model.is_trained());
}

#[test]
fn blender_prefers_the_model_when_it_loads() {
    let artifact = trained(EnsembleKind::RandomForest)
        .artifact()
        .expect("trained");
    let blender = ScoreBlender::new(Some(artifact));
    for labelled in synthesize(20, 5) {
        let result = blender.score(&labelled.record);
        assert_eq!(result.source, ScoreSource::Model);
        assert!((0.0..=100.0).contains(&result.score));
    }
}
