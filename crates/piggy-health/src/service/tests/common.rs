use std::sync::{Arc, OnceLock};

use axum::response::Response;
use serde_json::Value;

use crate::model::{ConsumptionPatternModel, ModelArtifact, ModelOptions, TrainingTable};
use crate::scoring::{QuintileTable, RawRatios, RealisticScorer, ScoreBlender};
use crate::service::{scoring_router, RealisticRequest, ScoreRequest, ScoringService};

pub(super) fn ratios(values: [f64; 7]) -> RawRatios {
    RawRatios {
        housing: Some(values[0]),
        food: Some(values[1]),
        transport: Some(values[2]),
        entertainment: Some(values[3]),
        education: Some(values[4]),
        medical: Some(values[5]),
        other: Some(values[6]),
    }
}

/// Scores 84 on the rule-based fallback.
pub(super) fn healthy_request() -> ScoreRequest {
    ScoreRequest {
        total_spending: 300.0,
        mean_spending: 2.0,
        n_transactions: 150.0,
        income: 500.0,
        ratios: ratios([0.25, 0.15, 0.15, 0.10, 0.10, 0.10, 0.15]),
    }
}

pub(super) fn realistic_request() -> RealisticRequest {
    RealisticRequest {
        household: ScoreRequest {
            income: 400.0,
            ..healthy_request()
        },
        debt_service_ratio: 0.45,
        debt_to_asset_ratio: 0.30,
    }
}

pub(super) fn reference_table() -> Arc<QuintileTable> {
    Arc::new(
        QuintileTable::from_reader(
            "income,quintile\n100,1\n250,2\n400,3\n550,4\n800,5\n".as_bytes(),
        )
        .expect("reference table parses"),
    )
}

/// A small model trained once and shared across tests.
pub(super) fn trained_artifact() -> Arc<ModelArtifact> {
    static ARTIFACT: OnceLock<Arc<ModelArtifact>> = OnceLock::new();
    ARTIFACT
        .get_or_init(|| {
            let table = TrainingTable::from_labelled(&crate::model::synthesize(300, 42));
            let mut model = ConsumptionPatternModel::new(ModelOptions {
                n_estimators: 20,
                ..ModelOptions::default()
            });
            model.train(&table, 0.2).expect("synthetic data trains");
            model.artifact().expect("trained")
        })
        .clone()
}

pub(super) fn full_service() -> ScoringService {
    ScoringService::new(
        ScoreBlender::new(Some(trained_artifact())),
        Some(RealisticScorer::new(reference_table())),
    )
}

pub(super) fn router_with_service(service: ScoringService) -> axum::Router {
    scoring_router(Arc::new(service))
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
