use metrics_exporter_prometheus::PrometheusHandle;
use piggy_health::config::ScoringConfig;
use piggy_health::error::AppError;
use piggy_health::model::{EnsembleKind, ModelArtifact};
use piggy_health::scoring::QuintileTable;
use piggy_health::ScoringService;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

pub(crate) fn parse_ensemble(raw: &str) -> Result<EnsembleKind, String> {
    match raw.trim().to_ascii_lowercase().replace('-', "_").as_str() {
        "gradient_boosting" | "gbm" | "gb" => Ok(EnsembleKind::GradientBoosting),
        "random_forest" | "rf" => Ok(EnsembleKind::RandomForest),
        other => Err(format!(
            "unknown ensemble '{other}' (expected gradient_boosting or random_forest)"
        )),
    }
}

/// Builds a scoring service for one-off CLI use. Paths given on the command line must load;
/// anything left to configuration degrades the way the server does.
pub(crate) fn cli_scoring_service(
    config: &ScoringConfig,
    model: Option<PathBuf>,
    reference_table: Option<PathBuf>,
) -> Result<ScoringService, AppError> {
    let configured = ScoringConfig {
        model_path: config.model_path.clone().filter(|_| model.is_none()),
        use_model: config.use_model,
        reference_table: config
            .reference_table
            .clone()
            .filter(|_| reference_table.is_none()),
    };
    let mut service = ScoringService::from_config(&configured);

    if let Some(path) = model {
        service = service.with_model(Arc::new(ModelArtifact::load(path)?));
    }
    if let Some(path) = reference_table {
        service = service.with_reference_table(Arc::new(QuintileTable::from_path(&path)?));
    }
    Ok(service)
}
