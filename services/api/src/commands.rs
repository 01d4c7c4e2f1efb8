use crate::infra::{cli_scoring_service, parse_ensemble};
use clap::Args;
use piggy_health::config::AppConfig;
use piggy_health::error::AppError;
use piggy_health::model::{
    synthesize, write_labelled, EnsembleKind, LabelledRecord, ModelOptions, TrainingReport,
    TrainingTable,
};
use piggy_health::scoring::{label_published, PublishedColumns, RawRatios};
use piggy_health::service::{RealisticRequest, ScoreRequest, ScoreResponse};
use piggy_health::telemetry;
use piggy_health::ConsumptionPatternModel;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Args, Debug)]
pub(crate) struct TrainArgs {
    /// Labelled training table (CSV)
    #[arg(long, conflicts_with = "synthetic", required_unless_present = "synthetic")]
    pub(crate) data: Option<PathBuf>,
    /// Train on N synthetic households labelled by the rule scorer
    #[arg(long, value_name = "N")]
    pub(crate) synthetic: Option<usize>,
    /// Where to write the model artifact
    #[arg(long, default_value = "models/consumption_pattern.json")]
    pub(crate) output: PathBuf,
    /// Held-out fraction used for evaluation
    #[arg(long, default_value_t = 0.2)]
    pub(crate) test_size: f64,
    /// gradient_boosting or random_forest
    #[arg(long, default_value = "gradient_boosting", value_parser = parse_ensemble)]
    pub(crate) ensemble: EnsembleKind,
    /// Trees (or boosting rounds) per model head
    #[arg(long, default_value_t = 400)]
    pub(crate) estimators: usize,
    /// Skip probability calibration of the classifier
    #[arg(long)]
    pub(crate) no_calibration: bool,
    #[arg(long, default_value_t = 42)]
    pub(crate) seed: u64,
}

#[derive(Args, Debug)]
pub(crate) struct ScoreArgs {
    /// Monthly spending in 10k KRW
    #[arg(long)]
    pub(crate) total_spending: f64,
    #[arg(long)]
    pub(crate) mean_spending: f64,
    #[arg(long)]
    pub(crate) n_transactions: f64,
    /// Monthly income in 10k KRW
    #[arg(long)]
    pub(crate) income: f64,
    #[arg(long)]
    pub(crate) housing: Option<f64>,
    #[arg(long)]
    pub(crate) food: Option<f64>,
    #[arg(long)]
    pub(crate) transport: Option<f64>,
    #[arg(long)]
    pub(crate) entertainment: Option<f64>,
    #[arg(long)]
    pub(crate) education: Option<f64>,
    #[arg(long)]
    pub(crate) medical: Option<f64>,
    #[arg(long)]
    pub(crate) other: Option<f64>,
    /// Model artifact to score with (defaults to PIGGY_MODEL_PATH)
    #[arg(long)]
    pub(crate) model: Option<PathBuf>,
    /// Debt service ratio; switches to the reference-based scorer together with --debt-to-asset
    #[arg(long, requires = "debt_to_asset")]
    pub(crate) dsr: Option<f64>,
    #[arg(long, requires = "dsr")]
    pub(crate) debt_to_asset: Option<f64>,
    /// Income quintile reference table (defaults to PIGGY_REFERENCE_TABLE)
    #[arg(long)]
    pub(crate) reference_table: Option<PathBuf>,
}

impl ScoreArgs {
    fn request(&self) -> ScoreRequest {
        ScoreRequest {
            total_spending: self.total_spending,
            mean_spending: self.mean_spending,
            n_transactions: self.n_transactions,
            income: self.income,
            ratios: RawRatios {
                housing: self.housing,
                food: self.food,
                transport: self.transport,
                entertainment: self.entertainment,
                education: self.education,
                medical: self.medical,
                other: self.other,
            },
        }
    }
}

#[derive(Args, Debug)]
pub(crate) struct LabelArgs {
    /// Household table (CSV) to label. Tables with published debt ratio columns are
    /// scored by debt indicators instead
    #[arg(long)]
    pub(crate) input: PathBuf,
    /// Destination for the labelled table
    #[arg(long)]
    pub(crate) output: PathBuf,
}

fn init_logging() -> Result<AppConfig, AppError> {
    let config = AppConfig::load()?;
    telemetry::init(&config.telemetry)?;
    Ok(config)
}

pub(crate) fn run_train(args: TrainArgs) -> Result<(), AppError> {
    init_logging()?;
    let TrainArgs {
        data,
        synthetic,
        output,
        test_size,
        ensemble,
        estimators,
        no_calibration,
        seed,
    } = args;

    let table = match (data, synthetic) {
        (Some(path), _) => {
            let mut table = TrainingTable::from_path(&path)?;
            table.normalize_units();
            info!(path = %path.display(), rows = table.len(), "training table loaded");
            table
        }
        (None, Some(n)) => {
            info!(rows = n, seed, "synthesizing training households");
            TrainingTable::from_labelled(&synthesize(n, seed))
        }
        (None, None) => TrainingTable::default(),
    };

    let mut model = ConsumptionPatternModel::new(ModelOptions {
        ensemble,
        n_estimators: estimators,
        calibrate: !no_calibration,
        seed,
        ..ModelOptions::default()
    });
    let report = model.train(&table, test_size)?;
    let artifact = model.artifact()?;

    if let Some(parent) = output.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    artifact.save(&output)?;
    info!(path = %output.display(), "model artifact written");

    render_training_report(&report, artifact.importances().top_regressor(5));
    println!("\nArtifact: {}", output.display());
    Ok(())
}

fn render_training_report(report: &TrainingReport, top_features: &[(String, f64)]) {
    let metadata = &report.metadata;
    println!("Consumption pattern model ({})", metadata.model_type.label());
    println!(
        "  Samples: {} kept of {} ({} train / {} test)",
        metadata.n_samples,
        metadata.data_quality.original_size,
        metadata.train_size,
        metadata.test_size
    );
    println!(
        "  Regression: RMSE {:.3} | MAE {:.3} | R² {:.3}",
        report.regression.rmse, report.regression.mae, report.regression.r2
    );
    println!(
        "  Classification: accuracy {:.3} | AUC {}",
        report.classification.accuracy,
        format_optional(report.classification.auc)
    );
    if let Some(calibrated) = &report.calibrated {
        println!(
            "  Calibrated: accuracy {:.3} | AUC {} | log loss {}",
            calibrated.accuracy,
            format_optional(calibrated.auc),
            format_optional(calibrated.log_loss)
        );
    }

    if !metadata.class_distribution.is_empty() {
        println!("  Class distribution:");
        for (level, count) in &metadata.class_distribution {
            println!("    {level}: {count}");
        }
    }

    if !top_features.is_empty() {
        println!("  Top features:");
        for (name, importance) in top_features {
            println!("    {name:<28} {importance:.4}");
        }
    }
}

fn format_optional(value: Option<f64>) -> String {
    value
        .map(|value| format!("{value:.3}"))
        .unwrap_or_else(|| "n/a".to_string())
}

pub(crate) fn run_score(args: ScoreArgs) -> Result<(), AppError> {
    let config = init_logging()?;
    let household = args.request();
    let service = cli_scoring_service(
        &config.scoring,
        args.model.clone(),
        args.reference_table.clone(),
    )?;

    match (args.dsr, args.debt_to_asset) {
        (Some(debt_service_ratio), Some(debt_to_asset_ratio)) => {
            let response = service.score_realistic(&RealisticRequest {
                household,
                debt_service_ratio,
                debt_to_asset_ratio,
            })?;
            render_score(&response.result);
            println!(
                "  Income quintile: {} | Health label: {}",
                response.quintile, response.label
            );
        }
        _ => {
            if !service.has_model() {
                warn!("no model artifact available; scoring with rules");
            }
            render_score(&service.score(&household)?);
        }
    }
    Ok(())
}

fn render_score(response: &ScoreResponse) {
    let persona = &response.persona;
    println!("Financial health score: {:.1} / 100", response.score);
    println!(
        "  Risk: {} ({})",
        response.risk_info.level, response.risk_info.description
    );
    println!(
        "  Persona: {} {} (level {})",
        persona.emoji, persona.name, persona.level
    );
    println!("  {}", persona.description);
    println!(
        "  Savings: {:.1} (rate {:.1}%) | Income {:.1} | Spending {:.1}",
        response.savings, response.savings_rate, response.income, response.total_spending
    );
    println!(
        "  Probabilities: [{}]",
        response
            .probabilities
            .iter()
            .map(|p| format!("{p:.3}"))
            .collect::<Vec<_>>()
            .join(", ")
    );
    println!("  Source: {:?}", response.source);
}

pub(crate) fn run_label(args: LabelArgs) -> Result<(), AppError> {
    init_logging()?;
    let LabelArgs { input, output } = args;

    if let Some(parent) = output.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    if PublishedColumns::from_path(&input)?.is_some() {
        let written = label_published(
            File::open(&input)?,
            BufWriter::new(File::create(&output)?),
        )?;
        info!(rows = written, path = %output.display(), "statistics table labelled");
        println!(
            "Scored {} statistics rows by debt indicators -> {}",
            written,
            output.display()
        );
        return Ok(());
    }

    let mut table = TrainingTable::from_path(&input)?;
    table.normalize_units();
    let labelled: Vec<LabelledRecord> = table
        .records()
        .into_iter()
        .map(LabelledRecord::from_rules)
        .collect();

    let skipped = table.len() - labelled.len();
    if skipped > 0 {
        warn!(skipped, "rows with missing amounts were not labelled");
    }

    write_labelled(BufWriter::new(File::create(&output)?), &labelled)?;
    info!(rows = labelled.len(), path = %output.display(), "labelled table written");

    let healthy = labelled.iter().filter(|record| record.rule_label == 1).count();
    println!(
        "Labelled {} households ({} healthy, {} at risk) -> {}",
        labelled.len(),
        healthy,
        labelled.len() - healthy,
        output.display()
    );
    Ok(())
}
