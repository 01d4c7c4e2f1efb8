use super::ModelError;
use crate::scoring::Record;
use serde::Serialize;

/// Model input columns, in training order. Part of the artifact contract.
pub const FEATURE_NAMES: [&str; 21] = [
    "total_spending",
    "mean_spending",
    "n_transactions",
    "education",
    "transport",
    "other",
    "medical",
    "food",
    "entertainment",
    "housing",
    "essential_spending_ratio",
    "discretionary_spending_ratio",
    "investment_spending_ratio",
    "transport_spending_ratio",
    "avg_transaction_size",
    "transaction_frequency_score",
    "spending_balance_score",
    "rational_spending_score",
    "spending_low",
    "spending_mid",
    "spending_high",
];

fn indicator(condition: bool) -> f64 {
    if condition {
        1.0
    } else {
        0.0
    }
}

/// Derives the model's feature vector from a record. Identical at training and inference.
#[derive(Debug, Clone, Copy, Default)]
pub struct FeatureEngineer;

impl FeatureEngineer {
    pub fn feature_names() -> Vec<String> {
        FEATURE_NAMES.iter().map(|name| name.to_string()).collect()
    }

    pub fn engineer(record: &Record) -> [f64; 21] {
        let ratios = record.ratios();
        let ts = record.total_spending;
        let n = f64::from(record.n_transactions);

        let essential = ratios.housing() + ratios.food() + ratios.medical();
        let discretionary = ratios.entertainment() + ratios.other();
        let investment = ratios.education();

        [
            ts,
            record.mean_spending,
            n,
            ratios.education(),
            ratios.transport(),
            ratios.other(),
            ratios.medical(),
            ratios.food(),
            ratios.entertainment(),
            ratios.housing(),
            essential,
            discretionary,
            investment,
            ratios.transport(),
            ts / (n + 1.0),
            indicator((50..=300).contains(&record.n_transactions)),
            1.0 / (1.0 + ratios.sample_std()),
            indicator(
                (0.4..=0.7).contains(&essential) && discretionary <= 0.3 && investment >= 0.05,
            ),
            indicator(ts < 200.0),
            indicator((200.0..400.0).contains(&ts)),
            indicator(ts >= 400.0),
        ]
    }

    pub fn frame(records: &[Record]) -> FeatureFrame {
        FeatureFrame {
            names: Self::feature_names(),
            rows: records
                .iter()
                .map(|record| Self::engineer(record).to_vec())
                .collect(),
        }
    }
}

/// Named feature columns. Consumers select by name, never by position.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureFrame {
    names: Vec<String>,
    rows: Vec<Vec<f64>>,
}

impl FeatureFrame {
    pub fn new(names: Vec<String>, rows: Vec<Vec<f64>>) -> Result<Self, ModelError> {
        if let Some(row) = rows.iter().find(|row| row.len() != names.len()) {
            return Err(ModelError::DimensionMismatch {
                expected: names.len(),
                found: row.len(),
            });
        }
        Ok(Self { names, rows })
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn rows(&self) -> &[Vec<f64>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Reorders columns to `wanted`. Every missing name is reported at once.
    pub fn select(&self, wanted: &[String]) -> Result<Vec<Vec<f64>>, ModelError> {
        let mut positions = Vec::with_capacity(wanted.len());
        let mut missing = Vec::new();
        for name in wanted {
            match self.names.iter().position(|candidate| candidate == name) {
                Some(position) => positions.push(position),
                None => missing.push(name.clone()),
            }
        }
        if !missing.is_empty() {
            return Err(ModelError::FeatureMismatch { missing });
        }

        Ok(self
            .rows
            .iter()
            .map(|row| positions.iter().map(|&position| row[position]).collect())
            .collect())
    }
}
