use super::fallback::fallback_probabilities;
use super::persona::PersonaAssigner;
use super::{InferenceError, Record, RiskClass, ScoreResult, ScoreSource, Scorer};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;

const BASE_SCORE: f64 = 60.0;
const DSR_WARN: f64 = 0.30;
const DSR_RISK: f64 = 0.40;
const DA_WARN: f64 = 0.50;
const DA_RISK: f64 = 0.70;

#[derive(Debug, thiserror::Error)]
pub enum ReferenceTableError {
    #[error("failed to read reference table: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse reference table: {0}")]
    Csv(#[from] csv::Error),
    #[error("reference table has no rows")]
    Empty,
    #[error("quintile {0} outside 1-5")]
    InvalidQuintile(u8),
    #[error("table has no debt ratio columns")]
    NoDebtColumns,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReferenceRow {
    #[serde(alias = "처분가능소득_만원")]
    pub income: f64,
    #[serde(alias = "소득분위")]
    pub quintile: u8,
}

/// Income quintile reference, matched by nearest income.
#[derive(Debug, Clone, PartialEq)]
pub struct QuintileTable {
    rows: Vec<ReferenceRow>,
}

impl QuintileTable {
    pub fn new(rows: Vec<ReferenceRow>) -> Result<Self, ReferenceTableError> {
        if rows.is_empty() {
            return Err(ReferenceTableError::Empty);
        }
        if let Some(row) = rows.iter().find(|row| !(1..=5).contains(&row.quintile)) {
            return Err(ReferenceTableError::InvalidQuintile(row.quintile));
        }
        Ok(Self { rows })
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self, ReferenceTableError> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);
        let rows = csv_reader
            .deserialize::<ReferenceRow>()
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(rows)
    }

    pub fn from_path(path: &Path) -> Result<Self, ReferenceTableError> {
        Self::from_reader(File::open(path)?)
    }

    pub fn rows(&self) -> &[ReferenceRow] {
        &self.rows
    }

    /// Quintile of the row whose income is closest; the first row wins ties.
    pub fn nearest(&self, income: f64) -> u8 {
        let mut best = &self.rows[0];
        let mut best_distance = (best.income - income).abs();
        for row in &self.rows[1..] {
            let distance = (row.income - income).abs();
            if distance < best_distance {
                best = row;
                best_distance = distance;
            }
        }
        best.quintile
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RealisticOutcome {
    pub score: f64,
    pub label: u8,
    pub quintile: u8,
}

/// Debt-burden scorer anchored on an income quintile reference table.
#[derive(Debug, Clone)]
pub struct RealisticScorer {
    table: Arc<QuintileTable>,
}

impl RealisticScorer {
    pub fn new(table: Arc<QuintileTable>) -> Self {
        Self { table }
    }

    pub fn table(&self) -> &QuintileTable {
        &self.table
    }

    /// Non-finite ratios skip their adjustment but never trip the label override.
    pub fn outcome(dsr: f64, debt_to_asset: f64, quintile: u8) -> RealisticOutcome {
        let mut score = BASE_SCORE;

        if dsr.is_finite() {
            if dsr >= DSR_RISK {
                score -= 30.0;
            } else if dsr >= DSR_WARN {
                score -= 15.0;
            }
        }

        if debt_to_asset.is_finite() {
            if debt_to_asset >= DA_RISK {
                score -= 25.0;
            } else if debt_to_asset >= DA_WARN {
                score -= 10.0;
            }
        }

        if quintile <= 2 {
            score += 5.0;
        } else if quintile >= 4 {
            score -= 5.0;
        }
        let score = score.clamp(0.0, 100.0);

        let overridden = dsr >= DSR_RISK || debt_to_asset >= DA_RISK;
        let label = if overridden { 0 } else { u8::from(score >= 60.0) };

        RealisticOutcome {
            score,
            label,
            quintile,
        }
    }

    pub fn evaluate(&self, record: &Record) -> Result<RealisticOutcome, InferenceError> {
        let debt = record.debt.ok_or(InferenceError::MissingDebtReference)?;
        let quintile = self.table.nearest(record.income);
        Ok(Self::outcome(
            debt.debt_service_ratio,
            debt.debt_to_asset_ratio,
            quintile,
        ))
    }

    /// The outcome together with the result built from it, from a single evaluation.
    pub fn assess(
        &self,
        record: &Record,
    ) -> Result<(RealisticOutcome, ScoreResult), InferenceError> {
        let outcome = self.evaluate(record)?;
        let risk_class = RiskClass::from_score(outcome.score);
        let result = ScoreResult {
            score: outcome.score,
            risk_class,
            probabilities: fallback_probabilities(risk_class),
            persona: PersonaAssigner::assign(outcome.score, record),
            savings: record.savings(),
            source: ScoreSource::Realistic,
        };
        Ok((outcome, result))
    }
}

impl Scorer for RealisticScorer {
    fn score(&self, record: &Record) -> Result<ScoreResult, InferenceError> {
        self.assess(record).map(|(_, result)| result)
    }
}
