//! Training tables: CSV ingestion, unit normalization, cleaning, synthesis and rule labelling.

use super::ValidationError;
use crate::scoring::{Category, RawRatios, Record, RuleScorer};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info};

/// Amounts above this are assumed to be in won rather than 10k-won.
const WON_THRESHOLD: f64 = 10_000.0;
const IQR_FACTOR: f64 = 1.5;
const RATIO_SUM_BOUNDS: (f64, f64) = (0.9, 1.1);

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("failed to open dataset: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse dataset: {0}")]
    Csv(#[from] csv::Error),
}

/// A recognised training-table column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Column {
    TotalSpending,
    MeanSpending,
    NTransactions,
    Ratio(Category),
    Income,
    RuleScore,
    RuleLabel,
}

impl Column {
    pub fn required() -> Vec<Column> {
        let mut columns = vec![
            Column::TotalSpending,
            Column::MeanSpending,
            Column::NTransactions,
        ];
        columns.extend(Category::ALL.iter().map(|category| Column::Ratio(*category)));
        columns.extend([Column::Income, Column::RuleScore, Column::RuleLabel]);
        columns
    }

    /// Resolves English or survey-style headers.
    pub fn from_header(header: &str) -> Option<Column> {
        let header = header.trim();
        let column = match header {
            "total_spending" => Column::TotalSpending,
            "mean_spending" => Column::MeanSpending,
            "n_transactions" => Column::NTransactions,
            "est_income_만원" | "est_income" | "income" => Column::Income,
            "재무건전_점수" | "rule_score" => Column::RuleScore,
            "재무건전_라벨" | "rule_label" => Column::RuleLabel,
            other => {
                return Category::ALL
                    .iter()
                    .find(|category| category.key() == other || category.survey_header() == other)
                    .map(|category| Column::Ratio(*category));
            }
        };
        Some(column)
    }

    pub fn name(self) -> &'static str {
        match self {
            Column::TotalSpending => "total_spending",
            Column::MeanSpending => "mean_spending",
            Column::NTransactions => "n_transactions",
            Column::Ratio(category) => category.key(),
            Column::Income => "est_income",
            Column::RuleScore => "rule_score",
            Column::RuleLabel => "rule_label",
        }
    }
}

/// One raw table row. Missing or unparseable cells are `None`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrainingRow {
    pub total_spending: Option<f64>,
    pub mean_spending: Option<f64>,
    pub n_transactions: Option<f64>,
    pub income: Option<f64>,
    pub ratios: RawRatios,
    pub rule_score: Option<f64>,
    pub rule_label: Option<u8>,
}

impl TrainingRow {
    fn numeric(&self, column: Column) -> Option<f64> {
        match column {
            Column::TotalSpending => self.total_spending,
            Column::MeanSpending => self.mean_spending,
            Column::NTransactions => self.n_transactions,
            Column::Income => self.income,
            _ => None,
        }
    }

    fn set(&mut self, column: Column, cell: &str) {
        let value = parse_cell(cell);
        match column {
            Column::TotalSpending => self.total_spending = value,
            Column::MeanSpending => self.mean_spending = value,
            Column::NTransactions => self.n_transactions = value,
            Column::Income => self.income = value,
            Column::Ratio(category) => self.ratios.set(category, value),
            Column::RuleScore => self.rule_score = value,
            Column::RuleLabel => {
                self.rule_label = value.filter(|v| *v == 0.0 || *v == 1.0).map(|v| v as u8)
            }
        }
    }

    fn record(&self) -> Option<Record> {
        Some(Record::new(
            self.total_spending?,
            self.mean_spending?,
            transaction_count(self.n_transactions?),
            self.income?,
            &self.ratios,
        ))
    }
}

fn parse_cell(cell: &str) -> Option<f64> {
    let cleaned = cell.trim().replace(',', "");
    cleaned.parse::<f64>().ok().filter(|value| value.is_finite())
}

fn transaction_count(value: f64) -> u32 {
    value.round().clamp(0.0, f64::from(u32::MAX)) as u32
}

/// A record with its ground-truth rule score and binary label.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelledRecord {
    pub record: Record,
    pub rule_score: f64,
    pub rule_label: u8,
}

impl LabelledRecord {
    pub fn from_rules(record: Record) -> Self {
        let rule = RuleScorer::evaluate(&record);
        Self {
            rule_score: rule.score,
            rule_label: rule.label(),
            record,
        }
    }
}

/// Counts of what cleaning removed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataQualityReport {
    pub original_size: usize,
    pub final_size: usize,
    pub removed_samples: usize,
    pub label_removed: usize,
    pub outlier_removed: BTreeMap<String, usize>,
    pub ratio_removed: usize,
    pub removal_rate: f64,
}

/// A training table as read from disk, before cleaning.
#[derive(Debug, Clone, Default)]
pub struct TrainingTable {
    columns: BTreeSet<Column>,
    rows: Vec<TrainingRow>,
}

impl TrainingTable {
    pub fn from_rows(rows: Vec<TrainingRow>) -> Self {
        Self {
            columns: Column::required().into_iter().collect(),
            rows,
        }
    }

    pub fn from_labelled(records: &[LabelledRecord]) -> Self {
        let rows = records
            .iter()
            .map(|labelled| {
                let record = &labelled.record;
                TrainingRow {
                    total_spending: Some(record.total_spending),
                    mean_spending: Some(record.mean_spending),
                    n_transactions: Some(f64::from(record.n_transactions)),
                    income: Some(record.income),
                    ratios: RawRatios::from(*record.ratios()),
                    rule_score: Some(labelled.rule_score),
                    rule_label: Some(labelled.rule_label),
                }
            })
            .collect();
        Self::from_rows(rows)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, DatasetError> {
        let file = File::open(path.as_ref())?;
        Self::from_reader(file)
    }

    /// Unknown columns are ignored; blank cells become missing values.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, DatasetError> {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(reader);

        let mapping: Vec<Option<Column>> = reader
            .headers()?
            .iter()
            .map(|header| Column::from_header(header.trim_start_matches('\u{feff}')))
            .collect();
        let columns: BTreeSet<Column> = mapping.iter().flatten().copied().collect();

        let mut rows = Vec::new();
        for result in reader.records() {
            let line = result?;
            let mut row = TrainingRow::default();
            for (column, cell) in mapping.iter().zip(line.iter()) {
                if let Some(column) = column {
                    row.set(*column, cell);
                }
            }
            rows.push(row);
        }

        debug!(rows = rows.len(), columns = columns.len(), "training table loaded");
        Ok(Self { columns, rows })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[TrainingRow] {
        &self.rows
    }

    pub fn has_column(&self, column: Column) -> bool {
        self.columns.contains(&column)
    }

    /// Rows with every amount present, as normalized records. Labels are ignored.
    pub fn records(&self) -> Vec<Record> {
        self.rows.iter().filter_map(TrainingRow::record).collect()
    }

    /// Divides spending and income columns by 10,000 when they look like won.
    pub fn normalize_units(&mut self) {
        let spending_max = column_max(&self.rows, Column::TotalSpending);
        if spending_max > WON_THRESHOLD {
            info!(max = spending_max, "converting spending from won to 10k-won");
            for row in &mut self.rows {
                row.total_spending = row.total_spending.map(|v| v / WON_THRESHOLD);
                row.mean_spending = row.mean_spending.map(|v| v / WON_THRESHOLD);
            }
        }

        let income_max = column_max(&self.rows, Column::Income);
        if income_max > WON_THRESHOLD {
            info!(max = income_max, "converting income from won to 10k-won");
            for row in &mut self.rows {
                row.income = row.income.map(|v| v / WON_THRESHOLD);
            }
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        let missing: Vec<String> = Column::required()
            .into_iter()
            .filter(|column| !self.columns.contains(column))
            .map(|column| column.name().to_string())
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::MissingColumns(missing))
        }
    }

    /// Drops unlabelled rows, non-positive amounts, IQR outliers and rows whose ratios do not
    /// roughly sum to one, then fills the remaining gaps.
    pub fn clean(&self) -> Result<(Vec<LabelledRecord>, DataQualityReport), ValidationError> {
        self.validate()?;
        let original_size = self.rows.len();

        let mut rows: Vec<&TrainingRow> = self
            .rows
            .iter()
            .filter(|row| row.rule_score.is_some() && row.rule_label.is_some())
            .collect();
        let label_removed = original_size - rows.len();

        let mut outlier_removed = BTreeMap::new();
        for column in [
            Column::TotalSpending,
            Column::MeanSpending,
            Column::NTransactions,
            Column::Income,
        ] {
            let before = rows.len();
            rows.retain(|row| row.numeric(column).is_some_and(|value| value > 0.0));

            let mut values: Vec<f64> = rows.iter().filter_map(|row| row.numeric(column)).collect();
            values.sort_by(f64::total_cmp);
            if let (Some(q1), Some(q3)) = (quantile(&values, 0.25), quantile(&values, 0.75)) {
                let iqr = q3 - q1;
                let (lower, upper) = (q1 - IQR_FACTOR * iqr, q3 + IQR_FACTOR * iqr);
                rows.retain(|row| {
                    row.numeric(column)
                        .is_some_and(|value| value >= lower && value <= upper)
                });
            }

            let removed = before - rows.len();
            if removed > 0 {
                debug!(column = column.name(), removed, "outliers removed");
            }
            outlier_removed.insert(column.name().to_string(), removed);
        }

        let before_ratio = rows.len();
        rows.retain(|row| {
            let sum = row.ratios.present_sum();
            sum >= RATIO_SUM_BOUNDS.0 && sum <= RATIO_SUM_BOUNDS.1
        });
        let ratio_removed = before_ratio - rows.len();

        if rows.is_empty() {
            return Err(ValidationError::EmptyAfterCleaning);
        }

        let median_of = |column: Column| {
            let mut values: Vec<f64> = rows.iter().filter_map(|row| row.numeric(column)).collect();
            values.sort_by(f64::total_cmp);
            quantile(&values, 0.5).unwrap_or(0.0)
        };
        let fill = (
            median_of(Column::TotalSpending),
            median_of(Column::MeanSpending),
            median_of(Column::Income),
        );

        let cleaned: Vec<LabelledRecord> = rows
            .iter()
            .filter_map(|row| {
                let mut ratios = row.ratios;
                for category in Category::ALL {
                    if ratios.get(category).is_none() {
                        ratios.set(category, Some(0.0));
                    }
                }
                Some(LabelledRecord {
                    record: Record::new(
                        row.total_spending.unwrap_or(fill.0),
                        row.mean_spending.unwrap_or(fill.1),
                        transaction_count(row.n_transactions?),
                        row.income.unwrap_or(fill.2),
                        &ratios,
                    ),
                    rule_score: row.rule_score?,
                    rule_label: row.rule_label?,
                })
            })
            .collect();

        let final_size = cleaned.len();
        let removed_samples = original_size - final_size;
        let report = DataQualityReport {
            original_size,
            final_size,
            removed_samples,
            label_removed,
            outlier_removed,
            ratio_removed,
            removal_rate: removed_samples as f64 / original_size.max(1) as f64,
        };
        info!(
            original = original_size,
            kept = final_size,
            removal_rate = report.removal_rate,
            "training data cleaned"
        );
        Ok((cleaned, report))
    }
}

fn column_max(rows: &[TrainingRow], column: Column) -> f64 {
    rows.iter()
        .filter_map(|row| row.numeric(column))
        .fold(f64::NEG_INFINITY, f64::max)
}

/// Linear-interpolated quantile of sorted values.
fn quantile(sorted: &[f64], q: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let position = q * (sorted.len() - 1) as f64;
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    let fraction = position - lower as f64;
    Some(sorted[lower] + fraction * (sorted[upper] - sorted[lower]))
}

/// Typical budget shares used as concentration weights when synthesizing households.
const SYNTHETIC_PROFILE: [f64; 7] = [0.22, 0.18, 0.12, 0.10, 0.10, 0.08, 0.20];

/// Random households with rule-generated labels, reproducible for a seed.
pub fn synthesize(n: usize, seed: u64) -> Vec<LabelledRecord> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n)
        .map(|_| {
            let n_transactions: u32 = rng.gen_range(5..=400);
            let total_spending: f64 = rng.gen_range(60.0..700.0);
            let mean_spending = total_spending / f64::from(n_transactions);
            let income = total_spending * rng.gen_range(0.7..2.5);

            // Exponential draws normalised to the simplex give a Dirichlet sample.
            let draws: Vec<f64> = SYNTHETIC_PROFILE
                .iter()
                .map(|weight| -weight * (1.0 - rng.gen::<f64>()).ln())
                .collect();
            let total: f64 = draws.iter().sum();
            let mut ratios = RawRatios::default();
            for (category, draw) in Category::ALL.iter().zip(&draws) {
                ratios.set(*category, Some(draw / total));
            }

            LabelledRecord::from_rules(Record::new(
                total_spending,
                mean_spending,
                n_transactions,
                income,
                &ratios,
            ))
        })
        .collect()
}

/// Writes records with their rule score, persona and label.
pub fn write_labelled<W: Write>(writer: W, records: &[LabelledRecord]) -> Result<(), DatasetError> {
    let mut writer = csv::Writer::from_writer(writer);

    let mut header: Vec<&str> = vec![
        Column::TotalSpending.name(),
        Column::MeanSpending.name(),
        Column::NTransactions.name(),
    ];
    header.extend(Category::ALL.iter().map(|category| category.key()));
    header.extend([
        Column::Income.name(),
        Column::RuleScore.name(),
        "persona_level",
        "persona_name",
        "persona_emoji",
        "persona_description",
        Column::RuleLabel.name(),
    ]);
    writer.write_record(&header)?;

    for labelled in records {
        let record = &labelled.record;
        let level = crate::scoring::PersonaLevel::from_score(labelled.rule_score);
        let mut line = vec![
            record.total_spending.to_string(),
            record.mean_spending.to_string(),
            record.n_transactions.to_string(),
        ];
        line.extend(record.ratios().iter().map(|(_, value)| value.to_string()));
        line.extend([
            record.income.to_string(),
            labelled.rule_score.to_string(),
            level.rank().to_string(),
            level.name().to_string(),
            level.emoji().to_string(),
            level.description().to_string(),
            labelled.rule_label.to_string(),
        ]);
        writer.write_record(&line)?;
    }

    writer.flush()?;
    Ok(())
}
