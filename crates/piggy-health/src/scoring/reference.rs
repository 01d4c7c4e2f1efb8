//! Debt-based reference indicators from national household statistics.

use super::realistic::ReferenceTableError;
use csv::StringRecord;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use tracing::debug;

const DEBT_TO_ASSET: &[&str] = &["부채_자산_퍼센트", "debt_to_asset_percent"];
const DEBT_TO_FINANCIAL_ASSETS: &[&str] = &[
    "부채_금융자산_퍼센트",
    "debt_to_financial_assets_percent",
];
const REPAYMENT: &[&str] = &["원리금상환액_만원", "repayment"];
const DISPOSABLE_INCOME: &[&str] = &["처분가능소득_만원", "disposable_income"];

/// Debt ratios of one statistics row. Missing values stay `None`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ReferenceIndicators {
    pub debt_to_asset: Option<f64>,
    pub debt_to_financial_assets: Option<f64>,
    pub repayment_burden: Option<f64>,
}

impl ReferenceIndicators {
    /// Builds indicators from published figures: percentages for the debt ratios, and
    /// principal-and-interest repayments against disposable income (both in 만원).
    pub fn from_published(
        debt_to_asset_percent: Option<f64>,
        debt_to_financial_assets_percent: Option<f64>,
        repayment: Option<f64>,
        disposable_income: Option<f64>,
    ) -> Self {
        let repayment_burden = match (repayment, disposable_income) {
            (Some(paid), Some(income)) if income != 0.0 => Some((paid / income).max(0.0)),
            _ => None,
        };
        Self {
            debt_to_asset: debt_to_asset_percent.map(|value| value / 100.0),
            debt_to_financial_assets: debt_to_financial_assets_percent.map(|value| value / 100.0),
            repayment_burden,
        }
    }

    pub fn score(&self) -> ReferenceScore {
        let filled = |value: Option<f64>| value.filter(|v| v.is_finite()).unwrap_or(0.0);

        let debt_asset_penalty = (filled(self.debt_to_asset) * 400.0).clamp(0.0, 100.0);
        let repayment_penalty = (filled(self.repayment_burden) * 300.0).clamp(0.0, 100.0);
        let over_financial = (filled(self.debt_to_financial_assets) - 1.0).max(0.0);
        let debt_financial_penalty = (over_financial * 200.0).clamp(0.0, 100.0);

        let score = (100.0 - debt_asset_penalty - repayment_penalty - debt_financial_penalty)
            .clamp(0.0, 100.0);

        ReferenceScore {
            score,
            label: u8::from(self.is_healthy()),
        }
    }

    /// All three ratios known and inside the healthy limits.
    fn is_healthy(&self) -> bool {
        matches!(self.debt_to_asset, Some(v) if v <= 0.25)
            && matches!(self.debt_to_financial_assets, Some(v) if v <= 1.10)
            && matches!(self.repayment_burden, Some(v) if v <= 0.25)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ReferenceScore {
    pub score: f64,
    pub label: u8,
}

/// Positions of the published debt figures in a statistics table header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublishedColumns {
    debt_to_asset: Option<usize>,
    debt_to_financial_assets: Option<usize>,
    repayment: Option<usize>,
    disposable_income: Option<usize>,
}

impl PublishedColumns {
    /// `None` unless the header carries at least one debt ratio column.
    pub fn locate(headers: &StringRecord) -> Option<Self> {
        let find = |names: &[&str]| {
            headers
                .iter()
                .position(|header| names.contains(&header.trim_start_matches('\u{feff}').trim()))
        };
        let columns = Self {
            debt_to_asset: find(DEBT_TO_ASSET),
            debt_to_financial_assets: find(DEBT_TO_FINANCIAL_ASSETS),
            repayment: find(REPAYMENT),
            disposable_income: find(DISPOSABLE_INCOME),
        };
        (columns.debt_to_asset.is_some() || columns.debt_to_financial_assets.is_some())
            .then_some(columns)
    }

    /// Reads only the header of the CSV at `path`.
    pub fn from_path(path: &Path) -> Result<Option<Self>, ReferenceTableError> {
        let mut reader = csv::Reader::from_reader(File::open(path)?);
        Ok(Self::locate(reader.headers()?))
    }

    /// A debt ratio column the table lacks entirely counts as zero debt. Blank or
    /// unparseable cells stay missing.
    pub fn indicators(&self, record: &StringRecord) -> ReferenceIndicators {
        let cell = |index: usize| {
            record
                .get(index)
                .and_then(|raw| raw.trim().replace(',', "").parse::<f64>().ok())
                .filter(|value| value.is_finite())
        };
        let ratio = |index: Option<usize>| index.map_or(Some(0.0), cell);

        ReferenceIndicators::from_published(
            ratio(self.debt_to_asset),
            ratio(self.debt_to_financial_assets),
            self.repayment.and_then(cell),
            self.disposable_income.and_then(cell),
        )
    }
}

/// Copies a statistics table, appending `reference_score` and `reference_label` to every
/// row. Returns the number of rows written.
pub fn label_published<R: Read, W: Write>(
    reader: R,
    writer: W,
) -> Result<usize, ReferenceTableError> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader);
    let headers = reader.headers()?.clone();
    let columns = PublishedColumns::locate(&headers).ok_or(ReferenceTableError::NoDebtColumns)?;

    let mut writer = csv::Writer::from_writer(writer);
    let mut header = headers.clone();
    header.push_field("reference_score");
    header.push_field("reference_label");
    writer.write_record(&header)?;

    let mut written = 0;
    for result in reader.records() {
        let mut record = result?;
        let scored = columns.indicators(&record).score();
        record.push_field(&scored.score.to_string());
        record.push_field(&scored.label.to_string());
        writer.write_record(&record)?;
        written += 1;
    }
    writer.flush()?;

    debug!(rows = written, "statistics table labelled");
    Ok(written)
}
