//! Rule-based scoring paths, persona tables, and the score blender.

mod blend;
mod fallback;
mod persona;
mod ratios;
mod realistic;
mod reference;
mod rules;

pub use blend::{
    financial_ratio_score, FinancialRatioScore, ModelBackedScorer, ScoreBlender,
    PATTERN_SCORE_CEILING,
};
pub use fallback::{fallback_probabilities, FallbackScorer};
pub use persona::{Persona, PersonaAssigner, PersonaDescriptor, PersonaLevel, PersonaTier};
pub use ratios::{Category, CategoryRatios, RatioNormalizer, RawRatios};
pub use realistic::{
    QuintileTable, RealisticOutcome, RealisticScorer, ReferenceTableError, ReferenceRow,
};
pub use reference::{label_published, PublishedColumns, ReferenceIndicators, ReferenceScore};
pub use rules::{RuleComponent, RuleKind, RuleScore, RuleScorer};

use crate::model::ModelError;
use serde::{Deserialize, Serialize};

/// Debt-burden reference metrics consumed only by the realistic scorer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DebtReference {
    pub debt_service_ratio: f64,
    pub debt_to_asset_ratio: f64,
}

/// One household's scoring input. Amounts are in 10k KRW (만원).
///
/// Ratios are normalized on construction, so every scorer sees a closed simplex.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub total_spending: f64,
    pub mean_spending: f64,
    pub n_transactions: u32,
    pub income: f64,
    ratios: CategoryRatios,
    pub debt: Option<DebtReference>,
}

impl Record {
    pub fn new(
        total_spending: f64,
        mean_spending: f64,
        n_transactions: u32,
        income: f64,
        ratios: &RawRatios,
    ) -> Self {
        Self {
            total_spending,
            mean_spending,
            n_transactions,
            income,
            ratios: RatioNormalizer::normalize(ratios),
            debt: None,
        }
    }

    pub fn with_debt(mut self, debt: DebtReference) -> Self {
        self.debt = Some(debt);
        self
    }

    pub fn ratios(&self) -> &CategoryRatios {
        &self.ratios
    }

    pub fn savings(&self) -> Savings {
        Savings::compute(self.income, self.total_spending)
    }
}

/// Monthly surplus and its share of income.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Savings {
    pub amount: f64,
    /// Fraction of income; `-1.0` when income is not positive.
    pub rate: f64,
}

impl Savings {
    pub fn compute(income: f64, total_spending: f64) -> Self {
        let amount = income - total_spending;
        let rate = if income > 0.0 { amount / income } else { -1.0 };
        Self { amount, rate }
    }
}

/// Four-tier risk grade, 0 being the healthiest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RiskClass {
    Safe,
    Caution,
    Danger,
    HighRisk,
}

impl RiskClass {
    pub const ALL: [RiskClass; 4] = [
        RiskClass::Safe,
        RiskClass::Caution,
        RiskClass::Danger,
        RiskClass::HighRisk,
    ];
    pub const COUNT: usize = 4;

    pub fn from_score(score: f64) -> Self {
        if score >= 80.0 {
            RiskClass::Safe
        } else if score >= 60.0 {
            RiskClass::Caution
        } else if score >= 40.0 {
            RiskClass::Danger
        } else {
            RiskClass::HighRisk
        }
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn index(self) -> usize {
        match self {
            RiskClass::Safe => 0,
            RiskClass::Caution => 1,
            RiskClass::Danger => 2,
            RiskClass::HighRisk => 3,
        }
    }

    pub fn info(self) -> RiskInfo {
        match self {
            RiskClass::Safe => RiskInfo {
                level: "safe",
                color: "green",
                description: "Finances are in very healthy shape",
            },
            RiskClass::Caution => RiskInfo {
                level: "caution",
                color: "yellow",
                description: "A little attention is needed",
            },
            RiskClass::Danger => RiskInfo {
                level: "danger",
                color: "orange",
                description: "Money management needs improvement",
            },
            RiskClass::HighRisk => RiskInfo {
                level: "high_risk",
                color: "red",
                description: "The financial plan needs revising right away",
            },
        }
    }
}

/// Presentation metadata for a risk class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RiskInfo {
    pub level: &'static str,
    pub color: &'static str,
    pub description: &'static str,
}

/// Which scoring path produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreSource {
    Model,
    Fallback,
    Rules,
    Realistic,
}

/// Output of every scoring path.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreResult {
    pub score: f64,
    pub risk_class: RiskClass,
    pub probabilities: [f64; 4],
    pub persona: PersonaDescriptor,
    pub savings: Savings,
    #[serde(skip)]
    pub source: ScoreSource,
}

/// Errors a scorer may report for a single record. The blender recovers from all of them.
#[derive(Debug, thiserror::Error)]
pub enum InferenceError {
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error("model produced a non-finite {0}")]
    NonFinite(&'static str),
    #[error("record carries no debt reference metrics")]
    MissingDebtReference,
}

/// Common contract of the rule, realistic, fallback and model-backed scoring paths.
pub trait Scorer: Send + Sync {
    fn score(&self, record: &Record) -> Result<ScoreResult, InferenceError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_income_yields_full_deficit_rate() {
        let savings = Savings::compute(0.0, 120.0);
        assert_eq!(savings.rate, -1.0);
        assert_eq!(savings.amount, -120.0);
    }

    #[test]
    fn risk_class_thresholds() {
        assert_eq!(RiskClass::from_score(80.0), RiskClass::Safe);
        assert_eq!(RiskClass::from_score(79.9), RiskClass::Caution);
        assert_eq!(RiskClass::from_score(60.0), RiskClass::Caution);
        assert_eq!(RiskClass::from_score(40.0), RiskClass::Danger);
        assert_eq!(RiskClass::from_score(39.0), RiskClass::HighRisk);
        for class in RiskClass::ALL {
            assert_eq!(RiskClass::from_index(class.index()), Some(class));
        }
    }
}
