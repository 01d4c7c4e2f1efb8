use super::fallback::fallback_probabilities;
use super::persona::{PersonaAssigner, PersonaLevel, PersonaTier};
use super::{Category, InferenceError, Record, RiskClass, ScoreResult, ScoreSource, Scorer};
use serde::Serialize;

/// Rule that contributed to a [`RuleScore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleKind {
    SpendingScale,
    EssentialRatio,
    LuxuryRatio,
    Balance,
    Transactions,
    FixedCostPenalty,
    MedicalPenalty,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RuleComponent {
    pub rule: RuleKind,
    pub points: i32,
    pub notes: String,
}

/// Banded rule score plus the breakdown that produced it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RuleScore {
    pub score: f64,
    pub components: Vec<RuleComponent>,
}

impl RuleScore {
    pub fn level(&self) -> PersonaLevel {
        PersonaLevel::from_score(self.score)
    }

    pub fn tier(&self) -> PersonaTier {
        PersonaTier::from_score(self.score)
    }

    /// Binary training label: healthy when the score reaches 60.
    pub fn label(&self) -> u8 {
        u8::from(self.score >= 60.0)
    }
}

/// Additive banded scorer used to label training data.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleScorer;

impl RuleScorer {
    pub fn evaluate(record: &Record) -> RuleScore {
        let ratios = record.ratios();
        let mut components = Vec::new();
        let mut total: i32 = 0;

        let spending = record.total_spending;
        let scale_points = if spending <= 3000.0 {
            20
        } else if spending <= 5000.0 {
            10
        } else {
            0
        };
        components.push(RuleComponent {
            rule: RuleKind::SpendingScale,
            points: scale_points,
            notes: format!("total spending {spending:.1}"),
        });
        total += scale_points;

        let essential = ratios.food() + ratios.housing() + ratios.education() + ratios.medical();
        let essential_points = if (0.50..=0.65).contains(&essential) {
            20
        } else if (0.35..0.50).contains(&essential) || (essential > 0.65 && essential <= 0.75) {
            10
        } else {
            0
        };
        components.push(RuleComponent {
            rule: RuleKind::EssentialRatio,
            points: essential_points,
            notes: format!("essential share {essential:.2}"),
        });
        total += essential_points;

        let luxury = ratios.entertainment() + ratios.other();
        let luxury_points = if luxury <= 0.25 {
            20
        } else if luxury <= 0.40 {
            10
        } else {
            0
        };
        components.push(RuleComponent {
            rule: RuleKind::LuxuryRatio,
            points: luxury_points,
            notes: format!("luxury share {luxury:.2}"),
        });
        total += luxury_points;

        let balanced = ratios.iter().all(|(_, value)| value >= 0.05);
        if balanced {
            components.push(RuleComponent {
                rule: RuleKind::Balance,
                points: 10,
                notes: "every category at or above 5%".to_string(),
            });
            total += 10;
        }

        let n = record.n_transactions;
        if (200..=600).contains(&n) {
            components.push(RuleComponent {
                rule: RuleKind::Transactions,
                points: 10,
                notes: format!("{n} transactions within 200-600"),
            });
            total += 10;
        }

        let fixed = ratios.housing() + ratios.transport();
        if fixed > 0.40 {
            components.push(RuleComponent {
                rule: RuleKind::FixedCostPenalty,
                points: -10,
                notes: format!("housing and transport take {fixed:.2}"),
            });
            total -= 10;
        }

        let medical = ratios.get(Category::Medical);
        if medical < 0.05 {
            components.push(RuleComponent {
                rule: RuleKind::MedicalPenalty,
                points: -5,
                notes: format!("medical share {medical:.2} below 5%"),
            });
            total -= 5;
        }

        RuleScore {
            score: f64::from(total.clamp(0, 100)),
            components,
        }
    }
}

impl Scorer for RuleScorer {
    fn score(&self, record: &Record) -> Result<ScoreResult, InferenceError> {
        let rule = Self::evaluate(record);
        let savings = record.savings();
        let risk_class = RiskClass::from_score(rule.score);
        Ok(ScoreResult {
            score: rule.score,
            risk_class,
            probabilities: fallback_probabilities(risk_class),
            persona: PersonaAssigner::assign(rule.score, record),
            savings,
            source: ScoreSource::Rules,
        })
    }
}
