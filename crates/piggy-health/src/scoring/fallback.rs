use super::persona::PersonaAssigner;
use super::{InferenceError, Record, RiskClass, ScoreResult, ScoreSource, Scorer};
use tracing::debug;

const BASE_SCORE: f64 = 50.0;

/// Canned class probabilities reported when no classifier is involved.
pub fn fallback_probabilities(class: RiskClass) -> [f64; 4] {
    match class {
        RiskClass::Safe => [0.7, 0.2, 0.08, 0.02],
        RiskClass::Caution => [0.1, 0.6, 0.25, 0.05],
        RiskClass::Danger => [0.05, 0.25, 0.6, 0.1],
        RiskClass::HighRisk => [0.02, 0.08, 0.3, 0.6],
    }
}

/// Full rule-based scorer used when the consumption model is unavailable or fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct FallbackScorer;

impl FallbackScorer {
    pub fn raw_score(record: &Record) -> f64 {
        let ratios = record.ratios();
        let savings = record.savings();
        let mut score = BASE_SCORE;

        score += savings_adjustment(savings.rate);
        score += income_adjustment(record.income);

        let spending = record.total_spending;
        if spending > 600.0 {
            score -= 15.0;
        } else if spending > 400.0 {
            score -= 8.0;
        } else if spending < 50.0 {
            score -= 10.0;
        }

        let essential = ratios.food() + ratios.housing() + ratios.medical();
        if essential < 0.25 {
            score -= 15.0;
        } else if essential > 0.8 {
            score -= 20.0;
        } else if essential > 0.7 {
            score -= 10.0;
        } else if (0.4..=0.6).contains(&essential) {
            score += 5.0;
        }

        let n = record.n_transactions;
        if n < 20 {
            score -= 15.0;
        } else if n > 500 {
            score -= 10.0;
        } else if n > 300 {
            score -= 5.0;
        } else if (50..=200).contains(&n) {
            score += 3.0;
        }

        let mean = record.mean_spending;
        if mean > 20.0 {
            score -= 15.0;
        } else if mean > 10.0 {
            score -= 8.0;
        } else if mean < 0.1 {
            score -= 5.0;
        } else if (0.5..=3.0).contains(&mean) {
            score += 3.0;
        }

        let leisure = ratios.entertainment() + ratios.other();
        if leisure > 0.4 {
            score -= 15.0;
        } else if leisure > 0.3 {
            score -= 8.0;
        } else if leisure < 0.05 {
            score -= 3.0;
        } else if (0.1..=0.25).contains(&leisure) {
            score += 3.0;
        }

        let transport = ratios.transport();
        if transport > 0.3 {
            score -= 10.0;
        } else if transport > 0.25 {
            score -= 5.0;
        }

        let education = ratios.education();
        if education > 0.3 {
            score -= 5.0;
        } else if education > 0.05 {
            score += 2.0;
        }

        debug!(
            savings_rate = savings.rate,
            essential, leisure, raw = score, "fallback score computed"
        );
        score.clamp(0.0, 100.0)
    }
}

fn savings_adjustment(rate: f64) -> f64 {
    if rate < -0.2 {
        -60.0
    } else if rate < 0.0 {
        -45.0
    } else if rate < 0.05 {
        -25.0
    } else if rate < 0.1 {
        -15.0
    } else if rate < 0.2 {
        -5.0
    } else if rate >= 0.3 {
        15.0
    } else {
        10.0
    }
}

fn income_adjustment(income: f64) -> f64 {
    if income >= 800.0 {
        5.0
    } else if income >= 500.0 {
        3.0
    } else if income >= 300.0 {
        0.0
    } else if income >= 150.0 {
        -3.0
    } else {
        -5.0
    }
}

impl FallbackScorer {
    pub fn result(&self, record: &Record) -> ScoreResult {
        let score = Self::raw_score(record);
        let risk_class = RiskClass::from_score(score);
        ScoreResult {
            score,
            risk_class,
            probabilities: fallback_probabilities(risk_class),
            persona: PersonaAssigner::assign(score, record),
            savings: record.savings(),
            source: ScoreSource::Fallback,
        }
    }
}

impl Scorer for FallbackScorer {
    fn score(&self, record: &Record) -> Result<ScoreResult, InferenceError> {
        Ok(self.result(record))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scoring::{Category, RawRatios};

    fn record(ts: f64, mean: f64, n: u32, income: f64, ratios: [f64; 7]) -> Record {
        let mut raw = RawRatios::default();
        for (category, value) in Category::ALL.iter().zip(ratios) {
            raw.set(*category, Some(value));
        }
        Record::new(ts, mean, n, income, &raw)
    }

    #[test]
    fn probability_vectors_sum_to_one() {
        for class in RiskClass::ALL {
            let sum: f64 = fallback_probabilities(class).iter().sum();
            assert!((sum - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn healthy_saver_scores_high() {
        // savings 0.4 (+15), income 500 (+3), essential 0.5 (+5), n 150 (+3),
        // mean 2.0 (+3), leisure 0.25 (+3), education 0.1 (+2)
        let scored = FallbackScorer::raw_score(&record(
            300.0,
            2.0,
            150,
            500.0,
            [0.25, 0.15, 0.15, 0.10, 0.10, 0.10, 0.15],
        ));
        assert_eq!(scored, 84.0);
    }

    #[test]
    fn deep_deficit_is_clipped_at_zero() {
        let result = FallbackScorer
            .score(&record(
                900.0,
                25.0,
                5,
                100.0,
                [0.05, 0.05, 0.40, 0.30, 0.0, 0.0, 0.20],
            ))
            .expect("fallback never fails");
        assert_eq!(result.score, 0.0);
        assert_eq!(result.risk_class, RiskClass::HighRisk);
        assert_eq!(result.source, ScoreSource::Fallback);
    }
}
