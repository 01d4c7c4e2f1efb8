use piggy_health::model::synthesize;
use piggy_health::scoring::{
    Category, PersonaAssigner, PersonaLevel, RatioNormalizer, RawRatios, RealisticScorer, Record,
    RuleScorer, ScoreBlender, Savings,
};

fn raw(values: [f64; 7]) -> RawRatios {
    let mut raw = RawRatios::default();
    for (category, value) in Category::ALL.iter().zip(values) {
        raw.set(*category, Some(value));
    }
    raw
}

fn scenario_record() -> Record {
    Record::new(
        300.0,
        2.0,
        150,
        400.0,
        &raw([0.20, 0.18, 0.15, 0.10, 0.10, 0.12, 0.15]),
    )
}

#[test]
fn reference_household_scores_seventy() {
    let rule = RuleScorer::evaluate(&scenario_record());
    assert_eq!(rule.score, 70.0);
    assert_eq!(rule.label(), 1);
    assert_eq!(rule.level(), PersonaLevel::from_score(70.0));
}

#[test]
fn normalization_is_idempotent_and_all_zero_maps_to_other() {
    let once = RatioNormalizer::normalize(&raw([0.4, 0.1, 0.1, 0.1, 0.1, 0.1, 0.3]));
    let twice = RatioNormalizer::normalize(&RawRatios::from(once));
    assert_eq!(once, twice);
    assert!((once.sum() - 1.0).abs() < 1e-12);

    let zero = RatioNormalizer::normalize(&RawRatios::default());
    for (category, value) in zero.iter() {
        let expected = if category == Category::Other { 1.0 } else { 0.0 };
        assert_eq!(value, expected, "{category:?}");
    }
}

#[test]
fn rule_scores_are_bounded_and_deterministic() {
    for labelled in synthesize(500, 3) {
        let first = RuleScorer::evaluate(&labelled.record);
        let second = RuleScorer::evaluate(&labelled.record);
        assert!((0.0..=100.0).contains(&first.score));
        assert_eq!(first, second);
        assert_eq!(first.score, labelled.rule_score);
    }
}

#[test]
fn persona_level_never_drops_as_score_rises() {
    for (rate, income, spending) in [(0.4, 700.0, 300.0), (-0.3, 200.0, 260.0), (0.0, 400.0, 400.0)]
    {
        let mut previous = 0;
        for step in 0..=100 {
            let persona = PersonaAssigner::describe(f64::from(step), rate, income, spending);
            assert!(persona.level >= previous, "score {step}");
            previous = persona.level;
        }
    }
}

#[test]
fn zero_income_means_full_deficit_rate() {
    assert_eq!(Savings::compute(0.0, 250.0).rate, -1.0);
    let record = Record::new(250.0, 2.5, 100, 0.0, &raw([0.2; 7]));
    assert_eq!(record.savings().rate, -1.0);
}

#[test]
fn realistic_debt_overrides_force_the_risky_label() {
    let outcome = RealisticScorer::outcome(0.45, 0.30, 3);
    assert_eq!(outcome.score, 30.0);
    assert_eq!(outcome.label, 0);

    assert_eq!(RealisticScorer::outcome(0.10, 0.75, 1).label, 0);
    assert_eq!(RealisticScorer::outcome(0.10, 0.20, 1).label, 1);
}

#[test]
fn blended_score_spans_zero_to_one_hundred() {
    let wealthy = Record::new(300.0, 3.0, 100, 800.0, &raw([0.2, 0.2, 0.1, 0.1, 0.1, 0.1, 0.2]));
    assert_eq!(ScoreBlender::combine(80.0, &wealthy), 100.0);
    assert_eq!(ScoreBlender::combine(500.0, &wealthy), 100.0);

    let deficit = Record::new(900.0, 9.0, 100, 100.0, &raw([0.2, 0.2, 0.1, 0.1, 0.1, 0.1, 0.2]));
    let floor = ScoreBlender::combine(0.0, &deficit);
    assert!((0.0..=1.0).contains(&floor));
}

#[test]
fn blender_without_model_always_answers() {
    let blender = ScoreBlender::rules_only();
    for labelled in synthesize(100, 11) {
        let result = blender.score(&labelled.record);
        assert!((0.0..=100.0).contains(&result.score));
        let total: f64 = result.probabilities.iter().sum();
        assert!((total - 1.0).abs() < 1e-9);
    }
}
