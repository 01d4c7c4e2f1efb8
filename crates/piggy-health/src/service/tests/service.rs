use super::common::*;
use crate::scoring::{Persona, RiskClass, ScoreSource};
use crate::service::{ScoreRequest, ScoringService, ScoringServiceError};

#[test]
fn rules_only_service_uses_the_fallback() {
    let response = ScoringService::rules_only()
        .score(&healthy_request())
        .expect("valid request");

    assert_eq!(response.score, 84.0);
    assert_eq!(response.source, ScoreSource::Fallback);
    assert_eq!(response.risk_label, RiskClass::Safe.index());
    assert_eq!(response.probabilities, [0.7, 0.2, 0.08, 0.02]);
    assert_eq!(response.persona.persona, Persona::SuperSaver);
    assert_eq!(response.savings, 200.0);
    assert_eq!(response.savings_rate, 40.0);
}

#[test]
fn negative_and_non_finite_amounts_are_rejected() {
    let service = ScoringService::rules_only();

    let negative = ScoreRequest {
        income: -1.0,
        ..healthy_request()
    };
    assert!(matches!(
        service.score(&negative),
        Err(ScoringServiceError::Invalid { field: "income", .. })
    ));

    let infinite = ScoreRequest {
        total_spending: f64::INFINITY,
        ..healthy_request()
    };
    assert!(matches!(
        service.score(&infinite),
        Err(ScoringServiceError::Invalid {
            field: "total_spending",
            ..
        })
    ));
}

#[test]
fn zero_income_reports_full_deficit() {
    let request = ScoreRequest {
        income: 0.0,
        ..healthy_request()
    };
    let response = ScoringService::rules_only()
        .score(&request)
        .expect("zero income is valid");
    assert_eq!(response.savings_rate, -100.0);
}

#[test]
fn model_backed_scores_stay_in_range() {
    let service = full_service();
    assert!(service.has_model());

    let response = service.score(&healthy_request()).expect("valid request");
    assert_eq!(response.source, ScoreSource::Model);
    assert!((0.0..=100.0).contains(&response.score));
    let total: f64 = response.probabilities.iter().sum();
    assert!((total - 1.0).abs() < 1e-9);
}

#[test]
fn realistic_scoring_applies_the_debt_override() {
    let response = full_service()
        .score_realistic(&realistic_request())
        .expect("reference table loaded");
    assert_eq!(response.result.score, 30.0);
    assert_eq!(response.label, 0);
    assert_eq!(response.quintile, 3);
    assert_eq!(response.result.source, ScoreSource::Realistic);
}

#[test]
fn realistic_scoring_requires_a_reference_table() {
    assert!(matches!(
        ScoringService::rules_only().score_realistic(&realistic_request()),
        Err(ScoringServiceError::RealisticUnavailable)
    ));
}

#[test]
fn model_info_describes_the_loaded_artifact() {
    let info = full_service().model_info();
    assert!(info.model_loaded);
    assert!(info.reference_table_loaded);
    assert_eq!(info.version.as_deref(), Some("consumption_pattern_v1.0"));
    assert_eq!(info.top_features.len(), 10);

    let empty = ScoringService::rules_only().model_info();
    assert!(!empty.model_loaded);
    assert!(empty.top_features.is_empty());
}
