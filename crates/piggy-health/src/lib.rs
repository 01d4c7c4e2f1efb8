//! Financial health scoring engine.
//!
//! Records flow through the ratio normalizer into either the rule scorer (training labels) or
//! the feature engineer and consumption-pattern model, and finally through the score blender
//! and persona assigner.

pub mod config;
pub mod error;
pub mod model;
pub mod scoring;
pub mod service;
pub mod telemetry;

pub use model::{
    ConsumptionPatternModel, FeatureEngineer, ModelArtifact, ModelError, ModelOptions,
    TrainingReport,
};
pub use scoring::{
    CategoryRatios, FallbackScorer, ModelBackedScorer, PersonaAssigner, RawRatios,
    RealisticScorer, Record, RiskClass, RuleScorer, ScoreBlender, ScoreResult, Scorer,
};
pub use service::{scoring_router, ScoringService};
