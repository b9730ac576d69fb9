//! Engine configuration snapshot and startup validation.
//!
//! Loaded from the configuration tables by `data::settings`, frozen for the
//! duration of a request, and refreshed in the background. Validation failure
//! is fatal at startup; a refresh that fails validation keeps the previous
//! snapshot.

use std::collections::{HashMap, HashSet};

use crate::data::course_types::Grade;
use crate::engine::EngineError;

/// How a `subject_related_term` row matches a course.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchType {
    /// Term appears in the course name.
    Related,
    /// Interchangeable name for the subject itself.
    Synonym,
    /// CAH classification code matched against `courses.cah_codes`.
    Category,
}

impl MatchType {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "related" => Some(Self::Related),
            "synonym" => Some(Self::Synonym),
            "category" => Some(Self::Category),
            _ => None,
        }
    }
}

/// One relevance term attached to a student subject.
#[derive(Debug, Clone)]
pub struct RelatedTerm {
    pub term: String,
    pub match_type: MatchType,
}

/// Weights of the five scorers. Must sum to 1.0.
#[derive(Debug, Clone, Copy)]
pub struct ScoringWeights {
    pub subject_match: f64,
    pub grade_match: f64,
    pub preference_match: f64,
    pub ranking: f64,
    pub employability: f64,
}

impl ScoringWeights {
    pub fn sum(&self) -> f64 {
        self.subject_match + self.grade_match + self.preference_match + self.ranking + self.employability
    }
}

/// Settings for the feedback engine (`feedback_setting` table).
#[derive(Debug, Clone, Copy)]
pub struct FeedbackSettings {
    /// Multiplier applied to the combined adjustment before it reaches the
    /// final score.
    pub feedback_weight: f64,
    pub decay_days: f64,
    /// Buckets with fewer records than this are discarded.
    pub min_count: usize,
    pub own_weight: f64,
    pub peer_weight: f64,
    pub positive_boost: f64,
    pub negative_penalty: f64,
}

/// Display thresholds for the reason builder (`reason_setting` table).
#[derive(Debug, Clone, Copy)]
pub struct ReasonSettings {
    pub top_rank_threshold: i32,
    pub high_employment_threshold: f64,
}

/// Immutable configuration snapshot used by a single request.
///
/// All keys (subjects, terms, regions, interests) are stored normalized; see
/// `engine::text::normalize`.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub grade_values: HashMap<Grade, i32>,
    pub weights: ScoringWeights,
    pub related_terms: HashMap<String, Vec<RelatedTerm>>,
    pub generic_terms: HashSet<String>,
    /// generic term -> subjects allowed to claim it.
    pub generic_term_rules: HashMap<String, HashSet<String>>,
    /// region -> its cities.
    pub region_cities: HashMap<String, HashSet<String>>,
    /// interest -> positive course-name keywords.
    pub career_keywords: HashMap<String, Vec<String>>,
    /// interest -> disqualifying course-name keywords.
    pub career_conflicts: HashMap<String, Vec<String>>,
    /// interest -> course-name phrases exempt from its conflict keywords.
    pub conflict_exceptions: HashMap<String, Vec<String>>,
    pub feedback: FeedbackSettings,
    pub reasons: ReasonSettings,
}

const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

impl EngineConfig {
    /// Numeric value of a grade. Validation guarantees every letter is priced.
    pub fn grade_value(&self, grade: Grade) -> i32 {
        self.grade_values.get(&grade).copied().unwrap_or(0)
    }

    /// Check cross-table invariants. Called once at startup (fatal) and after
    /// every background refresh (previous snapshot kept on failure).
    pub fn validate(&self) -> Result<(), EngineError> {
        let sum = self.weights.sum();
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(EngineError::ConfigurationInvalid {
                key: "recommendation_weight".into(),
                reason: format!("weights sum to {sum}, expected 1.0"),
            });
        }
        for (key, weight) in [
            ("subject_match", self.weights.subject_match),
            ("grade_match", self.weights.grade_match),
            ("preference_match", self.weights.preference_match),
            ("ranking", self.weights.ranking),
            ("employability", self.weights.employability),
        ] {
            if !(0.0..=1.0).contains(&weight) {
                return Err(EngineError::ConfigurationInvalid {
                    key: format!("recommendation_weight.{key}"),
                    reason: format!("weight {weight} outside [0, 1]"),
                });
            }
        }

        for grade in Grade::ALL {
            if !self.grade_values.contains_key(&grade) {
                return Err(EngineError::ConfigurationInvalid {
                    key: "grade_value".into(),
                    reason: format!("missing value for grade {grade}"),
                });
            }
        }

        for term in self.generic_term_rules.keys() {
            if !self.generic_terms.contains(term) {
                return Err(EngineError::ConfigurationInvalid {
                    key: "generic_term_rule".into(),
                    reason: format!("rule references unknown generic term '{term}'"),
                });
            }
        }

        if self.feedback.decay_days <= 0.0 {
            return Err(EngineError::ConfigurationInvalid {
                key: "feedback_setting.feedback_decay_days".into(),
                reason: format!("must be positive, got {}", self.feedback.decay_days),
            });
        }
        for (key, value) in [
            ("feedback_weight", self.feedback.feedback_weight),
            ("own_weight", self.feedback.own_weight),
            ("peer_weight", self.feedback.peer_weight),
            ("positive_boost", self.feedback.positive_boost),
            ("negative_penalty", self.feedback.negative_penalty),
        ] {
            if value < 0.0 {
                return Err(EngineError::ConfigurationInvalid {
                    key: format!("feedback_setting.{key}"),
                    reason: format!("must be non-negative, got {value}"),
                });
            }
        }

        Ok(())
    }
}
