//! The weighted scorer set: five independent scorers, each mapping a
//! (student, course) pair onto [0, 1].
//!
//! New scorers register against [`ScorerSet`]; the weighted sum is agnostic
//! to the implementations behind it.

use indexmap::IndexSet;

use crate::data::course_types::{CourseRecord, Grade};
use crate::engine::config::{EngineConfig, MatchType, ScoringWeights};
use crate::engine::text;
use crate::engine::types::{ScoreBreakdown, StudentProfile};

/// Which `recommendation_weight` row a scorer draws its weight from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WeightKey {
    SubjectMatch,
    GradeMatch,
    PreferenceMatch,
    Ranking,
    Employability,
}

impl WeightKey {
    fn weight(self, weights: &ScoringWeights) -> f64 {
        match self {
            Self::SubjectMatch => weights.subject_match,
            Self::GradeMatch => weights.grade_match,
            Self::PreferenceMatch => weights.preference_match,
            Self::Ranking => weights.ranking,
            Self::Employability => weights.employability,
        }
    }
}

/// Student subjects matched against one course.
#[derive(Debug, Clone, Default)]
pub struct SubjectMatches {
    /// Subjects appearing verbatim in the course's requirements.
    pub required: IndexSet<String>,
    /// Required plus relevance matches, in the profile's subject order.
    pub matched: IndexSet<String>,
}

/// Everything a scorer may look at for one candidate course. Pure data,
/// computed once per course by the pipeline.
pub struct ScoringContext<'a> {
    pub config: &'a EngineConfig,
    /// Normalized profile (see [`StudentProfile::normalized`]).
    pub profile: &'a StudentProfile,
    pub course: &'a CourseRecord,
    /// Parsed requirements: normalized subject plus required grade.
    pub requirements: &'a [(String, Grade)],
    /// Distinct required subject names.
    pub required_subjects: &'a IndexSet<String>,
    pub name_tokens: &'a [String],
    pub matches: &'a SubjectMatches,
    /// Worst rank among ranked universities, for normalization.
    pub max_rank: Option<i32>,
}

/// Match each of the student's subjects against a course.
///
/// A subject matches as *required* when it appears in the requirement list,
/// and as *relevant* when one of its related terms appears in the course
/// name (generic terms only via their allow-list rule) or one of its CAH
/// category codes is attached to the course.
pub fn compute_subject_matches(
    profile: &StudentProfile,
    required_subjects: &IndexSet<String>,
    name_tokens: &[String],
    cah_codes: &[String],
    config: &EngineConfig,
) -> SubjectMatches {
    let mut matches = SubjectMatches::default();
    for subject in &profile.subjects {
        let required = required_subjects.contains(subject);
        let related = config
            .related_terms
            .get(subject)
            .is_some_and(|terms| terms.iter().any(|t| term_matches(t, subject, name_tokens, cah_codes, config)));
        if required {
            matches.required.insert(subject.clone());
        }
        if required || related {
            matches.matched.insert(subject.clone());
        }
    }
    matches
}

fn term_matches(
    term: &crate::engine::config::RelatedTerm,
    subject: &str,
    name_tokens: &[String],
    cah_codes: &[String],
    config: &EngineConfig,
) -> bool {
    match term.match_type {
        MatchType::Category => cah_codes.iter().any(|code| code == &term.term),
        MatchType::Related | MatchType::Synonym => {
            if config.generic_terms.contains(&term.term) {
                let allowed = config
                    .generic_term_rules
                    .get(&term.term)
                    .is_some_and(|subjects| subjects.contains(subject));
                if !allowed {
                    return false;
                }
            }
            text::contains_tokens(name_tokens, &text::tokens(&term.term))
        }
    }
}

/// Whether the course sits in the student's preferred region.
///
/// `None` means one side is unknown and the preference scorer should stay
/// neutral.
pub fn region_matches(
    profile: &StudentProfile,
    course: &CourseRecord,
    config: &EngineConfig,
) -> Option<bool> {
    let preferred = profile.preferred_region.as_deref()?;
    let region = course.university_region.as_deref().map(text::normalize);
    let city = course.university_city.as_deref().map(text::normalize);
    if region.is_none() && city.is_none() {
        return None;
    }
    let region_hit = region.as_deref() == Some(preferred);
    let city_hit = city.is_some_and(|c| {
        config
            .region_cities
            .get(preferred)
            .is_some_and(|cities| cities.contains(&c))
    });
    Some(region_hit || city_hit)
}

pub trait Scorer: Send + Sync {
    fn weight_key(&self) -> WeightKey;
    fn score(&self, ctx: &ScoringContext<'_>) -> f64;
}

/// The standard five-scorer set.
pub struct ScorerSet {
    scorers: Vec<Box<dyn Scorer>>,
}

impl ScorerSet {
    pub fn standard() -> Self {
        Self {
            scorers: vec![
                Box::new(SubjectMatchScorer),
                Box::new(GradeMatchScorer),
                Box::new(PreferenceScorer),
                Box::new(RankingScorer),
                Box::new(EmployabilityScorer),
            ],
        }
    }

    /// Weighted composite base score plus the per-scorer breakdown.
    pub fn base_score(&self, ctx: &ScoringContext<'_>) -> (f64, ScoreBreakdown) {
        let mut breakdown = ScoreBreakdown::default();
        let mut total = 0.0;
        for scorer in &self.scorers {
            let value = scorer.score(ctx).clamp(0.0, 1.0);
            let key = scorer.weight_key();
            total += key.weight(&ctx.config.weights) * value;
            match key {
                WeightKey::SubjectMatch => breakdown.subject = value,
                WeightKey::GradeMatch => breakdown.grade = value,
                WeightKey::PreferenceMatch => breakdown.preference = value,
                WeightKey::Ranking => breakdown.ranking = value,
                WeightKey::Employability => breakdown.employability = value,
            }
        }
        (total, breakdown)
    }
}

/// Overlap between the student's subjects and what the course asks for.
pub struct SubjectMatchScorer;

impl Scorer for SubjectMatchScorer {
    fn weight_key(&self) -> WeightKey {
        WeightKey::SubjectMatch
    }

    fn score(&self, ctx: &ScoringContext<'_>) -> f64 {
        if ctx.required_subjects.is_empty() {
            // No requirements stated.
            return 0.5;
        }
        let required_ratio =
            ctx.matches.required.len() as f64 / ctx.required_subjects.len() as f64;
        let relevance_ratio = if ctx.profile.subjects.is_empty() {
            0.0
        } else {
            ctx.matches.matched.len() as f64 / ctx.profile.subjects.len() as f64
        };
        (0.6 * required_ratio + 0.4 * relevance_ratio).clamp(0.0, 1.0)
    }
}

/// How far the student's predicted grades fall from the required ones.
pub struct GradeMatchScorer;

impl Scorer for GradeMatchScorer {
    fn weight_key(&self) -> WeightKey {
        WeightKey::GradeMatch
    }

    fn score(&self, ctx: &ScoringContext<'_>) -> f64 {
        if ctx.requirements.is_empty() {
            return 0.5;
        }
        let total: f64 = ctx
            .requirements
            .iter()
            .map(|(subject, required)| {
                match ctx.profile.predicted_grades.get(subject) {
                    None => 0.0,
                    Some(predicted) => {
                        let delta = ctx.config.grade_value(*predicted)
                            - ctx.config.grade_value(*required);
                        match delta {
                            d if d >= 0 => 1.0,
                            -1 => 0.15,
                            -2 => 0.05,
                            _ => 0.01,
                        }
                    }
                }
            })
            .sum();
        total / ctx.requirements.len() as f64
    }
}

/// Region and budget fit, averaged.
pub struct PreferenceScorer;

impl PreferenceScorer {
    fn region_score(ctx: &ScoringContext<'_>) -> f64 {
        match region_matches(ctx.profile, ctx.course, ctx.config) {
            Some(true) => 1.0,
            Some(false) => 0.3,
            None => 0.5,
        }
    }

    fn budget_score(ctx: &ScoringContext<'_>) -> f64 {
        match (ctx.course.annual_fee, ctx.profile.max_budget) {
            (Some(fee), Some(budget)) => {
                let fee = fee as f64;
                let budget = budget as f64;
                if fee <= budget {
                    1.0
                } else if budget <= 0.0 || fee >= 2.0 * budget {
                    0.0
                } else {
                    // Linear from 1.0 at `budget` down to 0.0 at `2 * budget`.
                    1.0 - (fee - budget) / budget
                }
            }
            _ => 0.5,
        }
    }
}

impl Scorer for PreferenceScorer {
    fn weight_key(&self) -> WeightKey {
        WeightKey::PreferenceMatch
    }

    fn score(&self, ctx: &ScoringContext<'_>) -> f64 {
        (Self::region_score(ctx) + Self::budget_score(ctx)) / 2.0
    }
}

/// League-table position, normalized against the worst ranked university.
pub struct RankingScorer;

impl Scorer for RankingScorer {
    fn weight_key(&self) -> WeightKey {
        WeightKey::Ranking
    }

    fn score(&self, ctx: &ScoringContext<'_>) -> f64 {
        match (ctx.course.university_rank_overall, ctx.max_rank) {
            (Some(rank), Some(max_rank)) if max_rank >= 1 => {
                (1.0 - (rank - 1) as f64 / max_rank as f64).clamp(0.0, 1.0)
            }
            _ => 0.5,
        }
    }
}

/// Graduate employment rate, where published.
pub struct EmployabilityScorer;

impl Scorer for EmployabilityScorer {
    fn weight_key(&self) -> WeightKey {
        WeightKey::Employability
    }

    fn score(&self, ctx: &ScoringContext<'_>) -> f64 {
        match ctx.course.employment_rate {
            Some(rate) => (rate / 100.0).clamp(0.0, 1.0),
            None => 0.5,
        }
    }
}
