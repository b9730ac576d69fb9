//! Course recommendation engine.
//!
//! Per-request pipeline: INIT -> FILTER -> SCORE -> BONUS -> FEEDBACK ->
//! SELECT -> EXPLAIN -> DONE. The pipeline itself is pure; only the
//! orchestrator in this module touches the store (via `data::`), and a
//! cancellation token is checked between phases. Per-course anomalies are
//! logged and skipped; only configuration and catalogue failures abort.

pub mod bonus;
pub mod config;
pub mod feedback;
pub mod reasons;
pub mod scorers;
pub mod text;
pub mod topk;
pub mod types;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use indexmap::IndexSet;
use sqlx::PgPool;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::data;
use crate::data::course_types::{CourseRecord, Grade};
use crate::data::courses::CatalogueFilters;
use crate::engine::bonus::BonusOutcome;
use crate::engine::config::EngineConfig;
use crate::engine::scorers::{ScorerSet, ScoringContext, SubjectMatches};
use crate::engine::topk::TopK;
use crate::engine::types::{
    CourseSummary, FeedbackKind, Recommendation, RecommendationList, RecommendOptions,
    ScoreBreakdown, StudentProfile,
};
use crate::utils::fmt_duration;

/// Heap capacity for Top-K selection. Responses are truncated to
/// `options.limit` afterwards.
const SELECT_CAPACITY: usize = 100;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Fatal at startup; a background refresh that hits this keeps the
    /// previous configuration snapshot instead.
    #[error("invalid configuration in {key}: {reason}")]
    ConfigurationInvalid { key: String, reason: String },
    /// Request-fatal; no partial result is returned.
    #[error("catalogue unavailable: {0}")]
    CatalogueUnavailable(anyhow::Error),
    /// Feedback submission referenced a course the catalogue doesn't know.
    #[error("unknown course {0}")]
    UnknownCourse(i32),
    #[error("request cancelled")]
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Init,
    Filter,
    Score,
    Bonus,
    Feedback,
    Select,
    Explain,
    Done,
}

fn checkpoint(cancel: &CancellationToken, phase: Phase) -> Result<(), EngineError> {
    if cancel.is_cancelled() {
        debug!(?phase, "request cancelled, discarding partial results");
        return Err(EngineError::Cancelled);
    }
    trace!(?phase, "entering phase");
    Ok(())
}

/// Inputs to the pure ranking pipeline.
pub struct RankRequest<'a> {
    pub profile: &'a StudentProfile,
    pub courses: &'a [CourseRecord],
    /// Raw per-course feedback adjustments (see `engine::feedback`).
    pub adjustments: &'a HashMap<i32, f64>,
    /// Worst rank among ranked universities.
    pub max_rank: Option<i32>,
    pub options: RecommendOptions,
}

/// Per-candidate working state, filled in phase by phase.
struct Candidate<'a> {
    course: &'a CourseRecord,
    requirements: Vec<(String, Grade)>,
    required_subjects: IndexSet<String>,
    name_tokens: Vec<String>,
    cah_codes: Vec<String>,
    matches: SubjectMatches,
    breakdown: ScoreBreakdown,
    base: f64,
    bonuses: BonusOutcome,
    meets: bool,
    adjustment: f64,
    applied_feedback: f64,
    final_score: f64,
}

impl<'a> Candidate<'a> {
    fn context<'s>(
        &'s self,
        config: &'s EngineConfig,
        profile: &'s StudentProfile,
        max_rank: Option<i32>,
    ) -> ScoringContext<'s> {
        ScoringContext {
            config,
            profile,
            course: self.course,
            requirements: &self.requirements,
            required_subjects: &self.required_subjects,
            name_tokens: &self.name_tokens,
            matches: &self.matches,
            max_rank,
        }
    }
}

fn parse_requirements(course: &CourseRecord) -> Result<Vec<(String, Grade)>, String> {
    course
        .required_subjects
        .iter()
        .map(|entry| {
            let grade = Grade::parse(&entry.grade).ok_or_else(|| {
                format!(
                    "unknown required grade '{}' for subject '{}'",
                    entry.grade, entry.subject
                )
            })?;
            Ok((text::normalize(&entry.subject), grade))
        })
        .collect()
}

/// Rank candidate courses for a student. Pure and deterministic: identical
/// inputs (and catalogue order) produce byte-identical output.
pub fn rank(
    config: &EngineConfig,
    request: &RankRequest<'_>,
    cancel: &CancellationToken,
) -> Result<Vec<Recommendation>, EngineError> {
    checkpoint(cancel, Phase::Init)?;
    let profile = request.profile.normalized();
    let tags = profile.interest_tags();
    let scorer_set = ScorerSet::standard();
    let options = request.options;

    // FILTER: conflict rejection and per-course preparation.
    checkpoint(cancel, Phase::Filter)?;
    let mut seen = HashSet::new();
    let mut candidates: Vec<Candidate<'_>> = Vec::new();
    for course in request.courses {
        if !seen.insert(course.course_id) {
            warn!(course_id = course.course_id, "duplicate course in catalogue stream, skipping");
            continue;
        }
        let requirements = match parse_requirements(course) {
            Ok(requirements) => requirements,
            Err(reason) => {
                warn!(course_id = course.course_id, %reason, "skipping unscorable course");
                continue;
            }
        };
        let name_tokens = text::tokens(&course.name);
        if let Some(hit) = bonus::find_conflict(&tags, &name_tokens, config) {
            debug!(
                course_id = course.course_id,
                interest = %hit.interest,
                keyword = %hit.keyword,
                "conflict filter rejected course"
            );
            continue;
        }
        let required_subjects: IndexSet<String> =
            requirements.iter().map(|(subject, _)| subject.clone()).collect();
        let cah_codes: Vec<String> = course
            .cah_codes
            .iter()
            .map(|code| code.trim().to_lowercase())
            .collect();
        candidates.push(Candidate {
            course,
            requirements,
            required_subjects,
            name_tokens,
            cah_codes,
            matches: SubjectMatches::default(),
            breakdown: ScoreBreakdown::default(),
            base: 0.0,
            bonuses: BonusOutcome::default(),
            meets: false,
            adjustment: 0.0,
            applied_feedback: 0.0,
            final_score: 0.0,
        });
    }

    // SCORE: weighted composite of the scorer set.
    checkpoint(cancel, Phase::Score)?;
    for candidate in &mut candidates {
        candidate.matches = scorers::compute_subject_matches(
            &profile,
            &candidate.required_subjects,
            &candidate.name_tokens,
            &candidate.cah_codes,
            config,
        );
        let (base, breakdown) = {
            let ctx = candidate.context(config, &profile, request.max_rank);
            scorer_set.base_score(&ctx)
        };
        candidate.base = base;
        candidate.breakdown = breakdown;
    }

    // BONUS: career keyword, highest grade, diversity.
    checkpoint(cancel, Phase::Bonus)?;
    for candidate in &mut candidates {
        let outcome = {
            let ctx = candidate.context(config, &profile, request.max_rank);
            bonus::apply_bonuses(&ctx, &tags)
        };
        candidate.bonuses = outcome;
        candidate.meets = bonus::meets_requirements(&profile, &candidate.requirements, config);
    }

    // FEEDBACK: weighted adjustment, then the final clamp.
    checkpoint(cancel, Phase::Feedback)?;
    for candidate in &mut candidates {
        candidate.adjustment = request
            .adjustments
            .get(&candidate.course.course_id)
            .copied()
            .unwrap_or(0.0);
        candidate.applied_feedback = config.feedback.feedback_weight * candidate.adjustment;
        candidate.final_score =
            (candidate.base + candidate.bonuses.total + candidate.applied_feedback).clamp(0.0, 1.0);
    }

    // SELECT: bounded min-heap over one pass of the survivors.
    checkpoint(cancel, Phase::Select)?;
    let limit = options.limit.clamp(1, SELECT_CAPACITY);
    let mut topk = TopK::new(SELECT_CAPACITY);
    for (index, candidate) in candidates.iter().enumerate() {
        topk.offer(candidate.final_score, index);
    }
    debug!(considered = candidates.len(), kept = topk.len(), "top-k selection complete");
    let selected = topk.into_sorted();

    // EXPLAIN: reasons and (on the advanced path) the score breakdown.
    checkpoint(cancel, Phase::Explain)?;
    let mut recommendations = Vec::with_capacity(limit.min(selected.len()));
    for (score, index) in selected.into_iter().take(limit) {
        let candidate = &candidates[index];
        let reasons = if options.include_reasons {
            let ctx = candidate.context(config, &profile, request.max_rank);
            reasons::build_reasons(&ctx, &candidate.bonuses, candidate.adjustment)
        } else {
            Vec::new()
        };
        let score_breakdown = options.advanced.then(|| {
            let mut breakdown = candidate.breakdown;
            breakdown.bonuses = candidate.bonuses.total;
            breakdown.feedback = candidate.applied_feedback;
            breakdown
        });
        recommendations.push(Recommendation {
            course: CourseSummary::from(candidate.course),
            match_score: score,
            meets_requirements: candidate.meets,
            reasons,
            score_breakdown,
        });
    }

    trace!(phase = ?Phase::Done, returned = recommendations.len(), "pipeline complete");
    Ok(recommendations)
}

/// Engine entry point: fetch candidates and feedback, rank, explain.
///
/// Catalogue failures abort the request; feedback failures degrade to a
/// zero adjustment and attach a `feedback_unavailable` warning.
pub async fn recommend(
    pool: &PgPool,
    config: Arc<EngineConfig>,
    profile: &StudentProfile,
    options: RecommendOptions,
    cancel: &CancellationToken,
) -> Result<RecommendationList, EngineError> {
    let started = Instant::now();
    let snapshot = data::courses::fetch_catalogue(pool, &CatalogueFilters::default())
        .await
        .map_err(EngineError::CatalogueUnavailable)?;

    let now = Utc::now();
    let normalized = profile.normalized();
    let course_ids: Vec<i32> = snapshot.courses.iter().map(|c| c.course_id).collect();

    let mut warnings = Vec::new();
    let adjustments =
        match fetch_adjustments(pool, &normalized, &course_ids, now, &config.feedback).await {
            Ok(adjustments) => adjustments,
            Err(error) => {
                warn!(error = ?error, "feedback store unavailable, scoring without adjustments");
                warnings.push("feedback_unavailable".to_owned());
                HashMap::new()
            }
        };

    let request = RankRequest {
        profile,
        courses: &snapshot.courses,
        adjustments: &adjustments,
        max_rank: snapshot.max_rank,
        options,
    };
    let recommendations = rank(&config, &request, cancel)?;

    info!(
        user_id = profile.user_id,
        candidates = snapshot.courses.len(),
        returned = recommendations.len(),
        elapsed = fmt_duration(started.elapsed()),
        "recommendations generated"
    );

    Ok(RecommendationList {
        recommendations,
        warnings,
        generated_at: now,
    })
}

async fn fetch_adjustments(
    pool: &PgPool,
    profile: &StudentProfile,
    course_ids: &[i32],
    now: chrono::DateTime<Utc>,
    settings: &config::FeedbackSettings,
) -> anyhow::Result<HashMap<i32, f64>> {
    let since = now - chrono::Duration::days(settings.decay_days.ceil() as i64);
    let subjects: Vec<String> = profile.subjects.iter().cloned().collect();
    let interests: Vec<String> = profile.interest_tags().into_iter().map(|t| t.key).collect();
    let (own, peer) = tokio::try_join!(
        data::feedback::fetch_own_feedback(pool, profile.user_id, course_ids, since),
        data::feedback::fetch_peer_feedback(
            pool,
            profile.user_id,
            course_ids,
            &subjects,
            &interests,
            since
        ),
    )?;
    Ok(feedback::course_adjustments(&own, &peer, now, settings))
}

/// Record one append-only feedback entry. Notes are truncated to 500 chars.
pub async fn submit_feedback(
    pool: &PgPool,
    user_id: i64,
    course_id: i32,
    kind: FeedbackKind,
    notes: Option<&str>,
) -> Result<(), EngineError> {
    if !data::feedback::course_exists(pool, course_id)
        .await
        .map_err(EngineError::CatalogueUnavailable)?
    {
        return Err(EngineError::UnknownCourse(course_id));
    }
    let notes = notes.map(feedback::truncate_notes);
    data::feedback::insert_feedback(pool, user_id, course_id, kind, notes.as_deref())
        .await
        .map_err(EngineError::CatalogueUnavailable)?;
    info!(user_id, course_id, kind = kind.as_str(), "feedback recorded");
    Ok(())
}

#[cfg(test)]
pub(crate) mod testutil {
    use std::collections::{HashMap, HashSet};

    use super::config::{
        EngineConfig, FeedbackSettings, MatchType, ReasonSettings, RelatedTerm, ScoringWeights,
    };
    use super::scorers::{self, ScoringContext, SubjectMatches};
    use crate::data::course_types::{CourseRecord, Grade, RequirementEntry};
    use crate::engine::text;
    use crate::engine::types::StudentProfile;
    use indexmap::IndexSet;

    fn related(subject: &str, terms: &[(&str, MatchType)]) -> (String, Vec<RelatedTerm>) {
        (
            subject.to_owned(),
            terms
                .iter()
                .map(|(term, match_type)| RelatedTerm {
                    term: (*term).to_owned(),
                    match_type: *match_type,
                })
                .collect(),
        )
    }

    /// Fixture mirroring the seeded configuration tables.
    pub fn config() -> EngineConfig {
        use MatchType::*;
        let related_terms: HashMap<String, Vec<RelatedTerm>> = [
            related(
                "mathematics",
                &[
                    ("maths", Synonym),
                    ("mathematical", Related),
                    ("statistics", Related),
                    ("cah09-01", Category),
                ],
            ),
            related("physics", &[("science", Related), ("physical", Related)]),
            related("chemistry", &[("science", Related), ("chemical", Related)]),
            related("biology", &[("science", Related), ("biological", Related)]),
            related(
                "economics",
                &[("economic", Related), ("finance", Related), ("cah15-02", Category)],
            ),
            related("business studies", &[("business", Related), ("management", Related)]),
            related(
                "english literature",
                &[("english", Related), ("literature", Synonym)],
            ),
            related("history", &[("historical", Related)]),
        ]
        .into_iter()
        .collect();

        let generic_terms: HashSet<String> = ["science", "english"]
            .into_iter()
            .map(str::to_owned)
            .collect();
        let generic_term_rules: HashMap<String, HashSet<String>> = [
            (
                "science".to_owned(),
                ["physics", "chemistry", "biology"]
                    .into_iter()
                    .map(str::to_owned)
                    .collect(),
            ),
            (
                "english".to_owned(),
                ["english literature"].into_iter().map(str::to_owned).collect(),
            ),
        ]
        .into_iter()
        .collect();

        let region_cities: HashMap<String, HashSet<String>> = [
            (
                "north west".to_owned(),
                ["manchester", "liverpool"].into_iter().map(str::to_owned).collect(),
            ),
            (
                "london".to_owned(),
                ["london"].into_iter().map(str::to_owned).collect(),
            ),
        ]
        .into_iter()
        .collect();

        let list = |items: &[&str]| items.iter().map(|s| (*s).to_owned()).collect::<Vec<_>>();
        let career_keywords: HashMap<String, Vec<String>> = [
            (
                "business finance".to_owned(),
                list(&["business", "finance", "accounting", "economics", "management"]),
            ),
            ("healthcare".to_owned(), list(&["medicine", "nursing"])),
        ]
        .into_iter()
        .collect();
        let career_conflicts: HashMap<String, Vec<String>> = [
            (
                "business finance".to_owned(),
                list(&["science", "computer", "engineering"]),
            ),
            ("healthcare".to_owned(), list(&["accounting", "marketing"])),
        ]
        .into_iter()
        .collect();
        let conflict_exceptions: HashMap<String, Vec<String>> = [(
            "business finance".to_owned(),
            list(&["management science", "actuarial science", "business studies"]),
        )]
        .into_iter()
        .collect();

        EngineConfig {
            grade_values: [
                (Grade::AStar, 8),
                (Grade::A, 7),
                (Grade::B, 6),
                (Grade::C, 5),
                (Grade::D, 4),
                (Grade::E, 3),
                (Grade::U, 0),
            ]
            .into_iter()
            .collect(),
            weights: ScoringWeights {
                subject_match: 0.35,
                grade_match: 0.25,
                preference_match: 0.15,
                ranking: 0.15,
                employability: 0.10,
            },
            related_terms,
            generic_terms,
            generic_term_rules,
            region_cities,
            career_keywords,
            career_conflicts,
            conflict_exceptions,
            feedback: FeedbackSettings {
                feedback_weight: 0.5,
                decay_days: 90.0,
                min_count: 1,
                own_weight: 0.6,
                peer_weight: 0.4,
                positive_boost: 0.2,
                negative_penalty: 0.3,
            },
            reasons: ReasonSettings {
                top_rank_threshold: 10,
                high_employment_threshold: 85.0,
            },
        }
    }

    pub fn profile(subjects: &[&str], grades: &[(&str, Grade)]) -> StudentProfile {
        StudentProfile {
            user_id: 1,
            subjects: subjects.iter().map(|s| (*s).to_owned()).collect(),
            predicted_grades: grades
                .iter()
                .map(|(subject, grade)| ((*subject).to_owned(), *grade))
                .collect(),
            career_interests: IndexSet::new(),
            preferred_region: None,
            max_budget: None,
        }
    }

    /// Optional fields for [`course`]; everything defaults to absent.
    #[derive(Default)]
    pub struct CoursePatch {
        pub requirements: Vec<(&'static str, &'static str)>,
        pub cah_codes: Vec<&'static str>,
        pub annual_fee: Option<i32>,
        pub region: Option<&'static str>,
        pub city: Option<&'static str>,
        pub rank: Option<i32>,
        pub employment_rate: Option<f64>,
    }

    pub fn course(id: i32, name: &str, patch: CoursePatch) -> CourseRecord {
        CourseRecord {
            course_id: id,
            university_id: 100 + id,
            name: name.to_owned(),
            university_name: format!("University {id}"),
            required_subjects: patch
                .requirements
                .iter()
                .map(|(subject, grade)| RequirementEntry {
                    subject: (*subject).to_owned(),
                    grade: (*grade).to_owned(),
                })
                .collect(),
            cah_codes: patch.cah_codes.iter().map(|c| (*c).to_owned()).collect(),
            annual_fee: patch.annual_fee,
            university_region: patch.region.map(str::to_owned),
            university_city: patch.city.map(str::to_owned),
            university_rank_overall: patch.rank,
            employment_rate: patch.employment_rate,
            median_salary: None,
            average_entry_tariff: None,
            professional_destination_rate: None,
        }
    }

    /// Owned context pieces, so scorer tests can borrow a [`ScoringContext`]
    /// without re-running the pipeline.
    pub struct CtxPieces {
        pub requirements: Vec<(String, Grade)>,
        pub required_subjects: IndexSet<String>,
        pub name_tokens: Vec<String>,
        pub cah_codes: Vec<String>,
        pub matches: SubjectMatches,
    }

    impl CtxPieces {
        pub fn ctx<'a>(
            &'a self,
            config: &'a EngineConfig,
            profile: &'a StudentProfile,
            course: &'a CourseRecord,
            max_rank: Option<i32>,
        ) -> ScoringContext<'a> {
            ScoringContext {
                config,
                profile,
                course,
                requirements: &self.requirements,
                required_subjects: &self.required_subjects,
                name_tokens: &self.name_tokens,
                matches: &self.matches,
                max_rank,
            }
        }
    }

    pub fn pieces(
        config: &EngineConfig,
        profile: &StudentProfile,
        course: &CourseRecord,
    ) -> CtxPieces {
        let requirements =
            super::parse_requirements(course).expect("test course requirements must parse");
        let required_subjects: IndexSet<String> =
            requirements.iter().map(|(subject, _)| subject.clone()).collect();
        let name_tokens = text::tokens(&course.name);
        let cah_codes: Vec<String> =
            course.cah_codes.iter().map(|c| c.trim().to_lowercase()).collect();
        let matches = scorers::compute_subject_matches(
            profile,
            &required_subjects,
            &name_tokens,
            &cah_codes,
            config,
        );
        CtxPieces {
            requirements,
            required_subjects,
            name_tokens,
            cah_codes,
            matches,
        }
    }
}
