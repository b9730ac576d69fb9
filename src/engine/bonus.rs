//! Career-interest conflict filtering and the bonus adjustments applied on
//! top of the weighted base score.

use crate::data::course_types::Grade;
use crate::engine::config::EngineConfig;
use crate::engine::scorers::ScoringContext;
use crate::engine::text;
use crate::engine::types::{InterestTag, StudentProfile};

pub const CAREER_KEYWORD_BONUS: f64 = 0.4;
pub const HIGHEST_GRADE_BONUS: f64 = 0.25;
const DIVERSITY_STEP: f64 = 0.05;
const DIVERSITY_CAP: f64 = 0.15;

/// A conflict keyword that disqualified a course.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictHit {
    pub interest: String,
    pub keyword: String,
}

/// First conflict between a declared interest and the course name, if any.
///
/// Keywords match whole tokens only, after the interest's configured
/// exception phrases have been masked out of the name.
pub fn find_conflict(
    tags: &[InterestTag],
    name_tokens: &[String],
    config: &EngineConfig,
) -> Option<ConflictHit> {
    for tag in tags {
        let Some(conflicts) = config.career_conflicts.get(&tag.key) else {
            continue;
        };
        let exceptions: Vec<Vec<String>> = config
            .conflict_exceptions
            .get(&tag.key)
            .map(|phrases| phrases.iter().map(|p| text::tokens(p)).collect())
            .unwrap_or_default();
        let masked;
        let tokens: &[String] = if exceptions.is_empty() {
            name_tokens
        } else {
            masked = text::mask_phrases(name_tokens, &exceptions);
            &masked[..]
        };
        for keyword in conflicts {
            if text::contains_tokens(tokens, &text::tokens(keyword)) {
                return Some(ConflictHit {
                    interest: tag.label.clone(),
                    keyword: keyword.clone(),
                });
            }
        }
    }
    None
}

/// First positive career keyword appearing in the course name.
fn career_keyword_match(
    tags: &[InterestTag],
    name_tokens: &[String],
    config: &EngineConfig,
) -> Option<(String, String)> {
    for tag in tags {
        let Some(keywords) = config.career_keywords.get(&tag.key) else {
            continue;
        };
        for keyword in keywords {
            if text::contains_tokens(name_tokens, &text::tokens(keyword)) {
                return Some((tag.label.clone(), keyword.clone()));
            }
        }
    }
    None
}

/// The subject the student is predicted to do best in. Value ties break on
/// subject name so the choice is deterministic.
pub fn highest_graded_subject(profile: &StudentProfile, config: &EngineConfig) -> Option<String> {
    profile
        .predicted_grades
        .iter()
        .max_by_key(|(subject, grade)| {
            (config.grade_value(**grade), std::cmp::Reverse(subject.as_str()))
        })
        .map(|(subject, _)| subject.clone())
}

/// Bonuses applied to one candidate, with the facts the reason builder needs.
#[derive(Debug, Clone, Default)]
pub struct BonusOutcome {
    pub total: f64,
    /// (interest label, matched keyword) behind the career bonus.
    pub career: Option<(String, String)>,
    /// Top-graded subject that triggered the highest-grade bonus.
    pub highest_grade: Option<String>,
    pub diversity: f64,
}

/// Apply the bonus ladder: career keyword, highest grade, diversity.
/// The final clamp to [0, 1] happens after the feedback adjustment.
pub fn apply_bonuses(ctx: &ScoringContext<'_>, tags: &[InterestTag]) -> BonusOutcome {
    let mut outcome = BonusOutcome::default();

    outcome.career = career_keyword_match(tags, ctx.name_tokens, ctx.config);
    if outcome.career.is_some() {
        outcome.total += CAREER_KEYWORD_BONUS;
    }

    // The highest-grade bonus only stands in for absent career interests.
    if tags.is_empty() {
        outcome.highest_grade = highest_graded_subject(ctx.profile, ctx.config)
            .filter(|top| ctx.matches.matched.contains(top));
        if outcome.highest_grade.is_some() {
            outcome.total += HIGHEST_GRADE_BONUS;
        }
    }

    let m = ctx.matches.matched.len();
    if m >= 2 {
        outcome.diversity = ((m - 1) as f64 * DIVERSITY_STEP).min(DIVERSITY_CAP);
        outcome.total += outcome.diversity;
    }

    outcome
}

/// True iff the student holds every required subject at (or above) the
/// required grade. Vacuously true for courses without requirements.
pub fn meets_requirements(
    profile: &StudentProfile,
    requirements: &[(String, Grade)],
    config: &EngineConfig,
) -> bool {
    requirements.iter().all(|(subject, required)| {
        profile.subjects.contains(subject)
            && profile
                .predicted_grades
                .get(subject)
                .is_some_and(|predicted| {
                    config.grade_value(*predicted) >= config.grade_value(*required)
                })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testutil::{self, CoursePatch};

    fn tags(interests: &[&str]) -> Vec<InterestTag> {
        interests
            .iter()
            .map(|label| InterestTag {
                key: text::normalize(label),
                label: (*label).to_owned(),
            })
            .collect()
    }

    #[test]
    fn test_conflict_keyword_drops_course() {
        let config = testutil::config();
        let tags = tags(&["Business & Finance"]);
        let hit = find_conflict(&tags, &text::tokens("BSc Computer Science"), &config);
        assert!(hit.is_some());
        let hit = hit.unwrap();
        assert_eq!(hit.interest, "Business & Finance");
    }

    #[test]
    fn test_conflict_requires_whole_token() {
        let config = testutil::config();
        let tags = tags(&["Business & Finance"]);
        // "sciences" is not the token "science"
        assert!(find_conflict(&tags, &text::tokens("BA Business Sciences Studies"), &config).is_none());
    }

    #[test]
    fn test_conflict_exception_phrase_is_exempt() {
        let config = testutil::config();
        let tags = tags(&["Business & Finance"]);
        // "management science" is configured as an exempt phrase
        assert!(find_conflict(&tags, &text::tokens("BSc Management Science"), &config).is_none());
        // but a bare "science" token elsewhere still conflicts
        assert!(
            find_conflict(
                &tags,
                &text::tokens("BSc Management Science with Data Science"),
                &config
            )
            .is_some()
        );
    }

    #[test]
    fn test_career_bonus_applied() {
        let config = testutil::config();
        let profile = testutil::profile(&["economics"], &[]).normalized();
        let course = testutil::course(1, "BA Economics and Finance", CoursePatch::default());
        let pieces = testutil::pieces(&config, &profile, &course);
        let ctx = pieces.ctx(&config, &profile, &course, None);
        let outcome = apply_bonuses(&ctx, &tags(&["Business & Finance"]));
        assert!(outcome.career.is_some());
        assert!((outcome.total - CAREER_KEYWORD_BONUS).abs() < 1e-9);
    }

    #[test]
    fn test_highest_grade_bonus_only_without_interests() {
        let config = testutil::config();
        let profile = testutil::profile(
            &["mathematics", "english literature", "history"],
            &[
                ("mathematics", Grade::B),
                ("english literature", Grade::AStar),
                ("history", Grade::A),
            ],
        )
        .normalized();
        let course = testutil::course(
            1,
            "BA English Literature",
            CoursePatch {
                requirements: vec![("english literature", "B")],
                ..Default::default()
            },
        );
        let pieces = testutil::pieces(&config, &profile, &course);
        let ctx = pieces.ctx(&config, &profile, &course, None);

        let outcome = apply_bonuses(&ctx, &[]);
        assert_eq!(outcome.highest_grade.as_deref(), Some("english literature"));
        assert!((outcome.total - HIGHEST_GRADE_BONUS).abs() < 1e-9);

        // Declaring an interest suppresses the bonus entirely.
        let outcome = apply_bonuses(&ctx, &tags(&["Healthcare"]));
        assert_eq!(outcome.highest_grade, None);
        assert_eq!(outcome.total, 0.0);
    }

    #[test]
    fn test_highest_grade_tie_breaks_on_subject_name() {
        let config = testutil::config();
        let profile = testutil::profile(
            &["physics", "chemistry"],
            &[("physics", Grade::A), ("chemistry", Grade::A)],
        )
        .normalized();
        assert_eq!(
            highest_graded_subject(&profile, &config).as_deref(),
            Some("chemistry")
        );
    }

    #[test]
    fn test_diversity_bonus_scales_and_caps() {
        let config = testutil::config();
        let profile = testutil::profile(
            &["mathematics", "physics", "chemistry", "biology", "economics"],
            &[],
        )
        .normalized();
        // Name matches every science subject plus maths via related terms.
        let course = testutil::course(
            1,
            "BSc Natural Science with Mathematical Statistics",
            CoursePatch {
                cah_codes: vec!["cah15-02"],
                ..Default::default()
            },
        );
        let pieces = testutil::pieces(&config, &profile, &course);
        let ctx = pieces.ctx(&config, &profile, &course, None);
        let outcome = apply_bonuses(&ctx, &tags(&["Healthcare"]));
        assert_eq!(pieces.matches.matched.len(), 5);
        // (5 - 1) * 0.05 caps at 0.15
        assert!((outcome.diversity - 0.15).abs() < 1e-9);
    }

    #[test]
    fn test_meets_requirements() {
        let config = testutil::config();
        let profile = testutil::profile(
            &["mathematics", "physics"],
            &[("mathematics", Grade::AStar), ("physics", Grade::B)],
        )
        .normalized();

        let met = vec![
            ("mathematics".to_owned(), Grade::A),
            ("physics".to_owned(), Grade::B),
        ];
        assert!(meets_requirements(&profile, &met, &config));

        let short = vec![("physics".to_owned(), Grade::A)];
        assert!(!meets_requirements(&profile, &short, &config));

        let missing = vec![("chemistry".to_owned(), Grade::C)];
        assert!(!meets_requirements(&profile, &missing, &config));

        assert!(meets_requirements(&profile, &[], &config));
    }
}
