//! Human-readable explanations attached to each recommendation.
//!
//! Reasons are descriptive only; they never surface weights or internal
//! score arithmetic.

use crate::engine::bonus::BonusOutcome;
use crate::engine::scorers::{self, ScoringContext};
use crate::engine::text;

/// Build the reason list for one surviving course.
///
/// `adjustment` is the raw feedback adjustment (pre-weighting); any non-zero
/// value earns a feedback reason.
pub fn build_reasons(
    ctx: &ScoringContext<'_>,
    bonus: &BonusOutcome,
    adjustment: f64,
) -> Vec<String> {
    let config = ctx.config;
    let mut reasons = Vec::new();

    if !ctx.matches.matched.is_empty() {
        let subjects: Vec<String> = ctx
            .matches
            .matched
            .iter()
            .map(|s| text::title_case(s))
            .collect();
        reasons.push(format!(
            "Matches your A-level subjects: {}",
            subjects.join(", ")
        ));
    }

    for (subject, required) in ctx.requirements {
        let met = ctx
            .profile
            .predicted_grades
            .get(subject)
            .is_some_and(|predicted| {
                config.grade_value(*predicted) >= config.grade_value(*required)
            });
        if met {
            reasons.push(format!("Meets {}: {}", text::title_case(subject), required));
        }
    }

    if let Some((interest, _)) = &bonus.career {
        reasons.push(format!("Matches your interest in {interest}"));
    }

    if scorers::region_matches(ctx.profile, ctx.course, config) == Some(true)
        && let Some(region) = ctx.profile.preferred_region.as_deref()
    {
        reasons.push(format!("In your preferred region ({})", text::title_case(region)));
    }

    if let Some(rank) = ctx.course.university_rank_overall
        && rank <= config.reasons.top_rank_threshold
    {
        reasons.push(format!(
            "{} is ranked #{rank} nationally",
            ctx.course.university_name
        ));
    }

    if let Some(rate) = ctx.course.employment_rate
        && rate >= config.reasons.high_employment_threshold
    {
        reasons.push(format!("High graduate employment rate ({rate:.0}%)"));
    }

    if adjustment > 0.0 {
        reasons.push("Rated highly by you or students with similar subjects".to_owned());
    } else if adjustment < 0.0 {
        reasons.push("Rated poorly by you or students with similar subjects".to_owned());
    }

    reasons
}
