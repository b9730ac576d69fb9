//! Configuration store: loads the engine tables into an [`EngineConfig`]
//! snapshot. Loaded once at startup (load or validation failure is fatal)
//! and refreshed periodically by `AppState`.

use anyhow::{Context, Result, bail};
use sqlx::PgPool;
use std::collections::{HashMap, HashSet};

use crate::data::course_types::Grade;
use crate::engine::config::{
    EngineConfig, FeedbackSettings, MatchType, ReasonSettings, RelatedTerm, ScoringWeights,
};
use crate::engine::text;

#[derive(sqlx::FromRow)]
struct FeedbackSettingRow {
    feedback_weight: f64,
    feedback_decay_days: f64,
    min_feedback_count: i32,
    own_weight: f64,
    peer_weight: f64,
    positive_boost: f64,
    negative_penalty: f64,
}

#[derive(sqlx::FromRow)]
struct ReasonSettingRow {
    top_rank_threshold: i32,
    high_employment_threshold: f64,
}

/// Load every configuration table. The caller decides whether a failure is
/// fatal (startup) or keeps the previous snapshot (refresh).
pub async fn load_engine_config(pool: &PgPool) -> Result<EngineConfig> {
    let grade_rows: Vec<(String, i32)> =
        sqlx::query_as("SELECT letter, value FROM grade_value ORDER BY letter")
            .fetch_all(pool)
            .await
            .context("failed to load grade_value")?;
    let mut grade_values = HashMap::new();
    for (letter, value) in grade_rows {
        let Some(grade) = Grade::parse(&letter) else {
            bail!("grade_value: unknown grade letter '{letter}'");
        };
        grade_values.insert(grade, value);
    }

    let weight_rows: Vec<(String, f64)> =
        sqlx::query_as("SELECT key, weight FROM recommendation_weight ORDER BY key")
            .fetch_all(pool)
            .await
            .context("failed to load recommendation_weight")?;
    let mut subject_match = None;
    let mut grade_match = None;
    let mut preference_match = None;
    let mut ranking = None;
    let mut employability = None;
    for (key, weight) in weight_rows {
        match key.as_str() {
            "subject_match" => subject_match = Some(weight),
            "grade_match" => grade_match = Some(weight),
            "preference_match" => preference_match = Some(weight),
            "ranking" => ranking = Some(weight),
            "employability" => employability = Some(weight),
            _ => bail!("recommendation_weight: unknown key '{key}'"),
        }
    }
    let weights = ScoringWeights {
        subject_match: subject_match.context("recommendation_weight: missing key 'subject_match'")?,
        grade_match: grade_match.context("recommendation_weight: missing key 'grade_match'")?,
        preference_match: preference_match
            .context("recommendation_weight: missing key 'preference_match'")?,
        ranking: ranking.context("recommendation_weight: missing key 'ranking'")?,
        employability: employability
            .context("recommendation_weight: missing key 'employability'")?,
    };

    let term_rows: Vec<(String, String, String)> = sqlx::query_as(
        "SELECT subject, term, match_type FROM subject_related_term ORDER BY subject, term",
    )
    .fetch_all(pool)
    .await
    .context("failed to load subject_related_term")?;
    let mut related_terms: HashMap<String, Vec<RelatedTerm>> = HashMap::new();
    for (subject, term, match_type) in term_rows {
        let Some(match_type) = MatchType::parse(&match_type) else {
            bail!("subject_related_term: unknown match_type '{match_type}' for '{subject}'");
        };
        related_terms
            .entry(text::normalize(&subject))
            .or_default()
            .push(RelatedTerm {
                term: term.trim().to_lowercase(),
                match_type,
            });
    }

    let generic_rows: Vec<(String,)> = sqlx::query_as("SELECT term FROM generic_term")
        .fetch_all(pool)
        .await
        .context("failed to load generic_term")?;
    let generic_terms: HashSet<String> = generic_rows
        .into_iter()
        .map(|(term,)| term.trim().to_lowercase())
        .collect();

    let rule_rows: Vec<(String, String)> =
        sqlx::query_as("SELECT term, subject FROM generic_term_rule")
            .fetch_all(pool)
            .await
            .context("failed to load generic_term_rule")?;
    let mut generic_term_rules: HashMap<String, HashSet<String>> = HashMap::new();
    for (term, subject) in rule_rows {
        generic_term_rules
            .entry(term.trim().to_lowercase())
            .or_default()
            .insert(text::normalize(&subject));
    }

    let region_rows: Vec<(String, String)> =
        sqlx::query_as("SELECT region, city FROM region_mapping")
            .fetch_all(pool)
            .await
            .context("failed to load region_mapping")?;
    let mut region_cities: HashMap<String, HashSet<String>> = HashMap::new();
    for (region, city) in region_rows {
        region_cities
            .entry(text::normalize(&region))
            .or_default()
            .insert(text::normalize(&city));
    }

    let keyword_rows: Vec<(String, String)> = sqlx::query_as(
        "SELECT interest, keyword FROM career_interest_keyword ORDER BY interest, keyword",
    )
    .fetch_all(pool)
    .await
    .context("failed to load career_interest_keyword")?;
    let mut career_keywords: HashMap<String, Vec<String>> = HashMap::new();
    for (interest, keyword) in keyword_rows {
        career_keywords
            .entry(text::normalize(&interest))
            .or_default()
            .push(keyword.trim().to_lowercase());
    }

    let conflict_rows: Vec<(String, String)> = sqlx::query_as(
        "SELECT interest, keyword FROM career_interest_conflict ORDER BY interest, keyword",
    )
    .fetch_all(pool)
    .await
    .context("failed to load career_interest_conflict")?;
    let mut career_conflicts: HashMap<String, Vec<String>> = HashMap::new();
    for (interest, keyword) in conflict_rows {
        career_conflicts
            .entry(text::normalize(&interest))
            .or_default()
            .push(keyword.trim().to_lowercase());
    }

    let exception_rows: Vec<(String, String)> = sqlx::query_as(
        "SELECT interest, phrase FROM career_conflict_exception ORDER BY interest, phrase",
    )
    .fetch_all(pool)
    .await
    .context("failed to load career_conflict_exception")?;
    let mut conflict_exceptions: HashMap<String, Vec<String>> = HashMap::new();
    for (interest, phrase) in exception_rows {
        conflict_exceptions
            .entry(text::normalize(&interest))
            .or_default()
            .push(phrase.trim().to_lowercase());
    }

    let feedback: FeedbackSettingRow = sqlx::query_as(
        r#"
        SELECT feedback_weight, feedback_decay_days, min_feedback_count,
               own_weight, peer_weight, positive_boost, negative_penalty
        FROM feedback_setting
        "#,
    )
    .fetch_optional(pool)
    .await
    .context("failed to load feedback_setting")?
    .context("feedback_setting: missing row")?;

    let reasons: ReasonSettingRow = sqlx::query_as(
        "SELECT top_rank_threshold, high_employment_threshold FROM reason_setting",
    )
    .fetch_optional(pool)
    .await
    .context("failed to load reason_setting")?
    .context("reason_setting: missing row")?;

    Ok(EngineConfig {
        grade_values,
        weights,
        related_terms,
        generic_terms,
        generic_term_rules,
        region_cities,
        career_keywords,
        career_conflicts,
        conflict_exceptions,
        feedback: FeedbackSettings {
            feedback_weight: feedback.feedback_weight,
            decay_days: feedback.feedback_decay_days,
            min_count: feedback.min_feedback_count.max(0) as usize,
            own_weight: feedback.own_weight,
            peer_weight: feedback.peer_weight,
            positive_boost: feedback.positive_boost,
            negative_penalty: feedback.negative_penalty,
        },
        reasons: ReasonSettings {
            top_rank_threshold: reasons.top_rank_threshold,
            high_employment_threshold: reasons.high_employment_threshold,
        },
    })
}
