//! Catalogue reader: candidate courses plus their enrichment in one pass.
//!
//! One candidates query collects the courses (requirements and CAH codes
//! ride along as JSONB / TEXT[]), then four bulk queries keyed on
//! `course_id = ANY($1)` attach the Discover Uni statistics. Per-course
//! round trips are forbidden; nothing outside this module reads the
//! catalogue tables.

use anyhow::{Context, Result};
use sqlx::PgPool;
use std::collections::HashMap;
use tracing::error;

use crate::data::course_types::{CourseRecord, RequirementEntry};

/// Upper bound on candidates considered per request.
const DEFAULT_CANDIDATE_LIMIT: i64 = 20_000;

/// Optional narrowing filters for the candidates query.
#[derive(Debug, Clone, Default)]
pub struct CatalogueFilters {
    /// Substring match against the course name.
    pub course_keyword: Option<String>,
    /// Substring match against the university name.
    pub university: Option<String>,
    pub max_fee: Option<i32>,
    pub limit: Option<i64>,
}

/// Everything the scoring pipeline needs from the catalogue.
pub struct CatalogueSnapshot {
    pub courses: Vec<CourseRecord>,
    /// Worst `rank_overall` among ranked universities, for normalization.
    pub max_rank: Option<i32>,
}

#[derive(sqlx::FromRow)]
struct CandidateRow {
    id: i32,
    university_id: i32,
    name: String,
    cah_codes: Vec<String>,
    required_subjects: serde_json::Value,
    annual_fee: Option<i32>,
    university_name: String,
    region: Option<String>,
    city: Option<String>,
    rank_overall: Option<i32>,
}

/// Fetch candidate courses with their enrichment.
pub async fn fetch_catalogue(
    pool: &PgPool,
    filters: &CatalogueFilters,
) -> Result<CatalogueSnapshot> {
    let limit = filters
        .limit
        .unwrap_or(DEFAULT_CANDIDATE_LIMIT)
        .clamp(1, DEFAULT_CANDIDATE_LIMIT);

    let rows: Vec<CandidateRow> = sqlx::query_as(
        r#"
        SELECT c.id, c.university_id, c.name, c.cah_codes, c.required_subjects,
               c.annual_fee, u.name AS university_name, u.region, u.city, u.rank_overall
        FROM courses c
        JOIN universities u ON u.id = c.university_id
        WHERE ($1::text IS NULL OR c.name ILIKE '%' || $1 || '%')
          AND ($2::text IS NULL OR u.name ILIKE '%' || $2 || '%')
          AND ($3::int IS NULL OR c.annual_fee IS NULL OR c.annual_fee <= $3)
        ORDER BY c.id
        LIMIT $4
        "#,
    )
    .bind(filters.course_keyword.as_deref())
    .bind(filters.university.as_deref())
    .bind(filters.max_fee)
    .bind(limit)
    .fetch_all(pool)
    .await
    .context("failed to fetch candidate courses")?;

    let ids: Vec<i32> = rows.iter().map(|r| r.id).collect();

    let (employment, salary, entry, destinations) = tokio::try_join!(
        fetch_f64_map(
            pool,
            "SELECT course_id, employment_rate FROM course_employment_stats WHERE course_id = ANY($1)",
            &ids,
        ),
        fetch_i32_map(
            pool,
            "SELECT course_id, median_salary FROM course_salary_stats WHERE course_id = ANY($1)",
            &ids,
        ),
        fetch_f64_map(
            pool,
            "SELECT course_id, average_tariff FROM course_entry_stats WHERE course_id = ANY($1)",
            &ids,
        ),
        fetch_f64_map(
            pool,
            "SELECT course_id, professional_rate FROM course_job_destinations WHERE course_id = ANY($1)",
            &ids,
        ),
    )?;

    let max_rank: Option<i32> = sqlx::query_scalar("SELECT MAX(rank_overall) FROM universities")
        .fetch_one(pool)
        .await
        .context("failed to fetch maximum university rank")?;

    let courses = rows
        .into_iter()
        .map(|row| {
            let required_subjects: Vec<RequirementEntry> =
                serde_json::from_value(row.required_subjects)
                    .map_err(|e| {
                        error!(
                            course_id = row.id,
                            %e,
                            "failed to deserialize required_subjects JSONB"
                        );
                        e
                    })
                    .unwrap_or_default();
            CourseRecord {
                course_id: row.id,
                university_id: row.university_id,
                name: row.name,
                university_name: row.university_name,
                required_subjects,
                cah_codes: row.cah_codes,
                annual_fee: row.annual_fee,
                university_region: row.region,
                university_city: row.city,
                university_rank_overall: row.rank_overall,
                employment_rate: employment.get(&row.id).copied(),
                median_salary: salary.get(&row.id).copied(),
                average_entry_tariff: entry.get(&row.id).copied(),
                professional_destination_rate: destinations.get(&row.id).copied(),
            }
        })
        .collect();

    Ok(CatalogueSnapshot { courses, max_rank })
}

async fn fetch_f64_map(
    pool: &PgPool,
    sql: &'static str,
    ids: &[i32],
) -> Result<HashMap<i32, f64>> {
    let rows: Vec<(i32, Option<f64>)> = sqlx::query_as(sql)
        .bind(ids)
        .fetch_all(pool)
        .await
        .with_context(|| format!("bulk enrichment query failed: {sql}"))?;
    Ok(rows
        .into_iter()
        .filter_map(|(id, value)| value.map(|v| (id, v)))
        .collect())
}

async fn fetch_i32_map(
    pool: &PgPool,
    sql: &'static str,
    ids: &[i32],
) -> Result<HashMap<i32, i32>> {
    let rows: Vec<(i32, Option<i32>)> = sqlx::query_as(sql)
        .bind(ids)
        .fetch_all(pool)
        .await
        .with_context(|| format!("bulk enrichment query failed: {sql}"))?;
    Ok(rows
        .into_iter()
        .filter_map(|(id, value)| value.map(|v| (id, v)))
        .collect())
}
