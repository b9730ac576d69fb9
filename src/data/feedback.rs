//! Feedback store: bulk fetches for the feedback engine and the append-only
//! write path.
//!
//! Peer similarity is resolved in SQL: users sharing at least
//! [`MIN_SHARED_SUBJECTS`] of the requester's subjects, or at least one
//! career interest. Both fetches are bulk across every candidate course id.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::warn;

use crate::engine::feedback::FeedbackRecord;
use crate::engine::types::FeedbackKind;

/// Subjects two students must share to count as peers (interests need one).
const MIN_SHARED_SUBJECTS: i64 = 2;

fn parse_rows(rows: Vec<(i32, String, DateTime<Utc>)>) -> Vec<FeedbackRecord> {
    rows.into_iter()
        .filter_map(|(course_id, kind, created_at)| match FeedbackKind::parse(&kind) {
            Some(kind) => Some(FeedbackRecord {
                course_id,
                kind,
                created_at,
            }),
            None => {
                warn!(course_id, kind = %kind, "ignoring feedback row with unknown kind");
                None
            }
        })
        .collect()
}

/// The requesting student's own feedback on any candidate course.
pub async fn fetch_own_feedback(
    pool: &PgPool,
    user_id: i64,
    course_ids: &[i32],
    since: DateTime<Utc>,
) -> Result<Vec<FeedbackRecord>> {
    let rows: Vec<(i32, String, DateTime<Utc>)> = sqlx::query_as(
        r#"
        SELECT course_id, kind, created_at
        FROM course_feedback
        WHERE user_id = $1 AND course_id = ANY($2) AND created_at >= $3
        "#,
    )
    .bind(user_id)
    .bind(course_ids)
    .bind(since)
    .fetch_all(pool)
    .await
    .context("failed to fetch own feedback")?;
    Ok(parse_rows(rows))
}

/// Feedback from similar users on any candidate course.
///
/// Subjects and interests must already be normalized; the profile tables
/// store normalized values.
pub async fn fetch_peer_feedback(
    pool: &PgPool,
    user_id: i64,
    course_ids: &[i32],
    subjects: &[String],
    interests: &[String],
    since: DateTime<Utc>,
) -> Result<Vec<FeedbackRecord>> {
    let rows: Vec<(i32, String, DateTime<Utc>)> = sqlx::query_as(
        r#"
        WITH similar_users AS (
            SELECT us.user_id
            FROM user_subjects us
            WHERE us.subject = ANY($2) AND us.user_id <> $1
            GROUP BY us.user_id
            HAVING COUNT(DISTINCT us.subject) >= $3
            UNION
            SELECT ui.user_id
            FROM user_interests ui
            WHERE ui.interest = ANY($4) AND ui.user_id <> $1
        )
        SELECT f.course_id, f.kind, f.created_at
        FROM course_feedback f
        JOIN similar_users su ON su.user_id = f.user_id
        WHERE f.course_id = ANY($5) AND f.created_at >= $6
        "#,
    )
    .bind(user_id)
    .bind(subjects)
    .bind(MIN_SHARED_SUBJECTS)
    .bind(interests)
    .bind(course_ids)
    .bind(since)
    .fetch_all(pool)
    .await
    .context("failed to fetch peer feedback")?;
    Ok(parse_rows(rows))
}

pub async fn course_exists(pool: &PgPool, course_id: i32) -> Result<bool> {
    let exists: bool =
        sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM courses WHERE id = $1)")
            .bind(course_id)
            .fetch_one(pool)
            .await
            .context("failed to check course existence")?;
    Ok(exists)
}

/// Append one feedback record. Deletion is out of scope by design.
pub async fn insert_feedback(
    pool: &PgPool,
    user_id: i64,
    course_id: i32,
    kind: FeedbackKind,
    notes: Option<&str>,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO course_feedback (user_id, course_id, kind, notes)
        VALUES ($1, $2, $3, $4)
        "#,
    )
    .bind(user_id)
    .bind(course_id)
    .bind(kind.as_str())
    .bind(notes)
    .execute(pool)
    .await
    .context("failed to insert feedback")?;
    Ok(())
}
