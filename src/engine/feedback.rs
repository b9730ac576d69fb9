//! Feedback-derived score adjustments.
//!
//! Collaborative-filter-lite: the student's own feedback and feedback from
//! peers (shared subjects or interests) are combined with exponential
//! temporal decay into a per-course adjustment in [-0.3, +0.2]. Peer
//! similarity is defined by the profile tables, not learned embeddings, so
//! every adjustment stays explainable.

use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};

use crate::engine::config::FeedbackSettings;
use crate::engine::types::FeedbackKind;

pub const ADJUSTMENT_MIN: f64 = -0.3;
pub const ADJUSTMENT_MAX: f64 = 0.2;

/// Maximum length of feedback notes, in characters.
pub const MAX_NOTES_CHARS: usize = 500;

/// One stored feedback record, as fetched by the data layer.
#[derive(Debug, Clone)]
pub struct FeedbackRecord {
    pub course_id: i32,
    pub kind: FeedbackKind,
    pub created_at: DateTime<Utc>,
}

/// Contribution of a single record: `sign * exp(-age_days / decay_days)`.
fn record_signal(record: &FeedbackRecord, now: DateTime<Utc>, settings: &FeedbackSettings) -> f64 {
    let age_days = (now - record.created_at).num_milliseconds().max(0) as f64 / 86_400_000.0;
    let decay = (-age_days / settings.decay_days).exp();
    match record.kind {
        FeedbackKind::Positive => settings.positive_boost * decay,
        FeedbackKind::Negative => -settings.negative_penalty * decay,
    }
}

/// Sum the time-weighted signal per course, keeping the record count so
/// under-evidenced buckets can be discarded.
fn bucket_signals(
    records: &[FeedbackRecord],
    now: DateTime<Utc>,
    settings: &FeedbackSettings,
) -> HashMap<i32, (f64, usize)> {
    let mut buckets: HashMap<i32, (f64, usize)> = HashMap::new();
    for record in records {
        let entry = buckets.entry(record.course_id).or_default();
        entry.0 += record_signal(record, now, settings);
        entry.1 += 1;
    }
    buckets
}

/// Combine own and peer feedback into a clamped per-course adjustment.
///
/// Buckets with fewer than `min_feedback_count` records contribute nothing.
/// Courses without any surviving signal are simply absent from the map.
pub fn course_adjustments(
    own: &[FeedbackRecord],
    peer: &[FeedbackRecord],
    now: DateTime<Utc>,
    settings: &FeedbackSettings,
) -> HashMap<i32, f64> {
    let own_buckets = bucket_signals(own, now, settings);
    let peer_buckets = bucket_signals(peer, now, settings);

    let course_ids: HashSet<i32> = own_buckets.keys().chain(peer_buckets.keys()).copied().collect();

    let surviving = |buckets: &HashMap<i32, (f64, usize)>, id: i32| {
        buckets
            .get(&id)
            .filter(|(_, count)| *count >= settings.min_count)
            .map(|(signal, _)| *signal)
            .unwrap_or(0.0)
    };

    let mut adjustments = HashMap::new();
    for id in course_ids {
        let own_signal = surviving(&own_buckets, id);
        let peer_signal = surviving(&peer_buckets, id);
        let adjustment = (settings.own_weight * own_signal + settings.peer_weight * peer_signal)
            .clamp(ADJUSTMENT_MIN, ADJUSTMENT_MAX);
        if adjustment != 0.0 {
            adjustments.insert(id, adjustment);
        }
    }
    adjustments
}

/// Truncate submitted notes to [`MAX_NOTES_CHARS`] characters.
pub fn truncate_notes(notes: &str) -> String {
    notes.chars().take(MAX_NOTES_CHARS).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn settings() -> FeedbackSettings {
        FeedbackSettings {
            feedback_weight: 0.5,
            decay_days: 90.0,
            min_count: 1,
            own_weight: 0.6,
            peer_weight: 0.4,
            positive_boost: 0.2,
            negative_penalty: 0.3,
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    fn record(course_id: i32, kind: FeedbackKind, days_ago: i64) -> FeedbackRecord {
        FeedbackRecord {
            course_id,
            kind,
            created_at: now() - Duration::days(days_ago),
        }
    }

    #[test]
    fn test_recent_positive_feedback_boosts() {
        let own = vec![record(7, FeedbackKind::Positive, 10)];
        let adjustments = course_adjustments(&own, &[], now(), &settings());
        let a = adjustments[&7];
        // 0.6 * 0.2 * exp(-10/90)
        let expected = 0.6 * 0.2 * (-10.0_f64 / 90.0).exp();
        assert!((a - expected).abs() < 1e-9, "got {a}");
        assert!(a > 0.0 && a <= ADJUSTMENT_MAX);
    }

    #[test]
    fn test_ancient_feedback_decays_to_nothing() {
        // 900 days at a 90-day decay constant: exp(-10) ~ 4.5e-5
        let own = vec![record(7, FeedbackKind::Positive, 900)];
        let adjustments = course_adjustments(&own, &[], now(), &settings());
        let a = adjustments.get(&7).copied().unwrap_or(0.0);
        assert!(a.abs() < 1e-3, "got {a}");
    }

    #[test]
    fn test_future_dated_records_do_not_amplify() {
        let own = vec![record(7, FeedbackKind::Positive, -30)];
        let adjustments = course_adjustments(&own, &[], now(), &settings());
        // age clamps to zero: contribution is exactly the boost
        let expected = 0.6 * 0.2;
        assert!((adjustments[&7] - expected).abs() < 1e-9);
    }

    #[test]
    fn test_min_count_discards_thin_buckets() {
        let mut cfg = settings();
        cfg.min_count = 2;
        let own = vec![record(7, FeedbackKind::Positive, 5)];
        assert!(course_adjustments(&own, &[], now(), &cfg).is_empty());

        let own = vec![
            record(7, FeedbackKind::Positive, 5),
            record(7, FeedbackKind::Positive, 8),
        ];
        assert!(!course_adjustments(&own, &[], now(), &cfg).is_empty());
    }

    #[test]
    fn test_negative_pile_clamps_at_floor() {
        let own: Vec<_> = (0..20)
            .map(|i| record(7, FeedbackKind::Negative, i))
            .collect();
        let adjustments = course_adjustments(&own, &[], now(), &settings());
        assert_eq!(adjustments[&7], ADJUSTMENT_MIN);
    }

    #[test]
    fn test_own_and_peer_weights_combine() {
        let own = vec![record(7, FeedbackKind::Positive, 0)];
        let peer = vec![record(7, FeedbackKind::Negative, 0)];
        let adjustments = course_adjustments(&own, &peer, now(), &settings());
        // 0.6 * 0.2 - 0.4 * 0.3 cancels out exactly
        assert_eq!(adjustments.get(&7).copied().unwrap_or(0.0), 0.0);

        let peer = vec![record(9, FeedbackKind::Positive, 0)];
        let adjustments = course_adjustments(&own, &peer, now(), &settings());
        assert!((adjustments[&7] - 0.12).abs() < 1e-9);
        assert!((adjustments[&9] - 0.08).abs() < 1e-9);
    }

    #[test]
    fn test_truncate_notes_respects_char_boundaries() {
        let long = "é".repeat(600);
        let truncated = truncate_notes(&long);
        assert_eq!(truncated.chars().count(), MAX_NOTES_CHARS);
        let short = truncate_notes("fine as-is");
        assert_eq!(short, "fine as-is");
    }
}
