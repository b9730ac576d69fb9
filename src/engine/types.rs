//! Request and response types for the recommendation engine.

use chrono::{DateTime, Utc};
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::data::course_types::{CourseRecord, Grade, RequirementEntry};
use crate::engine::text;

/// A student's profile as submitted with a recommendation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentProfile {
    pub user_id: i64,
    /// A-level subject names; normalized to lowercase before matching.
    pub subjects: IndexSet<String>,
    #[serde(default)]
    pub predicted_grades: BTreeMap<String, Grade>,
    /// Declared career interests, in preference order.
    #[serde(default)]
    pub career_interests: IndexSet<String>,
    #[serde(default)]
    pub preferred_region: Option<String>,
    /// Annual fee ceiling, currency-agnostic.
    #[serde(default)]
    pub max_budget: Option<u32>,
}

impl StudentProfile {
    /// Copy of the profile with subjects, grade keys, and region normalized
    /// for matching. Career interests keep their submitted form; matching
    /// normalizes them through [`StudentProfile::interest_tags`].
    pub fn normalized(&self) -> Self {
        Self {
            user_id: self.user_id,
            subjects: self
                .subjects
                .iter()
                .map(|s| text::normalize(s))
                .filter(|s| !s.is_empty())
                .collect(),
            predicted_grades: self
                .predicted_grades
                .iter()
                .map(|(subject, grade)| (text::normalize(subject), *grade))
                .collect(),
            career_interests: self.career_interests.clone(),
            preferred_region: self
                .preferred_region
                .as_deref()
                .map(text::normalize)
                .filter(|r| !r.is_empty()),
            max_budget: self.max_budget,
        }
    }

    /// Declared interests paired with their normalized matching keys.
    pub fn interest_tags(&self) -> Vec<InterestTag> {
        self.career_interests
            .iter()
            .map(|label| InterestTag {
                key: text::normalize(label),
                label: label.clone(),
            })
            .filter(|tag| !tag.key.is_empty())
            .collect()
    }
}

/// A declared career interest: normalized key for table lookups plus the
/// submitted label for display.
#[derive(Debug, Clone)]
pub struct InterestTag {
    pub key: String,
    pub label: String,
}

/// Per-request knobs from the caller.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RecommendOptions {
    /// Maximum recommendations returned; clamped to 1..=100 at the boundary.
    pub limit: usize,
    /// Attach the per-scorer breakdown to each recommendation.
    pub advanced: bool,
    pub include_reasons: bool,
}

impl Default for RecommendOptions {
    fn default() -> Self {
        Self {
            limit: 50,
            advanced: false,
            include_reasons: true,
        }
    }
}

/// Raw component scores behind a recommendation, exposed on the advanced path.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreBreakdown {
    pub subject: f64,
    pub grade: f64,
    pub preference: f64,
    pub ranking: f64,
    pub employability: f64,
    /// Total bonus applied on top of the weighted base score.
    pub bonuses: f64,
    /// Weighted feedback adjustment actually applied.
    pub feedback: f64,
}

/// Course payload attached to each recommendation.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseSummary {
    pub course_id: i32,
    pub name: String,
    pub university_id: i32,
    pub university_name: String,
    pub university_region: Option<String>,
    pub university_city: Option<String>,
    pub university_rank: Option<i32>,
    pub annual_fee: Option<i32>,
    pub required_subjects: Vec<RequirementEntry>,
    pub employment_rate: Option<f64>,
    pub median_salary: Option<i32>,
    pub average_entry_tariff: Option<f64>,
    pub professional_destination_rate: Option<f64>,
}

impl From<&CourseRecord> for CourseSummary {
    fn from(course: &CourseRecord) -> Self {
        Self {
            course_id: course.course_id,
            name: course.name.clone(),
            university_id: course.university_id,
            university_name: course.university_name.clone(),
            university_region: course.university_region.clone(),
            university_city: course.university_city.clone(),
            university_rank: course.university_rank_overall,
            annual_fee: course.annual_fee,
            required_subjects: course.required_subjects.clone(),
            employment_rate: course.employment_rate,
            median_salary: course.median_salary,
            average_entry_tariff: course.average_entry_tariff,
            professional_destination_rate: course.professional_destination_rate,
        }
    }
}

/// One ranked course recommendation.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Recommendation {
    pub course: CourseSummary,
    /// Composite match score, clamped to [0, 1].
    pub match_score: f64,
    pub meets_requirements: bool,
    pub reasons: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score_breakdown: Option<ScoreBreakdown>,
}

/// Ordered recommendation list plus degradation warnings.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecommendationList {
    pub recommendations: Vec<Recommendation>,
    /// Non-fatal degradations, e.g. `feedback_unavailable`.
    pub warnings: Vec<String>,
    pub generated_at: DateTime<Utc>,
}

/// Feedback polarity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedbackKind {
    Positive,
    Negative,
}

impl FeedbackKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Positive => "positive",
            Self::Negative => "negative",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "positive" => Some(Self::Positive),
            "negative" => Some(Self::Negative),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_normalization() {
        let profile: StudentProfile = serde_json::from_str(
            r#"{
                "userId": 7,
                "subjects": ["Mathematics", "  Physics ", "mathematics"],
                "predictedGrades": {"Mathematics": "A*", "Physics": "B"},
                "careerInterests": ["Business & Finance"],
                "preferredRegion": "North West"
            }"#,
        )
        .unwrap();

        let normalized = profile.normalized();
        assert_eq!(
            normalized.subjects.iter().cloned().collect::<Vec<_>>(),
            vec!["mathematics", "physics"]
        );
        assert_eq!(
            normalized.predicted_grades.get("mathematics"),
            Some(&Grade::AStar)
        );
        assert_eq!(normalized.preferred_region.as_deref(), Some("north west"));

        let tags = normalized.interest_tags();
        assert_eq!(tags.len(), 1);
        assert_eq!(tags[0].key, "business finance");
        assert_eq!(tags[0].label, "Business & Finance");
    }

    #[test]
    fn test_options_defaults() {
        let options: RecommendOptions = serde_json::from_str("{}").unwrap();
        assert_eq!(options.limit, 50);
        assert!(!options.advanced);
        assert!(options.include_reasons);
    }

    #[test]
    fn test_feedback_kind_round_trip() {
        assert_eq!(FeedbackKind::parse("positive"), Some(FeedbackKind::Positive));
        assert_eq!(FeedbackKind::parse("negative"), Some(FeedbackKind::Negative));
        assert_eq!(FeedbackKind::parse("meh"), None);
        assert_eq!(FeedbackKind::Positive.as_str(), "positive");
    }
}
