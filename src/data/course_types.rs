//! Catalogue domain types shared by the data layer and the engine.

use serde::{Deserialize, Serialize};

/// A-level grade letter. Numeric values live in the `grade_value`
/// configuration table, not here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Grade {
    AStar,
    A,
    B,
    C,
    D,
    E,
    U,
}

impl Grade {
    /// Every grade letter, best first. Configuration validation checks that
    /// the `grade_value` table prices all of these.
    pub const ALL: [Grade; 7] = [
        Grade::AStar,
        Grade::A,
        Grade::B,
        Grade::C,
        Grade::D,
        Grade::E,
        Grade::U,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::AStar => "A*",
            Self::A => "A",
            Self::B => "B",
            Self::C => "C",
            Self::D => "D",
            Self::E => "E",
            Self::U => "U",
        }
    }

    /// Parse a grade letter, case-insensitively.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "A*" => Some(Self::AStar),
            "A" => Some(Self::A),
            "B" => Some(Self::B),
            "C" => Some(Self::C),
            "D" => Some(Self::D),
            "E" => Some(Self::E),
            "U" => Some(Self::U),
            _ => None,
        }
    }
}

impl std::fmt::Display for Grade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Grade {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Grade {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Grade::parse(&raw)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown grade letter: {raw}")))
    }
}

/// One entry of a course's `required_subjects` JSONB column.
///
/// The grade is kept as raw text here; the engine parses it per course and
/// skips courses carrying letters the configuration doesn't know.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RequirementEntry {
    pub subject: String,
    pub grade: String,
}

/// An enriched candidate course, read-only during scoring.
///
/// Every enrichment field may be absent; each scorer defines its own neutral
/// default for missing data.
#[derive(Debug, Clone)]
pub struct CourseRecord {
    pub course_id: i32,
    pub university_id: i32,
    pub name: String,
    pub university_name: String,
    pub required_subjects: Vec<RequirementEntry>,
    pub cah_codes: Vec<String>,
    pub annual_fee: Option<i32>,
    pub university_region: Option<String>,
    pub university_city: Option<String>,
    pub university_rank_overall: Option<i32>,
    pub employment_rate: Option<f64>,
    pub median_salary: Option<i32>,
    pub average_entry_tariff: Option<f64>,
    pub professional_destination_rate: Option<f64>,
}
