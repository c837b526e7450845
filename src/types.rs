use crate::constants::{
    POS_APTITUDE_TEST, POS_CUTOFF_SCORE, POS_LANGUAGE, POS_MAJOR_FOUNDATION, POS_MATH,
    POS_VOCATIONAL_SKILL,
};
use crate::error::{Result, ScraperError};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

/// One school as listed on the listing page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchoolRecord {
    /// Assigned by the storage layer; `None` until persisted.
    pub id: Option<i64>,
    pub name: String,
    pub province: String,
    /// Ownership type (public / private).
    pub school_type: String,
    pub category: String,
    pub phone: String,
    pub address: String,
    pub remarks: String,
    pub dorm_link: Option<String>,
    pub score_link: Option<String>,
}

/// Which of the two known detail-table layouts a school uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaVariant {
    /// Header carries a rank or admission-cutoff-line column.
    RankAndCutoff,
    /// Plain per-subject score breakdown.
    RawScoreBreakdown,
}

impl SchemaVariant {
    pub fn as_str(&self) -> &'static str {
        match self {
            SchemaVariant::RankAndCutoff => "rank_and_cutoff",
            SchemaVariant::RawScoreBreakdown => "raw_score_breakdown",
        }
    }
}

impl fmt::Display for SchemaVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SchemaVariant {
    type Err = ScraperError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "rank_and_cutoff" => Ok(SchemaVariant::RankAndCutoff),
            "raw_score_breakdown" => Ok(SchemaVariant::RawScoreBreakdown),
            other => Err(ScraperError::Database {
                message: format!("unknown schema variant '{other}'"),
            }),
        }
    }
}

/// One data row of a school's score table, positionally aligned with its headers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreRecord {
    pub school_id: i64,
    pub school_name: String,
    pub exam_type: Option<String>,
    pub year: i32,
    pub schema_variant: SchemaVariant,
    pub headers: Vec<String>,
    pub values: Vec<String>,
    pub source_url: String,
}

impl ScoreRecord {
    /// Builds a record, refusing rows whose width disagrees with the header.
    pub fn new(
        school_id: i64,
        school_name: &str,
        year: i32,
        schema_variant: SchemaVariant,
        headers: Vec<String>,
        values: Vec<String>,
        source_url: &str,
    ) -> Result<Self> {
        if headers.len() != values.len() {
            return Err(ScraperError::RowShapeMismatch {
                expected: headers.len(),
                found: values.len(),
            });
        }
        let exam_type = values.first().cloned();
        Ok(Self {
            school_id,
            school_name: school_name.to_string(),
            exam_type,
            year,
            schema_variant,
            headers,
            values,
            source_url: source_url.to_string(),
        })
    }

    /// Stable digest of the row identity: school, exam type, source and cells.
    pub fn row_key(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.school_id.to_le_bytes());
        hasher.update(b"|");
        hasher.update(self.exam_type.as_deref().unwrap_or("").as_bytes());
        hasher.update(b"|");
        hasher.update(self.source_url.as_bytes());
        for value in &self.values {
            hasher.update(b"\x1f");
            hasher.update(value.as_bytes());
        }
        hex::encode(hasher.finalize())
    }

    pub fn fields(&self) -> ScoreFields {
        ScoreFields::from_values(&self.values)
    }
}

/// Named view over the positional slots the dashboard reads.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreFields {
    pub cutoff_score: Option<String>,
    pub vocational_skill: Option<String>,
    pub language: Option<String>,
    pub math: Option<String>,
    pub major_foundation: Option<String>,
    pub aptitude_test: Option<String>,
}

impl ScoreFields {
    pub fn from_values(values: &[String]) -> Self {
        let at = |pos: usize| values.get(pos).cloned();
        Self {
            cutoff_score: at(POS_CUTOFF_SCORE),
            vocational_skill: at(POS_VOCATIONAL_SKILL),
            language: at(POS_LANGUAGE),
            math: at(POS_MATH),
            major_foundation: at(POS_MAJOR_FOUNDATION),
            aptitude_test: at(POS_APTITUDE_TEST),
        }
    }
}

/// A joined `school_info` x `score` row, in the order the dashboard reads them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DashboardRow {
    pub school_id: i64,
    pub school_name: String,
    pub province: String,
    pub school_type: String,
    pub category: String,
    pub exam_type: Option<String>,
    pub year: i32,
    pub schema_variant: SchemaVariant,
    pub values: Vec<String>,
    pub fields: ScoreFields,
}

/// Terminal state of one school within a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SchoolOutcome {
    Persisted {
        accepted: usize,
        shape_mismatches: usize,
        insert_failures: usize,
    },
    NoScoreLink,
    SkippedNoTable,
    SkippedFetchFailed { error: String },
    PersistFailed { error: String },
}

impl SchoolOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            SchoolOutcome::Persisted { .. } => "persisted",
            SchoolOutcome::NoScoreLink => "no_score_link",
            SchoolOutcome::SkippedNoTable => "skipped_no_table",
            SchoolOutcome::SkippedFetchFailed { .. } => "skipped_fetch_failed",
            SchoolOutcome::PersistFailed { .. } => "persist_failed",
        }
    }
}
