use crate::error::{Result, ScraperError};
use crate::types::{DashboardRow, SchoolRecord, ScoreRecord};
use async_trait::async_trait;
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

/// Storage trait for persisting schools and their score rows
#[async_trait]
pub trait Storage: Send + Sync {
    // School operations
    async fn insert_school(&self, school: &SchoolRecord) -> Result<i64>;
    async fn get_school(&self, id: i64) -> Result<Option<SchoolRecord>>;

    // Score operations
    async fn insert_score(&self, school_id: i64, score: &ScoreRecord) -> Result<()>;
    /// All-or-nothing insert of one school's rows.
    async fn insert_scores_atomic(&self, school_id: i64, scores: &[ScoreRecord]) -> Result<()>;
    async fn scores_for_school(&self, school_id: i64) -> Result<Vec<ScoreRecord>>;

    // Read side used by the dashboard
    async fn dashboard_rows(&self) -> Result<Vec<DashboardRow>>;
    async fn counts(&self) -> Result<(usize, usize)>;
}

/// Checks the row before it is written: owner must match, width must match.
pub fn check_score(school_id: i64, score: &ScoreRecord) -> Result<()> {
    if score.school_id != school_id {
        return Err(ScraperError::Database {
            message: format!(
                "score row belongs to school {} but was inserted for school {}",
                score.school_id, school_id
            ),
        });
    }
    if score.headers.len() != score.values.len() {
        return Err(ScraperError::RowShapeMismatch {
            expected: score.headers.len(),
            found: score.values.len(),
        });
    }
    Ok(())
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>> {
    mutex.lock().map_err(|_| ScraperError::Database {
        message: "storage mutex poisoned".to_string(),
    })
}

pub(crate) fn dashboard_row(school: &SchoolRecord, school_id: i64, score: &ScoreRecord) -> DashboardRow {
    DashboardRow {
        school_id,
        school_name: school.name.clone(),
        province: school.province.clone(),
        school_type: school.school_type.clone(),
        category: school.category.clone(),
        exam_type: score.exam_type.clone(),
        year: score.year,
        schema_variant: score.schema_variant,
        values: score.values.clone(),
        fields: score.fields(),
    }
}

/// In-memory storage implementation for dry runs and testing
#[derive(Default)]
pub struct InMemoryStorage {
    schools: Mutex<Vec<SchoolRecord>>,
    scores: Mutex<Vec<ScoreRecord>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn school_exists(&self, school_id: i64) -> Result<bool> {
        let schools = lock(&self.schools)?;
        Ok(school_id >= 1 && (school_id as usize) <= schools.len())
    }
}

#[async_trait]
impl Storage for InMemoryStorage {
    async fn insert_school(&self, school: &SchoolRecord) -> Result<i64> {
        let mut schools = lock(&self.schools)?;
        let id = schools.len() as i64 + 1;
        let mut stored = school.clone();
        stored.id = Some(id);
        schools.push(stored);

        debug!("Created school: {} with id {}", school.name, id);
        Ok(id)
    }

    async fn get_school(&self, id: i64) -> Result<Option<SchoolRecord>> {
        let schools = lock(&self.schools)?;
        Ok(schools.iter().find(|s| s.id == Some(id)).cloned())
    }

    async fn insert_score(&self, school_id: i64, score: &ScoreRecord) -> Result<()> {
        check_score(school_id, score)?;
        if !self.school_exists(school_id)? {
            return Err(ScraperError::Database {
                message: format!("no school with id {school_id}"),
            });
        }
        lock(&self.scores)?.push(score.clone());
        Ok(())
    }

    async fn insert_scores_atomic(&self, school_id: i64, scores: &[ScoreRecord]) -> Result<()> {
        for score in scores {
            check_score(school_id, score)?;
        }
        if !self.school_exists(school_id)? {
            return Err(ScraperError::Database {
                message: format!("no school with id {school_id}"),
            });
        }
        lock(&self.scores)?.extend_from_slice(scores);
        Ok(())
    }

    async fn scores_for_school(&self, school_id: i64) -> Result<Vec<ScoreRecord>> {
        let scores = lock(&self.scores)?;
        Ok(scores
            .iter()
            .filter(|s| s.school_id == school_id)
            .cloned()
            .collect())
    }

    async fn dashboard_rows(&self) -> Result<Vec<DashboardRow>> {
        let schools = lock(&self.schools)?;
        let scores = lock(&self.scores)?;
        let mut rows: Vec<DashboardRow> = scores
            .iter()
            .filter_map(|score| {
                let school = schools.get((score.school_id - 1) as usize)?;
                Some(dashboard_row(school, score.school_id, score))
            })
            .collect();
        // Stable sort keeps insertion order within equal keys
        rows.sort_by(|a, b| {
            a.school_name
                .cmp(&b.school_name)
                .then_with(|| a.exam_type.cmp(&b.exam_type))
        });
        Ok(rows)
    }

    async fn counts(&self) -> Result<(usize, usize)> {
        Ok((lock(&self.schools)?.len(), lock(&self.scores)?.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SchemaVariant;

    fn school(name: &str) -> SchoolRecord {
        SchoolRecord {
            id: None,
            name: name.to_string(),
            province: "湖北".to_string(),
            school_type: "公办".to_string(),
            category: "理工".to_string(),
            phone: "027-1".to_string(),
            address: "武汉".to_string(),
            remarks: String::new(),
            dorm_link: None,
            score_link: Some("https://x/score.html".to_string()),
        }
    }

    fn score(school_id: i64, name: &str, exam_type: &str) -> ScoreRecord {
        ScoreRecord::new(
            school_id,
            name,
            2025,
            SchemaVariant::RawScoreBreakdown,
            vec!["考试类型".to_string(), "投档最低分".to_string()],
            vec![exam_type.to_string(), "300".to_string()],
            "https://x/score.html",
        )
        .unwrap()
    }

    #[tokio::test]
    async fn assigns_sequential_ids_and_reads_back() {
        let storage = InMemoryStorage::new();
        let a = storage.insert_school(&school("甲")).await.unwrap();
        let b = storage.insert_school(&school("乙")).await.unwrap();
        assert_eq!((a, b), (1, 2));

        let stored = storage.get_school(b).await.unwrap().unwrap();
        assert_eq!(stored.id, Some(2));
        assert_eq!(stored.name, "乙");
        assert!(storage.get_school(99).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn rejects_score_for_unknown_school() {
        let storage = InMemoryStorage::new();
        let err = storage.insert_score(5, &score(5, "甲", "普通类")).await.unwrap_err();
        assert!(matches!(err, ScraperError::Database { .. }));
    }

    #[tokio::test]
    async fn rejects_score_with_mismatched_owner() {
        let storage = InMemoryStorage::new();
        let id = storage.insert_school(&school("甲")).await.unwrap();
        assert!(storage.insert_score(id, &score(id + 1, "甲", "普通类")).await.is_err());
    }

    #[tokio::test]
    async fn dashboard_rows_sorted_by_school_then_exam_type() {
        let storage = InMemoryStorage::new();
        let b = storage.insert_school(&school("b学院")).await.unwrap();
        let a = storage.insert_school(&school("a学院")).await.unwrap();
        storage.insert_score(b, &score(b, "b学院", "普通类")).await.unwrap();
        storage.insert_score(a, &score(a, "a学院", "中职类")).await.unwrap();
        storage.insert_score(a, &score(a, "a学院", "中职")).await.unwrap();

        let rows = storage.dashboard_rows().await.unwrap();
        let keys: Vec<(&str, Option<&str>)> = rows
            .iter()
            .map(|r| (r.school_name.as_str(), r.exam_type.as_deref()))
            .collect();
        assert_eq!(
            keys,
            vec![("a学院", Some("中职")), ("a学院", Some("中职类")), ("b学院", Some("普通类"))]
        );
        assert_eq!(rows[0].province, "湖北");
        assert_eq!(storage.counts().await.unwrap(), (2, 3));
    }
}
