use crate::error::{Result, ScraperError};
use crate::storage::{check_score, lock, Storage};
use crate::types::{DashboardRow, SchemaVariant, SchoolRecord, ScoreFields, ScoreRecord};
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, info};

const MIGRATION_SQL: &str = include_str!("../migrations/001_create_school_info_and_score.sql");

const INSERT_SCORE_SQL: &str = r#"
    INSERT INTO score (
        school_id, school_name, exam_type, year, schema_variant, headers, "values", source_url, row_key
    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
"#;

/// SQLite-backed `school_info` / `score` store.
///
/// One long-lived connection per run. The mutex only makes the gateway `Sync`; the
/// pipeline never writes from two tasks at once.
pub struct SqliteStorage {
    conn: Mutex<Connection>,
}

impl SqliteStorage {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        info!("Opening SQLite database at {}", path.display());
        let conn = Connection::open(path).map_err(|e| ScraperError::Database {
            message: format!("Failed to open database '{}': {e}", path.display()),
        })?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        let storage = Self {
            conn: Mutex::new(conn),
        };
        storage.run_migrations()?;
        Ok(storage)
    }

    /// Creates both tables if they do not exist yet.
    pub fn run_migrations(&self) -> Result<()> {
        debug!("Running database migrations...");
        let conn = lock(&self.conn)?;
        conn.execute_batch(MIGRATION_SQL)
            .map_err(|e| ScraperError::Database {
                message: format!("Failed to run migrations: {e}"),
            })?;
        Ok(())
    }

    /// Clear all data from the database (useful for development)
    pub fn clear_all_data(&self) -> Result<()> {
        let conn = lock(&self.conn)?;
        // Scores first (foreign key)
        conn.execute("DELETE FROM score", [])?;
        conn.execute("DELETE FROM school_info", [])?;
        info!("Cleared all data from database");
        Ok(())
    }
}

fn insert_score_with(conn: &Connection, school_id: i64, score: &ScoreRecord) -> Result<()> {
    check_score(school_id, score)?;
    let headers = serde_json::to_string(&score.headers)?;
    let values = serde_json::to_string(&score.values)?;
    conn.execute(
        INSERT_SCORE_SQL,
        params![
            school_id,
            score.school_name,
            score.exam_type,
            score.year,
            score.schema_variant.as_str(),
            headers,
            values,
            score.source_url,
            score.row_key(),
        ],
    )
    .map_err(|e| ScraperError::Database {
        message: format!("Failed to insert score row: {e}"),
    })?;
    Ok(())
}

// Columns as stored, before JSON decoding
struct StoredScore {
    school_id: i64,
    school_name: String,
    exam_type: Option<String>,
    year: i32,
    schema_variant: String,
    headers: String,
    values: String,
    source_url: String,
}

impl StoredScore {
    fn into_record(self) -> Result<ScoreRecord> {
        Ok(ScoreRecord {
            school_id: self.school_id,
            school_name: self.school_name,
            exam_type: self.exam_type,
            year: self.year,
            schema_variant: self.schema_variant.parse::<SchemaVariant>()?,
            headers: serde_json::from_str(&self.headers)?,
            values: serde_json::from_str(&self.values)?,
            source_url: self.source_url,
        })
    }
}

#[async_trait]
impl Storage for SqliteStorage {
    async fn insert_school(&self, school: &SchoolRecord) -> Result<i64> {
        let conn = lock(&self.conn)?;
        conn.execute(
            "INSERT INTO school_info (name, province, type, category, phone, address, remarks, dorm_link, score_link)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                school.name,
                school.province,
                school.school_type,
                school.category,
                school.phone,
                school.address,
                school.remarks,
                school.dorm_link,
                school.score_link,
            ],
        )
        .map_err(|e| ScraperError::Database {
            message: format!("Failed to insert school '{}': {e}", school.name),
        })?;
        let id = conn.last_insert_rowid();
        debug!("Created school: {} with id {}", school.name, id);
        Ok(id)
    }

    async fn get_school(&self, id: i64) -> Result<Option<SchoolRecord>> {
        let conn = lock(&self.conn)?;
        let school = conn
            .query_row(
                "SELECT id, name, province, type, category, phone, address, remarks, dorm_link, score_link
                 FROM school_info WHERE id = ?1",
                params![id],
                |row| {
                    Ok(SchoolRecord {
                        id: Some(row.get(0)?),
                        name: row.get(1)?,
                        province: row.get(2)?,
                        school_type: row.get(3)?,
                        category: row.get(4)?,
                        phone: row.get(5)?,
                        address: row.get(6)?,
                        remarks: row.get(7)?,
                        dorm_link: row.get(8)?,
                        score_link: row.get(9)?,
                    })
                },
            )
            .optional()?;
        Ok(school)
    }

    async fn insert_score(&self, school_id: i64, score: &ScoreRecord) -> Result<()> {
        let conn = lock(&self.conn)?;
        insert_score_with(&conn, school_id, score)
    }

    async fn insert_scores_atomic(&self, school_id: i64, scores: &[ScoreRecord]) -> Result<()> {
        let mut conn = lock(&self.conn)?;
        let tx = conn.transaction()?;
        for score in scores {
            // Dropping `tx` on error rolls the school back
            insert_score_with(&tx, school_id, score)?;
        }
        tx.commit()?;
        Ok(())
    }

    async fn scores_for_school(&self, school_id: i64) -> Result<Vec<ScoreRecord>> {
        let conn = lock(&self.conn)?;
        let mut stmt = conn.prepare(
            r#"SELECT school_id, school_name, exam_type, year, schema_variant, headers, "values", source_url
               FROM score WHERE school_id = ?1 ORDER BY id"#,
        )?;
        let stored = stmt
            .query_map(params![school_id], |row| {
                Ok(StoredScore {
                    school_id: row.get(0)?,
                    school_name: row.get(1)?,
                    exam_type: row.get(2)?,
                    year: row.get(3)?,
                    schema_variant: row.get(4)?,
                    headers: row.get(5)?,
                    values: row.get(6)?,
                    source_url: row.get(7)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        stored.into_iter().map(StoredScore::into_record).collect()
    }

    async fn dashboard_rows(&self) -> Result<Vec<DashboardRow>> {
        let conn = lock(&self.conn)?;
        let mut stmt = conn.prepare(
            r#"SELECT si.id, si.name, si.province, si.type, si.category,
                      s.exam_type, s.year, s.schema_variant, s."values"
               FROM school_info si
               JOIN score s ON si.id = s.school_id
               ORDER BY si.name, s.exam_type, s.id"#,
        )?;
        let raw = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, Option<String>>(5)?,
                    row.get::<_, i32>(6)?,
                    row.get::<_, String>(7)?,
                    row.get::<_, String>(8)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        raw.into_iter()
            .map(
                |(school_id, school_name, province, school_type, category, exam_type, year, variant, values)|
                 -> Result<DashboardRow> {
                    let values: Vec<String> = serde_json::from_str(&values)?;
                    Ok(DashboardRow {
                        school_id,
                        school_name,
                        province,
                        school_type,
                        category,
                        exam_type,
                        year,
                        schema_variant: variant.parse()?,
                        fields: ScoreFields::from_values(&values),
                        values,
                    })
                },
            )
            .collect()
    }

    async fn counts(&self) -> Result<(usize, usize)> {
        let conn = lock(&self.conn)?;
        let schools: i64 = conn.query_row("SELECT COUNT(*) FROM school_info", [], |r| r.get(0))?;
        let scores: i64 = conn.query_row("SELECT COUNT(*) FROM score", [], |r| r.get(0))?;
        Ok((schools as usize, scores as usize))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn school() -> SchoolRecord {
        SchoolRecord {
            id: None,
            name: "武汉职业技术学院".to_string(),
            province: "湖北".to_string(),
            school_type: "公办".to_string(),
            category: "综合".to_string(),
            phone: "027-81234567".to_string(),
            address: "武汉市洪山区".to_string(),
            remarks: "单招".to_string(),
            dorm_link: None,
            score_link: Some("https://x/news/2015/score/1.html".to_string()),
        }
    }

    fn score(school_id: i64, exam_type: &str, cells: usize) -> ScoreRecord {
        let headers: Vec<String> = (0..cells).map(|i| format!("列{i}")).collect();
        let mut values: Vec<String> = (0..cells).map(|i| format!("{}", 100 + i)).collect();
        if let Some(first) = values.first_mut() {
            *first = exam_type.to_string();
        }
        ScoreRecord::new(
            school_id,
            "武汉职业技术学院",
            2025,
            SchemaVariant::RankAndCutoff,
            headers,
            values,
            "https://x/news/2015/score/1.html",
        )
        .unwrap()
    }

    #[tokio::test]
    async fn school_round_trips_by_generated_id() {
        let storage = SqliteStorage::open_in_memory().unwrap();
        let id = storage.insert_school(&school()).await.unwrap();
        let stored = storage.get_school(id).await.unwrap().unwrap();

        let mut expected = school();
        expected.id = Some(id);
        assert_eq!(stored, expected);
        assert!(storage.get_school(id + 1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn score_rows_keep_positional_arrays() {
        let storage = SqliteStorage::open_in_memory().unwrap();
        let id = storage.insert_school(&school()).await.unwrap();
        let row = score(id, "普通类", 8);
        storage.insert_score(id, &row).await.unwrap();

        let stored = storage.scores_for_school(id).await.unwrap();
        assert_eq!(stored, vec![row]);
        assert_eq!(stored[0].headers.len(), stored[0].values.len());
    }

    #[tokio::test]
    async fn score_requires_existing_school() {
        let storage = SqliteStorage::open_in_memory().unwrap();
        let err = storage.insert_score(41, &score(41, "普通类", 3)).await.unwrap_err();
        assert!(matches!(err, ScraperError::Database { .. }));
        assert_eq!(storage.counts().await.unwrap(), (0, 0));
    }

    #[tokio::test]
    async fn atomic_insert_rolls_back_whole_school() {
        let storage = SqliteStorage::open_in_memory().unwrap();
        let id = storage.insert_school(&school()).await.unwrap();
        let mut bad = score(id, "中职类", 3);
        bad.values.pop();
        let rows = vec![score(id, "普通类", 3), bad];

        assert!(storage.insert_scores_atomic(id, &rows).await.is_err());
        assert!(storage.scores_for_school(id).await.unwrap().is_empty());

        storage
            .insert_scores_atomic(id, &[score(id, "普通类", 3), score(id, "中职类", 3)])
            .await
            .unwrap();
        assert_eq!(storage.scores_for_school(id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn dashboard_rows_expose_named_slots() {
        let storage = SqliteStorage::open_in_memory().unwrap();
        let id = storage.insert_school(&school()).await.unwrap();
        storage.insert_score(id, &score(id, "普通类", 8)).await.unwrap();
        storage.insert_score(id, &score(id, "中职类", 3)).await.unwrap();

        let rows = storage.dashboard_rows().await.unwrap();
        assert_eq!(rows.len(), 2);
        // ordered by exam type within the school
        assert_eq!(rows[0].exam_type.as_deref(), Some("中职类"));
        assert_eq!(rows[0].fields.cutoff_score.as_deref(), Some("102"));
        assert_eq!(rows[0].fields.vocational_skill, None);
        assert_eq!(rows[1].fields.aptitude_test.as_deref(), Some("107"));
        assert_eq!(rows[1].province, "湖北");
    }

    #[tokio::test]
    async fn clear_all_data_empties_both_tables() {
        let storage = SqliteStorage::open_in_memory().unwrap();
        let id = storage.insert_school(&school()).await.unwrap();
        storage.insert_score(id, &score(id, "普通类", 3)).await.unwrap();
        storage.clear_all_data().unwrap();
        assert_eq!(storage.counts().await.unwrap(), (0, 0));
    }

    #[tokio::test]
    async fn file_database_persists_across_connections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("scores.db");
        let id = {
            let storage = SqliteStorage::open(&path).unwrap();
            storage.insert_school(&school()).await.unwrap()
        };
        let reopened = SqliteStorage::open(&path).unwrap();
        assert_eq!(reopened.get_school(id).await.unwrap().unwrap().name, "武汉职业技术学院");
    }
}
