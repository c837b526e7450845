use crate::apis::listing::ListingFetcher;
use crate::apis::score_table::{DetailOutcome, ScoreTableNormalizer};
use crate::app::ports::{HttpClientPort, RateLimiterPort};
use crate::config::ScraperConfig;
use crate::error::Result;
use crate::metrics::ScrapeMetrics;
use crate::storage::Storage;
use crate::types::{SchoolOutcome, SchoolRecord, ScoreRecord};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, info_span, instrument, warn, Instrument};
use uuid::Uuid;

/// Knobs for one scrape run.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub listing_url: String,
    pub detail_timeout: Duration,
    pub capture_year: i32,
    pub atomic_school_inserts: bool,
}

impl From<&ScraperConfig> for PipelineSettings {
    fn from(config: &ScraperConfig) -> Self {
        Self {
            listing_url: config.listing_url.clone(),
            detail_timeout: config.detail_timeout(),
            capture_year: config.capture_year,
            atomic_school_inserts: config.atomic_school_inserts,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SchoolReport {
    pub name: String,
    pub school_id: Option<i64>,
    pub outcome: SchoolOutcome,
}

/// Result of a complete pipeline run
#[derive(Debug, Clone, Serialize)]
pub struct PipelineResult {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub total_schools: usize,
    pub persisted: usize,
    pub no_score_link: usize,
    pub skipped_no_table: usize,
    pub skipped_fetch_failed: usize,
    pub persist_failed: usize,
    pub rows_accepted: usize,
    pub rows_skipped_shape_mismatch: usize,
    pub row_insert_failures: usize,
    pub schools: Vec<SchoolReport>,
}

impl PipelineResult {
    fn new(run_id: Uuid, started_at: DateTime<Utc>) -> Self {
        Self {
            run_id,
            started_at,
            finished_at: started_at,
            total_schools: 0,
            persisted: 0,
            no_score_link: 0,
            skipped_no_table: 0,
            skipped_fetch_failed: 0,
            persist_failed: 0,
            rows_accepted: 0,
            rows_skipped_shape_mismatch: 0,
            row_insert_failures: 0,
            schools: Vec::new(),
        }
    }

    fn record(&mut self, report: SchoolReport) {
        self.total_schools += 1;
        match &report.outcome {
            SchoolOutcome::Persisted {
                accepted,
                shape_mismatches,
                insert_failures,
            } => {
                self.persisted += 1;
                self.rows_accepted += accepted;
                self.rows_skipped_shape_mismatch += shape_mismatches;
                self.row_insert_failures += insert_failures;
            }
            SchoolOutcome::NoScoreLink => self.no_score_link += 1,
            SchoolOutcome::SkippedNoTable => self.skipped_no_table += 1,
            SchoolOutcome::SkippedFetchFailed { .. } => self.skipped_fetch_failed += 1,
            SchoolOutcome::PersistFailed { .. } => self.persist_failed += 1,
        }
        self.schools.push(report);
    }
}

/// Listing fetch, then per school: persist, fetch detail, normalize, persist rows.
pub struct ScrapePipeline {
    listing: ListingFetcher,
    normalizer: ScoreTableNormalizer,
    storage: Arc<dyn Storage>,
    limiter: Arc<dyn RateLimiterPort>,
    settings: PipelineSettings,
}

impl ScrapePipeline {
    pub fn new(
        http: Arc<dyn HttpClientPort>,
        storage: Arc<dyn Storage>,
        limiter: Arc<dyn RateLimiterPort>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            listing: ListingFetcher::new(http.clone()),
            normalizer: ScoreTableNormalizer::new(http, settings.detail_timeout, settings.capture_year),
            storage,
            limiter,
            settings,
        }
    }

    /// Uses `http` for detail pages only, e.g. a retrying client. The listing keeps
    /// the client given to `new`.
    pub fn with_detail_http(mut self, http: Arc<dyn HttpClientPort>) -> Self {
        self.normalizer = ScoreTableNormalizer::new(
            http,
            self.settings.detail_timeout,
            self.settings.capture_year,
        );
        self
    }

    /// Runs the whole scrape. Only a listing failure is returned as an error.
    pub async fn run(&self) -> Result<PipelineResult> {
        let run_id = Uuid::new_v4();
        let span = info_span!("scrape_run", %run_id);
        self.run_inner(run_id).instrument(span).await
    }

    async fn run_inner(&self, run_id: Uuid) -> Result<PipelineResult> {
        let mut result = PipelineResult::new(run_id, Utc::now());
        info!("🚀 Starting scrape of {}", self.settings.listing_url);

        let schools = self.listing.fetch(&self.settings.listing_url).await?;
        info!("📋 Listing has {} schools", schools.len());

        for (i, school) in schools.iter().enumerate() {
            // Politeness delay between schools
            self.limiter.acquire().await;
            debug!("Processing school {}/{}: {}", i + 1, schools.len(), school.name);
            let report = self.process_school(school).await;
            self.limiter.complete().await;
            ScrapeMetrics::record_school(&report.outcome);
            result.record(report);
        }

        result.finished_at = Utc::now();
        info!(
            "✅ Scrape finished: {} schools, {} persisted, {} rows accepted, {} rows skipped, {} row insert failures",
            result.total_schools,
            result.persisted,
            result.rows_accepted,
            result.rows_skipped_shape_mismatch,
            result.row_insert_failures
        );
        Ok(result)
    }

    /// Drives one school to a terminal state. Never fails the run.
    #[instrument(skip(self, school), fields(school = %school.name))]
    pub async fn process_school(&self, school: &SchoolRecord) -> SchoolReport {
        let report = |school_id: Option<i64>, outcome: SchoolOutcome| SchoolReport {
            name: school.name.clone(),
            school_id,
            outcome,
        };

        let school_id = match self.storage.insert_school(school).await {
            Ok(id) => id,
            Err(e) => {
                error!(error = %e, "Failed to persist school");
                return report(None, SchoolOutcome::PersistFailed { error: e.to_string() });
            }
        };

        let Some(detail_url) = school.score_link.as_deref() else {
            debug!("No score link; nothing to fetch");
            return report(Some(school_id), SchoolOutcome::NoScoreLink);
        };

        debug!(state = "fetching_detail", url = detail_url);
        let detail = match self
            .normalizer
            .normalize(detail_url, school_id, &school.name)
            .await
        {
            Ok(detail) => detail,
            Err(e) => {
                warn!(url = detail_url, kind = e.kind(), error = %e, "Skipping school: detail fetch failed");
                return report(
                    Some(school_id),
                    SchoolOutcome::SkippedFetchFailed { error: e.to_string() },
                );
            }
        };

        let (records, shape_mismatches) = match detail {
            DetailOutcome::NoTable => {
                warn!(url = detail_url, reason = "no_table", "Skipping school: no score table");
                return report(Some(school_id), SchoolOutcome::SkippedNoTable);
            }
            DetailOutcome::TooFewRows { rows } => {
                warn!(url = detail_url, reason = "too_few_rows", rows, "Skipping school: no score table");
                return report(Some(school_id), SchoolOutcome::SkippedNoTable);
            }
            DetailOutcome::Parsed {
                schema_variant,
                records,
                skipped,
            } => {
                debug!(state = "parsed", variant = %schema_variant, rows = records.len());
                (records, skipped.len())
            }
        };

        let outcome = self.persist_scores(school_id, &records, shape_mismatches).await;
        report(Some(school_id), outcome)
    }

    async fn persist_scores(
        &self,
        school_id: i64,
        records: &[ScoreRecord],
        shape_mismatches: usize,
    ) -> SchoolOutcome {
        if self.settings.atomic_school_inserts {
            return match self.storage.insert_scores_atomic(school_id, records).await {
                Ok(()) => {
                    ScrapeMetrics::record_rows_accepted(records.len());
                    info!("✅ Inserted {} score rows", records.len());
                    SchoolOutcome::Persisted {
                        accepted: records.len(),
                        shape_mismatches,
                        insert_failures: 0,
                    }
                }
                Err(e) => {
                    error!(error = %e, "Score insert rolled back");
                    SchoolOutcome::PersistFailed { error: e.to_string() }
                }
            };
        }

        // Row-at-a-time: a failed row is logged and the rest still go in
        let mut accepted = 0;
        let mut insert_failures = 0;
        let mut last_error = None;
        for (index, record) in records.iter().enumerate() {
            match self.storage.insert_score(school_id, record).await {
                Ok(()) => accepted += 1,
                Err(e) => {
                    insert_failures += 1;
                    ScrapeMetrics::record_row_insert_error();
                    error!(row = index, error = %e, "Failed to insert score row");
                    last_error = Some(e);
                }
            }
        }
        ScrapeMetrics::record_rows_accepted(accepted);
        if accepted == 0 {
            if let Some(e) = last_error {
                error!(insert_failures, "Every score row failed to insert");
                return SchoolOutcome::PersistFailed { error: e.to_string() };
            }
        }
        info!("✅ Inserted {} score rows ({} skipped)", accepted, shape_mismatches);
        SchoolOutcome::Persisted {
            accepted,
            shape_mismatches,
            insert_failures,
        }
    }
}
