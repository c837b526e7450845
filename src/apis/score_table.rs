//! Score-detail table normalization.
//!
//! Detail pages come in two layouts and with either one or two header rows. The
//! header shape is inferred from cell counts alone, the layout from marker labels,
//! and every data row must match the header width to be kept.

use super::html::{cell_text, selector};
use crate::app::ports::HttpClientPort;
use crate::constants::{CUTOFF_LINE_MARKER, RANK_MARKER};
use crate::error::Result;
use crate::infra::encoding::decode_utf8;
use crate::metrics::ScrapeMetrics;
use crate::types::{SchemaVariant, ScoreRecord};
use scraper::Html;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, instrument, warn};

/// Number of leading rows that form the header.
///
/// A first row narrower than the second means its cells were merged across two
/// rows, so both rows belong to the header.
pub fn header_row_count(first_row_cells: usize, second_row_cells: usize) -> usize {
    if first_row_cells < second_row_cells {
        2
    } else {
        1
    }
}

pub fn classify_schema(headers: &[String]) -> SchemaVariant {
    if headers
        .iter()
        .any(|h| h == RANK_MARKER || h == CUTOFF_LINE_MARKER)
    {
        SchemaVariant::RankAndCutoff
    } else {
        SchemaVariant::RawScoreBreakdown
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedRow {
    /// Index of the row within the table, header rows included.
    pub row_index: usize,
    pub expected: usize,
    pub found: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedTable {
    pub header_rows: usize,
    pub headers: Vec<String>,
    pub schema_variant: SchemaVariant,
    pub rows: Vec<Vec<String>>,
    pub skipped: Vec<SkippedRow>,
}

impl NormalizedTable {
    pub fn into_records(
        self,
        school_id: i64,
        school_name: &str,
        source_url: &str,
        year: i32,
    ) -> Result<Vec<ScoreRecord>> {
        let NormalizedTable {
            headers,
            schema_variant,
            rows,
            ..
        } = self;
        rows.into_iter()
            .map(|values| {
                ScoreRecord::new(
                    school_id,
                    school_name,
                    year,
                    schema_variant,
                    headers.clone(),
                    values,
                    source_url,
                )
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableParse {
    NoTable,
    TooFewRows { rows: usize },
    Parsed(NormalizedTable),
}

/// Parses the first table of a detail page.
pub fn parse_score_table(html: &str) -> Result<TableParse> {
    let document = Html::parse_document(html);
    let table_sel = selector("table")?;
    let row_sel = selector("tr")?;
    let any_cell_sel = selector("td, th")?;
    let data_cell_sel = selector("td")?;

    let Some(table) = document.select(&table_sel).next() else {
        return Ok(TableParse::NoTable);
    };
    let rows: Vec<_> = table.select(&row_sel).collect();
    if rows.len() < 2 {
        return Ok(TableParse::TooFewRows { rows: rows.len() });
    }

    let width = |i: usize| rows[i].select(&any_cell_sel).count();
    let header_rows = header_row_count(width(0), width(1));
    // The last header row carries the per-column labels
    let headers: Vec<String> = rows[header_rows - 1]
        .select(&any_cell_sel)
        .map(|c| cell_text(&c))
        .collect();
    let schema_variant = classify_schema(&headers);

    let mut kept = Vec::new();
    let mut skipped = Vec::new();
    for (row_index, row) in rows.iter().enumerate().skip(header_rows) {
        let values: Vec<String> = row.select(&data_cell_sel).map(|c| cell_text(&c)).collect();
        if values.len() != headers.len() {
            skipped.push(SkippedRow {
                row_index,
                expected: headers.len(),
                found: values.len(),
            });
            continue;
        }
        kept.push(values);
    }

    Ok(TableParse::Parsed(NormalizedTable {
        header_rows,
        headers,
        schema_variant,
        rows: kept,
        skipped,
    }))
}

/// What happened to one school's detail page.
#[derive(Debug)]
pub enum DetailOutcome {
    NoTable,
    TooFewRows { rows: usize },
    Parsed {
        schema_variant: SchemaVariant,
        records: Vec<ScoreRecord>,
        skipped: Vec<SkippedRow>,
    },
}

pub struct ScoreTableNormalizer {
    http: Arc<dyn HttpClientPort>,
    timeout: Duration,
    capture_year: i32,
}

impl ScoreTableNormalizer {
    pub fn new(http: Arc<dyn HttpClientPort>, timeout: Duration, capture_year: i32) -> Self {
        Self {
            http,
            timeout,
            capture_year,
        }
    }

    /// Fetches and normalizes one detail page. Errors are network failures only.
    #[instrument(skip(self))]
    pub async fn normalize(
        &self,
        detail_url: &str,
        school_id: i64,
        school_name: &str,
    ) -> Result<DetailOutcome> {
        let started = Instant::now();
        let resp = self.http.get(detail_url, Some(self.timeout)).await?;
        ScrapeMetrics::record_detail_fetch(started.elapsed().as_secs_f64(), resp.bytes.len());

        // Detail pages are UTF-8 even though the listing is not
        let html = decode_utf8(&resp.bytes);
        let table = match parse_score_table(&html)? {
            TableParse::NoTable => return Ok(DetailOutcome::NoTable),
            TableParse::TooFewRows { rows } => return Ok(DetailOutcome::TooFewRows { rows }),
            TableParse::Parsed(table) => table,
        };

        debug!(
            header_rows = table.header_rows,
            columns = table.headers.len(),
            variant = %table.schema_variant,
            "Resolved table header"
        );
        for row in &table.skipped {
            warn!(
                school = school_name,
                url = detail_url,
                row = row.row_index,
                expected = row.expected,
                found = row.found,
                "Dropping row with mismatched cell count"
            );
            ScrapeMetrics::record_row_skipped("shape_mismatch");
        }

        let schema_variant = table.schema_variant;
        let skipped = table.skipped.clone();
        let records = table.into_records(school_id, school_name, detail_url, self.capture_year)?;
        Ok(DetailOutcome::Parsed {
            schema_variant,
            records,
            skipped,
        })
    }
}
