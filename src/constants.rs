/// Site and table constants for the vocational admission listing.

// Listing page that enumerates every school
pub const DEFAULT_LISTING_URL: &str = "https://www.hbdzxx.com/news/2015/1.html";

// The site blocks obvious non-browser clients
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36";

pub const DEFAULT_DATABASE_PATH: &str = "data/independent_enrollment.db";

pub const DEFAULT_DELAY_MS: u64 = 1000;
pub const DEFAULT_DETAIL_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_DETAIL_RETRIES: u32 = 2;
pub const DEFAULT_RETRY_BACKOFF_MS: u64 = 500;

/// Year stamped on every score row of a run. Not read from the page.
pub const CAPTURE_YEAR: i32 = 2025;

// Listing table layout
pub const LISTING_MIN_COLUMNS: usize = 9;
pub const COL_NAME: usize = 0;
pub const COL_PROVINCE: usize = 1;
pub const COL_TYPE: usize = 2;
pub const COL_CATEGORY: usize = 3;
pub const COL_PHONE: usize = 4;
pub const COL_ADDRESS: usize = 5;
pub const COL_REMARKS: usize = 6;
pub const COL_DORM_LINK: usize = 7;
pub const COL_SCORE_LINK: usize = 8;

// Header labels that mark the rank-and-cutoff layout
pub const RANK_MARKER: &str = "位次";
pub const CUTOFF_LINE_MARKER: &str = "控制线";

// Positions inside `values` the dashboard reads by index
pub const POS_CUTOFF_SCORE: usize = 2;
pub const POS_VOCATIONAL_SKILL: usize = 3;
pub const POS_LANGUAGE: usize = 4;
pub const POS_MATH: usize = 5;
pub const POS_MAJOR_FOUNDATION: usize = 6;
pub const POS_APTITUDE_TEST: usize = 7;
