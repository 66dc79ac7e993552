//! Fixed-identity rows installed into both databases before a run.
//!
//! Every row is keyed by a literal UUID plus its natural key, and every write is an upsert
//! on that natural key, so applying the fixture twice leaves the same rows behind.

use chrono::NaiveDate;

pub const SEED_FUND_ID: &str = "11111111-1111-1111-1111-111111111111";
pub const SEED_FUND_CODE: &str = "000001";
pub const SEED_FUND_NAME: &str = "Seed Fund (contract-tests)";
pub const SEED_FUND_TYPE: &str = "SEED";

/// `query_nav` for the seed fund on this date (before 15:00) resolves to the previous NAV.
pub const QUERY_NAV_DATE: &str = "2026-02-12";
pub const QUERY_NAV_EXPECTED_NAV_DATE: &str = "2026-02-11";

/// Window covering the seeded March NAV rows.
pub const NAV_WINDOW_START: &str = "2026-03-10";
pub const NAV_WINDOW_END: &str = "2026-03-11";

/// Minimum `days` window for accuracy queries.
pub const MIN_ACCURACY_WINDOW_DAYS: i64 = 100;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AccuracyRow {
    pub id: &'static str,
    pub source_name: &'static str,
    pub estimate_date: &'static str,
    pub estimate_nav: &'static str,
    pub actual_nav: &'static str,
    pub error_rate: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NavRow {
    pub id: &'static str,
    pub nav_date: &'static str,
    pub unit_nav: &'static str,
    pub accumulated_nav: &'static str,
    pub daily_growth: &'static str,
}

pub const ACCURACY_ROWS: [AccuracyRow; 4] = [
    AccuracyRow {
        id: "22222222-2222-2222-2222-222222222222",
        source_name: "eastmoney",
        estimate_date: "2026-02-10",
        estimate_nav: "1.0000",
        actual_nav: "1.0000",
        error_rate: "0.018066",
    },
    AccuracyRow {
        id: "33333333-3333-3333-3333-333333333333",
        source_name: "eastmoney",
        estimate_date: "2026-02-11",
        estimate_nav: "1.0000",
        actual_nav: "1.0000",
        error_rate: "0.018067",
    },
    AccuracyRow {
        id: "44444444-4444-4444-4444-444444444444",
        source_name: "tiantian",
        estimate_date: "2026-02-10",
        estimate_nav: "1.0000",
        actual_nav: "1.0000",
        error_rate: "0.012000",
    },
    AccuracyRow {
        id: "55555555-5555-5555-5555-555555555555",
        source_name: "tiantian",
        estimate_date: "2026-02-11",
        estimate_nav: "1.0000",
        actual_nav: "1.0000",
        error_rate: "0.013000",
    },
];

pub const NAV_ROWS: [NavRow; 4] = [
    NavRow {
        id: "66666666-6666-6666-6666-666666666666",
        nav_date: "2026-02-10",
        unit_nav: "1.0000",
        accumulated_nav: "1.0000",
        daily_growth: "0.0000",
    },
    NavRow {
        id: "77777777-7777-7777-7777-777777777777",
        nav_date: "2026-02-11",
        unit_nav: "1.0100",
        accumulated_nav: "1.0100",
        daily_growth: "1.0000",
    },
    NavRow {
        id: "88888888-8888-8888-8888-888888888888",
        nav_date: "2026-03-10",
        unit_nav: "1.0200",
        accumulated_nav: "1.0200",
        daily_growth: "0.9901",
    },
    NavRow {
        id: "99999999-9999-9999-9999-999999999999",
        nav_date: "2026-03-11",
        unit_nav: "1.0300",
        accumulated_nav: "1.0300",
        daily_growth: "0.9804",
    },
];

/// Clears funds (cascading to accuracy, NAV history, positions, operations and watchlist
/// items) plus user-owned accounts and watchlists. User tables are kept.
pub const TRUNCATE_SQL: &str = "TRUNCATE TABLE fund, account, watchlist CASCADE";

pub const UPSERT_FUND_SQL: &str = r#"
    INSERT INTO fund (id, fund_code, fund_name, fund_type, created_at, updated_at)
    VALUES ($1::uuid, $2, $3, $4, NOW(), NOW())
    ON CONFLICT (fund_code) DO UPDATE SET
        fund_name = EXCLUDED.fund_name,
        fund_type = EXCLUDED.fund_type,
        updated_at = NOW()
    RETURNING id::text
"#;

pub const UPSERT_ACCURACY_SQL: &str = r#"
    INSERT INTO estimate_accuracy
        (id, source_name, fund_id, estimate_date, estimate_nav, actual_nav, error_rate, created_at)
    VALUES
        ($1::uuid, $2, $3::uuid, $4::date, $5::numeric, $6::numeric, $7::numeric, NOW())
    ON CONFLICT (source_name, fund_id, estimate_date) DO UPDATE SET
        estimate_nav = EXCLUDED.estimate_nav,
        actual_nav = EXCLUDED.actual_nav,
        error_rate = EXCLUDED.error_rate
"#;

pub const UPSERT_NAV_SQL: &str = r#"
    INSERT INTO fund_nav_history
        (id, fund_id, nav_date, unit_nav, accumulated_nav, daily_growth, created_at, updated_at)
    VALUES
        ($1::uuid, $2::uuid, $3::date, $4::numeric, $5::numeric, $6::numeric, NOW(), NOW())
    ON CONFLICT (fund_id, nav_date) DO UPDATE SET
        unit_nav = EXCLUDED.unit_nav,
        accumulated_nav = EXCLUDED.accumulated_nav,
        daily_growth = EXCLUDED.daily_growth,
        updated_at = NOW()
"#;

/// Mean seeded error rate for one source, `None` when the source has no rows.
pub fn expected_avg_error_rate(source_name: &str) -> Option<f64> {
    let rates: Vec<f64> = ACCURACY_ROWS
        .iter()
        .filter(|row| row.source_name == source_name)
        .filter_map(|row| row.error_rate.parse::<f64>().ok())
        .collect();
    if rates.is_empty() {
        return None;
    }
    Some(rates.iter().sum::<f64>() / rates.len() as f64)
}

/// Seeded rows for one source.
pub fn accuracy_record_count(source_name: &str) -> usize {
    ACCURACY_ROWS
        .iter()
        .filter(|row| row.source_name == source_name)
        .count()
}

/// Distinct seeded sources, sorted.
pub fn seeded_sources() -> Vec<&'static str> {
    let mut sources: Vec<&'static str> = ACCURACY_ROWS.iter().map(|row| row.source_name).collect();
    sources.sort_unstable();
    sources.dedup();
    sources
}

/// `days` window that still reaches the oldest accuracy row as seen from `today`.
pub fn accuracy_window_days(today: NaiveDate) -> i64 {
    let oldest = ACCURACY_ROWS
        .iter()
        .filter_map(|row| NaiveDate::parse_from_str(row.estimate_date, "%Y-%m-%d").ok())
        .min();
    match oldest {
        Some(oldest) => MIN_ACCURACY_WINDOW_DAYS.max((today - oldest).num_days() + 1),
        None => MIN_ACCURACY_WINDOW_DAYS,
    }
}
