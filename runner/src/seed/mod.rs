//! Seed orchestrator: resets and repopulates both databases before any case runs.
//!
//! Runs only when `ENABLE_DB_SEED` and `ENABLE_DB_CASES` are both set. Golden is seeded
//! first, then candidate, each over its own connection inside one transaction. Any failure
//! rolls that transaction back and aborts the run, as does cancellation of the run.

pub mod fixture;

use sqlx::{Connection, PgConnection, Postgres, Transaction};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::Config;
use fixture::{
    ACCURACY_ROWS, NAV_ROWS, SEED_FUND_CODE, SEED_FUND_ID, SEED_FUND_NAME, SEED_FUND_TYPE,
    TRUNCATE_SQL, UPSERT_ACCURACY_SQL, UPSERT_FUND_SQL, UPSERT_NAV_SQL,
};

#[derive(Debug, thiserror::Error)]
pub enum SeedError {
    #[error("database seeding is enabled but {} is not set", .missing.join(" and "))]
    MissingUrl { missing: Vec<&'static str> },
    #[error("[seed:{label}] {step}")]
    Target {
        label: &'static str,
        step: &'static str,
        #[source]
        source: sqlx::Error,
    },
    #[error("database seeding cancelled")]
    Cancelled,
}

/// One database to seed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbTarget {
    pub label: &'static str,
    pub url: String,
}

/// Which databases to seed, in order. Empty when seeding is disabled.
pub fn plan(config: &Config) -> Result<Vec<DbTarget>, SeedError> {
    if !config.seeding_enabled() {
        return Ok(Vec::new());
    }

    match (&config.golden_db_url, &config.candidate_db_url) {
        (Some(golden), Some(candidate)) => Ok(vec![
            DbTarget {
                label: "golden",
                url: golden.clone(),
            },
            DbTarget {
                label: "candidate",
                url: candidate.clone(),
            },
        ]),
        (golden, candidate) => {
            let mut missing = Vec::new();
            if golden.is_none() {
                missing.push("GOLDEN_DB_URL");
            }
            if candidate.is_none() {
                missing.push("CANDIDATE_DB_URL");
            }
            Err(SeedError::MissingUrl { missing })
        }
    }
}

/// Seed every planned database. A no-op when seeding is disabled.
pub async fn seed_databases(config: &Config) -> Result<(), SeedError> {
    let targets = plan(config)?;
    if targets.is_empty() {
        info!("[SEED] Seeding disabled");
        return Ok(());
    }

    for target in &targets {
        seed_one(target).await?;
    }
    Ok(())
}

/// [`seed_databases`], abandoned as soon as `cancel` fires. Dropping the in-flight seed
/// drops its connection; the open transaction is never committed.
pub async fn seed_databases_until(
    config: &Config,
    cancel: &CancellationToken,
) -> Result<(), SeedError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            warn!("[SEED] Seeding cancelled");
            Err(SeedError::Cancelled)
        }
        result = seed_databases(config) => result,
    }
}

struct StepFailed {
    step: &'static str,
    source: sqlx::Error,
}

fn at(step: &'static str) -> impl FnOnce(sqlx::Error) -> StepFailed {
    move |source| StepFailed { step, source }
}

/// Apply the fixture to one database. The connection is closed on every path.
pub async fn seed_one(target: &DbTarget) -> Result<(), SeedError> {
    info!("[SEED] Seeding {} database", target.label);

    let into_seed_error = |failed: StepFailed| SeedError::Target {
        label: target.label,
        step: failed.step,
        source: failed.source,
    };

    let mut conn = PgConnection::connect(&target.url)
        .await
        .map_err(at("connect"))
        .map_err(into_seed_error)?;

    let result = apply_fixture(&mut conn).await;

    if let Err(e) = conn.close().await {
        warn!("[SEED] Failed to close {} connection: {}", target.label, e);
    }

    result.map_err(into_seed_error)?;
    info!("[SEED] {} database seeded", target.label);
    Ok(())
}

async fn apply_fixture(conn: &mut PgConnection) -> Result<(), StepFailed> {
    let mut tx = conn.begin().await.map_err(at("begin transaction"))?;

    match fill(&mut tx).await {
        Ok(()) => tx.commit().await.map_err(at("commit")),
        Err(failed) => {
            if let Err(e) = tx.rollback().await {
                warn!("[SEED] Rollback failed: {}", e);
            }
            Err(failed)
        }
    }
}

async fn fill(tx: &mut Transaction<'_, Postgres>) -> Result<(), StepFailed> {
    sqlx::query(TRUNCATE_SQL)
        .execute(&mut **tx)
        .await
        .map_err(at("truncate business tables"))?;

    let fund_id: String = sqlx::query_scalar(UPSERT_FUND_SQL)
        .bind(SEED_FUND_ID)
        .bind(SEED_FUND_CODE)
        .bind(SEED_FUND_NAME)
        .bind(SEED_FUND_TYPE)
        .fetch_one(&mut **tx)
        .await
        .map_err(at("upsert seed fund"))?;

    for row in ACCURACY_ROWS.iter() {
        sqlx::query(UPSERT_ACCURACY_SQL)
            .bind(row.id)
            .bind(row.source_name)
            .bind(&fund_id)
            .bind(row.estimate_date)
            .bind(row.estimate_nav)
            .bind(row.actual_nav)
            .bind(row.error_rate)
            .execute(&mut **tx)
            .await
            .map_err(at("upsert estimate accuracy"))?;
    }

    for row in NAV_ROWS.iter() {
        sqlx::query(UPSERT_NAV_SQL)
            .bind(row.id)
            .bind(&fund_id)
            .bind(row.nav_date)
            .bind(row.unit_nav)
            .bind(row.accumulated_nav)
            .bind(row.daily_growth)
            .execute(&mut **tx)
            .await
            .map_err(at("upsert nav history"))?;
    }

    Ok(())
}
