//! C6: three cron-driven jobs, independent of the [`crate::orchestrator::Orchestrator`]
//! singleton but sharing its database pool (§4.6).

use std::time::Instant;

use chrono::{NaiveDate, Utc};
use serde::Serialize;
use sqlx::{PgPool, Postgres, Transaction};

use cruise_sql::maintenance::{
    self, CleanupCounts, CoverageStats, PortCoverage, RawStorageStats, StubCounts, StubRow,
};

#[derive(Debug, thiserror::Error)]
pub enum MaintenanceError {
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Clone, Serialize)]
pub struct PurgeReport {
    pub purged_count: u64,
    pub max_size_bytes: Option<i64>,
    pub oldest_expired_at: Option<chrono::DateTime<Utc>>,
    pub duration_ms: u128,
}

/// 03:00 job: delete expired `sync_raw` rows after recording before-stats.
pub async fn purge_raw_payloads(db: &PgPool) -> Result<PurgeReport, MaintenanceError> {
    let started = Instant::now();
    let before = maintenance::purge_before_stats(db).await?;
    let purged_count = maintenance::purge_expired_raw(db).await?;
    let report = PurgeReport {
        purged_count,
        max_size_bytes: before.max_size_bytes,
        oldest_expired_at: before.oldest_expired_at,
        duration_ms: started.elapsed().as_millis(),
    };
    tracing::info!(
        purged = report.purged_count,
        duration_ms = report.duration_ms,
        "raw payload purge complete"
    );
    Ok(report)
}

pub async fn storage_stats(db: &PgPool) -> Result<RawStorageStats, MaintenanceError> {
    Ok(maintenance::raw_storage_stats(db).await?)
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CleanupReport {
    pub cutoff: NaiveDate,
    pub counts: CleanupCounts,
    pub sailings_removed: usize,
    pub duration_ms: u128,
}

#[derive(Debug, Clone, Serialize)]
pub struct CleanupPreview {
    pub cutoff: NaiveDate,
    pub oldest_end_date: Option<NaiveDate>,
}

fn cutoff_for(days_buffer: i64) -> NaiveDate {
    Utc::now().date_naive() - chrono::Duration::days(days_buffer)
}

/// 04:00 job: delete every sailing whose `end_date` precedes `cutoff`, and
/// its dependent rows, each inside its own transaction (§4.6).
pub async fn cleanup_past_sailings(
    db: &PgPool,
    days_buffer: i64,
) -> Result<CleanupReport, MaintenanceError> {
    let started = Instant::now();
    let cutoff = cutoff_for(days_buffer);
    let candidates = maintenance::cleanup_candidates(db, cutoff).await?;

    let mut totals = CleanupCounts::default();
    let mut sailings_removed = 0usize;
    for candidate in &candidates {
        let mut txn: Transaction<'_, Postgres> = db.begin().await?;
        let counts = maintenance::delete_sailing_cascade(&mut txn, candidate).await?;
        txn.commit().await?;
        totals.sailing_regions += counts.sailing_regions;
        totals.sailing_stops += counts.sailing_stops;
        totals.sailing_cabin_prices += counts.sailing_cabin_prices;
        totals.sync_raw += counts.sync_raw;
        totals.sailings += counts.sailings;
        sailings_removed += 1;
    }

    let report = CleanupReport {
        cutoff,
        counts: totals,
        sailings_removed,
        duration_ms: started.elapsed().as_millis(),
    };
    tracing::info!(
        cutoff = %report.cutoff,
        sailings_removed = report.sailings_removed,
        duration_ms = report.duration_ms,
        "past-sailing cleanup complete"
    );
    Ok(report)
}

/// Reports what [`cleanup_past_sailings`] would remove, without deleting.
pub async fn preview_cleanup(
    db: &PgPool,
    days_buffer: i64,
) -> Result<CleanupPreview, MaintenanceError> {
    let cutoff = cutoff_for(days_buffer);
    let oldest_end_date = maintenance::oldest_candidate_end_date(db, cutoff).await?;
    Ok(CleanupPreview {
        cutoff,
        oldest_end_date,
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct StubReport {
    pub counts: StubCounts,
    pub oldest: Vec<StubRow>,
    pub port_coverage: PortCoverage,
}

/// 06:00 job: aggregate `needs_review` counts, the oldest five stub rows,
/// and port coordinate coverage (active vs. orphan).
pub async fn stub_report(db: &PgPool) -> Result<StubReport, MaintenanceError> {
    let counts = maintenance::needs_review_counts(db).await?;
    let oldest = maintenance::oldest_stub_rows(db).await?;
    let port_coverage = maintenance::port_coverage(db).await?;

    tracing::info!(
        cruise_lines = counts.cruise_lines,
        ships = counts.ships,
        ports = counts.ports,
        regions = counts.regions,
        "stub report"
    );
    for row in &oldest {
        tracing::info!(entity_type = %row.entity_type, name = %row.name, "oldest needs_review row");
    }

    Ok(StubReport {
        counts,
        oldest,
        port_coverage,
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct CoverageReport {
    pub ports: PortCoverage,
    #[serde(flatten)]
    pub rest: CoverageStats,
}

/// The coverage-stats endpoint's payload: port coordinate coverage plus
/// ship/cruise-line/region/sailing coverage (§4.6).
pub async fn coverage_report(db: &PgPool) -> Result<CoverageReport, MaintenanceError> {
    let ports = maintenance::port_coverage(db).await?;
    let rest = maintenance::coverage_stats(db).await?;
    Ok(CoverageReport { ports, rest })
}

/// Registers the three jobs against a scheduler in the given IANA timezone
/// (§4.6, §6.6); independent of the orchestrator's run-singleton.
pub async fn schedule(
    scheduler: &tokio_cron_scheduler::JobScheduler,
    db: PgPool,
    timezone: chrono_tz::Tz,
) -> Result<(), tokio_cron_scheduler::JobSchedulerError> {
    use tokio_cron_scheduler::Job;

    let purge_db = db.clone();
    scheduler
        .add(Job::new_async_tz("0 0 3 * * *", timezone, move |_uuid, _l| {
            let db = purge_db.clone();
            Box::pin(async move {
                if let Err(err) = purge_raw_payloads(&db).await {
                    tracing::error!(%err, "raw payload purge failed");
                }
            })
        })?)
        .await?;

    let cleanup_db = db.clone();
    scheduler
        .add(Job::new_async_tz("0 0 4 * * *", timezone, move |_uuid, _l| {
            let db = cleanup_db.clone();
            Box::pin(async move {
                if let Err(err) = cleanup_past_sailings(&db, 0).await {
                    tracing::error!(%err, "past-sailing cleanup failed");
                }
            })
        })?)
        .await?;

    let stub_db = db.clone();
    scheduler
        .add(Job::new_async_tz("0 0 6 * * *", timezone, move |_uuid, _l| {
            let db = stub_db.clone();
            Box::pin(async move {
                if let Err(err) = stub_report(&db).await {
                    tracing::error!(%err, "stub report failed");
                }
            })
        })?)
        .await?;

    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn cutoff_subtracts_days_buffer() {
        let today = Utc::now().date_naive();
        assert_eq!(cutoff_for(0), today);
        assert_eq!(cutoff_for(7), today - chrono::Duration::days(7));
    }
}
