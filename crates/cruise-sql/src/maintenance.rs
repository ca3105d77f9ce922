//! Queries backing the three maintenance jobs (§4.6): raw-payload purge,
//! past-sailing cleanup, and the stub/coverage report.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use sqlx::types::Uuid;
use sqlx::PgExecutor;

#[derive(Serialize, Debug, Clone, Default, sqlx::FromRow)]
pub struct RawStorageStats {
    pub total_records: i64,
    pub total_bytes: i64,
    pub avg_bytes: f64,
    pub max_bytes: i64,
    pub expired_count: i64,
    pub expiring_within_24h_count: i64,
}

pub async fn raw_storage_stats<'e, E: PgExecutor<'e>>(db: E) -> sqlx::Result<RawStorageStats> {
    sqlx::query_as::<_, RawStorageStats>(
        r#"
        select
            count(*) as total_records,
            coalesce(sum(octet_length(raw_data::text)), 0) as total_bytes,
            coalesce(avg(octet_length(raw_data::text)), 0.0) as avg_bytes,
            coalesce(max(octet_length(raw_data::text)), 0) as max_bytes,
            count(*) filter (where expires_at < now()) as expired_count,
            count(*) filter (where expires_at >= now() and expires_at < now() + interval '24 hours')
                as expiring_within_24h_count
        from catalog.sync_raw
        "#,
    )
    .fetch_one(db)
    .await
}

#[derive(Serialize, Debug, Clone, sqlx::FromRow)]
pub struct PurgeBeforeStats {
    pub expired_count: i64,
    pub max_size_bytes: Option<i64>,
    pub oldest_expired_at: Option<DateTime<Utc>>,
}

pub async fn purge_before_stats<'e, E: PgExecutor<'e>>(db: E) -> sqlx::Result<PurgeBeforeStats> {
    sqlx::query_as::<_, PurgeBeforeStats>(
        r#"
        select
            count(*) as expired_count,
            max(octet_length(raw_data::text)) as max_size_bytes,
            min(expires_at) as oldest_expired_at
        from catalog.sync_raw
        where expires_at < now()
        "#,
    )
    .fetch_one(db)
    .await
}

pub async fn purge_expired_raw<'e, E: PgExecutor<'e>>(db: E) -> sqlx::Result<u64> {
    let result = sqlx::query("delete from catalog.sync_raw where expires_at < now()")
        .execute(db)
        .await?;
    Ok(result.rows_affected())
}

#[derive(Serialize, Debug, Clone, Default, sqlx::FromRow)]
pub struct CleanupCounts {
    pub sailing_regions: i64,
    pub sailing_stops: i64,
    pub sailing_cabin_prices: i64,
    pub sync_raw: i64,
    pub sailings: i64,
}

#[derive(Serialize, Debug, Clone, sqlx::FromRow)]
pub struct CleanupCandidate {
    pub id: Uuid,
    pub provider: String,
    pub provider_identifier: String,
    pub end_date: NaiveDate,
}

pub async fn cleanup_candidates<'e, E: PgExecutor<'e>>(
    db: E,
    cutoff: NaiveDate,
) -> sqlx::Result<Vec<CleanupCandidate>> {
    sqlx::query_as::<_, CleanupCandidate>(
        r#"
        select id, provider, provider_identifier, end_date
        from catalog.sailings
        where end_date < $1
        "#,
    )
    .bind(cutoff)
    .fetch_all(db)
    .await
}

pub async fn oldest_candidate_end_date<'e, E: PgExecutor<'e>>(
    db: E,
    cutoff: NaiveDate,
) -> sqlx::Result<Option<NaiveDate>> {
    sqlx::query_scalar("select min(end_date) from catalog.sailings where end_date < $1")
        .bind(cutoff)
        .fetch_one(db)
        .await
}

/// Deletes one sailing and its children in the order specified by §4.6:
/// `SailingRegion`, `SailingStop`, `SailingCabinPrice`, `SyncRaw` (by
/// provider identifier), then `Sailing`.
pub async fn delete_sailing_cascade(
    txn: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    candidate: &CleanupCandidate,
) -> sqlx::Result<CleanupCounts> {
    let mut counts = CleanupCounts::default();

    counts.sailing_regions = sqlx::query("delete from catalog.sailing_regions where sailing_id = $1")
        .bind(candidate.id)
        .execute(&mut **txn)
        .await?
        .rows_affected() as i64;

    counts.sailing_stops = sqlx::query("delete from catalog.sailing_stops where sailing_id = $1")
        .bind(candidate.id)
        .execute(&mut **txn)
        .await?
        .rows_affected() as i64;

    counts.sailing_cabin_prices =
        sqlx::query("delete from catalog.sailing_cabin_prices where sailing_id = $1")
            .bind(candidate.id)
            .execute(&mut **txn)
            .await?
            .rows_affected() as i64;

    counts.sync_raw = sqlx::query("delete from catalog.sync_raw where provider_sailing_id = $1")
        .bind(&candidate.provider_identifier)
        .execute(&mut **txn)
        .await?
        .rows_affected() as i64;

    counts.sailings = sqlx::query("delete from catalog.sailings where id = $1")
        .bind(candidate.id)
        .execute(&mut **txn)
        .await?
        .rows_affected() as i64;

    Ok(counts)
}

#[derive(Serialize, Debug, Clone, Default, sqlx::FromRow)]
pub struct StubCounts {
    pub cruise_lines: i64,
    pub ships: i64,
    pub ports: i64,
    pub regions: i64,
}

pub async fn needs_review_counts<'e, E: PgExecutor<'e>>(db: E) -> sqlx::Result<StubCounts>
where
    E: Copy,
{
    let cruise_lines: i64 =
        sqlx::query_scalar("select count(*) from catalog.cruise_lines where needs_review = true")
            .fetch_one(db)
            .await?;
    let ships: i64 = sqlx::query_scalar("select count(*) from catalog.ships where needs_review = true")
        .fetch_one(db)
        .await?;
    let ports: i64 = sqlx::query_scalar("select count(*) from catalog.ports where needs_review = true")
        .fetch_one(db)
        .await?;
    let regions: i64 =
        sqlx::query_scalar("select count(*) from catalog.regions where needs_review = true")
            .fetch_one(db)
            .await?;
    Ok(StubCounts {
        cruise_lines,
        ships,
        ports,
        regions,
    })
}

#[derive(Serialize, Debug, Clone, sqlx::FromRow)]
pub struct StubRow {
    pub entity_type: String,
    pub name: String,
    pub created_at: Option<DateTime<Utc>>,
}

/// The five oldest `needs_review` rows across all four entity kinds,
/// oldest-created first.
pub async fn oldest_stub_rows<'e, E: PgExecutor<'e>>(db: E) -> sqlx::Result<Vec<StubRow>> {
    sqlx::query_as::<_, StubRow>(
        r#"
        select entity_type, name, created_at from (
            select 'cruise_line' as entity_type, name, created_at from catalog.cruise_lines where needs_review = true
            union all
            select 'ship', name, created_at from catalog.ships where needs_review = true
            union all
            select 'port', name, created_at from catalog.ports where needs_review = true
            union all
            select 'region', name, created_at from catalog.regions where needs_review = true
        ) as stubs
        order by created_at asc nulls last
        limit 5
        "#,
    )
    .fetch_all(db)
    .await
}

#[derive(Serialize, Debug, Clone, Default, sqlx::FromRow)]
pub struct PortCoverage {
    pub total: i64,
    pub active: i64,
    pub with_coordinates: i64,
    pub needs_review: i64,
}

/// A port is "active" iff referenced by at least one `sailing_stops` row;
/// all others are "orphan" (§4.6).
pub async fn port_coverage<'e, E: PgExecutor<'e>>(db: E) -> sqlx::Result<PortCoverage>
where
    E: Copy,
{
    let total: i64 = sqlx::query_scalar("select count(*) from catalog.ports")
        .fetch_one(db)
        .await?;
    let active: i64 = sqlx::query_scalar(
        "select count(distinct port_id) from catalog.sailing_stops where port_id is not null",
    )
    .fetch_one(db)
    .await?;
    let with_coordinates: i64 =
        sqlx::query_scalar("select count(*) from catalog.ports where metadata->>'latitude' is not null")
            .fetch_one(db)
            .await?;
    let needs_review: i64 =
        sqlx::query_scalar("select count(*) from catalog.ports where needs_review = true")
            .fetch_one(db)
            .await?;
    Ok(PortCoverage {
        total,
        active,
        with_coordinates,
        needs_review,
    })
}

#[derive(Serialize, Debug, Clone, Default, sqlx::FromRow)]
pub struct CoverageStats {
    pub ships_with_image: i64,
    pub ships_with_deck_plans: i64,
    pub ships_needs_review: i64,
    pub cruise_lines_with_logo: i64,
    pub cruise_lines_needs_review: i64,
    pub regions_total: i64,
    pub regions_needs_review: i64,
    pub sailings_total: i64,
    pub sailings_active_future: i64,
}

pub async fn coverage_stats<'e, E: PgExecutor<'e>>(db: E) -> sqlx::Result<CoverageStats>
where
    E: Copy,
{
    let ships_with_image: i64 =
        sqlx::query_scalar("select count(*) from catalog.ships where image_url is not null")
            .fetch_one(db)
            .await?;
    let ships_with_deck_plans: i64 = sqlx::query_scalar(
        "select count(distinct ship_id) from catalog.ship_decks where deck_plan_url is not null",
    )
    .fetch_one(db)
    .await?;
    let ships_needs_review: i64 =
        sqlx::query_scalar("select count(*) from catalog.ships where needs_review = true")
            .fetch_one(db)
            .await?;
    let cruise_lines_with_logo: i64 = sqlx::query_scalar(
        "select count(*) from catalog.cruise_lines where metadata->>'logo_url' is not null",
    )
    .fetch_one(db)
    .await?;
    let cruise_lines_needs_review: i64 =
        sqlx::query_scalar("select count(*) from catalog.cruise_lines where needs_review = true")
            .fetch_one(db)
            .await?;
    let regions_total: i64 = sqlx::query_scalar("select count(*) from catalog.regions")
        .fetch_one(db)
        .await?;
    let regions_needs_review: i64 =
        sqlx::query_scalar("select count(*) from catalog.regions where needs_review = true")
            .fetch_one(db)
            .await?;
    let sailings_total: i64 = sqlx::query_scalar("select count(*) from catalog.sailings")
        .fetch_one(db)
        .await?;
    let sailings_active_future: i64 =
        sqlx::query_scalar("select count(*) from catalog.sailings where end_date >= current_date")
            .fetch_one(db)
            .await?;
    Ok(CoverageStats {
        ships_with_image,
        ships_with_deck_plans,
        ships_needs_review,
        cruise_lines_with_logo,
        cruise_lines_needs_review,
        regions_total,
        regions_needs_review,
        sailings_total,
        sailings_active_future,
    })
}
