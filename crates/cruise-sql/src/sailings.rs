//! Sailing rows and their children: stops, cabin types/images, prices,
//! alternates, and the raw-payload mirror.

use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;
use sqlx::types::Uuid;
use sqlx::{PgExecutor, Postgres, Transaction};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SailingRow {
    pub id: Uuid,
    pub is_new: bool,
}

pub struct UpsertSailing<'a> {
    pub provider: &'a str,
    pub provider_identifier: &'a str,
    pub ship_id: Uuid,
    pub cruise_line_id: Uuid,
    pub embark_port_id: Uuid,
    pub disembark_port_id: Uuid,
    pub name: &'a str,
    pub sail_date: NaiveDate,
    pub end_date: NaiveDate,
    pub nights: i32,
    pub sea_days: Option<i32>,
    pub voyage_code: Option<&'a str>,
    pub market_id: Option<&'a str>,
    pub no_fly: bool,
    pub depart_uk: bool,
    pub embark_port_name: &'a str,
    pub disembark_port_name: &'a str,
    pub metadata: Value,
}

/// Upserts by `(provider, provider_identifier)`. `is_new` is true iff no
/// prior row existed; detected via `xmax = 0` on the upserted row, the
/// standard Postgres idiom for "was this an insert".
pub async fn upsert_sailing(
    txn: &mut Transaction<'_, Postgres>,
    s: &UpsertSailing<'_>,
) -> sqlx::Result<SailingRow> {
    sqlx::query_as::<_, SailingRow>(
        r#"
        insert into catalog.sailings
            (id, provider, provider_identifier, ship_id, cruise_line_id,
             embark_port_id, disembark_port_id, name, sail_date, end_date,
             nights, sea_days, voyage_code, market_id, no_fly, depart_uk,
             embark_port_name, disembark_port_name, metadata, last_synced_at)
        values
            (gen_random_uuid(), $1, $2, $3, $4, $5, $6, $7, $8, $9,
             $10, $11, $12, $13, $14, $15, $16, $17, $18, now())
        on conflict (provider, provider_identifier) do update set
            ship_id = excluded.ship_id,
            cruise_line_id = excluded.cruise_line_id,
            embark_port_id = excluded.embark_port_id,
            disembark_port_id = excluded.disembark_port_id,
            name = excluded.name,
            sail_date = excluded.sail_date,
            end_date = excluded.end_date,
            nights = excluded.nights,
            sea_days = excluded.sea_days,
            voyage_code = excluded.voyage_code,
            market_id = excluded.market_id,
            no_fly = excluded.no_fly,
            depart_uk = excluded.depart_uk,
            embark_port_name = excluded.embark_port_name,
            disembark_port_name = excluded.disembark_port_name,
            metadata = excluded.metadata,
            last_synced_at = now()
        returning id, (xmax = 0) as is_new
        "#,
    )
    .bind(s.provider)
    .bind(s.provider_identifier)
    .bind(s.ship_id)
    .bind(s.cruise_line_id)
    .bind(s.embark_port_id)
    .bind(s.disembark_port_id)
    .bind(s.name)
    .bind(s.sail_date)
    .bind(s.end_date)
    .bind(s.nights)
    .bind(s.sea_days)
    .bind(s.voyage_code)
    .bind(s.market_id)
    .bind(s.no_fly)
    .bind(s.depart_uk)
    .bind(s.embark_port_name)
    .bind(s.disembark_port_name)
    .bind(&s.metadata)
    .fetch_one(&mut **txn)
    .await
}

pub async fn set_primary_region(
    txn: &mut Transaction<'_, Postgres>,
    sailing_id: Uuid,
    region_id: Uuid,
) -> sqlx::Result<()> {
    sqlx::query(
        r#"
        insert into catalog.sailing_regions (sailing_id, region_id, is_primary)
        values ($1, $2, true)
        on conflict (sailing_id, region_id) do nothing
        "#,
    )
    .bind(sailing_id)
    .bind(region_id)
    .execute(&mut **txn)
    .await?;
    Ok(())
}

pub struct StopInsert {
    pub port_id: Option<Uuid>,
    pub port_name: String,
    pub is_sea_day: bool,
    pub day_number: i32,
    pub sequence_order: i32,
    pub arrival_time: Option<String>,
    pub departure_time: Option<String>,
}

pub async fn replace_stops(
    txn: &mut Transaction<'_, Postgres>,
    sailing_id: Uuid,
    stops: &[StopInsert],
) -> sqlx::Result<()> {
    sqlx::query("delete from catalog.sailing_stops where sailing_id = $1")
        .bind(sailing_id)
        .execute(&mut **txn)
        .await?;

    for stop in stops {
        sqlx::query(
            r#"
            insert into catalog.sailing_stops
                (id, sailing_id, port_id, port_name, is_sea_day, day_number,
                 sequence_order, arrival_time, departure_time)
            values (gen_random_uuid(), $1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(sailing_id)
        .bind(stop.port_id)
        .bind(&stop.port_name)
        .bind(stop.is_sea_day)
        .bind(stop.day_number)
        .bind(stop.sequence_order)
        .bind(&stop.arrival_time)
        .bind(&stop.departure_time)
        .execute(&mut **txn)
        .await?;
    }
    Ok(())
}

pub async fn set_cheapest_prices(
    txn: &mut Transaction<'_, Postgres>,
    sailing_id: Uuid,
    inside_cents: Option<i64>,
    outside_cents: Option<i64>,
    balcony_cents: Option<i64>,
    suite_cents: Option<i64>,
) -> sqlx::Result<()> {
    sqlx::query(
        r#"
        update catalog.sailings
        set cheapest_inside_cents = $2,
            cheapest_outside_cents = $3,
            cheapest_balcony_cents = $4,
            cheapest_suite_cents = $5
        where id = $1
        "#,
    )
    .bind(sailing_id)
    .bind(inside_cents)
    .bind(outside_cents)
    .bind(balcony_cents)
    .bind(suite_cents)
    .execute(&mut **txn)
    .await?;
    Ok(())
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ShipCabinTypeRow {
    pub id: Uuid,
    pub ship_id: Uuid,
    pub cabin_code: String,
    pub cabin_category: String,
}

pub async fn ship_has_cabin_types<'e, E: PgExecutor<'e>>(db: E, ship_id: Uuid) -> sqlx::Result<bool> {
    let count: i64 =
        sqlx::query_scalar("select count(*) from catalog.ship_cabin_types where ship_id = $1")
            .bind(ship_id)
            .fetch_one(db)
            .await?;
    Ok(count > 0)
}

pub async fn ship_has_deck_rows<'e, E: PgExecutor<'e>>(db: E, ship_id: Uuid) -> sqlx::Result<bool> {
    let count: i64 = sqlx::query_scalar("select count(*) from catalog.ship_decks where ship_id = $1")
        .bind(ship_id)
        .fetch_one(db)
        .await?;
    Ok(count > 0)
}

pub async fn any_cabin_type_has_images<'e, E: PgExecutor<'e>>(
    db: E,
    ship_id: Uuid,
) -> sqlx::Result<bool> {
    let count: i64 = sqlx::query_scalar(
        r#"
        select count(*)
        from catalog.cabin_images ci
        join catalog.ship_cabin_types ct on ct.id = ci.ship_cabin_type_id
        where ct.ship_id = $1
        "#,
    )
    .bind(ship_id)
    .fetch_one(db)
    .await?;
    Ok(count > 0)
}

pub struct CabinTypeInsert<'a> {
    pub cabin_code: &'a str,
    pub cabin_category: &'a str,
    pub name: &'a str,
    pub description: Option<&'a str>,
    pub image_url: Option<&'a str>,
    pub metadata: Value,
}

pub async fn insert_cabin_type(
    txn: &mut Transaction<'_, Postgres>,
    ship_id: Uuid,
    c: &CabinTypeInsert<'_>,
) -> sqlx::Result<Uuid> {
    let id: Uuid = sqlx::query_scalar(
        r#"
        insert into catalog.ship_cabin_types
            (id, ship_id, cabin_code, cabin_category, name, description, image_url, metadata)
        values (gen_random_uuid(), $1, $2, $3, $4, $5, $6, $7)
        on conflict (ship_id, cabin_code) do update set cabin_code = excluded.cabin_code
        returning id
        "#,
    )
    .bind(ship_id)
    .bind(c.cabin_code)
    .bind(c.cabin_category)
    .bind(c.name)
    .bind(c.description)
    .bind(c.image_url)
    .bind(&c.metadata)
    .fetch_one(&mut **txn)
    .await?;
    Ok(id)
}

pub async fn find_cabin_type<'e, E: PgExecutor<'e>>(
    db: E,
    ship_id: Uuid,
    cabin_code: &str,
) -> sqlx::Result<Option<ShipCabinTypeRow>> {
    sqlx::query_as::<_, ShipCabinTypeRow>(
        r#"
        select id, ship_id, cabin_code, cabin_category
        from catalog.ship_cabin_types
        where ship_id = $1 and cabin_code = $2
        "#,
    )
    .bind(ship_id)
    .bind(cabin_code)
    .fetch_optional(db)
    .await
}

pub struct CabinImageInsert<'a> {
    pub image_url: &'a str,
    pub hd_url: Option<&'a str>,
    pub k2_url: Option<&'a str>,
    pub caption: Option<&'a str>,
    pub display_order: i32,
    pub is_default: bool,
}

pub async fn insert_cabin_image(
    txn: &mut Transaction<'_, Postgres>,
    ship_cabin_type_id: Uuid,
    img: &CabinImageInsert<'_>,
) -> sqlx::Result<()> {
    sqlx::query(
        r#"
        insert into catalog.cabin_images
            (id, ship_cabin_type_id, image_url, hd_url, k2_url, caption, display_order, is_default)
        values (gen_random_uuid(), $1, $2, $3, $4, $5, $6, $7)
        on conflict do nothing
        "#,
    )
    .bind(ship_cabin_type_id)
    .bind(img.image_url)
    .bind(img.hd_url)
    .bind(img.k2_url)
    .bind(img.caption)
    .bind(img.display_order)
    .bind(img.is_default)
    .execute(&mut **txn)
    .await?;
    Ok(())
}

pub struct CabinPriceInsert<'a> {
    pub cabin_code: &'a str,
    pub cabin_category: &'a str,
    pub occupancy: i32,
    pub base_price_cents: i64,
    pub taxes_cents: i64,
    pub original_currency: &'a str,
    pub original_amount_cents: i64,
    pub is_per_person: bool,
}

pub async fn replace_cabin_prices(
    txn: &mut Transaction<'_, Postgres>,
    sailing_id: Uuid,
    prices: &[CabinPriceInsert<'_>],
) -> sqlx::Result<()> {
    sqlx::query("delete from catalog.sailing_cabin_prices where sailing_id = $1")
        .bind(sailing_id)
        .execute(&mut **txn)
        .await?;

    for p in prices {
        sqlx::query(
            r#"
            insert into catalog.sailing_cabin_prices
                (id, sailing_id, cabin_code, cabin_category, occupancy, base_price_cents,
                 taxes_cents, original_currency, original_amount_cents, is_per_person)
            values (gen_random_uuid(), $1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(sailing_id)
        .bind(p.cabin_code)
        .bind(p.cabin_category)
        .bind(p.occupancy)
        .bind(p.base_price_cents)
        .bind(p.taxes_cents)
        .bind(p.original_currency)
        .bind(p.original_amount_cents)
        .bind(p.is_per_person)
        .execute(&mut **txn)
        .await?;
    }
    Ok(())
}

pub struct AlternateSailingInsert<'a> {
    pub provider: &'a str,
    pub alternate_provider_identifier: &'a str,
    pub alternate_sail_date: Option<NaiveDate>,
    pub alternate_nights: Option<i32>,
    pub alternate_lead_price_cents: Option<i64>,
}

pub async fn insert_alternate_sailing(
    txn: &mut Transaction<'_, Postgres>,
    sailing_id: Uuid,
    alt: &AlternateSailingInsert<'_>,
) -> sqlx::Result<()> {
    sqlx::query(
        r#"
        insert into catalog.alternate_sailings
            (id, sailing_id, provider, alternate_provider_identifier, alternate_sailing_id,
             alternate_sail_date, alternate_nights, alternate_lead_price_cents)
        values (gen_random_uuid(), $1, $2, $3, null, $4, $5, $6)
        "#,
    )
    .bind(sailing_id)
    .bind(alt.provider)
    .bind(alt.alternate_provider_identifier)
    .bind(alt.alternate_sail_date)
    .bind(alt.alternate_nights)
    .bind(alt.alternate_lead_price_cents)
    .execute(&mut **txn)
    .await?;
    Ok(())
}

/// Backfills `alternate_sailing_id` for any alternate row whose referenced
/// provider identifier has since appeared as an ingested sailing. Run as a
/// post-batch step (see §9 Open Question in `DESIGN.md`).
pub async fn backfill_alternate_sailing_ids<'e, E: PgExecutor<'e>>(db: E) -> sqlx::Result<u64> {
    let result = sqlx::query(
        r#"
        update catalog.alternate_sailings alt
        set alternate_sailing_id = s.id
        from catalog.sailings s
        where alt.alternate_sailing_id is null
          and alt.provider = s.provider
          and alt.alternate_provider_identifier = s.provider_identifier
        "#,
    )
    .execute(db)
    .await?;
    Ok(result.rows_affected())
}

pub async fn upsert_sync_raw<'e, E: PgExecutor<'e>>(
    db: E,
    provider_sailing_id: &str,
    raw_data: &Value,
    expires_at: DateTime<Utc>,
) -> sqlx::Result<()> {
    sqlx::query(
        r#"
        insert into catalog.sync_raw (provider_sailing_id, raw_data, synced_at, expires_at)
        values ($1, $2, now(), $3)
        on conflict (provider_sailing_id) do update set
            raw_data = excluded.raw_data,
            synced_at = now(),
            expires_at = excluded.expires_at
        "#,
    )
    .bind(provider_sailing_id)
    .bind(raw_data)
    .bind(expires_at)
    .execute(db)
    .await?;
    Ok(())
}
