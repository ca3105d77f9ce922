//! Reference-data tables: cruise lines, ships, ports, regions.
//!
//! Every row is keyed externally by `(provider, provider_identifier)` and
//! internally by a surrogate UUID. Inserts use `ON CONFLICT DO NOTHING
//! RETURNING *` so that two workers racing to create the same reference
//! resolve to a single row; the caller re-selects on a `None` return.

use serde_json::Value;
use sqlx::types::Uuid;
use sqlx::{PgExecutor, Postgres, Transaction};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CruiseLineRow {
    pub id: Uuid,
    pub provider: String,
    pub provider_identifier: String,
    pub name: String,
    pub slug: String,
    pub metadata: Value,
    pub needs_review: bool,
    pub auto_created: bool,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ShipRow {
    pub id: Uuid,
    pub cruise_line_id: Uuid,
    pub provider: String,
    pub provider_identifier: String,
    pub name: String,
    pub slug: String,
    pub ship_class: Option<String>,
    pub image_url: Option<String>,
    pub metadata: Value,
    pub needs_review: bool,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PortRow {
    pub id: Uuid,
    pub provider: String,
    pub provider_identifier: String,
    pub name: String,
    pub slug: String,
    pub metadata: Value,
    pub needs_review: bool,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RegionRow {
    pub id: Uuid,
    pub provider: String,
    pub provider_identifier: String,
    pub name: String,
    pub slug: String,
    pub metadata: Value,
    pub needs_review: bool,
}

pub async fn find_cruise_line<'e, E: PgExecutor<'e>>(
    db: E,
    provider: &str,
    provider_identifier: &str,
) -> sqlx::Result<Option<CruiseLineRow>> {
    sqlx::query_as::<_, CruiseLineRow>(
        r#"
        select id, provider, provider_identifier, name, slug, metadata, needs_review, auto_created
        from catalog.cruise_lines
        where provider = $1 and provider_identifier = $2
        "#,
    )
    .bind(provider)
    .bind(provider_identifier)
    .fetch_optional(db)
    .await
}

pub async fn insert_cruise_line_stub(
    txn: &mut Transaction<'_, Postgres>,
    provider: &str,
    provider_identifier: &str,
    name: &str,
    slug: &str,
    metadata: &Value,
    needs_review: bool,
) -> sqlx::Result<Option<CruiseLineRow>> {
    sqlx::query_as::<_, CruiseLineRow>(
        r#"
        insert into catalog.cruise_lines
            (id, provider, provider_identifier, name, slug, metadata, needs_review, auto_created)
        values (gen_random_uuid(), $1, $2, $3, $4, $5, $6, true)
        on conflict (provider, provider_identifier) do nothing
        returning id, provider, provider_identifier, name, slug, metadata, needs_review, auto_created
        "#,
    )
    .bind(provider)
    .bind(provider_identifier)
    .bind(name)
    .bind(slug)
    .bind(metadata)
    .bind(needs_review)
    .fetch_optional(&mut **txn)
    .await
}

/// Merges `metadata` into the existing row only if the row still lacks the
/// primary evidence it already carries (needs_review, or no primary image).
/// Ports additionally clear `needs_review` when valid coordinates land; that
/// is handled by [`update_port_metadata`] since it has port-specific fields.
pub async fn merge_cruise_line_metadata(
    txn: &mut Transaction<'_, Postgres>,
    id: Uuid,
    metadata: &Value,
    name: Option<&str>,
) -> sqlx::Result<()> {
    sqlx::query(
        r#"
        update catalog.cruise_lines
        set metadata = metadata || $2,
            name = coalesce($3, name),
            needs_review = false
        where id = $1 and needs_review = true
        "#,
    )
    .bind(id)
    .bind(metadata)
    .bind(name)
    .execute(&mut **txn)
    .await?;
    Ok(())
}

pub async fn find_ship<'e, E: PgExecutor<'e>>(
    db: E,
    cruise_line_id: Uuid,
    provider: &str,
    provider_identifier: &str,
) -> sqlx::Result<Option<ShipRow>> {
    sqlx::query_as::<_, ShipRow>(
        r#"
        select id, cruise_line_id, provider, provider_identifier, name, slug,
               ship_class, image_url, metadata, needs_review
        from catalog.ships
        where cruise_line_id = $1 and provider = $2 and provider_identifier = $3
        "#,
    )
    .bind(cruise_line_id)
    .bind(provider)
    .bind(provider_identifier)
    .fetch_optional(db)
    .await
}

pub async fn insert_ship_stub(
    txn: &mut Transaction<'_, Postgres>,
    cruise_line_id: Uuid,
    provider: &str,
    provider_identifier: &str,
    name: &str,
    slug: &str,
    metadata: &Value,
    needs_review: bool,
) -> sqlx::Result<Option<ShipRow>> {
    sqlx::query_as::<_, ShipRow>(
        r#"
        insert into catalog.ships
            (id, cruise_line_id, provider, provider_identifier, name, slug, metadata, needs_review)
        values (gen_random_uuid(), $1, $2, $3, $4, $5, $6, $7)
        on conflict (provider, provider_identifier) do nothing
        returning id, cruise_line_id, provider, provider_identifier, name, slug,
                  ship_class, image_url, metadata, needs_review
        "#,
    )
    .bind(cruise_line_id)
    .bind(provider)
    .bind(provider_identifier)
    .bind(name)
    .bind(slug)
    .bind(metadata)
    .bind(needs_review)
    .fetch_optional(&mut **txn)
    .await
}

/// Fires only when the ship still lacks primary evidence: `needs_review` is
/// true, or the primary image URL is missing.
pub async fn merge_ship_metadata(
    txn: &mut Transaction<'_, Postgres>,
    id: Uuid,
    metadata: &Value,
    image_url: Option<&str>,
    ship_class: Option<&str>,
) -> sqlx::Result<()> {
    sqlx::query(
        r#"
        update catalog.ships
        set metadata = metadata || $2,
            image_url = coalesce(image_url, $3),
            ship_class = coalesce(ship_class, $4),
            needs_review = false
        where id = $1 and (needs_review = true or image_url is null)
        "#,
    )
    .bind(id)
    .bind(metadata)
    .bind(image_url)
    .bind(ship_class)
    .execute(&mut **txn)
    .await?;
    Ok(())
}

pub async fn find_port<'e, E: PgExecutor<'e>>(
    db: E,
    provider: &str,
    provider_identifier: &str,
) -> sqlx::Result<Option<PortRow>> {
    sqlx::query_as::<_, PortRow>(
        r#"
        select id, provider, provider_identifier, name, slug, metadata, needs_review
        from catalog.ports
        where provider = $1 and provider_identifier = $2
        "#,
    )
    .bind(provider)
    .bind(provider_identifier)
    .fetch_optional(db)
    .await
}

pub async fn insert_port_stub(
    txn: &mut Transaction<'_, Postgres>,
    provider: &str,
    provider_identifier: &str,
    name: &str,
    slug: &str,
    metadata: &Value,
    needs_review: bool,
) -> sqlx::Result<Option<PortRow>> {
    sqlx::query_as::<_, PortRow>(
        r#"
        insert into catalog.ports (id, provider, provider_identifier, name, slug, metadata, needs_review)
        values (gen_random_uuid(), $1, $2, $3, $4, $5, $6)
        on conflict (provider, provider_identifier) do nothing
        returning id, provider, provider_identifier, name, slug, metadata, needs_review
        "#,
    )
    .bind(provider)
    .bind(provider_identifier)
    .bind(name)
    .bind(slug)
    .bind(metadata)
    .bind(needs_review)
    .fetch_optional(&mut **txn)
    .await
}

/// Merges port metadata, clearing `needs_review` only when valid coordinates
/// are present in `metadata` (the caller is responsible for having already
/// range-validated/dropped invalid lat/lng before calling this).
pub async fn merge_port_metadata(
    txn: &mut Transaction<'_, Postgres>,
    id: Uuid,
    metadata: &Value,
    has_valid_coordinates: bool,
) -> sqlx::Result<()> {
    sqlx::query(
        r#"
        update catalog.ports
        set metadata = metadata || $2,
            needs_review = case when $3 then false else needs_review end
        where id = $1 and (metadata->>'latitude') is null
        "#,
    )
    .bind(id)
    .bind(metadata)
    .bind(has_valid_coordinates)
    .execute(&mut **txn)
    .await?;
    Ok(())
}

pub async fn find_region<'e, E: PgExecutor<'e>>(
    db: E,
    provider: &str,
    provider_identifier: &str,
) -> sqlx::Result<Option<RegionRow>> {
    sqlx::query_as::<_, RegionRow>(
        r#"
        select id, provider, provider_identifier, name, slug, metadata, needs_review
        from catalog.regions
        where provider = $1 and provider_identifier = $2
        "#,
    )
    .bind(provider)
    .bind(provider_identifier)
    .fetch_optional(db)
    .await
}

pub async fn insert_region_stub(
    txn: &mut Transaction<'_, Postgres>,
    provider: &str,
    provider_identifier: &str,
    name: &str,
    slug: &str,
) -> sqlx::Result<Option<RegionRow>> {
    sqlx::query_as::<_, RegionRow>(
        r#"
        insert into catalog.regions (id, provider, provider_identifier, name, slug, metadata, needs_review)
        values (gen_random_uuid(), $1, $2, $3, $4, '{"needs_review": true}'::json, true)
        on conflict (provider, provider_identifier) do nothing
        returning id, provider, provider_identifier, name, slug, metadata, needs_review
        "#,
    )
    .bind(provider)
    .bind(provider_identifier)
    .bind(name)
    .bind(slug)
    .fetch_optional(&mut **txn)
    .await
}
