//! C3: the sailing upsert engine. Runs the ten-step algorithm described in
//! the per-file pipeline (§4.3), each sailing inside one transaction.

use chrono::{Days, NaiveDate};
use cruise_sql::catalog::{self, CruiseLineRow, PortRow, RegionRow, ShipRow};
use cruise_sql::decks::{self, DeckInsert};
use cruise_sql::sailings::{
    self, AlternateSailingInsert, CabinImageInsert, CabinPriceInsert, CabinTypeInsert, StopInsert,
    UpsertSailing,
};
use serde_json::{json, Value};
use sqlx::types::Uuid;
use sqlx::{PgPool, Postgres, Transaction};

use crate::cache::{Kind, ReferenceCache};
use crate::metrics::{ErrorType, StubCounters};
use crate::payload::{Cabin, PathIds, PortInfo, VendorPayload};

pub const PROVIDER: &str = "traveltek";

#[derive(Debug, thiserror::Error)]
pub enum UpsertError {
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

pub struct UpsertOutcome {
    pub sailing_id: Uuid,
    pub is_new: bool,
    pub stops_inserted: u64,
    pub prices_inserted: u64,
    pub stub_counters: StubCounters,
}

/// Turns an arbitrary name into a lowercase, hyphen-separated slug; used for
/// every reference-entity stub since the vendor feed has no slug field of
/// its own.
fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut last_was_dash = true;
    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch.to_ascii_lowercase());
            last_was_dash = false;
        } else if !last_was_dash {
            slug.push('-');
            last_was_dash = true;
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    if slug.is_empty() {
        slug.push_str("unknown");
    }
    slug
}

/// True iff both coordinates parse as finite numbers within the usual
/// lat/lng ranges; the payload's latitude/longitude fields are otherwise
/// dropped silently rather than stored (§4.3 step 1).
fn valid_coordinates(lat: Option<f64>, lng: Option<f64>) -> bool {
    match (lat, lng) {
        (Some(lat), Some(lng)) => {
            lat.is_finite() && lng.is_finite() && (-90.0..=90.0).contains(&lat) && (-180.0..=180.0).contains(&lng)
        }
        _ => false,
    }
}

fn category_from_codtype(codtype: &str) -> &'static str {
    let lower = codtype.to_ascii_lowercase();
    if lower.contains("inside") || lower.contains("interior") {
        "inside"
    } else if lower.contains("ocean") || lower.contains("outside") {
        "oceanview"
    } else if lower.contains("balcon") || lower.contains("verand") {
        "balcony"
    } else if lower.contains("suite") {
        "suite"
    } else {
        "other"
    }
}

/// Maps the first two upper-cased characters of a cabin code to a category,
/// used when no matching cabin type was found for a cached price (§4.3 step
/// 7). Unmatched prefixes default to `other`.
fn category_from_code_prefix(code: &str) -> &'static str {
    let prefix: String = code.chars().take(2).collect::<String>().to_ascii_uppercase();
    match prefix.as_str() {
        "IN" => "inside",
        "OV" | "OC" => "oceanview",
        "BA" | "BL" => "balcony",
        "SU" | "ST" => "suite",
        _ => "other",
    }
}

fn to_minor_units(amount: f64) -> i64 {
    (amount * 100.0).round() as i64
}

async fn resolve_cruise_line(
    txn: &mut Transaction<'_, Postgres>,
    cache: &ReferenceCache,
    identifier: &str,
    line_name: Option<&str>,
    logo_url: Option<&str>,
    stubs: &mut StubCounters,
) -> sqlx::Result<Uuid> {
    if let Some(id) = cache.get(Kind::CruiseLine, identifier) {
        if let Some(name) = line_name {
            merge_cruise_line(txn, id, name, logo_url).await?;
        }
        return Ok(id);
    }

    let row = match catalog::find_cruise_line(&mut **txn, PROVIDER, identifier).await? {
        Some(row) => row,
        None => {
            let name = line_name.unwrap_or(identifier).to_string();
            let metadata = json!({ "logo_url": logo_url });
            let inserted = catalog::insert_cruise_line_stub(
                txn,
                PROVIDER,
                identifier,
                &name,
                &slugify(&name),
                &metadata,
                line_name.is_none(),
            )
            .await?;
            match inserted {
                Some(row) => {
                    stubs.cruise_lines_created += 1;
                    row
                }
                None => catalog::find_cruise_line(&mut **txn, PROVIDER, identifier)
                    .await?
                    .expect("row must exist after a lost insert race"),
            }
        }
    };

    if let Some(name) = line_name {
        merge_cruise_line(txn, row.id, name, logo_url).await?;
    }

    cache.set(Kind::CruiseLine, identifier, row.id);
    Ok(row.id)
}

async fn merge_cruise_line(
    txn: &mut Transaction<'_, Postgres>,
    id: Uuid,
    name: &str,
    logo_url: Option<&str>,
) -> sqlx::Result<()> {
    let metadata = json!({ "logo_url": logo_url });
    catalog::merge_cruise_line_metadata(txn, id, &metadata, Some(name)).await
}

async fn resolve_ship(
    txn: &mut Transaction<'_, Postgres>,
    cache: &ReferenceCache,
    cruise_line_id: Uuid,
    identifier: &str,
    content: Option<&crate::payload::ShipContent>,
    stubs: &mut StubCounters,
) -> sqlx::Result<(Uuid, ShipRow)> {
    let cache_key = format!("{cruise_line_id}:{identifier}");
    if let Some(id) = cache.get(Kind::Ship, &cache_key) {
        if let Some(content) = content {
            merge_ship(txn, id, content).await?;
        }
        let row = catalog::find_ship(&mut **txn, cruise_line_id, PROVIDER, identifier)
            .await?
            .expect("cached ship id must still resolve");
        return Ok((id, row));
    }

    let row = match catalog::find_ship(&mut **txn, cruise_line_id, PROVIDER, identifier).await? {
        Some(row) => row,
        None => {
            let name = identifier.to_string();
            let metadata = json!({});
            let inserted = catalog::insert_ship_stub(
                txn,
                cruise_line_id,
                PROVIDER,
                identifier,
                &name,
                &slugify(&name),
                &metadata,
                content.is_none(),
            )
            .await?;
            match inserted {
                Some(row) => {
                    stubs.ships_created += 1;
                    row
                }
                None => catalog::find_ship(&mut **txn, cruise_line_id, PROVIDER, identifier)
                    .await?
                    .expect("row must exist after a lost insert race"),
            }
        }
    };

    if let Some(content) = content {
        merge_ship(txn, row.id, content).await?;
    }

    cache.set(Kind::Ship, &cache_key, row.id);
    let row = catalog::find_ship(&mut **txn, cruise_line_id, PROVIDER, identifier)
        .await?
        .expect("ship row must exist after resolution");
    Ok((row.id, row))
}

async fn merge_ship(
    txn: &mut Transaction<'_, Postgres>,
    id: Uuid,
    content: &crate::payload::ShipContent,
) -> sqlx::Result<()> {
    let launched_year = content
        .launched
        .as_deref()
        .and_then(|s| s.get(0..4))
        .and_then(|y| y.parse::<i32>().ok());
    let metadata = json!({
        "tonnage": content.tonnage,
        "occupancy": content.occupancy,
        "launchedYear": launched_year,
        "length": content.length,
        "code": content.code,
    });
    let image_url = content
        .defaultshipimage
        .as_deref()
        .or(content.defaultshipimagehd.as_deref())
        .or(content.defaultshipimage2k.as_deref());
    catalog::merge_ship_metadata(txn, id, &metadata, image_url, content.shipclass.as_deref()).await
}

async fn resolve_port(
    txn: &mut Transaction<'_, Postgres>,
    cache: &ReferenceCache,
    identifier: &str,
    info: Option<&PortInfo>,
    stubs: &mut StubCounters,
) -> sqlx::Result<Uuid> {
    if let Some(id) = cache.get(Kind::Port, identifier) {
        if let Some(info) = info {
            merge_port(txn, id, info).await?;
        }
        return Ok(id);
    }

    let row = match catalog::find_port(&mut **txn, PROVIDER, identifier).await? {
        Some(row) => row,
        None => {
            let name = info.map(|i| i.name.clone()).unwrap_or_else(|| identifier.to_string());
            let metadata = json!({});
            let inserted =
                catalog::insert_port_stub(txn, PROVIDER, identifier, &name, &slugify(&name), &metadata, info.is_none())
                    .await?;
            match inserted {
                Some(row) => {
                    stubs.ports_created += 1;
                    row
                }
                None => catalog::find_port(&mut **txn, PROVIDER, identifier)
                    .await?
                    .expect("row must exist after a lost insert race"),
            }
        }
    };

    if let Some(info) = info {
        merge_port(txn, row.id, info).await?;
    }

    cache.set(Kind::Port, identifier, row.id);
    Ok(row.id)
}

async fn merge_port(txn: &mut Transaction<'_, Postgres>, id: Uuid, info: &PortInfo) -> sqlx::Result<()> {
    let has_coords = valid_coordinates(info.latitude, info.longitude);
    let metadata = json!({
        "latitude": if has_coords { info.latitude } else { None },
        "longitude": if has_coords { info.longitude } else { None },
        "country": info.country,
        "countryCode": info.country_code,
        "description": info.description,
        "shortDescription": info.short_description,
    });
    catalog::merge_port_metadata(txn, id, &metadata, has_coords).await
}

async fn resolve_region(
    txn: &mut Transaction<'_, Postgres>,
    cache: &ReferenceCache,
    identifier: &str,
    name: &str,
    stubs: &mut StubCounters,
) -> sqlx::Result<Uuid> {
    if let Some(id) = cache.get(Kind::Region, identifier) {
        return Ok(id);
    }

    let row = match catalog::find_region(&mut **txn, PROVIDER, identifier).await? {
        Some(row) => row,
        None => {
            let inserted = catalog::insert_region_stub(txn, PROVIDER, identifier, name, &slugify(name)).await?;
            match inserted {
                Some(row) => {
                    stubs.regions_created += 1;
                    row
                }
                None => catalog::find_region(&mut **txn, PROVIDER, identifier)
                    .await?
                    .expect("row must exist after a lost insert race"),
            }
        }
    };

    cache.set(Kind::Region, identifier, row.id);
    Ok(row.id)
}

/// Inserts the ship's cabin types once, the first time a sailing for that
/// ship is imported with cabin content (§4.3 step 5).
async fn ensure_cabin_types(
    txn: &mut Transaction<'_, Postgres>,
    ship_id: Uuid,
    cabins: &std::collections::HashMap<String, Cabin>,
) -> sqlx::Result<()> {
    if cabins.is_empty() || sailings::ship_has_cabin_types(&mut **txn, ship_id).await? {
        return Ok(());
    }
    for cabin in cabins.values() {
        let code = cabin.codtype.as_deref().unwrap_or("other");
        let category = category_from_codtype(code);
        let name = cabin.name.as_deref().unwrap_or(code);
        let image_url = cabin
            .imageurl
            .as_deref()
            .or(cabin.imageurlhd.as_deref())
            .or(cabin.imageurl2k.as_deref());
        let metadata = json!({ "colourCode": cabin.colourcode });
        sailings::insert_cabin_type(
            txn,
            ship_id,
            &CabinTypeInsert {
                cabin_code: code,
                cabin_category: category,
                name,
                description: cabin.description.as_deref(),
                image_url,
                metadata,
            },
        )
        .await?;
    }
    Ok(())
}

/// Inserts deck plans once per ship, alongside the cabin types (not one of
/// the ten numbered steps, but gated the same way).
async fn ensure_decks(
    txn: &mut Transaction<'_, Postgres>,
    ship_id: Uuid,
    content: &crate::payload::ShipContent,
) -> sqlx::Result<()> {
    if content.shipdecks.is_empty() || sailings::ship_has_deck_rows(&mut **txn, ship_id).await? {
        return Ok(());
    }
    for (index, (_id, deck)) in content.shipdecks.iter().enumerate() {
        decks::insert_deck(
            txn,
            ship_id,
            &DeckInsert {
                name: deck.deckname.as_deref().unwrap_or("Deck"),
                deck_number: None,
                deck_plan_url: deck.planimage.as_deref(),
                description: deck.description.as_deref(),
                display_order: index as i32,
                metadata: json!({}),
            },
        )
        .await?;
    }
    Ok(())
}

/// Inserts cabin images once per ship, skipped entirely if any cabin type on
/// the ship already has images (§4.3 step 8).
async fn ensure_cabin_images(
    txn: &mut Transaction<'_, Postgres>,
    ship_id: Uuid,
    cabins: &std::collections::HashMap<String, Cabin>,
) -> sqlx::Result<()> {
    if sailings::any_cabin_type_has_images(&mut **txn, ship_id).await? {
        return Ok(());
    }
    for cabin in cabins.values() {
        if cabin.allcabinimages.is_empty() {
            continue;
        }
        let code = match cabin.codtype.as_deref() {
            Some(c) => c,
            None => continue,
        };
        let Some(cabin_type) = sailings::find_cabin_type(&mut **txn, ship_id, code).await? else {
            continue;
        };
        for (index, image) in cabin.allcabinimages.iter().enumerate() {
            let Some(url) = image.url.as_deref() else { continue };
            sailings::insert_cabin_image(
                txn,
                cabin_type.id,
                &CabinImageInsert {
                    image_url: url,
                    hd_url: cabin.imageurlhd.as_deref(),
                    k2_url: cabin.imageurl2k.as_deref(),
                    caption: image.caption.as_deref(),
                    display_order: index as i32,
                    is_default: index == 0,
                },
            )
            .await?;
        }
    }
    Ok(())
}

/// Runs the full ten-step sailing upsert inside one transaction (§4.3).
pub async fn upsert_sailing(
    db: &PgPool,
    cache: &ReferenceCache,
    payload: &VendorPayload,
    ids: &PathIds,
    raw_bytes: Option<&[u8]>,
) -> Result<UpsertOutcome, UpsertError> {
    let mut stubs = StubCounters::default();
    let mut txn = db.begin().await?;

    // Step 1: reference resolution.
    let logo_url = payload.linecontent.as_ref().and_then(|l| l.logo.as_deref());
    let line_display_name = payload.linecontent.as_ref().and_then(|l| l.shortname.as_deref());
    let cruise_line_id =
        resolve_cruise_line(&mut txn, cache, &ids.cruise_line_id, line_display_name, logo_url, &mut stubs).await?;

    let (ship_id, _ship_row) =
        resolve_ship(&mut txn, cache, cruise_line_id, &ids.ship_id, payload.shipcontent.as_ref(), &mut stubs).await?;

    let ports = payload.ports();
    let embark_port = ports.get(&payload.startportid);
    let disembark_port = ports.get(&payload.endportid);
    let embark_port_id = resolve_port(&mut txn, cache, &payload.startportid, embark_port, &mut stubs).await?;
    let disembark_port_id = resolve_port(&mut txn, cache, &payload.endportid, disembark_port, &mut stubs).await?;

    let first_region = payload.regions.iter().next();
    let region_id = match first_region {
        Some((identifier, name)) => Some(resolve_region(&mut txn, cache, identifier, name, &mut stubs).await?),
        None => None,
    };

    // Step 2: sailing row.
    let sail_date = parse_date(&payload.saildate).unwrap_or_else(|| chrono::Utc::now().date_naive());
    let end_date = sail_date
        .checked_add_days(Days::new(payload.nights.max(0) as u64))
        .unwrap_or(sail_date);

    let metadata = json!({
        "marketId": payload.marketid,
        "nofly": payload.nofly,
        "departuk": payload.departuk,
    });

    let embark_name = embark_port.map(|p| p.name.as_str()).unwrap_or(&payload.startportid);
    let disembark_name = disembark_port.map(|p| p.name.as_str()).unwrap_or(&payload.endportid);
    let provider_identifier = ids.code_to_cruise_id.clone();

    let upserted = sailings::upsert_sailing(
        &mut txn,
        &UpsertSailing {
            provider: PROVIDER,
            provider_identifier: &provider_identifier,
            ship_id,
            cruise_line_id,
            embark_port_id,
            disembark_port_id,
            name: payload.name.as_deref().unwrap_or(&provider_identifier),
            sail_date,
            end_date,
            nights: payload.nights as i32,
            sea_days: payload.seadays.map(|n| n as i32),
            voyage_code: payload.voyagecode.as_deref(),
            market_id: payload.marketid.as_deref(),
            no_fly: payload.nofly,
            depart_uk: payload.departuk,
            embark_port_name: embark_name,
            disembark_port_name: disembark_name,
            metadata,
        },
    )
    .await?;

    // Step 3: primary region link.
    if let Some(region_id) = region_id {
        sailings::set_primary_region(&mut txn, upserted.id, region_id).await?;
    }

    // Step 4: stops.
    let mut stops = Vec::with_capacity(payload.itinerary.len());
    for (index, entry) in payload.itinerary.iter().enumerate() {
        let is_sea_day = entry
            .name
            .as_deref()
            .map(|n| n.eq_ignore_ascii_case("at sea"))
            .unwrap_or(false);

        let day_number = entry.day_number().unwrap_or(index as i32 + 1);
        let sequence_order = entry.orderid.map(|n| n as i32).unwrap_or(index as i32);

        let (port_id, port_name) = if is_sea_day {
            (None, "At Sea".to_string())
        } else if let Some(port_id_str) = &entry.portid {
            let info = ports.get(port_id_str).cloned().or_else(|| {
                entry.name.as_ref().map(|name| PortInfo {
                    name: name.clone(),
                    latitude: entry.latitude(),
                    longitude: entry.longitude(),
                    country: None,
                    country_code: None,
                    description: entry.description.clone(),
                    short_description: entry.shortdescription.clone(),
                })
            });
            let name = info.as_ref().map(|i| i.name.clone()).unwrap_or_else(|| port_id_str.clone());
            let id = resolve_port(&mut txn, cache, port_id_str, info.as_ref(), &mut stubs).await?;
            (Some(id), name)
        } else {
            (None, entry.name.clone().unwrap_or_default())
        };

        stops.push(StopInsert {
            port_id,
            port_name,
            is_sea_day,
            day_number,
            sequence_order,
            arrival_time: entry.arrivetime.clone(),
            departure_time: entry.departtime.clone(),
        });
    }
    let stops_inserted = stops.len() as u64;
    sailings::replace_stops(&mut txn, upserted.id, &stops).await?;

    // Step 5 (+ decks): ship cabin types and decks, once per ship.
    ensure_cabin_types(&mut txn, ship_id, &payload.cabins).await?;
    if let Some(content) = &payload.shipcontent {
        ensure_decks(&mut txn, ship_id, content).await?;
    }

    // Step 6: cheapest-price summary.
    let mut prices_inserted = 0u64;
    let inside_cents = payload.cheapestinside.map(to_minor_units);
    let outside_cents = payload.cheapestoutside.map(to_minor_units);
    let balcony_cents = payload.cheapestbalcony.map(to_minor_units);
    let suite_cents = payload.cheapestsuite.map(to_minor_units);
    if inside_cents.is_some() || outside_cents.is_some() || balcony_cents.is_some() || suite_cents.is_some() {
        prices_inserted += 1;
    }
    sailings::set_cheapest_prices(&mut txn, upserted.id, inside_cents, outside_cents, balcony_cents, suite_cents)
        .await?;

    // Step 7: detailed cabin prices.
    if !payload.cachedprices.is_empty() {
        let mut price_rows = Vec::new();
        for (code, cached) in &payload.cachedprices {
            let Some(price) = cached.price else { continue };
            if price <= 0.0 {
                continue;
            }
            let category = payload
                .cabins
                .values()
                .find(|c| c.codtype.as_deref() == Some(code.as_str()))
                .map(|c| category_from_codtype(c.codtype.as_deref().unwrap_or("")))
                .unwrap_or_else(|| category_from_code_prefix(code));
            let amount_cents = to_minor_units(price);
            price_rows.push(CabinPriceInsert {
                cabin_code: code,
                cabin_category: category,
                occupancy: 2,
                base_price_cents: amount_cents,
                taxes_cents: 0,
                original_currency: cached.currency.as_deref().unwrap_or("CAD"),
                original_amount_cents: amount_cents,
                is_per_person: true,
            });
        }
        sailings::replace_cabin_prices(&mut txn, upserted.id, &price_rows).await?;
    }

    // Step 8: cabin images.
    ensure_cabin_images(&mut txn, ship_id, &payload.cabins).await?;

    // Step 9: alternate sailings.
    for alt in &payload.altsailings {
        let Some(alt_id) = &alt.id else { continue };
        sailings::insert_alternate_sailing(
            &mut txn,
            upserted.id,
            &AlternateSailingInsert {
                provider: PROVIDER,
                alternate_provider_identifier: alt_id,
                alternate_sail_date: alt.saildate.as_deref().and_then(parse_date),
                alternate_nights: alt.nights.map(|n| n as i32),
                alternate_lead_price_cents: alt.cheapestprice.map(to_minor_units),
            },
        )
        .await?;
    }

    // Step 10: raw payload.
    if let Some(bytes) = raw_bytes {
        if let Ok(raw_value) = serde_json::from_slice::<Value>(bytes) {
            let expires_at = chrono::Utc::now() + chrono::Duration::days(30);
            sailings::upsert_sync_raw(&mut *txn, &provider_identifier, &raw_value, expires_at).await?;
        }
    }

    txn.commit().await?;

    Ok(UpsertOutcome {
        sailing_id: upserted.id,
        is_new: upserted.is_new,
        stops_inserted,
        prices_inserted,
        stub_counters: stubs,
    })
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .or_else(|| s.parse::<chrono::DateTime<chrono::Utc>>().ok().map(|dt| dt.date_naive()))
}

pub fn error_type_for(_err: &UpsertError) -> ErrorType {
    ErrorType::Unknown
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn slugify_normalizes_and_collapses_punctuation() {
        assert_eq!(slugify("Royal Caribbean Int'l"), "royal-caribbean-int-l");
        assert_eq!(slugify(""), "unknown");
    }

    #[test]
    fn coordinate_validation_rejects_out_of_range() {
        assert!(valid_coordinates(Some(12.0), Some(-70.0)));
        assert!(!valid_coordinates(Some(1200.0), Some(-70.0)));
        assert!(!valid_coordinates(None, Some(-70.0)));
    }

    #[test]
    fn codtype_category_matches_by_substring() {
        assert_eq!(category_from_codtype("Interior Stateroom"), "inside");
        assert_eq!(category_from_codtype("Ocean View"), "oceanview");
        assert_eq!(category_from_codtype("Veranda Suite"), "balcony");
        assert_eq!(category_from_codtype("Grand Suite"), "suite");
        assert_eq!(category_from_codtype("Whatever"), "other");
    }

    #[test]
    fn minor_units_round_to_nearest_cent() {
        assert_eq!(to_minor_units(19.995), 2000);
        assert_eq!(to_minor_units(100.0), 10000);
    }
}
