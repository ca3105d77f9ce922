//! `catalog.ship_decks`: imported once per ship (§3.1 ShipDeck, §4.3 step 5
//! neighbor — decks are not explicitly numbered among the ten upsert steps,
//! but share the "imported once per ship" gate with cabin types).

use serde_json::Value;
use sqlx::types::Uuid;
use sqlx::Transaction;

pub struct DeckInsert<'a> {
    pub name: &'a str,
    pub deck_number: Option<i32>,
    pub deck_plan_url: Option<&'a str>,
    pub description: Option<&'a str>,
    pub display_order: i32,
    pub metadata: Value,
}

pub async fn insert_deck(
    txn: &mut Transaction<'_, sqlx::Postgres>,
    ship_id: Uuid,
    d: &DeckInsert<'_>,
) -> sqlx::Result<()> {
    sqlx::query(
        r#"
        insert into catalog.ship_decks
            (id, ship_id, name, deck_number, deck_plan_url, description, display_order, metadata)
        values (gen_random_uuid(), $1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(ship_id)
    .bind(d.name)
    .bind(d.deck_number)
    .bind(d.deck_plan_url)
    .bind(d.description)
    .bind(d.display_order)
    .bind(&d.metadata)
    .execute(&mut **txn)
    .await?;
    Ok(())
}
