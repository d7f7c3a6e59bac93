//! Demo data for local development.

use anyhow::Result;
use tracing::info;

use super::{encode_list, DbPool};
use crate::api::auth::hash_password;

struct DemoProperty {
    name: &'static str,
    description: &'static str,
    price: f64,
    price_type: &'static str,
    property_type: &'static str,
    bedrooms: i64,
    bathrooms: i64,
    area: f64,
    city: &'static str,
    state: &'static str,
    pincode: &'static str,
    amenities: &'static [&'static str],
    tags: &'static [&'static str],
    ready_to_move: bool,
    is_featured: bool,
}

const DEMO_PROPERTIES: [DemoProperty; 4] = [
    DemoProperty {
        name: "Sunrise Heights Two Bedroom",
        description: "Bright east-facing apartment on the eighth floor with an open \
            kitchen, covered parking and a children's play area in the complex.",
        price: 7_500_000.0,
        price_type: "sale",
        property_type: "apartment",
        bedrooms: 2,
        bathrooms: 2,
        area: 980.0,
        city: "Mumbai",
        state: "Maharashtra",
        pincode: "400050",
        amenities: &["Lift", "Parking", "Gym", "Security"],
        tags: &["east-facing", "family"],
        ready_to_move: true,
        is_featured: true,
    },
    DemoProperty {
        name: "Green Meadows Villa",
        description: "Independent four bedroom villa with a private garden, solar \
            water heating and space for two cars inside a gated community.",
        price: 21_000_000.0,
        price_type: "sale",
        property_type: "villa",
        bedrooms: 4,
        bathrooms: 4,
        area: 3200.0,
        city: "Bengaluru",
        state: "Karnataka",
        pincode: "560037",
        amenities: &["Garden", "Clubhouse", "Swimming Pool"],
        tags: &["gated", "luxury"],
        ready_to_move: true,
        is_featured: true,
    },
    DemoProperty {
        name: "City Center Studio",
        description: "Compact furnished studio a short walk from the metro, suited \
            to working professionals. Maintenance included in rent.",
        price: 28_000.0,
        price_type: "rent",
        property_type: "apartment",
        bedrooms: 1,
        bathrooms: 1,
        area: 420.0,
        city: "Pune",
        state: "Maharashtra",
        pincode: "411001",
        amenities: &["Furnished", "Lift", "Power Backup"],
        tags: &["metro", "furnished"],
        ready_to_move: true,
        is_featured: false,
    },
    DemoProperty {
        name: "Lakeview Commercial Floor",
        description: "Open-plan commercial floor plate overlooking the lake with \
            dedicated parking and a standby generator, fit for a mid-size office.",
        price: 185_000.0,
        price_type: "rent",
        property_type: "commercial",
        bedrooms: 0,
        bathrooms: 2,
        area: 4_500.0,
        city: "Hyderabad",
        state: "Telangana",
        pincode: "500081",
        amenities: &["Parking", "Power Backup", "Security"],
        tags: &["office", "lakeview"],
        ready_to_move: false,
        is_featured: false,
    },
];

/// Seed demo users and listings. Safe to run repeatedly; seeding is
/// skipped once the demo seller exists.
pub async fn seed_demo_data(pool: &DbPool) -> Result<()> {
    let existing: Option<(String,)> = sqlx::query_as("SELECT id FROM users WHERE email = ?")
        .bind("john.seller@example.com")
        .fetch_optional(pool)
        .await?;
    if existing.is_some() {
        info!("Demo data already present, skipping seed");
        return Ok(());
    }

    let now = chrono::Utc::now().to_rfc3339();
    let seller_id = uuid::Uuid::new_v4().to_string();
    let buyer_id = uuid::Uuid::new_v4().to_string();
    let password = hash_password("password123")
        .map_err(|e| anyhow::anyhow!("failed to hash demo password: {}", e))?;

    sqlx::query(
        "INSERT INTO users (id, name, email, phone, password_hash, role, is_verified, \
                created_at, updated_at)
         VALUES (?, 'John Seller', 'john.seller@example.com', '9876543210', ?, 'seller', 1, ?, ?)",
    )
    .bind(&seller_id)
    .bind(&password)
    .bind(&now)
    .bind(&now)
    .execute(pool)
    .await?;

    sqlx::query(
        "INSERT INTO users (id, name, email, phone, password_hash, role, is_verified, \
                created_at, updated_at)
         VALUES (?, 'Jane Buyer', 'jane.buyer@example.com', '9123456780', ?, 'buyer', 1, ?, ?)",
    )
    .bind(&buyer_id)
    .bind(&password)
    .bind(&now)
    .bind(&now)
    .execute(pool)
    .await?;

    for demo in &DEMO_PROPERTIES {
        let amenities: Vec<String> = demo.amenities.iter().map(|s| s.to_string()).collect();
        let tags: Vec<String> = demo.tags.iter().map(|s| s.to_string()).collect();
        sqlx::query(
            "INSERT INTO properties (id, name, description, price, price_type, property_type,
                    bedrooms, bathrooms, area, address, city, state, pincode,
                    amenities, images, tags, owner_id, ready_to_move, is_featured,
                    created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(uuid::Uuid::new_v4().to_string())
        .bind(demo.name)
        .bind(demo.description)
        .bind(demo.price)
        .bind(demo.price_type)
        .bind(demo.property_type)
        .bind(demo.bedrooms)
        .bind(demo.bathrooms)
        .bind(demo.area)
        .bind(format!("1 Demo Street, {}", demo.city))
        .bind(demo.city)
        .bind(demo.state)
        .bind(demo.pincode)
        .bind(encode_list(&amenities))
        .bind(encode_list(&["placeholder.jpg".to_string()]))
        .bind(encode_list(&tags))
        .bind(&seller_id)
        .bind(demo.ready_to_move)
        .bind(demo.is_featured)
        .bind(&now)
        .bind(&now)
        .execute(pool)
        .await?;
    }

    info!(
        "Seeded {} demo properties and 2 demo users",
        DEMO_PROPERTIES.len()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_test;

    #[tokio::test]
    async fn seeding_twice_does_not_duplicate() {
        let pool = init_test().await;
        seed_demo_data(&pool).await.unwrap();
        seed_demo_data(&pool).await.unwrap();

        let (users,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users")
            .fetch_one(&pool)
            .await
            .unwrap();
        let (properties,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM properties")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(users, 2);
        assert_eq!(properties, DEMO_PROPERTIES.len() as i64);
    }
}
