//! Favorites (saved properties).
//!
//! The favorites table is keyed on (user_id, property_id), so a pair can
//! exist at most once. The denormalized `favorite_count` column on
//! properties is maintained with atomic increments and never driven below
//! zero.

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;
use std::sync::Arc;

use super::auth::AuthUser;
use super::error::ApiError;
use super::properties::{fetch_with_owner, is_favorited};
use super::response::ApiResponse;
use super::validation;
use crate::db::{DbPool, PropertyResponse, PropertyWithOwner};
use crate::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FavoriteCheck {
    pub is_favorite: bool,
}

fn validate_id(id: &str) -> Result<(), ApiError> {
    validation::validate_uuid(id, "propertyId")
        .map_err(|e| ApiError::validation_field("propertyId", e))
}

/// All properties the user has saved, most recently saved first
pub async fn list_favorites(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
) -> Result<Json<ApiResponse<Vec<PropertyResponse>>>, ApiError> {
    let rows: Vec<PropertyWithOwner> = sqlx::query_as(
        "SELECT p.*, u.name AS owner_name, u.email AS owner_email, u.phone AS owner_phone \
         FROM favorites f \
         JOIN properties p ON p.id = f.property_id \
         JOIN users u ON u.id = p.owner_id \
         WHERE f.user_id = ? \
         ORDER BY f.created_at DESC",
    )
    .bind(&user.id)
    .fetch_all(&state.db)
    .await?;

    let data = rows
        .into_iter()
        .map(|row| PropertyResponse::from_row(row, Some(true)))
        .collect();
    Ok(Json(ApiResponse::data(data)))
}

/// Save a property to the user's favorites
pub async fn add_favorite(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(property_id): Path<String>,
) -> Result<Json<ApiResponse<PropertyResponse>>, ApiError> {
    validate_id(&property_id)?;

    let exists: Option<(String,)> = sqlx::query_as("SELECT id FROM properties WHERE id = ?")
        .bind(&property_id)
        .fetch_optional(&state.db)
        .await?;
    if exists.is_none() {
        return Err(ApiError::not_found("Property not found"));
    }

    insert_favorite(&state.db, &user.id, &property_id).await?;

    let row = fetch_with_owner(&state.db, &property_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Property not found"))?;
    Ok(Json(
        ApiResponse::data(PropertyResponse::from_row(row, Some(true)))
            .with_message("Property added to favorites"),
    ))
}

/// Remove a property from the user's favorites
pub async fn remove_favorite(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(property_id): Path<String>,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    validate_id(&property_id)?;
    delete_favorite(&state.db, &user.id, &property_id).await?;
    Ok(Json(ApiResponse::message("Property removed from favorites")))
}

/// Check whether one property is in the user's favorites
pub async fn check_favorite(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(property_id): Path<String>,
) -> Result<Json<ApiResponse<FavoriteCheck>>, ApiError> {
    validate_id(&property_id)?;
    let is_favorite = is_favorited(&state.db, &user.id, &property_id).await?;
    Ok(Json(ApiResponse::data(FavoriteCheck { is_favorite })))
}

/// Drop every favorite the user has saved
pub async fn clear_favorites(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    let mut tx = state.db.begin().await?;

    sqlx::query(
        "UPDATE properties SET favorite_count = MAX(favorite_count - 1, 0) \
         WHERE id IN (SELECT property_id FROM favorites WHERE user_id = ?)",
    )
    .bind(&user.id)
    .execute(&mut *tx)
    .await?;

    sqlx::query("DELETE FROM favorites WHERE user_id = ?")
        .bind(&user.id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(Json(ApiResponse::message("All favorites cleared")))
}

// -------------------------------------------------------------------------
// Shared data access
// -------------------------------------------------------------------------

/// Insert the (user, property) pair and bump the counter in one
/// transaction. A second insert for the same pair is a client error.
pub(crate) async fn insert_favorite(
    pool: &DbPool,
    user_id: &str,
    property_id: &str,
) -> Result<(), ApiError> {
    let mut tx = pool.begin().await?;

    let now = chrono::Utc::now().to_rfc3339();
    let inserted = sqlx::query(
        "INSERT INTO favorites (user_id, property_id, created_at) VALUES (?, ?, ?)",
    )
    .bind(user_id)
    .bind(property_id)
    .bind(&now)
    .execute(&mut *tx)
    .await;

    if let Err(sqlx::Error::Database(db_err)) = &inserted {
        if db_err.message().contains("UNIQUE constraint failed") {
            return Err(ApiError::bad_request("Property already in favorites"));
        }
    }
    inserted?;

    sqlx::query("UPDATE properties SET favorite_count = favorite_count + 1 WHERE id = ?")
        .bind(property_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(())
}

/// Remove the pair and decrement the counter, clamped at zero
pub(crate) async fn delete_favorite(
    pool: &DbPool,
    user_id: &str,
    property_id: &str,
) -> Result<(), ApiError> {
    let mut tx = pool.begin().await?;

    let deleted = sqlx::query("DELETE FROM favorites WHERE user_id = ? AND property_id = ?")
        .bind(user_id)
        .bind(property_id)
        .execute(&mut *tx)
        .await?;
    if deleted.rows_affected() == 0 {
        return Err(ApiError::bad_request("Property not in favorites"));
    }

    sqlx::query(
        "UPDATE properties SET favorite_count = MAX(favorite_count - 1, 0) WHERE id = ?",
    )
    .bind(property_id)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_test;

    async fn seed_user(pool: &DbPool, email: &str) -> String {
        let id = uuid::Uuid::new_v4().to_string();
        let now = chrono::Utc::now().to_rfc3339();
        sqlx::query(
            "INSERT INTO users (id, name, email, phone, password_hash, role, created_at, updated_at)
             VALUES (?, 'Test User', ?, '9876543210', 'x', 'buyer', ?, ?)",
        )
        .bind(&id)
        .bind(email)
        .bind(&now)
        .bind(&now)
        .execute(pool)
        .await
        .unwrap();
        id
    }

    async fn seed_property(pool: &DbPool, owner_id: &str) -> String {
        let id = uuid::Uuid::new_v4().to_string();
        let now = chrono::Utc::now().to_rfc3339();
        sqlx::query(
            "INSERT INTO properties (id, name, description, price, property_type, area,
                address, city, state, pincode, images, owner_id, created_at, updated_at)
             VALUES (?, 'Saved Apartment', 'A perfectly serviceable test listing.', 100,
                'apartment', 500, '12 Test Lane', 'Pune', 'Maharashtra', '400001',
                '[\"a.jpg\"]', ?, ?, ?)",
        )
        .bind(&id)
        .bind(owner_id)
        .bind(&now)
        .bind(&now)
        .execute(pool)
        .await
        .unwrap();
        id
    }

    async fn favorite_count(pool: &DbPool, property_id: &str) -> i64 {
        let (count,): (i64,) =
            sqlx::query_as("SELECT favorite_count FROM properties WHERE id = ?")
                .bind(property_id)
                .fetch_one(pool)
                .await
                .unwrap();
        count
    }

    #[tokio::test]
    async fn add_then_remove_round_trips_counter() {
        let pool = init_test().await;
        let owner = seed_user(&pool, "owner@example.com").await;
        let user = seed_user(&pool, "user@example.com").await;
        let property = seed_property(&pool, &owner).await;

        insert_favorite(&pool, &user, &property).await.unwrap();
        assert_eq!(favorite_count(&pool, &property).await, 1);
        assert!(is_favorited(&pool, &user, &property).await.unwrap());

        delete_favorite(&pool, &user, &property).await.unwrap();
        assert_eq!(favorite_count(&pool, &property).await, 0);
        assert!(!is_favorited(&pool, &user, &property).await.unwrap());
    }

    #[tokio::test]
    async fn duplicate_add_rejected_without_counter_drift() {
        let pool = init_test().await;
        let owner = seed_user(&pool, "owner@example.com").await;
        let user = seed_user(&pool, "user@example.com").await;
        let property = seed_property(&pool, &owner).await;

        insert_favorite(&pool, &user, &property).await.unwrap();
        let err = insert_favorite(&pool, &user, &property).await.unwrap_err();
        assert_eq!(err.message(), "Property already in favorites");
        assert_eq!(favorite_count(&pool, &property).await, 1);
    }

    #[tokio::test]
    async fn remove_of_missing_pair_is_a_client_error() {
        let pool = init_test().await;
        let owner = seed_user(&pool, "owner@example.com").await;
        let user = seed_user(&pool, "user@example.com").await;
        let property = seed_property(&pool, &owner).await;

        let err = delete_favorite(&pool, &user, &property).await.unwrap_err();
        assert_eq!(err.message(), "Property not in favorites");
        assert_eq!(favorite_count(&pool, &property).await, 0);
    }

    #[tokio::test]
    async fn counter_never_goes_negative() {
        let pool = init_test().await;
        let owner = seed_user(&pool, "owner@example.com").await;
        let user = seed_user(&pool, "user@example.com").await;
        let property = seed_property(&pool, &owner).await;

        // Simulate a counter already at zero while the pair exists
        insert_favorite(&pool, &user, &property).await.unwrap();
        sqlx::query("UPDATE properties SET favorite_count = 0 WHERE id = ?")
            .bind(&property)
            .execute(&pool)
            .await
            .unwrap();

        delete_favorite(&pool, &user, &property).await.unwrap();
        assert_eq!(favorite_count(&pool, &property).await, 0);
    }

    #[tokio::test]
    async fn deleting_property_cascades_favorites() {
        let pool = init_test().await;
        let owner = seed_user(&pool, "owner@example.com").await;
        let user = seed_user(&pool, "user@example.com").await;
        let property = seed_property(&pool, &owner).await;
        insert_favorite(&pool, &user, &property).await.unwrap();

        sqlx::query("DELETE FROM properties WHERE id = ?")
            .bind(&property)
            .execute(&pool)
            .await
            .unwrap();

        let (favorites,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM favorites WHERE user_id = ?")
                .bind(&user)
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(favorites, 0);
    }
}
