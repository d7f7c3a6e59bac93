//! User profile and admin user management endpoints.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use std::sync::Arc;

use super::auth::{require_admin, AuthUser};
use super::error::{ApiError, ValidationErrorBuilder};
use super::response::{ApiResponse, Pagination};
use super::validation;
use crate::db::{
    AdminUpdateUserRequest, PropertyResponse, PropertyWithOwner, UpdateProfileRequest, User,
    UserResponse, UserRole, UserStats,
};
use crate::AppState;

/// Current user's profile
pub async fn get_profile(AuthUser(user): AuthUser) -> Json<ApiResponse<UserResponse>> {
    Json(ApiResponse::data(UserResponse::from(user)))
}

/// Update the current user's name or phone
pub async fn update_profile(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Json(req): Json<UpdateProfileRequest>,
) -> Result<Json<ApiResponse<UserResponse>>, ApiError> {
    let mut errors = ValidationErrorBuilder::new();
    if let Some(name) = &req.name {
        if let Err(e) = validation::validate_person_name(name) {
            errors.add("name", e);
        }
    }
    if let Some(phone) = &req.phone {
        if let Err(e) = validation::validate_phone(phone) {
            errors.add("phone", e);
        }
    }
    errors.finish()?;

    let now = chrono::Utc::now().to_rfc3339();
    sqlx::query("UPDATE users SET name = ?, phone = ?, updated_at = ? WHERE id = ?")
        .bind(req.name.as_deref().map(str::trim).unwrap_or(&user.name))
        .bind(req.phone.as_deref().unwrap_or(&user.phone))
        .bind(&now)
        .bind(&user.id)
        .execute(&state.db)
        .await?;

    let updated: User = sqlx::query_as("SELECT * FROM users WHERE id = ?")
        .bind(&user.id)
        .fetch_one(&state.db)
        .await?;
    Ok(Json(
        ApiResponse::data(UserResponse::from(updated)).with_message("Profile updated successfully"),
    ))
}

/// The current user's own listings, active or not
pub async fn my_properties(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
) -> Result<Json<ApiResponse<Vec<PropertyResponse>>>, ApiError> {
    let rows: Vec<PropertyWithOwner> = sqlx::query_as(
        "SELECT p.*, u.name AS owner_name, u.email AS owner_email, u.phone AS owner_phone \
         FROM properties p JOIN users u ON u.id = p.owner_id \
         WHERE p.owner_id = ? ORDER BY p.created_at DESC",
    )
    .bind(&user.id)
    .fetch_all(&state.db)
    .await?;

    let data = rows
        .into_iter()
        .map(|row| PropertyResponse::from_row(row, None))
        .collect();
    Ok(Json(ApiResponse::data(data)))
}

/// Aggregate statistics over the current user's listings and favorites
pub async fn my_stats(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
) -> Result<Json<ApiResponse<UserStats>>, ApiError> {
    let (total_properties, active_properties, total_views, average_rating): (i64, i64, i64, f64) =
        sqlx::query_as(
            "SELECT COUNT(*), COALESCE(SUM(is_active), 0), COALESCE(SUM(views), 0), \
                    COALESCE(AVG(NULLIF(rating, 0)), 0.0) \
             FROM properties WHERE owner_id = ?",
        )
        .bind(&user.id)
        .fetch_one(&state.db)
        .await?;

    let (total_favorites,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM favorites WHERE user_id = ?")
            .bind(&user.id)
            .fetch_one(&state.db)
            .await?;

    Ok(Json(ApiResponse::data(UserStats {
        total_properties,
        total_favorites,
        active_properties,
        total_views,
        average_rating,
    })))
}

// -------------------------------------------------------------------------
// Admin endpoints
// -------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
pub struct ListUsersParams {
    pub page: Option<String>,
    pub limit: Option<String>,
    pub role: Option<String>,
}

/// List users (admin only), optionally filtered by role
pub async fn admin_list_users(
    State(state): State<Arc<AppState>>,
    AuthUser(admin): AuthUser,
    Query(params): Query<ListUsersParams>,
) -> Result<Json<ApiResponse<Vec<UserResponse>>>, ApiError> {
    require_admin(&admin)?;

    let mut errors = ValidationErrorBuilder::new();
    let mut page = 1i64;
    let mut limit = 10i64;
    let mut role: Option<UserRole> = None;

    if let Some(raw) = &params.page {
        match raw.parse::<i64>() {
            Ok(n) if n >= 1 => page = n,
            _ => {
                errors.add("page", "Page must be a positive integer");
            }
        }
    }
    if let Some(raw) = &params.limit {
        match raw.parse::<i64>() {
            Ok(n) if (1..=50).contains(&n) => limit = n,
            _ => {
                errors.add("limit", "Limit must be between 1 and 50");
            }
        }
    }
    if let Some(raw) = &params.role {
        match raw.parse::<UserRole>() {
            Ok(r) => role = Some(r),
            Err(e) => {
                errors.add("role", e);
            }
        }
    }
    errors.finish()?;

    let (total, users): (i64, Vec<User>) = match role {
        Some(role) => {
            let (total,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users WHERE role = ?")
                .bind(role.as_str())
                .fetch_one(&state.db)
                .await?;
            let users = sqlx::query_as(
                "SELECT * FROM users WHERE role = ? ORDER BY created_at DESC LIMIT ? OFFSET ?",
            )
            .bind(role.as_str())
            .bind(limit)
            .bind((page - 1) * limit)
            .fetch_all(&state.db)
            .await?;
            (total, users)
        }
        None => {
            let (total,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users")
                .fetch_one(&state.db)
                .await?;
            let users =
                sqlx::query_as("SELECT * FROM users ORDER BY created_at DESC LIMIT ? OFFSET ?")
                    .bind(limit)
                    .bind((page - 1) * limit)
                    .fetch_all(&state.db)
                    .await?;
            (total, users)
        }
    };

    let data = users.into_iter().map(UserResponse::from).collect();
    Ok(Json(ApiResponse::paginated(
        data,
        Pagination::new(page, limit, total),
    )))
}

/// Fetch one user by id (admin only)
pub async fn admin_get_user(
    State(state): State<Arc<AppState>>,
    AuthUser(admin): AuthUser,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<UserResponse>>, ApiError> {
    require_admin(&admin)?;
    validation::validate_uuid(&id, "id").map_err(|e| ApiError::validation_field("id", e))?;

    let user: Option<User> = sqlx::query_as("SELECT * FROM users WHERE id = ?")
        .bind(&id)
        .fetch_optional(&state.db)
        .await?;
    let user = user.ok_or_else(|| ApiError::not_found("User not found"))?;
    Ok(Json(ApiResponse::data(UserResponse::from(user))))
}

/// Update a user's details, role or account flags (admin only)
pub async fn admin_update_user(
    State(state): State<Arc<AppState>>,
    AuthUser(admin): AuthUser,
    Path(id): Path<String>,
    Json(req): Json<AdminUpdateUserRequest>,
) -> Result<Json<ApiResponse<UserResponse>>, ApiError> {
    require_admin(&admin)?;
    validation::validate_uuid(&id, "id").map_err(|e| ApiError::validation_field("id", e))?;

    let user: Option<User> = sqlx::query_as("SELECT * FROM users WHERE id = ?")
        .bind(&id)
        .fetch_optional(&state.db)
        .await?;
    let user = user.ok_or_else(|| ApiError::not_found("User not found"))?;

    let mut errors = ValidationErrorBuilder::new();
    if let Some(name) = &req.name {
        if let Err(e) = validation::validate_person_name(name) {
            errors.add("name", e);
        }
    }
    if let Some(email) = &req.email {
        if let Err(e) = validation::validate_email(email) {
            errors.add("email", e);
        }
    }
    if let Some(phone) = &req.phone {
        if let Err(e) = validation::validate_phone(phone) {
            errors.add("phone", e);
        }
    }
    if let Some(role) = &req.role {
        if let Err(e) = role.parse::<UserRole>() {
            errors.add("role", e);
        }
    }
    errors.finish()?;

    if let Some(email) = &req.email {
        let taken: Option<(String,)> =
            sqlx::query_as("SELECT id FROM users WHERE email = ? AND id != ?")
                .bind(email)
                .bind(&id)
                .fetch_optional(&state.db)
                .await?;
        if taken.is_some() {
            return Err(ApiError::validation_field(
                "email",
                "An account with this email already exists",
            ));
        }
    }

    let now = chrono::Utc::now().to_rfc3339();
    sqlx::query(
        "UPDATE users SET name = ?, email = ?, phone = ?, role = ?, \
                is_active = ?, is_verified = ?, updated_at = ? \
         WHERE id = ?",
    )
    .bind(req.name.as_deref().map(str::trim).unwrap_or(&user.name))
    .bind(req.email.as_deref().unwrap_or(&user.email))
    .bind(req.phone.as_deref().unwrap_or(&user.phone))
    .bind(req.role.as_deref().unwrap_or(&user.role))
    .bind(req.is_active.unwrap_or(user.is_active))
    .bind(req.is_verified.unwrap_or(user.is_verified))
    .bind(&now)
    .bind(&id)
    .execute(&state.db)
    .await?;

    let updated: User = sqlx::query_as("SELECT * FROM users WHERE id = ?")
        .bind(&id)
        .fetch_one(&state.db)
        .await?;
    Ok(Json(
        ApiResponse::data(UserResponse::from(updated)).with_message("User updated successfully"),
    ))
}

/// Delete a user account (admin only). The user's sessions, listings,
/// reviews and favorites cascade with it.
pub async fn admin_delete_user(
    State(state): State<Arc<AppState>>,
    AuthUser(admin): AuthUser,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    require_admin(&admin)?;
    validation::validate_uuid(&id, "id").map_err(|e| ApiError::validation_field("id", e))?;

    if id == admin.id {
        return Err(ApiError::bad_request("You cannot delete your own account"));
    }

    let deleted = sqlx::query("DELETE FROM users WHERE id = ?")
        .bind(&id)
        .execute(&state.db)
        .await?;
    if deleted.rows_affected() == 0 {
        return Err(ApiError::not_found("User not found"));
    }

    tracing::info!(user_id = %id, by = %admin.id, "User deleted");
    Ok(Json(ApiResponse::message("User deleted successfully")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{init_test, DbPool};
    use crate::test_state_with;

    async fn seed_user(pool: &DbPool, email: &str, role: &str) -> User {
        let id = uuid::Uuid::new_v4().to_string();
        let now = chrono::Utc::now().to_rfc3339();
        sqlx::query(
            "INSERT INTO users (id, name, email, phone, password_hash, role, created_at, updated_at)
             VALUES (?, 'Test User', ?, '9876543210', 'x', ?, ?, ?)",
        )
        .bind(&id)
        .bind(email)
        .bind(role)
        .bind(&now)
        .bind(&now)
        .execute(pool)
        .await
        .unwrap();
        sqlx::query_as("SELECT * FROM users WHERE id = ?")
            .bind(&id)
            .fetch_one(pool)
            .await
            .unwrap()
    }

    async fn seed_property(pool: &DbPool, owner_id: &str, views: i64) -> String {
        let id = uuid::Uuid::new_v4().to_string();
        let now = chrono::Utc::now().to_rfc3339();
        sqlx::query(
            "INSERT INTO properties (id, name, description, price, property_type, area,
                address, city, state, pincode, images, owner_id, views, created_at, updated_at)
             VALUES (?, 'Stat Apartment', 'A perfectly serviceable test listing.', 100,
                'apartment', 500, '12 Test Lane', 'Pune', 'Maharashtra', '400001',
                '[\"a.jpg\"]', ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(owner_id)
        .bind(views)
        .bind(&now)
        .bind(&now)
        .execute(pool)
        .await
        .unwrap();
        id
    }

    #[tokio::test]
    async fn update_profile_rejects_bad_phone() {
        let pool = init_test().await;
        let user = seed_user(&pool, "user@example.com", "buyer").await;
        let state = test_state_with(pool).await;

        let result = update_profile(
            State(state),
            AuthUser(user),
            Json(UpdateProfileRequest {
                name: None,
                phone: Some("123".to_string()),
            }),
        )
        .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn stats_aggregate_views_and_active_listings() {
        let pool = init_test().await;
        let seller = seed_user(&pool, "seller@example.com", "seller").await;
        seed_property(&pool, &seller.id, 10).await;
        let inactive = seed_property(&pool, &seller.id, 5).await;
        sqlx::query("UPDATE properties SET is_active = 0 WHERE id = ?")
            .bind(&inactive)
            .execute(&pool)
            .await
            .unwrap();
        let state = test_state_with(pool).await;

        let Json(body) = my_stats(State(state), AuthUser(seller)).await.unwrap();
        let stats = body.data.unwrap();
        assert_eq!(stats.total_properties, 2);
        assert_eq!(stats.active_properties, 1);
        assert_eq!(stats.total_views, 15);
        assert_eq!(stats.total_favorites, 0);
    }

    #[tokio::test]
    async fn admin_endpoints_reject_non_admins() {
        let pool = init_test().await;
        let seller = seed_user(&pool, "seller@example.com", "seller").await;
        let state = test_state_with(pool).await;

        let result = admin_list_users(
            State(state),
            AuthUser(seller),
            Query(ListUsersParams::default()),
        )
        .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn admin_cannot_delete_self() {
        let pool = init_test().await;
        let admin = seed_user(&pool, "admin@example.com", "admin").await;
        let state = test_state_with(pool).await;

        let err = admin_delete_user(State(state), AuthUser(admin.clone()), Path(admin.id))
            .await
            .unwrap_err();
        assert_eq!(err.message(), "You cannot delete your own account");
    }

    #[tokio::test]
    async fn deleting_a_seller_cascades_their_listings() {
        let pool = init_test().await;
        let admin = seed_user(&pool, "admin@example.com", "admin").await;
        let seller = seed_user(&pool, "seller@example.com", "seller").await;
        seed_property(&pool, &seller.id, 0).await;
        let state = test_state_with(pool.clone()).await;

        admin_delete_user(State(state), AuthUser(admin), Path(seller.id.clone()))
            .await
            .unwrap();

        let (listings,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM properties WHERE owner_id = ?")
                .bind(&seller.id)
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(listings, 0);
    }

    #[tokio::test]
    async fn admin_role_filter_and_pagination() {
        let pool = init_test().await;
        let admin = seed_user(&pool, "admin@example.com", "admin").await;
        for i in 0..3 {
            seed_user(&pool, &format!("s{}@example.com", i), "seller").await;
        }
        let state = test_state_with(pool).await;

        let Json(body) = admin_list_users(
            State(state),
            AuthUser(admin),
            Query(ListUsersParams {
                role: Some("seller".to_string()),
                limit: Some("2".to_string()),
                ..ListUsersParams::default()
            }),
        )
        .await
        .unwrap();
        assert_eq!(body.data.unwrap().len(), 2);
        let pagination = body.pagination.unwrap();
        assert_eq!(pagination.total_items, 3);
        assert_eq!(pagination.total_pages, 2);
    }
}
