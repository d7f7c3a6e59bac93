//! Property listing endpoints.
//!
//! Public reads (list, featured, detail) tolerate anonymous viewers; writes
//! require a seller or admin account and ownership of the listing. View and
//! rating counters are maintained with atomic SQL updates so concurrent
//! requests never lose increments.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;

use super::auth::{require_seller, AuthUser, MaybeUser};
use super::error::{ApiError, ValidationErrorBuilder};
use super::response::{ApiResponse, Pagination};
use super::search::{self, ListPropertiesParams, ListingQuery};
use super::validation;
use crate::db::{
    encode_list, AreaUnit, CreatePropertyRequest, DbPool, PriceType, PropertyResponse,
    PropertyStatus, PropertyType, PropertyWithOwner, ReviewRequest, ReviewResponse, ReviewWithUser,
    UpdatePropertyRequest, User,
};
use crate::AppState;

const FEATURED_LIMIT: i64 = 6;

// -------------------------------------------------------------------------
// Handlers
// -------------------------------------------------------------------------

/// List active properties with filtering, sorting and pagination
pub async fn list_properties(
    State(state): State<Arc<AppState>>,
    MaybeUser(viewer): MaybeUser,
    Query(params): Query<ListPropertiesParams>,
) -> Result<Json<ApiResponse<Vec<PropertyResponse>>>, ApiError> {
    let query = ListingQuery::parse(&params)?;

    let total = search::count_matching(&state.db, &query.filter).await?;
    let rows = search::fetch_page(&state.db, &query).await?;

    let favorites = match &viewer {
        Some(user) => Some(search::favorite_ids(&state.db, &user.id).await?),
        None => None,
    };
    let data = search::annotate_page(rows, favorites.as_ref());

    let pagination = Pagination::new(query.page.page, query.page.limit, total);
    Ok(Json(ApiResponse::paginated(data, pagination)))
}

/// Top featured properties, best rated first
pub async fn featured_properties(
    State(state): State<Arc<AppState>>,
    MaybeUser(viewer): MaybeUser,
) -> Result<Json<ApiResponse<Vec<PropertyResponse>>>, ApiError> {
    let rows: Vec<PropertyWithOwner> = sqlx::query_as(
        "SELECT p.*, u.name AS owner_name, u.email AS owner_email, u.phone AS owner_phone \
         FROM properties p JOIN users u ON u.id = p.owner_id \
         WHERE p.is_active = 1 AND p.is_featured = 1 \
         ORDER BY p.rating DESC, p.views DESC, p.id ASC LIMIT ?",
    )
    .bind(FEATURED_LIMIT)
    .fetch_all(&state.db)
    .await?;

    let favorites = match &viewer {
        Some(user) => Some(search::favorite_ids(&state.db, &user.id).await?),
        None => None,
    };
    Ok(Json(ApiResponse::data(search::annotate_page(
        rows,
        favorites.as_ref(),
    ))))
}

/// Fetch one property with its reviews, bumping the view counter
pub async fn get_property(
    State(state): State<Arc<AppState>>,
    MaybeUser(viewer): MaybeUser,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<PropertyResponse>>, ApiError> {
    validate_id(&id)?;

    increment_views(&state.db, &id).await?;

    let row = fetch_with_owner(&state.db, &id)
        .await?
        .ok_or_else(|| ApiError::not_found("Property not found"))?;

    let is_favorite = match &viewer {
        Some(user) => Some(is_favorited(&state.db, &user.id, &id).await?),
        None => None,
    };

    let reviews: Vec<ReviewWithUser> = sqlx::query_as(
        "SELECT r.*, u.name AS user_name FROM property_reviews r \
         JOIN users u ON u.id = r.user_id \
         WHERE r.property_id = ? ORDER BY r.created_at DESC",
    )
    .bind(&id)
    .fetch_all(&state.db)
    .await?;

    let response = PropertyResponse::from_row(row, is_favorite)
        .with_reviews(reviews.into_iter().map(ReviewResponse::from).collect());
    Ok(Json(ApiResponse::data(response)))
}

/// Create a listing (sellers and admins only)
pub async fn create_property(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Json(req): Json<CreatePropertyRequest>,
) -> Result<(StatusCode, Json<ApiResponse<PropertyResponse>>), ApiError> {
    require_seller(&user)?;
    validate_create_request(&req)?;

    let id = uuid::Uuid::new_v4().to_string();
    let now = chrono::Utc::now().to_rfc3339();
    let (latitude, longitude) = match &req.location.coordinates {
        Some(c) => (Some(c.latitude), Some(c.longitude)),
        None => (None, None),
    };

    sqlx::query(
        "INSERT INTO properties (
            id, name, description, price, price_type, property_type,
            bedrooms, bathrooms, area, area_unit,
            address, city, state, pincode, latitude, longitude,
            amenities, images, tags, owner_id,
            ready_to_move, is_featured, created_at, updated_at
         ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(req.name.trim())
    .bind(req.description.trim())
    .bind(req.price)
    .bind(&req.price_type)
    .bind(&req.property_type)
    .bind(req.bedrooms)
    .bind(req.bathrooms)
    .bind(req.area)
    .bind(&req.area_unit)
    .bind(req.location.address.trim())
    .bind(req.location.city.trim())
    .bind(req.location.state.trim())
    .bind(req.location.pincode.trim())
    .bind(latitude)
    .bind(longitude)
    .bind(encode_list(&req.amenities))
    .bind(encode_list(&req.images))
    .bind(encode_list(&req.tags))
    .bind(&user.id)
    .bind(req.ready_to_move)
    .bind(req.is_featured)
    .bind(&now)
    .bind(&now)
    .execute(&state.db)
    .await?;

    tracing::info!(property_id = %id, owner = %user.id, "Property created");

    let row = fetch_with_owner(&state.db, &id)
        .await?
        .ok_or_else(|| ApiError::internal("Server error"))?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::data(PropertyResponse::from_row(row, None))
            .with_message("Property created successfully")),
    ))
}

/// Partially update a listing (owner or admin)
pub async fn update_property(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
    Json(req): Json<UpdatePropertyRequest>,
) -> Result<Json<ApiResponse<PropertyResponse>>, ApiError> {
    validate_id(&id)?;

    let existing = fetch_with_owner(&state.db, &id)
        .await?
        .ok_or_else(|| ApiError::not_found("Property not found"))?;
    require_owner_or_admin(&user, &existing.property.owner_id)?;

    validate_update_request(&req)?;

    let p = existing.property;
    let (mut latitude, mut longitude) = (p.latitude, p.longitude);
    let (mut address, mut city, mut prop_state, mut pincode) =
        (p.address, p.city, p.state, p.pincode);
    if let Some(location) = &req.location {
        if let Some(v) = &location.address {
            address = v.trim().to_string();
        }
        if let Some(v) = &location.city {
            city = v.trim().to_string();
        }
        if let Some(v) = &location.state {
            prop_state = v.trim().to_string();
        }
        if let Some(v) = &location.pincode {
            pincode = v.trim().to_string();
        }
        if let Some(c) = &location.coordinates {
            latitude = Some(c.latitude);
            longitude = Some(c.longitude);
        }
    }

    let now = chrono::Utc::now().to_rfc3339();
    sqlx::query(
        "UPDATE properties SET
            name = ?, description = ?, price = ?, price_type = ?, property_type = ?,
            bedrooms = ?, bathrooms = ?, area = ?, area_unit = ?,
            address = ?, city = ?, state = ?, pincode = ?, latitude = ?, longitude = ?,
            amenities = ?, images = ?, tags = ?,
            ready_to_move = ?, is_featured = ?, is_active = ?, status = ?, updated_at = ?
         WHERE id = ?",
    )
    .bind(req.name.as_deref().map(str::trim).unwrap_or(&p.name))
    .bind(
        req.description
            .as_deref()
            .map(str::trim)
            .unwrap_or(&p.description),
    )
    .bind(req.price.unwrap_or(p.price))
    .bind(req.price_type.as_deref().unwrap_or(&p.price_type))
    .bind(req.property_type.as_deref().unwrap_or(&p.property_type))
    .bind(req.bedrooms.unwrap_or(p.bedrooms))
    .bind(req.bathrooms.unwrap_or(p.bathrooms))
    .bind(req.area.unwrap_or(p.area))
    .bind(req.area_unit.as_deref().unwrap_or(&p.area_unit))
    .bind(&address)
    .bind(&city)
    .bind(&prop_state)
    .bind(&pincode)
    .bind(latitude)
    .bind(longitude)
    .bind(
        req.amenities
            .as_deref()
            .map(encode_list)
            .unwrap_or(p.amenities),
    )
    .bind(req.images.as_deref().map(encode_list).unwrap_or(p.images))
    .bind(req.tags.as_deref().map(encode_list).unwrap_or(p.tags))
    .bind(req.ready_to_move.unwrap_or(p.ready_to_move))
    .bind(req.is_featured.unwrap_or(p.is_featured))
    .bind(req.is_active.unwrap_or(p.is_active))
    .bind(req.status.as_deref().unwrap_or(&p.status))
    .bind(&now)
    .bind(&id)
    .execute(&state.db)
    .await?;

    let row = fetch_with_owner(&state.db, &id)
        .await?
        .ok_or_else(|| ApiError::internal("Server error"))?;
    Ok(Json(
        ApiResponse::data(PropertyResponse::from_row(row, None))
            .with_message("Property updated successfully"),
    ))
}

/// Delete a listing (owner or admin); reviews and favorites cascade
pub async fn delete_property(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    validate_id(&id)?;

    let owner_id: Option<(String,)> =
        sqlx::query_as("SELECT owner_id FROM properties WHERE id = ?")
            .bind(&id)
            .fetch_optional(&state.db)
            .await?;
    let (owner_id,) = owner_id.ok_or_else(|| ApiError::not_found("Property not found"))?;
    require_owner_or_admin(&user, &owner_id)?;

    sqlx::query("DELETE FROM properties WHERE id = ?")
        .bind(&id)
        .execute(&state.db)
        .await?;

    tracing::info!(property_id = %id, by = %user.id, "Property deleted");
    Ok(Json(ApiResponse::message("Property deleted successfully")))
}

/// Add a review to a property; each user gets one review per property
pub async fn add_review(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
    Json(req): Json<ReviewRequest>,
) -> Result<(StatusCode, Json<ApiResponse<ReviewResponse>>), ApiError> {
    validate_id(&id)?;
    validate_review_request(&req)?;

    let exists: Option<(String,)> = sqlx::query_as("SELECT id FROM properties WHERE id = ?")
        .bind(&id)
        .fetch_optional(&state.db)
        .await?;
    if exists.is_none() {
        return Err(ApiError::not_found("Property not found"));
    }

    let review = record_review(&state.db, &id, &user, req.rating, req.comment.as_deref()).await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::data(review).with_message("Review added successfully")),
    ))
}

// -------------------------------------------------------------------------
// Shared data access
// -------------------------------------------------------------------------

pub(crate) async fn fetch_with_owner(
    pool: &DbPool,
    id: &str,
) -> Result<Option<PropertyWithOwner>, sqlx::Error> {
    sqlx::query_as(
        "SELECT p.*, u.name AS owner_name, u.email AS owner_email, u.phone AS owner_phone \
         FROM properties p JOIN users u ON u.id = p.owner_id WHERE p.id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await
}

/// Atomic view counter bump; loses nothing under concurrent reads
pub(crate) async fn increment_views(pool: &DbPool, id: &str) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE properties SET views = views + 1 WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

pub(crate) async fn is_favorited(
    pool: &DbPool,
    user_id: &str,
    property_id: &str,
) -> Result<bool, sqlx::Error> {
    let row: Option<(i64,)> =
        sqlx::query_as("SELECT 1 FROM favorites WHERE user_id = ? AND property_id = ?")
            .bind(user_id)
            .bind(property_id)
            .fetch_optional(pool)
            .await?;
    Ok(row.is_some())
}

/// Insert a review and recompute the property's average rating in one
/// transaction. The UNIQUE(property_id, user_id) constraint rejects
/// duplicates.
pub(crate) async fn record_review(
    pool: &DbPool,
    property_id: &str,
    user: &User,
    rating: i64,
    comment: Option<&str>,
) -> Result<ReviewResponse, ApiError> {
    let mut tx = pool.begin().await?;

    let review_id = uuid::Uuid::new_v4().to_string();
    let now = chrono::Utc::now().to_rfc3339();
    let inserted = sqlx::query(
        "INSERT INTO property_reviews (id, property_id, user_id, rating, comment, created_at)
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(&review_id)
    .bind(property_id)
    .bind(&user.id)
    .bind(rating)
    .bind(comment)
    .bind(&now)
    .execute(&mut *tx)
    .await;

    if let Err(sqlx::Error::Database(db_err)) = &inserted {
        if db_err.message().contains("UNIQUE constraint failed") {
            return Err(ApiError::bad_request(
                "You have already reviewed this property",
            ));
        }
    }
    inserted?;

    sqlx::query(
        "UPDATE properties SET rating = \
            (SELECT AVG(rating) FROM property_reviews WHERE property_id = ?) \
         WHERE id = ?",
    )
    .bind(property_id)
    .bind(property_id)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    Ok(ReviewResponse {
        id: review_id,
        user: crate::db::ReviewerSummary {
            id: user.id.clone(),
            name: user.name.clone(),
        },
        rating,
        comment: comment.map(str::to_string),
        created_at: now,
    })
}

// -------------------------------------------------------------------------
// Validation
// -------------------------------------------------------------------------

fn validate_id(id: &str) -> Result<(), ApiError> {
    validation::validate_uuid(id, "id").map_err(|e| ApiError::validation_field("id", e))
}

fn require_owner_or_admin(user: &User, owner_id: &str) -> Result<(), ApiError> {
    if user.id == owner_id || user.is_admin() {
        Ok(())
    } else {
        Err(ApiError::forbidden(
            "You do not have permission to modify this property",
        ))
    }
}

fn validate_create_request(req: &CreatePropertyRequest) -> Result<(), ApiError> {
    let mut errors = ValidationErrorBuilder::new();

    if let Err(e) = validation::validate_property_name(&req.name) {
        errors.add("name", e);
    }
    if let Err(e) = validation::validate_description(&req.description) {
        errors.add("description", e);
    }
    if let Err(e) = validation::validate_price(req.price) {
        errors.add("price", e);
    }
    if let Err(e) = req.price_type.parse::<PriceType>() {
        errors.add("priceType", e);
    }
    if let Err(e) = req.property_type.parse::<PropertyType>() {
        errors.add("propertyType", e);
    }
    if let Err(e) = validation::validate_room_count(req.bedrooms, "bedrooms") {
        errors.add("bedrooms", e);
    }
    if let Err(e) = validation::validate_room_count(req.bathrooms, "bathrooms") {
        errors.add("bathrooms", e);
    }
    if let Err(e) = validation::validate_area(req.area) {
        errors.add("area", e);
    }
    if let Err(e) = req.area_unit.parse::<AreaUnit>() {
        errors.add("areaUnit", e);
    }
    if let Err(e) = validation::validate_required(&req.location.address, "Address") {
        errors.add("location.address", e);
    }
    if let Err(e) = validation::validate_required(&req.location.city, "City") {
        errors.add("location.city", e);
    }
    if let Err(e) = validation::validate_required(&req.location.state, "State") {
        errors.add("location.state", e);
    }
    if let Err(e) = validation::validate_pincode(&req.location.pincode) {
        errors.add("location.pincode", e);
    }
    if req.images.is_empty() {
        errors.add("images", "At least one image is required");
    }

    errors.finish()
}

fn validate_update_request(req: &UpdatePropertyRequest) -> Result<(), ApiError> {
    let mut errors = ValidationErrorBuilder::new();

    if let Some(name) = &req.name {
        if let Err(e) = validation::validate_property_name(name) {
            errors.add("name", e);
        }
    }
    if let Some(description) = &req.description {
        if let Err(e) = validation::validate_description(description) {
            errors.add("description", e);
        }
    }
    if let Some(price) = req.price {
        if let Err(e) = validation::validate_price(price) {
            errors.add("price", e);
        }
    }
    if let Some(price_type) = &req.price_type {
        if let Err(e) = price_type.parse::<PriceType>() {
            errors.add("priceType", e);
        }
    }
    if let Some(property_type) = &req.property_type {
        if let Err(e) = property_type.parse::<PropertyType>() {
            errors.add("propertyType", e);
        }
    }
    if let Some(bedrooms) = req.bedrooms {
        if let Err(e) = validation::validate_room_count(bedrooms, "bedrooms") {
            errors.add("bedrooms", e);
        }
    }
    if let Some(bathrooms) = req.bathrooms {
        if let Err(e) = validation::validate_room_count(bathrooms, "bathrooms") {
            errors.add("bathrooms", e);
        }
    }
    if let Some(area) = req.area {
        if let Err(e) = validation::validate_area(area) {
            errors.add("area", e);
        }
    }
    if let Some(area_unit) = &req.area_unit {
        if let Err(e) = area_unit.parse::<AreaUnit>() {
            errors.add("areaUnit", e);
        }
    }
    if let Some(location) = &req.location {
        if let Some(pincode) = &location.pincode {
            if let Err(e) = validation::validate_pincode(pincode) {
                errors.add("location.pincode", e);
            }
        }
    }
    if let Some(images) = &req.images {
        if images.is_empty() {
            errors.add("images", "At least one image is required");
        }
    }
    if let Some(status) = &req.status {
        if let Err(e) = status.parse::<PropertyStatus>() {
            errors.add("status", e);
        }
    }

    errors.finish()
}

fn validate_review_request(req: &ReviewRequest) -> Result<(), ApiError> {
    let mut errors = ValidationErrorBuilder::new();
    if let Err(e) = validation::validate_rating(req.rating) {
        errors.add("rating", e);
    }
    if let Some(comment) = &req.comment {
        if let Err(e) = validation::validate_comment(comment) {
            errors.add("comment", e);
        }
    }
    errors.finish()
}
