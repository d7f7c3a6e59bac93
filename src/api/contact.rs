//! Contact form intake and admin inbox.
//!
//! Submission is public; everything past intake is admin-only. Reading a
//! submission marks it as read, and attaching a response records who
//! responded and when.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::auth::{require_admin, AuthUser};
use super::error::{ApiError, ValidationErrorBuilder};
use super::response::{ApiResponse, Pagination};
use super::validation;
use crate::db::{
    Contact, ContactPriority, ContactRequest, ContactStats, ContactStatus, UpdateContactRequest,
};
use crate::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactReceipt {
    pub id: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListContactsParams {
    pub page: Option<String>,
    pub limit: Option<String>,
    pub status: Option<String>,
    pub priority: Option<String>,
}

fn validate_contact_request(req: &ContactRequest) -> Result<(), ApiError> {
    let mut errors = ValidationErrorBuilder::new();
    if let Err(e) = validation::validate_person_name(&req.name) {
        errors.add("name", e);
    }
    if let Err(e) = validation::validate_email(&req.email) {
        errors.add("email", e);
    }
    if let Err(e) = validation::validate_phone(&req.phone) {
        errors.add("phone", e);
    }
    if let Err(e) = validation::validate_subject(&req.subject) {
        errors.add("subject", e);
    }
    if let Err(e) = validation::validate_message(&req.message) {
        errors.add("message", e);
    }
    if let Some(property_id) = &req.property_id {
        if let Err(e) = validation::validate_uuid(property_id, "propertyId") {
            errors.add("propertyId", e);
        }
    }
    errors.finish()
}

/// Public contact form submission
pub async fn submit_contact(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ContactRequest>,
) -> Result<(StatusCode, Json<ApiResponse<ContactReceipt>>), ApiError> {
    validate_contact_request(&req)?;

    // A dangling property reference downgrades to an untargeted inquiry
    let property_id = match &req.property_id {
        Some(pid) => {
            let exists: Option<(String,)> =
                sqlx::query_as("SELECT id FROM properties WHERE id = ?")
                    .bind(pid)
                    .fetch_optional(&state.db)
                    .await?;
            exists.map(|(id,)| id)
        }
        None => None,
    };

    let id = uuid::Uuid::new_v4().to_string();
    let now = chrono::Utc::now().to_rfc3339();
    sqlx::query(
        "INSERT INTO contacts (id, name, email, phone, subject, message, property_id,
                created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(req.name.trim())
    .bind(req.email.trim())
    .bind(&req.phone)
    .bind(req.subject.trim())
    .bind(req.message.trim())
    .bind(&property_id)
    .bind(&now)
    .bind(&now)
    .execute(&state.db)
    .await?;

    tracing::info!(contact_id = %id, "Contact submission received");
    Ok((
        StatusCode::CREATED,
        Json(
            ApiResponse::data(ContactReceipt { id })
                .with_message("Thank you for contacting us. We will get back to you soon."),
        ),
    ))
}

/// Admin inbox, filterable by status and priority
pub async fn list_contacts(
    State(state): State<Arc<AppState>>,
    AuthUser(admin): AuthUser,
    Query(params): Query<ListContactsParams>,
) -> Result<Json<ApiResponse<Vec<Contact>>>, ApiError> {
    require_admin(&admin)?;

    let mut errors = ValidationErrorBuilder::new();
    let mut page = 1i64;
    let mut limit = 10i64;
    let mut status: Option<ContactStatus> = None;
    let mut priority: Option<ContactPriority> = None;

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
    if let Some(raw) = &params.status {
        match raw.parse::<ContactStatus>() {
            Ok(s) => status = Some(s),
            Err(e) => {
                errors.add("status", e);
            }
        }
    }
    if let Some(raw) = &params.priority {
        match raw.parse::<ContactPriority>() {
            Ok(p) => priority = Some(p),
            Err(e) => {
                errors.add("priority", e);
            }
        }
    }
    errors.finish()?;

    let mut count_qb = sqlx::QueryBuilder::new("SELECT COUNT(*) FROM contacts WHERE 1 = 1");
    let mut qb = sqlx::QueryBuilder::new("SELECT * FROM contacts WHERE 1 = 1");
    for builder in [&mut count_qb, &mut qb] {
        if let Some(status) = status {
            builder.push(" AND status = ");
            builder.push_bind(status.as_str());
        }
        if let Some(priority) = priority {
            builder.push(" AND priority = ");
            builder.push_bind(priority.as_str());
        }
    }

    let (total,): (i64,) = count_qb.build_query_as().fetch_one(&state.db).await?;

    qb.push(" ORDER BY created_at DESC, id ASC LIMIT ");
    qb.push_bind(limit);
    qb.push(" OFFSET ");
    qb.push_bind((page - 1) * limit);
    let contacts: Vec<Contact> = qb.build_query_as().fetch_all(&state.db).await?;

    Ok(Json(ApiResponse::paginated(
        contacts,
        Pagination::new(page, limit, total),
    )))
}

/// Inbox counters grouped by status
pub async fn contact_stats(
    State(state): State<Arc<AppState>>,
    AuthUser(admin): AuthUser,
) -> Result<Json<ApiResponse<ContactStats>>, ApiError> {
    require_admin(&admin)?;

    let (total, pending, in_progress, resolved, closed, unread): (i64, i64, i64, i64, i64, i64) =
        sqlx::query_as(
            "SELECT COUNT(*), \
                COALESCE(SUM(status = 'pending'), 0), \
                COALESCE(SUM(status = 'in-progress'), 0), \
                COALESCE(SUM(status = 'resolved'), 0), \
                COALESCE(SUM(status = 'closed'), 0), \
                COALESCE(SUM(is_read = 0), 0) \
             FROM contacts",
        )
        .fetch_one(&state.db)
        .await?;

    let resolved_rate = if total > 0 {
        resolved as f64 / total as f64
    } else {
        0.0
    };

    Ok(Json(ApiResponse::data(ContactStats {
        total,
        pending,
        in_progress,
        resolved,
        closed,
        unread,
        resolved_rate,
    })))
}

/// Fetch one submission, marking it read
pub async fn get_contact(
    State(state): State<Arc<AppState>>,
    AuthUser(admin): AuthUser,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<Contact>>, ApiError> {
    require_admin(&admin)?;
    validation::validate_uuid(&id, "id").map_err(|e| ApiError::validation_field("id", e))?;

    sqlx::query("UPDATE contacts SET is_read = 1 WHERE id = ?")
        .bind(&id)
        .execute(&state.db)
        .await?;

    let contact: Option<Contact> = sqlx::query_as("SELECT * FROM contacts WHERE id = ?")
        .bind(&id)
        .fetch_optional(&state.db)
        .await?;
    let contact = contact.ok_or_else(|| ApiError::not_found("Contact submission not found"))?;
    Ok(Json(ApiResponse::data(contact)))
}

/// Update status, priority, assignment or attach a response
pub async fn update_contact(
    State(state): State<Arc<AppState>>,
    AuthUser(admin): AuthUser,
    Path(id): Path<String>,
    Json(req): Json<UpdateContactRequest>,
) -> Result<Json<ApiResponse<Contact>>, ApiError> {
    require_admin(&admin)?;
    validation::validate_uuid(&id, "id").map_err(|e| ApiError::validation_field("id", e))?;

    let existing: Option<Contact> = sqlx::query_as("SELECT * FROM contacts WHERE id = ?")
        .bind(&id)
        .fetch_optional(&state.db)
        .await?;
    let existing = existing.ok_or_else(|| ApiError::not_found("Contact submission not found"))?;

    let mut errors = ValidationErrorBuilder::new();
    if let Some(status) = &req.status {
        if let Err(e) = status.parse::<ContactStatus>() {
            errors.add("status", e);
        }
    }
    if let Some(priority) = &req.priority {
        if let Err(e) = priority.parse::<ContactPriority>() {
            errors.add("priority", e);
        }
    }
    if let Some(assigned_to) = &req.assigned_to {
        if let Err(e) = validation::validate_uuid(assigned_to, "assignedTo") {
            errors.add("assignedTo", e);
        }
    }
    if let Some(response) = &req.response {
        if let Err(e) = validation::validate_message(&response.message) {
            errors.add("response.message", e);
        }
    }
    errors.finish()?;

    let now = chrono::Utc::now().to_rfc3339();
    let (response_message, responded_by, responded_at) = match &req.response {
        Some(response) => (
            Some(response.message.trim().to_string()),
            Some(admin.id.clone()),
            Some(now.clone()),
        ),
        None => (
            existing.response_message.clone(),
            existing.responded_by.clone(),
            existing.responded_at.clone(),
        ),
    };

    sqlx::query(
        "UPDATE contacts SET status = ?, priority = ?, assigned_to = ?, \
                response_message = ?, responded_by = ?, responded_at = ?, updated_at = ? \
         WHERE id = ?",
    )
    .bind(req.status.as_deref().unwrap_or(&existing.status))
    .bind(req.priority.as_deref().unwrap_or(&existing.priority))
    .bind(req.assigned_to.as_deref().or(existing.assigned_to.as_deref()))
    .bind(&response_message)
    .bind(&responded_by)
    .bind(&responded_at)
    .bind(&now)
    .bind(&id)
    .execute(&state.db)
    .await?;

    let updated: Contact = sqlx::query_as("SELECT * FROM contacts WHERE id = ?")
        .bind(&id)
        .fetch_one(&state.db)
        .await?;
    Ok(Json(
        ApiResponse::data(updated).with_message("Contact submission updated"),
    ))
}

/// Delete a submission (admin only)
pub async fn delete_contact(
    State(state): State<Arc<AppState>>,
    AuthUser(admin): AuthUser,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    require_admin(&admin)?;
    validation::validate_uuid(&id, "id").map_err(|e| ApiError::validation_field("id", e))?;

    let deleted = sqlx::query("DELETE FROM contacts WHERE id = ?")
        .bind(&id)
        .execute(&state.db)
        .await?;
    if deleted.rows_affected() == 0 {
        return Err(ApiError::not_found("Contact submission not found"));
    }
    Ok(Json(ApiResponse::message("Contact submission deleted")))
}
