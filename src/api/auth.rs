use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use axum::{
    async_trait,
    extract::{FromRequestParts, State},
    http::request::Parts,
    Json,
};
use rand::Rng;
use sha2::{Digest, Sha256};
use std::sync::Arc;

use super::error::{ApiError, ValidationErrorBuilder};
use super::response::ApiResponse;
use super::validation::{validate_email, validate_password, validate_person_name, validate_phone};
use crate::db::{DbPool, LoginRequest, LoginResponse, RegisterRequest, User, UserResponse};
use crate::AppState;

/// Hash a password using Argon2
pub fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let hash = argon2.hash_password(password.as_bytes(), &salt)?;
    Ok(hash.to_string())
}

/// Verify a password against a hash
pub fn verify_password(password: &str, hash: &str) -> bool {
    let parsed_hash = match PasswordHash::new(hash) {
        Ok(h) => h,
        Err(_) => return false,
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok()
}

/// Generate a random token
fn generate_token() -> String {
    let mut rng = rand::rng();
    let bytes: [u8; 32] = rng.random();
    hex::encode(bytes)
}

/// Hash a token for storage
fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

/// Create a session row for a user and return the raw token
async fn create_session(pool: &DbPool, user_id: &str, session_days: i64) -> Result<String, ApiError> {
    let token = generate_token();
    let token_hash = hash_token(&token);
    let expires_at = chrono::Utc::now()
        .checked_add_signed(chrono::Duration::days(session_days))
        .unwrap_or_else(chrono::Utc::now)
        .to_rfc3339();

    let session_id = uuid::Uuid::new_v4().to_string();
    sqlx::query("INSERT INTO sessions (id, user_id, token_hash, expires_at) VALUES (?, ?, ?, ?)")
        .bind(&session_id)
        .bind(user_id)
        .bind(&token_hash)
        .bind(&expires_at)
        .execute(pool)
        .await?;

    Ok(token)
}

/// Delete session rows whose expiry has passed
pub async fn purge_expired_sessions(pool: &DbPool) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM sessions WHERE expires_at <= datetime('now')")
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

/// Periodically sweep expired sessions so the table does not grow without bound
pub fn spawn_session_sweeper(pool: DbPool, sweep_interval_secs: u64) {
    tokio::spawn(async move {
        let interval = std::time::Duration::from_secs(sweep_interval_secs);
        loop {
            tokio::time::sleep(interval).await;
            match purge_expired_sessions(&pool).await {
                Ok(0) => {}
                Ok(removed) => tracing::debug!("Removed {} expired sessions", removed),
                Err(e) => tracing::warn!("Session sweep failed: {}", e),
            }
        }
    });
}

fn validate_register_request(req: &RegisterRequest) -> Result<(), ApiError> {
    let mut errors = ValidationErrorBuilder::new();

    if let Err(e) = validate_person_name(&req.name) {
        errors.add("name", e);
    }
    if let Err(e) = validate_email(&req.email) {
        errors.add("email", e);
    }
    if let Err(e) = validate_password(&req.password) {
        errors.add("password", e);
    }
    if let Err(e) = validate_phone(&req.phone) {
        errors.add("phone", e);
    }
    if let Some(role) = &req.role {
        // Admin accounts are seeded from config, never self-registered
        if role != "buyer" && role != "seller" {
            errors.add("role", "Role must be buyer or seller");
        }
    }

    errors.finish()
}

/// Register a new buyer or seller account
pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegisterRequest>,
) -> Result<Json<ApiResponse<LoginResponse>>, ApiError> {
    validate_register_request(&req)?;

    let existing: Option<(String,)> = sqlx::query_as("SELECT id FROM users WHERE email = ?")
        .bind(&req.email)
        .fetch_optional(&state.db)
        .await?;
    if existing.is_some() {
        return Err(ApiError::validation_field(
            "email",
            "An account with this email already exists",
        ));
    }

    let id = uuid::Uuid::new_v4().to_string();
    let password_hash = hash_password(&req.password).map_err(|e| {
        tracing::error!("Failed to hash password: {}", e);
        ApiError::internal("Server error")
    })?;
    let role = req.role.as_deref().unwrap_or("buyer");
    let now = chrono::Utc::now().to_rfc3339();

    sqlx::query(
        "INSERT INTO users (id, name, email, phone, password_hash, role, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(req.name.trim())
    .bind(&req.email)
    .bind(&req.phone)
    .bind(&password_hash)
    .bind(role)
    .bind(&now)
    .bind(&now)
    .execute(&state.db)
    .await?;

    tracing::info!(email = %req.email, role = %role, "User registered");

    let user: User = sqlx::query_as("SELECT * FROM users WHERE id = ?")
        .bind(&id)
        .fetch_one(&state.db)
        .await?;

    let token = create_session(&state.db, &id, state.config.auth.session_days).await?;

    Ok(Json(ApiResponse::data(LoginResponse {
        token,
        user: UserResponse::from(user),
    })))
}

/// Login endpoint
pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<ApiResponse<LoginResponse>>, ApiError> {
    let user: Option<User> = sqlx::query_as("SELECT * FROM users WHERE email = ?")
        .bind(&req.email)
        .fetch_optional(&state.db)
        .await?;

    let user = user.ok_or_else(|| ApiError::unauthorized("Invalid credentials"))?;

    if !verify_password(&req.password, &user.password_hash) {
        return Err(ApiError::unauthorized("Invalid credentials"));
    }

    if !user.is_active {
        return Err(ApiError::forbidden("Account is deactivated"));
    }

    let token = create_session(&state.db, &user.id, state.config.auth.session_days).await?;

    Ok(Json(ApiResponse::data(LoginResponse {
        token,
        user: UserResponse::from(user),
    })))
}

/// Current user endpoint
pub async fn me(AuthUser(user): AuthUser) -> Json<ApiResponse<UserResponse>> {
    Json(ApiResponse::data(UserResponse::from(user)))
}

/// Ensure a seed admin account exists when one is configured
pub async fn ensure_admin_user(
    pool: &DbPool,
    email: &str,
    password: Option<&str>,
) -> anyhow::Result<()> {
    let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users WHERE role = 'admin'")
        .fetch_one(pool)
        .await?;
    if count.0 > 0 {
        return Ok(());
    }

    let Some(password) = password else {
        tracing::warn!("No admin account exists and auth.admin_password is not set");
        return Ok(());
    };

    let id = uuid::Uuid::new_v4().to_string();
    let password_hash =
        hash_password(password).map_err(|e| anyhow::anyhow!("Failed to hash password: {}", e))?;
    let now = chrono::Utc::now().to_rfc3339();

    sqlx::query(
        "INSERT INTO users (id, name, email, phone, password_hash, role, is_verified, created_at, updated_at)
         VALUES (?, 'Admin', ?, '0000000000', ?, 'admin', 1, ?, ?)",
    )
    .bind(&id)
    .bind(email)
    .bind(&password_hash)
    .bind(&now)
    .bind(&now)
    .execute(pool)
    .await?;

    tracing::info!(email = %email, "Created seed admin user");
    Ok(())
}

/// Extract the bearer token from request headers
fn extract_token(parts: &Parts) -> Option<String> {
    parts
        .headers
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(|s| s.to_string())
}

/// Look up the user behind a session token, if the session is still valid
async fn lookup_user(pool: &DbPool, token: &str) -> Result<Option<User>, sqlx::Error> {
    let token_hash = hash_token(token);
    let user: Option<User> = sqlx::query_as(
        "SELECT u.* FROM users u
         JOIN sessions s ON s.user_id = u.id
         WHERE s.token_hash = ? AND s.expires_at > datetime('now') AND u.is_active = 1",
    )
    .bind(&token_hash)
    .fetch_optional(pool)
    .await?;
    Ok(user)
}

/// Extractor for endpoints that require an authenticated user
pub struct AuthUser(pub User);

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = extract_token(parts)
            .ok_or_else(|| ApiError::unauthorized("Authentication required"))?;
        let user = lookup_user(&state.db, &token)
            .await
            .map_err(ApiError::from)?
            .ok_or_else(|| ApiError::unauthorized("Invalid or expired token"))?;
        Ok(AuthUser(user))
    }
}

/// Extractor for public endpoints whose responses are enriched for
/// authenticated viewers. An absent or invalid token yields `None` rather
/// than a rejection.
pub struct MaybeUser(pub Option<User>);

#[async_trait]
impl FromRequestParts<Arc<AppState>> for MaybeUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let Some(token) = extract_token(parts) else {
            return Ok(MaybeUser(None));
        };
        let user = lookup_user(&state.db, &token)
            .await
            .map_err(ApiError::from)?;
        Ok(MaybeUser(user))
    }
}

/// Guard for admin-only endpoints
pub fn require_admin(user: &User) -> Result<(), ApiError> {
    if user.is_admin() {
        Ok(())
    } else {
        Err(ApiError::forbidden("Admin access required"))
    }
}

/// Guard for endpoints restricted to sellers and admins
pub fn require_seller(user: &User) -> Result<(), ApiError> {
    if user.can_list_properties() {
        Ok(())
    } else {
        Err(ApiError::forbidden("Seller access required"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_test;

    async fn seed_session_user(pool: &DbPool) -> String {
        let id = uuid::Uuid::new_v4().to_string();
        let now = chrono::Utc::now().to_rfc3339();
        sqlx::query(
            "INSERT INTO users (id, name, email, phone, password_hash, role, created_at, updated_at)
             VALUES (?, 'Session Tester', 'sessions@example.com', '9876543210', 'x', 'buyer', ?, ?)",
        )
        .bind(&id)
        .bind(&now)
        .bind(&now)
        .execute(pool)
        .await
        .unwrap();
        id
    }

    #[tokio::test]
    async fn expired_sessions_are_swept() {
        let pool = init_test().await;
        let user_id = seed_session_user(&pool).await;

        let stale = create_session(&pool, &user_id, -1).await.unwrap();
        let live = create_session(&pool, &user_id, 7).await.unwrap();

        assert_eq!(purge_expired_sessions(&pool).await.unwrap(), 1);
        assert!(lookup_user(&pool, &stale).await.unwrap().is_none());
        assert!(lookup_user(&pool, &live).await.unwrap().is_some());

        // nothing left to sweep
        assert_eq!(purge_expired_sessions(&pool).await.unwrap(), 0);
    }

    #[test]
    fn test_password_hash_and_verify() {
        let hash = hash_password("hunter2secret").unwrap();
        assert!(verify_password("hunter2secret", &hash));
        assert!(!verify_password("wrong", &hash));
        assert!(!verify_password("hunter2secret", "not-a-hash"));
    }

    #[test]
    fn test_token_hash_is_stable() {
        let token = generate_token();
        assert_eq!(token.len(), 64);
        assert_eq!(hash_token(&token), hash_token(&token));
        assert_ne!(hash_token(&token), token);
    }

    #[test]
    fn test_register_validation() {
        let req = RegisterRequest {
            name: "J".to_string(),
            email: "bad".to_string(),
            password: "123".to_string(),
            phone: "555".to_string(),
            role: Some("admin".to_string()),
        };
        assert!(validate_register_request(&req).is_err());

        let req = RegisterRequest {
            name: "Jane Smith".to_string(),
            email: "jane@example.com".to_string(),
            password: "password123".to_string(),
            phone: "9876543211".to_string(),
            role: Some("seller".to_string()),
        };
        assert!(validate_register_request(&req).is_ok());
    }
}
