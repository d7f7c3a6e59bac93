use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;

// -------------------------------------------------------------------------
// Enums (stored as TEXT, parsed strictly at the validation boundary)
// -------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriceType {
    Sale,
    Rent,
}

impl PriceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sale => "sale",
            Self::Rent => "rent",
        }
    }
}

impl FromStr for PriceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sale" => Ok(Self::Sale),
            "rent" => Ok(Self::Rent),
            _ => Err("Price type must be sale or rent".to_string()),
        }
    }
}

impl fmt::Display for PriceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PropertyType {
    Apartment,
    House,
    Villa,
    Commercial,
    Land,
    Office,
}

impl PropertyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Apartment => "apartment",
            Self::House => "house",
            Self::Villa => "villa",
            Self::Commercial => "commercial",
            Self::Land => "land",
            Self::Office => "office",
        }
    }
}

impl FromStr for PropertyType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "apartment" => Ok(Self::Apartment),
            "house" => Ok(Self::House),
            "villa" => Ok(Self::Villa),
            "commercial" => Ok(Self::Commercial),
            "land" => Ok(Self::Land),
            "office" => Ok(Self::Office),
            _ => Err("Invalid property type".to_string()),
        }
    }
}

impl fmt::Display for PropertyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AreaUnit {
    Sqft,
    Sqm,
    Acres,
    Hectares,
}

impl AreaUnit {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sqft => "sqft",
            Self::Sqm => "sqm",
            Self::Acres => "acres",
            Self::Hectares => "hectares",
        }
    }
}

impl FromStr for AreaUnit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sqft" => Ok(Self::Sqft),
            "sqm" => Ok(Self::Sqm),
            "acres" => Ok(Self::Acres),
            "hectares" => Ok(Self::Hectares),
            _ => Err("Invalid area unit".to_string()),
        }
    }
}

/// Listing lifecycle state. Any value in the enum may be set by the
/// owner/admin regardless of the current state; no transition graph is
/// enforced beyond membership in this set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PropertyStatus {
    Available,
    Sold,
    Rented,
    Pending,
}

impl PropertyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Available => "available",
            Self::Sold => "sold",
            Self::Rented => "rented",
            Self::Pending => "pending",
        }
    }
}

impl FromStr for PropertyStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "available" => Ok(Self::Available),
            "sold" => Ok(Self::Sold),
            "rented" => Ok(Self::Rented),
            "pending" => Ok(Self::Pending),
            _ => Err("Status must be one of available, sold, rented, pending".to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Buyer,
    Seller,
    Admin,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Buyer => "buyer",
            Self::Seller => "seller",
            Self::Admin => "admin",
        }
    }
}

impl FromStr for UserRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "buyer" => Ok(Self::Buyer),
            "seller" => Ok(Self::Seller),
            "admin" => Ok(Self::Admin),
            _ => Err("Invalid role".to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContactStatus {
    Pending,
    InProgress,
    Resolved,
    Closed,
}

impl ContactStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in-progress",
            Self::Resolved => "resolved",
            Self::Closed => "closed",
        }
    }
}

impl FromStr for ContactStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "in-progress" => Ok(Self::InProgress),
            "resolved" => Ok(Self::Resolved),
            "closed" => Ok(Self::Closed),
            _ => Err("Invalid status".to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContactPriority {
    Low,
    Medium,
    High,
    Urgent,
}

impl ContactPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Urgent => "urgent",
        }
    }
}

impl FromStr for ContactPriority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "urgent" => Ok(Self::Urgent),
            _ => Err("Invalid priority".to_string()),
        }
    }
}

// -------------------------------------------------------------------------
// Rows
// -------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub password_hash: String,
    pub role: String,
    pub is_verified: bool,
    pub is_active: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role == "admin"
    }

    pub fn can_list_properties(&self) -> bool {
        self.role == "seller" || self.role == "admin"
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Session {
    pub id: String,
    pub user_id: String,
    pub token_hash: String,
    pub expires_at: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Property {
    pub id: String,
    pub name: String,
    pub description: String,
    pub price: f64,
    pub price_type: String,
    pub property_type: String,
    pub bedrooms: i64,
    pub bathrooms: i64,
    pub area: f64,
    pub area_unit: String,
    pub address: String,
    pub city: String,
    pub state: String,
    pub pincode: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub amenities: String,
    pub images: String,
    pub tags: String,
    pub owner_id: String,
    pub status: String,
    pub ready_to_move: bool,
    pub is_featured: bool,
    pub is_active: bool,
    pub views: i64,
    pub favorite_count: i64,
    pub rating: f64,
    pub created_at: String,
    pub updated_at: String,
}

/// Property row joined with its owner's public columns.
#[derive(Debug, Clone, FromRow)]
pub struct PropertyWithOwner {
    #[sqlx(flatten)]
    pub property: Property,
    pub owner_name: String,
    pub owner_email: String,
    pub owner_phone: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PropertyReview {
    pub id: String,
    pub property_id: String,
    pub user_id: String,
    pub rating: i64,
    pub comment: Option<String>,
    pub created_at: String,
}

/// Review row joined with the reviewer's display name.
#[derive(Debug, Clone, FromRow)]
pub struct ReviewWithUser {
    #[sqlx(flatten)]
    pub review: PropertyReview,
    pub user_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    pub id: String,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub subject: String,
    pub message: String,
    pub property_id: Option<String>,
    pub status: String,
    pub priority: String,
    pub is_read: bool,
    pub assigned_to: Option<String>,
    pub response_message: Option<String>,
    pub responded_by: Option<String>,
    pub responded_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

// -------------------------------------------------------------------------
// JSON list columns (amenities, images, tags)
// -------------------------------------------------------------------------

pub fn encode_list(items: &[String]) -> String {
    serde_json::to_string(items).unwrap_or_else(|_| "[]".to_string())
}

pub fn decode_list(raw: &str) -> Vec<String> {
    serde_json::from_str(raw).unwrap_or_default()
}

// -------------------------------------------------------------------------
// Request DTOs
// -------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    pub phone: String,
    #[serde(default)]
    pub role: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CoordinatesPayload {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Deserialize)]
pub struct LocationPayload {
    pub address: String,
    pub city: String,
    pub state: String,
    pub pincode: String,
    #[serde(default)]
    pub coordinates: Option<CoordinatesPayload>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePropertyRequest {
    pub name: String,
    pub description: String,
    pub price: f64,
    #[serde(default = "default_price_type")]
    pub price_type: String,
    pub property_type: String,
    #[serde(default)]
    pub bedrooms: i64,
    #[serde(default)]
    pub bathrooms: i64,
    pub area: f64,
    #[serde(default = "default_area_unit")]
    pub area_unit: String,
    pub location: LocationPayload,
    #[serde(default)]
    pub amenities: Vec<String>,
    pub images: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub ready_to_move: bool,
    #[serde(default)]
    pub is_featured: bool,
}

fn default_price_type() -> String {
    "sale".to_string()
}

fn default_area_unit() -> String {
    "sqft".to_string()
}

#[derive(Debug, Deserialize)]
pub struct UpdateLocationPayload {
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub pincode: Option<String>,
    #[serde(default)]
    pub coordinates: Option<CoordinatesPayload>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePropertyRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub price: Option<f64>,
    pub price_type: Option<String>,
    pub property_type: Option<String>,
    pub bedrooms: Option<i64>,
    pub bathrooms: Option<i64>,
    pub area: Option<f64>,
    pub area_unit: Option<String>,
    pub location: Option<UpdateLocationPayload>,
    pub amenities: Option<Vec<String>>,
    pub images: Option<Vec<String>>,
    pub tags: Option<Vec<String>>,
    pub ready_to_move: Option<bool>,
    pub is_featured: Option<bool>,
    pub is_active: Option<bool>,
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ReviewRequest {
    pub rating: i64,
    #[serde(default)]
    pub comment: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactRequest {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub subject: String,
    pub message: String,
    #[serde(default)]
    pub property_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateContactRequest {
    pub status: Option<String>,
    pub priority: Option<String>,
    pub assigned_to: Option<String>,
    pub response: Option<ContactResponsePayload>,
}

#[derive(Debug, Deserialize)]
pub struct ContactResponsePayload {
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateProfileRequest {
    pub name: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminUpdateUserRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub role: Option<String>,
    pub is_active: Option<bool>,
    pub is_verified: Option<bool>,
}

// -------------------------------------------------------------------------
// Response projections
// -------------------------------------------------------------------------

/// Public user projection; the password hash never leaves the data layer.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub id: String,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub role: String,
    pub is_verified: bool,
    pub is_active: bool,
    pub created_at: String,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            name: user.name,
            email: user.email,
            phone: user.phone,
            role: user.role,
            is_verified: user.is_verified,
            is_active: user.is_active,
            created_at: user.created_at,
        }
    }
}

/// Restricted owner projection attached to property responses.
#[derive(Debug, Clone, Serialize)]
pub struct OwnerSummary {
    pub id: String,
    pub name: String,
    pub email: String,
    pub phone: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct LocationResponse {
    pub address: String,
    pub city: String,
    pub state: String,
    pub pincode: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coordinates: Option<CoordinatesPayload>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewResponse {
    pub id: String,
    pub user: ReviewerSummary,
    pub rating: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReviewerSummary {
    pub id: String,
    pub name: String,
}

impl From<ReviewWithUser> for ReviewResponse {
    fn from(row: ReviewWithUser) -> Self {
        Self {
            id: row.review.id,
            user: ReviewerSummary {
                id: row.review.user_id,
                name: row.user_name,
            },
            rating: row.review.rating,
            comment: row.review.comment,
            created_at: row.review.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyResponse {
    pub id: String,
    pub name: String,
    pub description: String,
    pub price: f64,
    pub price_type: String,
    pub property_type: String,
    pub bedrooms: i64,
    pub bathrooms: i64,
    pub area: f64,
    pub area_unit: String,
    pub location: LocationResponse,
    pub amenities: Vec<String>,
    pub images: Vec<String>,
    pub tags: Vec<String>,
    pub owner: OwnerSummary,
    pub status: String,
    pub ready_to_move: bool,
    pub is_featured: bool,
    pub is_active: bool,
    pub views: i64,
    pub favorites: i64,
    pub rating: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_favorite: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reviews: Option<Vec<ReviewResponse>>,
    pub created_at: String,
    pub updated_at: String,
}

impl PropertyResponse {
    /// Shape a joined row for the wire. `is_favorite` stays `None` (and is
    /// omitted from the JSON) for anonymous viewers.
    pub fn from_row(row: PropertyWithOwner, is_favorite: Option<bool>) -> Self {
        let p = row.property;
        let coordinates = match (p.latitude, p.longitude) {
            (Some(latitude), Some(longitude)) => Some(CoordinatesPayload {
                latitude,
                longitude,
            }),
            _ => None,
        };
        Self {
            id: p.id,
            name: p.name,
            description: p.description,
            price: p.price,
            price_type: p.price_type,
            property_type: p.property_type,
            bedrooms: p.bedrooms,
            bathrooms: p.bathrooms,
            area: p.area,
            area_unit: p.area_unit,
            location: LocationResponse {
                address: p.address,
                city: p.city,
                state: p.state,
                pincode: p.pincode,
                coordinates,
            },
            amenities: decode_list(&p.amenities),
            images: decode_list(&p.images),
            tags: decode_list(&p.tags),
            owner: OwnerSummary {
                id: p.owner_id,
                name: row.owner_name,
                email: row.owner_email,
                phone: row.owner_phone,
            },
            status: p.status,
            ready_to_move: p.ready_to_move,
            is_featured: p.is_featured,
            is_active: p.is_active,
            views: p.views,
            favorites: p.favorite_count,
            rating: p.rating,
            is_favorite,
            reviews: None,
            created_at: p.created_at,
            updated_at: p.updated_at,
        }
    }

    pub fn with_reviews(mut self, reviews: Vec<ReviewResponse>) -> Self {
        self.reviews = Some(reviews);
        self
    }
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: UserResponse,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStats {
    pub total_properties: i64,
    pub total_favorites: i64,
    pub active_properties: i64,
    pub total_views: i64,
    pub average_rating: f64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactStats {
    pub total: i64,
    pub pending: i64,
    pub in_progress: i64,
    pub resolved: i64,
    pub closed: i64,
    pub unread: i64,
    pub resolved_rate: f64,
}
