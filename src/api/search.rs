//! Property listing query pipeline.
//!
//! Turns the optional query parameters of `GET /api/properties` into a
//! structured filter, executes it with a deterministic sort and a bounded
//! page window, and annotates the results with viewer-specific state.
//! Validation happens up front; out-of-range page sizes are rejected, never
//! clamped.

use serde::Deserialize;
use sqlx::{QueryBuilder, Sqlite};
use std::collections::HashSet;
use std::str::FromStr;

use super::error::{ApiError, ValidationErrorBuilder};
use crate::db::{DbPool, PriceType, PropertyResponse, PropertyType, PropertyWithOwner};

pub const DEFAULT_PAGE_SIZE: i64 = 10;
pub const MAX_PAGE_SIZE: i64 = 50;

/// Raw query parameters, deserialized as strings so that malformed numbers
/// surface as field-level validation errors instead of a bare 400.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListPropertiesParams {
    pub page: Option<String>,
    pub limit: Option<String>,
    pub min_price: Option<String>,
    pub max_price: Option<String>,
    pub property_type: Option<String>,
    pub price_type: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub bedrooms: Option<String>,
    pub bathrooms: Option<String>,
    pub ready_to_move: Option<String>,
    pub sort_by: Option<String>,
    pub sort_order: Option<String>,
    pub search: Option<String>,
}

/// Structured predicate over the property collection. Absent fields impose
/// no constraint.
#[derive(Debug, Clone, Default)]
pub struct PropertyFilter {
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub property_type: Option<PropertyType>,
    pub price_type: Option<PriceType>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub bedrooms: Option<i64>,
    pub bathrooms: Option<i64>,
    pub ready_to_move: Option<bool>,
    pub search: Option<String>,
    /// Constrain to active listings; on for public listing queries
    pub only_active: bool,
}

impl PropertyFilter {
    pub fn active() -> Self {
        Self {
            only_active: true,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    Price,
    Date,
    Rating,
    Views,
}

impl SortKey {
    fn column(&self) -> &'static str {
        match self {
            Self::Price => "p.price",
            Self::Date => "p.created_at",
            Self::Rating => "p.rating",
            Self::Views => "p.views",
        }
    }
}

impl FromStr for SortKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "price" => Ok(Self::Price),
            "date" => Ok(Self::Date),
            "rating" => Ok(Self::Rating),
            "views" => Ok(Self::Views),
            _ => Err("Invalid sort field".to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    fn keyword(&self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

impl FromStr for SortOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "asc" => Ok(Self::Asc),
            "desc" => Ok(Self::Desc),
            _ => Err("Sort order must be asc or desc".to_string()),
        }
    }
}

/// 1-based page window, validated at construction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageParams {
    pub page: i64,
    pub limit: i64,
}

impl Default for PageParams {
    fn default() -> Self {
        Self {
            page: 1,
            limit: DEFAULT_PAGE_SIZE,
        }
    }
}

impl PageParams {
    pub fn offset(&self) -> i64 {
        (self.page - 1) * self.limit
    }
}

/// A fully validated listing query
#[derive(Debug, Clone)]
pub struct ListingQuery {
    pub filter: PropertyFilter,
    pub sort_key: SortKey,
    pub sort_order: SortOrder,
    pub page: PageParams,
}

impl ListingQuery {
    /// Validate raw query parameters into a structured query. All failures
    /// are collected so the client sees every bad field at once.
    pub fn parse(params: &ListPropertiesParams) -> Result<Self, ApiError> {
        let mut errors = ValidationErrorBuilder::new();
        let mut filter = PropertyFilter::active();
        let mut page = PageParams::default();
        let mut sort_key = SortKey::Date;
        let mut sort_order = SortOrder::Desc;

        if let Some(raw) = &params.page {
            match raw.parse::<i64>() {
                Ok(n) if n >= 1 => page.page = n,
                _ => {
                    errors.add("page", "Page must be a positive integer");
                }
            }
        }

        if let Some(raw) = &params.limit {
            match raw.parse::<i64>() {
                Ok(n) if (1..=MAX_PAGE_SIZE).contains(&n) => page.limit = n,
                _ => {
                    errors.add("limit", "Limit must be between 1 and 50");
                }
            }
        }

        if let Some(raw) = &params.min_price {
            match raw.parse::<f64>() {
                Ok(n) if n.is_finite() && n >= 0.0 => filter.min_price = Some(n),
                _ => {
                    errors.add("minPrice", "Min price must be a positive number");
                }
            }
        }

        if let Some(raw) = &params.max_price {
            match raw.parse::<f64>() {
                Ok(n) if n.is_finite() && n >= 0.0 => filter.max_price = Some(n),
                _ => {
                    errors.add("maxPrice", "Max price must be a positive number");
                }
            }
        }

        if let Some(raw) = &params.property_type {
            match raw.parse::<PropertyType>() {
                Ok(t) => filter.property_type = Some(t),
                Err(e) => {
                    errors.add("propertyType", e);
                }
            }
        }

        if let Some(raw) = &params.price_type {
            match raw.parse::<PriceType>() {
                Ok(t) => filter.price_type = Some(t),
                Err(e) => {
                    errors.add("priceType", e);
                }
            }
        }

        if let Some(city) = &params.city {
            let trimmed = city.trim();
            if !trimmed.is_empty() {
                filter.city = Some(trimmed.to_string());
            }
        }

        if let Some(state) = &params.state {
            let trimmed = state.trim();
            if !trimmed.is_empty() {
                filter.state = Some(trimmed.to_string());
            }
        }

        if let Some(raw) = &params.bedrooms {
            match raw.parse::<i64>() {
                Ok(n) if n >= 0 => filter.bedrooms = Some(n),
                _ => {
                    errors.add("bedrooms", "Bedrooms must be a non-negative integer");
                }
            }
        }

        if let Some(raw) = &params.bathrooms {
            match raw.parse::<i64>() {
                Ok(n) if n >= 0 => filter.bathrooms = Some(n),
                _ => {
                    errors.add("bathrooms", "Bathrooms must be a non-negative integer");
                }
            }
        }

        if let Some(raw) = &params.ready_to_move {
            match raw.as_str() {
                "true" => filter.ready_to_move = Some(true),
                "false" => filter.ready_to_move = Some(false),
                _ => {
                    errors.add("readyToMove", "Ready to move must be a boolean");
                }
            }
        }

        if let Some(raw) = &params.sort_by {
            match raw.parse::<SortKey>() {
                Ok(k) => sort_key = k,
                Err(e) => {
                    errors.add("sortBy", e);
                }
            }
        }

        if let Some(raw) = &params.sort_order {
            match raw.parse::<SortOrder>() {
                Ok(o) => sort_order = o,
                Err(e) => {
                    errors.add("sortOrder", e);
                }
            }
        }

        if let Some(search) = &params.search {
            let trimmed = search.trim();
            if !trimmed.is_empty() {
                filter.search = Some(trimmed.to_string());
            }
        }

        errors.finish()?;

        Ok(Self {
            filter,
            sort_key,
            sort_order,
            page,
        })
    }
}

/// Append the filter's WHERE clause to a query builder. Shared between the
/// page query and the total-count query so the two can never diverge.
fn push_filters(qb: &mut QueryBuilder<'_, Sqlite>, filter: &PropertyFilter) {
    qb.push(" WHERE 1 = 1");

    if filter.only_active {
        qb.push(" AND p.is_active = 1");
    }
    if let Some(min) = filter.min_price {
        qb.push(" AND p.price >= ");
        qb.push_bind(min);
    }
    if let Some(max) = filter.max_price {
        qb.push(" AND p.price <= ");
        qb.push_bind(max);
    }
    if let Some(property_type) = filter.property_type {
        qb.push(" AND p.property_type = ");
        qb.push_bind(property_type.as_str());
    }
    if let Some(price_type) = filter.price_type {
        qb.push(" AND p.price_type = ");
        qb.push_bind(price_type.as_str());
    }
    if let Some(city) = &filter.city {
        qb.push(" AND LOWER(p.city) LIKE ");
        qb.push_bind(format!("%{}%", city.to_lowercase()));
    }
    if let Some(state) = &filter.state {
        qb.push(" AND LOWER(p.state) LIKE ");
        qb.push_bind(format!("%{}%", state.to_lowercase()));
    }
    if let Some(bedrooms) = filter.bedrooms {
        qb.push(" AND p.bedrooms = ");
        qb.push_bind(bedrooms);
    }
    if let Some(bathrooms) = filter.bathrooms {
        qb.push(" AND p.bathrooms = ");
        qb.push_bind(bathrooms);
    }
    if let Some(ready) = filter.ready_to_move {
        qb.push(" AND p.ready_to_move = ");
        qb.push_bind(ready);
    }
    if let Some(search) = &filter.search {
        let pattern = format!("%{}%", search.to_lowercase());
        qb.push(" AND (LOWER(p.name) LIKE ");
        qb.push_bind(pattern.clone());
        qb.push(" OR LOWER(p.description) LIKE ");
        qb.push_bind(pattern.clone());
        qb.push(" OR LOWER(p.city) LIKE ");
        qb.push_bind(pattern.clone());
        qb.push(" OR LOWER(p.state) LIKE ");
        qb.push_bind(pattern.clone());
        qb.push(" OR LOWER(p.tags) LIKE ");
        qb.push_bind(pattern);
        qb.push(")");
    }
}

/// Count all properties matching the filter
pub async fn count_matching(pool: &DbPool, filter: &PropertyFilter) -> Result<i64, sqlx::Error> {
    let mut qb = QueryBuilder::new("SELECT COUNT(*) FROM properties p");
    push_filters(&mut qb, filter);
    let (total,): (i64,) = qb.build_query_as().fetch_one(pool).await?;
    Ok(total)
}

/// Fetch one page of matching properties, joined with their owners.
/// Ties on the sort key are broken by id for a deterministic order.
pub async fn fetch_page(
    pool: &DbPool,
    query: &ListingQuery,
) -> Result<Vec<PropertyWithOwner>, sqlx::Error> {
    let mut qb = QueryBuilder::new(
        "SELECT p.*, u.name AS owner_name, u.email AS owner_email, u.phone AS owner_phone \
         FROM properties p JOIN users u ON u.id = p.owner_id",
    );
    push_filters(&mut qb, &query.filter);

    qb.push(" ORDER BY ");
    qb.push(query.sort_key.column());
    qb.push(" ");
    qb.push(query.sort_order.keyword());
    qb.push(", p.id ASC");

    qb.push(" LIMIT ");
    qb.push_bind(query.page.limit);
    qb.push(" OFFSET ");
    qb.push_bind(query.page.offset());

    qb.build_query_as::<PropertyWithOwner>().fetch_all(pool).await
}

/// Load the set of property ids the viewer has favorited
pub async fn favorite_ids(pool: &DbPool, user_id: &str) -> Result<HashSet<String>, sqlx::Error> {
    let rows: Vec<(String,)> = sqlx::query_as("SELECT property_id FROM favorites WHERE user_id = ?")
        .bind(user_id)
        .fetch_all(pool)
        .await?;
    Ok(rows.into_iter().map(|(id,)| id).collect())
}

/// Shape a page of rows for the wire, marking each record the viewer has
/// favorited. Anonymous viewers (`None`) get no `isFavorite` field at all.
pub fn annotate_page(
    rows: Vec<PropertyWithOwner>,
    viewer_favorites: Option<&HashSet<String>>,
) -> Vec<PropertyResponse> {
    rows.into_iter()
        .map(|row| {
            let is_favorite =
                viewer_favorites.map(|favorites| favorites.contains(&row.property.id));
            PropertyResponse::from_row(row, is_favorite)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> ListPropertiesParams {
        let mut p = ListPropertiesParams::default();
        for (key, value) in pairs {
            let value = value.to_string();
            match *key {
                "page" => p.page = Some(value),
                "limit" => p.limit = Some(value),
                "minPrice" => p.min_price = Some(value),
                "maxPrice" => p.max_price = Some(value),
                "propertyType" => p.property_type = Some(value),
                "priceType" => p.price_type = Some(value),
                "city" => p.city = Some(value),
                "state" => p.state = Some(value),
                "bedrooms" => p.bedrooms = Some(value),
                "bathrooms" => p.bathrooms = Some(value),
                "readyToMove" => p.ready_to_move = Some(value),
                "sortBy" => p.sort_by = Some(value),
                "sortOrder" => p.sort_order = Some(value),
                "search" => p.search = Some(value),
                other => panic!("unknown param {}", other),
            }
        }
        p
    }

    #[test]
    fn parse_defaults() {
        let query = ListingQuery::parse(&ListPropertiesParams::default()).unwrap();
        assert_eq!(query.page, PageParams { page: 1, limit: 10 });
        assert_eq!(query.sort_key, SortKey::Date);
        assert_eq!(query.sort_order, SortOrder::Desc);
        assert!(query.filter.only_active);
        assert!(query.filter.min_price.is_none());
    }

    #[test]
    fn parse_full_query() {
        let query = ListingQuery::parse(&params(&[
            ("page", "3"),
            ("limit", "25"),
            ("minPrice", "50000"),
            ("maxPrice", "150000"),
            ("propertyType", "villa"),
            ("priceType", "rent"),
            ("city", "Mumbai"),
            ("bedrooms", "3"),
            ("readyToMove", "true"),
            ("sortBy", "price"),
            ("sortOrder", "asc"),
        ]))
        .unwrap();

        assert_eq!(query.page.page, 3);
        assert_eq!(query.page.limit, 25);
        assert_eq!(query.page.offset(), 50);
        assert_eq!(query.filter.min_price, Some(50000.0));
        assert_eq!(query.filter.max_price, Some(150000.0));
        assert_eq!(query.filter.property_type, Some(PropertyType::Villa));
        assert_eq!(query.filter.price_type, Some(PriceType::Rent));
        assert_eq!(query.filter.city.as_deref(), Some("Mumbai"));
        assert_eq!(query.filter.bedrooms, Some(3));
        assert_eq!(query.filter.ready_to_move, Some(true));
        assert_eq!(query.sort_key, SortKey::Price);
        assert_eq!(query.sort_order, SortOrder::Asc);
    }

    #[test]
    fn parse_rejects_bad_page_and_limit() {
        for (key, value) in [
            ("page", "0"),
            ("page", "-1"),
            ("page", "abc"),
            ("limit", "0"),
            ("limit", "51"),
            ("limit", "ten"),
        ] {
            let err = ListingQuery::parse(&params(&[(key, value)]));
            assert!(err.is_err(), "expected {}={} to be rejected", key, value);
        }
    }

    #[test]
    fn parse_rejects_malformed_numeric_bounds() {
        assert!(ListingQuery::parse(&params(&[("minPrice", "cheap")])).is_err());
        assert!(ListingQuery::parse(&params(&[("minPrice", "-5")])).is_err());
        assert!(ListingQuery::parse(&params(&[("maxPrice", "NaN")])).is_err());
        assert!(ListingQuery::parse(&params(&[("bedrooms", "-1")])).is_err());
        assert!(ListingQuery::parse(&params(&[("readyToMove", "yes")])).is_err());
    }

    #[test]
    fn parse_rejects_unknown_enums() {
        assert!(ListingQuery::parse(&params(&[("propertyType", "castle")])).is_err());
        assert!(ListingQuery::parse(&params(&[("priceType", "lease")])).is_err());
        assert!(ListingQuery::parse(&params(&[("sortBy", "name")])).is_err());
        assert!(ListingQuery::parse(&params(&[("sortOrder", "sideways")])).is_err());
    }

    #[test]
    fn parse_collects_all_field_errors() {
        let err = ListingQuery::parse(&params(&[
            ("page", "zero"),
            ("minPrice", "-1"),
            ("sortBy", "name"),
        ]))
        .unwrap_err();
        assert!(err.message().contains("3 fields"));
    }

    #[test]
    fn blank_city_and_search_impose_no_constraint() {
        let query = ListingQuery::parse(&params(&[("city", "  "), ("search", "")])).unwrap();
        assert!(query.filter.city.is_none());
        assert!(query.filter.search.is_none());
    }

    #[test]
    fn filter_sql_contains_expected_clauses() {
        let filter = PropertyFilter {
            min_price: Some(100.0),
            max_price: Some(200.0),
            city: Some("Pune".to_string()),
            search: Some("garden".to_string()),
            ready_to_move: Some(true),
            only_active: true,
            ..PropertyFilter::default()
        };
        let mut qb = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM properties p");
        push_filters(&mut qb, &filter);
        let sql = qb.sql();
        assert!(sql.contains("p.is_active = 1"));
        assert!(sql.contains("p.price >= "));
        assert!(sql.contains("p.price <= "));
        assert!(sql.contains("LOWER(p.city) LIKE "));
        assert!(sql.contains("p.ready_to_move = "));
        assert!(sql.contains("LOWER(p.description) LIKE "));
        assert!(sql.contains("LOWER(p.tags) LIKE "));
    }

    #[test]
    fn empty_filter_only_constrains_active() {
        let mut qb = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM properties p");
        push_filters(&mut qb, &PropertyFilter::active());
        assert_eq!(
            qb.sql(),
            "SELECT COUNT(*) FROM properties p WHERE 1 = 1 AND p.is_active = 1"
        );
    }
}
