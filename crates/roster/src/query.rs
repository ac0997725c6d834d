//! Query builder for the filtered user listing.
//!
//! Turns the raw `GetSpecificUsers` parameters into a [`QueryPlan`]: a
//! validated, normalized description of filters, ordering and paging that the
//! storage layer can execute without further checks.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::IntoParams;

pub const DEFAULT_PAGE: i64 = 1;
pub const DEFAULT_PAGE_SIZE: i64 = 10;
pub const DEFAULT_AGE_LIMIT_LOW: i32 = 0;
pub const DEFAULT_AGE_LIMIT_HIGH: i32 = 100;

/// Errors raised while building or checking a query plan.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    #[error("There is no such field to order: '{0}'")]
    UnsupportedSortField(String),

    #[error("Invalid ordering direction: '{0}'")]
    UnsupportedDirection(String),

    #[error("Page must be at least 1, got {0}")]
    InvalidPage(i64),

    #[error("Page size must be greater than 0, got {0}")]
    InvalidPageSize(i64),

    #[error("There are no so many pages in the selected dataset (requested {page}, available {total_pages})")]
    PageOutOfRange { page: i64, total_pages: i64 },
}

/// Fields a user listing can be ordered by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortField {
    #[default]
    Id,
    Name,
    Email,
    Age,
}

impl SortField {
    /// SQL ordering expression over the `users` table aliased as `u`.
    pub fn order_expr(self) -> &'static str {
        match self {
            SortField::Id => "u.id",
            SortField::Name => "u.name_key",
            SortField::Email => "u.email_key",
            SortField::Age => "u.age",
        }
    }
}

impl fmt::Display for SortField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortField::Id => write!(f, "id"),
            SortField::Name => write!(f, "name"),
            SortField::Email => write!(f, "email"),
            SortField::Age => write!(f, "age"),
        }
    }
}

impl FromStr for SortField {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "id" => Ok(SortField::Id),
            "name" => Ok(SortField::Name),
            "email" => Ok(SortField::Email),
            "age" => Ok(SortField::Age),
            _ => Err(QueryError::UnsupportedSortField(s.to_string())),
        }
    }
}

/// Ordering direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

impl Direction {
    pub fn sql(self) -> &'static str {
        match self {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Asc => write!(f, "asc"),
            Direction::Desc => write!(f, "desc"),
        }
    }
}

impl FromStr for Direction {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "asc" => Ok(Direction::Asc),
            "desc" => Ok(Direction::Desc),
            _ => Err(QueryError::UnsupportedDirection(s.to_string())),
        }
    }
}

/// Raw listing parameters as they arrive on the query string.
///
/// Every field is optional on the wire; omitted fields take the defaults of
/// the public API (first page of ten, ages 0 to 100, ordered by id ascending).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase", default)]
#[into_params(parameter_in = Query)]
pub struct QueryParams {
    pub page: i64,
    pub page_size: i64,
    pub name_filter: String,
    pub email_filter: String,
    pub age_limit1: i32,
    pub age_limit2: i32,
    pub role_filter: String,
    pub property_for_ordering: String,
    pub direction: String,
}

impl Default for QueryParams {
    fn default() -> Self {
        Self {
            page: DEFAULT_PAGE,
            page_size: DEFAULT_PAGE_SIZE,
            name_filter: String::new(),
            email_filter: String::new(),
            age_limit1: DEFAULT_AGE_LIMIT_LOW,
            age_limit2: DEFAULT_AGE_LIMIT_HIGH,
            role_filter: String::new(),
            property_for_ordering: SortField::Id.to_string(),
            direction: Direction::Asc.to_string(),
        }
    }
}

/// Validated and normalized listing query.
///
/// Text filters are stored lower-cased; an empty filter matches everything.
/// `min_age <= max_age` always holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryPlan {
    pub page: i64,
    pub page_size: i64,
    pub name_filter: String,
    pub email_filter: String,
    pub min_age: i32,
    pub max_age: i32,
    pub role_filter: String,
    pub sort_field: SortField,
    pub direction: Direction,
}

impl QueryPlan {
    /// Number of rows to skip before the requested page.
    pub fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.page_size)
    }

    /// Number of pages needed to hold `total` rows.
    pub fn total_pages(&self, total: i64) -> i64 {
        if total <= 0 {
            return 0;
        }
        (total - 1) / self.page_size + 1
    }

    /// Fail with [`QueryError::PageOutOfRange`] if the requested page lies
    /// beyond the last page of a result set with `total` rows.
    pub fn ensure_page_within(&self, total: i64) -> Result<(), QueryError> {
        let total_pages = self.total_pages(total);
        if self.page > total_pages {
            return Err(QueryError::PageOutOfRange {
                page: self.page,
                total_pages,
            });
        }
        Ok(())
    }
}

/// Case-folded form used for every case-insensitive match and ordering.
///
/// Stored keys and incoming filters both go through this, so matching does
/// not depend on how the database folds non-ASCII text.
pub fn search_key(text: &str) -> String {
    text.to_lowercase()
}

/// Validate raw parameters and produce a query plan.
///
/// The sort field is checked first, so an unknown field is reported even
/// when the paging parameters are also wrong.
pub fn build_query(params: &QueryParams) -> Result<QueryPlan, QueryError> {
    let sort_field: SortField = params.property_for_ordering.parse()?;
    let direction: Direction = params.direction.parse()?;

    if params.page < 1 {
        return Err(QueryError::InvalidPage(params.page));
    }
    if params.page_size < 1 {
        return Err(QueryError::InvalidPageSize(params.page_size));
    }

    Ok(QueryPlan {
        page: params.page,
        page_size: params.page_size,
        name_filter: search_key(&params.name_filter),
        email_filter: search_key(&params.email_filter),
        min_age: params.age_limit1.min(params.age_limit2),
        max_age: params.age_limit1.max(params.age_limit2),
        role_filter: search_key(&params.role_filter),
        sort_field,
        direction,
    })
}
