use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{AppError, AppResult};

// ============================================================================
// Source Tables
// ============================================================================

/// One row of rating history (a `feedbacks` row)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Rating {
    pub user_id: i64,
    pub course_id: i64,
    pub rating: f64,
    pub created_at: Option<DateTime<Utc>>,
}

impl Rating {
    pub fn new(user_id: i64, course_id: i64, rating: f64) -> Self {
        Self {
            user_id,
            course_id,
            rating,
            created_at: None,
        }
    }
}

/// An active course joined with its instructor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Course {
    pub course_id: i64,
    pub category_id: Option<i64>,
    /// Nullable in the course table; untitled courses are never recommended
    pub title: Option<String>,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub instructor_name: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

impl Course {
    /// Creates a course with only the fields ranking depends on
    pub fn new(course_id: i64, category_id: Option<i64>, title: impl Into<String>) -> Self {
        Self {
            course_id,
            category_id,
            title: Some(title.into()),
            description: None,
            image_url: None,
            instructor_name: None,
            created_at: None,
        }
    }
}

/// A declared interest of a user in a course category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::FromRow)]
pub struct UserInterest {
    pub user_id: i64,
    pub category_id: i64,
}

impl UserInterest {
    pub fn new(user_id: i64, category_id: i64) -> Self {
        Self {
            user_id,
            category_id,
        }
    }
}

// ============================================================================
// Recommendations
// ============================================================================

/// A ranked course returned to the caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationItem {
    pub course_id: i64,
    pub title: String,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub instructor_name: Option<String>,
    pub category_id: Option<i64>,
    /// Model estimate, within the rating scale
    pub predicted_rating: f64,
    /// `predicted_rating` multiplied by the interest weight
    pub score: f64,
    pub is_in_interest_categories: bool,
}

/// Body of `POST /recommends`
///
/// Fields are kept loosely typed so that missing or malformed values are
/// reported as invalid input instead of a generic body rejection. Both
/// JSON integers and numeric strings are accepted.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RecommendRequest {
    #[serde(default)]
    pub user_id: Option<Value>,
    #[serde(default)]
    pub max: Option<Value>,
}

/// A recommendation request that passed validation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecommendQuery {
    pub user_id: i64,
    pub max: usize,
}

impl RecommendRequest {
    /// Validates the request against the configured upper bound for `max`
    pub fn validate(&self, max_limit: usize) -> AppResult<RecommendQuery> {
        let user_id = parse_integer("user_id", self.user_id.as_ref())?;
        if user_id <= 0 {
            return Err(AppError::InvalidInput(
                "user_id must be a positive integer".to_string(),
            ));
        }

        let max = parse_integer("max", self.max.as_ref())?;
        let max = usize::try_from(max)
            .ok()
            .filter(|max| *max <= max_limit)
            .ok_or_else(|| {
                AppError::InvalidInput(format!("max must be between 0 and {}", max_limit))
            })?;

        Ok(RecommendQuery { user_id, max })
    }
}

fn parse_integer(field: &str, value: Option<&Value>) -> AppResult<i64> {
    let parsed = match value {
        None | Some(Value::Null) => {
            return Err(AppError::InvalidInput(format!("missing field `{}`", field)))
        }
        Some(Value::Number(number)) => number.as_i64(),
        Some(Value::String(text)) => text.trim().parse::<i64>().ok(),
        Some(_) => None,
    };

    parsed.ok_or_else(|| AppError::InvalidInput(format!("`{}` must be an integer", field)))
}

/// Response of `POST /recommends`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendResponse {
    pub user_id: i64,
    pub model_version: u64,
    pub recommendations: Vec<RecommendationItem>,
}
