use crate::{
    error::AppResult,
    models::{Course, Rating, UserInterest},
};

/// Supplies the three tables the recommender is trained and ranked on
///
/// Implementations own connection handling and latency bounds; a failure to
/// load any table is reported as [`crate::error::AppError::DataUnavailable`].
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait DataSource: Send + Sync {
    /// Complete rating history
    async fn fetch_ratings(&self) -> AppResult<Vec<Rating>>;

    /// Active courses with display metadata
    async fn fetch_courses(&self) -> AppResult<Vec<Course>>;

    /// Declared interest categories of every user
    async fn fetch_interests(&self) -> AppResult<Vec<UserInterest>>;

    /// Source name for logging
    fn name(&self) -> &'static str;
}

/// In-memory tables
#[derive(Debug, Clone, Default)]
pub struct StaticSource {
    ratings: Vec<Rating>,
    courses: Vec<Course>,
    interests: Vec<UserInterest>,
}

impl StaticSource {
    pub fn new(ratings: Vec<Rating>, courses: Vec<Course>, interests: Vec<UserInterest>) -> Self {
        Self {
            ratings,
            courses,
            interests,
        }
    }
}

#[async_trait::async_trait]
impl DataSource for StaticSource {
    async fn fetch_ratings(&self) -> AppResult<Vec<Rating>> {
        Ok(self.ratings.clone())
    }

    async fn fetch_courses(&self) -> AppResult<Vec<Course>> {
        Ok(self.courses.clone())
    }

    async fn fetch_interests(&self) -> AppResult<Vec<UserInterest>> {
        Ok(self.interests.clone())
    }

    fn name(&self) -> &'static str {
        "static"
    }
}
