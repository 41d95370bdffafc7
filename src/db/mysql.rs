use sqlx::{
    mysql::{MySqlConnectOptions, MySqlPoolOptions},
    MySqlPool,
};

use crate::{
    db::DataSource,
    error::{AppError, AppResult},
    models::{Course, Rating, UserInterest},
};

const RATINGS_QUERY: &str = r#"
    SELECT CAST(user_id AS SIGNED) AS user_id,
           CAST(course_id AS SIGNED) AS course_id,
           CAST(rating AS DOUBLE) AS rating,
           created_at
    FROM feedbacks
    WHERE deleted_at IS NULL
"#;

const COURSES_QUERY: &str = r#"
    SELECT CAST(courses.id AS SIGNED) AS course_id,
           CAST(courses.category_id AS SIGNED) AS category_id,
           courses.title,
           courses.description,
           courses.image AS image_url,
           users.name AS instructor_name,
           courses.created_at
    FROM courses
    LEFT JOIN users ON users.id = courses.user_id
    WHERE courses.deleted_at IS NULL
"#;

const INTERESTS_QUERY: &str = r#"
    SELECT CAST(profile_id AS SIGNED) AS user_id,
           CAST(category_id AS SIGNED) AS category_id
    FROM user_interests
"#;

/// Creates a MySQL connection pool
pub async fn create_pool(
    options: MySqlConnectOptions,
    max_connections: u32,
) -> anyhow::Result<MySqlPool> {
    let pool = MySqlPoolOptions::new()
        .max_connections(max_connections)
        .connect_with(options)
        .await?;

    Ok(pool)
}

/// Loads the recommender tables from the application's MySQL database
#[derive(Clone)]
pub struct MySqlSource {
    pool: MySqlPool,
}

impl MySqlSource {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

fn unavailable(table: &str, err: sqlx::Error) -> AppError {
    tracing::error!(table, error = %err, "Failed to load table");
    AppError::DataUnavailable(format!("could not load `{}`: {}", table, err))
}

#[async_trait::async_trait]
impl DataSource for MySqlSource {
    async fn fetch_ratings(&self) -> AppResult<Vec<Rating>> {
        sqlx::query_as::<_, Rating>(RATINGS_QUERY)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| unavailable("feedbacks", e))
    }

    async fn fetch_courses(&self) -> AppResult<Vec<Course>> {
        sqlx::query_as::<_, Course>(COURSES_QUERY)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| unavailable("courses", e))
    }

    async fn fetch_interests(&self) -> AppResult<Vec<UserInterest>> {
        sqlx::query_as::<_, UserInterest>(INTERESTS_QUERY)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| unavailable("user_interests", e))
    }

    fn name(&self) -> &'static str {
        "mysql"
    }
}
