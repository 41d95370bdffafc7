use std::{str::FromStr, time::Duration};

use anyhow::Context;
use serde::Deserialize;
use sqlx::mysql::MySqlConnectOptions;

use crate::services::similarity::{Fallback, KnnOptions, RatingScale};

/// Application configuration loaded from environment variables
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Full MySQL connection URL; overrides the `mysql_*` fields when set
    #[serde(default)]
    pub database_url: Option<String>,

    #[serde(default = "default_mysql_host")]
    pub mysql_host: String,

    #[serde(default = "default_mysql_port")]
    pub mysql_port: u16,

    #[serde(default = "default_mysql_user")]
    pub mysql_user: String,

    #[serde(default)]
    pub mysql_password: String,

    #[serde(default)]
    pub mysql_database: Option<String>,

    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,

    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Seconds between retrains; 0 disables periodic retraining
    #[serde(default = "default_refresh_interval_secs")]
    pub refresh_interval_secs: u64,

    #[serde(default = "default_knn_k")]
    pub knn_k: usize,

    #[serde(default = "default_knn_min_k")]
    pub knn_min_k: usize,

    /// `global_mean` or `item_mean`
    #[serde(default = "default_knn_fallback")]
    pub knn_fallback: String,

    #[serde(default = "default_rating_min")]
    pub rating_min: f64,

    #[serde(default = "default_rating_max")]
    pub rating_max: f64,

    /// Largest `max` a caller may request
    #[serde(default = "default_max_recommendations")]
    pub max_recommendations: usize,

    /// Bearer token for `POST /refresh`; the endpoint is disabled when unset
    #[serde(default)]
    pub refresh_token: Option<String>,
}

fn default_mysql_host() -> String {
    "localhost".to_string()
}

fn default_mysql_port() -> u16 {
    3306
}

fn default_mysql_user() -> String {
    "root".to_string()
}

fn default_db_max_connections() -> u32 {
    5
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    5000
}

fn default_refresh_interval_secs() -> u64 {
    3600
}

fn default_knn_k() -> usize {
    40
}

fn default_knn_min_k() -> usize {
    1
}

fn default_knn_fallback() -> String {
    "global_mean".to_string()
}

fn default_rating_min() -> f64 {
    1.0
}

fn default_rating_max() -> f64 {
    5.0
}

fn default_max_recommendations() -> usize {
    100
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        let config = envy::from_env::<Config>()
            .map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        self.connect_options()?;
        self.knn_options()?;
        if self.refresh_token.as_deref().is_some_and(|t| t.trim().is_empty()) {
            anyhow::bail!("REFRESH_TOKEN must not be blank");
        }
        Ok(())
    }

    /// Connection options from `database_url` when set, otherwise from the `mysql_*` fields.
    /// The fields are passed through unescaped, so credentials may contain URL metacharacters.
    pub fn connect_options(&self) -> anyhow::Result<MySqlConnectOptions> {
        if let Some(url) = &self.database_url {
            return MySqlConnectOptions::from_str(url).context("invalid DATABASE_URL");
        }
        let database = self
            .mysql_database
            .as_deref()
            .context("either DATABASE_URL or MYSQL_DATABASE must be set")?;
        Ok(MySqlConnectOptions::new()
            .host(&self.mysql_host)
            .port(self.mysql_port)
            .username(&self.mysql_user)
            .password(&self.mysql_password)
            .database(database))
    }

    pub fn knn_options(&self) -> anyhow::Result<KnnOptions> {
        let options = KnnOptions {
            k: self.knn_k,
            min_k: self.knn_min_k,
            fallback: self
                .knn_fallback
                .parse::<Fallback>()
                .context("invalid KNN_FALLBACK")?,
            scale: RatingScale::new(self.rating_min, self.rating_max)
                .context("invalid RATING_MIN/RATING_MAX")?,
        };
        options.validate().context("invalid KNN_K")?;
        Ok(options)
    }

    pub fn refresh_interval(&self) -> Option<Duration> {
        (self.refresh_interval_secs > 0).then(|| Duration::from_secs(self.refresh_interval_secs))
    }
}
