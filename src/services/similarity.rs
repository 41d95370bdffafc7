//! Item-based k-nearest-neighbor collaborative filtering.
//!
//! Items are compared by the cosine of their co-rating vectors: for two
//! courses `i` and `j`, only users who rated both contribute, and
//!
//! ```text
//! sim(i, j) = Σ r_ui · r_uj / sqrt(Σ r_ui² · Σ r_uj²)
//! ```
//!
//! A rating for `(user, course)` is estimated as the similarity-weighted mean
//! of the user's own ratings on the `k` courses most similar to `course`.
//! Pairs that cannot be estimated that way (unknown user, unknown course, or
//! no positively similar neighbor) fall back to a mean so that every query
//! returns a number.

use std::collections::HashMap;
use std::str::FromStr;
use std::time::Instant;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::models::Rating;

/// Error types for model training
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TrainingError {
    #[error("Insufficient training data: {0}")]
    InsufficientData(String),
    #[error("Invalid model options: {0}")]
    InvalidOptions(String),
}

/// Inclusive bounds of the rating scale
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RatingScale {
    pub min: f64,
    pub max: f64,
}

impl Default for RatingScale {
    fn default() -> Self {
        Self { min: 1.0, max: 5.0 }
    }
}

impl RatingScale {
    pub fn new(min: f64, max: f64) -> Result<Self, TrainingError> {
        if !min.is_finite() || !max.is_finite() || min >= max {
            return Err(TrainingError::InvalidOptions(format!(
                "rating scale [{}, {}] is empty",
                min, max
            )));
        }
        Ok(Self { min, max })
    }

    pub fn contains(&self, rating: f64) -> bool {
        rating >= self.min && rating <= self.max
    }

    pub fn clamp(&self, rating: f64) -> f64 {
        rating.clamp(self.min, self.max)
    }
}

/// Estimate used when the neighborhood cannot produce one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Fallback {
    /// Mean of every rating in the corpus
    #[default]
    GlobalMean,
    /// Mean rating of the target course, or the global mean for unseen courses
    ItemMean,
}

impl FromStr for Fallback {
    type Err = TrainingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "global_mean" | "global" => Ok(Fallback::GlobalMean),
            "item_mean" | "item" => Ok(Fallback::ItemMean),
            other => Err(TrainingError::InvalidOptions(format!(
                "unknown fallback policy `{}`",
                other
            ))),
        }
    }
}

/// Neighborhood parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KnnOptions {
    /// Maximum number of neighbors taken into account
    pub k: usize,
    /// Minimum number of positively similar neighbors for a neighborhood estimate
    pub min_k: usize,
    pub fallback: Fallback,
    pub scale: RatingScale,
}

impl Default for KnnOptions {
    fn default() -> Self {
        Self {
            k: 40,
            min_k: 1,
            fallback: Fallback::GlobalMean,
            scale: RatingScale::default(),
        }
    }
}

impl KnnOptions {
    pub fn validate(&self) -> Result<(), TrainingError> {
        if self.k == 0 {
            return Err(TrainingError::InvalidOptions(
                "k must be at least 1".to_string(),
            ));
        }
        RatingScale::new(self.scale.min, self.scale.max)?;
        Ok(())
    }
}

/// Why an estimate came from the fallback rather than the neighborhood
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackReason {
    UnknownUser,
    UnknownItem,
    NotEnoughNeighbors,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EstimateSource {
    /// Weighted average over `k` positively similar neighbors
    Neighbors { k: usize },
    Fallback(FallbackReason),
}

/// A predicted rating, always within the rating scale
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Estimate {
    pub value: f64,
    pub source: EstimateSource,
}

impl Estimate {
    pub fn is_fallback(&self) -> bool {
        matches!(self.source, EstimateSource::Fallback(_))
    }
}

/// Anything that can estimate a user's rating for a course
///
/// The ranking engine only depends on this, so it can be driven by a fixed
/// predictor in tests.
pub trait RatingPredictor: Send + Sync {
    fn predict(&self, user_id: i64, course_id: i64) -> Estimate;
}

/// Trains [`SimilarityModel`]s from a complete rating corpus
#[derive(Debug, Clone, Default)]
pub struct SimilarityModelBuilder {
    options: KnnOptions,
}

#[derive(Default)]
struct PairAccumulator {
    prods: f64,
    sq_left: f64,
    sq_right: f64,
}

impl SimilarityModelBuilder {
    pub fn new(options: KnnOptions) -> Self {
        Self { options }
    }

    /// Fits a model on the whole corpus.
    ///
    /// Ratings outside the scale are dropped. When the same user rated a
    /// course more than once, the most recent row wins (later rows win ties).
    pub fn fit(&self, ratings: &[Rating]) -> Result<SimilarityModel, TrainingError> {
        self.options.validate()?;
        let start = Instant::now();
        let scale = self.options.scale;

        let mut latest: HashMap<(i64, i64), (f64, Option<DateTime<Utc>>)> = HashMap::new();
        let mut out_of_scale = 0usize;
        let mut duplicates = 0usize;

        for row in ratings {
            if !row.rating.is_finite() || !scale.contains(row.rating) {
                out_of_scale += 1;
                continue;
            }
            let key = (row.user_id, row.course_id);
            let supersedes = latest
                .get(&key)
                .map(|(_, seen_at)| row.created_at >= *seen_at);
            if supersedes.is_some() {
                duplicates += 1;
            }
            if supersedes.unwrap_or(true) {
                latest.insert(key, (row.rating, row.created_at));
            }
        }

        if out_of_scale > 0 {
            tracing::warn!(
                count = out_of_scale,
                min = scale.min,
                max = scale.max,
                "Dropped ratings outside the rating scale"
            );
        }
        if duplicates > 0 {
            tracing::debug!(count = duplicates, "Collapsed duplicate ratings");
        }

        if latest.is_empty() {
            return Err(TrainingError::InsufficientData(
                "the rating corpus is empty".to_string(),
            ));
        }

        let mut entries: Vec<((i64, i64), f64)> = latest
            .into_iter()
            .map(|(key, (rating, _))| (key, rating))
            .collect();
        entries.sort_by_key(|(key, _)| *key);

        let user_ids = sorted_distinct(entries.iter().map(|((user, _), _)| *user));
        let item_ids = sorted_distinct(entries.iter().map(|((_, item), _)| *item));

        if user_ids.len() < 2 {
            return Err(TrainingError::InsufficientData(format!(
                "ratings come from a single user ({})",
                user_ids[0]
            )));
        }

        let user_index = index_of(&user_ids);
        let item_index = index_of(&item_ids);

        let mut user_ratings: Vec<Vec<(usize, f64)>> = vec![Vec::new(); user_ids.len()];
        let mut item_sums = vec![0.0; item_ids.len()];
        let mut item_counts = vec![0usize; item_ids.len()];
        let mut total = 0.0;

        for ((user, item), rating) in &entries {
            let u = user_index[user];
            let i = item_index[item];
            user_ratings[u].push((i, *rating));
            item_sums[i] += rating;
            item_counts[i] += 1;
            total += rating;
        }

        // Entries are sorted by (user, item), so each user's list is sorted by
        // item index and every pair below has left < right.
        let mut pairs: HashMap<(usize, usize), PairAccumulator> = HashMap::new();
        for rated in &user_ratings {
            for (a, &(left, r_left)) in rated.iter().enumerate() {
                for &(right, r_right) in &rated[a + 1..] {
                    let acc = pairs.entry((left, right)).or_default();
                    acc.prods += r_left * r_right;
                    acc.sq_left += r_left * r_left;
                    acc.sq_right += r_right * r_right;
                }
            }
        }

        let mut similarities: Vec<HashMap<usize, f64>> = vec![HashMap::new(); item_ids.len()];
        for ((left, right), acc) in pairs {
            let denom = (acc.sq_left * acc.sq_right).sqrt();
            if denom > 0.0 {
                let sim = acc.prods / denom;
                similarities[left].insert(right, sim);
                similarities[right].insert(left, sim);
            }
        }

        let item_means = item_sums
            .iter()
            .zip(&item_counts)
            .map(|(sum, count)| sum / *count as f64)
            .collect();

        let model = SimilarityModel {
            options: self.options,
            global_mean: total / entries.len() as f64,
            rating_count: entries.len(),
            user_index,
            item_index,
            item_ids,
            user_ratings,
            similarities,
            item_means,
        };

        tracing::info!(
            ratings = model.rating_count,
            users = model.user_count(),
            courses = model.item_count(),
            elapsed_ms = start.elapsed().as_millis(),
            "Similarity model trained"
        );

        Ok(model)
    }
}

fn sorted_distinct(ids: impl Iterator<Item = i64>) -> Vec<i64> {
    let mut ids: Vec<i64> = ids.collect();
    ids.sort_unstable();
    ids.dedup();
    ids
}

fn index_of(ids: &[i64]) -> HashMap<i64, usize> {
    ids.iter().enumerate().map(|(idx, id)| (*id, idx)).collect()
}

/// A trained, read-only item-item neighborhood model
#[derive(Debug, Clone)]
pub struct SimilarityModel {
    options: KnnOptions,
    global_mean: f64,
    rating_count: usize,
    user_index: HashMap<i64, usize>,
    item_index: HashMap<i64, usize>,
    item_ids: Vec<i64>,
    /// Per user: (item index, rating), sorted by item index
    user_ratings: Vec<Vec<(usize, f64)>>,
    /// Sparse similarity rows; items without co-raters are absent (similarity 0)
    similarities: Vec<HashMap<usize, f64>>,
    item_means: Vec<f64>,
}

impl SimilarityModel {
    pub fn global_mean(&self) -> f64 {
        self.global_mean
    }

    pub fn rating_count(&self) -> usize {
        self.rating_count
    }

    pub fn user_count(&self) -> usize {
        self.user_index.len()
    }

    pub fn item_count(&self) -> usize {
        self.item_ids.len()
    }

    /// Cosine similarity between two trained courses, if both are known
    pub fn similarity(&self, left: i64, right: i64) -> Option<f64> {
        let left = *self.item_index.get(&left)?;
        let right = *self.item_index.get(&right)?;
        Some(self.similarity_at(left, right))
    }

    fn similarity_at(&self, left: usize, right: usize) -> f64 {
        if left == right {
            return 1.0;
        }
        self.similarities[left].get(&right).copied().unwrap_or(0.0)
    }

    fn fallback(&self, item: Option<usize>, reason: FallbackReason) -> Estimate {
        let value = match (self.options.fallback, item) {
            (Fallback::ItemMean, Some(item)) => self.item_means[item],
            _ => self.global_mean,
        };
        Estimate {
            value: self.options.scale.clamp(value),
            source: EstimateSource::Fallback(reason),
        }
    }

    /// Estimates the rating `user_id` would give `course_id`
    pub fn estimate(&self, user_id: i64, course_id: i64) -> Estimate {
        let item = self.item_index.get(&course_id).copied();
        let Some(user) = self.user_index.get(&user_id).copied() else {
            return self.fallback(item, FallbackReason::UnknownUser);
        };
        let Some(item) = item else {
            return self.fallback(None, FallbackReason::UnknownItem);
        };

        let mut neighbors: Vec<(f64, usize, f64)> = self.user_ratings[user]
            .iter()
            .map(|&(other, rating)| (self.similarity_at(item, other), other, rating))
            .collect();
        // Most similar first; ties at the k boundary go to the lower course id.
        neighbors.sort_by(|a, b| {
            b.0.total_cmp(&a.0)
                .then_with(|| self.item_ids[a.1].cmp(&self.item_ids[b.1]))
        });

        let mut sum_sim = 0.0;
        let mut sum_ratings = 0.0;
        let mut actual_k = 0;
        for &(sim, _, rating) in neighbors.iter().take(self.options.k) {
            if sim > 0.0 {
                sum_sim += sim;
                sum_ratings += sim * rating;
                actual_k += 1;
            }
        }

        if actual_k < self.options.min_k || sum_sim <= 0.0 {
            return self.fallback(Some(item), FallbackReason::NotEnoughNeighbors);
        }

        let raw = sum_ratings / sum_sim;
        let value = self.options.scale.clamp(raw);
        if value != raw {
            tracing::debug!(user_id, course_id, raw, value, "Clamped estimate to rating scale");
        }

        Estimate {
            value,
            source: EstimateSource::Neighbors { k: actual_k },
        }
    }
}

impl RatingPredictor for SimilarityModel {
    fn predict(&self, user_id: i64, course_id: i64) -> Estimate {
        self.estimate(user_id, course_id)
    }
}
