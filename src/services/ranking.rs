use std::cmp::Ordering;
use std::collections::HashSet;

use crate::models::{Course, RecommendationItem};
use crate::services::catalog::{Catalog, CourseLookup};
use crate::services::similarity::RatingPredictor;

/// Score multiplier for courses in one of the user's interest categories.
///
/// A fixed, explainable boost rather than a learned re-ranking.
pub const INTEREST_WEIGHT: f64 = 2.0;

/// Score multiplier for every other course
pub const BASE_WEIGHT: f64 = 1.0;

struct Scored<'a> {
    course: &'a Course,
    title: &'a str,
    predicted_rating: f64,
    score: f64,
    is_in_interest_categories: bool,
}

/// Ranks candidate courses for a single user
///
/// Pure: the output depends only on the predictor, the catalog, the user and
/// `n`. Ranking is by score descending, then course id ascending.
pub struct RankingEngine<'a> {
    predictor: &'a dyn RatingPredictor,
    catalog: &'a Catalog,
}

impl<'a> RankingEngine<'a> {
    pub fn new(predictor: &'a dyn RatingPredictor, catalog: &'a Catalog) -> Self {
        Self { predictor, catalog }
    }

    /// Returns at most `n` unrated courses for `user_id`, best first
    pub fn recommend(&self, user_id: i64, n: usize) -> Vec<RecommendationItem> {
        if n == 0 {
            return Vec::new();
        }

        let empty = HashSet::new();
        let rated = self.catalog.rated_by(user_id).unwrap_or(&empty);
        let interests = self.catalog.interests(user_id).unwrap_or(&empty);

        let mut scored: Vec<Scored<'_>> = Vec::new();
        let mut skipped = 0usize;

        for (course_id, lookup) in self.catalog.candidate_courses() {
            if rated.contains(&course_id) {
                continue;
            }

            let (course, title) = match lookup {
                CourseLookup::Found { course, title } => (course, title),
                CourseLookup::Untitled => {
                    tracing::warn!(course_id, "Skipping candidate without a course title");
                    skipped += 1;
                    continue;
                }
                CourseLookup::Duplicate(rows) => {
                    tracing::warn!(course_id, rows, "Skipping candidate with duplicate course metadata");
                    skipped += 1;
                    continue;
                }
            };

            let is_in_interest_categories = course
                .category_id
                .is_some_and(|category| interests.contains(&category));
            let weight = if is_in_interest_categories {
                INTEREST_WEIGHT
            } else {
                BASE_WEIGHT
            };
            let predicted_rating = self.predictor.predict(user_id, course_id).value;

            scored.push(Scored {
                course,
                title,
                predicted_rating,
                score: predicted_rating * weight,
                is_in_interest_categories,
            });
        }

        let candidate_count = scored.len();
        scored.sort_by(compare_scored);
        scored.truncate(n);

        tracing::debug!(
            user_id,
            candidates = candidate_count,
            skipped,
            returned = scored.len(),
            "Ranked recommendations"
        );

        scored
            .into_iter()
            .map(|entry| RecommendationItem {
                course_id: entry.course.course_id,
                title: entry.title.to_string(),
                description: entry.course.description.clone(),
                image_url: entry.course.image_url.clone(),
                instructor_name: entry.course.instructor_name.clone(),
                category_id: entry.course.category_id,
                predicted_rating: entry.predicted_rating,
                score: entry.score,
                is_in_interest_categories: entry.is_in_interest_categories,
            })
            .collect()
    }
}

fn compare_scored(a: &Scored<'_>, b: &Scored<'_>) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| a.course.course_id.cmp(&b.course.course_id))
}
