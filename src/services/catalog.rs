use std::collections::{BTreeSet, HashMap, HashSet};

use crate::models::{Course, Rating, UserInterest};

/// Result of looking up a course's display metadata
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CourseLookup<'a> {
    Found { course: &'a Course, title: &'a str },
    /// The course row has a NULL or blank title
    Untitled,
    /// The course table held this many rows for the id
    Duplicate(usize),
}

#[derive(Debug, Clone)]
enum CourseEntry {
    Unique(Course),
    Duplicate(usize),
}

/// Indexed view of the three source tables, built once per refresh
///
/// Every lookup the ranking engine performs per candidate is a hash lookup;
/// nothing here is scanned per request.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    courses: HashMap<i64, CourseEntry>,
    interests: HashMap<i64, HashSet<i64>>,
    rated: HashMap<i64, HashSet<i64>>,
    /// Rated courses that are still active, ascending
    candidates: Vec<i64>,
}

impl Catalog {
    pub fn build(ratings: &[Rating], courses: Vec<Course>, interests: &[UserInterest]) -> Self {
        let mut course_index: HashMap<i64, CourseEntry> = HashMap::with_capacity(courses.len());
        for course in courses {
            let id = course.course_id;
            let entry = match course_index.remove(&id) {
                None => CourseEntry::Unique(course),
                Some(CourseEntry::Unique(_)) => CourseEntry::Duplicate(2),
                Some(CourseEntry::Duplicate(rows)) => CourseEntry::Duplicate(rows + 1),
            };
            course_index.insert(id, entry);
        }

        let mut rated: HashMap<i64, HashSet<i64>> = HashMap::new();
        for row in ratings {
            rated.entry(row.user_id).or_default().insert(row.course_id);
        }

        let mut interest_index: HashMap<i64, HashSet<i64>> = HashMap::new();
        for interest in interests {
            interest_index
                .entry(interest.user_id)
                .or_default()
                .insert(interest.category_id);
        }

        let rated_courses: BTreeSet<i64> = ratings.iter().map(|row| row.course_id).collect();
        let inactive = rated_courses
            .iter()
            .filter(|id| !course_index.contains_key(*id))
            .count();
        if inactive > 0 {
            tracing::debug!(count = inactive, "Rated courses without an active course row");
        }

        let candidates = rated_courses
            .into_iter()
            .filter(|id| course_index.contains_key(id))
            .collect();

        Self {
            courses: course_index,
            interests: interest_index,
            rated,
            candidates,
        }
    }

    /// Metadata for `course_id`, or `None` if no active course row exists
    pub fn course(&self, course_id: i64) -> Option<CourseLookup<'_>> {
        let lookup = match self.courses.get(&course_id)? {
            CourseEntry::Unique(course) => match course.title.as_deref() {
                Some(title) if !title.trim().is_empty() => CourseLookup::Found { course, title },
                _ => CourseLookup::Untitled,
            },
            CourseEntry::Duplicate(rows) => CourseLookup::Duplicate(*rows),
        };
        Some(lookup)
    }

    /// Candidates in ascending id order, each with its metadata lookup
    pub fn candidate_courses(&self) -> impl Iterator<Item = (i64, CourseLookup<'_>)> + '_ {
        self.candidates
            .iter()
            .filter_map(|&course_id| self.course(course_id).map(|lookup| (course_id, lookup)))
    }

    /// Interest categories of `user_id`, if any were declared
    pub fn interests(&self, user_id: i64) -> Option<&HashSet<i64>> {
        self.interests.get(&user_id)
    }

    /// Courses `user_id` has rated, whatever the rating value
    pub fn rated_by(&self, user_id: i64) -> Option<&HashSet<i64>> {
        self.rated.get(&user_id)
    }

    pub fn candidates(&self) -> &[i64] {
        &self.candidates
    }

    pub fn course_count(&self) -> usize {
        self.courses.len()
    }

    pub fn user_count(&self) -> usize {
        self.rated.len()
    }
}
