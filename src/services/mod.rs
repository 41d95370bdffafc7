pub mod catalog;
pub mod ranking;
pub mod similarity;
pub mod snapshot;

pub use catalog::Catalog;
pub use ranking::RankingEngine;
pub use similarity::{KnnOptions, RatingPredictor, SimilarityModel, SimilarityModelBuilder};
pub use snapshot::{spawn_periodic_refresh, Snapshot, SnapshotStore};
