use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;

use crate::{
    db::DataSource,
    error::{AppError, AppResult},
    models::RecommendationItem,
    services::{
        catalog::Catalog,
        ranking::RankingEngine,
        similarity::{KnnOptions, SimilarityModel, SimilarityModelBuilder},
    },
};

/// A trained model and the dataset it was trained on, published as a unit
#[derive(Debug)]
pub struct Snapshot {
    pub version: u64,
    pub trained_at: DateTime<Utc>,
    pub model: SimilarityModel,
    pub catalog: Catalog,
}

impl Snapshot {
    pub fn recommend(&self, user_id: i64, n: usize) -> Vec<RecommendationItem> {
        RankingEngine::new(&self.model, &self.catalog).recommend(user_id, n)
    }

    pub fn summary(&self) -> SnapshotSummary {
        SnapshotSummary {
            version: self.version,
            trained_at: self.trained_at,
            ratings: self.model.rating_count(),
            users: self.model.user_count(),
            courses: self.catalog.course_count(),
            candidates: self.catalog.candidates().len(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SnapshotSummary {
    pub version: u64,
    pub trained_at: DateTime<Utc>,
    pub ratings: usize,
    pub users: usize,
    pub courses: usize,
    pub candidates: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RefreshFailure {
    pub at: DateTime<Utc>,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoreStatus {
    pub snapshot: Option<SnapshotSummary>,
    pub last_error: Option<RefreshFailure>,
}

/// Holds the live snapshot
///
/// Readers take a clone of the `Arc` and release the lock at once, so a
/// request keeps ranking against the snapshot it started with while a
/// refresh publishes the next one. Refreshes are serialized.
pub struct SnapshotStore {
    builder: SimilarityModelBuilder,
    current: RwLock<Option<Arc<Snapshot>>>,
    last_error: RwLock<Option<RefreshFailure>>,
    refresh_lock: Mutex<()>,
}

impl SnapshotStore {
    pub fn new(options: KnnOptions) -> Self {
        Self {
            builder: SimilarityModelBuilder::new(options),
            current: RwLock::new(None),
            last_error: RwLock::new(None),
            refresh_lock: Mutex::new(()),
        }
    }

    pub async fn current(&self) -> Option<Arc<Snapshot>> {
        self.current.read().await.clone()
    }

    /// The live snapshot, or `ModelNotReady` before the first successful refresh
    pub async fn require_current(&self) -> AppResult<Arc<Snapshot>> {
        self.current().await.ok_or(AppError::ModelNotReady)
    }

    pub async fn status(&self) -> StoreStatus {
        StoreStatus {
            snapshot: self.current().await.map(|snapshot| snapshot.summary()),
            last_error: self.last_error.read().await.clone(),
        }
    }

    /// Reloads every table, retrains and publishes a new snapshot.
    ///
    /// On failure the live snapshot is left untouched and the error is
    /// recorded for the status report.
    pub async fn refresh(&self, source: &dyn DataSource) -> AppResult<Arc<Snapshot>> {
        let _guard = self.refresh_lock.lock().await;
        let start = Instant::now();
        let version = self
            .current()
            .await
            .map_or(1, |snapshot| snapshot.version + 1);

        match self.build(source, version).await {
            Ok(snapshot) => {
                let snapshot = Arc::new(snapshot);
                *self.current.write().await = Some(snapshot.clone());
                *self.last_error.write().await = None;
                tracing::info!(
                    version,
                    source = source.name(),
                    elapsed_ms = start.elapsed().as_millis(),
                    "Published recommendation snapshot"
                );
                Ok(snapshot)
            }
            Err(e) => {
                tracing::error!(
                    version,
                    source = source.name(),
                    error = %e,
                    "Snapshot refresh failed"
                );
                *self.last_error.write().await = Some(RefreshFailure {
                    at: Utc::now(),
                    error: e.to_string(),
                });
                Err(e)
            }
        }
    }

    async fn build(&self, source: &dyn DataSource, version: u64) -> AppResult<Snapshot> {
        let (ratings, courses, interests) = tokio::try_join!(
            source.fetch_ratings(),
            source.fetch_courses(),
            source.fetch_interests()
        )?;

        tracing::info!(
            ratings = ratings.len(),
            courses = courses.len(),
            interests = interests.len(),
            "Loaded recommender tables"
        );

        let builder = self.builder.clone();
        tokio::task::spawn_blocking(move || -> AppResult<Snapshot> {
            let model = builder.fit(&ratings)?;
            let catalog = Catalog::build(&ratings, courses, &interests);
            Ok(Snapshot {
                version,
                trained_at: Utc::now(),
                model,
                catalog,
            })
        })
        .await
        .map_err(|e| AppError::Internal(format!("training task failed: {}", e)))?
    }
}

/// Handle for stopping the periodic refresh task
pub struct RefreshTaskHandle {
    shutdown_tx: mpsc::Sender<()>,
    task: JoinHandle<()>,
}

impl RefreshTaskHandle {
    /// Stops the task, waiting for an in-progress refresh to finish
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
        if let Err(e) = self.task.await {
            tracing::error!(error = %e, "Refresh task ended abnormally");
        }
        tracing::info!("Refresh task stopped");
    }
}

/// Retrains every `every` until shut down. The first run is one period from now.
pub fn spawn_periodic_refresh(
    store: Arc<SnapshotStore>,
    source: Arc<dyn DataSource>,
    every: Duration,
) -> RefreshTaskHandle {
    let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

    let task = tokio::spawn(async move {
        let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + every, every);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        tracing::info!(every_secs = every.as_secs(), "Refresh task started");

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    // Failures are logged and recorded by the store; the
                    // previous snapshot keeps serving.
                    let _ = store.refresh(source.as_ref()).await;
                }
                _ = shutdown_rx.recv() => break,
            }
        }
    });

    RefreshTaskHandle { shutdown_tx, task }
}
