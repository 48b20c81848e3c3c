//! Movie Graph Loader
//!
//! Loads the movie dataset in fixed-size batches, one UNWIND upsert per
//! batch. A failed batch gets a forced reconnect and exactly one retry; if
//! that fails too the batch is skipped and loading moves on.

use crate::connection::ConnectionManager;
use crate::dataset::{self, DatasetError};
use crate::graph_store::{Connector, GraphStore, StoreError};
use crate::movie::{Movie, Record};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

// ============================================================================
// Configuration
// ============================================================================

pub const DEFAULT_BATCH_SIZE: usize = 40_000;
pub const DEFAULT_CHECKPOINT_INTERVAL: usize = 50_000;
pub const DEFAULT_BATCH_DELAY: Duration = Duration::from_millis(500);

#[derive(Debug, Clone)]
pub struct LoaderConfig {
    pub batch_size: usize,
    /// Verify the connection each time the processed count crosses a multiple of this.
    pub checkpoint_interval: usize,
    /// Pause between batches to cap write throughput.
    pub batch_delay: Duration,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            checkpoint_interval: DEFAULT_CHECKPOINT_INTERVAL,
            batch_delay: DEFAULT_BATCH_DELAY,
        }
    }
}

// ============================================================================
// Results
// ============================================================================

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("dataset not found: {}", .0.display())]
    DatasetNotFound(PathBuf),
    #[error("failed to read dataset: {0}")]
    Dataset(#[source] DatasetError),
    #[error("schema bootstrap failed: {0}")]
    Schema(#[source] StoreError),
}

impl From<DatasetError> for LoadError {
    fn from(err: DatasetError) -> Self {
        match err {
            DatasetError::NotFound(path) => LoadError::DatasetNotFound(path),
            other => LoadError::Dataset(other),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LoadReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub total_records: usize,
    pub processed_records: usize,
    pub batches: usize,
    /// Batches whose first upsert failed, whether or not the retry worked.
    pub retried_batches: usize,
    /// Record index ranges that were given up on for this run.
    pub skipped_batches: Vec<Range<usize>>,
}

impl LoadReport {
    pub fn is_complete(&self) -> bool {
        self.skipped_batches.is_empty()
    }
}

/// Contiguous record ranges of at most `batch_size` records.
pub fn batch_ranges(total: usize, batch_size: usize) -> Vec<Range<usize>> {
    let size = batch_size.max(1);
    (0..total)
        .step_by(size)
        .map(|start| start..(start + size).min(total))
        .collect()
}

/// True when going from `before` to `after` passes a multiple of `interval`.
pub fn crosses_checkpoint(before: usize, after: usize, interval: usize) -> bool {
    interval > 0 && before / interval < after / interval
}

// ============================================================================
// Loader
// ============================================================================

enum BatchOutcome {
    Applied { retried: bool },
    Skipped,
}

pub struct MovieGraphLoader<C: Connector> {
    connection: ConnectionManager<C>,
    config: LoaderConfig,
}

impl<C: Connector> MovieGraphLoader<C> {
    pub fn new(connection: ConnectionManager<C>, config: LoaderConfig) -> Self {
        Self { connection, config }
    }

    /// Read the CSV at `path` and load it.
    pub async fn load(&mut self, path: &Path) -> Result<LoadReport, LoadError> {
        if !path.is_file() {
            error!("❌ Dataset not found: {}", path.display());
            return Err(LoadError::DatasetNotFound(path.to_path_buf()));
        }

        info!("📄 Reading dataset: {}", path.display());
        let records = dataset::read_records(path)?;
        info!("   Found {} movies in dataset", records.len());

        self.load_records(&records).await
    }

    /// Bootstrap the schema, then upsert `records` batch by batch.
    ///
    /// Skipped batches do not fail the load; they are listed in the report.
    pub async fn load_records(&mut self, records: &[Record]) -> Result<LoadReport, LoadError> {
        let run_id = Uuid::new_v4();
        let span = info_span!("load", %run_id, total = records.len());
        self.run(run_id, records).instrument(span).await
    }

    async fn run(&mut self, run_id: Uuid, records: &[Record]) -> Result<LoadReport, LoadError> {
        let started_at = Utc::now();
        let total = records.len();

        self.connection
            .store()
            .map_err(LoadError::Schema)?
            .ensure_schema()
            .await
            .map_err(LoadError::Schema)?;

        let ranges = batch_ranges(total, self.config.batch_size);
        info!(
            "💾 Loading {} movies in {} batches (batch_size={})",
            total,
            ranges.len(),
            self.config.batch_size
        );

        let mut processed = 0usize;
        let mut retried_batches = 0usize;
        let mut skipped_batches = Vec::new();

        for (index, range) in ranges.iter().enumerate() {
            let movies: Vec<Movie> = records[range.clone()].iter().map(Movie::from_record).collect();

            match self.process_batch(range, &movies).await {
                BatchOutcome::Applied { retried } => {
                    if retried {
                        retried_batches += 1;
                    }
                    let before = processed;
                    processed += movies.len();
                    info!("📊 Processed {}/{} movies", processed, total);

                    if index + 1 < ranges.len() {
                        sleep(self.config.batch_delay).await;
                    }

                    if crosses_checkpoint(before, processed, self.config.checkpoint_interval) {
                        info!("🔁 Checkpoint at {} movies, verifying connection", processed);
                        if let Err(e) = self.connection.verify().await {
                            warn!("⚠️  Connection refresh at checkpoint failed: {}", e);
                        }
                    }
                }
                BatchOutcome::Skipped => {
                    retried_batches += 1;
                    skipped_batches.push(range.clone());
                    if index + 1 < ranges.len() {
                        sleep(self.config.batch_delay).await;
                    }
                }
            }
        }

        if skipped_batches.is_empty() {
            info!("✅ Finished loading movies ({} processed)", processed);
        } else {
            warn!(
                "⚠️  Finished loading with {} skipped batches ({}/{} movies processed)",
                skipped_batches.len(),
                processed,
                total
            );
        }

        Ok(LoadReport {
            run_id,
            started_at,
            finished_at: Utc::now(),
            total_records: total,
            processed_records: processed,
            batches: ranges.len(),
            retried_batches,
            skipped_batches,
        })
    }

    async fn process_batch(&mut self, range: &Range<usize>, movies: &[Movie]) -> BatchOutcome {
        let first_error = match self.upsert(movies).await {
            Ok(()) => return BatchOutcome::Applied { retried: false },
            Err(e) => e,
        };

        error!(
            "❌ Error processing batch {}-{}: {}",
            range.start, range.end, first_error
        );

        if let Err(e) = self.connection.reconnect().await {
            error!(
                "❌ Skipping batch {}-{}: reconnect failed: {}",
                range.start, range.end, e
            );
            return BatchOutcome::Skipped;
        }

        match self.upsert(movies).await {
            Ok(()) => {
                info!("✅ Retry of batch {}-{} succeeded", range.start, range.end);
                BatchOutcome::Applied { retried: true }
            }
            Err(e) => {
                error!(
                    "❌ Retry failed, skipping batch {}-{}: {}",
                    range.start, range.end, e
                );
                BatchOutcome::Skipped
            }
        }
    }

    async fn upsert(&self, movies: &[Movie]) -> Result<(), StoreError> {
        self.connection.store()?.upsert_movies(movies).await
    }

    pub fn close(self) {
        self.connection.close();
    }
}
