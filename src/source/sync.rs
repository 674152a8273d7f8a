//! Sync Engine
//!
//! Pulls readings from a `RemoteSource` into the `ReadingStore`.
//!
//! The engine walks backward in time: each request asks for up to
//! `page_size` entries at or before a cursor, the cursor then moves to
//! `min(page timestamps) - 1`. The walk stops on an empty page or once a
//! page reaches past the horizon. Because the cursor strictly decreases
//! the walk terminates without knowing the remote total up front.
//!
//! Every page is committed on its own, so a failure on page N leaves
//! pages 1..N-1 durable. Errors are not retried here.

use super::{RemoteSource, SourceError};
use crate::storage::{Reading, ReadingStore, StorageError};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;

/// Entries requested per page
pub const DEFAULT_PAGE_SIZE: usize = 10_000;

const DAY_MS: i64 = 24 * 3600 * 1000;

/// Incremental reading synchronization
pub struct SyncEngine {
    source: Arc<dyn RemoteSource>,
    page_size: usize,
}

/// Outcome of a sync call
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    /// Readings inserted by this call
    pub new_count: usize,
    /// Rows in the store after this call
    pub total_count: u64,
    /// Pages requested
    pub pages: usize,
    /// Oldest timestamp seen on the remote during this call
    pub oldest_timestamp: Option<i64>,
}

/// Errors that abort a sync
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("Failed to fetch data: {0}")]
    Network(#[from] SourceError),

    #[error("Failed to store data: {0}")]
    Storage(#[from] StorageError),
}

impl SyncEngine {
    /// Create a new sync engine with the default page size
    pub fn new(source: Arc<dyn RemoteSource>) -> Self {
        Self {
            source,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Builder: set the page size (minimum 1)
    pub fn page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Sync everything newer than `horizon_days` ago
    pub async fn sync(
        &self,
        store: &mut ReadingStore,
        horizon_days: i64,
    ) -> Result<SyncReport, SyncError> {
        self.sync_at(store, horizon_days, Utc::now().timestamp_millis())
            .await
    }

    /// Sync with an explicit "now"
    pub async fn sync_at(
        &self,
        store: &mut ReadingStore,
        horizon_days: i64,
        now_ms: i64,
    ) -> Result<SyncReport, SyncError> {
        let start = std::time::Instant::now();
        let cutoff = now_ms - horizon_days * DAY_MS;

        let mut cursor = now_ms;
        let mut new_count = 0;
        let mut pages = 0;
        let mut oldest_seen: Option<i64> = None;

        tracing::info!(
            source = self.source.name(),
            horizon_days,
            page_size = self.page_size,
            "Starting sync"
        );

        loop {
            pages += 1;
            let entries = self
                .source
                .fetch_entries(self.page_size, Some(cursor))
                .await
                .map_err(|e| {
                    tracing::error!(page = pages, error = %e, "Sync aborted");
                    e
                })?;

            if entries.is_empty() {
                tracing::debug!(page = pages, "Empty page, sync complete");
                break;
            }

            let readings: Vec<Reading> = entries.iter().filter_map(|e| e.to_reading()).collect();
            let inserted = store.insert_page(&readings)?;
            new_count += inserted;

            let Some(oldest) = entries.iter().filter_map(|e| e.date).min() else {
                tracing::warn!(page = pages, "Page has no timestamps, stopping sync");
                break;
            };
            oldest_seen = Some(oldest_seen.map_or(oldest, |o: i64| o.min(oldest)));

            tracing::debug!(
                page = pages,
                entries = entries.len(),
                glucose = readings.len(),
                new = inserted,
                oldest,
                "Committed page"
            );

            if oldest < cutoff {
                break;
            }

            let next = oldest - 1;
            if next >= cursor {
                tracing::warn!(cursor, oldest, "Source ignored the cursor, stopping sync");
                break;
            }
            cursor = next;
        }

        let total_count = store.total_count()?;

        tracing::info!(
            new = new_count,
            total = total_count,
            pages,
            duration_ms = start.elapsed().as_millis() as u64,
            "Sync completed"
        );

        Ok(SyncReport {
            new_count,
            total_count,
            pages,
            oldest_timestamp: oldest_seen,
        })
    }
}
