//! The daily sync: read the watermark, page through the liked playlist,
//! look up details in batches, classify, persist, then advance the watermark.
//!
//! Every step is awaited before the next one starts and the first error
//! aborts the run. Nothing is retried.

use std::collections::HashSet;

use chrono::Utc;

use crate::classify::Classifier;
use crate::db::SyncStore;
use crate::error::{SyncError, YouTubeError};
use crate::model::{HistoryRow, LikedItem, VideoDetail};
use crate::youtube::{MAX_PAGE_SIZE, VideoPlatform};

#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Ids per `video_details` call.
    pub details_batch_size: usize,
    /// Skip videos that already have a history row.
    pub dedupe: bool,
}

impl Default for SyncOptions {
    fn default() -> Self {
        SyncOptions {
            details_batch_size: MAX_PAGE_SIZE as usize,
            dedupe: false,
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SyncStats {
    pub pages: usize,
    pub liked: usize,
    pub details: usize,
    pub skipped: usize,
    pub inserted: u64,
}

/// Runs one full sync.
///
/// The stored watermark is read and logged but does not bound the fetch: the
/// whole liked list is re-read on every run and, unless `dedupe` is set, every
/// video is inserted again. The watermark is moved to now only after the
/// insert succeeded.
pub async fn run_daily_sync(
    platform: &dyn VideoPlatform,
    store: &dyn SyncStore,
    classifier: &Classifier,
    opts: &SyncOptions,
) -> Result<SyncStats, SyncError> {
    let mut stats = SyncStats::default();

    let state = store.sync_state().await.map_err(SyncError::ReadState)?;
    tracing::info!(watermark = %state.last_synced_at, "starting sync");

    let (items, pages) = fetch_all_liked(platform).await.map_err(SyncError::FetchLiked)?;
    stats.pages = pages;
    stats.liked = items.len();
    tracing::info!(pages, items = items.len(), "fetched liked items");

    let mut ids: Vec<String> = items.into_iter().map(|item| item.video_id).collect();

    if opts.dedupe {
        let before = ids.len();
        let existing = store.existing_video_ids(&ids).await.map_err(SyncError::ReadHistory)?;
        let mut seen = HashSet::new();
        ids.retain(|id| !existing.contains(id) && seen.insert(id.clone()));
        stats.skipped = before - ids.len();
        tracing::info!(skipped = stats.skipped, "dropped already synced videos");
    }

    let details = fetch_details(platform, &ids, opts.details_batch_size)
        .await
        .map_err(SyncError::FetchDetails)?;
    stats.details = details.len();
    tracing::info!(ids = ids.len(), details = details.len(), "fetched video details");

    let rows = build_rows(&details, classifier);

    stats.inserted = store.insert_history(&rows).await.map_err(SyncError::Insert)?;
    tracing::info!(rows = rows.len(), inserted = stats.inserted, "inserted history rows");

    let now = Utc::now();
    store.set_last_synced_at(now).await.map_err(SyncError::UpdateState)?;
    tracing::info!(watermark = %now, "advanced watermark");

    Ok(stats)
}

/// Follows continuation tokens until the platform stops returning one.
/// Returns every item in page order together with the number of requests made.
pub async fn fetch_all_liked(platform: &dyn VideoPlatform) -> Result<(Vec<LikedItem>, usize), YouTubeError> {
    let mut all_items = Vec::new();
    let mut page_token: Option<String> = None;
    let mut pages = 0;

    loop {
        let page = platform.liked_page(page_token.as_deref()).await?;
        pages += 1;
        tracing::debug!(page = pages, items = page.items.len(), "fetched liked page");

        all_items.extend(page.items);
        match page.next_page_token {
            Some(token) => page_token = Some(token),
            None => break,
        }
    }

    Ok((all_items, pages))
}

/// Looks up details `batch_size` ids at a time and concatenates the results
/// in request order. No request is made for an empty id list.
pub async fn fetch_details(
    platform: &dyn VideoPlatform,
    ids: &[String],
    batch_size: usize,
) -> Result<Vec<VideoDetail>, YouTubeError> {
    let mut details = Vec::with_capacity(ids.len());
    for chunk in ids.chunks(batch_size.max(1)) {
        details.extend(platform.video_details(chunk).await?);
    }
    Ok(details)
}

pub fn build_rows(details: &[VideoDetail], classifier: &Classifier) -> Vec<HistoryRow> {
    details
        .iter()
        .map(|detail| HistoryRow::from_detail(detail, classifier))
        .collect()
}
