use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::classify::{Category, Classifier};
use crate::duration::parse_duration;

pub const WATCH_URL_PREFIX: &str = "https://www.youtube.com/watch?v=";

pub fn video_url(video_id: &str) -> String {
    format!("{}{}", WATCH_URL_PREFIX, video_id)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LikedItem {
    pub video_id: String,
    pub title: String,
    pub channel_title: String,
}

/// One page of the liked playlist plus the token for the next one.
#[derive(Debug, Clone, Default)]
pub struct LikedPage {
    pub items: Vec<LikedItem>,
    pub next_page_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoDetail {
    pub id: String,
    pub title: String,
    pub channel_title: String,
    pub duration: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRow {
    pub video_id: String,
    pub title: String,
    pub channel: String,
    pub duration: u64,
    #[serde(rename = "type")]
    pub category: Category,
    pub video_url: String,
}

impl HistoryRow {
    pub fn from_detail(detail: &VideoDetail, classifier: &Classifier) -> Self {
        HistoryRow {
            video_id: detail.id.clone(),
            title: detail.title.clone(),
            channel: detail.channel_title.clone(),
            duration: parse_duration(&detail.duration),
            category: classifier.classify(&detail.title, &detail.channel_title),
            video_url: video_url(&detail.id),
        }
    }
}

/// A history row as read back from the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredHistoryRow {
    pub id: i64,
    #[serde(flatten)]
    pub row: HistoryRow,
    pub created_at: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncState {
    pub last_synced_at: DateTime<Utc>,
}
