use std::sync::Arc;

use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::auth::OAuthClient;
use crate::error::YouTubeError;
use crate::model::{LikedItem, LikedPage, VideoDetail};

pub const DEFAULT_API_BASE: &str = "https://www.googleapis.com/youtube/v3";
pub const LIKED_PLAYLIST_ID: &str = "LL";
/// Upper bound YouTube accepts for both `maxResults` and ids per `videos` call.
pub const MAX_PAGE_SIZE: u32 = 50;

/// The two calls the sync routine needs from the video platform.
#[async_trait::async_trait]
pub trait VideoPlatform: Send + Sync {
    /// Fetch one page of the liked playlist. `None` requests the first page.
    async fn liked_page(&self, page_token: Option<&str>) -> Result<LikedPage, YouTubeError>;

    /// Fetch details for the given ids in a single request.
    async fn video_details(&self, ids: &[String]) -> Result<Vec<VideoDetail>, YouTubeError>;
}

pub struct YouTubeClient {
    http: Client,
    auth: Arc<OAuthClient>,
    api_base: String,
    playlist_id: String,
    page_size: u32,
}

impl YouTubeClient {
    pub fn new(http: Client, auth: Arc<OAuthClient>, api_base: &str, playlist_id: &str, page_size: u32) -> Self {
        Self {
            http,
            auth,
            api_base: api_base.trim_end_matches('/').to_string(),
            playlist_id: playlist_id.to_string(),
            page_size: page_size.clamp(1, MAX_PAGE_SIZE),
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> Result<T, YouTubeError> {
        let token = self.auth.access_token().await?;
        let url = format!("{}/{}", self.api_base, path);

        let resp = self.http.get(&url).bearer_auth(token).query(query).send().await?;
        let status = resp.status();
        let body = resp.text().await?;

        if !status.is_success() {
            if status == StatusCode::UNAUTHORIZED {
                self.auth.invalidate().await;
            }
            return Err(YouTubeError::Api {
                status: status.as_u16(),
                message: api_error_message(&body),
            });
        }

        Ok(serde_json::from_str(&body)?)
    }
}

#[async_trait::async_trait]
impl VideoPlatform for YouTubeClient {
    async fn liked_page(&self, page_token: Option<&str>) -> Result<LikedPage, YouTubeError> {
        let max_results = self.page_size.to_string();
        let mut query = vec![
            ("part", "snippet"),
            ("playlistId", self.playlist_id.as_str()),
            ("maxResults", max_results.as_str()),
        ];
        if let Some(token) = page_token {
            query.push(("pageToken", token));
        }

        let resp: PlaylistItemListResponse = self.get_json("playlistItems", &query).await?;
        Ok(resp.into_page())
    }

    async fn video_details(&self, ids: &[String]) -> Result<Vec<VideoDetail>, YouTubeError> {
        if ids.is_empty() {
            return Ok(vec![]);
        }
        let joined = ids.join(",");
        let query = [("part", "snippet,contentDetails"), ("id", joined.as_str())];

        let resp: VideoListResponse = self.get_json("videos", &query).await?;
        Ok(resp.into_details())
    }
}

// Wire types. Only the fields the sync reads are modelled; everything is
// optional because the API drops fields for private or deleted videos.

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlaylistItemListResponse {
    #[serde(default)]
    items: Vec<PlaylistItem>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PlaylistItem {
    snippet: Option<PlaylistItemSnippet>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlaylistItemSnippet {
    #[serde(default)]
    title: String,
    video_owner_channel_title: Option<String>,
    channel_title: Option<String>,
    resource_id: Option<ResourceId>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResourceId {
    video_id: Option<String>,
}

impl PlaylistItemListResponse {
    fn into_page(self) -> LikedPage {
        let items = self
            .items
            .into_iter()
            .filter_map(|item| {
                let snippet = item.snippet?;
                let video_id = snippet.resource_id.and_then(|r| r.video_id)?;
                Some(LikedItem {
                    video_id,
                    title: snippet.title,
                    channel_title: snippet
                        .video_owner_channel_title
                        .or(snippet.channel_title)
                        .unwrap_or_default(),
                })
            })
            .collect();

        LikedPage {
            items,
            next_page_token: self.next_page_token.filter(|t| !t.is_empty()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct VideoListResponse {
    #[serde(default)]
    items: Vec<Video>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Video {
    id: String,
    snippet: Option<VideoSnippet>,
    content_details: Option<ContentDetails>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VideoSnippet {
    #[serde(default)]
    title: String,
    #[serde(default)]
    channel_title: String,
}

#[derive(Debug, Deserialize)]
struct ContentDetails {
    duration: Option<String>,
}

impl VideoListResponse {
    fn into_details(self) -> Vec<VideoDetail> {
        self.items
            .into_iter()
            .map(|v| {
                let (title, channel_title) = v
                    .snippet
                    .map(|s| (s.title, s.channel_title))
                    .unwrap_or_default();
                VideoDetail {
                    id: v.id,
                    title,
                    channel_title,
                    duration: v
                        .content_details
                        .and_then(|c| c.duration)
                        .unwrap_or_else(|| "PT0S".to_string()),
                }
            })
            .collect()
    }
}

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
}

fn api_error_message(body: &str) -> String {
    serde_json::from_str::<ApiErrorResponse>(body)
        .map(|r| r.error.message)
        .unwrap_or_else(|_| body.to_string())
}
