use std::sync::Arc;

use axum::{
    Json,
    extract::{Query, State},
    response::{IntoResponse, Response},
};
use tokio::sync::Mutex;
use tracing::info;

use crate::api::{APIResponse, ErrorResponse, QueryParams, RowsResponse, StateResponse, SyncResponse};
use crate::classify::Classifier;
use crate::db::{SyncStore, format_timestamp};
use crate::error::SyncError;
use crate::sync::{SyncOptions, SyncStats, run_daily_sync};
use crate::youtube::VideoPlatform;
use crate::{good_response, server_error, unpack_error};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn SyncStore>,
    pub platform: Arc<dyn VideoPlatform>,
    pub classifier: Arc<Classifier>,
    pub options: SyncOptions,
    sync_lock: Arc<Mutex<()>>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn SyncStore>,
        platform: Arc<dyn VideoPlatform>,
        classifier: Classifier,
        options: SyncOptions,
    ) -> Self {
        AppState {
            store,
            platform,
            classifier: Arc::new(classifier),
            options,
            sync_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Runs a sync. Overlapping calls in this process queue behind each other.
    pub async fn run_sync(&self) -> Result<SyncStats, SyncError> {
        let _guard = self.sync_lock.lock().await;
        run_daily_sync(
            self.platform.as_ref(),
            self.store.as_ref(),
            &self.classifier,
            &self.options,
        )
        .await
    }
}

const DEFAULT_LIMIT: u32 = 50;
const MAX_LIMIT: u32 = 200;

#[derive(Debug, PartialEq, Eq)]
pub struct HandlerParams {
    pub limit: u32,
    pub offset: u32,
}

impl QueryParams {
    pub fn into_handler_params(self) -> HandlerParams {
        HandlerParams {
            limit: self.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT),
            offset: self.offset.unwrap_or(0),
        }
    }
}

pub async fn healthcheck() -> impl IntoResponse {
    info!("got healthcheck request");
    Json(APIResponse::new_from_msg("ok"))
}

pub async fn sync_history(State(state): State<AppState>) -> Response {
    info!("got sync request");

    match state.run_sync().await {
        Ok(stats) => {
            info!(?stats, "sync completed");
            good_response(SyncResponse {
                success: true,
                inserted: stats.inserted,
            })
        }
        Err(e) => {
            let error = unpack_error(&e);
            tracing::error!(error = %error, "sync failed");
            server_error(ErrorResponse { error })
        }
    }
}

pub async fn list_history(State(state): State<AppState>, Query(qp): Query<QueryParams>) -> Response {
    let hp = qp.into_handler_params();

    match state.store.list_history(hp.limit, hp.offset).await {
        Ok(rows) => good_response(RowsResponse {
            rows,
            limit: hp.limit,
            offset: hp.offset,
        }),
        Err(e) => {
            tracing::error!("failed to list history. db_error: {}", e);
            server_error(ErrorResponse {
                error: unpack_error(&e),
            })
        }
    }
}

pub async fn get_state(State(state): State<AppState>) -> Response {
    match state.store.sync_state().await {
        Ok(s) => good_response(StateResponse {
            last_synced_at: format_timestamp(s.last_synced_at),
        }),
        Err(e) => {
            tracing::error!("failed to read sync state. db_error: {}", e);
            server_error(ErrorResponse {
                error: unpack_error(&e),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_params_defaults_and_clamp() {
        let hp = QueryParams::default().into_handler_params();
        assert_eq!(hp, HandlerParams { limit: 50, offset: 0 });

        let hp = QueryParams {
            limit: Some(10_000),
            offset: Some(7),
        }
        .into_handler_params();
        assert_eq!(hp, HandlerParams { limit: 200, offset: 7 });

        let hp = QueryParams {
            limit: Some(0),
            offset: None,
        }
        .into_handler_params();
        assert_eq!(hp.limit, 1);
    }
}
