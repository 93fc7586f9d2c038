use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("token refresh rejected ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("token response missing access_token")]
    MissingToken,
    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

#[derive(Error, Debug)]
pub enum YouTubeError {
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error("API response error ({status}): {message}")]
    Api { status: u16, message: String },
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("sync_state row {0} not found")]
    SyncStateMissing(i64),
    #[error("invalid timestamp {value:?}: {source}")]
    InvalidTimestamp {
        value: String,
        #[source]
        source: chrono::ParseError,
    },
    #[error(transparent)]
    Database(#[from] libsql::Error),
    #[error("replica sync failed: {0}")]
    Replica(String),
}

/// Sync failures, tagged with the step that produced them.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("failed to read sync state")]
    ReadState(#[source] StoreError),
    #[error("failed to fetch liked items")]
    FetchLiked(#[source] YouTubeError),
    #[error("failed to read existing history")]
    ReadHistory(#[source] StoreError),
    #[error("failed to fetch video details")]
    FetchDetails(#[source] YouTubeError),
    #[error("failed to insert history rows")]
    Insert(#[source] StoreError),
    #[error("failed to update sync state")]
    UpdateState(#[source] StoreError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::unpack_error;

    #[test]
    fn test_unpack_sync_error_chain() {
        let err = SyncError::ReadState(StoreError::SyncStateMissing(1));
        assert_eq!(
            unpack_error(&err),
            "failed to read sync state: sync_state row 1 not found"
        );
    }

    #[test]
    fn test_unpack_nested_api_error() {
        let err = SyncError::FetchDetails(YouTubeError::Api {
            status: 403,
            message: "quotaExceeded".to_string(),
        });
        assert_eq!(
            unpack_error(&err),
            "failed to fetch video details: API response error (403): quotaExceeded"
        );
    }
}
