use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::Serialize;

/// Typed boundary error for source adapters, the fetcher, and the cache layer.
/// Bubbled upward through `eyre::Error` at call sites that just need to glue
/// failures together (the refresh controller, the CLI) rather than match on
/// the exact kind.
#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    #[error("network error fetching {url}: {message}")]
    Network { url: String, message: String },

    #[error("failed to parse {source} response field `{field}`: {message}")]
    Parsing {
        source: String,
        field: String,
        message: String,
    },

    #[error("{api_name} api error at {endpoint}: {code}")]
    Api {
        api_name: String,
        endpoint: String,
        code: String,
    },

    #[error("configuration error: {key}")]
    Config { key: String },

    #[error("cache error: {0}")]
    Cache(String),

    #[error("aggregation error: {0}")]
    Aggregation(String),
}

impl AdapterError {
    pub fn network(url: impl Into<String>, message: impl Into<String>) -> Self {
        AdapterError::Network {
            url: url.into(),
            message: message.into(),
        }
    }

    pub fn parsing(
        source: impl Into<String>,
        field: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        AdapterError::Parsing {
            source: source.into(),
            field: field.into(),
            message: message.into(),
        }
    }

    /// Severity this error should be logged at, per the taxonomy's severity mapping.
    pub fn severity(&self) -> tracing::Level {
        match self {
            AdapterError::Cache(_) => tracing::Level::WARN,
            AdapterError::Network { .. } | AdapterError::Api { .. } => tracing::Level::ERROR,
            AdapterError::Config { .. } | AdapterError::Aggregation(_) => tracing::Level::ERROR,
            AdapterError::Parsing { .. } => tracing::Level::WARN,
        }
    }
}

/// HTTP-surface error, mapped to a JSON body. Full error detail is only
/// included in debug builds; release builds get a generic message.
pub enum AppError {
    NotFound(String),
    BadRequest(String),
    Internal(eyre::Error),
}

#[derive(Serialize)]
struct ErrorResponse {
    code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    msg: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, body) = match self {
            AppError::NotFound(msg) => (
                StatusCode::NOT_FOUND,
                ErrorResponse {
                    code: "NOT_FOUND".into(),
                    msg: Some(msg),
                },
            ),
            AppError::BadRequest(msg) => (
                StatusCode::BAD_REQUEST,
                ErrorResponse {
                    code: "BAD_REQUEST".into(),
                    msg: Some(msg),
                },
            ),
            AppError::Internal(err) => {
                tracing::error!(?err, "unhandled error serving request");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    #[cfg(debug_assertions)]
                    ErrorResponse {
                        code: "SVR_ERR".into(),
                        msg: Some(format!("{err:#}")),
                    },
                    #[cfg(not(debug_assertions))]
                    ErrorResponse {
                        code: "SVR_ERR".into(),
                        msg: Some("internal server error".into()),
                    },
                )
            }
        };

        let envelope = serde_json::json!({
            "success": false,
            "error": body,
        });
        (status, Json(envelope)).into_response()
    }
}

impl From<eyre::Error> for AppError {
    fn from(e: eyre::Error) -> Self {
        AppError::Internal(e)
    }
}

impl From<AdapterError> for AppError {
    fn from(e: AdapterError) -> Self {
        AppError::Internal(e.into())
    }
}
