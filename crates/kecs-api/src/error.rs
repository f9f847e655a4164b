use kecs_core::{CoreError, StoreError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("unknown operation: {0}")]
    UnknownOperation(String),

    #[error(transparent)]
    Core(#[from] CoreError),
}

impl ApiError {
    /// AWS error code reported in the `__type` field.
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::InvalidRequest(_) => "InvalidParameterException",
            ApiError::UnknownOperation(_) => "UnknownOperationException",
            ApiError::Core(e) => match e {
                CoreError::Validation(_) => "InvalidParameterException",
                CoreError::NotFound { kind: "cluster", .. } => "ClusterNotFoundException",
                CoreError::NotFound { .. } | CoreError::Conversion(_) => "ClientException",
                CoreError::Store(StoreError::AlreadyExists { .. }) => "ClientException",
                CoreError::Infrastructure(_) | CoreError::Store(_) | CoreError::Config(_) => "ServerException",
            },
        }
    }

    /// HTTP status: 500 for server faults, 400 for everything the caller can fix.
    pub fn status(&self) -> u16 {
        if self.code() == "ServerException" { 500 } else { 400 }
    }

    /// Message shown to the caller.
    pub fn message(&self) -> String {
        match self {
            ApiError::Core(CoreError::NotFound { kind: "cluster", .. }) => "Cluster not found.".to_string(),
            other => other.to_string(),
        }
    }
}

#[cfg(feature = "http")]
impl axum::response::IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        use axum::http::{StatusCode, header::CONTENT_TYPE};

        let status = StatusCode::from_u16(self.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            tracing::error!(target: "kecs.api", error = %self, "request failed");
        } else {
            tracing::debug!(target: "kecs.api", code = self.code(), error = %self, "request rejected");
        }

        let body = serde_json::json!({
            "__type": self.code(),
            "message": self.message(),
        });
        (
            status,
            [(CONTENT_TYPE, crate::http::AMZ_JSON)],
            axum::Json(body),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use kecs_core::RuntimeError;

    use super::*;

    #[test]
    fn codes_follow_error_kind() {
        let cases = [
            (ApiError::Core(CoreError::validation("count")), "InvalidParameterException", 400),
            (ApiError::Core(CoreError::not_found("cluster", "prod")), "ClusterNotFoundException", 400),
            (ApiError::Core(CoreError::not_found("task definition", "web:9")), "ClientException", 400),
            (ApiError::UnknownOperation("Frobnicate".into()), "UnknownOperationException", 400),
            (
                ApiError::Core(CoreError::Infrastructure(RuntimeError::Api("boom".into()))),
                "ServerException",
                500,
            ),
            (
                ApiError::Core(CoreError::Store(StoreError::Backend("disk".into()))),
                "ServerException",
                500,
            ),
        ];
        for (err, code, status) in cases {
            assert_eq!(err.code(), code, "{err}");
            assert_eq!(err.status(), status, "{err}");
        }
    }

    #[test]
    fn already_exists_is_a_client_error() {
        let err = ApiError::from(CoreError::from(StoreError::already_exists("cluster", "prod")));
        assert_eq!(err.code(), "ClientException");
        assert_eq!(err.status(), 400);
    }

    #[test]
    fn missing_cluster_message_matches_ecs() {
        let err = ApiError::from(CoreError::not_found("cluster", "prod"));
        assert_eq!(err.message(), "Cluster not found.");
    }
}
