use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::{HeaderMap, header::CONTENT_TYPE},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Serialize, de::DeserializeOwned};
use tracing::debug;

use crate::{error::ApiError, handler::EcsApiHandler};

/// `X-Amz-Target` prefix of every ECS operation.
pub const TARGET_PREFIX: &str = "AmazonEC2ContainerServiceV20141113.";

pub(crate) const AMZ_JSON: &str = "application/x-amz-json-1.1";

const TARGET_HEADER: &str = "x-amz-target";

/// HTTP surface speaking the AWS JSON 1.1 protocol.
pub struct HttpApi<H> {
    handler: Arc<H>,
}

impl<H> HttpApi<H>
where
    H: EcsApiHandler,
{
    pub fn new(handler: Arc<H>) -> Self {
        Self { handler }
    }

    /// Routes:
    /// - `POST /` dispatched on `X-Amz-Target`
    /// - `GET /health`
    pub fn router(self) -> Router {
        Router::new()
            .route("/", post(dispatch::<H>))
            .route("/health", get(health))
            .with_state(self.handler)
    }
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

/// POST /
async fn dispatch<H>(State(handler): State<Arc<H>>, headers: HeaderMap, body: Bytes) -> Result<Response, ApiError>
where
    H: EcsApiHandler,
{
    let target = headers
        .get(TARGET_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::InvalidRequest("missing X-Amz-Target header".into()))?;
    let operation = target
        .strip_prefix(TARGET_PREFIX)
        .ok_or_else(|| ApiError::UnknownOperation(target.to_string()))?;

    debug!(target: "kecs.api", operation, bytes = body.len(), "request");

    match operation {
        "RunTask" => reply(handler.run_task(parse(&body)?).await?),
        "StartTask" => reply(handler.start_task(parse(&body)?).await?),
        "StopTask" => reply(handler.stop_task(parse(&body)?).await?),
        "DescribeTasks" => reply(handler.describe_tasks(parse(&body)?).await?),
        "ListTasks" => reply(handler.list_tasks(parse(&body)?).await?),
        "CreateCluster" => reply(handler.create_cluster(parse(&body)?).await?),
        "RegisterTaskDefinition" => reply(handler.register_task_definition(parse(&body)?).await?),
        other => Err(ApiError::UnknownOperation(other.to_string())),
    }
}

/// An empty body is read as the request's defaults, as the AWS CLI sends `{}` or nothing.
fn parse<T>(body: &[u8]) -> Result<T, ApiError>
where
    T: DeserializeOwned + Default,
{
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body).map_err(|e| ApiError::InvalidRequest(format!("malformed request body: {e}")))
}

fn reply<T: Serialize>(body: T) -> Result<Response, ApiError> {
    Ok(([(CONTENT_TYPE, AMZ_JSON)], Json(body)).into_response())
}

#[cfg(test)]
mod tests {
    use kecs_model::api::{ListTasksRequest, RunTaskRequest};

    use super::*;

    #[test]
    fn empty_body_yields_defaults() {
        let req: ListTasksRequest = parse(b"  \n").unwrap();
        assert!(req.cluster.is_none());
    }

    #[test]
    fn malformed_body_is_invalid_request() {
        let err = parse::<RunTaskRequest>(b"{not json").unwrap_err();
        assert!(matches!(err, ApiError::InvalidRequest(_)));
        assert_eq!(err.code(), "InvalidParameterException");
    }

    #[test]
    fn camel_case_body_is_accepted() {
        let req: RunTaskRequest = parse(br#"{"cluster":"prod","taskDefinition":"web:3","count":2}"#).unwrap();
        assert_eq!(req.cluster.as_deref(), Some("prod"));
        assert_eq!(req.task_definition.as_deref(), Some("web:3"));
        assert_eq!(req.count, Some(2));
    }
}
