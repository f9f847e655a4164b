use async_trait::async_trait;
use kecs_model::api::{
    CreateClusterRequest, CreateClusterResponse, DescribeTasksRequest, DescribeTasksResponse, ListTasksRequest,
    ListTasksResponse, RegisterTaskDefinitionRequest, RegisterTaskDefinitionResponse, RunTaskRequest,
    RunTaskResponse, StartTaskRequest, StartTaskResponse, StopTaskRequest, StopTaskResponse,
};

use crate::error::ApiError;

/// Backend for the ECS task operations served over HTTP.
///
/// [`crate::EngineApiAdapter`] delegates straight to a `TaskEngine`; wrap it to add
/// request auditing or throttling.
#[async_trait]
pub trait EcsApiHandler: Send + Sync + 'static {
    async fn run_task(&self, req: RunTaskRequest) -> Result<RunTaskResponse, ApiError>;

    async fn start_task(&self, req: StartTaskRequest) -> Result<StartTaskResponse, ApiError>;

    async fn stop_task(&self, req: StopTaskRequest) -> Result<StopTaskResponse, ApiError>;

    async fn describe_tasks(&self, req: DescribeTasksRequest) -> Result<DescribeTasksResponse, ApiError>;

    async fn list_tasks(&self, req: ListTasksRequest) -> Result<ListTasksResponse, ApiError>;

    async fn create_cluster(&self, req: CreateClusterRequest) -> Result<CreateClusterResponse, ApiError>;

    async fn register_task_definition(
        &self,
        req: RegisterTaskDefinitionRequest,
    ) -> Result<RegisterTaskDefinitionResponse, ApiError>;
}
