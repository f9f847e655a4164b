use std::sync::Arc;

use async_trait::async_trait;
use kecs_core::TaskEngine;
use kecs_model::api::{
    CreateClusterRequest, CreateClusterResponse, DescribeTasksRequest, DescribeTasksResponse, ListTasksRequest,
    ListTasksResponse, RegisterTaskDefinitionRequest, RegisterTaskDefinitionResponse, RunTaskRequest,
    RunTaskResponse, StartTaskRequest, StartTaskResponse, StopTaskRequest, StopTaskResponse,
};

use crate::{error::ApiError, handler::EcsApiHandler};

/// Serves every operation from a shared [`TaskEngine`].
pub struct EngineApiAdapter {
    engine: Arc<TaskEngine>,
}

impl EngineApiAdapter {
    pub fn new(engine: Arc<TaskEngine>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl EcsApiHandler for EngineApiAdapter {
    async fn run_task(&self, req: RunTaskRequest) -> Result<RunTaskResponse, ApiError> {
        Ok(self.engine.run_task(req).await?)
    }

    async fn start_task(&self, req: StartTaskRequest) -> Result<StartTaskResponse, ApiError> {
        Ok(self.engine.start_task(req).await?)
    }

    async fn stop_task(&self, req: StopTaskRequest) -> Result<StopTaskResponse, ApiError> {
        let task = self.engine.stop_task(req).await?;
        Ok(StopTaskResponse { task })
    }

    async fn describe_tasks(&self, req: DescribeTasksRequest) -> Result<DescribeTasksResponse, ApiError> {
        Ok(self.engine.describe_tasks(req).await?)
    }

    async fn list_tasks(&self, req: ListTasksRequest) -> Result<ListTasksResponse, ApiError> {
        Ok(self.engine.list_tasks(req).await?)
    }

    async fn create_cluster(&self, req: CreateClusterRequest) -> Result<CreateClusterResponse, ApiError> {
        let cluster = self.engine.create_cluster(req).await?;
        Ok(CreateClusterResponse { cluster })
    }

    async fn register_task_definition(
        &self,
        req: RegisterTaskDefinitionRequest,
    ) -> Result<RegisterTaskDefinitionResponse, ApiError> {
        let task_definition = self.engine.register_task_definition(req).await?;
        Ok(RegisterTaskDefinitionResponse { task_definition })
    }
}
