use std::{net::SocketAddr, sync::Arc};

use kecs_api::{EngineApiAdapter, HttpApi, TARGET_PREFIX};
use kecs_core::{EngineConfig, MemoryStore, TaskEngine};
use kecs_exec::SimRuntime;
use serde_json::{Value, json};
use tokio::{net::TcpListener, sync::oneshot};

struct Server {
    addr: SocketAddr,
    client: reqwest::Client,
    shutdown: Option<oneshot::Sender<()>>,
}

impl Server {
    async fn start() -> Self {
        let engine = TaskEngine::new(
            Arc::new(MemoryStore::new()),
            Arc::new(SimRuntime::default()),
            EngineConfig::test_mode(),
        );
        let router = HttpApi::new(Arc::new(EngineApiAdapter::new(Arc::new(engine)))).router();

        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        let (tx, rx) = oneshot::channel::<()>();
        tokio::spawn(async move {
            kecs_api::axum::serve(listener, router)
                .with_graceful_shutdown(async move {
                    let _ = rx.await;
                })
                .await
                .expect("serve");
        });

        Self {
            addr,
            client: reqwest::Client::new(),
            shutdown: Some(tx),
        }
    }

    async fn call(&self, operation: &str, body: Value) -> (u16, Value) {
        let resp = self
            .client
            .post(format!("http://{}/", self.addr))
            .header("X-Amz-Target", format!("{TARGET_PREFIX}{operation}"))
            .header("Content-Type", "application/x-amz-json-1.1")
            .body(body.to_string())
            .send()
            .await
            .expect("send");
        let status = resp.status().as_u16();
        let body = resp.json::<Value>().await.expect("json body");
        (status, body)
    }

    async fn seed(&self) {
        let (status, _) = self.call("CreateCluster", json!({ "clusterName": "default" })).await;
        assert_eq!(status, 200);
        let (status, body) = self
            .call(
                "RegisterTaskDefinition",
                json!({
                    "family": "web",
                    "containerDefinitions": [{
                        "name": "app",
                        "image": "nginx:latest",
                        "cpu": 256,
                        "memory": 512,
                        "command": ["sleep", "300"]
                    }]
                }),
            )
            .await;
        assert_eq!(status, 200);
        assert_eq!(body["taskDefinition"]["revision"], 1);
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

#[tokio::test]
async fn health_reports_ok() {
    let server = Server::start().await;
    let body: Value = server
        .client
        .get(format!("http://{}/health", server.addr))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body, json!({ "status": "ok" }));
}

#[tokio::test]
async fn run_describe_stop_round_trip() {
    let server = Server::start().await;
    server.seed().await;

    let (status, run) = server
        .call("RunTask", json!({ "taskDefinition": "web", "count": 2 }))
        .await;
    assert_eq!(status, 200);
    let tasks = run["tasks"].as_array().unwrap();
    assert_eq!(tasks.len(), 2);
    assert_eq!(run["failures"].as_array().unwrap().len(), 0);
    assert_eq!(tasks[0]["lastStatus"], "PROVISIONING");
    let arn = tasks[0]["taskArn"].as_str().unwrap().to_string();

    let (status, described) = server
        .call("DescribeTasks", json!({ "tasks": [arn, "nope"] }))
        .await;
    assert_eq!(status, 200);
    assert_eq!(described["tasks"][0]["lastStatus"], "PENDING");
    assert_eq!(described["failures"][0]["reason"], "MISSING");

    let (status, listed) = server.call("ListTasks", json!({ "family": "web" })).await;
    assert_eq!(status, 200);
    assert_eq!(listed["taskArns"].as_array().unwrap().len(), 2);

    let (status, stopped) = server
        .call("StopTask", json!({ "task": arn, "reason": "done" }))
        .await;
    assert_eq!(status, 200);
    assert_eq!(stopped["task"]["lastStatus"], "STOPPED");
    assert_eq!(stopped["task"]["stoppedReason"], "done");

    let (status, again) = server.call("StopTask", json!({ "task": arn })).await;
    assert_eq!(status, 200);
    assert_eq!(again["task"]["lastStatus"], "STOPPED");
}

#[tokio::test]
async fn oversized_container_is_reported_as_failure() {
    let server = Server::start().await;
    server.seed().await;
    server
        .call(
            "RegisterTaskDefinition",
            json!({
                "family": "huge",
                "containerDefinitions": [{ "name": "app", "image": "busybox", "memory": 100000 }]
            }),
        )
        .await;

    let (status, run) = server.call("RunTask", json!({ "taskDefinition": "huge" })).await;
    assert_eq!(status, 200);
    assert_eq!(run["tasks"].as_array().unwrap().len(), 0);
    assert_eq!(run["failures"][0]["reason"], "RESOURCE:MEMORY");
    assert_eq!(run["failures"][0]["detail"], "Memory request too high: 100000 MB");
}

#[tokio::test]
async fn errors_use_aws_error_shape() {
    let server = Server::start().await;

    let (status, body) = server
        .call("RunTask", json!({ "cluster": "ghost", "taskDefinition": "web" }))
        .await;
    assert_eq!(status, 400);
    assert_eq!(body["__type"], "ClusterNotFoundException");

    server.seed().await;
    let (status, body) = server.call("RunTask", json!({ "taskDefinition": "web", "count": 0 })).await;
    assert_eq!(status, 400);
    assert_eq!(body["__type"], "InvalidParameterException");

    let (status, body) = server.call("DescribeTasks", json!({ "tasks": [] })).await;
    assert_eq!(status, 400);
    assert_eq!(body["__type"], "InvalidParameterException");

    let (status, body) = server.call("DeleteEverything", json!({})).await;
    assert_eq!(status, 400);
    assert_eq!(body["__type"], "UnknownOperationException");
}
