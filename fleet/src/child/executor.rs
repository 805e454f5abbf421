//! Task execution and the worker's remote endpoint

use async_trait::async_trait;
use shared::wire::RequestHandler;
use shared::{process_debug, MethodResult, ProcessId, UnitOfWork, WorkerRequest, WorkerResponse};
use std::any::Any;
use std::sync::Arc;

use super::tasks::{TaskContext, TaskRegistry};

/// Runs units of work against a registry
///
/// Tasks run on the blocking pool so that a sleeping or panicking task never
/// stalls the endpoint. Panics are captured and returned as failures.
pub struct TaskExecutor {
    registry: TaskRegistry,
    context: TaskContext,
}

impl TaskExecutor {
    pub fn new(registry: TaskRegistry, context: TaskContext) -> Self {
        Self { registry, context }
    }

    pub fn context(&self) -> &TaskContext {
        &self.context
    }

    pub async fn execute(self: &Arc<Self>, unit: UnitOfWork) -> MethodResult {
        let task = unit.task.clone();
        let executor = Arc::clone(self);

        let result = match tokio::task::spawn_blocking(move || executor.registry.run(&executor.context, &unit)).await {
            Ok(result) => result,
            Err(e) if e.is_panic() => MethodResult::Failure {
                message: format!("task '{}' panicked: {}", task, panic_message(e.into_panic())),
                trace: Some(format!("task '{}' on {}", task, ProcessId::current())),
            },
            Err(e) => MethodResult::failure(format!("task '{task}' was cancelled: {e}")),
        };

        if let Some(message) = result.failure_message() {
            process_debug!(ProcessId::current(), "⚠️ Task '{}' failed: {}", task, message);
        }
        result
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Serves [`WorkerRequest`]s with a [`TaskExecutor`]
pub struct WorkerEndpoint {
    executor: Arc<TaskExecutor>,
}

impl WorkerEndpoint {
    pub fn new(executor: Arc<TaskExecutor>) -> Self {
        Self { executor }
    }
}

#[async_trait]
impl RequestHandler for WorkerEndpoint {
    type Request = WorkerRequest;
    type Response = WorkerResponse;

    async fn handle(&self, request: WorkerRequest) -> WorkerResponse {
        match request {
            WorkerRequest::Execute(unit) => WorkerResponse::Result(self.executor.execute(unit).await),
            WorkerRequest::Ping => WorkerResponse::Pong,
        }
    }
}
