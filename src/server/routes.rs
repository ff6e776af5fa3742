//! HTTP handlers for the task protocol routes.

use axum::extract::{Path, State};
use axum::Json;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::ProtocolError;
use crate::protocol::{self, AgentCard, Task, TaskSendRequest, TaskState};
use crate::server::AppState;

/// GET /card — public capability discovery, no auth.
pub async fn get_card(State(state): State<AppState>) -> Json<AgentCard> {
    Json(state.card.as_ref().clone())
}

/// POST /tasks — submit a task and process it within the request lifetime.
///
/// Validation failures reject before the worker adapter is ever invoked.
/// Worker failures are captured into a `failed` task record, never an HTTP
/// error.
pub async fn submit_task(
    State(state): State<AppState>,
    Json(request): Json<TaskSendRequest>,
) -> Result<Json<Task>, ProtocolError> {
    let task_id = match request.id {
        Some(id) => {
            protocol::validate_task_id(&id)?;
            id
        }
        None => Uuid::new_v4().to_string(),
    };
    protocol::check_message(&request.message)?;

    let prompt = request.message.joined_text();
    let task = Task::working(&task_id, request.context_id, request.message);
    state.repository.upsert(task).await;

    info!(task_id = %task_id, "task accepted, invoking worker");
    let result = state
        .worker
        .execute(prompt.trim(), &state.role_context)
        .await;

    // A concurrent cancel may have landed while the worker ran. Cancel is
    // advisory: the worker was not interrupted, its result is discarded.
    let mut task = match state.repository.get(&task_id).await {
        Some(current) if current.status.state == TaskState::Cancelled => {
            info!(task_id = %task_id, "task cancelled mid-flight, discarding worker result");
            return Ok(Json(current));
        }
        Some(current) => current,
        // last-write-wins: a duplicate submission may have replaced the
        // record; rebuild a working shell so the outcome is still recorded
        None => Task::working(&task_id, None, protocol::Message::user(prompt.clone())),
    };

    match result {
        Ok(output) => {
            task.complete("response", output);
            info!(task_id = %task_id, "task completed");
        }
        Err(e) => {
            warn!(task_id = %task_id, error = %e, "worker failed");
            task.fail(e);
        }
    }
    state.repository.upsert(task.clone()).await;
    Ok(Json(task))
}

/// GET /tasks/{id} — fetch a task record.
pub async fn get_task(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> Result<Json<Task>, ProtocolError> {
    protocol::validate_task_id(&task_id)?;
    state
        .repository
        .get(&task_id)
        .await
        .map(Json)
        .ok_or(ProtocolError::TaskNotFound(task_id))
}

/// POST /tasks/{id}/cancel — advisory cancel of a working task.
pub async fn cancel_task(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> Result<Json<Task>, ProtocolError> {
    protocol::validate_task_id(&task_id)?;
    state
        .repository
        .cancel(&task_id)
        .await
        .map(Json)
        .ok_or(ProtocolError::TaskNotFound(task_id))
}
