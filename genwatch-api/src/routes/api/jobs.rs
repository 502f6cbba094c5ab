use crate::{
    id::JobId,
    routes::handle_result_as_json,
    watch::JobHandle,
    Error, SharedAppState,
};
use genwatch_core::generation::JobInspect;

use axum::{
    extract::{Path, State},
    response::Response,
    routing, Router,
};

pub fn router() -> Router<SharedAppState> {
    Router::new()
        .route("/:id", routing::get(inspect))
        .route("/:id/stop", routing::post(stop))
}

fn find_job(state: &SharedAppState, id: &str) -> crate::Result<JobHandle> {
    id.parse::<JobId>()
        .ok()
        .and_then(|id| state.jobs.get(&id))
        .ok_or_else(|| Error::JobNotFound(id.to_string()))
}

fn inspect_job(job: &JobHandle) -> JobInspect {
    JobInspect {
        job_id: job.id().to_string(),
        state: job.state(),
        output_dir: job.output_dir().display().to_string(),
    }
}

async fn inspect(State(state): State<SharedAppState>, Path(id): Path<String>) -> Response {
    handle_result_as_json(find_job(&state, &id).map(|job| inspect_job(&job)))
}

async fn stop(State(state): State<SharedAppState>, Path(id): Path<String>) -> Response {
    let job = match find_job(&state, &id) {
        Ok(job) => job,
        Err(e) => return handle_result_as_json::<JobInspect>(Err(e)),
    };
    job.stop().await;
    handle_result_as_json(Ok(inspect_job(&job)))
}
