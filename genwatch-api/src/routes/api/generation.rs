use crate::{
    routes::{error_response, IMAGES_ROUTE},
    watch::WatchEvent,
    SharedAppState, ToAxumResponse,
};
use genwatch_core::{
    api_response::ApiResponse,
    generation::{GenerateImagesQuery, ImageAvailable, StopResponse},
};

use axum::{
    extract::{Query, State},
    http::{HeaderName, HeaderValue},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing, Router,
};
use futures_util::StreamExt;

pub const JOB_ID_HEADER: &str = "x-job-id";

pub fn router() -> Router<SharedAppState> {
    Router::new()
        .route("/generate-images", routing::get(generate_images))
        .route("/stop-generation", routing::post(stop_generation))
}

async fn generate_images(
    State(state): State<SharedAppState>,
    Query(query): Query<GenerateImagesQuery>,
) -> Response {
    let prompt = query.prompt.trim();
    if prompt.is_empty() {
        return ApiResponse::failure("Prompt is required").bad_request();
    }
    log::info!("received prompt: {prompt}");

    let (handle, events) = match state.start_generation(prompt).await {
        Ok(job) => job,
        Err(e) => return error_response(e),
    };

    let stream = events.into_stream().map(|event| to_sse_event(&event));
    let mut response = Sse::new(stream)
        .keep_alive(KeepAlive::default())
        .into_response();

    if let Ok(value) = HeaderValue::from_str(&handle.id().to_string()) {
        response
            .headers_mut()
            .insert(HeaderName::from_static(JOB_ID_HEADER), value);
    }
    response
}

fn to_sse_event(event: &WatchEvent) -> Result<Event, serde_json::Error> {
    match event {
        WatchEvent::File(file) => Event::default().json_data(ImageAvailable {
            image_path: format!("{IMAGES_ROUTE}/{}", file.name),
        }),
        WatchEvent::End(end) => Event::default().event("end").json_data(end.to_stream_end()),
    }
}

async fn stop_generation(State(state): State<SharedAppState>) -> Response {
    let stopped = state.jobs.stop_all().await;
    let message = if stopped.is_empty() {
        "No image generation in progress"
    } else {
        "Image generation stopped"
    };
    log::info!("{message}");

    ApiResponse::success(StopResponse {
        message: message.to_string(),
        stopped: stopped.into_iter().map(|(id, _)| id.to_string()).collect(),
    })
    .ok()
}
