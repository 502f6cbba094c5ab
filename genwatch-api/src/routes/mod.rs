pub mod api;
pub mod files;

use crate::{Error, ToAxumResponse};
use genwatch_core::api_response::ApiResponse;

use axum::response::Response;
use serde::Serialize;

/// Url prefix under which generated images are served.
pub const IMAGES_ROUTE: &str = "/generated_images";

pub fn router() -> axum::Router<crate::SharedAppState> {
    axum::Router::new()
        .merge(api::router())
        .merge(files::router())
}

fn handle_result_as_json<T: Serialize>(result: crate::Result<T>) -> Response {
    match result {
        Ok(data) => ApiResponse::success(&data).ok(),
        Err(e) => error_response(e),
    }
}

fn error_response(error: Error) -> Response {
    let response = ApiResponse::failure(&error);
    match &error {
        Error::JobAlreadyRunning(_) => response.conflict(),
        Error::JobNotFound(_) | Error::ImageNotFound(_) => response.not_found(),
        Error::InvalidImagePath(_) | Error::InvalidPrompt => response.bad_request(),
        _ => {
            log::error!("{error}");
            response.internal_server_error()
        }
    }
}
