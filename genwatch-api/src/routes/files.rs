use super::{error_response, IMAGES_ROUTE};
use crate::{Error, SharedAppState, ToAxumResponse};
use genwatch_core::api_response::ApiResponse;

use axum::{
    body::{self, Full},
    extract::{Path, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing, Router,
};

pub fn router() -> Router<SharedAppState> {
    Router::new()
        .route("/", routing::get(health))
        .route(&format!("{IMAGES_ROUTE}/:filename"), routing::get(image_file))
}

async fn health() -> Response {
    ApiResponse::message("Image generation backend is running").ok()
}

/// Only plain file names are served, anything resembling a path is refused.
fn validate_file_name(name: &str) -> crate::Result<&str> {
    if name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\'])
        || name.contains('\0')
    {
        return Err(Error::InvalidImagePath(name.to_string()));
    }
    Ok(name)
}

async fn image_file(
    State(state): State<SharedAppState>,
    Path(filename): Path<String>,
) -> Response {
    let name = match validate_file_name(&filename) {
        Ok(name) => name,
        Err(e) => return error_response(e),
    };
    let path = state.config.output_dir.join(name);

    let contents = match tokio::fs::read(&path).await {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return error_response(Error::ImageNotFound(name.to_string()))
        }
        Err(e) => return error_response(Error::OutputDirFailed(path, e)),
    };

    let mime_type = mime_guess::from_path(name).first_or_octet_stream();
    let content_type = HeaderValue::from_str(mime_type.as_ref())
        .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"));

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, content_type)],
        body::boxed(Full::from(contents)),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_paths_and_dot_entries() {
        assert_eq!(validate_file_name("beach_1.png").unwrap(), "beach_1.png");
        for name in ["", ".", "..", "../secret.png", "a/b.png", "a\\b.png"] {
            assert!(
                matches!(validate_file_name(name), Err(Error::InvalidImagePath(_))),
                "{name} should be rejected"
            );
        }
    }
}
