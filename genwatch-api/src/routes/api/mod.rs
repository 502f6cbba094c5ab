pub mod captions;
pub mod generation;
pub mod images;
pub mod jobs;

use crate::ApiVersion;

use axum::Router;

pub fn router() -> Router<crate::SharedAppState> {
    let base = Router::new()
        .merge(generation::router())
        .merge(captions::router())
        .nest("/jobs", jobs::router())
        .nest("/images", images::router());

    Router::new().nest(&format!("/api/{}", ApiVersion::V1.as_ref()), base)
}
