use crate::{history::HistoryEntry, routes::handle_result_as_json, SharedAppState};
use genwatch_core::{api_response::Message, images::SelectedCaptions};

use axum::{extract::State, response::Response, routing, Json, Router};

pub fn router() -> Router<SharedAppState> {
    Router::new().route("/save-selected-captions", routing::post(save_selected_captions))
}

async fn save_selected_captions(
    State(state): State<SharedAppState>,
    Json(request): Json<SelectedCaptions>,
) -> Response {
    let captions = request.selected_captions;
    log::info!("saving {} selected caption(s)", captions.len());

    if let Err(e) = state
        .history
        .record(HistoryEntry::SelectedImages, format!("{captions:?}"))
    {
        log::warn!("{e}");
    }

    handle_result_as_json(state.captions.save(&captions).map(|_| Message {
        message: "Selected captions saved successfully".into(),
    }))
}
